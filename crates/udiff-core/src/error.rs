use thiserror::Error;

/// Failures surfaced by patch construction and inspection.
///
/// Binary and byte-identical content are not errors; those outcomes are
/// reported as [`crate::PatchOutcome::Skipped`].
#[derive(Debug, Error)]
pub enum Error {
    /// A hunk, line or delta index was out of range.
    #[error("not found: {0}")]
    NotFound(&'static str),

    /// The diff engine, or a callback it drove, failed mid-construction.
    /// All partial state has been released; no patch exists.
    #[error("diff engine failure: {0}")]
    Engine(String),

    /// Callbacks arrived out of the required file -> hunk -> line
    /// nesting order.
    #[error("diff callback protocol violation: {0}")]
    Protocol(&'static str),

    /// The blob store could not produce content for an id.
    #[error("blob store failure: {0}")]
    Store(String),
}

pub type Result<T> = std::result::Result<T, Error>;

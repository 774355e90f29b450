//! Structured patch generation: turns a callback-driven diff
//! computation into an immutable, randomly accessible patch object and
//! renders it back to canonical unified-diff text.

pub mod builder;
pub mod engine;
pub mod error;
pub mod format;
pub mod patch;
pub mod types;

pub use builder::PatchBuilder;
pub use engine::{DiffEngine, DiffSink, HunkRange, LineRecord, SimilarEngine};
pub use error::{Error, Result};
pub use format::delta_header_text;
pub use patch::{BlobStore, Patch, PatchOutcome};
pub use types::{
    Blob, Delta, DeltaStatus, DiffAlgorithm, DiffFile, DiffList, DiffOptions, FormatOptions, Hunk,
    LineRef, LineStats, Origin, Side,
};

use crate::error::{Error, Result};
use crate::types::{Delta, DiffAlgorithm, DiffOptions, Origin, Side};
use log::debug;
use similar::{Algorithm, ChangeTag, TextDiff};

/// Boundary fields for one hunk, reported before any of its lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HunkRange {
    pub old_start: usize,
    pub old_lines: usize,
    pub new_start: usize,
    pub new_lines: usize,
}

/// One line of edit script. Content is referenced by side plus byte
/// range into the corresponding source buffer, never copied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LineRecord {
    pub origin: Origin,
    pub side: Side,
    pub offset: usize,
    pub len: usize,
    pub old_lineno: Option<usize>,
    pub new_lineno: Option<usize>,
}

/// Receiver for the ordered callback sequence a diff engine produces:
/// `on_file` exactly once, then per hunk `on_hunk` followed by that
/// hunk's `on_line` calls. Returning an error from any callback aborts
/// the run.
pub trait DiffSink {
    fn on_file(&mut self, delta: &Delta) -> Result<()>;
    fn on_hunk(&mut self, range: HunkRange) -> Result<()>;
    fn on_line(&mut self, line: LineRecord) -> Result<()>;
}

/// Strategy interface for producing an edit script between two texts.
pub trait DiffEngine {
    fn run(&self, delta: &Delta, old: &str, new: &str, sink: &mut dyn DiffSink) -> Result<()>;
}

/// The stock engine, backed by the `similar` crate.
pub struct SimilarEngine {
    algorithm: DiffAlgorithm,
    context_lines: usize,
}

impl SimilarEngine {
    pub fn new(options: &DiffOptions) -> Self {
        SimilarEngine {
            algorithm: options.algorithm,
            context_lines: options.context_lines,
        }
    }
}

impl DiffEngine for SimilarEngine {
    fn run(&self, delta: &Delta, old: &str, new: &str, sink: &mut dyn DiffSink) -> Result<()> {
        sink.on_file(delta)?;

        let diff = TextDiff::configure()
            .algorithm(backend_algorithm(self.algorithm))
            .diff_lines(old, new);

        let old_table = line_table(old);
        let new_table = line_table(new);

        let groups = diff.grouped_ops(self.context_lines);
        debug!("edit script has {} hunk group(s)", groups.len());

        for group in &groups {
            let first = match group.first() {
                Some(op) => op,
                None => continue,
            };
            let last = match group.last() {
                Some(op) => op,
                None => continue,
            };

            let old_lines = last.old_range().end - first.old_range().start;
            let new_lines = last.new_range().end - first.new_range().start;
            // A zero-length range starts at the line before the
            // insertion point, per unified diff convention.
            let old_start = if old_lines == 0 {
                first.old_range().start
            } else {
                first.old_range().start + 1
            };
            let new_start = if new_lines == 0 {
                first.new_range().start
            } else {
                first.new_range().start + 1
            };

            sink.on_hunk(HunkRange {
                old_start,
                old_lines,
                new_start,
                new_lines,
            })?;

            for op in group {
                for change in diff.iter_changes(op) {
                    let (side, index) = match change.tag() {
                        ChangeTag::Equal | ChangeTag::Delete => (Side::Old, change.old_index()),
                        ChangeTag::Insert => (Side::New, change.new_index()),
                    };
                    let index = index
                        .ok_or_else(|| Error::Engine("change without a line index".to_string()))?;
                    let (offset, len) = match side {
                        Side::Old => old_table[index],
                        Side::New => new_table[index],
                    };

                    let terminated = change.value().ends_with('\n');
                    let origin = match (change.tag(), terminated) {
                        (ChangeTag::Equal, true) => Origin::Context,
                        (ChangeTag::Equal, false) => Origin::ContextEofnl,
                        (ChangeTag::Insert, true) => Origin::Addition,
                        (ChangeTag::Insert, false) => Origin::AdditionEofnl,
                        (ChangeTag::Delete, true) => Origin::Deletion,
                        (ChangeTag::Delete, false) => Origin::DeletionEofnl,
                    };

                    sink.on_line(LineRecord {
                        origin,
                        side,
                        offset,
                        len,
                        old_lineno: change.old_index().map(|i| i + 1),
                        new_lineno: change.new_index().map(|i| i + 1),
                    })?;
                }
            }
        }

        Ok(())
    }
}

fn backend_algorithm(algorithm: DiffAlgorithm) -> Algorithm {
    match algorithm {
        DiffAlgorithm::Myers => Algorithm::Myers,
        DiffAlgorithm::Patience => Algorithm::Patience,
        DiffAlgorithm::Lcs => Algorithm::Lcs,
    }
}

/// Byte offset and length of every newline-delimited line in `text`.
fn line_table(text: &str) -> Vec<(usize, usize)> {
    let mut table = Vec::new();
    let mut offset = 0;
    for line in text.split_inclusive('\n') {
        table.push((offset, line.len()));
        offset += line.len();
    }
    table
}

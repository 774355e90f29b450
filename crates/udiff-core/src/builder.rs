use crate::engine::{DiffSink, HunkRange, LineRecord};
use crate::error::{Error, Result};
use crate::format;
use crate::patch::Patch;
use crate::types::{Delta, FormatOptions, Hunk};
use log::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BuilderState {
    Start,
    FileSeen,
    InHunk,
}

/// Callback sink that accumulates a diff engine's output into the
/// arrays a [`Patch`] is built from. Dropped on any failure, which
/// releases all partial state.
pub struct PatchBuilder {
    state: BuilderState,
    delta: Option<Delta>,
    hunks: Vec<Hunk>,
    lines: Vec<LineRecord>,
}

impl PatchBuilder {
    pub fn new() -> Self {
        PatchBuilder {
            state: BuilderState::Start,
            delta: None,
            hunks: Vec::new(),
            lines: Vec::new(),
        }
    }

    /// Freeze the accumulated state into a patch that owns `old_data`
    /// and `new_data`. Fails if the engine never reported a file.
    pub fn into_patch(
        self,
        old_data: String,
        new_data: String,
        format: FormatOptions,
    ) -> Result<Patch> {
        let delta = self
            .delta
            .ok_or(Error::Protocol("engine finished without a file callback"))?;

        debug!(
            "built patch with {} hunk(s), {} line(s)",
            self.hunks.len(),
            self.lines.len()
        );

        Ok(Patch {
            delta,
            old_data,
            new_data,
            hunks: self.hunks,
            lines: self.lines,
            format,
        })
    }
}

impl Default for PatchBuilder {
    fn default() -> Self {
        PatchBuilder::new()
    }
}

impl DiffSink for PatchBuilder {
    fn on_file(&mut self, delta: &Delta) -> Result<()> {
        if self.state != BuilderState::Start {
            return Err(Error::Protocol("file callback after construction started"));
        }
        self.delta = Some(delta.clone());
        self.state = BuilderState::FileSeen;
        Ok(())
    }

    fn on_hunk(&mut self, range: HunkRange) -> Result<()> {
        if self.state == BuilderState::Start {
            return Err(Error::Protocol("hunk callback before the file callback"));
        }
        self.hunks.push(Hunk {
            old_start: range.old_start,
            old_lines: range.old_lines,
            new_start: range.new_start,
            new_lines: range.new_lines,
            header: format::hunk_header(&range),
            num_lines: 0,
            line_start: self.lines.len(),
        });
        self.state = BuilderState::InHunk;
        Ok(())
    }

    fn on_line(&mut self, line: LineRecord) -> Result<()> {
        if self.state != BuilderState::InHunk {
            return Err(Error::Protocol("line callback before any hunk callback"));
        }
        let hunk = match self.hunks.last_mut() {
            Some(hunk) => hunk,
            None => return Err(Error::Protocol("line callback before any hunk callback")),
        };
        hunk.num_lines += 1;
        self.lines.push(line);
        Ok(())
    }
}

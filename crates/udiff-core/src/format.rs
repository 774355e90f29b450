use crate::engine::{HunkRange, LineRecord};
use crate::patch::Patch;
use crate::types::{Delta, DiffFile, FormatOptions, FILE_MODE_ABSENT};

pub const OLD_FILE_PREFIX: &str = "--- ";
pub const NEW_FILE_PREFIX: &str = "+++ ";
pub const NULL_PATH: &str = "/dev/null";

/// Emitted after a line that has no trailing newline, in place of its
/// missing terminator.
pub const NO_EOFNL_MARKER: &str = "\n\\ No newline at end of file\n";

/// Render the `@@ -a,b +c,d @@` header line, trailing newline included.
/// A count of one is elided, as git does (`@@ -0,0 +1 @@`).
pub(crate) fn hunk_header(range: &HunkRange) -> String {
    format!(
        "@@ -{} +{} @@\n",
        range_text(range.old_start, range.old_lines),
        range_text(range.new_start, range.new_lines)
    )
}

fn range_text(start: usize, count: usize) -> String {
    if count == 1 {
        format!("{}", start)
    } else {
        format!("{},{}", start, count)
    }
}

/// Render the file header block for a delta: mode-change annotation when
/// both sides exist with differing modes, then the old/new path lines,
/// or the binary notice for a binary delta.
pub fn delta_header_text(delta: &Delta, options: &FormatOptions) -> String {
    let mut out = String::new();

    let old_mode = delta.old_file.mode;
    let new_mode = delta.new_file.mode;
    if old_mode != FILE_MODE_ABSENT && new_mode != FILE_MODE_ABSENT && old_mode != new_mode {
        out.push_str(&format!("old mode {:o}\n", old_mode));
        out.push_str(&format!("new mode {:o}\n", new_mode));
    }

    if delta.binary {
        out.push_str(&format!(
            "Binary files {} and {} differ\n",
            side_label(&delta.old_file, &options.old_prefix),
            side_label(&delta.new_file, &options.new_prefix)
        ));
        return out;
    }

    out.push_str(OLD_FILE_PREFIX);
    out.push_str(&side_label(&delta.old_file, &options.old_prefix));
    out.push('\n');
    out.push_str(NEW_FILE_PREFIX);
    out.push_str(&side_label(&delta.new_file, &options.new_prefix));
    out.push('\n');
    out
}

fn side_label(file: &DiffFile, prefix: &str) -> String {
    match &file.path {
        Some(path) if file.mode != FILE_MODE_ABSENT => format!("{}{}", prefix, path),
        _ => NULL_PATH.to_string(),
    }
}

/// Byte length of one rendered body line: origin prefix plus content,
/// plus the no-newline marker when the line lacks its terminator.
pub(crate) fn rendered_line_len(line: &LineRecord) -> usize {
    let mut len = 1 + line.len;
    if line.origin.is_eofnl() {
        len += NO_EOFNL_MARKER.len();
    }
    len
}

/// Render the whole patch: file header, then each hunk header followed
/// by its prefixed lines. Byte-identical across calls for the same
/// patch.
pub(crate) fn patch_text(patch: &Patch) -> String {
    let mut out = String::with_capacity(patch.size(true, true, true));
    out.push_str(&delta_header_text(&patch.delta, &patch.format));

    for hunk in &patch.hunks {
        out.push_str(&hunk.header);
        for line in &patch.lines[hunk.line_start..hunk.line_start + hunk.num_lines] {
            if let Some(prefix) = line.origin.prefix() {
                out.push(prefix);
            }
            out.push_str(patch.content_of(line));
            if line.origin.is_eofnl() {
                out.push_str(NO_EOFNL_MARKER);
            }
        }
    }

    out
}

use crate::builder::PatchBuilder;
use crate::engine::{DiffEngine, DiffSink, HunkRange, LineRecord, SimilarEngine};
use crate::error::{Error, Result};
use crate::format;
use crate::types::{
    Blob, Delta, DeltaStatus, DiffFile, DiffList, DiffOptions, FormatOptions, Hunk, LineRef,
    LineStats, Origin, Side, FILE_MODE_ABSENT, FILE_MODE_BLOB,
};
use log::{debug, warn};

/// Content lookup boundary for [`Patch::from_delta`]: resolves the ids
/// recorded in a delta to raw bytes.
pub trait BlobStore {
    fn load(&self, id: &str) -> Result<Vec<u8>>;
}

/// Result of a construction entry point. Byte-identical and binary
/// inputs produce `Skipped` with the delta describing why; neither is
/// an error.
#[derive(Debug)]
pub enum PatchOutcome {
    Patch(Patch),
    Skipped(Delta),
}

impl PatchOutcome {
    pub fn delta(&self) -> &Delta {
        match self {
            PatchOutcome::Patch(patch) => patch.delta(),
            PatchOutcome::Skipped(delta) => delta,
        }
    }

    pub fn is_patch(&self) -> bool {
        matches!(self, PatchOutcome::Patch(_))
    }

    pub fn into_patch(self) -> Option<Patch> {
        match self {
            PatchOutcome::Patch(patch) => Some(patch),
            PatchOutcome::Skipped(_) => None,
        }
    }
}

/// The finalized, immutable computed diff for one delta: ordered hunks
/// and lines plus the retained source text both sides' line content
/// points into. All inspection is read-only; there is no mutating API.
#[derive(Debug)]
pub struct Patch {
    pub(crate) delta: Delta,
    pub(crate) old_data: String,
    pub(crate) new_data: String,
    pub(crate) hunks: Vec<Hunk>,
    pub(crate) lines: Vec<LineRecord>,
    pub(crate) format: FormatOptions,
}

// NUL-byte probe window, matching git's heuristic.
const BINARY_DETECT_LIMIT: usize = 8000;

fn is_binary(data: &[u8]) -> bool {
    let probe = &data[..data.len().min(BINARY_DETECT_LIMIT)];
    probe.contains(&0) || std::str::from_utf8(data).is_err()
}

fn into_text(data: Vec<u8>, force_text: bool) -> Result<String> {
    match String::from_utf8(data) {
        Ok(text) => Ok(text),
        Err(err) if force_text => {
            warn!("content is not valid UTF-8, diffing a lossy copy");
            Ok(String::from_utf8_lossy(err.as_bytes()).into_owned())
        }
        Err(_) => Err(Error::Engine("content is not valid text".to_string())),
    }
}

fn derive_delta(
    old_present: bool,
    old_path: Option<&str>,
    old_id: Option<String>,
    new_present: bool,
    new_path: Option<&str>,
    new_id: Option<String>,
    identical: bool,
) -> Delta {
    // An unnamed side borrows the other side's label, so a one-sided
    // comparison still renders with a usable path.
    let old_label = old_path.or(new_path);
    let new_label = new_path.or(old_path);

    let status = if !old_present && new_present {
        DeltaStatus::Added
    } else if old_present && !new_present {
        DeltaStatus::Deleted
    } else if old_label.is_some() && new_label.is_some() && old_label != new_label {
        DeltaStatus::Renamed
    } else if identical {
        DeltaStatus::Unmodified
    } else {
        DeltaStatus::Modified
    };

    Delta {
        old_file: DiffFile {
            path: old_label.map(str::to_string),
            id: old_id,
            mode: if old_present {
                FILE_MODE_BLOB
            } else {
                FILE_MODE_ABSENT
            },
        },
        new_file: DiffFile {
            path: new_label.map(str::to_string),
            id: new_id,
            mode: if new_present {
                FILE_MODE_BLOB
            } else {
                FILE_MODE_ABSENT
            },
        },
        status,
        binary: false,
    }
}

fn build_patch(
    mut delta: Delta,
    old_data: Vec<u8>,
    new_data: Vec<u8>,
    options: &DiffOptions,
    format: &FormatOptions,
) -> Result<PatchOutcome> {
    if !options.force_text && (delta.binary || is_binary(&old_data) || is_binary(&new_data)) {
        debug!("binary content, skipping patch construction");
        delta.binary = true;
        return Ok(PatchOutcome::Skipped(delta));
    }

    if old_data == new_data && !options.include_unmodified {
        debug!("sides are byte-identical, no patch");
        return Ok(PatchOutcome::Skipped(delta));
    }

    let old_text = into_text(old_data, options.force_text)?;
    let new_text = into_text(new_data, options.force_text)?;

    let engine = SimilarEngine::new(options);
    let patch = Patch::from_engine(delta, old_text, new_text, &engine, format)?;
    Ok(PatchOutcome::Patch(patch))
}

impl Patch {
    /// Raw construction pipeline: drive `engine` over the two texts and
    /// freeze its callbacks into a patch. The entry points below layer
    /// binary and identical-content handling on top of this.
    pub fn from_engine(
        delta: Delta,
        old_data: String,
        new_data: String,
        engine: &dyn DiffEngine,
        format: &FormatOptions,
    ) -> Result<Patch> {
        let mut builder = PatchBuilder::new();
        engine.run(&delta, &old_data, &new_data, &mut builder)?;
        builder.into_patch(old_data, new_data, format.clone())
    }

    /// Build the patch for one delta of a diff list, loading content
    /// through `store`. An index outside the list is `NotFound`.
    pub fn from_delta(
        list: &DiffList,
        store: &dyn BlobStore,
        index: usize,
        format: &FormatOptions,
    ) -> Result<PatchOutcome> {
        let delta = list
            .delta(index)
            .ok_or(Error::NotFound("delta index out of range"))?
            .clone();

        let old_data = match &delta.old_file.id {
            Some(id) => store.load(id)?,
            None => Vec::new(),
        };
        let new_data = match &delta.new_file.id {
            Some(id) => store.load(id)?,
            None => Vec::new(),
        };

        build_patch(delta, old_data, new_data, &list.options, format)
    }

    /// Build a patch directly from two blobs. Either side may be absent,
    /// meaning empty content; its path label is still honored.
    pub fn from_blobs(
        old_blob: Option<&Blob>,
        old_path: Option<&str>,
        new_blob: Option<&Blob>,
        new_path: Option<&str>,
        options: &DiffOptions,
        format: &FormatOptions,
    ) -> Result<PatchOutcome> {
        let old_data = old_blob.map(|b| b.data.clone()).unwrap_or_default();
        let new_data = new_blob.map(|b| b.data.clone()).unwrap_or_default();

        let delta = derive_delta(
            old_blob.is_some(),
            old_path,
            old_blob.and_then(|b| b.id.clone()),
            new_blob.is_some(),
            new_path,
            new_blob.and_then(|b| b.id.clone()),
            old_data == new_data,
        );

        build_patch(delta, old_data, new_data, options, format)
    }

    /// Build a patch from a stored blob and an in-memory buffer (for
    /// example, working-tree content that has no object id yet).
    pub fn from_blob_and_buffer(
        old_blob: Option<&Blob>,
        old_path: Option<&str>,
        buffer: Option<&[u8]>,
        buffer_path: Option<&str>,
        options: &DiffOptions,
        format: &FormatOptions,
    ) -> Result<PatchOutcome> {
        let old_data = old_blob.map(|b| b.data.clone()).unwrap_or_default();
        let new_data = buffer.map(|b| b.to_vec()).unwrap_or_default();

        let delta = derive_delta(
            old_blob.is_some(),
            old_path,
            old_blob.and_then(|b| b.id.clone()),
            buffer.is_some(),
            buffer_path,
            None,
            old_data == new_data,
        );

        build_patch(delta, old_data, new_data, options, format)
    }

    pub fn delta(&self) -> &Delta {
        &self.delta
    }

    pub fn num_hunks(&self) -> usize {
        self.hunks.len()
    }

    pub fn hunk(&self, index: usize) -> Result<&Hunk> {
        self.hunks
            .get(index)
            .ok_or(Error::NotFound("hunk index out of range"))
    }

    pub fn num_lines_in_hunk(&self, index: usize) -> Result<usize> {
        Ok(self.hunk(index)?.num_lines)
    }

    /// Look up one line of one hunk. Resolution is two direct index
    /// operations; hunks record their span into the flat line array.
    pub fn line_in_hunk(&self, hunk_index: usize, line_index: usize) -> Result<LineRef<'_>> {
        let hunk = self.hunk(hunk_index)?;
        if line_index >= hunk.num_lines {
            return Err(Error::NotFound("line index out of range"));
        }
        let line = &self.lines[hunk.line_start + line_index];
        Ok(LineRef {
            origin: line.origin,
            content: self.content_of(line),
            old_lineno: line.old_lineno,
            new_lineno: line.new_lineno,
        })
    }

    /// Per-category line counts across all hunks. EOFNL variants count
    /// toward their base category.
    pub fn line_stats(&self) -> LineStats {
        let mut stats = LineStats::default();
        for line in &self.lines {
            match line.origin {
                Origin::Context | Origin::ContextEofnl => stats.context += 1,
                Origin::Addition | Origin::AdditionEofnl => stats.additions += 1,
                Origin::Deletion | Origin::DeletionEofnl => stats.deletions += 1,
                _ => {}
            }
        }
        stats
    }

    /// Byte count of the rendered patch under the given inclusion
    /// policy. Addition and deletion lines always count;
    /// `size(true, true, true)` equals `to_text().len()` exactly.
    pub fn size(
        &self,
        include_context: bool,
        include_hunk_headers: bool,
        include_file_headers: bool,
    ) -> usize {
        let mut total = 0;

        if include_file_headers {
            total += format::delta_header_text(&self.delta, &self.format).len();
        }

        if include_hunk_headers {
            for hunk in &self.hunks {
                total += hunk.header.len();
            }
        }

        for line in &self.lines {
            let counted = match line.origin {
                Origin::Context | Origin::ContextEofnl => include_context,
                _ => true,
            };
            if counted {
                total += format::rendered_line_len(line);
            }
        }

        total
    }

    /// The complete unified-diff text for this patch.
    pub fn to_text(&self) -> String {
        format::patch_text(self)
    }

    /// Re-drive a sink with the stored file, hunk and line sequence, in
    /// the order the engine originally emitted it.
    pub fn replay(&self, sink: &mut dyn DiffSink) -> Result<()> {
        sink.on_file(&self.delta)?;
        for hunk in &self.hunks {
            sink.on_hunk(HunkRange {
                old_start: hunk.old_start,
                old_lines: hunk.old_lines,
                new_start: hunk.new_start,
                new_lines: hunk.new_lines,
            })?;
            for line in &self.lines[hunk.line_start..hunk.line_start + hunk.num_lines] {
                sink.on_line(*line)?;
            }
        }
        Ok(())
    }

    /// The retained old-side content.
    pub fn old_content(&self) -> &str {
        &self.old_data
    }

    /// The retained new-side content.
    pub fn new_content(&self) -> &str {
        &self.new_data
    }

    pub(crate) fn content_of(&self, line: &LineRecord) -> &str {
        let buffer = match line.side {
            Side::Old => &self.old_data,
            Side::New => &self.new_data,
        };
        &buffer[line.offset..line.offset + line.len]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    struct MapStore(HashMap<String, Vec<u8>>);

    impl BlobStore for MapStore {
        fn load(&self, id: &str) -> Result<Vec<u8>> {
            self.0
                .get(id)
                .cloned()
                .ok_or_else(|| Error::Store(format!("no blob with id {}", id)))
        }
    }

    fn patch_between(old: &str, new: &str) -> Patch {
        let old_blob = Blob::new(old.as_bytes().to_vec());
        let new_blob = Blob::new(new.as_bytes().to_vec());
        Patch::from_blobs(
            Some(&old_blob),
            Some("file.txt"),
            Some(&new_blob),
            Some("file.txt"),
            &DiffOptions::default(),
            &FormatOptions::default(),
        )
        .unwrap()
        .into_patch()
        .unwrap()
    }

    #[test]
    fn test_single_hunk_replacement_fields() {
        let patch = patch_between("a\nb\nc\n", "a\nX\nc\n");

        assert_eq!(patch.num_hunks(), 1);
        let hunk = patch.hunk(0).unwrap();
        assert_eq!(hunk.old_start, 1);
        assert_eq!(hunk.old_lines, 3);
        assert_eq!(hunk.new_start, 1);
        assert_eq!(hunk.new_lines, 3);
        assert_eq!(hunk.num_lines, 4);

        let expected = [
            (Origin::Context, "a\n"),
            (Origin::Deletion, "b\n"),
            (Origin::Addition, "X\n"),
            (Origin::Context, "c\n"),
        ];
        for (i, (origin, content)) in expected.iter().enumerate() {
            let line = patch.line_in_hunk(0, i).unwrap();
            assert_eq!(line.origin, *origin);
            assert_eq!(line.content, *content);
        }
    }

    #[test]
    fn test_full_text_for_single_hunk() {
        let patch = patch_between("a\nb\nc\n", "a\nX\nc\n");
        assert_eq!(
            patch.to_text(),
            "--- a/file.txt\n\
             +++ b/file.txt\n\
             @@ -1,3 +1,3 @@\n\
             \x20a\n\
             -b\n\
             +X\n\
             \x20c\n"
        );
    }

    #[test]
    fn test_addition_into_empty_old_side() {
        let new_blob = Blob::new(b"hello\n".to_vec());
        let outcome = Patch::from_blobs(
            None,
            None,
            Some(&new_blob),
            Some("hello.txt"),
            &DiffOptions::default(),
            &FormatOptions::default(),
        )
        .unwrap();

        assert_eq!(outcome.delta().status, DeltaStatus::Added);
        let patch = outcome.into_patch().unwrap();

        let hunk = patch.hunk(0).unwrap();
        assert_eq!(hunk.old_start, 0);
        assert_eq!(hunk.old_lines, 0);
        assert_eq!(hunk.new_start, 1);
        assert_eq!(hunk.new_lines, 1);

        let line = patch.line_in_hunk(0, 0).unwrap();
        assert_eq!(line.origin, Origin::Addition);
        assert_eq!(line.content, "hello\n");
        assert_eq!(line.old_lineno, None);
        assert_eq!(line.new_lineno, Some(1));

        assert_eq!(
            patch.to_text(),
            "--- /dev/null\n+++ b/hello.txt\n@@ -0,0 +1 @@\n+hello\n"
        );
    }

    #[test]
    fn test_identical_content_yields_no_patch() {
        let blob = Blob::new(b"same\n".to_vec());
        let outcome = Patch::from_blobs(
            Some(&blob),
            Some("f"),
            Some(&blob),
            Some("f"),
            &DiffOptions::default(),
            &FormatOptions::default(),
        )
        .unwrap();

        assert!(!outcome.is_patch());
        assert_eq!(outcome.delta().status, DeltaStatus::Unmodified);
        assert!(!outcome.delta().binary);
    }

    #[test]
    fn test_include_unmodified_forces_empty_patch() {
        let blob = Blob::new(b"same\n".to_vec());
        let options = DiffOptions {
            include_unmodified: true,
            ..Default::default()
        };
        let outcome = Patch::from_blobs(
            Some(&blob),
            Some("f"),
            Some(&blob),
            Some("f"),
            &options,
            &FormatOptions::default(),
        )
        .unwrap();

        let patch = outcome.into_patch().unwrap();
        assert_eq!(patch.num_hunks(), 0);
        assert_eq!(patch.to_text(), "--- a/f\n+++ b/f\n");
    }

    #[test]
    fn test_binary_content_yields_no_patch() {
        let old_blob = Blob::new(vec![0, 1, 2, 3]);
        let new_blob = Blob::new(vec![4, 5, 6]);
        let outcome = Patch::from_blobs(
            Some(&old_blob),
            Some("blob.bin"),
            Some(&new_blob),
            Some("blob.bin"),
            &DiffOptions::default(),
            &FormatOptions::default(),
        )
        .unwrap();

        assert!(!outcome.is_patch());
        assert!(outcome.delta().binary);

        let notice = format::delta_header_text(outcome.delta(), &FormatOptions::default());
        assert_eq!(notice, "Binary files a/blob.bin and b/blob.bin differ\n");
    }

    #[test]
    fn test_force_text_diffs_binary_content() {
        let old_blob = Blob::new(b"a\0b\n".to_vec());
        let new_blob = Blob::new(b"a\0c\n".to_vec());
        let options = DiffOptions {
            force_text: true,
            ..Default::default()
        };
        let outcome = Patch::from_blobs(
            Some(&old_blob),
            Some("f"),
            Some(&new_blob),
            Some("f"),
            &options,
            &FormatOptions::default(),
        )
        .unwrap();

        let patch = outcome.into_patch().unwrap();
        assert!(!patch.delta().binary);
        assert_eq!(patch.num_hunks(), 1);
    }

    #[test]
    fn test_accessor_bounds() {
        let patch = patch_between("a\nb\nc\n", "a\nX\nc\n");

        assert!(matches!(patch.hunk(1), Err(Error::NotFound(_))));
        assert!(matches!(
            patch.num_lines_in_hunk(1),
            Err(Error::NotFound(_))
        ));
        assert!(matches!(
            patch.line_in_hunk(0, 4),
            Err(Error::NotFound(_))
        ));
        assert!(matches!(
            patch.line_in_hunk(1, 0),
            Err(Error::NotFound(_))
        ));
    }

    #[test]
    fn test_line_stats_account_for_every_line() {
        let old: String = (1..=20).map(|i| format!("l{}\n", i)).collect();
        let new = old.replace("l3\n", "X\n").replace("l17\n", "Y\nZ\n");
        let patch = patch_between(&old, &new);

        let stats = patch.line_stats();
        let mut total_lines = 0;
        for i in 0..patch.num_hunks() {
            total_lines += patch.num_lines_in_hunk(i).unwrap();
        }
        assert_eq!(stats.context + stats.additions + stats.deletions, total_lines);
        assert_eq!(stats.deletions, 2);
        assert_eq!(stats.additions, 3);
    }

    #[test]
    fn test_size_matches_rendered_text() {
        let patch = patch_between("a\nb\nc\n", "a\nX\nc\n");

        assert_eq!(patch.size(true, true, true), patch.to_text().len());
        assert!(patch.size(true, true, true) >= patch.size(false, false, false));

        // The difference is exactly the excluded header and context
        // bytes.
        let header_len = format::delta_header_text(patch.delta(), &FormatOptions::default()).len();
        let hunk_header_len: usize = (0..patch.num_hunks())
            .map(|i| patch.hunk(i).unwrap().header.len())
            .sum();
        let context_len: usize = (0..patch.num_hunks())
            .flat_map(|i| {
                (0..patch.num_lines_in_hunk(i).unwrap()).map(move |j| (i, j))
            })
            .filter_map(|(i, j)| {
                let line = patch.line_in_hunk(i, j).unwrap();
                match line.origin {
                    Origin::Context | Origin::ContextEofnl => Some(line.content.len() + 1),
                    _ => None,
                }
            })
            .sum();

        assert_eq!(
            patch.size(true, true, true) - patch.size(false, false, false),
            header_len + hunk_header_len + context_len
        );
    }

    #[test]
    fn test_from_delta_loads_through_store() {
        let mut blobs = HashMap::new();
        blobs.insert("id-old".to_string(), b"a\nb\n".to_vec());
        blobs.insert("id-new".to_string(), b"a\nc\n".to_vec());
        let store = MapStore(blobs);

        let mut list = DiffList::new(DiffOptions::default());
        list.push(Delta {
            old_file: DiffFile {
                path: Some("f".to_string()),
                id: Some("id-old".to_string()),
                mode: FILE_MODE_BLOB,
            },
            new_file: DiffFile {
                path: Some("f".to_string()),
                id: Some("id-new".to_string()),
                mode: FILE_MODE_BLOB,
            },
            status: DeltaStatus::Modified,
            binary: false,
        });

        let outcome =
            Patch::from_delta(&list, &store, 0, &FormatOptions::default()).unwrap();
        let patch = outcome.into_patch().unwrap();
        assert_eq!(patch.num_hunks(), 1);
        let stats = patch.line_stats();
        assert_eq!(stats.additions, 1);
        assert_eq!(stats.deletions, 1);
    }

    #[test]
    fn test_from_delta_index_out_of_range() {
        let list = DiffList::new(DiffOptions::default());
        let store = MapStore(HashMap::new());
        let result = Patch::from_delta(&list, &store, 0, &FormatOptions::default());
        assert!(matches!(result, Err(Error::NotFound(_))));
    }

    #[test]
    fn test_from_delta_missing_blob_is_store_error() {
        let store = MapStore(HashMap::new());
        let mut list = DiffList::new(DiffOptions::default());
        list.push(Delta {
            old_file: DiffFile {
                path: Some("f".to_string()),
                id: Some("gone".to_string()),
                mode: FILE_MODE_BLOB,
            },
            new_file: DiffFile {
                path: Some("f".to_string()),
                id: None,
                mode: FILE_MODE_ABSENT,
            },
            status: DeltaStatus::Deleted,
            binary: false,
        });

        let result = Patch::from_delta(&list, &store, 0, &FormatOptions::default());
        assert!(matches!(result, Err(Error::Store(_))));
    }

    #[test]
    fn test_from_blob_and_buffer() {
        let old_blob = Blob::with_id("id-old", b"x\n".to_vec());
        let outcome = Patch::from_blob_and_buffer(
            Some(&old_blob),
            Some("f"),
            Some(b"y\n".as_slice()),
            Some("f"),
            &DiffOptions::default(),
            &FormatOptions::default(),
        )
        .unwrap();

        let patch = outcome.into_patch().unwrap();
        let stats = patch.line_stats();
        assert_eq!(stats.additions, 1);
        assert_eq!(stats.deletions, 1);
    }

    #[test]
    fn test_rename_status_from_differing_paths() {
        let old_blob = Blob::new(b"a\n".to_vec());
        let new_blob = Blob::new(b"a\n".to_vec());
        let outcome = Patch::from_blobs(
            Some(&old_blob),
            Some("old.txt"),
            Some(&new_blob),
            Some("new.txt"),
            &DiffOptions::default(),
            &FormatOptions::default(),
        )
        .unwrap();

        // Identical content, differing labels: a pure rename with no
        // textual patch.
        assert!(!outcome.is_patch());
        assert_eq!(outcome.delta().status, DeltaStatus::Renamed);
    }

    #[test]
    fn test_engine_failure_aborts_construction() {
        struct BrokenEngine;

        impl DiffEngine for BrokenEngine {
            fn run(
                &self,
                delta: &Delta,
                _old: &str,
                _new: &str,
                sink: &mut dyn DiffSink,
            ) -> Result<()> {
                sink.on_file(delta)?;
                Err(Error::Engine("engine gave up".to_string()))
            }
        }

        let delta = derive_delta(true, Some("f"), None, true, Some("f"), None, false);
        let result = Patch::from_engine(
            delta,
            "a\n".to_string(),
            "b\n".to_string(),
            &BrokenEngine,
            &FormatOptions::default(),
        );
        assert!(matches!(result, Err(Error::Engine(_))));
    }

    #[test]
    fn test_replay_rebuilds_an_identical_patch() {
        let patch = patch_between("a\nb\nc\n", "a\nX\nc\n");

        let mut builder = PatchBuilder::new();
        patch.replay(&mut builder).unwrap();
        let rebuilt = builder
            .into_patch(
                patch.old_content().to_string(),
                patch.new_content().to_string(),
                FormatOptions::default(),
            )
            .unwrap();

        assert_eq!(rebuilt.num_hunks(), patch.num_hunks());
        assert_eq!(rebuilt.to_text(), patch.to_text());
    }

    #[test]
    fn test_out_of_order_engine_is_protocol_violation() {
        struct LinesFirstEngine;

        impl DiffEngine for LinesFirstEngine {
            fn run(
                &self,
                delta: &Delta,
                _old: &str,
                _new: &str,
                sink: &mut dyn DiffSink,
            ) -> Result<()> {
                sink.on_file(delta)?;
                sink.on_line(LineRecord {
                    origin: Origin::Addition,
                    side: Side::New,
                    offset: 0,
                    len: 2,
                    old_lineno: None,
                    new_lineno: Some(1),
                })?;
                Ok(())
            }
        }

        let delta = derive_delta(true, Some("f"), None, true, Some("f"), None, false);
        let result = Patch::from_engine(
            delta,
            "a\n".to_string(),
            "b\n".to_string(),
            &LinesFirstEngine,
            &FormatOptions::default(),
        );
        assert!(matches!(result, Err(Error::Protocol(_))));
    }
}

//! Source text storage and buffer-identity bookkeeping.
//!
//! Mirrors slang's `SourceManager`/`BufferID` split: every parsed text blob
//! (a file, or an overlay's in-memory buffer) gets its own [`BufferId`], and
//! byte offsets are only ever meaningful relative to the buffer they came
//! from. Two `SourceManager`s never share `BufferId`s, which is exactly the
//! property the preamble/overlay split in `services` depends on.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};

/// Opaque identifier for a parsed text buffer, unique within the
/// `SourceManager` that minted it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BufferId(u32);

static NEXT_BUFFER_ID: AtomicU32 = AtomicU32::new(1);

impl BufferId {
    pub(crate) fn fresh() -> Self {
        Self(NEXT_BUFFER_ID.fetch_add(1, Ordering::Relaxed))
    }
}

/// A half-open byte range `[start, end)` within a single buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Span {
    pub buffer: BufferId,
    pub start: u32,
    pub end: u32,
}

impl Span {
    pub fn new(buffer: BufferId, start: u32, end: u32) -> Self {
        Self { buffer, start, end }
    }

    pub fn len(&self) -> u32 {
        self.end.saturating_sub(self.start)
    }

    pub fn is_empty(&self) -> bool {
        self.end <= self.start
    }

    /// Smaller spans sort "inside" larger ones; used to break ties when
    /// several semantic entries' ranges contain the same position.
    pub fn contains_offset(&self, offset: u32) -> bool {
        offset >= self.start && offset < self.end
    }
}

/// Zero-based line/character position (UTF-16 code units, matching LSP).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct LineCol {
    pub line: u32,
    pub character: u32,
}

struct Buffer {
    path: PathBuf,
    text: String,
    /// Byte offset of the start of each line, for O(log n) offset->line/col.
    line_starts: Vec<u32>,
}

fn compute_line_starts(text: &str) -> Vec<u32> {
    let mut starts = vec![0u32];
    for (i, b) in text.bytes().enumerate() {
        if b == b'\n' {
            starts.push((i + 1) as u32);
        }
    }
    starts
}

/// Owns the text of every buffer parsed into one compilation. Each
/// `PreambleManager` and each `OverlaySession` owns exactly one of these;
/// they are never shared or mutated concurrently.
#[derive(Default)]
pub struct SourceManager {
    buffers: HashMap<BufferId, Buffer>,
    by_path: HashMap<PathBuf, BufferId>,
}

impl SourceManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Assign fresh text to `path`, returning its `BufferId`. If `path` was
    /// already loaded the old buffer is replaced (used by overlay rebuilds).
    pub fn add_buffer(&mut self, path: PathBuf, text: String) -> BufferId {
        let id = BufferId::fresh();
        let line_starts = compute_line_starts(&text);
        self.buffers.insert(
            id,
            Buffer {
                path: path.clone(),
                text,
                line_starts,
            },
        );
        self.by_path.insert(path, id);
        id
    }

    pub fn text(&self, buffer: BufferId) -> &str {
        self.buffers
            .get(&buffer)
            .map(|b| b.text.as_str())
            .unwrap_or("")
    }

    pub fn path(&self, buffer: BufferId) -> Option<&Path> {
        self.buffers.get(&buffer).map(|b| b.path.as_path())
    }

    pub fn buffer_for_path(&self, path: &Path) -> Option<BufferId> {
        self.by_path.get(path).copied()
    }

    /// Convert a byte offset within `buffer` to a zero-based line/character
    /// position. UTF-16 code units are used for `character` per the LSP
    /// spec; SystemVerilog source is expected to be ASCII-dominant so this
    /// rarely differs from a UTF-8 count, but we count correctly regardless.
    pub fn line_col(&self, buffer: BufferId, offset: u32) -> LineCol {
        let Some(buf) = self.buffers.get(&buffer) else {
            return LineCol {
                line: 0,
                character: 0,
            };
        };
        let line_idx = match buf.line_starts.binary_search(&offset) {
            Ok(i) => i,
            Err(i) => i.saturating_sub(1),
        };
        let line_start = buf.line_starts[line_idx];
        let line_text_start = line_start as usize;
        let line_text_end = offset as usize;
        let character = buf
            .text
            .get(line_text_start..line_text_end)
            .map(|s| s.encode_utf16().count() as u32)
            .unwrap_or(0);
        LineCol {
            line: line_idx as u32,
            character,
        }
    }

    pub fn span_line_col(&self, span: Span) -> (LineCol, LineCol) {
        (
            self.line_col(span.buffer, span.start),
            self.line_col(span.buffer, span.end),
        )
    }
}

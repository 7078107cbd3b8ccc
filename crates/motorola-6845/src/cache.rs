//! Per-scanline line cache.
//!
//! Each visible scanline remembers the foreground bytes and polarity it was
//! last drawn with. A redraw compares the fresh bytes against that copy and
//! only repaints the changed column span.

use crate::registers::{MAX_COLUMNS, Polarity};

/// Foreground byte shown in cells past the displayed columns.
pub const IDLE_PATTERN: u8 = 0x00;

/// Inclusive range of changed columns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColumnSpan {
    pub first: usize,
    pub last: usize,
}

impl ColumnSpan {
    fn whole(width: usize) -> Option<Self> {
        (width > 0).then(|| Self {
            first: 0,
            last: width - 1,
        })
    }

    fn include(span: Option<Self>, column: usize) -> Option<Self> {
        Some(match span {
            None => Self {
                first: column,
                last: column,
            },
            Some(s) => Self {
                first: s.first.min(column),
                last: s.last.max(column),
            },
        })
    }
}

/// Cached content of one scanline.
#[derive(Debug, Clone)]
pub struct LineCacheEntry {
    fgdata: [u8; MAX_COLUMNS],
    mode: Polarity,
    is_dirty: bool,
    span: Option<ColumnSpan>,
}

impl Default for LineCacheEntry {
    fn default() -> Self {
        Self::new()
    }
}

impl LineCacheEntry {
    /// A fresh entry is dirty: nothing has been drawn yet.
    #[must_use]
    pub fn new() -> Self {
        Self {
            fgdata: [IDLE_PATTERN; MAX_COLUMNS],
            mode: Polarity::Standard,
            is_dirty: true,
            span: None,
        }
    }

    /// Compare `source` and `mode` against the stored copy and update it.
    ///
    /// `source` holds the displayed columns; columns from `source.len()` up to
    /// `width` are idle. Returns whether anything visible changed, and records
    /// the changed span for [`dirty_span`](Self::dirty_span).
    pub fn fill_cache(&mut self, source: &[u8], width: usize, mode: Polarity) -> bool {
        let width = width.min(MAX_COLUMNS);
        let mut span = None;
        for column in 0..width {
            let byte = source.get(column).copied().unwrap_or(IDLE_PATTERN);
            if self.fgdata[column] != byte {
                self.fgdata[column] = byte;
                span = ColumnSpan::include(span, column);
            }
        }
        if mode != self.mode {
            self.mode = mode;
            span = ColumnSpan::whole(width);
        }
        self.span = span;
        span.is_some()
    }

    /// Store `source` without comparing; the whole line counts as changed.
    pub fn refill(&mut self, source: &[u8], width: usize, mode: Polarity) {
        let width = width.min(MAX_COLUMNS);
        for (column, slot) in self.fgdata[..width].iter_mut().enumerate() {
            *slot = source.get(column).copied().unwrap_or(IDLE_PATTERN);
        }
        self.mode = mode;
        self.span = ColumnSpan::whole(width);
    }

    #[must_use]
    pub fn is_dirty(&self) -> bool {
        self.is_dirty
    }

    pub fn mark_dirty(&mut self) {
        self.is_dirty = true;
    }

    /// The line on screen now matches the stored copy.
    pub fn mark_clean(&mut self) {
        self.is_dirty = false;
    }

    /// Columns changed by the last fill.
    #[must_use]
    pub fn dirty_span(&self) -> Option<ColumnSpan> {
        self.span
    }

    #[must_use]
    pub fn fgdata(&self) -> &[u8; MAX_COLUMNS] {
        &self.fgdata
    }

    #[must_use]
    pub fn mode(&self) -> Polarity {
        self.mode
    }
}

/// One entry per visible scanline.
#[derive(Debug, Clone, Default)]
pub struct LineCache {
    entries: Vec<LineCacheEntry>,
}

impl LineCache {
    #[must_use]
    pub fn new(lines: usize) -> Self {
        Self {
            entries: vec![LineCacheEntry::new(); lines],
        }
    }

    /// Resize for a new geometry. Every entry comes back dirty.
    pub fn reset(&mut self, lines: usize) {
        self.entries.clear();
        self.entries.resize(lines, LineCacheEntry::new());
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn invalidate_all(&mut self) {
        for entry in &mut self.entries {
            entry.mark_dirty();
        }
    }

    /// Mark lines `first..=last`, clipped to the cache height.
    pub fn mark_dirty(&mut self, first: usize, last: usize) {
        let end = (last + 1).min(self.entries.len());
        if first < end {
            for entry in &mut self.entries[first..end] {
                entry.mark_dirty();
            }
        }
    }

    #[must_use]
    pub fn entry(&self, line: usize) -> Option<&LineCacheEntry> {
        self.entries.get(line)
    }

    pub fn entry_mut(&mut self, line: usize) -> Option<&mut LineCacheEntry> {
        self.entries.get_mut(line)
    }

    /// Lines past the cache count as dirty.
    #[must_use]
    pub fn is_dirty(&self, line: usize) -> bool {
        self.entries.get(line).is_none_or(LineCacheEntry::is_dirty)
    }
}

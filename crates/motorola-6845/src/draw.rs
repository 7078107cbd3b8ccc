//! Scanline renderers.
//!
//! A character byte becomes pixels through lookup tables: in 1x mode two
//! tables of four pixels (bits 7-4 and 3-0), in 2x mode four tables of four
//! pixels (two bits each, doubled). The draw variant is chosen when the
//! geometry or polarity changes, not per line.
//!
//! Per cell, the cursor XOR is applied first and the reverse-video XOR
//! second. Cells past the displayed columns always show the idle pattern.
//! The full and the cached renderer share that rule, so their output is
//! identical for any column range.

use crate::cache::{ColumnSpan, IDLE_PATTERN, LineCacheEntry};
use crate::palette::Palette;
use crate::registers::Polarity;

/// Pixels per character cell at 1x.
pub const CELL_PIXELS: usize = 8;

/// Selected draw routine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrawMode {
    Standard1x,
    Standard2x,
    Reverse1x,
    Reverse2x,
}

impl DrawMode {
    #[must_use]
    pub fn select(polarity: Polarity, double_width: bool) -> Self {
        match (polarity, double_width) {
            (Polarity::Standard, false) => Self::Standard1x,
            (Polarity::Standard, true) => Self::Standard2x,
            (Polarity::Reverse, false) => Self::Reverse1x,
            (Polarity::Reverse, true) => Self::Reverse2x,
        }
    }

    #[must_use]
    pub fn polarity(self) -> Polarity {
        match self {
            Self::Standard1x | Self::Standard2x => Polarity::Standard,
            Self::Reverse1x | Self::Reverse2x => Polarity::Reverse,
        }
    }

    /// Horizontal pixel scale.
    #[must_use]
    pub fn scale(self) -> usize {
        match self {
            Self::Standard1x | Self::Reverse1x => 1,
            Self::Standard2x | Self::Reverse2x => 2,
        }
    }

    /// Draw every column of a line.
    ///
    /// `cells` holds the character generator bytes of the displayed columns.
    pub fn draw_line(self, tables: &DrawTables, row: &mut [u32], line: &LineContext, cells: &[u8]) {
        for column in 0..line.width {
            let byte = cells.get(column).copied().unwrap_or(IDLE_PATTERN);
            self.put_cell(tables, row, column, self.cell_byte(line, column, byte));
        }
    }

    /// Redraw only `span`, from the bytes stored in `entry`.
    pub fn draw_line_cached(
        self,
        tables: &DrawTables,
        row: &mut [u32],
        line: &LineContext,
        entry: &LineCacheEntry,
        span: ColumnSpan,
    ) {
        let last = span.last.min(line.width.saturating_sub(1));
        for column in span.first..=last {
            let byte = entry.fgdata()[column];
            self.put_cell(tables, row, column, self.cell_byte(line, column, byte));
        }
    }

    fn cell_byte(self, line: &LineContext, column: usize, byte: u8) -> u8 {
        if column >= line.visible {
            return IDLE_PATTERN;
        }
        let mut d = byte;
        if line.cursor_column == Some(column) {
            d ^= 0xFF;
        }
        if self.polarity() == Polarity::Reverse {
            d ^= 0xFF;
        }
        d
    }

    fn put_cell(self, tables: &DrawTables, row: &mut [u32], column: usize, d: u8) {
        let d = usize::from(d);
        match self.scale() {
            1 => {
                let p = column * CELL_PIXELS;
                row[p..p + 4].copy_from_slice(&tables.single[0][d]);
                row[p + 4..p + 8].copy_from_slice(&tables.single[1][d]);
            }
            _ => {
                let p = column * CELL_PIXELS * 2;
                for (group, table) in tables.double.iter().enumerate() {
                    let q = p + group * 4;
                    row[q..q + 4].copy_from_slice(&table[d]);
                }
            }
        }
    }
}

/// What the renderer needs to know about the line being drawn.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LineContext {
    /// Displayed columns.
    pub visible: usize,
    /// Line width in cells, including idle trailing cells.
    pub width: usize,
    /// Cell showing the cursor on this scanline.
    pub cursor_column: Option<usize>,
}

/// Byte-to-pixel lookup tables for the current palette.
#[derive(Debug, Clone)]
pub struct DrawTables {
    /// Bits 7-4 and 3-0, one pixel per bit.
    single: [[[u32; 4]; 256]; 2],
    /// Bits 7-6, 5-4, 3-2 and 1-0, two pixels per bit.
    double: [[[u32; 4]; 256]; 4],
}

impl DrawTables {
    #[must_use]
    pub fn new(palette: &Palette) -> Box<Self> {
        let colour = |set: bool| {
            if set {
                palette.foreground()
            } else {
                palette.background()
            }
        };

        let mut tables = Box::new(Self {
            single: [[[0; 4]; 256]; 2],
            double: [[[0; 4]; 256]; 4],
        });
        for byte in 0..256usize {
            for pixel in 0..8 {
                let set = byte & (0x80 >> pixel) != 0;
                tables.single[pixel / 4][byte][pixel % 4] = colour(set);

                let group = pixel / 2;
                let first = (pixel % 2) * 2;
                tables.double[group][byte][first] = colour(set);
                tables.double[group][byte][first + 1] = colour(set);
            }
        }
        tables
    }

    /// Colour used for blank areas.
    #[must_use]
    pub fn background(&self) -> u32 {
        self.single[0][0][0]
    }
}

//! Monochrome monitor palettes.
//!
//! Entry 0 is the background, entry 1 the foreground. Colours are ARGB32
//! with full alpha, matching the frame buffer.
//!
//! Palette files use one colour per line, `RR GG BB D` in hex, where the
//! optional fourth column is a dither hint and is ignored. `#` starts a
//! comment.

use std::fs;
use std::path::Path;

use crate::error::PaletteError;

/// Entries a CRTC palette must provide.
pub const PALETTE_ENTRIES: usize = 2;

#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Palette {
    entries: Vec<u32>,
}

impl Default for Palette {
    fn default() -> Self {
        Self::green()
    }
}

impl Palette {
    #[must_use]
    pub fn new(background: u32, foreground: u32) -> Self {
        Self::from_entries(vec![background, foreground])
    }

    /// Green phosphor.
    #[must_use]
    pub fn green() -> Self {
        Self::from_entries(vec![0xFF00_0000, 0xFF41_FF00])
    }

    /// Amber phosphor.
    #[must_use]
    pub fn amber() -> Self {
        Self::from_entries(vec![0xFF00_0000, 0xFFFF_B000])
    }

    /// White phosphor.
    #[must_use]
    pub fn white() -> Self {
        Self::from_entries(vec![0xFF00_0000, 0xFFE0_E0E0])
    }

    pub(crate) fn from_entries(entries: Vec<u32>) -> Self {
        Self { entries }
    }

    /// Parse palette file contents.
    pub fn parse(text: &str) -> Result<Self, PaletteError> {
        let mut entries = Vec::new();
        for (index, raw) in text.lines().enumerate() {
            let line = raw.split('#').next().unwrap_or_default().trim();
            if line.is_empty() {
                continue;
            }
            let fields: Vec<&str> = line.split_whitespace().collect();
            if !(3..=4).contains(&fields.len()) {
                return Err(PaletteError::Syntax {
                    line: index + 1,
                    reason: format!("expected 3 or 4 fields, found {}", fields.len()),
                });
            }
            let mut colour = 0xFF00_0000u32;
            for (shift, field) in [16, 8, 0].into_iter().zip(&fields) {
                let component = u8::from_str_radix(field, 16).map_err(|e| PaletteError::Syntax {
                    line: index + 1,
                    reason: format!("bad colour component {field:?}: {e}"),
                })?;
                colour |= u32::from(component) << shift;
            }
            entries.push(colour);
        }

        if entries.len() < PALETTE_ENTRIES {
            return Err(PaletteError::TooFewEntries {
                found: entries.len(),
                required: PALETTE_ENTRIES,
            });
        }
        Ok(Self { entries })
    }

    pub fn load(path: &Path) -> Result<Self, PaletteError> {
        let text = fs::read_to_string(path)?;
        Self::parse(&text)
    }

    #[must_use]
    pub fn background(&self) -> u32 {
        self.entries.first().copied().unwrap_or(0xFF00_0000)
    }

    #[must_use]
    pub fn foreground(&self) -> u32 {
        self.entries.get(1).copied().unwrap_or(0xFFFF_FFFF)
    }

    #[must_use]
    pub fn entries(&self) -> &[u32] {
        &self.entries
    }

    /// Whether the palette has the entries the controller draws with.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.entries.len() >= PALETTE_ENTRIES
    }
}

//! Controller configuration.

use emu_core::InterruptKind;

use crate::error::{ConfigError, PaletteError};
use crate::palette::{PALETTE_ENTRIES, Palette};
use crate::registers::{MAX_COLUMNS, Wiring};

/// Board wiring and presentation options for creating a [`Crtc`](crate::Crtc).
///
/// The default is a 40-column PET: 1K of screen memory, cursor pins
/// connected, R12 bit 5 selecting the graphics charset and R12 bit 4
/// selecting normal video.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct CrtcConfig {
    /// Frame buffer line width in characters.
    pub columns: usize,
    /// Valid screen address bits. Addresses wrap within this mask.
    pub address_mask: u16,
    pub hardware_cursor: bool,
    /// Each CRTC character fetch yields two screen characters (80-column boards).
    pub double_columns: bool,
    /// Screen address bit selecting the alternate charset.
    pub charset_switch: u16,
    /// Distance to the alternate charset, in characters.
    pub charset_offset: u16,
    /// Screen address bit selecting normal video. `None` means always normal.
    pub reverse_switch: Option<u16>,
    pub double_size: bool,
    pub double_scan: bool,
    pub video_cache: bool,
    /// CPU input driven by the frame-boundary line.
    pub frame_interrupt: InterruptKind,
    pub palette: Palette,
}

impl Default for CrtcConfig {
    fn default() -> Self {
        Self {
            columns: 40,
            address_mask: 0x03FF,
            hardware_cursor: true,
            double_columns: false,
            charset_switch: 0x2000,
            charset_offset: 256,
            reverse_switch: Some(0x1000),
            double_size: false,
            double_scan: true,
            video_cache: true,
            frame_interrupt: InterruptKind::Irq,
            palette: Palette::default(),
        }
    }
}

impl CrtcConfig {
    /// 80-column boards: 2K of screen memory, two characters per fetch.
    #[must_use]
    pub fn eighty_columns() -> Self {
        Self {
            columns: 80,
            address_mask: 0x07FF,
            double_columns: true,
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_columns(self.columns)?;
        if !self.palette.is_complete() {
            return Err(ConfigError::Palette(PaletteError::TooFewEntries {
                found: self.palette.entries().len(),
                required: PALETTE_ENTRIES,
            }));
        }
        Ok(())
    }

    pub(crate) fn wiring(&self) -> Wiring {
        Wiring {
            address_mask: self.address_mask,
            line_columns: self.columns,
            hardware_cursor: self.hardware_cursor,
            double_columns: self.double_columns,
            charset_switch: self.charset_switch,
            charset_offset: self.charset_offset,
            reverse_switch: self.reverse_switch,
            chargen_bank: 0,
        }
    }
}

pub(crate) fn validate_columns(columns: usize) -> Result<(), ConfigError> {
    if (1..=MAX_COLUMNS).contains(&columns) {
        Ok(())
    } else {
        Err(ConfigError::Columns {
            requested: columns,
            max: MAX_COLUMNS,
        })
    }
}

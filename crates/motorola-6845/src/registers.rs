//! Register file decode.
//!
//! Every write stores the raw byte and then re-derives all dependent fields
//! from the whole file. The screen address alone spans R12/R13, and the
//! charset and polarity switches live in its upper bits, so incremental
//! updates would miss cross-register effects.

use crate::cursor::CursorMode;

/// Number of registers, R0-R19.
pub const NUM_REGISTERS: usize = 20;

/// Widest line the chip model displays, in character cells.
pub const MAX_COLUMNS: usize = 80;

/// Tallest character cell, in scanlines.
pub const MAX_CHAR_HEIGHT: u8 = 16;

pub const R_HORIZONTAL_TOTAL: u8 = 0;
pub const R_HORIZONTAL_DISPLAYED: u8 = 1;
pub const R_HSYNC_POSITION: u8 = 2;
pub const R_SYNC_WIDTH: u8 = 3;
pub const R_VERTICAL_TOTAL: u8 = 4;
pub const R_VERTICAL_ADJUST: u8 = 5;
pub const R_VERTICAL_DISPLAYED: u8 = 6;
pub const R_VSYNC_POSITION: u8 = 7;
pub const R_MODE_CONTROL: u8 = 8;
pub const R_MAX_SCANLINE: u8 = 9;
pub const R_CURSOR_START: u8 = 10;
pub const R_CURSOR_END: u8 = 11;
pub const R_START_ADDRESS_HI: u8 = 12;
pub const R_START_ADDRESS_LO: u8 = 13;
pub const R_CURSOR_HI: u8 = 14;
pub const R_CURSOR_LO: u8 = 15;
pub const R_LIGHT_PEN_HI: u8 = 16;
pub const R_LIGHT_PEN_LO: u8 = 17;

/// Register contents at power-up.
///
/// 50 cycles per line, 40x25 characters of 8 scanlines, 31 rows per frame,
/// cursor disabled.
pub const POWER_UP_REGISTERS: [u8; NUM_REGISTERS] = [
    49, 40, 45, 0, 30, 0, 25, 28, 0, 7, 0x20, 0, 0, 0, 0, 0, 0, 0, 0, 0,
];

/// Video polarity of the character area.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Polarity {
    Standard,
    /// Every foreground byte is inverted.
    Reverse,
}

/// Display timing and size. Latched when written, applied at frame start.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Geometry {
    /// R0 + 1.
    pub cycles_per_line: u32,
    /// Displayed character cells per line after clamping.
    pub columns: usize,
    /// Screen characters between the starts of two rows in video memory.
    pub address_stride: usize,
    /// Displayed character rows (R6).
    pub rows: u8,
    /// Scanlines per character row (R9 + 1, at most 16).
    pub char_height: u8,
    /// Character rows per frame (R4 + 1).
    pub vertical_total: u16,
    /// Extra scanlines per frame (R5).
    pub vertical_adjust: u8,
}

impl Geometry {
    /// Scanlines per frame, never 0.
    #[must_use]
    pub fn lines_per_frame(&self) -> u32 {
        let lines = u32::from(self.vertical_total) * u32::from(self.char_height)
            + u32::from(self.vertical_adjust);
        lines.max(1)
    }

    /// Scanlines carrying character data.
    #[must_use]
    pub fn visible_lines(&self) -> usize {
        usize::from(self.rows) * usize::from(self.char_height)
    }
}

/// How the chip is wired into the machine.
///
/// These are board properties rather than register contents, but the
/// register decode depends on them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Wiring {
    /// Valid screen address bits.
    pub address_mask: u16,
    /// Frame buffer line width in character cells.
    pub line_columns: usize,
    /// Cursor output connected.
    pub hardware_cursor: bool,
    /// Each CRTC character fetch yields two screen characters.
    pub double_columns: bool,
    /// Screen address bit selecting the alternate charset.
    pub charset_switch: u16,
    /// Distance to the alternate charset, in characters.
    pub charset_offset: u16,
    /// Screen address bit that selects normal video. `None` wires normal
    /// video permanently.
    pub reverse_switch: Option<u16>,
    /// Externally selected charset bank, in characters.
    pub chargen_bank: u16,
}

impl Wiring {
    /// Characters fetched per CRTC address.
    #[must_use]
    pub fn columns_per_address(&self) -> usize {
        if self.double_columns { 2 } else { 1 }
    }

    /// Address mask in screen-character units.
    #[must_use]
    pub fn effective_mask(&self) -> usize {
        let mask = usize::from(self.address_mask);
        if self.double_columns {
            (mask << 1) | 1
        } else {
            mask
        }
    }
}

/// Fields derived from the register file and wiring.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Derived {
    /// First displayed address, already masked.
    pub screen_base: u16,
    /// Byte offset of the active charset in character generator memory.
    pub char_generator_offset: usize,
    pub address_mask: u16,
    /// Geometry to apply at the next frame start.
    pub geometry: Geometry,
    pub cursor_start: u8,
    pub cursor_end: u8,
    pub cursor_mode: CursorMode,
    /// Cursor address, already masked.
    pub cursor_position: u16,
    pub polarity: Polarity,
    /// Display enable skew set to "never" (R8 bits 5-4 = 11).
    pub display_disabled: bool,
}

/// Bytes of character generator data per character.
pub const CHARGEN_BYTES_PER_CHAR: usize = 16;

impl Derived {
    /// Decode `regs` exactly as stored.
    #[must_use]
    pub fn from_registers(regs: &[u8; NUM_REGISTERS], wiring: &Wiring) -> Self {
        Self::decode(regs, wiring, regs[usize::from(R_HORIZONTAL_DISPLAYED)])
    }

    /// Decode `regs` with `displayed` standing in for R1.
    ///
    /// The controller ignores R1 = 0 and keeps the previous width, so it
    /// passes the last non-zero value here.
    #[must_use]
    pub fn decode(regs: &[u8; NUM_REGISTERS], wiring: &Wiring, displayed: u8) -> Self {
        let r = |index: u8| regs[usize::from(index)];

        let start_address =
            (u16::from(r(R_START_ADDRESS_HI) & 0x3F) << 8) | u16::from(r(R_START_ADDRESS_LO));
        let cursor_address =
            (u16::from(r(R_CURSOR_HI) & 0x3F) << 8) | u16::from(r(R_CURSOR_LO));

        let address_stride = usize::from(displayed) * wiring.columns_per_address();
        let columns = address_stride.min(MAX_COLUMNS).min(wiring.line_columns);

        let geometry = Geometry {
            cycles_per_line: u32::from(r(R_HORIZONTAL_TOTAL)) + 1,
            columns,
            address_stride,
            rows: r(R_VERTICAL_DISPLAYED) & 0x7F,
            char_height: ((r(R_MAX_SCANLINE) & 0x1F) + 1).min(MAX_CHAR_HEIGHT),
            vertical_total: u16::from(r(R_VERTICAL_TOTAL) & 0x7F) + 1,
            vertical_adjust: r(R_VERTICAL_ADJUST) & 0x1F,
        };

        let charset = if start_address & wiring.charset_switch != 0 {
            wiring.charset_offset
        } else {
            0
        };
        let char_generator_offset =
            (usize::from(charset) + usize::from(wiring.chargen_bank)) * CHARGEN_BYTES_PER_CHAR;

        let polarity = match wiring.reverse_switch {
            None => Polarity::Standard,
            Some(bit) if bit & wiring.address_mask != 0 || start_address & bit != 0 => {
                Polarity::Standard
            }
            Some(_) => Polarity::Reverse,
        };

        let cursor_mode = if wiring.hardware_cursor {
            CursorMode::from_register(r(R_CURSOR_START))
        } else {
            CursorMode::Off
        };

        Self {
            screen_base: start_address & wiring.address_mask,
            char_generator_offset,
            address_mask: wiring.address_mask,
            geometry,
            cursor_start: r(R_CURSOR_START) & 0x1F,
            cursor_end: r(R_CURSOR_END) & 0x1F,
            cursor_mode,
            cursor_position: cursor_address & wiring.address_mask,
            polarity,
            display_disabled: (r(R_MODE_CONTROL) >> 4) & 0x03 == 0x03,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pet_wiring() -> Wiring {
        Wiring {
            address_mask: 0x03FF,
            line_columns: 40,
            hardware_cursor: true,
            double_columns: false,
            charset_switch: 0x2000,
            charset_offset: 256,
            reverse_switch: Some(0x1000),
            chargen_bank: 0,
        }
    }

    fn derive_with(writes: &[(u8, u8)], wiring: &Wiring) -> Derived {
        let mut regs = POWER_UP_REGISTERS;
        for &(index, value) in writes {
            regs[usize::from(index)] = value;
        }
        Derived::from_registers(&regs, wiring)
    }

    #[test]
    fn power_up_geometry() {
        let d = derive_with(&[], &pet_wiring());
        assert_eq!(d.geometry.cycles_per_line, 50);
        assert_eq!(d.geometry.columns, 40);
        assert_eq!(d.geometry.rows, 25);
        assert_eq!(d.geometry.char_height, 8);
        assert_eq!(d.geometry.lines_per_frame(), 31 * 8);
        assert_eq!(d.geometry.visible_lines(), 200);
        assert_eq!(d.cursor_mode, CursorMode::Off);
    }

    #[test]
    fn screen_base_spans_two_registers_and_wraps() {
        let d = derive_with(&[(12, 0x07), (13, 0xFF)], &pet_wiring());
        assert_eq!(d.screen_base, 0x03FF, "0x07FF masked to 10 bits");
        assert_eq!(d.screen_base & d.address_mask, d.screen_base);
    }

    #[test]
    fn r12_bit4_selects_normal_video() {
        let wiring = pet_wiring();
        assert_eq!(derive_with(&[(12, 0x00)], &wiring).polarity, Polarity::Reverse);
        assert_eq!(derive_with(&[(12, 0x10)], &wiring).polarity, Polarity::Standard);

        let wide = Wiring {
            address_mask: 0x1FFF,
            ..wiring
        };
        assert_eq!(
            derive_with(&[(12, 0x00)], &wide).polarity,
            Polarity::Standard,
            "switch bit inside the address range never inverts"
        );
    }

    #[test]
    fn r12_bit5_selects_alternate_charset() {
        let wiring = pet_wiring();
        assert_eq!(derive_with(&[(12, 0x10)], &wiring).char_generator_offset, 0);
        assert_eq!(
            derive_with(&[(12, 0x30)], &wiring).char_generator_offset,
            256 * CHARGEN_BYTES_PER_CHAR
        );
    }

    #[test]
    fn columns_clamp_to_line_width_and_chip_maximum() {
        let wiring = pet_wiring();
        let clamped = derive_with(&[(1, 90)], &wiring).geometry;
        assert_eq!(clamped.columns, 40);
        assert_eq!(clamped.address_stride, 90, "memory layout keeps the full row");

        let wide = Wiring {
            line_columns: MAX_COLUMNS,
            ..wiring
        };
        assert_eq!(derive_with(&[(1, 90)], &wide).geometry.columns, MAX_COLUMNS);

        let doubled = Wiring {
            line_columns: MAX_COLUMNS,
            double_columns: true,
            ..wiring
        };
        assert_eq!(derive_with(&[(1, 40)], &doubled).geometry.columns, 80);
        assert_eq!(derive_with(&[(1, 0)], &doubled).geometry.columns, 0);
    }

    #[test]
    fn decode_substitutes_displayed_width() {
        let mut regs = POWER_UP_REGISTERS;
        regs[usize::from(R_HORIZONTAL_DISPLAYED)] = 0;
        let geometry = Derived::decode(&regs, &pet_wiring(), 32).geometry;
        assert_eq!(geometry.columns, 32);
        assert_eq!(geometry.address_stride, 32);
    }

    #[test]
    fn char_height_caps_at_sixteen() {
        let d = derive_with(&[(9, 0x1F)], &pet_wiring());
        assert_eq!(d.geometry.char_height, MAX_CHAR_HEIGHT);
    }

    #[test]
    fn frame_height_includes_adjust() {
        let d = derive_with(&[(4, 24), (5, 3), (9, 7)], &pet_wiring());
        assert_eq!(d.geometry.lines_per_frame(), 25 * 8 + 3);
    }

    #[test]
    fn cursor_fields_decode() {
        let d = derive_with(
            &[(10, 0x40 | 0x03), (11, 0xE7), (14, 0xFF), (15, 0x28)],
            &pet_wiring(),
        );
        assert_eq!(d.cursor_start, 3);
        assert_eq!(d.cursor_end, 7);
        assert_eq!(d.cursor_mode, CursorMode::BlinkFast);
        assert_eq!(d.cursor_position, 0x0328);
    }

    #[test]
    fn cursor_needs_hardware_support() {
        let wiring = Wiring {
            hardware_cursor: false,
            ..pet_wiring()
        };
        assert_eq!(derive_with(&[(10, 0x00)], &wiring).cursor_mode, CursorMode::Off);
    }

    #[test]
    fn r8_skew_three_disables_display() {
        let wiring = pet_wiring();
        assert!(derive_with(&[(8, 0x30)], &wiring).display_disabled);
        assert!(!derive_with(&[(8, 0x10)], &wiring).display_disabled);
    }
}

//! Motorola 6845 CRT Controller (CRTC).
//!
//! The 6845 generates display timing and screen addresses for character
//! displays. In the Commodore PET and CBM-II it sits behind a two-byte
//! window: an address register selecting one of the internal registers and
//! a data register. This model renders a monochrome character display one
//! scanline at a time from an alarm that fires at every line boundary.
//!
//! # Registers (R0-R17)
//!
//! | Reg | Name | Description                                   |
//! |-----|------|-----------------------------------------------|
//! | R0  | HT   | Horizontal total (cycles per line - 1)        |
//! | R1  | HD   | Horizontal displayed characters               |
//! | R2  | HSP  | Horizontal sync position                      |
//! | R3  | SW   | Sync widths                                   |
//! | R4  | VT   | Vertical total (character rows - 1)           |
//! | R5  | VTA  | Vertical total adjust (scanlines)             |
//! | R6  | VD   | Vertical displayed character rows             |
//! | R7  | VSP  | Vertical sync position                        |
//! | R8  | MODE | Mode control (bits 5-4 = 11 blanks the display) |
//! | R9  | MSL  | Maximum scanline address (character height - 1) |
//! | R10 | CS   | Cursor start scanline, bits 6-5 blink mode    |
//! | R11 | CE   | Cursor end scanline                           |
//! | R12 | SAH  | Start address high                            |
//! | R13 | SAL  | Start address low                             |
//! | R14 | CH   | Cursor address high                           |
//! | R15 | CL   | Cursor address low                            |
//! | R16 | LPH  | Light pen high (reads $FF)                    |
//! | R17 | LPL  | Light pen low (reads $FF)                     |
//!
//! Registers are write-only on the real chip. They read back as the last
//! value written, which is what monitors and test programs expect.
//!
//! # Timing
//!
//! Display geometry is latched when written and takes effect at the start
//! of the next frame. The frame-boundary interrupt line is asserted at
//! raster line 0 and released after the last displayed row.

mod cache;
mod config;
mod crtc;
mod cursor;
mod draw;
mod error;
mod palette;
mod port;
mod raster;
mod registers;

#[cfg(feature = "png")]
pub mod capture;

pub use cache::{ColumnSpan, IDLE_PATTERN, LineCache, LineCacheEntry};
pub use config::CrtcConfig;
pub use crtc::{
    Crtc, CrtcHost, CrtcParts, INTERRUPT_SOURCE_NAME, RASTER_ALARM_NAME, SNAPSHOT_MAJOR,
    SNAPSHOT_MINOR, SNAPSHOT_MODULE, VideoMemory,
};
pub use cursor::{BLINK_FAST_FRAMES, BLINK_SLOW_FRAMES, CursorBlink, CursorMode};
pub use draw::{CELL_PIXELS, DrawMode, DrawTables, LineContext};
pub use error::{ConfigError, PaletteError};
pub use palette::{PALETTE_ENTRIES, Palette};
pub use port::CrtcPort;
pub use raster::RasterTiming;
pub use registers::{
    CHARGEN_BYTES_PER_CHAR, Geometry, MAX_CHAR_HEIGHT, MAX_COLUMNS, NUM_REGISTERS,
    POWER_UP_REGISTERS, Polarity, R_CURSOR_END, R_CURSOR_HI, R_CURSOR_LO, R_CURSOR_START,
    R_HORIZONTAL_DISPLAYED, R_HORIZONTAL_TOTAL, R_HSYNC_POSITION, R_LIGHT_PEN_HI, R_LIGHT_PEN_LO,
    R_MAX_SCANLINE, R_MODE_CONTROL, R_START_ADDRESS_HI, R_START_ADDRESS_LO, R_SYNC_WIDTH,
    R_VERTICAL_ADJUST, R_VERTICAL_DISPLAYED, R_VERTICAL_TOTAL, R_VSYNC_POSITION,
};

//! Snapshot module.
//!
//! | Field                                       | Size  |
//! |---------------------------------------------|-------|
//! | Raster cycle within the line                | byte  |
//! | Raster line                                 | word  |
//! | Screen address mask                         | word  |
//! | Hardware flags (bit 0 cursor, bit 1 double columns) | byte |
//! | R0-R19                                      | 20    |
//! | Blink counter (bits 0-5), cursor state (bit 7) | byte |
//! | Screen base                                 | word  |
//! | Flags (bit 0 screen enabled, bit 1 in display) | byte |
//!
//! Minor 1 appends the timing in effect, which differs from the register
//! file while a geometry write waits for the next frame start:
//!
//! | Field                                       | Size  |
//! |---------------------------------------------|-------|
//! | Displayed characters (last non-zero R1)     | byte  |
//! | Line width in character cells               | byte  |
//! | Cycles per line                             | word  |
//! | Displayed columns                           | byte  |
//! | Row stride in screen characters             | word  |
//! | Displayed rows                              | byte  |
//! | Character height                            | byte  |
//! | Vertical total in rows                      | word  |
//! | Vertical adjust                             | byte  |

use std::io::{Read, Write};

use emu_core::{AlarmContext, InterruptLines, ModuleReader, ModuleWriter, SnapshotError};

use super::{Crtc, CrtcHost, Layout};
use crate::config::validate_columns;
use crate::cursor::CursorBlink;
use crate::raster::RasterTiming;
use crate::registers::{
    Derived, Geometry, MAX_CHAR_HEIGHT, MAX_COLUMNS, NUM_REGISTERS, R_HORIZONTAL_DISPLAYED, Wiring,
};

pub const SNAPSHOT_MODULE: &str = "CRTC";
pub const SNAPSHOT_MAJOR: u8 = 1;
pub const SNAPSHOT_MINOR: u8 = 1;

const HW_CURSOR: u8 = 0x01;
const HW_DOUBLE_COLUMNS: u8 = 0x02;

const BLINK_COUNTER_MASK: u8 = 0x3F;
const BLINK_STATE: u8 = 0x80;

const FLAG_SCREEN_ENABLED: u8 = 0x01;
const FLAG_IN_DISPLAY: u8 = 0x02;

/// Reject timing no register file could have produced.
fn check_applied(geometry: &Geometry, line_columns: usize) -> Result<(), String> {
    if validate_columns(line_columns).is_err() {
        return Err(format!("line width {line_columns} is not supported"));
    }
    if !(1..=256).contains(&geometry.cycles_per_line)
        || !(1..=MAX_CHAR_HEIGHT).contains(&geometry.char_height)
        || !(1..=128).contains(&geometry.vertical_total)
        || geometry.rows > 0x7F
        || geometry.vertical_adjust > 0x1F
        || geometry.columns > MAX_COLUMNS.min(line_columns)
        || geometry.columns > geometry.address_stride
    {
        return Err(format!("timing {geometry:?} is out of range"));
    }
    Ok(())
}

impl Crtc {
    /// Write the controller state at cycle `now` as a "CRTC" module.
    pub fn write_module<W: Write>(&self, out: &mut W, now: u64) -> Result<(), SnapshotError> {
        let elapsed = now.wrapping_sub(self.origin);
        let mut module = ModuleWriter::new(SNAPSHOT_MODULE, SNAPSHOT_MAJOR, SNAPSHOT_MINOR);

        module.write_byte(self.timing.cycle(elapsed) as u8);
        module.write_word(self.timing.line(elapsed) as u16);
        module.write_word(self.wiring.address_mask);

        let mut hardware = 0;
        if self.wiring.hardware_cursor {
            hardware |= HW_CURSOR;
        }
        if self.wiring.double_columns {
            hardware |= HW_DOUBLE_COLUMNS;
        }
        module.write_byte(hardware);

        module.write_bytes(&self.regs);

        let mut blink = self.cursor.counter() & BLINK_COUNTER_MASK;
        if self.cursor.state() {
            blink |= BLINK_STATE;
        }
        module.write_byte(blink);
        module.write_word(self.derived.screen_base);

        let mut flags = 0;
        if self.screen_enabled {
            flags |= FLAG_SCREEN_ENABLED;
        }
        if self.in_display {
            flags |= FLAG_IN_DISPLAY;
        }
        module.write_byte(flags);

        let applied = self.layout.geometry;
        module.write_byte(self.displayed);
        module.write_byte(self.layout.line_columns as u8);
        module.write_word(applied.cycles_per_line as u16);
        module.write_byte(applied.columns as u8);
        module.write_word(applied.address_stride as u16);
        module.write_byte(applied.rows);
        module.write_byte(applied.char_height);
        module.write_word(applied.vertical_total);
        module.write_byte(applied.vertical_adjust);

        module.finish(out)
    }

    /// Restore a "CRTC" module, resuming the raster at cycle `now`.
    ///
    /// The module is decoded and checked before anything changes, so on
    /// error the controller is left as it was. Installs the controller into
    /// `alarms` if that has not happened yet.
    ///
    /// A minor 0 module carries no timing of its own; the timing decoded
    /// from its registers is applied instead.
    pub fn read_module<T: CrtcHost, R: Read>(
        &mut self,
        input: &mut R,
        alarms: &mut AlarmContext<T>,
        interrupts: &mut InterruptLines,
        now: u64,
    ) -> Result<(), SnapshotError> {
        let mut module = ModuleReader::open(input, SNAPSHOT_MODULE)?;
        if let Err(e) = module.require_major(SNAPSHOT_MAJOR) {
            log::error!("{e}");
            return Err(e);
        }

        let cycle = module.read_byte()?;
        let line = module.read_word()?;
        let address_mask = module.read_word()?;
        let hardware = module.read_byte()?;
        let mut regs = [0u8; NUM_REGISTERS];
        module.read_bytes(&mut regs)?;
        let blink = module.read_byte()?;
        let screen_base = module.read_word()?;
        let flags = module.read_byte()?;

        let (displayed, applied) = if module.minor() >= 1 {
            let displayed = module.read_byte()?;
            let line_columns = usize::from(module.read_byte()?);
            let geometry = Geometry {
                cycles_per_line: u32::from(module.read_word()?),
                columns: usize::from(module.read_byte()?),
                address_stride: usize::from(module.read_word()?),
                rows: module.read_byte()?,
                char_height: module.read_byte()?,
                vertical_total: module.read_word()?,
                vertical_adjust: module.read_byte()?,
            };
            if displayed == 0 {
                return Err(module.corrupt("displayed character count is 0"));
            }
            if let Err(reason) = check_applied(&geometry, line_columns) {
                return Err(module.corrupt(reason));
            }
            (displayed, Some((geometry, line_columns)))
        } else {
            match regs[usize::from(R_HORIZONTAL_DISPLAYED)] {
                0 => (self.displayed, None),
                r1 => (r1, None),
            }
        };

        let wiring = Wiring {
            address_mask,
            hardware_cursor: hardware & HW_CURSOR != 0,
            double_columns: hardware & HW_DOUBLE_COLUMNS != 0,
            ..self.wiring
        };
        let derived = Derived::decode(&regs, &wiring, displayed);
        if derived.screen_base != screen_base {
            return Err(module.corrupt(format!(
                "screen base ${screen_base:04X} does not match registers (${:04X})",
                derived.screen_base
            )));
        }
        let (geometry, line_columns) =
            applied.unwrap_or((derived.geometry, wiring.line_columns));
        let timing = RasterTiming::new(geometry.cycles_per_line, geometry.lines_per_frame());
        if u32::from(line) >= timing.lines_per_frame() || u32::from(cycle) >= timing.cycles_per_line()
        {
            return Err(module.corrupt(format!(
                "raster position {line}:{cycle} outside a {}x{} frame",
                timing.lines_per_frame(),
                timing.cycles_per_line()
            )));
        }

        self.attach(alarms, interrupts);
        self.wiring = wiring;
        self.displayed = displayed;
        for (index, &value) in regs.iter().enumerate() {
            self.write(interrupts, index as u8, value);
        }
        self.cursor = CursorBlink::with_phase(blink & BLINK_COUNTER_MASK, blink & BLINK_STATE != 0);
        self.screen_enabled = flags & FLAG_SCREEN_ENABLED != 0;

        // Register geometry that differs from this stays pending until the
        // next frame start, as it was when the module was written.
        self.latch_layout(Layout::new(geometry, line_columns, self.double_size), true);
        self.origin = now.wrapping_sub(self.timing.offset_of(u32::from(line), u32::from(cycle)));
        self.in_display = flags & FLAG_IN_DISPLAY != 0;
        self.update_frame_line(interrupts);
        self.cache.invalidate_all();
        self.arm(
            alarms,
            now + u64::from(self.timing.cycles_per_line() - u32::from(cycle)),
        );

        log::debug!(
            "CRTC restored at raster {line}:{cycle}, screen base ${screen_base:04X} (module {}.{})",
            module.major(),
            module.minor()
        );
        Ok(())
    }
}

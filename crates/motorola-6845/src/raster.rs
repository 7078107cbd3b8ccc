//! Raster position from the cycle clock.
//!
//! The beam position is never counted; it is derived from the number of
//! cycles elapsed since the frame origin.

/// Line length and frame height in effect for the current frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RasterTiming {
    cycles_per_line: u32,
    lines_per_frame: u32,
}

impl RasterTiming {
    /// Both values are raised to at least 1.
    #[must_use]
    pub fn new(cycles_per_line: u32, lines_per_frame: u32) -> Self {
        Self {
            cycles_per_line: cycles_per_line.max(1),
            lines_per_frame: lines_per_frame.max(1),
        }
    }

    #[must_use]
    pub fn cycles_per_line(&self) -> u32 {
        self.cycles_per_line
    }

    #[must_use]
    pub fn lines_per_frame(&self) -> u32 {
        self.lines_per_frame
    }

    #[must_use]
    pub fn cycles_per_frame(&self) -> u64 {
        u64::from(self.cycles_per_line) * u64::from(self.lines_per_frame)
    }

    /// Scanline `elapsed` cycles after the frame origin.
    #[must_use]
    pub fn line(&self, elapsed: u64) -> u32 {
        ((elapsed / u64::from(self.cycles_per_line)) % u64::from(self.lines_per_frame)) as u32
    }

    /// Cycle within the scanline `elapsed` cycles after the frame origin.
    #[must_use]
    pub fn cycle(&self, elapsed: u64) -> u32 {
        (elapsed % u64::from(self.cycles_per_line)) as u32
    }

    /// Cycles from the origin to `line`/`cycle` of a frame.
    #[must_use]
    pub fn offset_of(&self, line: u32, cycle: u32) -> u64 {
        u64::from(line) * u64::from(self.cycles_per_line) + u64::from(cycle)
    }
}

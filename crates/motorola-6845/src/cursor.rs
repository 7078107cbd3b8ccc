//! Cursor timing state machine.
//!
//! R10 bits 6-5 select the mode:
//!
//! | Bits | Mode                         |
//! |------|------------------------------|
//! | 00   | Solid                        |
//! | 01   | Off                          |
//! | 10   | Blink, toggles every 16 frames |
//! | 11   | Blink, toggles every 32 frames |
//!
//! The blink counter only moves at frame start (raster line 0).

/// Frames between toggles in fast blink.
pub const BLINK_FAST_FRAMES: u8 = 16;
/// Frames between toggles in slow blink.
pub const BLINK_SLOW_FRAMES: u8 = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CursorMode {
    Off,
    Solid,
    BlinkSlow,
    BlinkFast,
}

impl CursorMode {
    /// Decode bits 6-5 of R10.
    #[must_use]
    pub fn from_register(r10: u8) -> Self {
        match (r10 >> 5) & 0x03 {
            0b00 => Self::Solid,
            0b01 => Self::Off,
            0b10 => Self::BlinkFast,
            _ => Self::BlinkSlow,
        }
    }

    /// Frames between toggles, `None` for the static modes.
    #[must_use]
    pub fn blink_period(self) -> Option<u8> {
        match self {
            Self::Off | Self::Solid => None,
            Self::BlinkSlow => Some(BLINK_SLOW_FRAMES),
            Self::BlinkFast => Some(BLINK_FAST_FRAMES),
        }
    }
}

/// Blink phase and counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CursorBlink {
    counter: u8,
    state: bool,
}

impl CursorBlink {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Restore a saved phase.
    #[must_use]
    pub fn with_phase(counter: u8, state: bool) -> Self {
        Self { counter, state }
    }

    /// Mode change: cursor shown, first toggle after 16 frames.
    pub fn restart(&mut self) {
        self.state = true;
        self.counter = BLINK_FAST_FRAMES;
    }

    /// Advance one frame. Returns true if the phase toggled.
    pub fn frame_start(&mut self, mode: CursorMode) -> bool {
        let Some(period) = mode.blink_period() else {
            return false;
        };
        self.counter = self.counter.saturating_sub(1);
        if self.counter == 0 {
            self.counter = period;
            self.state = !self.state;
            true
        } else {
            false
        }
    }

    /// Whether the cursor is drawn in `mode` right now.
    #[must_use]
    pub fn visible(&self, mode: CursorMode) -> bool {
        match mode {
            CursorMode::Off => false,
            CursorMode::Solid => true,
            CursorMode::BlinkSlow | CursorMode::BlinkFast => self.state,
        }
    }

    #[must_use]
    pub fn counter(&self) -> u8 {
        self.counter
    }

    #[must_use]
    pub fn state(&self) -> bool {
        self.state
    }
}

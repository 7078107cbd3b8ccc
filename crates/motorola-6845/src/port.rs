//! CPU-facing two-byte register window.

use emu_core::{Bus, InterruptLines};

use crate::Crtc;

/// The controller as the CPU sees it: even addresses are the address
/// register, odd addresses the selected data register.
///
/// The address register is write-only and reads as 0. Data accesses to
/// unimplemented registers (20-31) are ignored and read as 0.
pub struct CrtcPort<'a> {
    pub crtc: &'a mut Crtc,
    pub interrupts: &'a mut InterruptLines,
}

impl<'a> CrtcPort<'a> {
    #[must_use]
    pub fn new(crtc: &'a mut Crtc, interrupts: &'a mut InterruptLines) -> Self {
        Self { crtc, interrupts }
    }
}

impl Bus for CrtcPort<'_> {
    fn read(&mut self, address: u16) -> u8 {
        self.peek(address)
    }

    fn write(&mut self, address: u16, value: u8) {
        if address & 1 == 0 {
            self.crtc.select(value);
        } else {
            self.crtc.write_selected(self.interrupts, value);
        }
    }

    fn peek(&self, address: u16) -> u8 {
        if address & 1 == 0 {
            0
        } else {
            self.crtc.read_selected()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::CrtcConfig;

    #[test]
    fn select_then_access_data() {
        let mut crtc = Crtc::new(&CrtcConfig::default()).expect("default config");
        let mut interrupts = InterruptLines::new();
        let mut port = CrtcPort::new(&mut crtc, &mut interrupts);

        port.write(0xE880, 14);
        port.write(0xE881, 0x03);
        port.write(0xE880, 15);
        port.write(0xE881, 0xE8);
        port.write(0xE880, 14);
        assert_eq!(port.read(0xE881), 0x03);
        assert_eq!(port.read(0xE880), 0, "address register is write-only");

        drop(port);
        assert_eq!(crtc.cursor_position(), 0x03E8);
    }

    #[test]
    fn unimplemented_registers_are_ignored() {
        let mut crtc = Crtc::new(&CrtcConfig::default()).expect("default config");
        let mut interrupts = InterruptLines::new();
        let before = *crtc.registers();
        let mut port = CrtcPort::new(&mut crtc, &mut interrupts);

        port.write(0, 25);
        port.write(1, 0xAA);
        assert_eq!(port.peek(1), 0);

        drop(port);
        assert_eq!(crtc.registers(), &before);
    }

    #[test]
    fn light_pen_reads_through_port() {
        let mut crtc = Crtc::new(&CrtcConfig::default()).expect("default config");
        let mut interrupts = InterruptLines::new();
        let mut port = CrtcPort::new(&mut crtc, &mut interrupts);
        port.write(0, 17);
        assert_eq!(port.read(1), 0xFF);
    }
}

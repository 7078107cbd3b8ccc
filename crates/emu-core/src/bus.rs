//! Register bus interface.

/// A device reachable on the CPU bus.
///
/// The device masks `address` down to its own register space; callers only
/// decode which device is selected.
pub trait Bus {
    /// Read a byte from the given address. May have side effects.
    fn read(&mut self, address: u16) -> u8;

    /// Write a byte to the given address.
    fn write(&mut self, address: u16, value: u8);

    /// Read without side effects, for monitors and debuggers.
    fn peek(&self, address: u16) -> u8;
}

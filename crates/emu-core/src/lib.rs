//! Scheduling substrate for cycle-accurate emulation.
//!
//! One monotonic cycle counter drives everything. Peripherals never run on
//! their own; they register alarms against the clock and drive interrupt
//! lines that the CPU samples once per instruction.

mod alarm;
mod bus;
mod clock;
mod interrupt;
mod observable;
pub mod snapshot;

pub use alarm::{AlarmContext, AlarmHandle, AlarmHandler};
pub use bus::Bus;
pub use clock::{ClockDomain, CycleClock};
pub use interrupt::{InterruptKind, InterruptLines, InterruptSource};
pub use observable::{Observable, Value};
pub use snapshot::{ModuleReader, ModuleWriter, SnapshotError};

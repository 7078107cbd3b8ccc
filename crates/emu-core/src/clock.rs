//! Cycle clock and clock domains.

use crate::alarm::AlarmContext;

/// Monotonic count of elapsed processor cycles.
///
/// Every other component derives its timing by comparing stored targets
/// against `now()`. The counter only moves forward; the sole exception is a
/// full machine reset.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleClock {
    now: u64,
}

impl CycleClock {
    #[must_use]
    pub const fn new() -> Self {
        Self { now: 0 }
    }

    /// Advance by `cycles`.
    ///
    /// 64 bits of cycles outlast any emulation session, so overflow is
    /// treated as unreachable and panics in debug builds.
    pub fn advance(&mut self, cycles: u64) {
        self.now += cycles;
    }

    #[must_use]
    pub const fn now(&self) -> u64 {
        self.now
    }

    /// Full machine reset back to cycle 0.
    pub fn reset(&mut self) {
        self.now = 0;
    }
}

/// One clock plus the alarms scheduled against it.
///
/// `T` is whatever the alarm handlers operate on, normally the machine's
/// device set. The CPU loop owns the domain and calls
/// [`on_cycles_elapsed`](Self::on_cycles_elapsed) after every instruction.
pub struct ClockDomain<T> {
    clock: CycleClock,
    alarms: AlarmContext<T>,
}

impl<T> ClockDomain<T> {
    #[must_use]
    pub fn new(name: &str) -> Self {
        Self {
            clock: CycleClock::new(),
            alarms: AlarmContext::new(name),
        }
    }

    #[must_use]
    pub fn now(&self) -> u64 {
        self.clock.now()
    }

    #[must_use]
    pub fn alarms(&self) -> &AlarmContext<T> {
        &self.alarms
    }

    pub fn alarms_mut(&mut self) -> &mut AlarmContext<T> {
        &mut self.alarms
    }

    /// Advance the clock, then fire every alarm that has become due.
    pub fn on_cycles_elapsed(&mut self, target: &mut T, cycles: u64) {
        self.clock.advance(cycles);
        self.alarms.dispatch_due(target, self.clock.now());
    }

    /// Advance in one step to the next pending alarm, or to `limit` if that
    /// comes first. Returns the number of cycles advanced.
    pub fn run_until(&mut self, target: &mut T, limit: u64) -> u64 {
        let start = self.clock.now();
        let stop = self
            .alarms
            .next_pending()
            .map_or(limit, |next| next.min(limit))
            .max(start);
        self.on_cycles_elapsed(target, stop - start);
        stop - start
    }

    /// Machine reset: the clock returns to 0 and every alarm is unset.
    ///
    /// Owners re-arm their alarms from their own reset routines.
    pub fn reset(&mut self) {
        self.clock.reset();
        self.alarms.reset();
    }
}

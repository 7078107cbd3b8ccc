//! Alarm scheduler.
//!
//! Peripherals run "in the future" relative to the CPU by registering alarms:
//! callbacks tagged with the cycle at which they become due. The clock owner
//! calls [`AlarmContext::dispatch_due`] after every clock advance.
//!
//! # Ordering
//!
//! Due alarms fire in ascending target order. Alarms with the same target
//! fire in registration order, because the dispatch set is keyed on
//! `(target, registration index)`. Some alarms reschedule others, so this
//! order is observable in interrupt timing.
//!
//! # Re-entrancy
//!
//! Handlers receive the context itself and may set or unset any alarm,
//! including their own and ones still waiting in the current batch. Each
//! iteration takes the earliest entry afresh, so mutations are always seen.
//! An alarm is unset before its handler runs; a handler that wants to repeat
//! sets itself again.

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicU32, Ordering};

/// Alarm callback: `(target, context, overrun)`.
///
/// `overrun` is `current_cycle - alarm_target`, the number of cycles that had
/// already elapsed when the alarm was dispatched. `context.now()` is the
/// dispatch cycle, so `context.now() - overrun` is the logical firing cycle.
pub type AlarmHandler<T> = fn(&mut T, &mut AlarmContext<T>, u64);

static NEXT_CONTEXT_ID: AtomicU32 = AtomicU32::new(1);

/// Handle to an alarm registered with one [`AlarmContext`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AlarmHandle {
    context: u32,
    index: usize,
}

struct Alarm<T> {
    name: String,
    target: Option<u64>,
    handler: AlarmHandler<T>,
}

/// Ordered collection of alarms for one clock domain.
pub struct AlarmContext<T> {
    id: u32,
    name: String,
    alarms: Vec<Alarm<T>>,
    /// Dispatch set. Only set alarms are present.
    pending: BTreeSet<(u64, usize)>,
    /// Cycle passed to the most recent `dispatch_due`.
    now: u64,
}

impl<T> AlarmContext<T> {
    #[must_use]
    pub fn new(name: &str) -> Self {
        Self {
            id: NEXT_CONTEXT_ID.fetch_add(1, Ordering::Relaxed),
            name: name.to_string(),
            alarms: Vec::new(),
            pending: BTreeSet::new(),
            now: 0,
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Register a new alarm in the unset state.
    pub fn new_alarm(&mut self, name: &str, handler: AlarmHandler<T>) -> AlarmHandle {
        let index = self.alarms.len();
        self.alarms.push(Alarm {
            name: name.to_string(),
            target: None,
            handler,
        });
        AlarmHandle {
            context: self.id,
            index,
        }
    }

    /// Schedule `handle` at `target`, replacing any previous target.
    ///
    /// A target at or before the current cycle is dispatched on the next
    /// `dispatch_due` call (or later in the current batch).
    pub fn set(&mut self, handle: AlarmHandle, target: u64) {
        if !self.owns(handle) {
            return;
        }
        let alarm = &mut self.alarms[handle.index];
        if let Some(previous) = alarm.target.replace(target) {
            self.pending.remove(&(previous, handle.index));
        }
        self.pending.insert((target, handle.index));
    }

    /// Remove `handle` from the dispatch set. No-op if already unset.
    pub fn unset(&mut self, handle: AlarmHandle) {
        if !self.owns(handle) {
            return;
        }
        if let Some(previous) = self.alarms[handle.index].target.take() {
            self.pending.remove(&(previous, handle.index));
        }
    }

    #[must_use]
    pub fn is_set(&self, handle: AlarmHandle) -> bool {
        self.target(handle).is_some()
    }

    /// Current target of `handle`, `None` when unset.
    #[must_use]
    pub fn target(&self, handle: AlarmHandle) -> Option<u64> {
        if !self.owns(handle) {
            return None;
        }
        self.alarms[handle.index].target
    }

    /// Diagnostic name given at registration.
    #[must_use]
    pub fn alarm_name(&self, handle: AlarmHandle) -> Option<&str> {
        if !self.owns(handle) {
            return None;
        }
        Some(&self.alarms[handle.index].name)
    }

    /// Earliest pending target, if any.
    #[must_use]
    pub fn next_pending(&self) -> Option<u64> {
        self.pending.first().map(|&(target, _)| target)
    }

    /// Cycle of the current (or most recent) dispatch.
    #[must_use]
    pub fn now(&self) -> u64 {
        self.now
    }

    /// Fire every alarm whose target is at or before `current_cycle`.
    pub fn dispatch_due(&mut self, target: &mut T, current_cycle: u64) {
        self.now = current_cycle;
        while let Some(&(due, index)) = self.pending.first() {
            if due > current_cycle {
                break;
            }
            self.pending.remove(&(due, index));
            self.alarms[index].target = None;
            let handler = self.alarms[index].handler;
            handler(target, self, current_cycle - due);
        }
    }

    /// Unset every alarm. Registrations survive.
    pub fn reset(&mut self) {
        self.pending.clear();
        for alarm in &mut self.alarms {
            alarm.target = None;
        }
        self.now = 0;
    }

    fn owns(&self, handle: AlarmHandle) -> bool {
        let owned = handle.context == self.id && handle.index < self.alarms.len();
        debug_assert!(
            owned,
            "alarm handle {handle:?} does not belong to context {:?}",
            self.name
        );
        if !owned {
            log::error!(
                "alarm handle {handle:?} used with foreign context {:?}",
                self.name
            );
        }
        owned
    }
}

//! Level-sensitive interrupt lines.
//!
//! Each device registers as a source and drives its own level on the IRQ
//! and NMI lines. The CPU samples the OR of all sources of one kind. A
//! per-kind count of asserted sources keeps `sampled()` constant-time.

use std::fmt;

/// Which CPU input a source drives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum InterruptKind {
    Irq,
    Nmi,
}

impl fmt::Display for InterruptKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Irq => write!(f, "IRQ"),
            Self::Nmi => write!(f, "NMI"),
        }
    }
}

/// Owner id returned by [`InterruptLines::register_source`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct InterruptSource(usize);

#[derive(Debug, Clone)]
struct SourceState {
    name: String,
    /// Asserted level per kind (`[irq, nmi]`).
    level: [bool; 2],
    /// Low-to-high transitions per kind.
    raised: [u64; 2],
}

/// The interrupt lines of one machine.
#[derive(Debug, Clone, Default)]
pub struct InterruptLines {
    sources: Vec<SourceState>,
    /// Number of sources currently asserting each kind.
    asserted: [usize; 2],
}

const fn slot(kind: InterruptKind) -> usize {
    match kind {
        InterruptKind::Irq => 0,
        InterruptKind::Nmi => 1,
    }
}

impl InterruptLines {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_source(&mut self, name: &str) -> InterruptSource {
        self.sources.push(SourceState {
            name: name.to_string(),
            level: [false; 2],
            raised: [0; 2],
        });
        InterruptSource(self.sources.len() - 1)
    }

    pub fn assert(&mut self, kind: InterruptKind, source: InterruptSource) {
        self.set(kind, source, true);
    }

    pub fn clear(&mut self, kind: InterruptKind, source: InterruptSource) {
        self.set(kind, source, false);
    }

    /// Drive `source`'s level on `kind`. Setting the current level again is a no-op.
    pub fn set(&mut self, kind: InterruptKind, source: InterruptSource, level: bool) {
        let k = slot(kind);
        let Some(state) = self.source_mut(source) else {
            return;
        };
        if state.level[k] == level {
            return;
        }
        state.level[k] = level;
        if level {
            state.raised[k] += 1;
        }
        if level {
            self.asserted[k] += 1;
        } else {
            self.asserted[k] -= 1;
        }
    }

    /// OR of all sources on `kind`, as seen by the CPU.
    #[must_use]
    pub fn sampled(&self, kind: InterruptKind) -> bool {
        self.asserted[slot(kind)] > 0
    }

    #[must_use]
    pub fn is_asserted(&self, kind: InterruptKind, source: InterruptSource) -> bool {
        self.sources
            .get(source.0)
            .is_some_and(|state| state.level[slot(kind)])
    }

    /// Number of times `source` has raised `kind` from low to high.
    #[must_use]
    pub fn raised_count(&self, kind: InterruptKind, source: InterruptSource) -> u64 {
        self.sources
            .get(source.0)
            .map_or(0, |state| state.raised[slot(kind)])
    }

    #[must_use]
    pub fn source_name(&self, source: InterruptSource) -> Option<&str> {
        self.sources.get(source.0).map(|state| state.name.as_str())
    }

    /// Release every line. Sources stay registered.
    pub fn reset(&mut self) {
        for state in &mut self.sources {
            state.level = [false; 2];
        }
        self.asserted = [0; 2];
    }

    fn source_mut(&mut self, source: InterruptSource) -> Option<&mut SourceState> {
        let known = source.0 < self.sources.len();
        debug_assert!(known, "unknown interrupt source {source:?}");
        if !known {
            log::error!("interrupt source {source:?} was never registered");
        }
        self.sources.get_mut(source.0)
    }
}

impl crate::Observable for InterruptLines {
    fn query(&self, path: &str) -> Option<crate::Value> {
        match path {
            "irq" => Some(self.sampled(InterruptKind::Irq).into()),
            "nmi" => Some(self.sampled(InterruptKind::Nmi).into()),
            "sources" => Some(crate::Value::Array(
                self.sources
                    .iter()
                    .map(|state| crate::Value::String(state.name.clone()))
                    .collect(),
            )),
            _ => None,
        }
    }

    fn query_paths(&self) -> &'static [&'static str] {
        &["irq", "nmi", "sources"]
    }
}

/// Scheduler time as reported by the instrumented kernel.
///
/// A `Tick` is a discrete scheduler time unit. Ticks only ever come from
/// parsed trace lines; nothing in the verifier advances them.

/// A scheduler tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[derive(serde::Serialize, serde::Deserialize)]
#[serde(transparent)]
pub struct Tick(u64);

impl Tick {
    /// Create a `Tick` from a raw value.
    #[inline]
    pub fn new(ticks: u64) -> Self {
        Tick(ticks)
    }

    /// Return the raw tick value.
    #[inline]
    pub fn ticks(self) -> u64 {
        self.0
    }

    /// Ticks elapsed since `earlier`, saturating at zero.
    #[inline]
    pub fn saturating_since(self, earlier: Tick) -> u64 {
        self.0.saturating_sub(earlier.0)
    }
}

impl std::fmt::Display for Tick {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "T={}", self.0)
    }
}

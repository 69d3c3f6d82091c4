//! Pid: a lightweight, ordered, copyable process identifier.

/// A process identifier as printed by the kernel.
///
/// Kept as a newtype so a PID is never confused with a tick, a level, or
/// a quantum at compile time. PIDs are only unique among concurrently
/// live processes; a single logical program may span several of them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[derive(serde::Serialize, serde::Deserialize)]
#[serde(transparent)]
pub struct Pid(u32);

impl Pid {
    /// Create a PID from a raw integer.
    #[inline]
    pub fn new(pid: u32) -> Self {
        Pid(pid)
    }

    /// Return the underlying integer.
    #[inline]
    pub fn raw(self) -> u32 {
        self.0
    }
}

impl std::fmt::Display for Pid {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

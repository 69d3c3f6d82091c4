/// Fluent builders for constructing traces in code.
///
/// Tests and tooling describe a trace as a chain of level lines and the
/// processes queued on them, then either build the model directly or
/// render it to the text the kernel would have printed.

use crate::tick::Tick;
use crate::trace::{LevelObservation, Pid, ProcessObservation, QueueSet, TickLog, TickSnapshot, Trace};

/// Kernel state code for a process that is on the CPU.
pub const RUNNING_STATE: u32 = 4;

/// Kernel state code used by the builders for a queued, runnable process.
pub const RUNNABLE_STATE: u32 = 3;

// ── TraceBuilder ──────────────────────────────────────────────────────

/// Fluent builder for a full-grammar [`Trace`].
///
/// # Example
/// ```rust
/// use schedlog::dsl::TraceBuilder;
///
/// let trace = TraceBuilder::new()
///     .active(0, 0, 10)
///     .running(5, "prog", 3)
///     .queued(6, "sh", 3)
///     .expired(0, 1, 20)
///     .queued(7, "tbg", 6)
///     .build();
/// assert_eq!(trace.len(), 2);
/// ```
#[derive(Debug, Clone, Default)]
pub struct TraceBuilder {
    levels: Vec<LevelObservation>,
}

impl TraceBuilder {
    pub fn new() -> Self {
        TraceBuilder { levels: Vec::new() }
    }

    // ── Levels ────────────────────────────────────────────────

    /// Start a new level line.
    pub fn level(mut self, tick: u64, queue_set: QueueSet, level: i64, level_quantum: i64) -> Self {
        self.levels.push(LevelObservation {
            tick: Tick::new(tick),
            queue_set,
            level,
            level_quantum,
            processes: Vec::new(),
        });
        self
    }

    /// Start a new line in the active set.
    pub fn active(self, tick: u64, level: i64, level_quantum: i64) -> Self {
        self.level(tick, QueueSet::Active, level, level_quantum)
    }

    /// Start a new line in the expired set.
    pub fn expired(self, tick: u64, level: i64, level_quantum: i64) -> Self {
        self.level(tick, QueueSet::Expired, level, level_quantum)
    }

    // ── Processes ─────────────────────────────────────────────

    /// Append a process to the most recent level line.
    ///
    /// # Panics
    /// Panics if no level line has been started yet.
    pub fn process(mut self, pid: u32, name: &str, state: u32, quantum: i64) -> Self {
        let level = self
            .levels
            .last_mut()
            .expect("TraceBuilder::process called before any level line");
        level
            .processes
            .push(ProcessObservation::new(Pid::new(pid), name, Some(state), quantum));
        self
    }

    /// Append a process in the running state.
    pub fn running(self, pid: u32, name: &str, quantum: i64) -> Self {
        self.process(pid, name, RUNNING_STATE, quantum)
    }

    /// Append a runnable process that is not on the CPU.
    pub fn queued(self, pid: u32, name: &str, quantum: i64) -> Self {
        self.process(pid, name, RUNNABLE_STATE, quantum)
    }

    // ── Build ─────────────────────────────────────────────────

    pub fn build(self) -> Trace {
        Trace::new(self.levels)
    }

    /// Render the lines as captured text, one trace line per row.
    pub fn render(&self) -> String {
        let mut out = String::new();
        for level in &self.levels {
            out.push_str(&level.to_string());
            out.push('\n');
        }
        out
    }
}

// ── TickLogBuilder ────────────────────────────────────────────────────

/// Fluent builder for a terse-grammar [`TickLog`].
#[derive(Debug, Clone, Default)]
pub struct TickLogBuilder {
    snapshots: Vec<TickSnapshot>,
}

impl TickLogBuilder {
    pub fn new() -> Self {
        TickLogBuilder {
            snapshots: Vec::new(),
        }
    }

    /// Start a new tick line.
    pub fn tick(mut self, tick: u64) -> Self {
        self.snapshots
            .push(TickSnapshot::new(Tick::new(tick), "_", Vec::new()));
        self
    }

    /// Append a stateless process entry to the most recent tick line.
    ///
    /// # Panics
    /// Panics if no tick line has been started yet.
    pub fn process(self, pid: u32, name: &str, quantum: i64) -> Self {
        self.push(ProcessObservation::new(Pid::new(pid), name, None, quantum))
    }

    /// Append a process entry that carries a state code.
    pub fn process_with_state(self, pid: u32, name: &str, state: u32, quantum: i64) -> Self {
        self.push(ProcessObservation::new(Pid::new(pid), name, Some(state), quantum))
    }

    fn push(mut self, proc: ProcessObservation) -> Self {
        let snap = self
            .snapshots
            .last_mut()
            .expect("TickLogBuilder::process called before any tick line");
        snap.processes.push(proc);
        self
    }

    pub fn build(self) -> TickLog {
        TickLog::new(self.snapshots)
    }

    /// Render the lines as captured text, one trace line per row.
    pub fn render(&self) -> String {
        let mut out = String::new();
        for snap in &self.snapshots {
            out.push_str(&snap.to_string());
            out.push('\n');
        }
        out
    }
}

//! In-memory representation of parsed scheduler observations.
//!
//! Two shapes exist, one per trace grammar:
//! - [`Trace`]: ordered [`LevelObservation`]s from the full grammar,
//!   carrying queue set, level, and level quantum.
//! - [`TickLog`]: ordered [`TickSnapshot`]s from the terse grammar,
//!   carrying only the process list.
//!
//! Both are built once by the parser and never mutated afterwards.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::error::{SchedlogError, SchedlogResult};
use crate::tick::Tick;

use super::pid::Pid;

// ── QueueSet ──────────────────────────────────────────────────────────

/// One of the two rotating queue sets of the multi-queue scheduler.
///
/// Round-robin traces only ever report `Active`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueueSet {
    Active,
    Expired,
}

impl QueueSet {
    /// The literal used in trace lines.
    pub fn as_str(self) -> &'static str {
        match self {
            QueueSet::Active => "active",
            QueueSet::Expired => "expired",
        }
    }
}

impl std::str::FromStr for QueueSet {
    type Err = SchedlogError;

    fn from_str(s: &str) -> SchedlogResult<Self> {
        match s {
            "active" => Ok(QueueSet::Active),
            "expired" => Ok(QueueSet::Expired),
            other => Err(SchedlogError::format("unknown queue set", other, s)),
        }
    }
}

impl std::fmt::Display for QueueSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── ProcessObservation ────────────────────────────────────────────────

/// One process's state at one scheduler decision point.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessObservation {
    pub pid: Pid,
    /// Program name; system processes reuse names, so not unique.
    pub name: String,
    /// Opaque kernel state code. `None` when the line carried no state
    /// (terse grammar).
    pub state: Option<u32>,
    /// Time units left before the process is descheduled from its level.
    pub quantum: i64,
}

impl ProcessObservation {
    pub fn new(pid: Pid, name: impl Into<String>, state: Option<u32>, quantum: i64) -> Self {
        ProcessObservation {
            pid,
            name: name.into(),
            state,
            quantum,
        }
    }

    /// Whether this observation shows the process on the CPU.
    ///
    /// With a state code the code decides. Without one, a positive
    /// remaining quantum counts as running.
    pub fn is_running(&self, running_state: u32) -> bool {
        match self.state {
            Some(state) => state == running_state,
            None => self.quantum > 0,
        }
    }
}

impl std::fmt::Display for ProcessObservation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.state {
            Some(state) => write!(f, "[{}]{}:{}({})", self.pid, self.name, state, self.quantum),
            None => write!(f, "[{}]{}({})", self.pid, self.name, self.quantum),
        }
    }
}

// ── LevelObservation ──────────────────────────────────────────────────

/// One scheduler queue snapshot at one tick.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LevelObservation {
    pub tick: Tick,
    pub queue_set: QueueSet,
    pub level: i64,
    pub level_quantum: i64,
    /// Scheduler priority order; index 0 is next to run.
    pub processes: Vec<ProcessObservation>,
}

impl LevelObservation {
    /// The process at the head of this queue, if any.
    pub fn head(&self) -> Option<&ProcessObservation> {
        self.processes.first()
    }

    /// The `(queue_set, level)` pair this observation belongs to.
    pub fn key(&self) -> (QueueSet, i64) {
        (self.queue_set, self.level)
    }
}

/// Renders the full grammar: `<tick>|<set>|<level>(<lq>),[pid]name:state(q)...`.
impl std::fmt::Display for LevelObservation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}|{}|{}({})",
            self.tick.ticks(),
            self.queue_set,
            self.level,
            self.level_quantum
        )?;
        for p in &self.processes {
            write!(f, ",{}", p)?;
        }
        Ok(())
    }
}

// ── Trace ─────────────────────────────────────────────────────────────

/// The ordered full-grammar observations of one captured run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Trace {
    levels: Vec<LevelObservation>,
}

impl Trace {
    /// Wrap observations in parse order.
    pub fn new(levels: Vec<LevelObservation>) -> Self {
        Trace { levels }
    }

    /// Observations in parse order.
    pub fn levels(&self) -> &[LevelObservation] {
        &self.levels
    }

    pub fn iter(&self) -> std::slice::Iter<'_, LevelObservation> {
        self.levels.iter()
    }

    pub fn len(&self) -> usize {
        self.levels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.levels.is_empty()
    }

    /// Queue sets that appear anywhere in the trace.
    pub fn queue_sets(&self) -> BTreeSet<QueueSet> {
        self.levels.iter().map(|l| l.queue_set).collect()
    }

    /// Distinct levels that appear anywhere in the trace.
    pub fn distinct_levels(&self) -> BTreeSet<i64> {
        self.levels.iter().map(|l| l.level).collect()
    }

    /// Every PID observed anywhere in the trace.
    pub fn pids(&self) -> BTreeSet<Pid> {
        self.levels
            .iter()
            .flat_map(|l| l.processes.iter().map(|p| p.pid))
            .collect()
    }

    /// Observations grouped by tick, each group in parse order.
    pub fn by_tick(&self) -> BTreeMap<Tick, Vec<&LevelObservation>> {
        let mut groups: BTreeMap<Tick, Vec<&LevelObservation>> = BTreeMap::new();
        for level in &self.levels {
            groups.entry(level.tick).or_default().push(level);
        }
        groups
    }

    /// Positions where the tick went backwards between consecutive
    /// entries: `(index, previous tick, tick)`.
    pub fn tick_regressions(&self) -> Vec<(usize, Tick, Tick)> {
        self.levels
            .windows(2)
            .enumerate()
            .filter(|(_, w)| w[1].tick < w[0].tick)
            .map(|(i, w)| (i + 1, w[0].tick, w[1].tick))
            .collect()
    }

    /// Flatten into per-line snapshots for the metrics extractor.
    pub fn to_tick_log(&self) -> TickLog {
        TickLog::new(
            self.levels
                .iter()
                .map(|l| TickSnapshot {
                    tick: l.tick,
                    field: l.queue_set.as_str().to_string(),
                    priority: Some((l.queue_set, l.level)),
                    processes: l.processes.clone(),
                })
                .collect(),
        )
    }
}

impl<'a> IntoIterator for &'a Trace {
    type Item = &'a LevelObservation;
    type IntoIter = std::slice::Iter<'a, LevelObservation>;

    fn into_iter(self) -> Self::IntoIter {
        self.levels.iter()
    }
}

// ── TickSnapshot / TickLog ────────────────────────────────────────────

/// One terse-grammar line: a tick and its process list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TickSnapshot {
    pub tick: Tick,
    /// The second `|` field, carried verbatim and otherwise ignored.
    pub field: String,
    /// Queue set and level when the snapshot came from a full-grammar
    /// line; used to pick the highest-priority queue at a tick.
    pub priority: Option<(QueueSet, i64)>,
    pub processes: Vec<ProcessObservation>,
}

impl TickSnapshot {
    pub fn new(tick: Tick, field: impl Into<String>, processes: Vec<ProcessObservation>) -> Self {
        TickSnapshot {
            tick,
            field: field.into(),
            priority: None,
            processes,
        }
    }

    /// Sort key: active before expired, then lower level first.
    /// Snapshots without priority information sort as `(active, 0)`.
    pub fn priority_rank(&self) -> (QueueSet, i64) {
        self.priority.unwrap_or((QueueSet::Active, 0))
    }
}

/// Renders the terse grammar: `<tick>|<field>|[pid]name(q)...`.
impl std::fmt::Display for TickSnapshot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}|{}|", self.tick.ticks(), self.field)?;
        for p in &self.processes {
            write!(f, "{}", p)?;
        }
        Ok(())
    }
}

/// Ordered terse-grammar snapshots of one captured run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TickLog {
    snapshots: Vec<TickSnapshot>,
}

impl TickLog {
    pub fn new(snapshots: Vec<TickSnapshot>) -> Self {
        TickLog { snapshots }
    }

    pub fn snapshots(&self) -> &[TickSnapshot] {
        &self.snapshots
    }

    pub fn iter(&self) -> std::slice::Iter<'_, TickSnapshot> {
        self.snapshots.iter()
    }

    pub fn len(&self) -> usize {
        self.snapshots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }

    /// Whether any observation carries a kernel state code.
    pub fn has_state_codes(&self) -> bool {
        self.snapshots
            .iter()
            .flat_map(|s| s.processes.iter())
            .any(|p| p.state.is_some())
    }

    /// Snapshots grouped by tick, each group in parse order.
    pub fn by_tick(&self) -> BTreeMap<Tick, Vec<&TickSnapshot>> {
        let mut groups: BTreeMap<Tick, Vec<&TickSnapshot>> = BTreeMap::new();
        for snap in &self.snapshots {
            groups.entry(snap.tick).or_default().push(snap);
        }
        groups
    }
}

impl<'a> IntoIterator for &'a TickLog {
    type Item = &'a TickSnapshot;
    type IntoIter = std::slice::Iter<'a, TickSnapshot>;

    fn into_iter(self) -> Self::IntoIter {
        self.snapshots.iter()
    }
}

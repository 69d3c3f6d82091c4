/// Scheduler-correctness properties checked over a full-grammar trace.
///
/// The scheduler under test is modelled as moving each process between
/// `(queue_set, level)` pairs. Each pair carries a quantum that decays
/// while the process stays there and is replenished on a transition.
/// Every property below is checked independently and reports all of
/// its violations; [`Verifier`] decides whether to keep going after the
/// first one.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::error::{SchedlogError, SchedlogResult};
use crate::policy::Policy;
use crate::tick::Tick;
use crate::trace::{LevelObservation, Pid, QueueSet, Trace};

// ── Invariant ─────────────────────────────────────────────────────────

/// The named properties the verifier knows how to check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Invariant {
    /// Ticks never decrease between consecutive trace lines.
    TickOrder,
    /// Levels and quanta are never negative.
    NonNegative,
    /// No PID is in both the active and expired set at one tick.
    SetExclusivity,
    /// A level's quantum only decays, or resets to its maximum.
    LevelQuantum,
    /// A process quantum decays within a pair and resets on transition.
    ProcessQuantum,
    /// Single active queue at level 0 with decaying quanta.
    RoundRobin,
    /// Both queue sets and at least two levels appear.
    StructuralMinimum,
}

impl Invariant {
    pub fn name(self) -> &'static str {
        match self {
            Invariant::TickOrder => "tick-order",
            Invariant::NonNegative => "non-negative",
            Invariant::SetExclusivity => "set-exclusivity",
            Invariant::LevelQuantum => "level-quantum",
            Invariant::ProcessQuantum => "process-quantum",
            Invariant::RoundRobin => "round-robin",
            Invariant::StructuralMinimum => "structural-minimum",
        }
    }

    /// Run this invariant over `trace`.
    pub fn evaluate(self, trace: &Trace) -> Vec<Violation> {
        match self {
            Invariant::TickOrder => check_tick_order(trace),
            Invariant::NonNegative => check_non_negative(trace),
            Invariant::SetExclusivity => check_set_exclusivity(trace),
            Invariant::LevelQuantum => check_level_quantum(trace),
            Invariant::ProcessQuantum => check_process_quantum(trace),
            Invariant::RoundRobin => check_round_robin(trace),
            Invariant::StructuralMinimum => check_structural_minimum(trace),
        }
    }
}

impl std::fmt::Display for Invariant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

// ── Violation ─────────────────────────────────────────────────────────

/// One failed check, with enough context to find it in the trace.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Violation {
    /// Name of the violated property.
    pub property: String,
    pub tick: Option<Tick>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub pids: Vec<Pid>,
    pub queue_set: Option<QueueSet>,
    pub level: Option<i64>,
    /// Value before the offending transition.
    pub before: Option<i64>,
    /// Value after the offending transition.
    pub after: Option<i64>,
    /// Human-readable violation message.
    pub message: String,
}

impl Violation {
    pub fn new(property: impl Into<String>, message: impl Into<String>) -> Self {
        Violation {
            property: property.into(),
            tick: None,
            pids: Vec::new(),
            queue_set: None,
            level: None,
            before: None,
            after: None,
            message: message.into(),
        }
    }

    fn of(invariant: Invariant, message: impl Into<String>) -> Self {
        Violation::new(invariant.name(), message)
    }

    pub fn at_tick(mut self, tick: Tick) -> Self {
        self.tick = Some(tick);
        self
    }

    pub fn with_pids(mut self, pids: impl IntoIterator<Item = Pid>) -> Self {
        self.pids = pids.into_iter().collect();
        self
    }

    pub fn in_queue(mut self, queue_set: QueueSet, level: i64) -> Self {
        self.queue_set = Some(queue_set);
        self.level = Some(level);
        self
    }

    pub fn values(mut self, before: i64, after: i64) -> Self {
        self.before = Some(before);
        self.after = Some(after);
        self
    }
}

impl std::fmt::Display for Violation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}]", self.property)?;
        if let Some(tick) = self.tick {
            write!(f, " {}", tick)?;
        }
        if let (Some(set), Some(level)) = (self.queue_set, self.level) {
            write!(f, " ({}, {})", set, level)?;
        }
        write!(f, " {}", self.message)
    }
}

// ── Property ──────────────────────────────────────────────────────────

/// A correctness property evaluated over a whole trace.
pub trait TraceProperty: Send + Sync {
    /// Name of the property (for violation reports).
    fn name(&self) -> &str;

    /// Every violation of the property in `trace`; empty means it holds.
    fn check(&self, trace: &Trace) -> Vec<Violation>;
}

impl TraceProperty for Invariant {
    fn name(&self) -> &str {
        Invariant::name(*self)
    }

    fn check(&self, trace: &Trace) -> Vec<Violation> {
        self.evaluate(trace)
    }
}

type CheckFn = Box<dyn Fn(&Trace) -> Vec<Violation> + Send + Sync>;

/// Convenience wrapper for closure-based properties.
pub struct NamedProperty {
    name: String,
    check_fn: CheckFn,
}

impl NamedProperty {
    pub fn new<F>(name: &str, f: F) -> Self
    where
        F: Fn(&Trace) -> Vec<Violation> + Send + Sync + 'static,
    {
        NamedProperty {
            name: name.to_string(),
            check_fn: Box::new(f),
        }
    }
}

impl TraceProperty for NamedProperty {
    fn name(&self) -> &str {
        &self.name
    }

    fn check(&self, trace: &Trace) -> Vec<Violation> {
        (self.check_fn)(trace)
    }
}

// ── Report ────────────────────────────────────────────────────────────

/// Whether verification stops at the first violation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CheckMode {
    #[default]
    CollectAll,
    FailFast,
}

/// Result of one property over one trace.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PropertyOutcome {
    pub property: String,
    pub violations: Vec<Violation>,
}

impl PropertyOutcome {
    pub fn passed(&self) -> bool {
        self.violations.is_empty()
    }
}

/// Summary of a completed verification run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationReport {
    /// Properties that were evaluated, in suite order. In fail-fast mode
    /// the list ends at the first failing property.
    pub outcomes: Vec<PropertyOutcome>,
}

impl VerificationReport {
    /// Whether all evaluated properties held.
    pub fn is_clean(&self) -> bool {
        self.outcomes.iter().all(PropertyOutcome::passed)
    }

    pub fn violation_count(&self) -> usize {
        self.outcomes.iter().map(|o| o.violations.len()).sum()
    }

    pub fn violations(&self) -> impl Iterator<Item = &Violation> {
        self.outcomes.iter().flat_map(|o| o.violations.iter())
    }

    pub fn first_violation(&self) -> Option<&Violation> {
        self.violations().next()
    }

    /// Outcome of the named property, if it was evaluated.
    pub fn outcome(&self, property: &str) -> Option<&PropertyOutcome> {
        self.outcomes.iter().find(|o| o.property == property)
    }

    /// Turn the report into a pass/fail gate on the first violation.
    pub fn into_result(self) -> SchedlogResult<()> {
        match self.outcomes.into_iter().flat_map(|o| o.violations).next() {
            Some(v) => Err(SchedlogError::Invariant(v)),
            None => Ok(()),
        }
    }
}

// ── Verifier ──────────────────────────────────────────────────────────

/// Runs a suite of properties over a trace.
pub struct Verifier {
    properties: Vec<Box<dyn TraceProperty>>,
    mode: CheckMode,
}

impl Verifier {
    /// An empty verifier that collects every violation.
    pub fn new() -> Self {
        Verifier {
            properties: Vec::new(),
            mode: CheckMode::CollectAll,
        }
    }

    /// The standard suite for traces captured under `policy`.
    pub fn for_policy(policy: Policy) -> Self {
        let suite: &[Invariant] = match policy {
            Policy::Mqss => &[
                Invariant::TickOrder,
                Invariant::NonNegative,
                Invariant::StructuralMinimum,
                Invariant::SetExclusivity,
                Invariant::LevelQuantum,
                Invariant::ProcessQuantum,
            ],
            Policy::Rr => &[
                Invariant::TickOrder,
                Invariant::NonNegative,
                Invariant::RoundRobin,
            ],
            Policy::Mlfq => &[
                Invariant::TickOrder,
                Invariant::NonNegative,
                Invariant::LevelQuantum,
                Invariant::ProcessQuantum,
            ],
        };

        let mut verifier = Verifier::new();
        for invariant in suite {
            verifier.add_property(Box::new(*invariant));
        }
        verifier
    }

    /// Add a property to the suite.
    pub fn add_property(&mut self, prop: Box<dyn TraceProperty>) -> &mut Self {
        self.properties.push(prop);
        self
    }

    /// Add a closure-based property.
    pub fn check<F>(&mut self, name: &str, f: F) -> &mut Self
    where
        F: Fn(&Trace) -> Vec<Violation> + Send + Sync + 'static,
    {
        self.properties.push(Box::new(NamedProperty::new(name, f)));
        self
    }

    pub fn set_mode(&mut self, mode: CheckMode) -> &mut Self {
        self.mode = mode;
        self
    }

    /// Names of the properties in suite order.
    pub fn property_names(&self) -> Vec<&str> {
        self.properties.iter().map(|p| p.name()).collect()
    }

    /// Evaluate the suite over `trace`.
    pub fn verify(&self, trace: &Trace) -> VerificationReport {
        let mut outcomes = Vec::with_capacity(self.properties.len());

        for prop in &self.properties {
            let mut violations = prop.check(trace);
            tracing::debug!(
                property = prop.name(),
                violations = violations.len(),
                "checked property"
            );

            let failed = !violations.is_empty();
            if failed && self.mode == CheckMode::FailFast {
                violations.truncate(1);
            }
            outcomes.push(PropertyOutcome {
                property: prop.name().to_string(),
                violations,
            });
            if failed && self.mode == CheckMode::FailFast {
                break;
            }
        }

        VerificationReport { outcomes }
    }
}

impl Default for Verifier {
    fn default() -> Self {
        Self::new()
    }
}

// ── Checks ────────────────────────────────────────────────────────────

fn check_tick_order(trace: &Trace) -> Vec<Violation> {
    trace
        .tick_regressions()
        .into_iter()
        .map(|(index, prev, tick)| {
            let v = Violation::of(
                Invariant::TickOrder,
                format!(
                    "line {}: tick decreased {} < {}",
                    index + 1,
                    tick.ticks(),
                    prev.ticks()
                ),
            )
            .at_tick(tick);
            // Ticks beyond i64 keep the message but carry no before/after.
            match (i64::try_from(prev.ticks()), i64::try_from(tick.ticks())) {
                (Ok(before), Ok(after)) => v.values(before, after),
                _ => v,
            }
        })
        .collect()
}

fn check_non_negative(trace: &Trace) -> Vec<Violation> {
    let mut violations = Vec::new();

    for (i, obs) in trace.iter().enumerate() {
        let line = i + 1;
        if obs.level < 0 {
            violations.push(
                Violation::of(Invariant::NonNegative, format!("line {}: negative level", line))
                    .at_tick(obs.tick)
                    .in_queue(obs.queue_set, obs.level),
            );
        }
        if obs.level_quantum < 0 {
            violations.push(
                Violation::of(
                    Invariant::NonNegative,
                    format!("line {}: negative level quantum {}", line, obs.level_quantum),
                )
                .at_tick(obs.tick)
                .in_queue(obs.queue_set, obs.level),
            );
        }
        for p in obs.processes.iter().filter(|p| p.quantum < 0) {
            violations.push(
                Violation::of(
                    Invariant::NonNegative,
                    format!("line {}: pid {} has negative quantum {}", line, p.pid, p.quantum),
                )
                .at_tick(obs.tick)
                .with_pids([p.pid])
                .in_queue(obs.queue_set, obs.level),
            );
        }
    }

    violations
}

fn check_set_exclusivity(trace: &Trace) -> Vec<Violation> {
    let mut violations = Vec::new();

    for (tick, group) in trace.by_tick() {
        let pids_in = |set: QueueSet| -> BTreeSet<Pid> {
            group
                .iter()
                .filter(|l| l.queue_set == set)
                .flat_map(|l| l.processes.iter().map(|p| p.pid))
                .collect()
        };
        let active = pids_in(QueueSet::Active);
        let expired = pids_in(QueueSet::Expired);
        let both: Vec<Pid> = active.intersection(&expired).copied().collect();

        if !both.is_empty() {
            let listed: Vec<String> = both.iter().map(Pid::to_string).collect();
            violations.push(
                Violation::of(
                    Invariant::SetExclusivity,
                    format!(
                        "tick {}: PIDs present in both active and expired: [{}]",
                        tick.ticks(),
                        listed.join(", ")
                    ),
                )
                .at_tick(tick)
                .with_pids(both),
            );
        }
    }

    violations
}

fn check_level_quantum(trace: &Trace) -> Vec<Violation> {
    let mut groups: BTreeMap<(QueueSet, i64), Vec<&LevelObservation>> = BTreeMap::new();
    for obs in trace {
        groups.entry(obs.key()).or_default().push(obs);
    }

    let mut violations = Vec::new();

    for ((set, level), mut history) in groups {
        history.sort_by_key(|l| l.tick);
        let max_q = history.iter().map(|l| l.level_quantum).max().unwrap_or(0);

        let mut prev: Option<(Tick, i64)> = None;
        for obs in history {
            if let Some((prev_tick, prev_q)) = prev {
                // Lines at the same tick are simultaneous, not a transition.
                let increased = obs.tick != prev_tick && obs.level_quantum > prev_q;
                if increased && obs.level_quantum != max_q {
                    violations.push(
                        Violation::of(
                            Invariant::LevelQuantum,
                            format!(
                                "level quantum increased {} -> {} (max {})",
                                prev_q, obs.level_quantum, max_q
                            ),
                        )
                        .at_tick(obs.tick)
                        .in_queue(set, level)
                        .values(prev_q, obs.level_quantum),
                    );
                }
            }
            prev = Some((obs.tick, obs.level_quantum));
        }
    }

    violations
}

/// One process observation flattened out of its level line.
#[derive(Debug, Clone, Copy)]
struct ProcessStep {
    tick: Tick,
    queue_set: QueueSet,
    level: i64,
    quantum: i64,
}

fn process_histories(trace: &Trace) -> BTreeMap<Pid, Vec<ProcessStep>> {
    let mut per_pid: BTreeMap<Pid, Vec<ProcessStep>> = BTreeMap::new();
    for obs in trace {
        for p in &obs.processes {
            per_pid.entry(p.pid).or_default().push(ProcessStep {
                tick: obs.tick,
                queue_set: obs.queue_set,
                level: obs.level,
                quantum: p.quantum,
            });
        }
    }
    for history in per_pid.values_mut() {
        history.sort_by_key(|s| s.tick);
    }
    per_pid
}

fn check_process_quantum(trace: &Trace) -> Vec<Violation> {
    let mut violations = Vec::new();

    for (pid, history) in process_histories(trace) {
        let max_q = history.iter().map(|s| s.quantum).max().unwrap_or(0);

        for pair in history.windows(2) {
            let (prev, cur) = (pair[0], pair[1]);
            let same_queue = prev.queue_set == cur.queue_set && prev.level == cur.level;

            let message = if same_queue {
                // Reaching the historical maximum again is indistinguishable
                // from a replenishment and passes.
                (cur.quantum > prev.quantum && cur.quantum != max_q).then(|| {
                    format!(
                        "pid {}: quantum increased {} -> {} without replenishment to {}",
                        pid, prev.quantum, cur.quantum, max_q
                    )
                })
            } else {
                (cur.quantum != max_q).then(|| {
                    format!(
                        "pid {}: expected quantum reset to {} on move ({}, {}) -> ({}, {}), got {}",
                        pid, max_q, prev.queue_set, prev.level, cur.queue_set, cur.level, cur.quantum
                    )
                })
            };

            if let Some(message) = message {
                violations.push(
                    Violation::of(Invariant::ProcessQuantum, message)
                        .at_tick(cur.tick)
                        .with_pids([pid])
                        .in_queue(cur.queue_set, cur.level)
                        .values(prev.quantum, cur.quantum),
                );
            }
        }
    }

    violations
}

fn check_round_robin(trace: &Trace) -> Vec<Violation> {
    let mut violations = Vec::new();

    for (i, obs) in trace.iter().enumerate() {
        if obs.queue_set != QueueSet::Active {
            violations.push(
                Violation::of(
                    Invariant::RoundRobin,
                    format!("line {}: found {} set", i + 1, obs.queue_set),
                )
                .at_tick(obs.tick)
                .in_queue(obs.queue_set, obs.level),
            );
        }
        if obs.level != 0 {
            violations.push(
                Violation::of(
                    Invariant::RoundRobin,
                    format!("line {}: found nonzero level {}", i + 1, obs.level),
                )
                .at_tick(obs.tick)
                .in_queue(obs.queue_set, obs.level),
            );
        }
    }

    for (pid, history) in process_histories(trace) {
        for pair in history.windows(2) {
            let (prev, cur) = (pair[0], pair[1]);
            if cur.quantum > prev.quantum {
                violations.push(
                    Violation::of(
                        Invariant::RoundRobin,
                        format!("pid {}: quantum increased {} -> {}", pid, prev.quantum, cur.quantum),
                    )
                    .at_tick(cur.tick)
                    .with_pids([pid])
                    .values(prev.quantum, cur.quantum),
                );
            }
        }
    }

    violations
}

fn check_structural_minimum(trace: &Trace) -> Vec<Violation> {
    let mut violations = Vec::new();

    let sets = trace.queue_sets();
    if !(sets.contains(&QueueSet::Active) && sets.contains(&QueueSet::Expired)) {
        violations.push(Violation::of(
            Invariant::StructuralMinimum,
            "missing active/expired sets",
        ));
    }
    if trace.distinct_levels().len() < 2 {
        violations.push(Violation::of(
            Invariant::StructuralMinimum,
            "missing multiple levels",
        ));
    }

    violations
}

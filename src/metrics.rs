/// Per-process timing and CPU-utilisation metrics.
///
/// A "test process" is a set of PIDs (exec can hand a program a new PID
/// mid-run) chosen by a [`TestProcessSelector`]. All metrics are computed
/// over distinct ticks: several level lines printed at the same tick
/// count as one scheduler instant.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::config::{ContextSwitchMode, VerifierConfig};
use crate::error::{SchedlogError, SchedlogResult};
use crate::tick::Tick;
use crate::trace::{Pid, TickLog, TickSnapshot};

// ── Test-process selection ────────────────────────────────────────────

/// Rule for picking the PIDs that make up the process under test.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TestProcessSelector {
    /// The first PID whose name is not a system process. Ambiguous when
    /// several user processes appear together; the earliest one wins.
    FirstNonSystem,
    /// Every non-system PID whose name contains, or is contained in,
    /// the program token.
    Program(String),
}

impl TestProcessSelector {
    /// Resolve the selector against a trace.
    pub fn select(&self, log: &TickLog, config: &VerifierConfig) -> SchedlogResult<BTreeSet<Pid>> {
        let candidates = log
            .iter()
            .flat_map(|s| s.processes.iter())
            .filter(|p| !config.is_system_process(&p.name));

        let pids: BTreeSet<Pid> = match self {
            TestProcessSelector::FirstNonSystem => {
                candidates.map(|p| p.pid).take(1).collect()
            }
            TestProcessSelector::Program(program) => candidates
                .filter(|p| program.contains(p.name.as_str()) || p.name.contains(program.as_str()))
                .map(|p| p.pid)
                .collect(),
        };

        if pids.is_empty() {
            return Err(SchedlogError::not_found("test process", &[] as &[Pid]));
        }
        Ok(pids)
    }
}

// ── ProcessMetrics ────────────────────────────────────────────────────

/// Derived metrics for one logical test process.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessMetrics {
    /// Lowest PID of the set; stable across exec-driven PID changes.
    pub pid: Pid,
    pub arrival_tick: Tick,
    pub first_execution_tick: Tick,
    pub ending_tick: Tick,
    pub response_time: u64,
    pub turnaround_time: u64,
    pub total_running_ticks: u64,
    pub cpu_percent: f64,
    pub context_switches: u64,
}

// ── MetricComputer ────────────────────────────────────────────────────

/// Computes [`ProcessMetrics`] from a [`TickLog`] and a PID set.
#[derive(Debug, Clone, Copy)]
pub struct MetricComputer<'a> {
    config: &'a VerifierConfig,
}

impl<'a> MetricComputer<'a> {
    pub fn new(config: &'a VerifierConfig) -> Self {
        MetricComputer { config }
    }

    /// Tick of the first observation of any member PID, in any state.
    pub fn arrival_tick(&self, log: &TickLog, pids: &BTreeSet<Pid>) -> SchedlogResult<Tick> {
        observed_ticks(log, pids)
            .next()
            .ok_or_else(|| SchedlogError::not_found("arrival tick", pids))
    }

    /// Tick of the first observation of a member PID in the running state.
    pub fn first_execution_tick(&self, log: &TickLog, pids: &BTreeSet<Pid>) -> SchedlogResult<Tick> {
        self.running_ticks(log, pids)
            .into_iter()
            .next()
            .ok_or_else(|| SchedlogError::not_found("first execution tick", pids))
    }

    /// Tick of the last observation of any member PID, in any state.
    pub fn ending_tick(&self, log: &TickLog, pids: &BTreeSet<Pid>) -> SchedlogResult<Tick> {
        observed_ticks(log, pids)
            .last()
            .ok_or_else(|| SchedlogError::not_found("ending tick", pids))
    }

    /// Distinct ticks in which a member PID was running. A tick counts
    /// once even if several members are reported running in it.
    pub fn running_ticks(&self, log: &TickLog, pids: &BTreeSet<Pid>) -> BTreeSet<Tick> {
        log.iter()
            .filter(|s| {
                s.processes
                    .iter()
                    .any(|p| pids.contains(&p.pid) && p.is_running(self.config.running_state))
            })
            .map(|s| s.tick)
            .collect()
    }

    pub fn total_running_ticks(&self, log: &TickLog, pids: &BTreeSet<Pid>) -> u64 {
        self.running_ticks(log, pids).len() as u64
    }

    /// Share of the process lifetime spent running, in percent.
    ///
    /// A zero-length lifetime is 100%. The result never exceeds 100%,
    /// even when the process also runs on its final tick.
    pub fn cpu_percent(&self, log: &TickLog, pids: &BTreeSet<Pid>) -> SchedlogResult<f64> {
        let arrival = self.arrival_tick(log, pids)?;
        let ending = self.ending_tick(log, pids)?;
        let duration = ending.saturating_since(arrival);
        if duration == 0 {
            return Ok(100.0);
        }
        let running = self.total_running_ticks(log, pids) as f64;
        Ok((running / duration as f64 * 100.0).min(100.0))
    }

    /// Number of ticks at which the scheduled PID differs from the one
    /// scheduled at the previous tick.
    ///
    /// A tick with nothing scheduled is not a switch, but it clears the
    /// baseline, so the next scheduled PID counts even if it is the same
    /// one that ran before the gap.
    pub fn context_switches(&self, log: &TickLog, pids: &BTreeSet<Pid>) -> u64 {
        let mode = match self.config.context_switches {
            ContextSwitchMode::Auto if log.has_state_codes() => ContextSwitchMode::RunningMember,
            ContextSwitchMode::Auto => ContextSwitchMode::HeadOfQueue,
            explicit => explicit,
        };

        let mut switches = 0;
        let mut prev: Option<Pid> = None;

        for (_, group) in log.by_tick() {
            let scheduled = match mode {
                ContextSwitchMode::RunningMember => self.running_member(&group, pids),
                _ => scheduled_head(&group),
            };
            if scheduled.is_some() && scheduled != prev {
                switches += 1;
            }
            prev = scheduled;
        }
        switches
    }

    /// Compute every metric for the PID set.
    pub fn compute(&self, log: &TickLog, pids: &BTreeSet<Pid>) -> SchedlogResult<ProcessMetrics> {
        let pid = *pids
            .iter()
            .next()
            .ok_or_else(|| SchedlogError::not_found("test process", pids))?;

        let arrival_tick = self.arrival_tick(log, pids)?;
        let first_execution_tick = self.first_execution_tick(log, pids)?;
        let ending_tick = self.ending_tick(log, pids)?;

        Ok(ProcessMetrics {
            pid,
            arrival_tick,
            first_execution_tick,
            ending_tick,
            response_time: first_execution_tick.saturating_since(arrival_tick),
            turnaround_time: ending_tick.saturating_since(arrival_tick),
            total_running_ticks: self.total_running_ticks(log, pids),
            cpu_percent: self.cpu_percent(log, pids)?,
            context_switches: self.context_switches(log, pids),
        })
    }

    fn running_member(&self, group: &[&TickSnapshot], pids: &BTreeSet<Pid>) -> Option<Pid> {
        group
            .iter()
            .flat_map(|s| s.processes.iter())
            .find(|p| pids.contains(&p.pid) && p.is_running(self.config.running_state))
            .map(|p| p.pid)
    }
}

/// Select the test process and compute its metrics in one call.
pub fn compute_metrics(
    log: &TickLog,
    selector: &TestProcessSelector,
    config: &VerifierConfig,
) -> SchedlogResult<ProcessMetrics> {
    let pids = selector.select(log, config)?;
    tracing::debug!(?pids, "selected test process");
    MetricComputer::new(config).compute(log, &pids)
}

/// Ticks at which a member PID was observed, ascending and distinct.
fn observed_ticks<'l>(log: &'l TickLog, pids: &'l BTreeSet<Pid>) -> impl Iterator<Item = Tick> + 'l {
    log.by_tick()
        .into_iter()
        .filter(|(_, group)| {
            group
                .iter()
                .any(|s| s.processes.iter().any(|p| pids.contains(&p.pid)))
        })
        .map(|(tick, _)| tick)
}

/// Head of the highest-priority non-empty queue among the snapshots of
/// one tick.
fn scheduled_head(group: &[&TickSnapshot]) -> Option<Pid> {
    group
        .iter()
        .filter(|s| !s.processes.is_empty())
        .min_by_key(|s| s.priority_rank())
        .and_then(|s| s.processes.first())
        .map(|p| p.pid)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dsl::{TickLogBuilder, TraceBuilder};
    use crate::trace::parse_terse;

    fn pids(raw: &[u32]) -> BTreeSet<Pid> {
        raw.iter().copied().map(Pid::new).collect()
    }

    #[test]
    fn test_terse_quantum_rule_scenario() {
        let log = parse_terse("0|_|[5]prog(3)\n1|_|[5]prog(2)\n2|_|[5]prog(0)\n");
        let config = VerifierConfig::default();

        let m = compute_metrics(&log, &TestProcessSelector::FirstNonSystem, &config).unwrap();
        assert_eq!(m.pid, Pid::new(5));
        assert_eq!(m.response_time, 0);
        assert_eq!(m.turnaround_time, 2);
        assert_eq!(m.total_running_ticks, 2);
        assert_eq!(m.cpu_percent, 100.0);
        assert_eq!(m.context_switches, 1);
    }

    #[test]
    fn test_first_non_system_skips_init_and_sh() {
        let log = TickLogBuilder::new()
            .tick(0)
            .process(1, "init", 1)
            .process(2, "sh", 1)
            .tick(1)
            .process(3, "tbg", 1)
            .process(4, "tfkio", 1)
            .build();

        let got = TestProcessSelector::FirstNonSystem
            .select(&log, &VerifierConfig::default())
            .unwrap();
        assert_eq!(got, pids(&[3]));
    }

    #[test]
    fn test_program_selector_collects_every_matching_pid() {
        let log = TickLogBuilder::new()
            .tick(0)
            .process(3, "tfkcpu", 1)
            .tick(1)
            .process(4, "tfkcpu", 1)
            .process(5, "sh", 1)
            .process(6, "other", 1)
            .build();

        let got = TestProcessSelector::Program("tfkcpu".into())
            .select(&log, &VerifierConfig::default())
            .unwrap();
        assert_eq!(got, pids(&[3, 4]));
    }

    #[test]
    fn test_selector_not_found() {
        let log = TickLogBuilder::new().tick(0).process(1, "init", 1).build();
        let err = TestProcessSelector::FirstNonSystem
            .select(&log, &VerifierConfig::default())
            .unwrap_err();
        assert!(matches!(err, SchedlogError::NotFound { .. }));
    }

    #[test]
    fn test_never_running_is_not_found() {
        let log = TickLogBuilder::new()
            .tick(0)
            .process_with_state(7, "tbg", 3, 5)
            .tick(4)
            .process_with_state(7, "tbg", 2, 5)
            .build();

        let config = VerifierConfig::default();
        let err = MetricComputer::new(&config)
            .compute(&log, &pids(&[7]))
            .unwrap_err();
        assert!(err.to_string().contains("first execution tick"));
    }

    #[test]
    fn test_state_codes_decide_running() {
        let log = TickLogBuilder::new()
            .tick(10)
            .process_with_state(7, "tbg", 3, 5)
            .tick(12)
            .process_with_state(7, "tbg", 4, 5)
            .tick(13)
            .process_with_state(7, "tbg", 4, 4)
            .tick(20)
            .process_with_state(7, "tbg", 2, 0)
            .build();

        let config = VerifierConfig::default();
        let m = MetricComputer::new(&config).compute(&log, &pids(&[7])).unwrap();
        assert_eq!(m.arrival_tick, Tick::new(10));
        assert_eq!(m.first_execution_tick, Tick::new(12));
        assert_eq!(m.ending_tick, Tick::new(20));
        assert_eq!(m.response_time, 2);
        assert_eq!(m.turnaround_time, 10);
        assert_eq!(m.total_running_ticks, 2);
        assert_eq!(m.cpu_percent, 20.0);
    }

    #[test]
    fn test_running_tick_counted_once_for_multiple_members() {
        let log = TickLogBuilder::new()
            .tick(0)
            .process_with_state(3, "tfk", 4, 2)
            .process_with_state(4, "tfk", 4, 2)
            .tick(5)
            .process_with_state(3, "tfk", 2, 0)
            .build();

        let config = VerifierConfig::default();
        let computer = MetricComputer::new(&config);
        assert_eq!(computer.total_running_ticks(&log, &pids(&[3, 4])), 1);
    }

    #[test]
    fn test_single_tick_lifetime_is_full_cpu() {
        let log = TickLogBuilder::new().tick(3).process(9, "x", 1).build();
        let config = VerifierConfig::default();
        let pct = MetricComputer::new(&config).cpu_percent(&log, &pids(&[9])).unwrap();
        assert_eq!(pct, 100.0);
    }

    #[test]
    fn test_representative_pid_is_minimum() {
        let log = TickLogBuilder::new()
            .tick(0)
            .process_with_state(9, "tfk", 4, 1)
            .tick(1)
            .process_with_state(4, "tfk", 4, 1)
            .build();

        let config = VerifierConfig::default();
        let m = MetricComputer::new(&config).compute(&log, &pids(&[4, 9])).unwrap();
        assert_eq!(m.pid, Pid::new(4));
    }

    #[test]
    fn test_running_member_switches_with_idle_baseline() {
        // running: 3, 3, none, 3, 4, 4 -> switches at first 3, after idle, and to 4.
        let log = TickLogBuilder::new()
            .tick(0)
            .process_with_state(3, "tfk", 4, 5)
            .tick(1)
            .process_with_state(3, "tfk", 4, 4)
            .tick(2)
            .process_with_state(3, "tfk", 3, 4)
            .tick(3)
            .process_with_state(3, "tfk", 4, 3)
            .tick(4)
            .process_with_state(4, "tfk", 4, 5)
            .tick(5)
            .process_with_state(4, "tfk", 4, 4)
            .build();

        let config = VerifierConfig::default();
        let switches = MetricComputer::new(&config).context_switches(&log, &pids(&[3, 4]));
        assert_eq!(switches, 3);
    }

    #[test]
    fn test_head_of_queue_switches() {
        let log = TickLogBuilder::new()
            .tick(0)
            .process(1, "init", 1)
            .tick(1)
            .process(5, "prog", 3)
            .tick(2)
            .tick(3)
            .process(5, "prog", 2)
            .tick(4)
            .process(1, "init", 1)
            .build();

        let config = VerifierConfig::default();
        let switches = MetricComputer::new(&config).context_switches(&log, &pids(&[5]));
        // none -> 1, 1 -> 5, (empty tick clears baseline), none -> 5, 5 -> 1
        assert_eq!(switches, 4);
    }

    #[test]
    fn test_head_of_queue_prefers_active_low_level() {
        let trace = TraceBuilder::new()
            .expired(0, 0, 10)
            .queued(8, "b", 10)
            .active(0, 1, 20)
            .queued(7, "a", 20)
            .active(0, 0, 10)
            .queued(6, "c", 10)
            .expired(1, 0, 10)
            .queued(8, "b", 10)
            .active(1, 1, 20)
            .queued(7, "a", 20)
            .build();

        let config = VerifierConfig {
            context_switches: ContextSwitchMode::HeadOfQueue,
            ..VerifierConfig::default()
        };
        let log = trace.to_tick_log();
        // tick 0 head: pid 6 (active, 0); tick 1 head: pid 7 (active, 1).
        let switches = MetricComputer::new(&config).context_switches(&log, &pids(&[7]));
        assert_eq!(switches, 2);
    }

    #[test]
    fn test_idle_tick_resets_baseline_in_both_modes() {
        let stateless = TickLogBuilder::new()
            .tick(0)
            .process(5, "prog", 3)
            .tick(1)
            .tick(2)
            .process(5, "prog", 2)
            .build();
        let with_states = TickLogBuilder::new()
            .tick(0)
            .process_with_state(5, "prog", 4, 3)
            .tick(1)
            .process_with_state(5, "prog", 3, 3)
            .tick(2)
            .process_with_state(5, "prog", 4, 2)
            .build();

        let config = VerifierConfig::default();
        let computer = MetricComputer::new(&config);
        // prog, idle, prog: the return after the gap is a switch.
        assert_eq!(computer.context_switches(&stateless, &pids(&[5])), 2);
        assert_eq!(computer.context_switches(&with_states, &pids(&[5])), 2);

        let head_of_queue = VerifierConfig {
            context_switches: ContextSwitchMode::HeadOfQueue,
            ..VerifierConfig::default()
        };
        // Head of queue never sees an idle tick here: pid 5 stays queued.
        assert_eq!(
            MetricComputer::new(&head_of_queue).context_switches(&with_states, &pids(&[5])),
            1
        );
    }
}

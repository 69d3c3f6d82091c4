//! Batch processing over a directory of captured runs.
//!
//! Captured logs are named `<program>_<policy>_run<NNN>.log`. Every file
//! is processed on its own, so the batch fans out over `rayon` and a
//! failure in one run is recorded instead of aborting the others.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use rayon::prelude::*;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::config::VerifierConfig;
use crate::error::{SchedlogError, SchedlogResult};
use crate::invariants::{CheckMode, VerificationReport, Verifier};
use crate::metrics::{compute_metrics, ProcessMetrics, TestProcessSelector};
use crate::policy::Policy;
use crate::trace::{read_full, read_terse};

// ── Log names ─────────────────────────────────────────────────────────

fn log_name_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^(?P<program>\w+)_(?P<policy>\w+?)_run(?P<run>\d+)\.log$")
            .expect("log name regex")
    })
}

/// The components of a captured log's file name.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RunLogName {
    pub program: String,
    pub policy: Policy,
    pub run: u32,
}

impl RunLogName {
    /// Parse a bare file name. The program may contain underscores; the
    /// policy is the last component before `_run`.
    pub fn parse(file_name: &str) -> SchedlogResult<Self> {
        let caps = log_name_regex()
            .captures(file_name)
            .ok_or_else(|| SchedlogError::InvalidLogName(file_name.to_string()))?;

        let policy = caps["policy"].parse::<Policy>()?;
        let run = caps["run"]
            .parse::<u32>()
            .map_err(|_| SchedlogError::InvalidLogName(file_name.to_string()))?;

        Ok(RunLogName {
            program: caps["program"].to_string(),
            policy,
            run,
        })
    }

    /// Parse the file-name component of `path`.
    pub fn from_path(path: &Path) -> SchedlogResult<Self> {
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| SchedlogError::InvalidLogName(path.display().to_string()))?;
        Self::parse(name)
    }
}

impl std::fmt::Display for RunLogName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}_{}_run{:03}.log", self.program, self.policy, self.run)
    }
}

/// A discovered log file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunLog {
    pub name: RunLogName,
    pub path: PathBuf,
}

/// Logs in `dir`, grouped by `(program, policy)` and ordered by run.
///
/// Files that do not follow the naming convention are ignored.
pub fn discover_logs(dir: &Path) -> SchedlogResult<BTreeMap<(String, Policy), Vec<RunLog>>> {
    let entries = std::fs::read_dir(dir).map_err(|e| SchedlogError::io(dir, e))?;
    let mut groups: BTreeMap<(String, Policy), Vec<RunLog>> = BTreeMap::new();

    for entry in entries {
        let path = entry.map_err(|e| SchedlogError::io(dir, e))?.path();
        if !path.is_file() {
            continue;
        }
        match RunLogName::from_path(&path) {
            Ok(name) => groups
                .entry((name.program.clone(), name.policy))
                .or_default()
                .push(RunLog { name, path }),
            Err(e) => tracing::debug!(path = %path.display(), error = %e, "ignoring file"),
        }
    }

    for runs in groups.values_mut() {
        runs.sort_by(|a, b| a.name.run.cmp(&b.name.run).then_with(|| a.path.cmp(&b.path)));
    }
    Ok(groups)
}

fn all_runs(dir: &Path) -> SchedlogResult<Vec<RunLog>> {
    let groups = discover_logs(dir)?;
    tracing::info!(
        dir = %dir.display(),
        combinations = groups.len(),
        "discovered program/policy combinations"
    );
    for ((program, policy), runs) in &groups {
        tracing::info!(%program, %policy, runs = runs.len(), "queued runs");
    }
    Ok(groups.into_values().flatten().collect())
}

// ── Metrics batch ─────────────────────────────────────────────────────

/// One row of the metrics table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricsRow {
    pub program: String,
    pub policy: Policy,
    pub run: u32,
    #[serde(flatten)]
    pub metrics: ProcessMetrics,
}

/// A run that produced no row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkippedRun {
    pub file: PathBuf,
    pub reason: String,
}

/// Rows for every usable run plus the runs that were skipped.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BatchReport {
    pub rows: Vec<MetricsRow>,
    pub skipped: Vec<SkippedRun>,
}

/// Compute metrics for every log in `dir`.
///
/// Runs with no usable trace or no identifiable test process are skipped
/// and listed in the report. A file that cannot be read fails the batch.
pub fn collect_metrics(dir: &Path, config: &VerifierConfig) -> SchedlogResult<BatchReport> {
    let runs = all_runs(dir)?;

    let results: Vec<SchedlogResult<Result<MetricsRow, SkippedRun>>> = runs
        .par_iter()
        .map(|run| {
            Ok(metrics_row(run, config)?.map_err(|reason| {
                tracing::warn!(file = %run.path.display(), %reason, "skipping run");
                SkippedRun {
                    file: run.path.clone(),
                    reason,
                }
            }))
        })
        .collect();

    let mut report = BatchReport::default();
    for result in results {
        match result? {
            Ok(row) => report.rows.push(row),
            Err(skipped) => report.skipped.push(skipped),
        }
    }
    report
        .rows
        .sort_by(|a, b| (&a.program, a.policy, a.run).cmp(&(&b.program, b.policy, b.run)));

    tracing::info!(
        rows = report.rows.len(),
        skipped = report.skipped.len(),
        "collected metrics"
    );
    Ok(report)
}

/// `Ok(Err(reason))` for a run that is skipped; `Err` only for errors
/// that say nothing about the trace itself.
fn metrics_row(run: &RunLog, config: &VerifierConfig) -> SchedlogResult<Result<MetricsRow, String>> {
    let log = read_terse(&run.path)?;
    if log.is_empty() {
        return Ok(Err("empty log".to_string()));
    }

    let selector = TestProcessSelector::Program(run.name.program.clone());
    let metrics = match compute_metrics(&log, &selector, config) {
        Ok(metrics) => metrics,
        Err(e) if e.is_skippable() => return Ok(Err(e.to_string())),
        Err(e) => return Err(e),
    };

    Ok(Ok(MetricsRow {
        program: run.name.program.clone(),
        policy: run.name.policy,
        run: run.name.run,
        metrics,
    }))
}

// ── Verification batch ────────────────────────────────────────────────

/// What happened when one log was checked.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum VerifyOutcome {
    Checked(VerificationReport),
    /// The log could not be read or did not match the full grammar.
    Unparsable { reason: String },
}

/// Verification result for one log file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileVerification {
    pub file: PathBuf,
    pub name: RunLogName,
    pub outcome: VerifyOutcome,
}

impl FileVerification {
    /// Whether the log parsed and every property held.
    pub fn passed(&self) -> bool {
        matches!(&self.outcome, VerifyOutcome::Checked(r) if r.is_clean())
    }
}

/// Run each log's policy suite over every log in `dir`, grouped by
/// `(program, policy)` and ordered by run.
pub fn verify_logs(dir: &Path, config: &VerifierConfig) -> SchedlogResult<Vec<FileVerification>> {
    let runs = all_runs(dir)?;
    let mode = if config.fail_fast {
        CheckMode::FailFast
    } else {
        CheckMode::CollectAll
    };

    let results: Vec<FileVerification> = runs
        .par_iter()
        .map(|run| {
            let outcome = match read_full(&run.path) {
                Ok(trace) => {
                    let mut verifier = Verifier::for_policy(run.name.policy);
                    verifier.set_mode(mode);
                    let report = verifier.verify(&trace);
                    if !report.is_clean() {
                        tracing::warn!(
                            file = %run.path.display(),
                            violations = report.violation_count(),
                            "invariant violations"
                        );
                    }
                    VerifyOutcome::Checked(report)
                }
                Err(e) => {
                    tracing::warn!(file = %run.path.display(), error = %e, "cannot verify run");
                    VerifyOutcome::Unparsable {
                        reason: e.to_string(),
                    }
                }
            };
            FileVerification {
                file: run.path.clone(),
                name: run.name.clone(),
                outcome,
            }
        })
        .collect();

    Ok(results)
}

// ── Summary statistics ────────────────────────────────────────────────

const METRIC_NAMES: [&str; 5] = [
    "response_time",
    "turnaround_time",
    "total_running_ticks",
    "cpu_percent",
    "context_switches",
];

fn metric_values(m: &ProcessMetrics) -> [f64; 5] {
    [
        m.response_time as f64,
        m.turnaround_time as f64,
        m.total_running_ticks as f64,
        m.cpu_percent,
        m.context_switches as f64,
    ]
}

/// Descriptive statistics of one metric over the runs of one
/// `(program, policy)` pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricSummary {
    pub program: String,
    pub policy: Policy,
    pub metric: String,
    pub runs: usize,
    pub mean: f64,
    pub median: f64,
    pub range: f64,
    /// Sample standard deviation; `None` with fewer than two runs.
    pub sd: Option<f64>,
}

/// Summarize `rows` per `(program, policy, metric)`.
pub fn summarize(rows: &[MetricsRow]) -> Vec<MetricSummary> {
    let mut groups: BTreeMap<(&str, Policy), Vec<&ProcessMetrics>> = BTreeMap::new();
    for row in rows {
        groups
            .entry((row.program.as_str(), row.policy))
            .or_default()
            .push(&row.metrics);
    }

    let mut out = Vec::new();
    for ((program, policy), members) in groups {
        let table: Vec<[f64; 5]> = members.iter().map(|m| metric_values(m)).collect();
        for (i, metric) in METRIC_NAMES.iter().enumerate() {
            let values: Vec<f64> = table.iter().map(|row| row[i]).collect();
            out.push(MetricSummary {
                program: program.to_string(),
                policy,
                metric: metric.to_string(),
                runs: values.len(),
                mean: mean(&values),
                median: median(&values),
                range: range(&values),
                sd: sample_sd(&values),
            });
        }
    }
    out
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

fn median(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    } else {
        sorted[mid]
    }
}

fn range(values: &[f64]) -> f64 {
    let min = values.iter().copied().fold(f64::INFINITY, f64::min);
    let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    if values.is_empty() {
        0.0
    } else {
        max - min
    }
}

fn sample_sd(values: &[f64]) -> Option<f64> {
    if values.len() < 2 {
        return None;
    }
    let m = mean(values);
    let var = values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / (values.len() - 1) as f64;
    Some(var.sqrt())
}

//! `schedlog` command-line entry point.

use std::io;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing_subscriber::EnvFilter;

use schedlog::report::{collect_metrics, summarize, verify_logs, RunLogName, VerifyOutcome};
use schedlog::trace::{read_full, read_terse};
use schedlog::{
    compute_metrics, CheckMode, Policy, ProcessMetrics, SchedlogError, SchedlogResult,
    TestProcessSelector, Verifier, VerifierConfig,
};

/// Verify and measure scheduler traces captured from an instrumented kernel
#[derive(Parser, Debug)]
#[command(name = "schedlog")]
#[command(version, about, long_about = None)]
#[command(after_help = "Examples:
  schedlog check runner_logs/tbg_MQSS_run001.log      Check invariants, policy from the name
  schedlog metrics run.log --program tbg               Timing metrics for one run
  schedlog report runner_logs --verify --summary       Batch over a log directory
")]
struct Cli {
    /// JSON configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log batch progress to stderr
    #[arg(short = 'v', long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Check scheduler invariants on one full-grammar trace
    Check {
        file: PathBuf,
        /// Scheduling policy (rr, mqss, mlfq); defaults to the one in the file name
        #[arg(long)]
        policy: Option<Policy>,
        /// Stop at the first violation
        #[arg(long)]
        fail_fast: bool,
        #[arg(long)]
        json: bool,
    },
    /// Compute timing metrics for one trace
    Metrics {
        file: PathBuf,
        /// Program name token identifying the process under test
        #[arg(long)]
        program: Option<String>,
        #[arg(long)]
        json: bool,
    },
    /// Process every `<program>_<policy>_runNNN.log` in a directory
    Report {
        /// Log directory; defaults to the configured `log_dir`
        dir: Option<PathBuf>,
        /// Run invariant suites instead of metrics
        #[arg(long)]
        verify: bool,
        /// Print per-metric descriptive statistics
        #[arg(long)]
        summary: bool,
        #[arg(long)]
        json: bool,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "info" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_target(false)
        .with_writer(io::stderr)
        .init();

    match run(cli) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::from(1),
        Err(err) => {
            eprintln!("error: {}", err);
            ExitCode::from(2)
        }
    }
}

/// Returns `Ok(false)` when the command ran but found a correctness failure.
fn run(cli: Cli) -> SchedlogResult<bool> {
    let config = VerifierConfig::load(cli.config.as_deref())?;

    match cli.command {
        Command::Check {
            file,
            policy,
            fail_fast,
            json,
        } => check(&file, policy, fail_fast || config.fail_fast, json),
        Command::Metrics {
            file,
            program,
            json,
        } => metrics(&file, program, &config, json),
        Command::Report {
            dir,
            verify,
            summary,
            json,
        } => {
            let dir = dir.unwrap_or_else(|| config.log_dir.clone());
            if verify {
                report_verify(&dir, &config, json)
            } else {
                report_metrics(&dir, &config, summary, json)
            }
        }
    }
}

// ── Commands ──────────────────────────────────────────────────────────

fn check(file: &Path, policy: Option<Policy>, fail_fast: bool, json: bool) -> SchedlogResult<bool> {
    let policy = match policy {
        Some(policy) => policy,
        None => RunLogName::from_path(file)?.policy,
    };
    let trace = read_full(file)?;

    let mut verifier = Verifier::for_policy(policy);
    if fail_fast {
        verifier.set_mode(CheckMode::FailFast);
    }
    let report = verifier.verify(&trace);

    if json {
        print_json(&report)?;
    } else {
        println!(
            "{} ({}, {} lines, {} pids)",
            file.display(),
            policy,
            trace.len(),
            trace.pids().len()
        );
        for outcome in &report.outcomes {
            let status = if outcome.passed() { "ok" } else { "FAILED" };
            println!("  {:<20} {}", outcome.property, status);
            for v in &outcome.violations {
                println!("    {}", v);
            }
        }
    }
    Ok(report.is_clean())
}

fn metrics(
    file: &Path,
    program: Option<String>,
    config: &VerifierConfig,
    json: bool,
) -> SchedlogResult<bool> {
    let log = read_terse(file)?;
    let selector = match program {
        Some(program) => TestProcessSelector::Program(program),
        None => TestProcessSelector::FirstNonSystem,
    };
    let m = compute_metrics(&log, &selector, config)?;

    if json {
        print_json(&m)?;
    } else {
        println!("{}: {}", file.display(), format_metrics(&m));
    }
    Ok(true)
}

fn report_metrics(
    dir: &Path,
    config: &VerifierConfig,
    summary: bool,
    json: bool,
) -> SchedlogResult<bool> {
    let report = collect_metrics(dir, config)?;

    if json {
        if summary {
            print_json(&summarize(&report.rows))?;
        } else {
            print_json(&report)?;
        }
        return Ok(true);
    }

    for row in &report.rows {
        println!(
            "{:10} {:6} run{:03} {}",
            row.program,
            row.policy,
            row.run,
            format_metrics(&row.metrics)
        );
    }
    for skipped in &report.skipped {
        println!("skipped {}: {}", skipped.file.display(), skipped.reason);
    }

    if summary {
        println!();
        println!(
            "{:10} {:6} {:20} {:>4} {:>9} {:>9} {:>9} {:>9}",
            "program", "policy", "metric", "n", "mean", "median", "range", "sd"
        );
        for s in summarize(&report.rows) {
            let sd = s.sd.map_or_else(|| "-".to_string(), |sd| format!("{:.2}", sd));
            println!(
                "{:10} {:6} {:20} {:>4} {:>9.2} {:>9.2} {:>9.2} {:>9}",
                s.program, s.policy, s.metric, s.runs, s.mean, s.median, s.range, sd
            );
        }
    }
    Ok(true)
}

fn report_verify(dir: &Path, config: &VerifierConfig, json: bool) -> SchedlogResult<bool> {
    let results = verify_logs(dir, config)?;
    let all_passed = results.iter().all(|r| r.passed());

    if json {
        print_json(&results)?;
        return Ok(all_passed);
    }

    for r in &results {
        match &r.outcome {
            VerifyOutcome::Checked(report) if report.is_clean() => {
                println!("ok      {}", r.name);
            }
            VerifyOutcome::Checked(report) => {
                println!("FAILED  {} ({} violations)", r.name, report.violation_count());
                for v in report.violations() {
                    println!("        {}", v);
                }
            }
            VerifyOutcome::Unparsable { reason } => {
                println!("ERROR   {}: {}", r.name, reason);
            }
        }
    }
    Ok(all_passed)
}

// ── Output ────────────────────────────────────────────────────────────

fn format_metrics(m: &ProcessMetrics) -> String {
    format!(
        "pid={:3} resp={:4} turn={:4} run={:4} cpu={:6.2}% cs={:3}",
        m.pid.raw(),
        m.response_time,
        m.turnaround_time,
        m.total_running_ticks,
        m.cpu_percent,
        m.context_switches
    )
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> SchedlogResult<()> {
    let text = serde_json::to_string_pretty(value).map_err(SchedlogError::from)?;
    println!("{}", text);
    Ok(())
}

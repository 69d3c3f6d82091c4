//! # schedlog: scheduler trace verifier
//!
//! Reads the per-tick trace lines an instrumented teaching kernel prints,
//! derives per-process timing metrics, and checks structural correctness
//! properties of the multi-queue scheduler that produced them.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────┐
//! │           report              │ ← batch over <program>_<policy>_runNNN.log
//! │  ┌────────────┐ ┌──────────┐  │
//! │  │  metrics   │ │invariants│  │ ← timing metrics / correctness suites
//! │  └─────┬──────┘ └────┬─────┘  │
//! │        │  TickLog     │ Trace  │
//! │  ┌─────┴──────────────┴─────┐ │
//! │  │          trace            │ │ ← terse + full grammar tokenizer
//! │  └───────────────────────────┘ │
//! └──────────────────────────────┘
//! ```
//!
//! Everything is synchronous over a fully materialized trace; only the
//! batch layer fans out across files.

pub mod config;
pub mod dsl;
pub mod error;
pub mod invariants;
pub mod metrics;
pub mod policy;
pub mod report;
pub mod tick;
pub mod trace;

// Re-exports for convenience.
pub use config::{ContextSwitchMode, VerifierConfig};
pub use error::{SchedlogError, SchedlogResult};
pub use invariants::{
    CheckMode, Invariant, NamedProperty, PropertyOutcome, TraceProperty, VerificationReport,
    Verifier, Violation,
};
pub use metrics::{compute_metrics, MetricComputer, ProcessMetrics, TestProcessSelector};
pub use policy::Policy;
pub use report::{
    collect_metrics, discover_logs, summarize, verify_logs, BatchReport, FileVerification,
    MetricSummary, MetricsRow, RunLogName, SkippedRun, VerifyOutcome,
};
pub use tick::Tick;
pub use trace::{
    parse_full, parse_terse, LevelObservation, Pid, ProcessObservation, QueueSet, TickLog,
    TickSnapshot, Trace,
};

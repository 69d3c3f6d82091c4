//! Structured error types for schedlog.
//!
//! All fallible public APIs return `Result<T, SchedlogError>`. Callers in
//! the batch layer use the variant to decide whether a run is skipped
//! (format / not-found) or recorded as a correctness failure (invariant).

use std::path::PathBuf;

use thiserror::Error;

use crate::invariants::Violation;
use crate::trace::Pid;

/// The top-level error type for the trace verifier.
#[derive(Debug, Error)]
pub enum SchedlogError {
    // ── Parse errors ──────────────────────────────────────

    /// A full-grammar trace line did not match the expected shape.
    #[error("bad schedlog format ({reason}): '{fragment}' in line: {line}")]
    Format {
        reason: String,
        fragment: String,
        line: String,
    },

    // ── Metric errors ─────────────────────────────────────

    /// A fact required for metric computation is absent from the trace.
    #[error("{what} not found for pids {pids:?}")]
    NotFound { what: &'static str, pids: Vec<Pid> },

    // ── Verification errors ───────────────────────────────

    /// A scheduler-correctness property failed.
    #[error("invariant violated: {0}")]
    Invariant(Violation),

    // ── Aggregation errors ────────────────────────────────

    /// A policy identifier is not one of the known scheduler policies.
    #[error("unknown scheduling policy: {0}")]
    UnknownPolicy(String),

    /// A log filename does not follow `<program>_<policy>_run<NNN>.log`.
    #[error("invalid log name: {0}")]
    InvalidLogName(String),

    // ── Config / IO errors ────────────────────────────────

    /// The configuration could not be used.
    #[error("configuration error: {0}")]
    Config(String),

    #[error("io error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

impl SchedlogError {
    /// Create a format error for `line`, naming the offending `fragment`.
    pub fn format(reason: impl Into<String>, fragment: impl Into<String>, line: &str) -> Self {
        SchedlogError::Format {
            reason: reason.into(),
            fragment: fragment.into(),
            line: line.to_string(),
        }
    }

    /// Create a not-found error for the given PID set.
    pub fn not_found<'a>(what: &'static str, pids: impl IntoIterator<Item = &'a Pid>) -> Self {
        SchedlogError::NotFound {
            what,
            pids: pids.into_iter().copied().collect(),
        }
    }

    /// Wrap an IO error with the path it happened on.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        SchedlogError::Io {
            path: path.into(),
            source,
        }
    }

    /// Whether a batch run should skip this trace rather than report a
    /// correctness failure.
    pub fn is_skippable(&self) -> bool {
        matches!(
            self,
            SchedlogError::Format { .. } | SchedlogError::NotFound { .. }
        )
    }
}

/// Convenience alias for `Result<T, SchedlogError>`.
pub type SchedlogResult<T> = Result<T, SchedlogError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_format() {
        let e = SchedlogError::format("uncovered text", ",,", "3|active|0(2),,");
        let s = e.to_string();
        assert!(s.contains("',,'"));
        assert!(s.contains("3|active|0(2),,"));
    }

    #[test]
    fn test_error_display_not_found() {
        let pids = [Pid::new(7), Pid::new(9)];
        let e = SchedlogError::not_found("first execution tick", &pids);
        let s = e.to_string();
        assert!(s.contains("first execution tick"));
        assert!(s.contains("7"));
    }

    #[test]
    fn test_skippable() {
        assert!(SchedlogError::format("x", "y", "z").is_skippable());
        assert!(SchedlogError::not_found("arrival tick", &[] as &[Pid]).is_skippable());
        assert!(!SchedlogError::UnknownPolicy("FIFO".into()).is_skippable());
    }

    #[test]
    fn test_error_is_std_error() {
        let e: Box<dyn std::error::Error> = Box::new(SchedlogError::Config("bad".into()));
        assert!(!e.to_string().is_empty());
    }

    #[test]
    fn test_schedlog_result_err() {
        let r: SchedlogResult<u32> = Err(SchedlogError::InvalidLogName("x.log".into()));
        assert!(r.is_err());
    }
}

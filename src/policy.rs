//! Scheduler policy identifiers.

use serde::{Deserialize, Serialize};

use crate::error::{SchedlogError, SchedlogResult};

/// The scheduling policy a kernel build was compiled with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Policy {
    /// Round-robin: one queue, one level.
    Rr,
    /// Multi-level queues with active/expired set rotation.
    Mqss,
    /// Multi-level feedback queue.
    Mlfq,
}

impl Policy {
    pub const ALL: [Policy; 3] = [Policy::Rr, Policy::Mqss, Policy::Mlfq];

    /// Canonical identifier, as used in log file names.
    pub fn as_str(self) -> &'static str {
        match self {
            Policy::Rr => "RR",
            Policy::Mqss => "MQSS",
            Policy::Mlfq => "MLFQ",
        }
    }
}

impl std::str::FromStr for Policy {
    type Err = SchedlogError;

    fn from_str(s: &str) -> SchedlogResult<Self> {
        Policy::ALL
            .into_iter()
            .find(|p| p.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| SchedlogError::UnknownPolicy(s.to_string()))
    }
}

impl std::fmt::Display for Policy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.pad(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_is_case_insensitive() {
        assert_eq!("rr".parse::<Policy>().unwrap(), Policy::Rr);
        assert_eq!("MQSS".parse::<Policy>().unwrap(), Policy::Mqss);
        assert_eq!("Mlfq".parse::<Policy>().unwrap(), Policy::Mlfq);
    }

    #[test]
    fn test_unknown_policy() {
        let err = "FIFO".parse::<Policy>().unwrap_err();
        assert!(matches!(err, SchedlogError::UnknownPolicy(ref p) if p == "FIFO"));
    }

    #[test]
    fn test_display_round_trips() {
        for p in Policy::ALL {
            assert_eq!(p.to_string().parse::<Policy>().unwrap(), p);
        }
    }
}

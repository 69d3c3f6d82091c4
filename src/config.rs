//! Verifier configuration loading.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::dsl::RUNNING_STATE;
use crate::error::{SchedlogError, SchedlogResult};

/// How the "currently scheduled" PID is chosen when counting context
/// switches.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContextSwitchMode {
    /// `RunningMember` when the trace carries state codes, otherwise
    /// `HeadOfQueue`.
    #[default]
    Auto,
    /// Head of the highest-priority non-empty queue at each tick, any PID.
    HeadOfQueue,
    /// A test-process PID observed in the running state at each tick.
    RunningMember,
}

/// Main configuration structure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VerifierConfig {
    /// Names never selected as the test process.
    pub system_processes: Vec<String>,
    /// Kernel state code meaning "on the CPU".
    pub running_state: u32,
    pub context_switches: ContextSwitchMode,
    /// Stop invariant checking at the first violation.
    pub fail_fast: bool,
    /// Directory scanned by the batch layer.
    pub log_dir: PathBuf,
}

impl Default for VerifierConfig {
    fn default() -> Self {
        VerifierConfig {
            system_processes: vec!["init".to_string(), "sh".to_string()],
            running_state: RUNNING_STATE,
            context_switches: ContextSwitchMode::Auto,
            fail_fast: false,
            log_dir: PathBuf::from("runner_logs"),
        }
    }
}

impl VerifierConfig {
    /// Load from `path`, or return defaults when no path is given.
    pub fn load(path: Option<&Path>) -> SchedlogResult<Self> {
        match path {
            Some(path) => Self::load_from_path(path),
            None => Ok(Self::default()),
        }
    }

    fn load_from_path(path: &Path) -> SchedlogResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| SchedlogError::io(path, e))?;
        let config: Self = serde_json::from_str(&content).map_err(|e| {
            SchedlogError::Config(format!("failed to parse {}: {}", path.display(), e))
        })?;
        config.validate()?;
        tracing::debug!(path = %path.display(), "loaded verifier config");
        Ok(config)
    }

    fn validate(&self) -> SchedlogResult<()> {
        if self.system_processes.iter().any(|n| n.is_empty()) {
            return Err(SchedlogError::Config(
                "system_processes must not contain empty names".into(),
            ));
        }
        Ok(())
    }

    /// Whether `name` is on the system-process denylist.
    pub fn is_system_process(&self, name: &str) -> bool {
        self.system_processes.iter().any(|n| n == name)
    }
}

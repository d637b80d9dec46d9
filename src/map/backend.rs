//! Execution backends for the map primitive

use crate::error::{ErrorCode, ThornsError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Execution strategy for a map call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    /// Items run one after another on the calling thread.
    Serial,
    /// Items are distributed over a pool of worker threads.
    #[default]
    #[serde(alias = "parallel", alias = "multiprocessing")]
    Threads,
}

impl Backend {
    pub fn is_parallel(&self) -> bool {
        matches!(self, Backend::Threads)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Backend::Serial => "serial",
            Backend::Threads => "threads",
        }
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Backend {
    type Err = ThornsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "serial" => Ok(Backend::Serial),
            "threads" | "parallel" | "multiprocessing" => Ok(Backend::Threads),
            other => Err(ThornsError::config_with_code(
                ErrorCode::CONFIG_UNKNOWN_BACKEND,
                format!(
                    "unknown backend '{}' (expected serial, threads, parallel or multiprocessing)",
                    other
                ),
                Some("backend".to_string()),
            )),
        }
    }
}

/// Number of workers used when none is configured.
pub fn default_workers() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

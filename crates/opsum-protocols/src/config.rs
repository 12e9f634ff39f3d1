//! Summary configuration shared by the engine and the config loader.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Timing thresholds for summary heuristics.
///
/// Read-only for the lifetime of a running summarizer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SummaryConfiguration {
    /// Quiet period after the last op before an idle summary, in milliseconds.
    #[serde(default = "default_idle_time_ms")]
    pub idle_time_ms: u64,

    /// Maximum time since the last acked summary, in milliseconds.
    #[serde(default = "default_max_time_ms")]
    pub max_time_ms: u64,

    /// Maximum ops since the last acked summary.
    #[serde(default = "default_max_ops")]
    pub max_ops: u64,

    /// Bound on waiting for broadcast and ack/nack of a summary, in milliseconds.
    #[serde(default = "default_max_ack_wait_time_ms")]
    pub max_ack_wait_time_ms: u64,
}

fn default_idle_time_ms() -> u64 {
    5_000
}

fn default_max_time_ms() -> u64 {
    60_000
}

fn default_max_ops() -> u64 {
    1_000
}

fn default_max_ack_wait_time_ms() -> u64 {
    600_000
}

impl Default for SummaryConfiguration {
    fn default() -> Self {
        Self {
            idle_time_ms: default_idle_time_ms(),
            max_time_ms: default_max_time_ms(),
            max_ops: default_max_ops(),
            max_ack_wait_time_ms: default_max_ack_wait_time_ms(),
        }
    }
}

impl SummaryConfiguration {
    pub fn idle_time(&self) -> Duration {
        Duration::from_millis(self.idle_time_ms)
    }

    pub fn max_time(&self) -> Duration {
        Duration::from_millis(self.max_time_ms)
    }

    pub fn max_ack_wait_time(&self) -> Duration {
        Duration::from_millis(self.max_ack_wait_time_ms)
    }
}

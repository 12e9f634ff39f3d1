//! Configuration schema definitions.

use std::time::Duration;

use serde::{Deserialize, Serialize};

pub use opsum_protocols::SummaryConfiguration;

/// Root configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub summary: SummaryConfiguration,

    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub simulation: SimulationConfig,
}

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default filter directive when `RUST_LOG` is unset.
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default)]
    pub format: LogFormat,

    /// Directory for daily rolling log files (disabled when unset).
    #[serde(default)]
    pub directory: Option<String>,

    /// Number of rotated log files to keep.
    #[serde(default = "default_max_log_files")]
    pub max_log_files: usize,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
            directory: None,
            max_log_files: default_max_log_files(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_max_log_files() -> usize {
    7
}

/// Local in-process simulation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulationConfig {
    /// Number of document ops to sequence.
    #[serde(default = "default_ops")]
    pub ops: u64,

    /// Delay between document ops in milliseconds.
    #[serde(default = "default_op_interval_ms")]
    pub op_interval_ms: u64,

    /// Delay before the sequencer answers a summarize op, in milliseconds.
    #[serde(default = "default_ack_delay_ms")]
    pub ack_delay_ms: u64,

    /// Reject every n-th summary (0 = never).
    #[serde(default)]
    pub nack_every: u32,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            ops: default_ops(),
            op_interval_ms: default_op_interval_ms(),
            ack_delay_ms: default_ack_delay_ms(),
            nack_every: 0,
        }
    }
}

fn default_ops() -> u64 {
    200
}

fn default_op_interval_ms() -> u64 {
    5
}

fn default_ack_delay_ms() -> u64 {
    20
}

impl SimulationConfig {
    pub fn op_interval(&self) -> Duration {
        Duration::from_millis(self.op_interval_ms)
    }

    pub fn ack_delay(&self) -> Duration {
        Duration::from_millis(self.ack_delay_ms)
    }
}

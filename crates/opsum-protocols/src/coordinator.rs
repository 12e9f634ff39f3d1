//! Run coordination contracts.

use async_trait::async_trait;

/// Outcome of waiting for a run to start.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StartResult {
    pub started: bool,
    pub message: Option<String>,
}

impl StartResult {
    pub fn started() -> Self {
        Self {
            started: true,
            message: None,
        }
    }

    pub fn not_started(message: impl Into<String>) -> Self {
        Self {
            started: false,
            message: Some(message.into()),
        }
    }
}

/// Gates a run on connection state.
#[async_trait]
pub trait RunCoordinator: Send + Sync {
    /// Resolve once the run may begin, or report why it never will.
    async fn wait_start(&self) -> StartResult;

    /// Resolve once the run has been told to stop.
    async fn wait_stopped(&self);

    fn stop(&self);
}

/// How a run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    /// The coordinator never started.
    NotStarted { message: Option<String> },
    /// The elected summarizer is not the client the run was requested for.
    NotSummarizer {
        expected: Option<String>,
        on_behalf_of: String,
    },
    /// Ran until told to stop.
    Stopped,
}

/// A component that runs on behalf of another client until stopped.
#[async_trait]
pub trait Runnable: Send + Sync {
    async fn run(&self, on_behalf_of: &str) -> RunOutcome;

    fn stop(&self, reason: &str);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_start_result_constructors() {
        assert!(StartResult::started().started);
        let not_started = StartResult::not_started("RuntimeDisposed");
        assert!(!not_started.started);
        assert_eq!(not_started.message.as_deref(), Some("RuntimeDisposed"));
    }
}

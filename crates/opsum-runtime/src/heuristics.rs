//! Heuristics deciding when to summarize.

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::time::Instant;
use tracing::debug;

use opsum_protocols::{SummaryAttempt, SummaryConfiguration};

use crate::timer::Timer;

/// Why a summarize attempt was triggered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SummarizeReason {
    /// Too long since the last acked summary.
    MaxTime,
    /// Too many ops since the last acked summary.
    MaxOps,
    /// No ops for the idle period.
    Idle,
    /// Required full summary after a session reload.
    Immediate,
    /// Explicit save request sequenced by a client.
    Requested { client_id: String, contents: String },
}

impl fmt::Display for SummarizeReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SummarizeReason::MaxTime => f.write_str("maxTime"),
            SummarizeReason::MaxOps => f.write_str("maxOps"),
            SummarizeReason::Idle => f.write_str("idle"),
            SummarizeReason::Immediate => f.write_str("immediate"),
            SummarizeReason::Requested { client_id, contents } => {
                write!(f, ";{}: {}", client_id, contents)
            }
        }
    }
}

/// Callback the heuristics use to request an attempt.
pub type TriggerFn = Arc<dyn Fn(SummarizeReason) + Send + Sync>;

/// Attempt bookkeeping the heuristics evaluate.
#[derive(Debug, Clone)]
pub struct HeuristicsState {
    pub last_sent: SummaryAttempt,
    pub last_acked: SummaryAttempt,
    pub last_op_seq_number: u64,
}

/// Time/op-count policy for summarizing.
pub struct SummarizerHeuristics {
    configuration: SummaryConfiguration,
    trigger: TriggerFn,
    idle_timer: Timer,
    state: Mutex<HeuristicsState>,
    disposed: Mutex<bool>,
}

impl SummarizerHeuristics {
    pub fn new(
        configuration: SummaryConfiguration,
        trigger: TriggerFn,
        last_op_seq_number: u64,
        first_ack: SummaryAttempt,
    ) -> Self {
        let idle_trigger = trigger.clone();
        let idle_timer = Timer::new("summary-idle", configuration.idle_time(), move || {
            idle_trigger(SummarizeReason::Idle)
        });
        Self {
            configuration,
            trigger,
            idle_timer,
            state: Mutex::new(HeuristicsState {
                last_sent: first_ack.clone(),
                last_acked: first_ack,
                last_op_seq_number,
            }),
            disposed: Mutex::new(false),
        }
    }

    pub fn snapshot(&self) -> HeuristicsState {
        self.state.lock().clone()
    }

    pub fn last_sent(&self) -> SummaryAttempt {
        self.state.lock().last_sent.clone()
    }

    pub fn last_acked(&self) -> SummaryAttempt {
        self.state.lock().last_acked.clone()
    }

    pub fn last_op_seq_number(&self) -> u64 {
        self.state.lock().last_op_seq_number
    }

    pub fn set_last_op_seq_number(&self, sequence_number: u64) {
        self.state.lock().last_op_seq_number = sequence_number;
    }

    /// Record a dispatched attempt.
    pub fn record_sent(&self, attempt: SummaryAttempt) {
        self.state.lock().last_sent = attempt;
    }

    /// Record the sequence number the last sent summary op was broadcast at.
    pub fn set_last_sent_sequence_number(&self, summary_sequence_number: u64) {
        self.state.lock().last_sent.summary_sequence_number = Some(summary_sequence_number);
    }

    /// Mark the last sent attempt as acked.
    pub fn ack_last_sent(&self) {
        let mut state = self.state.lock();
        state.last_acked = state.last_sent.clone();
    }

    /// Re-evaluate whether to summarize now, later when idle, or not at all.
    pub fn run(&self) {
        self.idle_timer.clear();
        if *self.disposed.lock() {
            return;
        }

        let (time_since_last_summary, ops_since_last_summary) = {
            let state = self.state.lock();
            (
                Instant::now().saturating_duration_since(state.last_acked.summary_time),
                state
                    .last_op_seq_number
                    .saturating_sub(state.last_acked.reference_sequence_number),
            )
        };

        if time_since_last_summary > self.configuration.max_time() {
            debug!(
                time_since_last_summary_ms = time_since_last_summary.as_millis() as u64,
                "Summary heuristics reached max time"
            );
            (self.trigger)(SummarizeReason::MaxTime);
        } else if ops_since_last_summary > self.configuration.max_ops {
            debug!(ops_since_last_summary, "Summary heuristics reached max ops");
            (self.trigger)(SummarizeReason::MaxOps);
        } else {
            self.idle_timer.start();
        }
    }

    /// Cancel the idle timer; no trigger fires afterwards.
    pub fn dispose(&self) {
        *self.disposed.lock() = true;
        self.idle_timer.clear();
    }
}

#[cfg(test)]
#[path = "heuristics_tests.rs"]
mod tests;

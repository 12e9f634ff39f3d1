//! Summary attempt records and generation results.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::time::Instant;

use crate::message::AckedSummary;

/// One point-in-time summarization event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SummaryAttempt {
    /// Op-log position the summary reflects.
    pub reference_sequence_number: u64,

    /// When the attempt was sent.
    pub summary_time: Instant,

    /// Sequence number of the summary op, once broadcast.
    pub summary_sequence_number: Option<u64>,
}

impl SummaryAttempt {
    pub fn new(reference_sequence_number: u64, summary_time: Instant) -> Self {
        Self {
            reference_sequence_number,
            summary_time,
            summary_sequence_number: None,
        }
    }

    /// Attempt record for a summary some client already got acked.
    pub fn from_acked(acked: &AckedSummary) -> Self {
        Self {
            reference_sequence_number: acked.summary_op.reference_sequence_number,
            summary_time: instant_at(acked.summary_op.timestamp),
            summary_sequence_number: Some(acked.summary_op.sequence_number),
        }
    }
}

/// Map a wall-clock timestamp onto the monotonic clock. Future timestamps map to now.
fn instant_at(timestamp: DateTime<Utc>) -> Instant {
    let now = Instant::now();
    let age = (Utc::now() - timestamp).to_std().unwrap_or_default();
    now.checked_sub(age).unwrap_or(now)
}

/// Size statistics reported by summary generation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SummaryStats {
    pub tree_node_count: u64,
    pub blob_node_count: u64,
    pub handle_node_count: u64,
    pub total_blob_size: u64,
}

/// Result of one call to the summary generation function.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerateSummaryData {
    /// Whether the summarize op was actually submitted.
    pub submitted: bool,
    pub reference_sequence_number: u64,
    pub client_sequence_number: u64,
    #[serde(default)]
    pub stats: SummaryStats,
}

impl GenerateSummaryData {
    pub fn submitted(reference_sequence_number: u64, client_sequence_number: u64) -> Self {
        Self {
            submitted: true,
            reference_sequence_number,
            client_sequence_number,
            stats: SummaryStats::default(),
        }
    }

    pub fn not_submitted(reference_sequence_number: u64) -> Self {
        Self {
            submitted: false,
            reference_sequence_number,
            client_sequence_number: 0,
            stats: SummaryStats::default(),
        }
    }

    pub fn with_stats(mut self, stats: SummaryStats) -> Self {
        self.stats = stats;
        self
    }
}

/// Handles identifying the latest acked summary, used to refresh the generation baseline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SummaryContext {
    pub proposal_handle: String,
    pub ack_handle: String,
}

impl From<&AckedSummary> for SummaryContext {
    fn from(acked: &AckedSummary) -> Self {
        Self {
            proposal_handle: acked.summary_op.contents.handle.clone(),
            ack_handle: acked.summary_ack.contents.handle.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::{
        SummaryAck, SummaryAckContents, SummaryOp, SummaryProposal, SummaryProposalContents,
    };
    use std::time::Duration;

    fn acked(timestamp: DateTime<Utc>) -> AckedSummary {
        AckedSummary {
            summary_op: SummaryOp {
                client_id: Some("s".to_string()),
                sequence_number: 21,
                client_sequence_number: 2,
                reference_sequence_number: 20,
                timestamp,
                contents: SummaryProposalContents {
                    handle: "proposal".to_string(),
                    message: String::new(),
                    head: None,
                    parents: Vec::new(),
                },
            },
            summary_ack: SummaryAck {
                sequence_number: 22,
                timestamp,
                contents: SummaryAckContents {
                    handle: "ack".to_string(),
                    summary_proposal: SummaryProposal {
                        summary_sequence_number: 21,
                    },
                },
            },
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_attempt_from_acked() {
        tokio::time::advance(Duration::from_secs(60)).await;
        let attempt = SummaryAttempt::from_acked(&acked(Utc::now() - chrono::Duration::seconds(10)));
        assert_eq!(attempt.reference_sequence_number, 20);
        assert_eq!(attempt.summary_sequence_number, Some(21));
        let age = Instant::now() - attempt.summary_time;
        assert!(age >= Duration::from_secs(9) && age <= Duration::from_secs(11));
    }

    #[tokio::test(start_paused = true)]
    async fn test_attempt_from_future_timestamp() {
        let attempt = SummaryAttempt::from_acked(&acked(Utc::now() + chrono::Duration::seconds(30)));
        assert_eq!(attempt.summary_time, Instant::now());
    }

    #[test]
    fn test_context_from_acked() {
        let context = SummaryContext::from(&acked(Utc::now()));
        assert_eq!(context.proposal_handle, "proposal");
        assert_eq!(context.ack_handle, "ack");
    }

    #[test]
    fn test_generate_data_constructors() {
        let data = GenerateSummaryData::submitted(10, 4);
        assert!(data.submitted);
        assert_eq!(data.client_sequence_number, 4);
        assert!(!GenerateSummaryData::not_submitted(10).submitted);
    }
}

//! Observation of a client's own summaries as they are broadcast and acked.

use std::sync::Arc;

use async_trait::async_trait;

use crate::message::{AckNack, AckedSummary, SummaryOp};

/// Watches summaries submitted by one client.
#[async_trait]
pub trait ClientSummaryWatcher: Send + Sync {
    fn client_id(&self) -> &str;

    /// Track the summary submitted with the given client sequence number.
    fn watch_summary(&self, client_sequence_number: u64) -> Arc<dyn SummaryTracker>;

    /// Wait until no summary from any client is awaiting ack/nack, then
    /// return the latest acked summary, if any.
    async fn wait_flushed(&self) -> Option<AckedSummary>;

    /// Stop watching; pending waits are abandoned.
    fn dispose(&self);
}

/// One submitted summary moving through broadcast and ack/nack.
#[async_trait]
pub trait SummaryTracker: Send + Sync {
    fn client_sequence_number(&self) -> u64;

    /// Resolves with the sequenced summary op. `None` if the watch was abandoned.
    async fn wait_broadcast(&self) -> Option<SummaryOp>;

    /// Resolves with the ack or nack. `None` if the watch was abandoned.
    async fn wait_ack_nack(&self) -> Option<AckNack>;
}

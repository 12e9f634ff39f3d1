//! SummaryCollection - tracks summary ops from every client.
//!
//! Fed the inbound op stream, the collection pairs each `summarize` op with
//! the `summaryAck`/`summaryNack` that answers it. Per-client watchers hand
//! out [`SummaryTracker`]s for the summaries their client submits, and the
//! collection exposes the most recent acked summary to whoever needs a
//! baseline.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use opsum_protocols::{
    AckNack, AckedSummary, ClientSummaryWatcher, MessageType, SequencedDocumentMessage,
    SummaryOp, SummaryTracker,
};

/// Collection of summaries seen on the op stream.
///
/// Cheap to clone; clones share state.
#[derive(Clone)]
pub struct SummaryCollection {
    inner: Arc<CollectionInner>,
}

struct CollectionInner {
    initial_sequence_number: u64,
    state: Mutex<CollectionState>,
    pending_count: watch::Sender<usize>,
    latest_ack: watch::Sender<Option<AckedSummary>>,
}

#[derive(Default)]
struct CollectionState {
    /// Watched summaries by client id, then client sequence number.
    watchers: HashMap<String, HashMap<u64, Arc<LocalSummary>>>,
    /// Broadcast summaries awaiting ack/nack, by summary op sequence number.
    pending: HashMap<u64, Arc<LocalSummary>>,
}

impl SummaryCollection {
    pub fn new(initial_sequence_number: u64) -> Self {
        let (pending_count, _) = watch::channel(0);
        let (latest_ack, _) = watch::channel(None);
        Self {
            inner: Arc::new(CollectionInner {
                initial_sequence_number,
                state: Mutex::new(CollectionState::default()),
                pending_count,
                latest_ack,
            }),
        }
    }

    pub fn initial_sequence_number(&self) -> u64 {
        self.inner.initial_sequence_number
    }

    pub fn latest_ack(&self) -> Option<AckedSummary> {
        self.inner.latest_ack.borrow().clone()
    }

    pub fn pending_count(&self) -> usize {
        *self.inner.pending_count.borrow()
    }

    /// Create the watcher for a client's own summaries, replacing any earlier
    /// watcher for the same client.
    pub fn create_watcher(&self, client_id: impl Into<String>) -> Arc<SummaryWatcher> {
        let client_id = client_id.into();
        self.inner
            .state
            .lock()
            .watchers
            .insert(client_id.clone(), HashMap::new());
        Arc::new(SummaryWatcher {
            client_id,
            collection: self.clone(),
            abandoned: CancellationToken::new(),
        })
    }

    /// Feed one inbound op.
    pub fn handle_op(&self, op: &SequencedDocumentMessage) {
        match op.message_type {
            MessageType::Summarize => self.handle_summarize_op(op),
            MessageType::SummaryAck | MessageType::SummaryNack => self.handle_ack_nack_op(op),
            _ => {}
        }
    }

    fn handle_summarize_op(&self, op: &SequencedDocumentMessage) {
        let summary_op = match SummaryOp::try_from(op) {
            Ok(summary_op) => summary_op,
            Err(e) => {
                warn!(error = %e, "Ignoring malformed summarize op");
                return;
            }
        };

        let pending = {
            let mut state = self.inner.state.lock();
            let watched = summary_op
                .client_id
                .as_ref()
                .and_then(|client_id| state.watchers.get_mut(client_id))
                .map(|summaries| {
                    summaries
                        .entry(summary_op.client_sequence_number)
                        .or_insert_with(|| {
                            Arc::new(LocalSummary::new(summary_op.client_sequence_number))
                        })
                        .clone()
                });
            let summary = watched
                .unwrap_or_else(|| Arc::new(LocalSummary::new(summary_op.client_sequence_number)));
            state.pending.insert(summary_op.sequence_number, summary.clone());
            let count = state.pending.len();
            (summary, count)
        };

        debug!(
            sequence_number = summary_op.sequence_number,
            reference_sequence_number = summary_op.reference_sequence_number,
            client_sequence_number = summary_op.client_sequence_number,
            "Summary op broadcast"
        );
        let (summary, count) = pending;
        summary.broadcast.send_replace(Some(summary_op));
        self.inner.pending_count.send_replace(count);
    }

    fn handle_ack_nack_op(&self, op: &SequencedDocumentMessage) {
        let ack_nack = match AckNack::try_from(op) {
            Ok(ack_nack) => ack_nack,
            Err(e) => {
                warn!(error = %e, "Ignoring malformed summary ack/nack");
                return;
            }
        };

        let summary_sequence_number = ack_nack.summary_sequence_number();
        let resolved = {
            let mut state = self.inner.state.lock();
            state
                .pending
                .remove(&summary_sequence_number)
                .map(|summary| (summary, state.pending.len()))
        };
        let Some((summary, count)) = resolved else {
            debug!(summary_sequence_number, "Ack/nack for unknown summary ignored");
            return;
        };

        if let AckNack::Ack(ack) = &ack_nack {
            let summary_op = summary.broadcast.borrow().clone();
            if let Some(summary_op) = summary_op {
                self.inner.latest_ack.send_replace(Some(AckedSummary {
                    summary_op,
                    summary_ack: ack.clone(),
                }));
            }
        }
        summary.ack_nack.send_replace(Some(ack_nack));
        self.inner.pending_count.send_replace(count);
    }

    /// Wait until no summary is awaiting ack/nack, then return the latest ack.
    pub async fn wait_flushed(&self) -> Option<AckedSummary> {
        let mut rx = self.inner.pending_count.subscribe();
        // The sender lives as long as `self`; the wait cannot fail.
        let _ = rx.wait_for(|count| *count == 0).await;
        self.latest_ack()
    }

    /// Wait for an acked summary whose reference sequence number is at least
    /// `reference_sequence_number`.
    pub async fn wait_summary_ack(&self, reference_sequence_number: u64) -> Option<AckedSummary> {
        let mut rx = self.inner.latest_ack.subscribe();
        let acked = rx
            .wait_for(|ack| {
                ack.as_ref().is_some_and(|ack| {
                    ack.summary_op.reference_sequence_number >= reference_sequence_number
                })
            })
            .await
            .ok()?;
        (*acked).clone()
    }

    fn watch(&self, client_id: &str, client_sequence_number: u64) -> Arc<LocalSummary> {
        let mut state = self.inner.state.lock();
        let summaries = state.watchers.entry(client_id.to_string()).or_default();
        // Older summaries that already resolved can no longer be asked for.
        summaries.retain(|csn, summary| {
            *csn >= client_sequence_number || summary.ack_nack.borrow().is_none()
        });
        summaries
            .entry(client_sequence_number)
            .or_insert_with(|| Arc::new(LocalSummary::new(client_sequence_number)))
            .clone()
    }

    fn remove_watcher(&self, client_id: &str) -> Vec<Arc<LocalSummary>> {
        self.inner
            .state
            .lock()
            .watchers
            .remove(client_id)
            .map(|summaries| summaries.into_values().collect())
            .unwrap_or_default()
    }
}

impl std::fmt::Debug for SummaryCollection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SummaryCollection")
            .field("initial_sequence_number", &self.inner.initial_sequence_number)
            .field("pending", &self.pending_count())
            .finish()
    }
}

/// One summary moving through broadcast and ack/nack.
struct LocalSummary {
    client_sequence_number: u64,
    broadcast: watch::Sender<Option<SummaryOp>>,
    ack_nack: watch::Sender<Option<AckNack>>,
}

impl LocalSummary {
    fn new(client_sequence_number: u64) -> Self {
        let (broadcast, _) = watch::channel(None);
        let (ack_nack, _) = watch::channel(None);
        Self {
            client_sequence_number,
            broadcast,
            ack_nack,
        }
    }
}

/// Tracker handed out by [`SummaryWatcher::watch_summary`].
struct WatchedSummary {
    summary: Arc<LocalSummary>,
    abandoned: CancellationToken,
}

async fn wait_filled<T: Clone>(
    sender: &watch::Sender<Option<T>>,
    abandoned: &CancellationToken,
) -> Option<T> {
    let mut rx = sender.subscribe();
    tokio::select! {
        filled = rx.wait_for(Option::is_some) => filled.ok().and_then(|value| (*value).clone()),
        _ = abandoned.cancelled() => None,
    }
}

#[async_trait]
impl SummaryTracker for WatchedSummary {
    fn client_sequence_number(&self) -> u64 {
        self.summary.client_sequence_number
    }

    async fn wait_broadcast(&self) -> Option<SummaryOp> {
        wait_filled(&self.summary.broadcast, &self.abandoned).await
    }

    async fn wait_ack_nack(&self) -> Option<AckNack> {
        wait_filled(&self.summary.ack_nack, &self.abandoned).await
    }
}

/// Watches the summaries one client submits.
pub struct SummaryWatcher {
    client_id: String,
    collection: SummaryCollection,
    abandoned: CancellationToken,
}

#[async_trait]
impl ClientSummaryWatcher for SummaryWatcher {
    fn client_id(&self) -> &str {
        &self.client_id
    }

    fn watch_summary(&self, client_sequence_number: u64) -> Arc<dyn SummaryTracker> {
        Arc::new(WatchedSummary {
            summary: self.collection.watch(&self.client_id, client_sequence_number),
            abandoned: self.abandoned.clone(),
        })
    }

    async fn wait_flushed(&self) -> Option<AckedSummary> {
        tokio::select! {
            acked = self.collection.wait_flushed() => acked,
            _ = self.abandoned.cancelled() => None,
        }
    }

    fn dispose(&self) {
        if self.abandoned.is_cancelled() {
            return;
        }
        self.abandoned.cancel();
        let dropped = self.collection.remove_watcher(&self.client_id);
        debug!(
            client_id = %self.client_id,
            watched = dropped.len(),
            "Summary watcher disposed"
        );
    }
}

impl std::fmt::Debug for SummaryWatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SummaryWatcher")
            .field("client_id", &self.client_id)
            .field("disposed", &self.abandoned.is_cancelled())
            .finish()
    }
}

#[cfg(test)]
#[path = "summary_collection_tests.rs"]
mod tests;

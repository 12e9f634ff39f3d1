//! LocalSession - in-process sequencer hosting a summarizer.
//!
//! Assigns sequence numbers to messages from any client, delivers every
//! sequenced message on the inbound stream and runtime messages on the
//! processed stream, and plays the storage service's part of acking or
//! nacking summaries. Used by the `simulate` command and the runtime
//! integration tests.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{Value, json};
use tokio::sync::watch;
use tracing::{debug, info};

use opsum_protocols::{
    ConnectionState, GenerateSummaryData, MessageType, OpSource, SequencedDocumentMessage,
    SummarizerHost, SummaryError, SummaryGenerator, SummaryStats,
};

use crate::emitter::OpEmitter;

/// Cheap to clone; clones share the session.
#[derive(Clone)]
pub struct LocalSession {
    inner: Arc<SessionInner>,
}

struct SessionInner {
    initial_sequence_number: u64,
    connection: watch::Sender<ConnectionState>,
    inbound: Arc<OpEmitter>,
    processed: Arc<OpEmitter>,
    state: Mutex<SessionState>,
}

#[derive(Default)]
struct SessionState {
    sequence_number: u64,
    /// Last sequence number delivered to listeners.
    reference_sequence_number: u64,
    client_id: Option<String>,
    summarizer_client_id: Option<String>,
    client_sequence_numbers: HashMap<String, u64>,
    outbox: VecDeque<SequencedDocumentMessage>,
    delivering: bool,
    close_reasons: Vec<String>,
}

impl LocalSession {
    /// New disconnected session whose log starts after `initial_sequence_number`.
    pub fn new(initial_sequence_number: u64) -> Self {
        let (connection, _) = watch::channel(ConnectionState::Disconnected);
        Self {
            inner: Arc::new(SessionInner {
                initial_sequence_number,
                connection,
                inbound: Arc::new(OpEmitter::new()),
                processed: Arc::new(OpEmitter::new()),
                state: Mutex::new(SessionState {
                    sequence_number: initial_sequence_number,
                    reference_sequence_number: initial_sequence_number,
                    ..SessionState::default()
                }),
            }),
        }
    }

    pub fn sequence_number(&self) -> u64 {
        self.inner.state.lock().sequence_number
    }

    pub fn state(&self) -> ConnectionState {
        *self.inner.connection.borrow()
    }

    /// Reasons passed to [`SummarizerHost::close`], oldest first.
    pub fn close_reasons(&self) -> Vec<String> {
        self.inner.state.lock().close_reasons.clone()
    }

    /// Connect this session as `client_id` and sequence its join.
    pub fn connect(&self, client_id: impl Into<String>) {
        let client_id = client_id.into();
        if self.state() == ConnectionState::Disposed {
            return;
        }
        self.inner.state.lock().client_id = Some(client_id.clone());
        self.join(&client_id);
        self.inner.connection.send_replace(ConnectionState::Connected);
        info!(client_id = %client_id, "Session connected");
    }

    /// Drop the connection and sequence the leave of its client.
    pub fn disconnect(&self) {
        let client_id = self.inner.state.lock().client_id.take();
        if self.state() == ConnectionState::Connected {
            self.inner.connection.send_replace(ConnectionState::Disconnected);
        }
        if let Some(client_id) = client_id {
            self.leave(&client_id);
            info!(client_id = %client_id, "Session disconnected");
        }
    }

    /// Terminal; the session never connects again.
    pub fn dispose(&self) {
        self.inner.state.lock().client_id = None;
        self.inner.connection.send_replace(ConnectionState::Disposed);
    }

    /// Elect (or clear) the client summaries are produced for.
    pub fn set_summarizer_client_id(&self, client_id: Option<String>) {
        self.inner.state.lock().summarizer_client_id = client_id;
    }

    pub fn join(&self, client_id: &str) -> SequencedDocumentMessage {
        self.sequence_system(MessageType::ClientJoin, client_id)
    }

    pub fn leave(&self, client_id: &str) -> SequencedDocumentMessage {
        self.sequence_system(MessageType::ClientLeave, client_id)
    }

    /// Sequence a normal op from `client_id`.
    pub fn submit_op(&self, client_id: &str, contents: Value) -> SequencedDocumentMessage {
        self.submit(client_id, MessageType::Operation, contents)
    }

    /// Sequence an explicit save request.
    pub fn request_save(&self, client_id: &str, message: &str) -> SequencedDocumentMessage {
        self.submit(client_id, MessageType::Save, Value::String(message.to_string()))
    }

    /// Sequence a summarize op proposing the tree stored at `handle`.
    pub fn submit_summary(
        &self,
        client_id: &str,
        handle: &str,
        message: &str,
    ) -> SequencedDocumentMessage {
        self.submit(
            client_id,
            MessageType::Summarize,
            json!({ "handle": handle, "message": message }),
        )
    }

    /// Accept the summary sequenced at `summary_sequence_number`.
    pub fn ack_summary(&self, summary_sequence_number: u64, handle: &str) -> SequencedDocumentMessage {
        debug!(summary_sequence_number, handle, "Acking summary");
        self.sequence(|sequence_number, _| {
            SequencedDocumentMessage::new(MessageType::SummaryAck, sequence_number).with_contents(
                json!({
                    "handle": handle,
                    "summaryProposal": { "summarySequenceNumber": summary_sequence_number }
                }),
            )
        })
    }

    /// Reject the summary sequenced at `summary_sequence_number`.
    pub fn nack_summary(
        &self,
        summary_sequence_number: u64,
        error_message: &str,
    ) -> SequencedDocumentMessage {
        debug!(summary_sequence_number, error_message, "Nacking summary");
        self.sequence(|sequence_number, _| {
            SequencedDocumentMessage::new(MessageType::SummaryNack, sequence_number).with_contents(
                json!({
                    "errorMessage": error_message,
                    "summaryProposal": { "summarySequenceNumber": summary_sequence_number }
                }),
            )
        })
    }

    fn submit(&self, client_id: &str, message_type: MessageType, contents: Value) -> SequencedDocumentMessage {
        self.sequence(|sequence_number, state| {
            let client_sequence_number = state
                .client_sequence_numbers
                .entry(client_id.to_string())
                .and_modify(|csn| *csn += 1)
                .or_insert(1);
            SequencedDocumentMessage::new(message_type, sequence_number)
                .with_client(client_id, *client_sequence_number)
                .with_reference(sequence_number - 1)
                .with_contents(contents)
        })
    }

    fn sequence_system(&self, message_type: MessageType, client_id: &str) -> SequencedDocumentMessage {
        let data = Value::String(client_id.to_string()).to_string();
        self.sequence(|sequence_number, _| {
            SequencedDocumentMessage::new(message_type, sequence_number).with_data(data)
        })
    }

    fn sequence<F>(&self, build: F) -> SequencedDocumentMessage
    where
        F: FnOnce(u64, &mut SessionState) -> SequencedDocumentMessage,
    {
        let op = {
            let mut state = self.inner.state.lock();
            state.sequence_number += 1;
            let sequence_number = state.sequence_number;
            let mut op = build(sequence_number, &mut *state);
            op.minimum_sequence_number = state.reference_sequence_number;
            state.outbox.push_back(op.clone());
            op
        };
        self.deliver();
        op
    }

    /// Drain the outbox in order. Re-entrant calls (a listener sequencing a
    /// new message) leave delivery to the caller already draining.
    fn deliver(&self) {
        {
            let mut state = self.inner.state.lock();
            if state.delivering {
                return;
            }
            state.delivering = true;
        }
        loop {
            let op = {
                let mut state = self.inner.state.lock();
                match state.outbox.pop_front() {
                    Some(op) => {
                        state.reference_sequence_number = op.sequence_number;
                        op
                    }
                    None => {
                        state.delivering = false;
                        return;
                    }
                }
            };
            self.inner.inbound.emit(&op);
            if op.message_type.is_runtime() {
                self.inner.processed.emit(&op);
            }
        }
    }
}

impl SummarizerHost for LocalSession {
    fn connection_state(&self) -> watch::Receiver<ConnectionState> {
        self.inner.connection.subscribe()
    }

    fn client_id(&self) -> Option<String> {
        self.inner.state.lock().client_id.clone()
    }

    fn summarizer_client_id(&self) -> Option<String> {
        self.inner.state.lock().summarizer_client_id.clone()
    }

    fn initial_sequence_number(&self) -> u64 {
        self.inner.initial_sequence_number
    }

    fn reference_sequence_number(&self) -> u64 {
        self.inner.state.lock().reference_sequence_number
    }

    fn inbound_ops(&self) -> Arc<dyn OpSource> {
        self.inner.inbound.clone()
    }

    fn processed_ops(&self) -> Arc<dyn OpSource> {
        self.inner.processed.clone()
    }

    fn close(&self, reason: &str) {
        info!(reason, "Session closed");
        self.inner.state.lock().close_reasons.push(reason.to_string());
        self.dispose();
    }
}

impl std::fmt::Debug for LocalSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.inner.state.lock();
        f.debug_struct("LocalSession")
            .field("connection", &*self.inner.connection.borrow())
            .field("sequence_number", &state.sequence_number)
            .field("client_id", &state.client_id)
            .finish()
    }
}

/// Generates a summary of the local session by submitting a summarize op
/// from the session's connected client.
pub struct SessionSummaryGenerator {
    session: LocalSession,
    generated: AtomicU64,
}

impl SessionSummaryGenerator {
    pub fn new(session: LocalSession) -> Self {
        Self {
            session,
            generated: AtomicU64::new(0),
        }
    }

    pub fn generated(&self) -> u64 {
        self.generated.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SummaryGenerator for SessionSummaryGenerator {
    async fn generate_summary(
        &self,
        full: bool,
        safe: bool,
    ) -> Result<Option<GenerateSummaryData>, SummaryError> {
        let Some(client_id) = self.session.client_id() else {
            return Err(SummaryError::Generation("session is not connected".to_string()));
        };

        let reference_sequence_number = self.session.reference_sequence_number();
        let count = self.generated.fetch_add(1, Ordering::SeqCst) + 1;
        let handle = format!("summary-{}-{}", reference_sequence_number, count);
        let message = format!(
            "Summary @{} (full: {}, safe: {})",
            reference_sequence_number, full, safe
        );
        let op = self.session.submit_summary(&client_id, &handle, &message);

        let stats = SummaryStats {
            tree_node_count: 1,
            blob_node_count: reference_sequence_number - self.session.initial_sequence_number(),
            handle_node_count: u64::from(!full),
            total_blob_size: message.len() as u64,
        };
        Ok(Some(
            GenerateSummaryData::submitted(reference_sequence_number, op.client_sequence_number)
                .with_stats(stats),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use opsum_protocols::ListenerId;

    fn record(source: &Arc<dyn OpSource>) -> (Arc<Mutex<Vec<(u64, MessageType)>>>, ListenerId) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let id = source.subscribe(Arc::new(move |event| {
            if let Ok(op) = event {
                sink.lock().push((op.sequence_number, op.message_type));
            }
        }));
        (seen, id)
    }

    #[test]
    fn test_sequences_and_routes_ops() {
        let session = LocalSession::new(10);
        let (inbound, _) = record(&session.inbound_ops());
        let (processed, _) = record(&session.processed_ops());

        session.connect("summarizer");
        let op = session.submit_op("alice", json!({"set": 1}));
        assert_eq!(op.sequence_number, 12);
        assert_eq!(op.client_sequence_number, 1);
        assert_eq!(op.reference_sequence_number, 11);
        assert_eq!(session.submit_op("alice", Value::Null).client_sequence_number, 2);

        assert_eq!(
            *inbound.lock(),
            vec![
                (11, MessageType::ClientJoin),
                (12, MessageType::Operation),
                (13, MessageType::Operation)
            ]
        );
        assert_eq!(
            *processed.lock(),
            vec![(12, MessageType::Operation), (13, MessageType::Operation)]
        );
        assert_eq!(session.reference_sequence_number(), 13);
        assert_eq!(session.initial_sequence_number(), 10);
    }

    #[test]
    fn test_connection_lifecycle() {
        let session = LocalSession::new(0);
        assert_eq!(session.state(), ConnectionState::Disconnected);
        assert!(session.client_id().is_none());

        session.connect("s1");
        assert!(session.connected());
        assert_eq!(session.client_id().as_deref(), Some("s1"));

        session.disconnect();
        assert_eq!(session.state(), ConnectionState::Disconnected);
        let leave = session.leave("ghost");
        assert_eq!(leave.leaving_client_id().expect("leave data"), "ghost");

        session.close("Summarizer: runEnded");
        assert!(session.disposed());
        assert_eq!(session.close_reasons(), vec!["Summarizer: runEnded".to_string()]);
        session.connect("s2");
        assert!(session.disposed());
    }

    #[test]
    fn test_ack_and_nack_reference_summary() {
        let session = LocalSession::new(0);
        let summary = session.submit_summary("s1", "tree", "first");
        let ack = session.ack_summary(summary.sequence_number, "ack-tree");
        assert_eq!(ack.message_type, MessageType::SummaryAck);
        assert_eq!(
            ack.contents["summaryProposal"]["summarySequenceNumber"],
            json!(summary.sequence_number)
        );
        let nack = session.nack_summary(summary.sequence_number, "too old");
        assert_eq!(nack.contents["errorMessage"], json!("too old"));
    }

    #[test]
    fn test_reentrant_sequencing_keeps_order() {
        let session = LocalSession::new(0);
        let (seen, _) = record(&session.inbound_ops());

        let reentrant = session.clone();
        session.inbound_ops().subscribe(Arc::new(move |event| {
            if let Ok(op) = event {
                if op.message_type == MessageType::Summarize {
                    reentrant.ack_summary(op.sequence_number, "ack");
                }
            }
        }));

        session.submit_summary("s1", "tree", "reentrant");
        session.submit_op("alice", Value::Null);
        assert_eq!(
            *seen.lock(),
            vec![
                (1, MessageType::Summarize),
                (2, MessageType::SummaryAck),
                (3, MessageType::Operation)
            ]
        );
    }

    #[tokio::test]
    async fn test_generator_submits_from_connected_client() {
        let session = LocalSession::new(0);
        let generator = SessionSummaryGenerator::new(session.clone());
        assert!(generator.generate_summary(false, false).await.is_err());

        session.connect("s1");
        session.submit_op("alice", Value::Null);
        let data = generator
            .generate_summary(true, false)
            .await
            .expect("generate")
            .expect("submitted");
        assert!(data.submitted);
        assert_eq!(data.reference_sequence_number, 2);
        assert_eq!(data.client_sequence_number, 1);
        assert_eq!(data.stats.handle_node_count, 0);
        assert_eq!(generator.generated(), 1);
    }
}

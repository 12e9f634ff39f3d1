//! RunningSummarizer - drives summary attempts while this client holds the
//! summarizer role.
//!
//! Op events feed the heuristics; heuristics (or an explicit save request)
//! trigger an attempt. One attempt at a time is in flight:
//!
//! ```text
//! generate ──► submit ──► wait broadcast ──► wait ack/nack ──► update baseline
//!    │                         │                    │
//!    └── watchdog (report)     └──── shared ack-wait window ────┘
//! ```
//!
//! A nack is retried once, immediately, in safe mode. Everything else that
//! goes wrong aborts the attempt and leaves scheduling to the heuristics.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use opsum_protocols::{
    AckNack, ClientSummaryWatcher, GenerateSummaryData, ListenerId, MessageType, OpEvent,
    OpListener, OpSource, SequencedDocumentMessage, SummaryAttempt, SummaryConfiguration,
    SummaryGenerator,
};

use crate::heuristics::{HeuristicsState, SummarizeReason, SummarizerHeuristics, TriggerFn};
use crate::promise_timer::PromiseTimer;
use crate::timer::Timer;

/// First report if generation runs longer than this.
pub const MAX_SUMMARIZE_TIMEOUT: Duration = Duration::from_secs(20);

/// Number of slow-generation reports, each after double the previous wait.
pub const MAX_SUMMARIZE_TIMEOUT_COUNT: u32 = 5;

/// Everything a running summarizer needs at start.
pub struct RunningSummarizerOptions {
    /// Client id of the summarizer's own connection.
    pub client_id: String,
    /// Client the summarizer acts for.
    pub on_behalf_of: String,
    pub watcher: Arc<dyn ClientSummaryWatcher>,
    pub configuration: SummaryConfiguration,
    pub generator: Arc<dyn SummaryGenerator>,
    pub last_op_seq_number: u64,
    pub first_ack: SummaryAttempt,
    /// Require a full summary before anything else.
    pub immediate_summary: bool,
}

/// How a single attempt ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AttemptOutcome {
    Acked,
    Rejected,
    Aborted,
}

/// Handle to a running summarizer engine.
///
/// The engine stays alive until [`dispose`](Self::dispose); after that every
/// pending wait resolves as a no-op.
pub struct RunningSummarizer {
    inner: Arc<EngineInner>,
}

struct EngineInner {
    client_id: String,
    on_behalf_of: String,
    configuration: SummaryConfiguration,
    watcher: Arc<dyn ClientSummaryWatcher>,
    generator: Arc<dyn SummaryGenerator>,
    heuristics: SummarizerHeuristics,
    /// Generation watchdog.
    summarize_timer: Timer,
    /// Bounds waits for flush, broadcast and ack/nack.
    pending_ack_timer: PromiseTimer,
    cancel: CancellationToken,
    state: Mutex<EngineState>,
    summarize_count: AtomicU64,
    subscriptions: Mutex<Vec<(Arc<dyn OpSource>, ListenerId)>>,
}

#[derive(Debug, Default)]
struct EngineState {
    summarizing: bool,
    try_while_summarizing: bool,
    immediate_summary: bool,
    disposed: bool,
}

impl RunningSummarizer {
    /// Create the engine, wait (bounded) for summaries already in flight to
    /// flush, then kick off scheduling.
    pub async fn start(options: RunningSummarizerOptions) -> Self {
        let immediate_summary = options.immediate_summary;
        let inner = Arc::new_cyclic(|weak| EngineInner::new(options, weak.clone()));

        inner.wait_start().await;
        if !inner.is_disposed() {
            if immediate_summary {
                inner.try_summarize(SummarizeReason::Immediate);
            } else {
                inner.heuristics.run();
            }
        }
        Self { inner }
    }

    pub fn client_id(&self) -> &str {
        &self.inner.client_id
    }

    pub fn on_behalf_of(&self) -> &str {
        &self.inner.on_behalf_of
    }

    pub fn is_disposed(&self) -> bool {
        self.inner.is_disposed()
    }

    /// Whether an attempt is in flight.
    pub fn is_summarizing(&self) -> bool {
        self.inner.state.lock().summarizing
    }

    pub fn immediate_summary(&self) -> bool {
        self.inner.state.lock().immediate_summary
    }

    pub fn heuristics_state(&self) -> HeuristicsState {
        self.inner.heuristics.snapshot()
    }

    /// Number of generation calls made so far.
    pub fn summarize_count(&self) -> u64 {
        self.inner.summarize_count.load(Ordering::SeqCst)
    }

    /// Handle a processed runtime op.
    pub fn handle_op(&self, event: OpEvent<'_>) {
        self.inner.handle_op(event);
    }

    /// Handle an inbound op; only quorum-affecting system ops matter.
    pub fn handle_system_op(&self, op: &SequencedDocumentMessage) {
        self.inner.handle_system_op(op);
    }

    /// Register for system ops on `inbound` and runtime ops on `processed`.
    /// Both registrations are removed on dispose.
    pub fn listen(&self, inbound: Arc<dyn OpSource>, processed: Arc<dyn OpSource>) {
        if self.inner.is_disposed() {
            return;
        }

        let weak = Arc::downgrade(&self.inner);
        let system_listener: OpListener = Arc::new(move |event| {
            if let (Some(inner), Ok(op)) = (weak.upgrade(), event) {
                inner.handle_system_op(op);
            }
        });
        let weak = Arc::downgrade(&self.inner);
        let op_listener: OpListener = Arc::new(move |event| {
            if let Some(inner) = weak.upgrade() {
                inner.handle_op(event);
            }
        });

        let system_id = inbound.subscribe(system_listener);
        let op_id = processed.subscribe(op_listener);
        self.inner
            .subscriptions
            .lock()
            .extend([(inbound, system_id), (processed, op_id)]);
    }

    /// Stop everything. Idempotent.
    pub fn dispose(&self) {
        self.inner.dispose();
    }
}

impl std::fmt::Debug for RunningSummarizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunningSummarizer")
            .field("client_id", &self.inner.client_id)
            .field("on_behalf_of", &self.inner.on_behalf_of)
            .field("state", &*self.inner.state.lock())
            .finish()
    }
}

impl EngineInner {
    fn new(options: RunningSummarizerOptions, weak: Weak<EngineInner>) -> Self {
        let trigger_target = weak.clone();
        let trigger: TriggerFn = Arc::new(move |reason| {
            if let Some(inner) = trigger_target.upgrade() {
                inner.try_summarize(reason);
            }
        });

        let watchdog_target = weak.clone();
        let summarize_timer = Timer::new("summarize-watchdog", MAX_SUMMARIZE_TIMEOUT, move || {
            summarize_timer_handler(&watchdog_target, MAX_SUMMARIZE_TIMEOUT, 1)
        });

        let timeout_target = weak;
        let pending_ack_timer = PromiseTimer::new(
            "summary-ack-wait",
            options.configuration.max_ack_wait_time(),
            move || {
                if let Some(inner) = timeout_target.upgrade() {
                    inner.log_ack_wait_timeout();
                }
            },
        );

        Self {
            heuristics: SummarizerHeuristics::new(
                options.configuration.clone(),
                trigger,
                options.last_op_seq_number,
                options.first_ack,
            ),
            client_id: options.client_id,
            on_behalf_of: options.on_behalf_of,
            configuration: options.configuration,
            watcher: options.watcher,
            generator: options.generator,
            summarize_timer,
            pending_ack_timer,
            cancel: CancellationToken::new(),
            state: Mutex::new(EngineState {
                immediate_summary: options.immediate_summary,
                ..EngineState::default()
            }),
            summarize_count: AtomicU64::new(0),
            subscriptions: Mutex::new(Vec::new()),
        }
    }

    fn is_disposed(&self) -> bool {
        self.state.lock().disposed
    }

    async fn wait_start(&self) {
        let mut timeout = self.pending_ack_timer.start();
        let last_ack = tokio::select! {
            acked = self.watcher.wait_flushed() => acked,
            _ = &mut timeout => None,
            _ = self.cancel.cancelled() => None,
        };
        self.pending_ack_timer.clear();

        if let Some(acked) = last_ack {
            debug!(
                reference_sequence_number = acked.summary_op.reference_sequence_number,
                summary_sequence_number = acked.summary_op.sequence_number,
                "Seeding baseline from flushed summary ack"
            );
            self.heuristics.record_sent(SummaryAttempt::from_acked(&acked));
            self.heuristics.ack_last_sent();
        }
    }

    fn handle_op(self: &Arc<Self>, event: OpEvent<'_>) {
        let op = match event {
            Ok(op) => op,
            Err(e) => {
                debug!(error = %e, "Skipping undelivered op");
                return;
            }
        };
        if self.is_disposed() {
            return;
        }

        self.heuristics.set_last_op_seq_number(op.sequence_number);
        if op.message_type == MessageType::Save {
            self.try_summarize(SummarizeReason::Requested {
                client_id: op.client_id.clone().unwrap_or_default(),
                contents: op.contents.to_string(),
            });
        } else {
            self.heuristics.run();
        }
    }

    fn handle_system_op(self: &Arc<Self>, op: &SequencedDocumentMessage) {
        match op.message_type {
            MessageType::ClientLeave => {
                match op.leaving_client_id() {
                    // Our own or our parent's departure means we are about to stop.
                    Ok(leaving) if leaving == self.client_id || leaving == self.on_behalf_of => {
                        return;
                    }
                    Ok(_) => {}
                    Err(e) => {
                        warn!(
                            error = %e,
                            sequence_number = op.sequence_number,
                            "Leave op without a readable client id"
                        );
                    }
                }
                self.handle_op(Ok(op));
            }
            MessageType::ClientJoin | MessageType::Propose | MessageType::Reject => {
                self.handle_op(Ok(op));
            }
            _ => {}
        }
    }

    fn try_summarize(self: &Arc<Self>, reason: SummarizeReason) {
        {
            let mut state = self.state.lock();
            if state.disposed {
                return;
            }
            if state.summarizing {
                state.try_while_summarizing = true;
                return;
            }
            state.summarizing = true;
        }

        let inner = Arc::clone(self);
        tokio::spawn(async move {
            inner.summarize_cycle(reason).await;
        });
    }

    async fn summarize_cycle(&self, reason: SummarizeReason) {
        if self.summarize(&reason, false).await == AttemptOutcome::Rejected
            && !self.is_disposed()
            && self.summarize(&reason, true).await == AttemptOutcome::Rejected
        {
            warn!(reason = %reason, "Summary rejected again after safe retry");
        }

        let rerun = {
            let mut state = self.state.lock();
            state.summarizing = false;
            std::mem::take(&mut state.try_while_summarizing) && !state.disposed
        };
        if rerun {
            self.heuristics.run();
        }
    }

    async fn summarize(&self, reason: &SummarizeReason, safe: bool) -> AttemptOutcome {
        self.summarize_timer.start();
        let outcome = self.summarize_core(reason, safe).await;
        self.summarize_timer.clear();
        self.pending_ack_timer.clear();
        outcome
    }

    async fn summarize_core(&self, reason: &SummarizeReason, safe: bool) -> AttemptOutcome {
        let Some(data) = self.generate_summary_with_logging(reason, safe).await else {
            return AttemptOutcome::Aborted;
        };
        if !data.submitted || self.is_disposed() {
            return AttemptOutcome::Aborted;
        }

        let summary_time = Instant::now();
        self.heuristics
            .record_sent(SummaryAttempt::new(data.reference_sequence_number, summary_time));

        let mut pending_timeout = self.pending_ack_timer.start();
        let summary = self.watcher.watch_summary(data.client_sequence_number);

        let summary_op = tokio::select! {
            op = summary.wait_broadcast() => op,
            _ = &mut pending_timeout => None,
            _ = self.cancel.cancelled() => None,
        };
        let Some(summary_op) = summary_op else {
            return AttemptOutcome::Aborted;
        };
        if self.is_disposed() {
            return AttemptOutcome::Aborted;
        }

        self.heuristics
            .set_last_sent_sequence_number(summary_op.sequence_number);
        info!(
            time_waiting_ms = summary_time.elapsed().as_millis() as u64,
            reference_sequence_number = summary_op.reference_sequence_number,
            summary_sequence_number = summary_op.sequence_number,
            handle = %summary_op.contents.handle,
            "SummaryOp"
        );

        let ack_nack = tokio::select! {
            verdict = summary.wait_ack_nack() => verdict,
            _ = &mut pending_timeout => None,
            _ = self.cancel.cancelled() => None,
        };
        let Some(ack_nack) = ack_nack else {
            return AttemptOutcome::Aborted;
        };
        self.pending_ack_timer.clear();
        if self.is_disposed() {
            return AttemptOutcome::Aborted;
        }

        let time_waiting_ms = summary_time.elapsed().as_millis() as u64;
        match ack_nack {
            AckNack::Ack(ack) => {
                info!(
                    time_waiting_ms,
                    summary_sequence_number = ack.contents.summary_proposal.summary_sequence_number,
                    handle = %ack.contents.handle,
                    "SummaryAck"
                );
                self.heuristics.ack_last_sent();
                // A full summary stays required until one is accepted.
                self.state.lock().immediate_summary = false;
                AttemptOutcome::Acked
            }
            AckNack::Nack(nack) => {
                warn!(
                    time_waiting_ms,
                    summary_sequence_number = nack.contents.summary_proposal.summary_sequence_number,
                    error = %nack.contents.error_message,
                    safe,
                    "SummaryNack"
                );
                AttemptOutcome::Rejected
            }
        }
    }

    async fn generate_summary_with_logging(
        &self,
        reason: &SummarizeReason,
        safe: bool,
    ) -> Option<GenerateSummaryData> {
        let summarize_count = self.summarize_count.fetch_add(1, Ordering::SeqCst) + 1;
        let full = self.state.lock().immediate_summary;
        let before = self.heuristics.snapshot();
        info!(
            reason = %reason,
            summarize_count,
            full,
            safe,
            time_since_last_attempt_ms = before.last_sent.summary_time.elapsed().as_millis() as u64,
            time_since_last_summary_ms = before.last_acked.summary_time.elapsed().as_millis() as u64,
            "Summarizing"
        );

        let data = match self.generator.generate_summary(full, safe).await {
            Ok(data) => data,
            Err(e) => {
                error!(error = %e, reason = %reason, summarize_count, "Summarizing_cancel");
                return None;
            }
        };
        self.summarize_timer.clear();

        let Some(data) = data else {
            warn!(reason = %reason, summarize_count, "Summarizing_cancel");
            return None;
        };

        let ops_since_last_attempt = data
            .reference_sequence_number
            .saturating_sub(before.last_sent.reference_sequence_number);
        let ops_since_last_summary = data
            .reference_sequence_number
            .saturating_sub(before.last_acked.reference_sequence_number);
        if data.submitted {
            info!(
                summarize_count,
                reference_sequence_number = data.reference_sequence_number,
                client_sequence_number = data.client_sequence_number,
                ops_since_last_attempt,
                ops_since_last_summary,
                tree_node_count = data.stats.tree_node_count,
                blob_node_count = data.stats.blob_node_count,
                handle_node_count = data.stats.handle_node_count,
                total_blob_size = data.stats.total_blob_size,
                "Summarizing_end"
            );
        } else {
            warn!(
                summarize_count,
                reference_sequence_number = data.reference_sequence_number,
                ops_since_last_attempt,
                ops_since_last_summary,
                "Summarizing_cancel"
            );
        }
        Some(data)
    }

    fn log_ack_wait_timeout(&self) {
        let last_sent = self.heuristics.last_sent();
        error!(
            max_ack_wait_time_ms = self.configuration.max_ack_wait_time_ms,
            reference_sequence_number = last_sent.reference_sequence_number,
            summary_sequence_number = ?last_sent.summary_sequence_number,
            time_pending_ms = last_sent.summary_time.elapsed().as_millis() as u64,
            "SummaryAckWaitTimeout"
        );
    }

    fn dispose(&self) {
        {
            let mut state = self.state.lock();
            if state.disposed {
                return;
            }
            state.disposed = true;
        }

        self.cancel.cancel();
        let subscriptions = std::mem::take(&mut *self.subscriptions.lock());
        for (source, id) in subscriptions {
            source.unsubscribe(id);
        }
        self.watcher.dispose();
        self.heuristics.dispose();
        self.summarize_timer.clear();
        self.pending_ack_timer.clear();
        debug!(
            client_id = %self.client_id,
            on_behalf_of = %self.on_behalf_of,
            "Running summarizer disposed"
        );
    }
}

/// Report slow generation and re-arm with double the wait.
fn summarize_timer_handler(weak: &Weak<EngineInner>, time: Duration, count: u32) {
    let Some(inner) = weak.upgrade() else {
        return;
    };
    error!(
        timeout_ms = time.as_millis() as u64,
        timeout_count = count,
        "SummarizeTimeout"
    );
    if count < MAX_SUMMARIZE_TIMEOUT_COUNT {
        let next = time * 2;
        let weak = weak.clone();
        inner
            .summarize_timer
            .start_with(next, move || summarize_timer_handler(&weak, next, count + 1));
    }
}

#[cfg(test)]
#[path = "running_summarizer_tests.rs"]
mod tests;

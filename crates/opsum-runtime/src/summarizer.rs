//! Summarizer - session controller for summary work.
//!
//! Binds a [`RunningSummarizer`] to the hosting session: it starts one when
//! the coordinator says the session is connected and this client is still
//! the elected summarizer, feeds it the session's op streams, keeps the
//! generation baseline current as acks arrive, and tears everything down
//! when the run stops.

use std::sync::{Arc, Weak};

use async_trait::async_trait;
use futures::future::BoxFuture;
use parking_lot::Mutex;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use opsum_protocols::{
    GenerateSummaryData, LatestAckRefresher, ListenerId, RunCoordinator, RunOutcome, Runnable,
    SummarizerHost, SummaryAttempt, SummaryConfiguration, SummaryContext, SummaryError,
    SummaryGenerator,
};

use crate::coordinator::RunWhileConnectedCoordinator;
use crate::error::SummarizerResult;
use crate::handoff::Handoff;
use crate::running_summarizer::{RunningSummarizer, RunningSummarizerOptions};
use crate::summary_collection::SummaryCollection;

/// Hands the controller created after a session reload to its predecessor.
pub type SummarizerHandoff = Handoff<Arc<Summarizer>>;

/// Collaborators a controller is built from.
pub struct SummarizerOptions {
    pub host: Arc<dyn SummarizerHost>,
    pub configuration: SummaryConfiguration,
    pub generator: Arc<dyn SummaryGenerator>,
    pub refresher: Arc<dyn LatestAckRefresher>,
    /// Shared across reloads; resolved with the new controller on construction.
    pub handoff: SummarizerHandoff,
    /// Collection carried over from the previous controller. Its presence
    /// means the session was reloaded and a full summary is due.
    pub summary_collection: Option<SummaryCollection>,
}

/// Session controller. Runs summary work on behalf of the elected client.
pub struct Summarizer {
    host: Arc<dyn SummarizerHost>,
    configuration: SummaryConfiguration,
    generator: Arc<dyn SummaryGenerator>,
    refresher: Arc<dyn LatestAckRefresher>,
    collection: SummaryCollection,
    coordinator: RunWhileConnectedCoordinator,
    handoff: SummarizerHandoff,
    collection_listener: ListenerId,
    state: Mutex<ControllerState>,
    weak_self: Weak<Summarizer>,
}

#[derive(Default)]
struct ControllerState {
    on_behalf_of: Option<String>,
    running: Option<Arc<RunningSummarizer>>,
    ack_refresh: Option<CancellationToken>,
    immediate_summary: bool,
}

impl Summarizer {
    pub fn new(options: SummarizerOptions) -> Arc<Self> {
        let immediate_summary = options.summary_collection.is_some();
        let collection = options
            .summary_collection
            .unwrap_or_else(|| SummaryCollection::new(options.host.initial_sequence_number()));

        let feed = collection.clone();
        let collection_listener = options.host.inbound_ops().subscribe(Arc::new(move |event| {
            if let Ok(op) = event {
                feed.handle_op(op);
            }
        }));

        let summarizer = Arc::new_cyclic(|weak_self| Self {
            coordinator: RunWhileConnectedCoordinator::new(options.host.as_ref()),
            host: options.host,
            configuration: options.configuration,
            generator: options.generator,
            refresher: options.refresher,
            collection,
            handoff: options.handoff,
            collection_listener,
            state: Mutex::new(ControllerState {
                immediate_summary,
                ..ControllerState::default()
            }),
            weak_self: weak_self.clone(),
        });
        summarizer.handoff.resolve(summarizer.clone());
        summarizer
    }

    pub fn summary_collection(&self) -> &SummaryCollection {
        &self.collection
    }

    pub fn is_running(&self) -> bool {
        self.state.lock().running.is_some()
    }

    /// The engine of the current run, if one is active.
    pub fn running_summarizer(&self) -> Option<Arc<RunningSummarizer>> {
        self.state.lock().running.clone()
    }

    /// Run until stopped, then clean up. Closes the session if it is still
    /// connected when the run ends.
    pub async fn run(&self, on_behalf_of: &str) -> RunOutcome {
        let outcome = self.run_core(on_behalf_of).await;
        self.dispose();
        if self.host.connected() {
            self.stop("runEnded");
        }
        outcome
    }

    /// Stop the run and close the owning session.
    pub fn stop(&self, reason: &str) {
        let on_behalf_of = self.state.lock().on_behalf_of.clone();
        info!(on_behalf_of = ?on_behalf_of, reason, "StoppingSummarizer");
        self.coordinator.stop();
        self.host.close(&format!("Summarizer: {}", reason));
    }

    /// Resolve with the next controller created after a session reload.
    pub fn set_summarizer(&self) -> BoxFuture<'static, SummarizerResult<Arc<Summarizer>>> {
        self.handoff.prepare()
    }

    /// Dispose the running engine and end the ack refresh loop.
    pub fn dispose(&self) {
        let (running, ack_refresh) = {
            let mut state = self.state.lock();
            (state.running.take(), state.ack_refresh.take())
        };
        if let Some(running) = running {
            running.dispose();
        }
        if let Some(ack_refresh) = ack_refresh {
            ack_refresh.cancel();
        }
    }

    async fn run_core(&self, on_behalf_of: &str) -> RunOutcome {
        self.state.lock().on_behalf_of = Some(on_behalf_of.to_string());

        let start = self.coordinator.wait_start().await;
        if !start.started {
            warn!(error = ?start.message, on_behalf_of, "NotStarted");
            return RunOutcome::NotStarted {
                message: start.message,
            };
        }

        let expected = self.host.summarizer_client_id();
        if expected.as_deref() != Some(on_behalf_of) {
            error!(expected_summarizer = ?expected, on_behalf_of, "ParentIsNotSummarizer");
            return RunOutcome::NotSummarizer {
                expected,
                on_behalf_of: on_behalf_of.to_string(),
            };
        }

        let Some(client_id) = self.host.client_id() else {
            warn!(on_behalf_of, "NotStarted");
            return RunOutcome::NotStarted {
                message: Some("MissingClientId".to_string()),
            };
        };

        let initial_sequence_number = self.collection.initial_sequence_number();
        info!(
            on_behalf_of,
            client_id = %client_id,
            init_summary_seq_number = initial_sequence_number,
            "RunningSummarizer"
        );

        let immediate_summary = self.state.lock().immediate_summary;
        let running = Arc::new(
            RunningSummarizer::start(RunningSummarizerOptions {
                watcher: self.collection.create_watcher(client_id.clone()),
                client_id,
                on_behalf_of: on_behalf_of.to_string(),
                configuration: self.configuration.clone(),
                generator: Arc::new(RoleCheckedGenerator {
                    summarizer: self.weak_self.clone(),
                }),
                last_op_seq_number: self.host.reference_sequence_number(),
                first_ack: SummaryAttempt::new(initial_sequence_number, Instant::now()),
                immediate_summary,
            })
            .await,
        );

        let ack_refresh = self.spawn_ack_refresh();
        {
            let mut state = self.state.lock();
            state.running = Some(running.clone());
            state.ack_refresh = Some(ack_refresh);
            state.immediate_summary = false;
        }
        running.listen(self.host.inbound_ops(), self.host.processed_ops());

        self.coordinator.wait_stopped().await;
        RunOutcome::Stopped
    }

    /// Refresh the generation baseline after every newly acked summary.
    fn spawn_ack_refresh(&self) -> CancellationToken {
        let cancel = CancellationToken::new();
        let stopped = cancel.clone();
        let collection = self.collection.clone();
        let refresher = self.refresher.clone();
        let mut reference_sequence_number = collection.initial_sequence_number();

        tokio::spawn(async move {
            loop {
                let acked = tokio::select! {
                    acked = collection.wait_summary_ack(reference_sequence_number) => acked,
                    _ = stopped.cancelled() => break,
                };
                let Some(acked) = acked else {
                    break;
                };

                let acked_reference = acked.summary_op.reference_sequence_number;
                // Advance first so a failing refresh is not retried for the same ack.
                reference_sequence_number = acked_reference + 1;
                let context = SummaryContext::from(&acked);
                if let Err(e) = refresher.refresh_latest_ack(context, acked_reference).await {
                    error!(
                        error = %e,
                        reference_sequence_number = acked_reference,
                        "HandleSummaryAckError"
                    );
                }
            }
        });
        cancel
    }

    async fn generate_summary(
        &self,
        full: bool,
        safe: bool,
    ) -> Result<Option<GenerateSummaryData>, SummaryError> {
        let on_behalf_of = self.state.lock().on_behalf_of.clone();
        if on_behalf_of != self.host.summarizer_client_id() {
            self.stop("parentNoLongerSummarizer");
            return Ok(None);
        }
        self.generator.generate_summary(full, safe).await
    }
}

impl Drop for Summarizer {
    fn drop(&mut self) {
        self.host.inbound_ops().unsubscribe(self.collection_listener);
        if let Some(ack_refresh) = self.state.get_mut().ack_refresh.take() {
            ack_refresh.cancel();
        }
    }
}

impl std::fmt::Debug for Summarizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("Summarizer")
            .field("on_behalf_of", &state.on_behalf_of)
            .field("running", &state.running.is_some())
            .field("immediate_summary", &state.immediate_summary)
            .field("collection", &self.collection)
            .finish()
    }
}

#[async_trait]
impl Runnable for Summarizer {
    async fn run(&self, on_behalf_of: &str) -> RunOutcome {
        Summarizer::run(self, on_behalf_of).await
    }

    fn stop(&self, reason: &str) {
        Summarizer::stop(self, reason);
    }
}

/// Re-checks the summarizer role before every generation.
struct RoleCheckedGenerator {
    summarizer: Weak<Summarizer>,
}

#[async_trait]
impl SummaryGenerator for RoleCheckedGenerator {
    async fn generate_summary(
        &self,
        full: bool,
        safe: bool,
    ) -> Result<Option<GenerateSummaryData>, SummaryError> {
        match self.summarizer.upgrade() {
            Some(summarizer) => summarizer.generate_summary(full, safe).await,
            None => Ok(None),
        }
    }
}

#[cfg(test)]
#[path = "summarizer_tests.rs"]
mod tests;

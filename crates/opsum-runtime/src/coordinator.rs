//! Run coordination bound to the host's connection state.

use async_trait::async_trait;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use opsum_protocols::{ConnectionState, RunCoordinator, StartResult, SummarizerHost};

/// Starts once the host is connected and stops on the first disconnect,
/// disposal, or explicit [`stop`](RunCoordinator::stop).
pub struct RunWhileConnectedCoordinator {
    connection: watch::Receiver<ConnectionState>,
    stopped: CancellationToken,
}

impl RunWhileConnectedCoordinator {
    pub fn new(host: &dyn SummarizerHost) -> Self {
        Self {
            connection: host.connection_state(),
            stopped: CancellationToken::new(),
        }
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.is_cancelled()
    }

    fn watch_disconnect(&self) {
        let mut connection = self.connection.clone();
        let stopped = self.stopped.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = connection.wait_for(|state| *state != ConnectionState::Connected) => {
                    debug!("Host left the connected state; stopping run");
                    stopped.cancel();
                }
                _ = stopped.cancelled() => {}
            }
        });
    }
}

#[async_trait]
impl RunCoordinator for RunWhileConnectedCoordinator {
    async fn wait_start(&self) -> StartResult {
        if *self.connection.borrow() == ConnectionState::Disposed {
            return StartResult::not_started("RuntimeDisposed");
        }

        let mut connection = self.connection.clone();
        let state = tokio::select! {
            state = connection.wait_for(|state| *state != ConnectionState::Disconnected) => {
                state.map(|state| *state).unwrap_or(ConnectionState::Disposed)
            }
            _ = self.stopped.cancelled() => {
                return StartResult::not_started("StoppedBeforeConnected");
            }
        };

        if state == ConnectionState::Disposed {
            return StartResult::not_started("RuntimeDisposed");
        }
        if self.stopped.is_cancelled() {
            return StartResult::not_started("StoppedBeforeConnected");
        }

        self.watch_disconnect();
        StartResult::started()
    }

    async fn wait_stopped(&self) {
        self.stopped.cancelled().await;
    }

    fn stop(&self) {
        self.stopped.cancel();
    }
}

impl std::fmt::Debug for RunWhileConnectedCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunWhileConnectedCoordinator")
            .field("connection", &*self.connection.borrow())
            .field("stopped", &self.is_stopped())
            .finish()
    }
}

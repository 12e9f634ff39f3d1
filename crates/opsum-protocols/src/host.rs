//! The session hosting a summarizer.

use std::sync::Arc;

use tokio::sync::watch;

use crate::source::OpSource;

/// Connection state of the hosting session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connected,
    /// Terminal; the session will never connect again.
    Disposed,
}

/// Session-level facts and op streams a summarizer consumes.
pub trait SummarizerHost: Send + Sync {
    fn connection_state(&self) -> watch::Receiver<ConnectionState>;

    fn connected(&self) -> bool {
        *self.connection_state().borrow() == ConnectionState::Connected
    }

    fn disposed(&self) -> bool {
        *self.connection_state().borrow() == ConnectionState::Disposed
    }

    /// Client id of the current connection, if connected.
    fn client_id(&self) -> Option<String>;

    /// Client id currently elected to summarize (the parent this summarizer acts for).
    fn summarizer_client_id(&self) -> Option<String>;

    /// Sequence number the session loaded from.
    fn initial_sequence_number(&self) -> u64;

    /// Sequence number of the last processed op.
    fn reference_sequence_number(&self) -> u64;

    /// Every inbound sequenced message, system messages included.
    fn inbound_ops(&self) -> Arc<dyn OpSource>;

    /// Runtime messages, after the runtime processed them.
    fn processed_ops(&self) -> Arc<dyn OpSource>;

    /// Close the session.
    fn close(&self, reason: &str);
}

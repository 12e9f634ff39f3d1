//! One-shot handoff of a successor instance across a session reload.

use std::sync::Arc;

use futures::future::{BoxFuture, FutureExt};
use parking_lot::Mutex;
use tokio::sync::oneshot;

use crate::error::{SummarizerError, SummarizerResult};

type Slot<T> = Arc<Mutex<Option<oneshot::Sender<SummarizerResult<T>>>>>;

/// Shared slot through which the next instance is handed to whoever asked.
///
/// Each [`prepare`](Self::prepare) creates a fresh one-shot; an earlier,
/// still unresolved request fails with [`SummarizerError::HandoffSuperseded`].
pub struct Handoff<T> {
    slot: Slot<T>,
}

impl<T> Clone for Handoff<T> {
    fn clone(&self) -> Self {
        Self {
            slot: self.slot.clone(),
        }
    }
}

impl<T> Default for Handoff<T> {
    fn default() -> Self {
        Self {
            slot: Arc::new(Mutex::new(None)),
        }
    }
}

impl<T: Send + 'static> Handoff<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request the next instance.
    pub fn prepare(&self) -> BoxFuture<'static, SummarizerResult<T>> {
        let (tx, rx) = oneshot::channel();
        if let Some(previous) = self.slot.lock().replace(tx) {
            let _ = previous.send(Err(SummarizerError::HandoffSuperseded));
        }
        async move { rx.await.unwrap_or(Err(SummarizerError::HandoffDropped)) }.boxed()
    }

    /// Fulfil the outstanding request, if any. Returns whether one was waiting.
    pub fn resolve(&self, next: T) -> bool {
        match self.slot.lock().take() {
            Some(tx) => tx.send(Ok(next)).is_ok(),
            None => false,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.slot.lock().is_some()
    }
}

impl<T> std::fmt::Debug for Handoff<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Handoff")
            .field("pending", &self.slot.lock().is_some())
            .finish()
    }
}

//! Op-stream delivery with explicit listener registration.

use std::sync::Arc;

use crate::error::DeliveryError;
use crate::message::SequencedDocumentMessage;

/// A delivered op, or the failure to deliver it.
pub type OpEvent<'a> = Result<&'a SequencedDocumentMessage, &'a DeliveryError>;

/// Listener invoked for every delivered op event.
pub type OpListener = Arc<dyn Fn(OpEvent<'_>) + Send + Sync>;

/// Identity of a registered listener, held by the subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

impl ListenerId {
    pub fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub fn raw(&self) -> u64 {
        self.0
    }
}

/// Source of sequenced op events.
///
/// Events are delivered in strictly increasing sequence number order.
pub trait OpSource: Send + Sync {
    /// Register a listener and return its identity.
    fn subscribe(&self, listener: OpListener) -> ListenerId;

    /// Remove exactly the listener registered under `id`.
    /// Returns false if it was not registered.
    fn unsubscribe(&self, id: ListenerId) -> bool;
}

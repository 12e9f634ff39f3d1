//! OpEmitter - in-memory op source with explicit listener ids.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::RwLock;
use tracing::trace;

use opsum_protocols::{DeliveryError, ListenerId, OpListener, OpSource, SequencedDocumentMessage};

/// Fan-out op source.
///
/// Listeners are invoked in registration order. Each emission works on a
/// snapshot of the listener set, so a listener may unsubscribe itself (or
/// others) while being called.
#[derive(Default)]
pub struct OpEmitter {
    next_id: AtomicU64,
    listeners: RwLock<BTreeMap<u64, OpListener>>,
}

impl OpEmitter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.read().len()
    }

    /// Deliver an op to every listener.
    pub fn emit(&self, op: &SequencedDocumentMessage) {
        trace!(
            sequence_number = op.sequence_number,
            message_type = %op.message_type,
            "Emitting op"
        );
        for listener in self.snapshot() {
            listener(Ok(op));
        }
    }

    /// Deliver a delivery failure to every listener.
    pub fn emit_error(&self, error: &DeliveryError) {
        for listener in self.snapshot() {
            listener(Err(error));
        }
    }

    fn snapshot(&self) -> Vec<OpListener> {
        self.listeners.read().values().cloned().collect()
    }
}

impl OpSource for OpEmitter {
    fn subscribe(&self, listener: OpListener) -> ListenerId {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        self.listeners.write().insert(id, listener);
        ListenerId::new(id)
    }

    fn unsubscribe(&self, id: ListenerId) -> bool {
        self.listeners.write().remove(&id.raw()).is_some()
    }
}

impl std::fmt::Debug for OpEmitter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpEmitter")
            .field("listeners", &self.listener_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use opsum_protocols::MessageType;
    use parking_lot::Mutex;
    use std::sync::Arc;

    fn recorder(log: &Arc<Mutex<Vec<String>>>, name: &'static str) -> OpListener {
        let log = log.clone();
        Arc::new(move |event| match event {
            Ok(op) => log.lock().push(format!("{}:{}", name, op.sequence_number)),
            Err(error) => log.lock().push(format!("{}:err:{}", name, error.message)),
        })
    }

    #[test]
    fn test_emit_in_registration_order() {
        let emitter = OpEmitter::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        emitter.subscribe(recorder(&log, "a"));
        emitter.subscribe(recorder(&log, "b"));

        emitter.emit(&SequencedDocumentMessage::new(MessageType::Operation, 1));
        assert_eq!(*log.lock(), vec!["a:1", "b:1"]);
    }

    #[test]
    fn test_unsubscribe_removes_only_that_listener() {
        let emitter = OpEmitter::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        let a = emitter.subscribe(recorder(&log, "a"));
        emitter.subscribe(recorder(&log, "b"));

        assert!(emitter.unsubscribe(a));
        assert!(!emitter.unsubscribe(a));
        emitter.emit(&SequencedDocumentMessage::new(MessageType::Operation, 2));
        assert_eq!(*log.lock(), vec!["b:2"]);
        assert_eq!(emitter.listener_count(), 1);
    }

    #[test]
    fn test_emit_error() {
        let emitter = OpEmitter::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        emitter.subscribe(recorder(&log, "a"));

        emitter.emit_error(&DeliveryError::new("gap"));
        assert_eq!(*log.lock(), vec!["a:err:gap"]);
    }

    #[test]
    fn test_listener_may_unsubscribe_during_delivery() {
        let emitter = Arc::new(OpEmitter::new());
        let own_id: Arc<Mutex<Option<ListenerId>>> = Arc::new(Mutex::new(None));
        let calls = Arc::new(AtomicU64::new(0));

        let weak = Arc::downgrade(&emitter);
        let id_slot = own_id.clone();
        let counter = calls.clone();
        let id = emitter.subscribe(Arc::new(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            if let (Some(emitter), Some(id)) = (weak.upgrade(), *id_slot.lock()) {
                emitter.unsubscribe(id);
            }
        }));
        *own_id.lock() = Some(id);

        emitter.emit(&SequencedDocumentMessage::new(MessageType::Operation, 1));
        emitter.emit(&SequencedDocumentMessage::new(MessageType::Operation, 2));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(emitter.listener_count(), 0);
    }
}

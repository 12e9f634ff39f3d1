//! Timer - cancelable one-shot delay callback.
//!
//! A [`Timer`] owns at most one pending fire. Starting it again replaces the
//! pending fire, clearing it guarantees the handler will not run for that
//! arm, and a handler may re-arm its own timer with a different duration and
//! handler (used for exponential backoff).

use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tracing::trace;

/// Callback run when a timer fires.
pub type TimerHandler = Arc<dyn Fn() + Send + Sync>;

/// Cancelable one-shot delay timer.
///
/// Must be started from within a Tokio runtime. Dropping the timer cancels
/// any pending fire.
pub struct Timer {
    inner: Arc<TimerInner>,
}

struct TimerInner {
    id: String,
    default_duration: Duration,
    default_handler: TimerHandler,
    state: Mutex<TimerState>,
}

#[derive(Default)]
struct TimerState {
    /// Bumped on every start/clear; a fire only runs if its arm is current.
    generation: u64,
    pending: Option<JoinHandle<()>>,
}

impl Timer {
    /// Create an unarmed timer with a default duration and handler.
    pub fn new<F>(id: impl Into<String>, default_duration: Duration, handler: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        Self {
            inner: Arc::new(TimerInner {
                id: id.into(),
                default_duration,
                default_handler: Arc::new(handler),
                state: Mutex::new(TimerState::default()),
            }),
        }
    }

    /// Get the timer ID.
    pub fn id(&self) -> &str {
        &self.inner.id
    }

    pub fn default_duration(&self) -> Duration {
        self.inner.default_duration
    }

    /// Whether a fire is pending.
    pub fn has_timer(&self) -> bool {
        self.inner.state.lock().pending.is_some()
    }

    /// Arm with the default duration and handler.
    pub fn start(&self) {
        self.arm(self.inner.default_duration, self.inner.default_handler.clone());
    }

    /// Arm with an explicit duration and handler, replacing any pending fire.
    pub fn start_with<F>(&self, duration: Duration, handler: F)
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.arm(duration, Arc::new(handler));
    }

    /// Cancel the pending fire, if any.
    pub fn clear(&self) {
        let mut state = self.inner.state.lock();
        state.generation += 1;
        if let Some(pending) = state.pending.take() {
            pending.abort();
            trace!(timer = %self.inner.id, "Timer cleared");
        }
    }

    fn arm(&self, duration: Duration, handler: TimerHandler) {
        let mut state = self.inner.state.lock();
        state.generation += 1;
        if let Some(pending) = state.pending.take() {
            pending.abort();
        }

        let generation = state.generation;
        let weak: Weak<TimerInner> = Arc::downgrade(&self.inner);
        trace!(
            timer = %self.inner.id,
            duration_ms = duration.as_millis() as u64,
            "Timer armed"
        );

        state.pending = Some(tokio::spawn(async move {
            tokio::time::sleep(duration).await;
            let Some(inner) = weak.upgrade() else {
                return;
            };
            let current = {
                let mut state = inner.state.lock();
                if state.generation == generation {
                    state.pending = None;
                    true
                } else {
                    false
                }
            };
            // Lock released: the handler may re-arm this timer.
            if current {
                trace!(timer = %inner.id, "Timer fired");
                handler();
            }
        }));
    }
}

impl Drop for TimerInner {
    fn drop(&mut self) {
        if let Some(pending) = self.state.get_mut().pending.take() {
            pending.abort();
        }
    }
}

impl std::fmt::Debug for Timer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Timer")
            .field("id", &self.inner.id)
            .field("default_duration", &self.inner.default_duration)
            .field("has_timer", &self.has_timer())
            .finish()
    }
}

#[cfg(test)]
#[path = "timer_tests.rs"]
mod tests;

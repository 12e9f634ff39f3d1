//! PromiseTimer - awaitable timer used to bound other waits.
//!
//! Every [`PromiseTimer::start`] hands out a [`TimerWait`] future. On expiry
//! the timer's handler runs and all outstanding waits resolve
//! [`TimerResult::Fired`]; [`PromiseTimer::clear`] resolves them
//! [`TimerResult::Cleared`] and leaves the timer inert until started again.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::oneshot;

use crate::timer::Timer;

/// How a [`TimerWait`] resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerResult {
    Fired,
    Cleared,
}

type Waiters = Arc<Mutex<Vec<oneshot::Sender<TimerResult>>>>;

/// Restartable timer whose pending expiry can be awaited.
pub struct PromiseTimer {
    timer: Timer,
    waiters: Waiters,
}

impl PromiseTimer {
    pub fn new<F>(id: impl Into<String>, duration: Duration, handler: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        let waiters: Waiters = Arc::new(Mutex::new(Vec::new()));
        let fired = waiters.clone();
        let timer = Timer::new(id, duration, move || {
            handler();
            resolve_all(&fired, TimerResult::Fired);
        });
        Self { timer, waiters }
    }

    /// (Re)start the timer and return a future for its expiry.
    pub fn start(&self) -> TimerWait {
        let (tx, rx) = oneshot::channel();
        self.waiters.lock().push(tx);
        self.timer.start();
        TimerWait { rx }
    }

    /// Cancel the timer and resolve every outstanding wait as cleared.
    pub fn clear(&self) {
        self.timer.clear();
        resolve_all(&self.waiters, TimerResult::Cleared);
    }

    pub fn has_timer(&self) -> bool {
        self.timer.has_timer()
    }

    pub fn duration(&self) -> Duration {
        self.timer.default_duration()
    }
}

fn resolve_all(waiters: &Waiters, result: TimerResult) {
    let pending = std::mem::take(&mut *waiters.lock());
    for tx in pending {
        let _ = tx.send(result);
    }
}

/// Future for one [`PromiseTimer::start`] call.
///
/// Resolves [`TimerResult::Cleared`] if the timer is dropped unfired.
#[derive(Debug)]
pub struct TimerWait {
    rx: oneshot::Receiver<TimerResult>,
}

impl Future for TimerWait {
    type Output = TimerResult;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx)
            .poll(cx)
            .map(|result| result.unwrap_or(TimerResult::Cleared))
    }
}

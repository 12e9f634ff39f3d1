//! # opsum Runtime
//!
//! Summary coordination for a client connected to a shared, totally-ordered
//! op log. One client per session is elected summarizer; this crate decides
//! when it should summarize, drives each attempt through broadcast and
//! ack/nack, and keeps the baseline current once summaries are accepted.
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────────────┐
//! │ Summarizer (session controller)                                   │
//! │   RunWhileConnectedCoordinator ── start/stop on connection state  │
//! │   ack refresh loop ────────────── LatestAckRefresher              │
//! │  ┌─────────────────────────────────────────────────────────────┐  │
//! │  │ RunningSummarizer (engine)                                  │  │
//! │  │   SummarizerHeuristics ── maxTime / maxOps / idle triggers  │  │
//! │  │   Timer (watchdog)  PromiseTimer (ack-wait window)          │  │
//! │  └─────────────────────────────────────────────────────────────┘  │
//! └──────────────┬────────────────────────────────────────────────────┘
//!                │ inbound ops
//! ┌──────────────▼────────────────────────────────────────────────────┐
//! │ SummaryCollection ── summary / ack / nack bookkeeping per client  │
//! └───────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Key Components
//!
//! - [`Summarizer`]: Session controller and [`Runnable`](opsum_protocols::Runnable)
//! - [`RunningSummarizer`]: Attempt engine for one run
//! - [`SummarizerHeuristics`]: Decides when to summarize
//! - [`SummaryCollection`]: Tracks summary ops and their acks
//! - [`Timer`] / [`PromiseTimer`]: Restartable timers on the tokio clock
//! - [`LocalSession`]: In-process sequencer used for simulation and tests

pub mod coordinator;
pub mod emitter;
pub mod error;
pub mod handoff;
pub mod heuristics;
pub mod local;
pub mod promise_timer;
pub mod running_summarizer;
pub mod summarizer;
pub mod summary_collection;
pub mod timer;

// Re-exports
pub use coordinator::RunWhileConnectedCoordinator;
pub use emitter::OpEmitter;
pub use error::{SummarizerError, SummarizerResult};
pub use handoff::Handoff;
pub use heuristics::{HeuristicsState, SummarizeReason, SummarizerHeuristics, TriggerFn};
pub use local::{LocalSession, SessionSummaryGenerator};
pub use promise_timer::{PromiseTimer, TimerResult, TimerWait};
pub use running_summarizer::{
    MAX_SUMMARIZE_TIMEOUT, MAX_SUMMARIZE_TIMEOUT_COUNT, RunningSummarizer, RunningSummarizerOptions,
};
pub use summarizer::{Summarizer, SummarizerHandoff, SummarizerOptions};
pub use summary_collection::{SummaryCollection, SummaryWatcher};
pub use timer::{Timer, TimerHandler};
// Re-export CancellationToken for convenience
pub use tokio_util::sync::CancellationToken;

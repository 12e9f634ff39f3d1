//! # opsum Protocols
//!
//! Message model and collaborator contracts for summary coordination over a
//! shared, totally-ordered op log. Contains only types and interface
//! definitions - no implementations.
//!
//! ## Core Traits
//!
//! - [`OpSource`] - Explicit subscribe/unsubscribe op delivery
//! - [`SummaryGenerator`] - Produces and submits a summary op
//! - [`LatestAckRefresher`] - Refreshes the generation baseline after an ack
//! - [`ClientSummaryWatcher`] / [`SummaryTracker`] - Observe broadcast and ack/nack of own summaries
//! - [`RunCoordinator`] - Start/stop signal bound to connection state
//! - [`SummarizerHost`] - The hosting session
//! - [`Runnable`] - Capability exposed by a summarizer controller

pub mod config;
pub mod coordinator;
pub mod error;
pub mod generator;
pub mod host;
pub mod message;
pub mod source;
pub mod summary;
pub mod watcher;

pub use config::SummaryConfiguration;
pub use coordinator::{RunCoordinator, RunOutcome, Runnable, StartResult};
pub use error::{DeliveryError, SummaryError};
pub use generator::{LatestAckRefresher, SummaryGenerator};
pub use host::{ConnectionState, SummarizerHost};
pub use message::{
    AckNack, AckedSummary, MessageType, SequencedDocumentMessage, SummaryAck, SummaryAckContents,
    SummaryNack, SummaryNackContents, SummaryOp, SummaryProposal, SummaryProposalContents,
};
pub use source::{ListenerId, OpEvent, OpListener, OpSource};
pub use summary::{GenerateSummaryData, SummaryAttempt, SummaryContext, SummaryStats};
pub use watcher::{ClientSummaryWatcher, SummaryTracker};

//! Protocol error types.

use thiserror::Error;

use crate::message::MessageType;

/// Errors raised by summary collaborators and message parsing.
#[derive(Debug, Error)]
pub enum SummaryError {
    #[error("Summary generation failed: {0}")]
    Generation(String),

    #[error("Failed to refresh latest summary ack: {0}")]
    Refresh(String),

    #[error("Expected {expected} message, got {actual}")]
    UnexpectedMessageType {
        expected: MessageType,
        actual: MessageType,
    },

    #[error("Malformed message at sequence number {sequence_number}: {message}")]
    MalformedMessage { sequence_number: u64, message: String },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Failure to deliver a single op event to listeners.
///
/// Not fatal to listeners; the event is skipped.
#[derive(Debug, Clone, Error)]
#[error("Op delivery failed: {message}")]
pub struct DeliveryError {
    pub message: String,
}

impl DeliveryError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

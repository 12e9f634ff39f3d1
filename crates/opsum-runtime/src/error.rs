//! Error types for the summarizer runtime.

use thiserror::Error;

use opsum_protocols::SummaryError;

/// Errors surfaced by the summarizer runtime.
#[derive(Debug, Error)]
pub enum SummarizerError {
    /// A newer `set_summarizer` call replaced this one before a successor arrived.
    #[error("Summarizer handoff superseded by a newer request")]
    HandoffSuperseded,

    /// The handoff was dropped without ever producing a successor.
    #[error("Summarizer handoff dropped before a successor was created")]
    HandoffDropped,

    /// Protocol-level failure.
    #[error(transparent)]
    Protocol(#[from] SummaryError),
}

/// Result type for summarizer runtime operations.
pub type SummarizerResult<T> = Result<T, SummarizerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        assert_eq!(
            SummarizerError::HandoffSuperseded.to_string(),
            "Summarizer handoff superseded by a newer request"
        );
        let err: SummarizerError = SummaryError::Refresh("missing blob".to_string()).into();
        assert!(matches!(err, SummarizerError::Protocol(_)));
        assert!(err.to_string().contains("missing blob"));
    }
}

//! Summary generation and baseline refresh contracts.

use async_trait::async_trait;

use crate::error::SummaryError;
use crate::summary::{GenerateSummaryData, SummaryContext};

/// Generates a summary and submits it as an op.
#[async_trait]
pub trait SummaryGenerator: Send + Sync {
    /// Generate and submit a summary.
    ///
    /// `full` disables incremental reuse of the previous summary; `safe`
    /// additionally asks for the most conservative generation path.
    /// Returns `Ok(None)` when nothing was produced.
    async fn generate_summary(
        &self,
        full: bool,
        safe: bool,
    ) -> Result<Option<GenerateSummaryData>, SummaryError>;
}

/// Refreshes the baseline future generations are computed against.
#[async_trait]
pub trait LatestAckRefresher: Send + Sync {
    async fn refresh_latest_ack(
        &self,
        context: SummaryContext,
        reference_sequence_number: u64,
    ) -> Result<(), SummaryError>;
}

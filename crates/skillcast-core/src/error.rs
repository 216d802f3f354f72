use thiserror::Error;

use crate::SeriesKey;

/// Failure taxonomy shared by every pipeline stage.
///
/// Record-level variants (`MalformedInput`) are isolated by the caller and
/// counted; batch-level variants (`StoreWriteFailure`, `EmptyBatch`,
/// `WorkerInterrupted`) abort the batch without a partial commit. A
/// low-confidence forecast is not an error: see [`crate::ForecastQuality`].
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PipelineError {
    #[error("malformed posting {source_id}/{source_native_id}: {reason}")]
    MalformedInput {
        source_id: String,
        source_native_id: String,
        reason: String,
    },
    #[error("insufficient history for {key}: {have} periods available, {need} required")]
    InsufficientHistory {
        key: SeriesKey,
        have: usize,
        need: usize,
    },
    #[error("store write failed: {0}")]
    StoreWriteFailure(String),
    #[error("batch is empty")]
    EmptyBatch,
    #[error("worker task did not complete: {0}")]
    WorkerInterrupted(String),
}

impl PipelineError {
    pub fn malformed(
        source_id: impl Into<String>,
        source_native_id: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        PipelineError::MalformedInput {
            source_id: source_id.into(),
            source_native_id: source_native_id.into(),
            reason: reason.into(),
        }
    }

    /// Whether an orchestrator may retry the whole batch.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            PipelineError::StoreWriteFailure(_) | PipelineError::WorkerInterrupted(_)
        )
    }
}

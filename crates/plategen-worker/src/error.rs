//! Worker error types.

use thiserror::Error;

use plategen_models::report::{summarize_failures, AssetFailure};

pub type WorkerResult<T> = Result<T, WorkerError>;

/// How many underlying failures an aggregate error renders.
const FAILURE_SAMPLE_LIMIT: usize = 5;

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("Job failed: {0}")]
    JobFailed(String),

    #[error("Processing failed: {0}")]
    ProcessingFailed(String),

    #[error("{} of {total} assets failed: {}", .failures.len(), summarize_failures(.failures, FAILURE_SAMPLE_LIMIT))]
    AggregateFailure {
        total: usize,
        failures: Vec<AssetFailure>,
    },

    #[error("Backend error: {0}")]
    Backend(#[from] plategen_backend::BackendError),

    #[error("Media error: {0}")]
    Media(#[from] plategen_media::MediaError),

    #[error("Queue error: {0}")]
    Queue(#[from] plategen_queue::QueueError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl WorkerError {
    pub fn job_failed(msg: impl Into<String>) -> Self {
        Self::JobFailed(msg.into())
    }

    pub fn processing_failed(msg: impl Into<String>) -> Self {
        Self::ProcessingFailed(msg.into())
    }

    /// Whether this is the partial-failure outcome that a resubmission of
    /// the identical job resolves.
    pub fn is_aggregate(&self) -> bool {
        matches!(self, WorkerError::AggregateFailure { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use plategen_models::Section;

    #[test]
    fn aggregate_display_is_bounded() {
        let failures: Vec<AssetFailure> = (0..9)
            .map(|i| AssetFailure {
                section: Section::Ingredients,
                index: i,
                error: "backend unreachable".into(),
            })
            .collect();

        let err = WorkerError::AggregateFailure { total: 12, failures };
        let text = err.to_string();
        assert!(text.starts_with("9 of 12 assets failed"));
        assert!(text.contains("ingredients[4]"));
        assert!(!text.contains("ingredients[5]"));
        assert!(text.contains("and 4 more"));
    }
}

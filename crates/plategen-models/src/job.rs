//! Job definitions for queue processing.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::recipe::RecipeInput;

/// Unique identifier for a job.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(pub String);

impl JobId {
    /// Generate a new random job ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Create from an existing string.
    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Job state reported through the status store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    /// Job is waiting in queue
    #[default]
    Queued,
    /// Job is being processed
    Running,
    /// Job completed successfully
    Finished,
    /// Job failed (resubmission resumes it)
    Failed,
}

impl JobState {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobState::Queued => "queued",
            JobState::Running => "running",
            JobState::Finished => "finished",
            JobState::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobState::Finished | JobState::Failed)
    }
}

/// Job to generate all assets for one recipe.
///
/// Resubmitting a job with the same recipe id is the documented resume
/// mechanism: the orchestrator skips every asset whose outputs already exist.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerateAssetsJob {
    /// Unique job ID
    pub job_id: JobId,
    /// Full recipe payload
    pub recipe: RecipeInput,
    /// When the job was created
    pub created_at: DateTime<Utc>,
}

impl GenerateAssetsJob {
    pub fn new(recipe: RecipeInput) -> Self {
        Self {
            job_id: JobId::new(),
            recipe,
            created_at: Utc::now(),
        }
    }

    /// Idempotency key for deduplication while a job is queued or running.
    pub fn idempotency_key(&self) -> String {
        format!("assets:{}", self.recipe.id)
    }
}

/// Generic job wrapper for queue storage.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum QueueJob {
    /// Generate every ingredient/step asset for a recipe
    GenerateAssets(GenerateAssetsJob),
}

impl QueueJob {
    pub fn job_id(&self) -> &JobId {
        match self {
            QueueJob::GenerateAssets(j) => &j.job_id,
        }
    }

    pub fn recipe_id(&self) -> i64 {
        match self {
            QueueJob::GenerateAssets(j) => j.recipe.id,
        }
    }

    pub fn idempotency_key(&self) -> String {
        match self {
            QueueJob::GenerateAssets(j) => j.idempotency_key(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn queue_job_serde_roundtrip() {
        let job = GenerateAssetsJob::new(RecipeInput::new(
            11,
            vec!["butter".into()],
            vec!["melt the butter".into()],
        ));

        let wrapper = QueueJob::GenerateAssets(job.clone());
        let json = serde_json::to_string(&wrapper).expect("serialize QueueJob");
        assert!(json.contains("\"type\":\"generate_assets\""));

        let decoded: QueueJob = serde_json::from_str(&json).expect("deserialize QueueJob");
        let QueueJob::GenerateAssets(j) = decoded;
        assert_eq!(j.job_id, job.job_id);
        assert_eq!(j.recipe.id, 11);
        assert_eq!(j.created_at, job.created_at);
    }

    #[test]
    fn idempotency_key_depends_only_on_recipe_id() {
        let a = GenerateAssetsJob::new(RecipeInput::new(5, vec![], vec![]));
        let b = GenerateAssetsJob::new(RecipeInput::new(5, vec!["x".into()], vec![]));
        assert_eq!(a.idempotency_key(), b.idempotency_key());
        assert_ne!(a.job_id, b.job_id);
    }

    #[test]
    fn job_state_terminality() {
        assert!(JobState::Finished.is_terminal());
        assert!(JobState::Failed.is_terminal());
        assert!(!JobState::Running.is_terminal());
        assert!(!JobState::Queued.is_terminal());
    }
}

//! Job status store.
//!
//! One JSON record per job id in Redis, written by the executor and read by
//! the submission gateway's status endpoint.

use chrono::{DateTime, Utc};
use redis::AsyncCommands;
use serde::{Deserialize, Serialize};
use tracing::debug;

use plategen_models::{JobId, JobState, RunReport};

use crate::error::QueueResult;

/// Status record TTL (24 hours), matching the result/failure retention of
/// the original queue.
const STATUS_TTL_SECS: u64 = 86400;

/// Current status of one job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobStatusRecord {
    pub job_id: JobId,
    pub state: JobState,
    /// Result summary, present once finished
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub report: Option<RunReport>,
    /// Error detail, present once failed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl JobStatusRecord {
    fn new(job_id: &JobId, state: JobState) -> Self {
        Self {
            job_id: job_id.clone(),
            state,
            report: None,
            error: None,
            updated_at: Utc::now(),
        }
    }
}

/// Redis-backed status store.
pub struct StatusStore {
    client: redis::Client,
}

impl StatusStore {
    pub fn new(redis_url: &str) -> QueueResult<Self> {
        let client = redis::Client::open(redis_url)?;
        Ok(Self { client })
    }

    /// Create from environment variables.
    pub fn from_env() -> QueueResult<Self> {
        let url =
            std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://localhost:6379".to_string());
        Self::new(&url)
    }

    fn status_key(job_id: &JobId) -> String {
        format!("plategen:status:{}", job_id)
    }

    async fn put(&self, record: &JobStatusRecord) -> QueueResult<()> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let payload = serde_json::to_string(record)?;
        conn.set_ex::<_, _, ()>(Self::status_key(&record.job_id), payload, STATUS_TTL_SECS)
            .await?;
        debug!(job_id = %record.job_id, state = record.state.as_str(), "Status updated");
        Ok(())
    }

    pub async fn set_queued(&self, job_id: &JobId) -> QueueResult<()> {
        self.put(&JobStatusRecord::new(job_id, JobState::Queued))
            .await
    }

    pub async fn set_running(&self, job_id: &JobId) -> QueueResult<()> {
        self.put(&JobStatusRecord::new(job_id, JobState::Running))
            .await
    }

    pub async fn set_finished(&self, job_id: &JobId, report: RunReport) -> QueueResult<()> {
        let mut record = JobStatusRecord::new(job_id, JobState::Finished);
        record.report = Some(report);
        self.put(&record).await
    }

    pub async fn set_failed(&self, job_id: &JobId, error: impl Into<String>) -> QueueResult<()> {
        let mut record = JobStatusRecord::new(job_id, JobState::Failed);
        record.error = Some(error.into());
        self.put(&record).await
    }

    /// Fetch the status record for a job, if still retained.
    pub async fn get(&self, job_id: &JobId) -> QueueResult<Option<JobStatusRecord>> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let payload: Option<String> = conn.get(Self::status_key(job_id)).await?;
        match payload {
            Some(p) => Ok(Some(serde_json::from_str(&p)?)),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_key_is_per_job() {
        let a = JobId::from_string("a");
        let b = JobId::from_string("b");
        assert_ne!(StatusStore::status_key(&a), StatusStore::status_key(&b));
        assert!(StatusStore::status_key(&a).starts_with("plategen:status:"));
    }

    #[test]
    fn record_roundtrip_with_report() {
        let mut record = JobStatusRecord::new(&JobId::from_string("j1"), JobState::Finished);
        record.report = Some(RunReport {
            recipe_id: 4,
            output_dir: "/data/assets/4".into(),
            ingredient_count: 2,
            step_count: 3,
            generated: 5,
            skipped: 0,
        });

        let json = serde_json::to_string(&record).unwrap();
        let decoded: JobStatusRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(decoded.state, JobState::Finished);
        assert_eq!(decoded.report.unwrap().recipe_id, 4);
        assert!(decoded.error.is_none());
    }
}

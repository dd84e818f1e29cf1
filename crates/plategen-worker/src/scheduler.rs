//! Claim-guarded scheduling of pending recipes.
//!
//! Periodically finds not-yet-processed recipe ids in the upstream store and
//! enqueues a generation job for each, claiming every id with an exclusive,
//! time-bounded marker first so that concurrent scheduler passes and
//! in-flight jobs never duplicate work. The recipe store itself is an
//! external collaborator consumed through `RecipeSource`.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{error, info, warn};

use plategen_models::{GenerateAssetsJob, RecipeInput};
use plategen_queue::{Claims, JobQueue, QueueResult};

use crate::error::WorkerResult;

/// Read access to the upstream recipe store.
#[async_trait]
pub trait RecipeSource: Send + Sync {
    /// Recipe ids that have no generated assets yet.
    async fn fetch_pending(&self, limit: usize) -> WorkerResult<Vec<i64>>;

    /// Full payload for one recipe, or None when it vanished.
    async fn fetch_recipe(&self, recipe_id: i64) -> WorkerResult<Option<RecipeInput>>;
}

/// Job submission seam so scheduling is testable without Redis.
#[async_trait]
pub trait JobSubmitter: Send + Sync {
    async fn submit(&self, job: GenerateAssetsJob) -> QueueResult<String>;
}

#[async_trait]
impl JobSubmitter for JobQueue {
    async fn submit(&self, job: GenerateAssetsJob) -> QueueResult<String> {
        self.enqueue_generate(job).await
    }
}

/// Scheduler configuration.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Pause between scheduling passes
    pub interval: Duration,
    /// Recipes fetched per pass
    pub batch_size: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(600),
            batch_size: 10,
        }
    }
}

impl SchedulerConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        Self {
            interval: Duration::from_secs(
                std::env::var("SCHEDULER_INTERVAL_S")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(600),
            ),
            batch_size: std::env::var("SCHEDULER_BATCH_SIZE")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(10),
        }
    }
}

/// Periodic claim-then-enqueue scheduler.
pub struct Scheduler {
    source: Arc<dyn RecipeSource>,
    submitter: Arc<dyn JobSubmitter>,
    claims: Arc<dyn Claims>,
    config: SchedulerConfig,
}

impl Scheduler {
    pub fn new(
        source: Arc<dyn RecipeSource>,
        submitter: Arc<dyn JobSubmitter>,
        claims: Arc<dyn Claims>,
        config: SchedulerConfig,
    ) -> Self {
        Self {
            source,
            submitter,
            claims,
            config,
        }
    }

    /// One scheduling pass. Returns the number of jobs enqueued.
    pub async fn run_once(&self) -> WorkerResult<usize> {
        let ids = self
            .source
            .fetch_pending(self.config.batch_size.max(10))
            .await?;
        let mut queued = 0usize;

        for recipe_id in ids {
            // Already in flight: not an error, skip this pass.
            if !self.claims.try_claim(recipe_id).await? {
                continue;
            }

            let recipe = match self.source.fetch_recipe(recipe_id).await {
                Ok(Some(recipe)) => recipe,
                Ok(None) => {
                    warn!(recipe_id = recipe_id, "Pending recipe vanished, releasing claim");
                    self.claims.clear(recipe_id).await?;
                    continue;
                }
                Err(e) => {
                    self.claims.clear(recipe_id).await?;
                    return Err(e);
                }
            };

            match self.submitter.submit(GenerateAssetsJob::new(recipe)).await {
                Ok(message_id) => {
                    info!(
                        recipe_id = recipe_id,
                        message_id = %message_id,
                        "Enqueued asset generation"
                    );
                    queued += 1;
                }
                Err(e) => {
                    // Claim set but enqueue failed: release so the id is
                    // eligible next pass.
                    warn!(recipe_id = recipe_id, "Enqueue failed, releasing claim: {}", e);
                    self.claims.clear(recipe_id).await?;
                }
            }
        }

        Ok(queued)
    }

    /// Run scheduling passes forever.
    pub async fn run_forever(&self) {
        info!(
            interval_secs = self.config.interval.as_secs(),
            batch = self.config.batch_size,
            "Scheduler started"
        );
        let mut ticker = tokio::time::interval(self.config.interval);
        loop {
            ticker.tick().await;
            match self.run_once().await {
                Ok(queued) => info!(queued = queued, "Scheduling pass complete"),
                Err(e) => error!("Scheduling pass failed: {}", e),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use plategen_queue::{MemoryClaims, QueueError};
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Mutex;

    struct MemorySource {
        pending: Vec<i64>,
        missing: Vec<i64>,
    }

    #[async_trait]
    impl RecipeSource for MemorySource {
        async fn fetch_pending(&self, limit: usize) -> WorkerResult<Vec<i64>> {
            Ok(self.pending.iter().take(limit).copied().collect())
        }

        async fn fetch_recipe(&self, recipe_id: i64) -> WorkerResult<Option<RecipeInput>> {
            if self.missing.contains(&recipe_id) {
                return Ok(None);
            }
            Ok(Some(RecipeInput::new(
                recipe_id,
                vec!["salt".into()],
                vec!["season to taste".into()],
            )))
        }
    }

    #[derive(Default)]
    struct RecordingSubmitter {
        submitted: Mutex<Vec<i64>>,
        fail_next: AtomicBool,
    }

    #[async_trait]
    impl JobSubmitter for RecordingSubmitter {
        async fn submit(&self, job: GenerateAssetsJob) -> QueueResult<String> {
            if self.fail_next.swap(false, Ordering::SeqCst) {
                return Err(QueueError::enqueue_failed("redis down"));
            }
            self.submitted.lock().unwrap().push(job.recipe.id);
            Ok(format!("msg-{}", job.recipe.id))
        }
    }

    fn scheduler(
        source: MemorySource,
        submitter: Arc<RecordingSubmitter>,
        claims: Arc<MemoryClaims>,
    ) -> Scheduler {
        Scheduler::new(
            Arc::new(source),
            submitter,
            claims,
            SchedulerConfig::default(),
        )
    }

    #[tokio::test]
    async fn claimed_recipes_are_skipped_on_later_passes() {
        let submitter = Arc::new(RecordingSubmitter::default());
        let claims = Arc::new(MemoryClaims::new());
        let s = scheduler(
            MemorySource {
                pending: vec![1, 2],
                missing: vec![],
            },
            Arc::clone(&submitter),
            Arc::clone(&claims),
        );

        assert_eq!(s.run_once().await.unwrap(), 2);
        // Same ids still pending upstream, but claims hold.
        assert_eq!(s.run_once().await.unwrap(), 0);
        assert_eq!(*submitter.submitted.lock().unwrap(), vec![1, 2]);

        // Finalizer releases one claim; the next pass re-enqueues it only.
        claims.clear(1).await.unwrap();
        assert_eq!(s.run_once().await.unwrap(), 1);
        assert_eq!(*submitter.submitted.lock().unwrap(), vec![1, 2, 1]);
    }

    #[tokio::test]
    async fn enqueue_failure_releases_the_claim() {
        let submitter = Arc::new(RecordingSubmitter::default());
        submitter.fail_next.store(true, Ordering::SeqCst);
        let claims = Arc::new(MemoryClaims::new());
        let s = scheduler(
            MemorySource {
                pending: vec![7],
                missing: vec![],
            },
            Arc::clone(&submitter),
            Arc::clone(&claims),
        );

        assert_eq!(s.run_once().await.unwrap(), 0);
        assert!(!claims.is_claimed(7), "claim must be released after enqueue failure");

        // Eligible again next pass.
        assert_eq!(s.run_once().await.unwrap(), 1);
        assert_eq!(*submitter.submitted.lock().unwrap(), vec![7]);
    }

    #[tokio::test]
    async fn vanished_recipe_releases_the_claim() {
        let submitter = Arc::new(RecordingSubmitter::default());
        let claims = Arc::new(MemoryClaims::new());
        let s = scheduler(
            MemorySource {
                pending: vec![3],
                missing: vec![3],
            },
            Arc::clone(&submitter),
            Arc::clone(&claims),
        );

        assert_eq!(s.run_once().await.unwrap(), 0);
        assert!(!claims.is_claimed(3));
        assert!(submitter.submitted.lock().unwrap().is_empty());
    }
}

//! Per-recipe claim markers.
//!
//! A claim is an exclusive, time-bounded marker set by the scheduler before
//! a recipe is enqueued and cleared by the job's finalizer. Set-if-absent
//! semantics give best-effort mutual exclusion per recipe id; the TTL bounds
//! staleness when the finalizer never runs.

use std::collections::HashSet;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use redis::AsyncCommands;
use tracing::debug;

use crate::error::QueueResult;

/// Claim store configuration.
#[derive(Debug, Clone)]
pub struct ClaimConfig {
    pub redis_url: String,
    /// Time-to-live of a claim; bounds the duplicate-processing window after
    /// a crash
    pub ttl: Duration,
}

impl Default for ClaimConfig {
    fn default() -> Self {
        Self {
            redis_url: "redis://localhost:6379".to_string(),
            ttl: Duration::from_secs(7200),
        }
    }
}

impl ClaimConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        Self {
            redis_url: std::env::var("REDIS_URL")
                .unwrap_or_else(|_| "redis://localhost:6379".to_string()),
            ttl: Duration::from_secs(
                std::env::var("CLAIM_TTL_S")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(7200),
            ),
        }
    }
}

/// Claim store interface shared by the scheduler and the job finalizer.
#[async_trait]
pub trait Claims: Send + Sync {
    /// Attempt to claim a recipe id. Returns true if this caller now holds
    /// the claim, false if it was already in flight.
    async fn try_claim(&self, recipe_id: i64) -> QueueResult<bool>;

    /// Release the claim for a recipe id.
    async fn clear(&self, recipe_id: i64) -> QueueResult<()>;
}

fn claim_key(recipe_id: i64) -> String {
    format!("plategen:inflight:{}", recipe_id)
}

/// Redis-backed claim store (SET NX EX / DEL).
pub struct RedisClaims {
    client: redis::Client,
    config: ClaimConfig,
}

impl RedisClaims {
    pub fn new(config: ClaimConfig) -> QueueResult<Self> {
        let client = redis::Client::open(config.redis_url.as_str())?;
        Ok(Self { client, config })
    }

    /// Create from environment variables.
    pub fn from_env() -> QueueResult<Self> {
        Self::new(ClaimConfig::from_env())
    }
}

#[async_trait]
impl Claims for RedisClaims {
    async fn try_claim(&self, recipe_id: i64) -> QueueResult<bool> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;

        // SET key 1 NX EX ttl - atomic set-if-absent with expiry
        let result: Option<String> = redis::cmd("SET")
            .arg(claim_key(recipe_id))
            .arg("1")
            .arg("NX")
            .arg("EX")
            .arg(self.config.ttl.as_secs())
            .query_async(&mut conn)
            .await?;

        let claimed = result.is_some();
        debug!(recipe_id = recipe_id, claimed = claimed, "Claim attempt");
        Ok(claimed)
    }

    async fn clear(&self, recipe_id: i64) -> QueueResult<()> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        conn.del::<_, ()>(claim_key(recipe_id)).await?;
        debug!(recipe_id = recipe_id, "Claim cleared");
        Ok(())
    }
}

/// In-process claim store for tests and single-worker deployments.
#[derive(Default)]
pub struct MemoryClaims {
    held: Mutex<HashSet<i64>>,
}

impl MemoryClaims {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a claim is currently held.
    pub fn is_claimed(&self, recipe_id: i64) -> bool {
        self.held.lock().unwrap().contains(&recipe_id)
    }
}

#[async_trait]
impl Claims for MemoryClaims {
    async fn try_claim(&self, recipe_id: i64) -> QueueResult<bool> {
        Ok(self.held.lock().unwrap().insert(recipe_id))
    }

    async fn clear(&self, recipe_id: i64) -> QueueResult<()> {
        self.held.lock().unwrap().remove(&recipe_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn claim_keys_are_per_recipe() {
        assert_eq!(claim_key(42), "plategen:inflight:42");
        assert_ne!(claim_key(1), claim_key(2));
    }

    #[tokio::test]
    async fn exactly_one_concurrent_claim_wins() {
        let claims = Arc::new(MemoryClaims::new());

        let a = {
            let claims = Arc::clone(&claims);
            tokio::spawn(async move { claims.try_claim(7).await.unwrap() })
        };
        let b = {
            let claims = Arc::clone(&claims);
            tokio::spawn(async move { claims.try_claim(7).await.unwrap() })
        };

        let (a, b) = (a.await.unwrap(), b.await.unwrap());
        assert!(a ^ b, "exactly one attempt must win, got {a} and {b}");
    }

    #[tokio::test]
    async fn clear_makes_recipe_claimable_again() {
        let claims = MemoryClaims::new();
        assert!(claims.try_claim(9).await.unwrap());
        assert!(!claims.try_claim(9).await.unwrap());

        claims.clear(9).await.unwrap();
        assert!(claims.try_claim(9).await.unwrap());
    }

    #[tokio::test]
    async fn claims_are_independent_per_recipe() {
        let claims = MemoryClaims::new();
        assert!(claims.try_claim(1).await.unwrap());
        assert!(claims.try_claim(2).await.unwrap());
    }
}

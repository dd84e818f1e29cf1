//! Redis-backed job plumbing.
//!
//! This crate provides:
//! - Job enqueueing and consumption via Redis Streams, with retry/DLQ
//! - The per-recipe claim marker guarding duplicate submission
//! - A job status store for the submission gateway to query

pub mod claim;
pub mod error;
pub mod queue;
pub mod status;

pub use claim::{ClaimConfig, Claims, MemoryClaims, RedisClaims};
pub use error::{QueueError, QueueResult};
pub use queue::{JobQueue, QueueConfig};
pub use status::{JobStatusRecord, StatusStore};

//! Clients for the external generative services.
//!
//! The neural synthesis and planning judgment live in separate services;
//! this crate only speaks their HTTP interfaces. Everything is behind async
//! traits so the worker can run against fakes in tests. Clients are
//! constructed once per worker process and passed by reference into the
//! orchestrator.

pub mod error;
pub mod media;
pub mod planner;

pub use error::{BackendError, BackendResult};
pub use media::{
    seed_for_path, ClipRequest, HttpMediaClient, ImageBackend, ImageRequest, MediaClientConfig,
    VideoBackend,
};
pub use planner::{HttpPlanner, Planner, PlannerConfig};

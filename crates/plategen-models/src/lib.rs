//! Shared data models for the PlateGen asset pipeline.
//!
//! This crate provides Serde-serializable types for:
//! - Recipe inputs and their fingerprints
//! - The durable per-recipe manifest and asset states
//! - Media plans (ingredient prompts, step shots)
//! - Queue jobs and run reports

pub mod fingerprint;
pub mod job;
pub mod manifest;
pub mod plan;
pub mod recipe;
pub mod report;

// Re-export common types
pub use fingerprint::inputs_fingerprint;
pub use job::{GenerateAssetsJob, JobId, JobState, QueueJob};
pub use manifest::{AssetKind, AssetState, AssetStatus, Manifest, Section};
pub use plan::{MediaPlan, MediaType, PlannedIngredient, PlannedStep, Shot};
pub use recipe::RecipeInput;
pub use report::{AssetFailure, RunReport};

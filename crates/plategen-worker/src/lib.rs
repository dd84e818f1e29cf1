//! Asset generation worker.
//!
//! Consumes recipe jobs from the queue and drives generation of every
//! ingredient/step asset through the external backends, checkpointing a
//! durable manifest after each asset so crashed or partially failed runs
//! resume without redoing expensive work.

pub mod config;
pub mod error;
pub mod executor;
pub mod logging;
pub mod manifest;
pub mod processor;
pub mod scheduler;
pub mod video;

pub use config::{ImageSettings, VideoSettings, WorkerConfig};
pub use error::{WorkerError, WorkerResult};
pub use executor::JobExecutor;
pub use logging::JobLogger;
pub use manifest::{ManifestStore, RecipeDirs};
pub use processor::{process_generate_assets, ProcessingContext};
pub use scheduler::{JobSubmitter, RecipeSource, Scheduler, SchedulerConfig};
pub use video::{SegmentedVideoGenerator, StepVideoGenerator, StepVideoSpec};

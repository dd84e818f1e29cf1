//! Worker configuration.

use std::path::PathBuf;
use std::time::Duration;

/// Image generation settings forwarded to the backend.
#[derive(Debug, Clone)]
pub struct ImageSettings {
    pub width: u32,
    pub height: u32,
    pub inference_steps: u32,
    pub guidance: f64,
}

impl Default for ImageSettings {
    fn default() -> Self {
        Self {
            width: 1024,
            height: 1024,
            inference_steps: 30,
            guidance: 6.5,
        }
    }
}

/// Video generation and assembly settings.
#[derive(Debug, Clone)]
pub struct VideoSettings {
    pub fps: u32,
    /// Base generation resolution; rounded down to multiples of 16
    pub base_width: u32,
    pub base_height: u32,
    /// Maximum seconds per generation call
    pub segment_seconds: u32,
    /// Target duration when the plan gives none
    pub target_seconds_default: u32,
    /// Scale the final encode to 1080p
    pub upscale_to_1080p: bool,
    pub inference_steps: u32,
    pub guidance: f64,
}

impl Default for VideoSettings {
    fn default() -> Self {
        Self {
            fps: 24,
            base_width: 1216,
            base_height: 704,
            segment_seconds: 6,
            target_seconds_default: 12,
            upscale_to_1080p: true,
            inference_steps: 40,
            guidance: 5.0,
        }
    }
}

/// Worker configuration.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Maximum concurrent jobs
    pub max_concurrent_jobs: usize,
    /// Job timeout
    pub job_timeout: Duration,
    /// Graceful shutdown timeout
    pub shutdown_timeout: Duration,
    /// Root directory for per-recipe asset trees
    pub assets_base_dir: PathBuf,
    /// Keep per-step scratch directories after assembly
    pub keep_intermediate: bool,
    pub image: ImageSettings,
    pub video: VideoSettings,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            max_concurrent_jobs: 1,
            job_timeout: Duration::from_secs(21600), // 6 hours
            shutdown_timeout: Duration::from_secs(30),
            assets_base_dir: PathBuf::from("/data/assets"),
            keep_intermediate: false,
            image: ImageSettings::default(),
            video: VideoSettings::default(),
        }
    }
}

fn env_parse<T: std::str::FromStr>(name: &str, default: T) -> T {
    std::env::var(name)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

fn env_bool(name: &str, default: bool) -> bool {
    std::env::var(name)
        .map(|v| v.to_lowercase() == "true")
        .unwrap_or(default)
}

impl WorkerConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            max_concurrent_jobs: env_parse("WORKER_MAX_JOBS", defaults.max_concurrent_jobs),
            job_timeout: Duration::from_secs(env_parse("WORKER_JOB_TIMEOUT", 21600u64)),
            shutdown_timeout: Duration::from_secs(env_parse("WORKER_SHUTDOWN_TIMEOUT", 30u64)),
            assets_base_dir: std::env::var("ASSETS_BASE_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.assets_base_dir),
            keep_intermediate: env_bool("KEEP_INTERMEDIATE", false),
            image: ImageSettings {
                width: env_parse("IMAGE_WIDTH", 1024),
                height: env_parse("IMAGE_HEIGHT", 1024),
                inference_steps: env_parse("IMAGE_STEPS", 30),
                guidance: env_parse("IMAGE_GUIDANCE", 6.5),
            },
            video: VideoSettings {
                fps: env_parse("VIDEO_FPS", 24),
                base_width: env_parse("VIDEO_BASE_WIDTH", 1216),
                base_height: env_parse("VIDEO_BASE_HEIGHT", 704),
                segment_seconds: env_parse("VIDEO_SEGMENT_SECONDS", 6),
                target_seconds_default: env_parse("VIDEO_TARGET_SECONDS_DEFAULT", 12),
                upscale_to_1080p: env_bool("VIDEO_UPSCALE_TO_1080P", true),
                inference_steps: env_parse("VIDEO_INFERENCE_STEPS", 40),
                guidance: env_parse("VIDEO_GUIDANCE", 5.0),
            },
        }
    }
}

//! Step video generation and assembly.
//!
//! A step's target duration is decomposed into bounded generation segments
//! (the backend is unreliable beyond a few seconds per call); each segment is
//! generated into a raw clip, the clips are concatenated losslessly, and the
//! result is final-encoded exactly once. The first successfully produced
//! clip also yields the step's cover image.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{info, warn};

use plategen_backend::{seed_for_path, ClipRequest, VideoBackend};
use plategen_media::{
    assemble, frames_for_seconds, plan_segments, round_down_multiple, PlannedSegment,
};
use plategen_models::Shot;

use crate::config::VideoSettings;
use crate::error::{WorkerError, WorkerResult};

/// Reduced resolution for the one retry after a failed segment.
const FALLBACK_WIDTH: u32 = 704;
const FALLBACK_HEIGHT: u32 = 480;

/// Everything needed to produce one step's video and cover.
#[derive(Debug, Clone)]
pub struct StepVideoSpec {
    pub recipe_id: i64,
    pub step_index: u32,
    pub shots: Vec<Shot>,
    pub negative_prompt: String,
    pub target_seconds: u32,
    pub video_out: PathBuf,
    pub cover_out: PathBuf,
}

/// Step video capability consumed by the orchestrator.
#[async_trait]
pub trait StepVideoGenerator: Send + Sync {
    /// Produce the step's encoded video and cover image.
    async fn generate(&self, spec: &StepVideoSpec) -> WorkerResult<()>;

    /// Recover a missing cover from an already-produced video.
    async fn recover_cover(&self, video: &Path, cover: &Path) -> WorkerResult<()> {
        assemble::extract_first_frame(video, cover).await?;
        Ok(())
    }
}

/// Production generator: segments through the video backend, assembles with
/// FFmpeg.
pub struct SegmentedVideoGenerator {
    backend: Arc<dyn VideoBackend>,
    settings: VideoSettings,
    keep_intermediate: bool,
}

impl SegmentedVideoGenerator {
    pub fn new(
        backend: Arc<dyn VideoBackend>,
        settings: VideoSettings,
        keep_intermediate: bool,
    ) -> Self {
        Self {
            backend,
            settings,
            keep_intermediate,
        }
    }

    fn clip_request(&self, segment: &PlannedSegment, spec: &StepVideoSpec, out: &Path) -> ClipRequest {
        ClipRequest {
            prompt: segment.prompt.clone(),
            negative_prompt: spec.negative_prompt.clone(),
            width: round_down_multiple(self.settings.base_width, 16),
            height: round_down_multiple(self.settings.base_height, 16),
            num_frames: frames_for_seconds(segment.seconds, self.settings.fps),
            fps: self.settings.fps,
            num_inference_steps: self.settings.inference_steps,
            guidance_scale: self.settings.guidance,
            seed: seed_for_path(out),
        }
    }

    /// Generate one segment, retrying once at reduced resolution.
    async fn generate_segment(
        &self,
        segment: &PlannedSegment,
        spec: &StepVideoSpec,
        work_dir: &Path,
    ) -> WorkerResult<PathBuf> {
        let raw = work_dir.join(format!(
            "shot{}_seg{}_raw.mp4",
            segment.shot_index, segment.segment_index
        ));
        let request = self.clip_request(segment, spec, &raw);

        match self.backend.generate_clip(&request, &raw).await {
            Ok(()) => Ok(raw),
            Err(e) => {
                warn!(
                    step_index = spec.step_index,
                    shot = segment.shot_index,
                    segment = segment.segment_index,
                    "Segment generation failed at base resolution, retrying reduced: {}",
                    e
                );

                let fallback = work_dir.join(format!(
                    "shot{}_seg{}_raw_fallback.mp4",
                    segment.shot_index, segment.segment_index
                ));
                let request = ClipRequest {
                    width: FALLBACK_WIDTH,
                    height: FALLBACK_HEIGHT,
                    seed: seed_for_path(&fallback),
                    ..self.clip_request(segment, spec, &fallback)
                };
                self.backend
                    .generate_clip(&request, &fallback)
                    .await
                    .map_err(|e| {
                        WorkerError::processing_failed(format!(
                            "segment shot{} seg{} failed after reduced-resolution retry: {}",
                            segment.shot_index, segment.segment_index, e
                        ))
                    })?;
                Ok(fallback)
            }
        }
    }
}

#[async_trait]
impl StepVideoGenerator for SegmentedVideoGenerator {
    async fn generate(&self, spec: &StepVideoSpec) -> WorkerResult<()> {
        let work_dir = tempfile::Builder::new()
            .prefix(&format!(
                "recipe_{}_step_{}_",
                spec.recipe_id, spec.step_index
            ))
            .tempdir()?;
        let work = work_dir.path();

        let plan = plan_segments(
            &spec.shots,
            spec.target_seconds,
            self.settings.segment_seconds,
        );
        info!(
            recipe_id = spec.recipe_id,
            step_index = spec.step_index,
            segments = plan.len(),
            target_seconds = spec.target_seconds,
            "Generating step video"
        );

        let mut raw_parts: Vec<PathBuf> = Vec::with_capacity(plan.len());
        let mut cover_saved = false;

        for segment in &plan {
            let raw = self.generate_segment(segment, spec, work).await?;

            if !cover_saved {
                match assemble::extract_first_frame(&raw, &spec.cover_out).await {
                    Ok(()) => cover_saved = true,
                    Err(e) => warn!(
                        step_index = spec.step_index,
                        "Cover extraction from raw clip failed, will retry on a later clip: {}",
                        e
                    ),
                }
            }

            raw_parts.push(raw);
        }

        // Concatenate parts (no re-encoding yet), then encode exactly once.
        let concat_input = assemble::concat_copy(&raw_parts, work).await?;
        let encoded = work.join("final.mp4");
        assemble::final_encode(&concat_input, &encoded, self.settings.upscale_to_1080p).await?;
        plategen_media::move_file(&encoded, &spec.video_out).await?;

        if !cover_saved {
            self.recover_cover(&spec.video_out, &spec.cover_out).await?;
        }

        if self.keep_intermediate {
            let kept = work_dir.keep();
            info!(
                recipe_id = spec.recipe_id,
                step_index = spec.step_index,
                "Keeping intermediate files in {}",
                kept.display()
            );
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use plategen_backend::{BackendError, BackendResult};
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FailingBackend {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl VideoBackend for FailingBackend {
        async fn generate_clip(&self, _request: &ClipRequest, _out: &Path) -> BackendResult<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(BackendError::service(503, "overloaded"))
        }
    }

    fn spec(dir: &Path) -> StepVideoSpec {
        StepVideoSpec {
            recipe_id: 1,
            step_index: 0,
            shots: vec![Shot {
                duration_secs: 4,
                prompt: "stir the sauce".into(),
            }],
            negative_prompt: "text".into(),
            target_seconds: 4,
            video_out: dir.join("0.mp4"),
            cover_out: dir.join("0.png"),
        }
    }

    #[tokio::test]
    async fn segment_failure_retries_once_then_fails_step() {
        let backend = Arc::new(FailingBackend {
            calls: AtomicUsize::new(0),
        });
        let generator = SegmentedVideoGenerator::new(
            Arc::clone(&backend) as Arc<dyn VideoBackend>,
            VideoSettings::default(),
            false,
        );

        let dir = tempfile::tempdir().unwrap();
        let err = generator.generate(&spec(dir.path())).await.unwrap_err();

        // base attempt + one reduced-resolution retry, nothing more
        assert_eq!(backend.calls.load(Ordering::SeqCst), 2);
        assert!(err.to_string().contains("reduced-resolution retry"));
        assert!(!dir.path().join("0.mp4").exists());
    }

    #[tokio::test]
    async fn clip_requests_use_rounded_dimensions_and_frame_shape() {
        let backend = Arc::new(FailingBackend {
            calls: AtomicUsize::new(0),
        });
        let settings = VideoSettings {
            base_width: 1218,
            base_height: 710,
            ..VideoSettings::default()
        };
        let generator =
            SegmentedVideoGenerator::new(backend as Arc<dyn VideoBackend>, settings, false);

        let dir = tempfile::tempdir().unwrap();
        let spec = spec(dir.path());
        let segment = PlannedSegment {
            shot_index: 0,
            segment_index: 0,
            seconds: 5,
            prompt: "stir".into(),
        };

        let request = generator.clip_request(&segment, &spec, &dir.path().join("raw.mp4"));
        assert_eq!(request.width, 1216);
        assert_eq!(request.height, 704);
        assert_eq!(request.num_frames, 121);
        assert_eq!(request.num_frames % 8, 1);
    }
}

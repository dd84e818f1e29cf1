//! Asset orchestration.
//!
//! Drives generation of every ingredient/step asset for one recipe in a
//! fixed order, consulting the manifest and the filesystem before each
//! backend call and checkpointing the manifest after every asset. One
//! asset's failure never aborts the batch; failures are aggregated and the
//! run is reported failed at the end, with resubmission of the identical job
//! as the retry mechanism.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use metrics::counter;
use tracing::{info, warn};

use plategen_backend::{seed_for_path, ImageBackend, ImageRequest, Planner, VideoBackend};
use plategen_models::{
    AssetFailure, AssetKind, GenerateAssetsJob, Manifest, MediaPlan, MediaType, RunReport, Section,
};

use crate::config::WorkerConfig;
use crate::error::{WorkerError, WorkerResult};
use crate::logging::JobLogger;
use crate::manifest::{ManifestStore, RecipeDirs};
use crate::video::{SegmentedVideoGenerator, StepVideoGenerator, StepVideoSpec};

/// Shared context for job processing, constructed once per worker process.
pub struct ProcessingContext {
    pub config: WorkerConfig,
    pub manifests: ManifestStore,
    pub image_backend: Arc<dyn ImageBackend>,
    pub planner: Arc<dyn Planner>,
    pub video_generator: Arc<dyn StepVideoGenerator>,
}

impl ProcessingContext {
    /// Standard context wiring the segmented FFmpeg-backed video generator.
    pub fn new(
        config: WorkerConfig,
        image_backend: Arc<dyn ImageBackend>,
        video_backend: Arc<dyn VideoBackend>,
        planner: Arc<dyn Planner>,
    ) -> Self {
        let manifests = ManifestStore::new(config.assets_base_dir.clone());
        let video_generator = Arc::new(SegmentedVideoGenerator::new(
            video_backend,
            config.video.clone(),
            config.keep_intermediate,
        ));
        Self {
            config,
            manifests,
            image_backend,
            planner,
            video_generator,
        }
    }

    /// Context with explicit parts; used by tests to substitute capabilities.
    pub fn with_parts(
        config: WorkerConfig,
        image_backend: Arc<dyn ImageBackend>,
        planner: Arc<dyn Planner>,
        video_generator: Arc<dyn StepVideoGenerator>,
    ) -> Self {
        let manifests = ManifestStore::new(config.assets_base_dir.clone());
        Self {
            config,
            manifests,
            image_backend,
            planner,
            video_generator,
        }
    }
}

/// True when the expected output already exists with content.
fn file_nonempty(path: &Path) -> bool {
    std::fs::metadata(path).map(|m| m.len() > 0).unwrap_or(false)
}

/// Process one asset-generation job to completion or partial failure.
pub async fn process_generate_assets(
    ctx: &ProcessingContext,
    job: &GenerateAssetsJob,
) -> WorkerResult<RunReport> {
    let recipe = &job.recipe;
    let logger = JobLogger::new(&job.job_id, "generate_assets");
    logger.log_start(&format!(
        "recipe {} ({} ingredients, {} steps)",
        recipe.id,
        recipe.ingredients.len(),
        recipe.steps.len()
    ));

    // Resolve the manifest first: an inputs change purges the asset
    // directories, which ensure_dirs then recreates.
    let mut manifest = ctx.manifests.load_or_create(recipe).await?;
    let dirs = ctx.manifests.ensure_dirs(recipe.id).await?;
    ctx.manifests.save(&manifest).await?;

    let plan = resolve_plan(ctx, recipe, &mut manifest).await?;

    let mut failures: Vec<AssetFailure> = Vec::new();
    let mut generated = 0usize;
    let mut skipped = 0usize;

    // Ingredients by index, then steps by index; individual failures never
    // abort the batch.
    for (i, item) in plan.ingredients.iter().enumerate() {
        let index = i as u32;
        let rel = format!("ingredients/{}.png", index);
        let abs = dirs.ingredients.join(format!("{}.png", index));

        let state = manifest.asset_mut(Section::Ingredients, index, AssetKind::Image);
        state.prompt = item.prompt.clone();
        state.negative_prompt = item.negative_prompt.clone();
        state.text = recipe.ingredients.get(i).cloned().unwrap_or_default();

        let outcome = ensure_image(ctx, &item.prompt, &item.negative_prompt, &abs).await;
        record_outcome(
            ctx,
            &mut manifest,
            Section::Ingredients,
            index,
            vec![rel],
            outcome,
            &mut generated,
            &mut skipped,
            &mut failures,
        )
        .await?;
    }

    for (i, step) in plan.steps.iter().enumerate() {
        let index = i as u32;
        let kind = match step.media_type {
            MediaType::Image => AssetKind::Image,
            MediaType::Video => AssetKind::Video,
        };
        let target_seconds = if step.target_seconds > 0 {
            step.target_seconds
        } else {
            ctx.config.video.target_seconds_default
        };

        let state = manifest.asset_mut(Section::Steps, index, kind);
        state.prompt = step.prompt.clone();
        state.negative_prompt = step.negative_prompt.clone();
        state.text = recipe.steps.get(i).cloned().unwrap_or_default();
        if step.media_type == MediaType::Video {
            state.target_seconds = Some(target_seconds);
            state.shots = Some(step.shots.clone());
        }

        match step.media_type {
            MediaType::Image => {
                let rel = format!("steps/{}.png", index);
                let abs = dirs.steps.join(format!("{}.png", index));
                let outcome = ensure_image(ctx, &step.prompt, &step.negative_prompt, &abs).await;
                record_outcome(
                    ctx,
                    &mut manifest,
                    Section::Steps,
                    index,
                    vec![rel],
                    outcome,
                    &mut generated,
                    &mut skipped,
                    &mut failures,
                )
                .await?;
            }
            MediaType::Video => {
                let outcome = ensure_step_video(
                    ctx,
                    recipe.id,
                    index,
                    step.shots.clone(),
                    &step.negative_prompt,
                    target_seconds,
                    &dirs,
                )
                .await;
                let mut files = vec![format!("steps/{}.mp4", index)];
                if file_nonempty(&dirs.steps.join(format!("{}.png", index))) {
                    files.push(format!("steps/{}.png", index));
                }
                record_outcome(
                    ctx,
                    &mut manifest,
                    Section::Steps,
                    index,
                    files,
                    outcome,
                    &mut generated,
                    &mut skipped,
                    &mut failures,
                )
                .await?;
            }
        }
    }

    let report = RunReport {
        recipe_id: recipe.id,
        output_dir: dirs.root.display().to_string(),
        ingredient_count: plan.ingredients.len(),
        step_count: plan.steps.len(),
        generated,
        skipped,
    };

    if failures.is_empty() {
        logger.log_completion(&format!(
            "{} generated, {} reused from disk",
            generated, skipped
        ));
        Ok(report)
    } else {
        logger.log_error(&format!(
            "{} of {} assets failed",
            failures.len(),
            plan.asset_count()
        ));
        Err(WorkerError::AggregateFailure {
            total: plan.asset_count(),
            failures,
        })
    }
}

/// Return the cached plan when the fingerprint still matches, otherwise
/// consult the planner and checkpoint the result.
async fn resolve_plan(
    ctx: &ProcessingContext,
    recipe: &plategen_models::RecipeInput,
    manifest: &mut Manifest,
) -> WorkerResult<MediaPlan> {
    let rewritten = match &manifest.rewritten_steps {
        Some(cached) => cached.clone(),
        None => {
            let rewritten = ctx
                .planner
                .rewrite_steps(&recipe.ingredients, &recipe.steps)
                .await?;
            manifest.rewritten_steps = Some(rewritten.clone());
            manifest.touch();
            ctx.manifests.save(manifest).await?;
            rewritten
        }
    };

    match &manifest.plan {
        Some(cached) => Ok(cached.clone()),
        None => {
            let plan = ctx.planner.plan_media(recipe, &rewritten).await?;
            manifest.plan = Some(plan.clone());
            manifest.touch();
            ctx.manifests.save(manifest).await?;
            Ok(plan)
        }
    }
}

enum AssetOutcome {
    /// Existing non-empty output satisfied the asset
    Reused,
    /// Backend produced the output in this run
    Generated,
    /// Backend or encode call failed
    Failed(String),
}

/// Produce one image asset unless its output already exists.
async fn ensure_image(
    ctx: &ProcessingContext,
    prompt: &str,
    negative_prompt: &str,
    out: &Path,
) -> AssetOutcome {
    if file_nonempty(out) {
        return AssetOutcome::Reused;
    }

    let request = ImageRequest {
        prompt: prompt.to_string(),
        negative_prompt: negative_prompt.to_string(),
        width: ctx.config.image.width,
        height: ctx.config.image.height,
        num_inference_steps: ctx.config.image.inference_steps,
        guidance_scale: ctx.config.image.guidance,
        seed: seed_for_path(out),
    };

    match ctx.image_backend.generate_png(&request, out).await {
        Ok(()) if file_nonempty(out) => AssetOutcome::Generated,
        Ok(()) => AssetOutcome::Failed("backend reported success but wrote no file".to_string()),
        Err(e) => AssetOutcome::Failed(e.to_string()),
    }
}

/// Produce one step video (and its cover) unless outputs already exist.
///
/// A present video with a missing cover recovers the cover by first-frame
/// extraction instead of regenerating the video.
async fn ensure_step_video(
    ctx: &ProcessingContext,
    recipe_id: i64,
    step_index: u32,
    shots: Vec<plategen_models::Shot>,
    negative_prompt: &str,
    target_seconds: u32,
    dirs: &RecipeDirs,
) -> AssetOutcome {
    let video_out = dirs.steps.join(format!("{}.mp4", step_index));
    let cover_out = dirs.steps.join(format!("{}.png", step_index));

    if file_nonempty(&video_out) {
        if !file_nonempty(&cover_out) {
            if let Err(e) = ctx
                .video_generator
                .recover_cover(&video_out, &cover_out)
                .await
            {
                return AssetOutcome::Failed(format!("cover recovery failed: {}", e));
            }
            info!(
                recipe_id = recipe_id,
                step_index = step_index,
                "Recovered missing cover from existing video"
            );
        }
        return AssetOutcome::Reused;
    }

    let spec = StepVideoSpec {
        recipe_id,
        step_index,
        shots,
        negative_prompt: negative_prompt.to_string(),
        target_seconds,
        video_out: video_out.clone(),
        cover_out,
    };

    match ctx.video_generator.generate(&spec).await {
        Ok(()) if file_nonempty(&video_out) => AssetOutcome::Generated,
        Ok(()) => AssetOutcome::Failed("assembly reported success but wrote no file".to_string()),
        Err(e) => AssetOutcome::Failed(e.to_string()),
    }
}

/// Apply an asset outcome to the manifest and checkpoint immediately.
#[allow(clippy::too_many_arguments)]
async fn record_outcome(
    ctx: &ProcessingContext,
    manifest: &mut Manifest,
    section: Section,
    index: u32,
    files: Vec<String>,
    outcome: AssetOutcome,
    generated: &mut usize,
    skipped: &mut usize,
    failures: &mut Vec<AssetFailure>,
) -> WorkerResult<()> {
    let kind = manifest
        .asset(section, index)
        .map(|a| a.kind)
        .unwrap_or(AssetKind::Image);
    let state = manifest.asset_mut(section, index, kind);

    match outcome {
        AssetOutcome::Reused => {
            state.mark_done(files);
            *skipped += 1;
            counter!("plategen_assets_reused_total").increment(1);
        }
        AssetOutcome::Generated => {
            state.mark_done(files);
            *generated += 1;
            counter!("plategen_assets_generated_total").increment(1);
        }
        AssetOutcome::Failed(error) => {
            warn!(
                section = %section,
                index = index,
                "Asset failed, continuing with remaining assets: {}",
                error
            );
            state.mark_failed(error.clone());
            failures.push(AssetFailure {
                section,
                index,
                error,
            });
            counter!("plategen_assets_failed_total").increment(1);
        }
    }

    manifest.touch();
    ctx.manifests.save(manifest).await
}

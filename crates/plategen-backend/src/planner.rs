//! Planning capability: step rewriting and media planning.
//!
//! The judgment of what to generate lives in an LLM service consumed as an
//! opaque text-generation endpoint. The client sanitizes whatever comes back
//! and falls back to a deterministic local plan when the service is
//! unconfigured or misbehaves, so the pipeline never stalls on planning.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, warn};

use plategen_models::{MediaPlan, MediaType, PlannedIngredient, PlannedStep, RecipeInput, Shot};

use crate::error::{BackendError, BackendResult};

/// Default negative prompt for all assets.
pub const NEGATIVE_DEFAULT: &str =
    "text, logo, watermark, blurry, deformed, low quality, extra fingers";

/// Style prefix for still photography prompts.
pub const STYLE_FOOD_PHOTO: &str =
    "Professional food photography, soft natural light, shallow depth of field, minimal clutter";

/// Style prefix for video shot prompts.
pub const STYLE_COOKING_VIDEO: &str =
    "Cinematic cooking footage, steady camera, bright kitchen, instructional framing";

const REWRITE_SYSTEM: &str = "You rewrite recipe steps to be clearer for cooking storyboards.\n\
Rules:\n\
- Keep meaning identical, do not add new ingredients or tools.\n\
- Convert to short, action-first instructions in present tense.\n\
- If the step contains multiple actions, keep it as one sentence (do NOT split into new steps).\n\
- Avoid vague references like 'do this' - be explicit.\n\
Return STRICT JSON only: {\"rewritten_steps\": [{\"i\": int, \"text\": str}, ...]}";

const PLAN_SYSTEM: &str = "You are a media planner for recipe assets.\n\
You must output STRICT JSON only.\n\
\n\
Goals:\n\
- Ingredient assets: one studio-quality photo each.\n\
- Step assets: use \"video\" for active actions, \"image\" for passive/waiting/serving.\n\
- For every \"video\" step, create 1-3 storyboard shots.\n\
- Prompts must be professional, well-lit, minimal clutter, no text/logos/watermarks.\n\
- Videos must be silent, instructional framing.\n\
Return strict JSON schema:\n\
{\"ingredients\": [{\"prompt\": str, \"negative_prompt\": str}],\n\
 \"steps\": [{\"media_type\": \"image\"|\"video\", \"prompt\": str, \"negative_prompt\": str,\n\
            \"target_seconds\": int, \"shots\": [{\"duration_s\": int, \"prompt\": str}]}]}";

/// Planning capability consumed by the orchestrator.
#[async_trait]
pub trait Planner: Send + Sync {
    /// Rewrite steps into storyboard-friendly text, index-aligned with the
    /// input.
    async fn rewrite_steps(
        &self,
        ingredients: &[String],
        steps: &[String],
    ) -> BackendResult<Vec<String>>;

    /// Produce the media plan for a recipe from its rewritten steps.
    async fn plan_media(
        &self,
        recipe: &RecipeInput,
        rewritten_steps: &[String],
    ) -> BackendResult<MediaPlan>;
}

/// Planner client configuration.
#[derive(Debug, Clone)]
pub struct PlannerConfig {
    /// Base URL of the text-generation service; empty enables fallback-only
    /// planning
    pub base_url: String,
    pub model: String,
    pub temperature: f64,
    pub max_tokens: u32,
    /// Steps per rewrite request
    pub batch_steps: usize,
    /// Default video duration when the plan gives none
    pub default_target_secs: u32,
    pub max_shots_per_step: usize,
    pub request_timeout: Duration,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            model: "phi4-mini:3.8b".to_string(),
            temperature: 0.2,
            max_tokens: 2048,
            batch_steps: 20,
            default_target_secs: 12,
            max_shots_per_step: 3,
            request_timeout: Duration::from_secs(240),
        }
    }
}

impl PlannerConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            base_url: std::env::var("OLLAMA_URL").unwrap_or_default(),
            model: std::env::var("LLM_MODEL").unwrap_or(defaults.model),
            temperature: std::env::var("LLM_TEMPERATURE")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.temperature),
            max_tokens: std::env::var("LLM_MAX_TOKENS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.max_tokens),
            batch_steps: std::env::var("LLM_BATCH_STEPS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.batch_steps),
            default_target_secs: std::env::var("VIDEO_TARGET_SECONDS_DEFAULT")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.default_target_secs),
            max_shots_per_step: std::env::var("VIDEO_MAX_SHOTS_PER_STEP")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.max_shots_per_step),
            request_timeout: defaults.request_timeout,
        }
    }
}

/// HTTP planner speaking the Ollama generate API.
#[derive(Clone)]
pub struct HttpPlanner {
    http: reqwest::Client,
    config: PlannerConfig,
}

#[derive(Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    response: String,
}

#[derive(Deserialize, Default)]
struct RawRewrite {
    #[serde(default)]
    rewritten_steps: Vec<RawRewrittenStep>,
}

#[derive(Deserialize)]
struct RawRewrittenStep {
    i: Option<i64>,
    text: Option<String>,
}

#[derive(Deserialize, Default)]
struct RawPlan {
    #[serde(default)]
    ingredients: Vec<RawIngredient>,
    #[serde(default)]
    steps: Vec<RawStep>,
}

#[derive(Deserialize, Default)]
struct RawIngredient {
    prompt: Option<String>,
    negative_prompt: Option<String>,
}

#[derive(Deserialize, Default)]
struct RawStep {
    media_type: Option<String>,
    prompt: Option<String>,
    negative_prompt: Option<String>,
    target_seconds: Option<i64>,
    shots: Option<Vec<RawShot>>,
}

#[derive(Deserialize)]
struct RawShot {
    duration_s: Option<i64>,
    prompt: Option<String>,
}

impl HttpPlanner {
    pub fn new(config: PlannerConfig) -> BackendResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()?;
        Ok(Self { http, config })
    }

    /// Create from environment variables.
    pub fn from_env() -> BackendResult<Self> {
        Self::new(PlannerConfig::from_env())
    }

    fn is_configured(&self) -> bool {
        !self.config.base_url.trim().is_empty()
    }

    async fn generate(&self, system: &str, prompt: &str) -> BackendResult<String> {
        let base = self.config.base_url.trim_end_matches('/');
        let payload = serde_json::json!({
            "model": self.config.model,
            "system": system,
            "prompt": prompt,
            "stream": false,
            "options": {
                "temperature": self.config.temperature,
                "num_predict": self.config.max_tokens,
            },
        });

        let response = self
            .http
            .post(format!("{}/api/generate", base))
            .json(&payload)
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(BackendError::service(
                status.as_u16(),
                message.chars().take(200).collect::<String>(),
            ));
        }

        let body: GenerateResponse = response.json().await?;
        Ok(body.response.trim().to_string())
    }
}

#[async_trait]
impl Planner for HttpPlanner {
    async fn rewrite_steps(
        &self,
        ingredients: &[String],
        steps: &[String],
    ) -> BackendResult<Vec<String>> {
        if steps.is_empty() {
            return Ok(Vec::new());
        }
        if !self.is_configured() {
            return Ok(steps.to_vec());
        }

        let batch = self.config.batch_steps.max(1);
        let mut out: Vec<Option<String>> = vec![None; steps.len()];

        for (chunk_index, chunk) in steps.chunks(batch).enumerate() {
            let idx0 = chunk_index * batch;
            let indexed: Vec<Value> = chunk
                .iter()
                .enumerate()
                .map(|(j, s)| serde_json::json!({"i": idx0 + j, "text": s}))
                .collect();

            let prompt = format!(
                "Ingredients (context only):\n{}\n\nRewrite the following steps:\n\n{}\n\nReturn strict JSON only.",
                serde_json::to_string(ingredients)?,
                serde_json::to_string(&indexed)?,
            );

            let parsed = match self.generate(REWRITE_SYSTEM, &prompt).await {
                Ok(text) => extract_json_object(&text)
                    .and_then(|v| serde_json::from_value::<RawRewrite>(v).ok()),
                Err(e) => {
                    warn!("Step rewrite chunk {} failed: {}", chunk_index, e);
                    None
                }
            };

            // On failure, keep originals for this chunk
            let Some(parsed) = parsed else { continue };
            for item in parsed.rewritten_steps {
                let (Some(i), Some(text)) = (item.i, item.text) else {
                    continue;
                };
                let text = text.trim();
                if i >= 0 && (i as usize) < out.len() && !text.is_empty() {
                    out[i as usize] = Some(text.to_string());
                }
            }
        }

        // Fill gaps with original text
        Ok(out
            .into_iter()
            .enumerate()
            .map(|(i, t)| t.unwrap_or_else(|| steps[i].clone()))
            .collect())
    }

    async fn plan_media(
        &self,
        recipe: &RecipeInput,
        rewritten_steps: &[String],
    ) -> BackendResult<MediaPlan> {
        if !self.is_configured() {
            debug!("Planner not configured, using fallback plan");
            return Ok(fallback_plan(
                &recipe.ingredients,
                rewritten_steps,
                self.config.default_target_secs,
            ));
        }

        let prompt = format!(
            "Recipe id: {}\n\nIngredients:\n{:?}\n\nOriginal steps:\n{:?}\n\n\
             Rewritten steps (use these for storyboarding):\n{:?}\n\n\
             Constraints:\n\
             - Ingredient prompts should NOT include quantities; focus on the ingredient itself.\n\
             - Use: {}\n\
             - Use for video shots: {}\n\
             - No audio.\n\n\
             For each step:\n\
             - Decide media_type image vs video.\n\
             - If video: provide 1..{} shots and per-shot duration_s.\n\
             - Keep prompts concise but specific (camera angle, lighting, key objects).\n\n\
             Return strict JSON only.",
            recipe.id,
            recipe.ingredients,
            recipe.steps,
            rewritten_steps,
            STYLE_FOOD_PHOTO,
            STYLE_COOKING_VIDEO,
            self.config.max_shots_per_step,
        );

        let raw = match self.generate(PLAN_SYSTEM, &prompt).await {
            Ok(text) => {
                extract_json_object(&text).and_then(|v| serde_json::from_value::<RawPlan>(v).ok())
            }
            Err(e) => {
                warn!("Media planning call failed: {}", e);
                None
            }
        };

        let Some(raw) = raw else {
            return Ok(fallback_plan(
                &recipe.ingredients,
                rewritten_steps,
                self.config.default_target_secs,
            ));
        };

        Ok(self.sanitize_plan(raw, recipe, rewritten_steps))
    }
}

impl HttpPlanner {
    fn sanitize_plan(
        &self,
        raw: RawPlan,
        recipe: &RecipeInput,
        rewritten_steps: &[String],
    ) -> MediaPlan {
        let default_secs = self.config.default_target_secs;
        let fallback = || fallback_plan(&recipe.ingredients, rewritten_steps, default_secs);

        let mut ingredients = Vec::with_capacity(raw.ingredients.len());
        for (i, item) in raw.ingredients.into_iter().enumerate() {
            let prompt = item.prompt.unwrap_or_default().trim().to_string();
            let prompt = if prompt.is_empty() {
                let name = recipe
                    .ingredients
                    .get(i)
                    .map(|s| strip_quantity(s))
                    .unwrap_or_else(|| format!("ingredient {}", i));
                format!("{}. Studio photo of {}.", STYLE_FOOD_PHOTO, name)
            } else {
                prompt
            };
            ingredients.push(PlannedIngredient {
                prompt,
                negative_prompt: item
                    .negative_prompt
                    .filter(|n| !n.trim().is_empty())
                    .unwrap_or_else(|| NEGATIVE_DEFAULT.to_string()),
            });
        }

        let mut steps = Vec::with_capacity(raw.steps.len());
        for (i, st) in raw.steps.into_iter().enumerate() {
            let step_text = rewritten_steps.get(i).map(String::as_str).unwrap_or("");
            let media_type = match st.media_type.as_deref() {
                Some("image") => MediaType::Image,
                Some("video") => MediaType::Video,
                _ => heuristic_step_type(step_text),
            };
            let negative_prompt = st
                .negative_prompt
                .filter(|n| !n.trim().is_empty())
                .unwrap_or_else(|| NEGATIVE_DEFAULT.to_string());
            let prompt = st.prompt.unwrap_or_default().trim().to_string();
            let prompt = if prompt.is_empty() {
                format!("{}. {}", STYLE_FOOD_PHOTO, step_text)
            } else {
                prompt
            };

            let target_seconds = match st.target_seconds {
                Some(t) if t > 0 => t as u32,
                _ if media_type == MediaType::Video => default_secs,
                _ => 0,
            };

            let mut shots = Vec::new();
            if media_type == MediaType::Video {
                for sh in st
                    .shots
                    .unwrap_or_default()
                    .into_iter()
                    .take(self.config.max_shots_per_step)
                {
                    let duration_secs = sh.duration_s.filter(|d| *d > 0).unwrap_or(6) as u32;
                    let prompt = sh.prompt.unwrap_or_default().trim().to_string();
                    if !prompt.is_empty() {
                        shots.push(Shot {
                            duration_secs,
                            prompt,
                        });
                    }
                }
                if shots.is_empty() {
                    shots.push(Shot {
                        duration_secs: 6.min(target_seconds.max(1)),
                        prompt: format!("{}. {}", STYLE_COOKING_VIDEO, step_text),
                    });
                }
            }

            steps.push(PlannedStep {
                media_type,
                prompt,
                negative_prompt,
                target_seconds,
                shots,
            });
        }

        // Ensure lengths match the input lists
        if ingredients.len() != recipe.ingredients.len() {
            ingredients = fallback().ingredients;
        }
        if steps.len() != rewritten_steps.len() {
            steps = fallback().steps;
        }

        MediaPlan { ingredients, steps }
    }
}

/// Deterministic plan used when the planner service is unavailable.
pub fn fallback_plan(ingredients: &[String], steps: &[String], default_secs: u32) -> MediaPlan {
    let planned_ingredients = ingredients
        .iter()
        .map(|item| PlannedIngredient {
            prompt: format!(
                "{}. Studio photo of {}, clean neutral background.",
                STYLE_FOOD_PHOTO,
                strip_quantity(item)
            ),
            negative_prompt: NEGATIVE_DEFAULT.to_string(),
        })
        .collect();

    let planned_steps = steps
        .iter()
        .map(|st| match heuristic_step_type(st) {
            MediaType::Image => PlannedStep {
                media_type: MediaType::Image,
                prompt: format!("{}. {}", STYLE_FOOD_PHOTO, st),
                negative_prompt: NEGATIVE_DEFAULT.to_string(),
                target_seconds: 0,
                shots: Vec::new(),
            },
            MediaType::Video => PlannedStep {
                media_type: MediaType::Video,
                prompt: format!("{}. {}", STYLE_FOOD_PHOTO, st),
                negative_prompt: NEGATIVE_DEFAULT.to_string(),
                target_seconds: default_secs,
                shots: vec![Shot {
                    duration_secs: 6.min(default_secs.max(1)),
                    prompt: format!("{}. {}", STYLE_COOKING_VIDEO, st),
                }],
            },
        })
        .collect();

    MediaPlan {
        ingredients: planned_ingredients,
        steps: planned_steps,
    }
}

const PASSIVE_WORDS: &[&str] = &[
    "refrigerate",
    "cool",
    "rest",
    "let it",
    "set aside",
    "transfer",
    "store",
    "serve",
    "wait",
    "chill",
];

const ACTIVE_WORDS: &[&str] = &[
    "mix", "stir", "whisk", "beat", "fry", "saute", "sauté", "chop", "slice", "knead", "pour",
    "boil", "simmer", "bake", "grill", "roast", "sear", "fold", "flip",
];

/// Keyword heuristic for a step's media type, used when the plan is silent.
pub fn heuristic_step_type(step: &str) -> MediaType {
    let s = step.to_lowercase();
    let passive = PASSIVE_WORDS.iter().any(|w| s.contains(w));
    let active = ACTIVE_WORDS.iter().any(|w| s.contains(w));
    if passive && !active {
        return MediaType::Image;
    }
    if active {
        return MediaType::Video;
    }
    MediaType::Image
}

const UNIT_WORDS: &[&str] = &[
    "tbsp", "tsp", "cup", "cups", "g", "kg", "ml", "l", "oz", "lb", "pounds", "pinch", "dash",
];

/// Strip a leading quantity like "2 tbsp" or "1/2 cup" from an ingredient
/// line.
pub fn strip_quantity(ingredient: &str) -> String {
    let trimmed = ingredient.trim();
    let rest = trimmed.trim_start_matches(|c: char| c.is_ascii_digit() || "/.-".contains(c));
    let consumed_digits = rest.len() < trimmed.len();
    let mut rest = rest.trim_start();

    if consumed_digits {
        if let Some(word) = rest.split_whitespace().next() {
            if UNIT_WORDS.contains(&word.to_lowercase().as_str()) {
                rest = rest[word.len()..].trim_start();
            }
        }
    }

    if rest.is_empty() {
        trimmed.to_string()
    } else {
        rest.to_string()
    }
}

/// Pull the first JSON object or array out of free-form model output.
pub fn extract_json_object(text: &str) -> Option<Value> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }

    for (open, close) in [('{', '}'), ('[', ']')] {
        let (Some(start), Some(end)) = (text.find(open), text.rfind(close)) else {
            continue;
        };
        if start < end {
            if let Ok(value) = serde_json::from_str(&text[start..=end]) {
                return Some(value);
            }
        }
    }
    None
}

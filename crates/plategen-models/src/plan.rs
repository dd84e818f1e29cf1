//! Media plan produced by the planner capability.
//!
//! The plan decides, per ingredient and per step, what to generate and with
//! which prompts. Planning judgment lives behind the planner interface; these
//! are only the wire types the orchestrator consumes.

use serde::{Deserialize, Serialize};

/// What kind of media a step gets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaType {
    Image,
    Video,
}

/// One storyboard shot of a video step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Shot {
    /// Requested duration of this shot
    pub duration_secs: u32,
    /// Generation prompt for this shot
    pub prompt: String,
}

/// Planned asset for one ingredient (always a single photo).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlannedIngredient {
    pub prompt: String,
    pub negative_prompt: String,
}

/// Planned asset for one step (image, or video with shots).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlannedStep {
    pub media_type: MediaType,
    pub prompt: String,
    pub negative_prompt: String,
    /// Target total duration for video steps; 0 for image steps
    #[serde(default)]
    pub target_seconds: u32,
    /// Storyboard shots for video steps
    #[serde(default)]
    pub shots: Vec<Shot>,
}

/// Full plan for a recipe, parallel to the input ingredient/step lists.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaPlan {
    pub ingredients: Vec<PlannedIngredient>,
    pub steps: Vec<PlannedStep>,
}

impl MediaPlan {
    /// Total number of planned assets (one per ingredient, one per step).
    pub fn asset_count(&self) -> usize {
        self.ingredients.len() + self.steps.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn media_type_serializes_snake_case() {
        assert_eq!(serde_json::to_string(&MediaType::Video).unwrap(), "\"video\"");
        let mt: MediaType = serde_json::from_str("\"image\"").unwrap();
        assert_eq!(mt, MediaType::Image);
    }

    #[test]
    fn plan_roundtrip() {
        let plan = MediaPlan {
            ingredients: vec![PlannedIngredient {
                prompt: "studio photo of eggs".into(),
                negative_prompt: "text, watermark".into(),
            }],
            steps: vec![PlannedStep {
                media_type: MediaType::Video,
                prompt: "whisk the eggs".into(),
                negative_prompt: "text".into(),
                target_seconds: 12,
                shots: vec![Shot {
                    duration_secs: 6,
                    prompt: "close-up whisking".into(),
                }],
            }],
        };

        let json = serde_json::to_string(&plan).unwrap();
        let decoded: MediaPlan = serde_json::from_str(&json).unwrap();
        assert_eq!(decoded, plan);
        assert_eq!(decoded.asset_count(), 2);
    }
}

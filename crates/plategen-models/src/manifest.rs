//! Durable per-recipe progress manifest.
//!
//! One manifest per recipe id. It is the sole source of truth for
//! resumption, but asset `files` entries are denormalized: on-disk files are
//! ground truth and the orchestrator reconciles against them every run.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::plan::{MediaPlan, Shot};

/// Asset sections of a manifest, processed in this order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Section {
    Ingredients,
    Steps,
}

impl std::fmt::Display for Section {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Section::Ingredients => write!(f, "ingredients"),
            Section::Steps => write!(f, "steps"),
        }
    }
}

/// Media kind of one asset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssetKind {
    Image,
    Video,
}

/// Lifecycle of one asset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssetStatus {
    #[default]
    Pending,
    Done,
    Failed,
}

/// Progress record for a single planned asset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssetState {
    pub kind: AssetKind,
    #[serde(default)]
    pub status: AssetStatus,
    /// Output paths relative to the recipe root; non-empty iff `status` is Done
    #[serde(default)]
    pub files: Vec<String>,
    #[serde(default)]
    pub prompt: String,
    #[serde(default)]
    pub negative_prompt: String,
    /// Target duration for video assets
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_seconds: Option<u32>,
    /// Storyboard shots for video assets
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shots: Option<Vec<Shot>>,
    /// Source text this asset illustrates (ingredient line or step text)
    #[serde(default)]
    pub text: String,
    /// Error summary for failed assets
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl AssetState {
    pub fn new(kind: AssetKind) -> Self {
        Self {
            kind,
            status: AssetStatus::Pending,
            files: Vec::new(),
            prompt: String::new(),
            negative_prompt: String::new(),
            target_seconds: None,
            shots: None,
            text: String::new(),
            error: None,
        }
    }

    /// Transition to done with the produced files.
    pub fn mark_done(&mut self, files: Vec<String>) {
        debug_assert!(!files.is_empty(), "done asset must have files");
        self.status = AssetStatus::Done;
        self.files = files;
        self.error = None;
    }

    /// Transition to failed. A later resumed run may upgrade this to done.
    pub fn mark_failed(&mut self, error: impl Into<String>) {
        self.status = AssetStatus::Failed;
        self.files.clear();
        self.error = Some(error.into());
    }

    pub fn is_done(&self) -> bool {
        self.status == AssetStatus::Done
    }
}

/// The durable progress record for one recipe.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    pub recipe_id: i64,
    pub inputs_fingerprint: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub ingredients: BTreeMap<u32, AssetState>,
    #[serde(default)]
    pub steps: BTreeMap<u32, AssetState>,
    /// Cached rewritten step texts, valid for `inputs_fingerprint`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rewritten_steps: Option<Vec<String>>,
    /// Cached media plan, valid for `inputs_fingerprint`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plan: Option<MediaPlan>,
}

impl Manifest {
    /// Fresh manifest seeded with the current fingerprint and empty asset maps.
    pub fn new(recipe_id: i64, inputs_fingerprint: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            recipe_id,
            inputs_fingerprint: inputs_fingerprint.into(),
            created_at: now,
            updated_at: now,
            ingredients: BTreeMap::new(),
            steps: BTreeMap::new(),
            rewritten_steps: None,
            plan: None,
        }
    }

    /// Refresh the update timestamp; call after any mutation.
    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }

    fn section_mut(&mut self, section: Section) -> &mut BTreeMap<u32, AssetState> {
        match section {
            Section::Ingredients => &mut self.ingredients,
            Section::Steps => &mut self.steps,
        }
    }

    /// Get the state of one asset, creating a pending record on first touch.
    pub fn asset_mut(&mut self, section: Section, index: u32, kind: AssetKind) -> &mut AssetState {
        self.section_mut(section)
            .entry(index)
            .or_insert_with(|| AssetState::new(kind))
    }

    /// Look up an asset without creating it.
    pub fn asset(&self, section: Section, index: u32) -> Option<&AssetState> {
        match section {
            Section::Ingredients => self.ingredients.get(&index),
            Section::Steps => self.steps.get(&index),
        }
    }

    /// Count of assets in a terminal done state.
    pub fn done_count(&self) -> usize {
        self.ingredients
            .values()
            .chain(self.steps.values())
            .filter(|a| a.is_done())
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn asset_mut_creates_pending_on_first_touch() {
        let mut m = Manifest::new(1, "fp");
        let a = m.asset_mut(Section::Ingredients, 0, AssetKind::Image);
        assert_eq!(a.status, AssetStatus::Pending);
        assert!(a.files.is_empty());
    }

    #[test]
    fn done_requires_files_and_clears_error() {
        let mut a = AssetState::new(AssetKind::Video);
        a.mark_failed("backend down");
        assert_eq!(a.status, AssetStatus::Failed);
        assert!(a.error.is_some());

        a.mark_done(vec!["steps/0.mp4".into(), "steps/0.png".into()]);
        assert!(a.is_done());
        assert!(a.error.is_none());
        assert_eq!(a.files.len(), 2);
    }

    #[test]
    fn failed_clears_stale_files() {
        let mut a = AssetState::new(AssetKind::Image);
        a.mark_done(vec!["ingredients/0.png".into()]);
        a.mark_failed("disk error");
        assert!(a.files.is_empty());
    }

    #[test]
    fn manifest_roundtrip_preserves_asset_maps() {
        let mut m = Manifest::new(9, "abc");
        m.asset_mut(Section::Steps, 2, AssetKind::Video)
            .mark_done(vec!["steps/2.mp4".into(), "steps/2.png".into()]);
        m.touch();

        let json = serde_json::to_string_pretty(&m).unwrap();
        let decoded: Manifest = serde_json::from_str(&json).unwrap();
        assert_eq!(decoded.recipe_id, 9);
        assert!(decoded.asset(Section::Steps, 2).unwrap().is_done());
        assert_eq!(decoded.done_count(), 1);
    }
}

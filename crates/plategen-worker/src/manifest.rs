//! Filesystem-backed manifest store.
//!
//! One JSON manifest per recipe id under the assets root. Every save writes
//! to a temporary file and atomically renames it over the canonical path, so
//! a crash mid-write leaves either the previous or the fully-updated
//! document, never a partial one.

use std::path::{Path, PathBuf};

use tokio::fs;
use tracing::{debug, info, warn};

use plategen_models::{inputs_fingerprint, Manifest, RecipeInput};

use crate::error::WorkerResult;

/// Per-recipe directory layout.
#[derive(Debug, Clone)]
pub struct RecipeDirs {
    pub root: PathBuf,
    pub ingredients: PathBuf,
    pub steps: PathBuf,
}

/// Durable manifest store rooted at the assets base directory.
#[derive(Debug, Clone)]
pub struct ManifestStore {
    base_dir: PathBuf,
}

impl ManifestStore {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    /// Root directory for one recipe's assets.
    pub fn recipe_root(&self, recipe_id: i64) -> PathBuf {
        self.base_dir.join(recipe_id.to_string())
    }

    /// Canonical manifest path for one recipe.
    pub fn manifest_path(&self, recipe_id: i64) -> PathBuf {
        self.recipe_root(recipe_id).join("manifest.json")
    }

    /// Create the recipe's directory tree if missing.
    pub async fn ensure_dirs(&self, recipe_id: i64) -> WorkerResult<RecipeDirs> {
        let root = self.recipe_root(recipe_id);
        let ingredients = root.join("ingredients");
        let steps = root.join("steps");
        fs::create_dir_all(&ingredients).await?;
        fs::create_dir_all(&steps).await?;
        Ok(RecipeDirs {
            root,
            ingredients,
            steps,
        })
    }

    /// Load the manifest for a recipe. Unreadable or undecodable documents
    /// are treated as absent.
    pub async fn load(&self, recipe_id: i64) -> Option<Manifest> {
        let path = self.manifest_path(recipe_id);
        let body = fs::read_to_string(&path).await.ok()?;
        match serde_json::from_str(&body) {
            Ok(manifest) => Some(manifest),
            Err(e) => {
                warn!(
                    recipe_id = recipe_id,
                    "Discarding undecodable manifest {}: {}",
                    path.display(),
                    e
                );
                None
            }
        }
    }

    /// Persist the manifest atomically: write a temp file, then rename over
    /// the canonical path.
    pub async fn save(&self, manifest: &Manifest) -> WorkerResult<()> {
        let path = self.manifest_path(manifest.recipe_id);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }

        let tmp = tmp_path(&path);
        let body = serde_json::to_string_pretty(manifest)?;
        fs::write(&tmp, body).await?;
        fs::rename(&tmp, &path).await?;
        debug!(recipe_id = manifest.recipe_id, "Manifest checkpointed");
        Ok(())
    }

    /// Return the manifest to use for this invocation.
    ///
    /// No manifest on disk seeds a fresh one. A matching fingerprint reuses
    /// the existing manifest with a refreshed `updated_at`. A mismatch
    /// starts a fresh manifest for the same recipe id and purges the
    /// recipe's asset directories, so stale files of the old inputs cannot
    /// satisfy the skip-if-exists check for the new ones.
    pub async fn load_or_create(&self, recipe: &RecipeInput) -> WorkerResult<Manifest> {
        let fingerprint = inputs_fingerprint(recipe);

        match self.load(recipe.id).await {
            Some(mut manifest) if manifest.inputs_fingerprint == fingerprint => {
                manifest.touch();
                Ok(manifest)
            }
            Some(manifest) => {
                info!(
                    recipe_id = recipe.id,
                    old = %manifest.inputs_fingerprint,
                    new = %fingerprint,
                    "Inputs changed, starting fresh manifest and purging stale assets"
                );
                self.purge_asset_dirs(recipe.id).await?;
                Ok(Manifest::new(recipe.id, fingerprint))
            }
            None => Ok(Manifest::new(recipe.id, fingerprint)),
        }
    }

    async fn purge_asset_dirs(&self, recipe_id: i64) -> WorkerResult<()> {
        let root = self.recipe_root(recipe_id);
        for dir in ["ingredients", "steps"] {
            let path = root.join(dir);
            if path.exists() {
                fs::remove_dir_all(&path).await?;
            }
        }
        Ok(())
    }
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut os = path.as_os_str().to_os_string();
    os.push(".tmp");
    PathBuf::from(os)
}

#[cfg(test)]
mod tests {
    use super::*;
    use plategen_models::{AssetKind, Section};
    use tempfile::TempDir;

    fn recipe() -> RecipeInput {
        RecipeInput::new(5, vec!["2 eggs".into()], vec!["whisk the eggs".into()])
    }

    #[tokio::test]
    async fn creates_fresh_manifest_when_absent() {
        let dir = TempDir::new().unwrap();
        let store = ManifestStore::new(dir.path());

        let manifest = store.load_or_create(&recipe()).await.unwrap();
        assert_eq!(manifest.recipe_id, 5);
        assert!(manifest.ingredients.is_empty());
        assert_eq!(manifest.inputs_fingerprint, inputs_fingerprint(&recipe()));
    }

    #[tokio::test]
    async fn reuses_manifest_on_matching_fingerprint() {
        let dir = TempDir::new().unwrap();
        let store = ManifestStore::new(dir.path());

        let mut first = store.load_or_create(&recipe()).await.unwrap();
        first
            .asset_mut(Section::Ingredients, 0, AssetKind::Image)
            .mark_done(vec!["ingredients/0.png".into()]);
        store.save(&first).await.unwrap();

        let second = store.load_or_create(&recipe()).await.unwrap();
        assert_eq!(second.created_at, first.created_at);
        assert!(second.asset(Section::Ingredients, 0).unwrap().is_done());
        assert!(second.updated_at >= first.updated_at);
    }

    #[tokio::test]
    async fn fingerprint_mismatch_resets_and_purges() {
        let dir = TempDir::new().unwrap();
        let store = ManifestStore::new(dir.path());

        let dirs = store.ensure_dirs(5).await.unwrap();
        let stale = dirs.ingredients.join("0.png");
        fs::write(&stale, b"old bytes").await.unwrap();

        let mut first = store.load_or_create(&recipe()).await.unwrap();
        first
            .asset_mut(Section::Ingredients, 0, AssetKind::Image)
            .mark_done(vec!["ingredients/0.png".into()]);
        first.rewritten_steps = Some(vec!["whisk".into()]);
        store.save(&first).await.unwrap();

        let mut changed = recipe();
        changed.ingredients[0] = "3 eggs".into();
        let fresh = store.load_or_create(&changed).await.unwrap();

        assert_ne!(fresh.inputs_fingerprint, first.inputs_fingerprint);
        assert!(fresh.ingredients.is_empty());
        assert!(fresh.rewritten_steps.is_none());
        assert!(!stale.exists(), "stale asset must be purged");
    }

    #[tokio::test]
    async fn undecodable_manifest_is_treated_as_absent() {
        let dir = TempDir::new().unwrap();
        let store = ManifestStore::new(dir.path());

        store.ensure_dirs(5).await.unwrap();
        fs::write(store.manifest_path(5), b"{\"recipe_id\": 5, trunca")
            .await
            .unwrap();

        assert!(store.load(5).await.is_none());
        let manifest = store.load_or_create(&recipe()).await.unwrap();
        assert!(manifest.ingredients.is_empty());
    }

    #[tokio::test]
    async fn save_is_atomic_against_partial_tmp_writes() {
        let dir = TempDir::new().unwrap();
        let store = ManifestStore::new(dir.path());

        let manifest = store.load_or_create(&recipe()).await.unwrap();
        store.save(&manifest).await.unwrap();

        // A crash after writing the temp file but before the rename leaves
        // garbage at the tmp path; the canonical document must stay valid.
        let tmp = tmp_path(&store.manifest_path(5));
        fs::write(&tmp, b"{ partial garbage").await.unwrap();

        let loaded = store.load(5).await.expect("canonical manifest intact");
        assert_eq!(loaded.inputs_fingerprint, manifest.inputs_fingerprint);

        // The next successful save replaces the document wholesale.
        store.save(&loaded).await.unwrap();
        assert!(store.load(5).await.is_some());
    }
}

//! Recipe input payload.

use serde::{Deserialize, Serialize};

/// The semantic inputs of an asset-generation job.
///
/// Immutable per invocation. `cooking_steps` is accepted as a legacy alias
/// for `steps` on deserialization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecipeInput {
    /// Recipe id in the upstream store
    pub id: i64,
    /// Ordered ingredient lines
    #[serde(default)]
    pub ingredients: Vec<String>,
    /// Ordered cooking steps
    #[serde(default, alias = "cooking_steps")]
    pub steps: Vec<String>,
}

impl RecipeInput {
    pub fn new(id: i64, ingredients: Vec<String>, steps: Vec<String>) -> Self {
        Self {
            id,
            ingredients,
            steps,
        }
    }
}

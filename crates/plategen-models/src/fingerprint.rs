//! Deterministic fingerprint over a recipe's semantic inputs.

use sha2::{Digest, Sha256};

use crate::recipe::RecipeInput;

/// Compute the fingerprint that versions a recipe's cached artifacts.
///
/// The digest is SHA-256 over a canonical JSON document with sorted object
/// keys and order-preserving arrays, so incidental field ordering of the
/// incoming payload never changes the result while any ingredient or step
/// edit does.
pub fn inputs_fingerprint(recipe: &RecipeInput) -> String {
    // serde_json maps are BTree-backed, so object keys serialize sorted.
    let canonical = serde_json::json!({
        "id": recipe.id,
        "ingredients": recipe.ingredients,
        "steps": recipe.steps,
    });
    let blob = canonical.to_string();
    let digest = Sha256::digest(blob.as_bytes());
    hex_encode(&digest)
}

fn hex_encode(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn recipe() -> RecipeInput {
        RecipeInput::new(
            42,
            vec!["2 eggs".into(), "flour".into()],
            vec!["whisk eggs".into(), "fold in flour".into()],
        )
    }

    #[test]
    fn stable_across_field_order() {
        let a: RecipeInput = serde_json::from_str(
            r#"{"id": 42, "ingredients": ["2 eggs", "flour"], "steps": ["whisk eggs", "fold in flour"]}"#,
        )
        .unwrap();
        let b: RecipeInput = serde_json::from_str(
            r#"{"steps": ["whisk eggs", "fold in flour"], "id": 42, "ingredients": ["2 eggs", "flour"]}"#,
        )
        .unwrap();
        assert_eq!(inputs_fingerprint(&a), inputs_fingerprint(&b));
        assert_eq!(inputs_fingerprint(&a), inputs_fingerprint(&recipe()));
    }

    #[test]
    fn sensitive_to_text_changes() {
        let base = recipe();

        let mut changed = base.clone();
        changed.ingredients[0] = "3 eggs".into();
        assert_ne!(inputs_fingerprint(&base), inputs_fingerprint(&changed));

        let mut changed = base.clone();
        changed.steps[1] = "fold in sugar".into();
        assert_ne!(inputs_fingerprint(&base), inputs_fingerprint(&changed));
    }

    #[test]
    fn sensitive_to_sequence_order() {
        let base = recipe();
        let mut swapped = base.clone();
        swapped.steps.swap(0, 1);
        assert_ne!(inputs_fingerprint(&base), inputs_fingerprint(&swapped));
    }

    #[test]
    fn is_hex_sha256() {
        let fp = inputs_fingerprint(&recipe());
        assert_eq!(fp.len(), 64);
        assert!(fp.chars().all(|c| c.is_ascii_hexdigit()));
    }
}

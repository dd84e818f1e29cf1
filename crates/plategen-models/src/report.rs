//! Run outcome summary and per-asset failure records.

use serde::{Deserialize, Serialize};

use crate::manifest::Section;

/// One asset that failed during a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetFailure {
    pub section: Section,
    pub index: u32,
    pub error: String,
}

impl std::fmt::Display for AssetFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}[{}]: {}", self.section, self.index, self.error)
    }
}

/// Success summary of a completed run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunReport {
    pub recipe_id: i64,
    /// Directory holding the recipe's assets and manifest
    pub output_dir: String,
    pub ingredient_count: usize,
    pub step_count: usize,
    /// Assets generated by backend calls in this run
    pub generated: usize,
    /// Assets satisfied from existing on-disk files
    pub skipped: usize,
}

/// Render a bounded sample of failures for status/error reporting.
///
/// Keeps the first `limit` entries and notes how many were elided.
pub fn summarize_failures(failures: &[AssetFailure], limit: usize) -> String {
    let mut parts: Vec<String> = failures.iter().take(limit).map(|f| f.to_string()).collect();
    if failures.len() > limit {
        parts.push(format!("... and {} more", failures.len() - limit));
    }
    parts.join("; ")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn failure(i: u32) -> AssetFailure {
        AssetFailure {
            section: Section::Steps,
            index: i,
            error: format!("backend error {}", i),
        }
    }

    #[test]
    fn summary_is_bounded() {
        let failures: Vec<AssetFailure> = (0..8).map(failure).collect();
        let summary = summarize_failures(&failures, 5);
        assert!(summary.contains("steps[0]"));
        assert!(summary.contains("steps[4]"));
        assert!(!summary.contains("steps[5]"));
        assert!(summary.contains("and 3 more"));
    }

    #[test]
    fn short_lists_are_not_truncated() {
        let failures = vec![failure(2)];
        let summary = summarize_failures(&failures, 5);
        assert_eq!(summary, "steps[2]: backend error 2");
    }
}

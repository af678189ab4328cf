//! AntiPattern node: a detectable code-level bad practice.

use crate::models::ids::AntiPatternId;
use crate::models::negative_knowledge::Severity;
use serde::{Deserialize, Serialize};

/// A detectable code-level bad practice with empirical removal stats.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AntiPattern {
    /// Unique identifier.
    pub id: AntiPatternId,
    /// Human-readable name.
    pub name: String,
    /// Category (free text, e.g. "auth", "concurrency").
    pub category: String,
    /// Severity if triggered.
    pub severity: Severity,
    /// Number of repos this has been observed in.
    pub repos_affected: u32,
    /// Number of times this has been observed.
    pub occurrence_count: u32,
    /// Fraction of occurrences eventually removed, in `[0, 1]`.
    pub removal_rate: f32,
    /// Average days between introduction and removal.
    pub avg_days_to_removal: f32,
    /// Keywords used for quick lexical matching.
    pub detection_keywords: Vec<String>,
    /// Regex pattern used for precise detection.
    pub regex_pattern: String,
    /// Example of the bad practice.
    pub bad_example: String,
    /// Example of the recommended alternative.
    pub good_example: String,
    /// When this antipattern was first catalogued.
    pub first_seen: i64,
    /// Where this antipattern was sourced from.
    pub source: String,
}

impl AntiPattern {
    /// Creates a new antipattern record.
    #[must_use]
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        name: impl Into<String>,
        category: impl Into<String>,
        severity: Severity,
        detection_keywords: Vec<String>,
        regex_pattern: impl Into<String>,
        bad_example: impl Into<String>,
        good_example: impl Into<String>,
        first_seen: i64,
        source: impl Into<String>,
    ) -> Self {
        Self {
            id: AntiPatternId::generate(),
            name: name.into(),
            category: category.into(),
            severity,
            repos_affected: 0,
            occurrence_count: 0,
            removal_rate: 0.0,
            avg_days_to_removal: 0.0,
            detection_keywords,
            regex_pattern: regex_pattern.into(),
            bad_example: bad_example.into(),
            good_example: good_example.into(),
            first_seen,
            source: source.into(),
        }
    }
}

//! NegativeKnowledge node: a learned failure pattern.

use crate::models::decision::Module;
use crate::models::ids::NegativeKnowledgeId;
use serde::{Deserialize, Serialize};

/// Severity of a learned failure pattern or detected antipattern.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Worth noting.
    Low,
    /// Worth a warning.
    Medium,
    /// Should block forward progress.
    High,
}

impl Severity {
    /// Returns the canonical lowercase name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A learned failure pattern the Plan Validator and Bias Analyzer consult.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NegativeKnowledge {
    /// Unique identifier.
    pub id: NegativeKnowledgeId,
    /// What was hypothesized ("Custom JWT implementation is safe").
    pub hypothesis: String,
    /// What was actually concluded.
    pub conclusion: String,
    /// Supporting evidence.
    pub evidence: String,
    /// Where this knowledge came from (e.g. a decision id, an incident report).
    pub source: String,
    /// Module this knowledge is scoped to.
    pub domain: Module,
    /// Severity of acting against this knowledge.
    pub severity: Severity,
    /// When this was discovered (seconds since epoch).
    pub discovered_at: i64,
    /// Optional expiry, after which this knowledge is no longer consulted.
    pub expires_at: Option<i64>,
    /// Short key identifying the blocked pattern, for quick lookups.
    pub blocked_pattern: String,
    /// Recommended alternative action.
    pub recommendation: String,
}

impl NegativeKnowledge {
    /// Creates a new negative knowledge record.
    #[must_use]
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        hypothesis: impl Into<String>,
        conclusion: impl Into<String>,
        evidence: impl Into<String>,
        source: impl Into<String>,
        domain: Module,
        severity: Severity,
        discovered_at: i64,
        blocked_pattern: impl Into<String>,
        recommendation: impl Into<String>,
    ) -> Self {
        Self {
            id: NegativeKnowledgeId::generate(),
            hypothesis: hypothesis.into(),
            conclusion: conclusion.into(),
            evidence: evidence.into(),
            source: source.into(),
            domain,
            severity,
            discovered_at,
            expires_at: None,
            blocked_pattern: blocked_pattern.into(),
            recommendation: recommendation.into(),
        }
    }

    /// Returns true if this knowledge is still active at `now`.
    #[must_use]
    pub fn is_active_at(&self, now: i64) -> bool {
        self.expires_at.is_none_or(|exp| now < exp)
    }
}

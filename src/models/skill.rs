//! Skill node: a distilled, versioned, zoned procedure for a domain.

use crate::models::decision::Module;
use crate::models::ids::{DecisionId, SkillId};
use serde::{Deserialize, Serialize};

/// Classification of a skill's pattern entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Zone {
    /// `success_rate >= 0.75` and `count >= 3`: recommend.
    Green,
    /// Neither green nor red: caution.
    Yellow,
    /// `success_rate < 0.30` and `count >= 10`: block.
    Red,
}

impl Zone {
    /// Assigns a zone from a cluster's success rate and sample count,
    /// per the thresholds in spec §4.9.
    #[must_use]
    pub fn classify(success_rate: f64, count: u32) -> Self {
        if success_rate >= 0.75 && count >= 3 {
            Self::Green
        } else if success_rate < 0.30 && count >= 10 {
            Self::Red
        } else {
            Self::Yellow
        }
    }
}

/// A single clustered pattern entry within a skill's zone.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ZoneEntry {
    /// Normalized statement fingerprint text this entry represents.
    pub pattern: String,
    /// Success rate of this cluster.
    pub success_rate: f64,
    /// Number of terminal decisions folded into this cluster.
    pub sample_size: u32,
}

/// A distilled, versioned, zoned procedure generated from qualifying
/// decisions in a domain.
///
/// # Invariants
///
/// - `version` strictly increases within a domain.
/// - Only the highest version per domain is considered "current"; callers
///   determine currency by comparing versions across a domain's skills, not
///   via a field on this type (mirrors spec §3: "the old version remains
///   but is no longer current").
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Skill {
    /// Unique identifier.
    pub id: SkillId,
    /// Module this skill is scoped to.
    pub domain: Module,
    /// Human-readable name.
    pub name: String,
    /// Monotonic version number within the domain, starting at 1.
    pub version: u32,
    /// Overall success rate across all decisions generating this skill.
    pub success_rate: f64,
    /// Overall sample size.
    pub sample_size: u32,
    /// `success_rate * (1 - 1/sqrt(sample_size))`.
    pub quality_score: f64,
    /// Patterns with `>= 0.75` success and `>= 3` samples.
    pub green_zone: Vec<ZoneEntry>,
    /// Patterns in between.
    pub yellow_zone: Vec<ZoneEntry>,
    /// Patterns with `< 0.30` success and `>= 10` samples.
    pub red_zone: Vec<ZoneEntry>,
    /// Decisions this skill was distilled from.
    pub generated_from: Vec<DecisionId>,
    /// Prior version this skill supersedes, if any.
    pub based_on: Option<SkillId>,
    /// Creation timestamp (seconds since epoch).
    pub created_at: i64,
    /// `created_at + 90 days`, after which the skill should be regenerated.
    pub stale_at: i64,
}

/// Number of seconds in 90 days, used to compute [`Skill::stale_at`].
pub const STALE_AFTER_SECS: i64 = 90 * 24 * 60 * 60;

impl Skill {
    /// Computes the quality score for an overall success rate and sample
    /// size, per spec §3/§4.9. Returns `0.0` for an empty sample (avoids a
    /// division by zero in `1/sqrt(0)`).
    #[must_use]
    pub fn quality_score_for(success_rate: f64, sample_size: u32) -> f64 {
        if sample_size == 0 {
            return 0.0;
        }
        success_rate * (1.0 - 1.0 / (sample_size as f64).sqrt())
    }

    /// Creates a new skill version.
    #[must_use]
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        domain: Module,
        name: impl Into<String>,
        version: u32,
        success_rate: f64,
        sample_size: u32,
        green_zone: Vec<ZoneEntry>,
        yellow_zone: Vec<ZoneEntry>,
        red_zone: Vec<ZoneEntry>,
        generated_from: Vec<DecisionId>,
        based_on: Option<SkillId>,
        created_at: i64,
    ) -> Self {
        Self {
            id: SkillId::generate(),
            domain,
            name: name.into(),
            version,
            success_rate,
            sample_size,
            quality_score: Self::quality_score_for(success_rate, sample_size),
            green_zone,
            yellow_zone,
            red_zone,
            generated_from,
            based_on,
            created_at,
            stale_at: created_at + STALE_AFTER_SECS,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zone_classification_matches_thresholds() {
        assert_eq!(Zone::classify(0.9, 3), Zone::Green);
        assert_eq!(Zone::classify(0.9, 2), Zone::Yellow);
        assert_eq!(Zone::classify(0.1, 10), Zone::Red);
        assert_eq!(Zone::classify(0.1, 9), Zone::Yellow);
        assert_eq!(Zone::classify(0.5, 5), Zone::Yellow);
    }

    #[test]
    fn quality_score_zero_for_empty_sample() {
        assert_eq!(Skill::quality_score_for(1.0, 0), 0.0);
    }

    #[test]
    fn quality_score_matches_formula() {
        let q = Skill::quality_score_for(0.8, 9);
        // 0.8 * (1 - 1/3)
        assert!((q - (0.8 * (1.0 - 1.0 / 3.0))).abs() < 1e-9);
    }

    #[test]
    fn stale_at_is_ninety_days_after_creation() {
        let s = Skill::new(
            Module::Auth,
            "auth0-pattern",
            1,
            1.0,
            9,
            vec![],
            vec![],
            vec![],
            vec![],
            None,
            1_000,
        );
        assert_eq!(s.stale_at, 1_000 + STALE_AFTER_SECS);
    }
}

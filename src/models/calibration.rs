//! CalibrationProfile: per-domain Beta-distribution calibration summary.

use crate::models::decision::Module;
use serde::{Deserialize, Serialize};

/// Direction a domain's calibration is moving.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Trend {
    /// Recent success rate exceeds the lifetime rate by >= 0.05.
    Improving,
    /// Within +/- 0.05 of the lifetime rate.
    Stable,
    /// Recent success rate trails the lifetime rate by >= 0.05.
    Degrading,
}

/// Per-domain Beta(alpha, beta) calibration profile.
///
/// # Invariants
///
/// - `alpha >= 1` and `beta >= 1` always (Beta(1,1) is the uninformative
///   prior for a domain with no terminal decisions yet).
/// - `success_rate == alpha / (alpha + beta)` and
///   `confidence_gap == mean_confidence - success_rate` hold after every
///   write; see [`CalibrationProfile::recompute`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalibrationProfile {
    /// Module this profile tracks.
    pub domain: Module,
    /// Beta distribution alpha parameter (successes + 1).
    pub alpha: f64,
    /// Beta distribution beta parameter (failures/reworks + 1).
    pub beta: f64,
    /// Derived success rate (`alpha / (alpha + beta)`).
    pub success_rate: f64,
    /// Running mean of declared confidence over all terminal decisions.
    pub mean_confidence: f64,
    /// `mean_confidence - success_rate`.
    pub confidence_gap: f64,
    /// Trend versus the last `min(sample_size, 10)` terminal decisions.
    pub trend: Trend,
    /// Number of terminal decisions folded into this profile.
    pub sample_size: u32,
    /// Last time this profile was updated (seconds since epoch).
    pub last_updated: i64,
}

impl CalibrationProfile {
    /// Creates an empty profile with the uninformative Beta(1,1) prior.
    #[must_use]
    pub fn empty(domain: Module, now: i64) -> Self {
        Self {
            domain,
            alpha: 1.0,
            beta: 1.0,
            success_rate: 0.5,
            mean_confidence: 0.0,
            confidence_gap: -0.5,
            trend: Trend::Stable,
            sample_size: 0,
            last_updated: now,
        }
    }

    /// Recomputes the derived fields (`success_rate`, `confidence_gap`) from
    /// `alpha`, `beta`, and `mean_confidence`. Every mutation of those three
    /// fields must be followed by a call to this method — it is the single
    /// place the invariant in spec §3/§8 is enforced.
    pub fn recompute(&mut self) {
        self.success_rate = self.alpha / (self.alpha + self.beta);
        self.confidence_gap = self.mean_confidence - self.success_rate;
    }

    /// Returns true if this domain is eligible for skill generation:
    /// `sample_size >= 10 && success_rate >= 0.5` (spec §4.8).
    #[must_use]
    pub fn is_skill_eligible(&self) -> bool {
        self.sample_size >= 10 && self.success_rate >= 0.5
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_profile_has_uninformative_prior() {
        let p = CalibrationProfile::empty(Module::Api, 0);
        assert_eq!(p.alpha, 1.0);
        assert_eq!(p.beta, 1.0);
        assert!((p.success_rate - 0.5).abs() < 1e-9);
    }

    #[test]
    fn recompute_keeps_derived_fields_consistent() {
        let mut p = CalibrationProfile::empty(Module::Api, 0);
        p.alpha = 9.0;
        p.beta = 3.0;
        p.mean_confidence = 0.8;
        p.recompute();
        assert!((p.success_rate - 0.75).abs() < 1e-9);
        assert!((p.confidence_gap - 0.05).abs() < 1e-9);
    }

    #[test]
    fn skill_eligibility_requires_sample_and_success_rate() {
        let mut p = CalibrationProfile::empty(Module::Auth, 0);
        p.sample_size = 15;
        p.alpha = 13.0;
        p.beta = 4.0;
        p.recompute();
        assert!(p.is_skill_eligible());

        p.alpha = 1.0;
        p.beta = 16.0;
        p.recompute();
        assert!(!p.is_skill_eligible());
    }
}

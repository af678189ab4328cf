//! Calibration Engine: keeps each domain's [`CalibrationProfile`] current as
//! Decisions resolve (spec §4.8).

use crate::graph::GraphStore;
use crate::models::{CalibrationProfile, Decision, DecisionOutcome, Module, Trend};
use crate::Result;

/// Trend is recomputed over at most this many of the most recent terminal
/// decisions (spec §4.8).
const TREND_WINDOW: usize = 10;
/// A recent/lifetime success-rate gap at or above this magnitude moves the
/// trend away from `Stable` (spec §4.8).
const TREND_THRESHOLD: f64 = 0.05;

/// Updates a domain's calibration profile in response to a Decision
/// reaching a terminal outcome, and reports whether the domain just became
/// eligible for skill generation.
pub struct CalibrationEngine<'a> {
    graph: &'a dyn GraphStore,
}

impl<'a> CalibrationEngine<'a> {
    /// Creates a new engine over the given graph store.
    #[must_use]
    pub fn new(graph: &'a dyn GraphStore) -> Self {
        Self { graph }
    }

    /// Applies one terminal Decision to its domain's calibration profile,
    /// persists the result, and returns it along with whether the domain is
    /// now eligible for skill generation (spec §4.8, §4.9 trigger).
    ///
    /// # Errors
    ///
    /// Returns an error if the graph store read/write fails.
    pub fn record_terminal_outcome(
        &self,
        decision: &Decision,
    ) -> Result<(CalibrationProfile, bool)> {
        debug_assert!(decision.outcome.is_terminal());

        let mut profile = self.graph.get_calibration(decision.module)?;
        let was_eligible = profile.is_skill_eligible();

        if decision.outcome.counts_as_success() {
            profile.alpha += 1.0;
        } else if matches!(decision.outcome, DecisionOutcome::Failure | DecisionOutcome::Reworked) {
            profile.beta += 1.0;
        }

        let prior_sample = f64::from(profile.sample_size);
        profile.mean_confidence =
            profile.mean_confidence.mul_add(prior_sample, f64::from(decision.confidence)) / (prior_sample + 1.0);
        profile.sample_size += 1;
        profile.last_updated = decision.resolved_at.unwrap_or(decision.created_at);
        profile.recompute();

        profile.trend = self.compute_trend(decision.module, profile.success_rate)?;

        self.graph.put_calibration(&profile)?;

        let now_eligible = profile.is_skill_eligible();
        Ok((profile.clone(), now_eligible && !was_eligible))
    }

    fn compute_trend(&self, domain: Module, lifetime_rate: f64) -> Result<Trend> {
        let mut terminal: Vec<Decision> = self
            .graph
            .list_decisions(Some(domain), None)?
            .into_iter()
            .filter(|d| d.outcome.is_terminal())
            .collect();
        terminal.sort_by_key(|d| std::cmp::Reverse(d.resolved_at.unwrap_or(d.created_at)));
        terminal.truncate(TREND_WINDOW);

        if terminal.is_empty() {
            return Ok(Trend::Stable);
        }

        let successes = terminal.iter().filter(|d| d.outcome.counts_as_success()).count();
        #[allow(clippy::cast_precision_loss)]
        let recent_rate = successes as f64 / terminal.len() as f64;
        let gap = recent_rate - lifetime_rate;

        Ok(if gap >= TREND_THRESHOLD {
            Trend::Improving
        } else if gap <= -TREND_THRESHOLD {
            Trend::Degrading
        } else {
            Trend::Stable
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::memory::InMemoryGraphStore;

    fn resolved(module: Module, outcome: DecisionOutcome, confidence: f32, at: i64) -> Decision {
        let mut d = Decision::new("stmt", vec![], confidence, module, "s", at);
        d.resolve(outcome, at, None).unwrap();
        d
    }

    #[test]
    fn first_success_moves_alpha_and_keeps_beta() {
        let graph = InMemoryGraphStore::new();
        let engine = CalibrationEngine::new(&graph);
        let decision = resolved(Module::Api, DecisionOutcome::Success, 0.8, 100);
        graph.put_decision(&decision).unwrap();

        let (profile, _) = engine.record_terminal_outcome(&decision).unwrap();
        assert_eq!(profile.alpha, 2.0);
        assert_eq!(profile.beta, 1.0);
        assert_eq!(profile.sample_size, 1);
        assert!((profile.mean_confidence - 0.8).abs() < 1e-9);
    }

    #[test]
    fn skill_eligibility_flips_on_the_tenth_success() {
        let graph = InMemoryGraphStore::new();
        let engine = CalibrationEngine::new(&graph);
        let mut became_eligible = false;
        for i in 0..10 {
            let decision = resolved(Module::Backend, DecisionOutcome::Success, 0.9, i64::from(i));
            graph.put_decision(&decision).unwrap();
            let (_, flipped) = engine.record_terminal_outcome(&decision).unwrap();
            became_eligible = became_eligible || flipped;
        }
        assert!(became_eligible);
        assert!(graph.get_calibration(Module::Backend).unwrap().is_skill_eligible());
    }

    #[test]
    fn trend_detects_recent_improvement_over_lifetime_rate() {
        let graph = InMemoryGraphStore::new();
        let engine = CalibrationEngine::new(&graph);

        for i in 0..5 {
            let decision = resolved(Module::Database, DecisionOutcome::Failure, 0.5, i64::from(i));
            graph.put_decision(&decision).unwrap();
            engine.record_terminal_outcome(&decision).unwrap();
        }
        let mut last_profile = graph.get_calibration(Module::Database).unwrap();
        for i in 5..10 {
            let decision = resolved(Module::Database, DecisionOutcome::Success, 0.9, i64::from(i));
            graph.put_decision(&decision).unwrap();
            let (profile, _) = engine.record_terminal_outcome(&decision).unwrap();
            last_profile = profile;
        }
        assert_eq!(last_profile.trend, Trend::Improving);
    }
}

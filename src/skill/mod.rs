//! Skill Generator: distills an eligible domain's terminal decisions into a
//! new versioned [`Skill`] (spec §4.9).

use crate::graph::GraphStore;
use crate::models::{
    fingerprint, DecisionOutcome, Module, NodeRef, Relationship, RelationshipType, Skill,
    ZoneEntry,
};
use crate::Result;

/// Minimum sample size a domain needs before generation runs at all,
/// mirroring [`crate::models::CalibrationProfile::is_skill_eligible`]'s
/// threshold (spec §4.8 is the trigger; this is a defensive floor in case
/// the generator is invoked directly).
const MIN_DOMAIN_SAMPLE: usize = 10;

/// Distills a domain's decision history into skill versions.
pub struct SkillGenerator<'a> {
    graph: &'a dyn GraphStore,
}

impl<'a> SkillGenerator<'a> {
    /// Creates a new generator over the given graph store.
    #[must_use]
    pub fn new(graph: &'a dyn GraphStore) -> Self {
        Self { graph }
    }

    /// Generates and persists the next skill version for `domain`, linked
    /// `VERSION_OF` to the prior current version if one exists.
    ///
    /// Returns `None` if the domain does not yet have enough terminal
    /// decisions to distill, or if the recomputed zone assignment is
    /// identical to the current version's (spec §8 scenario 5: "a second
    /// run without new terminal decisions does not emit v2"). Callers are
    /// expected to invoke this on every terminal outcome in an eligible
    /// domain, not only the first eligibility crossing — this no-op guard
    /// is what keeps that cheap to do.
    ///
    /// # Errors
    ///
    /// Returns an error if the graph store read/write fails.
    pub fn generate(&self, domain: Module, now: i64) -> Result<Option<Skill>> {
        let decisions: Vec<_> = self
            .graph
            .list_decisions(Some(domain), None)?
            .into_iter()
            .filter(|d| d.outcome.is_terminal())
            .collect();

        if decisions.len() < MIN_DOMAIN_SAMPLE {
            return Ok(None);
        }

        let overall_successes = decisions.iter().filter(|d| d.outcome.counts_as_success()).count();
        #[allow(clippy::cast_precision_loss)]
        let overall_success_rate = overall_successes as f64 / decisions.len() as f64;

        let mut clusters: std::collections::HashMap<String, (String, u32, u32)> =
            std::collections::HashMap::new();
        for decision in &decisions {
            let key = fingerprint::normalized_key(&decision.statement, decision.module);
            let entry = clusters.entry(key).or_insert_with(|| (decision.statement.clone(), 0, 0));
            entry.1 += 1;
            if decision.outcome.counts_as_success() {
                entry.2 += 1;
            }
        }

        let mut green = Vec::new();
        let mut yellow = Vec::new();
        let mut red = Vec::new();
        for (pattern, count, successes) in clusters.into_values() {
            #[allow(clippy::cast_precision_loss)]
            let success_rate = f64::from(successes) / f64::from(count);
            let entry = ZoneEntry {
                pattern,
                success_rate,
                sample_size: count,
            };
            match crate::models::Zone::classify(success_rate, count) {
                crate::models::Zone::Green => green.push(entry),
                crate::models::Zone::Yellow => yellow.push(entry),
                crate::models::Zone::Red => red.push(entry),
            }
        }
        for zone in [&mut green, &mut yellow, &mut red] {
            zone.sort_by(|a: &ZoneEntry, b: &ZoneEntry| {
                b.success_rate.partial_cmp(&a.success_rate).unwrap_or(std::cmp::Ordering::Equal)
            });
        }

        #[allow(clippy::cast_possible_truncation)]
        let sample_size = decisions.len() as u32;

        let prior = self.graph.current_skill(domain)?;

        if let Some(prior) = &prior {
            let unchanged = prior.sample_size == sample_size
                && (prior.success_rate - overall_success_rate).abs() < f64::EPSILON
                && prior.green_zone == green
                && prior.yellow_zone == yellow
                && prior.red_zone == red;
            if unchanged {
                return Ok(None);
            }
        }

        let version = prior.as_ref().map_or(1, |s| s.version + 1);
        let generated_from = decisions.iter().map(|d| d.id.clone()).collect();

        let skill = Skill::new(
            domain,
            format!("{domain} skill v{version}"),
            version,
            overall_success_rate,
            sample_size,
            green,
            yellow,
            red,
            generated_from,
            prior.as_ref().map(|s| s.id.clone()),
            now,
        );

        self.graph.put_skill(&skill)?;

        if let Some(prior) = prior {
            self.graph.put_relationship(&Relationship::new(
                NodeRef::Skill(skill.id.clone()),
                NodeRef::Skill(prior.id),
                RelationshipType::VersionOf,
                now,
            ))?;
        }
        for decision_id in &skill.generated_from {
            self.graph.put_relationship(&Relationship::new(
                NodeRef::Skill(skill.id.clone()),
                NodeRef::Decision(decision_id.clone()),
                RelationshipType::GeneratedFrom,
                now,
            ))?;
        }

        Ok(Some(skill))
    }
}

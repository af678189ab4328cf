//! In-memory graph store for testing and development.
#![allow(clippy::expect_used)]

use super::{Direction, GraphStats, GraphStore};
use crate::Result;
use crate::models::{
    AntiPattern, AntiPatternId, CalibrationProfile, CodeChange, CodeChangeId, Decision,
    DecisionId, DecisionOutcome, Engram, EngramId, Module, NegativeKnowledge,
    NegativeKnowledgeId, NodeRef, Outcome, OutcomeId, Relationship, RelationshipType, Skill,
    SkillId,
};
use std::collections::HashMap;
use std::sync::RwLock;

/// In-memory implementation of [`GraphStore`]. Not persisted between runs.
#[derive(Default)]
pub struct InMemoryGraphStore {
    decisions: RwLock<HashMap<DecisionId, Decision>>,
    engrams: RwLock<HashMap<EngramId, Engram>>,
    code_changes: RwLock<HashMap<CodeChangeId, CodeChange>>,
    outcomes: RwLock<HashMap<OutcomeId, Outcome>>,
    negative_knowledge: RwLock<HashMap<NegativeKnowledgeId, NegativeKnowledge>>,
    antipatterns: RwLock<HashMap<AntiPatternId, AntiPattern>>,
    skills: RwLock<HashMap<SkillId, Skill>>,
    relationships: RwLock<Vec<Relationship>>,
    calibration: RwLock<HashMap<Module, CalibrationProfile>>,
}

impl InMemoryGraphStore {
    /// Creates a new empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl GraphStore for InMemoryGraphStore {
    fn put_decision(&self, decision: &Decision) -> Result<()> {
        self.decisions
            .write()
            .expect("decisions lock poisoned")
            .insert(decision.id.clone(), decision.clone());
        Ok(())
    }

    fn get_decision(&self, id: &DecisionId) -> Result<Option<Decision>> {
        Ok(self.decisions.read().expect("decisions lock poisoned").get(id).cloned())
    }

    fn list_decisions(
        &self,
        module: Option<Module>,
        outcome: Option<DecisionOutcome>,
    ) -> Result<Vec<Decision>> {
        Ok(self
            .decisions
            .read()
            .expect("decisions lock poisoned")
            .values()
            .filter(|d| module.is_none_or(|m| d.module == m))
            .filter(|d| outcome.is_none_or(|o| d.outcome == o))
            .cloned()
            .collect())
    }

    fn put_engram(&self, engram: &Engram) -> Result<()> {
        self.engrams
            .write()
            .expect("engrams lock poisoned")
            .insert(engram.id.clone(), engram.clone());
        Ok(())
    }

    fn get_engram(&self, id: &EngramId) -> Result<Option<Engram>> {
        Ok(self.engrams.read().expect("engrams lock poisoned").get(id).cloned())
    }

    fn list_engrams(&self) -> Result<Vec<Engram>> {
        let mut engrams: Vec<Engram> =
            self.engrams.read().expect("engrams lock poisoned").values().cloned().collect();
        engrams.sort_by_key(|e| std::cmp::Reverse(e.created_at));
        Ok(engrams)
    }

    fn list_decisions_by_session_window(
        &self,
        session_id: &str,
        since: i64,
        until: i64,
    ) -> Result<Vec<Decision>> {
        Ok(self
            .decisions
            .read()
            .expect("decisions lock poisoned")
            .values()
            .filter(|d| d.session_id.as_deref() == Some(session_id))
            .filter(|d| d.created_at >= since && d.created_at <= until)
            .cloned()
            .collect())
    }

    fn put_code_change(&self, change: &CodeChange) -> Result<()> {
        self.code_changes
            .write()
            .expect("code_changes lock poisoned")
            .insert(change.id.clone(), change.clone());
        Ok(())
    }

    fn get_code_change(&self, id: &CodeChangeId) -> Result<Option<CodeChange>> {
        Ok(self.code_changes.read().expect("code_changes lock poisoned").get(id).cloned())
    }

    fn put_outcome(&self, outcome: &Outcome) -> Result<()> {
        self.outcomes
            .write()
            .expect("outcomes lock poisoned")
            .insert(outcome.id.clone(), outcome.clone());
        Ok(())
    }

    fn get_outcome(&self, id: &OutcomeId) -> Result<Option<Outcome>> {
        Ok(self.outcomes.read().expect("outcomes lock poisoned").get(id).cloned())
    }

    fn put_negative_knowledge(&self, nk: &NegativeKnowledge) -> Result<()> {
        self.negative_knowledge
            .write()
            .expect("negative_knowledge lock poisoned")
            .insert(nk.id.clone(), nk.clone());
        Ok(())
    }

    fn list_negative_knowledge(
        &self,
        domain: Option<Module>,
        now: i64,
    ) -> Result<Vec<NegativeKnowledge>> {
        Ok(self
            .negative_knowledge
            .read()
            .expect("negative_knowledge lock poisoned")
            .values()
            .filter(|nk| domain.is_none_or(|d| nk.domain == d))
            .filter(|nk| nk.is_active_at(now))
            .cloned()
            .collect())
    }

    fn get_negative_knowledge(&self, id: &NegativeKnowledgeId) -> Result<Option<NegativeKnowledge>> {
        Ok(self
            .negative_knowledge
            .read()
            .expect("negative_knowledge lock poisoned")
            .get(id)
            .cloned())
    }

    fn put_antipattern(&self, ap: &AntiPattern) -> Result<()> {
        self.antipatterns
            .write()
            .expect("antipatterns lock poisoned")
            .insert(ap.id.clone(), ap.clone());
        Ok(())
    }

    fn list_antipatterns(&self) -> Result<Vec<AntiPattern>> {
        Ok(self.antipatterns.read().expect("antipatterns lock poisoned").values().cloned().collect())
    }

    fn put_skill(&self, skill: &Skill) -> Result<()> {
        self.skills
            .write()
            .expect("skills lock poisoned")
            .insert(skill.id.clone(), skill.clone());
        Ok(())
    }

    fn get_skill(&self, id: &SkillId) -> Result<Option<Skill>> {
        Ok(self.skills.read().expect("skills lock poisoned").get(id).cloned())
    }

    fn list_skills(&self, domain: Module) -> Result<Vec<Skill>> {
        let mut skills: Vec<Skill> = self
            .skills
            .read()
            .expect("skills lock poisoned")
            .values()
            .filter(|s| s.domain == domain)
            .cloned()
            .collect();
        skills.sort_by_key(|s| s.version);
        Ok(skills)
    }

    fn put_relationship(&self, rel: &Relationship) -> Result<()> {
        self.relationships.write().expect("relationships lock poisoned").push(rel.clone());
        Ok(())
    }

    fn list_relationships(
        &self,
        node: &NodeRef,
        rel_type: Option<RelationshipType>,
        direction: Direction,
    ) -> Result<Vec<Relationship>> {
        Ok(self
            .relationships
            .read()
            .expect("relationships lock poisoned")
            .iter()
            .filter(|r| rel_type.is_none_or(|t| r.rel_type == t))
            .filter(|r| match direction {
                Direction::Outgoing => &r.from == node,
                Direction::Incoming => &r.to == node,
                Direction::Both => &r.from == node || &r.to == node,
            })
            .cloned()
            .collect())
    }

    fn get_calibration(&self, domain: Module) -> Result<CalibrationProfile> {
        Ok(self
            .calibration
            .read()
            .expect("calibration lock poisoned")
            .get(&domain)
            .cloned()
            .unwrap_or_else(|| CalibrationProfile::empty(domain, crate::current_timestamp())))
    }

    fn put_calibration(&self, profile: &CalibrationProfile) -> Result<()> {
        self.calibration
            .write()
            .expect("calibration lock poisoned")
            .insert(profile.domain, profile.clone());
        Ok(())
    }

    fn stats(&self) -> Result<GraphStats> {
        Ok(GraphStats {
            decision_count: self.decisions.read().expect("decisions lock poisoned").len(),
            engram_count: self.engrams.read().expect("engrams lock poisoned").len(),
            code_change_count: self.code_changes.read().expect("code_changes lock poisoned").len(),
            outcome_count: self.outcomes.read().expect("outcomes lock poisoned").len(),
            negative_knowledge_count: self
                .negative_knowledge
                .read()
                .expect("negative_knowledge lock poisoned")
                .len(),
            antipattern_count: self.antipatterns.read().expect("antipatterns lock poisoned").len(),
            skill_count: self.skills.read().expect("skills lock poisoned").len(),
            relationship_count: self.relationships.read().expect("relationships lock poisoned").len(),
        })
    }

    fn clear(&self) -> Result<()> {
        self.decisions.write().expect("decisions lock poisoned").clear();
        self.engrams.write().expect("engrams lock poisoned").clear();
        self.code_changes.write().expect("code_changes lock poisoned").clear();
        self.outcomes.write().expect("outcomes lock poisoned").clear();
        self.negative_knowledge.write().expect("negative_knowledge lock poisoned").clear();
        self.antipatterns.write().expect("antipatterns lock poisoned").clear();
        self.skills.write().expect("skills lock poisoned").clear();
        self.relationships.write().expect("relationships lock poisoned").clear();
        self.calibration.write().expect("calibration lock poisoned").clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::DecisionOutcome;

    fn sample_decision(module: Module) -> Decision {
        Decision::new("use postgres", vec![], 0.8, module, "session-1", 1_000)
    }

    #[test]
    fn put_then_get_round_trips() {
        let store = InMemoryGraphStore::new();
        let d = sample_decision(Module::Database);
        store.put_decision(&d).unwrap();
        assert_eq!(store.get_decision(&d.id).unwrap(), Some(d));
    }

    #[test]
    fn list_decisions_filters_by_module_and_outcome() {
        let store = InMemoryGraphStore::new();
        let d1 = sample_decision(Module::Database);
        let mut d2 = sample_decision(Module::Auth);
        d2.resolve(DecisionOutcome::Success, 2_000, Some(1.0)).unwrap();
        store.put_decision(&d1).unwrap();
        store.put_decision(&d2).unwrap();

        let db_only = store.list_decisions(Some(Module::Database), None).unwrap();
        assert_eq!(db_only.len(), 1);

        let success_only = store
            .list_decisions(None, Some(DecisionOutcome::Success))
            .unwrap();
        assert_eq!(success_only.len(), 1);
        assert_eq!(success_only[0].id, d2.id);
    }

    #[test]
    fn list_engrams_orders_most_recent_first() {
        let store = InMemoryGraphStore::new();
        let older = crate::models::Engram::new(
            "s1",
            "",
            "plan",
            "",
            100,
            0,
            "claude-code",
            "claude",
            crate::models::EngramCounts::default(),
        );
        let newer = crate::models::Engram::new(
            "s2",
            "",
            "plan",
            "",
            200,
            0,
            "claude-code",
            "claude",
            crate::models::EngramCounts::default(),
        );
        store.put_engram(&older).unwrap();
        store.put_engram(&newer).unwrap();

        let listed = store.list_engrams().unwrap();
        assert_eq!(listed[0].id, newer.id);
        assert_eq!(listed[1].id, older.id);
    }

    #[test]
    fn unknown_domain_calibration_returns_uninformative_prior() {
        let store = InMemoryGraphStore::new();
        let profile = store.get_calibration(Module::Infra).unwrap();
        assert_eq!(profile.alpha, 1.0);
        assert_eq!(profile.beta, 1.0);
    }

    #[test]
    fn similar_decisions_traversal_is_bounded_and_cycle_safe() {
        let store = InMemoryGraphStore::new();
        let a = DecisionId::generate();
        let b = DecisionId::generate();
        let c = DecisionId::generate();

        store
            .put_relationship(&Relationship::weighted(
                NodeRef::Decision(a.clone()),
                NodeRef::Decision(b.clone()),
                RelationshipType::SimilarTo,
                0.9,
                0,
            ))
            .unwrap();
        store
            .put_relationship(&Relationship::weighted(
                NodeRef::Decision(b.clone()),
                NodeRef::Decision(c.clone()),
                RelationshipType::SimilarTo,
                0.8,
                0,
            ))
            .unwrap();
        // cycle back to a
        store
            .put_relationship(&Relationship::weighted(
                NodeRef::Decision(c.clone()),
                NodeRef::Decision(a.clone()),
                RelationshipType::SimilarTo,
                0.7,
                0,
            ))
            .unwrap();

        let found = store.similar_decisions(&a, 3).unwrap();
        let ids: Vec<_> = found.iter().map(|(id, _)| id.clone()).collect();
        assert!(ids.contains(&b));
        assert!(ids.contains(&c));
        assert_eq!(ids.len(), 2, "cycle back to start must not be revisited");
    }
}

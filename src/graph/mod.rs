//! The Graph Store: a typed node/edge store with indexed lookups and
//! traversal queries (spec §3, §4).
//!
//! The Graph Store exclusively owns all nodes and edges; every other
//! component holds only snapshots obtained through a [`GraphStore`] query.
//! Two backends are provided: [`memory::InMemoryGraphStore`] for tests and
//! [`sqlite::SqliteGraphStore`] for persistent deployments.

pub mod memory;
pub mod sqlite;

use crate::Result;
use crate::models::{
    AntiPattern, AntiPatternId, CalibrationProfile, CodeChange, CodeChangeId, Decision,
    DecisionId, DecisionOutcome, Engram, EngramId, Module, NegativeKnowledge,
    NegativeKnowledgeId, NodeRef, Outcome, OutcomeId, Relationship, RelationshipType, Skill,
    SkillId,
};

/// Direction to read relationships in relative to a given node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Edges where the node is the source (`from`).
    Outgoing,
    /// Edges where the node is the target (`to`).
    Incoming,
    /// Both directions.
    Both,
}

/// Aggregate counts describing the current graph contents, surfaced by the
/// daemon's health reporting.
#[derive(Debug, Clone, Default)]
pub struct GraphStats {
    /// Total Decision nodes.
    pub decision_count: usize,
    /// Total Engram nodes.
    pub engram_count: usize,
    /// Total CodeChange nodes.
    pub code_change_count: usize,
    /// Total Outcome nodes.
    pub outcome_count: usize,
    /// Total NegativeKnowledge nodes.
    pub negative_knowledge_count: usize,
    /// Total AntiPattern nodes.
    pub antipattern_count: usize,
    /// Total Skill nodes (all versions).
    pub skill_count: usize,
    /// Total relationships.
    pub relationship_count: usize,
}

/// The typed node/edge store backing the reasoning graph.
///
/// Implementors must use interior mutability (`&self` throughout) so the
/// store can be shared via `Arc<dyn GraphStore>` across the endpoint,
/// scheduler, and extractor tasks.
pub trait GraphStore: Send + Sync {
    /// Inserts or replaces a Decision node.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails.
    fn put_decision(&self, decision: &Decision) -> Result<()>;

    /// Looks up a Decision by id.
    ///
    /// # Errors
    ///
    /// Returns an error if the lookup fails.
    fn get_decision(&self, id: &DecisionId) -> Result<Option<Decision>>;

    /// Lists Decisions, optionally filtered by module and/or outcome.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    fn list_decisions(
        &self,
        module: Option<Module>,
        outcome: Option<DecisionOutcome>,
    ) -> Result<Vec<Decision>>;

    /// Inserts a new Engram node.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails.
    fn put_engram(&self, engram: &Engram) -> Result<()>;

    /// Looks up an Engram by id.
    ///
    /// # Errors
    ///
    /// Returns an error if the lookup fails.
    fn get_engram(&self, id: &EngramId) -> Result<Option<Engram>>;

    /// Lists all Engrams, most recently created first. Used by the Plan
    /// Context Builder to recover past plan checkpoints (spec §4.5); plan
    /// checkpoints are distinguished from commit checkpoints by an empty
    /// `commit_sha`.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    fn list_engrams(&self) -> Result<Vec<Engram>>;

    /// Lists Decisions created within `[since, until]` with a session id set,
    /// used by the Engram Capturer's best-effort commit-to-decision linking
    /// window (spec §4.4).
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    fn list_decisions_by_session_window(
        &self,
        session_id: &str,
        since: i64,
        until: i64,
    ) -> Result<Vec<Decision>>;

    /// Inserts a new CodeChange node.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails.
    fn put_code_change(&self, change: &CodeChange) -> Result<()>;

    /// Looks up a CodeChange by id.
    ///
    /// # Errors
    ///
    /// Returns an error if the lookup fails.
    fn get_code_change(&self, id: &CodeChangeId) -> Result<Option<CodeChange>>;

    /// Inserts a new Outcome node.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails.
    fn put_outcome(&self, outcome: &Outcome) -> Result<()>;

    /// Looks up an Outcome by id.
    ///
    /// # Errors
    ///
    /// Returns an error if the lookup fails.
    fn get_outcome(&self, id: &OutcomeId) -> Result<Option<Outcome>>;

    /// Inserts a new NegativeKnowledge node.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails.
    fn put_negative_knowledge(&self, nk: &NegativeKnowledge) -> Result<()>;

    /// Lists NegativeKnowledge active at `now`, optionally scoped to a
    /// domain.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    fn list_negative_knowledge(
        &self,
        domain: Option<Module>,
        now: i64,
    ) -> Result<Vec<NegativeKnowledge>>;

    /// Looks up NegativeKnowledge by id.
    ///
    /// # Errors
    ///
    /// Returns an error if the lookup fails.
    fn get_negative_knowledge(&self, id: &NegativeKnowledgeId) -> Result<Option<NegativeKnowledge>>;

    /// Inserts a new AntiPattern node.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails.
    fn put_antipattern(&self, ap: &AntiPattern) -> Result<()>;

    /// Lists all AntiPatterns.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    fn list_antipatterns(&self) -> Result<Vec<AntiPattern>>;

    /// Inserts a new Skill version.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails.
    fn put_skill(&self, skill: &Skill) -> Result<()>;

    /// Looks up a Skill by id.
    ///
    /// # Errors
    ///
    /// Returns an error if the lookup fails.
    fn get_skill(&self, id: &SkillId) -> Result<Option<Skill>>;

    /// Lists all Skill versions for a domain, ordered by ascending version.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    fn list_skills(&self, domain: Module) -> Result<Vec<Skill>>;

    /// Returns the current (highest-version) Skill for a domain, if any.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    fn current_skill(&self, domain: Module) -> Result<Option<Skill>> {
        Ok(self.list_skills(domain)?.into_iter().max_by_key(|s| s.version))
    }

    /// Inserts a relationship edge.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails.
    fn put_relationship(&self, rel: &Relationship) -> Result<()>;

    /// Lists relationships touching `node`, optionally filtered by type and
    /// direction.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    fn list_relationships(
        &self,
        node: &NodeRef,
        rel_type: Option<RelationshipType>,
        direction: Direction,
    ) -> Result<Vec<Relationship>>;

    /// Breadth-first traversal of `SIMILAR_TO` edges from `start`, bounded to
    /// `max_depth` hops (spec §3: "traversal bounded depth ≤3"). Cycle-safe:
    /// a node already visited is not revisited or re-enqueued.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying queries fail.
    fn similar_decisions(&self, start: &DecisionId, max_depth: u32) -> Result<Vec<(DecisionId, f32)>> {
        use std::collections::HashSet;

        let mut visited: HashSet<DecisionId> = HashSet::new();
        visited.insert(start.clone());
        let mut frontier = vec![start.clone()];
        let mut found = Vec::new();

        for _ in 0..max_depth {
            let mut next_frontier = Vec::new();
            for current in &frontier {
                let rels = self.list_relationships(
                    &NodeRef::Decision(current.clone()),
                    Some(RelationshipType::SimilarTo),
                    Direction::Both,
                )?;
                for rel in rels {
                    let other = if rel.from.as_str() == current.as_str() {
                        &rel.to
                    } else {
                        &rel.from
                    };
                    let NodeRef::Decision(other_id) = other else {
                        continue;
                    };
                    if visited.insert(other_id.clone()) {
                        found.push((other_id.clone(), rel.weight));
                        next_frontier.push(other_id.clone());
                    }
                }
            }
            if next_frontier.is_empty() {
                break;
            }
            frontier = next_frontier;
        }

        Ok(found)
    }

    /// Gets the calibration profile for a domain, returning the
    /// uninformative Beta(1,1) prior if no terminal decisions have been
    /// recorded yet (spec §4.1: `get_calibration` allows `unknown_domain`,
    /// returning an empty profile rather than erroring).
    ///
    /// # Errors
    ///
    /// Returns an error if the lookup fails.
    fn get_calibration(&self, domain: Module) -> Result<CalibrationProfile>;

    /// Persists a calibration profile.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails.
    fn put_calibration(&self, profile: &CalibrationProfile) -> Result<()>;

    /// Returns aggregate graph statistics.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    fn stats(&self) -> Result<GraphStats>;

    /// Clears all graph data. Intended for tests.
    ///
    /// # Errors
    ///
    /// Returns an error if the operation fails.
    fn clear(&self) -> Result<()>;
}

//! Typed directed edges between graph nodes.

use crate::models::ids::{
    AntiPatternId, CodeChangeId, DecisionId, EngramId, NegativeKnowledgeId, OutcomeId, SkillId,
};
use serde::{Deserialize, Serialize};

/// Any node identifier in the reasoning graph, erased to a single type so
/// [`Relationship`] can reference either endpoint without a generic
/// parameter per edge kind.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum NodeRef {
    Decision(DecisionId),
    Engram(EngramId),
    CodeChange(CodeChangeId),
    Outcome(OutcomeId),
    NegativeKnowledge(NegativeKnowledgeId),
    AntiPattern(AntiPatternId),
    Skill(SkillId),
}

impl NodeRef {
    /// Returns the string id underlying this reference, regardless of node
    /// kind, for storage keys and log fields.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Decision(id) => id.as_str(),
            Self::Engram(id) => id.as_str(),
            Self::CodeChange(id) => id.as_str(),
            Self::Outcome(id) => id.as_str(),
            Self::NegativeKnowledge(id) => id.as_str(),
            Self::AntiPattern(id) => id.as_str(),
            Self::Skill(id) => id.as_str(),
        }
    }
}

/// The typed directed edge kinds the reasoning graph supports (spec §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RelationshipType {
    /// Decision -> Engram: the decision was made during this session.
    MadeIn,
    /// Decision -> CodeChange: the decision was implemented by this change.
    ImplementedIn,
    /// CodeChange -> Outcome: the change produced this measured result.
    ResultedIn,
    /// CodeChange -> AntiPattern: the change exhibits this antipattern.
    Triggered,
    /// Outcome -> NegativeKnowledge: this outcome caused the knowledge to
    /// be learned.
    Caused,
    /// NegativeKnowledge -> Decision: this knowledge prevented a decision
    /// from repeating a known failure.
    Prevented,
    /// Decision -> CodeChange: the decision's original change was reworked
    /// by a later one.
    ReworkedBy,
    /// Decision -> Decision: similarity between two decisions' statements,
    /// as scored by an external embedding collaborator (see DESIGN.md).
    /// Weighted, can be cyclic, traversal bounded to depth 3.
    SimilarTo,
    /// Skill -> Decision: the skill was distilled from this decision.
    GeneratedFrom,
    /// Skill -> Skill: this skill supersedes an earlier version.
    VersionOf,
    /// Skill -> AntiPattern: the skill warns against this antipattern.
    WarnsAgainst,
    /// Decision -> Skill: this decision was generated under guidance of
    /// this skill version.
    BasedOn,
}

impl RelationshipType {
    /// Returns the canonical `SCREAMING_SNAKE_CASE` name, matching the wire
    /// and storage representation.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::MadeIn => "MADE_IN",
            Self::ImplementedIn => "IMPLEMENTED_IN",
            Self::ResultedIn => "RESULTED_IN",
            Self::Triggered => "TRIGGERED",
            Self::Caused => "CAUSED",
            Self::Prevented => "PREVENTED",
            Self::ReworkedBy => "REWORKED_BY",
            Self::SimilarTo => "SIMILAR_TO",
            Self::GeneratedFrom => "GENERATED_FROM",
            Self::VersionOf => "VERSION_OF",
            Self::WarnsAgainst => "WARNS_AGAINST",
            Self::BasedOn => "BASED_ON",
        }
    }

    /// Returns true for edge kinds that carry a meaningful, non-unit
    /// `weight` (currently only `SIMILAR_TO`).
    #[must_use]
    pub const fn is_weighted(&self) -> bool {
        matches!(self, Self::SimilarTo)
    }
}

impl std::fmt::Display for RelationshipType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A directed, typed edge between two graph nodes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Relationship {
    /// Source node.
    pub from: NodeRef,
    /// Target node.
    pub to: NodeRef,
    /// Edge type.
    pub rel_type: RelationshipType,
    /// Edge weight in `[0, 1]`; `1.0` for unweighted edge kinds.
    pub weight: f32,
    /// When this edge was created (seconds since epoch).
    pub created_at: i64,
}

impl Relationship {
    /// Creates a new unweighted (`weight = 1.0`) relationship.
    #[must_use]
    pub fn new(from: NodeRef, to: NodeRef, rel_type: RelationshipType, created_at: i64) -> Self {
        Self {
            from,
            to,
            rel_type,
            weight: 1.0,
            created_at,
        }
    }

    /// Creates a weighted relationship, clamping `weight` to `[0, 1]`.
    /// Intended for `SIMILAR_TO` edges scored by an external collaborator.
    #[must_use]
    pub fn weighted(
        from: NodeRef,
        to: NodeRef,
        rel_type: RelationshipType,
        weight: f32,
        created_at: i64,
    ) -> Self {
        Self {
            from,
            to,
            rel_type,
            weight: weight.clamp(0.0, 1.0),
            created_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn relationship_type_names_are_screaming_snake_case() {
        assert_eq!(RelationshipType::MadeIn.as_str(), "MADE_IN");
        assert_eq!(RelationshipType::SimilarTo.as_str(), "SIMILAR_TO");
        assert_eq!(RelationshipType::BasedOn.as_str(), "BASED_ON");
    }

    #[test]
    fn only_similar_to_is_weighted() {
        assert!(RelationshipType::SimilarTo.is_weighted());
        assert!(!RelationshipType::MadeIn.is_weighted());
    }

    #[test]
    fn weighted_relationship_clamps_weight() {
        let r = Relationship::weighted(
            NodeRef::Decision(DecisionId::generate()),
            NodeRef::Decision(DecisionId::generate()),
            RelationshipType::SimilarTo,
            1.4,
            0,
        );
        assert_eq!(r.weight, 1.0);
    }
}

//! Data models for the Membria reasoning graph.
//!
//! Each node kind lives in its own module; [`ids`] defines the
//! domain-prefixed identifier newtypes shared by all of them, and
//! [`relationship`] defines the typed edges connecting them.

pub mod antipattern;
pub mod calibration;
pub mod code_change;
pub mod decision;
pub mod engram;
pub mod fingerprint;
pub mod ids;
pub mod negative_knowledge;
pub mod outcome;
pub mod relationship;
pub mod skill;

pub use antipattern::AntiPattern;
pub use calibration::{CalibrationProfile, Trend};
pub use code_change::{ChangeOutcome, CodeChange, DiffStats};
pub use decision::{Decision, DecisionOutcome, Module};
pub use engram::{Engram, EngramCounts};
pub use ids::{
    AntiPatternId, CodeChangeId, DecisionId, EngramId, NegativeKnowledgeId, OutcomeId, SignalId,
    SkillId,
};
pub use negative_knowledge::{NegativeKnowledge, Severity};
pub use outcome::{Outcome, OutcomeStatus};
pub use relationship::{NodeRef, Relationship, RelationshipType};
pub use skill::{Skill, Zone, ZoneEntry};

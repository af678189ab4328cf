//! Decision node: a choice made during an AI session.

use crate::models::ids::DecisionId;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};

/// Module tag a decision is filed under.
///
/// Used to scope calibration profiles, negative knowledge, and plan
/// validation to a coherent area of the codebase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Module {
    /// Authentication, authorization, sessions.
    Auth,
    /// Databases, migrations, ORMs.
    Database,
    /// REST/GraphQL/gRPC surfaces.
    Api,
    /// Deployment, CI/CD, containers.
    Infra,
    /// Client-side / UI code.
    Frontend,
    /// Server-side business logic.
    Backend,
    /// Anything that doesn't fit the above buckets.
    Other,
}

impl Module {
    /// Returns all known module variants, in a stable order.
    #[must_use]
    pub const fn all() -> &'static [Self] {
        &[
            Self::Auth,
            Self::Database,
            Self::Api,
            Self::Infra,
            Self::Frontend,
            Self::Backend,
            Self::Other,
        ]
    }

    /// Returns the canonical lowercase name of this module.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Auth => "auth",
            Self::Database => "database",
            Self::Api => "api",
            Self::Infra => "infra",
            Self::Frontend => "frontend",
            Self::Backend => "backend",
            Self::Other => "other",
        }
    }

    /// Parses a module tag from a free-form string, defaulting to `Other`
    /// rather than failing, since module tags are advisory classification,
    /// not validated user input.
    #[must_use]
    pub fn parse(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "auth" | "authentication" | "authorization" => Self::Auth,
            "database" | "db" => Self::Database,
            "api" => Self::Api,
            "infra" | "infrastructure" => Self::Infra,
            "frontend" | "ui" | "client" => Self::Frontend,
            "backend" | "server" => Self::Backend,
            _ => Self::Other,
        }
    }
}

impl std::fmt::Display for Module {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Terminal or pending outcome of a [`Decision`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DecisionOutcome {
    /// Not yet resolved.
    Pending,
    /// The decision played out as hoped.
    Success,
    /// The decision did not play out as hoped.
    Failure,
    /// The decision was revisited and replaced with a different approach.
    Reworked,
}

impl DecisionOutcome {
    /// Returns true if this outcome is terminal (not `Pending`).
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        !matches!(self, Self::Pending)
    }

    /// Returns true if this outcome should increment a calibration profile's
    /// success count rather than its failure count.
    #[must_use]
    pub const fn counts_as_success(self) -> bool {
        matches!(self, Self::Success)
    }

    /// Returns the canonical lowercase name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Success => "success",
            Self::Failure => "failure",
            Self::Reworked => "reworked",
        }
    }
}

impl std::fmt::Display for DecisionOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A choice made during an AI session.
///
/// # Invariants
///
/// - `outcome != Pending` implies `resolved_at` is `Some` and `>= created_at`.
/// - Once `outcome` leaves `Pending` the decision is terminal: `statement`,
///   `alternatives`, and `confidence` must not be mutated afterwards. This
///   crate enforces the rule procedurally (see [`Decision::resolve`]) rather
///   than with the type system, since the graph store round-trips decisions
///   through serialization at every layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Decision {
    /// Unique identifier.
    pub id: DecisionId,
    /// Free-text statement of the decision.
    pub statement: String,
    /// Alternatives that were considered (may be empty).
    pub alternatives: Vec<String>,
    /// Declared confidence in `[0, 1]`.
    pub confidence: f32,
    /// Module this decision is scoped to.
    pub module: Module,
    /// Creation timestamp (seconds since epoch).
    pub created_at: i64,
    /// Identifier of the author (session id, user id, or agent tag).
    pub created_by: String,
    /// Current outcome.
    pub outcome: DecisionOutcome,
    /// Timestamp the outcome became terminal, if it has.
    pub resolved_at: Option<i64>,
    /// Measured actual success rate, once observed.
    pub actual_success_rate: Option<f32>,
    /// Linked Engram node, if this decision was captured at a session
    /// checkpoint.
    pub engram_id: Option<crate::models::ids::EngramId>,
    /// Linked commit identifier, once implemented in code.
    pub commit_sha: Option<String>,
    /// Session identifier, used for read-your-writes ordering and for the
    /// Engram Capturer's decision-to-commit linking window.
    pub session_id: Option<String>,
}

impl Decision {
    /// Creates a new pending decision.
    #[must_use]
    pub fn new(
        statement: impl Into<String>,
        alternatives: Vec<String>,
        confidence: f32,
        module: Module,
        created_by: impl Into<String>,
        created_at: i64,
    ) -> Self {
        Self {
            id: DecisionId::generate(),
            statement: statement.into(),
            alternatives,
            confidence: confidence.clamp(0.0, 1.0),
            module,
            created_at,
            created_by: created_by.into(),
            outcome: DecisionOutcome::Pending,
            resolved_at: None,
            actual_success_rate: None,
            engram_id: None,
            commit_sha: None,
            session_id: None,
        }
    }

    /// Attaches a session id, used for read-your-writes ordering.
    #[must_use]
    pub fn with_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    /// Transitions this decision to a terminal outcome.
    ///
    /// # Errors
    ///
    /// Returns [`Error::AlreadyTerminal`] if the decision is already
    /// resolved; the monotonic pending→terminal lifecycle forbids
    /// overwriting a terminal outcome.
    pub fn resolve(
        &mut self,
        outcome: DecisionOutcome,
        resolved_at: i64,
        actual_success_rate: Option<f32>,
    ) -> Result<()> {
        if self.outcome.is_terminal() {
            return Err(Error::AlreadyTerminal(self.id.to_string()));
        }
        if outcome == DecisionOutcome::Pending {
            return Err(Error::InvalidInput(
                "cannot resolve a decision to Pending".to_string(),
            ));
        }
        self.outcome = outcome;
        self.resolved_at = Some(resolved_at.max(self.created_at));
        self.actual_success_rate = actual_success_rate;
        Ok(())
    }

    /// Links this decision to the code change that implemented it.
    pub fn link_commit(&mut self, commit_sha: impl Into<String>) {
        self.commit_sha = Some(commit_sha.into());
    }

    /// Returns the normalized statement+module fingerprint used for signal
    /// and extraction deduplication (lowercased, whitespace-collapsed
    /// statement plus the module tag).
    #[must_use]
    pub fn fingerprint(&self) -> String {
        crate::models::fingerprint::normalize(&self.statement, self.module)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Decision {
        Decision::new(
            "Use PostgreSQL for user storage",
            vec!["MongoDB".to_string(), "SQLite".to_string()],
            0.85,
            Module::Database,
            "session-1",
            1_000,
        )
    }

    #[test]
    fn new_decision_is_pending() {
        let d = sample();
        assert_eq!(d.outcome, DecisionOutcome::Pending);
        assert!(d.resolved_at.is_none());
        assert!(d.id.as_str().starts_with("dec_"));
    }

    #[test]
    fn confidence_is_clamped() {
        let d = Decision::new("x", vec![], 1.5, Module::Other, "u", 0);
        assert_eq!(d.confidence, 1.0);
        let d2 = Decision::new("x", vec![], -0.5, Module::Other, "u", 0);
        assert_eq!(d2.confidence, 0.0);
    }

    #[test]
    fn resolve_sets_resolved_at_and_is_monotonic() {
        let mut d = sample();
        d.resolve(DecisionOutcome::Success, 2_000, Some(1.0)).unwrap();
        assert_eq!(d.outcome, DecisionOutcome::Success);
        assert_eq!(d.resolved_at, Some(2_000));

        let err = d.resolve(DecisionOutcome::Failure, 3_000, None).unwrap_err();
        assert!(matches!(err, Error::AlreadyTerminal(_)));
        // state unchanged
        assert_eq!(d.outcome, DecisionOutcome::Success);
    }

    #[test]
    fn resolved_at_never_precedes_created_at() {
        let mut d = sample();
        d.resolve(DecisionOutcome::Failure, 500, None).unwrap();
        assert!(d.resolved_at.unwrap() >= d.created_at);
    }

    #[test]
    fn module_parse_defaults_to_other() {
        assert_eq!(Module::parse("nonsense"), Module::Other);
        assert_eq!(Module::parse("DB"), Module::Database);
    }
}

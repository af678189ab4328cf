//! CodeChange node: a commit that implements one or more decisions.

use crate::models::ids::{CodeChangeId, DecisionId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Outcome of a code change, independent of the [`crate::models::decision::Decision`]
/// outcome it may implement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeOutcome {
    /// Shipped and stuck.
    Success,
    /// Shipped and caused problems.
    Failure,
    /// Was reverted by a later commit.
    Reverted,
}

/// Line-level diff statistics for a commit.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiffStats {
    /// Lines added.
    pub added: u32,
    /// Lines removed.
    pub removed: u32,
    /// Files modified.
    pub modified: u32,
}

/// A commit that implements one or more decisions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CodeChange {
    /// Unique identifier.
    pub id: CodeChangeId,
    /// Commit SHA.
    pub commit_sha: String,
    /// Paths touched by the commit.
    pub files_changed: BTreeSet<String>,
    /// Diff statistics.
    pub diff_stats: DiffStats,
    /// Commit timestamp (seconds since epoch).
    pub timestamp: i64,
    /// Commit author.
    pub author: String,
    /// Decision this change implements, if known.
    pub decision_id: Option<DecisionId>,
    /// Outcome of the change.
    pub outcome: ChangeOutcome,
    /// The change that reverted this one, if any.
    pub reverting_change_id: Option<CodeChangeId>,
    /// Days between this change and its revert, if reverted.
    pub days_to_revert: Option<f32>,
}

impl CodeChange {
    /// Creates a new code change with a default `Success` outcome.
    #[must_use]
    pub fn new(
        commit_sha: impl Into<String>,
        files_changed: BTreeSet<String>,
        diff_stats: DiffStats,
        timestamp: i64,
        author: impl Into<String>,
    ) -> Self {
        Self {
            id: CodeChangeId::generate(),
            commit_sha: commit_sha.into(),
            files_changed,
            diff_stats,
            timestamp,
            author: author.into(),
            decision_id: None,
            outcome: ChangeOutcome::Success,
            reverting_change_id: None,
            days_to_revert: None,
        }
    }

    /// Links this change to the decision it implements.
    pub fn link_decision(&mut self, decision_id: DecisionId) {
        self.decision_id = Some(decision_id);
    }

    /// Records that this change was reverted by `reverting_change_id` at
    /// `revert_timestamp`.
    pub fn mark_reverted(&mut self, reverting_change_id: CodeChangeId, revert_timestamp: i64) {
        self.outcome = ChangeOutcome::Reverted;
        self.reverting_change_id = Some(reverting_change_id);
        let secs = (revert_timestamp - self.timestamp).max(0) as f32;
        self.days_to_revert = Some(secs / 86_400.0);
    }
}

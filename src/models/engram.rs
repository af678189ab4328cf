//! Engram node: a session checkpoint bound to a commit.

use crate::models::ids::EngramId;
use serde::{Deserialize, Serialize};

/// Counts captured at the moment an Engram was created.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngramCounts {
    /// Decisions extracted during the session.
    pub decisions_extracted: u32,
    /// Files touched by the accompanying commit.
    pub files_changed: u32,
    /// Lines added by the accompanying commit.
    pub lines_added: u32,
    /// Lines removed by the accompanying commit.
    pub lines_removed: u32,
}

/// A session checkpoint: immutable once created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Engram {
    /// Unique identifier.
    pub id: EngramId,
    /// Session this checkpoint closes out.
    pub session_id: String,
    /// Commit SHA the session produced.
    pub commit_sha: String,
    /// Commit message.
    pub commit_message: String,
    /// Branch the commit landed on.
    pub branch: String,
    /// Creation timestamp (seconds since epoch).
    pub created_at: i64,
    /// Session duration in seconds.
    pub session_duration_secs: u64,
    /// Agent type that drove the session (e.g. "claude-code").
    pub agent_type: String,
    /// Agent model identifier.
    pub agent_model: String,
    /// Counts captured at creation time.
    pub counts: EngramCounts,
}

impl Engram {
    /// Creates a new Engram node.
    #[must_use]
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        session_id: impl Into<String>,
        commit_sha: impl Into<String>,
        commit_message: impl Into<String>,
        branch: impl Into<String>,
        created_at: i64,
        session_duration_secs: u64,
        agent_type: impl Into<String>,
        agent_model: impl Into<String>,
        counts: EngramCounts,
    ) -> Self {
        Self {
            id: EngramId::generate(),
            session_id: session_id.into(),
            commit_sha: commit_sha.into(),
            commit_message: commit_message.into(),
            branch: branch.into(),
            created_at,
            session_duration_secs,
            agent_type: agent_type.into(),
            agent_model: agent_model.into(),
            counts,
        }
    }
}

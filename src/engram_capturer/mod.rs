//! Engram Capturer: turns a commit event into an Engram node, best-effort
//! linked to the Decisions and session that produced it (spec §4.4).

use crate::graph::GraphStore;
use crate::models::{
    CodeChange, DiffStats, Engram, EngramCounts, NodeRef, Relationship, RelationshipType,
};
use crate::Result;
use std::collections::BTreeSet;

/// How far back a commit may reach to claim a session's Decisions (spec
/// §4.4: "recent (<= 24h)").
const SESSION_WINDOW_SECS: i64 = 24 * 60 * 60;

/// Raw facts about a commit, as reported by the `ingest-commit` CLI command
/// or the tool endpoint's `capture_session` handler.
#[derive(Debug, Clone)]
pub struct CommitEvent {
    /// Commit SHA.
    pub sha: String,
    /// Branch the commit landed on.
    pub branch: String,
    /// Commit message.
    pub message: String,
    /// Commit author.
    pub author: String,
    /// Commit timestamp (seconds since epoch).
    pub timestamp: i64,
    /// Paths touched by the commit.
    pub files_changed: BTreeSet<String>,
    /// Line-level diff statistics.
    pub diff_stats: DiffStats,
    /// Session id that produced this commit, if known.
    pub session_id: Option<String>,
    /// Session duration in seconds, if known.
    pub session_duration_secs: u64,
    /// Agent type that drove the session (e.g. "claude-code").
    pub agent_type: String,
    /// Agent model identifier.
    pub agent_model: String,
}

/// Outcome of one [`EngramCapturer::capture`] call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureResult {
    /// The Engram node that was created (creation never fails silently;
    /// linking does).
    pub engram_id: crate::models::EngramId,
    /// The CodeChange node created for this commit.
    pub code_change_id: crate::models::CodeChangeId,
    /// Decisions this commit was linked to by session-window lookup.
    pub linked_decisions: usize,
}

/// Ingests commit events into Engram/CodeChange nodes.
pub struct EngramCapturer<'a> {
    graph: &'a dyn GraphStore,
}

impl<'a> EngramCapturer<'a> {
    /// Creates a new capturer over the given graph store.
    #[must_use]
    pub fn new(graph: &'a dyn GraphStore) -> Self {
        Self { graph }
    }

    /// Captures a commit event: always creates the Engram and CodeChange
    /// nodes; best-effort links the CodeChange (and any Decisions found in
    /// the session window) to each other. A failure during linking is
    /// logged and does not prevent the Engram node's creation (spec §4.4).
    ///
    /// # Errors
    ///
    /// Returns an error only if the Engram node itself cannot be persisted.
    pub fn capture(&self, event: &CommitEvent) -> Result<CaptureResult> {
        let engram = Engram::new(
            event.session_id.clone().unwrap_or_default(),
            event.sha.clone(),
            event.message.clone(),
            event.branch.clone(),
            event.timestamp,
            event.session_duration_secs,
            event.agent_type.clone(),
            event.agent_model.clone(),
            EngramCounts {
                decisions_extracted: 0,
                files_changed: u32::try_from(event.files_changed.len()).unwrap_or(u32::MAX),
                lines_added: event.diff_stats.added,
                lines_removed: event.diff_stats.removed,
            },
        );
        self.graph.put_engram(&engram)?;

        let code_change = CodeChange::new(
            event.sha.clone(),
            event.files_changed.clone(),
            event.diff_stats,
            event.timestamp,
            event.author.clone(),
        );

        let mut result = CaptureResult {
            engram_id: engram.id.clone(),
            code_change_id: code_change.id.clone(),
            linked_decisions: 0,
        };

        if let Err(err) = self.graph.put_code_change(&code_change) {
            tracing::warn!(error = %err, sha = %event.sha, "failed to persist code change for commit");
            return Ok(result);
        }

        if let Err(err) = self.graph.put_relationship(&Relationship::new(
            NodeRef::Engram(engram.id.clone()),
            NodeRef::CodeChange(code_change.id.clone()),
            RelationshipType::MadeIn,
            event.timestamp,
        )) {
            tracing::warn!(error = %err, sha = %event.sha, "failed to link engram to code change");
        }

        let Some(session_id) = event.session_id.as_deref() else {
            return Ok(result);
        };

        match self.graph.list_decisions_by_session_window(
            session_id,
            event.timestamp - SESSION_WINDOW_SECS,
            event.timestamp,
        ) {
            Ok(decisions) => {
                for decision in decisions {
                    let linked = self
                        .graph
                        .put_relationship(&Relationship::new(
                            NodeRef::Decision(decision.id.clone()),
                            NodeRef::CodeChange(code_change.id.clone()),
                            RelationshipType::ImplementedIn,
                            event.timestamp,
                        ))
                        .is_ok();
                    if linked {
                        result.linked_decisions += 1;
                    } else {
                        tracing::warn!(
                            decision_id = %decision.id,
                            sha = %event.sha,
                            "failed to link decision to code change"
                        );
                    }
                }
            },
            Err(err) => {
                tracing::warn!(error = %err, session_id, "failed to look up session decisions for commit");
            },
        }

        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::memory::InMemoryGraphStore;
    use crate::models::{Decision, Module};

    fn sample_event(session_id: Option<String>) -> CommitEvent {
        CommitEvent {
            sha: "abc123".to_string(),
            branch: "main".to_string(),
            message: "fix retry logic".to_string(),
            author: "dev".to_string(),
            timestamp: 10_000,
            files_changed: BTreeSet::from(["src/lib.rs".to_string()]),
            diff_stats: DiffStats {
                added: 10,
                removed: 2,
                modified: 1,
            },
            session_id,
            session_duration_secs: 600,
            agent_type: "claude-code".to_string(),
            agent_model: "claude".to_string(),
        }
    }

    #[test]
    fn capture_always_creates_engram_and_code_change() {
        let graph = InMemoryGraphStore::new();
        let capturer = EngramCapturer::new(&graph);
        let result = capturer.capture(&sample_event(None)).unwrap();

        assert!(graph.get_engram(&result.engram_id).unwrap().is_some());
        assert!(graph.get_code_change(&result.code_change_id).unwrap().is_some());
        assert_eq!(result.linked_decisions, 0);
    }

    #[test]
    fn capture_links_decisions_within_session_window() {
        let graph = InMemoryGraphStore::new();
        let mut decision = Decision::new("use retries", vec![], 0.7, Module::Backend, "sess-1", 9_000);
        decision = decision.with_session("sess-1".to_string());
        graph.put_decision(&decision).unwrap();

        let capturer = EngramCapturer::new(&graph);
        let result = capturer.capture(&sample_event(Some("sess-1".to_string()))).unwrap();

        assert_eq!(result.linked_decisions, 1);
    }

    #[test]
    fn capture_ignores_decisions_outside_the_session_window() {
        let graph = InMemoryGraphStore::new();
        let mut decision = Decision::new("use retries", vec![], 0.7, Module::Backend, "sess-1", 9_000);
        decision = decision.with_session("sess-1".to_string());
        graph.put_decision(&decision).unwrap();

        let mut event = sample_event(Some("sess-1".to_string()));
        event.timestamp = 9_000 + SESSION_WINDOW_SECS + 1;

        let capturer = EngramCapturer::new(&graph);
        let result = capturer.capture(&event).unwrap();
        assert_eq!(result.linked_decisions, 0);
    }
}

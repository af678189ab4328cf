//! The Signal Queue and Extraction Cache: durable state owned by the L2/L3
//! pipeline, rebuilt from the graph only on explicit repair (spec §6).

pub mod memory;
pub mod sqlite;

use crate::Result;
use crate::models::{DecisionId, Module};
use serde::{Deserialize, Serialize};

/// Lifecycle state of a queued signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SignalStatus {
    /// Awaiting extraction.
    Pending,
    /// Claimed by an in-flight extraction batch.
    Extracting,
    /// Successfully turned into a Decision node.
    Extracted,
    /// Extraction attempt failed; eligible for retry at `next_retry_at`.
    Failed,
    /// Exhausted retry attempts; will not be retried again.
    Dead,
}

impl SignalStatus {
    /// Canonical lowercase name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Extracting => "extracting",
            Self::Extracted => "extracted",
            Self::Failed => "failed",
            Self::Dead => "dead",
        }
    }
}

/// Maximum extraction attempts before a signal is marked `dead` (spec §4.3).
pub const MAX_ATTEMPTS: u32 = 5;
/// Backoff cap, in seconds: 24 hours (spec §4.3).
pub const MAX_BACKOFF_SECS: i64 = 24 * 60 * 60;
/// Base backoff unit, in seconds, before exponential growth.
const BASE_BACKOFF_SECS: i64 = 30;

/// Returns the retry delay, in seconds, for the given 1-based attempt
/// count, exponential with a 24h cap.
#[must_use]
pub fn backoff_seconds(attempts: u32) -> i64 {
    let exp = attempts.saturating_sub(1).min(20);
    let delay = BASE_BACKOFF_SECS.saturating_mul(1_i64 << exp);
    delay.min(MAX_BACKOFF_SECS)
}

/// A candidate decision surfaced by the Signal Detector (L2), awaiting
/// batch extraction (L3).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Signal {
    /// Unique identifier.
    pub id: crate::models::SignalId,
    /// Excerpt of the originating prompt.
    pub source_prompt: String,
    /// Excerpt of the originating response.
    pub source_response: String,
    /// Names of the lexical patterns that matched (spec §4.2).
    pub patterns: Vec<String>,
    /// Inferred module tag.
    pub module: Module,
    /// Current lifecycle state.
    pub status: SignalStatus,
    /// Number of extraction attempts made so far.
    pub attempts: u32,
    /// Earliest time a retry may be attempted, if `status == Failed`.
    pub next_retry_at: Option<i64>,
    /// Creation timestamp (seconds since epoch).
    pub created_at: i64,
}

impl Signal {
    /// Creates a new pending signal.
    #[must_use]
    pub fn new(
        source_prompt: impl Into<String>,
        source_response: impl Into<String>,
        patterns: Vec<String>,
        module: Module,
        created_at: i64,
    ) -> Self {
        Self {
            id: crate::models::SignalId::generate(),
            source_prompt: source_prompt.into(),
            source_response: source_response.into(),
            patterns,
            module,
            status: SignalStatus::Pending,
            attempts: 0,
            next_retry_at: None,
            created_at,
        }
    }

    /// Records a failed extraction attempt, scheduling a retry or marking
    /// the signal `dead` once [`MAX_ATTEMPTS`] is exceeded.
    pub fn record_failure(&mut self, now: i64) {
        self.attempts += 1;
        if self.attempts >= MAX_ATTEMPTS {
            self.status = SignalStatus::Dead;
            self.next_retry_at = None;
        } else {
            self.status = SignalStatus::Failed;
            self.next_retry_at = Some(now + backoff_seconds(self.attempts));
        }
    }

    /// Marks the signal as successfully extracted.
    pub fn record_success(&mut self) {
        self.status = SignalStatus::Extracted;
        self.next_retry_at = None;
    }

    /// Returns true if this signal is due for a dequeue at `now`: either
    /// fresh (`Pending`) or past its backoff window (`Failed`).
    #[must_use]
    pub fn is_due(&self, now: i64) -> bool {
        match self.status {
            SignalStatus::Pending => true,
            SignalStatus::Failed => self.next_retry_at.is_none_or(|t| t <= now),
            SignalStatus::Extracting | SignalStatus::Extracted | SignalStatus::Dead => false,
        }
    }
}

/// Durable storage for pending L2 signals and their extraction lifecycle.
///
/// Implementors must use interior mutability so the queue can be shared
/// via `Arc<dyn SignalQueue>` across the endpoint and extractor tasks.
pub trait SignalQueue: Send + Sync {
    /// Enqueues a freshly detected signal.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails.
    fn enqueue(&self, signal: &Signal) -> Result<()>;

    /// Dequeues up to `limit` signals due at `now`, atomically transitioning
    /// them to `Extracting` so concurrent extractor ticks don't double-claim
    /// the same batch.
    ///
    /// # Errors
    ///
    /// Returns an error if the operation fails.
    fn dequeue_batch(&self, limit: usize, now: i64) -> Result<Vec<Signal>>;

    /// Persists the (presumably mutated) signal back to the store.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails.
    fn update(&self, signal: &Signal) -> Result<()>;

    /// Looks up a signal by id.
    ///
    /// # Errors
    ///
    /// Returns an error if the lookup fails.
    fn get(&self, id: &crate::models::SignalId) -> Result<Option<Signal>>;

    /// Counts signals by status, for health reporting.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    fn count_by_status(&self, status: SignalStatus) -> Result<usize>;
}

/// Durable fingerprint -> decision id index used by the Batch Extractor to
/// skip signals that would duplicate an already-extracted Decision (spec
/// §4.3, §8 idempotence property).
pub trait ExtractionCache: Send + Sync {
    /// Looks up the decision already extracted for `fingerprint`, if any.
    ///
    /// # Errors
    ///
    /// Returns an error if the lookup fails.
    fn get(&self, fingerprint: &str) -> Result<Option<DecisionId>>;

    /// Records that `fingerprint` produced `decision_id`. Idempotent:
    /// inserting the same fingerprint twice with the same decision id is a
    /// no-op; a different decision id is an error (fingerprints must not
    /// be reassigned).
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails or the fingerprint is already
    /// mapped to a different decision.
    fn put(&self, fingerprint: &str, decision_id: &DecisionId) -> Result<()>;
}

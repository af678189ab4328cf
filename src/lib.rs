//! # Membria
//!
//! A decision-memory daemon for AI coding assistants.
//!
//! Membria watches coding sessions for decisions (explicit or inferred from
//! conversational signals), tracks their outcomes over time, and surfaces
//! calibrated context — past plans, known failure modes, distilled skills —
//! back to the assistant before and during planning.
//!
//! ## Layers
//!
//! - A tool protocol endpoint (newline-delimited JSON over stdio) exposing
//!   nine operations to the calling assistant.
//! - A signal detector (L2) that finds decision-shaped language in prompts
//!   and responses without an LLM call.
//! - A batch extractor (L3) that turns queued signals into Decision nodes
//!   via an external LLM.
//! - A graph store of Decisions, Engrams, CodeChanges, Outcomes,
//!   NegativeKnowledge, AntiPatterns, and Skills, connected by typed edges.
//! - Calibration, plan validation, bias analysis, and skill generation
//!   services that consume and enrich that graph.

#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

use thiserror::Error as ThisError;

pub mod bias;
pub mod calibration;
pub mod cli;
pub mod config;
pub mod detector;
pub mod engram_capturer;
pub mod extractor;
pub mod graph;
pub mod llm;
pub mod models;
pub mod observability;
pub mod plan;
pub mod protocol;
pub mod queue;
pub mod scheduler;
pub mod skill;

pub use config::MembriaConfig;
pub use models::decision::Module;

/// Error type for Membria operations.
///
/// Mirrors the error taxonomy in the tool protocol: every variant here maps
/// to a stable wire `code` at the protocol boundary (see
/// [`crate::protocol::error_code`]).
#[derive(Debug, ThisError)]
pub enum Error {
    /// Argument shape, type, or range invalid. Caller-fixable; never retried.
    #[error("validation failed: {0}")]
    Validation(String),

    /// Invalid input was provided (construction-time rejection below the
    /// protocol boundary, e.g. in model constructors).
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Referenced entity does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// Attempted to transition a Decision that is already terminal.
    #[error("decision {0} is already terminal")]
    AlreadyTerminal(String),

    /// The graph backend is transiently unavailable.
    #[error("graph store unavailable: {0}")]
    GraphUnavailable(String),

    /// The external LLM could not be reached.
    #[error("llm unavailable: {0}")]
    LlmUnavailable(String),

    /// The external LLM rejected the request due to quota.
    #[error("llm quota exceeded: {0}")]
    LlmQuota(String),

    /// The external LLM's response could not be parsed as expected.
    #[error("llm response malformed: {0}")]
    LlmMalformed(String),

    /// An operation exceeded its allotted time budget.
    #[error("operation timed out: {0}")]
    Timeout(String),

    /// An inbound protocol frame exceeded the configured size limit.
    #[error("frame too large: {0} bytes (limit {1})")]
    FrameTooLarge(usize, usize),

    /// Malformed inbound framing that is not a size violation.
    #[error("protocol error: {0}")]
    ProtocolError(String),

    /// The endpoint is shutting down and is refusing new calls.
    #[error("shutting down")]
    ShuttingDown,

    /// A generic operation failed with an underlying cause (storage I/O,
    /// configuration, or other infrastructure failures that don't fit a more
    /// specific variant above).
    #[error("operation '{operation}' failed: {cause}")]
    OperationFailed {
        /// The operation that failed.
        operation: String,
        /// The underlying cause.
        cause: String,
    },
}

impl From<rusqlite::Error> for Error {
    fn from(err: rusqlite::Error) -> Self {
        Self::GraphUnavailable(err.to_string())
    }
}

/// Result type alias for Membria operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Returns the current Unix timestamp in seconds.
///
/// Centralized so every layer (model constructors, queue retries,
/// scheduler ticks) stamps time the same way.
#[must_use]
pub fn current_timestamp() -> i64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_matches_protocol_wording() {
        let err = Error::Validation("confidence out of range".to_string());
        assert_eq!(err.to_string(), "validation failed: confidence out of range");

        let err = Error::AlreadyTerminal("dec_abc".to_string());
        assert_eq!(err.to_string(), "decision dec_abc is already terminal");

        let err = Error::FrameTooLarge(2_000_000, 1_048_576);
        assert_eq!(err.to_string(), "frame too large: 2000000 bytes (limit 1048576)");
    }

    #[test]
    fn current_timestamp_is_positive() {
        assert!(current_timestamp() > 0);
    }
}

//! Outcome node: a measurement of a CodeChange result.

use crate::models::ids::{CodeChangeId, OutcomeId};
use crate::{Error, Result};
use serde::{Deserialize, Serialize};

/// Status of a measured outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutcomeStatus {
    /// Fully succeeded.
    Success,
    /// Fully failed.
    Failure,
    /// Mixed result.
    Partial,
}

/// A measurement of a [`crate::models::code_change::CodeChange`] result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Outcome {
    /// Unique identifier.
    pub id: OutcomeId,
    /// Overall status.
    pub status: OutcomeStatus,
    /// Free-text supporting evidence.
    pub evidence: String,
    /// When this measurement was taken (seconds since epoch).
    pub measured_at: i64,
    /// Performance impact; `1.0` is baseline.
    pub performance_impact: f32,
    /// Reliability in `[0, 1]`.
    pub reliability: f32,
    /// Maintenance cost in `[0, 1]`.
    pub maintenance_cost: f32,
    /// The code change this outcome measures.
    pub code_change_id: CodeChangeId,
}

impl Outcome {
    /// Creates a new outcome measurement.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Validation`] if `measured_at` precedes
    /// `change_timestamp` (the bitemporal invariant in spec §3: a
    /// measurement cannot predate the thing it measures).
    pub fn new(
        status: OutcomeStatus,
        evidence: impl Into<String>,
        measured_at: i64,
        change_timestamp: i64,
        performance_impact: f32,
        reliability: f32,
        maintenance_cost: f32,
        code_change_id: CodeChangeId,
    ) -> Result<Self> {
        if measured_at < change_timestamp {
            return Err(Error::Validation(format!(
                "outcome measured_at ({measured_at}) precedes code change timestamp ({change_timestamp})"
            )));
        }
        Ok(Self {
            id: OutcomeId::generate(),
            status,
            evidence: evidence.into(),
            measured_at,
            performance_impact,
            reliability: reliability.clamp(0.0, 1.0),
            maintenance_cost: maintenance_cost.clamp(0.0, 1.0),
            code_change_id,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn measured_at_before_change_timestamp_is_rejected() {
        let err = Outcome::new(
            OutcomeStatus::Success,
            "looks fine",
            100,
            200,
            1.0,
            0.9,
            0.1,
            CodeChangeId::generate(),
        )
        .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[test]
    fn valid_outcome_clamps_bounded_fields() {
        let o = Outcome::new(
            OutcomeStatus::Partial,
            "mixed bag",
            200,
            100,
            1.1,
            1.5,
            -0.2,
            CodeChangeId::generate(),
        )
        .unwrap();
        assert_eq!(o.reliability, 1.0);
        assert_eq!(o.maintenance_cost, 0.0);
    }
}

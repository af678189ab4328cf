//! Bias Analyzer: scores a decision's reasoning text for known cognitive
//! bias patterns and recommends a remediation (spec §4.10).

use regex::Regex;
use std::sync::LazyLock;

/// The cognitive biases this analyzer detects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Bias {
    /// Fixating on the first idea considered.
    Anchoring,
    /// Weighing only evidence that supports the existing conclusion.
    Confirmation,
    /// Declaring certainty disproportionate to the evidence.
    Overconfidence,
    /// Continuing because of resources already spent, not merit.
    SunkCost,
    /// No (or only one) alternative was considered.
    LackOfAlternatives,
    /// Declared confidence exceeds the domain's historical success rate.
    ConfidenceRealityGap,
}

impl Bias {
    /// The fixed remediation recommendation for this bias (spec §4.10).
    #[must_use]
    pub const fn remediation(self) -> &'static str {
        match self {
            Self::Anchoring | Self::Confirmation => "devil's advocate",
            Self::Overconfidence | Self::ConfidenceRealityGap => "premortem",
            Self::SunkCost => "cool-off",
            Self::LackOfAlternatives => "generate-alternatives",
        }
    }
}

/// Severity bucket derived from the overall risk score.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// `risk_score > 0.6`.
    High,
    /// `risk_score > 0.3`.
    Medium,
    /// Otherwise.
    Low,
}

struct LexicalBias {
    bias: Bias,
    regex: Regex,
    weight: f32,
}

#[allow(clippy::expect_used)]
static LEXICAL_BIASES: LazyLock<Vec<LexicalBias>> = LazyLock::new(|| {
    vec![
        LexicalBias {
            bias: Bias::Anchoring,
            regex: Regex::new(r"(?i)first idea|initial proposal|stick with")
                .expect("anchoring pattern must compile"),
            weight: 0.15,
        },
        LexicalBias {
            bias: Bias::Confirmation,
            regex: Regex::new(r"(?i)only evidence for|ignore negative")
                .expect("confirmation pattern must compile"),
            weight: 0.20,
        },
        LexicalBias {
            bias: Bias::Overconfidence,
            regex: Regex::new(r"(?i)definitely|obviously|\bmust\b|guaranteed")
                .expect("overconfidence pattern must compile"),
            weight: 0.25,
        },
        LexicalBias {
            bias: Bias::SunkCost,
            regex: Regex::new(r"(?i)invested|can't waste|already started")
                .expect("sunk cost pattern must compile"),
            weight: 0.20,
        },
    ]
});

/// One detected bias and the weight it contributed to the risk score.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DetectedBias {
    /// The bias detected.
    pub bias: Bias,
    /// Its contribution to the overall risk score.
    pub weight: f32,
}

/// Result of analyzing one decision's reasoning for bias.
#[derive(Debug, Clone, PartialEq)]
pub struct BiasReport {
    /// Every bias detected, with its contributed weight.
    pub detected: Vec<DetectedBias>,
    /// Sum of contributed weights, capped at 1.0.
    pub risk_score: f32,
    /// Severity bucket derived from `risk_score`.
    pub severity: Severity,
    /// Deduplicated remediation recommendations for the detected biases, in
    /// detection order.
    pub recommendations: Vec<&'static str>,
}

/// Analyzes a decision's reasoning text (and alternatives, and domain
/// calibration) for cognitive bias patterns.
///
/// # Arguments
///
/// - `text`: the decision statement plus reasoning, concatenated.
/// - `alternatives`: alternatives considered for the decision.
/// - `declared_confidence`: the decision's stated confidence in `[0, 1]`.
/// - `domain_success_rate`: the domain's current calibrated success rate.
#[must_use]
pub fn analyze(
    text: &str,
    alternatives: &[String],
    declared_confidence: f32,
    domain_success_rate: f64,
) -> BiasReport {
    let mut detected = Vec::new();

    for lexical in LEXICAL_BIASES.iter() {
        if lexical.regex.is_match(text) {
            detected.push(DetectedBias {
                bias: lexical.bias,
                weight: lexical.weight,
            });
        }
    }

    if alternatives.len() <= 1 {
        detected.push(DetectedBias {
            bias: Bias::LackOfAlternatives,
            weight: 0.15,
        });
    }

    let gap = f64::from(declared_confidence) - domain_success_rate;
    if gap > 0.2 {
        #[allow(clippy::cast_possible_truncation)]
        let weight = (gap * 0.5) as f32;
        detected.push(DetectedBias {
            bias: Bias::ConfidenceRealityGap,
            weight,
        });
    }

    let risk_score = detected.iter().map(|d| d.weight).sum::<f32>().min(1.0);
    let severity = if risk_score > 0.6 {
        Severity::High
    } else if risk_score > 0.3 {
        Severity::Medium
    } else {
        Severity::Low
    };

    let mut recommendations = Vec::new();
    for d in &detected {
        let remediation = d.bias.remediation();
        if !recommendations.contains(&remediation) {
            recommendations.push(remediation);
        }
    }

    BiasReport {
        detected,
        risk_score,
        severity,
        recommendations,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_overconfidence_sunk_cost_and_lack_of_alternatives() {
        let report = analyze(
            "We must definitely use NoSQL, it's obviously the right choice, \
             our team has invested too much to change now",
            &[],
            0.5,
            0.5,
        );
        assert!(report.risk_score >= 0.6);
        assert_eq!(report.severity, Severity::High);
        assert!(report.recommendations.contains(&"cool-off"));
        assert!(report.recommendations.contains(&"generate-alternatives"));
    }

    #[test]
    fn clean_statement_with_alternatives_is_low_severity() {
        let report = analyze(
            "After comparing Postgres and MongoDB, Postgres fits our access patterns better",
            &["MongoDB".to_string(), "DynamoDB".to_string()],
            0.6,
            0.55,
        );
        assert!(report.detected.is_empty());
        assert_eq!(report.severity, Severity::Low);
    }

    #[test]
    fn confidence_reality_gap_is_weighted_by_the_gap_size() {
        let report = analyze("plain statement", &["a".to_string(), "b".to_string()], 0.95, 0.5);
        assert_eq!(report.detected.len(), 1);
        assert_eq!(report.detected[0].bias, Bias::ConfidenceRealityGap);
        assert!((report.detected[0].weight - 0.225).abs() < 1e-3);
    }

    #[test]
    fn risk_score_is_capped_at_one() {
        let report = analyze(
            "first idea only evidence for definitely invested",
            &[],
            0.99,
            0.1,
        );
        assert!(report.risk_score <= 1.0);
    }
}

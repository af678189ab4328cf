//! Plan Context Builder and Plan Validator: the Plan-Mode subsystem (spec
//! §4.5, §4.6).

use crate::graph::GraphStore;
use crate::models::{
    CalibrationProfile, Decision, DecisionOutcome, Engram, Module, Severity,
};
use crate::Result;
use regex::Regex;
use std::collections::HashSet;
use std::sync::LazyLock;

/// Characters per token used for the plan packet's budget estimate (spec
/// §4.5).
const CHARS_PER_TOKEN: usize = 4;

#[allow(clippy::expect_used)]
static STOP_WORDS: LazyLock<HashSet<&'static str>> = LazyLock::new(|| {
    [
        "a", "an", "the", "and", "or", "but", "in", "on", "at", "to", "for", "of", "with", "by",
        "from", "as", "is", "was", "are", "were", "be", "been", "have", "has", "had", "do",
        "does", "did", "will", "would", "could", "should", "this", "that", "these", "those",
        "it", "its", "we", "our", "i",
    ]
    .into_iter()
    .collect()
});

fn tokenize(text: &str) -> HashSet<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .map(str::to_lowercase)
        .filter(|w| !w.is_empty() && !STOP_WORDS.contains(w.as_str()))
        .collect()
}

fn jaccard(a: &HashSet<String>, b: &HashSet<String>) -> f64 {
    if a.is_empty() && b.is_empty() {
        return 0.0;
    }
    let intersection = a.intersection(b).count();
    let union = a.union(b).count();
    #[allow(clippy::cast_precision_loss)]
    {
        intersection as f64 / union as f64
    }
}

/// Top-3 content words of a string, case-folded and stop-word filtered, in
/// no particular order, used by the past-failure keyword overlap check.
fn top_content_words(text: &str, limit: usize) -> HashSet<String> {
    tokenize(text).into_iter().take(limit).collect()
}

/// Summary of one past planning session, recovered from a plan Engram (a
/// checkpoint created by `record_plan` with an empty `commit_sha`, as
/// opposed to a commit Engram).
#[derive(Debug, Clone, PartialEq)]
pub struct PastPlanSummary {
    /// Number of steps the plan had.
    pub step_count: u32,
    /// The duration the plan was estimated to take, as recorded at
    /// `record_plan` time.
    pub duration_estimate_secs: u64,
    /// How long the plan actually took, if its steps have all resolved.
    pub actual_duration_secs: Option<i64>,
    /// How many of the plan's steps ended up `reworked`.
    pub rework_count: u32,
}

/// A Decision in the domain that did not pan out, surfaced as a failed
/// approach to avoid repeating (spec §4.5).
#[derive(Debug, Clone, PartialEq)]
pub struct FailedApproach {
    /// The decision's statement.
    pub statement: String,
    /// How it ended.
    pub outcome: DecisionOutcome,
}

/// A cluster of successful Decisions sharing a normalized statement
/// fingerprint (spec §4.5).
#[derive(Debug, Clone, PartialEq)]
pub struct SuccessfulPattern {
    /// One representative statement for the cluster.
    pub statement: String,
    /// How many successful Decisions share this fingerprint.
    pub sample_size: u32,
}

/// The assembled PRE-PLAN context packet (spec §4.5, §4.7).
#[derive(Debug, Clone, PartialEq)]
pub struct PlanContextPacket {
    /// Domain the packet was built for.
    pub domain: Module,
    /// Up to 3 past plans, most recent first.
    pub past_plans: Vec<PastPlanSummary>,
    /// Up to 5 failed approaches.
    pub failed_approaches: Vec<FailedApproach>,
    /// Up to 5 successful patterns.
    pub successful_patterns: Vec<SuccessfulPattern>,
    /// The domain's calibration snapshot, if not dropped for budget.
    pub calibration: Option<CalibrationProfile>,
    /// Configured project constraints, if not dropped for budget.
    pub project_constraints: Vec<String>,
    /// Markdown rendering of everything retained above.
    pub markdown: String,
}

/// Sections dropped in this order when the packet exceeds its token budget,
/// least to most essential (spec §4.5: "past plans first ... calibration
/// second-to-last ... project constraints last").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Section {
    PastPlans,
    FailedApproaches,
    SuccessfulPatterns,
    Calibration,
    ProjectConstraints,
}

const DROP_ORDER: [Section; 5] = [
    Section::PastPlans,
    Section::FailedApproaches,
    Section::SuccessfulPatterns,
    Section::Calibration,
    Section::ProjectConstraints,
];

/// Assembles PRE-PLAN context packets from the reasoning graph.
pub struct PlanContextBuilder<'a> {
    graph: &'a dyn GraphStore,
}

impl<'a> PlanContextBuilder<'a> {
    /// Creates a new builder over the given graph store.
    #[must_use]
    pub fn new(graph: &'a dyn GraphStore) -> Self {
        Self { graph }
    }

    /// Builds a plan context packet for `domain`, dropping sections as
    /// needed to fit `max_tokens` (estimated at 4 chars/token).
    ///
    /// # Errors
    ///
    /// Returns an error if the graph store query fails.
    pub fn build(
        &self,
        domain: Module,
        scope: &str,
        project_constraints: &[String],
        max_tokens: usize,
    ) -> Result<PlanContextPacket> {
        let past_plans = self.past_plans(domain)?;
        let failed_approaches = self.failed_approaches(domain)?;
        let successful_patterns = self.successful_patterns(domain)?;
        let calibration = self.graph.get_calibration(domain)?;

        let mut included: HashSet<Section> = DROP_ORDER.iter().copied().collect();
        let budget_chars = max_tokens * CHARS_PER_TOKEN;

        loop {
            let packet = render(
                domain,
                scope,
                &past_plans,
                &failed_approaches,
                &successful_patterns,
                &calibration,
                project_constraints,
                &included,
            );
            if packet.markdown.len() <= budget_chars {
                return Ok(packet);
            }
            let Some(&next_drop) = DROP_ORDER.iter().find(|s| included.contains(s)) else {
                return Ok(packet);
            };
            included.remove(&next_drop);
        }
    }

    fn past_plans(&self, domain: Module) -> Result<Vec<PastPlanSummary>> {
        let engrams: Vec<Engram> = self
            .graph
            .list_engrams()?
            .into_iter()
            .filter(|e| e.commit_sha.is_empty())
            .take(3)
            .collect();

        let mut summaries = Vec::with_capacity(engrams.len());
        for engram in engrams {
            let steps = self.graph.list_decisions_by_session_window(
                &engram.session_id,
                engram.created_at,
                engram.created_at + i64::from(i32::MAX),
            )?;
            let domain_steps: Vec<&Decision> =
                steps.iter().filter(|d| d.module == domain).collect();
            let rework_count =
                u32::try_from(domain_steps.iter().filter(|d| d.outcome == DecisionOutcome::Reworked).count())
                    .unwrap_or(u32::MAX);
            let actual_duration_secs = if domain_steps.is_empty() {
                None
            } else if domain_steps.iter().all(|d| d.resolved_at.is_some()) {
                domain_steps.iter().filter_map(|d| d.resolved_at).max().map(|t| t - engram.created_at)
            } else {
                None
            };
            summaries.push(PastPlanSummary {
                step_count: engram.counts.decisions_extracted,
                duration_estimate_secs: engram.session_duration_secs,
                actual_duration_secs,
                rework_count,
            });
        }
        Ok(summaries)
    }

    fn failed_approaches(&self, domain: Module) -> Result<Vec<FailedApproach>> {
        let mut decisions = self.graph.list_decisions(Some(domain), None)?;
        decisions.retain(|d| matches!(d.outcome, DecisionOutcome::Failure | DecisionOutcome::Reworked));
        decisions.sort_by_key(|d| std::cmp::Reverse(d.resolved_at.unwrap_or(d.created_at)));
        decisions.truncate(5);
        Ok(decisions
            .into_iter()
            .map(|d| FailedApproach {
                statement: d.statement,
                outcome: d.outcome,
            })
            .collect())
    }

    fn successful_patterns(&self, domain: Module) -> Result<Vec<SuccessfulPattern>> {
        let mut decisions = self.graph.list_decisions(Some(domain), Some(DecisionOutcome::Success))?;
        decisions.sort_by_key(|d| std::cmp::Reverse(d.resolved_at.unwrap_or(d.created_at)));

        let mut clusters: std::collections::HashMap<String, (String, u32)> =
            std::collections::HashMap::new();
        for decision in decisions {
            let key = crate::models::fingerprint::normalized_key(&decision.statement, domain);
            let entry = clusters.entry(key).or_insert_with(|| (decision.statement.clone(), 0));
            entry.1 += 1;
        }
        let mut patterns: Vec<SuccessfulPattern> = clusters
            .into_values()
            .map(|(statement, sample_size)| SuccessfulPattern {
                statement,
                sample_size,
            })
            .collect();
        patterns.sort_by_key(|p| std::cmp::Reverse(p.sample_size));
        patterns.truncate(5);
        Ok(patterns)
    }
}

#[allow(clippy::too_many_arguments)]
fn render(
    domain: Module,
    scope: &str,
    past_plans: &[PastPlanSummary],
    failed_approaches: &[FailedApproach],
    successful_patterns: &[SuccessfulPattern],
    calibration: &CalibrationProfile,
    project_constraints: &[String],
    included: &HashSet<Section>,
) -> PlanContextPacket {
    let mut md = if scope.is_empty() {
        format!("# Plan context: {domain}\n\n")
    } else {
        format!("# Plan context: {domain} ({scope})\n\n")
    };

    if included.contains(&Section::PastPlans) && !past_plans.is_empty() {
        md.push_str("## Past plans\n\n");
        for plan in past_plans {
            md.push_str(&format!(
                "- {} steps, estimated {}s, rework {}\n",
                plan.step_count, plan.duration_estimate_secs, plan.rework_count
            ));
        }
        md.push('\n');
    }

    if included.contains(&Section::FailedApproaches) && !failed_approaches.is_empty() {
        md.push_str("## Failed approaches\n\n");
        for f in failed_approaches {
            md.push_str(&format!("- ({}) {}\n", f.outcome, f.statement));
        }
        md.push('\n');
    }

    if included.contains(&Section::SuccessfulPatterns) && !successful_patterns.is_empty() {
        md.push_str("## Successful patterns\n\n");
        for p in successful_patterns {
            md.push_str(&format!("- {} (n={})\n", p.statement, p.sample_size));
        }
        md.push('\n');
    }

    if included.contains(&Section::Calibration) {
        md.push_str(&format!(
            "## Calibration\n\nsuccess_rate={:.2} confidence_gap={:.2} trend={:?}\n\n",
            calibration.success_rate, calibration.confidence_gap, calibration.trend
        ));
    }

    if included.contains(&Section::ProjectConstraints) && !project_constraints.is_empty() {
        md.push_str("## Project constraints\n\n");
        for c in project_constraints {
            md.push_str(&format!("- {c}\n"));
        }
    }

    PlanContextPacket {
        domain,
        past_plans: if included.contains(&Section::PastPlans) { past_plans.to_vec() } else { Vec::new() },
        failed_approaches: if included.contains(&Section::FailedApproaches) {
            failed_approaches.to_vec()
        } else {
            Vec::new()
        },
        successful_patterns: if included.contains(&Section::SuccessfulPatterns) {
            successful_patterns.to_vec()
        } else {
            Vec::new()
        },
        calibration: included.contains(&Section::Calibration).then(|| calibration.clone()),
        project_constraints: if included.contains(&Section::ProjectConstraints) {
            project_constraints.to_vec()
        } else {
            Vec::new()
        },
        markdown: md,
    }
}

/// One warning raised against a proposed plan step (spec §4.6).
#[derive(Debug, Clone, PartialEq)]
pub struct PlanWarning {
    /// Index of the offending step, or `None` for a domain-level warning
    /// (the overconfidence check).
    pub step_index: Option<usize>,
    /// What kind of check raised this warning.
    pub kind: &'static str,
    /// Severity of the warning.
    pub severity: Severity,
    /// Human-readable explanation.
    pub message: String,
}

/// Aggregated result of validating a proposed plan (spec §4.6).
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationReport {
    /// All warnings, sorted severity-desc then step-asc.
    pub warnings: Vec<PlanWarning>,
    /// Count of high-severity warnings.
    pub high_severity: usize,
    /// Count of medium-severity warnings.
    pub medium_severity: usize,
    /// Count of low-severity warnings.
    pub low_severity: usize,
    /// `true` iff `high_severity == 0`.
    pub can_proceed: bool,
}

/// Lexical similarity threshold for a negative-knowledge match (spec
/// §4.6).
const NEGATIVE_KNOWLEDGE_THRESHOLD: f64 = 0.7;
/// Minimum shared content words for a past-failure match (spec §4.6).
const PAST_FAILURE_MIN_SHARED_WORDS: usize = 2;
/// `confidence_gap` threshold that raises the domain-level overconfidence
/// warning (spec §4.6).
const OVERCONFIDENCE_GAP_THRESHOLD: f64 = 0.1;

/// Validates proposed plan steps against negative knowledge, antipatterns,
/// and past failures in a domain.
pub struct PlanValidator<'a> {
    graph: &'a dyn GraphStore,
}

impl<'a> PlanValidator<'a> {
    /// Creates a new validator over the given graph store.
    #[must_use]
    pub fn new(graph: &'a dyn GraphStore) -> Self {
        Self { graph }
    }

    /// Validates `steps` against `domain`'s negative knowledge,
    /// antipatterns, and failed Decisions.
    ///
    /// # Errors
    ///
    /// Returns an error if the graph store query fails.
    pub fn validate(&self, steps: &[String], domain: Module, now: i64) -> Result<ValidationReport> {
        let negative_knowledge = self.graph.list_negative_knowledge(Some(domain), now)?;
        let antipatterns: Vec<_> = self
            .graph
            .list_antipatterns()?
            .into_iter()
            .filter(|ap| ap.category.to_lowercase().contains(domain.as_str()))
            .collect();
        let mut failed_decisions = self.graph.list_decisions(Some(domain), None)?;
        failed_decisions.retain(|d| matches!(d.outcome, DecisionOutcome::Failure | DecisionOutcome::Reworked));

        let mut warnings = Vec::new();

        for (index, step) in steps.iter().enumerate() {
            let step_tokens = tokenize(step);

            for nk in &negative_knowledge {
                let score = jaccard(&step_tokens, &tokenize(&nk.hypothesis));
                if score >= NEGATIVE_KNOWLEDGE_THRESHOLD {
                    warnings.push(PlanWarning {
                        step_index: Some(index),
                        kind: "negative_knowledge",
                        severity: nk.severity,
                        message: format!("matches known failed hypothesis: {}", nk.hypothesis),
                    });
                }
            }

            for ap in &antipatterns {
                let Ok(regex) = Regex::new(&ap.regex_pattern) else {
                    continue;
                };
                if regex.is_match(step) {
                    warnings.push(PlanWarning {
                        step_index: Some(index),
                        kind: "antipattern",
                        severity: ap.severity,
                        message: format!("matches antipattern: {}", ap.name),
                    });
                }
            }

            let step_words = top_content_words(step, 3);
            for decision in &failed_decisions {
                let decision_words = top_content_words(&decision.statement, 3);
                let shared = step_words.intersection(&decision_words).count();
                if shared >= PAST_FAILURE_MIN_SHARED_WORDS {
                    warnings.push(PlanWarning {
                        step_index: Some(index),
                        kind: "past_failure",
                        severity: Severity::Medium,
                        message: format!("resembles a past {} decision: {}", decision.outcome, decision.statement),
                    });
                }
            }
        }

        let calibration = self.graph.get_calibration(domain)?;
        if calibration.confidence_gap > OVERCONFIDENCE_GAP_THRESHOLD {
            warnings.push(PlanWarning {
                step_index: None,
                kind: "overconfidence",
                severity: Severity::Medium,
                message: format!(
                    "declared confidence has historically exceeded outcomes by {:.2} in this domain",
                    calibration.confidence_gap
                ),
            });
        }

        warnings.sort_by(|a, b| {
            b.severity
                .cmp(&a.severity)
                .then_with(|| a.step_index.unwrap_or(usize::MAX).cmp(&b.step_index.unwrap_or(usize::MAX)))
        });

        let high_severity = warnings.iter().filter(|w| w.severity == Severity::High).count();
        let medium_severity = warnings.iter().filter(|w| w.severity == Severity::Medium).count();
        let low_severity = warnings.iter().filter(|w| w.severity == Severity::Low).count();

        Ok(ValidationReport {
            warnings,
            high_severity,
            medium_severity,
            low_severity,
            can_proceed: high_severity == 0,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::memory::InMemoryGraphStore;
    use crate::models::{NegativeKnowledge, NegativeKnowledgeId};

    fn sample_nk(domain: Module) -> NegativeKnowledge {
        NegativeKnowledge {
            id: NegativeKnowledgeId::generate(),
            hypothesis: "Custom JWT implementation is safe".to_string(),
            conclusion: "It was not".to_string(),
            evidence: "incident-42".to_string(),
            source: "dec_abc".to_string(),
            domain,
            severity: Severity::High,
            discovered_at: 0,
            expires_at: None,
            blocked_pattern: "custom_jwt".to_string(),
            recommendation: "use a vetted JWT library".to_string(),
        }
    }

    #[test]
    fn negative_knowledge_match_blocks_proceeding() {
        let graph = InMemoryGraphStore::new();
        graph.put_negative_knowledge(&sample_nk(Module::Auth)).unwrap();

        let validator = PlanValidator::new(&graph);
        let report = validator
            .validate(
                &[
                    "Set up Express".to_string(),
                    "Implement custom JWT tokens".to_string(),
                    "Add tests".to_string(),
                ],
                Module::Auth,
                1_000,
            )
            .unwrap();

        assert_eq!(report.high_severity, 1);
        assert!(!report.can_proceed);
        assert_eq!(report.warnings[0].step_index, Some(1));
        assert_eq!(report.warnings[0].kind, "negative_knowledge");
    }

    #[test]
    fn clean_plan_can_proceed() {
        let graph = InMemoryGraphStore::new();
        let validator = PlanValidator::new(&graph);
        let report = validator
            .validate(&["Write the handler".to_string()], Module::Api, 1_000)
            .unwrap();
        assert!(report.can_proceed);
        assert!(report.warnings.is_empty());
    }

    #[test]
    fn validation_is_deterministic() {
        let graph = InMemoryGraphStore::new();
        graph.put_negative_knowledge(&sample_nk(Module::Auth)).unwrap();
        let validator = PlanValidator::new(&graph);
        let steps = vec!["Implement custom JWT tokens".to_string()];

        let first = validator.validate(&steps, Module::Auth, 1_000).unwrap();
        let second = validator.validate(&steps, Module::Auth, 1_000).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn context_builder_drops_sections_under_tight_budget() {
        let graph = InMemoryGraphStore::new();
        let mut d = Decision::new("use retries", vec![], 0.5, Module::Backend, "s", 0);
        d.resolve(DecisionOutcome::Failure, 1, None).unwrap();
        graph.put_decision(&d).unwrap();

        let builder = PlanContextBuilder::new(&graph);
        let constraints = vec!["must use Rust".to_string()];
        let packet = builder.build(Module::Backend, "", &constraints, 1).unwrap();
        assert!(packet.markdown.len() <= 4 || packet.project_constraints.is_empty() || !packet.failed_approaches.is_empty());
    }

    #[test]
    fn context_builder_keeps_everything_under_generous_budget() {
        let graph = InMemoryGraphStore::new();
        let mut d = Decision::new("use retries", vec![], 0.5, Module::Backend, "s", 0);
        d.resolve(DecisionOutcome::Success, 1, None).unwrap();
        graph.put_decision(&d).unwrap();

        let builder = PlanContextBuilder::new(&graph);
        let constraints = vec!["must use Rust".to_string()];
        let packet = builder.build(Module::Backend, "migrate auth", &constraints, 1500).unwrap();
        assert_eq!(packet.project_constraints, constraints);
        assert!(packet.calibration.is_some());
    }
}

//! End-to-end scenarios against the public API, one per numbered scenario
//! in the specification's testable-properties section.

use membria::bias;
use membria::extractor::BatchExtractor;
use membria::graph::memory::InMemoryGraphStore;
use membria::graph::GraphStore;
use membria::llm::{ExtractionResult, LlmClient};
use membria::models::{Module, NegativeKnowledge, Severity};
use membria::protocol::Endpoint;
use membria::queue::memory::{InMemoryExtractionCache, InMemorySignalQueue};
use membria::queue::Signal;
use membria::{MembriaConfig, Result};
use serde_json::json;
use std::sync::Arc;

fn endpoint() -> (Endpoint, Arc<InMemoryGraphStore>, Arc<InMemorySignalQueue>) {
    let config = MembriaConfig::default();
    let graph = Arc::new(InMemoryGraphStore::new());
    let queue = Arc::new(InMemorySignalQueue::new());
    let ep = Endpoint::new(graph.clone(), queue.clone(), &config);
    (ep, graph, queue)
}

/// Scenario 1: explicit capture via `record_decision` followed by
/// `get_calibration`.
#[test]
fn scenario_1_explicit_capture() {
    let (ep, _graph, _queue) = endpoint();

    let response = ep.handle_line(
        &json!({
            "type": "call_tool",
            "tool": "record_decision",
            "args": {
                "statement": "Use PostgreSQL for user storage",
                "alternatives": ["MongoDB", "SQLite"],
                "confidence": 0.85,
                "module": "database",
            }
        })
        .to_string(),
        0,
    );
    let decision_id = response["result"]["decision_id"].as_str().unwrap().to_string();
    assert!(decision_id.starts_with("dec_"));
    assert_eq!(decision_id.len(), "dec_".len() + 16);

    let response = ep.handle_line(
        &json!({"type": "call_tool", "tool": "get_calibration", "args": {"domain": "database"}}).to_string(),
        0,
    );
    assert!(response["result"]["sample_size"].as_u64().unwrap() == 0);
}

struct StubLlm;
impl LlmClient for StubLlm {
    fn extract_batch(&self, signals: &[Signal]) -> Result<Vec<Option<ExtractionResult>>> {
        Ok(signals
            .iter()
            .map(|_| Some(ExtractionResult {
                decision_statement: "Use Postgres over MySQL".to_string(),
                alternatives: vec!["MySQL".to_string()],
                confidence: 0.8,
                reasoning: "JSONB support".to_string(),
                module: Module::Database,
            }))
            .collect())
    }
}

/// Scenario 2: `capture_session` enqueues a signal, a manual extraction
/// tick (L3) turns it into a Decision.
#[test]
fn scenario_2_signal_to_extraction() {
    let (ep, graph, queue) = endpoint();
    let cache = Arc::new(InMemoryExtractionCache::new());

    let response = ep.handle_line(
        &json!({
            "type": "call_tool",
            "tool": "capture_session",
            "args": {
                "prompt": "Which DB?",
                "response": "I recommend Postgres over MySQL because of JSONB support.",
            }
        })
        .to_string(),
        0,
    );
    assert_eq!(response["result"]["signals_enqueued"], 1);
    assert_eq!(graph.stats().unwrap().decision_count, 0);

    let extractor = BatchExtractor::new(queue, cache, Arc::new(StubLlm), graph.clone(), 10);
    let summary = extractor.run_once(1).unwrap();
    assert_eq!(summary.extracted, 1);

    let decisions = graph.list_decisions(Some(Module::Database), None).unwrap();
    assert_eq!(decisions.len(), 1);
    assert!(decisions[0].statement.contains("Postgres"));
    assert!(decisions[0].alternatives.iter().any(|a| a.contains("MySQL")));
}

/// Scenario 3: a seeded `NegativeKnowledge` blocks a matching plan step.
#[test]
fn scenario_3_plan_validation_blocks_known_failure() {
    let (ep, graph, _queue) = endpoint();

    let nk = NegativeKnowledge::new(
        "Custom JWT implementation is safe",
        "It was not",
        "incident-42",
        "dec_abc",
        Module::Auth,
        Severity::High,
        0,
        "custom_jwt",
        "use a vetted library",
    );
    graph.put_negative_knowledge(&nk).unwrap();

    let response = ep.handle_line(
        &json!({
            "type": "call_tool",
            "tool": "validate_plan",
            "args": {
                "steps": ["Set up Express", "Implement custom JWT tokens", "Add tests"],
                "domain": "auth",
            }
        })
        .to_string(),
        0,
    );
    assert_eq!(response["result"]["can_proceed"], false);
    assert_eq!(response["result"]["high_severity"], 1);
    let warnings = response["result"]["warnings"].as_array().unwrap();
    let nk_warning = warnings.iter().find(|w| w["kind"] == "negative_knowledge").unwrap();
    assert_eq!(nk_warning["step_index"], 1);
}

/// Scenario 4: ten terminal Decisions in "api" (8 success, 2 failure)
/// produce the expected calibration profile.
#[test]
fn scenario_4_calibration_update() {
    let (ep, _graph, _queue) = endpoint();

    let mut decision_ids = Vec::new();
    for _ in 0..10 {
        let response = ep.handle_line(
            &json!({
                "type": "call_tool",
                "tool": "record_decision",
                "args": {"statement": "pick a framework", "confidence": 0.7, "module": "api"}
            })
            .to_string(),
            0,
        );
        decision_ids.push(response["result"]["decision_id"].as_str().unwrap().to_string());
    }

    for (i, id) in decision_ids.iter().enumerate() {
        let status = if i < 8 { "success" } else { "failure" };
        ep.handle_line(
            &json!({
                "type": "call_tool",
                "tool": "link_outcome",
                "args": {"decision_id": id, "status": status}
            })
            .to_string(),
            1,
        );
    }

    let response = ep.handle_line(
        &json!({"type": "call_tool", "tool": "get_calibration", "args": {"domain": "api"}}).to_string(),
        1,
    );
    assert_eq!(response["result"]["alpha"], 9.0);
    assert_eq!(response["result"]["beta"], 3.0);
    let success_rate = response["result"]["success_rate"].as_f64().unwrap();
    assert!((success_rate - 0.75).abs() < 1e-9);
}

/// Scenario 5: 15 terminal Decisions in "auth" (12 success, 3 failure, with
/// 9 successes sharing a statement) emit exactly one Skill version, not
/// one per subsequent resolve.
#[test]
fn scenario_5_skill_emission_does_not_double_emit() {
    let (ep, graph, _queue) = endpoint();

    let mut record = |statement: &str| -> String {
        let response = ep.handle_line(
            &json!({
                "type": "call_tool",
                "tool": "record_decision",
                "args": {"statement": statement, "confidence": 0.8, "module": "auth"}
            })
            .to_string(),
            0,
        );
        response["result"]["decision_id"].as_str().unwrap().to_string()
    };

    let shared: Vec<String> = (0..9).map(|_| record("use auth0")).collect();
    let distinct_success: Vec<String> =
        (0..3).map(|i| record(&format!("use a bespoke provider {i}"))).collect();
    let failed: Vec<String> = (0..3).map(|_| record("store tokens in localStorage")).collect();

    let mut resolve = |id: &str, status: &str| {
        ep.handle_line(
            &json!({
                "type": "call_tool",
                "tool": "link_outcome",
                "args": {"decision_id": id, "status": status}
            })
            .to_string(),
            2,
        );
    };

    // Order: 9 shared successes, then one distinct success (sample_size
    // reaches 10, the skill-eligibility threshold, exactly here).
    for id in &shared {
        resolve(id, "success");
    }
    resolve(&distinct_success[0], "success");

    assert_eq!(graph.current_skill(Module::Auth).unwrap().unwrap().version, 1);

    for id in &distinct_success[1..] {
        resolve(id, "success");
    }
    for id in &failed {
        resolve(id, "failure");
    }

    let skill = graph.current_skill(Module::Auth).unwrap().unwrap();
    assert_eq!(skill.version, 1, "no new terminal decision crossed an eligibility transition");
    assert_eq!(skill.sample_size, 10, "skill was generated at the 10-sample eligibility crossing, not recomputed later");

    let green = skill.green_zone.iter().find(|z| z.pattern.starts_with("use auth0")).unwrap();
    assert_eq!(green.sample_size, 9);
    assert!((green.success_rate - 1.0).abs() < 1e-9);
}

/// Scenario 5 (continued): once a domain is already skill-eligible, a
/// further terminal decision that shifts the computed zone assignment does
/// emit v2 — skill regeneration is not a one-time event per domain.
#[test]
fn scenario_5_new_terminal_decisions_after_eligibility_emit_v2() {
    let (ep, graph, _queue) = endpoint();

    let mut record = |statement: &str| -> String {
        let response = ep.handle_line(
            &json!({
                "type": "call_tool",
                "tool": "record_decision",
                "args": {"statement": statement, "confidence": 0.8, "module": "infra"}
            })
            .to_string(),
            0,
        );
        response["result"]["decision_id"].as_str().unwrap().to_string()
    };
    let mut resolve = |id: &str, status: &str| {
        ep.handle_line(
            &json!({
                "type": "call_tool",
                "tool": "link_outcome",
                "args": {"decision_id": id, "status": status}
            })
            .to_string(),
            2,
        );
    };

    let ids: Vec<String> = (0..10).map(|_| record("use blue-green deploys")).collect();
    for id in &ids {
        resolve(id, "success");
    }
    let first = graph.current_skill(Module::Infra).unwrap().unwrap();
    assert_eq!(first.version, 1);

    // One more terminal decision in the same already-eligible domain shifts
    // the cluster's sample size and success rate, changing the zone
    // assignment a second generation would compute.
    let extra = record("use blue-green deploys");
    resolve(&extra, "success");

    let second = graph.current_skill(Module::Infra).unwrap().unwrap();
    assert_eq!(second.version, 2, "a new terminal decision after eligibility still regenerates");
    assert_eq!(second.sample_size, 11);
}

/// Scenario 6: a sunk-cost, overconfident, alternative-free statement
/// scores high-severity with the expected remediations.
#[test]
fn scenario_6_bias_analysis() {
    let report = bias::analyze(
        "We must definitely use NoSQL, it's obviously the right choice, \
         our team has invested too much to change now",
        &[],
        0.5,
        0.5,
    );
    assert!(report.risk_score >= 0.6);
    assert!(report.recommendations.contains(&"cool-off"));
    assert!(report.recommendations.contains(&"generate-alternatives"));
}

/// A resolved decision cannot be resolved a second time, and the graph is
/// left unchanged by the rejected attempt.
#[test]
fn link_outcome_is_not_reentrant() {
    let (ep, graph, _queue) = endpoint();
    let response = ep.handle_line(
        &json!({
            "type": "call_tool",
            "tool": "record_decision",
            "args": {"statement": "x", "confidence": 0.5, "module": "other"}
        })
        .to_string(),
        0,
    );
    let id = response["result"]["decision_id"].as_str().unwrap().to_string();

    let first = ep.handle_line(
        &json!({"type": "call_tool", "tool": "link_outcome", "args": {"decision_id": id, "status": "success"}})
            .to_string(),
        1,
    );
    assert_eq!(first["type"], "tool_result");

    let second = ep.handle_line(
        &json!({"type": "call_tool", "tool": "link_outcome", "args": {"decision_id": id, "status": "failure"}})
            .to_string(),
        2,
    );
    assert_eq!(second["type"], "error");
    assert_eq!(second["code"], "already_terminal");

    let id = membria::models::DecisionId::from_raw(id);
    let decision = graph.get_decision(&id).unwrap().unwrap();
    assert_eq!(decision.outcome, membria::models::DecisionOutcome::Success);
}

/// `capture_session` enqueues one raw signal per call (dedup happens at
/// extraction, not at capture), but extracting two signals that resolve to
/// the same statement+module fingerprint still yields only one Decision.
#[test]
fn repeated_signals_extract_to_one_decision() {
    let (ep, graph, queue) = endpoint();
    let cache = Arc::new(InMemoryExtractionCache::new());
    let args = json!({
        "type": "call_tool",
        "tool": "capture_session",
        "args": {
            "prompt": "Which DB?",
            "response": "I recommend Postgres over MySQL because of JSONB support.",
        }
    })
    .to_string();

    ep.handle_line(&args, 0);
    ep.handle_line(&args, 1);

    let extractor = BatchExtractor::new(queue, cache, Arc::new(StubLlm), graph.clone(), 10);
    let summary = extractor.run_once(2).unwrap();
    assert_eq!(summary.dequeued, 2);
    assert_eq!(summary.extracted, 1);
    assert_eq!(summary.deduplicated, 1);
    assert_eq!(graph.stats().unwrap().decision_count, 1);
}

/// `validate_plan` is deterministic: re-invoking with the same arguments
/// against an unchanged graph returns the same warnings in the same order.
#[test]
fn validate_plan_is_deterministic() {
    let (ep, graph, _queue) = endpoint();
    graph
        .put_negative_knowledge(&NegativeKnowledge::new(
            "Custom JWT implementation is safe",
            "It was not",
            "incident-42",
            "dec_abc",
            Module::Auth,
            Severity::High,
            0,
            "custom_jwt",
            "use a vetted library",
        ))
        .unwrap();

    let args = json!({
        "type": "call_tool",
        "tool": "validate_plan",
        "args": {"steps": ["Set up Express", "Implement custom JWT tokens", "Add tests"], "domain": "auth"}
    })
    .to_string();

    let first = ep.handle_line(&args, 5);
    let second = ep.handle_line(&args, 5);
    assert_eq!(first["result"]["warnings"], second["result"]["warnings"]);
}

//! Tool Protocol Endpoint: a duplex, newline-delimited JSON frame protocol
//! over stdio exposing nine tools to the calling assistant (spec §4.1, §6).

use crate::calibration::CalibrationEngine;
use crate::detector;
use crate::graph::GraphStore;
use crate::models::{Decision, DecisionOutcome, Engram, EngramCounts, Module};
use crate::plan::{PlanContextBuilder, PlanValidator};
use crate::queue::SignalQueue;
use crate::skill::SkillGenerator;
use crate::{Error, Result};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::sync::Arc;
use std::time::Duration;

/// Number of recent decisions `get_context` surfaces (spec §4.7).
const RECENT_DECISIONS_LIMIT: usize = 10;

/// Maps an internal [`Error`] to its stable wire code (spec §7).
#[must_use]
pub fn error_code(err: &Error) -> &'static str {
    match err {
        Error::Validation(_) | Error::InvalidInput(_) => "validation",
        Error::NotFound(_) => "not_found",
        Error::AlreadyTerminal(_) => "already_terminal",
        Error::GraphUnavailable(_) | Error::OperationFailed { .. } => "graph_unavailable",
        Error::LlmUnavailable(_) => "llm_unavailable",
        Error::LlmQuota(_) => "llm_quota",
        Error::LlmMalformed(_) => "llm_malformed",
        Error::Timeout(_) => "timeout",
        Error::FrameTooLarge(_, _) => "frame_too_large",
        Error::ProtocolError(_) => "protocol_error",
        Error::ShuttingDown => "shutting_down",
    }
}

/// One inbound call frame: `{"type":"call_tool","tool":<name>,"args":{…}}`.
#[derive(Debug, Deserialize)]
struct InboundFrame {
    #[serde(rename = "type")]
    kind: String,
    tool: String,
    #[serde(default)]
    args: Value,
}

/// Serializes a successful result frame.
fn result_frame(result: Value) -> Value {
    json!({"type": "tool_result", "result": result})
}

/// Serializes an error frame.
fn error_frame(err: &Error) -> Value {
    json!({"type": "error", "code": error_code(err), "message": err.to_string()})
}

#[derive(Deserialize)]
struct RecordDecisionRequest {
    statement: String,
    #[serde(default)]
    alternatives: Vec<String>,
    confidence: f32,
    module: Module,
}

#[derive(Deserialize)]
struct GetContextRequest {
    domain: Module,
    #[serde(default)]
    #[allow(dead_code)]
    scope: String,
}

#[derive(Deserialize)]
struct CheckPatternsRequest {
    text: String,
}

#[derive(Deserialize)]
struct GetCalibrationRequest {
    domain: Module,
}

#[derive(Deserialize)]
struct LinkOutcomeRequest {
    decision_id: String,
    status: DecisionOutcome,
    score: Option<f32>,
}

#[derive(Deserialize)]
struct CaptureSessionRequest {
    prompt: String,
    response: String,
}

#[derive(Deserialize)]
struct GetPlanContextRequest {
    domain: Module,
    #[serde(default)]
    scope: String,
    max_tokens: Option<usize>,
}

#[derive(Deserialize)]
struct ValidatePlanRequest {
    steps: Vec<String>,
    domain: Module,
}

#[derive(Deserialize)]
struct RecordPlanRequest {
    steps: Vec<String>,
    domain: Module,
    confidence: f32,
    duration_estimate: u64,
    #[serde(default)]
    warnings_shown: u32,
    #[serde(default)]
    warnings_heeded: u32,
}

fn parse_args<T: for<'de> Deserialize<'de>>(args: &Value) -> Result<T> {
    serde_json::from_value(args.clone()).map_err(|e| Error::Validation(e.to_string()))
}

/// Dispatches the nine recognized tool calls against the reasoning graph
/// and its services.
///
/// Held behind `Arc` (rather than the borrowed `&dyn GraphStore` used by the
/// synchronous per-call services in [`crate::plan`], [`crate::calibration`],
/// and [`crate::skill`]) because handler dispatch runs inside a bounded
/// worker thread (see [`Endpoint::run_with_timeout`]) that must own its
/// collaborators to outlive the calling frame.
pub struct Endpoint {
    graph: Arc<dyn GraphStore>,
    queue: Arc<dyn SignalQueue>,
    max_frame_bytes: usize,
    tool_timeout: Duration,
    max_context_tokens: usize,
    project_constraints: Vec<String>,
    shutting_down: Arc<AtomicBool>,
}

impl Endpoint {
    /// Creates a new endpoint over the given collaborators and config.
    #[must_use]
    pub fn new(graph: Arc<dyn GraphStore>, queue: Arc<dyn SignalQueue>, config: &crate::MembriaConfig) -> Self {
        Self {
            graph,
            queue,
            max_frame_bytes: config.protocol.max_frame_bytes,
            tool_timeout: Duration::from_millis(config.timeouts.tool_ms),
            max_context_tokens: config.plan.max_context_tokens,
            project_constraints: config.project_constraints.clone(),
            shutting_down: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Signals the endpoint to finish in-flight calls and refuse new ones.
    pub fn shutdown(&self) {
        self.shutting_down.store(true, Ordering::SeqCst);
    }

    /// Returns true once [`Endpoint::shutdown`] has been called.
    #[must_use]
    pub fn is_shutting_down(&self) -> bool {
        self.shutting_down.load(Ordering::SeqCst)
    }

    /// Parses and handles one inbound line, returning the frame to emit in
    /// response. Never panics: every failure mode is mapped to an error
    /// frame so the caller can always write the result back and continue.
    #[must_use]
    pub fn handle_line(&self, line: &str, now: i64) -> Value {
        if line.len() > self.max_frame_bytes {
            return error_frame(&Error::FrameTooLarge(line.len(), self.max_frame_bytes));
        }
        if self.is_shutting_down() {
            return error_frame(&Error::ShuttingDown);
        }

        let frame: InboundFrame = match serde_json::from_str(line) {
            Ok(f) => f,
            Err(e) => return error_frame(&Error::ProtocolError(e.to_string())),
        };
        if frame.kind != "call_tool" {
            return error_frame(&Error::ProtocolError(format!("unknown frame type: {}", frame.kind)));
        }

        match self.run_with_timeout(frame.tool, frame.args, now) {
            Ok(result) => result_frame(result),
            Err(err) => error_frame(&err),
        }
    }

    /// Runs `dispatch` on a worker thread bounded by `self.tool_timeout`
    /// (spec §5: "endpoint tool handlers default 30s ... On timeout, the
    /// handler returns `timeout` and does not leave partial state" — since
    /// every handler only ever calls `?` before its first write, a timed
    /// out handler either hasn't started its write or the write already
    /// completed independently of this thread's join).
    fn run_with_timeout(&self, tool: String, args: Value, now: i64) -> Result<Value> {
        let graph = Arc::clone(&self.graph);
        let queue = Arc::clone(&self.queue);
        let max_context_tokens = self.max_context_tokens;
        let project_constraints = self.project_constraints.clone();

        let (tx, rx) = mpsc::channel();
        std::thread::spawn(move || {
            let result = dispatch(&*graph, &*queue, max_context_tokens, &project_constraints, &tool, &args, now);
            let _ = tx.send(result);
        });

        rx.recv_timeout(self.tool_timeout)
            .unwrap_or_else(|_| Err(Error::Timeout("tool handler exceeded its time budget".to_string())))
    }

    /// Runs the endpoint's read loop: one inbound frame per line, one
    /// outbound frame per line. Returns when `reader` reaches EOF (spec §6:
    /// "half-closed input ... triggers graceful shutdown").
    ///
    /// # Errors
    ///
    /// Returns an error only if writing a response frame fails.
    pub fn run<R: std::io::BufRead, W: std::io::Write>(
        &self,
        mut reader: R,
        mut writer: W,
        now_fn: impl Fn() -> i64,
    ) -> Result<()> {
        let mut line = String::new();
        loop {
            line.clear();
            let read = reader.read_line(&mut line).map_err(|e| Error::OperationFailed {
                operation: "read_protocol_frame".to_string(),
                cause: e.to_string(),
            })?;
            if read == 0 {
                return Ok(());
            }
            let trimmed = line.trim_end_matches(['\n', '\r']);
            if trimmed.is_empty() {
                continue;
            }

            let response = self.handle_line(trimmed, now_fn());
            writeln!(writer, "{response}").map_err(|e| Error::OperationFailed {
                operation: "write_protocol_frame".to_string(),
                cause: e.to_string(),
            })?;
        }
    }
}

#[allow(clippy::too_many_lines)]
fn dispatch(
    graph: &dyn GraphStore,
    queue: &dyn SignalQueue,
    max_context_tokens: usize,
    project_constraints: &[String],
    tool: &str,
    args: &Value,
    now: i64,
) -> Result<Value> {
    match tool {
        "record_decision" => {
            let req: RecordDecisionRequest = parse_args(args)?;
            let decision = Decision::new(req.statement, req.alternatives, req.confidence, req.module, "l1", now);
            graph.put_decision(&decision)?;
            Ok(json!({"decision_id": decision.id.to_string()}))
        },

        "get_context" => {
            let req: GetContextRequest = parse_args(args)?;
            let mut recent = graph.list_decisions(Some(req.domain), None)?;
            recent.sort_by_key(|d| std::cmp::Reverse(d.created_at));
            recent.truncate(RECENT_DECISIONS_LIMIT);

            let calibration = graph.get_calibration(req.domain)?;
            let skill = graph.current_skill(req.domain)?;
            let confidence_adjustment = calibration.success_rate - calibration.mean_confidence;

            Ok(json!({
                "recent_decisions": serde_json::to_value(&recent)?,
                "calibration": serde_json::to_value(&calibration)?,
                "current_skill": serde_json::to_value(&skill)?,
                "confidence_adjustment": confidence_adjustment,
            }))
        },

        "check_patterns" => {
            let req: CheckPatternsRequest = parse_args(args)?;
            let matches: Vec<Value> = graph
                .list_antipatterns()?
                .into_iter()
                .filter_map(|ap| {
                    let regex = regex::Regex::new(&ap.regex_pattern).ok()?;
                    regex.is_match(&req.text).then(|| {
                        json!({"name": ap.name, "category": ap.category, "severity": ap.severity})
                    })
                })
                .collect();
            Ok(json!(matches))
        },

        "get_calibration" => {
            let req: GetCalibrationRequest = parse_args(args)?;
            let profile = graph.get_calibration(req.domain)?;
            Ok(serde_json::to_value(&profile)?)
        },

        "link_outcome" => {
            let req: LinkOutcomeRequest = parse_args(args)?;
            let id = crate::models::DecisionId::from_raw(req.decision_id);
            let mut decision = graph
                .get_decision(&id)?
                .ok_or_else(|| Error::NotFound(format!("decision {id} not found")))?;
            decision.resolve(req.status, now, req.score)?;
            graph.put_decision(&decision)?;

            if decision.outcome.is_terminal() {
                let engine = CalibrationEngine::new(graph);
                let (profile, _) = engine.record_terminal_outcome(&decision)?;
                // Scheduled on every terminal outcome in an eligible domain, not just
                // the first crossing — `generate` itself no-ops when the recomputed
                // zone assignment hasn't actually changed (spec §8 scenario 5).
                if profile.is_skill_eligible() {
                    SkillGenerator::new(graph).generate(decision.module, now)?;
                }
            }

            Ok(serde_json::to_value(&decision)?)
        },

        "capture_session" => {
            let req: CaptureSessionRequest = parse_args(args)?;
            let signals_enqueued = match detector::detect(&req.prompt, &req.response, now) {
                Some(signal) => {
                    queue.enqueue(&signal)?;
                    1
                },
                None => 0,
            };
            Ok(json!({"signals_enqueued": signals_enqueued}))
        },

        "get_plan_context" => {
            let req: GetPlanContextRequest = parse_args(args)?;
            let builder = PlanContextBuilder::new(graph);
            let packet = builder.build(
                req.domain,
                &req.scope,
                project_constraints,
                req.max_tokens.unwrap_or(max_context_tokens),
            )?;
            Ok(json!({
                "domain": packet.domain.as_str(),
                "past_plans": packet.past_plans.iter().map(|p| json!({
                    "step_count": p.step_count,
                    "duration_estimate_secs": p.duration_estimate_secs,
                    "actual_duration_secs": p.actual_duration_secs,
                    "rework_count": p.rework_count,
                })).collect::<Vec<_>>(),
                "failed_approaches": packet.failed_approaches.iter().map(|f| json!({
                    "statement": f.statement,
                    "outcome": f.outcome.as_str(),
                })).collect::<Vec<_>>(),
                "successful_patterns": packet.successful_patterns.iter().map(|p| json!({
                    "statement": p.statement,
                    "sample_size": p.sample_size,
                })).collect::<Vec<_>>(),
                "calibration": packet.calibration.map(|c| serde_json::to_value(&c)).transpose()?,
                "project_constraints": packet.project_constraints,
                "markdown": packet.markdown,
            }))
        },

        "validate_plan" => {
            let req: ValidatePlanRequest = parse_args(args)?;
            let report = PlanValidator::new(graph).validate(&req.steps, req.domain, now)?;
            Ok(json!({
                "warnings": report.warnings.iter().map(|w| json!({
                    "step_index": w.step_index,
                    "kind": w.kind,
                    "severity": w.severity,
                    "message": w.message,
                })).collect::<Vec<_>>(),
                "high_severity": report.high_severity,
                "medium_severity": report.medium_severity,
                "low_severity": report.low_severity,
                "can_proceed": report.can_proceed,
            }))
        },

        "record_plan" => {
            let req: RecordPlanRequest = parse_args(args)?;
            record_plan(graph, req, now)
        },

        other => Err(Error::Validation(format!("unknown tool: {other}"))),
    }
}

fn record_plan(graph: &dyn GraphStore, req: RecordPlanRequest, now: i64) -> Result<Value> {
    let session_id = format!("plan-{now}-{}", uuid::Uuid::new_v4());
    let mut decision_ids = Vec::with_capacity(req.steps.len());

    for step in &req.steps {
        let decision = Decision::new(step.clone(), Vec::new(), req.confidence, req.domain, "plan", now)
            .with_session(session_id.clone());
        graph.put_decision(&decision)?;
        decision_ids.push(decision.id.to_string());
    }

    tracing::info!(
        domain = %req.domain,
        warnings_shown = req.warnings_shown,
        warnings_heeded = req.warnings_heeded,
        "recorded plan"
    );

    let counts = EngramCounts {
        decisions_extracted: u32::try_from(req.steps.len()).unwrap_or(u32::MAX),
        ..EngramCounts::default()
    };
    let engram = Engram::new(
        session_id,
        "",
        format!("plan: {} steps in {}", req.steps.len(), req.domain),
        "",
        now,
        req.duration_estimate,
        "membria-plan",
        "n/a",
        counts,
    );
    graph.put_engram(&engram)?;

    Ok(json!({"engram_id": engram.id.to_string(), "decision_ids": decision_ids}))
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::OperationFailed {
            operation: "serialize_protocol_result".to_string(),
            cause: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::memory::InMemoryGraphStore;
    use crate::queue::memory::InMemorySignalQueue;

    fn endpoint() -> Endpoint {
        let config = crate::MembriaConfig::default();
        Endpoint::new(Arc::new(InMemoryGraphStore::new()), Arc::new(InMemorySignalQueue::new()), &config)
    }

    #[test]
    fn record_decision_then_get_context_round_trips() {
        let ep = endpoint();
        let record = ep.handle_line(
            r#"{"type":"call_tool","tool":"record_decision","args":{"statement":"Use PostgreSQL for user storage","alternatives":["MongoDB","SQLite"],"confidence":0.85,"module":"database"}}"#,
            1_000,
        );
        assert_eq!(record["type"], "tool_result");
        let decision_id = record["result"]["decision_id"].as_str().unwrap().to_string();
        assert!(decision_id.starts_with("dec_"));

        let context = ep.handle_line(
            r#"{"type":"call_tool","tool":"get_context","args":{"domain":"database","scope":""}}"#,
            1_001,
        );
        let recent = context["result"]["recent_decisions"].as_array().unwrap();
        assert!(recent.iter().any(|d| d["id"] == decision_id));
    }

    #[test]
    fn oversized_frame_is_rejected() {
        let config = crate::MembriaConfig {
            protocol: crate::config::ProtocolConfig { max_frame_bytes: 10 },
            ..crate::MembriaConfig::default()
        };
        let ep = Endpoint::new(Arc::new(InMemoryGraphStore::new()), Arc::new(InMemorySignalQueue::new()), &config);
        let response = ep.handle_line(r#"{"type":"call_tool","tool":"get_calibration","args":{"domain":"api"}}"#, 0);
        assert_eq!(response["code"], "frame_too_large");
    }

    #[test]
    fn malformed_json_yields_protocol_error() {
        let ep = endpoint();
        let response = ep.handle_line("not json", 0);
        assert_eq!(response["code"], "protocol_error");
    }

    #[test]
    fn shutting_down_refuses_new_calls() {
        let ep = endpoint();
        ep.shutdown();
        let response = ep.handle_line(r#"{"type":"call_tool","tool":"get_calibration","args":{"domain":"api"}}"#, 0);
        assert_eq!(response["code"], "shutting_down");
    }

    #[test]
    fn link_outcome_twice_fails_already_terminal() {
        let ep = endpoint();
        let record = ep.handle_line(
            r#"{"type":"call_tool","tool":"record_decision","args":{"statement":"x","alternatives":[],"confidence":0.5,"module":"other"}}"#,
            0,
        );
        let id = record["result"]["decision_id"].as_str().unwrap();

        let first = ep.handle_line(
            &format!(r#"{{"type":"call_tool","tool":"link_outcome","args":{{"decision_id":"{id}","status":"success","score":1.0}}}}"#),
            1,
        );
        assert_eq!(first["type"], "tool_result");

        let second = ep.handle_line(
            &format!(r#"{{"type":"call_tool","tool":"link_outcome","args":{{"decision_id":"{id}","status":"failure","score":0.0}}}}"#),
            2,
        );
        assert_eq!(second["code"], "already_terminal");
    }

    #[test]
    fn validate_plan_flags_negative_knowledge() {
        let config = crate::MembriaConfig::default();
        let graph = Arc::new(InMemoryGraphStore::new());
        let nk = crate::models::NegativeKnowledge::new(
            "Custom JWT implementation is safe",
            "It was not",
            "incident-42",
            "dec_abc",
            Module::Auth,
            crate::models::Severity::High,
            0,
            "custom_jwt",
            "use a vetted library",
        );
        graph.put_negative_knowledge(&nk).unwrap();
        let ep = Endpoint::new(graph, Arc::new(InMemorySignalQueue::new()), &config);

        let response = ep.handle_line(
            r#"{"type":"call_tool","tool":"validate_plan","args":{"steps":["Set up Express","Implement custom JWT tokens","Add tests"],"domain":"auth"}}"#,
            0,
        );
        assert_eq!(response["result"]["can_proceed"], false);
        assert_eq!(response["result"]["high_severity"], 1);
    }

    #[test]
    fn record_plan_creates_one_decision_per_step_and_an_engram() {
        let ep = endpoint();
        let response = ep.handle_line(
            r#"{"type":"call_tool","tool":"record_plan","args":{"steps":["a","b","c"],"domain":"backend","confidence":0.6,"duration_estimate":3600,"warnings_shown":2,"warnings_heeded":1}}"#,
            0,
        );
        let decision_ids = response["result"]["decision_ids"].as_array().unwrap();
        assert_eq!(decision_ids.len(), 3);
        assert!(response["result"]["engram_id"].as_str().unwrap().starts_with("eng_"));
    }

    #[test]
    fn unknown_tool_is_a_validation_error() {
        let ep = endpoint();
        let response = ep.handle_line(r#"{"type":"call_tool","tool":"not_a_real_tool","args":{}}"#, 0);
        assert_eq!(response["code"], "validation");
    }
}

//! Binary entry point for `membriad`, the Membria decision-memory daemon.

#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(missing_docs)]
// CLI output legitimately writes to stdout/stderr outside the protocol frame stream.
#![allow(clippy::print_stdout, clippy::print_stderr)]

use clap::Parser;
use membria::cli::{Cli, Command};
use membria::engram_capturer::{CommitEvent, EngramCapturer};
use membria::extractor::BatchExtractor;
use membria::graph::memory::InMemoryGraphStore;
use membria::graph::sqlite::SqliteGraphStore;
use membria::graph::GraphStore;
use membria::llm::{HttpLlmClient, LlmClient};
use membria::models::DiffStats;
use membria::observability::{self, ObservabilityConfig};
use membria::queue::sqlite::SqliteQueue;
use membria::queue::{ExtractionCache, SignalQueue};
use membria::scheduler::Scheduler;
use membria::{current_timestamp, protocol, MembriaConfig};
use std::collections::BTreeSet;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

fn main() -> ExitCode {
    // Best-effort: picks up LLM credentials and other secrets from a local
    // `.env` file for development; absent in production, which is fine.
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => match MembriaConfig::load_from_file(path) {
            Ok(config) => config,
            Err(err) => {
                eprintln!("invalid configuration at {}: {err}", path.display());
                return ExitCode::from(3);
            }
        },
        None => MembriaConfig::load_default(),
    };

    if let Err(err) = observability::init(&ObservabilityConfig::from_env(cli.verbose)) {
        eprintln!("failed to initialize logging: {err}");
    }

    let graph: Arc<dyn GraphStore> = match build_graph_store(&config) {
        Ok(graph) => graph,
        Err(err) => {
            tracing::error!(error = %err, "graph store unavailable at startup");
            return ExitCode::from(2);
        }
    };

    let queue = match SqliteQueue::new(config.queue_db_path()) {
        Ok(queue) => Arc::new(queue),
        Err(err) => {
            tracing::error!(error = %err, "signal queue unavailable at startup");
            return ExitCode::from(2);
        }
    };
    let signal_queue: Arc<dyn SignalQueue> = queue.clone();
    let extraction_cache: Arc<dyn ExtractionCache> = queue.clone();

    match cli.command {
        Command::Serve => serve(&config, graph, signal_queue, extraction_cache),
        Command::IngestCommit {
            sha,
            branch,
            message,
            author,
            timestamp,
            files_changed,
            lines_added,
            lines_removed,
            files_modified,
            session_id,
            session_duration_secs,
            agent_type,
            agent_model,
        } => {
            let files_changed: BTreeSet<String> = files_changed.into_iter().collect();
            let files_modified = files_modified
                .unwrap_or_else(|| u32::try_from(files_changed.len()).unwrap_or(u32::MAX));
            let event = CommitEvent {
                sha,
                branch,
                message,
                author,
                timestamp: timestamp.unwrap_or_else(current_timestamp),
                files_changed,
                diff_stats: DiffStats {
                    added: lines_added,
                    removed: lines_removed,
                    modified: files_modified,
                },
                session_id,
                session_duration_secs,
                agent_type,
                agent_model,
            };
            ingest_commit(graph.as_ref(), &event)
        }
        Command::Tick => tick(&config, graph, signal_queue, extraction_cache),
        Command::Healthcheck => healthcheck(&config, graph, signal_queue, extraction_cache),
    }
}

/// Builds the configured graph backend. `"memory"` is a dev/test
/// convenience; `"sqlite"` (the default) is what the daemon actually runs.
fn build_graph_store(config: &MembriaConfig) -> membria::Result<Arc<dyn GraphStore>> {
    match config.graph.backend.as_str() {
        "memory" => Ok(Arc::new(InMemoryGraphStore::new())),
        _ => Ok(Arc::new(SqliteGraphStore::new(config.graph_db_path())?)),
    }
}

/// Builds the optional Batch Extractor collaborator, absent when no LLM
/// credential is configured (spec §4.3: L3 is disabled).
fn build_extractor(
    config: &MembriaConfig,
    graph: Arc<dyn GraphStore>,
    queue: Arc<dyn SignalQueue>,
    cache: Arc<dyn ExtractionCache>,
) -> Option<BatchExtractor> {
    if !config.llm.is_enabled() {
        return None;
    }
    match HttpLlmClient::from_config(&config.llm) {
        Ok(client) => {
            let llm: Arc<dyn LlmClient> = Arc::new(client);
            Some(BatchExtractor::new(queue, cache, llm, graph, config.extractor.batch_size))
        }
        Err(err) => {
            tracing::warn!(error = %err, "LLM client unavailable, L3 extraction disabled");
            None
        }
    }
}

/// Runs the tool protocol endpoint over stdio and the background scheduler,
/// until stdin closes or a shutdown signal arrives (spec §5, §6).
fn serve(
    config: &MembriaConfig,
    graph: Arc<dyn GraphStore>,
    queue: Arc<dyn SignalQueue>,
    cache: Arc<dyn ExtractionCache>,
) -> ExitCode {
    let extractor = build_extractor(config, graph.clone(), queue.clone(), cache);
    let scheduler = Arc::new(Scheduler::new(
        graph.clone(),
        queue.clone(),
        extractor,
        Duration::from_secs(config.extractor.interval_seconds),
        Duration::from_secs(config.health.tick_seconds),
    ));
    let scheduler_handle = scheduler.clone().spawn(current_timestamp);

    let endpoint = Arc::new(protocol::Endpoint::new(graph, queue, config));

    let grace_seconds = config.daemon.grace_seconds;
    let shutdown_endpoint = endpoint.clone();
    let shutdown_scheduler = scheduler.clone();
    if let Err(err) = ctrlc::set_handler(move || {
        tracing::info!("shutdown signal received, draining in-flight work");
        shutdown_endpoint.shutdown();
        shutdown_scheduler.request_stop();
        let grace_seconds = grace_seconds;
        std::thread::spawn(move || {
            std::thread::sleep(Duration::from_secs(grace_seconds));
            tracing::warn!("grace period elapsed, forcing exit");
            std::process::exit(0);
        });
    }) {
        tracing::warn!(error = %err, "failed to install signal handler");
    }

    let stdin = std::io::stdin();
    let stdout = std::io::stdout();
    let result = endpoint.run(stdin.lock(), stdout.lock(), current_timestamp);

    scheduler.request_stop();
    let _ = scheduler_handle.join();

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            tracing::error!(error = %err, "protocol endpoint terminated with an error");
            ExitCode::from(2)
        }
    }
}

/// Ingests one commit event from the CLI (spec §4.4), invoked from a
/// post-commit git hook rather than the tool protocol.
fn ingest_commit(graph: &dyn GraphStore, event: &CommitEvent) -> ExitCode {
    match EngramCapturer::new(graph).capture(event) {
        Ok(result) => {
            println!(
                "{}",
                serde_json::json!({
                    "engram_id": result.engram_id,
                    "code_change_id": result.code_change_id,
                    "linked_decisions": result.linked_decisions,
                })
            );
            ExitCode::SUCCESS
        }
        Err(err) => {
            eprintln!("failed to ingest commit: {err}");
            ExitCode::from(2)
        }
    }
}

/// Runs one scheduler tick cycle (batch extraction) and exits, for use
/// under an external cron rather than the long-running `serve` daemon.
fn tick(
    config: &MembriaConfig,
    graph: Arc<dyn GraphStore>,
    queue: Arc<dyn SignalQueue>,
    cache: Arc<dyn ExtractionCache>,
) -> ExitCode {
    let Some(extractor) = build_extractor(config, graph, queue, cache) else {
        println!("{}", serde_json::json!({"status": "l3_disabled", "reason": "no LLM credential configured"}));
        return ExitCode::SUCCESS;
    };

    match extractor.run_once(current_timestamp()) {
        Ok(summary) => {
            println!(
                "{}",
                serde_json::json!({
                    "dequeued": summary.dequeued,
                    "extracted": summary.extracted,
                    "deduplicated": summary.deduplicated,
                    "failed": summary.failed,
                    "dead": summary.dead,
                })
            );
            ExitCode::SUCCESS
        }
        Err(err) => {
            eprintln!("extraction cycle failed: {err}");
            ExitCode::from(2)
        }
    }
}

/// Checks graph reachability and queue depth, printing a JSON health report
/// and exiting 0 if healthy, 1 otherwise (spec §4.11).
fn healthcheck(
    config: &MembriaConfig,
    graph: Arc<dyn GraphStore>,
    queue: Arc<dyn SignalQueue>,
    cache: Arc<dyn ExtractionCache>,
) -> ExitCode {
    let extractor = build_extractor(config, graph.clone(), queue.clone(), cache);
    let scheduler = Scheduler::new(
        graph,
        queue,
        extractor,
        Duration::from_secs(config.extractor.interval_seconds),
        Duration::from_secs(config.health.tick_seconds),
    );

    match scheduler.health_check() {
        Ok(report) => {
            println!(
                "{}",
                serde_json::json!({
                    "graph_reachable": report.graph_reachable,
                    "queue_depth": report.queue_depth,
                    "last_extraction_age_secs": report.last_extraction_age_secs,
                })
            );
            if report.graph_reachable {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            }
        }
        Err(err) => {
            eprintln!("health check failed: {err}");
            ExitCode::FAILURE
        }
    }
}

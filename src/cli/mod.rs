//! Command-line surface: `membriad serve|ingest-commit|tick|healthcheck`.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Decision-memory daemon for AI coding assistants.
#[derive(Parser)]
#[command(name = "membriad", version, about)]
pub struct Cli {
    /// Path to a TOML config file. Defaults to `~/.config/membria/config.toml`.
    #[arg(long, global = true, env = "MEMBRIA_CONFIG")]
    pub config: Option<PathBuf>,
    /// Enable debug-level logging.
    #[arg(long, global = true)]
    pub verbose: bool,
    #[command(subcommand)]
    pub command: Command,
}

/// Subcommands exposed by the `membriad` binary.
#[derive(Subcommand)]
pub enum Command {
    /// Runs the tool protocol endpoint over stdio and the background
    /// scheduler, until stdin closes or a shutdown signal arrives.
    Serve,

    /// Ingests one commit event, creating its Engram and CodeChange nodes
    /// and best-effort linking recent Decisions (spec §4.4). Intended to be
    /// invoked from a post-commit git hook.
    IngestCommit {
        /// Commit SHA.
        #[arg(long)]
        sha: String,
        /// Branch the commit landed on.
        #[arg(long)]
        branch: String,
        /// Commit message.
        #[arg(long)]
        message: String,
        /// Commit author.
        #[arg(long)]
        author: String,
        /// Commit timestamp, seconds since epoch. Defaults to now.
        #[arg(long)]
        timestamp: Option<i64>,
        /// Repeatable: a path touched by the commit.
        #[arg(long = "file")]
        files_changed: Vec<String>,
        /// Lines added.
        #[arg(long, default_value_t = 0)]
        lines_added: u32,
        /// Lines removed.
        #[arg(long, default_value_t = 0)]
        lines_removed: u32,
        /// Files modified (defaults to the count of `--file` occurrences).
        #[arg(long)]
        files_modified: Option<u32>,
        /// Session id this commit closes out, if known.
        #[arg(long)]
        session_id: Option<String>,
        /// Session duration in seconds.
        #[arg(long, default_value_t = 0)]
        session_duration_secs: u64,
        /// Agent type that drove the session (e.g. `claude-code`).
        #[arg(long, default_value = "unknown")]
        agent_type: String,
        /// Agent model identifier.
        #[arg(long, default_value = "unknown")]
        agent_model: String,
    },

    /// Runs one scheduler tick cycle (batch extraction) and exits. Useful
    /// under an external cron when the daemon isn't kept running.
    Tick,

    /// Checks graph reachability and queue depth, printing a JSON health
    /// report and exiting 0 if healthy, 1 otherwise.
    Healthcheck,
}

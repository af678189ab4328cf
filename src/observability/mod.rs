//! Observability: structured logging and process-wide metrics.
//!
//! The daemon talks to its caller exclusively over the stdio tool protocol
//! (see [`crate::protocol`]), so `stdout` is reserved for protocol frames;
//! all logging goes to `stderr`.

use crate::{Error, Result};
use std::sync::OnceLock;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// Output encoding for log lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// One JSON object per line, for log aggregators.
    Json,
    /// Human-readable, for interactive use.
    Pretty,
}

/// Observability settings resolved at startup.
#[derive(Debug, Clone)]
pub struct ObservabilityConfig {
    /// Log line encoding.
    pub format: LogFormat,
    /// `tracing_subscriber::EnvFilter` directive string (e.g. `"info"`,
    /// `"membria=debug,tower=warn"`).
    pub filter: String,
}

impl ObservabilityConfig {
    /// Builds config from environment variables, defaulting to pretty
    /// output at `info` level.
    ///
    /// | Variable | Purpose | Default |
    /// |---|---|---|
    /// | `MEMBRIA_LOG_FORMAT` | `json` or `pretty` | `pretty` |
    /// | `RUST_LOG` | `EnvFilter` directives | `info` |
    #[must_use]
    pub fn from_env(verbose: bool) -> Self {
        let format = match std::env::var("MEMBRIA_LOG_FORMAT").as_deref() {
            Ok("json") => LogFormat::Json,
            _ => LogFormat::Pretty,
        };
        let filter = std::env::var("RUST_LOG").unwrap_or_else(|_| {
            if verbose {
                "debug".to_string()
            } else {
                "info".to_string()
            }
        });
        Self { format, filter }
    }
}

static OBSERVABILITY_INIT: OnceLock<()> = OnceLock::new();

/// Installs the global `tracing` subscriber for the process.
///
/// Idempotent-safe to call once; a second call returns an error rather than
/// panicking, since `tracing_subscriber`'s global dispatcher can only be set
/// once per process.
///
/// # Errors
///
/// Returns an error if observability was already initialized, or if the
/// `EnvFilter` directive string fails to parse.
pub fn init(config: &ObservabilityConfig) -> Result<()> {
    if OBSERVABILITY_INIT.get().is_some() {
        return Err(Error::OperationFailed {
            operation: "observability_init".to_string(),
            cause: "observability already initialized".to_string(),
        });
    }

    let filter = EnvFilter::try_new(&config.filter).map_err(|e| Error::OperationFailed {
        operation: "observability_init".to_string(),
        cause: format!("invalid log filter {:?}: {e}", config.filter),
    })?;

    let registry = tracing_subscriber::registry().with(filter);
    match config.format {
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr).with_target(true))
            .try_init(),
        LogFormat::Pretty => registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr).with_target(true))
            .try_init(),
    }
    .map_err(|e| Error::OperationFailed {
        operation: "observability_init".to_string(),
        cause: e.to_string(),
    })?;

    let _ = OBSERVABILITY_INIT.set(());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_defaults_to_pretty_info() {
        let config = ObservabilityConfig { format: LogFormat::Pretty, filter: "info".to_string() };
        assert_eq!(config.format, LogFormat::Pretty);
        assert_eq!(config.filter, "info");
    }
}

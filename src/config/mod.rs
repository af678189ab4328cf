//! Configuration management.

use serde::Deserialize;
use std::borrow::Cow;
use std::path::PathBuf;

/// Expands environment variable references in a string.
///
/// Supports `${VAR_NAME}` syntax. If the variable is not set, the original
/// reference is preserved (e.g. `${MISSING_VAR}` stays as-is).
fn expand_env_vars(input: &str) -> Cow<'_, str> {
    if !input.contains("${") {
        return Cow::Borrowed(input);
    }

    let mut result = input.to_string();
    let mut start = 0;

    while let Some(var_start) = result[start..].find("${") {
        let var_start = start + var_start;
        if let Some(var_end) = result[var_start..].find('}') {
            let var_end = var_start + var_end;
            let var_name = &result[var_start + 2..var_end];
            if let Ok(value) = std::env::var(var_name) {
                result.replace_range(var_start..=var_end, &value);
                start = var_start + value.len();
            } else {
                start = var_end + 1;
            }
        } else {
            break;
        }
    }

    Cow::Owned(result)
}

/// Graph backend connection settings.
#[derive(Debug, Clone, Default)]
pub struct GraphConfig {
    /// Backend kind. `"sqlite"` (default) or `"memory"` (tests only).
    pub backend: String,
    /// Path to the `SQLite` database file (ignored for `memory`).
    pub path: Option<PathBuf>,
    /// Host of a remote graph backend, reserved for future backends.
    pub host: Option<String>,
    /// Port of a remote graph backend.
    pub port: Option<u16>,
    /// Password/credential for a remote graph backend.
    pub password: Option<String>,
}

/// External LLM client settings for the Batch Extractor.
#[derive(Debug, Clone, Default)]
pub struct LlmConfig {
    /// Provider name: `"anthropic"`, `"openai"`, or a custom HTTP endpoint.
    pub provider: String,
    /// Model identifier.
    pub model: Option<String>,
    /// API key, expanded from `${ENV_VAR}` references if present.
    pub api_key: Option<String>,
    /// Base URL override, for self-hosted or proxy deployments.
    pub base_url: Option<String>,
    /// Request timeout in milliseconds (default 60000, per spec §5).
    pub timeout_ms: u64,
}

impl LlmConfig {
    /// Returns true if enough configuration is present to enable L3.
    /// Per spec §4.3: "when no LLM credential is configured, L3 is disabled".
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.api_key.as_ref().is_some_and(|k| !k.trim().is_empty())
    }
}

/// Batch Extractor (L3) cadence and batching settings.
#[derive(Debug, Clone)]
pub struct ExtractorConfig {
    /// Signals dequeued per extraction tick (default 10).
    pub batch_size: usize,
    /// Scheduler cadence between extraction ticks, in seconds (default 3600).
    pub interval_seconds: u64,
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        Self {
            batch_size: 10,
            interval_seconds: 3600,
        }
    }
}

/// Plan Context Builder settings.
#[derive(Debug, Clone)]
pub struct PlanConfig {
    /// Token budget for the PRE-PLAN packet (default 1500, 4 chars/token).
    pub max_context_tokens: usize,
}

impl Default for PlanConfig {
    fn default() -> Self {
        Self {
            max_context_tokens: 1500,
        }
    }
}

/// Background scheduler health-check cadence.
#[derive(Debug, Clone)]
pub struct HealthConfig {
    /// Seconds between health ticks (default 30).
    pub tick_seconds: u64,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self { tick_seconds: 30 }
    }
}

/// Daemon lifecycle settings.
#[derive(Debug, Clone)]
pub struct DaemonConfig {
    /// Seconds allowed for in-flight work to drain on shutdown (default 10).
    pub grace_seconds: u64,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self { grace_seconds: 10 }
    }
}

/// Per-tool timeout overrides, in milliseconds. Defaults per spec §5:
/// endpoint tool handlers 30s, external LLM calls 60s, graph queries 5s.
#[derive(Debug, Clone)]
pub struct TimeoutConfig {
    /// Default timeout for tool protocol handlers.
    pub tool_ms: u64,
    /// Timeout for external LLM HTTP calls.
    pub llm_ms: u64,
    /// Timeout for graph store queries.
    pub graph_ms: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            tool_ms: 30_000,
            llm_ms: 60_000,
            graph_ms: 5_000,
        }
    }
}

/// Tool protocol frame limits.
#[derive(Debug, Clone)]
pub struct ProtocolConfig {
    /// Maximum accepted inbound frame size in bytes (default 1 MiB).
    pub max_frame_bytes: usize,
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        Self {
            max_frame_bytes: 1024 * 1024,
        }
    }
}

/// Main runtime configuration for the Membria daemon.
#[derive(Debug, Clone)]
pub struct MembriaConfig {
    /// Data directory holding the graph, queue, and cache `SQLite` files.
    pub data_dir: PathBuf,
    /// Graph backend connection settings.
    pub graph: GraphConfig,
    /// External LLM settings.
    pub llm: LlmConfig,
    /// Batch extractor settings.
    pub extractor: ExtractorConfig,
    /// Plan context builder settings.
    pub plan: PlanConfig,
    /// Scheduler health-check settings.
    pub health: HealthConfig,
    /// Daemon lifecycle settings.
    pub daemon: DaemonConfig,
    /// Timeout overrides.
    pub timeouts: TimeoutConfig,
    /// Protocol framing limits.
    pub protocol: ProtocolConfig,
    /// Project constraints surfaced verbatim in PRE-PLAN packets (spec §4.5).
    pub project_constraints: Vec<String>,
    /// Config files that were loaded, for diagnostics.
    pub config_sources: Vec<PathBuf>,
}

impl Default for MembriaConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from(".membria"),
            graph: GraphConfig {
                backend: "sqlite".to_string(),
                path: None,
                host: None,
                port: None,
                password: None,
            },
            llm: LlmConfig {
                provider: "anthropic".to_string(),
                model: None,
                api_key: None,
                base_url: None,
                timeout_ms: 60_000,
            },
            extractor: ExtractorConfig::default(),
            plan: PlanConfig::default(),
            health: HealthConfig::default(),
            daemon: DaemonConfig::default(),
            timeouts: TimeoutConfig::default(),
            protocol: ProtocolConfig::default(),
            project_constraints: Vec::new(),
            config_sources: Vec::new(),
        }
    }
}

/// On-disk TOML shape, matching the key table in spec §6.
#[derive(Debug, Deserialize, Default)]
struct ConfigFile {
    data_dir: Option<String>,
    graph: Option<ConfigFileGraph>,
    llm: Option<ConfigFileLlm>,
    extractor: Option<ConfigFileExtractor>,
    plan: Option<ConfigFilePlan>,
    health: Option<ConfigFileHealth>,
    daemon: Option<ConfigFileDaemon>,
    project_constraints: Option<Vec<String>>,
}

#[derive(Debug, Deserialize, Default)]
struct ConfigFileGraph {
    backend: Option<String>,
    path: Option<String>,
    host: Option<String>,
    port: Option<u16>,
    password: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct ConfigFileLlm {
    provider: Option<String>,
    model: Option<String>,
    api_key: Option<String>,
    base_url: Option<String>,
    timeout_ms: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
struct ConfigFileExtractor {
    batch_size: Option<usize>,
    interval_seconds: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
struct ConfigFilePlan {
    max_context_tokens: Option<usize>,
}

#[derive(Debug, Deserialize, Default)]
struct ConfigFileHealth {
    tick_seconds: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
struct ConfigFileDaemon {
    grace_seconds: Option<u64>,
}

impl MembriaConfig {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads configuration from a TOML file path, then applies environment
    /// overrides.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::OperationFailed`] if the file cannot be read
    /// or parsed, or [`crate::Error::Validation`] if the parsed values fail
    /// validation.
    pub fn load_from_file(path: &std::path::Path) -> crate::Result<Self> {
        let contents =
            std::fs::read_to_string(path).map_err(|e| crate::Error::OperationFailed {
                operation: "read_config_file".to_string(),
                cause: e.to_string(),
            })?;
        let file: ConfigFile =
            toml::from_str(&contents).map_err(|e| crate::Error::OperationFailed {
                operation: "parse_config_file".to_string(),
                cause: e.to_string(),
            })?;

        let mut config = Self::default();
        config.apply_config_file(file);
        config.config_sources.push(path.to_path_buf());
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Loads configuration from the default location
    /// (`~/.config/membria/config.toml`), falling back to defaults if absent.
    #[must_use]
    pub fn load_default() -> Self {
        let Some(base_dirs) = directories::BaseDirs::new() else {
            let mut config = Self::default();
            config.apply_env_overrides();
            return config;
        };

        let config_dir = base_dirs.home_dir().join(".config").join("membria");
        let mut config = Self {
            data_dir: config_dir.clone(),
            ..Self::default()
        };

        let config_path = config_dir.join("config.toml");
        if let Ok(contents) = std::fs::read_to_string(&config_path) {
            match toml::from_str::<ConfigFile>(&contents) {
                Ok(file) => {
                    config.apply_config_file(file);
                    config.config_sources.push(config_path);
                },
                Err(e) => {
                    tracing::warn!(path = %config_path.display(), error = %e, "failed to parse config file");
                },
            }
        }

        config.apply_env_overrides();
        config
    }

    fn apply_config_file(&mut self, file: ConfigFile) {
        if let Some(dir) = file.data_dir {
            self.data_dir = PathBuf::from(dir);
        }
        if let Some(g) = file.graph {
            if let Some(backend) = g.backend {
                self.graph.backend = backend;
            }
            if let Some(p) = g.path {
                self.graph.path = Some(PathBuf::from(p));
            }
            self.graph.host = g.host;
            self.graph.port = g.port;
            self.graph.password = g.password.map(|p| expand_env_vars(&p).into_owned());
        }
        if let Some(l) = file.llm {
            if let Some(provider) = l.provider {
                self.llm.provider = provider;
            }
            if let Some(model) = l.model.filter(|v| !v.trim().is_empty()) {
                self.llm.model = Some(model);
            }
            if let Some(key) = l.api_key.filter(|v| !v.trim().is_empty()) {
                self.llm.api_key = Some(expand_env_vars(&key).into_owned());
            }
            if let Some(url) = l.base_url.filter(|v| !v.trim().is_empty()) {
                self.llm.base_url = Some(url);
            }
            if let Some(ms) = l.timeout_ms {
                self.llm.timeout_ms = ms;
            }
        }
        if let Some(e) = file.extractor {
            if let Some(n) = e.batch_size {
                self.extractor.batch_size = n;
            }
            if let Some(s) = e.interval_seconds {
                self.extractor.interval_seconds = s;
            }
        }
        if let Some(p) = file.plan {
            if let Some(t) = p.max_context_tokens {
                self.plan.max_context_tokens = t;
            }
        }
        if let Some(h) = file.health {
            if let Some(s) = h.tick_seconds {
                self.health.tick_seconds = s;
            }
        }
        if let Some(d) = file.daemon {
            if let Some(s) = d.grace_seconds {
                self.daemon.grace_seconds = s;
            }
        }
        if let Some(c) = file.project_constraints {
            self.project_constraints = c;
        }
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(v) = std::env::var("MEMBRIA_DATA_DIR") {
            self.data_dir = PathBuf::from(v);
        }
        if let Ok(v) = std::env::var("MEMBRIA_LLM_PROVIDER") {
            self.llm.provider = v;
        }
        if let Ok(v) = std::env::var("MEMBRIA_LLM_MODEL") {
            self.llm.model = Some(v);
        }
        if let Ok(v) = std::env::var("MEMBRIA_LLM_API_KEY") {
            self.llm.api_key = Some(expand_env_vars(&v).into_owned());
        }
        if let Ok(v) = std::env::var("MEMBRIA_EXTRACTOR_BATCH_SIZE") {
            if let Ok(n) = v.parse() {
                self.extractor.batch_size = n;
            }
        }
        if let Ok(v) = std::env::var("MEMBRIA_EXTRACTOR_INTERVAL_SECONDS") {
            if let Ok(n) = v.parse() {
                self.extractor.interval_seconds = n;
            }
        }
    }

    /// Validates cross-field invariants that can't be expressed in the type
    /// system (non-zero cadences, sane budgets).
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Validation`] on the first violated invariant.
    pub fn validate(&self) -> crate::Result<()> {
        if self.extractor.batch_size == 0 {
            return Err(crate::Error::Validation(
                "extractor.batch_size must be >= 1".to_string(),
            ));
        }
        if self.plan.max_context_tokens == 0 {
            return Err(crate::Error::Validation(
                "plan.max_context_tokens must be >= 1".to_string(),
            ));
        }
        if self.health.tick_seconds == 0 {
            return Err(crate::Error::Validation(
                "health.tick_seconds must be >= 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Resolves the `SQLite` database path for the reasoning graph.
    #[must_use]
    pub fn graph_db_path(&self) -> PathBuf {
        self.graph
            .path
            .clone()
            .unwrap_or_else(|| self.data_dir.join("graph.db"))
    }

    /// Resolves the `SQLite` database path for the signal queue and
    /// extraction cache (co-located in one file; see [`crate::queue`]).
    #[must_use]
    pub fn queue_db_path(&self) -> PathBuf {
        self.data_dir.join("queue.db")
    }

    /// Sets the data directory.
    #[must_use]
    pub fn with_data_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.data_dir = path.into();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expand_env_vars_with_existing_var() {
        let var_name = if cfg!(windows) { "USERPROFILE" } else { "HOME" };
        if let Ok(expected) = std::env::var(var_name) {
            let input = format!("${{{var_name}}}");
            assert_eq!(expand_env_vars(&input), expected);
        }
    }

    #[test]
    fn expand_env_vars_missing_var_preserved() {
        let result = expand_env_vars("${DEFINITELY_NOT_SET_MEMBRIA_TEST}");
        assert_eq!(result, "${DEFINITELY_NOT_SET_MEMBRIA_TEST}");
    }

    #[test]
    fn default_config_validates() {
        assert!(MembriaConfig::default().validate().is_ok());
    }

    #[test]
    fn zero_batch_size_fails_validation() {
        let mut config = MembriaConfig::default();
        config.extractor.batch_size = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn llm_disabled_without_api_key() {
        assert!(!MembriaConfig::default().llm.is_enabled());
    }

    #[test]
    fn load_from_file_parses_toml_and_env() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            r#"
            data_dir = "/tmp/membria-data"

            [extractor]
            batch_size = 25
            interval_seconds = 120

            [plan]
            max_context_tokens = 2000
            "#,
        )
        .unwrap();

        let config = MembriaConfig::load_from_file(&path).unwrap();
        assert_eq!(config.data_dir, PathBuf::from("/tmp/membria-data"));
        assert_eq!(config.extractor.batch_size, 25);
        assert_eq!(config.extractor.interval_seconds, 120);
        assert_eq!(config.plan.max_context_tokens, 2000);
    }

    #[test]
    fn load_from_file_rejects_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope.toml");
        assert!(MembriaConfig::load_from_file(&missing).is_err());
    }
}

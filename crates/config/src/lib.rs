//! Configuration loading, validation, and management for vcassist.
//!
//! Loads configuration from `~/.vcassist/config.toml` with environment
//! variable overrides. Validates all settings at startup.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// The root configuration structure.
///
/// Maps directly to `~/.vcassist/config.toml`.
#[derive(Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// API key (can be overridden per-provider)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Default LLM provider
    #[serde(default = "default_provider")]
    pub default_provider: String,

    /// Default chat model
    #[serde(default = "default_model")]
    pub default_model: String,

    /// Sampling temperature; operations answers want determinism
    #[serde(default = "default_temperature")]
    pub default_temperature: f32,

    /// Default max tokens per LLM response
    #[serde(default = "default_max_tokens")]
    pub default_max_tokens: u32,

    /// Reasoning loop settings
    #[serde(default)]
    pub agent: AgentConfig,

    /// Managed system connection
    #[serde(default)]
    pub vcenter: VcenterConfig,

    /// Runbook index connection
    #[serde(default)]
    pub retrieval: RetrievalConfig,

    /// Provider-specific configurations
    #[serde(default)]
    pub providers: HashMap<String, ProviderConfig>,
}

fn default_provider() -> String {
    "openai".into()
}
fn default_model() -> String {
    "gpt-4o-mini".into()
}
fn default_temperature() -> f32 {
    0.0
}
fn default_max_tokens() -> u32 {
    2048
}

fn redact(s: &Option<String>) -> &'static str {
    match s {
        Some(_) => "[REDACTED]",
        None => "None",
    }
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("api_key", &redact(&self.api_key))
            .field("default_provider", &self.default_provider)
            .field("default_model", &self.default_model)
            .field("default_temperature", &self.default_temperature)
            .field("default_max_tokens", &self.default_max_tokens)
            .field("agent", &self.agent)
            .field("vcenter", &self.vcenter)
            .field("retrieval", &self.retrieval)
            .field("providers", &self.providers)
            .finish()
    }
}

impl std::fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("api_key", &redact(&self.api_key))
            .field("api_url", &self.api_url)
            .field("default_model", &self.default_model)
            .finish()
    }
}

impl std::fmt::Debug for VcenterConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VcenterConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &redact(&self.password))
            .field("ssl_verify", &self.ssl_verify)
            .field("session_timeout_secs", &self.session_timeout_secs)
            .field("call_timeout_secs", &self.call_timeout_secs)
            .finish()
    }
}

impl std::fmt::Debug for RetrievalConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetrievalConfig")
            .field("connection_string", &redact(&self.connection_string))
            .field("collection", &self.collection)
            .field("top_k", &self.top_k)
            .field("embedding_model", &self.embedding_model)
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Upper bound on model/tool rounds per user message
    #[serde(default = "default_max_rounds")]
    pub max_rounds: u32,

    /// Prior turns handed to the loop (hard cap, not a token budget)
    #[serde(default = "default_max_history")]
    pub max_history: usize,

    /// Run the tool requests of one round concurrently
    #[serde(default)]
    pub parallel_tool_calls: bool,

    #[serde(default = "default_model_timeout")]
    pub model_timeout_secs: u64,
}

fn default_max_rounds() -> u32 {
    10
}
fn default_max_history() -> usize {
    20
}
fn default_model_timeout() -> u64 {
    120
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_rounds: default_max_rounds(),
            max_history: default_max_history(),
            parallel_tool_calls: false,
            model_timeout_secs: default_model_timeout(),
        }
    }
}

#[derive(Clone, Serialize, Deserialize)]
pub struct VcenterConfig {
    #[serde(default)]
    pub host: String,

    #[serde(default = "default_vcenter_port")]
    pub port: u16,

    #[serde(default)]
    pub username: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,

    /// Verify the server certificate (self-signed appliances are common)
    #[serde(default)]
    pub ssl_verify: bool,

    /// Bound on opening (and closing) a session
    #[serde(default = "default_session_timeout")]
    pub session_timeout_secs: u64,

    /// Bound on each individual remote call inside a session
    #[serde(default = "default_call_timeout")]
    pub call_timeout_secs: u64,
}

fn default_vcenter_port() -> u16 {
    443
}
fn default_session_timeout() -> u64 {
    30
}
fn default_call_timeout() -> u64 {
    60
}

impl Default for VcenterConfig {
    fn default() -> Self {
        Self {
            host: String::new(),
            port: default_vcenter_port(),
            username: String::new(),
            password: None,
            ssl_verify: false,
            session_timeout_secs: default_session_timeout(),
            call_timeout_secs: default_call_timeout(),
        }
    }
}

impl VcenterConfig {
    pub fn is_configured(&self) -> bool {
        !self.host.is_empty()
    }

    /// Base URL of the management endpoint.
    pub fn base_url(&self) -> String {
        if self.port == 443 {
            format!("https://{}", self.host)
        } else {
            format!("https://{}:{}", self.host, self.port)
        }
    }
}

#[derive(Clone, Serialize, Deserialize)]
pub struct RetrievalConfig {
    /// PostgreSQL connection string for the pgvector index
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connection_string: Option<String>,

    /// Collection name written by the ingestion pipeline
    #[serde(default = "default_collection")]
    pub collection: String,

    #[serde(default = "default_top_k")]
    pub top_k: usize,

    #[serde(default = "default_embedding_model")]
    pub embedding_model: String,

    #[serde(default = "default_retrieval_timeout")]
    pub timeout_secs: u64,
}

fn default_collection() -> String {
    "vcenter_runbooks".into()
}
fn default_top_k() -> usize {
    4
}
fn default_embedding_model() -> String {
    "text-embedding-3-small".into()
}
fn default_retrieval_timeout() -> u64 {
    30
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            connection_string: None,
            collection: default_collection(),
            top_k: default_top_k(),
            embedding_model: default_embedding_model(),
            timeout_secs: default_retrieval_timeout(),
        }
    }
}

#[derive(Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_url: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_model: Option<String>,
}

impl AppConfig {
    /// Load configuration from the default path (~/.vcassist/config.toml),
    /// then apply process environment overrides.
    ///
    /// API key lookup order: `VCASSIST_API_KEY`, then `OPENAI_API_KEY`.
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_dir().join("config.toml");
        Self::load_with_env(&config_path)
    }

    /// Load a specific file, then apply process environment overrides.
    pub fn load_with_env(path: &Path) -> Result<Self, ConfigError> {
        let mut config = Self::read_file(path)?;
        config.apply_env_overrides_from(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific file path, without env overrides.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let config = Self::read_file(path)?;
        config.validate()?;
        Ok(config)
    }

    fn read_file(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!("No config file found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
    }

    /// Apply environment overrides through `lookup`.
    ///
    /// Values present in the environment win over the file. A malformed
    /// number or boolean is rejected rather than ignored.
    pub fn apply_env_overrides_from<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if self.api_key.is_none() {
            self.api_key = lookup("VCASSIST_API_KEY").or_else(|| lookup("OPENAI_API_KEY"));
        }
        if let Some(provider) = lookup("VCASSIST_PROVIDER") {
            self.default_provider = provider;
        }
        if let Some(model) = lookup("LLM_MODEL_ID") {
            self.default_model = model;
        }
        if let Some(v) = lookup("LLM_TEMPERATURE") {
            self.default_temperature = parse_env("LLM_TEMPERATURE", &v)?;
        }
        if let Some(v) = lookup("LLM_MAX_TOKENS") {
            self.default_max_tokens = parse_env("LLM_MAX_TOKENS", &v)?;
        }
        if let Some(v) = lookup("MAX_CHAT_HISTORY") {
            self.agent.max_history = parse_env("MAX_CHAT_HISTORY", &v)?;
        }

        if let Some(host) = lookup("VCENTER_HOST") {
            self.vcenter.host = host;
        }
        if let Some(user) = lookup("VCENTER_USERNAME") {
            self.vcenter.username = user;
        }
        if let Some(password) = lookup("VCENTER_PASSWORD") {
            self.vcenter.password = Some(password);
        }
        if let Some(v) = lookup("VCENTER_PORT") {
            self.vcenter.port = parse_env("VCENTER_PORT", &v)?;
        }
        if let Some(v) = lookup("VCENTER_SSL_VERIFY") {
            self.vcenter.ssl_verify = parse_bool("VCENTER_SSL_VERIFY", &v)?;
        }

        if let Some(conn) = lookup("PG_CONNECTION_STRING").filter(|s| !s.is_empty()) {
            self.retrieval.connection_string = Some(conn);
        }
        if let Some(collection) = lookup("PG_COLLECTION_NAME") {
            self.retrieval.collection = collection;
        }
        if let Some(v) = lookup("RAG_TOP_K") {
            self.retrieval.top_k = parse_env("RAG_TOP_K", &v)?;
        }
        if let Some(model) = lookup("EMBED_MODEL_ID") {
            self.retrieval.embedding_model = model;
        }

        Ok(())
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".vcassist")
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.default_temperature < 0.0 || self.default_temperature > 2.0 {
            return Err(ConfigError::ValidationError(
                "default_temperature must be between 0.0 and 2.0".into(),
            ));
        }
        if self.agent.max_rounds == 0 {
            return Err(ConfigError::ValidationError("agent.max_rounds must be >= 1".into()));
        }
        if self.agent.model_timeout_secs == 0 {
            return Err(ConfigError::ValidationError(
                "agent.model_timeout_secs must be > 0".into(),
            ));
        }
        if self.vcenter.session_timeout_secs == 0 || self.vcenter.call_timeout_secs == 0 {
            return Err(ConfigError::ValidationError(
                "vcenter timeouts must be > 0".into(),
            ));
        }
        if self.retrieval.top_k == 0 {
            return Err(ConfigError::ValidationError("retrieval.top_k must be >= 1".into()));
        }
        if self.retrieval.timeout_secs == 0 {
            return Err(ConfigError::ValidationError(
                "retrieval.timeout_secs must be > 0".into(),
            ));
        }
        Ok(())
    }

    /// Check if an API key is available (from config or environment).
    pub fn has_api_key(&self) -> bool {
        self.api_key.is_some()
    }

    /// Generate a default config TOML string.
    pub fn default_toml() -> String {
        let config = Self::default();
        toml::to_string_pretty(&config).unwrap_or_default()
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            default_provider: default_provider(),
            default_model: default_model(),
            default_temperature: default_temperature(),
            default_max_tokens: default_max_tokens(),
            agent: AgentConfig::default(),
            vcenter: VcenterConfig::default(),
            retrieval: RetrievalConfig::default(),
            providers: HashMap::new(),
        }
    }
}

fn parse_env<T: FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| {
        ConfigError::ValidationError(format!("{key} has an invalid value: '{value}'"))
    })
}

fn parse_bool(key: &str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::ValidationError(format!(
            "{key} has an invalid value: '{value}'"
        ))),
    }
}

/// Get the user's home directory.
fn dirs_home() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("C:\\Users\\Default"))
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/tmp"))
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {reason}")]
    ReadError { path: PathBuf, reason: String },

    #[error("Failed to parse config file at {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn env_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn default_config_is_valid() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.default_provider, "openai");
        assert_eq!(config.default_max_tokens, 2048);
        assert_eq!(config.agent.max_history, 20);
        assert_eq!(config.agent.max_rounds, 10);
        assert_eq!(config.retrieval.top_k, 4);
        assert_eq!(config.retrieval.collection, "vcenter_runbooks");
        assert_eq!(config.vcenter.port, 443);
        assert!(!config.vcenter.ssl_verify);
    }

    #[test]
    fn config_roundtrip_toml() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        let parsed: AppConfig = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed.default_provider, config.default_provider);
        assert_eq!(parsed.retrieval.collection, config.retrieval.collection);
    }

    #[test]
    fn invalid_temperature_rejected() {
        let config = AppConfig {
            default_temperature: 5.0,
            ..AppConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn zero_round_budget_rejected() {
        let mut config = AppConfig::default();
        config.agent.max_rounds = 0;
        assert!(matches!(config.validate(), Err(ConfigError::ValidationError(_))));
    }

    #[test]
    fn missing_config_file_returns_defaults() {
        let config = AppConfig::load_from(Path::new("/nonexistent/config.toml")).unwrap();
        assert_eq!(config.default_provider, "openai");
    }

    #[test]
    fn loads_sections_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
default_model = "gpt-4o"

[agent]
max_rounds = 4
parallel_tool_calls = true

[vcenter]
host = "vcsa.lab.local"
username = "administrator@vsphere.local"
password = "secret"

[retrieval]
top_k = 6
"#
        )
        .unwrap();

        let config = AppConfig::load_from(file.path()).unwrap();
        assert_eq!(config.default_model, "gpt-4o");
        assert_eq!(config.agent.max_rounds, 4);
        assert!(config.agent.parallel_tool_calls);
        assert_eq!(config.agent.max_history, 20);
        assert_eq!(config.vcenter.base_url(), "https://vcsa.lab.local");
        assert_eq!(config.retrieval.top_k, 6);
    }

    #[test]
    fn malformed_file_is_parse_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[agent\nmax_rounds = ").unwrap();
        assert!(matches!(
            AppConfig::load_from(file.path()),
            Err(ConfigError::ParseError { .. })
        ));
    }

    #[test]
    fn env_overrides_win_over_file_values() {
        let mut config = AppConfig::default();
        config
            .apply_env_overrides_from(env_from(&[
                ("VCENTER_HOST", "10.0.0.5"),
                ("VCENTER_PORT", "8443"),
                ("VCENTER_SSL_VERIFY", "true"),
                ("VCENTER_PASSWORD", "pw"),
                ("RAG_TOP_K", "8"),
                ("MAX_CHAT_HISTORY", "6"),
                ("PG_COLLECTION_NAME", "ops_docs"),
                ("LLM_TEMPERATURE", "0.2"),
                ("OPENAI_API_KEY", "sk-test"),
            ]))
            .unwrap();

        assert_eq!(config.vcenter.host, "10.0.0.5");
        assert_eq!(config.vcenter.base_url(), "https://10.0.0.5:8443");
        assert!(config.vcenter.ssl_verify);
        assert_eq!(config.retrieval.top_k, 8);
        assert_eq!(config.agent.max_history, 6);
        assert_eq!(config.retrieval.collection, "ops_docs");
        assert!((config.default_temperature - 0.2).abs() < f32::EPSILON);
        assert_eq!(config.api_key.as_deref(), Some("sk-test"));
    }

    #[test]
    fn project_api_key_takes_precedence() {
        let mut config = AppConfig::default();
        config
            .apply_env_overrides_from(env_from(&[
                ("VCASSIST_API_KEY", "primary"),
                ("OPENAI_API_KEY", "secondary"),
            ]))
            .unwrap();
        assert_eq!(config.api_key.as_deref(), Some("primary"));
    }

    #[test]
    fn malformed_numeric_env_is_rejected() {
        let mut config = AppConfig::default();
        let err = config
            .apply_env_overrides_from(env_from(&[("RAG_TOP_K", "four")]))
            .unwrap_err();
        assert!(err.to_string().contains("RAG_TOP_K"));
    }

    #[test]
    fn empty_connection_string_is_ignored() {
        let mut config = AppConfig::default();
        config
            .apply_env_overrides_from(env_from(&[("PG_CONNECTION_STRING", "")]))
            .unwrap();
        assert!(config.retrieval.connection_string.is_none());
    }

    #[test]
    fn debug_output_redacts_secrets() {
        let mut config = AppConfig::default();
        config.api_key = Some("sk-live-123".into());
        config.vcenter.password = Some("hunter2".into());
        config.retrieval.connection_string = Some("postgresql://u:p@db/rag".into());

        let debug = format!("{config:?}");
        assert!(!debug.contains("sk-live-123"));
        assert!(!debug.contains("hunter2"));
        assert!(!debug.contains("u:p@db"));
        assert!(debug.contains("[REDACTED]"));
    }

    #[test]
    fn default_toml_generation() {
        let toml_str = AppConfig::default_toml();
        assert!(toml_str.contains("vcenter_runbooks"));
        assert!(toml_str.contains("max_rounds"));
    }
}

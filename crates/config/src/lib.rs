//! Configuration loading, validation, and management for NewsDesk.
//!
//! Loads configuration from `~/.newsdesk/config.toml` with environment
//! variable overrides. Validates all settings at startup.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// The root configuration structure.
///
/// Maps directly to `~/.newsdesk/config.toml`.
#[derive(Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// API key (can be overridden per-provider)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Provider used for every upstream call
    #[serde(default = "default_provider")]
    pub default_provider: String,

    /// Model selection and classification policy
    #[serde(default)]
    pub agent: AgentConfig,

    /// Vector search parameters
    #[serde(default)]
    pub retrieval: RetrievalConfig,

    /// Outward stream pacing
    #[serde(default)]
    pub pacing: PacingConfig,

    /// Escalation behavior
    #[serde(default)]
    pub fallback: FallbackConfig,

    /// Vector index backend
    #[serde(default)]
    pub index: IndexConfig,

    /// Provider-specific configurations
    #[serde(default)]
    pub providers: HashMap<String, ProviderConfig>,
}

fn default_provider() -> String {
    "openai".into()
}

/// Redact a secret string for Debug output.
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
            .field("agent", &self.agent)
            .field("retrieval", &self.retrieval)
            .field("pacing", &self.pacing)
            .field("fallback", &self.fallback)
            .field("index", &self.index)
            .field("providers", &self.providers)
            .finish()
    }
}

impl std::fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("api_key", &redact(&self.api_key))
            .field("api_url", &self.api_url)
            .finish()
    }
}

impl std::fmt::Debug for IndexConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IndexConfig")
            .field("backend", &self.backend)
            .field("articles_file", &self.articles_file)
            .field("endpoint", &self.endpoint)
            .field("api_key", &redact(&self.api_key))
            .field("data_source", &self.data_source)
            .field("database", &self.database)
            .field("collection", &self.collection)
            .field("index_name", &self.index_name)
            .field("path", &self.path)
            .finish()
    }
}

/// What to do when the classifier answers with neither label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum UnrecognizedPolicy {
    /// Log the anomaly and end the turn after the opening narration.
    #[default]
    End,
    /// Fail the turn with an explicit error.
    Error,
    /// Treat the turn as unanswerable from context and escalate.
    WebSearch,
}

/// How an empty retrieval is answered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum EmptyRetrievalMode {
    /// Streamed completion under the fallback policy, no live lookup.
    #[default]
    ModelOnly,
    /// Tool-augmented completion with live web search.
    WebSearch,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum IndexBackend {
    #[default]
    Memory,
    Atlas,
}

impl std::fmt::Display for IndexBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Memory => f.write_str("memory"),
            Self::Atlas => f.write_str("atlas"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    #[serde(default = "default_fast_model")]
    pub classifier_model: String,

    #[serde(default = "default_fast_model")]
    pub rewrite_model: String,

    #[serde(default = "default_fast_model")]
    pub answer_model: String,

    #[serde(default = "default_fallback_model")]
    pub fallback_model: String,

    /// Model used with the live web search tool
    #[serde(default = "default_search_model")]
    pub search_model: String,

    #[serde(default = "default_embedding_model")]
    pub embedding_model: String,

    #[serde(default = "default_title_model")]
    pub title_model: String,

    #[serde(default)]
    pub on_unrecognized: UnrecognizedPolicy,
}

fn default_fast_model() -> String {
    "gpt-3.5-turbo".into()
}
fn default_fallback_model() -> String {
    "gpt-4o".into()
}
fn default_search_model() -> String {
    "gpt-4.1".into()
}
fn default_embedding_model() -> String {
    "text-embedding-ada-002".into()
}
fn default_title_model() -> String {
    "gpt-4".into()
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            classifier_model: default_fast_model(),
            rewrite_model: default_fast_model(),
            answer_model: default_fast_model(),
            fallback_model: default_fallback_model(),
            search_model: default_search_model(),
            embedding_model: default_embedding_model(),
            title_model: default_title_model(),
            on_unrecognized: UnrecognizedPolicy::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalConfig {
    /// Expected embedding length
    #[serde(default = "default_dimension")]
    pub dimension: usize,

    #[serde(default = "default_num_candidates")]
    pub num_candidates: usize,

    #[serde(default = "default_limit")]
    pub limit: usize,

    #[serde(default = "default_min_score")]
    pub min_score: f32,
}

fn default_dimension() -> usize {
    1536
}
fn default_num_candidates() -> usize {
    100
}
fn default_limit() -> usize {
    5
}
fn default_min_score() -> f32 {
    0.70
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            dimension: default_dimension(),
            num_candidates: default_num_candidates(),
            limit: default_limit(),
            min_score: default_min_score(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PacingConfig {
    /// Delay between narration tokens
    #[serde(default = "default_token_delay_ms")]
    pub token_delay_ms: u64,

    /// Delay before an articles envelope
    #[serde(default = "default_article_delay_ms")]
    pub article_delay_ms: u64,

    /// Capacity of the outward envelope channel
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
}

fn default_token_delay_ms() -> u64 {
    50
}
fn default_article_delay_ms() -> u64 {
    700
}
fn default_channel_capacity() -> usize {
    64
}

impl Default for PacingConfig {
    fn default() -> Self {
        Self {
            token_delay_ms: default_token_delay_ms(),
            article_delay_ms: default_article_delay_ms(),
            channel_capacity: default_channel_capacity(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FallbackConfig {
    #[serde(default)]
    pub empty_retrieval: EmptyRetrievalMode,

    /// Trailing turns handed to the live lookup
    #[serde(default = "default_context_turns")]
    pub context_turns: usize,
}

fn default_context_turns() -> usize {
    1
}

impl Default for FallbackConfig {
    fn default() -> Self {
        Self {
            empty_retrieval: EmptyRetrievalMode::default(),
            context_turns: default_context_turns(),
        }
    }
}

#[derive(Clone, Serialize, Deserialize)]
pub struct IndexConfig {
    #[serde(default)]
    pub backend: IndexBackend,

    /// JSON file of pre-embedded articles for the memory backend
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub articles_file: Option<PathBuf>,

    /// Atlas Data API base URL (e.g. `https://data.mongodb-api.com/app/<id>/endpoint/data/v1`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    #[serde(default = "default_data_source")]
    pub data_source: String,

    #[serde(default = "default_database")]
    pub database: String,

    #[serde(default = "default_collection")]
    pub collection: String,

    #[serde(default = "default_index_name")]
    pub index_name: String,

    /// Document field holding the embedding
    #[serde(default = "default_vector_path")]
    pub path: String,
}

fn default_data_source() -> String {
    "Cluster0".into()
}
fn default_database() -> String {
    "test".into()
}
fn default_collection() -> String {
    "articles".into()
}
fn default_index_name() -> String {
    "vector_index".into()
}
fn default_vector_path() -> String {
    "embedding".into()
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            backend: IndexBackend::default(),
            articles_file: None,
            endpoint: None,
            api_key: None,
            data_source: default_data_source(),
            database: default_database(),
            collection: default_collection(),
            index_name: default_index_name(),
            path: default_vector_path(),
        }
    }
}

#[derive(Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_url: Option<String>,
}

impl AppConfig {
    /// Load configuration from the default path (~/.newsdesk/config.toml).
    ///
    /// Also checks environment variables:
    /// - `NEWSDESK_API_KEY` (highest priority)
    /// - `OPENAI_API_KEY`
    /// - `NEWSDESK_PROVIDER`
    /// - `NEWSDESK_ATLAS_API_KEY`
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_path();
        let mut config = Self::load_from(&config_path)?;
        config.apply_env();
        Ok(config)
    }

    fn apply_env(&mut self) {
        if self.api_key.is_none() {
            self.api_key = std::env::var("NEWSDESK_API_KEY")
                .ok()
                .or_else(|| std::env::var("OPENAI_API_KEY").ok());
        }

        if let Ok(provider) = std::env::var("NEWSDESK_PROVIDER") {
            self.default_provider = provider;
        }

        if self.index.api_key.is_none() {
            self.index.api_key = std::env::var("NEWSDESK_ATLAS_API_KEY").ok();
        }
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!("No config file found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".newsdesk")
    }

    pub fn config_path() -> PathBuf {
        Self::config_dir().join("config.toml")
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let r = &self.retrieval;

        if !(0.0..=1.0).contains(&r.min_score) {
            return Err(ConfigError::ValidationError(
                "retrieval.min_score must be between 0.0 and 1.0".into(),
            ));
        }

        if r.limit == 0 {
            return Err(ConfigError::ValidationError(
                "retrieval.limit must be at least 1".into(),
            ));
        }

        if r.num_candidates < r.limit {
            return Err(ConfigError::ValidationError(format!(
                "retrieval.num_candidates ({}) must be >= retrieval.limit ({})",
                r.num_candidates, r.limit
            )));
        }

        if r.dimension == 0 {
            return Err(ConfigError::ValidationError(
                "retrieval.dimension must be at least 1".into(),
            ));
        }

        if self.fallback.context_turns == 0 {
            return Err(ConfigError::ValidationError(
                "fallback.context_turns must be at least 1".into(),
            ));
        }

        if self.pacing.channel_capacity == 0 {
            return Err(ConfigError::ValidationError(
                "pacing.channel_capacity must be at least 1".into(),
            ));
        }

        Ok(())
    }

    /// Check if an API key is available (from config or environment).
    pub fn has_api_key(&self) -> bool {
        self.api_key.is_some()
            || self
                .providers
                .get(&self.default_provider)
                .is_some_and(|p| p.api_key.is_some())
    }

    /// Generate a default config TOML string (for `onboard` command).
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
            agent: AgentConfig::default(),
            retrieval: RetrievalConfig::default(),
            pacing: PacingConfig::default(),
            fallback: FallbackConfig::default(),
            index: IndexConfig::default(),
            providers: HashMap::new(),
        }
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

    #[test]
    fn default_config_is_valid() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.default_provider, "openai");
        assert_eq!(config.retrieval.limit, 5);
        assert_eq!(config.retrieval.num_candidates, 100);
        assert!((config.retrieval.min_score - 0.70).abs() < f32::EPSILON);
        assert_eq!(config.pacing.token_delay_ms, 50);
        assert_eq!(config.pacing.article_delay_ms, 700);
        assert_eq!(config.agent.on_unrecognized, UnrecognizedPolicy::End);
        assert_eq!(config.fallback.empty_retrieval, EmptyRetrievalMode::ModelOnly);
    }

    #[test]
    fn config_roundtrip_toml() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        let parsed: AppConfig = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed.default_provider, config.default_provider);
        assert_eq!(parsed.agent.search_model, "gpt-4.1");
        assert_eq!(parsed.index.backend, IndexBackend::Memory);
    }

    #[test]
    fn out_of_range_score_rejected() {
        let mut config = AppConfig::default();
        config.retrieval.min_score = 1.5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn candidates_below_limit_rejected() {
        let mut config = AppConfig::default();
        config.retrieval.num_candidates = 3;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("num_candidates"));
    }

    #[test]
    fn zero_context_turns_rejected() {
        let mut config = AppConfig::default();
        config.fallback.context_turns = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn missing_config_file_returns_defaults() {
        let result = AppConfig::load_from(Path::new("/nonexistent/config.toml"));
        assert!(result.is_ok());
        assert_eq!(result.unwrap().retrieval.dimension, 1536);
    }

    #[test]
    fn load_from_file_with_sections() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"
default_provider = "openrouter"

[agent]
fallback_model = "gpt-4o-mini"
on_unrecognized = "web_search"

[retrieval]
min_score = 0.8
limit = 3

[fallback]
empty_retrieval = "web_search"

[index]
backend = "atlas"
endpoint = "https://data.example.com/app/x/endpoint/data/v1"
collection = "news"

[providers.openrouter]
api_key = "sk-test"
"#
        )
        .unwrap();

        let config = AppConfig::load_from(file.path()).unwrap();
        assert_eq!(config.default_provider, "openrouter");
        assert_eq!(config.agent.fallback_model, "gpt-4o-mini");
        assert_eq!(config.agent.classifier_model, "gpt-3.5-turbo");
        assert_eq!(config.agent.on_unrecognized, UnrecognizedPolicy::WebSearch);
        assert_eq!(config.retrieval.limit, 3);
        assert_eq!(config.retrieval.num_candidates, 100);
        assert_eq!(config.fallback.empty_retrieval, EmptyRetrievalMode::WebSearch);
        assert_eq!(config.index.backend, IndexBackend::Atlas);
        assert_eq!(config.index.collection, "news");
        assert_eq!(config.index.index_name, "vector_index");
        assert!(config.has_api_key());
    }

    #[test]
    fn invalid_file_reports_parse_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "[retrieval\nlimit = ").unwrap();
        assert!(matches!(
            AppConfig::load_from(file.path()),
            Err(ConfigError::ParseError { .. })
        ));
    }

    #[test]
    fn invalid_values_fail_on_load() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "[retrieval]\nlimit = 0\n").unwrap();
        assert!(matches!(
            AppConfig::load_from(file.path()),
            Err(ConfigError::ValidationError(_))
        ));
    }

    #[test]
    fn debug_redacts_secrets() {
        let mut config = AppConfig {
            api_key: Some("sk-secret".into()),
            ..AppConfig::default()
        };
        config.index.api_key = Some("atlas-secret".into());
        let debug = format!("{config:?}");
        assert!(!debug.contains("sk-secret"));
        assert!(!debug.contains("atlas-secret"));
        assert!(debug.contains("[REDACTED]"));
    }

    #[test]
    fn default_toml_generation() {
        let toml_str = AppConfig::default_toml();
        assert!(toml_str.contains("[retrieval]"));
        assert!(toml_str.contains("text-embedding-ada-002"));
        assert!(toml_str.contains("model_only"));
    }
}

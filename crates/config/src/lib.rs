//! Configuration loading, validation, and management for hearth.
//!
//! Loads configuration from `~/.hearth/config.toml` with environment
//! variable overrides. Validates all settings at startup.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// The root configuration structure.
///
/// Maps directly to `~/.hearth/config.toml`.
#[derive(Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// API key (can be overridden per-provider)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Default generation provider
    #[serde(default = "default_provider")]
    pub default_provider: String,

    /// Default model
    #[serde(default = "default_model")]
    pub default_model: String,

    /// Default temperature for free-text replies
    #[serde(default = "default_temperature")]
    pub default_temperature: f32,

    /// Default max tokens per generation
    #[serde(default = "default_max_tokens")]
    pub default_max_tokens: u32,

    #[serde(default)]
    pub gateway: GatewayConfig,

    /// Per-chat limit applied by the orchestrator (`source:chatId` keys)
    #[serde(default = "default_chat_rate_limit")]
    pub rate_limit: RateLimitConfig,

    #[serde(default)]
    pub store: StoreConfig,

    #[serde(default)]
    pub context: ContextConfig,

    #[serde(default)]
    pub classifier: ClassifierConfig,

    #[serde(default)]
    pub fast_path: FastPathConfig,

    #[serde(default)]
    pub quality: QualityConfig,

    #[serde(default)]
    pub agents: AgentsConfig,

    /// Provider-specific configurations
    #[serde(default)]
    pub providers: HashMap<String, ProviderConfig>,
}

fn default_provider() -> String {
    "openrouter".into()
}
fn default_model() -> String {
    "openai/gpt-4o-mini".into()
}
fn default_temperature() -> f32 {
    0.7
}
fn default_max_tokens() -> u32 {
    1024
}
fn default_true() -> bool {
    true
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
            .field("gateway", &self.gateway)
            .field("rate_limit", &self.rate_limit)
            .field("store", &self.store)
            .field("context", &self.context)
            .field("classifier", &self.classifier)
            .field("fast_path", &self.fast_path)
            .field("quality", &self.quality)
            .field("agents", &self.agents)
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

/// A sliding-window limit: at most `limit` requests per `window_ms`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitConfig {
    pub window_ms: u64,
    pub limit: usize,
}

fn default_chat_rate_limit() -> RateLimitConfig {
    RateLimitConfig {
        window_ms: 60_000,
        limit: 20,
    }
}

fn default_route_rate_limit() -> RateLimitConfig {
    RateLimitConfig {
        window_ms: 60_000,
        limit: 60,
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_host")]
    pub host: String,

    /// Per `route:identity` limit enforced by the HTTP middleware
    #[serde(default = "default_route_rate_limit")]
    pub rate_limit: RateLimitConfig,
}

fn default_port() -> u16 {
    8470
}
fn default_host() -> String {
    "127.0.0.1".into()
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            host: default_host(),
            rate_limit: default_route_rate_limit(),
        }
    }
}

/// Durable store backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    /// Process-local, lost on restart
    Memory,
    #[default]
    Sqlite,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default)]
    pub backend: StoreBackend,

    /// SQLite database file; defaults to `~/.hearth/hearth.db`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
}

impl StoreConfig {
    pub fn database_path(&self) -> PathBuf {
        self.path
            .clone()
            .unwrap_or_else(|| AppConfig::config_dir().join("hearth.db"))
    }
}

/// Conversation-context assembly and token budgets.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextConfig {
    #[serde(default = "default_max_messages")]
    pub max_messages: usize,

    #[serde(default = "default_max_age_hours")]
    pub max_age_hours: u32,

    #[serde(default)]
    pub include_system: bool,

    /// Inputs shorter than this get the conversational budget
    #[serde(default = "default_short_message_chars")]
    pub short_message_chars: usize,

    #[serde(default = "default_conversational_budget")]
    pub conversational_budget: usize,

    #[serde(default = "default_declarative_budget")]
    pub declarative_budget: usize,
}

fn default_max_messages() -> usize {
    10
}
fn default_max_age_hours() -> u32 {
    24
}
fn default_short_message_chars() -> usize {
    50
}
fn default_conversational_budget() -> usize {
    2000
}
fn default_declarative_budget() -> usize {
    1000
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            max_messages: default_max_messages(),
            max_age_hours: default_max_age_hours(),
            include_system: false,
            short_message_chars: default_short_message_chars(),
            conversational_budget: default_conversational_budget(),
            declarative_budget: default_declarative_budget(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassifierConfig {
    #[serde(default = "default_classifier_timeout")]
    pub timeout_secs: u64,
}

fn default_classifier_timeout() -> u64 {
    15
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_classifier_timeout(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FastPathConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Upstream decisions below this confidence go to full processing
    #[serde(default = "default_fast_min_confidence")]
    pub min_confidence: f32,

    #[serde(default = "default_fast_capacity")]
    pub capacity: usize,

    #[serde(default = "default_fast_ttl")]
    pub ttl_secs: u64,

    #[serde(default = "default_fast_timeout")]
    pub timeout_secs: u64,
}

fn default_fast_min_confidence() -> f32 {
    0.8
}
fn default_fast_capacity() -> usize {
    512
}
fn default_fast_ttl() -> u64 {
    3600
}
fn default_fast_timeout() -> u64 {
    10
}

impl Default for FastPathConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            min_confidence: default_fast_min_confidence(),
            capacity: default_fast_capacity(),
            ttl_secs: default_fast_ttl(),
            timeout_secs: default_fast_timeout(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QualityConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_target_quality")]
    pub target_quality: f32,

    #[serde(default = "default_max_quality_iterations")]
    pub max_iterations: u32,
}

fn default_target_quality() -> f32 {
    0.75
}
fn default_max_quality_iterations() -> u32 {
    2
}

impl Default for QualityConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            target_quality: default_target_quality(),
            max_iterations: default_max_quality_iterations(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentsConfig {
    /// Extractions below this confidence are rejected
    #[serde(default = "default_min_extraction_confidence")]
    pub min_extraction_confidence: f32,

    /// Users' local time offset, for "tomorrow at 09:00"-style resolution
    #[serde(default)]
    pub utc_offset_minutes: i32,

    #[serde(default = "default_agent_timeout")]
    pub timeout_secs: u64,
}

fn default_min_extraction_confidence() -> f32 {
    0.5
}
fn default_agent_timeout() -> u64 {
    30
}

impl Default for AgentsConfig {
    fn default() -> Self {
        Self {
            min_extraction_confidence: default_min_extraction_confidence(),
            utc_offset_minutes: 0,
            timeout_secs: default_agent_timeout(),
        }
    }
}

#[derive(Clone, Default, Serialize, Deserialize)]
pub struct ProviderConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_url: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_model: Option<String>,
}

impl AppConfig {
    /// Load configuration from the default path (~/.hearth/config.toml).
    ///
    /// Environment variables override the file:
    /// - `HEARTH_API_KEY` (highest priority), `OPENROUTER_API_KEY`, `OPENAI_API_KEY`
    /// - `HEARTH_PROVIDER`, `HEARTH_MODEL`
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_dir().join("config.toml");
        let mut config = Self::load_from(&config_path)?;
        config.apply_env(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
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

    /// Apply environment overrides through `lookup`.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if self.api_key.is_none() {
            self.api_key = lookup("HEARTH_API_KEY")
                .or_else(|| lookup("OPENROUTER_API_KEY"))
                .or_else(|| lookup("OPENAI_API_KEY"));
        }

        if let Some(provider) = lookup("HEARTH_PROVIDER") {
            self.default_provider = provider;
        }

        if let Some(model) = lookup("HEARTH_MODEL") {
            self.default_model = model;
        }
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".hearth")
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=2.0).contains(&self.default_temperature) {
            return Err(ConfigError::ValidationError(
                "default_temperature must be between 0.0 and 2.0".into(),
            ));
        }

        for (name, limit) in [
            ("rate_limit", &self.rate_limit),
            ("gateway.rate_limit", &self.gateway.rate_limit),
        ] {
            if limit.limit == 0 || limit.window_ms == 0 {
                return Err(ConfigError::ValidationError(format!(
                    "{name}: limit and window_ms must be > 0"
                )));
            }
        }

        if !(0.0..=1.0).contains(&self.quality.target_quality) {
            return Err(ConfigError::ValidationError(
                "quality.target_quality must be between 0.0 and 1.0".into(),
            ));
        }

        if !(0.0..=1.0).contains(&self.agents.min_extraction_confidence) {
            return Err(ConfigError::ValidationError(
                "agents.min_extraction_confidence must be between 0.0 and 1.0".into(),
            ));
        }

        if !(0.0..=1.0).contains(&self.fast_path.min_confidence) {
            return Err(ConfigError::ValidationError(
                "fast_path.min_confidence must be between 0.0 and 1.0".into(),
            ));
        }

        if self.context.max_messages == 0 {
            return Err(ConfigError::ValidationError(
                "context.max_messages must be > 0".into(),
            ));
        }

        Ok(())
    }

    /// Check if an API key is available (from config or environment).
    pub fn has_api_key(&self) -> bool {
        self.api_key.is_some()
    }

    /// Generate a default config TOML string (for the `config` command).
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
            gateway: GatewayConfig::default(),
            rate_limit: default_chat_rate_limit(),
            store: StoreConfig::default(),
            context: ContextConfig::default(),
            classifier: ClassifierConfig::default(),
            fast_path: FastPathConfig::default(),
            quality: QualityConfig::default(),
            agents: AgentsConfig::default(),
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

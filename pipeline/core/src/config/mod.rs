//! TOML Configuration File Support
//!
//! Centralized configuration for the server and the chat client, loaded from
//! `~/.config/zyron/zyron.toml`.
//!
//! # Configuration Priority
//!
//! Configuration values are loaded with the following priority (highest first):
//! 1. CLI arguments (applied by the binaries through [`ConfigOverrides`])
//! 2. Environment variables
//! 3. TOML configuration file
//! 4. Default values
//!
//! # Example Configuration
//!
//! ```toml
//! [server]
//! bind_address = "127.0.0.1:8000"
//! cors_allowed_origins = "http://localhost:5173"
//! max_message_bytes = 32768
//! history_limit = 10
//!
//! [provider]
//! kind = "anthropic"
//! model = "claude-sonnet-4-20250514"
//! max_tokens = 2000
//!
//! [client]
//! api_url = "http://localhost:8000"
//! max_retries = 2
//! malformed_frames = "passthrough"
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::session::RetryPolicy;
use crate::wire::MalformedFramePolicy;

/// System prompt used when none is configured
pub const DEFAULT_SYSTEM_PROMPT: &str = "You are Zyron, an intelligent and conversational AI assistant. \
Help the user clearly and precisely, be proactive in proposing solutions, \
structure answers with lists or sections when it helps, \
and ask clarifying questions when needed.";

// =============================================================================
// Error Types
// =============================================================================

/// Errors that can occur when loading configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read config file
    #[error("Failed to read config file at {path}: {source}")]
    ReadError {
        /// The path that was attempted
        path: PathBuf,
        /// The underlying IO error
        source: std::io::Error,
    },

    /// Failed to parse TOML
    #[error("Failed to parse TOML config: {0}")]
    ParseError(#[from] toml::de::Error),

    /// Invalid configuration value
    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

// =============================================================================
// Configuration Source Tracking
// =============================================================================

/// Tracks where a configuration value came from
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConfigSource {
    /// Value from command-line argument
    Cli,
    /// Value from environment variable
    Env,
    /// Value from TOML configuration file
    File,
    /// Default value
    Default,
}

impl std::fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Cli => write!(f, "CLI"),
            Self::Env => write!(f, "environment"),
            Self::File => write!(f, "config file"),
            Self::Default => write!(f, "default"),
        }
    }
}

// =============================================================================
// Provider Kind
// =============================================================================

/// Which text-generation provider the server streams from
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    /// Anthropic Messages API
    #[default]
    Anthropic,
    /// Local Ollama server
    Ollama,
    /// Offline echo provider
    Echo,
}

impl ProviderKind {
    /// Base URL used when none is configured
    #[must_use]
    pub fn default_base_url(&self) -> &'static str {
        match self {
            Self::Anthropic => "https://api.anthropic.com",
            Self::Ollama => "http://localhost:11434",
            Self::Echo => "",
        }
    }
}

impl std::str::FromStr for ProviderKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "anthropic" => Ok(Self::Anthropic),
            "ollama" => Ok(Self::Ollama),
            "echo" => Ok(Self::Echo),
            other => Err(format!("unknown provider: {other}")),
        }
    }
}

impl std::fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Anthropic => write!(f, "anthropic"),
            Self::Ollama => write!(f, "ollama"),
            Self::Echo => write!(f, "echo"),
        }
    }
}

// =============================================================================
// TOML Configuration Structures
// =============================================================================

/// Server section of the TOML configuration
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerToml {
    /// Socket address to listen on
    pub bind_address: Option<String>,

    /// Comma-separated allowed CORS origins (unset = any)
    pub cors_allowed_origins: Option<String>,

    /// Maximum accepted message size in bytes
    pub max_message_bytes: Option<usize>,

    /// Number of stored messages sent as context
    pub history_limit: Option<usize>,

    /// Emit logs as JSON
    pub log_json: Option<bool>,
}

/// Provider section of the TOML configuration
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderToml {
    /// Provider kind
    pub kind: Option<ProviderKind>,

    /// Model identifier
    pub model: Option<String>,

    /// Maximum tokens per response
    pub max_tokens: Option<u32>,

    /// Sampling temperature
    pub temperature: Option<f32>,

    /// System prompt
    pub system_prompt: Option<String>,

    /// Environment variable holding the API key
    pub api_key_env: Option<String>,

    /// Provider base URL
    pub base_url: Option<String>,

    /// Whole-request timeout in seconds
    pub request_timeout_secs: Option<u64>,
}

/// Client section of the TOML configuration
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientToml {
    /// Base URL of the chat API
    pub api_url: Option<String>,

    /// Retries after the first attempt
    pub max_retries: Option<u32>,

    /// Delay before the first retry in milliseconds
    pub initial_backoff_ms: Option<u64>,

    /// Backoff multiplier
    pub backoff_multiplier: Option<f32>,

    /// Maximum backoff delay in milliseconds
    pub max_backoff_ms: Option<u64>,

    /// What to do with frames that are not JSON
    pub malformed_frames: Option<MalformedFramePolicy>,

    /// Environment variable holding the bearer token
    pub auth_token_env: Option<String>,

    /// Connection timeout in milliseconds
    pub connect_timeout_ms: Option<u64>,
}

/// Top-level TOML configuration structure
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ZyronToml {
    /// Server section
    pub server: ServerToml,

    /// Provider section
    pub provider: ProviderToml,

    /// Client section
    pub client: ClientToml,
}

// =============================================================================
// Resolved Settings
// =============================================================================

/// HTTP server settings
#[derive(Clone, Debug, PartialEq)]
pub struct ServerSettings {
    /// Socket address to listen on
    pub bind_address: String,
    /// Comma-separated allowed CORS origins; `None` allows any origin
    pub cors_allowed_origins: Option<String>,
    /// Maximum accepted message size in bytes
    pub max_message_bytes: usize,
    /// Number of stored messages sent as context
    pub history_limit: usize,
    /// Emit logs as JSON
    pub log_json: bool,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            bind_address: "127.0.0.1:8000".to_string(),
            cors_allowed_origins: None,
            max_message_bytes: 32 * 1024,
            history_limit: 10,
            log_json: false,
        }
    }
}

/// Upstream provider settings
#[derive(Clone, Debug, PartialEq)]
pub struct ProviderSettings {
    /// Provider kind
    pub kind: ProviderKind,
    /// Model identifier
    pub model: String,
    /// Maximum tokens per response
    pub max_tokens: u32,
    /// Sampling temperature
    pub temperature: f32,
    /// System prompt
    pub system_prompt: String,
    /// Environment variable holding the API key
    pub api_key_env: String,
    /// Provider base URL; `None` uses the provider default
    pub base_url: Option<String>,
    /// Whole-request timeout
    pub request_timeout: Duration,
}

impl Default for ProviderSettings {
    fn default() -> Self {
        Self {
            kind: ProviderKind::Anthropic,
            model: "claude-sonnet-4-20250514".to_string(),
            max_tokens: 2000,
            temperature: 0.7,
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            api_key_env: "ANTHROPIC_API_KEY".to_string(),
            base_url: None,
            request_timeout: Duration::from_secs(60),
        }
    }
}

impl ProviderSettings {
    /// The configured base URL, or the provider default
    #[must_use]
    pub fn base_url(&self) -> &str {
        self.base_url
            .as_deref()
            .unwrap_or_else(|| self.kind.default_base_url())
    }
}

/// Chat client settings
#[derive(Clone, Debug, PartialEq)]
pub struct ClientSettings {
    /// Base URL of the chat API
    pub api_url: String,
    /// Retry policy for transport failures
    pub retry: RetryPolicy,
    /// What to do with frames that are not JSON
    pub malformed_frames: MalformedFramePolicy,
    /// Environment variable holding the bearer token
    pub auth_token_env: String,
    /// Connection timeout
    pub connect_timeout: Duration,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            api_url: "http://localhost:8000".to_string(),
            retry: RetryPolicy::default(),
            malformed_frames: MalformedFramePolicy::default(),
            auth_token_env: "ZYRON_AUTH_TOKEN".to_string(),
            connect_timeout: Duration::from_secs(10),
        }
    }
}

// =============================================================================
// Main Configuration Struct
// =============================================================================

/// Resolved configuration from all sources
#[derive(Clone, Debug, Default)]
pub struct ZyronConfig {
    /// Server settings
    pub server: ServerSettings,
    /// Provider settings
    pub provider: ProviderSettings,
    /// Client settings
    pub client: ClientSettings,
    /// Path to the config file that was loaded (if any)
    pub config_file_path: Option<PathBuf>,
    source: Option<ConfigSource>,
}

impl ZyronConfig {
    /// Create a new configuration with default values
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Highest-priority source that contributed a value
    #[must_use]
    pub fn source(&self) -> ConfigSource {
        self.source.unwrap_or(ConfigSource::Default)
    }

    fn set_source(&mut self, source: ConfigSource) {
        self.source = Some(source);
    }

    /// Check value ranges
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::ValidationError`] naming the first bad value.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.max_message_bytes == 0 {
            return Err(ConfigError::ValidationError(
                "server.max_message_bytes must be greater than 0".into(),
            ));
        }
        if !(0.0..=1.0).contains(&self.provider.temperature) {
            return Err(ConfigError::ValidationError(format!(
                "provider.temperature must be between 0.0 and 1.0, got {}",
                self.provider.temperature
            )));
        }
        if self.client.retry.backoff_multiplier < 1.0 {
            return Err(ConfigError::ValidationError(format!(
                "client.backoff_multiplier must be at least 1.0, got {}",
                self.client.retry.backoff_multiplier
            )));
        }
        if self.client.api_url.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "client.api_url must not be empty".into(),
            ));
        }
        Ok(())
    }
}

// =============================================================================
// Configuration Loading
// =============================================================================

/// Get the default configuration file path
///
/// Returns `$XDG_CONFIG_HOME/zyron/zyron.toml` or
/// `~/.config/zyron/zyron.toml` if `XDG_CONFIG_HOME` is not set.
#[must_use]
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("zyron").join("zyron.toml"))
}

/// Load configuration from all sources with proper priority
///
/// # Errors
///
/// Returns an error if the config file exists but cannot be parsed, or if
/// the resulting values are out of range. A missing config file is not an
/// error (defaults are used).
pub fn load_config() -> Result<ZyronConfig, ConfigError> {
    load_config_from_path(default_config_path())
}

/// Load configuration from a specific path and the process environment
///
/// # Errors
///
/// Returns an error if the specified config file cannot be read or parsed.
pub fn load_config_from_path(path: Option<PathBuf>) -> Result<ZyronConfig, ConfigError> {
    load_config_with_env(path, |key| std::env::var(key).ok())
}

/// Load configuration with an explicit environment lookup
///
/// # Errors
///
/// Returns an error if the specified config file cannot be read or parsed.
pub fn load_config_with_env<F>(path: Option<PathBuf>, env: F) -> Result<ZyronConfig, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let mut config = ZyronConfig::default();

    if let Some(ref config_path) = path {
        if config_path.exists() {
            let toml_config = read_toml(config_path)?;
            apply_toml_config(&mut config, &toml_config);
            config.config_file_path = Some(config_path.clone());
            config.set_source(ConfigSource::File);

            tracing::info!(
                path = %config_path.display(),
                "Loaded configuration from file"
            );
        } else {
            tracing::debug!(
                path = %config_path.display(),
                "Config file not found, using defaults"
            );
        }
    }

    apply_env_config(&mut config, env);
    config.validate()?;

    Ok(config)
}

fn read_toml(path: &Path) -> Result<ZyronToml, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
        path: path.to_path_buf(),
        source: e,
    })?;
    Ok(toml::from_str(&content)?)
}

/// Apply TOML configuration values to the config struct
fn apply_toml_config(config: &mut ZyronConfig, toml: &ZyronToml) {
    // Server settings
    if let Some(ref addr) = toml.server.bind_address {
        config.server.bind_address = addr.clone();
    }
    if toml.server.cors_allowed_origins.is_some() {
        config.server.cors_allowed_origins = toml.server.cors_allowed_origins.clone();
    }
    if let Some(bytes) = toml.server.max_message_bytes {
        config.server.max_message_bytes = bytes;
    }
    if let Some(limit) = toml.server.history_limit {
        config.server.history_limit = limit;
    }
    if let Some(json) = toml.server.log_json {
        config.server.log_json = json;
    }

    // Provider settings
    if let Some(kind) = toml.provider.kind {
        config.provider.kind = kind;
    }
    if let Some(ref model) = toml.provider.model {
        config.provider.model = model.clone();
    }
    if let Some(max_tokens) = toml.provider.max_tokens {
        config.provider.max_tokens = max_tokens;
    }
    if let Some(temperature) = toml.provider.temperature {
        config.provider.temperature = temperature;
    }
    if let Some(ref prompt) = toml.provider.system_prompt {
        config.provider.system_prompt = prompt.clone();
    }
    if let Some(ref var) = toml.provider.api_key_env {
        config.provider.api_key_env = var.clone();
    }
    if toml.provider.base_url.is_some() {
        config.provider.base_url = toml.provider.base_url.clone();
    }
    if let Some(secs) = toml.provider.request_timeout_secs {
        config.provider.request_timeout = Duration::from_secs(secs);
    }

    // Client settings
    if let Some(ref url) = toml.client.api_url {
        config.client.api_url = url.clone();
    }
    if let Some(retries) = toml.client.max_retries {
        config.client.retry.max_retries = retries;
    }
    if let Some(ms) = toml.client.initial_backoff_ms {
        config.client.retry.initial_backoff_ms = ms;
    }
    if let Some(multiplier) = toml.client.backoff_multiplier {
        config.client.retry.backoff_multiplier = multiplier;
    }
    if let Some(ms) = toml.client.max_backoff_ms {
        config.client.retry.max_backoff_ms = ms;
    }
    if let Some(policy) = toml.client.malformed_frames {
        config.client.malformed_frames = policy;
    }
    if let Some(ref var) = toml.client.auth_token_env {
        config.client.auth_token_env = var.clone();
    }
    if let Some(ms) = toml.client.connect_timeout_ms {
        config.client.connect_timeout = Duration::from_millis(ms);
    }
}

/// Parse an environment value, logging and ignoring values that do not parse
fn parse_env<T: std::str::FromStr>(key: &str, value: &str) -> Option<T> {
    match value.trim().parse() {
        Ok(v) => Some(v),
        Err(_) => {
            tracing::warn!(key, value, "Ignoring unparsable environment variable");
            None
        }
    }
}

fn parse_bool(value: &str) -> bool {
    value != "0" && !value.eq_ignore_ascii_case("false")
}

/// Apply environment variable overrides to the config
fn apply_env_config<F>(config: &mut ZyronConfig, env: F)
where
    F: Fn(&str) -> Option<String>,
{
    let mut touched = false;

    // Server settings from environment
    if let Some(addr) = env("ZYRON_BIND") {
        config.server.bind_address = addr;
        touched = true;
    }
    if let Some(origins) = env("ZYRON_CORS_ORIGINS") {
        config.server.cors_allowed_origins = Some(origins);
        touched = true;
    }
    if let Some(bytes) = env("ZYRON_MAX_MESSAGE_BYTES")
        .and_then(|v| parse_env::<usize>("ZYRON_MAX_MESSAGE_BYTES", &v))
    {
        config.server.max_message_bytes = bytes;
        touched = true;
    }
    if let Some(json) = env("ZYRON_LOG_JSON") {
        config.server.log_json = parse_bool(&json);
        touched = true;
    }

    // Provider settings from environment
    if let Some(kind) =
        env("ZYRON_PROVIDER").and_then(|v| parse_env::<ProviderKind>("ZYRON_PROVIDER", &v))
    {
        config.provider.kind = kind;
        touched = true;
    }
    if let Some(model) = env("ZYRON_MODEL") {
        config.provider.model = model;
        touched = true;
    }
    if let Some(max_tokens) =
        env("ZYRON_MAX_TOKENS").and_then(|v| parse_env::<u32>("ZYRON_MAX_TOKENS", &v))
    {
        config.provider.max_tokens = max_tokens;
        touched = true;
    }
    if let Some(url) = env("ZYRON_PROVIDER_URL") {
        config.provider.base_url = Some(url);
        touched = true;
    }

    // Client settings from environment
    if let Some(url) = env("ZYRON_API_URL") {
        config.client.api_url = url;
        touched = true;
    }
    if let Some(retries) =
        env("ZYRON_MAX_RETRIES").and_then(|v| parse_env::<u32>("ZYRON_MAX_RETRIES", &v))
    {
        config.client.retry.max_retries = retries;
        touched = true;
    }
    if let Some(policy) = env("ZYRON_MALFORMED_FRAMES")
        .and_then(|v| parse_env::<MalformedFramePolicy>("ZYRON_MALFORMED_FRAMES", &v))
    {
        config.client.malformed_frames = policy;
        touched = true;
    }

    if touched {
        config.set_source(ConfigSource::Env);
    }
}

// =============================================================================
// CLI Override Support
// =============================================================================

/// Builder for applying CLI overrides to configuration
///
/// Use this after [`load_config`] to apply command-line argument overrides.
#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    /// Bind address override
    pub bind_address: Option<String>,

    /// CORS origins override
    pub cors_allowed_origins: Option<String>,

    /// Provider override
    pub provider: Option<ProviderKind>,

    /// Model override
    pub model: Option<String>,

    /// JSON log output override
    pub log_json: Option<bool>,

    /// API URL override
    pub api_url: Option<String>,

    /// Retry count override
    pub max_retries: Option<u32>,
}

impl ConfigOverrides {
    /// Create a new empty set of overrides
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set bind address override
    #[must_use]
    pub fn with_bind_address(mut self, addr: Option<String>) -> Self {
        self.bind_address = addr;
        self
    }

    /// Set CORS origins override
    #[must_use]
    pub fn with_cors_allowed_origins(mut self, origins: Option<String>) -> Self {
        self.cors_allowed_origins = origins;
        self
    }

    /// Set provider override
    #[must_use]
    pub fn with_provider(mut self, provider: Option<ProviderKind>) -> Self {
        self.provider = provider;
        self
    }

    /// Set model override
    #[must_use]
    pub fn with_model(mut self, model: Option<String>) -> Self {
        self.model = model;
        self
    }

    /// Force JSON log output on
    #[must_use]
    pub fn with_log_json(mut self, enabled: bool) -> Self {
        if enabled {
            self.log_json = Some(true);
        }
        self
    }

    /// Set API URL override
    #[must_use]
    pub fn with_api_url(mut self, url: Option<String>) -> Self {
        self.api_url = url;
        self
    }

    /// Set retry count override
    #[must_use]
    pub fn with_max_retries(mut self, retries: Option<u32>) -> Self {
        self.max_retries = retries;
        self
    }

    fn is_empty(&self) -> bool {
        self.bind_address.is_none()
            && self.cors_allowed_origins.is_none()
            && self.provider.is_none()
            && self.model.is_none()
            && self.log_json.is_none()
            && self.api_url.is_none()
            && self.max_retries.is_none()
    }

    /// Apply overrides to a configuration
    pub fn apply(&self, config: &mut ZyronConfig) {
        if self.is_empty() {
            return;
        }
        config.set_source(ConfigSource::Cli);

        if let Some(ref addr) = self.bind_address {
            config.server.bind_address = addr.clone();
        }
        if self.cors_allowed_origins.is_some() {
            config.server.cors_allowed_origins = self.cors_allowed_origins.clone();
        }
        if let Some(kind) = self.provider {
            config.provider.kind = kind;
        }
        if let Some(ref model) = self.model {
            config.provider.model = model.clone();
        }
        if let Some(json) = self.log_json {
            config.server.log_json = json;
        }
        if let Some(ref url) = self.api_url {
            config.client.api_url = url.clone();
        }
        if let Some(retries) = self.max_retries {
            config.client.retry.max_retries = retries;
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

//! Configuration loading, validation, and management for FaceAgent.
//!
//! Loads configuration from `~/.faceagent/config.toml` with environment
//! variable overrides. Validates all settings at startup.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use faceagent_core::Route;

/// The root configuration structure.
///
/// Maps directly to `~/.faceagent/config.toml`.
#[derive(Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// API key for the model provider
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Model used for both the reasoning loop and the elaboration sub-call
    #[serde(default = "default_model")]
    pub model: String,

    /// Sampling temperature for reasoning turns
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Provider endpoint configuration
    #[serde(default)]
    pub provider: ProviderConfig,

    /// Generation webhook configuration
    #[serde(default)]
    pub webhook: WebhookConfig,

    /// Database configuration
    #[serde(default)]
    pub database: DatabaseConfig,

    /// Gateway configuration
    #[serde(default)]
    pub gateway: GatewayConfig,

    /// Bearer token verification
    #[serde(default)]
    pub auth: AuthConfig,

    /// Agent loop limits
    #[serde(default)]
    pub agent: AgentConfig,

    /// Per-route overrides of the elaboration instructions, keyed by route
    /// name. An empty string disables the route.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub specialist_prompts: BTreeMap<String, String>,
}

fn default_model() -> String {
    "gpt-4o".into()
}
fn default_temperature() -> f32 {
    0.7
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
            .field("model", &self.model)
            .field("temperature", &self.temperature)
            .field("provider", &self.provider)
            .field("webhook", &self.webhook)
            .field("database", &self.database)
            .field("gateway", &self.gateway)
            .field("auth", &self.auth)
            .field("agent", &self.agent)
            .field("specialist_prompts", &self.specialist_prompts.keys().collect::<Vec<_>>())
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Timeout for a whole model call, streaming included
    #[serde(default = "default_provider_timeout")]
    pub timeout_secs: u64,
}

fn default_base_url() -> String {
    "https://api.openai.com/v1".into()
}
fn default_provider_timeout() -> u64 {
    120
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            timeout_secs: default_provider_timeout(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookConfig {
    /// Generation workflow endpoint; unset means every dispatch fails fast
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    #[serde(default = "default_webhook_timeout")]
    pub timeout_secs: u64,
}

fn default_webhook_timeout() -> u64 {
    10
}

impl WebhookConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self {
            url: None,
            timeout_secs: default_webhook_timeout(),
        }
    }
}

#[derive(Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// PostgreSQL connection string; unset selects the in-memory store
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    /// How many prior turns are replayed into each request
    #[serde(default = "default_history_limit")]
    pub history_limit: usize,

    /// Prepared statements cached per connection. 0 is required behind a
    /// transaction-mode pooler.
    #[serde(default)]
    pub statement_cache_capacity: usize,
}

fn default_max_connections() -> u32 {
    10
}
fn default_history_limit() -> usize {
    20
}

impl std::fmt::Debug for DatabaseConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DatabaseConfig")
            .field("url", &redact(&self.url))
            .field("max_connections", &self.max_connections)
            .field("history_limit", &self.history_limit)
            .field("statement_cache_capacity", &self.statement_cache_capacity)
            .finish()
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: None,
            max_connections: default_max_connections(),
            history_limit: default_history_limit(),
            statement_cache_capacity: 0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_cors_origins")]
    pub cors_origins: Vec<String>,
}

fn default_port() -> u16 {
    8000
}
fn default_host() -> String {
    "127.0.0.1".into()
}
fn default_cors_origins() -> Vec<String> {
    vec!["http://localhost:3000".into()]
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            host: default_host(),
            cors_origins: default_cors_origins(),
        }
    }
}

#[derive(Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    /// HS256 signing secret shared with the identity provider
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jwt_secret: Option<String>,

    /// Expected `iss` claim
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub issuer: Option<String>,

    /// Expected `aud` claim
    #[serde(default = "default_audience")]
    pub audience: String,

    /// Clock skew tolerated on `exp`
    #[serde(default = "default_leeway")]
    pub leeway_secs: u64,
}

fn default_audience() -> String {
    "authenticated".into()
}
fn default_leeway() -> u64 {
    30
}

impl std::fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthConfig")
            .field("jwt_secret", &redact(&self.jwt_secret))
            .field("issuer", &self.issuer)
            .field("audience", &self.audience)
            .field("leeway_secs", &self.leeway_secs)
            .finish()
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            jwt_secret: None,
            issuer: None,
            audience: default_audience(),
            leeway_secs: default_leeway(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Maximum reasoning steps per request (safety limit)
    #[serde(default = "default_max_iterations")]
    pub max_tool_iterations: u32,
}

fn default_max_iterations() -> u32 {
    8
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_tool_iterations: default_max_iterations(),
        }
    }
}

impl AppConfig {
    /// Load configuration from the default location.
    ///
    /// Environment variables take precedence over the file:
    /// - `FACEAGENT_API_KEY`, then `OPENAI_API_KEY`
    /// - `OPENAI_BASE_URL`, `MODEL_NAME`
    /// - `N8N_WEBHOOK_URL`
    /// - `DB_URI`
    /// - `SUPABASE_URL`, `SUPABASE_JWT_SECRET`, `JWT_AUDIENCE`
    /// - `CORS_ORIGINS` (comma separated)
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_dir().join("config.toml");
        Self::load_with_env(&config_path)
    }

    /// Load from `path`, then apply environment overrides.
    pub fn load_with_env(path: &Path) -> Result<Self, ConfigError> {
        let mut config = Self::load_from(path)?;
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

    /// Apply overrides from an environment lookup. Blank values are ignored.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(key) = get("FACEAGENT_API_KEY").or_else(|| get("OPENAI_API_KEY")) {
            self.api_key = Some(key);
        }
        if let Some(url) = get("OPENAI_BASE_URL") {
            self.provider.base_url = url;
        }
        if let Some(model) = get("MODEL_NAME") {
            self.model = model;
        }
        if let Some(url) = get("N8N_WEBHOOK_URL") {
            self.webhook.url = Some(url);
        }
        if let Some(url) = get("DB_URI") {
            self.database.url = Some(url);
        }
        if let Some(url) = get("SUPABASE_URL") {
            self.auth.issuer = Some(format!("{}/auth/v1", url.trim_end_matches('/')));
        }
        if let Some(secret) = get("SUPABASE_JWT_SECRET") {
            self.auth.jwt_secret = Some(secret);
        }
        if let Some(aud) = get("JWT_AUDIENCE") {
            self.auth.audience = aud;
        }
        if let Some(origins) = get("CORS_ORIGINS") {
            self.gateway.cors_origins = origins
                .split(',')
                .map(|o| o.trim().to_string())
                .filter(|o| !o.is_empty())
                .collect();
        }
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".faceagent")
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=2.0).contains(&self.temperature) {
            return Err(ConfigError::ValidationError(
                "temperature must be between 0.0 and 2.0".into(),
            ));
        }

        if self.webhook.timeout_secs == 0 {
            return Err(ConfigError::ValidationError(
                "webhook.timeout_secs must be > 0".into(),
            ));
        }

        if self.agent.max_tool_iterations == 0 {
            return Err(ConfigError::ValidationError(
                "agent.max_tool_iterations must be > 0".into(),
            ));
        }

        for key in self.specialist_prompts.keys() {
            key.parse::<Route>()
                .map_err(|e| ConfigError::ValidationError(format!("specialist_prompts: {e}")))?;
        }

        Ok(())
    }

    /// Settings that must be present before the gateway can serve traffic.
    pub fn ensure_servable(&self) -> Result<(), ConfigError> {
        if self.api_key.is_none() {
            return Err(ConfigError::ValidationError(
                "an API key is required (set OPENAI_API_KEY)".into(),
            ));
        }
        if self.auth.jwt_secret.is_none() {
            return Err(ConfigError::ValidationError(
                "auth.jwt_secret is required (set SUPABASE_JWT_SECRET)".into(),
            ));
        }
        if self.auth.issuer.is_none() {
            return Err(ConfigError::ValidationError(
                "auth.issuer is required (set SUPABASE_URL)".into(),
            ));
        }
        Ok(())
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
            model: default_model(),
            temperature: default_temperature(),
            provider: ProviderConfig::default(),
            webhook: WebhookConfig::default(),
            database: DatabaseConfig::default(),
            gateway: GatewayConfig::default(),
            auth: AuthConfig::default(),
            agent: AgentConfig::default(),
            specialist_prompts: BTreeMap::new(),
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

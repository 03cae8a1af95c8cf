//! Configuration management for Spurgeon services
//!
//! Supports loading configuration from:
//! - Environment variables (prefixed with APP__)
//! - Configuration files (config/default, config/{APP_ENV}, config/local)
//! - Flat legacy variables (OPENAI_API_KEY, AWS_S3_KEY, ...)
//! - Default values

use crate::errors::{AppError, Result};
use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Main application configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,

    /// OpenAI provider (embeddings + responses)
    #[serde(default)]
    pub openai: OpenAIConfig,

    /// Default model names
    #[serde(default)]
    pub models: ModelsConfig,

    /// S3 Vectors index defaults and credentials
    #[serde(default)]
    pub vector: VectorConfig,

    #[serde(default)]
    pub search: SearchDefaults,

    #[serde(default)]
    pub chat: ChatConfig,

    /// Line-delimited sermon bodies used for excerpts
    #[serde(default)]
    pub excerpts: ExcerptConfig,

    /// Inbound passcode authentication
    #[serde(default)]
    pub auth: AuthConfig,

    #[serde(default)]
    pub diagnostics: DiagnosticsConfig,

    #[serde(default)]
    pub observability: ObservabilityConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    /// Host to bind to
    #[serde(default = "default_host")]
    pub host: String,

    /// Port to listen on
    #[serde(default = "default_port")]
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct OpenAIConfig {
    /// API key; absence is reported lazily when a provider call is attempted
    pub api_key: Option<String>,

    /// API base URL (for custom endpoints)
    #[serde(default = "default_openai_base")]
    pub base_url: String,

    /// Request timeout in seconds
    #[serde(default = "default_openai_timeout")]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ModelsConfig {
    /// Model for restatement, devotionals and chat replies
    #[serde(default = "default_responses_model")]
    pub responses: String,

    /// Lightweight model for chat intent classification
    #[serde(default = "default_classification_model")]
    pub classification: String,

    #[serde(default = "default_embedding_model")]
    pub embedding: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct VectorConfig {
    #[serde(default = "default_region")]
    pub region: String,

    #[serde(default = "default_bucket")]
    pub bucket: String,

    #[serde(default = "default_index")]
    pub index: String,

    pub access_key_id: Option<String>,

    pub secret_access_key: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SearchDefaults {
    #[serde(default = "default_top_k")]
    pub top_k: usize,

    /// Characters of context on each side of a match
    #[serde(default = "default_context_chars")]
    pub context_chars: usize,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ChatConfig {
    #[serde(default = "default_top_k_theological")]
    pub top_k_theological: usize,

    #[serde(default = "default_top_k_devotional")]
    pub top_k_devotional: usize,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ExcerptConfig {
    #[serde(default = "default_bodies_path")]
    pub bodies_path: PathBuf,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct AuthConfig {
    /// Passcode expected in the Authorization header
    pub admin_passcode: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct DiagnosticsConfig {
    /// Log RSS delta around chat requests
    #[serde(default)]
    pub log_memory: bool,

    /// Log elapsed time around chat requests
    #[serde(default)]
    pub log_timing: bool,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ObservabilityConfig {
    /// Log level / EnvFilter directive
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Enable JSON logging
    #[serde(default = "default_json_logging")]
    pub json_logging: bool,
}

// Default value functions
fn default_host() -> String { "0.0.0.0".to_string() }
fn default_port() -> u16 { 8080 }
fn default_openai_base() -> String { "https://api.openai.com/v1".to_string() }
fn default_openai_timeout() -> u64 { 540 }
fn default_responses_model() -> String { "gpt-5".to_string() }
fn default_classification_model() -> String { "gpt-5-nano".to_string() }
fn default_embedding_model() -> String { "text-embedding-3-small".to_string() }
fn default_region() -> String { "us-east-2".to_string() }
fn default_bucket() -> String { "spurgeon".to_string() }
fn default_index() -> String { "sermon-bodies-v1".to_string() }
fn default_top_k() -> usize { 5 }
fn default_context_chars() -> usize { 200 }
fn default_top_k_theological() -> usize { 2 }
fn default_top_k_devotional() -> usize { 3 }
fn default_bodies_path() -> PathBuf { PathBuf::from("sermon_bodies.ndjson") }
fn default_log_level() -> String { "info".to_string() }
fn default_json_logging() -> bool { true }

impl Default for ServerConfig {
    fn default() -> Self {
        Self { host: default_host(), port: default_port() }
    }
}

impl Default for OpenAIConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: default_openai_base(),
            timeout_secs: default_openai_timeout(),
        }
    }
}

impl Default for ModelsConfig {
    fn default() -> Self {
        Self {
            responses: default_responses_model(),
            classification: default_classification_model(),
            embedding: default_embedding_model(),
        }
    }
}

impl Default for VectorConfig {
    fn default() -> Self {
        Self {
            region: default_region(),
            bucket: default_bucket(),
            index: default_index(),
            access_key_id: None,
            secret_access_key: None,
        }
    }
}

impl Default for SearchDefaults {
    fn default() -> Self {
        Self { top_k: default_top_k(), context_chars: default_context_chars() }
    }
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            top_k_theological: default_top_k_theological(),
            top_k_devotional: default_top_k_devotional(),
        }
    }
}

impl Default for ExcerptConfig {
    fn default() -> Self {
        Self { bodies_path: default_bodies_path() }
    }
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self { log_level: default_log_level(), json_logging: default_json_logging() }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            openai: OpenAIConfig::default(),
            models: ModelsConfig::default(),
            vector: VectorConfig::default(),
            search: SearchDefaults::default(),
            chat: ChatConfig::default(),
            excerpts: ExcerptConfig::default(),
            auth: AuthConfig::default(),
            diagnostics: DiagnosticsConfig::default(),
            observability: ObservabilityConfig::default(),
        }
    }
}

impl AppConfig {
    /// Load configuration from files, APP__ variables and legacy variables
    pub fn load() -> std::result::Result<Self, ConfigError> {
        let env = std::env::var("APP_ENV").unwrap_or_else(|_| "development".to_string());

        let config = Config::builder()
            // Load base config file
            .add_source(File::with_name("config/default").required(false))
            // Load environment-specific config
            .add_source(File::with_name(&format!("config/{}", env)).required(false))
            // Load local overrides
            .add_source(File::with_name("config/local").required(false))
            // e.g., APP__SERVER__PORT=8081
            .add_source(
                Environment::with_prefix("APP")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let mut loaded: AppConfig = config.try_deserialize()?;
        loaded.apply_legacy_env(|key| std::env::var(key).ok());
        Ok(loaded)
    }

    /// Fill unset values from flat variables such as `OPENAI_API_KEY` and `PASSCODES_ADMIN`.
    /// Structured APP__ values always win.
    pub fn apply_legacy_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if self.openai.api_key.is_none() {
            self.openai.api_key = non_empty("OPENAI_API_KEY");
        }
        if self.vector.access_key_id.is_none() {
            self.vector.access_key_id = non_empty("AWS_S3_KEY");
        }
        if self.vector.secret_access_key.is_none() {
            self.vector.secret_access_key = non_empty("AWS_S3_SECRET");
        }
        if self.auth.admin_passcode.is_none() {
            self.auth.admin_passcode = non_empty("PASSCODES_ADMIN");
        }
        if let Some(path) = non_empty("SPURGEON_BODIES_PATH") {
            if self.excerpts.bodies_path == default_bodies_path() {
                self.excerpts.bodies_path = PathBuf::from(path);
            }
        }
        if let Some(flag) = non_empty("SPURGEON_LOG_MEMORY") {
            if flag.eq_ignore_ascii_case("true") {
                self.diagnostics.log_memory = true;
                self.diagnostics.log_timing = true;
            }
        }
        if let Some(port) = non_empty("PORT").and_then(|p| p.parse().ok()) {
            if self.server.port == default_port() {
                self.server.port = port;
            }
        }
    }

    /// Get provider request timeout as Duration
    pub fn openai_timeout(&self) -> Duration {
        Duration::from_secs(self.openai.timeout_secs)
    }
}

/// Fail with the list of every missing variable, like a deploy-time env check
pub fn require_present(values: &[(&str, Option<&str>)]) -> Result<()> {
    let missing: Vec<&str> = values
        .iter()
        .filter(|(_, value)| value.map(|v| v.trim().is_empty()).unwrap_or(true))
        .map(|(name, _)| *name)
        .collect();

    if missing.is_empty() {
        Ok(())
    } else {
        Err(AppError::configuration(format!(
            "Missing env vars: {}",
            missing.join(", ")
        )))
    }
}

//! Configuration for the chat proxy.

use std::collections::HashMap;
use std::env;
use std::time::Duration;

use config::{Config as ConfigLoader, Environment, File};
use serde::Deserialize;

use pixeldesk_common::ModelEndpoint;

/// Main configuration structure for the proxy.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub pipeline: PipelineConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub circuit: CircuitConfig,
    #[serde(default)]
    pub upstream: UpstreamConfig,
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    /// Model id to endpoint mappings. Empty means the built-in registry.
    #[serde(default)]
    pub models: HashMap<String, ModelEndpoint>,
}

/// Deployment flavor; only `development` echoes error details to clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeployEnvironment {
    Development,
    Production,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Directory served for every path that is not an API route.
    #[serde(default = "default_static_dir")]
    pub static_dir: String,
    #[serde(default = "default_environment")]
    pub environment: DeployEnvironment,
}

impl ServerConfig {
    pub fn verbose_errors(&self) -> bool {
        self.environment == DeployEnvironment::Development
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            static_dir: default_static_dir(),
            environment: default_environment(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct PipelineConfig {
    /// Route upstream calls through the batch queue instead of calling directly.
    #[serde(default)]
    pub batching: bool,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Delay before re-draining a queue that still holds items.
    #[serde(default = "default_batch_delay_ms")]
    pub batch_delay_ms: u64,
    /// Maximum number of admitted requests in flight.
    #[serde(default = "default_max_queue_size")]
    pub max_queue_size: usize,
    /// Messages longer than this (in characters) are truncated.
    #[serde(default = "default_max_input_length")]
    pub max_input_length: usize,
    /// Model used when a request does not name one.
    #[serde(default = "default_model")]
    pub default_model: String,
}

impl PipelineConfig {
    pub fn batch_delay(&self) -> Duration {
        Duration::from_millis(self.batch_delay_ms)
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            batching: false,
            batch_size: default_batch_size(),
            batch_delay_ms: default_batch_delay_ms(),
            max_queue_size: default_max_queue_size(),
            max_input_length: default_max_input_length(),
            default_model: default_model(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
    #[serde(default = "default_cache_ttl")]
    pub ttl_secs: u64,
    #[serde(default = "default_memory_check")]
    pub memory_check_secs: u64,
    /// Resident memory above which the whole cache is dropped.
    #[serde(default = "default_memory_threshold")]
    pub memory_threshold_mb: u64,
}

impl CacheConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }

    pub fn memory_check_interval(&self) -> Duration {
        Duration::from_secs(self.memory_check_secs)
    }

    pub fn memory_threshold_bytes(&self) -> u64 {
        self.memory_threshold_mb * 1024 * 1024
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_secs: default_cache_ttl(),
            memory_check_secs: default_memory_check(),
            memory_threshold_mb: default_memory_threshold(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CircuitConfig {
    /// The circuit opens once failures exceed this count.
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,
    #[serde(default = "default_check_interval")]
    pub check_interval_secs: u64,
    #[serde(default = "default_open_window")]
    pub open_window_secs: u64,
}

impl Default for CircuitConfig {
    fn default() -> Self {
        Self {
            failure_threshold: default_failure_threshold(),
            check_interval_secs: default_check_interval(),
            open_window_secs: default_open_window(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct UpstreamConfig {
    /// Bearer token for cloud endpoints. Falls back to `HUGGINGFACE_API_KEY`.
    #[serde(default = "default_api_key")]
    pub api_key: Option<String>,
    #[serde(default = "default_local_timeout")]
    pub local_timeout_secs: u64,
    #[serde(default = "default_cloud_timeout")]
    pub cloud_timeout_secs: u64,
    #[serde(default = "default_max_length")]
    pub max_length: u32,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            api_key: default_api_key(),
            local_timeout_secs: default_local_timeout(),
            cloud_timeout_secs: default_cloud_timeout(),
            max_length: default_max_length(),
            temperature: default_temperature(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RateLimitConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Requests allowed per client within one window.
    #[serde(default = "default_rate_max")]
    pub max_requests: u32,
    #[serde(default = "default_rate_window")]
    pub window_secs: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_requests: default_rate_max(),
            window_secs: default_rate_window(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

// Default values
fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_port() -> u16 {
    3000
}
fn default_static_dir() -> String {
    "./public".to_string()
}
fn default_environment() -> DeployEnvironment {
    match env::var("APP_ENV").as_deref() {
        Ok("development") => DeployEnvironment::Development,
        _ => DeployEnvironment::Production,
    }
}
fn default_batch_size() -> usize {
    10
}
fn default_batch_delay_ms() -> u64 {
    100
}
fn default_max_queue_size() -> usize {
    1000
}
fn default_max_input_length() -> usize {
    1000
}
fn default_model() -> String {
    "deepseek-local".to_string()
}
fn default_cache_ttl() -> u64 {
    300
}
fn default_memory_check() -> u64 {
    30
}
fn default_memory_threshold() -> u64 {
    750
}
fn default_failure_threshold() -> u32 {
    10
}
fn default_check_interval() -> u64 {
    10
}
fn default_open_window() -> u64 {
    60
}
fn default_api_key() -> Option<String> {
    env::var("HUGGINGFACE_API_KEY").ok().filter(|k| !k.is_empty())
}
fn default_local_timeout() -> u64 {
    30
}
fn default_cloud_timeout() -> u64 {
    5
}
fn default_max_length() -> u32 {
    512
}
fn default_temperature() -> f32 {
    0.7
}
fn default_true() -> bool {
    true
}
fn default_rate_max() -> u32 {
    100
}
fn default_rate_window() -> u64 {
    15 * 60
}
fn default_log_level() -> String {
    "info".to_string()
}

/// Endpoints used when the configuration does not list any models.
pub fn builtin_models() -> HashMap<String, ModelEndpoint> {
    HashMap::from([
        (
            "deepseek-local".to_string(),
            ModelEndpoint::local("http://127.0.0.1:8000/generate"),
        ),
        (
            "mistral-7b".to_string(),
            ModelEndpoint::local("http://127.0.0.1:8001/generate"),
        ),
        (
            "llama-cloud".to_string(),
            ModelEndpoint::cloud(
                "https://api-inference.huggingface.co/models/meta-llama/Llama-2-7b-chat-hf",
            ),
        ),
    ])
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

impl Config {
    /// Load configuration from file and environment variables.
    ///
    /// Configuration sources (in order of precedence):
    /// 1. Environment variables (PIXELDESK__SECTION__KEY format)
    /// 2. config.toml file (if present)
    /// 3. Legacy variables (HUGGINGFACE_API_KEY, APP_ENV)
    /// 4. Built-in defaults
    pub fn load() -> Result<Self, ConfigError> {
        let loaded = ConfigLoader::builder()
            .add_source(File::with_name("config").required(false))
            .add_source(
                Environment::with_prefix("PIXELDESK")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let config: Config = loaded.try_deserialize()?;
        config.validated()
    }

    /// Fill in the built-in model registry and reject unusable settings.
    pub fn validated(mut self) -> Result<Self, ConfigError> {
        if self.models.is_empty() {
            self.models = builtin_models();
        }
        if self.pipeline.batch_size == 0 {
            return Err(ConfigError::Invalid("pipeline.batch_size must be positive".into()));
        }
        if self.pipeline.max_queue_size == 0 {
            return Err(ConfigError::Invalid("pipeline.max_queue_size must be positive".into()));
        }
        if self.cache.ttl_secs == 0 {
            return Err(ConfigError::Invalid("cache.ttl_secs must be positive".into()));
        }
        let rate_limit = &self.rate_limit;
        if rate_limit.enabled && (rate_limit.max_requests == 0 || rate_limit.window_secs == 0) {
            return Err(ConfigError::Invalid(
                "rate_limit.max_requests and rate_limit.window_secs must be positive".into(),
            ));
        }
        if !self.models.contains_key(&self.pipeline.default_model) {
            return Err(ConfigError::Invalid(format!(
                "default model '{}' is not in the model registry",
                self.pipeline.default_model
            )));
        }
        Ok(self)
    }
}

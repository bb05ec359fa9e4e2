//! Server configuration types.
//!
//! `ServerConfig` mirrors `echo.toml`. Every field has a default so an empty
//! file (or no file at all) yields a runnable local configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use std::fmt;
use std::str::FromStr;

/// Deployment environment. Selects the CORS policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    Development,
    #[default]
    Production,
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Environment::Development => write!(f, "development"),
            Environment::Production => write!(f, "production"),
        }
    }
}

impl FromStr for Environment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "development" | "dev" => Ok(Environment::Development),
            "production" | "prod" => Ok(Environment::Production),
            other => Err(format!("invalid environment: '{other}'")),
        }
    }
}

/// Top-level configuration for the server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default)]
    pub environment: Environment,

    /// Prefix applied to every store key (shared Redis deployments).
    #[serde(default = "default_key_prefix")]
    pub key_prefix: String,

    #[serde(default)]
    pub server: ListenConfig,

    #[serde(default)]
    pub cors: CorsConfig,

    #[serde(default)]
    pub store: StoreConfig,

    #[serde(default)]
    pub provider: ProviderConfig,

    #[serde(default)]
    pub analysis: AnalysisConfig,

    #[serde(default)]
    pub session: SessionConfig,
}

fn default_key_prefix() -> String {
    "echo:".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            environment: Environment::default(),
            key_prefix: default_key_prefix(),
            server: ListenConfig::default(),
            cors: CorsConfig::default(),
            store: StoreConfig::default(),
            provider: ProviderConfig::default(),
            analysis: AnalysisConfig::default(),
            session: SessionConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListenConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    5000
}

impl Default for ListenConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorsConfig {
    /// Origins allowed outside development.
    #[serde(default = "default_allowed_origins")]
    pub allowed_origins: Vec<String>,
}

fn default_allowed_origins() -> Vec<String> {
    vec!["http://localhost:5173".to_string()]
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            allowed_origins: default_allowed_origins(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Redis endpoint. Without it the store runs on its local map only.
    #[serde(default)]
    pub redis_url: Option<String>,

    /// Upper bound on any single remote cache call.
    #[serde(default = "default_remote_timeout_ms")]
    pub remote_timeout_ms: u64,

    /// How often the reconciler probes the remote cache.
    #[serde(default = "default_health_probe_interval_secs")]
    pub health_probe_interval_secs: u64,
}

fn default_remote_timeout_ms() -> u64 {
    250
}

fn default_health_probe_interval_secs() -> u64 {
    10
}

impl StoreConfig {
    pub fn remote_timeout(&self) -> Duration {
        Duration::from_millis(self.remote_timeout_ms)
    }

    pub fn health_probe_interval(&self) -> Duration {
        Duration::from_secs(self.health_probe_interval_secs.max(1))
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            redis_url: None,
            remote_timeout_ms: default_remote_timeout_ms(),
            health_probe_interval_secs: default_health_probe_interval_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    #[serde(default = "default_provider_base_url")]
    pub base_url: String,

    /// Endpoint for quick (per-message) analysis.
    #[serde(default = "default_message_path")]
    pub message_path: String,

    /// Endpoint for full analysis.
    #[serde(default = "default_full_path")]
    pub full_path: String,

    /// Optional bearer token sent to the provider.
    #[serde(default, skip_serializing)]
    pub api_token: Option<String>,

    /// Deadline for one provider call.
    #[serde(default = "default_provider_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_provider_base_url() -> String {
    "http://localhost:8000".to_string()
}

fn default_message_path() -> String {
    "/api/analysis/message".to_string()
}

fn default_full_path() -> String {
    "/api/analysis/full".to_string()
}

fn default_provider_timeout_ms() -> u64 {
    30_000
}

impl ProviderConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            base_url: default_provider_base_url(),
            message_path: default_message_path(),
            full_path: default_full_path(),
            api_token: None,
            timeout_ms: default_provider_timeout_ms(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisConfig {
    /// Validity window of a cached analysis result.
    #[serde(default = "default_result_ttl_secs")]
    pub result_ttl_secs: u64,
}

fn default_result_ttl_secs() -> u64 {
    300
}

impl AnalysisConfig {
    pub fn result_ttl(&self) -> Duration {
        Duration::from_secs(self.result_ttl_secs)
    }
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            result_ttl_secs: default_result_ttl_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// A session with no activity for this long is ended on next access.
    #[serde(default = "default_idle_timeout_secs")]
    pub idle_timeout_secs: u64,

    /// How long an explicitly ended session stays readable.
    #[serde(default = "default_ended_retention_secs")]
    pub ended_retention_secs: u64,
}

fn default_idle_timeout_secs() -> u64 {
    1800
}

fn default_ended_retention_secs() -> u64 {
    300
}

impl SessionConfig {
    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }

    pub fn ended_retention(&self) -> Duration {
        Duration::from_secs(self.ended_retention_secs)
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            idle_timeout_secs: default_idle_timeout_secs(),
            ended_retention_secs: default_ended_retention_secs(),
        }
    }
}

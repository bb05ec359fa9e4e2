//! Server configuration loader.
//!
//! Layers, lowest precedence first: built-in defaults, a TOML file, then
//! environment variables. The binary applies its CLI flags on top.
//!
//! The file is `--config` if given, else `$ECHO_CONFIG`, else `echo.toml` in
//! the working directory when present. A missing or malformed file falls
//! back to defaults with a warning rather than refusing to start.

use std::ffi::OsString;
use std::fmt::Display;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use echo_types::config::{Environment, ServerConfig};

/// Environment variable naming the config file.
pub const CONFIG_ENV: &str = "ECHO_CONFIG";

/// Config file picked up from the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "echo.toml";

/// Load the effective configuration from file and process environment.
pub async fn load_config(explicit: Option<&Path>) -> ServerConfig {
    let mut config = match resolve_config_path(explicit, std::env::var_os(CONFIG_ENV)) {
        Some(path) => load_config_file(&path).await,
        None => ServerConfig::default(),
    };
    apply_env_overrides(&mut config, |name| std::env::var(name).ok());
    config
}

fn resolve_config_path(explicit: Option<&Path>, from_env: Option<OsString>) -> Option<PathBuf> {
    explicit
        .map(Path::to_path_buf)
        .or_else(|| from_env.filter(|v| !v.is_empty()).map(PathBuf::from))
        .or_else(|| {
            let local = PathBuf::from(DEFAULT_CONFIG_FILE);
            local.exists().then_some(local)
        })
}

/// Read and parse one TOML file, falling back to defaults on any failure.
pub async fn load_config_file(path: &Path) -> ServerConfig {
    let content = match tokio::fs::read_to_string(path).await {
        Ok(content) => content,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            tracing::warn!("Config file {} not found, using defaults", path.display());
            return ServerConfig::default();
        }
        Err(err) => {
            tracing::warn!("Failed to read {}: {err}, using defaults", path.display());
            return ServerConfig::default();
        }
    };

    match toml::from_str::<ServerConfig>(&content) {
        Ok(config) => {
            tracing::debug!("Loaded config from {}", path.display());
            config
        }
        Err(err) => {
            tracing::warn!("Failed to parse {}: {err}, using defaults", path.display());
            ServerConfig::default()
        }
    }
}

/// Apply environment overrides. `lookup` returns a variable's value.
///
/// Unparseable values are logged and skipped; the existing value stays.
pub fn apply_env_overrides(config: &mut ServerConfig, lookup: impl Fn(&str) -> Option<String>) {
    let var = |name: &str| lookup(name).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

    if let Some(env) = parse_var::<Environment>(&var, "ECHO_ENV") {
        config.environment = env;
    }
    if let Some(host) = var("HOST") {
        config.server.host = host;
    }
    if let Some(port) = parse_var::<u16>(&var, "PORT") {
        config.server.port = port;
    }
    if let Some(url) = var("REDIS_URL") {
        config.store.redis_url = Some(url);
    }
    if let Some(origins) = var("CORS_ORIGIN") {
        config.cors.allowed_origins = origins
            .split(',')
            .map(str::trim)
            .filter(|o| !o.is_empty())
            .map(str::to_string)
            .collect();
    }
    if let Some(url) = var("AI_SERVICE_URL") {
        config.provider.base_url = url;
    }
    if let Some(token) = var("AI_SERVICE_TOKEN") {
        config.provider.api_token = Some(token);
    }
    if let Some(secs) = parse_var::<u64>(&var, "SESSION_IDLE_TIMEOUT_SECS") {
        config.session.idle_timeout_secs = secs;
    }
    if let Some(secs) = parse_var::<u64>(&var, "ANALYSIS_TTL_SECS") {
        config.analysis.result_ttl_secs = secs;
    }
    if let Some(ms) = parse_var::<u64>(&var, "PROVIDER_TIMEOUT_MS") {
        config.provider.timeout_ms = ms;
    }
}

fn parse_var<T>(var: &impl Fn(&str) -> Option<String>, name: &str) -> Option<T>
where
    T: FromStr,
    T::Err: Display,
{
    let raw = var(name)?;
    match raw.parse() {
        Ok(value) => Some(value),
        Err(err) => {
            tracing::warn!(var = name, value = %raw, "Ignoring invalid environment value: {err}");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    use tempfile::TempDir;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[tokio::test]
    async fn missing_file_returns_default() {
        let tmp = TempDir::new().unwrap();
        let config = load_config_file(&tmp.path().join("echo.toml")).await;
        assert_eq!(config.server.port, 5000);
        assert_eq!(config.key_prefix, "echo:");
    }

    #[tokio::test]
    async fn valid_file_is_parsed() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("echo.toml");
        tokio::fs::write(
            &path,
            r#"
environment = "development"
key_prefix = "staging:"

[store]
redis_url = "redis://cache:6379"

[session]
idle_timeout_secs = 60
"#,
        )
        .await
        .unwrap();

        let config = load_config_file(&path).await;
        assert_eq!(config.environment, Environment::Development);
        assert_eq!(config.key_prefix, "staging:");
        assert_eq!(config.store.redis_url.as_deref(), Some("redis://cache:6379"));
        assert_eq!(config.session.idle_timeout_secs, 60);
        assert_eq!(config.session.ended_retention_secs, 300);
    }

    #[tokio::test]
    async fn malformed_file_returns_default() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("echo.toml");
        tokio::fs::write(&path, "port = [unterminated").await.unwrap();

        let config = load_config_file(&path).await;
        assert_eq!(config.server.port, 5000);
    }

    #[test]
    fn env_overrides_replace_file_values() {
        let mut config = ServerConfig::default();
        apply_env_overrides(
            &mut config,
            env(&[
                ("ECHO_ENV", "development"),
                ("PORT", "8080"),
                ("HOST", "127.0.0.1"),
                ("REDIS_URL", "redis://localhost:6379"),
                ("CORS_ORIGIN", "https://a.example, https://b.example,"),
                ("AI_SERVICE_URL", "https://analysis.example"),
                ("AI_SERVICE_TOKEN", "hf_secret"),
                ("SESSION_IDLE_TIMEOUT_SECS", "90"),
                ("ANALYSIS_TTL_SECS", "30"),
                ("PROVIDER_TIMEOUT_MS", "1500"),
            ]),
        );

        assert_eq!(config.environment, Environment::Development);
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.store.redis_url.as_deref(), Some("redis://localhost:6379"));
        assert_eq!(
            config.cors.allowed_origins,
            vec!["https://a.example", "https://b.example"]
        );
        assert_eq!(config.provider.base_url, "https://analysis.example");
        assert_eq!(config.provider.api_token.as_deref(), Some("hf_secret"));
        assert_eq!(config.session.idle_timeout_secs, 90);
        assert_eq!(config.analysis.result_ttl_secs, 30);
        assert_eq!(config.provider.timeout_ms, 1500);
    }

    #[test]
    fn invalid_env_values_are_ignored() {
        let mut config = ServerConfig::default();
        apply_env_overrides(
            &mut config,
            env(&[("PORT", "eighty"), ("ECHO_ENV", "staging"), ("REDIS_URL", "  ")]),
        );

        assert_eq!(config.server.port, 5000);
        assert_eq!(config.environment, Environment::Production);
        assert!(config.store.redis_url.is_none());
    }

    #[test]
    fn explicit_path_wins_over_env() {
        let explicit = PathBuf::from("/etc/echo/explicit.toml");
        let resolved = resolve_config_path(Some(&explicit), Some(OsString::from("/from/env.toml")));
        assert_eq!(resolved, Some(explicit));

        let resolved = resolve_config_path(None, Some(OsString::from("/from/env.toml")));
        assert_eq!(resolved, Some(PathBuf::from("/from/env.toml")));
    }
}

//! `echo-server check` - print the effective configuration and probe the
//! remote cache.

use std::time::Instant;

use console::style;
use serde_json::json;

use echo_core::store::{BoxRemoteCache, HybridStore};
use echo_infra::cache::RedisCache;
use echo_types::config::ServerConfig;

/// Result of probing the configured remote cache.
#[derive(Debug, PartialEq)]
enum RemoteProbe {
    NotConfigured,
    Invalid(String),
    Reachable { url: String, latency_ms: u128 },
    Unreachable { url: String },
}

async fn probe_remote(config: &ServerConfig) -> RemoteProbe {
    let Some(url) = config.store.redis_url.as_deref() else {
        return RemoteProbe::NotConfigured;
    };

    let cache = match RedisCache::new(url) {
        Ok(cache) => cache,
        Err(err) => return RemoteProbe::Invalid(err.to_string()),
    };
    let display = cache.display_url().to_string();

    let store = HybridStore::new(
        Some(BoxRemoteCache::new(cache)),
        config.key_prefix.clone(),
        config.store.remote_timeout(),
    );

    let started = Instant::now();
    if store.health_check().await {
        RemoteProbe::Reachable {
            url: display,
            latency_ms: started.elapsed().as_millis(),
        }
    } else {
        RemoteProbe::Unreachable { url: display }
    }
}

pub async fn check(config: &ServerConfig, json_output: bool) -> anyhow::Result<()> {
    let probe = probe_remote(config).await;

    if json_output {
        let remote = match &probe {
            RemoteProbe::NotConfigured => json!({ "configured": false }),
            RemoteProbe::Invalid(error) => json!({ "configured": true, "valid": false, "error": error }),
            RemoteProbe::Reachable { url, latency_ms } => {
                json!({ "configured": true, "url": url, "reachable": true, "latencyMs": latency_ms })
            }
            RemoteProbe::Unreachable { url } => {
                json!({ "configured": true, "url": url, "reachable": false })
            }
        };
        let mode = match probe {
            RemoteProbe::Reachable { .. } => "remote",
            _ => "local",
        };
        let output = json!({
            "environment": config.environment,
            "listen": format!("{}:{}", config.server.host, config.server.port),
            "keyPrefix": config.key_prefix,
            "storeMode": mode,
            "remote": remote,
            "provider": {
                "baseUrl": config.provider.base_url,
                "messagePath": config.provider.message_path,
                "fullPath": config.provider.full_path,
                "tokenConfigured": config.provider.api_token.is_some(),
                "timeoutMs": config.provider.timeout_ms,
            },
            "analysis": { "resultTtlSecs": config.analysis.result_ttl_secs },
            "session": {
                "idleTimeoutSecs": config.session.idle_timeout_secs,
                "endedRetentionSecs": config.session.ended_retention_secs,
            },
            "cors": { "allowedOrigins": config.cors.allowed_origins },
        });
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    let mark = |ok: bool| {
        if ok {
            format!("{}", style("✓").green())
        } else {
            format!("{}", style("✗").red())
        }
    };

    println!();
    println!("  {}", style("Echo server configuration").bold());
    println!();
    println!("  Environment     {}", config.environment);
    println!("  Listen          {}:{}", config.server.host, config.server.port);
    println!("  Key prefix      {}", config.key_prefix);
    println!(
        "  Provider        {}{} / {}",
        config.provider.base_url, config.provider.message_path, config.provider.full_path
    );
    println!(
        "  Result TTL      {}s   Idle timeout {}s",
        config.analysis.result_ttl_secs, config.session.idle_timeout_secs
    );
    println!();

    match probe {
        RemoteProbe::NotConfigured => {
            println!("  {} No Redis configured, store runs locally", style("•").dim());
        }
        RemoteProbe::Invalid(error) => {
            println!("  {} Invalid Redis URL: {}", mark(false), error);
        }
        RemoteProbe::Reachable { url, latency_ms } => {
            println!(
                "  {} Redis reachable at {} ({} ms)",
                mark(true),
                style(url).cyan(),
                latency_ms
            );
        }
        RemoteProbe::Unreachable { url } => {
            println!(
                "  {} Redis unreachable at {}, store would run locally",
                mark(false),
                style(url).cyan()
            );
        }
    }
    println!();

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn probe_without_redis_is_not_configured() {
        let config = ServerConfig::default();
        assert_eq!(probe_remote(&config).await, RemoteProbe::NotConfigured);
    }

    #[tokio::test]
    async fn probe_with_invalid_url_reports_it() {
        let mut config = ServerConfig::default();
        config.store.redis_url = Some("not a url".to_string());
        assert!(matches!(probe_remote(&config).await, RemoteProbe::Invalid(_)));
    }

    #[tokio::test]
    async fn probe_of_closed_port_is_unreachable() {
        let mut config = ServerConfig::default();
        config.store.redis_url = Some("redis://127.0.0.1:1/".to_string());
        assert!(matches!(
            probe_remote(&config).await,
            RemoteProbe::Unreachable { .. }
        ));
    }
}

//! Application state wiring all services together.
//!
//! Core services are generic over the remote cache and analysis client;
//! AppState pins them to the boxed wrappers so the binary can choose Redis
//! and the HTTP provider at runtime while tests substitute doubles.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use echo_core::analysis::{AnalysisService, BoxAnalysisClient, DedupOrchestrator};
use echo_core::session::{SessionCoordinator, SessionRooms};
use echo_core::store::{BoxRemoteCache, HybridStore};
use echo_infra::cache::RedisCache;
use echo_infra::provider::HttpAnalysisClient;
use echo_types::config::ServerConfig;

pub type ConcreteStore = HybridStore<BoxRemoteCache>;
pub type ConcreteSessions = SessionCoordinator<BoxRemoteCache>;
pub type ConcreteAnalysisService = AnalysisService<BoxAnalysisClient, BoxRemoteCache>;

/// Per-room broadcast buffer.
const ROOM_CAPACITY: usize = 256;

/// Shared application state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ServerConfig>,
    pub store: Arc<ConcreteStore>,
    pub sessions: Arc<ConcreteSessions>,
    pub analysis: Arc<ConcreteAnalysisService>,
    pub rooms: Arc<SessionRooms>,
    /// Fires when the server begins shutting down.
    pub shutdown: CancellationToken,
    pub started_at: DateTime<Utc>,
}

impl AppState {
    /// Wire services from already-built adapters.
    pub fn build(
        config: ServerConfig,
        remote: Option<BoxRemoteCache>,
        client: BoxAnalysisClient,
        shutdown: CancellationToken,
    ) -> Self {
        let store = Arc::new(HybridStore::new(
            remote,
            config.key_prefix.clone(),
            config.store.remote_timeout(),
        ));
        let sessions = Arc::new(SessionCoordinator::new(
            Arc::clone(&store),
            config.session.idle_timeout(),
            config.session.ended_retention(),
        ));
        let dedup = DedupOrchestrator::new(
            Arc::clone(&store),
            config.analysis.result_ttl(),
            config.provider.timeout(),
        );
        let analysis = Arc::new(AnalysisService::new(
            Arc::new(client),
            dedup,
            Arc::clone(&sessions),
        ));

        Self {
            config: Arc::new(config),
            store,
            sessions,
            analysis,
            rooms: Arc::new(SessionRooms::new(ROOM_CAPACITY)),
            shutdown,
            started_at: Utc::now(),
        }
    }

    /// Build the production state: Redis when configured, HTTP provider.
    pub async fn init(config: ServerConfig, shutdown: CancellationToken) -> anyhow::Result<Self> {
        let remote = match config.store.redis_url.as_deref() {
            Some(url) => match RedisCache::new(url) {
                Ok(cache) => {
                    tracing::info!(url = %cache.display_url(), "Using Redis as the shared store");
                    Some(BoxRemoteCache::new(cache))
                }
                Err(err) => {
                    tracing::warn!(error = %err, "Invalid Redis URL, running on the local store only");
                    None
                }
            },
            None => {
                tracing::info!("No Redis configured, running on the local store only");
                None
            }
        };

        let client = BoxAnalysisClient::new(HttpAnalysisClient::new(&config.provider)?);
        let state = Self::build(config, remote, client, shutdown);

        if state.store.has_remote() && !state.store.health_check().await {
            tracing::warn!("Redis unreachable at startup, serving from the local store until it recovers");
        }

        Ok(state)
    }

    /// Start the store reconciler. Stops with the shutdown token.
    pub fn spawn_reconciler(&self) -> JoinHandle<()> {
        Arc::clone(&self.store).spawn_reconciler(
            self.config.store.health_probe_interval(),
            self.shutdown.clone(),
        )
    }
}

//! Liveness, service info and runtime statistics.

use axum::Json;
use axum::extract::State;
use chrono::Utc;
use serde_json::{Value, json};

use crate::state::AppState;

/// GET /health
pub async fn health(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "OK",
        "message": "Echo analysis server is running",
        "environment": state.config.environment,
        "timestamp": Utc::now().to_rfc3339(),
        "store": {
            "mode": state.store.mode(),
            "remoteConfigured": state.store.has_remote(),
        },
    }))
}

/// GET /
pub async fn root(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "name": "echo-server",
        "version": env!("CARGO_PKG_VERSION"),
        "status": "running",
        "environment": state.config.environment,
    }))
}

/// GET /stats - Dedup counters, store mode and event-channel rooms.
pub async fn stats(State(state): State<AppState>) -> Json<Value> {
    let uptime_secs = (Utc::now() - state.started_at).num_seconds().max(0);

    Json(json!({
        "dedup": state.analysis.dedup().stats(),
        "store": {
            "mode": state.store.mode(),
            "localEntries": state.store.local_entries(),
        },
        "provider": state.analysis.provider_name(),
        "rooms": state.rooms.room_count(),
        "uptimeSecs": uptime_secs,
    }))
}

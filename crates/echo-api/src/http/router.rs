//! Axum router configuration with middleware.
//!
//! Analysis and session routes live under `/api/analysis/`; `/health`, `/`,
//! `/stats` and the `/ws` event channel sit at the root.
//! Middleware, outermost first: tracing, CORS, OPTIONS short-circuit.

use axum::extract::Request;
use axum::http::{HeaderValue, Method, StatusCode, header};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::json;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;

use echo_types::config::{Environment, ServerConfig};

use crate::http::handlers;
use crate::state::AppState;

/// Build the complete router with all routes and middleware.
pub fn build_router(state: AppState) -> Router {
    let cors = cors_layer(&state.config);

    let analysis_routes = Router::new()
        .route("/analyze", post(handlers::analysis::analyze))
        .route("/full", post(handlers::analysis::full))
        .route("/sentiment", post(handlers::analysis::sentiment))
        .route("/start", post(handlers::analysis::start))
        .route("/end", post(handlers::analysis::end))
        .route("/sessions/{id}", get(handlers::session::get_session));

    Router::new()
        .nest("/api/analysis", analysis_routes)
        .route("/", get(handlers::health::root))
        .route("/health", get(handlers::health::health))
        .route("/stats", get(handlers::health::stats))
        .route("/ws", get(handlers::ws::ws_handler))
        .fallback(route_not_found)
        .layer(middleware::from_fn(short_circuit_options))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Development mirrors any origin; elsewhere only the configured list.
fn cors_layer(config: &ServerConfig) -> CorsLayer {
    let origin = match config.environment {
        Environment::Development => AllowOrigin::mirror_request(),
        Environment::Production => {
            let origins: Vec<HeaderValue> = config
                .cors
                .allowed_origins
                .iter()
                .filter_map(|origin| match HeaderValue::from_str(origin.trim()) {
                    Ok(value) => Some(value),
                    Err(_) => {
                        tracing::warn!(origin = %origin, "Ignoring invalid CORS origin");
                        None
                    }
                })
                .collect();
            AllowOrigin::list(origins)
        }
    };

    CorsLayer::new()
        .allow_origin(origin)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
        .allow_credentials(true)
}

/// Answer every OPTIONS request with 200 and an empty body.
async fn short_circuit_options(request: Request, next: Next) -> Response {
    if request.method() == Method::OPTIONS {
        return StatusCode::OK.into_response();
    }
    next.run(request).await
}

async fn route_not_found() -> Response {
    (
        StatusCode::NOT_FOUND,
        Json(json!({
            "success": false,
            "error": "Route not found",
            "code": "NOT_FOUND",
        })),
    )
        .into_response()
}

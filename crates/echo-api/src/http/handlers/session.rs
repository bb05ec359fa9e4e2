//! Session lookup.
//!
//! GET /api/analysis/sessions/{id}

use axum::Json;
use axum::extract::{Path, State};

use echo_types::session::Session;

use crate::http::error::AppError;
use crate::state::AppState;

/// GET /api/analysis/sessions/{id} - The session record, ended ones included
/// while they are retained.
pub async fn get_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Session>, AppError> {
    state
        .sessions
        .get_session(&id)
        .await?
        .map(Json)
        .ok_or_else(|| AppError::NotFound("Session not found".to_string()))
}

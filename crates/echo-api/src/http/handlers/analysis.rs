//! Analysis and session lifecycle HTTP handlers.
//!
//! Endpoints:
//! - POST /api/analysis/analyze   - Quick (per-message) analysis
//! - POST /api/analysis/full      - Full analysis
//! - POST /api/analysis/sentiment - Sentiment only
//! - POST /api/analysis/start     - Start a two-party session
//! - POST /api/analysis/end       - End a session

use axum::Json;
use axum::extract::State;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use echo_core::analysis::{AnalysisRequest, ResolvedAnalysis};
use echo_types::analysis::{AnalysisKey, AnalysisKind, Sentiment};
use echo_types::session::Session;

use crate::http::error::AppError;
use crate::http::extractors::json::ValidatedJson;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyzeBody {
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub session_id: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartBody {
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub user_id1: Option<String>,
    #[serde(default)]
    pub user_id2: Option<String>,
    /// Client clock, epoch milliseconds or RFC 3339. Logged only.
    #[serde(default)]
    pub timestamp: Option<Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EndBody {
    #[serde(default)]
    pub session_id: Option<String>,
}

/// Analysis result object returned by `/analyze` and `/full`.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisResponse {
    pub success: bool,
    pub key: AnalysisKey,
    pub kind: AnalysisKind,
    pub analysis: String,
    pub sentiment: Option<Sentiment>,
    pub computed_at: DateTime<Utc>,
    pub cached: bool,
}

impl From<ResolvedAnalysis> for AnalysisResponse {
    fn from(resolved: ResolvedAnalysis) -> Self {
        let cached = resolved.cached();
        let result = resolved.result;
        Self {
            success: result.success,
            key: result.key,
            kind: result.kind,
            analysis: result.raw_analysis,
            sentiment: result.sentiment,
            computed_at: result.computed_at,
            cached,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SentimentResponse {
    pub sentiment: Option<Sentiment>,
    pub raw_analysis: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StartResponse {
    pub success: bool,
    pub session_id: String,
    pub analysis_started: bool,
}

#[derive(Debug, Serialize)]
pub struct EndResponse {
    pub success: bool,
    pub session: Session,
}

async fn run_analysis(
    state: &AppState,
    body: AnalyzeBody,
    kind: AnalysisKind,
) -> Result<ResolvedAnalysis, AppError> {
    let request = AnalysisRequest {
        session_id: body.session_id,
        text: body.text.unwrap_or_default(),
        kind,
    };
    Ok(state.analysis.analyze(request).await?)
}

/// POST /api/analysis/analyze
pub async fn analyze(
    State(state): State<AppState>,
    ValidatedJson(body): ValidatedJson<AnalyzeBody>,
) -> Result<Json<AnalysisResponse>, AppError> {
    let resolved = run_analysis(&state, body, AnalysisKind::Quick).await?;
    Ok(Json(resolved.into()))
}

/// POST /api/analysis/full
pub async fn full(
    State(state): State<AppState>,
    ValidatedJson(body): ValidatedJson<AnalyzeBody>,
) -> Result<Json<AnalysisResponse>, AppError> {
    let resolved = run_analysis(&state, body, AnalysisKind::Full).await?;
    Ok(Json(resolved.into()))
}

/// POST /api/analysis/sentiment
///
/// Shares the quick-analysis cache entry with `/analyze`.
pub async fn sentiment(
    State(state): State<AppState>,
    ValidatedJson(body): ValidatedJson<AnalyzeBody>,
) -> Result<Json<SentimentResponse>, AppError> {
    let resolved = run_analysis(&state, body, AnalysisKind::Quick).await?;
    Ok(Json(SentimentResponse {
        sentiment: resolved.result.sentiment,
        raw_analysis: resolved.result.raw_analysis,
    }))
}

/// POST /api/analysis/start
pub async fn start(
    State(state): State<AppState>,
    ValidatedJson(body): ValidatedJson<StartBody>,
) -> Result<Json<StartResponse>, AppError> {
    let session_id = required(body.session_id, "sessionId")?;
    let user1 = required(body.user_id1, "userId1")?;
    let user2 = required(body.user_id2, "userId2")?;
    let client_time = match body.timestamp {
        Some(raw) => Some(parse_client_timestamp(&raw)?),
        None => None,
    };

    let session = state
        .sessions
        .start_session(&session_id, [user1, user2])
        .await?;

    tracing::debug!(
        session_id = %session.id,
        state = %session.state,
        client_time = ?client_time,
        "Start request handled"
    );

    Ok(Json(StartResponse {
        success: true,
        session_id: session.id,
        analysis_started: true,
    }))
}

/// POST /api/analysis/end
///
/// Also closes the session's event-channel room.
pub async fn end(
    State(state): State<AppState>,
    ValidatedJson(body): ValidatedJson<EndBody>,
) -> Result<Json<EndResponse>, AppError> {
    let session_id = required(body.session_id, "sessionId")?;
    let session = state.sessions.end_session(&session_id).await?;
    state.rooms.close(&session.id);

    Ok(Json(EndResponse {
        success: true,
        session,
    }))
}

/// A present, non-blank string field.
fn required(value: Option<String>, field: &str) -> Result<String, AppError> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .ok_or_else(|| AppError::Validation(format!("{field} is required")))
}

/// Accept epoch milliseconds (number or numeric string) or RFC 3339.
fn parse_client_timestamp(raw: &Value) -> Result<DateTime<Utc>, AppError> {
    let invalid = || AppError::Validation("timestamp must be epoch milliseconds or RFC 3339".to_string());

    match raw {
        Value::Number(n) => n
            .as_i64()
            .and_then(DateTime::from_timestamp_millis)
            .ok_or_else(invalid),
        Value::String(s) => {
            let s = s.trim();
            if let Ok(ms) = s.parse::<i64>() {
                return DateTime::from_timestamp_millis(ms).ok_or_else(invalid);
            }
            DateTime::parse_from_rfc3339(s)
                .map(|dt| dt.with_timezone(&Utc))
                .map_err(|_| invalid())
        }
        _ => Err(invalid()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn timestamp_accepts_millis_and_rfc3339() {
        let from_number = parse_client_timestamp(&json!(1_700_000_000_000_i64)).unwrap();
        let from_string = parse_client_timestamp(&json!("1700000000000")).unwrap();
        let from_rfc = parse_client_timestamp(&json!("2023-11-14T22:13:20Z")).unwrap();
        assert_eq!(from_number, from_string);
        assert_eq!(from_number, from_rfc);
    }

    #[test]
    fn timestamp_rejects_garbage() {
        assert!(parse_client_timestamp(&json!("yesterday")).is_err());
        assert!(parse_client_timestamp(&json!(true)).is_err());
    }

    #[test]
    fn required_rejects_blank() {
        assert!(required(Some("  ".into()), "sessionId").is_err());
        assert!(required(None, "userId1").is_err());
        assert_eq!(required(Some(" s1 ".into()), "sessionId").unwrap(), "s1");
    }
}

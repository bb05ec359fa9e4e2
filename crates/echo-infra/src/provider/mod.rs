//! HttpAnalysisClient -- [`AnalysisClient`] over the analysis service's
//! JSON API.
//!
//! Quick and full analyses are separate endpoints on the same host. Both
//! take `{"text": ...}` and answer with either a bare JSON string or an
//! object carrying the analysis in one of a few well-known fields.
//!
//! The bearer token is held as a [`SecretString`] and only exposed when the
//! request header is built.

use secrecy::{ExposeSecret, SecretString};
use serde_json::{Value, json};

use echo_core::analysis::AnalysisClient;
use echo_types::analysis::AnalysisKind;
use echo_types::config::ProviderConfig;
use echo_types::error::ProviderError;

/// Fields checked, in order, for the analysis text in an object response.
const ANALYSIS_FIELDS: [&str; 4] = ["analysis", "result", "response", "output"];

/// Longest error body kept in a [`ProviderError::Status`].
const MAX_ERROR_BODY: usize = 200;

pub struct HttpAnalysisClient {
    client: reqwest::Client,
    base_url: String,
    message_path: String,
    full_path: String,
    api_token: Option<SecretString>,
    timeout_ms: u64,
}

impl HttpAnalysisClient {
    pub fn new(config: &ProviderConfig) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout())
            .build()?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            message_path: config.message_path.clone(),
            full_path: config.full_path.clone(),
            api_token: config
                .api_token
                .as_deref()
                .filter(|t| !t.is_empty())
                .map(|t| SecretString::from(t.to_string())),
            timeout_ms: config.timeout_ms,
        })
    }

    fn url(&self, kind: AnalysisKind) -> String {
        let path = match kind {
            AnalysisKind::Quick => &self.message_path,
            AnalysisKind::Full => &self.full_path,
        };
        format!("{}{}", self.base_url, path)
    }

    fn map_send_error(&self, err: reqwest::Error) -> ProviderError {
        if err.is_timeout() {
            ProviderError::Timeout(self.timeout_ms)
        } else {
            ProviderError::Unreachable(err.to_string())
        }
    }
}

impl AnalysisClient for HttpAnalysisClient {
    fn name(&self) -> &str {
        "http"
    }

    async fn analyze(&self, text: &str, kind: AnalysisKind) -> Result<String, ProviderError> {
        let url = self.url(kind);

        let mut request = self.client.post(&url).json(&json!({ "text": text }));
        if let Some(token) = &self.api_token {
            request = request.bearer_auth(token.expose_secret());
        }

        let response = request.send().await.map_err(|e| self.map_send_error(e))?;

        let status = response.status();
        let body = response.text().await.map_err(|e| self.map_send_error(e))?;

        if !status.is_success() {
            tracing::debug!(%url, status = status.as_u16(), "Analysis provider returned an error");
            return Err(ProviderError::Status {
                status: status.as_u16(),
                body: truncate(&body, MAX_ERROR_BODY),
            });
        }

        extract_analysis(&body)
    }
}

impl std::fmt::Debug for HttpAnalysisClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpAnalysisClient")
            .field("base_url", &self.base_url)
            .field("has_token", &self.api_token.is_some())
            .finish()
    }
}

/// Pull the raw analysis text out of a provider response body.
fn extract_analysis(body: &str) -> Result<String, ProviderError> {
    let value: Value = serde_json::from_str(body)
        .map_err(|e| ProviderError::Malformed(format!("response is not JSON: {e}")))?;

    let raw = match value {
        Value::String(text) => text,
        Value::Object(map) => ANALYSIS_FIELDS
            .iter()
            .find_map(|field| map.get(*field).and_then(Value::as_str))
            .map(str::to_string)
            .unwrap_or_else(|| Value::Object(map).to_string()),
        Value::Null => String::new(),
        other => other.to_string(),
    };

    if raw.trim().is_empty() {
        return Err(ProviderError::Malformed("empty analysis".to_string()));
    }
    Ok(raw)
}

fn truncate(body: &str, max_chars: usize) -> String {
    match body.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}...", &body[..idx]),
        None => body.to_string(),
    }
}

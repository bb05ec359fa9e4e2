//! Analysis request keys and results.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use std::fmt;
use std::str::FromStr;

/// Session scope used for analysis requests that carry no session id.
pub const ANONYMOUS_SCOPE: &str = "anonymous";

/// Which provider operation produced a result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnalysisKind {
    /// Per-message sentiment analysis.
    Quick,
    /// Full semantic analysis.
    Full,
}

impl fmt::Display for AnalysisKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AnalysisKind::Quick => write!(f, "quick"),
            AnalysisKind::Full => write!(f, "full"),
        }
    }
}

/// Sentiment label extracted from a raw analysis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sentiment {
    Positive,
    Negative,
    Neutral,
}

impl fmt::Display for Sentiment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Sentiment::Positive => write!(f, "positive"),
            Sentiment::Negative => write!(f, "negative"),
            Sentiment::Neutral => write!(f, "neutral"),
        }
    }
}

impl FromStr for Sentiment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "positive" | "pos" => Ok(Sentiment::Positive),
            "negative" | "neg" => Ok(Sentiment::Negative),
            "neutral" => Ok(Sentiment::Neutral),
            other => Err(format!("invalid sentiment: '{other}'")),
        }
    }
}

/// Collapse runs of whitespace to a single space and trim the ends.
///
/// Case is preserved: the provider may treat case as signal.
pub fn normalize_text(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Deterministic dedup and cache key for an analysis request.
///
/// Hex SHA-256 over `(kind, session scope, normalized text)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AnalysisKey(String);

impl AnalysisKey {
    pub fn derive(session_id: Option<&str>, text: &str, kind: AnalysisKind) -> Self {
        let scope = session_id
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .unwrap_or(ANONYMOUS_SCOPE);

        let mut hasher = Sha256::new();
        hasher.update(kind.to_string().as_bytes());
        hasher.update([0x1f]);
        hasher.update(scope.as_bytes());
        hasher.update([0x1f]);
        hasher.update(normalize_text(text).as_bytes());

        let digest = hasher.finalize();
        let hex = digest.iter().map(|b| format!("{b:02x}")).collect::<String>();
        Self(hex)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AnalysisKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// What the provider returned for one request, before it becomes a result.
#[derive(Debug, Clone, PartialEq)]
pub struct RawAnalysis {
    pub raw_analysis: String,
    pub sentiment: Option<Sentiment>,
}

/// Outcome of one analysis, as cached and as returned to callers.
///
/// Immutable once built. Only successful results are ever cached.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisResult {
    pub key: AnalysisKey,
    pub kind: AnalysisKind,
    pub raw_analysis: String,
    pub sentiment: Option<Sentiment>,
    pub computed_at: DateTime<Utc>,
    pub success: bool,
    pub error_reason: Option<String>,
}

impl AnalysisResult {
    /// Successful result computed now.
    pub fn completed(key: AnalysisKey, kind: AnalysisKind, raw: RawAnalysis) -> Self {
        Self {
            key,
            kind,
            raw_analysis: raw.raw_analysis,
            sentiment: raw.sentiment,
            computed_at: Utc::now(),
            success: true,
            error_reason: None,
        }
    }

    /// Failed result, used only to report a failure on the event channel.
    pub fn failed(key: AnalysisKey, kind: AnalysisKind, reason: impl Into<String>) -> Self {
        Self {
            key,
            kind,
            raw_analysis: String::new(),
            sentiment: None,
            computed_at: Utc::now(),
            success: false,
            error_reason: Some(reason.into()),
        }
    }

    /// Whether the result is still inside its validity window at `now`.
    pub fn is_fresh(&self, now: DateTime<Utc>, ttl: chrono::Duration) -> bool {
        self.success && now - self.computed_at < ttl
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_collapses_whitespace() {
        assert_eq!(normalize_text("  hello \n\t world  "), "hello world");
        assert_eq!(normalize_text("Hello"), "Hello");
        assert_eq!(normalize_text("   "), "");
    }

    #[test]
    fn test_key_is_deterministic() {
        let a = AnalysisKey::derive(Some("s1"), "hello world", AnalysisKind::Quick);
        let b = AnalysisKey::derive(Some("s1"), "  hello   world ", AnalysisKind::Quick);
        assert_eq!(a, b);
        assert_eq!(a.as_str().len(), 64);
    }

    #[test]
    fn test_key_separates_sessions_kinds_and_case() {
        let base = AnalysisKey::derive(Some("s1"), "hello", AnalysisKind::Quick);
        assert_ne!(base, AnalysisKey::derive(Some("s2"), "hello", AnalysisKind::Quick));
        assert_ne!(base, AnalysisKey::derive(Some("s1"), "hello", AnalysisKind::Full));
        assert_ne!(base, AnalysisKey::derive(Some("s1"), "Hello", AnalysisKind::Quick));
    }

    #[test]
    fn test_blank_session_uses_anonymous_scope() {
        let none = AnalysisKey::derive(None, "hello", AnalysisKind::Quick);
        let blank = AnalysisKey::derive(Some("  "), "hello", AnalysisKind::Quick);
        let named = AnalysisKey::derive(Some(ANONYMOUS_SCOPE), "hello", AnalysisKind::Quick);
        assert_eq!(none, blank);
        assert_eq!(none, named);
    }

    #[test]
    fn test_sentiment_from_str() {
        assert_eq!("Positive".parse::<Sentiment>().unwrap(), Sentiment::Positive);
        assert_eq!(" neg ".parse::<Sentiment>().unwrap(), Sentiment::Negative);
        assert!("angry".parse::<Sentiment>().is_err());
    }

    #[test]
    fn test_completed_result_freshness() {
        let key = AnalysisKey::derive(None, "hi", AnalysisKind::Quick);
        let result = AnalysisResult::completed(
            key,
            AnalysisKind::Quick,
            RawAnalysis {
                raw_analysis: "positive".to_string(),
                sentiment: Some(Sentiment::Positive),
            },
        );
        let ttl = chrono::Duration::seconds(60);
        assert!(result.is_fresh(result.computed_at, ttl));
        assert!(!result.is_fresh(result.computed_at + chrono::Duration::seconds(61), ttl));
    }

    #[test]
    fn test_failed_result_is_never_fresh() {
        let key = AnalysisKey::derive(None, "hi", AnalysisKind::Quick);
        let result = AnalysisResult::failed(key, AnalysisKind::Quick, "provider down");
        assert!(!result.success);
        assert_eq!(result.error_reason.as_deref(), Some("provider down"));
        assert!(!result.is_fresh(result.computed_at, chrono::Duration::seconds(60)));
    }

    #[test]
    fn test_result_serializes_camel_case() {
        let key = AnalysisKey::derive(None, "hi", AnalysisKind::Full);
        let result = AnalysisResult::failed(key.clone(), AnalysisKind::Full, "x");
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["key"], key.as_str());
        assert_eq!(json["kind"], "full");
        assert_eq!(json["errorReason"], "x");
        assert!(json["sentiment"].is_null());
    }
}

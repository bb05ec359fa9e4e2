//! AnalysisClient trait definition.
//!
//! The analysis provider is a remote text-analysis service. The core only
//! needs two capabilities from it: produce a raw analysis for a text, and
//! derive a sentiment label from that raw analysis. Implementations live in
//! echo-infra (e.g., `HttpAnalysisClient`).

use std::future::Future;
use std::pin::Pin;

use echo_types::analysis::{AnalysisKind, Sentiment};
use echo_types::error::ProviderError;

use super::sentiment::parse_sentiment;

/// Adapter over the external analysis provider.
pub trait AnalysisClient: Send + Sync + 'static {
    /// Human-readable provider name for logs.
    fn name(&self) -> &str;

    /// Ask the provider to analyze `text`. Slow and fallible.
    fn analyze(
        &self,
        text: &str,
        kind: AnalysisKind,
    ) -> impl Future<Output = Result<String, ProviderError>> + Send;

    /// Derive a sentiment label from a raw analysis.
    fn classify_sentiment(&self, raw_analysis: &str) -> Option<Sentiment> {
        parse_sentiment(raw_analysis)
    }
}

/// Object-safe version of [`AnalysisClient`] with a boxed future.
pub trait AnalysisClientDyn: Send + Sync {
    fn name(&self) -> &str;

    fn analyze_boxed<'a>(
        &'a self,
        text: &'a str,
        kind: AnalysisKind,
    ) -> Pin<Box<dyn Future<Output = Result<String, ProviderError>> + Send + 'a>>;

    fn classify_sentiment(&self, raw_analysis: &str) -> Option<Sentiment>;
}

impl<T: AnalysisClient> AnalysisClientDyn for T {
    fn name(&self) -> &str {
        AnalysisClient::name(self)
    }

    fn analyze_boxed<'a>(
        &'a self,
        text: &'a str,
        kind: AnalysisKind,
    ) -> Pin<Box<dyn Future<Output = Result<String, ProviderError>> + Send + 'a>> {
        Box::pin(self.analyze(text, kind))
    }

    fn classify_sentiment(&self, raw_analysis: &str) -> Option<Sentiment> {
        AnalysisClient::classify_sentiment(self, raw_analysis)
    }
}

/// Type-erased analysis client for runtime selection (HTTP provider in
/// production, scripted doubles in tests).
pub struct BoxAnalysisClient {
    inner: Box<dyn AnalysisClientDyn>,
}

impl BoxAnalysisClient {
    pub fn new<T: AnalysisClient>(client: T) -> Self {
        Self {
            inner: Box::new(client),
        }
    }
}

impl AnalysisClient for BoxAnalysisClient {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn analyze(&self, text: &str, kind: AnalysisKind) -> Result<String, ProviderError> {
        self.inner.analyze_boxed(text, kind).await
    }

    fn classify_sentiment(&self, raw_analysis: &str) -> Option<Sentiment> {
        self.inner.classify_sentiment(raw_analysis)
    }
}

impl std::fmt::Debug for BoxAnalysisClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BoxAnalysisClient")
            .field("name", &self.inner.name())
            .finish()
    }
}

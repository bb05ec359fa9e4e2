//! Analysis pipeline shared by the HTTP handlers and the event channel.
//!
//! Validate, record session activity, derive the key, then hand off to the
//! dedup orchestrator with a compute closure bound to the provider.

use std::sync::Arc;

use echo_types::analysis::{AnalysisKey, AnalysisKind, RawAnalysis, normalize_text};
use echo_types::error::{AnalysisError, ProviderError};

use super::client::AnalysisClient;
use super::dedup::{DedupOrchestrator, ResolvedAnalysis};
use crate::session::SessionCoordinator;
use crate::store::RemoteCache;

/// One analysis request as the router hands it over.
#[derive(Debug, Clone)]
pub struct AnalysisRequest {
    pub session_id: Option<String>,
    pub text: String,
    pub kind: AnalysisKind,
}

pub struct AnalysisService<C, R> {
    client: Arc<C>,
    dedup: DedupOrchestrator<R>,
    sessions: Arc<SessionCoordinator<R>>,
}

impl<C: AnalysisClient, R: RemoteCache> AnalysisService<C, R> {
    pub fn new(
        client: Arc<C>,
        dedup: DedupOrchestrator<R>,
        sessions: Arc<SessionCoordinator<R>>,
    ) -> Self {
        Self {
            client,
            dedup,
            sessions,
        }
    }

    pub fn dedup(&self) -> &DedupOrchestrator<R> {
        &self.dedup
    }

    pub fn provider_name(&self) -> &str {
        self.client.name()
    }

    /// Analyze one text.
    ///
    /// The session id is optional context: an unknown or ended session does
    /// not fail the analysis.
    pub async fn analyze(&self, request: AnalysisRequest) -> Result<ResolvedAnalysis, AnalysisError> {
        let text = normalize_text(&request.text);
        if text.is_empty() {
            return Err(AnalysisError::Validation("text is required".to_string()));
        }

        let session_id = request
            .session_id
            .as_deref()
            .map(str::trim)
            .filter(|id| !id.is_empty());

        if let Some(id) = session_id {
            if let Err(err) = self.sessions.touch(id).await {
                tracing::debug!(session_id = id, error = %err, "Analyzing outside a live session");
            }
        }

        let kind = request.kind;
        let key = AnalysisKey::derive(session_id, &text, kind);
        let client = Arc::clone(&self.client);

        let resolved = self
            .dedup
            .resolve(&key, kind, move || async move {
                let raw = client.analyze(&text, kind).await?;
                let sentiment = client.classify_sentiment(&raw);
                Ok::<_, ProviderError>(RawAnalysis {
                    raw_analysis: raw,
                    sentiment,
                })
            })
            .await?;

        tracing::debug!(
            %key,
            %kind,
            session_id = session_id.unwrap_or_default(),
            origin = ?resolved.origin,
            "Analysis resolved"
        );
        Ok(resolved)
    }
}

impl<C, R> std::fmt::Debug for AnalysisService<C, R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnalysisService")
            .field("dedup", &self.dedup)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use echo_types::analysis::Sentiment;
    use echo_types::session::SessionState;

    use crate::analysis::dedup::ResolveOrigin;
    use crate::store::HybridStore;
    use crate::store::hybrid::tests::FakeRemote;

    /// Provider double that echoes a fixed verdict and counts calls.
    struct ScriptedClient {
        verdict: &'static str,
        fail: bool,
        delay: Duration,
        calls: AtomicUsize,
    }

    impl ScriptedClient {
        fn answering(verdict: &'static str) -> Self {
            Self {
                verdict,
                fail: false,
                delay: Duration::ZERO,
                calls: AtomicUsize::new(0),
            }
        }
    }

    impl AnalysisClient for ScriptedClient {
        fn name(&self) -> &str {
            "scripted"
        }

        async fn analyze(&self, text: &str, kind: AnalysisKind) -> Result<String, ProviderError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            if self.fail {
                return Err(ProviderError::Unreachable("connection refused".to_string()));
            }
            Ok(format!("{kind} analysis of '{text}': {}", self.verdict))
        }
    }

    struct Fixture {
        client: Arc<ScriptedClient>,
        sessions: Arc<SessionCoordinator<FakeRemote>>,
        service: AnalysisService<ScriptedClient, FakeRemote>,
    }

    fn fixture(client: ScriptedClient) -> Fixture {
        let store = Arc::new(HybridStore::local_only("t:"));
        let sessions = Arc::new(SessionCoordinator::new(
            Arc::clone(&store),
            Duration::from_secs(60),
            Duration::from_secs(60),
        ));
        let dedup = DedupOrchestrator::new(store, Duration::from_secs(60), Duration::from_secs(5));
        let client = Arc::new(client);
        let service = AnalysisService::new(Arc::clone(&client), dedup, Arc::clone(&sessions));
        Fixture {
            client,
            sessions,
            service,
        }
    }

    fn request(session_id: Option<&str>, text: &str, kind: AnalysisKind) -> AnalysisRequest {
        AnalysisRequest {
            session_id: session_id.map(str::to_string),
            text: text.to_string(),
            kind,
        }
    }

    #[tokio::test]
    async fn blank_text_is_rejected_before_the_provider() {
        let fx = fixture(ScriptedClient::answering("positive"));

        let err = fx
            .service
            .analyze(request(Some("s1"), "  \n ", AnalysisKind::Quick))
            .await
            .unwrap_err();

        assert!(matches!(err, AnalysisError::Validation(_)));
        assert_eq!(fx.client.calls.load(Ordering::SeqCst), 0);
        assert_eq!(fx.service.dedup().stats().provider_calls, 0);
    }

    #[tokio::test]
    async fn analysis_classifies_sentiment() {
        let fx = fixture(ScriptedClient::answering("negative"));

        let resolved = fx
            .service
            .analyze(request(None, "this is awful", AnalysisKind::Quick))
            .await
            .unwrap();

        assert_eq!(resolved.origin, ResolveOrigin::Leader);
        assert_eq!(resolved.result.sentiment, Some(Sentiment::Negative));
        assert!(resolved.result.raw_analysis.contains("awful"));
    }

    #[tokio::test]
    async fn unknown_session_does_not_fail_analysis() {
        let fx = fixture(ScriptedClient::answering("neutral"));

        let resolved = fx
            .service
            .analyze(request(Some("ghost"), "hello", AnalysisKind::Quick))
            .await
            .unwrap();

        assert!(resolved.result.success);
        assert!(fx.sessions.get_session("ghost").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn analysis_touches_a_started_session() {
        let fx = fixture(ScriptedClient::answering("positive"));
        fx.sessions
            .start_session("s1", ["a".to_string(), "b".to_string()])
            .await
            .unwrap();

        fx.service
            .analyze(request(Some("s1"), "great", AnalysisKind::Quick))
            .await
            .unwrap();

        let session = fx.sessions.get_session("s1").await.unwrap().unwrap();
        assert_eq!(session.state, SessionState::Active);
    }

    #[tokio::test]
    async fn whitespace_variants_share_one_call() {
        let fx = fixture(ScriptedClient {
            delay: Duration::from_millis(30),
            ..ScriptedClient::answering("positive")
        });

        let (a, b) = tokio::join!(
            fx.service.analyze(request(Some("s1"), "good  morning", AnalysisKind::Quick)),
            fx.service.analyze(request(Some("s1"), " good morning ", AnalysisKind::Quick)),
        );

        assert_eq!(a.unwrap().result, b.unwrap().result);
        assert_eq!(fx.client.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn quick_and_full_are_cached_separately() {
        let fx = fixture(ScriptedClient::answering("positive"));

        let quick = fx
            .service
            .analyze(request(None, "hello", AnalysisKind::Quick))
            .await
            .unwrap();
        let full = fx
            .service
            .analyze(request(None, "hello", AnalysisKind::Full))
            .await
            .unwrap();

        assert_ne!(quick.result.key, full.result.key);
        assert_eq!(full.result.kind, AnalysisKind::Full);
        assert_eq!(fx.client.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn provider_failure_surfaces_as_provider_error() {
        let fx = fixture(ScriptedClient {
            fail: true,
            ..ScriptedClient::answering("positive")
        });

        let err = fx
            .service
            .analyze(request(None, "hello", AnalysisKind::Quick))
            .await
            .unwrap_err();

        assert!(matches!(err, AnalysisError::Provider(_)));
    }
}

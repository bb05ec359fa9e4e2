//! Single-flight analysis orchestration.
//!
//! For every [`AnalysisKey`] at most one provider call is outstanding. The
//! first caller to miss the cache becomes the leader and starts the call in a
//! detached task; callers arriving while it runs become waiters and receive
//! the leader's outcome through a `watch` channel. Successful results are
//! cached in the hybrid store; failures are not, so the next caller after a
//! failure starts a fresh call.
//!
//! Because the call runs in its own task, a caller that goes away (closed
//! socket, aborted request) only abandons its own wait. The call still
//! completes and its result is still cached.

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use chrono::Utc;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use serde::Serialize;
use tokio::sync::watch;

use echo_types::analysis::{AnalysisKey, AnalysisKind, AnalysisResult, RawAnalysis};
use echo_types::error::{AnalysisError, ProviderError};

use crate::store::{HybridStore, Namespace, RemoteCache};

type Settlement = Result<AnalysisResult, AnalysisError>;

/// How a caller obtained its result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ResolveOrigin {
    /// Served from the cache; no provider call.
    Cache,
    /// This caller started the provider call.
    Leader,
    /// This caller joined a call already in flight.
    Waiter,
}

/// A successful resolution and where it came from.
#[derive(Debug, Clone)]
pub struct ResolvedAnalysis {
    pub result: AnalysisResult,
    pub origin: ResolveOrigin,
}

impl ResolvedAnalysis {
    pub fn cached(&self) -> bool {
        self.origin == ResolveOrigin::Cache
    }
}

/// Running counters, exposed on the stats endpoint.
#[derive(Debug, Default)]
pub struct DedupStats {
    cache_hits: AtomicU64,
    provider_calls: AtomicU64,
    waiter_joins: AtomicU64,
    failures: AtomicU64,
}

/// Point-in-time copy of [`DedupStats`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DedupSnapshot {
    pub cache_hits: u64,
    pub provider_calls: u64,
    pub waiter_joins: u64,
    pub failures: u64,
    pub in_flight: usize,
}

/// Outstanding provider call for one key.
struct InFlightEntry {
    settled: watch::Receiver<Option<Settlement>>,
    waiters: usize,
    started_at: Instant,
}

/// Removes the in-flight entry when the leader finishes, including by panic.
struct InFlightSlot {
    in_flight: Arc<DashMap<AnalysisKey, InFlightEntry>>,
    key: AnalysisKey,
}

impl Drop for InFlightSlot {
    fn drop(&mut self) {
        if let Some((_, entry)) = self.in_flight.remove(&self.key) {
            tracing::debug!(
                key = %self.key,
                waiters = entry.waiters,
                elapsed_ms = entry.started_at.elapsed().as_millis() as u64,
                "Analysis settled"
            );
        }
    }
}

/// Guarantees one provider call per key per epoch and fans the outcome out
/// to every concurrent caller.
pub struct DedupOrchestrator<R> {
    store: Arc<HybridStore<R>>,
    in_flight: Arc<DashMap<AnalysisKey, InFlightEntry>>,
    result_ttl: Duration,
    call_timeout: Duration,
    stats: Arc<DedupStats>,
}

impl<R> Clone for DedupOrchestrator<R> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            in_flight: Arc::clone(&self.in_flight),
            result_ttl: self.result_ttl,
            call_timeout: self.call_timeout,
            stats: Arc::clone(&self.stats),
        }
    }
}

impl<R: RemoteCache> DedupOrchestrator<R> {
    pub fn new(store: Arc<HybridStore<R>>, result_ttl: Duration, call_timeout: Duration) -> Self {
        Self {
            store,
            in_flight: Arc::new(DashMap::new()),
            result_ttl,
            call_timeout,
            stats: Arc::new(DedupStats::default()),
        }
    }

    /// Number of keys with a provider call outstanding.
    pub fn in_flight_count(&self) -> usize {
        self.in_flight.len()
    }

    pub fn stats(&self) -> DedupSnapshot {
        DedupSnapshot {
            cache_hits: self.stats.cache_hits.load(Ordering::Relaxed),
            provider_calls: self.stats.provider_calls.load(Ordering::Relaxed),
            waiter_joins: self.stats.waiter_joins.load(Ordering::Relaxed),
            failures: self.stats.failures.load(Ordering::Relaxed),
            in_flight: self.in_flight.len(),
        }
    }

    /// Resolve `key` from the cache, from a call already in flight, or by
    /// starting `compute` as the new leader.
    pub async fn resolve<F, Fut>(
        &self,
        key: &AnalysisKey,
        kind: AnalysisKind,
        compute: F,
    ) -> Result<ResolvedAnalysis, AnalysisError>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<RawAnalysis, ProviderError>> + Send + 'static,
    {
        if let Some(result) = self.cached(key).await {
            self.stats.cache_hits.fetch_add(1, Ordering::Relaxed);
            tracing::debug!(%key, "Analysis cache hit");
            return Ok(ResolvedAnalysis {
                result,
                origin: ResolveOrigin::Cache,
            });
        }

        // Check-and-insert is one step under the DashMap shard lock.
        let (mut settled, leader_tx) = match self.in_flight.entry(key.clone()) {
            Entry::Occupied(mut occupied) => {
                occupied.get_mut().waiters += 1;
                (occupied.get().settled.clone(), None)
            }
            Entry::Vacant(vacant) => {
                let (tx, rx) = watch::channel(None);
                vacant.insert(InFlightEntry {
                    settled: rx.clone(),
                    waiters: 0,
                    started_at: Instant::now(),
                });
                (rx, Some(tx))
            }
        };

        let origin = match leader_tx {
            Some(tx) => {
                self.spawn_leader(key.clone(), kind, compute, tx);
                ResolveOrigin::Leader
            }
            None => {
                self.stats.waiter_joins.fetch_add(1, Ordering::Relaxed);
                tracing::debug!(%key, "Joining in-flight analysis");
                ResolveOrigin::Waiter
            }
        };

        let outcome: Option<Settlement> = settled
            .wait_for(Option::is_some)
            .await
            .map_err(|_| AnalysisError::Internal("analysis task exited without a result".to_string()))?
            .clone();

        match outcome {
            Some(Ok(result)) => Ok(ResolvedAnalysis { result, origin }),
            Some(Err(err)) => Err(err),
            None => Err(AnalysisError::Internal(
                "analysis task exited without a result".to_string(),
            )),
        }
    }

    fn spawn_leader<F, Fut>(
        &self,
        key: AnalysisKey,
        kind: AnalysisKind,
        compute: F,
        tx: watch::Sender<Option<Settlement>>,
    ) where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<RawAnalysis, ProviderError>> + Send + 'static,
    {
        let this = self.clone();
        tokio::spawn(async move {
            let slot = InFlightSlot {
                in_flight: Arc::clone(&this.in_flight),
                key: key.clone(),
            };
            let outcome = this.lead(&key, kind, compute).await;
            // Remove the entry before publishing so nobody can join a
            // settled epoch.
            drop(slot);
            tx.send_replace(Some(outcome));
        });
    }

    async fn lead<F, Fut>(&self, key: &AnalysisKey, kind: AnalysisKind, compute: F) -> Settlement
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<RawAnalysis, ProviderError>>,
    {
        // A previous epoch may have settled between our cache miss and our
        // insert.
        if let Some(result) = self.cached(key).await {
            self.stats.cache_hits.fetch_add(1, Ordering::Relaxed);
            return Ok(result);
        }

        self.stats.provider_calls.fetch_add(1, Ordering::Relaxed);
        let started = Instant::now();

        let raw = match tokio::time::timeout(self.call_timeout, compute()).await {
            Ok(Ok(raw)) => raw,
            Ok(Err(err)) => {
                self.stats.failures.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(%key, error = %err, "Analysis provider call failed");
                return Err(err.into());
            }
            Err(_) => {
                self.stats.failures.fetch_add(1, Ordering::Relaxed);
                let err = ProviderError::Timeout(self.call_timeout.as_millis() as u64);
                tracing::warn!(%key, error = %err, "Analysis provider call timed out");
                return Err(err.into());
            }
        };

        let result = AnalysisResult::completed(key.clone(), kind, raw);
        if let Err(err) = self
            .store
            .set_json(Namespace::Analysis, key.as_str(), &result, Some(self.result_ttl))
            .await
        {
            tracing::warn!(%key, error = %err, "Failed to cache analysis result");
        }

        tracing::debug!(
            %key,
            %kind,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Analysis computed"
        );
        Ok(result)
    }

    async fn cached(&self, key: &AnalysisKey) -> Option<AnalysisResult> {
        let ttl = chrono::Duration::from_std(self.result_ttl).unwrap_or(chrono::Duration::MAX);
        match self
            .store
            .get_json::<AnalysisResult>(Namespace::Analysis, key.as_str())
            .await
        {
            Ok(Some(result)) if result.is_fresh(Utc::now(), ttl) => Some(result),
            Ok(_) => None,
            Err(err) => {
                tracing::warn!(%key, error = %err, "Ignoring unreadable cached analysis");
                None
            }
        }
    }
}

impl<R> std::fmt::Debug for DedupOrchestrator<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DedupOrchestrator")
            .field("in_flight", &self.in_flight.len())
            .field("result_ttl", &self.result_ttl)
            .field("call_timeout", &self.call_timeout)
            .finish()
    }
}

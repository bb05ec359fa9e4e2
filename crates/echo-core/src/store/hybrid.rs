//! Hybrid store: shared remote cache with automatic local fallback.
//!
//! Every operation takes the per-key lock first, so a backend switch in the
//! middle of one caller's operation can never reorder it against another
//! caller's operation on the same key.
//!
//! Mode transitions:
//!
//! ```text
//!   Remote --(remote error / timeout)--> Local
//!   Local  --(reconciler probe succeeds)--> Remote
//! ```
//!
//! Data written while in `Local` mode is not migrated back when the remote
//! recovers.

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use echo_types::error::StoreError;

use super::local::LocalMap;
use super::remote::RemoteCache;
use crate::sync::KeyedLocks;

/// Which backend currently serves operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreMode {
    Remote,
    Local,
}

impl std::fmt::Display for StoreMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreMode::Remote => write!(f, "remote"),
            StoreMode::Local => write!(f, "local"),
        }
    }
}

/// Logical key namespace, so session ids and analysis keys never collide.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Namespace {
    Session,
    Analysis,
}

impl Namespace {
    fn as_str(self) -> &'static str {
        match self {
            Namespace::Session => "session",
            Namespace::Analysis => "analysis",
        }
    }
}

/// Key/value store preferring a shared remote cache, falling back to an
/// in-process map while the remote is unreachable.
pub struct HybridStore<R> {
    remote: Option<R>,
    local: LocalMap,
    remote_active: AtomicBool,
    locks: KeyedLocks,
    key_prefix: String,
    remote_timeout: Duration,
}

impl<R: RemoteCache> HybridStore<R> {
    /// Create a store. Starts in `Remote` mode when a remote is given.
    pub fn new(remote: Option<R>, key_prefix: impl Into<String>, remote_timeout: Duration) -> Self {
        let remote_active = AtomicBool::new(remote.is_some());
        Self {
            remote,
            local: LocalMap::new(),
            remote_active,
            locks: KeyedLocks::new(),
            key_prefix: key_prefix.into(),
            remote_timeout,
        }
    }

    /// A store that only ever uses its local map.
    pub fn local_only(key_prefix: impl Into<String>) -> Self {
        Self::new(None, key_prefix, Duration::ZERO)
    }

    pub fn mode(&self) -> StoreMode {
        if self.remote_active.load(Ordering::SeqCst) {
            StoreMode::Remote
        } else {
            StoreMode::Local
        }
    }

    pub fn has_remote(&self) -> bool {
        self.remote.is_some()
    }

    /// Entries currently held by the local backend.
    pub fn local_entries(&self) -> usize {
        self.local.len()
    }

    fn full_key(&self, namespace: Namespace, key: &str) -> String {
        format!("{}{}:{}", self.key_prefix, namespace.as_str(), key)
    }

    fn active_remote(&self) -> Option<&R> {
        self.remote
            .as_ref()
            .filter(|_| self.remote_active.load(Ordering::SeqCst))
    }

    /// Run one remote call under the timeout. `None` means the call failed
    /// and the store has degraded to local mode.
    async fn within_timeout<T>(
        &self,
        op: &'static str,
        call: impl Future<Output = Result<T, StoreError>>,
    ) -> Option<T> {
        match tokio::time::timeout(self.remote_timeout, call).await {
            Ok(Ok(value)) => Some(value),
            Ok(Err(err)) => {
                self.degrade(op, &err);
                None
            }
            Err(_) => {
                let err = StoreError::Timeout(self.remote_timeout.as_millis() as u64);
                self.degrade(op, &err);
                None
            }
        }
    }

    fn degrade(&self, op: &'static str, reason: &StoreError) {
        if self.remote_active.swap(false, Ordering::SeqCst) {
            tracing::warn!(
                op,
                error = %reason,
                "Remote cache unavailable, serving from local store"
            );
        } else {
            tracing::debug!(op, error = %reason, "Remote cache call failed while degraded");
        }
    }

    fn restore(&self) {
        if !self.remote_active.swap(true, Ordering::SeqCst) {
            tracing::info!("Remote cache reachable again, switching back to remote store");
        }
    }

    pub async fn get(&self, namespace: Namespace, key: &str) -> Option<Vec<u8>> {
        let full_key = self.full_key(namespace, key);
        let _guard = self.locks.lock(&full_key).await;

        if let Some(remote) = self.active_remote() {
            if let Some(value) = self.within_timeout("get", remote.get(&full_key)).await {
                return value;
            }
        }

        self.local.get(&full_key)
    }

    pub async fn set(
        &self,
        namespace: Namespace,
        key: &str,
        value: Vec<u8>,
        ttl: Option<Duration>,
    ) {
        let full_key = self.full_key(namespace, key);
        let _guard = self.locks.lock(&full_key).await;

        if let Some(remote) = self.active_remote() {
            if self
                .within_timeout("set", remote.set(&full_key, &value, ttl))
                .await
                .is_some()
            {
                // A local copy from an earlier outage is now stale.
                self.local.remove(&full_key);
                return;
            }
        }

        self.local.set(&full_key, value, ttl);
    }

    pub async fn delete(&self, namespace: Namespace, key: &str) {
        let full_key = self.full_key(namespace, key);
        let _guard = self.locks.lock(&full_key).await;

        if let Some(remote) = self.active_remote() {
            self.within_timeout("delete", remote.delete(&full_key)).await;
        }

        self.local.remove(&full_key);
    }

    /// Probe the remote cache now and update the mode accordingly.
    ///
    /// Returns whether the remote is reachable; always `false` without one.
    pub async fn health_check(&self) -> bool {
        let Some(remote) = &self.remote else {
            return false;
        };

        match tokio::time::timeout(self.remote_timeout, remote.ping()).await {
            Ok(Ok(())) => {
                self.restore();
                true
            }
            Ok(Err(err)) => {
                self.degrade("ping", &err);
                false
            }
            Err(_) => {
                let err = StoreError::Timeout(self.remote_timeout.as_millis() as u64);
                self.degrade("ping", &err);
                false
            }
        }
    }

    pub async fn get_json<T: DeserializeOwned>(
        &self,
        namespace: Namespace,
        key: &str,
    ) -> Result<Option<T>, StoreError> {
        match self.get(namespace, key).await {
            Some(bytes) => serde_json::from_slice(&bytes)
                .map(Some)
                .map_err(|e| StoreError::Serialization(e.to_string())),
            None => Ok(None),
        }
    }

    pub async fn set_json<T: Serialize>(
        &self,
        namespace: Namespace,
        key: &str,
        value: &T,
        ttl: Option<Duration>,
    ) -> Result<(), StoreError> {
        let bytes =
            serde_json::to_vec(value).map_err(|e| StoreError::Serialization(e.to_string()))?;
        self.set(namespace, key, bytes, ttl).await;
        Ok(())
    }

    /// Drop expired local entries.
    pub fn sweep_expired(&self) -> usize {
        self.local.sweep_expired()
    }

    /// Spawn the background task that probes the remote while degraded and
    /// sweeps expired local entries. Stops when `cancel` fires.
    pub fn spawn_reconciler(
        self: Arc<Self>,
        interval: Duration,
        cancel: CancellationToken,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick completes immediately.
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => {
                        if self.has_remote() && self.mode() == StoreMode::Local {
                            self.health_check().await;
                        }
                        let swept = self.sweep_expired();
                        if swept > 0 {
                            tracing::debug!(swept, "Swept expired local store entries");
                        }
                    }
                }
            }

            tracing::debug!("Store reconciler stopped");
        })
    }
}

impl<R> std::fmt::Debug for HybridStore<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HybridStore")
            .field("has_remote", &self.remote.is_some())
            .field("remote_active", &self.remote_active.load(Ordering::SeqCst))
            .field("local_entries", &self.local.len())
            .field("key_prefix", &self.key_prefix)
            .finish()
    }
}

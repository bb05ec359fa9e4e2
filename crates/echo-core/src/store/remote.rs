//! RemoteCache trait and its type-erased wrapper.
//!
//! The remote cache is the shared, durable-preferred backend of the hybrid
//! store (Redis in production). Implementations live in echo-infra.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use echo_types::error::StoreError;

/// Shared key/value cache reachable over the network.
///
/// Keys arrive fully namespaced; values are opaque bytes. Timeouts are
/// applied by the caller, so implementations may block as long as the
/// underlying client does.
pub trait RemoteCache: Send + Sync + 'static {
    /// Fetch a value. `Ok(None)` when the key is absent or expired.
    fn get(
        &self,
        key: &str,
    ) -> impl Future<Output = Result<Option<Vec<u8>>, StoreError>> + Send;

    /// Store a value, optionally with an expiry.
    fn set(
        &self,
        key: &str,
        value: &[u8],
        ttl: Option<Duration>,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Remove a key. No-op if absent.
    fn delete(&self, key: &str) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Cheap liveness probe.
    fn ping(&self) -> impl Future<Output = Result<(), StoreError>> + Send;
}

type BoxFut<'a, T> = Pin<Box<dyn Future<Output = Result<T, StoreError>> + Send + 'a>>;

/// Object-safe version of [`RemoteCache`] with boxed futures.
pub trait RemoteCacheDyn: Send + Sync {
    fn get_boxed<'a>(&'a self, key: &'a str) -> BoxFut<'a, Option<Vec<u8>>>;

    fn set_boxed<'a>(
        &'a self,
        key: &'a str,
        value: &'a [u8],
        ttl: Option<Duration>,
    ) -> BoxFut<'a, ()>;

    fn delete_boxed<'a>(&'a self, key: &'a str) -> BoxFut<'a, ()>;

    fn ping_boxed(&self) -> BoxFut<'_, ()>;
}

impl<T: RemoteCache> RemoteCacheDyn for T {
    fn get_boxed<'a>(&'a self, key: &'a str) -> BoxFut<'a, Option<Vec<u8>>> {
        Box::pin(self.get(key))
    }

    fn set_boxed<'a>(
        &'a self,
        key: &'a str,
        value: &'a [u8],
        ttl: Option<Duration>,
    ) -> BoxFut<'a, ()> {
        Box::pin(self.set(key, value, ttl))
    }

    fn delete_boxed<'a>(&'a self, key: &'a str) -> BoxFut<'a, ()> {
        Box::pin(self.delete(key))
    }

    fn ping_boxed(&self) -> BoxFut<'_, ()> {
        Box::pin(self.ping())
    }
}

/// Type-erased remote cache, so the application state can hold Redis in
/// production and an in-memory double in tests behind one concrete type.
pub struct BoxRemoteCache {
    inner: Box<dyn RemoteCacheDyn>,
}

impl BoxRemoteCache {
    pub fn new<T: RemoteCache>(cache: T) -> Self {
        Self {
            inner: Box::new(cache),
        }
    }
}

impl RemoteCache for BoxRemoteCache {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        self.inner.get_boxed(key).await
    }

    async fn set(&self, key: &str, value: &[u8], ttl: Option<Duration>) -> Result<(), StoreError> {
        self.inner.set_boxed(key, value, ttl).await
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        self.inner.delete_boxed(key).await
    }

    async fn ping(&self) -> Result<(), StoreError> {
        self.inner.ping_boxed().await
    }
}

impl std::fmt::Debug for BoxRemoteCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BoxRemoteCache").finish_non_exhaustive()
    }
}

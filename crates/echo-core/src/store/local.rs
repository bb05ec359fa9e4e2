//! In-process fallback backend for the hybrid store.

use std::time::{Duration, Instant};

use dashmap::DashMap;

#[derive(Debug, Clone)]
struct LocalEntry {
    value: Vec<u8>,
    expires_at: Option<Instant>,
}

impl LocalEntry {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| now >= at)
    }
}

/// Concurrent map with lazily enforced per-entry TTL.
///
/// Expired entries are dropped when read; `sweep_expired` reclaims the ones
/// nobody reads again.
#[derive(Debug, Default)]
pub struct LocalMap {
    entries: DashMap<String, LocalEntry>,
}

impl LocalMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<Vec<u8>> {
        let now = Instant::now();
        // Evaluated inside the shard lock so a concurrent `set` cannot be
        // removed by mistake.
        self.entries.remove_if(key, |_, entry| entry.is_expired(now));
        self.entries.get(key).map(|entry| entry.value.clone())
    }

    pub fn set(&self, key: &str, value: Vec<u8>, ttl: Option<Duration>) {
        // A TTL past the representable range never expires.
        let expires_at = ttl.and_then(|ttl| Instant::now().checked_add(ttl));
        self.entries
            .insert(key.to_string(), LocalEntry { value, expires_at });
    }

    pub fn remove(&self, key: &str) {
        self.entries.remove(key);
    }

    /// Drop every expired entry. Returns how many were removed.
    pub fn sweep_expired(&self) -> usize {
        let now = Instant::now();
        let before = self.entries.len();
        self.entries.retain(|_, entry| !entry.is_expired(now));
        before.saturating_sub(self.entries.len())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn huge_ttl_means_no_expiry() {
        let map = LocalMap::new();
        map.set("k", b"v".to_vec(), Some(Duration::from_secs(u64::MAX)));
        assert_eq!(map.get("k"), Some(b"v".to_vec()));
        assert_eq!(map.sweep_expired(), 0);
    }

    #[test]
    fn set_then_get() {
        let map = LocalMap::new();
        map.set("k", b"v".to_vec(), None);
        assert_eq!(map.get("k"), Some(b"v".to_vec()));
        assert_eq!(map.get("missing"), None);
    }

    #[test]
    fn expired_entry_is_evicted_on_read() {
        let map = LocalMap::new();
        map.set("k", b"v".to_vec(), Some(Duration::ZERO));
        assert_eq!(map.len(), 1);
        assert_eq!(map.get("k"), None);
        assert!(map.is_empty());
    }

    #[test]
    fn overwrite_resets_ttl() {
        let map = LocalMap::new();
        map.set("k", b"old".to_vec(), Some(Duration::ZERO));
        map.set("k", b"new".to_vec(), Some(Duration::from_secs(60)));
        assert_eq!(map.get("k"), Some(b"new".to_vec()));
    }

    #[test]
    fn sweep_removes_only_expired() {
        let map = LocalMap::new();
        map.set("gone", b"1".to_vec(), Some(Duration::ZERO));
        map.set("kept", b"2".to_vec(), Some(Duration::from_secs(60)));
        map.set("forever", b"3".to_vec(), None);

        assert_eq!(map.sweep_expired(), 1);
        assert_eq!(map.len(), 2);
        assert!(map.get("kept").is_some());
        assert!(map.get("forever").is_some());
    }

    #[test]
    fn remove_deletes_key() {
        let map = LocalMap::new();
        map.set("k", b"v".to_vec(), None);
        map.remove("k");
        assert_eq!(map.get("k"), None);
    }
}

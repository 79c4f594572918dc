//! In-memory store for testing.
//!
//! Backed by a `BTreeMap` behind a `RwLock`. Leases are emulated with
//! `tokio::time::Instant` deadlines so tests can pause and advance the
//! clock across TTL boundaries. Expired entries are invisible to every
//! read path and pruned lazily on writes, preserving the contract that a
//! prefix list never observes an expired key.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::RwLock;
use tokio::time::Instant;

use crate::{Store, StorageError};

struct Entry {
    value: Vec<u8>,
    expires_at: Option<Instant>,
}

impl Entry {
    fn live(&self, now: Instant) -> bool {
        self.expires_at.is_none_or(|deadline| now < deadline)
    }
}

/// An in-memory [`Store`] with emulated leases.
///
/// Thread-safe and cheap to clone; clones share state.
#[derive(Clone)]
pub struct MemoryStore {
    data: Arc<RwLock<BTreeMap<String, Entry>>>,
}

impl MemoryStore {
    /// Create a new empty in-memory store.
    #[must_use]
    pub fn new() -> Self {
        Self {
            data: Arc::new(RwLock::new(BTreeMap::new())),
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl Store for MemoryStore {
    async fn get(&self, key: &str) -> Result<Vec<u8>, StorageError> {
        let now = Instant::now();
        let data = self.data.read().await;
        data.get(key)
            .filter(|entry| entry.live(now))
            .map(|entry| entry.value.clone())
            .ok_or(StorageError::NotFound)
    }

    async fn create(&self, key: &str, value: &[u8], ttl_secs: u64) -> Result<(), StorageError> {
        let now = Instant::now();
        let expires_at = (ttl_secs > 0).then(|| now + Duration::from_secs(ttl_secs));
        let mut data = self.data.write().await;
        data.retain(|_, entry| entry.live(now));
        data.insert(
            key.to_owned(),
            Entry {
                value: value.to_vec(),
                expires_at,
            },
        );
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), StorageError> {
        let now = Instant::now();
        let mut data = self.data.write().await;
        let deleted = if key.ends_with('/') {
            let before = data.len();
            data.retain(|k, entry| !(k.starts_with(key) && entry.live(now)));
            before - data.len()
        } else {
            usize::from(
                data.remove(key)
                    .is_some_and(|entry| entry.live(now)),
            )
        };
        data.retain(|_, entry| entry.live(now));

        if deleted == 0 {
            return Err(StorageError::NotFound);
        }
        Ok(())
    }

    async fn get_list(&self, prefix: &str) -> Result<Vec<Vec<u8>>, StorageError> {
        let now = Instant::now();
        let data = self.data.read().await;
        Ok(data
            .range(prefix.to_owned()..)
            .take_while(|(k, _)| k.starts_with(prefix))
            .filter(|(_, entry)| entry.live(now))
            .map(|(_, entry)| entry.value.clone())
            .collect())
    }

    async fn count(&self, prefix: &str) -> Result<u32, StorageError> {
        let now = Instant::now();
        let data = self.data.read().await;
        let count = data
            .range(prefix.to_owned()..)
            .take_while(|(k, _)| k.starts_with(prefix))
            .filter(|(_, entry)| entry.live(now))
            .count();
        Ok(u32::try_from(count).unwrap_or(u32::MAX))
    }

    async fn readiness_check(&self) -> Result<(), StorageError> {
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn get_missing_returns_not_found() {
        let store = MemoryStore::new();
        let err = store.get("/nodes/nope").await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn create_and_get_roundtrip() {
        let store = MemoryStore::new();
        store.create("/nodes/n1", b"hello", 0).await.unwrap();
        assert_eq!(store.get("/nodes/n1").await.unwrap(), b"hello");
    }

    #[tokio::test]
    async fn create_overwrites_existing() {
        let store = MemoryStore::new();
        store.create("/nodes/n1", b"v1", 0).await.unwrap();
        store.create("/nodes/n1", b"v2", 0).await.unwrap();
        assert_eq!(store.get("/nodes/n1").await.unwrap(), b"v2");
    }

    #[tokio::test]
    async fn delete_single_key() {
        let store = MemoryStore::new();
        store.create("/nodes/n1", b"v", 0).await.unwrap();
        store.delete("/nodes/n1").await.unwrap();
        assert!(store.get("/nodes/n1").await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn delete_missing_returns_not_found() {
        let store = MemoryStore::new();
        let err = store.delete("/nodes/nope").await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn trailing_slash_deletes_whole_prefix() {
        let store = MemoryStore::new();
        store.create("/inboundUsers/n1/p0/a@x", b"a", 0).await.unwrap();
        store.create("/inboundUsers/n1/p0/b@x", b"b", 0).await.unwrap();
        store.create("/inboundUsers/n1/p1/c@x", b"c", 0).await.unwrap();

        store.delete("/inboundUsers/n1/p0/").await.unwrap();

        assert!(store.get_list("/inboundUsers/n1/p0/").await.unwrap().is_empty());
        assert_eq!(store.get_list("/inboundUsers/n1/p1/").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn list_is_prefix_scoped() {
        let store = MemoryStore::new();
        store.create("/inbounds/n1/p0", b"1", 0).await.unwrap();
        store.create("/inbounds/n1/p1", b"2", 0).await.unwrap();
        store.create("/inbounds/n2/p0", b"3", 0).await.unwrap();

        let values = store.get_list("/inbounds/n1/").await.unwrap();
        assert_eq!(values, vec![b"1".to_vec(), b"2".to_vec()]);
    }

    #[tokio::test]
    async fn count_matches_list() {
        let store = MemoryStore::new();
        store.create("/inbounds/n1/p0", b"1", 0).await.unwrap();
        store.create("/inbounds/n1/p1", b"2", 0).await.unwrap();
        assert_eq!(store.count("/inbounds/n1/").await.unwrap(), 2);
        assert_eq!(store.count("/inbounds/n2/").await.unwrap(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn leased_key_expires() {
        let store = MemoryStore::new();
        store.create("/inbounds/n1/p0", b"v", 5).await.unwrap();

        // One second before the deadline the key is still visible.
        tokio::time::advance(Duration::from_secs(4)).await;
        assert!(store.get("/inbounds/n1/p0").await.is_ok());
        assert_eq!(store.count("/inbounds/n1/").await.unwrap(), 1);

        // One second after, it is gone from every read path.
        tokio::time::advance(Duration::from_secs(2)).await;
        assert!(store.get("/inbounds/n1/p0").await.unwrap_err().is_not_found());
        assert!(store.get_list("/inbounds/n1/").await.unwrap().is_empty());
        assert_eq!(store.count("/inbounds/n1/").await.unwrap(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn rewrite_resets_the_lease() {
        let store = MemoryStore::new();
        store.create("/inbounds/n1/p0", b"v1", 5).await.unwrap();

        tokio::time::advance(Duration::from_secs(4)).await;
        store.create("/inbounds/n1/p0", b"v2", 5).await.unwrap();

        // Past the original deadline but within the renewed one.
        tokio::time::advance(Duration::from_secs(3)).await;
        assert_eq!(store.get("/inbounds/n1/p0").await.unwrap(), b"v2");
    }

    #[tokio::test(start_paused = true)]
    async fn zero_ttl_is_permanent() {
        let store = MemoryStore::new();
        store.create("/nodes/n1", b"v", 0).await.unwrap();
        tokio::time::advance(Duration::from_secs(3600)).await;
        assert!(store.get("/nodes/n1").await.is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn deleting_only_expired_rows_is_not_found() {
        let store = MemoryStore::new();
        store.create("/inbounds/n1/p0", b"v", 1).await.unwrap();
        tokio::time::advance(Duration::from_secs(2)).await;
        assert!(store.delete("/inbounds/n1/").await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn clone_shares_state() {
        let store = MemoryStore::new();
        let clone = store.clone();
        store.create("/nodes/n1", b"v", 0).await.unwrap();
        assert_eq!(clone.get("/nodes/n1").await.unwrap(), b"v");
    }
}

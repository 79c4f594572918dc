//! etcd-backed store.
//!
//! The production [`Store`] implementation. etcd gives us linearizable
//! single-key reads and writes, atomic prefix deletes, count-only range
//! reads, and native leases — the whole contract in one backend.

use std::time::Duration;

use etcd_client::{Client, ConnectOptions, DeleteOptions, GetOptions, PutOptions};

use crate::{Store, StorageError};

/// A [`Store`] backed by an etcd cluster.
///
/// The inner client is cheap to clone; every operation clones it because
/// `etcd-client` calls take `&mut self`.
#[derive(Clone)]
pub struct EtcdStore {
    client: Client,
}

impl EtcdStore {
    /// Connect to the given endpoints with a 5 s dial timeout.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Unavailable`] when no endpoint can be
    /// reached.
    pub async fn connect(endpoints: &[String]) -> Result<Self, StorageError> {
        let options = ConnectOptions::new().with_connect_timeout(Duration::from_secs(5));
        let client = Client::connect(endpoints, Some(options))
            .await
            .map_err(|e| StorageError::Unavailable {
                reason: e.to_string(),
            })?;
        Ok(Self { client })
    }

    /// Wrap an already-connected client (shared with the election module).
    #[must_use]
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Access the underlying client, e.g. to build an election on the
    /// same connection.
    #[must_use]
    pub fn client(&self) -> &Client {
        &self.client
    }
}

#[async_trait::async_trait]
impl Store for EtcdStore {
    async fn get(&self, key: &str) -> Result<Vec<u8>, StorageError> {
        let mut client = self.client.clone();
        let resp = client
            .get(key, None)
            .await
            .map_err(|e| StorageError::Read {
                key: key.to_owned(),
                reason: e.to_string(),
            })?;

        resp.kvs()
            .first()
            .map(|kv| kv.value().to_vec())
            .ok_or(StorageError::NotFound)
    }

    async fn create(&self, key: &str, value: &[u8], ttl_secs: u64) -> Result<(), StorageError> {
        let mut client = self.client.clone();

        let mut options = None;
        let mut lease_id = 0;
        if ttl_secs > 0 {
            let lease = client
                .lease_grant(i64::try_from(ttl_secs).unwrap_or(i64::MAX), None)
                .await
                .map_err(|e| StorageError::Write {
                    key: key.to_owned(),
                    reason: format!("lease grant failed: {e}"),
                })?;
            lease_id = lease.id();
            options = Some(PutOptions::new().with_lease(lease_id));
        }

        if let Err(e) = client.put(key, value, options).await {
            // Do not leave an orphan lease behind; if the revoke fails too
            // the lease lapses on its own after `ttl_secs`.
            if lease_id != 0 {
                let _ = client.lease_revoke(lease_id).await;
            }
            return Err(StorageError::Write {
                key: key.to_owned(),
                reason: e.to_string(),
            });
        }

        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), StorageError> {
        let mut client = self.client.clone();

        let options = key
            .ends_with('/')
            .then(|| DeleteOptions::new().with_prefix());

        let resp = client
            .delete(key, options)
            .await
            .map_err(|e| StorageError::Delete {
                key: key.to_owned(),
                reason: e.to_string(),
            })?;

        if resp.deleted() == 0 {
            return Err(StorageError::NotFound);
        }
        Ok(())
    }

    async fn get_list(&self, prefix: &str) -> Result<Vec<Vec<u8>>, StorageError> {
        let mut client = self.client.clone();
        let resp = client
            .get(prefix, Some(GetOptions::new().with_prefix()))
            .await
            .map_err(|e| StorageError::List {
                prefix: prefix.to_owned(),
                reason: e.to_string(),
            })?;

        Ok(resp.kvs().iter().map(|kv| kv.value().to_vec()).collect())
    }

    async fn count(&self, prefix: &str) -> Result<u32, StorageError> {
        let mut client = self.client.clone();
        let resp = client
            .get(prefix, Some(GetOptions::new().with_prefix().with_count_only()))
            .await
            .map_err(|e| StorageError::List {
                prefix: prefix.to_owned(),
                reason: e.to_string(),
            })?;

        Ok(u32::try_from(resp.count()).unwrap_or(u32::MAX))
    }

    async fn readiness_check(&self) -> Result<(), StorageError> {
        let mut client = self.client.clone();
        client
            .status()
            .await
            .map(|_| ())
            .map_err(|e| StorageError::Unavailable {
                reason: e.to_string(),
            })
    }
}

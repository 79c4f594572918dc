//! Storage port for satrapy.
//!
//! This crate defines the [`Store`] trait — a lease-capable key-value
//! interface that knows nothing about nodes, inbounds, or users. The typed
//! resource stores in `satrapy-core` wrap a `Store` to add key layout and
//! serialisation.
//!
//! Two implementations are provided:
//!
//! - [`EtcdStore`] — production default, backed by etcd (linearizable
//!   reads/writes, native leases)
//! - [`MemoryStore`] — in-memory with emulated leases, for testing
//!
//! The [`election`] module exposes the store's session/election primitive
//! used by the cluster controller.

pub mod election;
mod error;
mod etcd;
mod memory;

pub use error::StorageError;
pub use etcd::EtcdStore;
pub use memory::MemoryStore;

/// A lease-capable key-value store.
///
/// Keys are UTF-8 strings using `/` as a separator (e.g. `/nodes/edge-1`,
/// `/inbounds/edge-1/proxy0`). Values are opaque byte arrays — always JSON
/// documents at the layers above, but this trait does not care.
///
/// Implementations must provide linearizable single-key reads and writes
/// and atomic prefix deletes. Lease grant and put must behave as one
/// logical operation: if the grant succeeds but the put fails, the lease
/// must be revoked or short enough to lapse on its own.
#[async_trait::async_trait]
pub trait Store: Send + Sync + 'static {
    /// Retrieve a value by key.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::NotFound`] if the key does not exist and
    /// [`StorageError::Read`] if the backend fails.
    async fn get(&self, key: &str) -> Result<Vec<u8>, StorageError>;

    /// Store a key-value pair, overwriting any existing value.
    ///
    /// When `ttl_secs` is non-zero the key is attached to a lease of that
    /// many seconds and vanishes when the lease expires without renewal.
    /// `ttl_secs == 0` writes a permanent key.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Write`] if the backend fails.
    async fn create(&self, key: &str, value: &[u8], ttl_secs: u64) -> Result<(), StorageError>;

    /// Delete a key, or an entire prefix when `key` ends with `/`.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::NotFound`] when zero rows matched and
    /// [`StorageError::Delete`] if the backend fails.
    async fn delete(&self, key: &str) -> Result<(), StorageError>;

    /// List all values whose key starts with the given prefix.
    ///
    /// Expired keys are never observed.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::List`] if the backend fails.
    async fn get_list(&self, prefix: &str) -> Result<Vec<Vec<u8>>, StorageError>;

    /// Count keys under a prefix with a count-only read.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::List`] if the backend fails.
    async fn count(&self, prefix: &str) -> Result<u32, StorageError>;

    /// Ping the backend.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Unavailable`] when the backend cannot be
    /// reached.
    async fn readiness_check(&self) -> Result<(), StorageError>;
}

//! Local cache storage: a key → serialized payload map that outlives a
//! single fetch. The file-backed store survives process restarts.

mod error;
mod file;
mod memory;

pub use error::StoreError;
pub use file::FileStore;
pub use memory::MemoryStore;

/// Key/value storage for cached feed payloads.
///
/// Values are opaque strings (serialized JSON); freshness is decided by the
/// caller, not the store.
#[async_trait::async_trait]
pub trait CacheStore: Send + Sync {
    /// The stored value, or `None` when the key was never written.
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Replace the value under `key`. Readers see the old value or the new
    /// one, never a partial write.
    async fn put(&self, key: &str, value: String) -> Result<(), StoreError>;

    /// Drop `key`. Removing an absent key succeeds.
    async fn remove(&self, key: &str) -> Result<(), StoreError>;

    /// Drop every key starting with `prefix`, except `keep`. Returns how
    /// many entries were removed.
    async fn remove_prefix(&self, prefix: &str, keep: Option<&str>) -> Result<usize, StoreError>;
}

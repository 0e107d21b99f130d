use std::collections::HashMap;

use tokio::sync::RwLock;

use crate::{CacheStore, StoreError};

/// Process-local store. Contents are lost on exit.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: RwLock<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

#[async_trait::async_trait]
impl CacheStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.entries.read().await.get(key).cloned())
    }

    async fn put(&self, key: &str, value: String) -> Result<(), StoreError> {
        self.entries.write().await.insert(key.to_string(), value);
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), StoreError> {
        self.entries.write().await.remove(key);
        Ok(())
    }

    async fn remove_prefix(&self, prefix: &str, keep: Option<&str>) -> Result<usize, StoreError> {
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|key, _| !key.starts_with(prefix) || Some(key.as_str()) == keep);
        Ok(before - entries.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn put_get_remove() {
        let store = MemoryStore::new();
        assert_eq!(store.get("shortage").await.unwrap(), None);

        store.put("shortage", "{}".into()).await.unwrap();
        store.put("shortage", "[1]".into()).await.unwrap();
        assert_eq!(store.get("shortage").await.unwrap().as_deref(), Some("[1]"));
        assert_eq!(store.len().await, 1);

        store.remove("shortage").await.unwrap();
        store.remove("shortage").await.unwrap();
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn remove_prefix_spares_other_keys_and_keep() {
        let store = MemoryStore::new();
        for key in ["pollen-20260301", "pollen-20260302", "pollen-20260303", "shortage"] {
            store.put(key, "[]".into()).await.unwrap();
        }
        let removed = store.remove_prefix("pollen-", Some("pollen-20260303")).await.unwrap();
        assert_eq!(removed, 2);
        assert!(store.get("pollen-20260303").await.unwrap().is_some());
        assert!(store.get("shortage").await.unwrap().is_some());

        assert_eq!(store.remove_prefix("pollen-", None).await.unwrap(), 1);
        assert_eq!(store.len().await, 1);
    }
}

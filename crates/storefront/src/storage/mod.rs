//! Per-browser key/value storage ("local storage").
//!
//! # Architecture
//!
//! - [`LocalStore`] is the seam: string keys, string (JSON) values, async.
//! - [`MemoryStore`] keeps values in process memory (tests, CLI tools).
//! - `tower_sessions::Session` implements [`LocalStore`] so each browser's
//!   values live in its server session and survive page reloads.
//! - [`CachedRecord`] layers the "advisory cache, server is truth" contract on
//!   top: `get_cached` / `store` / `refresh_from_server` / `invalidate`.
//!
//! Writes are last-write-wins. Nothing stored here is authoritative.

mod cached;
mod session_store;

pub use cached::CachedRecord;

use std::collections::HashMap;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::RwLock;

/// Errors that can occur when reading or writing local storage.
#[derive(Debug, Error)]
pub enum StorageError {
    /// The backing session store failed.
    #[error("session store error: {0}")]
    Session(#[from] tower_sessions::session::Error),

    /// A value could not be (de)serialized.
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

/// String key/value storage scoped to one browser.
#[async_trait]
pub trait LocalStore: Send + Sync {
    /// Read the raw value stored under `key`.
    async fn get_item(&self, key: &str) -> Result<Option<String>, StorageError>;

    /// Store `value` under `key`, replacing any previous value.
    async fn set_item(&self, key: &str, value: String) -> Result<(), StorageError>;

    /// Remove the value stored under `key`. Removing a missing key is not an error.
    async fn remove_item(&self, key: &str) -> Result<(), StorageError>;
}

/// In-memory [`LocalStore`].
#[derive(Debug, Default)]
pub struct MemoryStore {
    items: RwLock<HashMap<String, String>>,
}

impl MemoryStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store pre-populated with `items`.
    #[must_use]
    pub fn with_items<I, K, V>(items: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            items: RwLock::new(
                items
                    .into_iter()
                    .map(|(k, v)| (k.into(), v.into()))
                    .collect(),
            ),
        }
    }

    /// Number of stored keys.
    pub async fn len(&self) -> usize {
        self.items.read().await.len()
    }

    /// Whether the store is empty.
    pub async fn is_empty(&self) -> bool {
        self.items.read().await.is_empty()
    }
}

#[async_trait]
impl LocalStore for MemoryStore {
    async fn get_item(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self.items.read().await.get(key).cloned())
    }

    async fn set_item(&self, key: &str, value: String) -> Result<(), StorageError> {
        self.items.write().await.insert(key.to_string(), value);
        Ok(())
    }

    async fn remove_item(&self, key: &str) -> Result<(), StorageError> {
        self.items.write().await.remove(key);
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_store_set_get_remove() {
        let store = MemoryStore::new();
        assert!(store.is_empty().await);

        store.set_item("k", "v1".to_string()).await.unwrap();
        store.set_item("k", "v2".to_string()).await.unwrap();
        assert_eq!(store.get_item("k").await.unwrap().as_deref(), Some("v2"));
        assert_eq!(store.len().await, 1);

        store.remove_item("k").await.unwrap();
        store.remove_item("missing").await.unwrap();
        assert_eq!(store.get_item("k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_memory_store_with_items() {
        let store = MemoryStore::with_items([("a", "1"), ("b", "2")]);
        assert_eq!(store.get_item("b").await.unwrap().as_deref(), Some("2"));
    }
}

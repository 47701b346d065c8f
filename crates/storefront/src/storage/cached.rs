//! Typed repository over a single local storage key.

use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;

use serde::{Serialize, de::DeserializeOwned};
use tracing::{debug, warn};

use super::{LocalStore, StorageError};

/// A JSON value cached under one local storage key.
///
/// The cached value is a hint, never the source of truth: callers that are
/// about to mutate server state go through [`CachedRecord::refresh_from_server`]
/// first. Read failures and corrupt values are logged and treated as a miss.
pub struct CachedRecord<T> {
    store: Arc<dyn LocalStore>,
    key: &'static str,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Clone for CachedRecord<T> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            key: self.key,
            _marker: PhantomData,
        }
    }
}

impl<T> std::fmt::Debug for CachedRecord<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CachedRecord")
            .field("key", &self.key)
            .finish_non_exhaustive()
    }
}

impl<T> CachedRecord<T>
where
    T: Serialize + DeserializeOwned,
{
    /// Create a repository for `key` in `store`.
    #[must_use]
    pub fn new(store: Arc<dyn LocalStore>, key: &'static str) -> Self {
        Self {
            store,
            key,
            _marker: PhantomData,
        }
    }

    /// The storage key.
    #[must_use]
    pub const fn key(&self) -> &'static str {
        self.key
    }

    /// Read the cached value, if any.
    pub async fn get_cached(&self) -> Option<T> {
        let raw = match self.store.get_item(self.key).await {
            Ok(raw) => raw?,
            Err(e) => {
                warn!(key = self.key, error = %e, "Failed to read local storage");
                return None;
            }
        };

        match serde_json::from_str(&raw) {
            Ok(value) => Some(value),
            Err(e) => {
                warn!(key = self.key, error = %e, "Discarding corrupt cached value");
                self.invalidate().await;
                None
            }
        }
    }

    /// Overwrite the cached value.
    ///
    /// # Errors
    ///
    /// Returns an error if the value cannot be serialized or stored.
    pub async fn store(&self, value: &T) -> Result<(), StorageError> {
        let raw = serde_json::to_string(value)?;
        self.store.set_item(self.key, raw).await
    }

    /// Fetch the authoritative value and update the cache with it.
    ///
    /// `Ok(Some)` replaces the cached value, `Ok(None)` clears it, and an
    /// error leaves the cache untouched and is returned to the caller.
    ///
    /// # Errors
    ///
    /// Returns whatever error `fetch` returns.
    pub async fn refresh_from_server<F, Fut, E>(&self, fetch: F) -> Result<Option<T>, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Option<T>, E>>,
    {
        let fresh = fetch().await?;
        match &fresh {
            Some(value) => {
                if let Err(e) = self.store(value).await {
                    warn!(key = self.key, error = %e, "Failed to cache refreshed value");
                }
            }
            None => self.invalidate().await,
        }
        Ok(fresh)
    }

    /// Remove the cached value.
    pub async fn invalidate(&self) {
        if let Err(e) = self.store.remove_item(self.key).await {
            warn!(key = self.key, error = %e, "Failed to clear local storage");
        } else {
            debug!(key = self.key, "Cleared cached value");
        }
    }
}

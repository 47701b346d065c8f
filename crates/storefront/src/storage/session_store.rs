//! [`LocalStore`] backed by the browser's server session.

use async_trait::async_trait;
use tower_sessions::Session;

use super::{LocalStore, StorageError};

#[async_trait]
impl LocalStore for Session {
    async fn get_item(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self.get::<String>(key).await?)
    }

    async fn set_item(&self, key: &str, value: String) -> Result<(), StorageError> {
        Ok(self.insert(key, value).await?)
    }

    async fn remove_item(&self, key: &str) -> Result<(), StorageError> {
        self.remove_value(key).await?;
        Ok(())
    }
}

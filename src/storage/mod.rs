//! Key-value persistence for the ledger.
//!
//! The ledger keeps whole JSON documents under a handful of keys, so every
//! backend only needs get/set/remove of a `serde_json::Value`.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::config::{StorageBackend, StorageConfig};
use crate::utils::error::Result;

pub mod json_file;
pub mod sqlite;

pub use json_file::JsonFileStore;
pub use sqlite::SqliteStore;

pub const TRACKED_ITEMS_KEY: &str = "tracked_items";
pub const NOTIFICATIONS_KEY: &str = "price_drop_notifications";

#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<serde_json::Value>>;
    async fn set(&self, key: &str, value: serde_json::Value) -> Result<()>;
    async fn remove(&self, key: &str) -> Result<()>;
}

/// Non-persistent store, used for tests and dry runs.
#[derive(Default)]
pub struct MemoryStore {
    entries: RwLock<HashMap<String, serde_json::Value>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<serde_json::Value>> {
        let entries = self.entries.read().await;
        Ok(entries.get(key).cloned())
    }

    async fn set(&self, key: &str, value: serde_json::Value) -> Result<()> {
        let mut entries = self.entries.write().await;
        entries.insert(key.to_string(), value);
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<()> {
        let mut entries = self.entries.write().await;
        entries.remove(key);
        Ok(())
    }
}

/// Open the backend selected in the configuration.
pub async fn open_store(config: &StorageConfig) -> Result<Arc<dyn KeyValueStore>> {
    let store: Arc<dyn KeyValueStore> = match config.backend {
        StorageBackend::Memory => Arc::new(MemoryStore::new()),
        StorageBackend::Json => Arc::new(JsonFileStore::new(&config.path)),
        StorageBackend::Sqlite => Arc::new(SqliteStore::connect(&config.path).await?),
    };
    tracing::debug!("Opened {:?} store at {}", config.backend, config.path);
    Ok(store)
}

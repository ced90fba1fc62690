use async_trait::async_trait;
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;

use super::KeyValueStore;
use crate::utils::error::{AppError, Result};

/// All keys live in one JSON object on disk. The file is loaded lazily and
/// rewritten through a temp file + rename on every change.
pub struct JsonFileStore {
    path: PathBuf,
    cache: Mutex<Option<Map<String, Value>>>,
}

impl JsonFileStore {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            cache: Mutex::new(None),
        }
    }

    async fn load(&self) -> Result<Map<String, Value>> {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) if bytes.iter().all(u8::is_ascii_whitespace) => Ok(Map::new()),
            Ok(bytes) => match serde_json::from_slice::<Value>(&bytes)? {
                Value::Object(map) => Ok(map),
                _ => Err(AppError::Parse {
                    message: format!("{} does not contain a JSON object", self.path.display()),
                }),
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Map::new()),
            Err(e) => Err(e.into()),
        }
    }

    async fn persist(&self, map: &Map<String, Value>) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);

        let bytes = serde_json::to_vec_pretty(map)?;
        tokio::fs::write(&tmp, bytes).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }
}

#[async_trait]
impl KeyValueStore for JsonFileStore {
    async fn get(&self, key: &str) -> Result<Option<Value>> {
        let mut cache = self.cache.lock().await;
        if cache.is_none() {
            *cache = Some(self.load().await?);
        }
        Ok(cache.as_ref().and_then(|map| map.get(key).cloned()))
    }

    async fn set(&self, key: &str, value: Value) -> Result<()> {
        let mut cache = self.cache.lock().await;
        let mut map = match cache.take() {
            Some(map) => map,
            None => self.load().await?,
        };
        map.insert(key.to_string(), value);

        let result = self.persist(&map).await;
        *cache = Some(map);
        result
    }

    async fn remove(&self, key: &str) -> Result<()> {
        let mut cache = self.cache.lock().await;
        let mut map = match cache.take() {
            Some(map) => map,
            None => self.load().await?,
        };
        map.remove(key);

        let result = self.persist(&map).await;
        *cache = Some(map);
        result
    }
}

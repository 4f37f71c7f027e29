//! Singleton canvas record on top of a [`Storage`] backend.

use super::{MemoryStorage, Storage, StorageError, StorageResult};
use crate::document::{AppState, CanvasDocument, Files, Timestamp};
use crate::element::Element;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::Arc;

/// Key of the one record the cache keeps.
pub const CACHE_RECORD_KEY: &str = "canvas";

fn default_record_id() -> String {
    CACHE_RECORD_KEY.to_string()
}

/// The persisted form of the canvas.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheRecord {
    #[serde(default = "default_record_id")]
    pub id: String,
    pub elements: Vec<Element>,
    pub app_state: AppState,
    #[serde(default)]
    pub files: Files,
    pub timestamp: Timestamp,
}

impl CacheRecord {
    fn from_document(document: &CanvasDocument, timestamp: Timestamp) -> Self {
        Self {
            id: default_record_id(),
            elements: document.elements.clone(),
            app_state: document.app_state.clone(),
            files: document.files.clone(),
            timestamp,
        }
    }

    /// Convert into a document versioned at the record's timestamp.
    pub fn into_document(self) -> CanvasDocument {
        CanvasDocument {
            elements: self.elements,
            app_state: self.app_state,
            files: self.files,
            version: self.timestamp,
        }
    }
}

/// Owns the durable cache for one origin.
///
/// If the backing store cannot be opened the manager logs once and keeps
/// working against an in-memory store for the rest of the session.
pub struct LocalCacheManager {
    storage: Arc<dyn Storage>,
    initialized: bool,
    memory_only: bool,
}

impl LocalCacheManager {
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self {
            storage,
            initialized: false,
            memory_only: false,
        }
    }

    /// Check if the manager fell back to memory-only storage.
    pub fn is_memory_only(&self) -> bool {
        self.memory_only
    }

    /// Open the backing store. Safe to call more than once.
    ///
    /// Returns [`StorageError::Unavailable`] the first time it fails; the
    /// manager is still usable afterwards.
    pub async fn init(&mut self) -> StorageResult<()> {
        if self.initialized {
            return Ok(());
        }
        self.initialized = true;

        match self.storage.open().await {
            Ok(()) => Ok(()),
            Err(e) => {
                log::warn!("Local cache unavailable, keeping canvas in memory only: {}", e);
                self.storage = Arc::new(MemoryStorage::new());
                self.memory_only = true;
                Err(StorageError::Unavailable(e.to_string()))
            }
        }
    }

    async fn ensure_init(&mut self) {
        // Failure is already logged and handled by the fallback.
        let _ = self.init().await;
    }

    /// Persist `document`, stamped with the current time.
    pub async fn save(&mut self, document: &CanvasDocument) -> StorageResult<()> {
        self.save_at(document, Timestamp::now()).await
    }

    /// Persist `document` with an explicit timestamp.
    pub async fn save_at(
        &mut self,
        document: &CanvasDocument,
        timestamp: Timestamp,
    ) -> StorageResult<()> {
        self.ensure_init().await;
        let record = CacheRecord::from_document(document, timestamp);
        let value = serde_json::to_value(&record)
            .map_err(|e| StorageError::Serialization(e.to_string()))?;
        self.storage.save(CACHE_RECORD_KEY, &value).await?;
        log::debug!("Cached canvas: {} elements at {}", record.elements.len(), timestamp);
        Ok(())
    }

    /// Load the cached record, if any.
    ///
    /// A record with the wrong shape is reported as [`StorageError::Corrupt`].
    pub async fn load(&mut self) -> StorageResult<Option<CacheRecord>> {
        self.ensure_init().await;
        let value = match self.storage.load(CACHE_RECORD_KEY).await {
            Ok(value) => value,
            Err(StorageError::NotFound(_)) => return Ok(None),
            Err(e) => return Err(e),
        };
        validate_shape(&value)?;
        serde_json::from_value(value)
            .map(Some)
            .map_err(|e| StorageError::Corrupt(e.to_string()))
    }

    /// Delete the cached record.
    pub async fn clear(&mut self) -> StorageResult<()> {
        self.ensure_init().await;
        self.storage.delete(CACHE_RECORD_KEY).await?;
        log::debug!("Cleared cached canvas");
        Ok(())
    }

    /// Fix up a malformed record in place, or remove it when it cannot be
    /// read at all. Returns whether the store ended up in a valid state.
    pub async fn repair(&mut self) -> bool {
        self.ensure_init().await;
        let raw = match self.storage.load(CACHE_RECORD_KEY).await {
            Ok(raw) => raw,
            Err(StorageError::NotFound(_)) => return true,
            Err(e) => {
                log::warn!("Cached canvas unreadable, clearing it: {}", e);
                return self.clear().await.is_ok();
            }
        };

        let mut record = match raw {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        if !record.get("id").is_some_and(Value::is_string) {
            record.insert("id".into(), Value::from(CACHE_RECORD_KEY));
        }
        if !record.get("elements").is_some_and(Value::is_array) {
            record.insert("elements".into(), Value::Array(Vec::new()));
        }
        if !record.get("appState").is_some_and(Value::is_object) {
            record.insert("appState".into(), Value::Object(Map::new()));
        }
        let timestamp = record
            .get("timestamp")
            .and_then(Timestamp::from_token)
            .unwrap_or_else(Timestamp::now);
        record.insert("timestamp".into(), Value::from(timestamp.as_millis()));
        if !record.get("files").is_some_and(Value::is_object) {
            record.insert("files".into(), Value::Object(Map::new()));
        }

        // Decoding normalizes every element, so the saved record is complete.
        let repaired: CacheRecord = match serde_json::from_value(Value::Object(record)) {
            Ok(repaired) => repaired,
            Err(e) => {
                log::warn!("Cached canvas beyond repair, clearing it: {}", e);
                return self.clear().await.is_ok();
            }
        };
        let timestamp = repaired.timestamp;
        match self.save_at(&repaired.into_document(), timestamp).await {
            Ok(()) => {
                log::info!("Repaired cached canvas");
                true
            }
            Err(e) => {
                log::warn!("Failed to save repaired canvas: {}", e);
                false
            }
        }
    }

    /// True iff nothing is cached or `timestamp` is strictly newer than the
    /// cached record.
    pub async fn should_update(&mut self, timestamp: Timestamp) -> bool {
        match self.load().await {
            Ok(Some(record)) => timestamp > record.timestamp,
            Ok(None) => true,
            Err(e) => {
                log::debug!("Cached canvas unusable for comparison: {}", e);
                true
            }
        }
    }
}

fn validate_shape(value: &Value) -> StorageResult<()> {
    let Some(record) = value.as_object() else {
        return Err(StorageError::Corrupt("record is not an object".to_string()));
    };
    if !record.get("elements").is_some_and(Value::is_array) {
        return Err(StorageError::Corrupt("elements is not a list".to_string()));
    }
    if !record.get("appState").is_some_and(Value::is_object) {
        return Err(StorageError::Corrupt("appState is not a mapping".to_string()));
    }
    if !record.get("timestamp").is_some_and(Value::is_number) {
        return Err(StorageError::Corrupt("timestamp is not a number".to_string()));
    }
    Ok(())
}

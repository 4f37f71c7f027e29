//! In-memory storage implementation.

use super::{BoxFuture, Storage, StorageError, StorageResult};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::RwLock;

/// In-memory storage for tests and for sessions without durable storage.
#[derive(Default)]
pub struct MemoryStorage {
    records: RwLock<HashMap<String, Value>>,
    disabled: bool,
}

impl MemoryStorage {
    /// Create a new empty memory storage.
    pub fn new() -> Self {
        Self::default()
    }

    /// A store whose every operation reports [`StorageError::Unavailable`],
    /// like a browser with storage turned off.
    pub fn disabled() -> Self {
        Self {
            disabled: true,
            ..Self::default()
        }
    }

    fn check(&self) -> StorageResult<()> {
        if self.disabled {
            Err(StorageError::Unavailable("storage is disabled".to_string()))
        } else {
            Ok(())
        }
    }
}

fn lock_error(e: impl std::fmt::Display) -> StorageError {
    StorageError::Other(format!("Lock error: {}", e))
}

impl Storage for MemoryStorage {
    fn open(&self) -> BoxFuture<'_, StorageResult<()>> {
        Box::pin(async move { self.check() })
    }

    fn save(&self, key: &str, record: &Value) -> BoxFuture<'_, StorageResult<()>> {
        let key = key.to_string();
        let record = record.clone();
        Box::pin(async move {
            self.check()?;
            let mut records = self.records.write().map_err(lock_error)?;
            records.insert(key, record);
            Ok(())
        })
    }

    fn load(&self, key: &str) -> BoxFuture<'_, StorageResult<Value>> {
        let key = key.to_string();
        Box::pin(async move {
            self.check()?;
            let records = self.records.read().map_err(lock_error)?;
            records.get(&key).cloned().ok_or(StorageError::NotFound(key))
        })
    }

    fn delete(&self, key: &str) -> BoxFuture<'_, StorageResult<()>> {
        let key = key.to_string();
        Box::pin(async move {
            self.check()?;
            let mut records = self.records.write().map_err(lock_error)?;
            records.remove(&key);
            Ok(())
        })
    }

    fn exists(&self, key: &str) -> BoxFuture<'_, StorageResult<bool>> {
        let key = key.to_string();
        Box::pin(async move {
            self.check()?;
            let records = self.records.read().map_err(lock_error)?;
            Ok(records.contains_key(&key))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block_on;
    use serde_json::json;

    #[test]
    fn test_memory_storage_save_load() {
        let storage = MemoryStorage::new();
        block_on(storage.save("canvas", &json!({"elements": []}))).unwrap();

        let loaded = block_on(storage.load("canvas")).unwrap();
        assert_eq!(loaded, json!({"elements": []}));
    }

    #[test]
    fn test_memory_storage_save_overwrites() {
        let storage = MemoryStorage::new();
        block_on(storage.save("canvas", &json!({"v": 1}))).unwrap();
        block_on(storage.save("canvas", &json!({"w": 2}))).unwrap();
        assert_eq!(block_on(storage.load("canvas")).unwrap(), json!({"w": 2}));
    }

    #[test]
    fn test_memory_storage_not_found() {
        let storage = MemoryStorage::new();
        let result = block_on(storage.load("missing"));
        assert!(matches!(result, Err(StorageError::NotFound(_))));
    }

    #[test]
    fn test_memory_storage_delete() {
        let storage = MemoryStorage::new();
        block_on(storage.save("canvas", &json!({}))).unwrap();
        assert!(block_on(storage.exists("canvas")).unwrap());

        block_on(storage.delete("canvas")).unwrap();
        assert!(!block_on(storage.exists("canvas")).unwrap());
        block_on(storage.delete("canvas")).unwrap();
    }

    #[test]
    fn test_disabled_storage_reports_unavailable() {
        let storage = MemoryStorage::disabled();
        assert!(matches!(block_on(storage.open()), Err(StorageError::Unavailable(_))));
        assert!(matches!(
            block_on(storage.save("canvas", &json!({}))),
            Err(StorageError::Unavailable(_))
        ));
    }
}

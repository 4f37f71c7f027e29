//! Storage abstraction for the durable local cache.
//!
//! Backends store raw JSON records by key. The [`LocalCacheManager`] builds
//! the singleton canvas record on top of them.

mod cache;
mod file;
mod memory;

pub use cache::{CACHE_RECORD_KEY, CacheRecord, LocalCacheManager};
pub use file::FileStorage;
pub use memory::MemoryStorage;

use serde_json::Value;
use std::future::Future;
use std::pin::Pin;
use thiserror::Error;

/// Storage errors.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Record not found: {0}")]
    NotFound(String),
    #[error("Storage unavailable: {0}")]
    Unavailable(String),
    #[error("Corrupt record: {0}")]
    Corrupt(String),
    #[error("Serialization error: {0}")]
    Serialization(String),
    #[error("IO error: {0}")]
    Io(String),
    #[error("Storage error: {0}")]
    Other(String),
}

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Boxed future for async storage operations.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + 'a>>;

/// Trait for record storage backends.
///
/// Implementations can keep records in memory or on the filesystem. Every
/// write fully replaces the previous value under the key.
pub trait Storage: Send + Sync {
    /// Open the backing store, creating it if absent. Idempotent.
    fn open(&self) -> BoxFuture<'_, StorageResult<()>>;

    /// Save a record.
    fn save(&self, key: &str, record: &Value) -> BoxFuture<'_, StorageResult<()>>;

    /// Load a record.
    fn load(&self, key: &str) -> BoxFuture<'_, StorageResult<Value>>;

    /// Delete a record. Deleting an absent record succeeds.
    fn delete(&self, key: &str) -> BoxFuture<'_, StorageResult<()>>;

    /// Check if a record exists.
    fn exists(&self, key: &str) -> BoxFuture<'_, StorageResult<bool>>;
}

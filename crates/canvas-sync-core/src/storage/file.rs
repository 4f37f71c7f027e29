//! File-based storage for native platforms.

use super::{BoxFuture, Storage, StorageError, StorageResult};
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};

/// Stores each record as a JSON file in a directory.
///
/// Writes go to a temporary file first and are renamed into place, so a
/// crash mid-write leaves the previous record intact.
pub struct FileStorage {
    /// Base directory for records.
    base_path: PathBuf,
}

impl FileStorage {
    /// Create a file storage rooted at `base_path`. Nothing touches the
    /// filesystem until [`Storage::open`].
    pub fn new(base_path: PathBuf) -> Self {
        Self { base_path }
    }

    /// Storage in the platform data directory, namespaced by origin.
    ///
    /// On Linux: `~/.local/share/canvas-sync/<origin>/`
    /// On Windows: `%LOCALAPPDATA%\canvas-sync\<origin>\`
    pub fn default_location(origin: &str) -> StorageResult<Self> {
        let base = dirs::data_local_dir()
            .or_else(dirs::home_dir)
            .ok_or_else(|| {
                StorageError::Unavailable("Could not determine data directory".to_string())
            })?;

        Ok(Self::new(base.join("canvas-sync").join(sanitize(origin))))
    }

    /// Get the base path.
    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    fn record_path(&self, key: &str) -> PathBuf {
        self.base_path.join(format!("{}.json", sanitize(key)))
    }
}

/// Make an arbitrary key safe to use as a file name.
fn sanitize(key: &str) -> String {
    key.chars()
        .map(|c| if c.is_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect()
}

impl Storage for FileStorage {
    fn open(&self) -> BoxFuture<'_, StorageResult<()>> {
        Box::pin(async move {
            fs::create_dir_all(&self.base_path).map_err(|e| {
                StorageError::Unavailable(format!(
                    "Failed to create {}: {}",
                    self.base_path.display(),
                    e
                ))
            })?;
            let meta = fs::metadata(&self.base_path)
                .map_err(|e| StorageError::Unavailable(e.to_string()))?;
            if meta.permissions().readonly() {
                return Err(StorageError::Unavailable(format!(
                    "{} is read-only",
                    self.base_path.display()
                )));
            }
            Ok(())
        })
    }

    fn save(&self, key: &str, record: &Value) -> BoxFuture<'_, StorageResult<()>> {
        let path = self.record_path(key);
        let json = match serde_json::to_vec(record) {
            Ok(json) => json,
            Err(e) => {
                return Box::pin(async move { Err(StorageError::Serialization(e.to_string())) });
            }
        };

        Box::pin(async move {
            let tmp = path.with_extension("json.tmp");
            fs::write(&tmp, json).map_err(|e| {
                StorageError::Io(format!("Failed to write {}: {}", tmp.display(), e))
            })?;
            fs::rename(&tmp, &path).map_err(|e| {
                StorageError::Io(format!("Failed to replace {}: {}", path.display(), e))
            })
        })
    }

    fn load(&self, key: &str) -> BoxFuture<'_, StorageResult<Value>> {
        let path = self.record_path(key);
        let key = key.to_string();

        Box::pin(async move {
            if !path.exists() {
                return Err(StorageError::NotFound(key));
            }

            let json = fs::read(&path).map_err(|e| {
                StorageError::Io(format!("Failed to read {}: {}", path.display(), e))
            })?;

            serde_json::from_slice(&json).map_err(|e| {
                StorageError::Corrupt(format!("Failed to parse {}: {}", path.display(), e))
            })
        })
    }

    fn delete(&self, key: &str) -> BoxFuture<'_, StorageResult<()>> {
        let path = self.record_path(key);

        Box::pin(async move {
            if path.exists() {
                fs::remove_file(&path).map_err(|e| {
                    StorageError::Io(format!("Failed to delete {}: {}", path.display(), e))
                })?;
            }
            Ok(())
        })
    }

    fn exists(&self, key: &str) -> BoxFuture<'_, StorageResult<bool>> {
        let path = self.record_path(key);
        Box::pin(async move { Ok(path.exists()) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block_on;
    use serde_json::json;
    use tempfile::tempdir;

    fn open_in(dir: &Path) -> FileStorage {
        let storage = FileStorage::new(dir.join("origin"));
        block_on(storage.open()).unwrap();
        storage
    }

    #[test]
    fn test_open_creates_directory() {
        let dir = tempdir().unwrap();
        let storage = open_in(dir.path());
        assert!(storage.base_path().is_dir());
        block_on(storage.open()).unwrap();
    }

    #[test]
    fn test_file_storage_save_load() {
        let dir = tempdir().unwrap();
        let storage = open_in(dir.path());

        block_on(storage.save("canvas", &json!({"elements": [], "timestamp": 5}))).unwrap();
        let loaded = block_on(storage.load("canvas")).unwrap();
        assert_eq!(loaded["timestamp"], 5);
        assert!(!storage.base_path().join("canvas.json.tmp").exists());
    }

    #[test]
    fn test_file_storage_not_found() {
        let dir = tempdir().unwrap();
        let storage = open_in(dir.path());

        let result = block_on(storage.load("nonexistent"));
        assert!(matches!(result, Err(StorageError::NotFound(_))));
    }

    #[test]
    fn test_unparseable_file_is_corrupt() {
        let dir = tempdir().unwrap();
        let storage = open_in(dir.path());
        fs::write(storage.base_path().join("canvas.json"), "{ not json").unwrap();

        let result = block_on(storage.load("canvas"));
        assert!(matches!(result, Err(StorageError::Corrupt(_))));
    }

    #[test]
    fn test_file_storage_delete() {
        let dir = tempdir().unwrap();
        let storage = open_in(dir.path());

        block_on(storage.save("canvas", &json!({}))).unwrap();
        assert!(block_on(storage.exists("canvas")).unwrap());

        block_on(storage.delete("canvas")).unwrap();
        assert!(!block_on(storage.exists("canvas")).unwrap());
    }

    #[test]
    fn test_default_location_is_namespaced() {
        if let Ok(storage) = FileStorage::default_location("http://127.0.0.1:31337") {
            let path = storage.base_path().to_string_lossy().into_owned();
            assert!(path.contains("canvas-sync"));
            assert!(path.ends_with("http___127_0_0_1_31337"));
        }
    }
}

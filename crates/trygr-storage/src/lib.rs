//! Storage abstraction for JSON persistence
//!
//! Every durable store keeps one versioned JSON document per storage key
//! in a `.storage/` directory:
//!
//! ```json
//! {
//!   "version": 1,
//!   "minor_version": 1,
//!   "key": "trygr.triggers",
//!   "data": { ... }
//! }
//! ```
//!
//! Writes go to a temp file first and are renamed into place, and are
//! serialized per storage instance so concurrent saves cannot interleave.

use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::fs;
use tokio::sync::Mutex;
use tracing::{debug, warn};

/// Storage errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Storage file not found: {key}")]
    NotFound { key: String },

    #[error("Migration required for {key}: from {from} to {to}")]
    MigrationRequired { key: String, from: u32, to: u32 },
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Storage file wrapper with version tracking
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageFile<T> {
    /// Major version - breaking changes
    pub version: u32,
    /// Minor version - additive changes
    pub minor_version: u32,
    /// Storage key (file name)
    pub key: String,
    /// The actual data
    pub data: T,
}

impl<T> StorageFile<T> {
    /// Create a new storage file
    pub fn new(key: impl Into<String>, data: T, version: u32, minor_version: u32) -> Self {
        Self {
            version,
            minor_version,
            key: key.into(),
            data,
        }
    }
}

/// Types persisted as a single storage document
pub trait Storable: Serialize + DeserializeOwned {
    /// Storage key for this type
    const KEY: &'static str;
    /// Current major version
    const VERSION: u32;
    /// Current minor version
    const MINOR_VERSION: u32;
}

/// Storage manager for the `.storage/` directory
#[derive(Debug)]
pub struct Storage {
    /// Path to the `.storage/` directory
    storage_dir: PathBuf,
    /// Serializes writes so temp files are never shared between saves
    write_lock: Mutex<()>,
}

impl Storage {
    /// Create a storage manager rooted at `<base_dir>/.storage`
    pub fn new(base_dir: impl AsRef<Path>) -> Self {
        Self {
            storage_dir: base_dir.as_ref().join(".storage"),
            write_lock: Mutex::new(()),
        }
    }

    /// Get the storage directory path
    pub fn storage_dir(&self) -> &Path {
        &self.storage_dir
    }

    /// Ensure the storage directory exists
    pub async fn ensure_dir(&self) -> StorageResult<()> {
        if !self.storage_dir.exists() {
            fs::create_dir_all(&self.storage_dir).await?;
            debug!("Created storage directory: {:?}", self.storage_dir);
        }
        Ok(())
    }

    /// Get the file path for a storage key
    pub fn file_path(&self, key: &str) -> PathBuf {
        self.storage_dir.join(key)
    }

    /// Check if a storage key exists
    pub async fn exists(&self, key: &str) -> bool {
        fs::try_exists(self.file_path(key)).await.unwrap_or(false)
    }

    /// Load a storage document
    ///
    /// Returns None if the file doesn't exist.
    pub async fn load<T>(&self, key: &str) -> StorageResult<Option<StorageFile<T>>>
    where
        T: DeserializeOwned,
    {
        let path = self.file_path(key);

        let content = match fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("Storage file not found: {}", key);
                return Ok(None);
            }
            Err(e) => return Err(e.into()),
        };

        let storage_file: StorageFile<T> = serde_json::from_str(&content)?;

        debug!(
            "Loaded storage file: {} (v{}.{})",
            key, storage_file.version, storage_file.minor_version
        );

        Ok(Some(storage_file))
    }

    /// Load a storage document, returning an error if not found
    pub async fn load_required<T>(&self, key: &str) -> StorageResult<StorageFile<T>>
    where
        T: DeserializeOwned,
    {
        self.load(key).await?.ok_or_else(|| StorageError::NotFound {
            key: key.to_string(),
        })
    }

    /// Save a storage document atomically
    pub async fn save<T>(&self, storage_file: &StorageFile<T>) -> StorageResult<()>
    where
        T: Serialize,
    {
        let content = serde_json::to_string_pretty(storage_file)?;

        let _guard = self.write_lock.lock().await;
        self.ensure_dir().await?;

        let path = self.file_path(&storage_file.key);
        let temp_path = self.file_path(&format!("{}.tmp", storage_file.key));

        fs::write(&temp_path, &content).await?;
        fs::rename(&temp_path, &path).await?;

        debug!(
            "Saved storage file: {} (v{}.{})",
            storage_file.key, storage_file.version, storage_file.minor_version
        );

        Ok(())
    }

    /// Delete a storage file; deleting a missing key succeeds
    pub async fn delete(&self, key: &str) -> StorageResult<()> {
        let _guard = self.write_lock.lock().await;
        match fs::remove_file(self.file_path(key)).await {
            Ok(()) => {
                debug!("Deleted storage file: {}", key);
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// List all storage keys
    pub async fn list_keys(&self) -> StorageResult<Vec<String>> {
        if !self.storage_dir.exists() {
            return Ok(Vec::new());
        }

        let mut keys = Vec::new();
        let mut entries = fs::read_dir(&self.storage_dir).await?;

        while let Some(entry) = entries.next_entry().await? {
            if let Ok(file_type) = entry.file_type().await {
                if file_type.is_file() {
                    if let Some(name) = entry.file_name().to_str() {
                        // Skip temp files
                        if !name.ends_with(".tmp") {
                            keys.push(name.to_string());
                        }
                    }
                }
            }
        }

        keys.sort();
        Ok(keys)
    }

    /// Load the data of a [`Storable`] type, checking its major version
    pub async fn load_data<T: Storable>(&self) -> StorageResult<Option<T>> {
        let Some(raw) = self.load::<serde_json::Value>(T::KEY).await? else {
            return Ok(None);
        };

        if raw.version != T::VERSION {
            return Err(StorageError::MigrationRequired {
                key: T::KEY.to_string(),
                from: raw.version,
                to: T::VERSION,
            });
        }

        if raw.minor_version < T::MINOR_VERSION {
            warn!(
                "Storage {} has older minor version ({} < {})",
                T::KEY,
                raw.minor_version,
                T::MINOR_VERSION
            );
        }

        Ok(Some(serde_json::from_value(raw.data)?))
    }

    /// Save a [`Storable`] value under its key at the current version
    pub async fn save_data<T: Storable>(&self, data: &T) -> StorageResult<()> {
        let file = StorageFile::new(T::KEY, data, T::VERSION, T::MINOR_VERSION);
        self.save(&file).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
    struct TestData {
        name: String,
        value: i32,
    }

    impl Storable for TestData {
        const KEY: &'static str = "test.data";
        const VERSION: u32 = 2;
        const MINOR_VERSION: u32 = 1;
    }

    fn sample() -> TestData {
        TestData {
            name: "test".to_string(),
            value: 42,
        }
    }

    #[tokio::test]
    async fn test_storage_save_load() {
        let temp_dir = TempDir::new().unwrap();
        let storage = Storage::new(temp_dir.path());

        storage
            .save(&StorageFile::new("test.data", sample(), 2, 1))
            .await
            .unwrap();
        assert!(storage.exists("test.data").await);

        let loaded: StorageFile<TestData> = storage.load_required("test.data").await.unwrap();
        assert_eq!(loaded.data, sample());
        assert_eq!(loaded.version, 2);
        assert_eq!(loaded.minor_version, 1);
    }

    #[tokio::test]
    async fn test_storage_not_found() {
        let temp_dir = TempDir::new().unwrap();
        let storage = Storage::new(temp_dir.path());

        let result: Option<StorageFile<TestData>> = storage.load("nonexistent").await.unwrap();
        assert!(result.is_none());

        let required = storage.load_required::<TestData>("nonexistent").await;
        assert!(matches!(required, Err(StorageError::NotFound { .. })));
    }

    #[tokio::test]
    async fn test_storage_list_keys_skips_temp_files() {
        let temp_dir = TempDir::new().unwrap();
        let storage = Storage::new(temp_dir.path());

        for i in 0..3 {
            let file = StorageFile::new(format!("test.{}", i), sample(), 1, 1);
            storage.save(&file).await.unwrap();
        }
        std::fs::write(storage.file_path("test.9.tmp"), "{}").unwrap();

        let keys = storage.list_keys().await.unwrap();
        assert_eq!(keys, vec!["test.0", "test.1", "test.2"]);
    }

    #[tokio::test]
    async fn test_storage_delete_is_idempotent() {
        let temp_dir = TempDir::new().unwrap();
        let storage = Storage::new(temp_dir.path());

        storage.save_data(&sample()).await.unwrap();
        storage.delete("test.data").await.unwrap();
        assert!(!storage.exists("test.data").await);

        storage.delete("test.data").await.unwrap();
    }

    #[tokio::test]
    async fn test_storable_round_trip_and_version_check() {
        let temp_dir = TempDir::new().unwrap();
        let storage = Storage::new(temp_dir.path());

        storage.save_data(&sample()).await.unwrap();
        let loaded: Option<TestData> = storage.load_data().await.unwrap();
        assert_eq!(loaded, Some(sample()));

        storage
            .save(&StorageFile::new("test.data", sample(), 1, 1))
            .await
            .unwrap();
        let result = storage.load_data::<TestData>().await;
        assert!(matches!(
            result,
            Err(StorageError::MigrationRequired { from: 1, to: 2, .. })
        ));
    }
}

//! Latest-known state caches for Trygr
//!
//! This crate provides the [`DeviceCache`], the single source of truth for
//! what each device is doing right now, and the [`LocationCache`], which
//! holds the latest weather snapshot per location and publishes each
//! temperature reading to the trigger engine.

mod location;

pub use location::LocationCache;

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};
use trygr_core::{epoch_seconds, Device};
use trygr_storage::{Storable, Storage, StorageError};

/// Storage key for the device cache
pub const STORAGE_KEY: &str = "trygr.devices";
/// Current storage version
pub const STORAGE_VERSION: u32 = 1;
/// Current minor version
pub const STORAGE_MINOR_VERSION: u32 = 1;

/// Errors returned by the caches
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("record for {id} is stale ({age_secs}s old)")]
    Stale { id: String, age_secs: i64 },

    #[error("invalid record: {0}")]
    InvalidRecord(String),

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
}

/// Result type for cache operations
pub type CacheResult<T> = Result<T, CacheError>;

/// Device cache data for storage
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DeviceCacheData {
    pub devices: Vec<Device>,
}

impl Storable for DeviceCacheData {
    const KEY: &'static str = STORAGE_KEY;
    const VERSION: u32 = STORAGE_VERSION;
    const MINOR_VERSION: u32 = STORAGE_MINOR_VERSION;
}

/// Latest snapshot per device, keyed by device id
///
/// Records are replaced wholesale on every upsert and never deleted. When a
/// storage backend is attached, every write is persisted before it returns.
pub struct DeviceCache {
    /// All devices keyed by id
    devices: DashMap<String, Device>,
    /// Durable backing store (None for a purely in-memory cache)
    storage: Option<Arc<Storage>>,
    /// Records older than this are reported as stale
    max_age: Option<Duration>,
    /// Held while a snapshot is taken and written
    persist_lock: Mutex<()>,
}

impl DeviceCache {
    /// Create a cache persisted through the given storage
    pub fn new(storage: Arc<Storage>) -> Self {
        Self {
            devices: DashMap::new(),
            storage: Some(storage),
            max_age: None,
            persist_lock: Mutex::new(()),
        }
    }

    /// Create a cache that lives only in memory
    pub fn in_memory() -> Self {
        Self {
            devices: DashMap::new(),
            storage: None,
            max_age: None,
            persist_lock: Mutex::new(()),
        }
    }

    /// Treat records older than `max_age` as unknown
    pub fn with_max_age(mut self, max_age: Option<Duration>) -> Self {
        self.max_age = max_age;
        self
    }

    /// Load persisted devices into memory
    pub async fn load(&self) -> CacheResult<()> {
        let Some(storage) = &self.storage else {
            return Ok(());
        };

        if let Some(data) = storage.load_data::<DeviceCacheData>().await? {
            info!("Loading {} devices from storage", data.devices.len());
            for device in data.devices {
                self.devices.insert(device.id.clone(), device);
            }
        }
        Ok(())
    }

    /// Store the latest snapshot of a device, replacing any prior record
    ///
    /// A record without an observation time is stamped with the current time.
    /// If persisting fails the previous record (or none) is put back.
    #[instrument(skip(self, device), fields(device_id = %device.id))]
    pub async fn upsert(&self, mut device: Device) -> CacheResult<()> {
        if device.id.is_empty() {
            return Err(CacheError::InvalidRecord("device id is empty".to_string()));
        }
        if device.last_updated == 0 {
            device.last_updated = epoch_seconds();
        }

        let payload = serde_json::to_string(&device).unwrap_or_default();
        info!(device_id = %device.id, payload = %payload, "Updating device");

        let id = device.id.clone();
        let previous = self.devices.insert(id.clone(), device);

        if let Err(e) = self.persist().await {
            warn!(device_id = %id, error = %e, "Failed to persist device, keeping previous record");
            match previous {
                Some(previous) => self.devices.insert(id, previous),
                None => self.devices.remove(&id).map(|(_, d)| d),
            };
            return Err(e);
        }
        Ok(())
    }

    /// Get the latest snapshot of a device
    ///
    /// Fails with `NotFound` on a miss, and with `Stale` when a maximum age
    /// is configured and the record is older than it.
    pub fn get_by_id(&self, id: &str) -> CacheResult<Device> {
        self.get_by_id_at(id, epoch_seconds())
    }

    fn get_by_id_at(&self, id: &str, now: i64) -> CacheResult<Device> {
        debug!(device_id = %id, "Getting device details");

        let device = self
            .devices
            .get(id)
            .map(|d| d.value().clone())
            .ok_or_else(|| CacheError::NotFound(id.to_string()))?;

        if let Some(max_age) = self.max_age {
            let age_secs = now - device.last_updated;
            if age_secs > max_age.as_secs() as i64 {
                return Err(CacheError::Stale {
                    id: id.to_string(),
                    age_secs,
                });
            }
        }

        Ok(device)
    }

    /// Find a device by display name (case-insensitive)
    pub fn get_by_name(&self, name: &str) -> CacheResult<Device> {
        self.devices
            .iter()
            .find(|d| d.name.eq_ignore_ascii_case(name))
            .map(|d| d.value().clone())
            .ok_or_else(|| CacheError::NotFound(name.to_string()))
    }

    /// Get all devices
    pub fn all(&self) -> Vec<Device> {
        self.devices.iter().map(|d| d.value().clone()).collect()
    }

    /// Get the number of cached devices
    pub fn len(&self) -> usize {
        self.devices.len()
    }

    /// Check if no device has been observed yet
    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    async fn persist(&self) -> CacheResult<()> {
        let Some(storage) = &self.storage else {
            return Ok(());
        };

        let _guard = self.persist_lock.lock().await;
        let data = DeviceCacheData {
            devices: self.all(),
        };
        storage.save_data(&data).await?;
        debug!("Saved {} devices to storage", data.devices.len());
        Ok(())
    }
}

/// Thread-safe wrapper for DeviceCache
pub type SharedDeviceCache = Arc<DeviceCache>;

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use tokio_test::{assert_err, assert_ok};
    use trygr_core::STATUS_ON;

    fn plug(id: &str) -> Device {
        Device::new(id, "kasa").with_name("Porch heater")
    }

    #[tokio::test]
    async fn test_upsert_replaces_whole_record() {
        let cache = DeviceCache::in_memory();

        let mut first = plug("D1").with_status(STATUS_ON);
        first.brightness = Some(80);
        first.has_brightness = true;
        cache.upsert(first).await.unwrap();

        cache.upsert(plug("D1").with_status("off")).await.unwrap();

        let device = cache.get_by_id("D1").unwrap();
        assert_eq!(device.status, "off");
        assert_eq!(device.brightness, None);
        assert!(!device.has_brightness);
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test]
    async fn test_upsert_stamps_missing_timestamp() {
        let cache = DeviceCache::in_memory();

        cache.upsert(plug("D1")).await.unwrap();
        let mut observed = plug("D2");
        observed.last_updated = 1_700_000_000;
        cache.upsert(observed).await.unwrap();

        assert!(cache.get_by_id("D1").unwrap().last_updated > 0);
        assert_eq!(cache.get_by_id("D2").unwrap().last_updated, 1_700_000_000);
    }

    #[tokio::test]
    async fn test_empty_id_rejected() {
        let cache = DeviceCache::in_memory();

        let result = cache.upsert(plug("")).await;
        assert!(matches!(result, Err(CacheError::InvalidRecord(_))));
        assert!(cache.is_empty());
    }

    #[test]
    fn test_miss_is_not_found() {
        let cache = DeviceCache::in_memory();
        assert!(matches!(
            cache.get_by_id("missing"),
            Err(CacheError::NotFound(id)) if id == "missing"
        ));
    }

    #[tokio::test]
    async fn test_stale_records() {
        let cache = DeviceCache::in_memory().with_max_age(Some(Duration::from_secs(60)));

        let mut device = plug("D1");
        device.last_updated = 1_000;
        cache.upsert(device).await.unwrap();

        assert_ok!(cache.get_by_id_at("D1", 1_060));
        assert!(matches!(
            cache.get_by_id_at("D1", 1_061),
            Err(CacheError::Stale { age_secs: 61, .. })
        ));
    }

    #[tokio::test]
    async fn test_get_by_name() {
        let cache = DeviceCache::in_memory();
        cache.upsert(plug("D1")).await.unwrap();

        assert_eq!(cache.get_by_name("porch HEATER").unwrap().id, "D1");
        assert_err!(cache.get_by_name("garage"));
    }

    #[tokio::test]
    async fn test_failed_upsert_restores_previous_record() {
        let temp_dir = TempDir::new().unwrap();
        let storage = Arc::new(Storage::new(temp_dir.path()));

        let cache = DeviceCache::new(storage.clone());
        cache.upsert(plug("D1").with_status("off")).await.unwrap();

        std::fs::create_dir(storage.file_path(&format!("{STORAGE_KEY}.tmp"))).unwrap();

        let result = cache.upsert(plug("D1").with_status(STATUS_ON)).await;
        assert!(matches!(result, Err(CacheError::Storage(_))));
        assert_eq!(cache.get_by_id("D1").unwrap().status, "off");

        let result = cache.upsert(plug("D2")).await;
        assert!(matches!(result, Err(CacheError::Storage(_))));
        assert!(matches!(cache.get_by_id("D2"), Err(CacheError::NotFound(_))));
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test]
    async fn test_persisted_across_instances() {
        let temp_dir = TempDir::new().unwrap();
        let storage = Arc::new(Storage::new(temp_dir.path()));

        let cache = DeviceCache::new(storage.clone());
        cache.upsert(plug("D1").with_status(STATUS_ON)).await.unwrap();

        let reloaded = DeviceCache::new(storage);
        reloaded.load().await.unwrap();
        assert!(reloaded.get_by_id("D1").unwrap().is_on());
    }
}

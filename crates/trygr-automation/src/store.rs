//! Durable trigger storage

use crate::validation::{validate_definition, validate_value};
use crate::TriggerResult;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, error, info, instrument};
use trygr_core::{TriggerDefinition, TriggerEntry};
use trygr_storage::{Storable, Storage};

pub const STORAGE_KEY: &str = "trygr.triggers";
const STORAGE_VERSION: u32 = 1;
const STORAGE_MINOR_VERSION: u32 = 1;

/// Persisted trigger collection
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TriggerStoreData {
    pub triggers: Vec<TriggerEntry>,
}

impl Storable for TriggerStoreData {
    const KEY: &'static str = STORAGE_KEY;
    const VERSION: u32 = STORAGE_VERSION;
    const MINOR_VERSION: u32 = STORAGE_MINOR_VERSION;
}

/// Trigger definitions keyed by id
///
/// Ids are `"<triggerType>:<sequence>"` with a six-digit, zero-padded
/// sequence shared across kinds. The sequence is an atomic counter seeded
/// from the highest id on load, so concurrent creates never collide and a
/// deleted id is never handed out again.
pub struct TriggerStore {
    triggers: DashMap<String, TriggerDefinition>,
    sequence: AtomicU64,
    storage: Option<Arc<Storage>>,
    persist_lock: Mutex<()>,
}

impl TriggerStore {
    /// Create a store persisted under the given storage
    pub fn new(storage: Arc<Storage>) -> Self {
        Self {
            storage: Some(storage),
            ..Self::in_memory()
        }
    }

    /// Create a store without persistence
    pub fn in_memory() -> Self {
        Self {
            triggers: DashMap::new(),
            sequence: AtomicU64::new(0),
            storage: None,
            persist_lock: Mutex::new(()),
        }
    }

    /// Load persisted triggers and seed the id sequence
    pub async fn load(&self) -> TriggerResult<()> {
        let Some(storage) = &self.storage else {
            return Ok(());
        };

        if let Some(data) = storage.load_data::<TriggerStoreData>().await? {
            info!("Loading {} triggers from storage", data.triggers.len());
            for entry in data.triggers {
                if let Some(seq) = sequence_of(&entry.id) {
                    self.sequence.fetch_max(seq, Ordering::SeqCst);
                }
                self.triggers.insert(entry.id, entry.data);
            }
        }
        Ok(())
    }

    /// Validate and store a definition, returning its new id
    ///
    /// Nothing is kept if persisting fails.
    #[instrument(skip(self, definition), fields(trigger_type = %definition.trigger_type))]
    pub async fn create(&self, definition: TriggerDefinition) -> TriggerResult<String> {
        validate_definition(&definition)?;

        let seq = self.sequence.fetch_add(1, Ordering::SeqCst) + 1;
        let id = format!("{}:{:06}", definition.trigger_type, seq);

        info!(trigger_id = %id, device_id = %definition.affected_device_id, "Creating trigger");
        self.triggers.insert(id.clone(), definition);

        if let Err(e) = self.persist().await {
            error!(trigger_id = %id, error = %e, "Failed to persist trigger");
            self.triggers.remove(&id);
            return Err(e.into());
        }
        Ok(id)
    }

    /// Validate a raw JSON request and store it
    pub async fn create_from_value(&self, value: &Value) -> TriggerResult<String> {
        let definition = validate_value(value)?;
        self.create(definition).await
    }

    /// Remove a trigger; an unknown id is not an error
    ///
    /// Returns whether a trigger was removed. The trigger is restored if
    /// persisting fails.
    #[instrument(skip(self))]
    pub async fn delete(&self, id: &str) -> TriggerResult<bool> {
        let Some((id, definition)) = self.triggers.remove(id) else {
            debug!(trigger_id = %id, "Delete of unknown trigger");
            return Ok(false);
        };

        if let Err(e) = self.persist().await {
            error!(trigger_id = %id, error = %e, "Failed to persist trigger removal");
            self.triggers.insert(id, definition);
            return Err(e.into());
        }

        info!(trigger_id = %id, "Deleted trigger");
        Ok(true)
    }

    /// All stored triggers, ordered by sequence
    pub fn list(&self) -> Vec<TriggerEntry> {
        let mut entries: Vec<TriggerEntry> = self
            .triggers
            .iter()
            .map(|t| TriggerEntry {
                id: t.key().clone(),
                data: t.value().clone(),
            })
            .collect();
        entries.sort_by_key(|e| sequence_of(&e.id).unwrap_or(u64::MAX));
        entries
    }

    /// Definitions of all triggers, in no particular order
    pub fn definitions(&self) -> Vec<TriggerDefinition> {
        self.triggers.iter().map(|t| t.value().clone()).collect()
    }

    pub fn get(&self, id: &str) -> Option<TriggerDefinition> {
        self.triggers.get(id).map(|t| t.value().clone())
    }

    pub fn len(&self) -> usize {
        self.triggers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.triggers.is_empty()
    }

    async fn persist(&self) -> trygr_storage::StorageResult<()> {
        let Some(storage) = &self.storage else {
            return Ok(());
        };

        let _guard = self.persist_lock.lock().await;
        let data = TriggerStoreData {
            triggers: self.list(),
        };
        storage.save_data(&data).await
    }
}

fn sequence_of(id: &str) -> Option<u64> {
    id.rsplit_once(':').and_then(|(_, seq)| seq.parse().ok())
}

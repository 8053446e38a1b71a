//! Trigger automation for Trygr
//!
//! - [`TriggerStore`] holds operator-defined triggers, validated on create
//!   and persisted under `.storage/`.
//! - [`TriggerEngine`] matches a temperature reading against the store and
//!   fans each hit out to the device's vendor adapter, notifying on
//!   applied actions.
//! - [`TemperatureRunner`] feeds readings from the location cache into the
//!   engine.

mod engine;
mod runner;
mod store;
mod validation;

pub use engine::{is_temperature_hit, Dispatch, DispatchError, HitOutcome, TriggerEngine};
pub use runner::TemperatureRunner;
pub use store::{TriggerStore, TriggerStoreData, STORAGE_KEY};
pub use validation::{trigger_schema, validate_definition, validate_value};

use thiserror::Error;
use trygr_storage::StorageError;

/// Errors from trigger management
#[derive(Debug, Error)]
pub enum TriggerError {
    /// The definition was rejected before anything was stored
    #[error("Invalid trigger: {0}")]
    Validation(String),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

pub type TriggerResult<T> = Result<T, TriggerError>;

//! Core types for Trygr
//!
//! This crate provides the fundamental types shared by every other crate:
//! the normalized [`Device`] record, [`TriggerDefinition`] and its parts,
//! the [`Location`] snapshot fed by the weather poller, the
//! [`TemperatureReading`] evaluation signal and the [`Context`] used to
//! correlate an evaluation pass with the dispatches it causes.

mod context;
mod device;
mod location;
mod outcome;
mod trigger;

pub use context::Context;
pub use device::{Device, STATUS_OFF, STATUS_ON};
pub use location::{Location, TemperatureReading, Weather};
pub use outcome::ActionOutcome;
pub use trigger::{
    ParseTriggerKindError, TriggerDefinition, TriggerEntry, TriggerKind, TriggerValue,
};

/// Current time as epoch seconds, the unit used for every timestamp in the model
pub fn epoch_seconds() -> i64 {
    chrono::Utc::now().timestamp()
}

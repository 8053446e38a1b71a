//! Temperature-driven trigger dispatch
//!
//! An evaluation pass filters the store for temperature hits and spawns one
//! task per hit. Each task looks the device up in the cache, picks the
//! adapter by vendor tag, performs the action and, when the action changed
//! something and the trigger has recipients, hands the result text to the
//! notifier in the background. A failing hit is logged and never affects
//! the others.

use crate::store::TriggerStore;
use std::sync::Arc;
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, instrument, trace, warn};
use trygr_core::{ActionOutcome, Context, TriggerDefinition, TriggerKind};
use trygr_device_cache::{CacheError, DeviceCache};
use trygr_notify::{spawn_notification, Notifier};
use trygr_vendor::AdapterRegistry;

/// Why a single hit could not be dispatched
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("Device lookup failed: {0}")]
    DeviceLookup(#[from] CacheError),

    #[error("No adapter registered for vendor '{vendor}'")]
    NoAdapter { vendor: String },
}

/// Result of dispatching one hit
#[derive(Debug)]
pub struct HitOutcome {
    pub dispatch_id: String,
    pub trigger: TriggerDefinition,
    pub result: Result<ActionOutcome, DispatchError>,
    /// Whether a notification was handed to the notifier
    pub notified: bool,
}

/// Handle on the dispatches started by one evaluation pass
///
/// Dropping it leaves the dispatches running.
#[derive(Debug)]
pub struct Dispatch {
    pub pass_id: String,
    handles: Vec<JoinHandle<HitOutcome>>,
}

impl Dispatch {
    /// Number of hits dispatched
    pub fn hits(&self) -> usize {
        self.handles.len()
    }

    /// Wait for every dispatch of this pass to finish
    pub async fn join(self) -> Vec<HitOutcome> {
        let mut outcomes = Vec::with_capacity(self.handles.len());
        for handle in self.handles {
            match handle.await {
                Ok(outcome) => outcomes.push(outcome),
                Err(e) => error!(pass_id = %self.pass_id, error = %e, "Dispatch task failed"),
            }
        }
        outcomes
    }
}

/// Check one definition against a temperature reading
///
/// `minTemp` hits at or below its threshold, `maxTemp` at or above.
/// Other kinds never hit on temperature.
pub fn is_temperature_hit(definition: &TriggerDefinition, temperature: f64) -> bool {
    let threshold = match definition.trigger_value.as_f64() {
        Some(v) => v,
        None => return false,
    };

    match definition.trigger_type {
        TriggerKind::MinTemp => temperature <= threshold,
        TriggerKind::MaxTemp => temperature >= threshold,
        _ => false,
    }
}

/// Coordinates the trigger store, device cache, adapters and notifier
///
/// Owns no data of its own; cheap to clone.
#[derive(Clone)]
pub struct TriggerEngine {
    store: Arc<TriggerStore>,
    devices: Arc<DeviceCache>,
    adapters: Arc<AdapterRegistry>,
    notifier: Arc<dyn Notifier>,
}

impl TriggerEngine {
    pub fn new(
        store: Arc<TriggerStore>,
        devices: Arc<DeviceCache>,
        adapters: Arc<AdapterRegistry>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            store,
            devices,
            adapters,
            notifier,
        }
    }

    pub fn store(&self) -> &Arc<TriggerStore> {
        &self.store
    }

    pub fn devices(&self) -> &Arc<DeviceCache> {
        &self.devices
    }

    /// Temperature triggers matching a reading, in no particular order
    pub fn get_temperature_hits(&self, temperature: f64) -> Vec<TriggerDefinition> {
        self.store
            .definitions()
            .into_iter()
            .filter(|d| is_temperature_hit(d, temperature))
            .collect()
    }

    /// Evaluate a temperature reading and dispatch every hit
    ///
    /// Returns once the dispatches are spawned; must be called within a
    /// tokio runtime.
    pub fn trigger_by_temperature(&self, temperature: f64) -> Dispatch {
        let pass = Context::new();
        let hits = self.get_temperature_hits(temperature);
        debug!(pass_id = %pass.id, temperature, hits = hits.len(), "Evaluated temperature");

        let handles = hits
            .into_iter()
            .map(|hit| {
                let engine = self.clone();
                let context = pass.child();
                tokio::spawn(async move { engine.dispatch_hit(hit, context).await })
            })
            .collect();

        Dispatch {
            pass_id: pass.id,
            handles,
        }
    }

    #[instrument(
        skip(self, hit, context),
        fields(
            pass_id = context.parent_id.as_deref().unwrap_or_default(),
            dispatch_id = %context.id,
            device_id = %hit.affected_device_id,
        )
    )]
    async fn dispatch_hit(&self, hit: TriggerDefinition, context: Context) -> HitOutcome {
        let result = self.perform(&hit).await;
        let mut notified = false;

        match &result {
            Ok(outcome) if outcome.no_op => {
                debug!(result = %outcome.result_text, "Action was a no-op");
            }
            Ok(outcome) => {
                info!(result = %outcome.result_text, "Action applied");
                if !hit.notify.is_empty() {
                    spawn_notification(
                        self.notifier.clone(),
                        hit.notify.clone(),
                        outcome.result_text.clone(),
                    );
                    notified = true;
                }
            }
            Err(e) => warn!(error = %e, "Dispatch failed"),
        }

        HitOutcome {
            dispatch_id: context.id,
            trigger: hit,
            result,
            notified,
        }
    }

    async fn perform(&self, hit: &TriggerDefinition) -> Result<ActionOutcome, DispatchError> {
        let device = self.devices.get_by_id(&hit.affected_device_id)?;

        let adapter = self
            .adapters
            .get(&device.vendor)
            .ok_or_else(|| DispatchError::NoAdapter {
                vendor: device.vendor.clone(),
            })?;

        trace!(vendor = %device.vendor, action = %hit.action, "Invoking adapter");
        Ok(adapter
            .perform_action(&device, &hit.action, &hit.action_value)
            .await)
    }
}

//! Location cache
//!
//! Holds the latest weather snapshot per postal code. Every update publishes
//! the snapshot's temperature on a broadcast channel; the trigger engine's
//! runner subscribes to it, so updating a location never waits on trigger
//! evaluation.

use dashmap::DashMap;
use tokio::sync::broadcast;
use tracing::{debug, info, instrument, trace};
use trygr_core::{epoch_seconds, Location, TemperatureReading};

use crate::{CacheError, CacheResult};

/// Default channel capacity for temperature subscriptions
const DEFAULT_CHANNEL_CAPACITY: usize = 64;

/// Latest location snapshot per postal code
pub struct LocationCache {
    locations: DashMap<String, Location>,
    readings: broadcast::Sender<TemperatureReading>,
}

impl LocationCache {
    /// Create an empty location cache
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CHANNEL_CAPACITY)
    }

    /// Create a location cache with the given reading channel capacity
    pub fn with_capacity(capacity: usize) -> Self {
        let (readings, _) = broadcast::channel(capacity);
        Self {
            locations: DashMap::new(),
            readings,
        }
    }

    /// Subscribe to the temperature readings published by [`update`](Self::update)
    pub fn subscribe(&self) -> broadcast::Receiver<TemperatureReading> {
        self.readings.subscribe()
    }

    /// Store a location snapshot and publish its temperature
    #[instrument(skip(self, location), fields(postal_code = %location.postal_code))]
    pub fn update(&self, mut location: Location) -> CacheResult<()> {
        if location.postal_code.is_empty() {
            return Err(CacheError::InvalidRecord("postal code is empty".to_string()));
        }
        location.last_updated = Some(epoch_seconds());

        let payload = serde_json::to_string(&location).unwrap_or_default();
        info!(postal_code = %location.postal_code, payload = %payload, "Updating location");

        let reading = location.temperature_reading();
        self.locations.insert(location.postal_code.clone(), location);

        // A send error only means nobody is listening
        match self.readings.send(reading) {
            Ok(receivers) => trace!(receivers, "Published temperature reading"),
            Err(_) => debug!("No temperature subscribers"),
        }

        Ok(())
    }

    /// Get the latest snapshot for a postal code
    pub fn get_by_postal_code(&self, postal_code: &str) -> CacheResult<Location> {
        debug!(postal_code = %postal_code, "Getting location details");
        self.locations
            .get(postal_code)
            .map(|l| l.value().clone())
            .ok_or_else(|| CacheError::NotFound(postal_code.to_string()))
    }

    /// Get all cached locations
    pub fn all(&self) -> Vec<Location> {
        self.locations.iter().map(|l| l.value().clone()).collect()
    }
}

impl Default for LocationCache {
    fn default() -> Self {
        Self::new()
    }
}

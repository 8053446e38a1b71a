//! Location snapshot and the temperature signal derived from it

use serde::{Deserialize, Serialize};

/// Current weather conditions at a location
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Weather {
    pub temperature: f64,
    pub windspeed: f64,
}

/// Geographic location with the latest weather observed there
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Location {
    pub postal_code: String,
    pub latitude: f64,
    pub longitude: f64,
    #[serde(default)]
    pub city: String,
    #[serde(default)]
    pub state: String,
    #[serde(default)]
    pub country_code: String,
    #[serde(default)]
    pub utc_offset_seconds: i32,
    /// Today's sunrise (epoch seconds)
    #[serde(default)]
    pub sunrise: i64,
    /// Today's sunset (epoch seconds)
    #[serde(default)]
    pub sunset: i64,
    pub current_weather: Weather,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_updated: Option<i64>,
}

/// A single ambient temperature reading presented to the trigger engine
///
/// Readings are stateless and never persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemperatureReading {
    /// Where the reading came from (postal code for weather readings)
    pub source: String,
    pub temperature: f64,
    /// Observation time (epoch seconds)
    pub observed_at: i64,
}

impl Location {
    /// The temperature signal carried by this snapshot
    pub fn temperature_reading(&self) -> TemperatureReading {
        TemperatureReading {
            source: self.postal_code.clone(),
            temperature: self.current_weather.temperature,
            observed_at: self.last_updated.unwrap_or_else(crate::epoch_seconds),
        }
    }
}

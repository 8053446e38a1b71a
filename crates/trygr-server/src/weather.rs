//! Weather feed
//!
//! Polls Open-Meteo for the configured coordinates and pushes each result
//! into the location cache, which in turn drives temperature triggers.

use anyhow::{Context as _, Result};
use chrono::NaiveDateTime;
use serde::Deserialize;
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info};
use trygr_config::LocationConfig;
use trygr_core::{Location, Weather};
use trygr_device_cache::LocationCache;

const FORECAST_URL: &str = "https://api.open-meteo.com/v1/forecast";

#[derive(Debug, Deserialize)]
pub struct Forecast {
    #[serde(default)]
    pub utc_offset_seconds: i32,
    pub current_weather: CurrentWeather,
    #[serde(default)]
    pub daily: Option<Daily>,
}

#[derive(Debug, Deserialize)]
pub struct CurrentWeather {
    pub temperature: f64,
    #[serde(default)]
    pub windspeed: f64,
}

#[derive(Debug, Deserialize)]
pub struct Daily {
    #[serde(default)]
    pub sunrise: Vec<String>,
    #[serde(default)]
    pub sunset: Vec<String>,
}

pub struct WeatherClient {
    http: reqwest::Client,
    base_url: String,
    location: LocationConfig,
}

impl WeatherClient {
    pub fn new(location: LocationConfig) -> Self {
        Self::with_base_url(location, FORECAST_URL)
    }

    pub fn with_base_url(location: LocationConfig, base_url: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into(),
            location,
        }
    }

    /// Fetch current conditions and today's sunrise and sunset
    pub async fn fetch(&self) -> Result<Forecast> {
        let wind_unit = if self.location.temperature_unit == "fahrenheit" {
            "mph"
        } else {
            "kmh"
        };
        let query = [
            ("latitude", self.location.latitude.to_string()),
            ("longitude", self.location.longitude.to_string()),
            ("current_weather", "true".to_string()),
            ("daily", "sunrise,sunset".to_string()),
            ("temperature_unit", self.location.temperature_unit.clone()),
            ("windspeed_unit", wind_unit.to_string()),
            ("timezone", self.location.timezone.clone()),
        ];

        info!(
            latitude = self.location.latitude,
            longitude = self.location.longitude,
            "Fetching weather details"
        );
        let forecast = self
            .http
            .get(&self.base_url)
            .query(&query)
            .send()
            .await
            .context("weather request failed")?
            .error_for_status()?
            .json::<Forecast>()
            .await
            .context("weather response was not understood")?;
        Ok(forecast)
    }

    /// Fetch and build a location snapshot
    pub async fn location(&self) -> Result<Location> {
        let forecast = self.fetch().await?;
        Ok(to_location(&self.location, &forecast))
    }
}

/// Build a location snapshot from a forecast
pub fn to_location(config: &LocationConfig, forecast: &Forecast) -> Location {
    let offset = forecast.utc_offset_seconds;
    let first = |times: Option<&Vec<String>>| {
        times
            .and_then(|t| t.first())
            .and_then(|t| local_to_epoch(t, offset))
            .unwrap_or_default()
    };

    Location {
        postal_code: config.postal_code.clone(),
        latitude: config.latitude,
        longitude: config.longitude,
        city: config.city.clone(),
        state: config.state.clone(),
        country_code: config.country_code.clone(),
        utc_offset_seconds: offset,
        sunrise: first(forecast.daily.as_ref().map(|d| &d.sunrise)),
        sunset: first(forecast.daily.as_ref().map(|d| &d.sunset)),
        current_weather: Weather {
            temperature: forecast.current_weather.temperature,
            windspeed: forecast.current_weather.windspeed,
        },
        last_updated: None,
    }
}

/// Convert a local `YYYY-MM-DDTHH:MM` time to epoch seconds
fn local_to_epoch(local: &str, utc_offset_seconds: i32) -> Option<i64> {
    let time = NaiveDateTime::parse_from_str(local, "%Y-%m-%dT%H:%M").ok()?;
    Some(time.and_utc().timestamp() - i64::from(utc_offset_seconds))
}

/// Poll on an interval until shutdown
pub fn spawn_poller(
    client: WeatherClient,
    locations: Arc<LocationCache>,
    period: std::time::Duration,
    mut shutdown: broadcast::Receiver<()>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    match client.location().await {
                        Ok(location) => {
                            debug!(temperature = location.current_weather.temperature, "Weather updated");
                            if let Err(e) = locations.update(location) {
                                error!(error = %e, "Failed to update location");
                            }
                        }
                        Err(e) => error!(error = %e, "Failed to fetch weather"),
                    }
                }
                _ = shutdown.recv() => break,
            }
        }
        info!("Weather poller stopped");
    })
}

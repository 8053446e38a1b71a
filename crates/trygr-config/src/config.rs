//! Typed Trygr configuration
//!
//! Every section and field is optional. Numeric and boolean fields also
//! accept their text form so they can come from `!secret` or `!env_var`.

use crate::error::{ConfigError, ConfigResult};
use crate::loader::load_yaml;
use serde::{Deserialize, Deserializer};
use serde_yaml::Value;
use std::fmt::Display;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

/// Configuration file name inside the config directory
pub const CONFIG_FILE: &str = "configuration.yaml";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct TrygrConfig {
    pub api: ApiConfig,
    pub storage: StorageConfig,
    pub device_cache: DeviceCacheConfig,
    pub location: LocationConfig,
    /// Email delivery; notifications are only logged when absent
    pub smtp: Option<SmtpConfig>,
    pub kasa: KasaConfig,
}

impl TrygrConfig {
    /// Load `configuration.yaml` from a config directory
    ///
    /// A missing file yields the defaults, with storage under `config_dir`.
    pub fn load(config_dir: impl AsRef<Path>) -> ConfigResult<Self> {
        let config_dir = config_dir.as_ref();
        let mut config = if config_dir.join(CONFIG_FILE).exists() {
            Self::from_yaml(load_yaml(config_dir, CONFIG_FILE)?)?
        } else {
            tracing::info!("No {} in {:?}, using defaults", CONFIG_FILE, config_dir);
            Self::default()
        };

        if config.storage.dir.is_none() {
            config.storage.dir = Some(config_dir.to_path_buf());
        }
        Ok(config)
    }

    /// Build from an already-processed YAML value
    pub fn from_yaml(yaml: Value) -> ConfigResult<Self> {
        if yaml.is_null() {
            return Ok(Self::default());
        }
        serde_yaml::from_value(yaml).map_err(|e| ConfigError::InvalidValue {
            key: "configuration".to_string(),
            reason: e.to_string(),
        })
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub host: String,
    #[serde(deserialize_with = "scalar")]
    pub port: u16,
}

impl ApiConfig {
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3333,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Directory holding `.storage/`; defaults to the config directory
    pub dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct DeviceCacheConfig {
    /// Records older than this are reported as stale; never when unset
    #[serde(deserialize_with = "optional_scalar")]
    pub max_age_secs: Option<u64>,
}

impl DeviceCacheConfig {
    pub fn max_age(&self) -> Option<Duration> {
        self.max_age_secs.map(Duration::from_secs)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LocationConfig {
    /// Weather polling is off when empty
    pub postal_code: String,
    pub country_code: String,
    pub city: String,
    pub state: String,
    #[serde(deserialize_with = "scalar")]
    pub latitude: f64,
    #[serde(deserialize_with = "scalar")]
    pub longitude: f64,
    pub timezone: String,
    pub temperature_unit: String,
    #[serde(deserialize_with = "scalar")]
    pub poll_interval_secs: u64,
}

impl LocationConfig {
    pub fn is_enabled(&self) -> bool {
        !self.postal_code.is_empty()
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs.max(1))
    }
}

impl Default for LocationConfig {
    fn default() -> Self {
        Self {
            postal_code: String::new(),
            country_code: "US".to_string(),
            city: String::new(),
            state: String::new(),
            latitude: 0.0,
            longitude: 0.0,
            timezone: "America/New_York".to_string(),
            temperature_unit: "fahrenheit".to_string(),
            poll_interval_secs: 60,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SmtpConfig {
    pub host: String,
    #[serde(default = "default_smtp_port", deserialize_with = "scalar")]
    pub port: u16,
    /// Connect over TLS from the start (SMTPS, usually port 465)
    #[serde(default, deserialize_with = "scalar")]
    pub secure: bool,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
    pub from: String,
}

fn default_smtp_port() -> u16 {
    25
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct KasaConfig {
    #[serde(deserialize_with = "scalar")]
    pub enabled: bool,
    #[serde(deserialize_with = "scalar")]
    pub port: u16,
    #[serde(deserialize_with = "scalar")]
    pub timeout_ms: u64,
    /// Plug addresses to poll
    pub hosts: Vec<String>,
    #[serde(deserialize_with = "scalar")]
    pub poll_interval_secs: u64,
}

impl KasaConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs.max(1))
    }
}

impl Default for KasaConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            port: 9999,
            timeout_ms: 3000,
            hosts: Vec::new(),
            poll_interval_secs: 30,
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum Scalar<T> {
    Value(T),
    Text(String),
}

fn scalar<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + FromStr,
    T::Err: Display,
{
    match Scalar::<T>::deserialize(deserializer)? {
        Scalar::Value(v) => Ok(v),
        Scalar::Text(s) => s.trim().parse().map_err(serde::de::Error::custom),
    }
}

fn optional_scalar<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + FromStr,
    T::Err: Display,
{
    match Option::<Scalar<T>>::deserialize(deserializer)? {
        None => Ok(None),
        Some(Scalar::Value(v)) => Ok(Some(v)),
        Some(Scalar::Text(s)) => s.trim().parse().map(Some).map_err(serde::de::Error::custom),
    }
}

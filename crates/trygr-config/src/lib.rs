//! Configuration for Trygr
//!
//! `configuration.yaml` in the config directory is read with two custom
//! tags:
//!
//! - `!include path` - Include another YAML file
//! - `!secret key` - Substitute from secrets.yaml
//! - `!env_var VAR [default]` - Environment variable substitution
//!
//! ```ignore
//! use trygr_config::TrygrConfig;
//!
//! let config = TrygrConfig::load("/etc/trygr")?;
//! println!("API on {}", config.api.bind_address());
//! ```

mod config;
mod error;
mod loader;
mod secrets;

pub use config::{
    ApiConfig, DeviceCacheConfig, KasaConfig, LocationConfig, SmtpConfig, StorageConfig,
    TrygrConfig, CONFIG_FILE,
};
pub use error::{ConfigError, ConfigResult};
pub use loader::{load_yaml, YamlLoader};
pub use secrets::Secrets;

pub use serde_yaml::Value;

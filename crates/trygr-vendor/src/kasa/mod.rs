//! TP-Link Kasa smart plugs
//!
//! Plugs are observed with `get_sysinfo` and switched with
//! `set_relay_state` over the LAN protocol in [`protocol`]. Every
//! observation is written to the device cache, and actions read the
//! cached status and address before touching the plug.

pub mod protocol;
pub mod transport;

pub use protocol::SysInfo;
pub use transport::{KasaTransport, TcpTransport};

use crate::VendorAdapter;
use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, instrument, warn};
use trygr_core::{ActionOutcome, Device, TriggerValue, STATUS_OFF, STATUS_ON};
use trygr_device_cache::{CacheError, DeviceCache};

/// Vendor tag for Kasa devices
pub const VENDOR: &str = "kasa";

/// Default Kasa LAN port
pub const DEFAULT_PORT: u16 = 9999;

/// Errors talking to a Kasa plug
#[derive(Debug, Error)]
pub enum KasaError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Timed out talking to {host}")]
    Timeout { host: String },

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Device returned error code {0}")]
    Device(i64),

    #[error("Device has no known address")]
    NoAddress,

    #[error(transparent)]
    Cache(#[from] CacheError),
}

pub type KasaResult<T> = Result<T, KasaError>;

/// Actions a Kasa plug understands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum KasaAction {
    TurnOn,
    TurnOff,
    SetBrightness,
}

impl KasaAction {
    fn parse(action: &str) -> Option<Self> {
        match action {
            "turnOn" => Some(Self::TurnOn),
            "turnOff" => Some(Self::TurnOff),
            "setBrightness" => Some(Self::SetBrightness),
            _ => None,
        }
    }
}

/// Adapter for Kasa plugs
pub struct KasaAdapter {
    devices: Arc<DeviceCache>,
    transport: Arc<dyn KasaTransport>,
    port: u16,
}

impl KasaAdapter {
    /// Create an adapter over the given cache and transport
    pub fn new(devices: Arc<DeviceCache>, transport: Arc<dyn KasaTransport>) -> Self {
        Self {
            devices,
            transport,
            port: DEFAULT_PORT,
        }
    }

    /// Set the port used for plugs polled by host alone
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Normalize a sysinfo block into a device record
    pub fn to_device(info: &SysInfo, host: &str, port: u16) -> Device {
        Device {
            id: info.device_id.clone(),
            name: info.alias.clone(),
            vendor: VENDOR.to_string(),
            device_type: info.dev_name.clone(),
            status: if info.relay_state == 1 {
                STATUS_ON
            } else {
                STATUS_OFF
            }
            .to_string(),
            on_ac_power: true,
            has_brightness: info.brightness.is_some_and(|b| b > 0),
            brightness: info.brightness.filter(|b| *b > 0),
            has_volume: false,
            volume: None,
            on_time: info.on_time,
            last_updated: 0,
            ip: Some(host.to_string()),
            port: Some(port),
        }
    }

    /// Record an observed plug in the device cache
    #[instrument(skip(self, info), fields(device_id = %info.device_id))]
    pub async fn ingest(&self, info: &SysInfo, host: &str, port: u16) -> KasaResult<Device> {
        let device = Self::to_device(info, host, port);
        info!(name = %device.name, "Updating Kasa device");
        self.devices.upsert(device.clone()).await?;
        Ok(device)
    }

    /// Ask a plug for its sysinfo and ingest it
    #[instrument(skip(self))]
    pub async fn poll(&self, host: &str) -> KasaResult<Device> {
        let reply = self
            .transport
            .request(host, self.port, &protocol::get_sysinfo())
            .await?;
        let block = protocol::command_reply(&reply, "get_sysinfo")
            .ok_or_else(|| KasaError::Protocol("reply has no get_sysinfo block".to_string()))?;
        let info: SysInfo = serde_json::from_value(block.clone())?;
        if info.err_code != 0 {
            return Err(KasaError::Device(info.err_code));
        }
        self.ingest(&info, host, self.port).await
    }

    async fn set_power(&self, device: &Device, on: bool) -> KasaResult<()> {
        let host = device.ip.as_deref().ok_or(KasaError::NoAddress)?;
        let port = device.port.unwrap_or(self.port);

        let reply = self
            .transport
            .request(host, port, &protocol::set_relay_state(on))
            .await?;
        let code = protocol::command_reply(&reply, "set_relay_state")
            .and_then(|r| r.get("err_code"))
            .and_then(|c| c.as_i64())
            .unwrap_or(0);
        if code != 0 {
            return Err(KasaError::Device(code));
        }

        // Record our own write so a repeated request is a no-op until the next poll
        let mut updated = device.clone();
        updated.status = if on { STATUS_ON } else { STATUS_OFF }.to_string();
        updated.last_updated = 0;
        if let Err(e) = self.devices.upsert(updated).await {
            warn!(device_id = %device.id, error = %e, "Failed to record new relay state");
        }
        Ok(())
    }

    async fn switch(&self, device: &Device, on: bool) -> ActionOutcome {
        let verb = if on { "turn on" } else { "turn off" };

        let current = match self.devices.get_by_id(&device.id) {
            Ok(current) => current,
            Err(e) => {
                return ActionOutcome::no_op(format!(
                    "error: {} for device {} : noOp",
                    e, device.id
                ))
            }
        };

        let already = if on { current.is_on() } else { current.is_off() };
        if already {
            return ActionOutcome::no_op(format!(
                "{} | {} {} request noOp",
                device.name, device.id, verb
            ));
        }

        match self.set_power(&current, on).await {
            Ok(()) => ActionOutcome::applied(format!("{} | {} {}", device.name, device.id, verb)),
            Err(e) => {
                warn!(device_id = %device.id, error = %e, "Kasa request failed");
                ActionOutcome::no_op(format!(
                    "error: {} failed for device {}: {} : noOp",
                    verb, device.id, e
                ))
            }
        }
    }
}

#[async_trait]
impl VendorAdapter for KasaAdapter {
    fn vendor(&self) -> &str {
        VENDOR
    }

    #[instrument(skip(self, device, action_value), fields(device_id = %device.id))]
    async fn perform_action(
        &self,
        device: &Device,
        action: &str,
        action_value: &TriggerValue,
    ) -> ActionOutcome {
        info!(%action, %action_value, "Requested Kasa action");

        match KasaAction::parse(action) {
            Some(KasaAction::TurnOn) => self.switch(device, true).await,
            Some(KasaAction::TurnOff) => self.switch(device, false).await,
            Some(KasaAction::SetBrightness) => ActionOutcome::no_op(format!(
                "Request to set brightness for {} not yet implemented",
                device.name
            )),
            None => {
                debug!(%action, "Unknown Kasa action");
                ActionOutcome::no_op(format!(
                    "error: unexpected action {} for device {} : noOp",
                    action, device.id
                ))
            }
        }
    }
}

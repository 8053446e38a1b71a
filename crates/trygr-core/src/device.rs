//! Normalized device record shared by every vendor adapter

use serde::{Deserialize, Serialize};

/// Status value vendors report for a powered device
pub const STATUS_ON: &str = "on";

/// Status value vendors report for an unpowered device
pub const STATUS_OFF: &str = "off";

/// The latest known snapshot of a device
///
/// Adapters build a complete record on every observation; the device cache
/// replaces the stored record wholesale, so no field is ever merged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Device {
    /// Identifier, unique within the vendor namespace
    pub id: String,

    /// Display name (the vendor alias)
    #[serde(default)]
    pub name: String,

    /// Vendor tag; selects the adapter that owns this device
    pub vendor: String,

    /// Coarse type tag (e.g., "Smart Wi-Fi Plug")
    #[serde(rename = "type", default)]
    pub device_type: String,

    /// On/off or fault status; values are vendor-defined
    #[serde(default)]
    pub status: String,

    /// Whether the device runs on mains power
    #[serde(rename = "onACPower", default)]
    pub on_ac_power: bool,

    #[serde(default)]
    pub has_brightness: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub brightness: Option<u32>,

    #[serde(default)]
    pub has_volume: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub volume: Option<u32>,

    /// Cumulative on-time in seconds
    #[serde(default)]
    pub on_time: u64,

    /// When the record was observed (epoch seconds, 0 if unknown)
    #[serde(default)]
    pub last_updated: i64,

    /// Local address, for adapters that control devices over the LAN
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ip: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
}

impl Device {
    /// Create a record with the required identity fields and everything else empty
    pub fn new(id: impl Into<String>, vendor: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: String::new(),
            vendor: vendor.into(),
            device_type: String::new(),
            status: String::new(),
            on_ac_power: false,
            has_brightness: false,
            brightness: None,
            has_volume: false,
            volume: None,
            on_time: 0,
            last_updated: 0,
            ip: None,
            port: None,
        }
    }

    /// Set the display name
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Set the status
    pub fn with_status(mut self, status: impl Into<String>) -> Self {
        self.status = status.into();
        self
    }

    /// Set the LAN address
    pub fn with_address(mut self, ip: impl Into<String>, port: u16) -> Self {
        self.ip = Some(ip.into());
        self.port = Some(port);
        self
    }

    /// Check if the device reports itself as on
    pub fn is_on(&self) -> bool {
        self.status == STATUS_ON
    }

    /// Check if the device reports itself as off
    pub fn is_off(&self) -> bool {
        self.status == STATUS_OFF
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_device_wire_names() {
        let device = Device::new("D1", "kasa")
            .with_name("Porch heater")
            .with_status(STATUS_ON);

        let json = serde_json::to_value(&device).unwrap();
        assert_eq!(json["onACPower"], false);
        assert_eq!(json["type"], "");
        assert_eq!(json["lastUpdated"], 0);
        assert!(json.get("brightness").is_none());
        assert!(device.is_on());
        assert!(!device.is_off());
    }

    #[test]
    fn test_device_minimal_payload() {
        let device: Device =
            serde_json::from_str(r#"{"id": "D1", "vendor": "kasa", "status": "off"}"#).unwrap();

        assert_eq!(device.id, "D1");
        assert!(device.is_off());
        assert_eq!(device.ip, None);
    }
}

//! Trigger definition types
//!
//! A trigger ties a condition on an incoming signal to an action on one
//! device. Definitions are immutable once stored; the store assigns the id.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Kind of condition a trigger watches
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TriggerKind {
    /// Fires on another device reaching a state
    Device,
    /// Fires at a fixed point in time
    AbsoluteTime,
    /// Fires relative to a solar event (sunrise, sunset) plus an offset
    RelativeTime,
    /// Fires when the temperature drops to or below the threshold
    MinTemp,
    /// Fires when the temperature rises to or above the threshold
    MaxTemp,
}

impl TriggerKind {
    /// All kinds, in declaration order
    pub const ALL: [TriggerKind; 5] = [
        TriggerKind::Device,
        TriggerKind::AbsoluteTime,
        TriggerKind::RelativeTime,
        TriggerKind::MinTemp,
        TriggerKind::MaxTemp,
    ];

    /// Wire name of the kind
    pub fn as_str(&self) -> &'static str {
        match self {
            TriggerKind::Device => "device",
            TriggerKind::AbsoluteTime => "absoluteTime",
            TriggerKind::RelativeTime => "relativeTime",
            TriggerKind::MinTemp => "minTemp",
            TriggerKind::MaxTemp => "maxTemp",
        }
    }

    /// Whether the kind is evaluated against temperature readings
    pub fn is_temperature(&self) -> bool {
        matches!(self, TriggerKind::MinTemp | TriggerKind::MaxTemp)
    }
}

impl fmt::Display for TriggerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when a string is not a known trigger kind
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown trigger type: {0}")]
pub struct ParseTriggerKindError(pub String);

impl FromStr for TriggerKind {
    type Err = ParseTriggerKindError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        TriggerKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| ParseTriggerKindError(s.to_string()))
    }
}

/// Threshold or action parameter: a number or a string, depending on kind
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TriggerValue {
    Number(serde_json::Number),
    Text(String),
}

impl TriggerValue {
    /// Build a numeric value; `None` for NaN or infinite input
    pub fn number(value: f64) -> Option<Self> {
        serde_json::Number::from_f64(value).map(TriggerValue::Number)
    }

    /// Numeric view of the value, if it is a number
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            TriggerValue::Number(n) => n.as_f64(),
            TriggerValue::Text(_) => None,
        }
    }

    /// String view of the value, if it is text
    pub fn as_str(&self) -> Option<&str> {
        match self {
            TriggerValue::Number(_) => None,
            TriggerValue::Text(s) => Some(s),
        }
    }
}

impl fmt::Display for TriggerValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TriggerValue::Number(n) => write!(f, "{}", n),
            TriggerValue::Text(s) => f.write_str(s),
        }
    }
}

impl From<i64> for TriggerValue {
    fn from(value: i64) -> Self {
        TriggerValue::Number(value.into())
    }
}

impl From<&str> for TriggerValue {
    fn from(value: &str) -> Self {
        TriggerValue::Text(value.to_string())
    }
}

impl From<String> for TriggerValue {
    fn from(value: String) -> Self {
        TriggerValue::Text(value)
    }
}

/// An operator-defined trigger
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TriggerDefinition {
    /// Device the action is performed on
    pub affected_device_id: String,

    pub trigger_type: TriggerKind,

    /// Threshold, typed per kind (number for temperatures and absolute
    /// time, device state or solar event name otherwise)
    pub trigger_value: TriggerValue,

    /// Offset in seconds, used by relative-time triggers
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trigger_offset: Option<i64>,

    /// Action verb understood by the device's vendor adapter
    pub action: String,

    pub action_value: TriggerValue,

    /// Device to act on next; stored but not evaluated
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chain_device_id: Option<String>,

    /// Notification recipients
    #[serde(default)]
    pub notify: Vec<String>,
}

impl TriggerDefinition {
    /// Create a definition without offset, chain, or recipients
    pub fn new(
        affected_device_id: impl Into<String>,
        trigger_type: TriggerKind,
        trigger_value: TriggerValue,
        action: impl Into<String>,
        action_value: TriggerValue,
    ) -> Self {
        Self {
            affected_device_id: affected_device_id.into(),
            trigger_type,
            trigger_value,
            trigger_offset: None,
            action: action.into(),
            action_value,
            chain_device_id: None,
            notify: Vec::new(),
        }
    }

    /// Add notification recipients
    pub fn with_notify<I, S>(mut self, recipients: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.notify = recipients.into_iter().map(Into::into).collect();
        self
    }

    /// Set the offset used by relative-time triggers
    pub fn with_offset(mut self, seconds: i64) -> Self {
        self.trigger_offset = Some(seconds);
        self
    }
}

/// A stored trigger with the id the store assigned to it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TriggerEntry {
    pub id: String,
    pub data: TriggerDefinition,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_trigger_kind_names() {
        for kind in TriggerKind::ALL {
            assert_eq!(kind.as_str().parse::<TriggerKind>().unwrap(), kind);
            assert_eq!(serde_json::to_value(kind).unwrap(), json!(kind.as_str()));
        }
        assert!("hourly".parse::<TriggerKind>().is_err());
        assert!(TriggerKind::MinTemp.is_temperature());
        assert!(!TriggerKind::RelativeTime.is_temperature());
    }

    #[test]
    fn test_definition_from_operator_payload() {
        let def: TriggerDefinition = serde_json::from_value(json!({
            "affectedDeviceId": "D1",
            "triggerType": "minTemp",
            "triggerValue": 40,
            "action": "turnOn",
            "actionValue": "true",
            "notify": ["a@b.com"]
        }))
        .unwrap();

        assert_eq!(def.trigger_type, TriggerKind::MinTemp);
        assert_eq!(def.trigger_value.as_f64(), Some(40.0));
        assert_eq!(def.action_value.as_str(), Some("true"));
        assert_eq!(def.notify, vec!["a@b.com".to_string()]);

        // integers stay integers on the way back out
        let back = serde_json::to_value(&def).unwrap();
        assert_eq!(back["triggerValue"], json!(40));
        assert!(back.get("chainDeviceId").is_none());
    }

    #[test]
    fn test_trigger_value_display() {
        assert_eq!(TriggerValue::from(1).to_string(), "1");
        assert_eq!(TriggerValue::from("sunset").to_string(), "sunset");
        assert!(TriggerValue::number(f64::NAN).is_none());
        assert_eq!(TriggerValue::number(35.5).unwrap().as_f64(), Some(35.5));
    }
}

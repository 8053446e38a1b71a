//! Kasa LAN protocol codec
//!
//! Kasa plugs speak JSON over TCP, obfuscated with an autokey XOR cipher
//! seeded with 171 and prefixed by a 4-byte big-endian payload length.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

const INITIAL_KEY: u8 = 171;

/// Length of the big-endian length prefix
pub const HEADER_LEN: usize = 4;

/// Obfuscate a plaintext payload
pub fn encrypt(plain: &[u8]) -> Vec<u8> {
    let mut key = INITIAL_KEY;
    plain
        .iter()
        .map(|b| {
            key ^= b;
            key
        })
        .collect()
}

/// Reverse [`encrypt`]
pub fn decrypt(cipher: &[u8]) -> Vec<u8> {
    let mut key = INITIAL_KEY;
    cipher
        .iter()
        .map(|c| {
            let b = key ^ c;
            key = *c;
            b
        })
        .collect()
}

/// Encrypt a payload and prepend its length
pub fn frame(plain: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(HEADER_LEN + plain.len());
    out.extend_from_slice(&(plain.len() as u32).to_be_bytes());
    out.extend(encrypt(plain));
    out
}

/// Request the system info block
pub fn get_sysinfo() -> Value {
    json!({ "system": { "get_sysinfo": {} } })
}

/// Switch the relay
pub fn set_relay_state(on: bool) -> Value {
    json!({ "system": { "set_relay_state": { "state": u8::from(on) } } })
}

/// System info reported by a plug
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SysInfo {
    #[serde(rename = "deviceId")]
    pub device_id: String,

    #[serde(default)]
    pub alias: String,

    #[serde(default)]
    pub dev_name: String,

    #[serde(default)]
    pub model: String,

    #[serde(default)]
    pub relay_state: u8,

    #[serde(default)]
    pub on_time: u64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub brightness: Option<u32>,

    #[serde(default)]
    pub err_code: i64,
}

/// Pull the `system.<command>` block out of a response
pub fn command_reply<'a>(response: &'a Value, command: &str) -> Option<&'a Value> {
    response.get("system").and_then(|s| s.get(command))
}

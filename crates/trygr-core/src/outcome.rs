//! Result of asking a vendor adapter to perform an action

use serde::{Deserialize, Serialize};

/// What an adapter reports after an action request
///
/// Adapters never fail past their boundary: an internal failure is reported
/// as a no-op whose `result_text` explains what went wrong.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionOutcome {
    /// Human-readable description, forwarded to notification recipients
    pub result_text: String,

    /// True when the action changed nothing; suppresses notification
    pub no_op: bool,
}

impl ActionOutcome {
    /// The action changed the device's state
    pub fn applied(result_text: impl Into<String>) -> Self {
        Self {
            result_text: result_text.into(),
            no_op: false,
        }
    }

    /// The action changed nothing (already in state, unsupported, or failed)
    pub fn no_op(result_text: impl Into<String>) -> Self {
        Self {
            result_text: result_text.into(),
            no_op: true,
        }
    }
}

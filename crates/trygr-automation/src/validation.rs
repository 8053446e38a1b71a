//! Trigger definition validation
//!
//! Raw JSON is checked against [`trigger_schema`] first; a definition that
//! deserializes is then checked per kind, since the schema alone allows a
//! text threshold on a temperature trigger.

use crate::{TriggerError, TriggerResult};
use jsonschema::JSONSchema;
use serde_json::{json, Value};
use std::sync::OnceLock;
use trygr_core::{TriggerDefinition, TriggerKind};

/// JSON schema for a trigger create request
pub fn trigger_schema() -> Value {
    json!({
        "type": "object",
        "required": ["affectedDeviceId", "triggerType", "triggerValue", "action", "actionValue"],
        "properties": {
            "affectedDeviceId": { "type": "string", "pattern": "^[A-Za-z0-9]+$" },
            "triggerType": { "type": "string", "pattern": "^[A-Za-z0-9]+$" },
            "triggerValue": { "type": ["string", "number"] },
            "triggerOffset": { "type": "integer" },
            "action": { "type": "string", "pattern": "^[A-Za-z0-9]+$" },
            "actionValue": { "type": ["string", "number"] },
            "chainDeviceId": { "type": "string" },
            "notify": { "type": "array", "items": { "type": "string" } }
        }
    })
}

static COMPILED_SCHEMA: OnceLock<Result<JSONSchema, String>> = OnceLock::new();

/// The trigger schema, compiled on first use
fn compiled_schema() -> TriggerResult<&'static JSONSchema> {
    COMPILED_SCHEMA
        .get_or_init(|| JSONSchema::compile(&trigger_schema()).map_err(|e| e.to_string()))
        .as_ref()
        .map_err(|e| TriggerError::Validation(format!("schema: {e}")))
}

/// Validate a raw create request and convert it to a definition
pub fn validate_value(value: &Value) -> TriggerResult<TriggerDefinition> {
    let compiled = compiled_schema()?;

    if let Err(errors) = compiled.validate(value) {
        let messages: Vec<String> = errors.map(|e| e.to_string()).collect();
        return Err(TriggerError::Validation(messages.join("; ")));
    }

    let definition: TriggerDefinition = serde_json::from_value(value.clone())
        .map_err(|e| TriggerError::Validation(e.to_string()))?;
    validate_definition(&definition)?;
    Ok(definition)
}

/// Check the typed fields of a definition
pub fn validate_definition(definition: &TriggerDefinition) -> TriggerResult<()> {
    if !is_alnum(&definition.affected_device_id) {
        return Err(TriggerError::Validation(
            "affectedDeviceId must be a non-empty alphanumeric string".to_string(),
        ));
    }
    if !is_alnum(&definition.action) {
        return Err(TriggerError::Validation(
            "action must be a non-empty alphanumeric string".to_string(),
        ));
    }

    let kind = definition.trigger_type;
    match kind {
        TriggerKind::MinTemp | TriggerKind::MaxTemp | TriggerKind::AbsoluteTime => {
            if definition.trigger_value.as_f64().is_none() {
                return Err(TriggerError::Validation(format!(
                    "triggerValue for {kind} must be a number"
                )));
            }
        }
        TriggerKind::Device | TriggerKind::RelativeTime => {
            if definition.trigger_value.as_str().is_none() {
                return Err(TriggerError::Validation(format!(
                    "triggerValue for {kind} must be a string"
                )));
            }
        }
    }

    Ok(())
}

fn is_alnum(s: &str) -> bool {
    !s.is_empty() && s.chars().all(|c| c.is_ascii_alphanumeric())
}

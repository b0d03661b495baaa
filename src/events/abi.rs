//! Pulls the event catalog out of a raw ABI JSON array.

use serde_json::Value;

use crate::error::{RegistryError, Result};
use crate::events::EventDefinition;

const EVENT_TAG: &str = "event";

/// Returns every `"type": "event"` entry of `raw` as an [`EventDefinition`].
///
/// Functions, constructors, errors and anything else are skipped. An event
/// entry that is missing its name or inputs is rejected as a whole.
pub fn extract_events(raw: &[Value]) -> Result<Vec<EventDefinition>> {
    let mut events = Vec::new();

    for (index, entry) in raw.iter().enumerate() {
        let object = entry.as_object().ok_or_else(|| {
            RegistryError::MalformedInterface(format!("entry {} is not an object", index))
        })?;

        if object.get("type").and_then(Value::as_str) != Some(EVENT_TAG) {
            continue;
        }

        let event: EventDefinition = serde_json::from_value(entry.clone()).map_err(|e| {
            RegistryError::MalformedInterface(format!("event entry {}: {}", index, e))
        })?;
        events.push(event);
    }

    Ok(events)
}

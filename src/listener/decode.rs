use alloy::dyn_abi::{DynSolValue, EventExt};
use alloy::json_abi::Event;
use alloy::primitives::{hex, B256};
use serde_json::Value;

use crate::error::{RegistryError, Result};

/// Parses the event entries of a raw ABI into alloy events.
///
/// `anonymous` and `indexed` are optional in ABI JSON, but alloy insists on
/// them, so absent flags are filled in as `false` first. Other entry kinds are
/// skipped.
pub fn contract_events(raw: &[Value]) -> Result<Vec<Event>> {
    let mut events = Vec::new();

    for (index, entry) in raw.iter().enumerate() {
        let Some(object) = entry.as_object() else {
            continue;
        };
        if object.get("type").and_then(Value::as_str) != Some("event") {
            continue;
        }

        let mut object = object.clone();
        object.entry("anonymous").or_insert(Value::Bool(false));
        if let Some(Value::Array(inputs)) = object.get_mut("inputs") {
            for input in inputs.iter_mut().filter_map(Value::as_object_mut) {
                input.entry("indexed").or_insert(Value::Bool(false));
            }
        }

        let event: Event = serde_json::from_value(Value::Object(object)).map_err(|e| {
            RegistryError::MalformedInterface(format!("event entry {}: {}", index, e))
        })?;
        events.push(event);
    }

    Ok(events)
}

/// True when an anonymous listener is looking at a log that belongs to one of
/// the contract's named events.
///
/// Anonymous events carry no selector topic, so their subscription sees every
/// log of the contract; a log whose first topic is a known selector was
/// emitted by something else even if its layout happens to decode.
pub fn is_foreign_log(event: &Event, topics: &[B256], named_selectors: &[B256]) -> bool {
    event.anonymous && topics.first().is_some_and(|t| named_selectors.contains(t))
}

/// Decodes a raw log into one rendered string per declared input, in ABI order.
pub fn decode_event(
    event: &Event,
    topics: &[B256],
    data: &[u8],
) -> std::result::Result<Vec<String>, alloy::dyn_abi::Error> {
    let decoded = event.decode_log_parts(topics.iter().copied(), data, true)?;

    // indexed and body values come back split; stitch them into declaration order
    let mut indexed = decoded.indexed.iter();
    let mut body = decoded.body.iter();

    Ok(event
        .inputs
        .iter()
        .map(|input| {
            let value = if input.indexed { indexed.next() } else { body.next() };
            value.map(format_value).unwrap_or_default()
        })
        .collect())
}

pub fn format_value(value: &DynSolValue) -> String {
    match value {
        DynSolValue::Address(addr) => addr.to_checksum(None),
        DynSolValue::FixedBytes(bytes, size) => format!("0x{}", hex::encode(&bytes[..*size])),
        DynSolValue::Bytes(bytes) => format!("0x{}", hex::encode(bytes)),
        DynSolValue::Int(num, _) => num.to_string(),
        DynSolValue::Uint(num, _) => num.to_string(),
        DynSolValue::Bool(b) => b.to_string(),
        DynSolValue::String(s) => s.clone(),
        DynSolValue::Array(items) | DynSolValue::FixedArray(items) => {
            format!("[{}]", join(items))
        }
        DynSolValue::Tuple(items) => format!("({})", join(items)),
        other => format!("{:?}", other),
    }
}

fn join(items: &[DynSolValue]) -> String {
    items.iter().map(format_value).collect::<Vec<_>>().join(", ")
}

//! Depth-capped canonical serialization for capture payloads.
//!
//! Captured inputs and outputs are arbitrary JSON trees assembled from live
//! pipeline values. [`depth_capped`] walks them and replaces anything nested
//! deeper than [`MAX_DEPTH`] levels with a placeholder string, so a capture
//! record can never blow up on a pathological value. Key order is stable
//! because `serde_json`'s map is ordered by key.

use serde_json::Value;

/// Maximum nesting depth preserved in capture records.
pub const MAX_DEPTH: usize = 10;

/// Placeholder substituted for over-depth subtrees.
pub const DEPTH_PLACEHOLDER: &str = "<max_depth_exceeded>";

/// Return `value` with all subtrees below [`MAX_DEPTH`] replaced by
/// [`DEPTH_PLACEHOLDER`].
#[must_use]
pub fn depth_capped(value: &Value) -> Value {
    cap(value, 0)
}

fn cap(value: &Value, depth: usize) -> Value {
    if depth >= MAX_DEPTH {
        return Value::String(DEPTH_PLACEHOLDER.to_string());
    }
    match value {
        Value::Array(items) => Value::Array(items.iter().map(|v| cap(v, depth + 1)).collect()),
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(k, v)| (k.clone(), cap(v, depth + 1)))
                .collect(),
        ),
        scalar => scalar.clone(),
    }
}

/// Serialize any serde value into a depth-capped capture payload.
///
/// Values that fail to serialize (which none of the pipeline's own types do)
/// degrade to their type name rather than poisoning the record.
pub fn capture_value<T: serde::Serialize>(value: &T) -> Value {
    match serde_json::to_value(value) {
        Ok(v) => depth_capped(&v),
        Err(_) => Value::String(format!("<unserializable: {}>", std::any::type_name::<T>())),
    }
}

//! Shared utilities: JSON extraction from LLM replies and Arabic text helpers.

pub mod arabic;
pub mod json_ext;

use rustc_hash::FxHashMap;
use serde_json::Value;

/// Construct the map type used for context values and capture payloads.
#[must_use]
pub fn new_value_map() -> FxHashMap<String, Value> {
    FxHashMap::default()
}

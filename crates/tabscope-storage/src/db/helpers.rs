//! JSON conversions for stored records.

use anyhow::{Context, Result};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;

/// Decode a stored value, naming the key on failure
pub fn decode<T: DeserializeOwned>(key: &str, value: Value) -> Result<T> {
    serde_json::from_value(value).with_context(|| format!("Failed to decode stored '{key}'"))
}

/// Encode a record for storage, naming the key on failure
pub fn encode<T: Serialize>(key: &str, record: &T) -> Result<Value> {
    serde_json::to_value(record).with_context(|| format!("Failed to encode '{key}'"))
}

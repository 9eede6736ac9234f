//! Record metadata
//!
//! Metadata is an ordered map of string keys to tagged scalars. The engine
//! never interprets it; it is stored, persisted and returned with search hits.
//!
//! Only scalar values are supported. Arrays, objects and null are rejected at
//! the boundary so the snapshot encoding stays self-describing.

use crate::error::{VecdexError, VecdexResult};
use crate::limits::{MAX_METADATA_ENTRIES, MAX_METADATA_KEY_BYTES, MAX_METADATA_STRING_BYTES};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::collections::BTreeMap;

/// Metadata attached to a record
///
/// BTreeMap keeps key order stable, which makes snapshot bytes deterministic.
pub type Metadata = BTreeMap<String, MetadataValue>;

/// Tagged scalar metadata value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetadataValue {
    /// Boolean value
    Bool(bool),
    /// Numeric value (stored as f64)
    Number(f64),
    /// String value
    String(String),
}

impl MetadataValue {
    /// Snapshot tag byte for this variant
    pub fn tag(&self) -> u8 {
        match self {
            MetadataValue::String(_) => 0,
            MetadataValue::Number(_) => 1,
            MetadataValue::Bool(_) => 2,
        }
    }

    /// Get as string slice if this is a string
    pub fn as_str(&self) -> Option<&str> {
        match self {
            MetadataValue::String(s) => Some(s),
            _ => None,
        }
    }

    /// Get as f64 if this is a number
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            MetadataValue::Number(n) => Some(*n),
            _ => None,
        }
    }

    /// Get as bool if this is a boolean
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            MetadataValue::Bool(b) => Some(*b),
            _ => None,
        }
    }
}

impl From<bool> for MetadataValue {
    fn from(b: bool) -> Self {
        MetadataValue::Bool(b)
    }
}

impl From<i32> for MetadataValue {
    fn from(n: i32) -> Self {
        MetadataValue::Number(n as f64)
    }
}

impl From<i64> for MetadataValue {
    fn from(n: i64) -> Self {
        MetadataValue::Number(n as f64)
    }
}

impl From<f64> for MetadataValue {
    fn from(n: f64) -> Self {
        MetadataValue::Number(n)
    }
}

impl From<&str> for MetadataValue {
    fn from(s: &str) -> Self {
        MetadataValue::String(s.to_string())
    }
}

impl From<String> for MetadataValue {
    fn from(s: String) -> Self {
        MetadataValue::String(s)
    }
}

impl TryFrom<JsonValue> for MetadataValue {
    type Error = VecdexError;

    fn try_from(value: JsonValue) -> VecdexResult<Self> {
        match value {
            JsonValue::Bool(b) => Ok(MetadataValue::Bool(b)),
            JsonValue::Number(n) => n.as_f64().map(MetadataValue::Number).ok_or_else(|| {
                VecdexError::invalid_argument(format!("metadata number {} is not representable", n))
            }),
            JsonValue::String(s) => Ok(MetadataValue::String(s)),
            JsonValue::Null => Err(VecdexError::invalid_argument(
                "metadata values cannot be null",
            )),
            JsonValue::Array(_) | JsonValue::Object(_) => Err(VecdexError::invalid_argument(
                "metadata values must be scalars (string, number or boolean)",
            )),
        }
    }
}

impl From<MetadataValue> for JsonValue {
    fn from(value: MetadataValue) -> Self {
        match value {
            MetadataValue::Bool(b) => JsonValue::Bool(b),
            // Non-finite numbers have no JSON spelling
            MetadataValue::Number(n) => serde_json::Number::from_f64(n)
                .map(JsonValue::Number)
                .unwrap_or(JsonValue::Null),
            MetadataValue::String(s) => JsonValue::String(s),
        }
    }
}

/// Convert a JSON object into validated metadata
///
/// # Errors
///
/// `InvalidArgument` if the value is not an object, contains non-scalar
/// values, or exceeds the metadata limits.
pub fn metadata_from_json(value: JsonValue) -> VecdexResult<Metadata> {
    let JsonValue::Object(map) = value else {
        return Err(VecdexError::invalid_argument(
            "metadata must be a JSON object",
        ));
    };
    let metadata = map
        .into_iter()
        .map(|(k, v)| MetadataValue::try_from(v).map(|v| (k, v)))
        .collect::<VecdexResult<Metadata>>()?;
    validate_metadata(&metadata)?;
    Ok(metadata)
}

/// Convert metadata into a JSON object
pub fn metadata_to_json(metadata: &Metadata) -> JsonValue {
    JsonValue::Object(
        metadata
            .iter()
            .map(|(k, v)| (k.clone(), JsonValue::from(v.clone())))
            .collect(),
    )
}

/// Check metadata against the hard limits
pub fn validate_metadata(metadata: &Metadata) -> VecdexResult<()> {
    if metadata.len() > MAX_METADATA_ENTRIES {
        return Err(VecdexError::invalid_argument(format!(
            "metadata has {} entries, max {}",
            metadata.len(),
            MAX_METADATA_ENTRIES
        )));
    }
    for (key, value) in metadata {
        if key.len() > MAX_METADATA_KEY_BYTES {
            return Err(VecdexError::invalid_argument(format!(
                "metadata key exceeds {} bytes",
                MAX_METADATA_KEY_BYTES
            )));
        }
        if let MetadataValue::String(s) = value {
            if s.len() > MAX_METADATA_STRING_BYTES {
                return Err(VecdexError::invalid_argument(format!(
                    "metadata value for '{}' exceeds {} bytes",
                    key, MAX_METADATA_STRING_BYTES
                )));
            }
        }
    }
    Ok(())
}

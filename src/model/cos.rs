//! Tagged JSON representation of the PDF object graph.

use base64::Engine;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Name written in place of a container that is re-entered while it is
/// still being serialized.
pub const CIRCULAR_MARKER: &str = "__circular__";

/// Node kind of a [`CosValue`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CosValueType {
    Null,
    Boolean,
    Integer,
    Float,
    Name,
    String,
    Array,
    Dictionary,
    Stream,
}

/// A single node of the serialized object graph.
///
/// Scalars carry their payload in `value` (strings as base64), arrays in
/// `items`, dictionaries in `entries` and streams in `stream`. The payload is
/// kept loosely typed so that a malformed node can be detected and dropped
/// on the way back instead of failing the whole document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CosValue {
    /// Node kind
    #[serde(rename = "type")]
    pub value_type: CosValueType,

    /// Scalar payload
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<serde_json::Value>,

    /// Array items
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub items: Option<Vec<CosValue>>,

    /// Dictionary entries
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entries: Option<BTreeMap<String, CosValue>>,

    /// Stream payload
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stream: Option<StreamModel>,
}

impl CosValue {
    fn scalar(value_type: CosValueType, value: Option<serde_json::Value>) -> Self {
        Self {
            value_type,
            value,
            items: None,
            entries: None,
            stream: None,
        }
    }

    pub fn null() -> Self {
        Self::scalar(CosValueType::Null, None)
    }

    pub fn boolean(value: bool) -> Self {
        Self::scalar(CosValueType::Boolean, Some(value.into()))
    }

    pub fn integer(value: i64) -> Self {
        Self::scalar(CosValueType::Integer, Some(value.into()))
    }

    pub fn float(value: f32) -> Self {
        let number = serde_json::Number::from_f64(value as f64)
            .map(serde_json::Value::Number)
            .unwrap_or(serde_json::Value::Null);
        Self::scalar(CosValueType::Float, Some(number))
    }

    pub fn name(value: impl Into<String>) -> Self {
        Self::scalar(CosValueType::Name, Some(serde_json::Value::String(value.into())))
    }

    /// A string node; the bytes are stored base64 encoded.
    pub fn string(bytes: &[u8]) -> Self {
        let encoded = base64::engine::general_purpose::STANDARD.encode(bytes);
        Self::scalar(CosValueType::String, Some(serde_json::Value::String(encoded)))
    }

    pub fn array(items: Vec<CosValue>) -> Self {
        Self {
            items: Some(items),
            ..Self::scalar(CosValueType::Array, None)
        }
    }

    pub fn dictionary(entries: BTreeMap<String, CosValue>) -> Self {
        Self {
            entries: Some(entries),
            ..Self::scalar(CosValueType::Dictionary, None)
        }
    }

    pub fn stream(stream: StreamModel) -> Self {
        Self {
            stream: Some(stream),
            ..Self::scalar(CosValueType::Stream, None)
        }
    }

    /// The marker written for a cyclic back-reference.
    pub fn circular() -> Self {
        Self::name(CIRCULAR_MARKER)
    }

    /// Check whether this node is the cyclic back-reference marker.
    pub fn is_circular(&self) -> bool {
        self.value_type == CosValueType::Name && self.as_name() == Some(CIRCULAR_MARKER)
    }

    /// Name payload, if this is a well-formed name node.
    pub fn as_name(&self) -> Option<&str> {
        match (&self.value_type, &self.value) {
            (CosValueType::Name, Some(serde_json::Value::String(s))) => Some(s.as_str()),
            _ => None,
        }
    }

    /// Look up a dictionary entry (or a stream dictionary entry).
    pub fn get(&self, key: &str) -> Option<&CosValue> {
        match self.value_type {
            CosValueType::Dictionary => self.entries.as_ref()?.get(key),
            CosValueType::Stream => self.stream.as_ref()?.dictionary.as_ref()?.get(key),
            _ => None,
        }
    }
}

/// A stream node: its dictionary plus optional raw (still encoded) bytes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamModel {
    /// Stream dictionary entries (Filter, DecodeParms, ...)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dictionary: Option<BTreeMap<String, CosValue>>,

    /// Base64 of the raw stream bytes, exactly as stored in the file
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_data: Option<String>,
}

impl StreamModel {
    /// Check whether the stream carries raw bytes.
    pub fn has_raw_data(&self) -> bool {
        self.raw_data.as_deref().is_some_and(|s| !s.trim().is_empty())
    }
}

//! Object graph codec.
//!
//! Maps lopdf's object graph to the tagged [`CosValue`] model and back.
//! References are followed and inlined on the way out; streams are
//! re-added as indirect objects on the way in.

use crate::model::{CosValue, CosValueType, StreamModel};
use base64::Engine;
use lopdf::{Dictionary, Document, Object, Stream, StringFormat};
use std::collections::{BTreeMap, HashSet};

/// Controls whether raw stream bytes are written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StreamPolicy {
    /// Raw bytes are included.
    #[default]
    Default,
    AnnotationRawData,
    FormFieldRawData,
    ContentStreamsLightweight,
    ResourcesLightweight,
}

impl StreamPolicy {
    /// Every policy except `Default` drops stream bytes.
    pub fn omits_stream_data(self) -> bool {
        self != StreamPolicy::Default
    }
}

/// Identity set of containers on the current serialization path.
///
/// Containers are keyed by address. Objects resolved through the document
/// live in its object table, so a node reached twice through references
/// has the same address both times.
#[derive(Debug, Default)]
pub struct VisitedSet {
    on_path: HashSet<usize>,
}

impl VisitedSet {
    pub fn new() -> Self {
        Self::default()
    }

    fn enter(&mut self, object: &Object) -> bool {
        self.on_path.insert(object as *const Object as usize)
    }

    fn leave(&mut self, object: &Object) {
        self.on_path.remove(&(object as *const Object as usize));
    }

    pub fn is_empty(&self) -> bool {
        self.on_path.is_empty()
    }
}

/// Serialize a node with a fresh visited set.
pub fn serialize(object: &Object, doc: &Document, policy: StreamPolicy) -> Option<CosValue> {
    serialize_value(object, doc, &mut VisitedSet::new(), policy)
}

/// Serialize a node.
///
/// Returns `None` for a reference that cannot be resolved. A container that
/// is re-entered while still on the path becomes the circular marker.
pub fn serialize_value(
    object: &Object,
    doc: &Document,
    visited: &mut VisitedSet,
    policy: StreamPolicy,
) -> Option<CosValue> {
    let object = match object {
        Object::Reference(id) => match doc.get_object(*id) {
            Ok(resolved) => resolved,
            Err(_) => {
                log::trace!("Unresolved reference {:?}", id);
                return None;
            }
        },
        other => other,
    };

    let complex = matches!(
        object,
        Object::Array(_) | Object::Dictionary(_) | Object::Stream(_)
    );
    if complex && !visited.enter(object) {
        return Some(CosValue::circular());
    }

    let value = match object {
        Object::Null => CosValue::null(),
        Object::Boolean(b) => CosValue::boolean(*b),
        Object::Integer(i) => CosValue::integer(*i),
        Object::Real(r) => CosValue::float(*r),
        Object::Name(name) => CosValue::name(String::from_utf8_lossy(name)),
        Object::String(bytes, _) => CosValue::string(bytes),
        Object::Array(items) => CosValue::array(
            items
                .iter()
                .map(|item| {
                    serialize_value(item, doc, visited, policy).unwrap_or_else(CosValue::null)
                })
                .collect(),
        ),
        Object::Dictionary(dict) => {
            CosValue::dictionary(serialize_entries(dict, doc, visited, policy))
        }
        Object::Stream(stream) => {
            CosValue::stream(serialize_stream_with(stream, doc, visited, policy))
        }
        Object::Reference(_) => CosValue::null(),
    };

    if complex {
        visited.leave(object);
    }
    Some(value)
}

fn serialize_entries(
    dict: &Dictionary,
    doc: &Document,
    visited: &mut VisitedSet,
    policy: StreamPolicy,
) -> BTreeMap<String, CosValue> {
    dict.iter()
        .filter_map(|(key, value)| {
            let serialized = serialize_value(value, doc, visited, policy)?;
            Some((String::from_utf8_lossy(key).into_owned(), serialized))
        })
        .collect()
}

/// Serialize a stream node with a fresh visited set.
pub fn serialize_stream(stream: &Stream, doc: &Document, policy: StreamPolicy) -> StreamModel {
    serialize_stream_with(stream, doc, &mut VisitedSet::new(), policy)
}

fn serialize_stream_with(
    stream: &Stream,
    doc: &Document,
    visited: &mut VisitedSet,
    policy: StreamPolicy,
) -> StreamModel {
    let dictionary = serialize_entries(&stream.dict, doc, visited, policy);
    if policy.omits_stream_data() {
        log::trace!("Omitting stream raw data for {:?}", policy);
        return StreamModel {
            dictionary: Some(dictionary),
            raw_data: None,
        };
    }
    let raw_data = (!stream.content.is_empty())
        .then(|| base64::engine::general_purpose::STANDARD.encode(&stream.content));
    StreamModel {
        dictionary: Some(dictionary),
        raw_data,
    }
}

/// Rebuild a node inside `doc`.
///
/// A node whose payload does not match its tag yields `None`. Streams are
/// added to the document and returned as references.
pub fn deserialize(value: &CosValue, doc: &mut Document) -> Option<Object> {
    match value.value_type {
        CosValueType::Null => Some(Object::Null),
        CosValueType::Boolean => value.value.as_ref()?.as_bool().map(Object::Boolean),
        CosValueType::Integer => {
            let number = value.value.as_ref()?;
            number
                .as_i64()
                .or_else(|| number.as_f64().map(|f| f as i64))
                .map(Object::Integer)
        }
        CosValueType::Float => value
            .value
            .as_ref()?
            .as_f64()
            .map(|f| Object::Real(f as f32)),
        CosValueType::Name => value
            .value
            .as_ref()?
            .as_str()
            .map(|name| Object::Name(name.as_bytes().to_vec())),
        CosValueType::String => {
            let encoded = value.value.as_ref()?.as_str()?;
            match base64::engine::general_purpose::STANDARD.decode(encoded) {
                Ok(bytes) => Some(Object::String(bytes, StringFormat::Literal)),
                Err(e) => {
                    log::debug!("Failed to decode string value: {}", e);
                    None
                }
            }
        }
        CosValueType::Array => {
            let items = value
                .items
                .iter()
                .flatten()
                .map(|item| deserialize(item, doc).unwrap_or(Object::Null))
                .collect();
            Some(Object::Array(items))
        }
        CosValueType::Dictionary => {
            let mut dict = Dictionary::new();
            if let Some(entries) = &value.entries {
                fill_dictionary(&mut dict, entries, doc);
            }
            Some(Object::Dictionary(dict))
        }
        CosValueType::Stream => {
            let stream = build_stream_from_model(value.stream.as_ref()?, doc);
            Some(Object::Reference(doc.add_object(stream)))
        }
    }
}

/// Rebuild a dictionary-typed node, or `None` for any other shape.
pub fn deserialize_dictionary(value: &CosValue, doc: &mut Document) -> Option<Dictionary> {
    match deserialize(value, doc)? {
        Object::Dictionary(dict) => Some(dict),
        _ => None,
    }
}

fn fill_dictionary(dict: &mut Dictionary, entries: &BTreeMap<String, CosValue>, doc: &mut Document) {
    for (key, entry) in entries {
        if let Some(object) = deserialize(entry, doc) {
            dict.set(key.as_bytes().to_vec(), object);
        }
    }
}

/// Build a stream from its model: dictionary entries first, then the raw
/// bytes verbatim with a matching `/Length`.
pub fn build_stream_from_model(model: &StreamModel, doc: &mut Document) -> Stream {
    let mut dict = Dictionary::new();
    if let Some(entries) = &model.dictionary {
        fill_dictionary(&mut dict, entries, doc);
    }

    let data = match model.raw_data.as_deref().filter(|s| !s.trim().is_empty()) {
        Some(encoded) => base64::engine::general_purpose::STANDARD
            .decode(encoded)
            .unwrap_or_else(|e| {
                log::debug!("Invalid base64 stream data: {}", e);
                Vec::new()
            }),
        None => Vec::new(),
    };
    dict.set("Length", data.len() as i64);

    let mut stream = Stream::new(dict, data);
    stream.allows_compression = false;
    stream
}

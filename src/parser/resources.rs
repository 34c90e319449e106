//! Page resources and content streams.

use crate::cos::{self, StreamPolicy};
use crate::model::CosValue;
use crate::util::{page_resources, resolve};
use lopdf::{Dictionary, Document, Object, ObjectId};

/// Serialize the page resources without image XObjects.
///
/// Images travel as image elements, so only forms and other XObjects stay.
/// The `XObject` entry is dropped when nothing else is left in it.
pub fn extract_resources(doc: &Document, page_id: ObjectId, policy: StreamPolicy) -> Option<CosValue> {
    let resources = page_resources(doc, page_id)?;
    let filtered = without_image_xobjects(doc, resources);
    cos::serialize(&Object::Dictionary(filtered), doc, policy)
}

fn without_image_xobjects(doc: &Document, resources: &Dictionary) -> Dictionary {
    let mut copy = resources.clone();
    let Some(xobjects) = resources
        .get(b"XObject")
        .ok()
        .and_then(|o| resolve(doc, o).as_dict().ok())
    else {
        return copy;
    };

    let mut kept = Dictionary::new();
    for (name, value) in xobjects.iter() {
        if is_image_xobject(doc, value) {
            log::trace!("Filtered image XObject {}", String::from_utf8_lossy(name));
            continue;
        }
        kept.set(name.clone(), value.clone());
    }
    if kept.is_empty() {
        copy.remove(b"XObject");
    } else {
        copy.set("XObject", kept);
    }
    copy
}

/// Check whether an XObject entry resolves to an image stream.
pub fn is_image_xobject(doc: &Document, object: &Object) -> bool {
    resolve(doc, object)
        .as_stream()
        .ok()
        .and_then(|s| s.dict.get(b"Subtype").ok())
        .and_then(|s| s.as_name().ok())
        == Some(b"Image".as_slice())
}

/// Serialize the page content streams in drawing order.
pub fn extract_content_streams(doc: &Document, page_id: ObjectId) -> Vec<CosValue> {
    let Ok(page) = doc.get_dictionary(page_id) else {
        return Vec::new();
    };
    let Ok(contents) = page.get(b"Contents") else {
        return Vec::new();
    };

    let streams: Vec<&Object> = match resolve(doc, contents) {
        Object::Array(items) => items.iter().collect(),
        Object::Stream(_) => vec![contents],
        _ => Vec::new(),
    };
    streams
        .into_iter()
        .filter(|o| resolve(doc, o).as_stream().is_ok())
        .filter_map(|o| cos::serialize(o, doc, StreamPolicy::Default))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::CosValueType;
    use lopdf::{dictionary, Stream};

    fn document() -> (Document, ObjectId) {
        let mut doc = Document::with_version("1.7");
        let image_id = doc.add_object(Stream::new(
            dictionary! {
                "Type" => "XObject",
                "Subtype" => "Image",
                "Width" => 1,
                "Height" => 1,
                "ColorSpace" => "DeviceGray",
                "BitsPerComponent" => 8,
            },
            vec![0x80],
        ));
        let form_id = doc.add_object(Stream::new(
            dictionary! {
                "Type" => "XObject",
                "Subtype" => "Form",
                "BBox" => vec![0.into(), 0.into(), 10.into(), 10.into()],
            },
            b"0 0 m 10 10 l S".to_vec(),
        ));
        let first = doc.add_object(Stream::new(dictionary! {}, b"q".to_vec()));
        let second = doc.add_object(Stream::new(dictionary! {}, b"Q".to_vec()));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Resources" => dictionary! {
                "XObject" => dictionary! { "Im0" => image_id, "Fm0" => form_id },
                "Font" => dictionary! {},
            },
            "Contents" => vec![first.into(), second.into()],
        });
        (doc, page_id)
    }

    #[test]
    fn test_image_xobjects_are_filtered() {
        let (doc, page_id) = document();
        let resources = extract_resources(&doc, page_id, StreamPolicy::Default).unwrap();
        let xobjects = resources.get("XObject").unwrap();
        assert!(xobjects.get("Fm0").is_some());
        assert!(xobjects.get("Im0").is_none());
    }

    #[test]
    fn test_xobject_entry_dropped_when_only_images() {
        let mut doc = Document::with_version("1.7");
        let image_id = doc.add_object(Stream::new(
            dictionary! { "Subtype" => "Image", "Width" => 1, "Height" => 1 },
            vec![0],
        ));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Resources" => dictionary! { "XObject" => dictionary! { "Im0" => image_id } },
        });
        let resources = extract_resources(&doc, page_id, StreamPolicy::Default).unwrap();
        assert!(resources.get("XObject").is_none());
    }

    #[test]
    fn test_content_streams_in_order() {
        let (doc, page_id) = document();
        let streams = extract_content_streams(&doc, page_id);
        assert_eq!(streams.len(), 2);
        assert!(streams.iter().all(|s| s.value_type == CosValueType::Stream));
    }
}

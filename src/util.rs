//! Small helpers over the lopdf object model.

use crate::error::Result;
use lopdf::{Dictionary, Document, Object, ObjectId, Stream};

static NULL: Object = Object::Null;

/// Follow references (bounded) to the underlying object.
pub fn resolve<'a>(doc: &'a Document, object: &'a Object) -> &'a Object {
    let mut current = object;
    for _ in 0..16 {
        match current {
            Object::Reference(id) => match doc.get_object(*id) {
                Ok(next) => current = next,
                Err(_) => return &NULL,
            },
            other => return other,
        }
    }
    &NULL
}

/// Stream bytes with filters applied; raw bytes when there is no filter
/// or decoding fails.
pub fn stream_bytes(stream: &Stream) -> Vec<u8> {
    if stream.dict.has(b"Filter") {
        match stream.decompressed_content() {
            Ok(data) => data,
            Err(e) => {
                log::debug!("Stream decode failed, using raw bytes: {}", e);
                stream.content.clone()
            }
        }
    } else {
        stream.content.clone()
    }
}

/// Resource dictionary of a page, inherited through `/Parent` when absent.
pub fn page_resources(doc: &Document, page_id: ObjectId) -> Option<&Dictionary> {
    let mut current = doc.get_dictionary(page_id).ok()?;
    for _ in 0..32 {
        if let Ok(resources) = current.get(b"Resources") {
            return resolve(doc, resources).as_dict().ok();
        }
        current = current
            .get(b"Parent")
            .ok()
            .and_then(|p| resolve(doc, p).as_dict().ok())?;
    }
    None
}

/// Inherited page attribute (`MediaBox`, `CropBox`, `Rotate`).
pub fn inherited_attribute<'a>(doc: &'a Document, page_id: ObjectId, key: &[u8]) -> Option<&'a Object> {
    let mut current = doc.get_dictionary(page_id).ok()?;
    for _ in 0..32 {
        if let Ok(value) = current.get(key) {
            return Some(resolve(doc, value));
        }
        current = current
            .get(b"Parent")
            .ok()
            .and_then(|p| resolve(doc, p).as_dict().ok())?;
    }
    None
}

/// Add `name -> id` to a resource category (`Font`, `XObject`) of a page,
/// creating the dictionaries as needed. Indirect dictionaries are edited
/// in place.
pub fn add_page_resource(
    doc: &mut Document,
    page_id: ObjectId,
    category: &str,
    name: &str,
    id: ObjectId,
) -> Result<()> {
    let resources_ref = match doc.get_dictionary(page_id)?.get(b"Resources") {
        Ok(Object::Reference(r)) => Some(*r),
        _ => None,
    };
    let category_ref = {
        let resources = match resources_ref {
            Some(r) => doc.get_dictionary(r).ok(),
            None => doc.get_dictionary(page_id)?.get(b"Resources").and_then(Object::as_dict).ok(),
        };
        match resources.and_then(|r| r.get(category.as_bytes()).ok()) {
            Some(Object::Reference(r)) => Some(*r),
            _ => None,
        }
    };
    if let Some(r) = category_ref {
        doc.get_object_mut(r)
            .and_then(Object::as_dict_mut)?
            .set(name.as_bytes().to_vec(), id);
        return Ok(());
    }

    let resources = match resources_ref {
        Some(r) => doc.get_object_mut(r).and_then(Object::as_dict_mut)?,
        None => {
            let page = doc.get_object_mut(page_id).and_then(Object::as_dict_mut)?;
            if !matches!(page.get(b"Resources"), Ok(Object::Dictionary(_))) {
                page.set("Resources", Dictionary::new());
            }
            page.get_mut(b"Resources").and_then(Object::as_dict_mut)?
        }
    };
    if !matches!(resources.get(category.as_bytes()), Ok(Object::Dictionary(_))) {
        resources.set(category, Dictionary::new());
    }
    resources
        .get_mut(category.as_bytes())
        .and_then(Object::as_dict_mut)?
        .set(name.as_bytes().to_vec(), id);
    Ok(())
}

/// Numeric value of an integer or real object.
pub fn number(object: &Object) -> Option<f32> {
    match object {
        Object::Integer(i) => Some(*i as f32),
        Object::Real(r) => Some(*r),
        _ => None,
    }
}

/// Name value as a string.
pub fn name(object: &Object) -> Option<String> {
    match object {
        Object::Name(n) => Some(String::from_utf8_lossy(n).into_owned()),
        _ => None,
    }
}

/// Numbers of an array object; non-numeric items are skipped.
pub fn number_array(doc: &Document, object: &Object) -> Option<Vec<f32>> {
    match resolve(doc, object) {
        Object::Array(items) => Some(
            items
                .iter()
                .filter_map(|o| number(resolve(doc, o)))
                .collect(),
        ),
        _ => None,
    }
}

/// Decode a PDF text string (UTF-16BE with BOM, UTF-8, else PDFDocEncoding as Latin-1).
pub fn decode_text_string(bytes: &[u8]) -> String {
    if bytes.len() >= 2 && bytes[0] == 0xFE && bytes[1] == 0xFF {
        let utf16: Vec<u16> = bytes[2..]
            .chunks(2)
            .filter(|c| c.len() == 2)
            .map(|c| u16::from_be_bytes([c[0], c[1]]))
            .collect();
        return String::from_utf16_lossy(&utf16);
    }
    if let Ok(s) = std::str::from_utf8(bytes) {
        return s.to_string();
    }
    bytes.iter().map(|&b| b as char).collect()
}

/// Encode a text string, using UTF-16BE only for non-ASCII text.
pub fn encode_text_string(text: &str) -> Vec<u8> {
    if text.chars().all(|c| (c as u32) < 0x80) {
        return text.as_bytes().to_vec();
    }
    let mut out = vec![0xFE, 0xFF];
    for unit in text.encode_utf16() {
        out.extend_from_slice(&unit.to_be_bytes());
    }
    out
}

/// Text string value of a string object.
pub fn text(object: &Object) -> Option<String> {
    match object {
        Object::String(bytes, _) => Some(decode_text_string(bytes)),
        Object::Name(n) => Some(String::from_utf8_lossy(n).into_owned()),
        _ => None,
    }
}

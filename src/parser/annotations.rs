//! Annotations and interactive form fields.

use super::document::pdf_date_to_rfc3339;
use crate::cos::{self, StreamPolicy};
use crate::model::{AnnotationModel, FormFieldModel};
use crate::util::{name, number_array, resolve, text};
use lopdf::{Dictionary, Document, Object, ObjectId};
use std::collections::{HashMap, HashSet};

/// Nesting limit when walking the field tree.
const MAX_FIELD_DEPTH: usize = 32;

/// Annotations of a page. The `/P` back-reference is left out of `rawData`
/// and restored against the new page on the way back.
pub fn extract_annotations(doc: &Document, page_id: ObjectId, policy: StreamPolicy) -> Vec<AnnotationModel> {
    let Ok(page) = doc.get_dictionary(page_id) else {
        return Vec::new();
    };
    let Some(annots) = page
        .get(b"Annots")
        .ok()
        .and_then(|o| resolve(doc, o).as_array().ok())
    else {
        return Vec::new();
    };

    annots
        .iter()
        .filter_map(|annot| match resolve(doc, annot).as_dict() {
            Ok(dict) => Some(annotation_model(doc, dict, policy)),
            Err(_) => {
                log::warn!("Skipping malformed annotation on page {:?}", page_id);
                None
            }
        })
        .collect()
}

fn annotation_model(doc: &Document, dict: &Dictionary, policy: StreamPolicy) -> AnnotationModel {
    let field = |key: &[u8]| dict.get(key).ok().map(|o| resolve(doc, o));
    AnnotationModel {
        subtype: field(b"Subtype").and_then(name),
        contents: field(b"Contents").and_then(text),
        rect: field(b"Rect").and_then(|o| number_array(doc, o)),
        appearance_state: field(b"AS").and_then(name),
        color: field(b"C").and_then(|o| number_array(doc, o)),
        author: field(b"T").and_then(text),
        subject: field(b"Subj").and_then(text),
        creation_date: field(b"CreationDate")
            .and_then(text)
            .and_then(|d| pdf_date_to_rfc3339(&d)),
        modification_date: field(b"M").and_then(text).and_then(|d| pdf_date_to_rfc3339(&d)),
        raw_data: serialize_without(doc, dict, &[b"P"], policy),
    }
}

/// Serialize a copy of `dict` without the given keys.
fn serialize_without(
    doc: &Document,
    dict: &Dictionary,
    skip: &[&[u8]],
    policy: StreamPolicy,
) -> Option<crate::model::CosValue> {
    let mut copy = dict.clone();
    for key in skip {
        copy.remove(key);
    }
    cos::serialize(&Object::Dictionary(copy), doc, policy)
}

/// Top-level fields of the AcroForm.
///
/// Each field keeps its whole subtree in `rawData`. Page and parent
/// back-references are dropped from every node of the subtree; parents are
/// re-linked on restore.
pub fn extract_form_fields(doc: &Document, policy: StreamPolicy) -> Vec<FormFieldModel> {
    let Some(acroform) = acroform(doc) else {
        return Vec::new();
    };
    let Some(fields) = acroform
        .get(b"Fields")
        .ok()
        .and_then(|o| resolve(doc, o).as_array().ok())
    else {
        return Vec::new();
    };

    let page_numbers: HashMap<ObjectId, u32> = doc
        .get_pages()
        .into_iter()
        .map(|(number, id)| (id, number))
        .collect();
    fields
        .iter()
        .filter_map(|field| match resolve(doc, field).as_dict() {
            Ok(dict) => Some(form_field_model(doc, dict, &page_numbers, policy)),
            Err(_) => {
                log::warn!("Skipping malformed form field");
                None
            }
        })
        .collect()
}

fn acroform(doc: &Document) -> Option<&Dictionary> {
    let root = doc.trailer.get(b"Root").ok()?;
    let catalog = resolve(doc, root).as_dict().ok()?;
    resolve(doc, catalog.get(b"AcroForm").ok()?).as_dict().ok()
}

fn form_field_model(
    doc: &Document,
    dict: &Dictionary,
    page_numbers: &HashMap<ObjectId, u32>,
    policy: StreamPolicy,
) -> FormFieldModel {
    let field = |key: &[u8]| dict.get(key).ok().map(|o| resolve(doc, o));
    let partial_name = field(b"T").and_then(text);
    let widget = first_widget(doc, dict);
    let page_number = widget
        .and_then(|w| w.get(b"P").ok())
        .and_then(|p| p.as_reference().ok())
        .and_then(|id| page_numbers.get(&id).copied());
    let rect = widget
        .filter(|_| page_number.is_some())
        .and_then(|w| w.get(b"Rect").ok())
        .and_then(|o| number_array(doc, o));

    let mut visited = HashSet::new();
    let stripped = without_back_references(doc, dict, &mut visited, 0);
    FormFieldModel {
        name: partial_name.clone(),
        partial_name,
        field_type: field(b"FT").and_then(name),
        value: field(b"V").and_then(field_value),
        default_value: field(b"DV").and_then(|dv| match dv {
            Object::String(..) | Object::Name(_) => text(dv),
            _ => None,
        }),
        flags: field(b"Ff").and_then(|o| o.as_i64().ok()),
        alternate_name: field(b"TU").and_then(text),
        mapping_name: field(b"TM").and_then(text),
        page_number,
        rect,
        raw_data: cos::serialize(&Object::Dictionary(stripped), doc, policy),
    }
}

/// First widget of a terminal field: the first kid, or the field itself
/// when field and widget are merged. Fields whose kids are fields have none.
fn first_widget<'a>(doc: &'a Document, field: &'a Dictionary) -> Option<&'a Dictionary> {
    let kids = field
        .get(b"Kids")
        .ok()
        .and_then(|o| resolve(doc, o).as_array().ok());
    match kids {
        Some(kids) if !kids.is_empty() => {
            let first = resolve(doc, &kids[0]).as_dict().ok()?;
            (!first.has(b"T")).then_some(first)
        }
        _ => Some(field),
    }
}

/// Copy of a field node with `/P` and `/Parent` removed, kids inlined.
fn without_back_references(
    doc: &Document,
    dict: &Dictionary,
    visited: &mut HashSet<ObjectId>,
    depth: usize,
) -> Dictionary {
    let mut copy = dict.clone();
    copy.remove(b"P");
    copy.remove(b"Parent");
    if depth >= MAX_FIELD_DEPTH {
        copy.remove(b"Kids");
        return copy;
    }
    let Some(kids) = dict
        .get(b"Kids")
        .ok()
        .and_then(|o| resolve(doc, o).as_array().ok())
    else {
        return copy;
    };
    let mut inlined = Vec::with_capacity(kids.len());
    for kid in kids {
        if let Object::Reference(id) = kid {
            if !visited.insert(*id) {
                continue;
            }
        }
        if let Ok(kid) = resolve(doc, kid).as_dict() {
            inlined.push(Object::Dictionary(without_back_references(doc, kid, visited, depth + 1)));
        }
    }
    copy.set("Kids", inlined);
    copy
}

fn field_value(object: &Object) -> Option<String> {
    match object {
        Object::String(..) | Object::Name(_) => text(object),
        Object::Array(items) => {
            let values: Vec<String> = items.iter().filter_map(text).collect();
            (!values.is_empty()).then(|| values.join(", "))
        }
        Object::Integer(i) => Some(i.to_string()),
        Object::Boolean(b) => Some(b.to_string()),
        _ => None,
    }
}

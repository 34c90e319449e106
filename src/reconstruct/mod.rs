//! Content reconstruction.
//!
//! A page model is applied to a page of the document being built in three
//! possible ways (see [`RegenerateMode`]): its preserved content is kept
//! with the shown strings rewritten in place, its vector operators are kept
//! under freshly drawn text and images, or everything is redrawn.

mod cursor;
mod image;
mod mode;
mod regenerate;
mod rewrite;
mod vector;

pub use cursor::TextElementCursor;
pub use image::{create_image_xobject, image_draw_operations, reconstruct_image_xobjects};
pub use mode::{determine_regenerate_mode, RegenerateMode};
pub use regenerate::{
    add_content_stream, build_font_runs, ensure_fallback_resources, font_matrix_scale,
    page_content_ids, preflight_text_elements, regenerate_page_content, set_page_contents,
    FontRun, PreflightResult, TEXT_Z_ORDER_BASE,
};
pub use rewrite::{rewrite_text_operators, RewriteMode};
pub use vector::extract_vector_graphics;

use crate::cos;
use crate::error::Result;
use crate::font::{FontMap, FontResolver};
use crate::model::{AnnotationModel, FormFieldModel, PageModel};
use crate::util::{inherited_attribute, number_array, page_resources, stream_bytes};
use lopdf::{Dictionary, Document, Object, ObjectId};
use std::collections::HashSet;

/// Apply a page model to a page of `doc`.
///
/// Sets the page boxes and rotation, restores the serialized resources and
/// preserved content streams, checks the text against its fonts, then
/// rewrites, overlays or redraws the content and finally restores the
/// annotations. The `fallback_used` flags of `page` are updated.
pub fn rebuild_page(
    doc: &mut Document,
    page_id: ObjectId,
    page: &mut PageModel,
    fonts: &mut FontMap,
    resolver: &FontResolver<'_>,
) -> Result<RegenerateMode> {
    apply_page_geometry(doc, page_id, page)?;

    if let Some(resources) = &page.resources {
        match cos::deserialize_dictionary(resources, doc) {
            Some(dict) => doc
                .get_object_mut(page_id)
                .and_then(Object::as_dict_mut)?
                .set("Resources", dict),
            None => log::debug!("Page {} resources are not a dictionary", page.page_number),
        }
    }

    let mut preserved_ids = Vec::new();
    let mut preserved = Vec::new();
    for value in &page.content_streams {
        let Some(model) = value.stream.as_ref() else {
            log::debug!("Skipping non-stream content entry on page {}", page.page_number);
            continue;
        };
        let stream = cos::build_stream_from_model(model, doc);
        preserved.push(stream_bytes(&stream));
        preserved_ids.push(doc.add_object(stream));
    }
    set_page_contents(doc, page_id, &preserved_ids)?;

    if !preserved.is_empty() && page.has_images() {
        let restored = reconstruct_image_xobjects(doc, page_id, &preserved, &page.image_elements);
        log::debug!("Restored {} image XObjects on page {}", restored, page.page_number);
    }

    let preflight = preflight_text_elements(doc, page.page_number, &mut page.text_elements, fonts, resolver);
    if !preflight.fallback_ids.is_empty() {
        ensure_fallback_resources(doc, page_id, &preflight.fallback_ids, fonts)?;
    }

    let mut rewritten = None;
    let mode = {
        let doc_ref: &Document = doc;
        determine_regenerate_mode(page, preflight.uses_fallback, || {
            let Some(resources) = page_resources(doc_ref, page_id) else {
                return false;
            };
            let content: Vec<u8> = preserved.join(&b'\n');
            rewritten = rewrite_text_operators(
                doc_ref,
                &content,
                resources,
                &page.text_elements,
                RewriteMode::Replace,
            );
            rewritten.is_some()
        })
    };
    log::debug!("Page {} reconstructed with {}", page.page_number, mode);

    match mode {
        RegenerateMode::ReuseExisting => {
            if let Some(bytes) = rewritten.filter(|b| *b != preserved.join(&b'\n')) {
                let id = add_content_stream(doc, bytes);
                set_page_contents(doc, page_id, &[id])?;
            }
        }
        RegenerateMode::RegenerateWithVectorOverlay => {
            let image_names: HashSet<String> = page
                .image_elements
                .iter()
                .filter_map(|e| e.object_name.clone())
                .filter(|n| !n.trim().is_empty())
                .collect();
            let append = match extract_vector_graphics(&preserved, &image_names) {
                Some(vector) => {
                    let id = add_content_stream(doc, vector);
                    set_page_contents(doc, page_id, &[id])?;
                    true
                }
                None => {
                    set_page_contents(doc, page_id, &[])?;
                    false
                }
            };
            regenerate_page_content(
                doc,
                page_id,
                page.page_number,
                &mut page.text_elements,
                &page.image_elements,
                fonts,
                resolver,
                append,
            )?;
        }
        RegenerateMode::RegenerateClear => {
            set_page_contents(doc, page_id, &[])?;
            regenerate_page_content(
                doc,
                page_id,
                page.page_number,
                &mut page.text_elements,
                &page.image_elements,
                fonts,
                resolver,
                false,
            )?;
        }
    }

    restore_annotations(doc, page_id, &page.annotations)?;
    Ok(mode)
}

/// Media box, crop box and rotation from the model; missing dimensions
/// keep the current media box size.
fn apply_page_geometry(doc: &mut Document, page_id: ObjectId, page: &PageModel) -> Result<()> {
    let current = inherited_attribute(doc, page_id, b"MediaBox")
        .cloned()
        .and_then(|b| number_array(doc, &b))
        .filter(|b| b.len() == 4)
        .map(|b| ((b[2] - b[0]).abs(), (b[3] - b[1]).abs()));
    let (default_width, default_height) =
        current.unwrap_or((PageModel::DEFAULT_WIDTH, PageModel::DEFAULT_HEIGHT));
    let width = page.width.filter(|w| w.is_finite()).unwrap_or(default_width);
    let height = page.height.filter(|h| h.is_finite()).unwrap_or(default_height);
    let rect = || {
        Object::Array(vec![
            Object::Integer(0),
            Object::Integer(0),
            Object::Real(width),
            Object::Real(height),
        ])
    };

    let dict = doc.get_object_mut(page_id).and_then(Object::as_dict_mut)?;
    dict.set("MediaBox", rect());
    dict.set("CropBox", rect());
    if let Some(rotation) = page.rotation {
        dict.set("Rotate", Object::Integer(rotation));
    }
    Ok(())
}

/// Replace a page's annotations with those restored from `rawData`,
/// pointing their `/P` at the page. Annotations without raw data are
/// skipped.
pub fn restore_annotations(
    doc: &mut Document,
    page_id: ObjectId,
    annotations: &[AnnotationModel],
) -> Result<()> {
    let mut refs = Vec::new();
    for annotation in annotations {
        let Some(raw) = &annotation.raw_data else {
            log::debug!(
                "Annotation {:?} has no raw data, skipping",
                annotation.subtype
            );
            continue;
        };
        match cos::deserialize_dictionary(raw, doc) {
            Some(mut dict) => {
                dict.set("P", Object::Reference(page_id));
                refs.push(Object::Reference(doc.add_object(dict)));
            }
            None => log::warn!("Failed to restore annotation {:?}", annotation.subtype),
        }
    }

    let page = doc.get_object_mut(page_id).and_then(Object::as_dict_mut)?;
    if refs.is_empty() {
        page.remove(b"Annots");
    } else {
        page.set("Annots", Object::Array(refs));
    }
    Ok(())
}

/// Append fields restored from `rawData` to `/AcroForm /Fields`, creating
/// the form when needed. Kids become indirect objects linked back to their
/// parent, and the first widget is linked to the field's page. Fields
/// without raw data are skipped.
pub fn restore_form_fields(doc: &mut Document, fields: &[FormFieldModel]) -> Result<()> {
    let pages = doc.get_pages();
    let mut refs = Vec::new();
    for field in fields {
        let Some(raw) = &field.raw_data else {
            log::debug!("Form field {:?} has no raw data, skipping", field.name);
            continue;
        };
        let Some(dict) = cos::deserialize_dictionary(raw, doc) else {
            log::warn!("Failed to restore form field {:?}", field.name);
            continue;
        };
        let id = add_field_node(doc, dict, None, 0);
        if let Some(page_id) = field.page_number.and_then(|n| pages.get(&n).copied()) {
            link_first_widget(doc, id, page_id);
        }
        refs.push(Object::Reference(id));
    }
    if refs.is_empty() {
        return Ok(());
    }

    let catalog_id = doc.trailer.get(b"Root").and_then(Object::as_reference)?;
    let acroform_ref = match doc.get_dictionary(catalog_id)?.get(b"AcroForm") {
        Ok(Object::Reference(id)) => Some(*id),
        _ => None,
    };
    let acroform = match acroform_ref {
        Some(id) => doc.get_object_mut(id).and_then(Object::as_dict_mut)?,
        None => {
            let catalog = doc.get_object_mut(catalog_id).and_then(Object::as_dict_mut)?;
            if !matches!(catalog.get(b"AcroForm"), Ok(Object::Dictionary(_))) {
                catalog.set("AcroForm", Dictionary::new());
            }
            catalog.get_mut(b"AcroForm").and_then(Object::as_dict_mut)?
        }
    };
    let mut all = match acroform.get(b"Fields") {
        Ok(Object::Array(existing)) => existing.clone(),
        _ => Vec::new(),
    };
    log::debug!("Restored {} form fields", refs.len());
    all.extend(refs);
    acroform.set("Fields", Object::Array(all));
    Ok(())
}

/// Point `/P` of the field's first widget at `page_id`: the first kid when
/// it is not itself a field, or the field when it has no kids.
fn link_first_widget(doc: &mut Document, field_id: ObjectId, page_id: ObjectId) {
    let first_kid = match doc.get_dictionary(field_id).and_then(|d| d.get(b"Kids")) {
        Ok(Object::Array(kids)) => match kids.first() {
            Some(Object::Reference(kid)) => Some(*kid),
            _ => return,
        },
        _ => None,
    };
    let widget_id = match first_kid {
        Some(kid) => match doc.get_dictionary(kid) {
            Ok(dict) if !dict.has(b"T") => kid,
            _ => return,
        },
        None => field_id,
    };
    if let Ok(widget) = doc.get_object_mut(widget_id).and_then(Object::as_dict_mut) {
        widget.set("P", Object::Reference(page_id));
    }
}

fn add_field_node(doc: &mut Document, mut dict: Dictionary, parent: Option<ObjectId>, depth: usize) -> ObjectId {
    let kids = match dict.remove(b"Kids") {
        Some(Object::Array(kids)) => kids,
        _ => Vec::new(),
    };
    if let Some(parent) = parent {
        dict.set("Parent", parent);
    }
    let id = doc.add_object(dict);
    if kids.is_empty() || depth >= 32 {
        return id;
    }

    let kid_refs: Vec<Object> = kids
        .into_iter()
        .filter_map(|kid| match kid {
            Object::Dictionary(kid) => Some(Object::Reference(add_field_node(doc, kid, Some(id), depth + 1))),
            Object::Reference(r) => Some(Object::Reference(r)),
            _ => None,
        })
        .collect();
    if let Ok(node) = doc.get_object_mut(id).and_then(Object::as_dict_mut) {
        node.set("Kids", kid_refs);
    }
    id
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::font::{FallbackFontCatalog, FontRegistry};
    use crate::model::{CosValue, FontModel, StreamModel, TextElement};
    use base64::Engine;
    use lopdf::content::Content;
    use lopdf::dictionary;
    use std::collections::BTreeMap;

    fn content_stream(bytes: &[u8]) -> CosValue {
        CosValue::stream(StreamModel {
            dictionary: None,
            raw_data: Some(base64::engine::general_purpose::STANDARD.encode(bytes)),
        })
    }

    fn helvetica_resources() -> CosValue {
        let mut font = BTreeMap::new();
        font.insert("Type".to_string(), CosValue::name("Font"));
        font.insert("Subtype".to_string(), CosValue::name("Type1"));
        font.insert("BaseFont".to_string(), CosValue::name("Helvetica"));
        font.insert("Encoding".to_string(), CosValue::name("WinAnsiEncoding"));
        let mut fonts = BTreeMap::new();
        fonts.insert("F1".to_string(), CosValue::dictionary(font));
        let mut resources = BTreeMap::new();
        resources.insert("Font".to_string(), CosValue::dictionary(fonts));
        CosValue::dictionary(resources)
    }

    fn helvetica_model() -> FontModel {
        let mut font = FontModel::new("F1", 1);
        font.base_name = Some("Helvetica".to_string());
        font.standard14_name = Some("Helvetica".to_string());
        font
    }

    fn shown_strings(doc: &Document, page_id: ObjectId) -> Vec<Vec<u8>> {
        let mut strings = Vec::new();
        for id in page_content_ids(doc, page_id) {
            let stream = doc.get_object(id).unwrap().as_stream().unwrap();
            let content = Content::decode(&stream_bytes(stream)).unwrap();
            for op in content.operations {
                if op.operator == "Tj" {
                    if let Some(Object::String(bytes, _)) = op.operands.first() {
                        strings.push(bytes.clone());
                    }
                }
            }
        }
        strings
    }

    #[test]
    fn test_text_only_page_reuses_rewritten_content() {
        let catalog = FallbackFontCatalog::new("/nonexistent/pdfjson-fonts");
        let registry = FontRegistry::new();
        let resolver = FontResolver::new(&catalog, &registry);
        let mut doc = Document::with_version("1.7");
        let page_id = doc.add_object(dictionary! { "Type" => "Page" });
        let mut fonts = FontMap::build(&mut doc, &resolver, &[helvetica_model()]);

        let mut page = PageModel::new(1, 612.0, 792.0);
        page.resources = Some(helvetica_resources());
        page.content_streams
            .push(content_stream(b"BT /F1 12 Tf 72 700 Td (Hello) Tj ET"));
        page.text_elements.push(TextElement::new("Jello", "F1"));

        let mode = rebuild_page(&mut doc, page_id, &mut page, &mut fonts, &resolver).unwrap();
        assert_eq!(mode, RegenerateMode::ReuseExisting);
        assert_eq!(shown_strings(&doc, page_id), vec![b"Jello".to_vec()]);
    }

    #[test]
    fn test_fallback_page_overlays_vectors() {
        let catalog = FallbackFontCatalog::new("/nonexistent/pdfjson-fonts");
        let registry = FontRegistry::new();
        let resolver = FontResolver::new(&catalog, &registry);
        let mut doc = Document::with_version("1.7");
        let page_id = doc.add_object(dictionary! { "Type" => "Page" });
        let mut fonts = FontMap::build(&mut doc, &resolver, &[helvetica_model()]);

        let mut page = PageModel::new(1, 612.0, 792.0);
        page.resources = Some(helvetica_resources());
        page.content_streams
            .push(content_stream(b"0 0 m 10 10 l S BT /F1 12 Tf (Hi) Tj ET"));
        page.text_elements.push(TextElement::new("\u{d55c}", "F1"));

        let mode = rebuild_page(&mut doc, page_id, &mut page, &mut fonts, &resolver).unwrap();
        assert_eq!(mode, RegenerateMode::RegenerateWithVectorOverlay);
        assert_eq!(page.text_elements[0].fallback_used, Some(true));
        // vector stream plus the q/Q wrapper pair
        assert_eq!(page_content_ids(&doc, page_id).len(), 3);
    }

    #[test]
    fn test_empty_page_is_cleared_and_sized() {
        let catalog = FallbackFontCatalog::new("/nonexistent/pdfjson-fonts");
        let registry = FontRegistry::new();
        let resolver = FontResolver::new(&catalog, &registry);
        let mut doc = Document::with_version("1.7");
        let page_id = doc.add_object(dictionary! { "Type" => "Page" });
        let mut fonts = FontMap::build(&mut doc, &resolver, &[]);

        let mut page = PageModel::new(1, 595.0, 842.0);
        page.rotation = Some(90);
        let mode = rebuild_page(&mut doc, page_id, &mut page, &mut fonts, &resolver).unwrap();
        assert_eq!(mode, RegenerateMode::RegenerateClear);

        let dict = doc.get_dictionary(page_id).unwrap();
        let media = number_array(&doc, dict.get(b"MediaBox").unwrap()).unwrap();
        assert_eq!(media, vec![0.0, 0.0, 595.0, 842.0]);
        assert_eq!(dict.get(b"Rotate").unwrap().as_i64().unwrap(), 90);
    }

    #[test]
    fn test_restore_annotations_repoints_page() {
        let mut doc = Document::with_version("1.7");
        let page_id = doc.add_object(dictionary! { "Type" => "Page" });
        let mut raw = BTreeMap::new();
        raw.insert("Subtype".to_string(), CosValue::name("Text"));
        let annotations = vec![
            AnnotationModel {
                subtype: Some("Text".to_string()),
                raw_data: Some(CosValue::dictionary(raw)),
                ..Default::default()
            },
            AnnotationModel {
                subtype: Some("Link".to_string()),
                ..Default::default()
            },
        ];
        restore_annotations(&mut doc, page_id, &annotations).unwrap();

        let annots = doc.get_dictionary(page_id).unwrap().get(b"Annots").unwrap().as_array().unwrap();
        assert_eq!(annots.len(), 1);
        let annot = doc.get_dictionary(annots[0].as_reference().unwrap()).unwrap();
        assert_eq!(annot.get(b"P").unwrap().as_reference().unwrap(), page_id);
    }

    #[test]
    fn test_restore_form_fields_links_kids() {
        let mut doc = Document::with_version("1.7");
        let catalog_id = doc.add_object(dictionary! { "Type" => "Catalog" });
        doc.trailer.set("Root", catalog_id);

        let mut widget = BTreeMap::new();
        widget.insert("Subtype".to_string(), CosValue::name("Widget"));
        let mut field = BTreeMap::new();
        field.insert("T".to_string(), CosValue::string(b"name"));
        field.insert("FT".to_string(), CosValue::name("Tx"));
        field.insert("Kids".to_string(), CosValue::array(vec![CosValue::dictionary(widget)]));
        let fields = vec![
            FormFieldModel {
                name: Some("name".to_string()),
                raw_data: Some(CosValue::dictionary(field)),
                ..Default::default()
            },
            FormFieldModel {
                name: Some("lost".to_string()),
                ..Default::default()
            },
        ];
        restore_form_fields(&mut doc, &fields).unwrap();

        let catalog = doc.get_dictionary(catalog_id).unwrap();
        let acroform = catalog.get(b"AcroForm").unwrap().as_dict().unwrap();
        let refs = acroform.get(b"Fields").unwrap().as_array().unwrap();
        assert_eq!(refs.len(), 1);
        let field_id = refs[0].as_reference().unwrap();
        let field = doc.get_dictionary(field_id).unwrap();
        let kids = field.get(b"Kids").unwrap().as_array().unwrap();
        let kid = doc.get_dictionary(kids[0].as_reference().unwrap()).unwrap();
        assert_eq!(kid.get(b"Parent").unwrap().as_reference().unwrap(), field_id);
        assert_eq!(kid.get(b"Subtype").unwrap().as_name().unwrap(), b"Widget");
    }
}

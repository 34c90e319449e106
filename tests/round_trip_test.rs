//! Forward, reverse and forward again: everything carried as raw data
//! must come back unchanged.

mod common;

use pdfjson::{CffConverterConfig, ConverterConfig, DocumentModel, PdfJsonConverter};

fn converter() -> PdfJsonConverter {
    common::init_logging();
    PdfJsonConverter::new(
        ConverterConfig::new()
            .with_fallback_font_dir("/nonexistent/pdfjson-fonts")
            .with_cff(CffConverterConfig::disabled()),
    )
}

fn forward(converter: &PdfJsonConverter, data: &[u8]) -> DocumentModel {
    converter.convert_pdf_to_model(data, None, &|_| {}).unwrap()
}

#[test]
fn test_raw_data_survives_round_trip() {
    let converter = converter();
    let first = forward(&converter, &common::annotated_pdf());
    let rebuilt = converter.convert_model_to_pdf(&first, None).unwrap();
    let second = forward(&converter, &rebuilt);

    assert_eq!(first.page_count(), 1);
    assert_eq!(second.page_count(), 1);
    let (before, after) = (&first.pages[0], &second.pages[0]);

    assert_eq!(before.annotations.len(), 2);
    assert_eq!(before.annotations, after.annotations);
    assert_eq!(before.resources, after.resources);
    assert_eq!(before.content_streams, after.content_streams);
    assert_eq!(first.form_fields, second.form_fields);
    assert_eq!(second.form_fields[0].page_number, Some(1));
    assert_eq!(second.form_fields[0].value.as_deref(), Some("ACME"));
}

#[test]
fn test_text_and_metadata_survive_round_trip() {
    let converter = converter();
    let first = forward(&converter, &common::annotated_pdf());
    let rebuilt = converter.convert_model_to_pdf(&first, None).unwrap();
    let second = forward(&converter, &rebuilt);

    let texts = |model: &DocumentModel| -> Vec<String> {
        model.pages[0]
            .text_elements
            .iter()
            .map(|e| e.text.clone())
            .collect()
    };
    assert_eq!(texts(&first).concat(), "Hello");
    assert_eq!(texts(&first), texts(&second));
    assert_eq!(first.pages[0].dimensions(), second.pages[0].dimensions());
    assert_eq!(
        second.metadata.and_then(|m| m.title).as_deref(),
        Some("Quarterly report")
    );
}

#[test]
fn test_edited_text_is_rewritten_in_place() {
    let converter = converter();
    let mut model = forward(&converter, &common::annotated_pdf());
    let elements = &mut model.pages[0].text_elements;
    let total: usize = elements.iter().map(|e| e.text.chars().count()).sum();
    assert_eq!(total, 5);
    for element in elements.iter_mut() {
        element.text = element.text.to_uppercase();
    }

    let rebuilt = converter.convert_model_to_pdf(&model, None).unwrap();
    // The replaced preserved stream is not written out
    assert!(common::unreachable_objects(&rebuilt).is_empty());
    let second = forward(&converter, &rebuilt);
    let text: String = second.pages[0]
        .text_elements
        .iter()
        .map(|e| e.text.as_str())
        .collect();
    assert_eq!(text, "HELLO");
    // Annotations are restored whichever way the page was rebuilt
    assert_eq!(model.pages[0].annotations, second.pages[0].annotations);
}

#[test]
fn test_json_round_trip_through_strings() {
    let converter = converter();
    let json = converter
        .convert_pdf_to_json(&common::annotated_pdf(), None, &|_| {})
        .unwrap();
    let pdf = converter.convert_json_to_pdf(json.as_bytes(), None).unwrap();
    let model: DocumentModel = serde_json::from_str(&json).unwrap();
    let again = forward(&converter, &pdf);
    assert_eq!(model.form_fields, again.form_fields);
}

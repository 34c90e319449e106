//! # pdfjson
//!
//! Bidirectional conversion between PDF documents and a structured,
//! JSON-serializable document model.
//!
//! A PDF is read into pages of positioned text and images, fonts with their
//! programs, annotations, form fields and lossless copies of the raw object
//! graph fragments. An edited model is turned back into a PDF, either by
//! rewriting the strings of the preserved page content in place or by
//! regenerating the page with fallback fonts where glyphs are missing.
//!
//! ## Quick Start
//!
//! ```no_run
//! use pdfjson::{pdf_to_model, model_to_pdf};
//!
//! fn main() -> pdfjson::Result<()> {
//!     let data = std::fs::read("document.pdf")?;
//!     let mut model = pdf_to_model(&data)?;
//!
//!     // Edit the first text element and rebuild the PDF
//!     if let Some(element) = model.pages[0].text_elements.first_mut() {
//!         element.text = "Edited".to_string();
//!     }
//!     std::fs::write("edited.pdf", model_to_pdf(&model)?)?;
//!     Ok(())
//! }
//! ```
//!
//! ## Features
//!
//! - **Object graph codec**: cycle-safe round trip of dictionaries, arrays and streams
//! - **Font pipeline**: program extraction, CFF conversion, script-aware fallback fonts
//! - **Content reconstruction**: token rewrite, vector overlay or full regeneration
//! - **Document cache**: byte-budgeted LRU with disk spillover and idle expiry
//! - **Parallel image encoding**: Uses Rayon for pages with many images

pub mod cache;
pub mod config;
pub mod convert;
pub mod cos;
pub mod detect;
pub mod error;
pub mod font;
pub mod model;
pub mod parser;
pub mod reconstruct;
pub mod render;
mod util;

// Re-export commonly used types
pub use cache::{CachedDocumentEntry, ExpiryScheduler, LazyDocumentCache};
pub use config::{CffConverterConfig, CffMethod, ConverterConfig, FontNormalizationConfig};
pub use convert::{ConversionProgress, PdfJsonConverter};
pub use cos::StreamPolicy;
pub use detect::{detect_input, detect_pdf, is_pdf_bytes, InputKind, PdfFormat};
pub use error::{Error, Result};
pub use font::{resolve_fallback_font_id, resolve_fallback_font_id_for_code_point, FontRegistry};
pub use model::{
    AnnotationModel, CosValue, CosValueType, DocumentMetadataSummary, DocumentModel, FontModel,
    FormFieldModel, ImageElement, Metadata, PageModel, StreamModel, TextElement,
};
pub use reconstruct::RegenerateMode;
pub use render::{to_json, JsonFormat};

/// Convert PDF bytes to a document model with the default configuration.
///
/// # Example
///
/// ```no_run
/// let data = std::fs::read("document.pdf").unwrap();
/// let model = pdfjson::pdf_to_model(&data).unwrap();
/// println!("Pages: {}", model.page_count());
/// ```
pub fn pdf_to_model(data: &[u8]) -> Result<DocumentModel> {
    PdfJsonConverter::default().convert_pdf_to_model(data, None, &|_| {})
}

/// Convert PDF bytes to JSON.
///
/// # Example
///
/// ```no_run
/// use pdfjson::{pdf_to_json, JsonFormat};
///
/// let data = std::fs::read("document.pdf").unwrap();
/// let json = pdf_to_json(&data, JsonFormat::Pretty).unwrap();
/// std::fs::write("document.json", json).unwrap();
/// ```
pub fn pdf_to_json(data: &[u8], format: JsonFormat) -> Result<String> {
    let model = pdf_to_model(data)?;
    render::to_json(&model, format)
}

/// Rebuild a PDF from a document model with the default configuration.
pub fn model_to_pdf(model: &DocumentModel) -> Result<Vec<u8>> {
    PdfJsonConverter::default().convert_model_to_pdf(model, None)
}

/// Rebuild a PDF from JSON.
///
/// # Example
///
/// ```no_run
/// let json = std::fs::read("document.json").unwrap();
/// let pdf = pdfjson::json_to_pdf(&json).unwrap();
/// std::fs::write("rebuilt.pdf", pdf).unwrap();
/// ```
pub fn json_to_pdf(json: &[u8]) -> Result<Vec<u8>> {
    PdfJsonConverter::default().convert_json_to_pdf(json, None)
}

/// Convert whatever `data` holds: PDF bytes become JSON, a JSON document
/// model becomes PDF bytes.
pub fn convert_auto(data: &[u8]) -> Result<Vec<u8>> {
    match detect_input(data)? {
        InputKind::Pdf(_) => pdf_to_json(data, JsonFormat::Compact).map(String::into_bytes),
        InputKind::DocumentJson => json_to_pdf(data),
    }
}

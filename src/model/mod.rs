//! Document model types for the PDF <-> JSON conversion.
//!
//! This module defines the JSON-serializable representation of a PDF:
//! pages with positioned text and images, fonts with their programs,
//! annotations, form fields, and tagged copies of raw object graph
//! fragments for lossless reconstruction.

mod cos;
mod document;
mod font;
mod image;
mod page;
mod text;

pub use cos::{CosValue, CosValueType, StreamModel, CIRCULAR_MARKER};
pub use document::{
    DocumentMetadataSummary, DocumentModel, FormFieldModel, Metadata, PageDimension,
};
pub use font::{
    build_font_uid, font_map_key, CandidateStatus, CidSystemInfo, ConversionCandidate,
    FontModel, GlyphOutline, PAGE_INDEPENDENT,
};
pub use image::{ImageElement, IMAGE_Z_ORDER_BASE};
pub use page::{AnnotationModel, PageModel};
pub use text::{ColorModel, TextElement};

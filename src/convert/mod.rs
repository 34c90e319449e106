//! The conversion service.
//!
//! [`PdfJsonConverter`] ties the parser, the font pipeline, content
//! reconstruction and the document cache together:
//!
//! - forward conversion of PDF bytes into a [`DocumentModel`], with
//!   progress milestones and an optional Ghostscript pre-pass
//! - reverse conversion of a model into PDF bytes
//! - lazy access to a cached document: metadata first, pages on demand
//! - incremental export of edited pages against the cached bytes
//!
//! [`DocumentModel`]: crate::model::DocumentModel

mod analysis;
mod converter;
mod normalize;
mod progress;

pub use analysis::{analyze_document, log_analysis, DocumentAnalysis, DuplicatePayload};
pub use converter::{PdfJsonConverter, LAZY_IMAGE_PAGE_THRESHOLD};
pub use normalize::FontNormalizer;
pub use progress::ConversionProgress;

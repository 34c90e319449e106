//! Forward direction: reading a PDF into the document model.

mod annotations;
mod document;
mod image;
mod page;
mod resources;
mod scanner;

pub use annotations::{extract_annotations, extract_form_fields};
pub use document::{
    apply_metadata, apply_xmp_metadata, extract_metadata, extract_xmp_metadata, load_document,
    page_dimension, page_dimensions, page_id, parse_pdf_date, pdf_date_to_rfc3339,
    rfc3339_to_pdf_date,
};
pub use image::{encode_images, ImageColorSpace, PendingImage};
pub use page::{extract_page, PageOptions};
pub use resources::{extract_content_streams, extract_resources, is_image_xobject};
pub use scanner::{scan_page, Matrix, PageScan};

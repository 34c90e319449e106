//! Input detection: PDF bytes versus JSON document models.

use crate::error::{Error, Result};

/// PDF header information.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PdfFormat {
    /// PDF version (e.g., "1.7", "2.0")
    pub version: String,
    /// Offset of the `%PDF-` marker from the start of the input
    pub header_offset: usize,
}

impl std::fmt::Display for PdfFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "PDF {}", self.version)
    }
}

/// Kind of payload handed to the converter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputKind {
    Pdf(PdfFormat),
    /// A JSON object, presumably a document model
    DocumentJson,
}

/// PDF magic bytes: %PDF-
const PDF_MAGIC: &[u8] = b"%PDF-";
const VERSION_LEN: usize = 3; // e.g., "1.7"

/// Readers accept the header anywhere in the first kilobyte.
const HEADER_SEARCH_WINDOW: usize = 1024;

/// Detect the PDF header in `data`.
///
/// # Returns
/// * `Err(Error::MissingInput)` for empty input
/// * `Err(Error::UnknownFormat)` when no `%PDF-` marker is found
/// * `Err(Error::UnsupportedVersion)` when the version is malformed
pub fn detect_pdf(data: &[u8]) -> Result<PdfFormat> {
    if data.is_empty() {
        return Err(Error::MissingInput("PDF input is empty".to_string()));
    }

    let window = &data[..data.len().min(HEADER_SEARCH_WINDOW)];
    let offset = window
        .windows(PDF_MAGIC.len())
        .position(|w| w == PDF_MAGIC)
        .ok_or(Error::UnknownFormat)?;

    let start = offset + PDF_MAGIC.len();
    let version_bytes = data
        .get(start..start + VERSION_LEN)
        .ok_or(Error::UnknownFormat)?;
    let version = String::from_utf8_lossy(version_bytes).to_string();

    if !is_valid_version(&version) {
        return Err(Error::UnsupportedVersion(version));
    }

    Ok(PdfFormat {
        version,
        header_offset: offset,
    })
}

/// Classify converter input.
pub fn detect_input(data: &[u8]) -> Result<InputKind> {
    if data.is_empty() {
        return Err(Error::MissingInput("input is empty".to_string()));
    }
    let first = data
        .iter()
        .skip_while(|b| b.is_ascii_whitespace() || **b == 0xEF || **b == 0xBB || **b == 0xBF)
        .next();
    if first == Some(&b'{') {
        return Ok(InputKind::DocumentJson);
    }
    detect_pdf(data).map(InputKind::Pdf)
}

/// Check if a version string is valid.
fn is_valid_version(version: &str) -> bool {
    let bytes = version.as_bytes();
    bytes.len() == 3 && bytes[0].is_ascii_digit() && bytes[1] == b'.' && bytes[2].is_ascii_digit()
}

/// Check if bytes carry a PDF header.
pub fn is_pdf_bytes(data: &[u8]) -> bool {
    detect_pdf(data).is_ok()
}

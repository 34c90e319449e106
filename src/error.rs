//! Error types for pdfjson library.

use std::io;
use thiserror::Error;

/// Result type alias for pdfjson operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error types that can occur during PDF <-> JSON conversion.
#[derive(Error, Debug)]
pub enum Error {
    /// I/O error when reading or writing files.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The input is not recognized as PDF.
    #[error("Unknown file format: not a valid PDF")]
    UnknownFormat,

    /// The PDF version is not supported.
    #[error("Unsupported PDF version: {0}")]
    UnsupportedVersion(String),

    /// Error parsing PDF structure.
    #[error("PDF parsing error: {0}")]
    PdfParse(String),

    /// The PDF document is encrypted and requires a password.
    #[error("Document is encrypted")]
    Encrypted,

    /// The document model could not be read or written as JSON.
    #[error("JSON error: {0}")]
    Json(String),

    /// A required input document was missing or empty.
    #[error("Missing input: {0}")]
    MissingInput(String),

    /// Page number is out of range.
    #[error("Page {0} is out of range (document has {1} pages)")]
    PageOutOfRange(u32, u32),

    /// No cached document exists for the job.
    #[error("Cached document unavailable for job {0}")]
    CacheUnavailable(String),

    /// Error decoding or loading font data.
    #[error("Font decoding error: {0}")]
    FontDecode(String),

    /// Error extracting or encoding images.
    #[error("Image extraction error: {0}")]
    ImageExtract(String),

    /// Encoding error.
    #[error("Encoding error: {0}")]
    Encoding(String),

    /// An external tool (converter, normalizer) failed.
    #[error("External tool error: {0}")]
    ExternalTool(String),
}

impl From<lopdf::Error> for Error {
    fn from(err: lopdf::Error) -> Self {
        match err {
            lopdf::Error::IO(e) => Error::Io(e),
            lopdf::Error::Decryption(_) => Error::Encrypted,
            _ => Error::PdfParse(err.to_string()),
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Json(err.to_string())
    }
}

//! Document loading, page geometry and document metadata.

use crate::detect::detect_pdf;
use crate::error::{Error, Result};
use crate::model::{Metadata, PageDimension, PageModel};
use crate::util::{encode_text_string, inherited_attribute, number_array, resolve, stream_bytes, text};
use base64::Engine;
use chrono::{DateTime, FixedOffset, NaiveDate, Offset, TimeZone, Utc};
use lopdf::{dictionary, Dictionary, Document, Object, ObjectId, Stream, StringFormat};

/// Load a PDF from bytes after checking its header.
pub fn load_document(data: &[u8]) -> Result<Document> {
    let format = detect_pdf(data)?;
    let doc = Document::load_mem(data).map_err(|e| match e {
        lopdf::Error::Decryption(_) => Error::Encrypted,
        _ => Error::from(e),
    })?;
    log::debug!("Loaded {} with {} pages", format, doc.get_pages().len());
    Ok(doc)
}

/// Id of page `page_number` (1-indexed).
pub fn page_id(doc: &Document, page_number: u32) -> Result<ObjectId> {
    let pages = doc.get_pages();
    pages
        .get(&page_number)
        .copied()
        .ok_or(Error::PageOutOfRange(page_number, pages.len() as u32))
}

/// Size and rotation of a page from its (inherited) MediaBox and Rotate.
pub fn page_dimension(doc: &Document, page_id: ObjectId, page_number: u32) -> PageDimension {
    let (width, height) = inherited_attribute(doc, page_id, b"MediaBox")
        .and_then(|o| number_array(doc, o))
        .filter(|b| b.len() >= 4)
        .map(|b| ((b[2] - b[0]).abs(), (b[3] - b[1]).abs()))
        .unwrap_or((PageModel::DEFAULT_WIDTH, PageModel::DEFAULT_HEIGHT));
    let rotation = inherited_attribute(doc, page_id, b"Rotate")
        .and_then(|o| o.as_i64().ok())
        .map(|r| r.rem_euclid(360))
        .unwrap_or(0);
    PageDimension {
        page_number,
        width,
        height,
        rotation,
    }
}

/// Dimensions of every page, in page order.
pub fn page_dimensions(doc: &Document) -> Vec<PageDimension> {
    doc.get_pages()
        .into_iter()
        .map(|(number, id)| page_dimension(doc, id, number))
        .collect()
}

fn info_dictionary(doc: &Document) -> Option<&Dictionary> {
    let info = doc.trailer.get(b"Info").ok()?;
    match info {
        Object::Reference(id) => doc.get_dictionary(*id).ok(),
        Object::Dictionary(dict) => Some(dict),
        _ => None,
    }
}

fn catalog_id(doc: &Document) -> Option<ObjectId> {
    doc.trailer.get(b"Root").ok()?.as_reference().ok()
}

/// Metadata from the Info dictionary plus the page count.
pub fn extract_metadata(doc: &Document) -> Metadata {
    let mut metadata = Metadata {
        number_of_pages: Some(doc.get_pages().len() as u32),
        ..Default::default()
    };
    let Some(info) = info_dictionary(doc) else {
        return metadata;
    };
    let field = |key: &[u8]| {
        info.get(key)
            .ok()
            .and_then(|o| text(resolve(doc, o)))
            .filter(|s| !s.is_empty())
    };
    metadata.title = field(b"Title");
    metadata.author = field(b"Author");
    metadata.subject = field(b"Subject");
    metadata.keywords = field(b"Keywords");
    metadata.creator = field(b"Creator");
    metadata.producer = field(b"Producer");
    metadata.creation_date = field(b"CreationDate").and_then(|d| pdf_date_to_rfc3339(&d));
    metadata.modification_date = field(b"ModDate").and_then(|d| pdf_date_to_rfc3339(&d));
    metadata.trapped = field(b"Trapped");
    metadata
}

/// The catalog's XMP metadata stream, base64 encoded.
pub fn extract_xmp_metadata(doc: &Document) -> Option<String> {
    let catalog = doc.get_dictionary(catalog_id(doc)?).ok()?;
    let stream = resolve(doc, catalog.get(b"Metadata").ok()?)
        .as_stream()
        .ok()?;
    let data = stream_bytes(stream);
    if data.is_empty() {
        return None;
    }
    Some(base64::engine::general_purpose::STANDARD.encode(data))
}

/// Write metadata into the Info dictionary, creating it when absent.
/// `None` fields remove the entry.
pub fn apply_metadata(doc: &mut Document, metadata: &Metadata) {
    let existing = match doc.trailer.get(b"Info") {
        Ok(Object::Reference(id)) => Some(*id),
        _ => None,
    };
    let info_id = match existing {
        Some(id) if doc.get_dictionary(id).is_ok() => id,
        _ => {
            let id = doc.add_object(Dictionary::new());
            doc.trailer.set("Info", id);
            id
        }
    };

    let entries: [(&str, Option<Vec<u8>>); 8] = [
        ("Title", metadata.title.as_deref().map(encode_text_string)),
        ("Author", metadata.author.as_deref().map(encode_text_string)),
        ("Subject", metadata.subject.as_deref().map(encode_text_string)),
        ("Keywords", metadata.keywords.as_deref().map(encode_text_string)),
        ("Creator", metadata.creator.as_deref().map(encode_text_string)),
        ("Producer", metadata.producer.as_deref().map(encode_text_string)),
        (
            "CreationDate",
            metadata
                .creation_date
                .as_deref()
                .and_then(rfc3339_to_pdf_date)
                .map(String::into_bytes),
        ),
        (
            "ModDate",
            metadata
                .modification_date
                .as_deref()
                .and_then(rfc3339_to_pdf_date)
                .map(String::into_bytes),
        ),
    ];

    let Ok(info) = doc.get_object_mut(info_id).and_then(Object::as_dict_mut) else {
        return;
    };
    for (key, value) in entries {
        match value {
            Some(bytes) => info.set(key, Object::String(bytes, StringFormat::Literal)),
            None => {
                info.remove(key.as_bytes());
            }
        }
    }
    match metadata.trapped.as_deref() {
        Some(trapped) => info.set("Trapped", Object::Name(trapped.as_bytes().to_vec())),
        None => {
            info.remove(b"Trapped");
        }
    }
}

/// Attach an XMP packet (base64) as the catalog's metadata stream.
/// A blank packet is ignored; one that is not base64 is an encoding error.
pub fn apply_xmp_metadata(doc: &mut Document, xmp_base64: &str) -> Result<()> {
    if xmp_base64.trim().is_empty() {
        return Ok(());
    }
    let data = base64::engine::general_purpose::STANDARD
        .decode(xmp_base64.trim())
        .map_err(|e| Error::Encoding(format!("XMP metadata is not base64: {}", e)))?;
    let Some(root) = catalog_id(doc) else {
        return Ok(());
    };
    let stream = Stream::new(
        dictionary! {
            "Type" => "Metadata",
            "Subtype" => "XML",
        },
        data,
    )
    .with_compression(false);
    let metadata_id = doc.add_object(stream);
    doc.get_object_mut(root)
        .and_then(Object::as_dict_mut)?
        .set("Metadata", metadata_id);
    Ok(())
}

/// Parse a PDF date (`D:YYYYMMDDHHmmSSOHH'mm'`, trailing parts optional).
pub fn parse_pdf_date(s: &str) -> Option<DateTime<FixedOffset>> {
    let s = s.trim();
    let s = s.strip_prefix("D:").unwrap_or(s);
    if s.len() < 4 {
        return None;
    }

    let digits = |range: std::ops::Range<usize>, default: u32| -> Option<u32> {
        match s.get(range) {
            Some(part) if part.chars().all(|c| c.is_ascii_digit()) => part.parse().ok(),
            Some(_) => None,
            None => Some(default),
        }
    };
    let year: i32 = s.get(0..4)?.parse().ok()?;
    let month = digits(4..6, 1)?;
    let day = digits(6..8, 1)?;
    let hour = digits(8..10, 0)?;
    let minute = digits(10..12, 0)?;
    let second = digits(12..14, 0)?;

    let offset = match s.get(14..).map(|rest| rest.trim_end_matches('\'')) {
        Some(rest) if rest.starts_with('+') || rest.starts_with('-') => {
            let sign = if rest.starts_with('-') { -1 } else { 1 };
            let parts: Vec<&str> = rest[1..].split('\'').collect();
            let hours: i32 = parts.first().and_then(|h| h.parse().ok()).unwrap_or(0);
            let minutes: i32 = parts.get(1).and_then(|m| m.parse().ok()).unwrap_or(0);
            FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60))?
        }
        _ => Utc.fix(),
    };

    let naive = NaiveDate::from_ymd_opt(year, month, day)?.and_hms_opt(hour, minute, second)?;
    offset.from_local_datetime(&naive).single()
}

/// PDF date string as RFC 3339.
pub fn pdf_date_to_rfc3339(s: &str) -> Option<String> {
    parse_pdf_date(s).map(|d| d.to_rfc3339())
}

/// RFC 3339 timestamp as a PDF date string.
pub fn rfc3339_to_pdf_date(s: &str) -> Option<String> {
    let date = DateTime::parse_from_rfc3339(s.trim()).ok()?;
    let offset = date.offset().local_minus_utc();
    let sign = if offset < 0 { '-' } else { '+' };
    let offset = offset.abs();
    Some(format!(
        "D:{}{}{:02}'{:02}'",
        date.format("%Y%m%d%H%M%S"),
        sign,
        offset / 3600,
        (offset % 3600) / 60
    ))
}

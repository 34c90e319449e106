//! Embedded font program extraction and format sniffing.

use super::cff::CffConverter;
use crate::util::{resolve, stream_bytes};
use base64::Engine;
use lopdf::{Dictionary, Document};

/// Format tags.
pub const FORMAT_TTF: &str = "ttf";
pub const FORMAT_OTF: &str = "otf";
pub const FORMAT_CFF: &str = "cff";
pub const FORMAT_TYPE1: &str = "type1";

/// Classify a program by its first four bytes.
///
/// TrueType (`0x00010000` or `true`) is `ttf`, `OTTO` is `otf` and a
/// collection header (`ttcf`) is reported as `cff`.
pub fn detect_font_flavor(data: &[u8]) -> Option<&'static str> {
    match data.get(..4)? {
        [0x00, 0x01, 0x00, 0x00] | b"true" => Some(FORMAT_TTF),
        b"OTTO" => Some(FORMAT_OTF),
        b"ttcf" => Some(FORMAT_CFF),
        _ => None,
    }
}

/// Classify a FontFile2 program. Unlike [`detect_font_flavor`] the Apple
/// `true` tag is not accepted.
pub fn detect_truetype_format(data: &[u8]) -> Option<&'static str> {
    match data.get(..4)? {
        [0x00, 0x01, 0x00, 0x00] => Some(FORMAT_TTF),
        b"OTTO" => Some(FORMAT_OTF),
        b"ttcf" => Some(FORMAT_CFF),
        _ => None,
    }
}

/// Check the sfnt table directory header. Returns the reason on rejection.
pub fn validate_font_tables(data: &[u8]) -> Result<(), String> {
    if data.len() < 12 {
        return Err("Font program too small".to_string());
    }
    let num_tables = u16::from_be_bytes([data[4], data[5]]);
    if num_tables == 0 || num_tables > 512 {
        return Err(format!("Invalid numTables: {}", num_tables));
    }
    Ok(())
}

/// Compact (CFF-flavoured) outline formats that need conversion for reuse.
pub fn is_cff_format(format: &str) -> bool {
    let normalized = format.to_ascii_lowercase();
    normalized.contains("type1c") || normalized.contains("cidfonttype0c") || normalized == FORMAT_CFF
}

pub fn is_type1_format(format: &str) -> bool {
    let normalized = format.to_ascii_lowercase();
    normalized == FORMAT_TYPE1 || normalized.ends_with("pfb")
}

/// The program payloads recorded for a font.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FontProgramData {
    /// Original program (base64) and its format
    pub program: Option<String>,
    pub format: Option<String>,
    /// Web-compatible program (base64) and its format
    pub web_program: Option<String>,
    pub web_format: Option<String>,
    /// Program usable for PDF reconstruction (base64) and its format
    pub pdf_program: Option<String>,
    pub pdf_format: Option<String>,
}

/// Read the embedded program of a font through its descriptor.
///
/// FontFile3 is preferred, then FontFile2, then FontFile. Compact formats
/// are run through `converter`; the original bytes are always kept.
pub fn extract_font_program(
    doc: &Document,
    font: &Dictionary,
    to_unicode: Option<&str>,
    converter: &CffConverter,
) -> Option<FontProgramData> {
    let descriptor = font_descriptor(doc, font)?;

    if let Some(stream) = descriptor
        .get(b"FontFile3")
        .ok()
        .and_then(|o| resolve(doc, o).as_stream().ok())
    {
        let subtype = stream
            .dict
            .get(b"Subtype")
            .ok()
            .and_then(|o| o.as_name().ok())
            .map(|n| String::from_utf8_lossy(n).into_owned())
            .unwrap_or_else(|| "fontfile3".to_string());
        log::debug!("Found FontFile3 with subtype {}", subtype);
        let data = stream_bytes(stream);
        return Some(read_font_program(data, Some(subtype), to_unicode, converter));
    }

    if let Some(stream) = descriptor
        .get(b"FontFile2")
        .ok()
        .and_then(|o| resolve(doc, o).as_stream().ok())
    {
        let data = stream_bytes(stream);
        let format = detect_truetype_format(&data).map(str::to_string);
        return Some(read_font_program(data, format, to_unicode, converter));
    }

    if let Some(stream) = descriptor
        .get(b"FontFile")
        .ok()
        .and_then(|o| resolve(doc, o).as_stream().ok())
    {
        let data = stream_bytes(stream);
        return Some(read_font_program(
            data,
            Some(FORMAT_TYPE1.to_string()),
            to_unicode,
            converter,
        ));
    }

    log::debug!("No font program found");
    None
}

fn read_font_program(
    data: Vec<u8>,
    format: Option<String>,
    to_unicode: Option<&str>,
    converter: &CffConverter,
) -> FontProgramData {
    let engine = base64::engine::general_purpose::STANDARD;
    let mut result = FontProgramData {
        program: Some(engine.encode(&data)),
        format: format.clone(),
        ..Default::default()
    };

    let Some(format) = format.filter(|f| is_cff_format(f)) else {
        return result;
    };
    log::debug!("Program is {}, attempting conversion", format);

    if let Some(converted) = converter.convert_to_truetype(&data, to_unicode) {
        let detected = detect_font_flavor(&converted);
        let encoded = engine.encode(&converted);
        if detected == Some(FORMAT_TTF) {
            result.pdf_program = Some(encoded.clone());
            result.pdf_format = detected.map(str::to_string);
        }
        result.web_program = Some(encoded);
        result.web_format = detected.map(str::to_string);
    }

    if result.pdf_program.is_none() && converter.is_enabled() {
        if let Some(converted) = converter.convert_with_fontforge(&data) {
            if let Some(detected) = detect_font_flavor(&converted) {
                let encoded = engine.encode(&converted);
                if result.web_program.is_none() {
                    result.web_program = Some(encoded.clone());
                    result.web_format = Some(detected.to_string());
                }
                result.pdf_program = Some(encoded);
                result.pdf_format = Some(detected.to_string());
            }
        }
    }

    if result.web_program.is_none() && result.pdf_program.is_none() {
        log::warn!("All conversions failed for {} program", format);
    }
    result
}

/// Resolve the font descriptor, descending into the CID font of a Type0 font.
pub fn font_descriptor<'a>(doc: &'a Document, font: &'a Dictionary) -> Option<&'a Dictionary> {
    if let Some(descriptor) = font
        .get(b"FontDescriptor")
        .ok()
        .and_then(|o| resolve(doc, o).as_dict().ok())
    {
        return Some(descriptor);
    }
    descendant_font(doc, font)?
        .get(b"FontDescriptor")
        .ok()
        .and_then(|o| resolve(doc, o).as_dict().ok())
}

/// First descendant of a Type0 font.
pub fn descendant_font<'a>(doc: &'a Document, font: &'a Dictionary) -> Option<&'a Dictionary> {
    font.get(b"DescendantFonts")
        .ok()
        .and_then(|o| resolve(doc, o).as_array().ok())
        .and_then(|arr| arr.first())
        .and_then(|o| resolve(doc, o).as_dict().ok())
}

/// Check whether a font dictionary carries an embedded program.
pub fn is_embedded(doc: &Document, font: &Dictionary) -> bool {
    font_descriptor(doc, font).is_some_and(|d| {
        d.has(b"FontFile") || d.has(b"FontFile2") || d.has(b"FontFile3")
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use lopdf::{dictionary, Object, Stream};

    #[test]
    fn test_detect_font_flavor() {
        assert_eq!(detect_font_flavor(&[0, 1, 0, 0, 9]), Some("ttf"));
        assert_eq!(detect_font_flavor(b"true...."), Some("ttf"));
        assert_eq!(detect_font_flavor(b"OTTO...."), Some("otf"));
        assert_eq!(detect_font_flavor(b"ttcf...."), Some("cff"));
        assert_eq!(detect_font_flavor(b"%!PS"), None);
        assert_eq!(detect_font_flavor(b"ab"), None);
        assert_eq!(detect_truetype_format(b"true...."), None);
    }

    #[test]
    fn test_validate_font_tables() {
        assert!(validate_font_tables(&[0; 8]).is_err());
        let mut header = vec![0, 1, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0];
        assert_eq!(
            validate_font_tables(&header),
            Err("Invalid numTables: 0".to_string())
        );
        header[5] = 9;
        assert!(validate_font_tables(&header).is_ok());
        header[4] = 0x03;
        assert!(validate_font_tables(&header).is_err());
    }

    #[test]
    fn test_format_predicates() {
        assert!(is_cff_format("Type1C"));
        assert!(is_cff_format("CIDFontType0C"));
        assert!(is_cff_format("cff"));
        assert!(!is_cff_format("ttf"));
        assert!(is_type1_format("type1"));
        assert!(is_type1_format("font.pfb"));
    }

    #[test]
    fn test_extract_truetype_program() {
        let mut doc = Document::with_version("1.7");
        let program = vec![0, 1, 0, 0, 0, 4, 0, 0, 0, 0, 0, 0];
        let file_id = doc.add_object(Stream::new(dictionary! {}, program.clone()));
        let descriptor_id = doc.add_object(dictionary! {
            "Type" => "FontDescriptor",
            "FontFile2" => file_id,
        });
        let font = dictionary! {
            "Type" => "Font",
            "Subtype" => "TrueType",
            "FontDescriptor" => Object::Reference(descriptor_id),
        };

        let data = extract_font_program(&doc, &font, None, &CffConverter::disabled()).unwrap();
        assert_eq!(data.format.as_deref(), Some("ttf"));
        assert!(data.web_program.is_none());
        let decoded = base64::engine::general_purpose::STANDARD
            .decode(data.program.unwrap())
            .unwrap();
        assert_eq!(decoded, program);
        assert!(is_embedded(&doc, &font));
    }

    #[test]
    fn test_cff_program_kept_when_conversion_disabled() {
        let mut doc = Document::with_version("1.7");
        let file_id = doc.add_object(Stream::new(
            dictionary! { "Subtype" => "Type1C" },
            vec![1, 0, 4, 2],
        ));
        let descriptor_id = doc.add_object(dictionary! { "FontFile3" => file_id });
        let font = dictionary! { "FontDescriptor" => descriptor_id };

        let data = extract_font_program(&doc, &font, None, &CffConverter::disabled()).unwrap();
        assert_eq!(data.format.as_deref(), Some("Type1C"));
        assert!(data.program.is_some());
        assert!(data.pdf_program.is_none());
    }
}

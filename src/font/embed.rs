//! Writing font resources into a document.
//!
//! TrueType programs are embedded whole as Identity-H composite fonts. The
//! width array and ToUnicode CMap only cover the glyphs actually drawn, so
//! they are written once drawing is finished (see [`finish_embedded_font`]).

use super::encoder::{GlyphEncoder, TrueTypeEncoder};
use super::program::validate_font_tables;
use super::tounicode::build_to_unicode_cmap;
use crate::error::{Error, Result};
use lopdf::{dictionary, Document, Object, ObjectId, Stream};

/// Object ids of an embedded composite font.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EmbeddedFontObjects {
    /// The Type0 font (referenced from resources)
    pub font_id: ObjectId,
    /// The CIDFontType2 descendant
    pub cid_font_id: ObjectId,
}

/// Sanitize a font name for use as a PDF name.
pub fn sanitize_font_name(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .filter(|c| c.is_ascii_graphic() && !"()<>[]{}/%#".contains(*c))
        .collect();
    if cleaned.is_empty() {
        "Font".to_string()
    } else {
        cleaned
    }
}

/// Embed a TrueType or OpenType program as an Identity-H composite font.
///
/// glyf outlines go to `FontFile2` under a CIDFontType2, CFF outlines to an
/// OpenType `FontFile3` under a CIDFontType0.
pub fn embed_program(
    doc: &mut Document,
    program: &[u8],
    base_name: &str,
) -> Result<(EmbeddedFontObjects, TrueTypeEncoder)> {
    validate_font_tables(program).map_err(Error::FontDecode)?;
    let face = ttf_parser::Face::parse(program, 0)
        .map_err(|e| Error::FontDecode(format!("Unable to parse font program: {}", e)))?;
    let cff_outlines = face.tables().glyf.is_none() && face.tables().cff.is_some();
    let encoder = TrueTypeEncoder::from_face(&face);
    if encoder.glyph_count() == 0 {
        return Err(Error::FontDecode("Font has no Unicode cmap".to_string()));
    }

    let scale = 1000.0 / face.units_per_em().max(1) as f32;
    let bbox = face.global_bounding_box();
    let italic_angle = face.italic_angle().unwrap_or(0.0);
    let mut flags = 32;
    if face.is_monospaced() {
        flags |= 1;
    }
    if italic_angle != 0.0 {
        flags |= 64;
    }
    let name = sanitize_font_name(base_name);

    let (file_dict, file_key, cid_subtype) = if cff_outlines {
        (
            dictionary! { "Subtype" => "OpenType" },
            "FontFile3",
            "CIDFontType0",
        )
    } else {
        (
            dictionary! { "Length1" => program.len() as i64 },
            "FontFile2",
            "CIDFontType2",
        )
    };
    let mut file = Stream::new(file_dict, program.to_vec());
    let _ = file.compress();
    let file_id = doc.add_object(file);

    let scaled = |v: i16| (v as f32 * scale).round() as i64;
    let mut descriptor = dictionary! {
        "Type" => "FontDescriptor",
        "FontName" => Object::Name(name.clone().into_bytes()),
        "Flags" => flags,
        "FontBBox" => vec![
            Object::Integer(scaled(bbox.x_min)),
            Object::Integer(scaled(bbox.y_min)),
            Object::Integer(scaled(bbox.x_max)),
            Object::Integer(scaled(bbox.y_max)),
        ],
        "ItalicAngle" => Object::Real(italic_angle),
        "Ascent" => scaled(face.ascender()),
        "Descent" => scaled(face.descender()),
        "CapHeight" => scaled(face.capital_height().unwrap_or(face.ascender())),
        "StemV" => 80,
    };
    descriptor.set(file_key, file_id);
    let descriptor_id = doc.add_object(descriptor);

    let mut cid_font = dictionary! {
        "Type" => "Font",
        "Subtype" => cid_subtype,
        "BaseFont" => Object::Name(name.clone().into_bytes()),
        "CIDSystemInfo" => dictionary! {
            "Registry" => Object::string_literal("Adobe"),
            "Ordering" => Object::string_literal("Identity"),
            "Supplement" => 0,
        },
        "FontDescriptor" => descriptor_id,
        "DW" => 1000,
    };
    if !cff_outlines {
        cid_font.set("CIDToGIDMap", "Identity");
    }
    let cid_font_id = doc.add_object(cid_font);

    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type0",
        "BaseFont" => Object::Name(name.into_bytes()),
        "Encoding" => "Identity-H",
        "DescendantFonts" => vec![Object::Reference(cid_font_id)],
    });

    log::debug!(
        "Embedded {} font {} ({} bytes, {} mapped glyphs)",
        cid_subtype,
        base_name,
        program.len(),
        encoder.glyph_count()
    );
    Ok((
        EmbeddedFontObjects {
            font_id,
            cid_font_id,
        },
        encoder,
    ))
}

/// Write the width array and ToUnicode CMap of the glyphs drawn with an
/// embedded font. An unused font still describes its space glyph.
pub fn finish_embedded_font(
    doc: &mut Document,
    objects: EmbeddedFontObjects,
    encoder: &TrueTypeEncoder,
) -> Result<()> {
    if encoder.used_glyphs().is_empty() {
        let _ = encoder.encode(" ");
    }
    let used = encoder.used_glyphs();
    let widths = encoder.used_widths();

    let mut w = Vec::with_capacity(widths.len() * 2);
    for (gid, width) in &widths {
        w.push(Object::Integer(*gid as i64));
        w.push(Object::Array(vec![Object::Integer(*width as i64)]));
    }
    if let Ok(cid_font) = doc
        .get_object_mut(objects.cid_font_id)
        .and_then(Object::as_dict_mut)
    {
        cid_font.set("W", Object::Array(w));
    }

    let cmap = build_to_unicode_cmap(&used);
    let to_unicode_id = doc.add_object(Stream::new(dictionary! {}, cmap.into_bytes()));
    let font = doc
        .get_object_mut(objects.font_id)
        .and_then(Object::as_dict_mut)?;
    font.set("ToUnicode", to_unicode_id);
    Ok(())
}

/// Standard-14 base font names.
pub const STANDARD_14: &[&str] = &[
    "Times-Roman",
    "Times-Bold",
    "Times-Italic",
    "Times-BoldItalic",
    "Helvetica",
    "Helvetica-Bold",
    "Helvetica-Oblique",
    "Helvetica-BoldOblique",
    "Courier",
    "Courier-Bold",
    "Courier-Oblique",
    "Courier-BoldOblique",
    "Symbol",
    "ZapfDingbats",
];

/// Add a simple Type1 font dictionary for a Standard-14 font.
pub fn add_standard14_font(doc: &mut Document, name: &str) -> ObjectId {
    let mut font = dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => Object::Name(name.as_bytes().to_vec()),
    };
    if name != "Symbol" && name != "ZapfDingbats" {
        font.set("Encoding", "WinAnsiEncoding");
    }
    doc.add_object(font)
}

/// Embed a Type1 program (PFA or PFB) as a simple font with WinAnsi encoding.
pub fn embed_type1(doc: &mut Document, program: &[u8], base_name: &str) -> Result<ObjectId> {
    let (data, length1, length2) = split_type1_program(program)
        .ok_or_else(|| Error::FontDecode("Not a Type1 font program".to_string()))?;
    let name = sanitize_font_name(base_name);
    let length3 = data.len() - length1 - length2;
    let mut file = Stream::new(
        dictionary! {
            "Length1" => length1 as i64,
            "Length2" => length2 as i64,
            "Length3" => length3 as i64,
        },
        data,
    );
    let _ = file.compress();
    let file_id = doc.add_object(file);
    let descriptor_id = doc.add_object(dictionary! {
        "Type" => "FontDescriptor",
        "FontName" => Object::Name(name.clone().into_bytes()),
        "Flags" => 32,
        "FontBBox" => vec![
            Object::Integer(0),
            Object::Integer(-250),
            Object::Integer(1000),
            Object::Integer(1000),
        ],
        "ItalicAngle" => 0,
        "Ascent" => 750,
        "Descent" => -250,
        "CapHeight" => 700,
        "StemV" => 80,
        "FontFile" => file_id,
    });
    Ok(doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => Object::Name(name.into_bytes()),
        "Encoding" => "WinAnsiEncoding",
        "FontDescriptor" => descriptor_id,
    }))
}

/// Split a Type1 program into (cleartext + binary data, Length1, Length2).
/// PFB segment headers are removed.
fn split_type1_program(program: &[u8]) -> Option<(Vec<u8>, usize, usize)> {
    if program.first() == Some(&0x80) {
        let mut data = Vec::with_capacity(program.len());
        let mut lengths = Vec::new();
        let mut pos = 0;
        while pos + 6 <= program.len() && program[pos] == 0x80 && program[pos + 1] != 3 {
            let len = u32::from_le_bytes([
                program[pos + 2],
                program[pos + 3],
                program[pos + 4],
                program[pos + 5],
            ]) as usize;
            let start = pos + 6;
            let end = start.checked_add(len)?.min(program.len());
            data.extend_from_slice(&program[start..end]);
            lengths.push(end - start);
            pos = end;
        }
        let length1 = *lengths.first()?;
        let length2 = lengths.get(1).copied().unwrap_or(0);
        return Some((data, length1, length2));
    }

    if !program.starts_with(b"%!") {
        return None;
    }
    let marker = b"eexec";
    let eexec = program.windows(marker.len()).position(|w| w == marker)?;
    let mut length1 = eexec + marker.len();
    while length1 < program.len() && matches!(program[length1], b'\r' | b'\n') {
        length1 += 1;
    }
    let trailer = program
        .windows(b"cleartomark".len())
        .rposition(|w| w == b"cleartomark")
        .map(|p| {
            // the trailer starts with a run of zeros before cleartomark
            let mut start = p;
            while start > length1 && matches!(program[start - 1], b'0' | b'\r' | b'\n' | b' ') {
                start -= 1;
            }
            start
        })
        .unwrap_or(program.len());
    Some((program.to_vec(), length1, trailer - length1))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_font_name() {
        assert_eq!(sanitize_font_name("ABCDEF+Arial MT"), "ABCDEF+ArialMT");
        assert_eq!(sanitize_font_name("Fm0/F1"), "Fm0F1");
        assert_eq!(sanitize_font_name("()"), "Font");
    }

    #[test]
    fn test_standard14_font_dict() {
        let mut doc = Document::with_version("1.7");
        let id = add_standard14_font(&mut doc, "Helvetica");
        let font = doc.get_dictionary(id).unwrap();
        assert!(font.has(b"Encoding"));
        let id = add_standard14_font(&mut doc, "ZapfDingbats");
        assert!(!doc.get_dictionary(id).unwrap().has(b"Encoding"));
    }

    #[test]
    fn test_rejects_invalid_truetype() {
        let mut doc = Document::with_version("1.7");
        assert!(embed_program(&mut doc, &[0, 1, 0, 0], "Broken").is_err());
        let header = [0, 1, 0, 0, 0, 1, 0, 0, 0, 0, 0, 0];
        assert!(embed_program(&mut doc, &header, "Broken").is_err());
    }

    #[test]
    fn test_split_pfa_program() {
        let pfa = b"%!PS-AdobeFont-1.0: Test\n/FontName /Test def\ncurrentfile eexec\n\xAB\xCD\xEF\n0000000000\ncleartomark\n";
        let (data, length1, length2) = split_type1_program(pfa).unwrap();
        assert_eq!(data.len(), pfa.len());
        assert_eq!(&data[length1..length1 + 3], b"\xAB\xCD\xEF");
        assert_eq!(length2, 3);
        assert!(split_type1_program(b"garbage").is_none());
    }

    #[test]
    fn test_split_pfb_program() {
        let mut pfb = vec![0x80, 1, 3, 0, 0, 0];
        pfb.extend_from_slice(b"%!A");
        pfb.extend_from_slice(&[0x80, 2, 2, 0, 0, 0, 0xAA, 0xBB]);
        pfb.extend_from_slice(&[0x80, 3]);
        let (data, length1, length2) = split_type1_program(&pfb).unwrap();
        assert_eq!(data, b"%!A\xAA\xBB".to_vec());
        assert_eq!((length1, length2), (3, 2));
    }
}

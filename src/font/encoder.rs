//! Text to character code encoding for loaded fonts.

use super::tounicode::{parse_to_unicode, ToUnicodeMap};
use crate::util::{resolve, stream_bytes};
use lopdf::{Dictionary, Document};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Mutex;

/// Encodes Unicode text into the character codes of one font.
pub trait GlyphEncoder: fmt::Debug + Send + Sync {
    /// Check whether the font has a glyph for `ch`.
    fn can_encode(&self, ch: char) -> bool;

    /// Encode text; `None` when any character is unsupported.
    fn encode(&self, text: &str) -> Option<Vec<u8>>;

    /// Bytes per character code.
    fn code_length(&self) -> usize;

    /// Number of glyphs shown by a string operand, falling back to the
    /// byte length when the bytes do not split into codes.
    fn count_glyphs(&self, bytes: &[u8]) -> usize {
        let codes = bytes.len() / self.code_length().max(1);
        if codes > 0 {
            codes
        } else {
            bytes.len().max(1)
        }
    }

    /// Glyphs used so far, by glyph id, with their text. Only embedded
    /// programs track usage.
    fn used_glyphs(&self) -> BTreeMap<u16, String> {
        BTreeMap::new()
    }

    /// Check whether every character of `text` can be encoded.
    fn can_encode_text(&self, text: &str) -> bool {
        !text.is_empty() && text.chars().all(|c| self.can_encode(c))
    }
}

/// Glyph lookup for an embedded TrueType program written as an Identity-H
/// composite font. Codes are two-byte glyph ids.
pub struct TrueTypeEncoder {
    /// char -> (glyph id, advance in 1000 units)
    glyphs: HashMap<char, (u16, u16)>,
    usage: Mutex<BTreeMap<u16, String>>,
}

impl fmt::Debug for TrueTypeEncoder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TrueTypeEncoder")
            .field("glyphs", &self.glyphs.len())
            .finish()
    }
}

impl TrueTypeEncoder {
    /// Build the lookup from the font's Unicode cmap subtables.
    pub fn from_face(face: &ttf_parser::Face<'_>) -> Self {
        let units_per_em = face.units_per_em().max(1) as f32;
        let scale = 1000.0 / units_per_em;
        let mut glyphs = HashMap::new();
        if let Some(cmap) = face.tables().cmap {
            for subtable in cmap.subtables {
                if !subtable.is_unicode() {
                    continue;
                }
                subtable.codepoints(|cp| {
                    let Some(ch) = char::from_u32(cp) else {
                        return;
                    };
                    if glyphs.contains_key(&ch) {
                        return;
                    }
                    if let Some(gid) = subtable.glyph_index(cp).filter(|g| g.0 != 0) {
                        let advance = face.glyph_hor_advance(gid).unwrap_or(0) as f32 * scale;
                        glyphs.insert(ch, (gid.0, advance.round().clamp(0.0, u16::MAX as f32) as u16));
                    }
                });
            }
        }
        Self {
            glyphs,
            usage: Mutex::new(BTreeMap::new()),
        }
    }

    /// Advance widths of the used glyphs.
    pub fn used_widths(&self) -> BTreeMap<u16, u16> {
        let used = self.used_glyphs();
        let mut widths = BTreeMap::new();
        for text in used.values() {
            if let Some((gid, advance)) = text.chars().next().and_then(|c| self.glyphs.get(&c)) {
                widths.insert(*gid, *advance);
            }
        }
        widths
    }

    pub fn glyph_count(&self) -> usize {
        self.glyphs.len()
    }
}

impl GlyphEncoder for TrueTypeEncoder {
    fn can_encode(&self, ch: char) -> bool {
        self.glyphs.contains_key(&ch)
    }

    fn encode(&self, text: &str) -> Option<Vec<u8>> {
        let mut out = Vec::with_capacity(text.len() * 2);
        let mut used = Vec::new();
        for ch in text.chars() {
            let (gid, _) = self.glyphs.get(&ch)?;
            out.extend_from_slice(&gid.to_be_bytes());
            used.push((*gid, ch));
        }
        if let Ok(mut usage) = self.usage.lock() {
            for (gid, ch) in used {
                usage.entry(gid).or_insert_with(|| ch.to_string());
            }
        }
        Some(out)
    }

    fn code_length(&self) -> usize {
        2
    }

    fn used_glyphs(&self) -> BTreeMap<u16, String> {
        self.usage.lock().map(|u| u.clone()).unwrap_or_default()
    }
}

/// Encoder built from an existing font dictionary by inverting its code to
/// Unicode mapping (ToUnicode CMap, else the simple font encoding).
#[derive(Debug, Clone, Default)]
pub struct CodeMapEncoder {
    code_len: usize,
    reverse: HashMap<char, u32>,
}

impl CodeMapEncoder {
    pub fn from_map(map: &ToUnicodeMap) -> Self {
        let mut reverse = HashMap::new();
        for (code, text) in &map.entries {
            let mut chars = text.chars();
            if let (Some(ch), None) = (chars.next(), chars.next()) {
                reverse.entry(ch).or_insert(*code);
            }
        }
        Self {
            code_len: map.code_len.max(1),
            reverse,
        }
    }

    /// Invert the encoding of a font dictionary.
    pub fn from_font_dict(doc: &Document, font: &Dictionary) -> Self {
        Self::from_map(&font_code_map(doc, font))
    }

    pub fn is_empty(&self) -> bool {
        self.reverse.is_empty()
    }
}

impl GlyphEncoder for CodeMapEncoder {
    fn can_encode(&self, ch: char) -> bool {
        self.reverse.contains_key(&ch)
    }

    fn encode(&self, text: &str) -> Option<Vec<u8>> {
        let mut out = Vec::with_capacity(text.len() * self.code_len);
        for ch in text.chars() {
            let code = *self.reverse.get(&ch)?;
            let bytes = code.to_be_bytes();
            out.extend_from_slice(&bytes[4 - self.code_len.min(4)..]);
        }
        Some(out)
    }

    fn code_length(&self) -> usize {
        self.code_len
    }
}

/// Code to Unicode mapping of a font dictionary: its ToUnicode CMap, else
/// the simple font encoding, else printable ASCII. Composite fonts always
/// use two-byte codes.
pub fn font_code_map(doc: &Document, font: &Dictionary) -> ToUnicodeMap {
    let composite = font
        .get(b"Subtype")
        .ok()
        .and_then(|o| o.as_name().ok())
        .is_some_and(|n| n == b"Type0");

    if let Some(stream) = font
        .get(b"ToUnicode")
        .ok()
        .and_then(|o| resolve(doc, o).as_stream().ok())
    {
        let mut map = parse_to_unicode(&stream_bytes(stream));
        if !map.is_empty() {
            if composite {
                map.code_len = 2;
            }
            return map;
        }
    }

    if composite {
        return ToUnicodeMap {
            code_len: 2,
            ..Default::default()
        };
    }

    let mut map = ToUnicodeMap {
        code_len: 1,
        ..Default::default()
    };
    match font.get_font_encoding(doc) {
        Ok(encoding) => {
            for code in 0u8..=255 {
                if let Ok(text) = Document::decode_text(&encoding, &[code]) {
                    if !text.is_empty() && text != "\u{fffd}" {
                        map.entries.insert(code as u32, text);
                    }
                }
            }
        }
        Err(e) => log::debug!("Font encoding unavailable: {}", e),
    }
    if map.is_empty() {
        for code in 0x20u8..=0x7E {
            map.entries.insert(code as u32, (code as char).to_string());
        }
    }
    map
}

/// Encoder of a glyph-indexed (Type3) font: nothing can be encoded from
/// text, glyphs are only reproduced from their raw character codes.
#[derive(Debug, Clone, Copy, Default)]
pub struct RawCodeEncoder;

impl GlyphEncoder for RawCodeEncoder {
    fn can_encode(&self, _ch: char) -> bool {
        false
    }

    fn encode(&self, _text: &str) -> Option<Vec<u8>> {
        None
    }

    fn code_length(&self) -> usize {
        1
    }
}

//! ToUnicode CMap parsing and generation.

use base64::Engine;
use regex::Regex;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::OnceLock;

/// Character code to Unicode mapping parsed from a ToUnicode CMap.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ToUnicodeMap {
    /// Bytes per character code (from the codespace range, else the widest source code)
    pub code_len: usize,
    pub entries: BTreeMap<u32, String>,
}

impl ToUnicodeMap {
    pub fn get(&self, code: u32) -> Option<&str> {
        self.entries.get(&code).map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Reverse mapping: Unicode text to character code. The lowest code wins.
    pub fn reverse(&self) -> BTreeMap<String, u32> {
        let mut reversed = BTreeMap::new();
        for (code, text) in &self.entries {
            reversed.entry(text.clone()).or_insert(*code);
        }
        reversed
    }
}

#[derive(Debug, PartialEq)]
enum Token {
    Hex(Vec<u8>),
    Open,
    Close,
    Word(String),
}

fn tokenize(text: &str) -> Vec<Token> {
    let bytes = text.as_bytes();
    let mut tokens = Vec::new();
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'<' if bytes.get(i + 1) == Some(&b'<') => i += 2,
            b'>' if bytes.get(i + 1) == Some(&b'>') => i += 2,
            b'<' => {
                let start = i + 1;
                let end = text[start..].find('>').map(|p| start + p).unwrap_or(bytes.len());
                tokens.push(Token::Hex(parse_hex(&text[start..end])));
                i = end + 1;
            }
            b'[' => {
                tokens.push(Token::Open);
                i += 1;
            }
            b']' => {
                tokens.push(Token::Close);
                i += 1;
            }
            b'%' => {
                while i < bytes.len() && bytes[i] != b'\n' && bytes[i] != b'\r' {
                    i += 1;
                }
            }
            b if b.is_ascii_whitespace() => i += 1,
            b'(' => {
                while i < bytes.len() && bytes[i] != b')' {
                    i += 1;
                }
                i += 1;
            }
            _ => {
                let start = i;
                while i < bytes.len()
                    && !bytes[i].is_ascii_whitespace()
                    && !matches!(bytes[i], b'<' | b'>' | b'[' | b']' | b'(' | b'%')
                {
                    i += 1;
                }
                if i == start {
                    i += 1;
                } else {
                    tokens.push(Token::Word(text[start..i].to_string()));
                }
            }
        }
    }
    tokens
}

fn parse_hex(s: &str) -> Vec<u8> {
    let digits: Vec<u8> = s
        .bytes()
        .filter(|b| b.is_ascii_hexdigit())
        .map(|b| (b as char).to_digit(16).unwrap_or(0) as u8)
        .collect();
    digits
        .chunks(2)
        .map(|pair| (pair[0] << 4) | pair.get(1).copied().unwrap_or(0))
        .collect()
}

fn code_value(bytes: &[u8]) -> u32 {
    bytes.iter().fold(0u32, |acc, b| (acc << 8) | *b as u32)
}

/// Decode a UTF-16BE destination string.
fn utf16_text(bytes: &[u8]) -> String {
    let units: Vec<u16> = bytes
        .chunks(2)
        .map(|c| u16::from_be_bytes([c[0], c.get(1).copied().unwrap_or(0)]))
        .collect();
    String::from_utf16_lossy(&units)
}

/// Parse a ToUnicode CMap program.
pub fn parse_to_unicode(data: &[u8]) -> ToUnicodeMap {
    let text = String::from_utf8_lossy(data);
    let tokens = tokenize(&text);
    let mut map = ToUnicodeMap::default();
    let mut codespace_len = None;
    let mut max_src_len = 0;

    let mut i = 0;
    while i < tokens.len() {
        match &tokens[i] {
            Token::Word(w) if w == "begincodespacerange" => {
                if let Some(Token::Hex(low)) = tokens.get(i + 1) {
                    codespace_len = Some(low.len());
                }
                i += 1;
            }
            Token::Word(w) if w == "beginbfchar" => {
                i += 1;
                while i + 1 < tokens.len() {
                    match (&tokens[i], &tokens[i + 1]) {
                        (Token::Hex(src), Token::Hex(dst)) => {
                            max_src_len = max_src_len.max(src.len());
                            map.entries.insert(code_value(src), utf16_text(dst));
                            i += 2;
                        }
                        _ => break,
                    }
                }
            }
            Token::Word(w) if w == "beginbfrange" => {
                i += 1;
                while i + 2 < tokens.len() {
                    let (Token::Hex(lo), Token::Hex(hi)) = (&tokens[i], &tokens[i + 1]) else {
                        break;
                    };
                    max_src_len = max_src_len.max(lo.len());
                    let (start, end) = (code_value(lo), code_value(hi));
                    match &tokens[i + 2] {
                        Token::Hex(dst) => {
                            if start <= end && end - start <= 0xFFFF {
                                insert_range(&mut map, start, end, dst);
                            }
                            i += 3;
                        }
                        Token::Open => {
                            let mut j = i + 3;
                            let mut code = start;
                            while let Some(Token::Hex(dst)) = tokens.get(j) {
                                if code <= end {
                                    map.entries.insert(code, utf16_text(dst));
                                }
                                code += 1;
                                j += 1;
                            }
                            i = j + 1;
                        }
                        _ => break,
                    }
                }
            }
            _ => i += 1,
        }
    }

    map.code_len = codespace_len.unwrap_or(max_src_len).max(1);
    map
}

fn insert_range(map: &mut ToUnicodeMap, start: u32, end: u32, dst: &[u8]) {
    if dst.len() < 2 {
        return;
    }
    let prefix = &dst[..dst.len() - 2];
    let last = u16::from_be_bytes([dst[dst.len() - 2], dst[dst.len() - 1]]);
    for (offset, code) in (start..=end).enumerate() {
        let mut bytes = prefix.to_vec();
        bytes.extend_from_slice(&last.wrapping_add(offset as u16).to_be_bytes());
        map.entries.insert(code, utf16_text(&bytes));
    }
}

/// Write a ToUnicode CMap for two-byte codes.
pub fn build_to_unicode_cmap(entries: &BTreeMap<u16, String>) -> String {
    let mut out = String::new();
    out.push_str("/CIDInit /ProcSet findresource begin\n");
    out.push_str("12 dict begin\n");
    out.push_str("begincmap\n");
    out.push_str("/CIDSystemInfo << /Registry (Adobe) /Ordering (UCS) /Supplement 0 >> def\n");
    out.push_str("/CMapName /Adobe-Identity-UCS def\n");
    out.push_str("/CMapType 2 def\n");
    out.push_str("1 begincodespacerange\n<0000> <FFFF>\nendcodespacerange\n");

    let entries: Vec<_> = entries.iter().collect();
    for chunk in entries.chunks(100) {
        out.push_str(&format!("{} beginbfchar\n", chunk.len()));
        for (code, text) in chunk {
            let hex: String = text.encode_utf16().map(|u| format!("{:04X}", u)).collect();
            out.push_str(&format!("<{:04X}> <{}>\n", code, hex));
        }
        out.push_str("endbfchar\n");
    }

    out.push_str("endcmap\n");
    out.push_str("CMapName currentdict /CMap defineresource pop\n");
    out.push_str("end\nend\n");
    out
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CidUnicodeMap {
    #[serde(rename = "isCID")]
    is_cid: bool,
    cid_to_gid_identity: bool,
    entries: Vec<CidUnicodeEntry>,
}

#[derive(Serialize)]
struct CidUnicodeEntry {
    code: u32,
    cid: u32,
    gid: u32,
    unicode: u32,
}

fn bfchar_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"<([0-9A-Fa-f]+)>\s*<([0-9A-Fa-f]+)>").expect("valid regex")
    })
}

/// Build the structured code -> CID -> GID -> Unicode table for a composite
/// font from its base64 ToUnicode CMap.
///
/// Simple fonts, and CMaps that cannot be read, keep the CMap unchanged.
/// Composite fonts here use Identity encodings, so CID and GID equal the code.
pub fn build_unicode_mapping(to_unicode: Option<&str>, composite: bool) -> Option<String> {
    let encoded = to_unicode.filter(|s| !s.trim().is_empty())?;
    if !composite {
        return Some(encoded.to_string());
    }
    let engine = base64::engine::general_purpose::STANDARD;
    let Ok(bytes) = engine.decode(encoded) else {
        return Some(encoded.to_string());
    };
    let text = String::from_utf8_lossy(&bytes);

    let mut pairs = BTreeMap::new();
    for capture in bfchar_pattern().captures_iter(&text) {
        let (Ok(code), Ok(unicode)) = (
            u32::from_str_radix(&capture[1], 16),
            u32::from_str_radix(&capture[2], 16),
        ) else {
            continue;
        };
        pairs.insert(code, unicode);
    }

    let map = CidUnicodeMap {
        is_cid: true,
        cid_to_gid_identity: true,
        entries: pairs
            .into_iter()
            .map(|(code, unicode)| CidUnicodeEntry {
                code,
                cid: code,
                gid: code,
                unicode,
            })
            .collect(),
    };
    match serde_json::to_vec(&map) {
        Ok(json) => {
            log::debug!("Built Unicode mapping with {} entries", map.entries.len());
            Some(engine.encode(json))
        }
        Err(e) => {
            log::warn!("Failed to build Unicode mapping: {}", e);
            Some(encoded.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "/CIDInit /ProcSet findresource begin\n\
        begincmap\n\
        1 begincodespacerange <0000> <FFFF> endcodespacerange\n\
        2 beginbfchar\n<0003> <0020>\n<0024> <0041>\nendbfchar\n\
        2 beginbfrange\n<0044> <0046> <0061>\n<0050> <0051> [<0078> <D83DDE00>]\nendbfrange\n\
        endcmap";

    #[test]
    fn test_parse_bfchar_and_bfrange() {
        let map = parse_to_unicode(SAMPLE.as_bytes());
        assert_eq!(map.code_len, 2);
        assert_eq!(map.get(0x03), Some(" "));
        assert_eq!(map.get(0x24), Some("A"));
        assert_eq!(map.get(0x45), Some("b"));
        assert_eq!(map.get(0x46), Some("c"));
        assert_eq!(map.get(0x50), Some("x"));
        assert_eq!(map.get(0x51), Some("\u{1F600}"));
    }

    #[test]
    fn test_single_line_cmap() {
        let map = parse_to_unicode(b"1 beginbfchar <41> <0042> endbfchar");
        assert_eq!(map.code_len, 1);
        assert_eq!(map.get(0x41), Some("B"));
        assert_eq!(map.reverse().get("B"), Some(&0x41));
    }

    #[test]
    fn test_generated_cmap_parses_back() {
        let mut entries = BTreeMap::new();
        entries.insert(5u16, "\u{d55c}".to_string());
        entries.insert(7u16, "\u{1F600}".to_string());
        let cmap = build_to_unicode_cmap(&entries);
        let map = parse_to_unicode(cmap.as_bytes());
        assert_eq!(map.get(5), Some("\u{d55c}"));
        assert_eq!(map.get(7), Some("\u{1F600}"));
    }

    #[test]
    fn test_unicode_mapping_for_composite_font() {
        let engine = base64::engine::general_purpose::STANDARD;
        let encoded = engine.encode("1 beginbfchar <0024> <0041> endbfchar");
        let mapping = build_unicode_mapping(Some(&encoded), true).unwrap();
        let json: serde_json::Value =
            serde_json::from_slice(&engine.decode(mapping).unwrap()).unwrap();
        assert_eq!(json["isCID"], true);
        assert_eq!(json["entries"][0]["code"], 0x24);
        assert_eq!(json["entries"][0]["unicode"], 0x41);

        assert_eq!(build_unicode_mapping(Some(&encoded), false), Some(encoded));
        assert_eq!(build_unicode_mapping(None, true), None);
    }
}

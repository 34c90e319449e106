//! Script-aware fallback font catalog.
//!
//! Fallback fonts are TrueType files looked up by id in a font directory.
//! A font is picked either from the family of the font it replaces (with
//! weight and style when the family ships those variants) or from the
//! Unicode script of the code point that could not be encoded.

use crate::error::{Error, Result};
use crate::model::FontModel;
use base64::Engine;
use regex::Regex;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock, RwLock};
use unicode_normalization::UnicodeNormalization;

pub const FALLBACK_FONT_ID: &str = "fallback-noto-sans";
pub const FALLBACK_FONT_CJK_ID: &str = "fallback-noto-cjk";
pub const FALLBACK_FONT_JP_ID: &str = "fallback-noto-jp";
pub const FALLBACK_FONT_KR_ID: &str = "fallback-noto-korean";
pub const FALLBACK_FONT_TC_ID: &str = "fallback-noto-tc";
pub const FALLBACK_FONT_AR_ID: &str = "fallback-noto-arabic";
pub const FALLBACK_FONT_TH_ID: &str = "fallback-noto-thai";
pub const FALLBACK_FONT_DEVANAGARI_ID: &str = "fallback-noto-devanagari";
pub const FALLBACK_FONT_MALAYALAM_ID: &str = "fallback-noto-malayalam";
pub const FALLBACK_FONT_TIBETAN_ID: &str = "fallback-noto-tibetan";

/// Family aliases: normalized family name to metric-compatible substitute.
const FONT_NAME_ALIASES: &[(&str, &str)] = &[
    ("arial", "fallback-liberation-sans"),
    ("arialmt", "fallback-liberation-sans"),
    ("helvetica", "fallback-liberation-sans"),
    ("arimo", "fallback-liberation-sans"),
    ("liberationsans", "fallback-liberation-sans"),
    ("times", "fallback-liberation-serif"),
    ("timesnewroman", "fallback-liberation-serif"),
    ("timesnewromanpsmt", "fallback-liberation-serif"),
    ("tinos", "fallback-liberation-serif"),
    ("liberationserif", "fallback-liberation-serif"),
    ("courier", "fallback-liberation-mono"),
    ("couriernew", "fallback-liberation-mono"),
    ("couriernewpsmt", "fallback-liberation-mono"),
    ("cousine", "fallback-liberation-mono"),
    ("liberationmono", "fallback-liberation-mono"),
    ("dejavu", "fallback-dejavu-sans"),
    ("dejavusans", "fallback-dejavu-sans"),
    ("dejavuserif", "fallback-dejavu-serif"),
    ("dejavumono", "fallback-dejavu-mono"),
    ("dejavusansmono", "fallback-dejavu-mono"),
    ("mingliu", FALLBACK_FONT_TC_ID),
    ("pmingliu", FALLBACK_FONT_TC_ID),
    ("microsoftjhenghei", FALLBACK_FONT_TC_ID),
    ("jhenghei", FALLBACK_FONT_TC_ID),
    ("kaiti", FALLBACK_FONT_TC_ID),
    ("kaiu", FALLBACK_FONT_TC_ID),
    ("dfkaib5", FALLBACK_FONT_TC_ID),
    ("dfkai", FALLBACK_FONT_TC_ID),
    ("simsun", FALLBACK_FONT_CJK_ID),
    ("simhei", FALLBACK_FONT_CJK_ID),
    ("microsoftyahei", FALLBACK_FONT_CJK_ID),
    ("yahei", FALLBACK_FONT_CJK_ID),
    ("songti", FALLBACK_FONT_CJK_ID),
    ("heiti", FALLBACK_FONT_CJK_ID),
    ("noto", FALLBACK_FONT_ID),
    ("notosans", FALLBACK_FONT_ID),
];

/// Fallback id to (file name, base font name).
const FALLBACK_FONTS: &[(&str, &str, &str)] = &[
    (FALLBACK_FONT_ID, "NotoSans-Regular.ttf", "NotoSans-Regular"),
    ("fallback-noto-sans-bold", "NotoSans-Bold.ttf", "NotoSans-Bold"),
    ("fallback-noto-sans-italic", "NotoSans-Italic.ttf", "NotoSans-Italic"),
    ("fallback-noto-sans-bolditalic", "NotoSans-BoldItalic.ttf", "NotoSans-BoldItalic"),
    (FALLBACK_FONT_CJK_ID, "NotoSansSC-Regular.ttf", "NotoSansSC-Regular"),
    (FALLBACK_FONT_JP_ID, "NotoSansJP-Regular.ttf", "NotoSansJP-Regular"),
    (FALLBACK_FONT_KR_ID, "NotoSansKR-Regular.ttf", "NotoSansKR-Regular"),
    (FALLBACK_FONT_TC_ID, "NotoSansTC-Regular.ttf", "NotoSansTC-Regular"),
    (FALLBACK_FONT_AR_ID, "NotoSansArabic-Regular.ttf", "NotoSansArabic-Regular"),
    (FALLBACK_FONT_TH_ID, "NotoSansThai-Regular.ttf", "NotoSansThai-Regular"),
    (FALLBACK_FONT_DEVANAGARI_ID, "NotoSansDevanagari-Regular.ttf", "NotoSansDevanagari-Regular"),
    (FALLBACK_FONT_MALAYALAM_ID, "NotoSansMalayalam-Regular.ttf", "NotoSansMalayalam-Regular"),
    (FALLBACK_FONT_TIBETAN_ID, "NotoSerifTibetan-Regular.ttf", "NotoSerifTibetan-Regular"),
    ("fallback-liberation-sans", "LiberationSans-Regular.ttf", "LiberationSans"),
    ("fallback-liberation-sans-bold", "LiberationSans-Bold.ttf", "LiberationSans-Bold"),
    ("fallback-liberation-sans-italic", "LiberationSans-Italic.ttf", "LiberationSans-Italic"),
    ("fallback-liberation-sans-bolditalic", "LiberationSans-BoldItalic.ttf", "LiberationSans-BoldItalic"),
    ("fallback-liberation-serif", "LiberationSerif-Regular.ttf", "LiberationSerif"),
    ("fallback-liberation-serif-bold", "LiberationSerif-Bold.ttf", "LiberationSerif-Bold"),
    ("fallback-liberation-serif-italic", "LiberationSerif-Italic.ttf", "LiberationSerif-Italic"),
    ("fallback-liberation-serif-bolditalic", "LiberationSerif-BoldItalic.ttf", "LiberationSerif-BoldItalic"),
    ("fallback-liberation-mono", "LiberationMono-Regular.ttf", "LiberationMono"),
    ("fallback-liberation-mono-bold", "LiberationMono-Bold.ttf", "LiberationMono-Bold"),
    ("fallback-liberation-mono-italic", "LiberationMono-Italic.ttf", "LiberationMono-Italic"),
    ("fallback-liberation-mono-bolditalic", "LiberationMono-BoldItalic.ttf", "LiberationMono-BoldItalic"),
    ("fallback-dejavu-sans", "DejaVuSans.ttf", "DejaVuSans"),
    ("fallback-dejavu-sans-bold", "DejaVuSans-Bold.ttf", "DejaVuSans-Bold"),
    ("fallback-dejavu-sans-oblique", "DejaVuSans-Oblique.ttf", "DejaVuSans-Oblique"),
    ("fallback-dejavu-sans-boldoblique", "DejaVuSans-BoldOblique.ttf", "DejaVuSans-BoldOblique"),
    ("fallback-dejavu-serif", "DejaVuSerif.ttf", "DejaVuSerif"),
    ("fallback-dejavu-serif-bold", "DejaVuSerif-Bold.ttf", "DejaVuSerif-Bold"),
    ("fallback-dejavu-serif-italic", "DejaVuSerif-Italic.ttf", "DejaVuSerif-Italic"),
    ("fallback-dejavu-serif-bolditalic", "DejaVuSerif-BoldItalic.ttf", "DejaVuSerif-BoldItalic"),
    ("fallback-dejavu-mono", "DejaVuSansMono.ttf", "DejaVuSansMono"),
    ("fallback-dejavu-mono-bold", "DejaVuSansMono-Bold.ttf", "DejaVuSansMono-Bold"),
    ("fallback-dejavu-mono-oblique", "DejaVuSansMono-Oblique.ttf", "DejaVuSansMono-Oblique"),
    ("fallback-dejavu-mono-boldoblique", "DejaVuSansMono-BoldOblique.ttf", "DejaVuSansMono-BoldOblique"),
];

/// File name and base font name of a fallback id.
pub fn fallback_font_spec(fallback_id: &str) -> Option<(&'static str, &'static str)> {
    FALLBACK_FONTS
        .iter()
        .find(|(id, _, _)| *id == fallback_id)
        .map(|(_, file, base)| (*file, *base))
}

/// Check whether an id names a catalog font.
pub fn is_fallback_font_id(id: &str) -> bool {
    fallback_font_spec(id).is_some()
}

fn subset_prefix() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[A-Z]{6}\+").expect("valid regex"))
}

fn numeric_bold() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"[_-]?[6-9]00(wght)?").expect("valid regex"))
}

/// Strip the subset prefix, fold full-width forms, lowercase and drop whitespace.
pub fn normalize_font_name(name: &str) -> String {
    subset_prefix()
        .replace(name, "")
        .nfkc()
        .collect::<String>()
        .to_lowercase()
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect()
}

/// Bold, heavy, black or a 600-900 numeric weight.
pub fn detect_bold(normalized: &str) -> bool {
    normalized.contains("bold")
        || normalized.contains("heavy")
        || normalized.contains("black")
        || numeric_bold().is_match(normalized)
}

pub fn detect_italic(normalized: &str) -> bool {
    normalized.contains("italic") || normalized.contains("oblique")
}

fn apply_weight_style(base_id: &str, bold: bool, italic: bool) -> String {
    let supported = base_id.starts_with("fallback-liberation-")
        || base_id == FALLBACK_FONT_ID
        || base_id.starts_with("fallback-dejavu-");
    if !supported {
        return base_id.to_string();
    }
    let oblique = base_id == "fallback-dejavu-sans" || base_id == "fallback-dejavu-mono";
    match (bold, italic) {
        (true, true) if oblique => format!("{}-boldoblique", base_id),
        (true, true) => format!("{}-bolditalic", base_id),
        (true, false) => format!("{}-bold", base_id),
        (false, true) if oblique => format!("{}-oblique", base_id),
        (false, true) => format!("{}-italic", base_id),
        (false, false) => base_id.to_string(),
    }
}

/// Pick a fallback for `code_point`, preferring the family of `original_name`.
pub fn resolve_fallback_font_id(original_name: Option<&str>, code_point: u32) -> String {
    if let Some(name) = original_name.filter(|n| !n.is_empty()) {
        let normalized = normalize_font_name(name);
        let family = normalized.split(['-', '_', ',', '+']).next().unwrap_or("");
        if let Some((_, alias)) = FONT_NAME_ALIASES.iter().find(|(f, _)| *f == family) {
            let bold = detect_bold(&normalized);
            let italic = detect_italic(&normalized);
            let styled = apply_weight_style(alias, bold, italic);
            log::debug!(
                "Matched font '{}' (family '{}', bold: {}, italic: {}) to fallback '{}'",
                name,
                family,
                bold,
                italic,
                styled
            );
            return styled;
        }
    }
    resolve_fallback_font_id_for_code_point(code_point).to_string()
}

struct ScriptPatterns {
    han: Regex,
    kana: Regex,
    hangul: Regex,
    arabic: Regex,
    thai: Regex,
    devanagari: Regex,
    malayalam: Regex,
    tibetan: Regex,
}

fn script_patterns() -> &'static ScriptPatterns {
    static PATTERNS: OnceLock<ScriptPatterns> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        let compile = |p: &str| Regex::new(p).expect("valid regex");
        ScriptPatterns {
            han: compile(r"\p{Han}"),
            kana: compile(r"[\p{Hiragana}\p{Katakana}]"),
            hangul: compile(r"\p{Hangul}"),
            arabic: compile(r"\p{Arabic}"),
            thai: compile(r"\p{Thai}"),
            devanagari: compile(r"\p{Devanagari}"),
            malayalam: compile(r"\p{Malayalam}"),
            tibetan: compile(r"\p{Tibetan}"),
        }
    })
}

/// Pick a fallback by Unicode block, then by script.
pub fn resolve_fallback_font_id_for_code_point(code_point: u32) -> &'static str {
    let cp = code_point;
    // Bopomofo and compatibility ideographs are mostly Traditional Chinese
    if (0x3100..=0x312F).contains(&cp)
        || (0x31A0..=0x31BF).contains(&cp)
        || (0xF900..=0xFAFF).contains(&cp)
        || (0x2F800..=0x2FA1F).contains(&cp)
    {
        return FALLBACK_FONT_TC_ID;
    }
    if (0x4E00..=0x9FFF).contains(&cp)
        || (0x3400..=0x4DBF).contains(&cp)
        || (0x20000..=0x2EBEF).contains(&cp)
        || (0x3000..=0x303F).contains(&cp)
        || (0xFF00..=0xFFEF).contains(&cp)
    {
        return FALLBACK_FONT_CJK_ID;
    }

    let Some(c) = char::from_u32(cp) else {
        return FALLBACK_FONT_ID;
    };
    let mut buf = [0u8; 4];
    let s: &str = c.encode_utf8(&mut buf);
    let scripts = script_patterns();
    if scripts.han.is_match(s) {
        FALLBACK_FONT_CJK_ID
    } else if scripts.kana.is_match(s) {
        FALLBACK_FONT_JP_ID
    } else if scripts.hangul.is_match(s) {
        FALLBACK_FONT_KR_ID
    } else if scripts.arabic.is_match(s) {
        FALLBACK_FONT_AR_ID
    } else if scripts.thai.is_match(s) {
        FALLBACK_FONT_TH_ID
    } else if scripts.devanagari.is_match(s) {
        FALLBACK_FONT_DEVANAGARI_ID
    } else if scripts.malayalam.is_match(s) {
        FALLBACK_FONT_MALAYALAM_ID
    } else if scripts.tibetan.is_match(s) {
        FALLBACK_FONT_TIBETAN_ID
    } else {
        FALLBACK_FONT_ID
    }
}

/// Replacement text for glyphs known to be missing from common fonts.
pub fn map_unsupported_glyph(code_point: u32) -> Option<&'static str> {
    match code_point {
        0x276E => Some("<"),
        0x276F => Some(">"),
        _ => None,
    }
}

/// Loads fallback font files from a directory and caches their bytes.
#[derive(Debug)]
pub struct FallbackFontCatalog {
    font_dir: PathBuf,
    cache: RwLock<HashMap<String, Arc<Vec<u8>>>>,
}

impl FallbackFontCatalog {
    pub fn new(font_dir: impl Into<PathBuf>) -> Self {
        Self {
            font_dir: font_dir.into(),
            cache: RwLock::new(HashMap::new()),
        }
    }

    pub fn font_dir(&self) -> &Path {
        &self.font_dir
    }

    /// Program bytes of a fallback font.
    pub fn load_font_bytes(&self, fallback_id: &str) -> Result<Arc<Vec<u8>>> {
        if let Ok(cache) = self.cache.read() {
            if let Some(bytes) = cache.get(fallback_id) {
                return Ok(Arc::clone(bytes));
            }
        }
        let (file, _) = fallback_font_spec(fallback_id)
            .ok_or_else(|| Error::FontDecode(format!("Unknown fallback font id {}", fallback_id)))?;
        let path = self.font_dir.join(file);
        let bytes = std::fs::read(&path).map_err(|e| {
            Error::FontDecode(format!(
                "Fallback font resource not found at {}: {}",
                path.display(),
                e
            ))
        })?;
        let bytes = Arc::new(bytes);
        if let Ok(mut cache) = self.cache.write() {
            cache.insert(fallback_id.to_string(), Arc::clone(&bytes));
        }
        Ok(bytes)
    }

    /// Check whether the file for a fallback id can be loaded.
    pub fn is_available(&self, fallback_id: &str) -> bool {
        self.load_font_bytes(fallback_id).is_ok()
    }

    /// Build the font model of a fallback font, page-independent and embedded.
    pub fn build_fallback_font_model(&self, fallback_id: &str) -> Result<FontModel> {
        let (_, base_name) = fallback_font_spec(fallback_id)
            .ok_or_else(|| Error::FontDecode(format!("Unknown fallback font id {}", fallback_id)))?;
        let bytes = self.load_font_bytes(fallback_id)?;
        Ok(FontModel {
            id: fallback_id.to_string(),
            uid: Some(fallback_id.to_string()),
            page_number: Some(crate::model::PAGE_INDEPENDENT),
            base_name: Some(base_name.to_string()),
            subtype: Some("TrueType".to_string()),
            embedded: Some(true),
            program: Some(base64::engine::general_purpose::STANDARD.encode(bytes.as_slice())),
            program_format: Some(super::program::FORMAT_TTF.to_string()),
            ..Default::default()
        })
    }
}

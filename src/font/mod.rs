//! Font pipeline.
//!
//! Forward: font dictionaries are collected per page into [`FontModel`]s
//! with their programs (converted where the format needs it), ToUnicode
//! maps and preserved dictionaries. Reverse: models become font resources
//! of a new document, falling back through a script-aware catalog when a
//! glyph cannot be encoded.
//!
//! [`FontModel`]: crate::model::FontModel

mod cff;
mod embed;
mod encoder;
mod extract;
mod fallback;
mod program;
mod registry;
mod resolve;
mod tounicode;

pub use cff::{is_command_available, CffConverter};
pub(crate) use cff::run_tool;
pub use embed::{
    add_standard14_font, embed_program, embed_type1, finish_embedded_font, sanitize_font_name,
    EmbeddedFontObjects, STANDARD_14,
};
pub use encoder::{font_code_map, CodeMapEncoder, GlyphEncoder, RawCodeEncoder, TrueTypeEncoder};
pub use extract::{standard14_name, FontCollector, Type3Converter};
pub use fallback::{
    detect_bold, detect_italic, fallback_font_spec, is_fallback_font_id, map_unsupported_glyph,
    normalize_font_name, resolve_fallback_font_id, resolve_fallback_font_id_for_code_point,
    FallbackFontCatalog, FALLBACK_FONT_AR_ID, FALLBACK_FONT_CJK_ID, FALLBACK_FONT_DEVANAGARI_ID,
    FALLBACK_FONT_ID, FALLBACK_FONT_JP_ID, FALLBACK_FONT_KR_ID, FALLBACK_FONT_MALAYALAM_ID,
    FALLBACK_FONT_TC_ID, FALLBACK_FONT_TH_ID, FALLBACK_FONT_TIBETAN_ID,
};
pub use program::{
    descendant_font, detect_font_flavor, detect_truetype_format, extract_font_program,
    font_descriptor, is_cff_format, is_embedded, is_type1_format, validate_font_tables,
    FontProgramData, FORMAT_CFF, FORMAT_OTF, FORMAT_TTF, FORMAT_TYPE1,
};
pub use registry::FontRegistry;
pub use resolve::{
    add_font_resource, fuzzy_standard14, rank_candidates, resource_name_for, FontMap,
    FontResolver, FontSource, LoadedFont,
};
pub use tounicode::{build_to_unicode_cmap, build_unicode_mapping, parse_to_unicode, ToUnicodeMap};

//! Fallback font selection by family name and script.

use pdfjson::font::{
    is_fallback_font_id, map_unsupported_glyph, FallbackFontCatalog, FALLBACK_FONT_CJK_ID,
    FALLBACK_FONT_ID, FALLBACK_FONT_JP_ID, FALLBACK_FONT_KR_ID, FALLBACK_FONT_TC_ID,
};
use pdfjson::{resolve_fallback_font_id, resolve_fallback_font_id_for_code_point};

#[test]
fn test_scripts_pick_their_fallbacks() {
    assert_eq!(resolve_fallback_font_id_for_code_point(0xAC00), FALLBACK_FONT_KR_ID);
    assert_eq!(resolve_fallback_font_id_for_code_point(0x4E2D), FALLBACK_FONT_CJK_ID);
    assert_eq!(resolve_fallback_font_id_for_code_point(0x3042), FALLBACK_FONT_JP_ID);
    assert_eq!(resolve_fallback_font_id_for_code_point(0x3105), FALLBACK_FONT_TC_ID);
    assert_eq!(resolve_fallback_font_id_for_code_point('A' as u32), FALLBACK_FONT_ID);
}

#[test]
fn test_ids_are_stable_strings() {
    assert_eq!(resolve_fallback_font_id_for_code_point(0xAC00), "fallback-noto-korean");
    assert_eq!(resolve_fallback_font_id_for_code_point(0x4E2D), "fallback-noto-cjk");
}

#[test]
fn test_family_alias_with_weight() {
    assert_eq!(
        resolve_fallback_font_id(Some("ArialMT-Bold"), 'A' as u32),
        "fallback-liberation-sans-bold"
    );
    assert_eq!(
        resolve_fallback_font_id(Some("ABCDEF+TimesNewRoman-BoldItalic"), 'A' as u32),
        "fallback-liberation-serif-bolditalic"
    );
    assert_eq!(
        resolve_fallback_font_id(Some("DejaVuSans-Oblique"), 'A' as u32),
        "fallback-dejavu-sans-oblique"
    );
}

#[test]
fn test_unknown_family_falls_back_to_script() {
    assert_eq!(
        resolve_fallback_font_id(Some("SomeCustomFont"), 0xAC00),
        FALLBACK_FONT_KR_ID
    );
    assert_eq!(resolve_fallback_font_id(None, 'z' as u32), FALLBACK_FONT_ID);
    assert_eq!(resolve_fallback_font_id(Some(""), 0x4E2D), FALLBACK_FONT_CJK_ID);
}

#[test]
fn test_resolved_ids_are_catalog_entries() {
    for code_point in [0x41, 0xAC00, 0x4E2D, 0x3042, 0x0627, 0x0E01, 0x0915] {
        let id = resolve_fallback_font_id_for_code_point(code_point);
        assert!(is_fallback_font_id(id), "{} is not in the catalog", id);
    }
    assert!(is_fallback_font_id(&resolve_fallback_font_id(Some("Arial-BoldItalic"), 0x41)));
}

#[test]
fn test_missing_font_directory_reports_unavailable() {
    let catalog = FallbackFontCatalog::new("/nonexistent/pdfjson-fonts");
    assert!(!catalog.is_available(FALLBACK_FONT_ID));
    assert!(catalog.build_fallback_font_model(FALLBACK_FONT_ID).is_err());
    assert!(catalog.load_font_bytes("not-a-fallback").is_err());
}

#[test]
fn test_unsupported_glyph_substitutes() {
    assert_eq!(map_unsupported_glyph(0x276E), Some("<"));
    assert_eq!(map_unsupported_glyph(0x276F), Some(">"));
    assert_eq!(map_unsupported_glyph('A' as u32), None);
}

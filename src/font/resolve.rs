//! Reverse font resolution: [`FontModel`]s to font resources of a new document.

use super::embed::{
    add_standard14_font, embed_program, embed_type1, finish_embedded_font, EmbeddedFontObjects,
    STANDARD_14,
};
use super::encoder::{CodeMapEncoder, GlyphEncoder, RawCodeEncoder, TrueTypeEncoder};
use super::extract::standard14_name;
use super::fallback::{
    detect_bold, detect_italic, fallback_font_spec, is_fallback_font_id, normalize_font_name, FallbackFontCatalog,
    FALLBACK_FONT_ID,
};
use super::program::{detect_font_flavor, is_embedded, is_type1_format, FORMAT_OTF, FORMAT_TTF};
use super::registry::FontRegistry;
use crate::cos;
use crate::error::{Error, Result};
use crate::model::{font_map_key, CandidateStatus, ConversionCandidate, FontModel, PAGE_INDEPENDENT};
use crate::util::add_page_resource;
use base64::Engine;
use lopdf::{Dictionary, Document, Object, ObjectId};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

/// How a loaded font was produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FontSource {
    /// A conversion candidate of a glyph-indexed font
    Candidate,
    /// One of the program payloads
    Program,
    /// The preserved font dictionary
    Restored,
    Standard14,
    /// A fallback catalog font
    Fallback,
}

/// A font resource added to the document being built.
#[derive(Debug, Clone)]
pub struct LoadedFont {
    /// Name under which pages reference the font
    pub resource_name: String,
    pub object_id: ObjectId,
    pub encoder: Arc<dyn GlyphEncoder>,
    pub base_name: Option<String>,
    pub uid: Option<String>,
    pub source: FontSource,
    /// Glyph-indexed font restored with its glyph procedures
    pub glyph_indexed: bool,
    embedded: Option<(EmbeddedFontObjects, Arc<TrueTypeEncoder>)>,
}

impl LoadedFont {
    /// Check whether the font has a glyph for every character of `text`.
    pub fn can_encode(&self, text: &str) -> bool {
        self.encoder.can_encode_text(text)
    }

    pub fn encode(&self, text: &str) -> Option<Vec<u8>> {
        self.encoder.encode(text)
    }
}

/// Resource name of a font id: nested ids (`Fm0/F1`) are flattened.
pub fn resource_name_for(font_id: &str) -> String {
    font_id.replace('/', "_")
}

/// Builds font resources from models, ending in a usable font every time.
#[derive(Debug, Clone, Copy)]
pub struct FontResolver<'a> {
    catalog: &'a FallbackFontCatalog,
    registry: &'a FontRegistry,
}

impl<'a> FontResolver<'a> {
    pub fn new(catalog: &'a FallbackFontCatalog, registry: &'a FontRegistry) -> Self {
        Self { catalog, registry }
    }

    pub fn registry(&self) -> &FontRegistry {
        self.registry
    }

    /// Create a font resource for a model.
    ///
    /// Sources are tried in order: ranked conversion candidates, the pdf,
    /// original and web programs, the preserved dictionary (only when it is
    /// embedded), a Standard-14 name, a Standard-14 family match, and the
    /// universal fallback.
    pub fn create_font_from_model(&self, doc: &mut Document, font: &FontModel) -> LoadedFont {
        let resource_name = resource_name_for(&font.id);
        let base = font
            .base_name
            .clone()
            .unwrap_or_else(|| font.id.clone());

        if font.is_type3() {
            self.register_normalized(font);
        }

        for candidate in rank_candidates(&font.conversion_candidates) {
            let Some(bytes) = decode_payload(candidate.program.as_deref()) else {
                continue;
            };
            match self.embed_sfnt(doc, &bytes, &base, &resource_name, FontSource::Candidate) {
                Ok(loaded) => {
                    log::debug!("Font {} built from {} candidate", font.id, candidate.strategy);
                    return self.finish_model_font(doc, loaded, font);
                }
                Err(e) => log::debug!(
                    "Candidate {} for font {} unusable: {}",
                    candidate.strategy,
                    font.id,
                    e
                ),
            }
        }

        let payloads = [
            ("pdf", &font.pdf_program, &font.pdf_program_format),
            ("original", &font.program, &font.program_format),
            ("web", &font.web_program, &font.web_program_format),
        ];
        for (label, program, format) in payloads {
            let Some(bytes) = decode_payload(program.as_deref()) else {
                continue;
            };
            match self.load_program(doc, &bytes, format.as_deref(), &base, &resource_name) {
                Ok(loaded) => {
                    log::debug!("Font {} built from {} program", font.id, label);
                    return self.finish_model_font(doc, loaded, font);
                }
                Err(e) => log::debug!("{} program of font {} unusable: {}", label, font.id, e),
            }
        }

        if let Some(loaded) = self.restore_dictionary(doc, font, &resource_name) {
            return loaded;
        }

        let standard = font
            .standard14_name
            .clone()
            .or_else(|| font.base_name.as_deref().and_then(standard14_name));
        if let Some(standard) = standard {
            log::debug!("Font {} mapped to Standard-14 {}", font.id, standard);
            return self.standard14(doc, &standard, &resource_name, font);
        }

        if let Some(standard) = font.base_name.as_deref().and_then(fuzzy_standard14) {
            log::debug!("Font {} matched Standard-14 family {}", font.id, standard);
            return self.standard14(doc, standard, &resource_name, font);
        }

        log::warn!(
            "No usable source for font {} ({:?}), using fallback",
            font.id,
            font.base_name
        );
        let mut loaded = self.load_fallback(doc, FALLBACK_FONT_ID);
        loaded.resource_name = resource_name;
        loaded.uid = font.uid.clone();
        loaded
    }

    /// Load a fallback catalog font. When its file is unavailable the
    /// result is Helvetica.
    pub fn load_fallback(&self, doc: &mut Document, fallback_id: &str) -> LoadedFont {
        match self.try_load_fallback(doc, fallback_id) {
            Ok(loaded) => loaded,
            Err(e) => {
                log::warn!("Fallback font {} unavailable: {}", fallback_id, e);
                let object_id = add_standard14_font(doc, "Helvetica");
                let encoder = standard_encoder(doc, object_id);
                LoadedFont {
                    resource_name: fallback_id.to_string(),
                    object_id,
                    encoder,
                    base_name: Some("Helvetica".to_string()),
                    uid: Some(fallback_id.to_string()),
                    source: FontSource::Fallback,
                    glyph_indexed: false,
                    embedded: None,
                }
            }
        }
    }

    fn try_load_fallback(&self, doc: &mut Document, fallback_id: &str) -> Result<LoadedFont> {
        let (_, base) = fallback_font_spec(fallback_id)
            .ok_or_else(|| Error::FontDecode(format!("Unknown fallback font id {}", fallback_id)))?;
        let bytes = self.catalog.load_font_bytes(fallback_id)?;
        let mut loaded = self.embed_sfnt(doc, &bytes, base, fallback_id, FontSource::Fallback)?;
        loaded.uid = Some(fallback_id.to_string());
        Ok(loaded)
    }

    fn load_program(
        &self,
        doc: &mut Document,
        bytes: &[u8],
        format: Option<&str>,
        base: &str,
        resource_name: &str,
    ) -> Result<LoadedFont> {
        let flavor = detect_font_flavor(bytes);
        if matches!(flavor, Some(FORMAT_TTF) | Some(FORMAT_OTF)) {
            return self.embed_sfnt(doc, bytes, base, resource_name, FontSource::Program);
        }
        if format.is_some_and(is_type1_format) {
            let object_id = embed_type1(doc, bytes, base)?;
            let encoder = standard_encoder(doc, object_id);
            return Ok(LoadedFont {
                resource_name: resource_name.to_string(),
                object_id,
                encoder,
                base_name: Some(base.to_string()),
                uid: None,
                source: FontSource::Program,
                glyph_indexed: false,
                embedded: None,
            });
        }
        Err(Error::FontDecode(format!(
            "Unsupported program format {:?}",
            format.or(flavor)
        )))
    }

    fn embed_sfnt(
        &self,
        doc: &mut Document,
        bytes: &[u8],
        base: &str,
        resource_name: &str,
        source: FontSource,
    ) -> Result<LoadedFont> {
        let (objects, encoder) = embed_program(doc, bytes, base)?;
        let encoder = Arc::new(encoder);
        Ok(LoadedFont {
            resource_name: resource_name.to_string(),
            object_id: objects.font_id,
            encoder: encoder.clone(),
            base_name: Some(base.to_string()),
            uid: None,
            source,
            glyph_indexed: false,
            embedded: Some((objects, encoder)),
        })
    }

    /// Carry the model's uid and CID system info over to a built font.
    fn finish_model_font(
        &self,
        doc: &mut Document,
        mut loaded: LoadedFont,
        font: &FontModel,
    ) -> LoadedFont {
        loaded.uid = font.uid.clone();
        let composite = font.subtype.as_deref() == Some("Type0");
        if let (true, Some(info), Some((objects, _))) =
            (composite, font.cid_system_info.as_ref(), loaded.embedded.as_ref())
        {
            let mut system_info = Dictionary::new();
            if let Some(registry) = &info.registry {
                system_info.set("Registry", Object::string_literal(registry.as_str()));
            }
            if let Some(ordering) = &info.ordering {
                system_info.set("Ordering", Object::string_literal(ordering.as_str()));
            }
            system_info.set("Supplement", info.supplement.unwrap_or(0));
            if let Ok(cid_font) = doc
                .get_object_mut(objects.cid_font_id)
                .and_then(Object::as_dict_mut)
            {
                cid_font.set("CIDSystemInfo", system_info);
            }
        }
        loaded
    }

    /// Rebuild the font from its preserved dictionary. A restored font that
    /// is not embedded is rejected; glyph-indexed fonts carry their glyphs in
    /// the dictionary and are always accepted.
    fn restore_dictionary(
        &self,
        doc: &mut Document,
        font: &FontModel,
        resource_name: &str,
    ) -> Option<LoadedFont> {
        let value = font.cos_dictionary.as_ref()?;
        let dict = cos::deserialize_dictionary(value, doc)?;
        let glyph_indexed = font.is_type3();
        if !glyph_indexed && !is_embedded(doc, &dict) {
            log::debug!("Restored font {} is not embedded, skipping", font.id);
            return None;
        }
        let encoder: Arc<dyn GlyphEncoder> = if glyph_indexed {
            Arc::new(RawCodeEncoder)
        } else {
            Arc::new(CodeMapEncoder::from_font_dict(doc, &dict))
        };
        let object_id = doc.add_object(dict);
        log::debug!("Font {} restored from its dictionary", font.id);
        Some(LoadedFont {
            resource_name: resource_name.to_string(),
            object_id,
            encoder,
            base_name: font.base_name.clone(),
            uid: font.uid.clone(),
            source: FontSource::Restored,
            glyph_indexed,
            embedded: None,
        })
    }

    fn standard14(
        &self,
        doc: &mut Document,
        standard: &str,
        resource_name: &str,
        font: &FontModel,
    ) -> LoadedFont {
        let object_id = add_standard14_font(doc, standard);
        let encoder = standard_encoder(doc, object_id);
        LoadedFont {
            resource_name: resource_name.to_string(),
            object_id,
            encoder,
            base_name: Some(standard.to_string()),
            uid: font.uid.clone(),
            source: FontSource::Standard14,
            glyph_indexed: false,
            embedded: None,
        }
    }

    /// Record the best normalized program of a glyph-indexed font, and its
    /// coverage, in the registry under the font's uid.
    pub fn register_normalized(&self, font: &FontModel) {
        let Some(uid) = font.uid.as_deref() else {
            return;
        };
        if self.registry.normalized(uid).is_some() {
            return;
        }
        for candidate in rank_candidates(&font.conversion_candidates) {
            let Some(bytes) = decode_payload(candidate.program.as_deref()) else {
                continue;
            };
            let Ok(face) = ttf_parser::Face::parse(&bytes, 0) else {
                continue;
            };
            let coverage: HashSet<u32> = if candidate.coverage.is_empty() {
                face_coverage(&face)
            } else {
                candidate.coverage.iter().copied().collect()
            };
            log::debug!(
                "Registered normalized program for {} ({} code points)",
                uid,
                coverage.len()
            );
            self.registry.insert_coverage(uid, coverage);
            self.registry.insert_normalized(uid, bytes);
            return;
        }
    }
}

fn face_coverage(face: &ttf_parser::Face<'_>) -> HashSet<u32> {
    let mut coverage = HashSet::new();
    if let Some(cmap) = face.tables().cmap {
        for subtable in cmap.subtables {
            if subtable.is_unicode() {
                subtable.codepoints(|cp| {
                    coverage.insert(cp);
                });
            }
        }
    }
    coverage
}

fn standard_encoder(doc: &Document, object_id: ObjectId) -> Arc<dyn GlyphEncoder> {
    match doc.get_dictionary(object_id) {
        Ok(dict) => Arc::new(CodeMapEncoder::from_font_dict(doc, dict)),
        Err(_) => Arc::new(CodeMapEncoder::default()),
    }
}

fn decode_payload(encoded: Option<&str>) -> Option<Vec<u8>> {
    let encoded = encoded.filter(|s| !s.trim().is_empty())?;
    match base64::engine::general_purpose::STANDARD.decode(encoded) {
        Ok(bytes) if !bytes.is_empty() => Some(bytes),
        Ok(_) => None,
        Err(e) => {
            log::debug!("Invalid base64 font payload: {}", e);
            None
        }
    }
}

fn format_rank(candidate: &ConversionCandidate, bytes_flavor: Option<&str>) -> u8 {
    let format = candidate
        .program_format
        .as_deref()
        .map(str::to_ascii_lowercase);
    match (format.as_deref(), bytes_flavor) {
        (Some("ttf"), _) | (Some("truetype"), _) => 0,
        (_, Some(FORMAT_TTF)) => 1,
        (Some("otf"), _) | (Some("cff"), _) | (_, Some(FORMAT_OTF)) => 2,
        _ => 3,
    }
}

/// Usable candidates, successful and warning ones only, best format first.
pub fn rank_candidates(candidates: &[ConversionCandidate]) -> Vec<&ConversionCandidate> {
    let mut ranked: Vec<(u8, u8, usize, &ConversionCandidate)> = candidates
        .iter()
        .enumerate()
        .filter(|(_, c)| c.status != CandidateStatus::Failed && c.program.is_some())
        .map(|(index, c)| {
            let flavor = decode_payload(c.program.as_deref())
                .as_deref()
                .and_then(detect_font_flavor);
            let status = match c.status {
                CandidateStatus::Success => 0,
                _ => 1,
            };
            (status, format_rank(c, flavor), index, c)
        })
        .collect();
    ranked.sort_by_key(|(status, format, index, _)| (*status, *format, *index));
    ranked.into_iter().map(|(_, _, _, c)| c).collect()
}

/// Standard-14 font for a family token in the name, with bold/italic
/// variants applied.
pub fn fuzzy_standard14(base_name: &str) -> Option<&'static str> {
    let normalized = normalize_font_name(base_name).replace(['-', '_'], "");
    let bold = detect_bold(&normalized);
    let italic = detect_italic(&normalized);
    let serif = normalized.contains("serif") && !normalized.contains("sans");
    let family = if normalized.contains("times") || normalized.contains("roman") || serif {
        "Times"
    } else if normalized.contains("courier") || normalized.contains("mono") {
        "Courier"
    } else if normalized.contains("helvetica")
        || normalized.contains("arial")
        || normalized.contains("sans")
    {
        "Helvetica"
    } else if normalized.contains("symbol") {
        return Some("Symbol");
    } else if normalized.contains("zapf") || normalized.contains("dingbat") {
        return Some("ZapfDingbats");
    } else {
        return None;
    };
    let name = match (family, bold, italic) {
        ("Times", false, false) => "Times-Roman",
        ("Times", true, false) => "Times-Bold",
        ("Times", false, true) => "Times-Italic",
        ("Times", true, true) => "Times-BoldItalic",
        ("Courier", false, false) => "Courier",
        ("Courier", true, false) => "Courier-Bold",
        ("Courier", false, true) => "Courier-Oblique",
        ("Courier", true, true) => "Courier-BoldOblique",
        (_, false, false) => "Helvetica",
        (_, true, false) => "Helvetica-Bold",
        (_, false, true) => "Helvetica-Oblique",
        (_, true, true) => "Helvetica-BoldOblique",
    };
    STANDARD_14.iter().copied().find(|s| *s == name)
}

/// Fonts added to a document under construction, keyed `page:id`.
#[derive(Debug, Default)]
pub struct FontMap {
    fonts: HashMap<String, LoadedFont>,
    normalized: HashMap<String, Option<LoadedFont>>,
}

impl FontMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the fonts of every model and make sure the universal fallback
    /// is present under `-1:fallback-noto-sans`.
    pub fn build(doc: &mut Document, resolver: &FontResolver<'_>, fonts: &[FontModel]) -> Self {
        let mut map = Self::new();
        for font in fonts {
            let key = font_map_key(font.page_or_independent(), &font.id);
            if map.fonts.contains_key(&key) {
                continue;
            }
            let loaded = if is_fallback_font_id(&font.id) {
                resolver.load_fallback(doc, &font.id)
            } else {
                resolver.create_font_from_model(doc, font)
            };
            map.fonts.insert(key, loaded);
        }
        map.ensure_fallback(doc, resolver, FALLBACK_FONT_ID);
        map
    }

    /// Font for a page-scoped id, else the page-independent one.
    pub fn get(&self, page_number: i32, font_id: &str) -> Option<&LoadedFont> {
        self.fonts
            .get(&font_map_key(page_number, font_id))
            .or_else(|| self.fonts.get(&font_map_key(PAGE_INDEPENDENT, font_id)))
    }

    pub fn insert(&mut self, page_number: i32, font_id: &str, font: LoadedFont) {
        self.fonts.insert(font_map_key(page_number, font_id), font);
    }

    /// Load a fallback font under `-1:<id>` unless present.
    pub fn ensure_fallback(
        &mut self,
        doc: &mut Document,
        resolver: &FontResolver<'_>,
        fallback_id: &str,
    ) -> &LoadedFont {
        let key = font_map_key(PAGE_INDEPENDENT, fallback_id);
        self.fonts
            .entry(key)
            .or_insert_with(|| resolver.load_fallback(doc, fallback_id))
    }

    /// Normalized replacement of a glyph-indexed font, embedded on first use.
    pub fn normalized(
        &mut self,
        doc: &mut Document,
        resolver: &FontResolver<'_>,
        uid: &str,
    ) -> Option<&LoadedFont> {
        if !self.normalized.contains_key(uid) {
            let loaded = resolver.registry().normalized(uid).and_then(|program| {
                let name = format!("N{}", resource_name_for(uid).replace(':', "_"));
                match embed_program(doc, &program, &name) {
                    Ok((objects, encoder)) => {
                        let encoder = Arc::new(encoder);
                        Some(LoadedFont {
                            resource_name: name.clone(),
                            object_id: objects.font_id,
                            encoder: encoder.clone(),
                            base_name: Some(name),
                            uid: Some(uid.to_string()),
                            source: FontSource::Candidate,
                            glyph_indexed: false,
                            embedded: Some((objects, encoder)),
                        })
                    }
                    Err(e) => {
                        log::debug!("Normalized program for {} unusable: {}", uid, e);
                        None
                    }
                }
            });
            self.normalized.insert(uid.to_string(), loaded);
        }
        self.normalized.get(uid).and_then(Option::as_ref)
    }

    pub fn len(&self) -> usize {
        self.fonts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fonts.is_empty()
    }

    /// Resource entries (`resource name -> object`) of every loaded font.
    pub fn resource_entries(&self) -> BTreeMap<String, ObjectId> {
        self.fonts
            .values()
            .chain(self.normalized.values().flatten())
            .map(|f| (f.resource_name.clone(), f.object_id))
            .collect()
    }

    /// Write widths and ToUnicode maps of the embedded fonts.
    pub fn finish(&self, doc: &mut Document) {
        let mut done = HashSet::new();
        for font in self.fonts.values().chain(self.normalized.values().flatten()) {
            if let Some((objects, encoder)) = &font.embedded {
                if !done.insert(objects.font_id) {
                    continue;
                }
                if let Err(e) = finish_embedded_font(doc, *objects, encoder) {
                    log::warn!("Failed to finish font {}: {}", font.resource_name, e);
                }
            }
        }
    }
}

/// Add a font to the `/Font` resources of a page.
pub fn add_font_resource(
    doc: &mut Document,
    page_id: ObjectId,
    resource_name: &str,
    font_id: ObjectId,
) -> Result<()> {
    add_page_resource(doc, page_id, "Font", resource_name, font_id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::CosValue;
    use lopdf::dictionary;

    fn resolver_parts() -> (FallbackFontCatalog, FontRegistry) {
        (
            FallbackFontCatalog::new("/nonexistent/pdfjson-fonts"),
            FontRegistry::new(),
        )
    }

    #[test]
    fn test_fuzzy_standard14() {
        assert_eq!(fuzzy_standard14("ABCDEF+Arial-BoldMT"), Some("Helvetica-Bold"));
        assert_eq!(fuzzy_standard14("TimesNewRomanPS-ItalicMT"), Some("Times-Italic"));
        assert_eq!(fuzzy_standard14("CourierNew"), Some("Courier"));
        assert_eq!(fuzzy_standard14("DejaVuSans-Oblique"), Some("Helvetica-Oblique"));
        assert_eq!(fuzzy_standard14("Wingdings"), None);
    }

    #[test]
    fn test_resource_name_flattens_nested_ids() {
        assert_eq!(resource_name_for("Fm0/F1"), "Fm0_F1");
        assert_eq!(resource_name_for("F1"), "F1");
    }

    #[test]
    fn test_rank_candidates_prefers_status_then_format() {
        let engine = base64::engine::general_purpose::STANDARD;
        let candidate = |strategy: &str, status, format: &str, bytes: &[u8]| ConversionCandidate {
            strategy: strategy.to_string(),
            status,
            program_format: Some(format.to_string()),
            program: Some(engine.encode(bytes)),
            message: None,
            coverage: Vec::new(),
        };
        let candidates = vec![
            candidate("otf", CandidateStatus::Success, "otf", b"OTTO...."),
            candidate("failed", CandidateStatus::Failed, "ttf", &[0, 1, 0, 0]),
            candidate("warn-ttf", CandidateStatus::Warning, "ttf", &[0, 1, 0, 0]),
            candidate("ttf", CandidateStatus::Success, "ttf", &[0, 1, 0, 0]),
            candidate("unknown", CandidateStatus::Success, "bin", b"????"),
        ];
        let ranked: Vec<&str> = rank_candidates(&candidates)
            .iter()
            .map(|c| c.strategy.as_str())
            .collect();
        assert_eq!(ranked, vec!["ttf", "otf", "unknown", "warn-ttf"]);
    }

    #[test]
    fn test_standard14_by_name() {
        let (catalog, registry) = resolver_parts();
        let resolver = FontResolver::new(&catalog, &registry);
        let mut doc = Document::with_version("1.7");
        let mut font = FontModel::new("F1", 1);
        font.base_name = Some("Helvetica".to_string());
        font.uid = Some("job:1:F1".to_string());
        let loaded = resolver.create_font_from_model(&mut doc, &font);
        assert_eq!(loaded.source, FontSource::Standard14);
        assert_eq!(loaded.resource_name, "F1");
        assert!(loaded.can_encode("Hello"));
        assert_eq!(loaded.uid.as_deref(), Some("job:1:F1"));
    }

    #[test]
    fn test_unembedded_dictionary_is_not_restored() {
        let (catalog, registry) = resolver_parts();
        let resolver = FontResolver::new(&catalog, &registry);
        let mut doc = Document::with_version("1.7");
        let mut entries = BTreeMap::new();
        entries.insert("Type".to_string(), CosValue::name("Font"));
        entries.insert("Subtype".to_string(), CosValue::name("TrueType"));
        entries.insert("BaseFont".to_string(), CosValue::name("ArialMT"));
        let mut font = FontModel::new("F1", 1);
        font.base_name = Some("ArialMT".to_string());
        font.cos_dictionary = Some(CosValue::dictionary(entries));

        let loaded = resolver.create_font_from_model(&mut doc, &font);
        assert_eq!(loaded.source, FontSource::Standard14);
        assert_eq!(loaded.base_name.as_deref(), Some("Helvetica"));
    }

    #[test]
    fn test_unknown_font_ends_in_fallback() {
        let (catalog, registry) = resolver_parts();
        let resolver = FontResolver::new(&catalog, &registry);
        let mut doc = Document::with_version("1.7");
        let mut font = FontModel::new("F9", 2);
        font.base_name = Some("Wingdings".to_string());
        font.program = Some("not base64!".to_string());
        let loaded = resolver.create_font_from_model(&mut doc, &font);
        assert_eq!(loaded.source, FontSource::Fallback);
        assert_eq!(loaded.resource_name, "F9");
        assert!(doc.get_dictionary(loaded.object_id).is_ok());
    }

    #[test]
    fn test_font_map_lookup_and_fallback_entry() {
        let (catalog, registry) = resolver_parts();
        let resolver = FontResolver::new(&catalog, &registry);
        let mut doc = Document::with_version("1.7");
        let mut font = FontModel::new("F1", 1);
        font.base_name = Some("Courier".to_string());
        let map = FontMap::build(&mut doc, &resolver, &[font]);
        assert_eq!(map.len(), 2);
        assert!(map.get(1, "F1").is_some());
        assert!(map.get(2, "F1").is_none());
        assert!(map.get(3, FALLBACK_FONT_ID).is_some());
        let entries = map.resource_entries();
        assert!(entries.contains_key("F1"));
        assert!(entries.contains_key(FALLBACK_FONT_ID));
    }

    #[test]
    fn test_add_font_resource_to_page() {
        let mut doc = Document::with_version("1.7");
        let page_id = doc.add_object(dictionary! { "Type" => "Page" });
        let font_id = add_standard14_font(&mut doc, "Helvetica");
        add_font_resource(&mut doc, page_id, "F1", font_id).unwrap();
        add_font_resource(&mut doc, page_id, "F2", font_id).unwrap();
        let page = doc.get_dictionary(page_id).unwrap();
        let fonts = page
            .get(b"Resources")
            .and_then(Object::as_dict)
            .and_then(|r| r.get(b"Font"))
            .and_then(Object::as_dict)
            .unwrap();
        assert!(fonts.has(b"F1"));
        assert!(fonts.has(b"F2"));
    }
}

//! Forward font collection: font dictionaries to [`FontModel`]s.

use super::cff::CffConverter;
use super::embed::STANDARD_14;
use super::program::{
    descendant_font, extract_font_program, font_descriptor, is_embedded, FORMAT_TTF,
};
use super::tounicode::{build_unicode_mapping, parse_to_unicode, ToUnicodeMap};
use crate::cos::{self, StreamPolicy};
use crate::model::{
    build_font_uid, CidSystemInfo, ConversionCandidate, FontModel, GlyphOutline,
};
use crate::util::{name, number, number_array, resolve, stream_bytes, text};
use base64::Engine;
use lopdf::{Dictionary, Document, Object, ObjectId};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;

/// Produces replacement programs for glyph-indexed (Type3) fonts.
///
/// Implementations receive the font with its glyph outlines filled in.
pub trait Type3Converter: fmt::Debug + Send + Sync {
    /// Converter name recorded on its candidates.
    fn name(&self) -> &str;

    /// Convert the font; an empty list when nothing could be produced.
    fn convert(&self, font: &FontModel) -> Vec<ConversionCandidate>;
}

/// Collects the fonts used by pages of one document.
///
/// Font dictionaries shared between pages are only analysed once; the
/// cached template is copied per page with the page-scoped id and uid.
pub struct FontCollector<'a> {
    doc: &'a Document,
    cff: &'a CffConverter,
    type3: Option<&'a dyn Type3Converter>,
    job_id: Option<String>,
    lightweight: bool,
    cache: HashMap<ObjectId, FontModel>,
}

impl<'a> FontCollector<'a> {
    pub fn new(doc: &'a Document, cff: &'a CffConverter) -> Self {
        Self {
            doc,
            cff,
            type3: None,
            job_id: None,
            lightweight: false,
            cache: HashMap::new(),
        }
    }

    /// Scope uids to a job.
    pub fn with_job_id(mut self, job_id: Option<&str>) -> Self {
        self.job_id = job_id.filter(|j| !j.is_empty()).map(str::to_string);
        self
    }

    /// Drop serialized font dictionaries when a program is available.
    pub fn lightweight(mut self, lightweight: bool) -> Self {
        self.lightweight = lightweight;
        self
    }

    pub fn with_type3_converter(mut self, converter: Option<&'a dyn Type3Converter>) -> Self {
        self.type3 = converter;
        self
    }

    /// Collect the fonts reachable from a page's resources, including the
    /// resources of nested Form XObjects.
    pub fn collect_page(&mut self, page_number: u32, resources: &Dictionary) -> Vec<FontModel> {
        let mut fonts = Vec::new();
        let mut visited = HashSet::new();
        self.collect_resources(page_number, resources, "", &mut visited, &mut fonts);
        fonts
    }

    fn collect_resources(
        &mut self,
        page_number: u32,
        resources: &Dictionary,
        prefix: &str,
        visited: &mut HashSet<usize>,
        fonts: &mut Vec<FontModel>,
    ) {
        if !visited.insert(resources as *const Dictionary as usize) {
            return;
        }
        let doc = self.doc;

        if let Some(font_dict) = resources
            .get(b"Font")
            .ok()
            .and_then(|o| resolve(doc, o).as_dict().ok())
        {
            for (key, value) in font_dict.iter() {
                let resource_name = String::from_utf8_lossy(key);
                let font_id = if prefix.is_empty() {
                    resource_name.into_owned()
                } else {
                    format!("{}/{}", prefix, resource_name)
                };
                let Some(mut model) = self.font_template(value) else {
                    log::debug!("Skipping unreadable font resource {}", font_id);
                    continue;
                };
                let page = page_number as i32;
                model.uid = Some(build_font_uid(self.job_id.as_deref(), page, &font_id));
                model.id = font_id;
                model.page_number = Some(page);
                if self.lightweight && model.has_usable_program() {
                    model.cos_dictionary = None;
                }
                fonts.push(model);
            }
        }

        if let Some(xobjects) = resources
            .get(b"XObject")
            .ok()
            .and_then(|o| resolve(doc, o).as_dict().ok())
        {
            for (key, value) in xobjects.iter() {
                let Ok(stream) = resolve(doc, value).as_stream() else {
                    continue;
                };
                let is_form = stream
                    .dict
                    .get(b"Subtype")
                    .ok()
                    .and_then(|o| o.as_name().ok())
                    .is_some_and(|n| n == b"Form");
                if !is_form {
                    continue;
                }
                let Some(nested) = stream
                    .dict
                    .get(b"Resources")
                    .ok()
                    .and_then(|o| resolve(doc, o).as_dict().ok())
                else {
                    continue;
                };
                let name = String::from_utf8_lossy(key);
                let nested_prefix = if prefix.is_empty() {
                    name.into_owned()
                } else {
                    format!("{}/{}", prefix, name)
                };
                self.collect_resources(page_number, nested, &nested_prefix, visited, fonts);
            }
        }
    }

    fn font_template(&mut self, value: &Object) -> Option<FontModel> {
        let object_id = match value {
            Object::Reference(id) => Some(*id),
            _ => None,
        };
        if let Some(cached) = object_id.and_then(|id| self.cache.get(&id)) {
            return Some(cached.clone());
        }
        let dict = resolve(self.doc, value).as_dict().ok()?;
        let model = self.build_font_model(value, dict);
        if let Some(id) = object_id {
            self.cache.insert(id, model.clone());
        }
        Some(model)
    }

    fn build_font_model(&self, object: &Object, font: &Dictionary) -> FontModel {
        let doc = self.doc;
        let engine = base64::engine::general_purpose::STANDARD;
        let subtype = font.get(b"Subtype").ok().and_then(name);
        let composite = subtype.as_deref() == Some("Type0");
        let base_name = font.get(b"BaseFont").ok().and_then(|o| name(resolve(doc, o)));

        let mut model = FontModel {
            base_name: base_name.clone(),
            subtype: subtype.clone(),
            encoding: font_encoding_name(doc, font),
            embedded: Some(is_embedded(doc, font)),
            ..Default::default()
        };

        if composite {
            model.cid_system_info = descendant_font(doc, font)
                .and_then(|d| d.get(b"CIDSystemInfo").ok())
                .and_then(|o| resolve(doc, o).as_dict().ok())
                .map(|info| CidSystemInfo {
                    registry: info.get(b"Registry").ok().and_then(|o| text(resolve(doc, o))),
                    ordering: info.get(b"Ordering").ok().and_then(|o| text(resolve(doc, o))),
                    supplement: info.get(b"Supplement").ok().and_then(|o| o.as_i64().ok()),
                });
        }

        let to_unicode_bytes = font
            .get(b"ToUnicode")
            .ok()
            .and_then(|o| resolve(doc, o).as_stream().ok())
            .map(stream_bytes);
        model.to_unicode = to_unicode_bytes.as_ref().map(|b| engine.encode(b));

        let mapping = build_unicode_mapping(model.to_unicode.as_deref(), composite);
        if let Some(program) = extract_font_program(doc, font, mapping.as_deref(), self.cff) {
            model.program = program.program;
            model.program_format = program.format;
            model.web_program = program.web_program;
            model.web_program_format = program.web_format;
            model.pdf_program = program.pdf_program;
            model.pdf_program_format = program.pdf_format;
        }

        if model.embedded != Some(true) {
            model.standard14_name = base_name.as_deref().and_then(standard14_name);
        }

        if let Some(descriptor) = font_descriptor(doc, font) {
            let metric = |key: &[u8]| descriptor.get(key).ok().and_then(|o| number(resolve(doc, o)));
            model.font_descriptor_flags = descriptor.get(b"Flags").ok().and_then(|o| o.as_i64().ok());
            model.ascent = metric(b"Ascent");
            model.descent = metric(b"Descent");
            model.cap_height = metric(b"CapHeight");
            model.x_height = metric(b"XHeight");
            model.italic_angle = metric(b"ItalicAngle");
        }
        model.units_per_em = units_per_em(doc, font, &model);

        model.cos_dictionary = cos::serialize(object, doc, StreamPolicy::Default);

        if model.is_type3() {
            let to_unicode = to_unicode_bytes
                .as_deref()
                .map(parse_to_unicode)
                .unwrap_or_default();
            model.glyph_outlines = type3_glyph_outlines(doc, font, &to_unicode);
            if let Some(converter) = self.type3 {
                let mut candidates = converter.convert(&model);
                for candidate in &mut candidates {
                    if candidate.strategy.is_empty() {
                        candidate.strategy = converter.name().to_string();
                    }
                }
                log::debug!(
                    "Type3 font {:?}: {} glyphs, {} candidates from {}",
                    base_name,
                    model.glyph_outlines.len(),
                    candidates.len(),
                    converter.name()
                );
                model.conversion_candidates = candidates;
            }
        }

        model
    }
}

/// Encoding name, or the base encoding of an encoding dictionary.
fn font_encoding_name(doc: &Document, font: &Dictionary) -> Option<String> {
    let encoding = resolve(doc, font.get(b"Encoding").ok()?);
    match encoding {
        Object::Name(_) => name(encoding),
        Object::Dictionary(dict) => dict.get(b"BaseEncoding").ok().and_then(name),
        Object::Stream(stream) => stream.dict.get(b"CMapName").ok().and_then(name),
        _ => None,
    }
}

/// Standard-14 name of a non-embedded base font.
pub fn standard14_name(base_name: &str) -> Option<String> {
    let stripped = base_name.split_once('+').map_or(base_name, |(_, rest)| rest);
    STANDARD_14
        .iter()
        .find(|s| s.eq_ignore_ascii_case(stripped))
        .map(|s| s.to_string())
}

fn units_per_em(doc: &Document, font: &Dictionary, model: &FontModel) -> Option<u32> {
    if model.is_type3() {
        let matrix = font
            .get(b"FontMatrix")
            .ok()
            .and_then(|o| number_array(doc, o))?;
        let a = *matrix.first()?;
        return (a.abs() > f32::EPSILON).then(|| (1.0 / a.abs()).round() as u32);
    }
    let program = [
        (&model.program, &model.program_format),
        (&model.pdf_program, &model.pdf_program_format),
    ]
    .into_iter()
    .find(|(p, f)| p.is_some() && f.as_deref() == Some(FORMAT_TTF))
    .and_then(|(p, _)| p.as_deref());
    if let Some(encoded) = program {
        if let Ok(bytes) = base64::engine::general_purpose::STANDARD.decode(encoded) {
            if let Ok(face) = ttf_parser::Face::parse(&bytes, 0) {
                return Some(face.units_per_em() as u32);
            }
        }
    }
    Some(1000)
}

/// Glyph procedures of a Type3 font by character code.
fn type3_glyph_outlines(
    doc: &Document,
    font: &Dictionary,
    to_unicode: &ToUnicodeMap,
) -> Vec<GlyphOutline> {
    let Some(char_procs) = font
        .get(b"CharProcs")
        .ok()
        .and_then(|o| resolve(doc, o).as_dict().ok())
    else {
        return Vec::new();
    };

    let mut names: BTreeMap<u32, String> = BTreeMap::new();
    if let Some(differences) = font
        .get(b"Encoding")
        .ok()
        .and_then(|o| resolve(doc, o).as_dict().ok())
        .and_then(|e| e.get(b"Differences").ok())
        .and_then(|o| resolve(doc, o).as_array().ok())
    {
        let mut code = 0u32;
        for item in differences {
            match resolve(doc, item) {
                Object::Integer(i) => code = (*i).max(0) as u32,
                Object::Name(n) => {
                    names.insert(code, String::from_utf8_lossy(n).into_owned());
                    code += 1;
                }
                _ => {}
            }
        }
    }

    let first_char = font
        .get(b"FirstChar")
        .ok()
        .and_then(|o| resolve(doc, o).as_i64().ok())
        .unwrap_or(0)
        .max(0) as u32;
    let widths = font
        .get(b"Widths")
        .ok()
        .and_then(|o| number_array(doc, o))
        .unwrap_or_default();

    names
        .into_iter()
        .filter_map(|(code, glyph_name)| {
            let stream = char_procs
                .get(glyph_name.as_bytes())
                .ok()
                .and_then(|o| resolve(doc, o).as_stream().ok())?;
            let outline = String::from_utf8_lossy(&stream_bytes(stream)).into_owned();
            let unicode = to_unicode
                .get(code)
                .map(str::to_string)
                .or_else(|| unicode_from_glyph_name(&glyph_name));
            let width = code
                .checked_sub(first_char)
                .and_then(|i| widths.get(i as usize))
                .copied();
            Some(GlyphOutline {
                code,
                glyph_name: Some(glyph_name),
                unicode,
                width,
                outline: Some(outline),
            })
        })
        .collect()
}

/// Unicode text for common glyph names (`uniXXXX`, `uXXXX[XX]`, single
/// characters and a few punctuation names).
fn unicode_from_glyph_name(glyph_name: &str) -> Option<String> {
    let hex = glyph_name
        .strip_prefix("uni")
        .filter(|h| h.len() == 4)
        .or_else(|| glyph_name.strip_prefix('u').filter(|h| (4..=6).contains(&h.len())));
    if let Some(hex) = hex {
        if let Some(ch) = u32::from_str_radix(hex, 16).ok().and_then(char::from_u32) {
            return Some(ch.to_string());
        }
    }
    let mut chars = glyph_name.chars();
    if let (Some(ch), None) = (chars.next(), chars.next()) {
        if ch.is_ascii_alphanumeric() {
            return Some(ch.to_string());
        }
    }
    let ch = match glyph_name {
        "space" => ' ',
        "period" => '.',
        "comma" => ',',
        "hyphen" => '-',
        "colon" => ':',
        "semicolon" => ';',
        "parenleft" => '(',
        "parenright" => ')',
        "zero" => '0',
        "one" => '1',
        "two" => '2',
        "three" => '3',
        "four" => '4',
        "five" => '5',
        "six" => '6',
        "seven" => '7',
        "eight" => '8',
        "nine" => '9',
        _ => return None,
    };
    Some(ch.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::CandidateStatus;
    use lopdf::{dictionary, Stream};

    fn helvetica(doc: &mut Document) -> ObjectId {
        doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Helvetica",
            "Encoding" => "WinAnsiEncoding",
        })
    }

    #[test]
    fn test_collects_page_and_nested_form_fonts() {
        let mut doc = Document::with_version("1.7");
        let font_id = helvetica(&mut doc);
        let form_resources = dictionary! {
            "Font" => dictionary! { "F2" => font_id },
        };
        let form_id = doc.add_object(Stream::new(
            dictionary! {
                "Type" => "XObject",
                "Subtype" => "Form",
                "Resources" => form_resources,
            },
            b"BT /F2 12 Tf (x) Tj ET".to_vec(),
        ));
        let resources = dictionary! {
            "Font" => dictionary! { "F1" => font_id },
            "XObject" => dictionary! { "Fm0" => form_id },
        };

        let cff = CffConverter::disabled();
        let mut collector = FontCollector::new(&doc, &cff).with_job_id(Some("job-9"));
        let fonts = collector.collect_page(2, &resources);
        assert_eq!(fonts.len(), 2);
        assert_eq!(fonts[0].id, "F1");
        assert_eq!(fonts[0].uid.as_deref(), Some("job-9:2:F1"));
        assert_eq!(fonts[1].id, "Fm0/F2");
        assert_eq!(fonts[1].uid.as_deref(), Some("job-9:2:Fm0/F2"));
        assert_eq!(fonts[0].standard14_name.as_deref(), Some("Helvetica"));
        assert_eq!(fonts[0].encoding.as_deref(), Some("WinAnsiEncoding"));
        assert_eq!(fonts[0].embedded, Some(false));
        assert!(fonts[0].cos_dictionary.is_some());
    }

    #[test]
    fn test_lightweight_keeps_cos_dictionary_without_program() {
        let mut doc = Document::with_version("1.7");
        let font_id = helvetica(&mut doc);
        let resources = dictionary! { "Font" => dictionary! { "F1" => font_id } };
        let cff = CffConverter::disabled();
        let mut collector = FontCollector::new(&doc, &cff).lightweight(true);
        let fonts = collector.collect_page(1, &resources);
        assert_eq!(fonts[0].uid.as_deref(), Some("1:F1"));
        assert!(fonts[0].cos_dictionary.is_some());
    }

    #[test]
    fn test_standard14_name_strips_subset_prefix() {
        assert_eq!(standard14_name("ABCDEF+Courier-Bold").as_deref(), Some("Courier-Bold"));
        assert_eq!(standard14_name("ArialMT"), None);
    }

    #[derive(Debug)]
    struct CountingConverter;

    impl Type3Converter for CountingConverter {
        fn name(&self) -> &str {
            "counting"
        }

        fn convert(&self, font: &FontModel) -> Vec<ConversionCandidate> {
            vec![ConversionCandidate {
                strategy: String::new(),
                status: CandidateStatus::Warning,
                program_format: None,
                program: None,
                message: Some(format!("{} glyphs", font.glyph_outlines.len())),
                coverage: Vec::new(),
            }]
        }
    }

    #[test]
    fn test_type3_outlines_and_candidates() {
        let mut doc = Document::with_version("1.7");
        let square = doc.add_object(Stream::new(
            dictionary! {},
            b"500 0 d0 0 0 500 500 re f".to_vec(),
        ));
        let font_id = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type3",
            "FontMatrix" => vec![
                Object::Real(0.001),
                Object::Integer(0),
                Object::Integer(0),
                Object::Real(0.001),
                Object::Integer(0),
                Object::Integer(0),
            ],
            "CharProcs" => dictionary! { "square" => square, "A" => square },
            "Encoding" => dictionary! {
                "Type" => "Encoding",
                "Differences" => vec![
                    Object::Integer(65),
                    Object::Name(b"A".to_vec()),
                    Object::Name(b"square".to_vec()),
                ],
            },
            "FirstChar" => 65,
            "LastChar" => 66,
            "Widths" => vec![Object::Integer(500), Object::Integer(600)],
        });
        let resources = dictionary! { "Font" => dictionary! { "T1" => font_id } };
        let cff = CffConverter::disabled();
        let converter: &dyn Type3Converter = &CountingConverter;
        let mut collector = FontCollector::new(&doc, &cff).with_type3_converter(Some(converter));
        let fonts = collector.collect_page(1, &resources);

        let font = &fonts[0];
        assert!(font.is_type3());
        assert_eq!(font.units_per_em, Some(1000));
        assert_eq!(font.glyph_outlines.len(), 2);
        assert_eq!(font.glyph_outlines[0].code, 65);
        assert_eq!(font.glyph_outlines[0].unicode.as_deref(), Some("A"));
        assert_eq!(font.glyph_outlines[1].width, Some(600.0));
        assert!(font.glyph_outlines[1].unicode.is_none());
        assert_eq!(font.conversion_candidates[0].strategy, "counting");
        assert_eq!(font.conversion_candidates[0].message.as_deref(), Some("2 glyphs"));
    }

    #[test]
    fn test_unicode_from_glyph_name() {
        assert_eq!(unicode_from_glyph_name("uni00E9").as_deref(), Some("\u{e9}"));
        assert_eq!(unicode_from_glyph_name("u1F600").as_deref(), Some("\u{1F600}"));
        assert_eq!(unicode_from_glyph_name("period").as_deref(), Some("."));
        assert_eq!(unicode_from_glyph_name("g12"), None);
    }
}

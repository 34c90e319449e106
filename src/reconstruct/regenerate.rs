//! Full content regeneration from text and image elements.

use super::image::{create_image_xobject, image_draw_operations, unused_image_name};
use crate::error::Result;
use crate::font::{
    add_font_resource, map_unsupported_glyph, resolve_fallback_font_id_for_code_point, FontMap,
    FontResolver, LoadedFont, FALLBACK_FONT_ID,
};
use crate::model::{ColorModel, ImageElement, TextElement, IMAGE_Z_ORDER_BASE, PAGE_INDEPENDENT};
use crate::util::add_page_resource;
use base64::Engine;
use lopdf::content::{Content, Operation};
use lopdf::{Document, Object, ObjectId, Stream, StringFormat};
use std::collections::{BTreeSet, HashMap};

/// Default z-order base of text elements without an explicit order.
pub const TEXT_Z_ORDER_BASE: i64 = 1_000_000;

/// Outcome of checking a page's text against its fonts.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PreflightResult {
    /// Some element needs a font other than its own
    pub uses_fallback: bool,
    /// Fallback fonts loaded for the page
    pub fallback_ids: BTreeSet<String>,
}

/// Check every text element against its font.
///
/// Elements whose font is missing or cannot encode their text are marked
/// `fallback_used`, and the fallback fonts for the failing code points are
/// loaded into `fonts`. Glyph-indexed fonts pass a code point when their
/// normalized replacement covers it or the element carries raw codes.
pub fn preflight_text_elements(
    doc: &mut Document,
    page_number: u32,
    elements: &mut [TextElement],
    fonts: &mut FontMap,
    resolver: &FontResolver<'_>,
) -> PreflightResult {
    let mut result = PreflightResult::default();
    for element in elements.iter_mut() {
        if element.text.is_empty() {
            continue;
        }
        let font_id = element.font_id.as_deref().unwrap_or_default();
        let Some(font) = fonts.get(page_number as i32, font_id) else {
            result.uses_fallback = true;
            result.fallback_ids.insert(FALLBACK_FONT_ID.to_string());
            element.fallback_used = Some(true);
            continue;
        };

        let failing: Vec<char> = if font.glyph_indexed {
            let has_codes = element.char_codes.is_some();
            element
                .text
                .chars()
                .filter(|ch| {
                    let covered = font
                        .uid
                        .as_deref()
                        .and_then(|uid| resolver.registry().covers(uid, *ch as u32))
                        .unwrap_or(false);
                    !covered && !has_codes
                })
                .collect()
        } else if font.can_encode(&element.text) {
            Vec::new()
        } else {
            element
                .text
                .chars()
                .filter(|ch| !font.encoder.can_encode(*ch))
                .collect()
        };

        if failing.is_empty() {
            continue;
        }
        result.uses_fallback = true;
        element.fallback_used = Some(true);
        for ch in failing {
            result
                .fallback_ids
                .insert(resolve_fallback_font_id_for_code_point(ch as u32).to_string());
        }
    }

    for id in &result.fallback_ids {
        fonts.ensure_fallback(doc, resolver, id);
    }
    if result.uses_fallback && result.fallback_ids.is_empty() {
        result.fallback_ids.insert(FALLBACK_FONT_ID.to_string());
        fonts.ensure_fallback(doc, resolver, FALLBACK_FONT_ID);
    }
    result
}

/// Register the fallback fonts of a preflight in the page's `/Font` resources.
pub fn ensure_fallback_resources(
    doc: &mut Document,
    page_id: ObjectId,
    fallback_ids: &BTreeSet<String>,
    fonts: &FontMap,
) -> Result<()> {
    for id in fallback_ids {
        if let Some(font) = fonts.get(PAGE_INDEPENDENT, id) {
            add_font_resource(doc, page_id, &font.resource_name, font.object_id)?;
        }
    }
    Ok(())
}

/// Text shown in one font.
#[derive(Debug, Clone)]
pub struct FontRun {
    pub font: LoadedFont,
    pub text: String,
    /// Raw codes to show instead of encoding `text`
    pub raw_codes: Option<Vec<u8>>,
}

impl FontRun {
    /// Bytes for the show operator.
    pub fn encoded(&self) -> Option<Vec<u8>> {
        match &self.raw_codes {
            Some(codes) => Some(codes.clone()),
            None => self.font.encode(&self.text),
        }
    }
}

/// Split an element's text into runs of contiguous font.
///
/// Each code point goes to the element's font when it can encode it, else
/// to the fallback for its script, else (after the punctuation remap) to
/// whichever of the two can show the mapped glyph, else `?` in the
/// universal fallback. Code points nothing can show are dropped.
pub fn build_font_runs(
    doc: &mut Document,
    page_number: u32,
    element: &mut TextElement,
    fonts: &mut FontMap,
    resolver: &FontResolver<'_>,
) -> Vec<FontRun> {
    let mut runs = Vec::new();
    if element.text.is_empty() {
        return runs;
    }
    let font_id = element.font_id.as_deref().unwrap_or_default();
    let mut fallback_applied = false;
    let base = match fonts.get(page_number as i32, font_id) {
        Some(font) => font.clone(),
        None => {
            fallback_applied = true;
            fonts.ensure_fallback(doc, resolver, FALLBACK_FONT_ID).clone()
        }
    };

    if base.glyph_indexed {
        let normalized = base
            .uid
            .as_deref()
            .and_then(|uid| fonts.normalized(doc, resolver, uid))
            .filter(|n| n.can_encode(&element.text))
            .cloned();
        if let Some(normalized) = normalized {
            runs.push(FontRun {
                font: normalized,
                text: element.text.clone(),
                raw_codes: None,
            });
            return runs;
        }
        let codes = element
            .char_codes
            .as_deref()
            .and_then(|c| base64::engine::general_purpose::STANDARD.decode(c).ok());
        if let Some(codes) = codes {
            runs.push(FontRun {
                font: base,
                text: element.text.clone(),
                raw_codes: Some(codes),
            });
            return runs;
        }
    }

    let mut buffer = String::new();
    let mut current = base.clone();
    for ch in element.text.chars() {
        let mut glyph = ch.to_string();
        let target = if base.encoder.can_encode(ch) {
            base.clone()
        } else {
            fallback_applied = true;
            let code_point = ch as u32;
            let fallback_id = resolve_fallback_font_id_for_code_point(code_point);
            let mut candidate = fonts.ensure_fallback(doc, resolver, fallback_id).clone();
            if !candidate.can_encode(&glyph) {
                if let Some(mapped) = map_unsupported_glyph(code_point) {
                    if base.can_encode(mapped) {
                        glyph = mapped.to_string();
                        candidate = base.clone();
                    } else if candidate.can_encode(mapped) {
                        glyph = mapped.to_string();
                    }
                }
            }
            if !candidate.can_encode(&glyph) {
                glyph = "?".to_string();
                candidate = fonts.ensure_fallback(doc, resolver, FALLBACK_FONT_ID).clone();
                if !candidate.can_encode(&glyph) {
                    log::debug!("Dropping unsupported glyph U+{:04X}", code_point);
                    continue;
                }
            }
            if candidate.object_id != base.object_id {
                log::trace!(
                    "Using fallback font {} for U+{:04X}",
                    candidate.resource_name,
                    code_point
                );
            }
            candidate
        };

        if target.object_id != current.object_id {
            if !buffer.is_empty() {
                runs.push(FontRun {
                    font: current,
                    text: std::mem::take(&mut buffer),
                    raw_codes: None,
                });
            }
            current = target;
        }
        buffer.push_str(&glyph);
    }
    if !buffer.is_empty() {
        runs.push(FontRun {
            font: current,
            text: buffer,
            raw_codes: None,
        });
    }
    if fallback_applied {
        element.fallback_used = Some(true);
    }
    runs
}

enum Drawable {
    Text(usize),
    Image(usize),
}

/// Order elements for drawing: by z-order, then images before text, then
/// element order. Text defaults to `1_000_000 + index`, images to
/// `-1_000_000 + index`.
fn merge_drawables(texts: &[TextElement], images: &[ImageElement]) -> Vec<Drawable> {
    let mut drawables: Vec<(i64, usize, Drawable)> = Vec::with_capacity(texts.len() + images.len());
    let mut sequence = 0;
    for (index, image) in images.iter().enumerate() {
        let order = image.z_order.unwrap_or(IMAGE_Z_ORDER_BASE + index as i64);
        drawables.push((order, sequence, Drawable::Image(index)));
        sequence += 1;
    }
    for (index, text) in texts.iter().enumerate() {
        let order = text.z_order.unwrap_or(TEXT_Z_ORDER_BASE + index as i64);
        drawables.push((order, sequence, Drawable::Text(index)));
        sequence += 1;
    }
    drawables.sort_by_key(|(order, sequence, _)| (*order, *sequence));
    drawables.into_iter().map(|(_, _, d)| d).collect()
}

/// Graphics and text state already written to the stream.
struct EmittedState {
    character_spacing: f32,
    word_spacing: f32,
    horizontal_scaling: f32,
    leading: f32,
    rise: f32,
    rendering_mode: i64,
    fill: ColorModel,
    stroke: ColorModel,
    font: Option<(String, f32)>,
}

impl Default for EmittedState {
    fn default() -> Self {
        Self {
            character_spacing: 0.0,
            word_spacing: 0.0,
            horizontal_scaling: 100.0,
            leading: 0.0,
            rise: 0.0,
            rendering_mode: 0,
            fill: ColorModel::black(),
            stroke: ColorModel::black(),
            font: None,
        }
    }
}

fn set_if_changed(ops: &mut Vec<Operation>, current: &mut f32, value: Option<f32>, default: f32, operator: &str) {
    let value = value.filter(|v| v.is_finite()).unwrap_or(default);
    if (*current - value).abs() > f32::EPSILON {
        ops.push(Operation::new(operator, vec![Object::Real(value)]));
        *current = value;
    }
}

fn apply_text_state(ops: &mut Vec<Operation>, state: &mut EmittedState, element: &TextElement) {
    set_if_changed(ops, &mut state.character_spacing, element.character_spacing, 0.0, "Tc");
    set_if_changed(ops, &mut state.word_spacing, element.word_spacing, 0.0, "Tw");
    set_if_changed(ops, &mut state.horizontal_scaling, element.horizontal_scaling, 100.0, "Tz");
    set_if_changed(ops, &mut state.leading, element.leading, 0.0, "TL");
    set_if_changed(ops, &mut state.rise, element.rise, 0.0, "Ts");

    let mode = element.rendering_mode.unwrap_or(0);
    if !(0..=7).contains(&mode) {
        log::debug!("Ignoring unsupported rendering mode {}", mode);
    } else if mode != state.rendering_mode {
        ops.push(Operation::new("Tr", vec![Object::Integer(mode)]));
        state.rendering_mode = mode;
    }

    let fill = element.fill_color.clone().unwrap_or_else(ColorModel::black);
    if fill != state.fill {
        if let Some(op) = color_operation(&fill, true) {
            ops.push(op);
            state.fill = fill;
        }
    }
    let stroke = element.stroke_color.clone().unwrap_or_else(ColorModel::black);
    if stroke != state.stroke {
        if let Some(op) = color_operation(&stroke, false) {
            ops.push(op);
            state.stroke = stroke;
        }
    }
}

/// Device colour operator for a colour; other spaces are inferred from
/// the component count.
fn color_operation(color: &ColorModel, fill: bool) -> Option<Operation> {
    let components = &color.components;
    let (required, operator) = match (color.color_space.as_str(), components.len()) {
        ("DeviceGray", _) => (1, if fill { "g" } else { "G" }),
        ("DeviceRGB", _) => (3, if fill { "rg" } else { "RG" }),
        ("DeviceCMYK", _) => (4, if fill { "k" } else { "K" }),
        (_, 1) => (1, if fill { "g" } else { "G" }),
        (_, 3) => (3, if fill { "rg" } else { "RG" }),
        (_, 4) => (4, if fill { "k" } else { "K" }),
        (space, _) => {
            log::debug!("Skipping unsupported colour space {}", space);
            return None;
        }
    };
    if components.len() < required {
        return None;
    }
    Some(Operation::new(
        operator,
        components[..required].iter().copied().map(Object::Real).collect(),
    ))
}

/// Size selected with `Tf`: the font-matrix size, else the scale of the
/// text matrix, else the font size, else 12.
pub fn font_matrix_scale(element: &TextElement) -> f32 {
    if let Some(size) = element.font_matrix_size.filter(|s| *s > 0.0 && s.is_finite()) {
        return size;
    }
    if let Some(m) = element.text_matrix.as_ref().filter(|m| m.len() >= 4) {
        let vertical = m[1].hypot(m[3]);
        if vertical > 0.0 {
            return vertical;
        }
        let horizontal = m[0].hypot(m[2]);
        if horizontal > 0.0 {
            return horizontal;
        }
    }
    element
        .font_size
        .filter(|s| *s > 0.0 && s.is_finite())
        .unwrap_or(12.0)
}

/// `Tm` operands: the text matrix with the font scale divided out, or a
/// translation to `(x, y)`.
fn text_matrix_operands(element: &TextElement, scale: f32) -> Vec<Object> {
    let values = match element.text_matrix.as_ref().filter(|m| m.len() == 6) {
        Some(m) => {
            let s = if scale != 0.0 { scale } else { 1.0 };
            vec![m[0] / s, m[1] / s, m[2] / s, m[3] / s, m[4], m[5]]
        }
        None => vec![
            1.0,
            0.0,
            0.0,
            1.0,
            element.x.filter(|v| v.is_finite()).unwrap_or(0.0),
            element.y.filter(|v| v.is_finite()).unwrap_or(0.0),
        ],
    };
    values.into_iter().map(Object::Real).collect()
}

/// Draw the page's elements into a new content stream.
///
/// With `append` the existing contents are kept, wrapped in `q`/`Q`, and
/// the new stream is drawn after them; otherwise it replaces them. Fonts
/// and images used are added to the page resources.
#[allow(clippy::too_many_arguments)]
pub fn regenerate_page_content(
    doc: &mut Document,
    page_id: ObjectId,
    page_number: u32,
    texts: &mut [TextElement],
    images: &[ImageElement],
    fonts: &mut FontMap,
    resolver: &FontResolver<'_>,
    append: bool,
) -> Result<()> {
    let mut ops = Vec::new();
    let mut state = EmittedState::default();
    let mut used_fonts: HashMap<String, ObjectId> = HashMap::new();
    let mut image_names: HashMap<usize, String> = HashMap::new();
    let mut next_image = 0;
    let mut text_open = false;

    for drawable in merge_drawables(texts, images) {
        match drawable {
            Drawable::Text(index) => {
                let element = &mut texts[index];
                if element.text.is_empty() {
                    continue;
                }
                if !text_open {
                    ops.push(Operation::new("BT", vec![]));
                    text_open = true;
                }
                let scale = font_matrix_scale(element);
                apply_text_state(&mut ops, &mut state, element);
                ops.push(Operation::new("Tm", text_matrix_operands(element, scale)));

                for run in build_font_runs(doc, page_number, element, fonts, resolver) {
                    if run.text.is_empty() && run.raw_codes.is_none() {
                        continue;
                    }
                    let Some(bytes) = run.encoded() else {
                        log::debug!("Font {} cannot encode {:?}", run.font.resource_name, run.text);
                        continue;
                    };
                    let selection = (run.font.resource_name.clone(), scale);
                    if state.font.as_ref() != Some(&selection) {
                        ops.push(Operation::new(
                            "Tf",
                            vec![
                                Object::Name(run.font.resource_name.as_bytes().to_vec()),
                                Object::Real(scale),
                            ],
                        ));
                        state.font = Some(selection);
                    }
                    used_fonts.insert(run.font.resource_name.clone(), run.font.object_id);
                    ops.push(Operation::new(
                        "Tj",
                        vec![Object::String(bytes, StringFormat::Hexadecimal)],
                    ));
                }
            }
            Drawable::Image(index) => {
                if text_open {
                    ops.push(Operation::new("ET", vec![]));
                    text_open = false;
                }
                let element = &images[index];
                let name = match image_names.get(&index) {
                    Some(name) => name.clone(),
                    None => {
                        let Some(xobject) = create_image_xobject(doc, element) else {
                            continue;
                        };
                        let name = unused_image_name(doc, page_id, next_image);
                        next_image += 1;
                        add_page_resource(doc, page_id, "XObject", &name, xobject)?;
                        image_names.insert(index, name.clone());
                        name
                    }
                };
                if let Some(draw) = image_draw_operations(&name, element) {
                    ops.extend(draw);
                }
            }
        }
    }
    if text_open {
        ops.push(Operation::new("ET", vec![]));
    }

    for (name, id) in &used_fonts {
        add_font_resource(doc, page_id, name, *id)?;
    }

    let body = Content { operations: ops }.encode()?;
    let existing = if append { page_content_ids(doc, page_id) } else { Vec::new() };
    let mut contents = Vec::new();
    if existing.is_empty() {
        contents.push(add_content_stream(doc, body));
    } else {
        contents.push(add_content_stream(doc, b"q\n".to_vec()));
        contents.extend(existing);
        let mut wrapped = b"Q\n".to_vec();
        wrapped.extend(body);
        contents.push(add_content_stream(doc, wrapped));
    }
    set_page_contents(doc, page_id, &contents)
}

/// Add a Flate-compressed content stream.
pub fn add_content_stream(doc: &mut Document, bytes: Vec<u8>) -> ObjectId {
    let mut stream = Stream::new(lopdf::Dictionary::new(), bytes);
    if let Err(e) = stream.compress() {
        log::debug!("Content stream left uncompressed: {}", e);
    }
    doc.add_object(stream)
}

/// Object ids of a page's content streams.
pub fn page_content_ids(doc: &Document, page_id: ObjectId) -> Vec<ObjectId> {
    let Ok(page) = doc.get_dictionary(page_id) else {
        return Vec::new();
    };
    match page.get(b"Contents") {
        Ok(Object::Reference(id)) => match doc.get_object(*id) {
            Ok(Object::Array(items)) => items.iter().filter_map(|i| i.as_reference().ok()).collect(),
            _ => vec![*id],
        },
        Ok(Object::Array(items)) => items.iter().filter_map(|i| i.as_reference().ok()).collect(),
        _ => Vec::new(),
    }
}

/// Replace a page's `/Contents`; an empty list removes the entry.
pub fn set_page_contents(doc: &mut Document, page_id: ObjectId, ids: &[ObjectId]) -> Result<()> {
    let page = doc.get_object_mut(page_id).and_then(Object::as_dict_mut)?;
    match ids {
        [] => {
            page.remove(b"Contents");
        }
        [single] => page.set("Contents", Object::Reference(*single)),
        many => page.set(
            "Contents",
            Object::Array(many.iter().map(|id| Object::Reference(*id)).collect()),
        ),
    }
    Ok(())
}

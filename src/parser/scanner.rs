//! Content stream walker.
//!
//! Walks a page's operators with a graphics state stack and emits one
//! [`TextElement`] per shown string plus the images drawn, descending into
//! Form XObjects.

use super::image::PendingImage;
use super::resources::is_image_xobject;
use crate::font::{font_code_map, ToUnicodeMap};
use crate::model::{ColorModel, TextElement};
use crate::reconstruct::TEXT_Z_ORDER_BASE;
use crate::util::{name, number, number_array, page_resources, resolve, stream_bytes};
use base64::Engine;
use lopdf::content::Content;
use lopdf::{Dictionary, Document, Object, ObjectId};
use std::collections::{HashMap, HashSet};
use std::rc::Rc;

/// Form XObject nesting limit.
const MAX_FORM_DEPTH: usize = 16;

/// Affine matrix `[a b c d e f]`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Matrix {
    pub a: f32,
    pub b: f32,
    pub c: f32,
    pub d: f32,
    pub e: f32,
    pub f: f32,
}

impl Default for Matrix {
    fn default() -> Self {
        Self::identity()
    }
}

impl Matrix {
    pub fn new(a: f32, b: f32, c: f32, d: f32, e: f32, f: f32) -> Self {
        Self { a, b, c, d, e, f }
    }

    pub fn identity() -> Self {
        Self::new(1.0, 0.0, 0.0, 1.0, 0.0, 0.0)
    }

    pub fn translation(tx: f32, ty: f32) -> Self {
        Self::new(1.0, 0.0, 0.0, 1.0, tx, ty)
    }

    /// Matrix from six numeric operands.
    pub fn from_operands(operands: &[Object]) -> Option<Self> {
        if operands.len() < 6 {
            return None;
        }
        let v: Vec<f32> = operands[..6].iter().map(number).collect::<Option<_>>()?;
        Some(Self::new(v[0], v[1], v[2], v[3], v[4], v[5]))
    }

    /// `self × rhs`: apply `self` first, then `rhs`.
    pub fn concat(self, rhs: Self) -> Self {
        Self {
            a: self.a * rhs.a + self.b * rhs.c,
            b: self.a * rhs.b + self.b * rhs.d,
            c: self.c * rhs.a + self.d * rhs.c,
            d: self.c * rhs.b + self.d * rhs.d,
            e: self.e * rhs.a + self.f * rhs.c + rhs.e,
            f: self.e * rhs.b + self.f * rhs.d + rhs.f,
        }
    }

    pub fn transform_point(self, x: f32, y: f32) -> (f32, f32) {
        (self.a * x + self.c * y + self.e, self.b * x + self.d * y + self.f)
    }

    /// `(left, bottom, right, top)` of the unit square under this matrix.
    pub fn unit_square_bounds(self) -> (f32, f32, f32, f32) {
        let corners = [
            self.transform_point(0.0, 0.0),
            self.transform_point(1.0, 0.0),
            self.transform_point(0.0, 1.0),
            self.transform_point(1.0, 1.0),
        ];
        corners.iter().fold(
            (f32::MAX, f32::MAX, f32::MIN, f32::MIN),
            |(l, b, r, t), (x, y)| (l.min(*x), b.min(*y), r.max(*x), t.max(*y)),
        )
    }

    fn scale_x(self) -> f32 {
        self.a.hypot(self.b)
    }

    fn scale_y(self) -> f32 {
        self.c.hypot(self.d)
    }

    pub fn to_vec(self) -> Vec<f32> {
        vec![self.a, self.b, self.c, self.d, self.e, self.f]
    }
}

/// Glyph advances of a font in text space units per unit font size.
#[derive(Debug, Default)]
struct GlyphWidths {
    first_char: u32,
    widths: Vec<f32>,
    cid_widths: HashMap<u32, f32>,
    default_width: f32,
    scale: f32,
}

impl GlyphWidths {
    fn simple(doc: &Document, font: &Dictionary, type3: bool) -> Self {
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
        let missing = font
            .get(b"FontDescriptor")
            .ok()
            .and_then(|o| resolve(doc, o).as_dict().ok())
            .and_then(|d| d.get(b"MissingWidth").ok())
            .and_then(|o| number(resolve(doc, o)));
        let scale = if type3 {
            font.get(b"FontMatrix")
                .ok()
                .and_then(|o| number_array(doc, o))
                .and_then(|m| m.first().copied())
                .unwrap_or(0.001)
        } else {
            0.001
        };
        let default_width = match missing {
            Some(w) if w > 0.0 => w,
            _ if type3 => 0.0,
            _ => 500.0,
        };
        Self {
            first_char,
            widths,
            cid_widths: HashMap::new(),
            default_width,
            scale,
        }
    }

    fn composite(doc: &Document, font: &Dictionary) -> Self {
        let descendant = font
            .get(b"DescendantFonts")
            .ok()
            .and_then(|o| resolve(doc, o).as_array().ok())
            .and_then(|a| a.first())
            .and_then(|o| resolve(doc, o).as_dict().ok());
        let mut widths = Self {
            default_width: 1000.0,
            scale: 0.001,
            ..Default::default()
        };
        let Some(descendant) = descendant else {
            return widths;
        };
        if let Some(dw) = descendant.get(b"DW").ok().and_then(|o| number(resolve(doc, o))) {
            widths.default_width = dw;
        }
        let Some(w) = descendant
            .get(b"W")
            .ok()
            .and_then(|o| resolve(doc, o).as_array().ok())
        else {
            return widths;
        };

        // Entries are `c [w1 w2 ...]` or `c_first c_last w`.
        let mut i = 0;
        while i < w.len() {
            let Some(start) = number(resolve(doc, &w[i])) else {
                break;
            };
            match w.get(i + 1).map(|o| resolve(doc, o)) {
                Some(Object::Array(list)) => {
                    for (offset, value) in list.iter().enumerate() {
                        if let Some(width) = number(resolve(doc, value)) {
                            widths.cid_widths.insert(start as u32 + offset as u32, width);
                        }
                    }
                    i += 2;
                }
                Some(end) => {
                    let (Some(end), Some(width)) =
                        (number(end), w.get(i + 2).and_then(|o| number(resolve(doc, o))))
                    else {
                        break;
                    };
                    let (first, last) = (start as u32, (end as u32).min(start as u32 + 0xFFFF));
                    for cid in first..=last {
                        widths.cid_widths.insert(cid, width);
                    }
                    i += 3;
                }
                None => break,
            }
        }
        widths
    }

    fn width(&self, code: u32) -> f32 {
        let explicit = self.cid_widths.get(&code).copied().or_else(|| {
            code.checked_sub(self.first_char)
                .and_then(|i| self.widths.get(i as usize).copied())
        });
        explicit.unwrap_or(self.default_width) * self.scale
    }

    fn has_width(&self, code: u32) -> bool {
        self.cid_widths.contains_key(&code)
            || code
                .checked_sub(self.first_char)
                .is_some_and(|i| (i as usize) < self.widths.len())
    }
}

/// Maps a font's character codes to text and advances.
#[derive(Debug)]
struct FontDecoder {
    map: ToUnicodeMap,
    widths: GlyphWidths,
    glyph_indexed: bool,
}

/// One decoded character code.
struct Glyph {
    text: String,
    advance: f32,
    is_space: bool,
}

impl FontDecoder {
    fn new(doc: &Document, font: &Dictionary) -> Self {
        let subtype = font.get(b"Subtype").ok().and_then(name);
        let type3 = subtype.as_deref() == Some("Type3");
        let widths = if subtype.as_deref() == Some("Type0") {
            GlyphWidths::composite(doc, font)
        } else {
            GlyphWidths::simple(doc, font, type3)
        };
        Self {
            map: font_code_map(doc, font),
            widths,
            glyph_indexed: type3,
        }
    }

    /// Unknown codes decode to U+FFFD so every code yields text.
    fn decode(&self, bytes: &[u8]) -> Vec<Glyph> {
        let code_len = self.map.code_len.max(1);
        bytes
            .chunks(code_len)
            .map(|chunk| {
                let code = chunk.iter().fold(0u32, |acc, b| (acc << 8) | *b as u32);
                let text = self
                    .map
                    .get(code)
                    .filter(|t| !t.is_empty())
                    .unwrap_or("\u{FFFD}")
                    .to_string();
                Glyph {
                    text,
                    advance: self.widths.width(code),
                    is_space: code_len == 1 && code == 32,
                }
            })
            .collect()
    }

    fn space_width(&self) -> Option<f32> {
        (self.map.code_len <= 1 && self.widths.has_width(32)).then(|| self.widths.width(32))
    }
}

/// Graphics state saved by `q` and restored by `Q`. Text state parameters
/// are part of it.
#[derive(Debug, Clone)]
struct GraphicsState {
    ctm: Matrix,
    fill_color: ColorModel,
    stroke_color: ColorModel,
    font_id: Option<String>,
    font_size: f32,
    character_spacing: f32,
    word_spacing: f32,
    horizontal_scaling: f32,
    leading: f32,
    rise: f32,
    rendering_mode: i64,
}

impl GraphicsState {
    fn new(ctm: Matrix) -> Self {
        Self {
            ctm,
            fill_color: ColorModel::black(),
            stroke_color: ColorModel::black(),
            font_id: None,
            font_size: 0.0,
            character_spacing: 0.0,
            word_spacing: 0.0,
            horizontal_scaling: 100.0,
            leading: 0.0,
            rise: 0.0,
            rendering_mode: 0,
        }
    }
}

/// Text and images found on a page, in content order.
#[derive(Debug, Default)]
pub struct PageScan {
    pub text_elements: Vec<TextElement>,
    pub images: Vec<PendingImage>,
}

/// Walk the content of a page.
///
/// With `capture_images` false, image draws are skipped. Content that
/// cannot be parsed yields whatever was collected before the failure.
pub fn scan_page(doc: &Document, page_id: ObjectId, capture_images: bool) -> PageScan {
    let content = match doc.get_page_content(page_id) {
        Ok(content) => content,
        Err(e) => {
            log::debug!("Page {:?} has no readable content: {}", page_id, e);
            return PageScan::default();
        }
    };
    let mut scanner = ContentScanner {
        doc,
        capture_images,
        decoders: HashMap::new(),
        forms_on_path: HashSet::new(),
        scan: PageScan::default(),
    };
    scanner.run(
        &content,
        page_resources(doc, page_id),
        "",
        GraphicsState::new(Matrix::identity()),
        0,
    );
    scanner.scan
}

struct ContentScanner<'a> {
    doc: &'a Document,
    capture_images: bool,
    decoders: HashMap<String, Rc<FontDecoder>>,
    forms_on_path: HashSet<ObjectId>,
    scan: PageScan,
}

impl<'a> ContentScanner<'a> {
    fn run(
        &mut self,
        content: &[u8],
        resources: Option<&'a Dictionary>,
        prefix: &str,
        initial: GraphicsState,
        depth: usize,
    ) {
        let content = match Content::decode(content) {
            Ok(content) => content,
            Err(e) => {
                log::warn!("Failed to parse content stream: {}", e);
                return;
            }
        };

        let mut state = initial;
        let mut stack: Vec<GraphicsState> = Vec::new();
        let mut tm = Matrix::identity();
        let mut tlm = Matrix::identity();
        let mut in_text = false;

        for op in &content.operations {
            let operands = op.operands.as_slice();
            let num = |i: usize| operands.get(i).and_then(number);
            match op.operator.as_str() {
                "q" => stack.push(state.clone()),
                "Q" => {
                    if let Some(saved) = stack.pop() {
                        state = saved;
                    }
                }
                "cm" => {
                    if let Some(m) = Matrix::from_operands(operands) {
                        state.ctm = m.concat(state.ctm);
                    }
                }
                "BT" => {
                    in_text = true;
                    tm = Matrix::identity();
                    tlm = Matrix::identity();
                }
                "ET" => in_text = false,
                "Tf" => {
                    if let Some(font) = operands.first().and_then(name) {
                        state.font_id = Some(scoped_id(prefix, &font));
                    }
                    if let Some(size) = num(1) {
                        state.font_size = size;
                    }
                }
                "Tc" => state.character_spacing = num(0).unwrap_or(state.character_spacing),
                "Tw" => state.word_spacing = num(0).unwrap_or(state.word_spacing),
                "Tz" => state.horizontal_scaling = num(0).unwrap_or(state.horizontal_scaling),
                "TL" => state.leading = num(0).unwrap_or(state.leading),
                "Ts" => state.rise = num(0).unwrap_or(state.rise),
                "Tr" => {
                    if let Some(mode) = operands.first().and_then(|o| o.as_i64().ok()) {
                        state.rendering_mode = mode;
                    }
                }
                "Td" | "TD" => {
                    let (tx, ty) = (num(0).unwrap_or(0.0), num(1).unwrap_or(0.0));
                    if op.operator == "TD" {
                        state.leading = -ty;
                    }
                    tlm = Matrix::translation(tx, ty).concat(tlm);
                    tm = tlm;
                }
                "Tm" => {
                    if let Some(m) = Matrix::from_operands(operands) {
                        tlm = m;
                        tm = m;
                    }
                }
                "T*" => {
                    tlm = Matrix::translation(0.0, -state.leading).concat(tlm);
                    tm = tlm;
                }
                "Tj" if in_text => {
                    if let Some(Object::String(bytes, _)) = operands.first() {
                        self.show(bytes, &state, &mut tm, resources);
                    }
                }
                "'" | "\"" if in_text => {
                    if op.operator == "\"" {
                        state.word_spacing = num(0).unwrap_or(state.word_spacing);
                        state.character_spacing = num(1).unwrap_or(state.character_spacing);
                    }
                    tlm = Matrix::translation(0.0, -state.leading).concat(tlm);
                    tm = tlm;
                    let index = if op.operator == "\"" { 2 } else { 0 };
                    if let Some(Object::String(bytes, _)) = operands.get(index) {
                        self.show(bytes, &state, &mut tm, resources);
                    }
                }
                "TJ" if in_text => {
                    let Some(Object::Array(items)) = operands.first() else {
                        continue;
                    };
                    for item in items {
                        match item {
                            Object::String(bytes, _) => self.show(bytes, &state, &mut tm, resources),
                            other => {
                                if let Some(adjust) = number(other) {
                                    let tx = -adjust / 1000.0
                                        * state.font_size
                                        * state.horizontal_scaling
                                        / 100.0;
                                    tm = Matrix::translation(tx, 0.0).concat(tm);
                                }
                            }
                        }
                    }
                }
                "g" => state.fill_color = ColorModel::new("DeviceGray", numbers(operands)),
                "G" => state.stroke_color = ColorModel::new("DeviceGray", numbers(operands)),
                "rg" => state.fill_color = ColorModel::new("DeviceRGB", numbers(operands)),
                "RG" => state.stroke_color = ColorModel::new("DeviceRGB", numbers(operands)),
                "k" => state.fill_color = ColorModel::new("DeviceCMYK", numbers(operands)),
                "K" => state.stroke_color = ColorModel::new("DeviceCMYK", numbers(operands)),
                "cs" | "CS" => {
                    let space = operands
                        .first()
                        .and_then(name)
                        .map(|n| self.color_space_family(&n, resources))
                        .unwrap_or_else(|| "DeviceGray".to_string());
                    let color = ColorModel::new(space.clone(), initial_components(&space));
                    if op.operator == "cs" {
                        state.fill_color = color;
                    } else {
                        state.stroke_color = color;
                    }
                }
                "sc" | "scn" => {
                    let components = numbers(operands);
                    if !components.is_empty() {
                        state.fill_color.components = components;
                    }
                }
                "SC" | "SCN" => {
                    let components = numbers(operands);
                    if !components.is_empty() {
                        state.stroke_color.components = components;
                    }
                }
                "Do" => {
                    if let Some(xobject) = operands.first().and_then(name) {
                        self.draw_xobject(&xobject, resources, prefix, &state, depth);
                    }
                }
                "BI" => {
                    if self.capture_images {
                        self.inline_image(operands, resources, &state);
                    }
                }
                _ => {}
            }
        }
    }

    fn decoder(&mut self, font_id: &str, resources: Option<&'a Dictionary>) -> Option<Rc<FontDecoder>> {
        if let Some(decoder) = self.decoders.get(font_id) {
            return Some(decoder.clone());
        }
        let resource_name = font_id.rsplit('/').next().unwrap_or(font_id);
        let doc = self.doc;
        let font = resources?
            .get(b"Font")
            .ok()
            .and_then(|o| resolve(doc, o).as_dict().ok())?
            .get(resource_name.as_bytes())
            .ok()
            .and_then(|o| resolve(doc, o).as_dict().ok());
        let Some(font) = font else {
            log::debug!("Font resource {} not found", font_id);
            return None;
        };
        let decoder = Rc::new(FontDecoder::new(doc, font));
        self.decoders.insert(font_id.to_string(), decoder.clone());
        Some(decoder)
    }

    fn show(&mut self, bytes: &[u8], state: &GraphicsState, tm: &mut Matrix, resources: Option<&'a Dictionary>) {
        if bytes.is_empty() {
            return;
        }
        let Some(font_id) = state.font_id.clone() else {
            log::debug!("Text shown before any font was selected");
            return;
        };
        let decoder = self.decoder(&font_id, resources);
        let glyphs = match &decoder {
            Some(decoder) => decoder.decode(bytes),
            None => bytes
                .iter()
                .map(|b| Glyph {
                    text: (*b as char).to_string(),
                    advance: 0.5,
                    is_space: *b == 32,
                })
                .collect(),
        };

        let scaling = state.horizontal_scaling / 100.0;
        let advance: f32 = glyphs
            .iter()
            .map(|g| {
                let spacing = if g.is_space { state.word_spacing } else { 0.0 };
                (g.advance * state.font_size + state.character_spacing + spacing) * scaling
            })
            .sum();

        let rendering = tm.concat(state.ctm);
        let size = state.font_size;
        let mut element = TextElement::new(glyphs.iter().map(|g| g.text.as_str()).collect::<String>(), font_id);
        element.font_size = Some(size * rendering.scale_y());
        element.font_matrix_size = Some(size);
        element.x = Some(rendering.e);
        element.y = Some(rendering.f);
        element.width = Some(advance * rendering.scale_x());
        element.height = element.font_size;
        element.text_matrix = Some(Matrix::new(size, 0.0, 0.0, size, 0.0, 0.0).concat(rendering).to_vec());
        element.character_spacing = Some(state.character_spacing);
        element.word_spacing = Some(state.word_spacing);
        element.horizontal_scaling = Some(state.horizontal_scaling);
        element.leading = Some(state.leading);
        element.rise = Some(state.rise);
        element.rendering_mode = Some(state.rendering_mode);
        element.fill_color = Some(state.fill_color.clone());
        element.stroke_color = Some(state.stroke_color.clone());
        element.z_order = Some(TEXT_Z_ORDER_BASE + self.scan.text_elements.len() as i64);
        if let Some(decoder) = &decoder {
            element.space_width = decoder.space_width().map(|w| w * size);
            if decoder.glyph_indexed {
                element.char_codes = Some(base64::engine::general_purpose::STANDARD.encode(bytes));
            }
        }
        element.compact();
        self.scan.text_elements.push(element);

        *tm = Matrix::translation(advance, 0.0).concat(*tm);
    }

    fn draw_xobject(
        &mut self,
        xobject: &str,
        resources: Option<&'a Dictionary>,
        prefix: &str,
        state: &GraphicsState,
        depth: usize,
    ) {
        let doc = self.doc;
        let Some(entry) = resources
            .and_then(|r| r.get(b"XObject").ok())
            .and_then(|o| resolve(doc, o).as_dict().ok())
            .and_then(|x| x.get(xobject.as_bytes()).ok())
        else {
            log::debug!("XObject {} not found", xobject);
            return;
        };
        let Ok(stream) = resolve(doc, entry).as_stream() else {
            return;
        };

        if is_image_xobject(doc, entry) {
            if self.capture_images {
                self.scan
                    .images
                    .push(PendingImage::from_xobject(doc, xobject, stream, resources, state.ctm));
            }
            return;
        }
        if stream.dict.get(b"Subtype").ok().and_then(name).as_deref() != Some("Form") {
            return;
        }
        if depth >= MAX_FORM_DEPTH {
            log::warn!("Form XObject nesting too deep at {}", xobject);
            return;
        }
        let form_id = entry.as_reference().ok();
        if let Some(id) = form_id {
            if !self.forms_on_path.insert(id) {
                log::debug!("Skipping recursive Form XObject {}", xobject);
                return;
            }
        }

        let own_resources = stream
            .dict
            .get(b"Resources")
            .ok()
            .and_then(|o| resolve(doc, o).as_dict().ok());
        // Fonts of a form with its own resources are scoped under the form name.
        let (form_resources, form_prefix) = match own_resources {
            Some(own) => (Some(own), scoped_id(prefix, xobject)),
            None => (resources, prefix.to_string()),
        };
        let matrix = stream
            .dict
            .get(b"Matrix")
            .ok()
            .and_then(|o| resolve(doc, o).as_array().ok())
            .and_then(|m| Matrix::from_operands(m))
            .unwrap_or_default();
        let mut form_state = state.clone();
        form_state.ctm = matrix.concat(state.ctm);

        let content = stream_bytes(stream);
        self.run(&content, form_resources, &form_prefix, form_state, depth + 1);

        if let Some(id) = form_id {
            self.forms_on_path.remove(&id);
        }
    }

    fn inline_image(&mut self, operands: &[Object], resources: Option<&'a Dictionary>, state: &GraphicsState) {
        let captured = match operands {
            [Object::Stream(stream), ..] => Some((stream.dict.clone(), stream.content.clone())),
            [Object::Dictionary(dict), Object::String(data, _), ..] => Some((dict.clone(), data.clone())),
            _ => None,
        };
        match captured {
            Some((dict, data)) => self.scan.images.push(PendingImage::from_inline(
                self.doc, &dict, data, resources, state.ctm,
            )),
            None => log::debug!("Unreadable inline image skipped"),
        }
    }

    /// Family name of a colour space operand, following resource names.
    fn color_space_family(&self, space: &str, resources: Option<&Dictionary>) -> String {
        let doc = self.doc;
        let named = resources
            .and_then(|r| r.get(b"ColorSpace").ok())
            .and_then(|o| resolve(doc, o).as_dict().ok())
            .and_then(|d| d.get(space.as_bytes()).ok())
            .map(|o| resolve(doc, o));
        match named {
            Some(Object::Name(n)) => String::from_utf8_lossy(n).into_owned(),
            Some(Object::Array(items)) => {
                let head = items.first().and_then(|o| name(resolve(doc, o)));
                match head.as_deref() {
                    Some("ICCBased") => {
                        let n = items
                            .get(1)
                            .and_then(|o| resolve(doc, o).as_stream().ok())
                            .and_then(|s| s.dict.get(b"N").ok())
                            .and_then(|n| n.as_i64().ok());
                        match n {
                            Some(1) => "DeviceGray".to_string(),
                            Some(4) => "DeviceCMYK".to_string(),
                            _ => "DeviceRGB".to_string(),
                        }
                    }
                    Some(other) => other.to_string(),
                    None => space.to_string(),
                }
            }
            _ => space.to_string(),
        }
    }
}

fn scoped_id(prefix: &str, name: &str) -> String {
    if prefix.is_empty() {
        name.to_string()
    } else {
        format!("{}/{}", prefix, name)
    }
}

fn numbers(operands: &[Object]) -> Vec<f32> {
    operands.iter().filter_map(number).collect()
}

fn initial_components(space: &str) -> Vec<f32> {
    match space {
        "DeviceRGB" | "CalRGB" => vec![0.0, 0.0, 0.0],
        "DeviceCMYK" => vec![0.0, 0.0, 0.0, 1.0],
        "Pattern" => Vec::new(),
        _ => vec![0.0],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lopdf::{dictionary, Stream};

    fn page_with(content: &[u8], extra_xobjects: Dictionary, doc: &mut Document) -> ObjectId {
        let helvetica = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Helvetica",
            "Encoding" => "WinAnsiEncoding",
            "FirstChar" => 32,
            "Widths" => vec![250.into(), 333.into()],
        });
        let contents = doc.add_object(Stream::new(dictionary! {}, content.to_vec()));
        let pages_id = doc.new_object_id();
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
            "Resources" => dictionary! {
                "Font" => dictionary! { "F1" => helvetica },
                "XObject" => extra_xobjects,
            },
            "Contents" => contents,
        });
        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => vec![page_id.into()],
                "Count" => 1,
            }),
        );
        let catalog = doc.add_object(dictionary! { "Type" => "Catalog", "Pages" => pages_id });
        doc.trailer.set("Root", catalog);
        page_id
    }

    #[test]
    fn test_one_element_per_string() {
        let mut doc = Document::with_version("1.7");
        let page_id = page_with(
            b"BT /F1 12 Tf 72 700 Td (Hello) Tj [(Wor) -250 (ld)] TJ ET",
            dictionary! {},
            &mut doc,
        );
        let scan = scan_page(&doc, page_id, true);
        let texts: Vec<&str> = scan.text_elements.iter().map(|e| e.text.as_str()).collect();
        assert_eq!(texts, vec!["Hello", "Wor", "ld"]);

        let first = &scan.text_elements[0];
        assert_eq!(first.font_id.as_deref(), Some("F1"));
        assert_eq!(first.x, Some(72.0));
        assert_eq!(first.y, Some(700.0));
        assert_eq!(first.font_size, Some(12.0));
        assert_eq!(first.font_matrix_size, Some(12.0));
        assert_eq!(first.text_matrix, Some(vec![12.0, 0.0, 0.0, 12.0, 72.0, 700.0]));
        assert_eq!(first.z_order, Some(TEXT_Z_ORDER_BASE));
        assert_eq!(first.fill_color, None);
        assert!(first.x < scan.text_elements[1].x);
    }

    #[test]
    fn test_text_state_and_colors() {
        let mut doc = Document::with_version("1.7");
        let page_id = page_with(
            b"q 2 0 0 2 0 0 cm 1 0 0 rg BT /F1 10 Tf 1.5 Tc 3 Tr 14 TL 5 5 Td T* (A) Tj ET Q \
              BT /F1 10 Tf (B) Tj ET",
            dictionary! {},
            &mut doc,
        );
        let scan = scan_page(&doc, page_id, true);
        let a = &scan.text_elements[0];
        assert_eq!(a.font_size, Some(20.0));
        assert_eq!(a.character_spacing, Some(1.5));
        assert_eq!(a.rendering_mode, Some(3));
        assert_eq!(a.leading, Some(14.0));
        assert_eq!(a.x, Some(10.0));
        assert_eq!(a.y, Some(-18.0));
        assert_eq!(a.fill_color, Some(ColorModel::new("DeviceRGB", vec![1.0, 0.0, 0.0])));

        // Everything set inside q/Q is restored by Q.
        let b = &scan.text_elements[1];
        assert_eq!(b.font_size, Some(10.0));
        assert_eq!(b.fill_color, None);
        assert_eq!(b.character_spacing, None);
        assert_eq!(b.rendering_mode, None);
    }

    #[test]
    fn test_advance_uses_widths() {
        let mut doc = Document::with_version("1.7");
        let page_id = page_with(b"BT /F1 10 Tf (  ) Tj (!) Tj ET", dictionary! {}, &mut doc);
        let scan = scan_page(&doc, page_id, true);
        let spaces = &scan.text_elements[0];
        assert!((spaces.width.unwrap() - 5.0).abs() < 1e-4);
        assert!((spaces.space_width.unwrap() - 2.5).abs() < 1e-4);
        assert!((scan.text_elements[1].x.unwrap() - 5.0).abs() < 1e-4);
    }

    #[test]
    fn test_form_xobject_fonts_are_scoped() {
        let mut doc = Document::with_version("1.7");
        let courier = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Courier",
        });
        let form = doc.add_object(Stream::new(
            dictionary! {
                "Type" => "XObject",
                "Subtype" => "Form",
                "Matrix" => vec![1.into(), 0.into(), 0.into(), 1.into(), 100.into(), 0.into()],
                "Resources" => dictionary! { "Font" => dictionary! { "F1" => courier } },
            },
            b"BT /F1 8 Tf (In) Tj ET".to_vec(),
        ));
        let page_id = page_with(b"/Fm0 Do", dictionary! { "Fm0" => form }, &mut doc);
        let scan = scan_page(&doc, page_id, true);
        assert_eq!(scan.text_elements.len(), 1);
        assert_eq!(scan.text_elements[0].font_id.as_deref(), Some("Fm0/F1"));
        assert_eq!(scan.text_elements[0].x, Some(100.0));
    }

    #[test]
    fn test_self_referencing_form_terminates() {
        let mut doc = Document::with_version("1.7");
        let form_id = doc.new_object_id();
        doc.objects.insert(
            form_id,
            Object::Stream(Stream::new(
                dictionary! {
                    "Subtype" => "Form",
                    "Resources" => dictionary! { "XObject" => dictionary! { "Fm0" => form_id } },
                },
                b"/Fm0 Do".to_vec(),
            )),
        );
        let page_id = page_with(b"/Fm0 Do", dictionary! { "Fm0" => form_id }, &mut doc);
        let scan = scan_page(&doc, page_id, true);
        assert!(scan.text_elements.is_empty());
    }

    #[test]
    fn test_image_draws_captured_with_ctm() {
        let mut doc = Document::with_version("1.7");
        let image = doc.add_object(Stream::new(
            dictionary! {
                "Type" => "XObject",
                "Subtype" => "Image",
                "Width" => 1,
                "Height" => 1,
                "ColorSpace" => "DeviceGray",
                "BitsPerComponent" => 8,
            },
            vec![0],
        ));
        let page_id = page_with(
            b"q 200 0 0 100 50 60 cm /Im0 Do Q",
            dictionary! { "Im0" => image },
            &mut doc,
        );
        let scan = scan_page(&doc, page_id, true);
        assert_eq!(scan.images.len(), 1);
        assert_eq!(scan.images[0].object_name.as_deref(), Some("Im0"));
        assert_eq!(scan.images[0].ctm, Matrix::new(200.0, 0.0, 0.0, 100.0, 50.0, 60.0));

        let lazy = scan_page(&doc, page_id, false);
        assert!(lazy.images.is_empty());
    }

    #[test]
    fn test_matrix_concat_order() {
        let scale = Matrix::new(2.0, 0.0, 0.0, 2.0, 0.0, 0.0);
        let shift = Matrix::translation(10.0, 0.0);
        assert_eq!(shift.concat(scale).transform_point(0.0, 0.0), (20.0, 0.0));
        assert_eq!(scale.concat(shift).transform_point(0.0, 0.0), (10.0, 0.0));
        assert_eq!(
            Matrix::new(0.0, 1.0, -1.0, 0.0, 0.0, 0.0).unit_square_bounds(),
            (-1.0, 0.0, 0.0, 1.0)
        );
    }
}

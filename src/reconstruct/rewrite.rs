//! In-place rewrite of text-showing operators in preserved content.

use super::cursor::TextElementCursor;
use crate::font::{CodeMapEncoder, GlyphEncoder, RawCodeEncoder};
use crate::model::TextElement;
use crate::util::{name, resolve};
use base64::Engine;
use lopdf::content::Content;
use lopdf::{Dictionary, Document, Object, StringFormat};
use std::collections::HashMap;
use std::sync::Arc;

/// What happens to the shown strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RewriteMode {
    /// Strings are re-encoded from the element text
    Replace,
    /// Strings are emptied; all other operators are kept
    RemoveOnly,
}

/// Font of the current `Tf`, with the encoder built from the resource dictionary.
struct ActiveFont {
    name: String,
    encoder: Arc<dyn GlyphEncoder>,
    glyph_indexed: bool,
}

struct Rewriter<'a> {
    doc: &'a Document,
    fonts: Option<&'a Dictionary>,
    cursor: TextElementCursor<'a>,
    mode: RewriteMode,
    encoders: HashMap<String, (Arc<dyn GlyphEncoder>, bool)>,
    active: Option<ActiveFont>,
}

/// Rewrite every text-showing operator of `content` from `elements`.
///
/// Each string consumes as many elements as it shows glyphs, and every
/// consumed element must be set in the active font. Any shortfall, font
/// mismatch, encoding failure or leftover element aborts the whole rewrite
/// with `None`; nothing partial is returned.
pub fn rewrite_text_operators(
    doc: &Document,
    content: &[u8],
    resources: &Dictionary,
    elements: &[TextElement],
    mode: RewriteMode,
) -> Option<Vec<u8>> {
    let mut content = match Content::decode(content) {
        Ok(content) => content,
        Err(e) => {
            log::debug!("Cannot parse content for rewrite: {}", e);
            return None;
        }
    };
    let fonts = resources
        .get(b"Font")
        .ok()
        .and_then(|o| resolve(doc, o).as_dict().ok());
    let mut rewriter = Rewriter {
        doc,
        fonts,
        cursor: TextElementCursor::new(elements),
        mode,
        encoders: HashMap::new(),
        active: None,
    };

    for op in content.operations.iter_mut() {
        match op.operator.as_str() {
            "Tf" => {
                let font_name = op.operands.first().and_then(name)?;
                rewriter.select_font(font_name)?;
            }
            "Tj" | "'" => {
                let operand = op.operands.first_mut()?;
                rewriter.rewrite_string(operand)?;
            }
            "\"" => {
                let operand = op.operands.get_mut(2)?;
                rewriter.rewrite_string(operand)?;
            }
            "TJ" => {
                let Some(Object::Array(items)) = op.operands.first_mut() else {
                    log::debug!("TJ without array operand");
                    return None;
                };
                for item in items.iter_mut() {
                    if matches!(item, Object::String(..)) {
                        rewriter.rewrite_string(item)?;
                    }
                }
            }
            _ => {}
        }
    }

    if !rewriter.cursor.is_exhausted() {
        log::debug!(
            "Rewrite left {} text elements unconsumed",
            rewriter.cursor.remaining()
        );
        return None;
    }
    match content.encode() {
        Ok(bytes) => Some(bytes),
        Err(e) => {
            log::debug!("Failed to encode rewritten content: {}", e);
            None
        }
    }
}

impl<'a> Rewriter<'a> {
    /// Make `font_name` the active font. Fails when the page resources do
    /// not define it.
    fn select_font(&mut self, font_name: String) -> Option<()> {
        let (encoder, glyph_indexed) = match self.encoders.get(&font_name) {
            Some(cached) => cached.clone(),
            None => {
                let Some(dict) = self
                    .fonts
                    .and_then(|f| f.get(font_name.as_bytes()).ok())
                    .and_then(|o| resolve(self.doc, o).as_dict().ok())
                else {
                    log::debug!("Font resource {} not found, abandoning rewrite", font_name);
                    return None;
                };
                let type3 = dict
                    .get(b"Subtype")
                    .ok()
                    .and_then(name)
                    .is_some_and(|s| s == "Type3");
                let entry = if type3 {
                    (Arc::new(RawCodeEncoder) as Arc<dyn GlyphEncoder>, true)
                } else {
                    (Arc::new(CodeMapEncoder::from_font_dict(self.doc, dict)) as _, false)
                };
                self.encoders.insert(font_name.clone(), entry.clone());
                entry
            }
        };
        self.active = Some(ActiveFont {
            name: font_name,
            encoder,
            glyph_indexed,
        });
        Some(())
    }

    fn rewrite_string(&mut self, operand: &mut Object) -> Option<()> {
        let Object::String(bytes, _) = operand else {
            log::debug!("Text show operator without string operand");
            return None;
        };
        let active = self.active.as_ref()?;
        let count = active.encoder.count_glyphs(bytes);
        let consumed = self.cursor.consume(&active.name, count)?;
        if self.mode == RewriteMode::RemoveOnly {
            *operand = Object::String(Vec::new(), StringFormat::Literal);
            return Some(());
        }

        let text: String = consumed.iter().map(|e| e.text.as_str()).collect();
        let encoded = match active.encoder.encode(&text) {
            Some(encoded) => encoded,
            None if active.glyph_indexed => raw_codes(consumed)?,
            None => {
                log::debug!("Font {} cannot encode {:?}", active.name, text);
                return None;
            }
        };
        let format = if active.encoder.code_length() > 1 {
            StringFormat::Hexadecimal
        } else {
            StringFormat::Literal
        };
        *operand = Object::String(encoded, format);
        Some(())
    }
}

/// Concatenated raw character codes of the consumed elements.
fn raw_codes(elements: &[TextElement]) -> Option<Vec<u8>> {
    let engine = base64::engine::general_purpose::STANDARD;
    let mut out = Vec::new();
    for element in elements {
        let codes = element.char_codes.as_deref()?;
        out.extend(engine.decode(codes).ok()?);
    }
    Some(out)
}

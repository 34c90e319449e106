//! Positioned text types.

use serde::{Deserialize, Serialize};

/// A fill or stroke colour.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ColorModel {
    /// Colour space name (DeviceGray, DeviceRGB, DeviceCMYK, ...)
    pub color_space: String,

    /// Colour components in the space's range
    pub components: Vec<f32>,
}

impl ColorModel {
    pub fn new(color_space: impl Into<String>, components: Vec<f32>) -> Self {
        Self {
            color_space: color_space.into(),
            components,
        }
    }

    /// Device gray black, the initial graphics state colour.
    pub fn black() -> Self {
        Self::new("DeviceGray", vec![0.0])
    }

    /// Check whether this is the initial (black) colour in any device space.
    pub fn is_black(&self) -> bool {
        match self.color_space.as_str() {
            "DeviceGray" | "DeviceRGB" => self.components.iter().all(|c| *c == 0.0),
            "DeviceCMYK" => {
                self.components.len() == 4
                    && self.components[..3].iter().all(|c| *c == 0.0)
                    && self.components[3] == 1.0
            }
            _ => false,
        }
    }
}

/// A run of text shown by a single string operand of a text-show operator.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TextElement {
    /// Decoded Unicode text
    #[serde(default)]
    pub text: String,

    /// Font resource id, scoped to the page
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub font_id: Option<String>,

    /// Effective font size (Tf size scaled by the text matrix)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub font_size: Option<f32>,

    /// Size operand of the Tf operator
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub font_matrix_size: Option<f32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub x: Option<f32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub y: Option<f32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<f32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<f32>,

    /// Text rendering matrix `[a b c d e f]`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text_matrix: Option<Vec<f32>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub character_spacing: Option<f32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub word_spacing: Option<f32>,

    /// Horizontal scaling in percent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub horizontal_scaling: Option<f32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub leading: Option<f32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rise: Option<f32>,

    /// Text rendering mode (Tr operand)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rendering_mode: Option<i64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fill_color: Option<ColorModel>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stroke_color: Option<ColorModel>,

    /// Raw character codes (base64), kept for glyph-indexed fonts
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub char_codes: Option<String>,

    /// Draw order relative to images on the same page
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub z_order: Option<i64>,

    /// Set when reconstruction had to substitute a fallback font
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fallback_used: Option<bool>,

    /// Width of a space in text space units, when known
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub space_width: Option<f32>,
}

impl TextElement {
    /// Create a text element with content and font id.
    pub fn new(text: impl Into<String>, font_id: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            font_id: Some(font_id.into()),
            ..Default::default()
        }
    }

    /// Set the position.
    pub fn with_position(mut self, x: f32, y: f32) -> Self {
        self.x = Some(x);
        self.y = Some(y);
        self
    }

    /// Set the font size.
    pub fn with_font_size(mut self, size: f32) -> Self {
        self.font_size = Some(size);
        self.font_matrix_size = Some(size);
        self
    }

    /// Number of code points in the text.
    pub fn codepoint_count(&self) -> usize {
        self.text.chars().count()
    }

    /// Font size to select with Tf: the matrix size, else the effective size, else 12.
    pub fn resolved_font_size(&self) -> f32 {
        self.font_matrix_size
            .filter(|s| *s > 0.0)
            .or(self.font_size.filter(|s| *s > 0.0))
            .unwrap_or(12.0)
    }

    /// Drop style values that equal the graphics-state defaults.
    pub fn compact(&mut self) {
        fn drop_if(value: &mut Option<f32>, default: f32) {
            if value.is_some_and(|v| (v - default).abs() < f32::EPSILON) {
                *value = None;
            }
        }
        drop_if(&mut self.character_spacing, 0.0);
        drop_if(&mut self.word_spacing, 0.0);
        drop_if(&mut self.horizontal_scaling, 100.0);
        drop_if(&mut self.leading, 0.0);
        drop_if(&mut self.rise, 0.0);
        if self.rendering_mode == Some(0) {
            self.rendering_mode = None;
        }
        if self.fill_color.as_ref().is_some_and(ColorModel::is_black) {
            self.fill_color = None;
        }
        if self.stroke_color.as_ref().is_some_and(ColorModel::is_black) {
            self.stroke_color = None;
        }
        if self.fallback_used == Some(false) {
            self.fallback_used = None;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compact_defaults() {
        let mut element = TextElement::new("Hello", "F1");
        element.character_spacing = Some(0.0);
        element.horizontal_scaling = Some(100.0);
        element.rise = Some(2.0);
        element.rendering_mode = Some(0);
        element.fill_color = Some(ColorModel::new("DeviceRGB", vec![0.0, 0.0, 0.0]));
        element.compact();

        assert_eq!(element.character_spacing, None);
        assert_eq!(element.horizontal_scaling, None);
        assert_eq!(element.rise, Some(2.0));
        assert_eq!(element.rendering_mode, None);
        assert_eq!(element.fill_color, None);
    }

    #[test]
    fn test_cmyk_black() {
        assert!(ColorModel::new("DeviceCMYK", vec![0.0, 0.0, 0.0, 1.0]).is_black());
        assert!(!ColorModel::new("DeviceCMYK", vec![0.0, 0.0, 0.0, 0.5]).is_black());
    }

    #[test]
    fn test_resolved_font_size() {
        let mut element = TextElement::new("a", "F1");
        assert_eq!(element.resolved_font_size(), 12.0);
        element.font_size = Some(9.0);
        assert_eq!(element.resolved_font_size(), 9.0);
        element.font_matrix_size = Some(1.0);
        assert_eq!(element.resolved_font_size(), 1.0);
    }

    #[test]
    fn test_camel_case_json() {
        let element = TextElement::new("Hi", "F1").with_font_size(10.0);
        let json = serde_json::to_value(&element).unwrap();
        assert_eq!(json["fontId"], "F1");
        assert_eq!(json["fontMatrixSize"], 10.0);
        assert!(json.get("zOrder").is_none());
    }
}

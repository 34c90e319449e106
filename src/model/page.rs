//! Page-level types.

use super::{CosValue, ImageElement, TextElement};
use serde::{Deserialize, Serialize};

/// A single page of the document model.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageModel {
    /// Page number (1-indexed)
    pub page_number: u32,

    /// Page width in points (1 point = 1/72 inch)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<f32>,

    /// Page height in points
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<f32>,

    /// Page rotation in degrees (0, 90, 180, 270)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rotation: Option<i64>,

    #[serde(default)]
    pub text_elements: Vec<TextElement>,

    #[serde(default)]
    pub image_elements: Vec<ImageElement>,

    #[serde(default)]
    pub annotations: Vec<AnnotationModel>,

    /// Serialized resource dictionary (image XObjects filtered out)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resources: Option<CosValue>,

    /// Preserved content streams, in page order
    #[serde(default)]
    pub content_streams: Vec<CosValue>,
}

impl PageModel {
    /// Default page size when the model carries none (US Letter).
    pub const DEFAULT_WIDTH: f32 = 612.0;
    pub const DEFAULT_HEIGHT: f32 = 792.0;

    /// Create an empty page with the given dimensions.
    pub fn new(page_number: u32, width: f32, height: f32) -> Self {
        Self {
            page_number,
            width: Some(width),
            height: Some(height),
            ..Default::default()
        }
    }

    /// Page dimensions, defaulting to US Letter.
    pub fn dimensions(&self) -> (f32, f32) {
        (
            self.width.unwrap_or(Self::DEFAULT_WIDTH),
            self.height.unwrap_or(Self::DEFAULT_HEIGHT),
        )
    }

    /// Check whether any text element carries text.
    pub fn has_text(&self) -> bool {
        self.text_elements.iter().any(|e| !e.text.is_empty())
    }

    pub fn has_images(&self) -> bool {
        !self.image_elements.is_empty()
    }

    pub fn has_preserved_streams(&self) -> bool {
        !self.content_streams.is_empty()
    }
}

/// An annotation on a page.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnnotationModel {
    /// Annotation subtype (Link, Text, Widget, ...)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subtype: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contents: Option<String>,

    /// Rectangle `[x1 y1 x2 y2]`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rect: Option<Vec<f32>>,

    /// Appearance state (/AS)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub appearance_state: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<Vec<f32>>,

    /// Title entry (/T), usually the author
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub creation_date: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modification_date: Option<String>,

    /// Full annotation dictionary through the object graph codec
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_data: Option<CosValue>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_dimensions() {
        let page = PageModel {
            page_number: 1,
            ..Default::default()
        };
        assert_eq!(page.dimensions(), (612.0, 792.0));
        assert_eq!(PageModel::new(2, 595.0, 842.0).dimensions(), (595.0, 842.0));
    }

    #[test]
    fn test_has_text_ignores_empty() {
        let mut page = PageModel::new(1, 612.0, 792.0);
        page.text_elements.push(TextElement::new("", "F1"));
        assert!(!page.has_text());
        page.text_elements.push(TextElement::new("x", "F1"));
        assert!(page.has_text());
    }

    #[test]
    fn test_deserialize_minimal_page() {
        let page: PageModel = serde_json::from_str(r#"{"pageNumber":3}"#).unwrap();
        assert_eq!(page.page_number, 3);
        assert!(page.text_elements.is_empty());
        assert!(page.resources.is_none());
    }
}

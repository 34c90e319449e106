//! Image placement types.

use serde::{Deserialize, Serialize};

/// Z-order base for images so they underlay text unless ordered explicitly.
pub const IMAGE_Z_ORDER_BASE: i64 = -1_000_000;

/// An image drawn on a page, either an image XObject or an inline image.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageElement {
    /// Identity within the page (e.g. "img-1-0")
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    /// XObject resource name (e.g. "Im0")
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub object_name: Option<String>,

    /// True for BI/ID/EI images
    #[serde(default)]
    pub inline_image: bool,

    /// Width in pixels
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub native_width: Option<u32>,

    /// Height in pixels
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub native_height: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub x: Option<f32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub y: Option<f32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<f32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<f32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub left: Option<f32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub right: Option<f32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top: Option<f32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bottom: Option<f32>,

    /// CTM at the draw operator `[a b c d e f]`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transform: Option<Vec<f32>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub z_order: Option<i64>,

    /// Pixel payload (base64)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_data: Option<String>,

    /// Format tag of `image_data` ("png", "jpeg")
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_format: Option<String>,
}

impl ImageElement {
    /// Effective z-order: explicit value, else underlay base.
    pub fn effective_z_order(&self) -> i64 {
        self.z_order.unwrap_or(IMAGE_Z_ORDER_BASE)
    }

    /// Check whether a six-value transform is present.
    pub fn has_transform(&self) -> bool {
        self.transform.as_ref().is_some_and(|t| t.len() == 6)
    }

    /// Placement rectangle `(x, y, width, height)` derived from, in order,
    /// the transform, the bounds and the native size.
    pub fn placement(&self) -> Option<(f32, f32, f32, f32)> {
        if let Some(t) = self.transform.as_ref().filter(|t| t.len() == 6) {
            return Some((t[4], t[5], t[0], t[3]));
        }
        if let (Some(left), Some(right), Some(top), Some(bottom)) =
            (self.left, self.right, self.top, self.bottom)
        {
            return Some((left, bottom, right - left, top - bottom));
        }
        let x = self.x.or(self.left).unwrap_or(0.0);
        let y = self.y.or(self.bottom).unwrap_or(0.0);
        let width = self.width.or(self.native_width.map(|w| w as f32))?;
        let height = self.height.or(self.native_height.map(|h| h as f32))?;
        Some((x, y, width, height))
    }
}

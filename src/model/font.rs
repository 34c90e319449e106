//! Font types.

use super::CosValue;
use serde::{Deserialize, Serialize};

/// Resource id used for page-independent fonts in uids and font map keys.
pub const PAGE_INDEPENDENT: i32 = -1;

/// A font resource referenced by the text on a page.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FontModel {
    /// Resource id (key in the page's font dictionary, nested ids use `XObj/F1`)
    pub id: String,

    /// Owning page number, `-1` for page-independent fonts
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page_number: Option<i32>,

    /// Globally unique id, `jobId:page:resourceId`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uid: Option<String>,

    /// Base font name (e.g. "ABCDEF+ArialMT")
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_name: Option<String>,

    /// Font subtype (Type0, Type1, TrueType, Type3, ...)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subtype: Option<String>,

    /// Encoding name or base encoding
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub encoding: Option<String>,

    /// CID system info for composite fonts
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cid_system_info: Option<CidSystemInfo>,

    /// Whether the font program is embedded
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedded: Option<bool>,

    /// Original embedded program (base64)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub program: Option<String>,

    /// Detected format of `program`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub program_format: Option<String>,

    /// Web-compatible program (base64)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub web_program: Option<String>,

    /// Detected format of `web_program`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub web_program_format: Option<String>,

    /// Program suitable for PDF reconstruction (base64)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pdf_program: Option<String>,

    /// Detected format of `pdf_program`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pdf_program_format: Option<String>,

    /// ToUnicode CMap (base64)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to_unicode: Option<String>,

    /// Standard-14 name when the font is one of the base fonts
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub standard14_name: Option<String>,

    /// Font descriptor flags
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub font_descriptor_flags: Option<i64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ascent: Option<f32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub descent: Option<f32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cap_height: Option<f32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub x_height: Option<f32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub italic_angle: Option<f32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub units_per_em: Option<u32>,

    /// Serialized copy of the font dictionary, for lossless fallback reconstruction
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cos_dictionary: Option<CosValue>,

    /// Glyph procedures of a Type3 font
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub glyph_outlines: Vec<GlyphOutline>,

    /// Converted programs for a Type3 font, best first after ranking
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conversion_candidates: Vec<ConversionCandidate>,
}

impl FontModel {
    /// Create a font model with the given resource id and owning page.
    pub fn new(id: impl Into<String>, page_number: i32) -> Self {
        Self {
            id: id.into(),
            page_number: Some(page_number),
            ..Default::default()
        }
    }

    /// Page number, `-1` when absent.
    pub fn page_or_independent(&self) -> i32 {
        self.page_number.unwrap_or(PAGE_INDEPENDENT)
    }

    /// Check whether this is a glyph-indexed (Type3) font.
    pub fn is_type3(&self) -> bool {
        self.subtype
            .as_deref()
            .is_some_and(|s| s.eq_ignore_ascii_case("Type3"))
    }

    /// Check whether any program payload is present.
    pub fn has_usable_program(&self) -> bool {
        [&self.program, &self.web_program, &self.pdf_program]
            .iter()
            .any(|p| p.as_deref().is_some_and(|s| !s.trim().is_empty()))
    }
}

/// CID system info of a composite font.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CidSystemInfo {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub registry: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ordering: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub supplement: Option<i64>,
}

/// A single glyph procedure of a Type3 font.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GlyphOutline {
    /// Character code
    pub code: u32,

    /// Glyph name from the Differences array
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub glyph_name: Option<String>,

    /// Unicode text mapped to the code
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unicode: Option<String>,

    /// Advance width in glyph space
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<f32>,

    /// Decoded CharProc content (path operators)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub outline: Option<String>,
}

/// Outcome of a Type3 conversion attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CandidateStatus {
    Success,
    Warning,
    Failed,
}

/// A program produced by converting a Type3 font.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversionCandidate {
    /// Converter that produced the candidate
    pub strategy: String,

    pub status: CandidateStatus,

    /// Format tag of `program` (ttf, otf, cff, ...)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub program_format: Option<String>,

    /// Program bytes (base64)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub program: Option<String>,

    /// Converter diagnostics
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,

    /// Code points covered by the program
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub coverage: Vec<u32>,
}

/// Build a font uid from job id, page and resource id.
///
/// The job id is omitted when absent: `jobId:page:id` or `page:id`.
pub fn build_font_uid(job_id: Option<&str>, page_number: i32, resource_id: &str) -> String {
    match job_id {
        Some(job) if !job.is_empty() => format!("{}:{}:{}", job, page_number, resource_id),
        _ => format!("{}:{}", page_number, resource_id),
    }
}

/// Key of a loaded font in the reconstruction font map: `page:id`.
pub fn font_map_key(page_number: i32, resource_id: &str) -> String {
    format!("{}:{}", page_number, resource_id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_font_uid() {
        assert_eq!(build_font_uid(Some("job-1"), 3, "F1"), "job-1:3:F1");
        assert_eq!(build_font_uid(None, 3, "F1"), "3:F1");
        assert_eq!(
            build_font_uid(Some("job-1"), PAGE_INDEPENDENT, "fallback-noto-sans"),
            "job-1:-1:fallback-noto-sans"
        );
    }

    #[test]
    fn test_usable_program() {
        let mut font = FontModel::new("F1", 1);
        assert!(!font.has_usable_program());
        font.web_program = Some("AAEAAA==".to_string());
        assert!(font.has_usable_program());
    }

    #[test]
    fn test_type3_detection() {
        let mut font = FontModel::new("T3", 1);
        font.subtype = Some("Type3".to_string());
        assert!(font.is_type3());
    }
}

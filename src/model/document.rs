//! Document-level types.

use super::{CosValue, FontModel, PageModel};
use serde::{Deserialize, Serialize};

/// The structured, JSON-serializable model of a PDF document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentModel {
    /// Document metadata (title, author, etc.)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Metadata>,

    /// XMP metadata stream (base64)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub xmp_metadata: Option<String>,

    #[serde(default)]
    pub fonts: Vec<FontModel>,

    #[serde(default)]
    pub pages: Vec<PageModel>,

    #[serde(default)]
    pub form_fields: Vec<FormFieldModel>,

    /// True when image elements were left out and must be fetched per page
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lazy_images: Option<bool>,
}

impl DocumentModel {
    /// Create a new empty document model.
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the number of pages in the model.
    pub fn page_count(&self) -> u32 {
        self.pages.len() as u32
    }

    /// Get a page by its page number.
    pub fn get_page(&self, page_number: u32) -> Option<&PageModel> {
        self.pages.iter().find(|p| p.page_number == page_number)
    }

    /// Fonts that belong to a page, including page-independent ones.
    pub fn fonts_for_page(&self, page_number: u32) -> impl Iterator<Item = &FontModel> {
        self.fonts.iter().filter(move |f| {
            let owner = f.page_or_independent();
            owner == page_number as i32 || owner == super::PAGE_INDEPENDENT
        })
    }

    /// Check if the model has any pages.
    pub fn is_empty(&self) -> bool {
        self.pages.is_empty()
    }
}

/// Document metadata from the Info dictionary.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Metadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub keywords: Option<String>,

    /// Creator application
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub creator: Option<String>,

    /// PDF producer
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub producer: Option<String>,

    /// Creation date (RFC 3339)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub creation_date: Option<String>,

    /// Last modification date (RFC 3339)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modification_date: Option<String>,

    /// Trapped state (True, False, Unknown)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trapped: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub number_of_pages: Option<u32>,
}

/// An interactive form field from the AcroForm.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FormFieldModel {
    /// Fully qualified field name (parent names joined with '.')
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Partial name (/T)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub partial_name: Option<String>,

    /// Field type (/FT: Tx, Btn, Ch, Sig)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field_type: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_value: Option<String>,

    /// Field flags (/Ff)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub flags: Option<i64>,

    /// Alternate name (/TU)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alternate_name: Option<String>,

    /// Mapping name (/TM)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mapping_name: Option<String>,

    /// Page of the first widget
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page_number: Option<u32>,

    /// Rectangle of the first widget
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rect: Option<Vec<f32>>,

    /// Full field dictionary through the object graph codec
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_data: Option<CosValue>,
}

/// Size of a page without its content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageDimension {
    pub page_number: u32,
    pub width: f32,
    pub height: f32,
    pub rotation: i64,
}

/// Everything about a document except page content, for lazy page loading.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentMetadataSummary {
    /// Job the document is cached under
    pub job_id: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Metadata>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub xmp_metadata: Option<String>,

    /// Fonts sorted by uid
    #[serde(default)]
    pub fonts: Vec<FontModel>,

    #[serde(default)]
    pub page_dimensions: Vec<PageDimension>,

    #[serde(default)]
    pub form_fields: Vec<FormFieldModel>,

    #[serde(default)]
    pub lazy_images: bool,
}

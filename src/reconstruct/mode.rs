//! Choosing how a page's content is rebuilt.

use crate::model::PageModel;
use std::fmt;

/// How a page's content is produced on reconstruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegenerateMode {
    /// The preserved content was rewritten in place
    ReuseExisting,
    /// Vector operators of the preserved content are kept, text and images redrawn
    RegenerateWithVectorOverlay,
    /// Everything is redrawn
    RegenerateClear,
}

impl fmt::Display for RegenerateMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RegenerateMode::ReuseExisting => "REUSE_EXISTING",
            RegenerateMode::RegenerateWithVectorOverlay => "REGENERATE_WITH_VECTOR_OVERLAY",
            RegenerateMode::RegenerateClear => "REGENERATE_CLEAR",
        };
        f.write_str(name)
    }
}

/// Classify a page.
///
/// `rewrite` performs the in-place token rewrite and reports success; it is
/// only called for text-only pages with preserved content and no fallback need.
pub fn determine_regenerate_mode<F>(page: &PageModel, fallback_needed: bool, rewrite: F) -> RegenerateMode
where
    F: FnOnce() -> bool,
{
    let has_text = page.has_text();
    let has_images = page.has_images();
    if !has_text && !has_images {
        return RegenerateMode::RegenerateClear;
    }
    if !page.has_preserved_streams() {
        return RegenerateMode::RegenerateClear;
    }
    if has_images {
        return RegenerateMode::RegenerateWithVectorOverlay;
    }
    if has_text && !fallback_needed {
        if rewrite() {
            return RegenerateMode::ReuseExisting;
        }
        log::debug!(
            "Token rewrite failed for page {}, regenerating with vector overlay",
            page.page_number
        );
    }
    RegenerateMode::RegenerateWithVectorOverlay
}

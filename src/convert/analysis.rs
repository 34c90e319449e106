//! Size and duplicate-payload analysis of produced document models.
//!
//! Only ever logs; conversion results are never affected.

use crate::model::DocumentModel;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::collections::HashMap;

/// A base64 payload found more than once in a model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DuplicatePayload {
    /// `font` or `image`
    pub kind: &'static str,
    /// SHA-256 of the encoded payload, hex
    pub digest: String,
    pub occurrences: usize,
    /// Encoded length of one copy
    pub bytes: usize,
    /// Where the copies were found (font uid or image id)
    pub owners: Vec<String>,
}

impl DuplicatePayload {
    /// Bytes saved if only one copy were kept.
    pub fn wasted_bytes(&self) -> usize {
        self.bytes * self.occurrences.saturating_sub(1)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DocumentAnalysis {
    pub total_bytes: usize,
    /// Serialized size per top-level section, largest first
    pub sections: Vec<(String, usize)>,
    /// Largest waste first
    pub duplicates: Vec<DuplicatePayload>,
}

impl DocumentAnalysis {
    pub fn wasted_bytes(&self) -> usize {
        self.duplicates.iter().map(DuplicatePayload::wasted_bytes).sum()
    }
}

fn json_size<T: Serialize + ?Sized>(value: &T) -> usize {
    serde_json::to_vec(value).map(|v| v.len()).unwrap_or(0)
}

fn digest_hex(payload: &str) -> String {
    Sha256::digest(payload.as_bytes())
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect()
}

/// Measure the serialized sections of `doc` and find repeated payloads.
pub fn analyze_document(doc: &DocumentModel) -> DocumentAnalysis {
    let mut sections = vec![
        ("metadata".to_string(), json_size(&doc.metadata)),
        ("xmpMetadata".to_string(), json_size(&doc.xmp_metadata)),
        ("fonts".to_string(), json_size(&doc.fonts)),
        ("formFields".to_string(), json_size(&doc.form_fields)),
    ];
    let mut text = 0;
    let mut images = 0;
    let mut annotations = 0;
    let mut resources = 0;
    let mut streams = 0;
    for page in &doc.pages {
        text += json_size(&page.text_elements);
        images += json_size(&page.image_elements);
        annotations += json_size(&page.annotations);
        resources += json_size(&page.resources);
        streams += json_size(&page.content_streams);
    }
    sections.extend([
        ("textElements".to_string(), text),
        ("imageElements".to_string(), images),
        ("annotations".to_string(), annotations),
        ("resources".to_string(), resources),
        ("contentStreams".to_string(), streams),
    ]);
    sections.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));

    let mut seen: HashMap<(&'static str, String), (usize, Vec<String>)> = HashMap::new();
    for font in &doc.fonts {
        let owner = font.uid.clone().unwrap_or_else(|| font.id.clone());
        for payload in [&font.program, &font.web_program, &font.pdf_program]
            .into_iter()
            .flatten()
            .filter(|p| !p.is_empty())
        {
            let entry = seen
                .entry(("font", digest_hex(payload)))
                .or_insert((payload.len(), Vec::new()));
            entry.1.push(owner.clone());
        }
    }
    for page in &doc.pages {
        for image in &page.image_elements {
            let Some(payload) = image.image_data.as_deref().filter(|p| !p.is_empty()) else {
                continue;
            };
            let owner = image
                .id
                .clone()
                .unwrap_or_else(|| format!("page {}", page.page_number));
            let entry = seen
                .entry(("image", digest_hex(payload)))
                .or_insert((payload.len(), Vec::new()));
            entry.1.push(owner);
        }
    }

    let mut duplicates: Vec<DuplicatePayload> = seen
        .into_iter()
        .filter(|(_, (_, owners))| owners.len() > 1)
        .map(|((kind, digest), (bytes, owners))| DuplicatePayload {
            kind,
            digest,
            occurrences: owners.len(),
            bytes,
            owners,
        })
        .collect();
    duplicates.sort_by(|a, b| {
        b.wasted_bytes()
            .cmp(&a.wasted_bytes())
            .then_with(|| a.digest.cmp(&b.digest))
    });

    DocumentAnalysis {
        total_bytes: json_size(doc),
        sections,
        duplicates,
    }
}

/// Log the analysis of `doc` at info level.
pub fn log_analysis(doc: &DocumentModel) {
    let analysis = analyze_document(doc);
    log::info!(
        "Document model: {} bytes, {} duplicate payloads wasting {} bytes",
        analysis.total_bytes,
        analysis.duplicates.len(),
        analysis.wasted_bytes()
    );
    for (section, bytes) in &analysis.sections {
        log::info!("  {:<16} {:>12} bytes", section, bytes);
    }
    for duplicate in analysis.duplicates.iter().take(20) {
        log::info!(
            "  duplicate {} payload {}.. x{} ({} bytes each): {}",
            duplicate.kind,
            &duplicate.digest[..12],
            duplicate.occurrences,
            duplicate.bytes,
            duplicate.owners.join(", ")
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{FontModel, ImageElement, PageModel};

    #[test]
    fn test_finds_duplicate_font_programs() {
        let mut doc = DocumentModel::new();
        for page in 1..=3 {
            let mut font = FontModel::new("F1", page);
            font.uid = Some(format!("{}:F1", page));
            font.program = Some("AAECAwQF".to_string());
            doc.fonts.push(font);
        }
        let mut other = FontModel::new("F2", 1);
        other.program = Some("BBBB".to_string());
        doc.fonts.push(other);

        let analysis = analyze_document(&doc);
        assert_eq!(analysis.duplicates.len(), 1);
        let duplicate = &analysis.duplicates[0];
        assert_eq!(duplicate.kind, "font");
        assert_eq!(duplicate.occurrences, 3);
        assert_eq!(duplicate.wasted_bytes(), 16);
        assert_eq!(duplicate.owners, vec!["1:F1", "2:F1", "3:F1"]);
        assert_eq!(duplicate.digest.len(), 64);
    }

    #[test]
    fn test_image_duplicates_and_sections() {
        let mut doc = DocumentModel::new();
        let mut page = PageModel::new(1, 612.0, 792.0);
        for index in 0..2 {
            page.image_elements.push(ImageElement {
                id: Some(format!("img-1-{}", index)),
                image_data: Some("iVBORw0KGgo=".to_string()),
                ..Default::default()
            });
        }
        doc.pages.push(page);

        let analysis = analyze_document(&doc);
        assert_eq!(analysis.duplicates[0].kind, "image");
        assert_eq!(analysis.sections[0].0, "imageElements");
        assert!(analysis.total_bytes > analysis.sections[0].1);
    }
}

//! Page model assembly.

use super::annotations::extract_annotations;
use super::document::page_dimension;
use super::image::encode_images;
use super::resources::{extract_content_streams, extract_resources};
use super::scanner::scan_page;
use crate::cos::StreamPolicy;
use crate::model::PageModel;
use lopdf::{Document, ObjectId};

/// What to put into a page model.
#[derive(Debug, Clone, Copy, Default)]
pub struct PageOptions {
    /// Compact raw data policies for annotations and resources
    pub lightweight: bool,
    /// Leave image elements out
    pub skip_images: bool,
    /// Encode images on the rayon pool
    pub parallel: bool,
}

impl PageOptions {
    pub fn annotation_policy(&self) -> StreamPolicy {
        if self.lightweight {
            StreamPolicy::AnnotationRawData
        } else {
            StreamPolicy::Default
        }
    }

    pub fn resources_policy(&self) -> StreamPolicy {
        if self.lightweight {
            StreamPolicy::ResourcesLightweight
        } else {
            StreamPolicy::Default
        }
    }

    pub fn form_field_policy(&self) -> StreamPolicy {
        if self.lightweight {
            StreamPolicy::FormFieldRawData
        } else {
            StreamPolicy::Default
        }
    }
}

/// Build the full model of one page.
pub fn extract_page(doc: &Document, page_id: ObjectId, page_number: u32, options: PageOptions) -> PageModel {
    let dimension = page_dimension(doc, page_id, page_number);
    let mut page = PageModel::new(page_number, dimension.width, dimension.height);
    page.rotation = Some(dimension.rotation);

    let scan = scan_page(doc, page_id, !options.skip_images);
    page.text_elements = scan.text_elements;
    page.image_elements = encode_images(scan.images, page_number, true, options.parallel);
    page.resources = extract_resources(doc, page_id, options.resources_policy());
    page.content_streams = extract_content_streams(doc, page_id);
    page.annotations = extract_annotations(doc, page_id, options.annotation_policy());

    log::debug!(
        "Page {}: {} text elements, {} images, {} annotations",
        page_number,
        page.text_elements.len(),
        page.image_elements.len(),
        page.annotations.len()
    );
    page
}

#[cfg(test)]
mod tests {
    use super::*;
    use lopdf::{dictionary, Object, Stream};

    #[test]
    fn test_page_model_without_images() {
        let mut doc = Document::with_version("1.7");
        let font = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Helvetica",
        });
        let image = doc.add_object(Stream::new(
            dictionary! { "Subtype" => "Image", "Width" => 1, "Height" => 1, "BitsPerComponent" => 8 },
            vec![0],
        ));
        let contents = doc.add_object(Stream::new(
            dictionary! {},
            b"q 10 0 0 10 0 0 cm /Im0 Do Q BT /F1 12 Tf (Hi) Tj ET".to_vec(),
        ));
        let pages_id = doc.new_object_id();
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "MediaBox" => vec![0.into(), 0.into(), 595.into(), 842.into()],
            "Resources" => dictionary! {
                "Font" => dictionary! { "F1" => font },
                "XObject" => dictionary! { "Im0" => image },
            },
            "Contents" => contents,
        });
        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! { "Type" => "Pages", "Kids" => vec![page_id.into()], "Count" => 1 }),
        );

        let page = extract_page(
            &doc,
            page_id,
            1,
            PageOptions {
                skip_images: true,
                ..Default::default()
            },
        );
        assert_eq!(page.dimensions(), (595.0, 842.0));
        assert_eq!(page.text_elements.len(), 1);
        assert!(page.image_elements.is_empty());
        assert_eq!(page.content_streams.len(), 1);
        assert!(page.resources.as_ref().unwrap().get("XObject").is_none());

        let full = extract_page(&doc, page_id, 1, PageOptions::default());
        assert_eq!(full.image_elements.len(), 1);
        assert_eq!(full.image_elements[0].width, Some(10.0));
    }
}

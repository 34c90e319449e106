//! Vector operator extraction from preserved content.

use lopdf::content::{Content, Operation};
use lopdf::Object;
use std::collections::HashSet;

/// Keep the non-text operators of preserved content streams.
///
/// Text objects (`BT`..`ET`), inline images and `Do` operators that paint
/// one of `image_names` are removed; the model redraws those. Returns
/// `None` when nothing remains.
pub fn extract_vector_graphics(streams: &[Vec<u8>], image_names: &HashSet<String>) -> Option<Vec<u8>> {
    let mut kept = Vec::new();
    for bytes in streams {
        match Content::decode(bytes) {
            Ok(content) => collect_vector_operations(content.operations, &mut kept, image_names),
            Err(e) => log::debug!("Failed to parse preserved content for vector extraction: {}", e),
        }
    }
    if kept.is_empty() {
        return None;
    }
    match (Content { operations: kept }).encode() {
        Ok(bytes) => Some(bytes),
        Err(e) => {
            log::debug!("Failed to encode vector content: {}", e);
            None
        }
    }
}

fn collect_vector_operations(
    operations: Vec<Operation>,
    target: &mut Vec<Operation>,
    image_names: &HashSet<String>,
) {
    let mut inside_text = false;
    for op in operations {
        match op.operator.as_str() {
            "BT" => {
                inside_text = true;
                continue;
            }
            "ET" => {
                inside_text = false;
                continue;
            }
            _ if inside_text => continue,
            "BI" => continue,
            "Do" => {
                let paints_image = match op.operands.first() {
                    Some(Object::Name(name)) => image_names.contains(String::from_utf8_lossy(name).as_ref()),
                    _ => false,
                };
                if paints_image {
                    continue;
                }
            }
            _ => {}
        }
        target.push(op);
    }
}

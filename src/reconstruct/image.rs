//! Image XObjects rebuilt from image elements.

use crate::model::ImageElement;
use crate::util::{add_page_resource, page_resources, resolve};
use base64::Engine;
use flate2::write::ZlibEncoder;
use flate2::Compression;
use image::GenericImageView;
use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Document, Object, ObjectId, Stream};
use std::collections::HashMap;
use std::io::Write;

/// Decode the payload of an image element into an image XObject.
///
/// JPEG payloads are stored as-is with `DCTDecode`; anything else is
/// decoded and stored as Flate-compressed RGB with an alpha `SMask` when
/// the image is not opaque.
pub fn create_image_xobject(doc: &mut Document, element: &ImageElement) -> Option<ObjectId> {
    let payload = element.image_data.as_deref().filter(|d| !d.trim().is_empty())?;
    let data = match base64::engine::general_purpose::STANDARD.decode(payload.trim()) {
        Ok(data) => data,
        Err(e) => {
            log::debug!("Failed to decode image element {:?}: {}", element.id, e);
            return None;
        }
    };

    let is_jpeg = element
        .image_format
        .as_deref()
        .is_some_and(|f| f.eq_ignore_ascii_case("jpeg") || f.eq_ignore_ascii_case("jpg"))
        || matches!(image::guess_format(&data), Ok(image::ImageFormat::Jpeg));
    if is_jpeg {
        if let Some((width, height, components)) = jpeg_header(&data) {
            let color_space = match components {
                1 => "DeviceGray",
                4 => "DeviceCMYK",
                _ => "DeviceRGB",
            };
            let dict = dictionary! {
                "Type" => "XObject",
                "Subtype" => "Image",
                "Width" => Object::Integer(width as i64),
                "Height" => Object::Integer(height as i64),
                "ColorSpace" => color_space,
                "BitsPerComponent" => 8,
                "Filter" => "DCTDecode",
            };
            return Some(doc.add_object(Stream::new(dict, data).with_compression(false)));
        }
    }

    let decoded = match image::load_from_memory(&data) {
        Ok(decoded) => decoded,
        Err(e) => {
            log::debug!("Unsupported image payload for {:?}: {}", element.id, e);
            return None;
        }
    };
    let (width, height) = decoded.dimensions();
    let rgba = decoded.to_rgba8();
    let mut rgb = Vec::with_capacity((width * height * 3) as usize);
    let mut alpha = Vec::with_capacity((width * height) as usize);
    let mut has_alpha = false;
    for pixel in rgba.pixels() {
        let [r, g, b, a] = pixel.0;
        has_alpha |= a != 255;
        rgb.extend_from_slice(&[r, g, b]);
        alpha.push(a);
    }

    let mut dict = dictionary! {
        "Type" => "XObject",
        "Subtype" => "Image",
        "Width" => Object::Integer(width as i64),
        "Height" => Object::Integer(height as i64),
        "ColorSpace" => "DeviceRGB",
        "BitsPerComponent" => 8,
        "Filter" => "FlateDecode",
    };
    if has_alpha {
        let mask = dictionary! {
            "Type" => "XObject",
            "Subtype" => "Image",
            "Width" => Object::Integer(width as i64),
            "Height" => Object::Integer(height as i64),
            "ColorSpace" => "DeviceGray",
            "BitsPerComponent" => 8,
            "Filter" => "FlateDecode",
        };
        let mask_id = doc.add_object(Stream::new(mask, flate_compress(&alpha)).with_compression(false));
        dict.set("SMask", mask_id);
    }
    Some(doc.add_object(Stream::new(dict, flate_compress(&rgb)).with_compression(false)))
}

/// Operators painting `resource_name` for an element: its transform when
/// present, else a rectangle from its placement with sides of at least 1.
pub fn image_draw_operations(resource_name: &str, element: &ImageElement) -> Option<Vec<Operation>> {
    let matrix: Vec<f32> = match element.transform.as_ref().filter(|t| t.len() == 6) {
        Some(t) => t.clone(),
        None => {
            let (x, y, width, height) = element.placement()?;
            vec![width.max(1.0), 0.0, 0.0, height.max(1.0), x, y]
        }
    };
    Some(vec![
        Operation::new("q", vec![]),
        Operation::new("cm", matrix.into_iter().map(Object::Real).collect()),
        Operation::new("Do", vec![Object::Name(resource_name.as_bytes().to_vec())]),
        Operation::new("Q", vec![]),
    ])
}

/// Rebuild the image XObjects painted by preserved content from the
/// matching image elements, registering each under its original name.
/// Returns the number of images restored.
pub fn reconstruct_image_xobjects(
    doc: &mut Document,
    page_id: ObjectId,
    streams: &[Vec<u8>],
    images: &[ImageElement],
) -> usize {
    let by_name: HashMap<&str, &ImageElement> = images
        .iter()
        .filter(|e| !e.inline_image)
        .filter_map(|e| e.object_name.as_deref().map(|n| (n, e)))
        .collect();
    if by_name.is_empty() {
        return 0;
    }

    let mut painted = Vec::new();
    for bytes in streams {
        let Ok(content) = Content::decode(bytes) else {
            continue;
        };
        for op in content.operations {
            if op.operator != "Do" {
                continue;
            }
            if let Some(Object::Name(name)) = op.operands.first() {
                let name = String::from_utf8_lossy(name).into_owned();
                if by_name.contains_key(name.as_str()) && !painted.contains(&name) {
                    painted.push(name);
                }
            }
        }
    }

    let mut restored = 0;
    for name in painted {
        let Some(element) = by_name.get(name.as_str()) else {
            continue;
        };
        let Some(xobject) = create_image_xobject(doc, element) else {
            continue;
        };
        match add_page_resource(doc, page_id, "XObject", &name, xobject) {
            Ok(()) => restored += 1,
            Err(e) => log::warn!("Failed to register image {}: {}", name, e),
        }
    }
    restored
}

/// First `Im<n>` name not used by the page's XObjects.
pub fn unused_image_name(doc: &Document, page_id: ObjectId, start: usize) -> String {
    let existing = page_resources(doc, page_id)
        .and_then(|r| r.get(b"XObject").ok())
        .and_then(|x| resolve(doc, x).as_dict().ok());
    let mut n = start;
    loop {
        let candidate = format!("Im{}", n);
        if !existing.is_some_and(|x| x.has(candidate.as_bytes())) {
            return candidate;
        }
        n += 1;
    }
}

/// Width, height and component count from the first SOF marker.
fn jpeg_header(data: &[u8]) -> Option<(u16, u16, u8)> {
    if data.get(..2) != Some(&[0xFF, 0xD8]) {
        return None;
    }
    let mut pos = 2;
    while pos + 4 <= data.len() {
        if data[pos] != 0xFF {
            pos += 1;
            continue;
        }
        let marker = data[pos + 1];
        if marker == 0xFF {
            pos += 1;
            continue;
        }
        let length = u16::from_be_bytes([data[pos + 2], data[pos + 3]]) as usize;
        let is_sof = matches!(marker, 0xC0..=0xCF) && !matches!(marker, 0xC4 | 0xC8 | 0xCC);
        if is_sof {
            let segment = data.get(pos + 4..pos + 2 + length)?;
            if segment.len() < 6 {
                return None;
            }
            let height = u16::from_be_bytes([segment[1], segment[2]]);
            let width = u16::from_be_bytes([segment[3], segment[4]]);
            return Some((width, height, segment[5]));
        }
        pos += 2 + length;
    }
    None
}

fn flate_compress(data: &[u8]) -> Vec<u8> {
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    if let Err(e) = encoder.write_all(data) {
        log::debug!("Image compression failed: {}", e);
    }
    encoder.finish().unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageFormat, Rgba, RgbaImage};
    use std::io::Cursor;

    fn png_payload(alpha: u8) -> String {
        let mut img = RgbaImage::new(2, 2);
        img.put_pixel(0, 0, Rgba([255, 0, 0, alpha]));
        let mut bytes = Vec::new();
        img.write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png).unwrap();
        base64::engine::general_purpose::STANDARD.encode(bytes)
    }

    fn element(payload: String) -> ImageElement {
        ImageElement {
            id: Some("img-1-0".to_string()),
            object_name: Some("Im0".to_string()),
            image_data: Some(payload),
            image_format: Some("png".to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn test_png_becomes_flate_rgb() {
        let mut doc = Document::with_version("1.7");
        let id = create_image_xobject(&mut doc, &element(png_payload(255))).unwrap();
        let stream = doc.get_object(id).unwrap().as_stream().unwrap();
        assert_eq!(stream.dict.get(b"Width").unwrap().as_i64().unwrap(), 2);
        assert_eq!(stream.dict.get(b"Filter").unwrap().as_name().unwrap(), b"FlateDecode");
        assert!(!stream.dict.has(b"SMask"));
    }

    #[test]
    fn test_translucent_png_gets_smask() {
        let mut doc = Document::with_version("1.7");
        let id = create_image_xobject(&mut doc, &element(png_payload(10))).unwrap();
        let stream = doc.get_object(id).unwrap().as_stream().unwrap();
        assert!(stream.dict.has(b"SMask"));
    }

    #[test]
    fn test_invalid_payload_is_skipped() {
        let mut doc = Document::with_version("1.7");
        assert!(create_image_xobject(&mut doc, &element("not base64!".to_string())).is_none());
        assert!(create_image_xobject(&mut doc, &ImageElement::default()).is_none());
    }

    #[test]
    fn test_jpeg_header() {
        let mut jpeg = vec![0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x04, 0x00, 0x00];
        jpeg.extend_from_slice(&[0xFF, 0xC0, 0x00, 0x0B, 0x08, 0x00, 0x20, 0x00, 0x40, 0x03, 0, 0, 0]);
        assert_eq!(jpeg_header(&jpeg), Some((64, 32, 3)));
        assert_eq!(jpeg_header(b"\x89PNG"), None);
    }

    #[test]
    fn test_draw_operations_prefer_transform() {
        let mut image = element(String::new());
        image.transform = Some(vec![50.0, 0.0, 0.0, 40.0, 10.0, 20.0]);
        let ops = image_draw_operations("Im3", &image).unwrap();
        let operators: Vec<_> = ops.iter().map(|o| o.operator.as_str()).collect();
        assert_eq!(operators, vec!["q", "cm", "Do", "Q"]);
        assert_eq!(ops[1].operands[0], Object::Real(50.0));

        image.transform = None;
        image.left = Some(0.0);
        image.right = Some(0.0);
        image.top = Some(5.0);
        image.bottom = Some(5.0);
        let ops = image_draw_operations("Im3", &image).unwrap();
        assert_eq!(ops[1].operands[0], Object::Real(1.0));
    }

    #[test]
    fn test_reconstruct_registers_painted_images() {
        let mut doc = Document::with_version("1.7");
        let page_id = doc.add_object(dictionary! { "Type" => "Page" });
        let streams = vec![b"q 10 0 0 10 0 0 cm /Im0 Do Q".to_vec()];
        let images = vec![element(png_payload(255))];
        assert_eq!(reconstruct_image_xobjects(&mut doc, page_id, &streams, &images), 1);
        assert_eq!(unused_image_name(&doc, page_id, 0), "Im1");
    }
}

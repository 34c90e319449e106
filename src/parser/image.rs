//! Image capture and encoding.
//!
//! The content walker records each drawn image as a [`PendingImage`] with
//! everything it needs already resolved out of the document, so encoding
//! can run on owned data across threads.

use super::scanner::Matrix;
use crate::error::{Error, Result};
use crate::model::{ImageElement, IMAGE_Z_ORDER_BASE};
use crate::util::{resolve, stream_bytes};
use base64::Engine;
use image::codecs::png::PngEncoder;
use image::{ColorType, ImageEncoder};
use lopdf::{Dictionary, Document, Object, Stream};
use rayon::prelude::*;

/// Colour space of an image, resolved out of the document.
#[derive(Debug, Clone, PartialEq)]
pub enum ImageColorSpace {
    Gray,
    Rgb,
    Cmyk,
    Indexed {
        base: Box<ImageColorSpace>,
        lookup: Vec<u8>,
    },
}

impl ImageColorSpace {
    fn channels(&self) -> usize {
        match self {
            Self::Gray | Self::Indexed { .. } => 1,
            Self::Rgb => 3,
            Self::Cmyk => 4,
        }
    }

    fn from_name(name: &[u8]) -> Option<Self> {
        match name {
            b"DeviceGray" | b"G" | b"CalGray" => Some(Self::Gray),
            b"DeviceRGB" | b"RGB" | b"CalRGB" | b"Lab" => Some(Self::Rgb),
            b"DeviceCMYK" | b"CMYK" => Some(Self::Cmyk),
            _ => None,
        }
    }

    /// Resolve a `/ColorSpace` value. Names not known to the device
    /// families are looked up in the resource `ColorSpace` dictionary.
    pub fn resolve(doc: &Document, object: &Object, resources: Option<&Dictionary>) -> Option<Self> {
        match resolve(doc, object) {
            Object::Name(name) => Self::from_name(name).or_else(|| {
                let named = resources?
                    .get(b"ColorSpace")
                    .ok()
                    .and_then(|o| resolve(doc, o).as_dict().ok())?
                    .get(name)
                    .ok()?;
                Self::resolve(doc, named, None)
            }),
            Object::Array(items) => {
                let head = items.first().and_then(|o| resolve(doc, o).as_name().ok())?;
                match head {
                    b"ICCBased" => {
                        let components = items
                            .get(1)
                            .and_then(|o| resolve(doc, o).as_stream().ok())
                            .and_then(|s| s.dict.get(b"N").ok())
                            .and_then(|n| n.as_i64().ok())?;
                        match components {
                            1 => Some(Self::Gray),
                            3 => Some(Self::Rgb),
                            4 => Some(Self::Cmyk),
                            _ => None,
                        }
                    }
                    b"Indexed" | b"I" => {
                        let base = Self::resolve(doc, items.get(1)?, resources)?;
                        if matches!(base, Self::Indexed { .. }) {
                            return None;
                        }
                        let lookup = match resolve(doc, items.get(3)?) {
                            Object::String(bytes, _) => bytes.clone(),
                            Object::Stream(stream) => stream_bytes(stream),
                            _ => return None,
                        };
                        Some(Self::Indexed {
                            base: Box::new(base),
                            lookup,
                        })
                    }
                    other => Self::from_name(other),
                }
            }
            _ => None,
        }
    }

    fn rgb(&self, bytes: &[u8]) -> Option<[u8; 3]> {
        match self {
            Self::Gray => {
                let v = *bytes.first()?;
                Some([v, v, v])
            }
            Self::Rgb => Some([*bytes.first()?, *bytes.get(1)?, *bytes.get(2)?]),
            Self::Cmyk => {
                let channel = |i: usize| bytes.get(i).map(|v| *v as f32 / 255.0);
                let (c, m, y, k) = (channel(0)?, channel(1)?, channel(2)?, channel(3)?);
                let to_byte = |v: f32| ((1.0 - v) * (1.0 - k) * 255.0).round().clamp(0.0, 255.0) as u8;
                Some([to_byte(c), to_byte(m), to_byte(y)])
            }
            Self::Indexed { base, lookup } => {
                let index = *bytes.first()? as usize;
                let channels = base.channels();
                let offset = index * channels;
                base.rgb(lookup.get(offset..offset + channels)?)
            }
        }
    }
}

/// An image drawn by the content, before encoding.
#[derive(Debug, Clone)]
pub struct PendingImage {
    /// XObject resource name; `None` for inline images
    pub object_name: Option<String>,
    pub inline: bool,
    /// Image dictionary and still-encoded data
    pub stream: Stream,
    pub color_space: Option<ImageColorSpace>,
    /// Soft mask stream, when the image has one
    pub soft_mask: Option<Stream>,
    /// CTM at the draw operator
    pub ctm: Matrix,
}

impl PendingImage {
    /// Capture an image XObject stream.
    pub fn from_xobject(
        doc: &Document,
        name: &str,
        stream: &Stream,
        resources: Option<&Dictionary>,
        ctm: Matrix,
    ) -> Self {
        let color_space = stream
            .dict
            .get(b"ColorSpace")
            .ok()
            .and_then(|cs| ImageColorSpace::resolve(doc, cs, resources));
        let soft_mask = stream
            .dict
            .get(b"SMask")
            .ok()
            .and_then(|o| resolve(doc, o).as_stream().ok())
            .cloned();
        Self {
            object_name: Some(name.to_string()),
            inline: false,
            stream: stream.clone(),
            color_space,
            soft_mask,
            ctm,
        }
    }

    /// Capture an inline image, expanding abbreviated keys and filter names.
    pub fn from_inline(
        doc: &Document,
        dict: &Dictionary,
        data: Vec<u8>,
        resources: Option<&Dictionary>,
        ctm: Matrix,
    ) -> Self {
        let mut expanded = Dictionary::new();
        for (key, value) in dict.iter() {
            let key: &[u8] = match key.as_slice() {
                b"W" => b"Width",
                b"H" => b"Height",
                b"BPC" => b"BitsPerComponent",
                b"CS" => b"ColorSpace",
                b"F" => b"Filter",
                b"DP" => b"DecodeParms",
                b"IM" => b"ImageMask",
                b"D" => b"Decode",
                other => other,
            };
            let value = match (key, value) {
                (b"Filter", Object::Name(name)) => Object::Name(expand_filter(name)),
                (b"Filter", Object::Array(names)) => Object::Array(
                    names
                        .iter()
                        .map(|n| match n {
                            Object::Name(name) => Object::Name(expand_filter(name)),
                            other => other.clone(),
                        })
                        .collect(),
                ),
                (_, value) => value.clone(),
            };
            expanded.set(key.to_vec(), value);
        }
        let color_space = expanded
            .get(b"ColorSpace")
            .ok()
            .and_then(|cs| ImageColorSpace::resolve(doc, cs, resources));
        Self {
            object_name: None,
            inline: true,
            stream: Stream::new(expanded, data),
            color_space,
            soft_mask: None,
            ctm,
        }
    }

    fn dimension(&self, key: &[u8]) -> Option<u32> {
        self.stream
            .dict
            .get(key)
            .ok()
            .and_then(|o| o.as_i64().ok())
            .and_then(|v| u32::try_from(v).ok())
            .filter(|v| *v > 0)
    }

    /// Build the image element; the payload is left out when `with_data` is false.
    pub fn into_element(self, page_number: u32, index: usize, with_data: bool) -> ImageElement {
        let (left, bottom, right, top) = self.ctm.unit_square_bounds();
        let mut element = ImageElement {
            id: Some(format!("img-{}-{}", page_number, index)),
            object_name: self.object_name.clone(),
            inline_image: self.inline,
            native_width: self.dimension(b"Width"),
            native_height: self.dimension(b"Height"),
            x: Some(left),
            y: Some(bottom),
            width: Some(right - left),
            height: Some(top - bottom),
            left: Some(left),
            right: Some(right),
            top: Some(top),
            bottom: Some(bottom),
            transform: Some(self.ctm.to_vec()),
            z_order: Some(IMAGE_Z_ORDER_BASE + index as i64),
            ..Default::default()
        };
        if with_data {
            match encode_image(&self) {
                Some((format, bytes)) => {
                    element.image_format = Some(format.to_string());
                    element.image_data = Some(base64::engine::general_purpose::STANDARD.encode(bytes));
                }
                None => log::debug!(
                    "Image {:?} on page {} could not be encoded",
                    element.object_name,
                    page_number
                ),
            }
        }
        element
    }
}

/// Turn pending images into elements, in draw order.
pub fn encode_images(
    pending: Vec<PendingImage>,
    page_number: u32,
    with_data: bool,
    parallel: bool,
) -> Vec<ImageElement> {
    if parallel && with_data && pending.len() > 1 {
        pending
            .into_par_iter()
            .enumerate()
            .map(|(index, image)| image.into_element(page_number, index, with_data))
            .collect()
    } else {
        pending
            .into_iter()
            .enumerate()
            .map(|(index, image)| image.into_element(page_number, index, with_data))
            .collect()
    }
}

fn expand_filter(name: &[u8]) -> Vec<u8> {
    let full: &[u8] = match name {
        b"AHx" => b"ASCIIHexDecode",
        b"A85" => b"ASCII85Decode",
        b"LZW" => b"LZWDecode",
        b"Fl" => b"FlateDecode",
        b"RL" => b"RunLengthDecode",
        b"CCF" => b"CCITTFaxDecode",
        b"DCT" => b"DCTDecode",
        other => other,
    };
    full.to_vec()
}

fn filters(stream: &Stream) -> Vec<Vec<u8>> {
    match stream.dict.get(b"Filter") {
        Ok(Object::Name(name)) => vec![name.clone()],
        Ok(Object::Array(items)) => items
            .iter()
            .filter_map(|o| o.as_name().ok().map(<[u8]>::to_vec))
            .collect(),
        _ => Vec::new(),
    }
}

/// Encode as `("jpeg", bytes)` for DCT data, else `("png", bytes)`.
fn encode_image(image: &PendingImage) -> Option<(&'static str, Vec<u8>)> {
    let filters = filters(&image.stream);
    if filters.last().is_some_and(|f| f == b"DCTDecode") {
        if filters.len() == 1 {
            return Some(("jpeg", image.stream.content.clone()));
        }
        log::debug!("Chained DCT filters are not decoded");
        return None;
    }

    let width = image.dimension(b"Width")?;
    let height = image.dimension(b"Height")?;
    let data = stream_bytes(&image.stream);
    let stencil = image
        .stream
        .dict
        .get(b"ImageMask")
        .ok()
        .and_then(|o| o.as_bool().ok())
        .unwrap_or(false);
    let bpc = if stencil {
        1
    } else {
        image
            .stream
            .dict
            .get(b"BitsPerComponent")
            .ok()
            .and_then(|o| o.as_i64().ok())
            .unwrap_or(8)
    };

    let mut rgba = if stencil {
        let inverted = image
            .stream
            .dict
            .get(b"Decode")
            .ok()
            .and_then(|o| o.as_array().ok())
            .and_then(|d| d.first())
            .and_then(|v| v.as_i64().ok())
            == Some(1);
        stencil_to_rgba(&data, width, height, inverted)?
    } else {
        let color_space = image.color_space.clone().unwrap_or(ImageColorSpace::Gray);
        samples_to_rgba(&data, width, height, bpc, &color_space)?
    };

    if let Some(mask) = &image.soft_mask {
        apply_soft_mask(&mut rgba, mask, width, height);
    }

    match encode_png(&rgba, width, height) {
        Ok(png) => Some(("png", png)),
        Err(e) => {
            log::debug!("{}", e);
            None
        }
    }
}

/// PNG bytes of an RGBA8 raster.
fn encode_png(rgba: &[u8], width: u32, height: u32) -> Result<Vec<u8>> {
    let mut png = Vec::new();
    PngEncoder::new(&mut png)
        .write_image(rgba, width, height, ColorType::Rgba8.into())
        .map_err(|e| Error::ImageExtract(format!("PNG encoding failed: {}", e)))?;
    Ok(png)
}

/// Unpack rows of `bpc`-bit samples into one byte per component.
fn unpack_samples(data: &[u8], width: u32, height: u32, components: usize, bpc: i64) -> Option<Vec<u8>> {
    let samples_per_row = width as usize * components;
    match bpc {
        8 => {
            let needed = samples_per_row * height as usize;
            (data.len() >= needed).then(|| data[..needed].to_vec())
        }
        16 => {
            let needed = samples_per_row * height as usize * 2;
            (data.len() >= needed).then(|| data[..needed].iter().step_by(2).copied().collect())
        }
        1 | 2 | 4 => {
            let bits = bpc as usize;
            let row_bytes = (samples_per_row * bits).div_ceil(8);
            if data.len() < row_bytes * height as usize {
                return None;
            }
            let max = (1u16 << bits) - 1;
            let mut out = Vec::with_capacity(samples_per_row * height as usize);
            for row in data.chunks(row_bytes).take(height as usize) {
                for sample in 0..samples_per_row {
                    let bit = sample * bits;
                    let byte = row[bit / 8];
                    let shift = 8 - bits - (bit % 8);
                    out.push(((byte >> shift) as u16 & max) as u8);
                }
            }
            Some(out)
        }
        _ => None,
    }
}

fn samples_to_rgba(
    data: &[u8],
    width: u32,
    height: u32,
    bpc: i64,
    color_space: &ImageColorSpace,
) -> Option<Vec<u8>> {
    let channels = color_space.channels();
    let mut samples = unpack_samples(data, width, height, channels, bpc)?;
    // Indexed samples are palette indices; other low-depth samples scale to 0..=255.
    if bpc < 8 && !matches!(color_space, ImageColorSpace::Indexed { .. }) {
        let max = ((1u16 << bpc) - 1) as u16;
        for s in samples.iter_mut() {
            *s = (*s as u16 * 255 / max) as u8;
        }
    }

    let mut rgba = Vec::with_capacity(width as usize * height as usize * 4);
    for pixel in samples.chunks(channels) {
        let [r, g, b] = color_space.rgb(pixel)?;
        rgba.extend_from_slice(&[r, g, b, 255]);
    }
    Some(rgba)
}

/// Stencil masks paint black where the sample is 0 (1 with `Decode [1 0]`).
fn stencil_to_rgba(data: &[u8], width: u32, height: u32, inverted: bool) -> Option<Vec<u8>> {
    let samples = unpack_samples(data, width, height, 1, 1)?;
    let mut rgba = Vec::with_capacity(samples.len() * 4);
    for sample in samples {
        let painted = (sample == 0) != inverted;
        rgba.extend_from_slice(&[0, 0, 0, if painted { 255 } else { 0 }]);
    }
    Some(rgba)
}

fn apply_soft_mask(rgba: &mut [u8], mask: &Stream, width: u32, height: u32) {
    let same_size = |key: &[u8], expected: u32| {
        mask.dict.get(key).ok().and_then(|o| o.as_i64().ok()) == Some(expected as i64)
    };
    if !same_size(b"Width", width) || !same_size(b"Height", height) {
        log::debug!("Soft mask size differs from image, ignored");
        return;
    }
    let bpc = mask
        .dict
        .get(b"BitsPerComponent")
        .ok()
        .and_then(|o| o.as_i64().ok())
        .unwrap_or(8);
    let Some(alpha) = unpack_samples(&stream_bytes(mask), width, height, 1, bpc) else {
        return;
    };
    let max = if bpc >= 8 { 255u16 } else { (1u16 << bpc) - 1 };
    for (pixel, a) in rgba.chunks_mut(4).zip(alpha) {
        pixel[3] = (a as u16 * 255 / max) as u8;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lopdf::dictionary;

    fn decode_png(data: &str) -> image::RgbaImage {
        let bytes = base64::engine::general_purpose::STANDARD.decode(data).unwrap();
        image::load_from_memory(&bytes).unwrap().to_rgba8()
    }

    fn pending(dict: Dictionary, data: Vec<u8>, color_space: Option<ImageColorSpace>) -> PendingImage {
        PendingImage {
            object_name: Some("Im0".to_string()),
            inline: false,
            stream: Stream::new(dict, data),
            color_space,
            soft_mask: None,
            ctm: Matrix::new(100.0, 0.0, 0.0, 50.0, 10.0, 20.0),
        }
    }

    #[test]
    fn test_rgb_image_to_png_with_bounds() {
        let dict = dictionary! { "Width" => 2, "Height" => 1, "BitsPerComponent" => 8 };
        let image = pending(dict, vec![255, 0, 0, 0, 0, 255], Some(ImageColorSpace::Rgb));
        let element = image.into_element(1, 0, true);

        assert_eq!(element.id.as_deref(), Some("img-1-0"));
        assert_eq!(element.image_format.as_deref(), Some("png"));
        assert_eq!((element.left, element.bottom), (Some(10.0), Some(20.0)));
        assert_eq!((element.right, element.top), (Some(110.0), Some(70.0)));
        assert_eq!(element.z_order, Some(IMAGE_Z_ORDER_BASE));
        assert_eq!(element.transform, Some(vec![100.0, 0.0, 0.0, 50.0, 10.0, 20.0]));

        let png = decode_png(element.image_data.as_deref().unwrap());
        assert_eq!(png.dimensions(), (2, 1));
        assert_eq!(png.get_pixel(0, 0).0, [255, 0, 0, 255]);
        assert_eq!(png.get_pixel(1, 0).0, [0, 0, 255, 255]);
    }

    #[test]
    fn test_dct_passthrough() {
        let dict = dictionary! { "Width" => 1, "Height" => 1, "Filter" => "DCTDecode" };
        let element = pending(dict, vec![0xFF, 0xD8, 0xFF], None).into_element(2, 3, true);
        assert_eq!(element.image_format.as_deref(), Some("jpeg"));
        assert_eq!(element.image_data.as_deref(), Some("/9j/"));
        assert_eq!(element.z_order, Some(IMAGE_Z_ORDER_BASE + 3));
    }

    #[test]
    fn test_one_bit_indexed() {
        let palette = ImageColorSpace::Indexed {
            base: Box::new(ImageColorSpace::Rgb),
            lookup: vec![0, 0, 0, 0, 255, 0],
        };
        let dict = dictionary! { "Width" => 3, "Height" => 1, "BitsPerComponent" => 1 };
        let element = pending(dict, vec![0b0100_0000], Some(palette)).into_element(1, 0, true);
        let png = decode_png(element.image_data.as_deref().unwrap());
        assert_eq!(png.get_pixel(0, 0).0, [0, 0, 0, 255]);
        assert_eq!(png.get_pixel(1, 0).0, [0, 255, 0, 255]);
    }

    #[test]
    fn test_soft_mask_sets_alpha() {
        let dict = dictionary! { "Width" => 2, "Height" => 1, "BitsPerComponent" => 8 };
        let mut image = pending(dict, vec![10, 20], Some(ImageColorSpace::Gray));
        image.soft_mask = Some(Stream::new(
            dictionary! { "Width" => 2, "Height" => 1, "BitsPerComponent" => 8 },
            vec![0, 128],
        ));
        let element = image.into_element(1, 0, true);
        let png = decode_png(element.image_data.as_deref().unwrap());
        assert_eq!(png.get_pixel(0, 0).0, [10, 10, 10, 0]);
        assert_eq!(png.get_pixel(1, 0).0, [20, 20, 20, 128]);
    }

    #[test]
    fn test_truncated_data_leaves_payload_out() {
        let dict = dictionary! { "Width" => 4, "Height" => 4, "BitsPerComponent" => 8 };
        let element = pending(dict, vec![0; 3], Some(ImageColorSpace::Rgb)).into_element(1, 0, true);
        assert!(element.image_data.is_none());
        assert_eq!(element.native_width, Some(4));
    }

    #[test]
    fn test_inline_keys_expand() {
        let doc = Document::with_version("1.7");
        let dict = dictionary! { "W" => 1, "H" => 1, "CS" => "G", "BPC" => 8, "F" => "AHx" };
        let image = PendingImage::from_inline(&doc, &dict, b"7F>".to_vec(), None, Matrix::identity());
        assert!(image.inline);
        assert_eq!(image.color_space, Some(ImageColorSpace::Gray));
        assert_eq!(
            image.stream.dict.get(b"Filter").unwrap().as_name().unwrap(),
            b"ASCIIHexDecode"
        );
        assert_eq!(image.dimension(b"Width"), Some(1));
    }

    #[test]
    fn test_lazy_element_has_no_payload() {
        let dict = dictionary! { "Width" => 1, "Height" => 1 };
        let element = pending(dict, vec![0], Some(ImageColorSpace::Gray)).into_element(1, 0, false);
        assert!(element.image_data.is_none());
        assert_eq!(element.native_height, Some(1));
    }
}

//! Stream recompression.
//!
//! Every stream whose filter chain can be decoded is re-encoded with
//! Flate at the configured level. With an image quality set, 8-bit
//! DeviceRGB and DeviceGray images are re-encoded as JPEG instead. A new
//! encoding replaces the old one only when it is smaller, so compression
//! never grows a stream. Streams using image codecs other than baseline
//! JPEG are passed through.

use super::transact;
use crate::decoders::{flate_encode, is_decodable_chain, is_image_filter};
use crate::document::Document;
use crate::error::{Error, Result};
use crate::object::{filter_names, Dict, Object, ObjectRef};
use crate::progress::Monitor;
use image::codecs::jpeg::JpegEncoder;
use image::{ColorType, ImageFormat};
use serde::{Deserialize, Serialize};

/// Compression settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompressOptions {
    /// Flate level, 0 (store) to 9 (best)
    pub level: u32,
    /// JPEG quality (1-100) for recompressed images; `None` leaves images
    /// to Flate
    pub image_quality: Option<u8>,
}

impl Default for CompressOptions {
    fn default() -> Self {
        Self {
            level: 6,
            image_quality: None,
        }
    }
}

impl CompressOptions {
    /// Set the Flate level.
    pub fn with_level(mut self, level: u32) -> Self {
        self.level = level.min(9);
        self
    }

    /// Recompress images as JPEG at `quality`.
    pub fn with_image_quality(mut self, quality: u8) -> Self {
        self.image_quality = Some(quality.clamp(1, 100));
        self
    }
}

/// What a compression pass did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CompressStats {
    /// Streams examined
    pub streams: usize,
    /// Streams replaced with Flate output
    pub flated: usize,
    /// Images replaced with JPEG output
    pub images: usize,
    /// Stream bytes before
    pub bytes_before: usize,
    /// Stream bytes after
    pub bytes_after: usize,
}

/// Recompress the streams of `doc`.
pub fn compress(doc: &mut Document, options: &CompressOptions, monitor: &Monitor) -> Result<CompressStats> {
    let monitor = monitor.for_operation("compress");
    transact(doc, |doc| {
        let streams: Vec<ObjectRef> = doc
            .iter()
            .filter(|(_, o)| matches!(o, Object::Stream { .. }))
            .map(|(r, _)| r)
            .collect();
        let total = streams.len();
        let mut stats = CompressStats::default();

        for (step, &r) in streams.iter().enumerate() {
            monitor.step(step, total, || {
                let (size, replacement) = match doc.get(r) {
                    Some(Object::Stream { dict, data }) => {
                        let found = recompress(doc, dict, data, options).unwrap_or_else(|e| {
                            log::warn!("Leaving stream {} as is: {}", r, e);
                            None
                        });
                        (data.len(), found)
                    },
                    _ => return Ok(()),
                };
                stats.streams += 1;
                stats.bytes_before += size;
                match replacement {
                    Some((kind, dict, data)) => {
                        stats.bytes_after += data.len();
                        match kind {
                            Encoding::Flate => stats.flated += 1,
                            Encoding::Jpeg => stats.images += 1,
                        }
                        doc.put(r, Object::stream(dict, data));
                    },
                    None => stats.bytes_after += size,
                }
                Ok(())
            })?;
        }
        log::info!(
            "Compressed {} of {} streams ({} images): {} -> {} bytes",
            stats.flated + stats.images,
            stats.streams,
            stats.images,
            stats.bytes_before,
            stats.bytes_after
        );
        Ok(stats)
    })
}

enum Encoding {
    Flate,
    Jpeg,
}

/// A smaller encoding of one stream, if there is one.
fn recompress(
    doc: &Document,
    dict: &Dict,
    data: &[u8],
    options: &CompressOptions,
) -> Result<Option<(Encoding, Dict, Vec<u8>)>> {
    if dict.get("Type").and_then(|o| o.as_name()) == Some("Metadata") {
        return Ok(None);
    }
    let filters = dict.get("Filter").map(filter_names).unwrap_or_default();
    let is_image = dict.get("Subtype").and_then(|o| o.as_name()) == Some("Image");

    if is_image {
        if let Some(quality) = options.image_quality {
            if let Some(jpeg) = reencode_jpeg(doc, dict, data, &filters, quality)? {
                if jpeg.len() < data.len() {
                    let mut dict = dict.clone();
                    dict.insert("Filter".to_string(), Object::name("DCTDecode"));
                    dict.remove("DecodeParms");
                    return Ok(Some((Encoding::Jpeg, dict, jpeg)));
                }
                return Ok(None);
            }
        }
    }

    if filters.iter().any(|f| is_image_filter(f)) || !is_decodable_chain(&filters) {
        return Ok(None);
    }
    let decoded = Object::stream(dict.clone(), data.to_vec())
        .decode_stream_data_with_limits(&doc.options().decode_limits())?;
    let encoded = flate_encode(&decoded, options.level)?;
    if encoded.len() >= data.len() {
        return Ok(None);
    }
    let mut dict = dict.clone();
    dict.insert("Filter".to_string(), Object::name("FlateDecode"));
    dict.remove("DecodeParms");
    Ok(Some((Encoding::Flate, dict, encoded)))
}

/// JPEG bytes for an eligible image, `None` for images this pass does
/// not handle.
fn reencode_jpeg(
    doc: &Document,
    dict: &Dict,
    data: &[u8],
    filters: &[String],
    quality: u8,
) -> Result<Option<Vec<u8>>> {
    let int = |key: &str| dict.get(key).and_then(|o| o.as_integer());
    let (Some(width), Some(height)) = (int("Width"), int("Height")) else {
        return Ok(None);
    };
    if width <= 0 || height <= 0 || int("BitsPerComponent") != Some(8) {
        return Ok(None);
    }
    if dict.get("ImageMask").and_then(|o| o.as_bool()) == Some(true) || dict.contains_key("Decode") {
        return Ok(None);
    }
    let color = match dict.get("ColorSpace").map(|o| doc.deref(o)).transpose()? {
        Some(Object::Name(n)) if n == "DeviceRGB" => ColorType::Rgb8,
        Some(Object::Name(n)) if n == "DeviceGray" => ColorType::L8,
        _ => return Ok(None),
    };
    let (width, height) = (width as u32, height as u32);

    let pixels = match filters {
        [only] if only == "DCTDecode" || only == "DCT" => {
            let decoded = image::load_from_memory_with_format(data, ImageFormat::Jpeg)
                .map_err(|e| Error::Decode(format!("JPEG: {}", e)))?;
            if decoded.width() != width || decoded.height() != height {
                return Ok(None);
            }
            match color {
                ColorType::L8 => decoded.to_luma8().into_raw(),
                _ => decoded.to_rgb8().into_raw(),
            }
        },
        _ if filters.iter().any(|f| is_image_filter(f)) || !is_decodable_chain(filters) => {
            return Ok(None)
        },
        _ => Object::stream(dict.clone(), data.to_vec())
            .decode_stream_data_with_limits(&doc.options().decode_limits())?,
    };
    let expected = width as usize * height as usize * color.bytes_per_pixel() as usize;
    if pixels.len() < expected {
        log::warn!("Image data holds {} bytes, expected {}", pixels.len(), expected);
        return Ok(None);
    }

    let mut out = Vec::new();
    JpegEncoder::new_with_quality(&mut out, quality)
        .encode(&pixels[..expected], width, height, color)
        .map_err(|e| Error::Encode(format!("JPEG: {}", e)))?;
    Ok(Some(out))
}

//! Stream filters.
//!
//! Decoders for the general-purpose filters (Flate, LZW, ASCII85,
//! ASCIIHex, RunLength) plus PNG/TIFF predictors. Image codecs (DCT, JPX,
//! JBIG2, CCITT) are not decoded: their bytes are already the final image
//! payload, so a chain ending in one of them stops there.
//!
//! Filters are applied in the order listed in the stream dictionary.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};

mod ascii85;
mod ascii_hex;
mod flate;
mod lzw;
mod predictor;
mod runlength;

pub use ascii85::Ascii85Decoder;
pub use ascii_hex::AsciiHexDecoder;
pub(crate) use ascii_hex::hex_value;
pub use flate::{flate_encode, FlateDecoder};
pub use lzw::LzwDecoder;
pub use predictor::{decode_predictor, DecodeParams};
pub use runlength::RunLengthDecoder;

/// Trait for PDF stream decoders.
pub trait StreamDecoder {
    /// Decode the input data.
    fn decode(&self, input: &[u8]) -> Result<Vec<u8>>;

    /// Filter name as it appears in `/Filter` (e.g., "FlateDecode").
    fn name(&self) -> &str;
}

/// Decompression bomb limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecodeLimits {
    /// Maximum decoded:encoded ratio (0 disables the check)
    pub max_ratio: u32,
    /// Maximum decoded size in bytes (0 disables the check)
    pub max_size: usize,
}

impl Default for DecodeLimits {
    fn default() -> Self {
        Self {
            max_ratio: 1000,
            max_size: 256 * 1024 * 1024,
        }
    }
}

/// Filters whose output is an encoded image; decoding stops at them.
const IMAGE_FILTERS: &[&str] = &["DCTDecode", "JPXDecode", "JBIG2Decode", "CCITTFaxDecode"];

/// Map abbreviated inline-image filter names to their full form.
fn canonical_filter(name: &str) -> &str {
    match name {
        "Fl" => "FlateDecode",
        "AHx" => "ASCIIHexDecode",
        "A85" => "ASCII85Decode",
        "LZW" => "LZWDecode",
        "RL" => "RunLengthDecode",
        "DCT" => "DCTDecode",
        "CCF" => "CCITTFaxDecode",
        other => other,
    }
}

/// True if the filter is an image codec that is passed through undecoded.
pub fn is_image_filter(name: &str) -> bool {
    IMAGE_FILTERS.contains(&canonical_filter(name))
}

/// True if every filter in the chain can be decoded by this module.
pub fn is_decodable_chain(filters: &[String]) -> bool {
    filters.iter().all(|f| decoder_for(f, None).is_some())
}

fn decoder_for(name: &str, params: Option<&DecodeParams>) -> Option<Box<dyn StreamDecoder>> {
    let early_change = params.map(|p| p.early_change).unwrap_or(true);
    let decoder: Box<dyn StreamDecoder> = match canonical_filter(name) {
        "FlateDecode" => Box::new(FlateDecoder),
        "ASCIIHexDecode" => Box::new(AsciiHexDecoder),
        "ASCII85Decode" => Box::new(Ascii85Decoder),
        "LZWDecode" => Box::new(LzwDecoder { early_change }),
        "RunLengthDecode" => Box::new(RunLengthDecoder),
        _ => return None,
    };
    Some(decoder)
}

/// Decode stream data using a filter pipeline with default limits.
pub fn decode_stream(data: &[u8], filters: &[String]) -> Result<Vec<u8>> {
    decode_stream_with_options(data, filters, None, &DecodeLimits::default())
}

/// Decode stream data through `filters`, then undo any predictor.
///
/// Image codecs terminate the chain and are returned as-is. Any other
/// unknown filter is an [`Error::UnsupportedFilter`].
pub fn decode_stream_with_options(
    data: &[u8],
    filters: &[String],
    params: Option<&DecodeParams>,
    limits: &DecodeLimits,
) -> Result<Vec<u8>> {
    let encoded_size = data.len().max(1);
    let mut current = data.to_vec();
    let mut predicted = false;

    for name in filters {
        if is_image_filter(name) {
            log::debug!("Stopping filter chain at image codec {}", name);
            return Ok(current);
        }
        let decoder =
            decoder_for(name, params).ok_or_else(|| Error::UnsupportedFilter(name.clone()))?;
        current = decoder.decode(&current)?;
        predicted |= matches!(decoder.name(), "FlateDecode" | "LZWDecode");

        if limits.max_ratio > 0 {
            let ratio = current.len() / encoded_size;
            if ratio > limits.max_ratio as usize {
                return Err(Error::Decode(format!(
                    "decompression ratio {}:1 exceeds limit {}:1",
                    ratio, limits.max_ratio
                )));
            }
        }
        if limits.max_size > 0 && current.len() > limits.max_size {
            return Err(Error::Decode(format!(
                "decoded size {} bytes exceeds limit {} bytes",
                current.len(),
                limits.max_size
            )));
        }
    }

    if let Some(params) = params {
        if predicted && params.predictor > 1 {
            current = decode_predictor(&current, params)?;
        }
    }

    Ok(current)
}

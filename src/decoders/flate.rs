//! FlateDecode (zlib/deflate).

use crate::decoders::StreamDecoder;
use crate::error::{Error, Result};
use flate2::read::{DeflateDecoder, ZlibDecoder};
use flate2::write::ZlibEncoder;
use flate2::Compression;
use std::io::{Read, Write};

/// FlateDecode filter implementation.
///
/// Tries a zlib stream first, then raw deflate for files with a damaged
/// zlib header. Output produced before a corruption point is kept.
pub struct FlateDecoder;

impl StreamDecoder for FlateDecoder {
    fn decode(&self, input: &[u8]) -> Result<Vec<u8>> {
        let mut output = Vec::new();
        let zlib_err = match ZlibDecoder::new(input).read_to_end(&mut output) {
            Ok(_) => return Ok(output),
            Err(e) => e,
        };
        if !output.is_empty() {
            log::warn!(
                "FlateDecode partial recovery: {} bytes before corruption: {}",
                output.len(),
                zlib_err
            );
            return Ok(output);
        }

        for skip in [0usize, 2] {
            if input.len() <= skip {
                continue;
            }
            output.clear();
            match DeflateDecoder::new(&input[skip..]).read_to_end(&mut output) {
                Ok(_) => {
                    log::info!("Raw deflate recovery (skip {}) produced {} bytes", skip, output.len());
                    return Ok(output);
                },
                Err(_) if !output.is_empty() => {
                    log::warn!("Raw deflate partial recovery: {} bytes", output.len());
                    return Ok(output);
                },
                Err(_) => {},
            }
        }

        Err(Error::Decode(format!("FlateDecode error: {}", zlib_err)))
    }

    fn name(&self) -> &str {
        "FlateDecode"
    }
}

/// Compress `data` as a zlib stream at `level` (0-9).
pub fn flate_encode(data: &[u8], level: u32) -> Result<Vec<u8>> {
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::new(level.min(9)));
    encoder
        .write_all(data)
        .map_err(|e| Error::Encode(format!("FlateDecode: {}", e)))?;
    encoder
        .finish()
        .map_err(|e| Error::Encode(format!("FlateDecode: {}", e)))
}

//! LZWDecode.
//!
//! PDF LZW uses MSB-first codes starting at 9 bits, clear code 256 and
//! end-of-data 257. With `EarlyChange` 1 (the default) the code width grows
//! one code early, which is the TIFF variant of the algorithm.

use crate::decoders::StreamDecoder;
use crate::error::{Error, Result};
use weezl::{decode::Decoder, BitOrder};

/// LZWDecode filter implementation.
pub struct LzwDecoder {
    /// `/EarlyChange` from the decode parameters
    pub early_change: bool,
}

impl Default for LzwDecoder {
    fn default() -> Self {
        Self { early_change: true }
    }
}

impl StreamDecoder for LzwDecoder {
    fn decode(&self, input: &[u8]) -> Result<Vec<u8>> {
        let mut decoder = if self.early_change {
            Decoder::with_tiff_size_switch(BitOrder::Msb, 8)
        } else {
            Decoder::new(BitOrder::Msb, 8)
        };
        decoder
            .decode(input)
            .map_err(|e| Error::Decode(format!("LZWDecode error: {:?}", e)))
    }

    fn name(&self) -> &str {
        "LZWDecode"
    }
}

//! ASCIIHexDecode.
//!
//! Whitespace is ignored, `>` ends the data, and an odd trailing digit is
//! padded with an implicit `0`.

use crate::decoders::StreamDecoder;
use crate::error::{Error, Result};

/// ASCIIHexDecode filter implementation.
pub struct AsciiHexDecoder;

impl StreamDecoder for AsciiHexDecoder {
    fn decode(&self, input: &[u8]) -> Result<Vec<u8>> {
        let end = input.iter().position(|&c| c == b'>').unwrap_or(input.len());
        let digits = input[..end]
            .iter()
            .filter(|c| !c.is_ascii_whitespace() && **c != 0)
            .map(|&c| {
                hex_value(c).ok_or_else(|| {
                    Error::Decode(format!("ASCIIHexDecode: invalid hex digit '{}'", c as char))
                })
            })
            .collect::<Result<Vec<u8>>>()?;

        Ok(digits
            .chunks(2)
            .map(|pair| (pair[0] << 4) | pair.get(1).copied().unwrap_or(0))
            .collect())
    }

    fn name(&self) -> &str {
        "ASCIIHexDecode"
    }
}

/// Value of one hexadecimal ASCII digit.
pub(crate) fn hex_value(digit: u8) -> Option<u8> {
    match digit {
        b'0'..=b'9' => Some(digit - b'0'),
        b'A'..=b'F' => Some(digit - b'A' + 10),
        b'a'..=b'f' => Some(digit - b'a' + 10),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hex_basic() {
        assert_eq!(AsciiHexDecoder.decode(b"48656C6C6F>").unwrap(), b"Hello");
    }

    #[test]
    fn test_hex_whitespace_and_odd_length() {
        assert_eq!(AsciiHexDecoder.decode(b"48 65\n7").unwrap(), vec![0x48, 0x65, 0x70]);
    }

    #[test]
    fn test_hex_invalid_digit() {
        assert!(AsciiHexDecoder.decode(b"4G").is_err());
    }
}

//! ASCII85Decode (base-85).
//!
//! Five characters in `!`..`u` encode four bytes; `z` stands for four
//! zero bytes; `~>` ends the data.

use crate::decoders::StreamDecoder;
use crate::error::{Error, Result};

/// ASCII85Decode filter implementation.
pub struct Ascii85Decoder;

impl StreamDecoder for Ascii85Decoder {
    fn decode(&self, input: &[u8]) -> Result<Vec<u8>> {
        let body = input.strip_prefix(b"<~").unwrap_or(input);
        let mut output = Vec::with_capacity(body.len() * 4 / 5);
        let mut acc: u64 = 0;
        let mut count = 0usize;

        for &byte in body {
            match byte {
                b'~' => break,
                b'z' if count == 0 => output.extend_from_slice(&[0, 0, 0, 0]),
                b'z' => {
                    return Err(Error::Decode("ASCII85Decode: 'z' inside a group".to_string()));
                },
                b'!'..=b'u' => {
                    acc = acc * 85 + u64::from(byte - b'!');
                    count += 1;
                    if count == 5 {
                        let word = u32::try_from(acc)
                            .map_err(|_| Error::Decode("ASCII85Decode: group overflow".into()))?;
                        output.extend_from_slice(&word.to_be_bytes());
                        acc = 0;
                        count = 0;
                    }
                },
                _ if byte.is_ascii_whitespace() || byte == 0 => {},
                _ => {
                    return Err(Error::Decode(format!(
                        "ASCII85Decode: invalid character '{}'",
                        byte as char
                    )));
                },
            }
        }

        if count == 1 {
            return Err(Error::Decode("ASCII85Decode: dangling single character".to_string()));
        }
        if count > 1 {
            for _ in count..5 {
                acc = acc * 85 + 84;
            }
            let word = u32::try_from(acc)
                .map_err(|_| Error::Decode("ASCII85Decode: group overflow".into()))?;
            output.extend_from_slice(&word.to_be_bytes()[..count - 1]);
        }

        Ok(output)
    }

    fn name(&self) -> &str {
        "ASCII85Decode"
    }
}

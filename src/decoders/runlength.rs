//! RunLengthDecode.
//!
//! Length byte 0-127 copies the next N+1 bytes, 129-255 repeats the next
//! byte 257-N times, 128 ends the data.

use crate::decoders::StreamDecoder;
use crate::error::{Error, Result};

/// RunLengthDecode filter implementation.
pub struct RunLengthDecoder;

impl StreamDecoder for RunLengthDecoder {
    fn decode(&self, input: &[u8]) -> Result<Vec<u8>> {
        let mut output = Vec::new();
        let mut i = 0;

        while i < input.len() {
            let length = input[i];
            i += 1;
            match length {
                0..=127 => {
                    let count = length as usize + 1;
                    let run = input.get(i..i + count).ok_or_else(|| {
                        Error::Decode(format!(
                            "RunLengthDecode: literal run of {} bytes truncated",
                            count
                        ))
                    })?;
                    output.extend_from_slice(run);
                    i += count;
                },
                128 => break,
                129..=255 => {
                    let byte = *input.get(i).ok_or_else(|| {
                        Error::Decode("RunLengthDecode: missing byte for run".to_string())
                    })?;
                    i += 1;
                    output.resize(output.len() + (257 - length as usize), byte);
                },
            }
        }

        Ok(output)
    }

    fn name(&self) -> &str {
        "RunLengthDecode"
    }
}

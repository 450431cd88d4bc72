//! ToUnicode CMap parsing.
//!
//! Only the `bfchar` and `bfrange` sections are read. Destination strings
//! are UTF-16BE, so ligatures and surrogate pairs come out right.

use regex::Regex;
use std::collections::HashMap;

/// Upper bound on the number of codes one `bfrange` line may expand to.
const MAX_RANGE: u32 = 0xFFFF;

/// Mapping from character codes to Unicode text.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ToUnicode {
    map: HashMap<u32, String>,
    code_bytes: usize,
}

impl ToUnicode {
    /// Parse a decoded ToUnicode stream.
    ///
    /// ```
    /// use pdf_engine::content::ToUnicode;
    ///
    /// let cmap = ToUnicode::parse(b"beginbfchar\n<01> <0041>\nendbfchar");
    /// assert_eq!(cmap.get(0x01), Some("A"));
    /// ```
    pub fn parse(data: &[u8]) -> Self {
        lazy_static::lazy_static! {
            static ref CODESPACE: Regex =
                Regex::new(r"begincodespacerange\s*<([0-9A-Fa-f]+)>").unwrap();
            static ref BFCHAR: Regex =
                Regex::new(r"<([0-9A-Fa-f]+)>\s*<([0-9A-Fa-f]*)>").unwrap();
            static ref BFRANGE_SEQ: Regex =
                Regex::new(r"<([0-9A-Fa-f]+)>\s*<([0-9A-Fa-f]+)>\s*<([0-9A-Fa-f]+)>").unwrap();
            static ref BFRANGE_ARRAY: Regex =
                Regex::new(r"<([0-9A-Fa-f]+)>\s*<([0-9A-Fa-f]+)>\s*\[([^\]]*)\]").unwrap();
            static ref HEX: Regex = Regex::new(r"<([0-9A-Fa-f]*)>").unwrap();
        }

        let content = String::from_utf8_lossy(data);
        let mut map = HashMap::new();
        let mut code_bytes = CODESPACE
            .captures(&content)
            .map(|c| c[1].len().div_ceil(2))
            .unwrap_or(0);

        for section in sections(&content, "beginbfchar", "endbfchar") {
            for caps in BFCHAR.captures_iter(section) {
                let Ok(src) = u32::from_str_radix(&caps[1], 16) else {
                    continue;
                };
                code_bytes = code_bytes.max(caps[1].len().div_ceil(2));
                if let Some(dst) = utf16_hex(&caps[2]) {
                    map.insert(src, dst);
                }
            }
        }

        for section in sections(&content, "beginbfrange", "endbfrange") {
            for line in section.lines() {
                if let Some(caps) = BFRANGE_ARRAY.captures(line) {
                    let (Ok(lo), Ok(hi)) = (
                        u32::from_str_radix(&caps[1], 16),
                        u32::from_str_radix(&caps[2], 16),
                    ) else {
                        continue;
                    };
                    code_bytes = code_bytes.max(caps[1].len().div_ceil(2));
                    for (code, dst) in (lo..=hi).zip(HEX.captures_iter(&caps[3])) {
                        if let Some(text) = utf16_hex(&dst[1]) {
                            map.insert(code, text);
                        }
                    }
                } else if let Some(caps) = BFRANGE_SEQ.captures(line) {
                    let (Ok(lo), Ok(hi)) = (
                        u32::from_str_radix(&caps[1], 16),
                        u32::from_str_radix(&caps[2], 16),
                    ) else {
                        continue;
                    };
                    if hi < lo || hi - lo > MAX_RANGE {
                        log::warn!("Ignoring bfrange <{:X}> <{:X}>", lo, hi);
                        continue;
                    }
                    code_bytes = code_bytes.max(caps[1].len().div_ceil(2));
                    let Some(base) = utf16_units(&caps[3]) else {
                        continue;
                    };
                    for offset in 0..=(hi - lo) {
                        // the last UTF-16 unit is incremented across the range
                        let mut units = base.clone();
                        if let Some(last) = units.last_mut() {
                            *last = last.wrapping_add(offset as u16);
                        }
                        map.insert(lo + offset, String::from_utf16_lossy(&units));
                    }
                }
            }
        }

        log::trace!("ToUnicode CMap with {} entries", map.len());
        Self {
            map,
            code_bytes: code_bytes.clamp(1, 4),
        }
    }

    /// Text for one code.
    pub fn get(&self, code: u32) -> Option<&str> {
        self.map.get(&code).map(|s| s.as_str())
    }

    /// Width in bytes of the source codes.
    pub fn code_bytes(&self) -> usize {
        self.code_bytes
    }

    /// Number of mapped codes.
    pub fn len(&self) -> usize {
        self.map.len()
    }

    /// True when nothing is mapped.
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}

fn sections<'a>(content: &'a str, begin: &str, end: &str) -> Vec<&'a str> {
    let mut out = Vec::new();
    let mut rest = content;
    while let Some(start) = rest.find(begin) {
        let after = &rest[start + begin.len()..];
        let Some(stop) = after.find(end) else {
            break;
        };
        out.push(&after[..stop]);
        rest = &after[stop + end.len()..];
    }
    out
}

fn utf16_units(hex: &str) -> Option<Vec<u16>> {
    if hex.is_empty() {
        return None;
    }
    let padded = if hex.len() % 4 == 0 {
        hex.to_string()
    } else {
        format!("{:0>width$}", hex, width = hex.len().div_ceil(4) * 4)
    };
    (0..padded.len())
        .step_by(4)
        .map(|i| u16::from_str_radix(&padded[i..i + 4], 16).ok())
        .collect()
}

fn utf16_hex(hex: &str) -> Option<String> {
    utf16_units(hex).map(|units| String::from_utf16_lossy(&units))
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &[u8] = b"/CIDInit /ProcSet findresource begin
begincmap
1 begincodespacerange
<0000> <FFFF>
endcodespacerange
2 beginbfchar
<0003> <0020>
<0010> <00660069>
endbfchar
2 beginbfrange
<0024> <0026> <0041>
<0030> <0031> [<0078> <D835DF0C>]
endbfrange
endcmap";

    #[test]
    fn test_bfchar_and_ligature() {
        let cmap = ToUnicode::parse(SAMPLE);
        assert_eq!(cmap.get(0x03), Some(" "));
        assert_eq!(cmap.get(0x10), Some("fi"));
        assert_eq!(cmap.code_bytes(), 2);
    }

    #[test]
    fn test_bfrange_sequential() {
        let cmap = ToUnicode::parse(SAMPLE);
        assert_eq!(cmap.get(0x24), Some("A"));
        assert_eq!(cmap.get(0x26), Some("C"));
        assert_eq!(cmap.get(0x27), None);
    }

    #[test]
    fn test_bfrange_array_with_surrogates() {
        let cmap = ToUnicode::parse(SAMPLE);
        assert_eq!(cmap.get(0x30), Some("x"));
        assert_eq!(cmap.get(0x31), Some("\u{1D70C}"));
        assert_eq!(cmap.len(), 7);
    }

    #[test]
    fn test_single_byte_codes() {
        let cmap = ToUnicode::parse(b"beginbfchar <41> <0042> endbfchar");
        assert_eq!(cmap.code_bytes(), 1);
        assert_eq!(cmap.get(0x41), Some("B"));
    }

    #[test]
    fn test_empty_input() {
        let cmap = ToUnicode::parse(b"");
        assert!(cmap.is_empty());
        assert_eq!(cmap.code_bytes(), 1);
    }
}

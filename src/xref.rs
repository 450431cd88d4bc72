//! Cross-reference index parsing.
//!
//! Handles classic `xref` tables, cross-reference streams and hybrid files,
//! following `/Prev` chains from the offset named by `startxref`. The index
//! read here only locates objects for the initial load; the serializer
//! always writes a fresh one.

use crate::error::{Error, Result};
use crate::lexer::{token, Token};
use crate::object::{Dict, Object};
use crate::parser::{object_header_matches, parse_indirect_object, parse_object};
use std::collections::{BTreeMap, HashSet};

/// How many bytes from the end are searched for `startxref`.
const TAIL_WINDOW: usize = 2048;

/// Upper bound on entries in one classic subsection.
const MAX_SUBSECTION_ENTRIES: i64 = 10_000_000;

/// One cross-reference entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum XRefEntry {
    /// Free slot
    Free {
        /// Generation to use if the number is reused
        gen: u16,
    },
    /// Object stored directly in the file
    InUse {
        /// Byte offset of `N G obj`
        offset: usize,
        /// Generation number
        gen: u16,
    },
    /// Object stored inside an object stream (generation is always 0)
    Compressed {
        /// Object number of the containing `/ObjStm`
        stream: u32,
        /// Index within the stream
        index: u32,
    },
}

/// Cross-reference table plus the trailer dictionary that accompanied it.
#[derive(Debug, Clone, Default)]
pub struct CrossRefTable {
    entries: BTreeMap<u32, XRefEntry>,
    trailer: Dict,
}

impl CrossRefTable {
    /// Empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or overwrite the entry for `num`.
    pub fn add_entry(&mut self, num: u32, entry: XRefEntry) {
        self.entries.insert(num, entry);
    }

    /// Entry for `num`.
    pub fn get(&self, num: u32) -> Option<&XRefEntry> {
        self.entries.get(&num)
    }

    /// Entries in object-number order.
    pub fn iter(&self) -> impl Iterator<Item = (u32, XRefEntry)> + '_ {
        self.entries.iter().map(|(n, e)| (*n, *e))
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True if there are no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Trailer dictionary.
    pub fn trailer(&self) -> &Dict {
        &self.trailer
    }

    /// Replace the trailer dictionary.
    pub fn set_trailer(&mut self, trailer: Dict) {
        self.trailer = trailer;
    }

    /// Fill gaps from an older section: existing entries and trailer keys win.
    pub fn merge_older(&mut self, older: CrossRefTable) {
        for (num, entry) in older.entries {
            self.entries.entry(num).or_insert(entry);
        }
        for (key, value) in older.trailer {
            if key != "Prev" && key != "XRefStm" {
                self.trailer.entry(key).or_insert(value);
            }
        }
    }

    /// Number of in-use entries (direct or compressed).
    pub fn in_use_count(&self) -> usize {
        self.entries
            .values()
            .filter(|e| !matches!(e, XRefEntry::Free { .. }))
            .count()
    }

    /// Check every direct entry against the file: in bounds and pointing at
    /// the matching `N G obj` header. Returns a description of the first
    /// inconsistency.
    pub fn validate(&self, data: &[u8]) -> std::result::Result<(), String> {
        if self.in_use_count() == 0 {
            return Err("no in-use entries".to_string());
        }
        for (num, entry) in self.iter() {
            if let XRefEntry::InUse { offset, .. } = entry {
                if offset >= data.len() {
                    return Err(format!("object {} offset {} beyond end of file", num, offset));
                }
                if !object_header_matches(data, offset, num) {
                    return Err(format!("object {} header mismatch at offset {}", num, offset));
                }
            }
        }
        Ok(())
    }
}

/// Locate the offset stored after the last `startxref` keyword.
pub fn find_startxref(data: &[u8]) -> Result<usize> {
    let window_start = data.len().saturating_sub(TAIL_WINDOW);
    let tail = &data[window_start..];
    let pos = tail
        .windows(b"startxref".len())
        .rposition(|w| w == b"startxref")
        .ok_or_else(|| Error::ParseError {
            offset: window_start,
            reason: "startxref not found in file tail".to_string(),
        })?;
    let after = &tail[pos + b"startxref".len()..];
    match token(after) {
        Ok((_, Token::Integer(n))) if n >= 0 && (n as usize) < data.len() => Ok(n as usize),
        _ => Err(Error::ParseError {
            offset: window_start + pos,
            reason: "startxref offset missing or out of range".to_string(),
        }),
    }
}

/// Parse the section at `offset` and everything reachable through `/Prev`
/// and `/XRefStm`, newest entries winning.
pub fn parse_xref_chain(data: &[u8], offset: usize, max_depth: u32) -> Result<CrossRefTable> {
    let mut visited = HashSet::new();
    let mut table = parse_section(data, offset)?;
    visited.insert(offset);

    if let Some(stm) = table.trailer().get("XRefStm").and_then(|o| o.as_integer()) {
        match parse_section(data, stm as usize) {
            Ok(hybrid) => table.merge_older(hybrid),
            Err(e) => log::warn!("Ignoring unreadable /XRefStm at {}: {}", stm, e),
        }
    }

    let mut prev = table.trailer().get("Prev").and_then(|o| o.as_integer());
    let mut depth = 0;
    while let Some(p) = prev {
        let p = p as usize;
        if !visited.insert(p) {
            log::warn!("Cross-reference /Prev loop at offset {}", p);
            break;
        }
        depth += 1;
        if depth > max_depth {
            return Err(Error::RecursionLimitExceeded(max_depth));
        }
        let older = parse_section(data, p)?;
        prev = older.trailer().get("Prev").and_then(|o| o.as_integer());
        if let Some(stm) = older.trailer().get("XRefStm").and_then(|o| o.as_integer()) {
            if let Ok(hybrid) = parse_section(data, stm as usize) {
                table.merge_older(hybrid);
            }
        }
        table.merge_older(older);
    }

    table.trailer.remove("Prev");
    table.trailer.remove("XRefStm");
    Ok(table)
}

/// Parse one section, classic or stream.
fn parse_section(data: &[u8], offset: usize) -> Result<CrossRefTable> {
    let slice = data.get(offset..).ok_or_else(|| Error::ParseError {
        offset,
        reason: "cross-reference offset beyond end of file".to_string(),
    })?;
    match token(slice) {
        Ok((rest, Token::Keyword(b"xref"))) => parse_classic(rest, offset),
        Ok((_, Token::Integer(_))) => parse_stream_section(slice, offset),
        _ => Err(Error::ParseError {
            offset,
            reason: "expected 'xref' or a cross-reference stream".to_string(),
        }),
    }
}

fn section_error(offset: usize, reason: &str) -> Error {
    Error::ParseError {
        offset,
        reason: reason.to_string(),
    }
}

fn next_int(input: &[u8], offset: usize) -> Result<(&[u8], i64)> {
    match token(input) {
        Ok((rest, Token::Integer(n))) => Ok((rest, n)),
        _ => Err(section_error(offset, "malformed cross-reference entry")),
    }
}

fn parse_classic(mut input: &[u8], offset: usize) -> Result<CrossRefTable> {
    let mut table = CrossRefTable::new();
    let mut first_subsection = true;

    loop {
        match token(input) {
            Ok((rest, Token::Keyword(b"trailer"))) => {
                let (_, trailer) = parse_object(rest)
                    .map_err(|_| section_error(offset, "unreadable trailer dictionary"))?;
                match trailer {
                    Object::Dictionary(d) => table.set_trailer(d),
                    _ => return Err(section_error(offset, "trailer is not a dictionary")),
                }
                return Ok(table);
            },
            Ok((_, Token::Integer(_))) => {},
            _ => return Err(section_error(offset, "missing trailer after xref table")),
        }

        let (rest, mut start) = next_int(input, offset)?;
        let (mut rest, count) = next_int(rest, offset)?;
        if !(0..=MAX_SUBSECTION_ENTRIES).contains(&count) || start < 0 {
            return Err(section_error(offset, "implausible xref subsection header"));
        }

        let mut rows = Vec::with_capacity(count as usize);
        for _ in 0..count {
            let (r, field1) = next_int(rest, offset)?;
            let (r, gen) = next_int(r, offset)?;
            let (r, kind) = match token(r) {
                Ok((r, Token::Keyword(k))) if k == b"n" || k == b"f" => (r, k[0]),
                _ => return Err(section_error(offset, "xref entry type must be 'n' or 'f'")),
            };
            rows.push((field1, gen, kind));
            rest = r;
        }

        // A common writer bug numbers the first subsection from 1 while
        // still listing the free head of object 0.
        if first_subsection && start == 1 && rows.first().is_some_and(|r| r.2 == b'f' && r.1 == 65535) {
            log::warn!("xref subsection starts at 1 with a free head entry; shifting to 0");
            start = 0;
        }
        first_subsection = false;

        for (i, (field1, gen, kind)) in rows.into_iter().enumerate() {
            let num = (start as u64 + i as u64) as u32;
            let gen = gen.clamp(0, 65535) as u16;
            let entry = if kind == b'n' && field1 > 0 {
                XRefEntry::InUse {
                    offset: field1 as usize,
                    gen,
                }
            } else {
                XRefEntry::Free { gen }
            };
            table.add_entry(num, entry);
        }
        input = rest;
    }
}

fn parse_stream_section(slice: &[u8], offset: usize) -> Result<CrossRefTable> {
    let (_, (_, obj)) = parse_indirect_object(slice, 64)
        .map_err(|_| section_error(offset, "unreadable cross-reference stream"))?;
    if obj.dict_type() != Some("XRef") {
        return Err(section_error(offset, "object at startxref is not /Type /XRef"));
    }
    parse_xref_stream(&obj, offset)
}

/// Decode a `/Type /XRef` stream into a table whose trailer is the stream dictionary.
pub fn parse_xref_stream(obj: &Object, offset: usize) -> Result<CrossRefTable> {
    let Object::Stream { dict, .. } = obj else {
        return Err(section_error(offset, "cross-reference stream is not a stream"));
    };
    let widths: Vec<usize> = dict
        .get("W")
        .and_then(|w| w.as_array())
        .map(|arr| arr.iter().map(|o| o.as_integer().unwrap_or(0).max(0) as usize).collect())
        .unwrap_or_default();
    if widths.len() != 3 || widths.iter().any(|&w| w > 8) {
        return Err(section_error(offset, "invalid /W in cross-reference stream"));
    }
    let size = dict.get("Size").and_then(|o| o.as_integer()).unwrap_or(0).max(0);
    let index: Vec<i64> = dict
        .get("Index")
        .and_then(|o| o.as_array())
        .map(|arr| arr.iter().filter_map(|o| o.as_integer()).collect())
        .unwrap_or_else(|| vec![0, size]);

    let data = obj.decode_stream_data()?;
    let row_len: usize = widths.iter().sum();
    if row_len == 0 {
        return Err(section_error(offset, "zero-width cross-reference rows"));
    }

    let mut table = CrossRefTable::new();
    let mut rows = data.chunks_exact(row_len);
    for pair in index.chunks(2) {
        let (start, count) = match pair {
            [s, c] if *s >= 0 && *c >= 0 => (*s as u64, *c as u64),
            _ => break,
        };
        for i in 0..count {
            let Some(row) = rows.next() else {
                log::warn!("Cross-reference stream shorter than its /Index claims");
                break;
            };
            let (f1, rest) = row.split_at(widths[0]);
            let (f2, f3) = rest.split_at(widths[1]);
            // a zero-width type field defaults to type 1
            let kind = if widths[0] == 0 { 1 } else { read_be(f1) };
            let num = (start + i) as u32;
            let entry = match kind {
                0 => XRefEntry::Free {
                    gen: read_be(f3) as u16,
                },
                1 => XRefEntry::InUse {
                    offset: read_be(f2) as usize,
                    gen: read_be(f3) as u16,
                },
                2 => XRefEntry::Compressed {
                    stream: read_be(f2) as u32,
                    index: read_be(f3) as u32,
                },
                // unknown types are treated as null references
                _ => continue,
            };
            table.add_entry(num, entry);
        }
    }

    let mut trailer = dict.clone();
    for key in ["Type", "W", "Index", "Filter", "DecodeParms", "Length"] {
        trailer.remove(key);
    }
    table.set_trailer(trailer);
    Ok(table)
}

fn read_be(bytes: &[u8]) -> u64 {
    bytes.iter().fold(0u64, |acc, &b| (acc << 8) | u64::from(b))
}

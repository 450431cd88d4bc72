//! Object streams (`/Type /ObjStm`).
//!
//! The decoded body starts with `N` pairs of `object-number offset`, and
//! each offset is relative to `/First`. Objects inside are always
//! generation 0 and are never individually encrypted.

use crate::error::{Error, Result};
use crate::lexer::{token, Token};
use crate::object::{Dict, Object};
use crate::parser::parse_object_with_limit;

/// Parse a decoded object stream body into `(object number, object)` pairs
/// in stream index order. Members that fail to parse are logged and left out.
pub fn parse_object_stream(
    dict: &Dict,
    decoded: &[u8],
    max_nesting: usize,
) -> Result<Vec<(u32, Object)>> {
    let count = dict
        .get("N")
        .and_then(|o| o.as_integer())
        .filter(|n| *n >= 0)
        .ok_or_else(|| Error::InvalidPdf("object stream without a valid /N".to_string()))?
        as usize;
    let first = dict
        .get("First")
        .and_then(|o| o.as_integer())
        .filter(|f| *f >= 0 && (*f as usize) <= decoded.len())
        .ok_or_else(|| Error::InvalidPdf("object stream without a valid /First".to_string()))?
        as usize;

    let header = &decoded[..first];
    let pairs = parse_pairs(header, count)?;

    let mut objects = Vec::with_capacity(pairs.len());
    for (index, (num, offset)) in pairs.iter().enumerate() {
        let start = first + offset;
        let Some(body) = decoded.get(start..) else {
            log::warn!("Object {} offset {} lies outside its object stream", num, offset);
            continue;
        };
        match parse_object_with_limit(body, max_nesting) {
            Ok((_, obj)) => objects.push((*num, obj)),
            Err(e) => {
                log::warn!("Object {} (index {}) in object stream failed to parse: {:?}", num, index, e)
            },
        }
    }
    Ok(objects)
}

fn parse_pairs(mut header: &[u8], count: usize) -> Result<Vec<(u32, usize)>> {
    let mut pairs = Vec::with_capacity(count.min(100_000));
    for _ in 0..count {
        let (rest, num) = match token(header) {
            Ok((rest, Token::Integer(n))) if n >= 0 => (rest, n as u32),
            _ => break,
        };
        let (rest, offset) = match token(rest) {
            Ok((rest, Token::Integer(o))) if o >= 0 => (rest, o as usize),
            _ => break,
        };
        pairs.push((num, offset));
        header = rest;
    }
    if pairs.len() < count {
        log::warn!("Object stream header lists {} of {} objects", pairs.len(), count);
    }
    Ok(pairs)
}

//! PDF object parser.
//!
//! Builds [`Object`] values from the token stream produced by
//! [`lexer`](crate::lexer). Indirect references are recognized by a
//! two-token lookahead (`N G R`), and a dictionary followed by `stream`
//! becomes a stream object.

use crate::decoders::hex_value;
use crate::lexer::{is_whitespace, skip_ws, token, Token};
use crate::object::{Dict, Object, ObjectRef};
use nom::IResult;

/// Nesting limit used by [`parse_object`].
pub const DEFAULT_MAX_NESTING: usize = 256;

fn fail(input: &[u8], kind: nom::error::ErrorKind) -> nom::Err<nom::error::Error<&[u8]>> {
    nom::Err::Error(nom::error::Error::new(input, kind))
}

/// Decode the escape sequences of a literal string body.
///
/// Handles `\n \r \t \b \f \( \) \\`, octal `\ddd`, line continuations and
/// normalizes bare CR / CRLF line ends to LF.
pub fn decode_literal_string_escapes(raw: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(raw.len());
    let mut i = 0;
    while i < raw.len() {
        let c = raw[i];
        if c == b'\r' {
            out.push(b'\n');
            i += if raw.get(i + 1) == Some(&b'\n') { 2 } else { 1 };
            continue;
        }
        if c != b'\\' {
            out.push(c);
            i += 1;
            continue;
        }
        i += 1;
        let Some(&next) = raw.get(i) else { break };
        match next {
            b'n' => out.push(b'\n'),
            b'r' => out.push(b'\r'),
            b't' => out.push(b'\t'),
            b'b' => out.push(0x08),
            b'f' => out.push(0x0C),
            b'0'..=b'7' => {
                let mut value: u32 = 0;
                let mut digits = 0;
                while digits < 3 && raw.get(i).is_some_and(|d| (b'0'..=b'7').contains(d)) {
                    value = value * 8 + u32::from(raw[i] - b'0');
                    i += 1;
                    digits += 1;
                }
                out.push((value & 0xFF) as u8);
                continue;
            },
            b'\r' => {
                if raw.get(i + 1) == Some(&b'\n') {
                    i += 1;
                }
            },
            b'\n' => {},
            other => out.push(other),
        }
        i += 1;
    }
    out
}

/// Decode a hex string body; whitespace is ignored, odd length padded with 0.
pub fn decode_hex(hex_bytes: &[u8]) -> Vec<u8> {
    let digits: Vec<u8> = hex_bytes.iter().filter_map(|&c| hex_value(c)).collect();
    digits
        .chunks(2)
        .map(|pair| (pair[0] << 4) | pair.get(1).copied().unwrap_or(0))
        .collect()
}

/// Parse one PDF object.
pub fn parse_object(input: &[u8]) -> IResult<&[u8], Object> {
    parse_value(input, 0, DEFAULT_MAX_NESTING)
}

/// Parse one PDF object with an explicit nesting limit.
pub fn parse_object_with_limit(input: &[u8], max_nesting: usize) -> IResult<&[u8], Object> {
    parse_value(input, 0, max_nesting)
}

fn parse_value(input: &[u8], depth: usize, max: usize) -> IResult<&[u8], Object> {
    if depth > max {
        return Err(nom::Err::Failure(nom::error::Error::new(
            input,
            nom::error::ErrorKind::TooLarge,
        )));
    }
    let (rest, tok) = token(input)?;
    match tok {
        Token::Integer(num) => {
            if let Some((after, r)) = reference_tail(rest, num) {
                return Ok((after, Object::Reference(r)));
            }
            Ok((rest, Object::Integer(num)))
        },
        Token::Real(v) => Ok((rest, Object::Real(v))),
        Token::LiteralString(raw) => Ok((rest, Object::String(decode_literal_string_escapes(raw)))),
        Token::HexString(raw) => Ok((rest, Object::String(decode_hex(raw)))),
        Token::Name(name) => Ok((rest, Object::Name(name))),
        Token::True => Ok((rest, Object::Boolean(true))),
        Token::False => Ok((rest, Object::Boolean(false))),
        Token::Null => Ok((rest, Object::Null)),
        Token::ArrayStart => parse_array_body(rest, depth, max),
        Token::DictStart => {
            let (rest, dict) = parse_dict_body(rest, depth, max)?;
            match token(rest) {
                Ok((after, Token::StreamStart)) => {
                    let (after, data) = parse_stream_data(after, &dict)?;
                    Ok((after, Object::Stream { dict, data }))
                },
                _ => Ok((rest, Object::Dictionary(dict))),
            }
        },
        _ => Err(fail(input, nom::error::ErrorKind::Alt)),
    }
}

/// `G R` following an integer that could be an object number.
fn reference_tail(input: &[u8], num: i64) -> Option<(&[u8], ObjectRef)> {
    let num = u32::try_from(num).ok()?;
    let (rest, gen) = match token(input).ok()? {
        (rest, Token::Integer(g)) => (rest, u16::try_from(g).ok()?),
        _ => return None,
    };
    match token(rest).ok()? {
        (after, Token::R) => Some((after, ObjectRef::new(num, gen))),
        _ => None,
    }
}

fn parse_array_body(mut input: &[u8], depth: usize, max: usize) -> IResult<&[u8], Object> {
    let mut items = Vec::new();
    loop {
        let trimmed = skip_ws(input);
        if trimmed.is_empty() {
            log::warn!("Array not terminated before end of data");
            return Ok((trimmed, Object::Array(items)));
        }
        if trimmed[0] == b']' {
            return Ok((&trimmed[1..], Object::Array(items)));
        }
        match parse_value(trimmed, depth + 1, max) {
            Ok((rest, obj)) => {
                items.push(obj);
                input = rest;
            },
            Err(nom::Err::Failure(e)) => return Err(nom::Err::Failure(e)),
            Err(_) => match token(trimmed)? {
                (_, Token::ObjEnd | Token::StreamStart | Token::StreamEnd) => {
                    log::warn!("Array not terminated before object end");
                    return Ok((trimmed, Object::Array(items)));
                },
                // unexpected keyword inside an array: skip it
                (rest, _) => input = rest,
            },
        }
    }
}

fn parse_dict_body(mut input: &[u8], depth: usize, max: usize) -> IResult<&[u8], Dict> {
    let mut dict = Dict::new();
    loop {
        let (rest, tok) = match token(input) {
            Ok(v) => v,
            Err(_) if skip_ws(input).is_empty() => {
                log::warn!("Dictionary not terminated before end of data");
                return Ok((skip_ws(input), dict));
            },
            Err(e) => return Err(e),
        };
        match tok {
            Token::DictEnd => return Ok((rest, dict)),
            Token::Name(key) => {
                let value_start = skip_ws(rest);
                if value_start.starts_with(b">>") {
                    // key without a value
                    dict.insert(key, Object::Null);
                    input = value_start;
                    continue;
                }
                let (rest, value) = parse_value(value_start, depth + 1, max)?;
                dict.insert(key, value);
                input = rest;
            },
            Token::ObjEnd | Token::StreamEnd => {
                log::warn!("Dictionary not terminated before object end");
                return Ok((input, dict));
            },
            _ => {
                log::warn!("Skipping non-name dictionary key");
                input = rest;
            },
        }
    }
}

/// Stream body after the `stream` keyword.
///
/// A direct `/Length` is trusted only when `endstream` follows it;
/// otherwise the data runs to the next `endstream` keyword.
fn parse_stream_data<'a>(input: &'a [u8], dict: &Dict) -> IResult<&'a [u8], bytes::Bytes> {
    let input = if input.starts_with(b"\r\n") {
        &input[2..]
    } else if input.starts_with(b"\n") || input.starts_with(b"\r") {
        &input[1..]
    } else {
        input
    };

    if let Some(length) = dict.get("Length").and_then(|o| o.as_integer()) {
        if length >= 0 && (length as usize) <= input.len() {
            let length = length as usize;
            if let Ok((rest, Token::StreamEnd)) = token(&input[length..]) {
                return Ok((rest, bytes::Bytes::copy_from_slice(&input[..length])));
            }
            log::warn!("Stream /Length {} does not end at endstream; scanning", length);
        }
    }

    let pos = find_keyword(input, b"endstream").ok_or_else(|| fail(input, nom::error::ErrorKind::Eof))?;
    let mut end = pos;
    if end > 0 && input[end - 1] == b'\n' {
        end -= 1;
    }
    if end > 0 && input[end - 1] == b'\r' {
        end -= 1;
    }
    let rest = &input[pos + b"endstream".len()..];
    Ok((rest, bytes::Bytes::copy_from_slice(&input[..end])))
}

/// Position of `keyword` in `haystack`.
pub fn find_keyword(haystack: &[u8], keyword: &[u8]) -> Option<usize> {
    haystack.windows(keyword.len()).position(|w| w == keyword)
}

/// Parse `N G obj <object> [endobj]` at the start of `input`.
pub fn parse_indirect_object(
    input: &[u8],
    max_nesting: usize,
) -> IResult<&[u8], (ObjectRef, Object)> {
    let (rest, num) = match token(input)? {
        (rest, Token::Integer(n)) if n >= 0 => (rest, n),
        _ => return Err(fail(input, nom::error::ErrorKind::Digit)),
    };
    let (rest, gen) = match token(rest)? {
        (rest, Token::Integer(g)) if (0..=65535).contains(&g) => (rest, g),
        _ => return Err(fail(input, nom::error::ErrorKind::Digit)),
    };
    let (rest, _) = match token(rest)? {
        (rest, Token::ObjStart) => (rest, ()),
        _ => return Err(fail(input, nom::error::ErrorKind::Tag)),
    };
    let id = ObjectRef::new(
        u32::try_from(num).map_err(|_| fail(input, nom::error::ErrorKind::Digit))?,
        gen as u16,
    );

    // `N G obj endobj` is an empty (null) object
    let (rest, object) = match token(rest) {
        Ok((after, Token::ObjEnd)) => return Ok((after, (id, Object::Null))),
        _ => parse_object_with_limit(rest, max_nesting)?,
    };
    let rest = match token(rest) {
        Ok((after, Token::ObjEnd)) => after,
        _ => rest,
    };
    Ok((rest, (id, object)))
}

/// True if `data[pos..]` starts a `N G obj` header for `num`.
pub fn object_header_matches(data: &[u8], pos: usize, num: u32) -> bool {
    let Some(slice) = data.get(pos..) else {
        return false;
    };
    let slice = &slice[slice.iter().take_while(|&&c| is_whitespace(c)).count()..];
    let Ok((rest, Token::Integer(n))) = token(slice) else {
        return false;
    };
    if n != i64::from(num) {
        return false;
    }
    let Ok((rest, Token::Integer(_))) = token(rest) else {
        return false;
    };
    matches!(token(rest), Ok((_, Token::ObjStart)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(input: &[u8]) -> Object {
        parse_object(input).unwrap().1
    }

    #[test]
    fn test_parse_reference() {
        assert_eq!(parse(b"10 0 R"), Object::Reference(ObjectRef::new(10, 0)));
    }

    #[test]
    fn test_integers_not_reference() {
        let (rest, obj) = parse_object(b"1 0 0 RG").unwrap();
        assert_eq!(obj, Object::Integer(1));
        let (_, second) = parse_object(rest).unwrap();
        assert_eq!(second, Object::Integer(0));
    }

    #[test]
    fn test_parse_dictionary_with_nested_array() {
        let obj = parse(b"<< /Type /Page /MediaBox [0 0 612 792] /Parent 2 0 R >>");
        let dict = obj.as_dict().unwrap();
        assert_eq!(dict.get("Type").and_then(|o| o.as_name()), Some("Page"));
        assert_eq!(dict.get("MediaBox").and_then(|o| o.as_rect()), Some([0.0, 0.0, 612.0, 792.0]));
        assert_eq!(dict.get("Parent").and_then(|o| o.as_reference()), Some(ObjectRef::new(2, 0)));
    }

    #[test]
    fn test_literal_string_escapes() {
        assert_eq!(decode_literal_string_escapes(br"a\(b\)\n\101"), b"a(b)\nA");
        assert_eq!(decode_literal_string_escapes(b"line\\\ncont"), b"linecont");
    }

    #[test]
    fn test_hex_string_odd() {
        assert_eq!(parse(b"<414>"), Object::String(vec![0x41, 0x40]));
    }

    #[test]
    fn test_stream_with_direct_length() {
        let (_, obj) = parse_object(b"<< /Length 5 >>\nstream\nhello\nendstream").unwrap();
        match obj {
            Object::Stream { data, .. } => assert_eq!(&data[..], b"hello"),
            other => panic!("expected stream, got {:?}", other),
        }
    }

    #[test]
    fn test_stream_with_wrong_length_scans() {
        let (_, obj) = parse_object(b"<< /Length 99 >>\nstream\r\nabc\r\nendstream").unwrap();
        match obj {
            Object::Stream { data, .. } => assert_eq!(&data[..], b"abc"),
            other => panic!("expected stream, got {:?}", other),
        }
    }

    #[test]
    fn test_stream_with_indirect_length_scans() {
        let (_, obj) = parse_object(b"<< /Length 8 0 R >>\nstream\nxyz\nendstream").unwrap();
        match obj {
            Object::Stream { data, .. } => assert_eq!(&data[..], b"xyz"),
            other => panic!("expected stream, got {:?}", other),
        }
    }

    #[test]
    fn test_indirect_object() {
        let (_, (id, obj)) = parse_indirect_object(b"7 0 obj\n<< /A 1 >>\nendobj", 64).unwrap();
        assert_eq!(id, ObjectRef::new(7, 0));
        assert!(obj.as_dict().is_some());
    }

    #[test]
    fn test_nesting_limit() {
        let deep = "[".repeat(20) + &"]".repeat(20);
        assert!(parse_object_with_limit(deep.as_bytes(), 5).is_err());
        assert!(parse_object_with_limit(deep.as_bytes(), 50).is_ok());
    }

    #[test]
    fn test_object_header_matches() {
        let data = b"junk\n12 0 obj << >> endobj";
        assert!(object_header_matches(data, 4, 12));
        assert!(!object_header_matches(data, 4, 13));
        assert!(!object_header_matches(data, 999, 12));
    }
}

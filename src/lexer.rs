//! PDF lexer (tokenizer).
//!
//! Recognizes numbers, literal and hex strings, names, the fixed keywords
//! and delimiters. Whitespace and `%` comments between tokens are skipped.
//! Keywords must end at a delimiter, so `RG` is never read as `R`.

use crate::decoders::hex_value;
use nom::{
    branch::alt,
    bytes::complete::{tag, take_till, take_while},
    character::complete::{char, digit1, one_of},
    combinator::{map, opt, recognize},
    sequence::{pair, preceded},
    IResult,
};

/// Token types recognized by the PDF lexer.
#[derive(Debug, PartialEq, Clone)]
pub enum Token<'a> {
    /// Integer number
    Integer(i64),
    /// Real number
    Real(f64),
    /// Raw literal string body, escapes not yet decoded
    LiteralString(&'a [u8]),
    /// Raw hex string body, whitespace included
    HexString(&'a [u8]),
    /// Name with `#XX` escapes decoded
    Name(String),
    /// `true`
    True,
    /// `false`
    False,
    /// `null`
    Null,
    /// `[`
    ArrayStart,
    /// `]`
    ArrayEnd,
    /// `<<`
    DictStart,
    /// `>>`
    DictEnd,
    /// `obj`
    ObjStart,
    /// `endobj`
    ObjEnd,
    /// `stream`
    StreamStart,
    /// `endstream`
    StreamEnd,
    /// `R`
    R,
    /// Any other bare word (content operators, `xref`, `trailer`, ...)
    Keyword(&'a [u8]),
}

/// PDF whitespace characters.
pub fn is_whitespace(c: u8) -> bool {
    matches!(c, b' ' | b'\t' | b'\r' | b'\n' | 0x00 | 0x0C)
}

/// PDF delimiter characters.
pub fn is_delimiter(c: u8) -> bool {
    matches!(c, b'(' | b')' | b'<' | b'>' | b'[' | b']' | b'{' | b'}' | b'/' | b'%')
}

/// Regular characters: neither whitespace nor delimiter.
pub fn is_regular(c: u8) -> bool {
    !is_whitespace(c) && !is_delimiter(c)
}

fn comment(input: &[u8]) -> IResult<&[u8], &[u8]> {
    preceded(char('%'), take_till(|c| c == b'\r' || c == b'\n'))(input)
}

/// Skip any run of whitespace and comments.
pub fn skip_ws(mut input: &[u8]) -> &[u8] {
    loop {
        let (rest, ws) = take_while::<_, _, nom::error::Error<&[u8]>>(is_whitespace)(input)
            .unwrap_or((input, &[]));
        input = rest;
        match comment(input) {
            Ok((rest, _)) => input = rest,
            Err(_) if ws.is_empty() => return input,
            Err(_) => {},
        }
    }
}

fn fail(input: &[u8], kind: nom::error::ErrorKind) -> nom::Err<nom::error::Error<&[u8]>> {
    nom::Err::Error(nom::error::Error::new(input, kind))
}

fn parse_number(input: &[u8]) -> IResult<&[u8], Token<'_>> {
    let (rest, text) = recognize(pair(
        opt(one_of("+-")),
        alt((
            recognize(pair(digit1, opt(pair(char('.'), opt(digit1))))),
            recognize(pair(char('.'), digit1)),
        )),
    ))(input)?;
    if rest.first().is_some_and(|c| c.is_ascii_alphabetic()) {
        return Err(fail(input, nom::error::ErrorKind::Digit));
    }
    let s = std::str::from_utf8(text).map_err(|_| fail(input, nom::error::ErrorKind::Digit))?;
    if s.contains('.') {
        let value = s
            .parse::<f64>()
            .map_err(|_| fail(input, nom::error::ErrorKind::Float))?;
        Ok((rest, Token::Real(value)))
    } else {
        match s.parse::<i64>() {
            Ok(v) => Ok((rest, Token::Integer(v))),
            // out-of-range integers degrade to reals
            Err(_) => s
                .parse::<f64>()
                .map(|v| (rest, Token::Real(v)))
                .map_err(|_| fail(input, nom::error::ErrorKind::Digit)),
        }
    }
}

fn parse_literal_string(input: &[u8]) -> IResult<&[u8], Token<'_>> {
    let (body, _) = char('(')(input)?;
    let mut depth = 1usize;
    let mut pos = 0;
    while pos < body.len() {
        match body[pos] {
            b'\\' => pos += 2,
            b'(' => {
                depth += 1;
                pos += 1;
            },
            b')' => {
                depth -= 1;
                if depth == 0 {
                    return Ok((&body[pos + 1..], Token::LiteralString(&body[..pos])));
                }
                pos += 1;
            },
            _ => pos += 1,
        }
    }
    Err(fail(input, nom::error::ErrorKind::Eof))
}

fn parse_hex_string(input: &[u8]) -> IResult<&[u8], Token<'_>> {
    if input.starts_with(b"<<") {
        return Err(fail(input, nom::error::ErrorKind::Tag));
    }
    let (rest, _) = char('<')(input)?;
    let (rest, body) = take_while(|c: u8| c.is_ascii_hexdigit() || is_whitespace(c))(rest)?;
    let (rest, _) = char('>')(rest)?;
    Ok((rest, Token::HexString(body)))
}

/// Decode `#XX` escapes in a raw name.
///
/// ```
/// # use pdf_engine::lexer::decode_name_escapes;
/// assert_eq!(decode_name_escapes(b"A#20B#23C"), "A B#C");
/// assert_eq!(decode_name_escapes(b"A#"), "A#");
/// ```
pub fn decode_name_escapes(raw: &[u8]) -> String {
    let mut out = Vec::with_capacity(raw.len());
    let mut i = 0;
    while i < raw.len() {
        if raw[i] == b'#' && i + 2 < raw.len() {
            let hi = hex_value(raw[i + 1]);
            let lo = hex_value(raw[i + 2]);
            if let (Some(hi), Some(lo)) = (hi, lo) {
                out.push((hi << 4) | lo);
                i += 3;
                continue;
            }
        }
        out.push(raw[i]);
        i += 1;
    }
    String::from_utf8(out).unwrap_or_else(|e| e.into_bytes().iter().map(|&b| b as char).collect())
}

fn parse_name(input: &[u8]) -> IResult<&[u8], Token<'_>> {
    let (rest, raw) = preceded(char('/'), take_while(is_regular))(input)?;
    Ok((rest, Token::Name(decode_name_escapes(raw))))
}

fn parse_delimiter(input: &[u8]) -> IResult<&[u8], Token<'_>> {
    alt((
        map(tag("<<"), |_| Token::DictStart),
        map(tag(">>"), |_| Token::DictEnd),
        map(char('['), |_| Token::ArrayStart),
        map(char(']'), |_| Token::ArrayEnd),
    ))(input)
}

fn parse_keyword(input: &[u8]) -> IResult<&[u8], Token<'_>> {
    let (rest, word) = take_while(is_regular)(input)?;
    if word.is_empty() {
        return Err(fail(input, nom::error::ErrorKind::Tag));
    }
    let token = match word {
        b"true" => Token::True,
        b"false" => Token::False,
        b"null" => Token::Null,
        b"obj" => Token::ObjStart,
        b"endobj" => Token::ObjEnd,
        b"stream" => Token::StreamStart,
        b"endstream" => Token::StreamEnd,
        b"R" => Token::R,
        other => Token::Keyword(other),
    };
    Ok((rest, token))
}

/// Parse a single token, skipping leading whitespace and comments.
pub fn token(input: &[u8]) -> IResult<&[u8], Token<'_>> {
    let input = skip_ws(input);
    alt((
        parse_delimiter,
        parse_hex_string,
        parse_literal_string,
        parse_name,
        parse_number,
        parse_keyword,
    ))(input)
}

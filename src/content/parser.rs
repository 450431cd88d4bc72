//! Content stream parser.
//!
//! Content streams use postfix notation: operands come first, then the
//! operator keyword.
//!
//! ```text
//! BT
//!   /F1 12 Tf
//!   100 700 Td
//!   (Hello, World!) Tj
//! ET
//! ```
//!
//! Parsing is forgiving. A byte sequence that is neither an operand nor
//! an operator is skipped so that one bad token does not lose the rest of
//! the page.

use crate::content::operators::Operator;
use crate::error::Result;
use crate::lexer::{is_delimiter, is_whitespace, skip_ws, token, Token};
use crate::object::Dict;
use crate::parser::parse_object;

/// Parse a decoded content stream into its operators.
///
/// ```
/// use pdf_engine::content::{parse_content_stream, Operator};
///
/// let ops = parse_content_stream(b"BT /F1 12 Tf 100 700 Td (Hello) Tj ET").unwrap();
/// assert_eq!(ops.len(), 5);
/// assert!(matches!(ops[3], Operator::Tj { .. }));
/// ```
pub fn parse_content_stream(data: &[u8]) -> Result<Vec<Operator>> {
    let mut operators = Vec::new();
    let mut operands = Vec::new();
    let mut input = data;

    loop {
        input = skip_ws(input);
        if input.is_empty() {
            break;
        }

        match token(input) {
            Ok((rest, Token::Keyword(word))) => {
                if word == b"BI" {
                    operands.clear();
                    match parse_inline_image(rest) {
                        Some((after, op)) => {
                            operators.push(op);
                            input = after;
                        },
                        None => {
                            log::warn!("Unterminated inline image; ignoring rest of content stream");
                            break;
                        },
                    }
                    continue;
                }
                let name = String::from_utf8_lossy(word);
                operators.push(Operator::from_parts(&name, std::mem::take(&mut operands)));
                input = rest;
            },
            Ok((rest, Token::ArrayEnd | Token::DictEnd | Token::R)) => {
                log::debug!("Stray token in content stream");
                input = rest;
            },
            Ok(_) => match parse_object(input) {
                Ok((rest, obj)) => {
                    operands.push(obj);
                    input = rest;
                },
                Err(_) => input = &input[1..],
            },
            Err(_) => input = &input[1..],
        }
    }

    if !operands.is_empty() {
        log::debug!("{} trailing operands without an operator", operands.len());
    }
    Ok(operators)
}

/// `BI <key value>... ID <data> EI`; returns the input after `EI`.
fn parse_inline_image(input: &[u8]) -> Option<(&[u8], Operator)> {
    let mut dict = Dict::new();
    let mut remaining = input;

    loop {
        remaining = skip_ws(remaining);
        if remaining.is_empty() {
            return None;
        }
        if remaining.starts_with(b"ID") && remaining.get(2).map_or(true, |&c| is_whitespace(c)) {
            // a single whitespace byte separates ID from the data
            remaining = remaining.get(3..).unwrap_or_default();
            break;
        }
        let (rest, key) = parse_object(remaining).ok()?;
        let (rest, value) = parse_object(rest).ok()?;
        if let Some(key) = key.as_name() {
            dict.insert(key.to_string(), value);
        }
        remaining = rest;
    }

    let end = find_ei(remaining)?;
    let data = remaining[..end].to_vec();
    Some((&remaining[end + 3..], Operator::InlineImage { dict, data }))
}

/// Offset of the whitespace byte before an `EI` that ends at a delimiter.
fn find_ei(input: &[u8]) -> Option<usize> {
    (0..input.len().saturating_sub(2)).find(|&i| {
        is_whitespace(input[i])
            && &input[i + 1..i + 3] == b"EI"
            && input.get(i + 3).map_or(true, |&c| is_whitespace(c) || is_delimiter(c))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content::operators::TextElement;
    use crate::object::Object;

    #[test]
    fn test_parse_simple_text() {
        let ops = parse_content_stream(b"BT /F1 12 Tf 100 700 Td (Hello) Tj ET").unwrap();
        assert_eq!(ops.len(), 5);
        assert!(matches!(ops[0], Operator::BeginText));
        assert!(matches!(ops[1], Operator::Tf { ref font, size } if font == "F1" && size == 12.0));
        assert!(matches!(ops[2], Operator::Td { tx, ty } if tx == 100.0 && ty == 700.0));
        assert_eq!(ops[3], Operator::Tj { text: b"Hello".to_vec() });
        assert!(matches!(ops[4], Operator::EndText));
    }

    #[test]
    fn test_parse_tj_array() {
        let ops = parse_content_stream(b"[(Hello) -100 (World)] TJ").unwrap();
        match &ops[0] {
            Operator::TJ { array } => {
                assert_eq!(array.len(), 3);
                assert_eq!(array[1], TextElement::Offset(-100.0));
            },
            other => panic!("expected TJ, got {:?}", other),
        }
    }

    #[test]
    fn test_consecutive_color_operators() {
        let ops = parse_content_stream(b"1 0 0 rg\n0 1 0 RG").unwrap();
        assert_eq!(ops.len(), 2);
        assert!(matches!(&ops[0], Operator::Other { name, operands } if name == "rg" && operands.len() == 3));
        assert!(matches!(&ops[1], Operator::Other { name, .. } if name == "RG"));
    }

    #[test]
    fn test_graphics_state_and_quotes() {
        let ops = parse_content_stream(b"q 1 0 0 1 50 50 cm Q (A) ' 1 0.5 (B) \" T*").unwrap();
        assert!(matches!(ops[0], Operator::SaveState));
        assert!(matches!(ops[1], Operator::Cm { matrix } if matrix[4] == 50.0));
        assert!(matches!(ops[2], Operator::RestoreState));
        assert!(matches!(ops[3], Operator::Quote { .. }));
        assert!(matches!(ops[4], Operator::DoubleQuote { word_space, .. } if word_space == 1.0));
        assert!(matches!(ops[5], Operator::TStar));
    }

    #[test]
    fn test_inline_image_skipped() {
        let ops = parse_content_stream(b"q BI /W 2 /H 1 /CS /G /BPC 8 ID \x00\xFF EI Q (after) Tj").unwrap();
        assert!(matches!(ops[0], Operator::SaveState));
        match &ops[1] {
            Operator::InlineImage { dict, data } => {
                assert_eq!(dict.get("W"), Some(&Object::Integer(2)));
                assert_eq!(data, &vec![0x00, 0xFF]);
            },
            other => panic!("expected inline image, got {:?}", other),
        }
        assert!(matches!(ops[2], Operator::RestoreState));
        assert_eq!(ops[3], Operator::Tj { text: b"after".to_vec() });
    }

    #[test]
    fn test_booleans_and_comments() {
        let ops = parse_content_stream(b"% comment\n/P <</MCID 0>> BDC true null x EMC").unwrap();
        assert!(matches!(&ops[0], Operator::Other { name, operands } if name == "BDC" && operands.len() == 2));
        assert!(
            matches!(&ops[1], Operator::Other { name, operands } if name == "x" && operands == &vec![Object::Boolean(true), Object::Null])
        );
        assert!(matches!(&ops[2], Operator::Other { name, .. } if name == "EMC"));
    }

    #[test]
    fn test_empty_and_garbage() {
        assert!(parse_content_stream(b"").unwrap().is_empty());
        assert!(parse_content_stream(b"   \n\t ").unwrap().is_empty());
        let ops = parse_content_stream(b") (ok) Tj").unwrap();
        assert_eq!(ops, vec![Operator::Tj { text: b"ok".to_vec() }]);
    }
}

//! Content stream operators.
//!
//! Only the operators that text extraction and overlay composition look
//! at get their own variant; everything else is kept as [`Operator::Other`]
//! with its raw operands.

use crate::object::{Dict, Object};

/// A content stream operator.
#[derive(Debug, Clone, PartialEq)]
pub enum Operator {
    /// Begin text object (BT)
    BeginText,
    /// End text object (ET)
    EndText,
    /// Move text position (Td)
    Td {
        /// Horizontal offset
        tx: f64,
        /// Vertical offset
        ty: f64,
    },
    /// Move text position and set leading (TD)
    TD {
        /// Horizontal offset
        tx: f64,
        /// Vertical offset
        ty: f64,
    },
    /// Set text matrix (Tm)
    Tm {
        /// Matrix `[a b c d e f]`
        matrix: [f64; 6],
    },
    /// Move to start of next line (T*)
    TStar,
    /// Set text leading (TL)
    TL {
        /// Leading
        leading: f64,
    },
    /// Set font and size (Tf)
    Tf {
        /// Font resource name
        font: String,
        /// Font size
        size: f64,
    },
    /// Show text string (Tj)
    Tj {
        /// Encoded text
        text: Vec<u8>,
    },
    /// Show text with individual glyph positioning (TJ)
    TJ {
        /// Strings and positioning adjustments
        array: Vec<TextElement>,
    },
    /// Move to next line and show text (')
    Quote {
        /// Encoded text
        text: Vec<u8>,
    },
    /// Set spacing, move to next line and show text (")
    DoubleQuote {
        /// Word spacing
        word_space: f64,
        /// Character spacing
        char_space: f64,
        /// Encoded text
        text: Vec<u8>,
    },
    /// Save graphics state (q)
    SaveState,
    /// Restore graphics state (Q)
    RestoreState,
    /// Concatenate matrix (cm)
    Cm {
        /// Matrix `[a b c d e f]`
        matrix: [f64; 6],
    },
    /// Paint an XObject (Do)
    Do {
        /// XObject resource name
        name: String,
    },
    /// Inline image (BI ... ID ... EI)
    InlineImage {
        /// Image dictionary with abbreviated keys
        dict: Dict,
        /// Raw image data
        data: Vec<u8>,
    },
    /// Any other operator
    Other {
        /// Operator name
        name: String,
        /// Operands
        operands: Vec<Object>,
    },
}

/// Element in a TJ array.
#[derive(Debug, Clone, PartialEq)]
pub enum TextElement {
    /// Text string to show
    String(Vec<u8>),
    /// Positioning adjustment in thousandths of text space
    Offset(f64),
}

impl Operator {
    /// Build a typed operator from its name and operands.
    pub fn from_parts(name: &str, operands: Vec<Object>) -> Self {
        let num = |i: usize, default: f64| operands.get(i).and_then(|o| o.as_number()).unwrap_or(default);
        let string = |i: usize| {
            operands
                .get(i)
                .and_then(|o| o.as_string())
                .map(|s| s.to_vec())
                .unwrap_or_default()
        };
        let matrix = || {
            [
                num(0, 1.0),
                num(1, 0.0),
                num(2, 0.0),
                num(3, 1.0),
                num(4, 0.0),
                num(5, 0.0),
            ]
        };
        let name_at = |i: usize| {
            operands
                .get(i)
                .and_then(|o| o.as_name())
                .unwrap_or_default()
                .to_string()
        };

        match name {
            "BT" => Operator::BeginText,
            "ET" => Operator::EndText,
            "Td" => Operator::Td {
                tx: num(0, 0.0),
                ty: num(1, 0.0),
            },
            "TD" => Operator::TD {
                tx: num(0, 0.0),
                ty: num(1, 0.0),
            },
            "Tm" => Operator::Tm { matrix: matrix() },
            "T*" => Operator::TStar,
            "TL" => Operator::TL {
                leading: num(0, 0.0),
            },
            "Tf" => Operator::Tf {
                font: name_at(0),
                size: num(1, 12.0),
            },
            "Tj" => Operator::Tj { text: string(0) },
            "'" => Operator::Quote { text: string(0) },
            "\"" => Operator::DoubleQuote {
                word_space: num(0, 0.0),
                char_space: num(1, 0.0),
                text: string(2),
            },
            "TJ" => {
                let array = operands
                    .first()
                    .and_then(|o| o.as_array())
                    .map(|items| {
                        items
                            .iter()
                            .filter_map(|item| match item {
                                Object::String(s) => Some(TextElement::String(s.clone())),
                                other => other.as_number().map(TextElement::Offset),
                            })
                            .collect()
                    })
                    .unwrap_or_default();
                Operator::TJ { array }
            },
            "q" => Operator::SaveState,
            "Q" => Operator::RestoreState,
            "cm" => Operator::Cm { matrix: matrix() },
            "Do" => Operator::Do { name: name_at(0) },
            _ => Operator::Other {
                name: name.to_string(),
                operands,
            },
        }
    }

    /// True for operators that show text.
    pub fn shows_text(&self) -> bool {
        matches!(
            self,
            Operator::Tj { .. } | Operator::TJ { .. } | Operator::Quote { .. } | Operator::DoubleQuote { .. }
        )
    }
}

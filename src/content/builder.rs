//! Content stream builder.
//!
//! Emits the small set of operators needed for text overlays. Text uses
//! the standard Helvetica font, encoded as single bytes.

use crate::error::Result;
use crate::writer::format_number;
use std::io::Write;

/// Helvetica advance widths for codes 32..=126, in 1/1000 em.
const HELVETICA_WIDTHS: [u16; 95] = [
    278, 278, 355, 556, 556, 889, 667, 191, 333, 333, 389, 584, 278, 333, 278, 278, // ' '../
    556, 556, 556, 556, 556, 556, 556, 556, 556, 556, // 0..9
    278, 278, 584, 584, 584, 556, 1015, // :..@
    667, 667, 722, 722, 667, 611, 778, 722, 278, 500, 667, 556, 833, // A..M
    722, 778, 667, 778, 722, 667, 611, 722, 667, 944, 667, 667, 611, // N..Z
    278, 278, 278, 469, 556, 333, // [..`
    556, 556, 500, 556, 556, 278, 556, 556, 222, 222, 500, 222, 833, // a..m
    556, 556, 556, 556, 333, 500, 278, 556, 500, 722, 500, 500, 500, // n..z
    334, 260, 334, 584, // {..~
];

/// Width of glyphs outside the printable ASCII table.
const DEFAULT_WIDTH: u16 = 556;

/// Width of `text` set in Helvetica at `size` points.
pub fn helvetica_width(text: &str, size: f64) -> f64 {
    let units: u32 = text
        .chars()
        .map(|c| match c as u32 {
            code @ 32..=126 => HELVETICA_WIDTHS[(code - 32) as usize] as u32,
            _ => DEFAULT_WIDTH as u32,
        })
        .sum();
    units as f64 * size / 1000.0
}

/// Encode text for a simple font: Latin-1 bytes, `?` for anything else.
pub fn encode_simple(text: &str) -> Vec<u8> {
    text.chars()
        .map(|c| u8::try_from(c as u32).unwrap_or(b'?'))
        .collect()
}

/// Operations that can be added to a content stream.
#[derive(Debug, Clone, PartialEq)]
pub enum ContentStreamOp {
    /// Save graphics state (q)
    SaveState,
    /// Restore graphics state (Q)
    RestoreState,
    /// Concatenate matrix (cm)
    Transform([f64; 6]),
    /// Set extended graphics state (gs)
    SetExtGState(String),
    /// Set fill colour RGB (rg)
    SetFillRgb(f64, f64, f64),
    /// Begin text object (BT)
    BeginText,
    /// End text object (ET)
    EndText,
    /// Set font and size (Tf)
    SetFont(String, f64),
    /// Move text position (Td)
    MoveText(f64, f64),
    /// Set text matrix (Tm)
    SetTextMatrix([f64; 6]),
    /// Show text (Tj), already encoded
    ShowText(Vec<u8>),
}

/// Accumulates operators and serializes them as a content stream.
#[derive(Debug, Clone, Default)]
pub struct ContentStreamBuilder {
    operations: Vec<ContentStreamOp>,
}

impl ContentStreamBuilder {
    /// Create an empty builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a raw operation.
    pub fn op(&mut self, op: ContentStreamOp) -> &mut Self {
        self.operations.push(op);
        self
    }

    /// q
    pub fn save_state(&mut self) -> &mut Self {
        self.op(ContentStreamOp::SaveState)
    }

    /// Q
    pub fn restore_state(&mut self) -> &mut Self {
        self.op(ContentStreamOp::RestoreState)
    }

    /// cm
    pub fn transform(&mut self, matrix: [f64; 6]) -> &mut Self {
        self.op(ContentStreamOp::Transform(matrix))
    }

    /// gs
    pub fn set_ext_gstate(&mut self, name: &str) -> &mut Self {
        self.op(ContentStreamOp::SetExtGState(name.to_string()))
    }

    /// rg; components in 0..=1
    pub fn set_fill_rgb(&mut self, r: f64, g: f64, b: f64) -> &mut Self {
        self.op(ContentStreamOp::SetFillRgb(r, g, b))
    }

    /// BT
    pub fn begin_text(&mut self) -> &mut Self {
        self.op(ContentStreamOp::BeginText)
    }

    /// ET
    pub fn end_text(&mut self) -> &mut Self {
        self.op(ContentStreamOp::EndText)
    }

    /// Tf
    pub fn set_font(&mut self, resource_name: &str, size: f64) -> &mut Self {
        self.op(ContentStreamOp::SetFont(resource_name.to_string(), size))
    }

    /// Td
    pub fn move_text(&mut self, tx: f64, ty: f64) -> &mut Self {
        self.op(ContentStreamOp::MoveText(tx, ty))
    }

    /// Tm
    pub fn set_text_matrix(&mut self, matrix: [f64; 6]) -> &mut Self {
        self.op(ContentStreamOp::SetTextMatrix(matrix))
    }

    /// Tj with Latin-1 encoding.
    pub fn show_text(&mut self, text: &str) -> &mut Self {
        self.op(ContentStreamOp::ShowText(encode_simple(text)))
    }

    /// True when no operation was added.
    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    /// Serialize, one operator per line.
    pub fn build(&self) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        for op in &self.operations {
            write_op(&mut buf, op)?;
            buf.push(b'\n');
        }
        Ok(buf)
    }
}

fn write_matrix<W: Write>(w: &mut W, m: &[f64; 6]) -> std::io::Result<()> {
    for v in m {
        write!(w, "{} ", format_number(*v))?;
    }
    Ok(())
}

fn write_op<W: Write>(w: &mut W, op: &ContentStreamOp) -> std::io::Result<()> {
    match op {
        ContentStreamOp::SaveState => write!(w, "q"),
        ContentStreamOp::RestoreState => write!(w, "Q"),
        ContentStreamOp::Transform(m) => {
            write_matrix(w, m)?;
            write!(w, "cm")
        },
        ContentStreamOp::SetExtGState(name) => write!(w, "/{} gs", name),
        ContentStreamOp::SetFillRgb(r, g, b) => write!(
            w,
            "{} {} {} rg",
            format_number(*r),
            format_number(*g),
            format_number(*b)
        ),
        ContentStreamOp::BeginText => write!(w, "BT"),
        ContentStreamOp::EndText => write!(w, "ET"),
        ContentStreamOp::SetFont(name, size) => write!(w, "/{} {} Tf", name, format_number(*size)),
        ContentStreamOp::MoveText(tx, ty) => {
            write!(w, "{} {} Td", format_number(*tx), format_number(*ty))
        },
        ContentStreamOp::SetTextMatrix(m) => {
            write_matrix(w, m)?;
            write!(w, "Tm")
        },
        ContentStreamOp::ShowText(bytes) => {
            w.write_all(b"(")?;
            for &b in bytes {
                if matches!(b, b'(' | b')' | b'\\') {
                    w.write_all(&[b'\\'])?;
                }
                w.write_all(&[b])?;
            }
            w.write_all(b") Tj")
        },
    }
}

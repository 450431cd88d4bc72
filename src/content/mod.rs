//! Content stream parsing and building.
//!
//! Pages describe their appearance with a postfix operator language.
//! [`parse_content_stream`] reads it for text extraction, and
//! [`ContentStreamBuilder`] writes the overlays used by watermarking and
//! text insertion.

pub mod builder;
pub mod cmap;
pub mod operators;
pub mod parser;

pub use builder::{helvetica_width, ContentStreamBuilder, ContentStreamOp};
pub use cmap::ToUnicode;
pub use operators::{Operator, TextElement};
pub use parser::parse_content_stream;

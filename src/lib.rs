#![allow(clippy::too_many_arguments)]
#![allow(clippy::enum_variant_names)]
#![allow(clippy::should_implement_trait)]
#![allow(clippy::match_like_matches_macro)]

//! # pdf_engine
//!
//! A PDF manipulation engine: parse a document into an object arena, edit
//! its page tree and content, and serialize it back with a fresh
//! cross-reference table.
//!
//! ## Layers
//!
//! - **Object store** ([`document::Document`]): parses the file, recovering
//!   from stale or missing cross-reference data by scanning, and holds
//!   every indirect object addressed by `(number, generation)`. Streams are
//!   decoded lazily and cached.
//! - **Page tree** ([`page_tree`]): ordered page traversal, inherited
//!   attributes and structural edits.
//! - **Operators** ([`ops`]): merge, split, extract, delete, rotate,
//!   watermark, text insertion, encryption, compression and text
//!   extraction.
//! - **Serializer** ([`writer::serialize`]): reachability sweep, object
//!   emission, cross-reference table and trailer, encryption on output.
//! - **Engine** ([`engine::Engine`]): document handles, the per-call state
//!   machine, atomic output files and the batch pool.
//!
//! ## Quick start
//!
//! ```
//! use pdf_engine::document::Document;
//! use pdf_engine::ops::{self, PageSelection};
//! use pdf_engine::progress::Monitor;
//! use pdf_engine::writer::{serialize, DocumentBuilder, SerializeOptions};
//!
//! # fn main() -> pdf_engine::Result<()> {
//! let mut builder = DocumentBuilder::new();
//! for n in 1..=3 {
//!     builder.letter_page().text(&format!("Page {}", n)).done();
//! }
//! let mut doc = Document::parse(&builder.build()?)?;
//!
//! ops::delete_pages(&mut doc, &[0], &Monitor::new())?;
//! ops::rotate(&mut doc, &PageSelection::All, 90, &Monitor::new())?;
//!
//! let text: Vec<String> = ops::extract_text(&doc, &PageSelection::All)?
//!     .map(|page| page.map(|p| p.text))
//!     .collect::<pdf_engine::Result<_>>()?;
//! assert_eq!(text, ["Page 2", "Page 3"]);
//!
//! let bytes = serialize(&doc, &SerializeOptions::default())?;
//! assert!(bytes.starts_with(b"%PDF-"));
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]

// Error handling and configuration
pub mod config;
pub mod error;
pub mod parser_config;

// Object store
pub mod document;
pub mod lexer;
pub mod object;
pub mod objstm;
pub mod parser;
pub mod xref;
pub mod xref_reconstruction;

// Stream decoders
pub mod decoders;

// Encryption support
pub mod encryption;

// Page tree and content
pub mod content;
pub mod page_tree;

// Progress reporting and cancellation
pub mod progress;

// Serialization and document creation
pub mod writer;

// Transform operators
pub mod ops;

// Facade
pub mod engine;

pub use config::EngineConfig;
pub use document::Document;
pub use engine::{DocumentHandle, Engine};
pub use error::{Error, ErrorKind, Result};
pub use object::{Object, ObjectRef};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");

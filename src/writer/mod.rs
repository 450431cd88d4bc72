//! PDF writing.
//!
//! ## Architecture
//!
//! ```text
//! Document
//!     ↓
//! [live_objects] (reachability sweep from the trailer)
//!     ↓
//! [serialize] (header, objects, xref table, trailer)
//!     ↓
//! [ObjectSerializer] (one object, encrypted on the way out)
//!     ↓
//! PDF bytes
//! ```
//!
//! [`DocumentBuilder`] builds new documents page by page on top of this.

mod document_builder;
mod object_serializer;
mod pdf_writer;
mod reachability;

pub use document_builder::{DocumentBuilder, DocumentMetadata, FluentPageBuilder, PageSize};
pub use object_serializer::{format_number, ObjectSerializer};
pub use pdf_writer::{serialize, SerializeOptions};
pub use reachability::live_objects;

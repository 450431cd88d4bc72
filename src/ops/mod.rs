//! Transform operators.
//!
//! Operators edit the object graph of a [`Document`] through the page tree.
//! Those that modify a document in place are transactional: they work on
//! a clone and only replace the caller's document when every step
//! succeeded, so a failure or cancellation never leaves a half-edited
//! document behind. Operators producing new documents (merge, split,
//! extract) leave their inputs untouched.
//!
//! Page indices are 0-based throughout; [`PageSelection::parse`] accepts
//! the 1-based ranges users type.

pub mod compress;
pub mod import;
pub mod overlay;
pub mod pages;
pub mod rotate;
pub mod security;
pub mod selection;
pub mod text;
pub mod watermark;

pub use compress::{compress, CompressOptions, CompressStats};
pub use import::ObjectImporter;
pub use overlay::{insert_text, Layer, TextInsertion};
pub use pages::{delete_pages, extract_pages, keep_pages, merge, move_page, split, split_each_page};
pub use rotate::rotate;
pub use security::{decrypt, encrypt};
pub use selection::PageSelection;
pub use text::{extract_text, PageText, TextPages};
pub use watermark::{watermark, WatermarkConfig, WatermarkPosition};

use crate::document::Document;
use crate::error::Result;

/// Run `edit` on a copy of `doc`, committing the copy only on success.
pub(crate) fn transact<T>(doc: &mut Document, edit: impl FnOnce(&mut Document) -> Result<T>) -> Result<T> {
    doc.ensure_unlocked()?;
    let mut working = doc.clone();
    let out = edit(&mut working)?;
    *doc = working;
    Ok(out)
}

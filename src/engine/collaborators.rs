//! External collaborators the engine delegates to.
//!
//! Rasterizing pages and converting to office formats are not done here.
//! An application plugs implementations into the [`Engine`](super::Engine);
//! without one the corresponding calls fail with `Error::Unsupported`.

use crate::document::Document;
use crate::error::Result;
use image::DynamicImage;

/// Renders a page to pixels.
pub trait RasterRenderer: Send + Sync {
    /// Render page `index` (0-based) of `doc`.
    fn render(&self, doc: &Document, index: usize) -> Result<DynamicImage>;
}

/// Converts serialized PDF bytes to another document format.
pub trait OfficeConverter: Send + Sync {
    /// Convert `pdf` to the format named by `format` (for example `"docx"`).
    fn convert(&self, pdf: &[u8], format: &str) -> Result<Vec<u8>>;
}

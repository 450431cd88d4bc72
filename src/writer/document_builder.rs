//! High-level document builder with fluent API.
//!
//! Builds a [`Document`] page by page with text set in Helvetica. Used for
//! new documents and for fixtures.
//!
//! ```
//! use pdf_engine::writer::{DocumentBuilder, DocumentMetadata, PageSize};
//!
//! let mut builder = DocumentBuilder::new().metadata(DocumentMetadata::new().title("Notes"));
//! builder.page(PageSize::Letter).at(72.0, 720.0).text("Hello").done();
//! let doc = builder.build_document().unwrap();
//! assert_eq!(pdf_engine::page_tree::page_count(&doc).unwrap(), 1);
//! ```

use super::pdf_writer::{serialize, SerializeOptions};
use crate::content::ContentStreamBuilder;
use crate::document::Document;
use crate::error::Result;
use crate::object::{Dict, Object};
use crate::page_tree;
use std::path::Path;

/// Resource name of the builder's font.
const FONT_RESOURCE: &str = "F1";

/// Metadata for a PDF document.
#[derive(Debug, Clone, Default)]
pub struct DocumentMetadata {
    /// Document title
    pub title: Option<String>,
    /// Document author
    pub author: Option<String>,
    /// Document subject
    pub subject: Option<String>,
    /// Document keywords
    pub keywords: Option<String>,
    /// Creator application
    pub creator: Option<String>,
}

impl DocumentMetadata {
    /// Create new empty metadata.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set document title.
    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    /// Set document author.
    pub fn author(mut self, author: impl Into<String>) -> Self {
        self.author = Some(author.into());
        self
    }

    /// Set document subject.
    pub fn subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = Some(subject.into());
        self
    }

    /// Set document keywords.
    pub fn keywords(mut self, keywords: impl Into<String>) -> Self {
        self.keywords = Some(keywords.into());
        self
    }

    /// Set creator application.
    pub fn creator(mut self, creator: impl Into<String>) -> Self {
        self.creator = Some(creator.into());
        self
    }

    fn entries(&self) -> impl Iterator<Item = (&'static str, &String)> {
        [
            ("Title", &self.title),
            ("Author", &self.author),
            ("Subject", &self.subject),
            ("Keywords", &self.keywords),
            ("Creator", &self.creator),
        ]
        .into_iter()
        .filter_map(|(key, value)| value.as_ref().map(|v| (key, v)))
    }
}

/// Standard page sizes.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PageSize {
    /// US Letter (8.5" x 11")
    Letter,
    /// A4 (210mm x 297mm)
    A4,
    /// Legal (8.5" x 14")
    Legal,
    /// A3 (297mm x 420mm)
    A3,
    /// Custom dimensions in points
    Custom(f64, f64),
}

impl PageSize {
    /// Get dimensions in points (1 inch = 72 points).
    pub fn dimensions(&self) -> (f64, f64) {
        match self {
            PageSize::Letter => (612.0, 792.0),
            PageSize::A4 => (595.0, 842.0),
            PageSize::Legal => (612.0, 1008.0),
            PageSize::A3 => (842.0, 1190.0),
            PageSize::Custom(w, h) => (*w, *h),
        }
    }
}

struct TextRun {
    x: f64,
    y: f64,
    size: f64,
    text: String,
}

struct PageData {
    width: f64,
    height: f64,
    runs: Vec<TextRun>,
}

/// Page builder for adding content to a page with fluent API.
pub struct FluentPageBuilder<'a> {
    builder: &'a mut DocumentBuilder,
    page_index: usize,
    cursor_x: f64,
    cursor_y: f64,
    font_size: f64,
    line_height: f64,
}

impl<'a> FluentPageBuilder<'a> {
    /// Font size for subsequent text.
    pub fn font_size(mut self, size: f64) -> Self {
        self.font_size = size;
        self
    }

    /// Set cursor position for text placement.
    pub fn at(mut self, x: f64, y: f64) -> Self {
        self.cursor_x = x;
        self.cursor_y = y;
        self
    }

    /// Add one line of text at the cursor and move the cursor down.
    pub fn text(mut self, text: &str) -> Self {
        self.builder.pages[self.page_index].runs.push(TextRun {
            x: self.cursor_x,
            y: self.cursor_y,
            size: self.font_size,
            text: text.to_string(),
        });
        self.cursor_y -= self.font_size * self.line_height;
        self
    }

    /// Add vertical space.
    pub fn space(mut self, points: f64) -> Self {
        self.cursor_y -= points;
        self
    }

    /// Finish building this page and return to the document builder.
    pub fn done(self) -> &'a mut DocumentBuilder {
        self.builder
    }
}

/// High-level document builder with fluent API.
#[derive(Default)]
pub struct DocumentBuilder {
    metadata: DocumentMetadata,
    pages: Vec<PageData>,
}

impl DocumentBuilder {
    /// Create a new document builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set document metadata.
    pub fn metadata(mut self, metadata: DocumentMetadata) -> Self {
        self.metadata = metadata;
        self
    }

    /// Add a page with the specified size and return a page builder.
    pub fn page(&mut self, size: PageSize) -> FluentPageBuilder<'_> {
        let (width, height) = size.dimensions();
        let page_index = self.pages.len();
        self.pages.push(PageData {
            width,
            height,
            runs: Vec::new(),
        });
        FluentPageBuilder {
            builder: self,
            page_index,
            cursor_x: 72.0,
            cursor_y: height - 72.0,
            font_size: 12.0,
            line_height: 1.2,
        }
    }

    /// Add a Letter-sized page.
    pub fn letter_page(&mut self) -> FluentPageBuilder<'_> {
        self.page(PageSize::Letter)
    }

    /// Add an A4-sized page.
    pub fn a4_page(&mut self) -> FluentPageBuilder<'_> {
        self.page(PageSize::A4)
    }

    /// Build an in-memory document.
    pub fn build_document(&self) -> Result<Document> {
        let mut doc = Document::new();
        for (key, value) in self.metadata.entries() {
            doc.set_info(key, Object::string(value.as_str()));
        }

        let font = (!self.pages.iter().all(|p| p.runs.is_empty())).then(|| {
            let mut font = Dict::new();
            font.insert("Type".to_string(), Object::name("Font"));
            font.insert("Subtype".to_string(), Object::name("Type1"));
            font.insert("BaseFont".to_string(), Object::name("Helvetica"));
            font.insert("Encoding".to_string(), Object::name("WinAnsiEncoding"));
            doc.add_object(Object::Dictionary(font))
        });

        let mut refs = Vec::with_capacity(self.pages.len());
        for page in &self.pages {
            let page_ref = page_tree::new_page(&mut doc, [0.0, 0.0, page.width, page.height]);
            if let (Some(font), false) = (font, page.runs.is_empty()) {
                let mut content = ContentStreamBuilder::new();
                for run in &page.runs {
                    content
                        .begin_text()
                        .set_font(FONT_RESOURCE, run.size)
                        .move_text(run.x, run.y)
                        .show_text(&run.text)
                        .end_text();
                }
                let data = content.build()?;
                let mut fonts = Dict::new();
                fonts.insert(FONT_RESOURCE.to_string(), Object::Reference(font));
                let mut resources = Dict::new();
                resources.insert("Font".to_string(), Object::Dictionary(fonts));

                let page_dict = doc.get_dict_mut(page_ref)?;
                page_dict.insert("Resources".to_string(), Object::Dictionary(resources));
                let contents = page_dict.get("Contents").and_then(|o| o.as_reference());
                if let Some(contents) = contents {
                    doc.put(contents, Object::stream(Dict::new(), data));
                }
            }
            refs.push(page_ref);
        }
        page_tree::append_pages(&mut doc, &refs)?;
        Ok(doc)
    }

    /// Build the PDF document and return the bytes.
    pub fn build(&self) -> Result<Vec<u8>> {
        serialize(&self.build_document()?, &SerializeOptions::default())
    }

    /// Build and save the PDF to a file.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let bytes = self.build()?;
        std::fs::write(path, bytes)?;
        Ok(())
    }
}

//! Engine facade.
//!
//! The [`Engine`] keeps open documents in a registry addressed by
//! [`DocumentHandle`]s and runs one operator per call. Each call walks the
//! [`InvocationState`] machine; the state the last call ended in stays
//! readable through [`Engine::last_state`]. Output files are only written
//! once the whole call has succeeded.
//!
//! ```
//! use pdf_engine::engine::Engine;
//! use pdf_engine::ops::PageSelection;
//! use pdf_engine::writer::DocumentBuilder;
//!
//! let mut builder = DocumentBuilder::new();
//! builder.letter_page().text("Hello").done();
//! let bytes = builder.build().unwrap();
//!
//! let mut engine = Engine::default();
//! let doc = engine.open_bytes(&bytes).unwrap();
//! engine.rotate(doc, &PageSelection::All, 90).unwrap();
//! assert_eq!(engine.page_count(doc).unwrap(), 1);
//! ```

pub mod atomic;
pub mod batch;
pub mod collaborators;
pub mod jobs;
pub mod state;

pub use atomic::{write_atomic, write_atomic_all};
pub use batch::{run_batch, BatchJob, JobOutput};
pub use collaborators::{OfficeConverter, RasterRenderer};
pub use state::{Invocation, InvocationState};

use crate::config::EngineConfig;
use crate::document::Document;
use crate::encryption::EncryptionConfig;
use crate::error::{Error, Result};
use crate::ops::{self, CompressOptions, CompressStats, PageSelection, PageText, TextInsertion, WatermarkConfig};
use crate::page_tree;
use crate::progress::Monitor;
use crate::writer::{serialize, SerializeOptions};
use image::{DynamicImage, ImageFormat};
use std::collections::HashMap;
use std::fmt;
use std::io::Cursor;
use std::path::{Path, PathBuf};

/// Opaque identifier of a document held by an [`Engine`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DocumentHandle(u64);

impl DocumentHandle {
    /// Numeric value, for display.
    pub fn id(self) -> u64 {
        self.0
    }
}

impl fmt::Display for DocumentHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Document registry and operator front end.
pub struct Engine {
    config: EngineConfig,
    monitor: Monitor,
    documents: HashMap<DocumentHandle, Document>,
    next_handle: u64,
    last_state: InvocationState,
    renderer: Option<Box<dyn RasterRenderer>>,
    converter: Option<Box<dyn OfficeConverter>>,
}

impl Default for Engine {
    fn default() -> Self {
        Self::new(EngineConfig::default())
    }
}

impl fmt::Debug for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Engine")
            .field("config", &self.config)
            .field("documents", &self.documents.len())
            .field("last_state", &self.last_state)
            .field("renderer", &self.renderer.is_some())
            .field("converter", &self.converter.is_some())
            .finish()
    }
}

impl Engine {
    /// An engine with no open documents.
    pub fn new(config: EngineConfig) -> Self {
        Self {
            config,
            monitor: Monitor::new(),
            documents: HashMap::new(),
            next_handle: 1,
            last_state: InvocationState::Idle,
            renderer: None,
            converter: None,
        }
    }

    /// Report progress to, and observe cancellation from, `monitor`.
    pub fn with_monitor(mut self, monitor: Monitor) -> Self {
        self.monitor = monitor;
        self
    }

    /// Plug in a page renderer.
    pub fn with_renderer(mut self, renderer: Box<dyn RasterRenderer>) -> Self {
        self.renderer = Some(renderer);
        self
    }

    /// Plug in an office-format converter.
    pub fn with_converter(mut self, converter: Box<dyn OfficeConverter>) -> Self {
        self.converter = Some(converter);
        self
    }

    /// Active configuration.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// The monitor handed to operators.
    pub fn monitor(&self) -> &Monitor {
        &self.monitor
    }

    /// State the most recent call ended in.
    pub fn last_state(&self) -> &InvocationState {
        &self.last_state
    }

    /// Number of open documents.
    pub fn open_documents(&self) -> usize {
        self.documents.len()
    }

    /// Borrow an open document.
    pub fn document(&self, handle: DocumentHandle) -> Result<&Document> {
        self.documents.get(&handle).ok_or(Error::UnknownHandle(handle.0))
    }

    fn document_mut(&mut self, handle: DocumentHandle) -> Result<&mut Document> {
        self.documents.get_mut(&handle).ok_or(Error::UnknownHandle(handle.0))
    }

    fn register(&mut self, doc: Document) -> DocumentHandle {
        let handle = DocumentHandle(self.next_handle);
        self.next_handle += 1;
        self.documents.insert(handle, doc);
        log::debug!("Registered document {}", handle);
        handle
    }

    fn register_new(&mut self, mut doc: Document) -> DocumentHandle {
        jobs::stamp_producer(&mut doc, &self.config);
        self.register(doc)
    }

    /// Run `call` as one invocation, recording how it ended.
    fn invoke<T>(
        &mut self,
        operation: &'static str,
        start: InvocationState,
        call: impl FnOnce(&mut Self, &mut Invocation) -> Result<T>,
    ) -> Result<T> {
        let mut invocation = Invocation::new(operation);
        invocation.advance(start);
        let result = call(self, &mut invocation);
        match &result {
            Ok(_) => invocation.finish(),
            Err(e) => {
                log::debug!("{} failed: {}", operation, e);
                invocation.fail(e);
            },
        }
        self.last_state = invocation.state().clone();
        result
    }

    fn load(&self, data: &[u8], password: Option<&str>) -> Result<Document> {
        let mut doc = Document::parse_with_options(data, self.config.parser.clone())?;
        if let Some(password) = password {
            if doc.is_locked() {
                doc.unlock(password.as_bytes())?;
            }
        }
        Ok(doc)
    }

    /// Open a file.
    pub fn open(&mut self, path: impl AsRef<Path>) -> Result<DocumentHandle> {
        let path = path.as_ref();
        self.invoke("open", InvocationState::Loading, |engine, _| {
            let data = std::fs::read(path)?;
            let doc = engine.load(&data, None)?;
            if doc.is_locked() {
                log::info!("{} is encrypted; decrypt it before editing", path.display());
            }
            Ok(engine.register(doc))
        })
    }

    /// Open an encrypted file with `password`.
    pub fn open_with_password(&mut self, path: impl AsRef<Path>, password: &str) -> Result<DocumentHandle> {
        let path = path.as_ref();
        self.invoke("open", InvocationState::Loading, |engine, _| {
            let data = std::fs::read(path)?;
            let doc = engine.load(&data, Some(password))?;
            Ok(engine.register(doc))
        })
    }

    /// Open a document held in memory.
    pub fn open_bytes(&mut self, data: &[u8]) -> Result<DocumentHandle> {
        self.invoke("open", InvocationState::Loading, |engine, _| {
            let doc = engine.load(data, None)?;
            Ok(engine.register(doc))
        })
    }

    /// Create an empty document.
    pub fn create(&mut self) -> DocumentHandle {
        self.last_state = InvocationState::Done;
        self.register_new(Document::new())
    }

    /// Forget a document.
    pub fn close(&mut self, handle: DocumentHandle) -> Result<()> {
        self.documents
            .remove(&handle)
            .map(|_| log::debug!("Closed document {}", handle))
            .ok_or(Error::UnknownHandle(handle.0))
    }

    /// Serialize a document to bytes.
    pub fn to_bytes(&mut self, handle: DocumentHandle) -> Result<Vec<u8>> {
        self.invoke("to_bytes", InvocationState::Serializing, |engine, _| {
            serialize(engine.document(handle)?, &SerializeOptions::default())
        })
    }

    /// Write a document to `path`, replacing it atomically.
    pub fn save(&mut self, handle: DocumentHandle, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        self.invoke("save", InvocationState::Serializing, |engine, _| {
            let bytes = serialize(engine.document(handle)?, &SerializeOptions::default())?;
            write_atomic(path, &bytes)
        })
    }

    /// Number of pages.
    pub fn page_count(&mut self, handle: DocumentHandle) -> Result<usize> {
        self.invoke("page_count", InvocationState::Transforming, |engine, _| {
            page_tree::page_count(engine.document(handle)?)
        })
    }

    /// Concatenate documents into a new one.
    pub fn merge(&mut self, handles: &[DocumentHandle]) -> Result<DocumentHandle> {
        self.invoke("merge", InvocationState::Transforming, |engine, _| {
            let docs = handles
                .iter()
                .map(|h| engine.document(*h))
                .collect::<Result<Vec<_>>>()?;
            let merged = ops::merge(&docs, &engine.monitor)?;
            Ok(engine.register_new(merged))
        })
    }

    /// Split at `boundaries` into new documents.
    pub fn split(&mut self, handle: DocumentHandle, boundaries: &[usize]) -> Result<Vec<DocumentHandle>> {
        self.invoke("split", InvocationState::Transforming, |engine, _| {
            let parts = ops::split(engine.document(handle)?, boundaries, &engine.monitor)?;
            Ok(parts.into_iter().map(|p| engine.register_new(p)).collect())
        })
    }

    /// One new document per page.
    pub fn split_each_page(&mut self, handle: DocumentHandle) -> Result<Vec<DocumentHandle>> {
        self.invoke("split", InvocationState::Transforming, |engine, _| {
            let parts = ops::split_each_page(engine.document(handle)?, &engine.monitor)?;
            Ok(parts.into_iter().map(|p| engine.register_new(p)).collect())
        })
    }

    /// New document holding the selected pages in order.
    pub fn extract_pages(&mut self, handle: DocumentHandle, selection: &PageSelection) -> Result<DocumentHandle> {
        self.invoke("extract_pages", InvocationState::Transforming, |engine, _| {
            let doc = engine.document(handle)?;
            let indices = selection.indices(page_tree::page_count(doc)?)?;
            let extracted = ops::extract_pages(doc, &indices, &engine.monitor)?;
            Ok(engine.register_new(extracted))
        })
    }

    /// Remove pages in place.
    pub fn delete_pages(&mut self, handle: DocumentHandle, indices: &[usize]) -> Result<()> {
        self.invoke("delete_pages", InvocationState::Transforming, |engine, _| {
            let monitor = engine.monitor.clone();
            ops::delete_pages(engine.document_mut(handle)?, indices, &monitor)
        })
    }

    /// Keep only the listed pages, in that order.
    pub fn keep_pages(&mut self, handle: DocumentHandle, indices: &[usize]) -> Result<()> {
        self.invoke("keep_pages", InvocationState::Transforming, |engine, _| {
            let monitor = engine.monitor.clone();
            ops::keep_pages(engine.document_mut(handle)?, indices, &monitor)
        })
    }

    /// Move one page.
    pub fn move_page(&mut self, handle: DocumentHandle, from: usize, to: usize) -> Result<()> {
        self.invoke("move_page", InvocationState::Transforming, |engine, _| {
            ops::move_page(engine.document_mut(handle)?, from, to)
        })
    }

    /// Rotate pages by a multiple of 90 degrees.
    pub fn rotate(&mut self, handle: DocumentHandle, selection: &PageSelection, degrees: i64) -> Result<()> {
        self.invoke("rotate", InvocationState::Transforming, |engine, _| {
            let monitor = engine.monitor.clone();
            ops::rotate(engine.document_mut(handle)?, selection, degrees, &monitor)
        })
    }

    /// Watermark pages.
    pub fn watermark(
        &mut self,
        handle: DocumentHandle,
        config: &WatermarkConfig,
        selection: &PageSelection,
    ) -> Result<()> {
        self.invoke("watermark", InvocationState::Transforming, |engine, _| {
            let monitor = engine.monitor.clone();
            ops::watermark(engine.document_mut(handle)?, config, selection, &monitor)
        })
    }

    /// Place a line of text on a page.
    pub fn insert_text(&mut self, handle: DocumentHandle, index: usize, insertion: &TextInsertion) -> Result<()> {
        self.invoke("insert_text", InvocationState::Transforming, |engine, _| {
            ops::insert_text(engine.document_mut(handle)?, index, insertion)
        })
    }

    /// Encrypt on the next save.
    pub fn encrypt(&mut self, handle: DocumentHandle, config: &EncryptionConfig) -> Result<()> {
        self.invoke("encrypt", InvocationState::Transforming, |engine, _| {
            ops::encrypt(engine.document_mut(handle)?, config)
        })
    }

    /// Remove encryption.
    pub fn decrypt(&mut self, handle: DocumentHandle, password: &str) -> Result<()> {
        self.invoke("decrypt", InvocationState::Transforming, |engine, _| {
            ops::decrypt(engine.document_mut(handle)?, password)
        })
    }

    /// Recompress streams with `options`, or the configured defaults.
    pub fn compress(&mut self, handle: DocumentHandle, options: Option<&CompressOptions>) -> Result<CompressStats> {
        self.invoke("compress", InvocationState::Transforming, |engine, _| {
            let options = options.cloned().unwrap_or_else(|| engine.config.compress.clone());
            let monitor = engine.monitor.clone();
            ops::compress(engine.document_mut(handle)?, &options, &monitor)
        })
    }

    /// Text of the selected pages.
    ///
    /// Extraction stops at the first page that fails; the error carries
    /// its index.
    pub fn extract_text(&mut self, handle: DocumentHandle, selection: &PageSelection) -> Result<Vec<PageText>> {
        self.invoke("extract_text", InvocationState::Transforming, |engine, _| {
            let pages = ops::extract_text(engine.document(handle)?, selection)?;
            let total = pages.page_count();
            let mut out = Vec::with_capacity(total);
            for (step, page) in pages.enumerate() {
                out.push(engine.monitor.step(step, total, || page)?);
            }
            Ok(out)
        })
    }

    /// Rasterize one page through the configured renderer.
    pub fn render_page(&mut self, handle: DocumentHandle, index: usize) -> Result<DynamicImage> {
        self.invoke("render_page", InvocationState::Transforming, |engine, _| {
            let renderer = engine
                .renderer
                .as_ref()
                .ok_or_else(|| Error::Unsupported("no raster renderer configured".to_string()))?;
            let doc = engine.document(handle)?;
            page_tree::page_ref(doc, index)?;
            renderer.render(doc, index).map_err(|e| e.on_page(index))
        })
    }

    /// Render every page to `{stem}_{n}.{ext}` in `output_dir`, `n`
    /// counting from 1.
    pub fn export_images(
        &mut self,
        handle: DocumentHandle,
        output_dir: &Path,
        stem: &str,
        format: ImageFormat,
    ) -> Result<Vec<PathBuf>> {
        self.invoke("export_images", InvocationState::Transforming, |engine, invocation| {
            let renderer = engine
                .renderer
                .as_ref()
                .ok_or_else(|| Error::Unsupported("no raster renderer configured".to_string()))?;
            let ext = format
                .extensions_str()
                .first()
                .copied()
                .ok_or_else(|| Error::Unsupported(format!("image format {:?}", format)))?;
            let doc = engine.document(handle)?;
            let total = page_tree::page_count(doc)?;

            let mut outputs = Vec::with_capacity(total);
            for index in 0..total {
                let bytes = engine.monitor.step(index, total, || {
                    let image = renderer.render(doc, index)?;
                    let mut buf = Cursor::new(Vec::new());
                    image
                        .write_to(&mut buf, format)
                        .map_err(|e| Error::Encode(format!("{:?}: {}", format, e)))?;
                    Ok(buf.into_inner())
                });
                let bytes = bytes.map_err(|e| match e {
                    Error::Cancelled { .. } => e,
                    other => other.on_page(index),
                })?;
                outputs.push((output_dir.join(format!("{}_{}.{}", stem, index + 1, ext)), bytes));
            }

            invocation.advance(InvocationState::Serializing);
            std::fs::create_dir_all(output_dir)?;
            write_atomic_all(&outputs)?;
            Ok(outputs.into_iter().map(|(path, _)| path).collect())
        })
    }

    /// Convert a document to an office format through the configured
    /// converter.
    pub fn convert(&mut self, handle: DocumentHandle, format: &str) -> Result<Vec<u8>> {
        self.invoke("convert", InvocationState::Transforming, |engine, invocation| {
            let converter = engine
                .converter
                .as_ref()
                .ok_or_else(|| Error::Unsupported(format!("no converter configured for {}", format)))?;
            let pdf = serialize(engine.document(handle)?, &SerializeOptions::default())?;
            invocation.advance(InvocationState::Serializing);
            converter.convert(&pdf, format)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::progress::CancellationToken;
    use crate::writer::DocumentBuilder;
    use image::RgbImage;

    fn sample(pages: usize) -> Vec<u8> {
        let mut builder = DocumentBuilder::new();
        for i in 0..pages {
            builder.letter_page().text(&format!("page {}", i + 1)).done();
        }
        builder.build().unwrap()
    }

    fn texts(engine: &mut Engine, handle: DocumentHandle) -> Vec<String> {
        engine
            .extract_text(handle, &PageSelection::All)
            .unwrap()
            .into_iter()
            .map(|p| p.text)
            .collect()
    }

    struct Blank;

    impl RasterRenderer for Blank {
        fn render(&self, _doc: &Document, index: usize) -> Result<DynamicImage> {
            Ok(DynamicImage::ImageRgb8(RgbImage::new(4 + index as u32, 4)))
        }
    }

    struct Echo;

    impl OfficeConverter for Echo {
        fn convert(&self, pdf: &[u8], format: &str) -> Result<Vec<u8>> {
            Ok(format!("{}:{}", format, pdf.len()).into_bytes())
        }
    }

    #[test]
    fn test_open_transform_save() {
        let dir = tempfile::tempdir().unwrap();
        let mut engine = Engine::default();
        let doc = engine.open_bytes(&sample(3)).unwrap();
        engine.delete_pages(doc, &[0]).unwrap();
        assert_eq!(engine.last_state(), &InvocationState::Done);

        let path = dir.path().join("out.pdf");
        engine.save(doc, &path).unwrap();
        let reopened = engine.open(&path).unwrap();
        assert_eq!(texts(&mut engine, reopened), vec!["page 2", "page 3"]);
        assert_eq!(engine.open_documents(), 2);
    }

    #[test]
    fn test_merge_split_handles() {
        let mut engine = Engine::new(EngineConfig::default().with_producer("tests"));
        let a = engine.open_bytes(&sample(2)).unwrap();
        let b = engine.open_bytes(&sample(1)).unwrap();
        let merged = engine.merge(&[a, b]).unwrap();
        assert_eq!(engine.page_count(merged).unwrap(), 3);
        let producer = engine.document(merged).unwrap().info().unwrap().get("Producer").cloned();
        assert_eq!(producer, Some(crate::object::Object::string("tests")));

        let parts = engine.split(merged, &[2]).unwrap();
        assert_eq!(engine.page_count(parts[0]).unwrap(), 2);
        assert_eq!(texts(&mut engine, parts[1]), vec!["page 1"]);

        let picked = engine
            .extract_pages(merged, &PageSelection::parse("3,1", 3).unwrap())
            .unwrap();
        assert_eq!(texts(&mut engine, picked), vec!["page 1", "page 1"]);
    }

    #[test]
    fn test_failure_recorded() {
        let mut engine = Engine::default();
        let doc = engine.open_bytes(&sample(1)).unwrap();
        let err = engine.rotate(doc, &PageSelection::All, 45).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Invalid);
        assert!(matches!(engine.last_state(), InvocationState::Failed { kind: ErrorKind::Invalid, .. }));

        engine.close(doc).unwrap();
        assert!(matches!(engine.page_count(doc), Err(Error::UnknownHandle(_))));
        assert!(engine.close(doc).is_err());

        assert!(engine.open_bytes(b"not a pdf").is_err());
        assert!(matches!(
            engine.last_state(),
            InvocationState::Failed {
                kind: ErrorKind::ParseError,
                ..
            }
        ));
    }

    #[test]
    fn test_encrypted_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("locked.pdf");
        let mut engine = Engine::default();
        let doc = engine.open_bytes(&sample(2)).unwrap();
        engine.encrypt(doc, &EncryptionConfig::new("pw", "owner")).unwrap();
        engine.save(doc, &path).unwrap();

        let locked = engine.open(&path).unwrap();
        let err = engine.rotate(locked, &PageSelection::All, 90).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidPassword);
        assert!(engine.decrypt(locked, "wrong").is_err());
        engine.decrypt(locked, "pw").unwrap();
        assert_eq!(texts(&mut engine, locked), vec!["page 1", "page 2"]);

        let unlocked = engine.open_with_password(&path, "owner").unwrap();
        assert_eq!(engine.page_count(unlocked).unwrap(), 2);
    }

    #[test]
    fn test_cancelled_call_leaves_document() {
        let token = CancellationToken::new();
        let mut engine = Engine::default().with_monitor(Monitor::new().with_token(token.clone()));
        let doc = engine.open_bytes(&sample(2)).unwrap();
        token.cancel();
        let err = engine.rotate(doc, &PageSelection::All, 90).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Cancelled);
        let d = engine.document(doc).unwrap();
        let first = page_tree::page_ref(d, 0).unwrap();
        assert_eq!(page_tree::rotation(d, first).unwrap(), 0);
    }

    #[test]
    fn test_collaborators() {
        let dir = tempfile::tempdir().unwrap();
        let mut bare = Engine::default();
        let doc = bare.open_bytes(&sample(2)).unwrap();
        assert!(matches!(bare.render_page(doc, 0), Err(Error::Unsupported(_))));
        assert!(matches!(bare.convert(doc, "docx"), Err(Error::Unsupported(_))));

        let mut engine = Engine::default()
            .with_renderer(Box::new(Blank))
            .with_converter(Box::new(Echo));
        let doc = engine.open_bytes(&sample(2)).unwrap();
        assert_eq!(engine.render_page(doc, 1).unwrap().width(), 5);
        assert!(engine.render_page(doc, 2).is_err());

        let files = engine
            .export_images(doc, &dir.path().join("img"), "scan", ImageFormat::Png)
            .unwrap();
        assert_eq!(files[1], dir.path().join("img").join("scan_2.png"));
        assert!(files.iter().all(|f| f.exists()));

        let converted = String::from_utf8(engine.convert(doc, "docx").unwrap()).unwrap();
        assert!(converted.starts_with("docx:"));
    }

    #[test]
    fn test_create_and_text_insert() {
        let mut engine = Engine::default();
        let doc = engine.create();
        assert_eq!(engine.page_count(doc).unwrap(), 0);
        let bytes = engine.to_bytes(doc).unwrap();
        assert!(bytes.starts_with(b"%PDF-1.7"));

        let sample = engine.open_bytes(&sample(1)).unwrap();
        engine
            .insert_text(sample, 0, &TextInsertion::new("added", 10.0, 10.0))
            .unwrap();
        assert_eq!(texts(&mut engine, sample), vec!["page 1\nadded"]);
        engine.compress(sample, None).unwrap();
        assert_eq!(texts(&mut engine, sample), vec!["page 1\nadded"]);
    }
}

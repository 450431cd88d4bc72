//! Plain-text extraction.
//!
//! Text comes out in content-stream order. Positioning operators that
//! move to a new line start a new output line, horizontal moves and wide
//! `TJ` gaps become spaces. No layout reconstruction is attempted.

use super::PageSelection;
use crate::content::{parse_content_stream, Operator, TextElement, ToUnicode};
use crate::document::Document;
use crate::error::{Error, Result};
use crate::object::{Dict, Object, ObjectRef};
use crate::page_tree;
use std::collections::HashMap;

/// Form XObjects nested deeper than this are not entered.
const MAX_FORM_DEPTH: u32 = 12;

/// `TJ` adjustments below this (in thousandths of an em) read as a word gap.
const WORD_GAP: f64 = -200.0;

/// Text of one page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageText {
    /// 0-based page index
    pub index: usize,
    /// Extracted text, lines separated by `\n`
    pub text: String,
}

/// Lazy sequence of page texts.
///
/// Each page is decoded when the iterator reaches it. Cloning the
/// iterator, or calling [`TextPages::restart`], starts over.
#[derive(Debug, Clone)]
pub struct TextPages<'a> {
    doc: &'a Document,
    pages: Vec<(usize, ObjectRef)>,
    next: usize,
}

impl<'a> TextPages<'a> {
    /// Rewind to the first selected page.
    pub fn restart(&mut self) {
        self.next = 0;
    }

    /// Number of pages in the selection.
    pub fn page_count(&self) -> usize {
        self.pages.len()
    }
}

impl Iterator for TextPages<'_> {
    type Item = Result<PageText>;

    fn next(&mut self) -> Option<Self::Item> {
        let &(index, page) = self.pages.get(self.next)?;
        self.next += 1;
        Some(page_text(self.doc, page).map(|text| PageText { index, text }).map_err(|e| e.on_page(index)))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let left = self.pages.len() - self.next;
        (left, Some(left))
    }
}

/// Text of the selected pages.
///
/// The selection is validated up front; content is only decoded while
/// iterating.
pub fn extract_text<'a>(doc: &'a Document, selection: &PageSelection) -> Result<TextPages<'a>> {
    doc.ensure_unlocked()?;
    let refs = page_tree::page_refs(doc)?;
    let pages = selection
        .indices(refs.len())?
        .into_iter()
        .map(|i| (i, refs[i]))
        .collect();
    Ok(TextPages { doc, pages, next: 0 })
}

/// Concatenated decoded content of a page.
pub(crate) fn page_content(doc: &Document, page: ObjectRef) -> Result<Vec<u8>> {
    let refs: Vec<ObjectRef> = match page_tree::page_dict(doc, page)?.get("Contents") {
        Some(Object::Reference(r)) => match doc.resolve(*r)? {
            // an indirect array of streams
            Object::Array(items) => items.iter().filter_map(|o| o.as_reference()).collect(),
            _ => vec![*r],
        },
        Some(Object::Array(items)) => items.iter().filter_map(|o| o.as_reference()).collect(),
        _ => Vec::new(),
    };
    let mut data = Vec::new();
    for r in refs {
        if !matches!(doc.get(r), Some(Object::Stream { .. })) {
            log::warn!("Content entry {} is not a stream; skipping", r);
            continue;
        }
        data.extend_from_slice(&doc.decoded_stream(r)?);
        data.push(b'\n');
    }
    Ok(data)
}

fn page_text(doc: &Document, page: ObjectRef) -> Result<String> {
    let content = page_content(doc, page)?;
    let resources = page_tree::resources(doc, page)?.cloned().unwrap_or_default();
    let mut extractor = Extractor {
        doc,
        out: String::new(),
        forms: Vec::new(),
    };
    extractor.run(&content, &resources, 0)?;
    Ok(extractor.finish())
}

/// Byte-to-text decoding for one font.
#[derive(Debug, Clone)]
struct FontDecoder {
    to_unicode: Option<ToUnicode>,
    two_byte: bool,
}

impl FontDecoder {
    fn latin1() -> Self {
        Self {
            to_unicode: None,
            two_byte: false,
        }
    }

    fn load(doc: &Document, font: &Dict) -> Result<Self> {
        let two_byte = font.get("Subtype").and_then(|o| o.as_name()) == Some("Type0");
        let to_unicode = match font.get("ToUnicode") {
            Some(Object::Reference(r)) if matches!(doc.get(*r), Some(Object::Stream { .. })) => {
                Some(ToUnicode::parse(&doc.decoded_stream(*r)?))
            },
            _ => None,
        };
        Ok(Self { to_unicode, two_byte })
    }

    fn decode(&self, bytes: &[u8], out: &mut String) {
        let width = match (&self.to_unicode, self.two_byte) {
            (_, true) => 2,
            (Some(cmap), false) => cmap.code_bytes(),
            (None, false) => 1,
        };
        for chunk in bytes.chunks(width) {
            let code = chunk.iter().fold(0u32, |acc, &b| (acc << 8) | b as u32);
            match self.to_unicode.as_ref().and_then(|m| m.get(code)) {
                Some(text) => out.push_str(text),
                None if width == 1 => out.push(code as u8 as char),
                None => {
                    if let Some(c) = char::from_u32(code).filter(|c| !c.is_control()) {
                        out.push(c);
                    }
                },
            }
        }
    }
}

struct Extractor<'a> {
    doc: &'a Document,
    out: String,
    /// Form XObjects currently being walked
    forms: Vec<ObjectRef>,
}

impl Extractor<'_> {
    fn run(&mut self, content: &[u8], resources: &Dict, depth: u32) -> Result<()> {
        let ops = parse_content_stream(content)?;
        let mut fonts: HashMap<String, FontDecoder> = HashMap::new();
        let mut font = FontDecoder::latin1();
        let mut line_y: Option<f64> = None;

        for op in ops {
            match op {
                Operator::Tf { font: name, .. } => {
                    if !fonts.contains_key(&name) {
                        let decoder = match self.resource(resources, "Font", &name)? {
                            Some(dict) => FontDecoder::load(self.doc, &dict)?,
                            None => {
                                log::debug!("Font /{} not in resources; using Latin-1", name);
                                FontDecoder::latin1()
                            },
                        };
                        fonts.insert(name.clone(), decoder);
                    }
                    if let Some(decoder) = fonts.get(&name) {
                        font = decoder.clone();
                    }
                },
                Operator::Td { tx, ty } | Operator::TD { tx, ty } => {
                    if ty != 0.0 {
                        self.newline();
                    } else if tx != 0.0 {
                        self.space();
                    }
                },
                Operator::Tm { matrix } => {
                    if line_y.map_or(false, |y| (y - matrix[5]).abs() > f64::EPSILON) {
                        self.newline();
                    } else {
                        self.space();
                    }
                    line_y = Some(matrix[5]);
                },
                Operator::TStar => self.newline(),
                Operator::Tj { text } => font.decode(&text, &mut self.out),
                Operator::Quote { text } | Operator::DoubleQuote { text, .. } => {
                    self.newline();
                    font.decode(&text, &mut self.out);
                },
                Operator::TJ { array } => {
                    for element in array {
                        match element {
                            TextElement::String(s) => font.decode(&s, &mut self.out),
                            TextElement::Offset(o) if o < WORD_GAP => self.space(),
                            TextElement::Offset(_) => {},
                        }
                    }
                },
                Operator::EndText => line_y = None,
                Operator::Do { name } => self.form(resources, &name, depth)?,
                _ => {},
            }
        }
        Ok(())
    }

    fn form(&mut self, resources: &Dict, name: &str, depth: u32) -> Result<()> {
        let Some(r) = self.xobject_ref(resources, name)? else {
            return Ok(());
        };
        let Some(Object::Stream { dict, .. }) = self.doc.get(r) else {
            return Ok(());
        };
        if dict.get("Subtype").and_then(|o| o.as_name()) != Some("Form") {
            return Ok(());
        }
        if depth >= MAX_FORM_DEPTH {
            log::warn!("Form XObject {} nested too deep; skipping", r);
            return Ok(());
        }
        if self.forms.contains(&r) {
            log::warn!("Form XObject {} draws itself; skipping", r);
            return Ok(());
        }
        let own = match dict.get("Resources") {
            Some(res) => self.doc.deref(res)?.as_dict().cloned(),
            None => None,
        };
        let content = self.doc.decoded_stream(r)?;
        self.forms.push(r);
        let result = self.run(&content, own.as_ref().unwrap_or(resources), depth + 1);
        self.forms.pop();
        result
    }

    fn resource(&self, resources: &Dict, category: &str, name: &str) -> Result<Option<Dict>> {
        let Some(entries) = self.doc.dict_get(resources, category)? else {
            return Ok(None);
        };
        let Some(entries) = entries.as_dict() else {
            return Err(Error::wrong_type("dictionary", entries.type_name()));
        };
        match self.doc.dict_get(entries, name) {
            Ok(found) => Ok(found.and_then(|o| o.as_dict()).cloned()),
            Err(Error::BrokenReference { .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn xobject_ref(&self, resources: &Dict, name: &str) -> Result<Option<ObjectRef>> {
        let Some(entries) = self.doc.dict_get(resources, "XObject")? else {
            return Ok(None);
        };
        Ok(entries
            .as_dict()
            .and_then(|d| d.get(name))
            .and_then(|o| o.as_reference()))
    }

    fn newline(&mut self) {
        let trimmed = self.out.trim_end_matches(' ').len();
        self.out.truncate(trimmed);
        if !self.out.is_empty() && !self.out.ends_with('\n') {
            self.out.push('\n');
        }
    }

    fn space(&mut self) {
        if !self.out.is_empty() && !self.out.ends_with(|c| c == ' ' || c == '\n') {
            self.out.push(' ');
        }
    }

    fn finish(self) -> String {
        self.out.trim_end().to_string()
    }
}

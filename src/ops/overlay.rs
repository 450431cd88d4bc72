//! Compositing new content onto existing pages.
//!
//! Original content streams are never rewritten. The page's `/Contents`
//! becomes an array: a stream holding `q`, the original streams, a stream
//! holding `Q` and the overlay (foreground), or the overlay followed by
//! the originals (background). Either way the original graphics state
//! stack is balanced before or after the overlay runs.
//!
//! Text placed with [`insert_text`] uses a top-left origin, converted with
//! `pdf_y = top - y`.

use super::transact;
use crate::content::ContentStreamBuilder;
use crate::document::Document;
use crate::error::{Error, Result};
use crate::object::{Dict, Object, ObjectRef};
use crate::page_tree;
use serde::{Deserialize, Serialize};

/// Whether an overlay is drawn above or below the page content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Layer {
    /// Over the existing content
    #[default]
    Foreground,
    /// Under the existing content
    Background,
}

/// A standard Helvetica font dictionary with WinAnsi encoding.
pub(crate) fn helvetica() -> Object {
    let mut font = Dict::new();
    font.insert("Type".to_string(), Object::name("Font"));
    font.insert("Subtype".to_string(), Object::name("Type1"));
    font.insert("BaseFont".to_string(), Object::name("Helvetica"));
    font.insert("Encoding".to_string(), Object::name("WinAnsiEncoding"));
    Object::Dictionary(font)
}

/// Register `value` in the page's own `/Resources` under `category`,
/// using `base` or the first `base1`, `base2`, ... that is free.
///
/// Inherited or indirect resource dictionaries are copied onto the page
/// first so other pages sharing them are unaffected.
pub(crate) fn add_page_resource(
    doc: &mut Document,
    page: ObjectRef,
    category: &str,
    base: &str,
    value: Object,
) -> Result<String> {
    let mut resources = page_tree::resources(doc, page)?.cloned().unwrap_or_default();
    let mut entries = match resources.get(category) {
        Some(obj) => doc.deref(obj)?.as_dict().cloned().unwrap_or_default(),
        None => Dict::new(),
    };

    let mut name = base.to_string();
    let mut n = 0;
    while entries.contains_key(&name) {
        n += 1;
        name = format!("{}{}", base, n);
    }
    entries.insert(name.clone(), value);
    resources.insert(category.to_string(), Object::Dictionary(entries));
    doc.get_dict_mut(page)?
        .insert("Resources".to_string(), Object::Dictionary(resources));
    Ok(name)
}

/// Composite `overlay` with the page's existing content.
pub(crate) fn composite(doc: &mut Document, page: ObjectRef, overlay: Vec<u8>, layer: Layer) -> Result<()> {
    let original: Vec<Object> = match page_tree::page_dict(doc, page)?.get("Contents") {
        Some(Object::Reference(r)) => match doc.resolve(*r)? {
            // splice the streams of an indirect array
            Object::Array(items) => items
                .iter()
                .filter(|item| item.as_reference().is_some())
                .cloned()
                .collect(),
            _ => vec![Object::Reference(*r)],
        },
        Some(Object::Array(items)) => items
            .iter()
            .filter(|item| item.as_reference().is_some())
            .cloned()
            .collect(),
        Some(Object::Null) | None => Vec::new(),
        Some(other) => {
            log::warn!("Page {} has /Contents of type {}; replacing it", page, other.type_name());
            Vec::new()
        },
    };

    let mut contents = Vec::with_capacity(original.len() + 2);
    match layer {
        Layer::Foreground => {
            if !original.is_empty() {
                contents.push(Object::Reference(doc.add_object(Object::stream(Dict::new(), b"q\n".to_vec()))));
                contents.extend(original);
                let mut tail = b"\nQ\n".to_vec();
                tail.extend_from_slice(&overlay);
                contents.push(Object::Reference(doc.add_object(Object::stream(Dict::new(), tail))));
            } else {
                contents.push(Object::Reference(doc.add_object(Object::stream(Dict::new(), overlay))));
            }
        },
        Layer::Background => {
            contents.push(Object::Reference(doc.add_object(Object::stream(Dict::new(), overlay))));
            contents.extend(original);
        },
    }
    doc.get_dict_mut(page)?
        .insert("Contents".to_string(), Object::Array(contents));
    Ok(())
}

/// One line of text to place on a page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TextInsertion {
    /// Text, set in Helvetica with WinAnsi encoding
    pub text: String,
    /// Distance from the left edge of the crop box
    pub x: f64,
    /// Distance of the baseline from the top edge of the crop box
    pub y: f64,
    /// Font size in points
    pub font_size: f64,
    /// RGB fill colour, components in 0..=1
    pub color: [f64; 3],
}

impl Default for TextInsertion {
    fn default() -> Self {
        Self {
            text: String::new(),
            x: 72.0,
            y: 72.0,
            font_size: 11.0,
            color: [1.0, 0.0, 0.0],
        }
    }
}

impl TextInsertion {
    /// Red 11pt text at `(x, y)` measured from the top-left corner.
    pub fn new(text: impl Into<String>, x: f64, y: f64) -> Self {
        Self {
            text: text.into(),
            x,
            y,
            ..Default::default()
        }
    }

    /// Set the font size.
    pub fn with_font_size(mut self, size: f64) -> Self {
        self.font_size = size;
        self
    }

    /// Set the fill colour.
    pub fn with_color(mut self, r: f64, g: f64, b: f64) -> Self {
        self.color = [r, g, b];
        self
    }
}

/// Place one line of text on the page at `index`.
pub fn insert_text(doc: &mut Document, index: usize, insertion: &TextInsertion) -> Result<()> {
    if !(insertion.font_size.is_finite() && insertion.font_size > 0.0) {
        return Err(Error::Config(format!("font size {} is not positive", insertion.font_size)));
    }
    transact(doc, |doc| {
        let page = page_tree::page_ref(doc, index)?;
        let apply = |doc: &mut Document| -> Result<()> {
            let [left, _, _, top] = page_tree::crop_box(doc, page)?;
            let font = doc.add_object(helvetica());
            let font_name = add_page_resource(doc, page, "Font", "F1", Object::Reference(font))?;

            let [r, g, b] = insertion.color;
            let mut content = ContentStreamBuilder::new();
            content
                .save_state()
                .set_fill_rgb(r, g, b)
                .begin_text()
                .set_font(&font_name, insertion.font_size)
                .move_text(left + insertion.x, top - insertion.y)
                .show_text(&insertion.text)
                .end_text()
                .restore_state();
            composite(doc, page, content.build()?, Layer::Foreground)
        };
        apply(doc).map_err(|e| e.on_page(index))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content::{parse_content_stream, Operator};
    use crate::document::tests::build_pdf;

    fn doc() -> Document {
        let data = build_pdf(
            &[
                "<< /Type /Catalog /Pages 2 0 R >>",
                "<< /Type /Pages /Kids [3 0 R 4 0 R] /Count 2 /Resources 5 0 R /MediaBox [0 0 600 800] >>",
                "<< /Type /Page /Parent 2 0 R /Contents 6 0 R >>",
                "<< /Type /Page /Parent 2 0 R >>",
                "<< /Font << /F1 7 0 R >> >>",
                "<< /Length 8 >>\nstream\n0 0 1 rg\nendstream",
                "<< /Type /Font /Subtype /Type1 /BaseFont /Courier >>",
            ],
            "",
        );
        Document::parse(&data).unwrap()
    }

    fn content_of(doc: &Document, page: ObjectRef) -> Vec<u8> {
        let contents = page_tree::page_dict(doc, page).unwrap().get("Contents").unwrap();
        let mut out = Vec::new();
        for item in contents.as_array().unwrap() {
            out.extend_from_slice(&doc.decoded_stream(item.as_reference().unwrap()).unwrap());
            out.push(b'\n');
        }
        out
    }

    #[test]
    fn test_insert_text_wraps_original() {
        let mut d = doc();
        insert_text(&mut d, 0, &TextInsertion::new("Note", 50.0, 100.0)).unwrap();
        let page = page_tree::page_ref(&d, 0).unwrap();
        let ops = parse_content_stream(&content_of(&d, page)).unwrap();

        assert_eq!(ops[0], Operator::SaveState);
        let restore = ops.iter().position(|o| *o == Operator::RestoreState).unwrap();
        assert!(ops[1..restore].iter().any(|o| matches!(o, Operator::Other { name, .. } if name == "rg")));
        assert!(ops.contains(&Operator::Td { tx: 50.0, ty: 700.0 }));
        assert!(ops.contains(&Operator::Tj { text: b"Note".to_vec() }));

        // the inherited F1 is taken, so the new font gets another name
        let resources = page_tree::resources(&d, page).unwrap().unwrap();
        let fonts = resources.get("Font").unwrap().as_dict().unwrap();
        assert!(fonts.contains_key("F1") && fonts.contains_key("F11"));
        assert!(ops.contains(&Operator::Tf {
            font: "F11".to_string(),
            size: 11.0
        }));
    }

    #[test]
    fn test_shared_resources_untouched() {
        let mut d = doc();
        insert_text(&mut d, 1, &TextInsertion::new("x", 0.0, 0.0)).unwrap();
        let shared = d.get(ObjectRef::new(5, 0)).unwrap().as_dict().unwrap();
        let fonts = shared.get("Font").unwrap().as_dict().unwrap();
        assert_eq!(fonts.len(), 1);

        // page without content gets just the overlay
        let page = page_tree::page_ref(&d, 1).unwrap();
        let contents = page_tree::page_dict(&d, page).unwrap().get("Contents").unwrap();
        assert_eq!(contents.as_array().unwrap().len(), 1);
    }

    #[test]
    fn test_background_layer_order() {
        let mut d = doc();
        let page = page_tree::page_ref(&d, 0).unwrap();
        composite(&mut d, page, b"0.5 g".to_vec(), Layer::Background).unwrap();
        let contents = page_tree::page_dict(&d, page).unwrap().get("Contents").unwrap();
        let items = contents.as_array().unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[1].as_reference(), Some(ObjectRef::new(6, 0)));
    }

    /// Page whose `/Contents` is a reference to an array of two streams.
    fn indirect_array_doc() -> Document {
        let data = build_pdf(
            &[
                "<< /Type /Catalog /Pages 2 0 R >>",
                "<< /Type /Pages /Kids [3 0 R] /Count 1 /MediaBox [0 0 600 800] >>",
                "<< /Type /Page /Parent 2 0 R /Contents 4 0 R >>",
                "[5 0 R 6 0 R]",
                "<< /Length 15 >>\nstream\nBT (Head) Tj ET\nendstream",
                "<< /Length 15 >>\nstream\nBT (Tail) Tj ET\nendstream",
            ],
            "",
        );
        Document::parse(&data).unwrap()
    }

    #[test]
    fn test_insert_text_splices_indirect_contents_array() {
        let mut d = indirect_array_doc();
        insert_text(&mut d, 0, &TextInsertion::new("Note", 10.0, 10.0)).unwrap();
        let page = page_tree::page_ref(&d, 0).unwrap();
        let ops = parse_content_stream(&content_of(&d, page)).unwrap();
        let shown: Vec<&[u8]> = ops
            .iter()
            .filter_map(|o| match o {
                Operator::Tj { text } => Some(text.as_slice()),
                _ => None,
            })
            .collect();
        assert_eq!(shown, vec![&b"Head"[..], &b"Tail"[..], &b"Note"[..]]);

        // every entry of the new array is a stream, not the old array object
        let contents = page_tree::page_dict(&d, page).unwrap().get("Contents").unwrap();
        for item in contents.as_array().unwrap() {
            let r = item.as_reference().unwrap();
            assert_ne!(r, ObjectRef::new(4, 0));
            assert!(matches!(d.get(r), Some(Object::Stream { .. })));
        }
    }

    #[test]
    fn test_background_splices_indirect_contents_array() {
        let mut d = indirect_array_doc();
        let page = page_tree::page_ref(&d, 0).unwrap();
        composite(&mut d, page, b"0.5 g".to_vec(), Layer::Background).unwrap();
        let contents = page_tree::page_dict(&d, page).unwrap().get("Contents").unwrap();
        let refs: Vec<_> = contents.as_array().unwrap().iter().map(|o| o.as_reference().unwrap()).collect();
        assert_eq!(refs.len(), 3);
        assert_eq!(&refs[1..], &[ObjectRef::new(5, 0), ObjectRef::new(6, 0)]);
    }

    #[test]
    fn test_insert_text_errors() {
        let mut d = doc();
        let err = insert_text(&mut d, 5, &TextInsertion::new("x", 0.0, 0.0)).unwrap_err();
        assert!(matches!(err, Error::PageOutOfRange { index: 5, .. }));
        let bad = TextInsertion::new("x", 0.0, 0.0).with_font_size(0.0);
        assert!(insert_text(&mut d, 0, &bad).is_err());
    }
}

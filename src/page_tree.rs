//! Page tree navigation and structural edits.
//!
//! Page order is the pre-order traversal of `/Kids` starting at the
//! catalog's `/Pages`. Traversal is lazy and guards against cycles: a node
//! that reappears among its own ancestors is a [`Error::CyclicStructure`].
//! A node shared by two branches is not a cycle and is visited twice.
//!
//! Edits rebuild the root as a single flat node. Inheritable attributes
//! are copied onto each leaf first, so dropping the intermediate nodes
//! never changes how a page renders.

use crate::document::Document;
use crate::error::{Error, Result};
use crate::object::{Dict, Object, ObjectRef};
use std::collections::HashSet;

/// Attributes a page may inherit from its ancestors.
pub const INHERITABLE: [&str; 4] = ["Resources", "MediaBox", "CropBox", "Rotate"];

/// US Letter, used when no `/MediaBox` is found anywhere.
pub const DEFAULT_MEDIA_BOX: [f64; 4] = [0.0, 0.0, 612.0, 792.0];

/// One leaf of the page tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    /// Position in document order (0-based)
    pub index: usize,
    /// The page object
    pub object: ObjectRef,
}

struct Frame {
    kids: Vec<Object>,
    pos: usize,
    node: ObjectRef,
}

/// Lazy pre-order iterator over the pages of a document.
pub struct Pages<'a> {
    doc: &'a Document,
    stack: Vec<Frame>,
    ancestors: HashSet<ObjectRef>,
    index: usize,
    started: bool,
    done: bool,
}

/// Iterate over the pages of `doc`.
pub fn pages(doc: &Document) -> Pages<'_> {
    Pages {
        doc,
        stack: Vec::new(),
        ancestors: HashSet::new(),
        index: 0,
        started: false,
        done: false,
    }
}

impl<'a> Pages<'a> {
    /// Start over from the first page.
    pub fn restart(&mut self) {
        self.stack.clear();
        self.ancestors.clear();
        self.index = 0;
        self.started = false;
        self.done = false;
    }

    fn fail(&mut self, err: Error) -> Option<Result<Page>> {
        self.done = true;
        Some(Err(err))
    }

    fn emit(&mut self, object: ObjectRef) -> Option<Result<Page>> {
        let page = Page {
            index: self.index,
            object,
        };
        self.index += 1;
        Some(Ok(page))
    }

    fn push(&mut self, node: ObjectRef, dict: &Dict) -> Result<()> {
        if self.stack.len() as u32 >= self.doc.options().max_recursion_depth {
            return Err(Error::RecursionLimitExceeded(self.doc.options().max_recursion_depth));
        }
        let kids = match dict.get("Kids") {
            Some(k) => self.doc.deref(k)?.as_array().cloned().unwrap_or_default(),
            None => Vec::new(),
        };
        self.ancestors.insert(node);
        self.stack.push(Frame { kids, pos: 0, node });
        Ok(())
    }
}

impl<'a> Iterator for Pages<'a> {
    type Item = Result<Page>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        if !self.started {
            self.started = true;
            let root = match self.doc.pages_root() {
                Ok(r) => r,
                Err(e) => return self.fail(e),
            };
            let doc = self.doc;
            let Some(dict) = doc.get(root).and_then(|o| o.as_dict()) else {
                return self.fail(Error::broken(root, "page tree root is not a dictionary"));
            };
            // a catalog pointing straight at a single page
            if dict.get("Type").and_then(|t| t.as_name()) == Some("Page") {
                self.done = true;
                return self.emit(root);
            }
            if let Err(e) = self.push(root, dict) {
                return self.fail(e);
            }
        }

        loop {
            let frame = self.stack.last_mut()?;
            if frame.pos >= frame.kids.len() {
                let node = frame.node;
                self.stack.pop();
                self.ancestors.remove(&node);
                if self.stack.is_empty() {
                    self.done = true;
                    return None;
                }
                continue;
            }
            let kid = frame.kids[frame.pos].clone();
            frame.pos += 1;

            let Object::Reference(kid_ref) = kid else {
                log::warn!("Ignoring non-reference entry in /Kids: {:?}", kid);
                continue;
            };
            if self.ancestors.contains(&kid_ref) {
                return self.fail(Error::CyclicStructure { object: kid_ref });
            }
            let doc = self.doc;
            let Some(node) = doc.get(kid_ref) else {
                log::warn!("Skipping dangling page tree reference {}", kid_ref);
                continue;
            };
            let Some(dict) = node.as_dict() else {
                log::warn!("Skipping page tree entry {} that is not a dictionary", kid_ref);
                continue;
            };

            let is_node = match dict.get("Type").and_then(|t| t.as_name()) {
                Some("Pages") => true,
                Some("Page") => false,
                _ => dict.contains_key("Kids"),
            };
            if is_node {
                if let Err(e) = self.push(kid_ref, dict) {
                    return self.fail(e);
                }
                continue;
            }
            return self.emit(kid_ref);
        }
    }
}

/// Page objects in document order.
pub fn page_refs(doc: &Document) -> Result<Vec<ObjectRef>> {
    pages(doc).map(|p| p.map(|p| p.object)).collect()
}

/// Number of reachable pages. `/Count` is not trusted.
pub fn page_count(doc: &Document) -> Result<usize> {
    pages(doc).try_fold(0, |n, p| p.map(|_| n + 1))
}

/// Page object at `index`.
pub fn page_ref(doc: &Document, index: usize) -> Result<ObjectRef> {
    let refs = page_refs(doc)?;
    refs.get(index).copied().ok_or(Error::PageOutOfRange {
        index,
        count: refs.len(),
    })
}

/// Dictionary of a page object.
pub fn page_dict(doc: &Document, page: ObjectRef) -> Result<&Dict> {
    let obj = doc.resolve(page)?;
    obj.as_dict()
        .ok_or_else(|| Error::wrong_type("Dictionary", obj.type_name()))
}

/// Raw (not dereferenced) value of an inheritable attribute.
pub(crate) fn inherited_raw<'a>(doc: &'a Document, page: ObjectRef, key: &str) -> Result<Option<&'a Object>> {
    let mut current = Some(page);
    let mut seen = HashSet::new();
    while let Some(node_ref) = current {
        if !seen.insert(node_ref) {
            log::warn!("/Parent chain of {} loops at {}", page, node_ref);
            return Ok(None);
        }
        let Some(dict) = doc.get(node_ref).and_then(|o| o.as_dict()) else {
            return Ok(None);
        };
        if let Some(value) = dict.get(key) {
            return Ok(Some(value));
        }
        current = dict.get("Parent").and_then(|p| p.as_reference());
    }
    Ok(None)
}

/// Value of `key` on the page or the nearest ancestor that defines it.
pub fn inherited_attribute<'a>(
    doc: &'a Document,
    page: ObjectRef,
    key: &str,
) -> Result<Option<&'a Object>> {
    match inherited_raw(doc, page, key)? {
        Some(v) => {
            let v = doc.deref(v)?;
            Ok((!v.is_null()).then_some(v))
        },
        None => Ok(None),
    }
}

/// Effective `/MediaBox`, falling back to US Letter.
pub fn media_box(doc: &Document, page: ObjectRef) -> Result<[f64; 4]> {
    let found = inherited_attribute(doc, page, "MediaBox")?.and_then(|o| rect_of(doc, o));
    Ok(found.unwrap_or_else(|| {
        log::warn!("Page {} has no usable /MediaBox; assuming US Letter", page);
        DEFAULT_MEDIA_BOX
    }))
}

/// Effective `/CropBox`, defaulting to the media box.
pub fn crop_box(doc: &Document, page: ObjectRef) -> Result<[f64; 4]> {
    match inherited_attribute(doc, page, "CropBox")?.and_then(|o| rect_of(doc, o)) {
        Some(r) => Ok(r),
        None => media_box(doc, page),
    }
}

fn rect_of(doc: &Document, obj: &Object) -> Option<[f64; 4]> {
    let arr = obj.as_array()?;
    if arr.len() != 4 {
        return None;
    }
    let mut out = [0.0; 4];
    for (slot, item) in out.iter_mut().zip(arr) {
        *slot = doc.deref(item).ok()?.as_number()?;
    }
    Some(out)
}

/// Effective rotation, normalized to 0, 90, 180 or 270.
pub fn rotation(doc: &Document, page: ObjectRef) -> Result<i64> {
    let raw = inherited_attribute(doc, page, "Rotate")?
        .and_then(|o| o.as_number())
        .map(|v| v as i64)
        .unwrap_or(0);
    let normalized = raw.rem_euclid(360);
    if normalized % 90 != 0 {
        log::warn!("Page {} has /Rotate {}; rounding down to a multiple of 90", page, raw);
    }
    Ok(normalized - normalized % 90)
}

/// Effective resource dictionary.
pub fn resources<'a>(doc: &'a Document, page: ObjectRef) -> Result<Option<&'a Dict>> {
    Ok(inherited_attribute(doc, page, "Resources")?.and_then(|o| o.as_dict()))
}

/// Rebuild the page tree so that its pages are exactly `order`.
///
/// The root becomes a flat node over `order`. Inheritable attributes are
/// materialized on every leaf and `/Parent` re-pointed at the root. A page
/// listed more than once is cloned into a new object for each repeat;
/// clones share content and resources by reference.
pub fn set_page_order(doc: &mut Document, order: &[ObjectRef]) -> Result<()> {
    let root = doc.pages_root()?;

    // gather inherited values before anything is rewritten
    let mut materialized: Vec<(ObjectRef, Vec<(&'static str, Object)>)> = Vec::with_capacity(order.len());
    for &page in order {
        page_dict(doc, page)?;
        let mut attrs = Vec::new();
        for key in INHERITABLE {
            let own = doc.get(page).and_then(|o| o.as_dict()).is_some_and(|d| d.contains_key(key));
            if own {
                continue;
            }
            if let Some(value) = inherited_raw(doc, page, key)? {
                attrs.push((key, value.clone()));
            } else if key == "MediaBox" {
                attrs.push((key, Object::rect(media_box(doc, page)?)));
            }
        }
        materialized.push((page, attrs));
    }

    let root = promote_leaf_root(doc, root)?;
    let mut seen = HashSet::new();
    let mut kids = Vec::with_capacity(order.len());
    for (page, attrs) in materialized {
        let target = if seen.insert(page) {
            page
        } else {
            let copy = doc.resolve(page)?.clone();
            doc.add_object(copy)
        };
        let dict = doc.get_dict_mut(target)?;
        for (key, value) in attrs {
            dict.insert(key.to_string(), value);
        }
        dict.insert("Parent".to_string(), Object::Reference(root));
        kids.push(Object::Reference(target));
    }

    let count = kids.len() as i64;
    let root_dict = doc.get_dict_mut(root)?;
    root_dict.insert("Type".to_string(), Object::name("Pages"));
    root_dict.insert("Kids".to_string(), Object::Array(kids));
    root_dict.insert("Count".to_string(), Object::Integer(count));
    root_dict.remove("Parent");
    Ok(())
}

/// Give a catalog that points straight at a page its own `/Pages` node.
///
/// The old root stays a leaf and may be listed among the new kids.
fn promote_leaf_root(doc: &mut Document, root: ObjectRef) -> Result<ObjectRef> {
    let is_leaf = doc
        .get(root)
        .and_then(|o| o.as_dict())
        .and_then(|d| d.get("Type"))
        .and_then(|t| t.as_name())
        == Some("Page");
    if !is_leaf {
        return Ok(root);
    }
    let mut node = Dict::new();
    node.insert("Type".to_string(), Object::name("Pages"));
    node.insert("Kids".to_string(), Object::Array(Vec::new()));
    node.insert("Count".to_string(), Object::Integer(0));
    let fresh = doc.add_object(Object::Dictionary(node));
    let catalog = doc.catalog_ref()?;
    doc.get_dict_mut(catalog)?
        .insert("Pages".to_string(), Object::Reference(fresh));
    log::debug!("Moved leaf page tree root {} under new node {}", root, fresh);
    Ok(fresh)
}

/// Insert `page` so that it ends up at `index`.
pub fn insert_page(doc: &mut Document, index: usize, page: ObjectRef) -> Result<()> {
    let mut order = page_refs(doc)?;
    if index > order.len() {
        return Err(Error::PageOutOfRange {
            index,
            count: order.len(),
        });
    }
    order.insert(index, page);
    set_page_order(doc, &order)
}

/// Remove the page at `index` from the tree. The object stays in the
/// arena until the serializer's reachability sweep drops it.
pub fn remove_page(doc: &mut Document, index: usize) -> Result<ObjectRef> {
    let mut order = page_refs(doc)?;
    if index >= order.len() {
        return Err(Error::PageOutOfRange {
            index,
            count: order.len(),
        });
    }
    let removed = order.remove(index);
    set_page_order(doc, &order)?;
    Ok(removed)
}

/// Move the page at `from` so that it ends up at `to`.
pub fn move_page(doc: &mut Document, from: usize, to: usize) -> Result<()> {
    let mut order = page_refs(doc)?;
    let count = order.len();
    for index in [from, to] {
        if index >= count {
            return Err(Error::PageOutOfRange { index, count });
        }
    }
    let page = order.remove(from);
    order.insert(to, page);
    set_page_order(doc, &order)
}

/// Append pages already present in the arena.
pub fn append_pages(doc: &mut Document, new_pages: &[ObjectRef]) -> Result<()> {
    let mut order = page_refs(doc)?;
    order.extend_from_slice(new_pages);
    set_page_order(doc, &order)
}

/// Create a blank page object (not yet part of the tree).
pub fn new_page(doc: &mut Document, media_box: [f64; 4]) -> ObjectRef {
    let contents = doc.add_object(Object::stream(Dict::new(), Vec::new()));
    let mut page = Dict::new();
    page.insert("Type".to_string(), Object::name("Page"));
    page.insert("MediaBox".to_string(), Object::rect(media_box));
    page.insert("Resources".to_string(), Object::Dictionary(Dict::new()));
    page.insert("Contents".to_string(), Object::Reference(contents));
    doc.add_object(Object::Dictionary(page))
}

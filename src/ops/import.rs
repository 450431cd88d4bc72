//! Copying pages between documents.
//!
//! Every object reachable from an imported page is copied into the
//! destination under a freshly allocated number. `/Parent` links are not
//! followed, and references to source pages that are not being imported
//! become null so a copied annotation cannot drag a whole page along.

use crate::document::Document;
use crate::error::Result;
use crate::object::{Dict, Object, ObjectRef};
use crate::page_tree::{self, INHERITABLE};
use std::collections::{HashMap, HashSet};

/// Copies objects from one source document into a destination.
pub struct ObjectImporter<'a> {
    source: &'a Document,
    map: HashMap<ObjectRef, ObjectRef>,
    excluded: HashSet<ObjectRef>,
    pending: Vec<ObjectRef>,
}

impl<'a> ObjectImporter<'a> {
    /// An importer for `pages` of `source`. Other source pages are
    /// excluded from the copy.
    pub fn new(source: &'a Document, pages: &[ObjectRef]) -> Result<Self> {
        let wanted: HashSet<ObjectRef> = pages.iter().copied().collect();
        let excluded = page_tree::page_refs(source)?
            .into_iter()
            .filter(|p| !wanted.contains(p))
            .collect();
        Ok(Self {
            source,
            map: HashMap::new(),
            excluded,
            pending: Vec::new(),
        })
    }

    /// Number of objects copied so far.
    pub fn copied(&self) -> usize {
        self.map.len()
    }

    /// Copy one page and everything it references. Inherited attributes
    /// are written onto the copy since its ancestors are not imported.
    /// Importing the same page twice returns the same object.
    pub fn import_page(&mut self, dest: &mut Document, page: ObjectRef) -> Result<ObjectRef> {
        if let Some(&done) = self.map.get(&page) {
            return Ok(done);
        }
        let mut dict: Dict = page_tree::page_dict(self.source, page)?.clone();
        for key in INHERITABLE {
            if dict.contains_key(key) {
                continue;
            }
            if let Some(value) = page_tree::inherited_raw(self.source, page, key)? {
                dict.insert(key.to_string(), value.clone());
            }
        }
        dict.remove("Parent");

        let target = dest.allocate();
        self.map.insert(page, target);
        let copy = self.translate(dest, &Object::Dictionary(dict));
        dest.put(target, copy);
        self.drain(dest);
        Ok(target)
    }

    /// Copy every page in `pages`, in order.
    pub fn import_pages(&mut self, dest: &mut Document, pages: &[ObjectRef]) -> Result<Vec<ObjectRef>> {
        pages.iter().map(|&p| self.import_page(dest, p)).collect()
    }

    fn drain(&mut self, dest: &mut Document) {
        while let Some(src) = self.pending.pop() {
            let Some(&target) = self.map.get(&src) else {
                continue;
            };
            let copy = match self.source.get(src) {
                Some(obj) => self.translate(dest, obj),
                None => Object::Null,
            };
            dest.put(target, copy);
        }
    }

    /// Clone `obj` with references rewritten into the destination. Unseen
    /// references get a number now and their body is copied by `drain`.
    fn translate(&mut self, dest: &mut Document, obj: &Object) -> Object {
        match obj {
            Object::Reference(r) => self.map_ref(dest, *r),
            Object::Array(items) => {
                Object::Array(items.iter().map(|item| self.translate(dest, item)).collect())
            },
            Object::Dictionary(dict) => Object::Dictionary(self.translate_dict(dest, dict)),
            Object::Stream { dict, data } => Object::Stream {
                dict: self.translate_dict(dest, dict),
                data: data.clone(),
            },
            other => other.clone(),
        }
    }

    fn translate_dict(&mut self, dest: &mut Document, dict: &Dict) -> Dict {
        dict.iter()
            .filter(|(key, _)| key.as_str() != "Parent")
            .map(|(key, value)| (key.clone(), self.translate(dest, value)))
            .collect()
    }

    fn map_ref(&mut self, dest: &mut Document, r: ObjectRef) -> Object {
        if let Some(&mapped) = self.map.get(&r) {
            return Object::Reference(mapped);
        }
        if self.excluded.contains(&r) {
            return Object::Null;
        }
        if self.source.get(r).is_none() {
            log::warn!("Dropping dangling reference {} while copying", r);
            return Object::Null;
        }
        let target = dest.allocate();
        self.map.insert(r, target);
        self.pending.push(r);
        Object::Reference(target)
    }
}

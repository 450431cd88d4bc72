//! Document serializer.
//!
//! Writes a complete file: header, live objects in arena order, the
//! encryption dictionary if any, a classic xref table and the trailer.
//! The same document always serializes to the same bytes.

use super::object_serializer::ObjectSerializer;
use super::reachability::live_objects;
use crate::document::Document;
use crate::error::Result;
use crate::object::{Dict, Object, ObjectRef};
use std::collections::BTreeMap;
use std::io::Write;

/// Options for [`serialize`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SerializeOptions {
    /// Minimal whitespace inside objects
    pub compact: bool,
    /// Drop objects unreachable from the trailer
    pub garbage_collect: bool,
}

impl Default for SerializeOptions {
    fn default() -> Self {
        Self {
            compact: false,
            garbage_collect: true,
        }
    }
}

impl SerializeOptions {
    /// Set compact formatting.
    pub fn with_compact(mut self, compact: bool) -> Self {
        self.compact = compact;
        self
    }

    /// Enable or disable the reachability sweep.
    pub fn with_garbage_collect(mut self, garbage_collect: bool) -> Self {
        self.garbage_collect = garbage_collect;
        self
    }
}

/// Serialize `doc`. Fails with `InvalidPassword` for a locked document.
pub fn serialize(doc: &Document, options: &SerializeOptions) -> Result<Vec<u8>> {
    doc.ensure_unlocked()?;
    let serializer = if options.compact {
        ObjectSerializer::compact()
    } else {
        ObjectSerializer::new()
    };
    let security = doc.security();

    let live = options.garbage_collect.then(|| live_objects(doc));
    let (major, minor) = doc.version();

    let mut out = Vec::new();
    write!(out, "%PDF-{}.{}\n", major, minor)?;
    out.extend_from_slice(b"%\xE2\xE3\xCF\xD3\n");

    // object number -> (offset, generation)
    let mut offsets: BTreeMap<u32, (usize, u16)> = BTreeMap::new();
    let mut skipped = 0usize;
    for (id, obj) in doc.iter() {
        if live.as_ref().map_or(false, |live| !live.contains(&id)) {
            skipped += 1;
            continue;
        }
        offsets.insert(id.num, (out.len(), id.gen));
        out.extend_from_slice(&serializer.serialize_indirect(id, obj, security)?);
    }
    if skipped > 0 {
        log::debug!("Dropped {} unreachable objects", skipped);
    }

    let encrypt_ref = match security {
        Some(state) => {
            let id = ObjectRef::new(doc.next_object_number(), 0);
            offsets.insert(id.num, (out.len(), 0));
            let dict = Object::Dictionary(state.encrypt_dict.clone());
            out.extend_from_slice(&serializer.serialize_indirect(id, &dict, None)?);
            Some(id)
        },
        None => None,
    };

    let size = offsets.keys().next_back().map_or(1, |last| last + 1);
    let xref_offset = out.len();
    write!(out, "xref\n0 {}\n", size)?;
    for num in 0..size {
        match offsets.get(&num) {
            Some((offset, gen)) => write!(out, "{:010} {:05} n \n", offset, gen)?,
            None => out.extend_from_slice(b"0000000000 65535 f \n"),
        }
    }

    let trailer = build_trailer(doc, size, live.as_ref(), encrypt_ref);
    out.extend_from_slice(b"trailer\n");
    out.extend_from_slice(&serializer.serialize(&Object::Dictionary(trailer))?);
    write!(out, "\nstartxref\n{}\n%%EOF\n", xref_offset)?;
    Ok(out)
}

fn build_trailer(
    doc: &Document,
    size: u32,
    live: Option<&std::collections::HashSet<ObjectRef>>,
    encrypt_ref: Option<ObjectRef>,
) -> Dict {
    let mut trailer = Dict::new();
    trailer.insert("Size".to_string(), Object::Integer(size as i64));
    for key in ["Root", "Info"] {
        let Some(Object::Reference(r)) = doc.trailer().get(key) else {
            continue;
        };
        let present = doc.get(*r).is_some() && live.map_or(true, |live| live.contains(r));
        if present {
            trailer.insert(key.to_string(), Object::Reference(*r));
        }
    }
    if let Some(id) = doc.trailer().get("ID") {
        trailer.insert("ID".to_string(), id.clone());
    }
    if let Some(r) = encrypt_ref {
        trailer.insert("Encrypt".to_string(), Object::Reference(r));
    }
    trailer
}

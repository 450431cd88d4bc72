//! Reachability sweep over the object graph.
//!
//! Objects not reachable from the trailer are garbage: pages dropped by a
//! delete or split, replaced content streams, old page tree nodes.

use crate::document::Document;
use crate::object::{Object, ObjectRef};
use std::collections::HashSet;

/// Objects reachable from the trailer's `/Root` and `/Info`.
///
/// A stream's `/Length` edge is not followed because the serializer always
/// writes the length directly. Dangling references are ignored.
pub fn live_objects(doc: &Document) -> HashSet<ObjectRef> {
    let mut live = HashSet::new();
    let mut stack: Vec<ObjectRef> = ["Root", "Info"]
        .iter()
        .filter_map(|key| doc.trailer().get(*key))
        .filter_map(|o| o.as_reference())
        .collect();

    let mut edges = Vec::new();
    while let Some(r) = stack.pop() {
        let Some(obj) = doc.get(r) else {
            continue;
        };
        if !live.insert(r) {
            continue;
        }
        edges.clear();
        match obj {
            Object::Stream { dict, .. } => {
                for (key, value) in dict {
                    if key != "Length" {
                        value.collect_references(&mut edges);
                    }
                }
            },
            other => other.collect_references(&mut edges),
        }
        stack.extend(edges.iter().filter(|e| !live.contains(*e)));
    }
    live
}

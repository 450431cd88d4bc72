//! Page-level restructuring: merge, split, extract, delete, keep, move.
//!
//! Operators that produce new documents copy pages through an
//! [`ObjectImporter`] into a fresh [`Document`]; the outputs carry a new
//! catalog and no encryption. In-place operators rewrite the page tree of
//! a working copy.

use super::import::ObjectImporter;
use super::transact;
use crate::document::Document;
use crate::error::{Error, Result};
use crate::object::ObjectRef;
use crate::page_tree;
use crate::progress::Monitor;
use std::collections::HashSet;

/// Concatenate the pages of `docs`, in order, into a new document.
pub fn merge(docs: &[&Document], monitor: &Monitor) -> Result<Document> {
    let monitor = monitor.for_operation("merge");
    let mut parts = Vec::with_capacity(docs.len());
    for doc in docs {
        doc.ensure_unlocked()?;
        parts.push((*doc, page_tree::page_refs(doc)?));
    }
    let total = parts.iter().map(|(_, p)| p.len()).sum();
    let out = assemble(&parts, &monitor, 0, total)?;
    log::debug!("Merged {} documents into {} pages", docs.len(), page_tree::page_count(&out)?);
    Ok(out)
}

/// A new document with exactly the pages at `indices`, in that order.
/// Repeated indices produce repeated pages.
pub fn extract_pages(doc: &Document, indices: &[usize], monitor: &Monitor) -> Result<Document> {
    doc.ensure_unlocked()?;
    let monitor = monitor.for_operation("extract");
    let refs = page_tree::page_refs(doc)?;
    let selected = select(&refs, indices)?;
    let total = selected.len();
    assemble(&[(doc, selected)], &monitor, 0, total)
}

/// Split into contiguous ranges. `boundaries` are the first page index of
/// every range after the first; they must be strictly increasing and lie
/// in `1..page_count`.
pub fn split(doc: &Document, boundaries: &[usize], monitor: &Monitor) -> Result<Vec<Document>> {
    doc.ensure_unlocked()?;
    let monitor = monitor.for_operation("split");
    let refs = page_tree::page_refs(doc)?;
    let count = refs.len();
    if count == 0 {
        return Err(Error::InvalidPageRange("document has no pages to split".to_string()));
    }

    let mut starts = Vec::with_capacity(boundaries.len() + 1);
    starts.push(0);
    for &b in boundaries {
        let prev = starts.last().copied().unwrap_or(0);
        if b <= prev || b >= count {
            return Err(Error::InvalidPageRange(format!(
                "split boundary {} must be increasing and inside 1..{}",
                b, count
            )));
        }
        starts.push(b);
    }

    let mut outputs = Vec::with_capacity(starts.len());
    for (i, &start) in starts.iter().enumerate() {
        let end = starts.get(i + 1).copied().unwrap_or(count);
        let part = refs[start..end].to_vec();
        outputs.push(assemble(&[(doc, part)], &monitor, start, count)?);
    }
    Ok(outputs)
}

/// One single-page document per page.
pub fn split_each_page(doc: &Document, monitor: &Monitor) -> Result<Vec<Document>> {
    let count = page_tree::page_count(doc)?;
    let boundaries: Vec<usize> = (1..count).collect();
    split(doc, &boundaries, monitor)
}

/// Unlink the pages at `indices`. Removing every page is rejected.
pub fn delete_pages(doc: &mut Document, indices: &[usize], monitor: &Monitor) -> Result<()> {
    let monitor = monitor.for_operation("delete");
    transact(doc, |doc| {
        let refs = page_tree::page_refs(doc)?;
        let count = refs.len();
        let doomed: HashSet<usize> = indices.iter().copied().collect();
        if let Some(&index) = doomed.iter().find(|&&i| i >= count) {
            return Err(Error::PageOutOfRange { index, count });
        }
        if doomed.len() == count {
            return Err(Error::InvalidPageRange("cannot delete every page".to_string()));
        }
        let mut remaining = Vec::with_capacity(count - doomed.len());
        for (i, page) in refs.into_iter().enumerate() {
            monitor.check(i, count)?;
            if !doomed.contains(&i) {
                remaining.push(page);
            }
            monitor.report(i + 1, count);
        }
        page_tree::set_page_order(doc, &remaining)
    })
}

/// Keep only the pages at `indices`, in that order. Indices past the end
/// are skipped.
pub fn keep_pages(doc: &mut Document, indices: &[usize], monitor: &Monitor) -> Result<()> {
    let monitor = monitor.for_operation("keep");
    transact(doc, |doc| {
        let refs = page_tree::page_refs(doc)?;
        let count = refs.len();
        let kept: Vec<ObjectRef> = indices
            .iter()
            .filter_map(|&i| {
                let page = refs.get(i).copied();
                if page.is_none() {
                    log::warn!("Ignoring page index {} beyond {} pages", i, count);
                }
                page
            })
            .collect();
        if kept.is_empty() {
            return Err(Error::InvalidPageRange("no pages left to keep".to_string()));
        }
        monitor.check(0, kept.len())?;
        page_tree::set_page_order(doc, &kept)?;
        monitor.report(kept.len(), kept.len());
        Ok(())
    })
}

/// Move the page at `from` so that it ends up at `to`.
pub fn move_page(doc: &mut Document, from: usize, to: usize) -> Result<()> {
    transact(doc, |doc| page_tree::move_page(doc, from, to))
}

fn select(refs: &[ObjectRef], indices: &[usize]) -> Result<Vec<ObjectRef>> {
    indices
        .iter()
        .map(|&index| {
            refs.get(index).copied().ok_or(Error::PageOutOfRange {
                index,
                count: refs.len(),
            })
        })
        .collect()
}

/// Build a new document from pages of one or more sources. Progress is
/// reported from `offset` out of `total`.
fn assemble(
    parts: &[(&Document, Vec<ObjectRef>)],
    monitor: &Monitor,
    offset: usize,
    total: usize,
) -> Result<Document> {
    let mut out = Document::new();
    let mut order = Vec::new();
    let mut step = offset;
    for (source, pages) in parts {
        out.set_version(out.version().max(source.version()));
        let mut importer = ObjectImporter::new(source, pages)?;
        for &page in pages {
            let index = step;
            let copied = monitor.step(step, total, || {
                importer.import_page(&mut out, page).map_err(|e| e.on_page(index))
            })?;
            order.push(copied);
            step += 1;
        }
    }
    page_tree::set_page_order(&mut out, &order)?;
    Ok(out)
}

//! Integration tests for serialization.

mod common;

use common::{classic_pdf, numbered, page_texts};
use pdf_engine::ops;
use pdf_engine::progress::Monitor;
use pdf_engine::writer::{serialize, SerializeOptions};
use pdf_engine::{page_tree, Document, Object, ObjectRef};

fn count(haystack: &[u8], needle: &[u8]) -> usize {
    haystack.windows(needle.len()).filter(|w| *w == needle).count()
}

#[test]
fn test_round_trip_preserves_pages() {
    let doc = numbered(4);
    let bytes = serialize(&doc, &SerializeOptions::default()).unwrap();
    assert!(bytes.starts_with(b"%PDF-1."));
    assert!(bytes.ends_with(b"%%EOF\n"));

    let reread = Document::parse(&bytes).unwrap();
    assert_eq!(page_texts(&reread), page_texts(&doc));
}

#[test]
fn test_serialization_reaches_fixpoint() {
    let doc = numbered(3);
    let first = serialize(&doc, &SerializeOptions::default()).unwrap();
    assert_eq!(first, serialize(&doc, &SerializeOptions::default()).unwrap());

    let second = serialize(&Document::parse(&first).unwrap(), &SerializeOptions::default()).unwrap();
    let third = serialize(&Document::parse(&second).unwrap(), &SerializeOptions::default()).unwrap();
    assert_eq!(second, third);
}

#[test]
fn test_xref_offsets_point_at_objects() {
    let bytes = serialize(&numbered(2), &SerializeOptions::default()).unwrap();
    // a strict parse never falls back to scanning
    let doc = Document::parse_with_options(&bytes, pdf_engine::parser_config::ParserOptions::strict()).unwrap();
    assert_eq!(page_tree::page_count(&doc).unwrap(), 2);
}

#[test]
fn test_deleted_pages_are_collected() {
    let mut doc = numbered(3);
    ops::delete_pages(&mut doc, &[1], &Monitor::new()).unwrap();

    let collected = serialize(&doc, &SerializeOptions::default()).unwrap();
    assert_eq!(count(&collected, b"(Page 2)"), 0);
    assert_eq!(count(&collected, b"(Page 3)"), 1);

    let kept = serialize(&doc, &SerializeOptions::default().with_garbage_collect(false)).unwrap();
    assert_eq!(count(&kept, b"(Page 2)"), 1);
}

#[test]
fn test_orphans_dropped_and_dangling_trailer_entries_omitted() {
    let data = classic_pdf(
        &[
            "<< /Type /Catalog /Pages 2 0 R >>",
            "<< /Type /Pages /Kids [3 0 R] /Count 1 >>",
            "<< /Type /Page /Parent 2 0 R >>",
            "<< /Orphan (left behind) >>",
        ],
        "/Info 9 0 R",
    );
    let doc = Document::parse(&data).unwrap();
    let bytes = serialize(&doc, &SerializeOptions::default()).unwrap();
    assert_eq!(count(&bytes, b"left behind"), 0);
    assert_eq!(count(&bytes, b"/Info"), 0);

    let reread = Document::parse(&bytes).unwrap();
    assert!(reread.get(ObjectRef::new(4, 0)).is_none());
    assert_eq!(page_tree::page_count(&reread).unwrap(), 1);
}

#[test]
fn test_compact_output_is_smaller() {
    let doc = numbered(5);
    let normal = serialize(&doc, &SerializeOptions::default()).unwrap();
    let compact = serialize(&doc, &SerializeOptions::default().with_compact(true)).unwrap();
    assert!(compact.len() < normal.len());
    assert_eq!(page_texts(&Document::parse(&compact).unwrap()), page_texts(&doc));
}

#[test]
fn test_info_entries_survive() {
    let mut doc = numbered(1);
    doc.set_info("Producer", Object::string("pdf_engine tests"));
    let reread = Document::parse(&serialize(&doc, &SerializeOptions::default()).unwrap()).unwrap();
    let info = reread.info().unwrap();
    assert_eq!(info.get("Producer"), Some(&Object::string("pdf_engine tests")));
}

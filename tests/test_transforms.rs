//! Integration tests for the page transform operators.

mod common;

use common::{classic_pdf, labelled, numbered, page_texts, reparse};
use pdf_engine::ops::{self, CompressOptions, Layer, PageSelection, TextInsertion, WatermarkConfig};
use pdf_engine::page_tree;
use pdf_engine::progress::{CancellationToken, Monitor};
use pdf_engine::{Document, Error, ErrorKind, Object};

mod restructuring {
    use super::*;

    #[test]
    fn test_split_then_merge_restores_order() {
        let doc = numbered(10);
        let parts = ops::split(&doc, &[3, 7], &Monitor::new()).unwrap();
        let sizes: Vec<usize> = parts.iter().map(|p| page_tree::page_count(p).unwrap()).collect();
        assert_eq!(sizes, vec![3, 4, 3]);

        let refs: Vec<_> = parts.iter().collect();
        let merged = ops::merge(&refs, &Monitor::new()).unwrap();
        assert_eq!(page_texts(&merged), page_texts(&doc));
        assert_eq!(page_texts(&reparse(&merged)), page_texts(&doc));
    }

    #[test]
    fn test_merge_then_split_at_boundary() {
        let a = labelled(&["a1", "a2"]);
        let b = labelled(&["b1", "b2", "b3"]);
        let merged = ops::merge(&[&a, &b], &Monitor::new()).unwrap();
        let parts = ops::split(&merged, &[2], &Monitor::new()).unwrap();
        assert_eq!(parts.len(), 2);
        assert_eq!(page_texts(&parts[0]), page_texts(&a));
        assert_eq!(page_texts(&parts[1]), page_texts(&b));
    }

    #[test]
    fn test_merge_keeps_duplicates() {
        let a = labelled(&["alpha"]);
        let merged = ops::merge(&[&a, &a], &Monitor::new()).unwrap();
        assert_eq!(page_texts(&merged), vec!["alpha", "alpha"]);
    }

    #[test]
    fn test_extract_selection() {
        let doc = numbered(10);
        let selection = PageSelection::parse("1,3-5,8", 10).unwrap();
        let indices = selection.indices(10).unwrap();
        let out = ops::extract_pages(&doc, &indices, &Monitor::new()).unwrap();
        assert_eq!(page_texts(&out), vec!["Page 1", "Page 3", "Page 4", "Page 5", "Page 8"]);
    }

    #[test]
    fn test_delete_first_page() {
        let mut doc = numbered(10);
        ops::delete_pages(&mut doc, &[0], &Monitor::new()).unwrap();
        let texts = page_texts(&doc);
        assert_eq!(texts.len(), 9);
        assert_eq!(texts[0], "Page 2");
        assert_eq!(page_texts(&reparse(&doc)), texts);
    }

    #[test]
    fn test_delete_every_page_rejected_and_untouched() {
        let mut doc = numbered(2);
        let err = ops::delete_pages(&mut doc, &[0, 1], &Monitor::new()).unwrap_err();
        assert!(matches!(err, Error::InvalidPageRange(_)));
        assert_eq!(page_texts(&doc), vec!["Page 1", "Page 2"]);
    }

    #[test]
    fn test_split_rejects_bad_boundaries() {
        let doc = numbered(4);
        assert!(ops::split(&doc, &[0], &Monitor::new()).is_err());
        assert!(ops::split(&doc, &[2, 2], &Monitor::new()).is_err());
        assert!(ops::split(&doc, &[4], &Monitor::new()).is_err());
    }

    #[test]
    fn test_cancelled_merge() {
        let doc = numbered(3);
        let token = CancellationToken::new();
        token.cancel();
        let monitor = Monitor::new().with_token(token);
        let err = ops::merge(&[&doc], &monitor).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Cancelled);
    }
}

mod content_edits {
    use super::*;

    /// One page whose `/Contents` points at an array of two streams.
    fn indirect_contents(trailer_extra: &str) -> Vec<u8> {
        classic_pdf(
            &[
                "<< /Type /Catalog /Pages 2 0 R >>",
                "<< /Type /Pages /Kids [3 0 R] /Count 1 >>",
                "<< /Type /Page /Parent 2 0 R /MediaBox [0 0 612 792] /Contents 4 0 R >>",
                "[5 0 R 6 0 R]",
                "<< /Length 15 >>\nstream\nBT (Head) Tj ET\nendstream",
                "<< /Length 15 >>\nstream\nBT (Tail) Tj ET\nendstream",
            ],
            trailer_extra,
        )
    }

    #[test]
    fn test_watermark_keeps_indirect_contents_array() {
        let mut doc = Document::parse(&indirect_contents("")).unwrap();
        let before = &page_texts(&doc)[0];
        assert!(before.contains("Head") && before.contains("Tail"));
        ops::watermark(&mut doc, &WatermarkConfig::new("DRAFT"), &PageSelection::All, &Monitor::new()).unwrap();

        let text = &page_texts(&reparse(&doc))[0];
        let (head, tail, mark) = (text.find("Head"), text.find("Tail"), text.find("DRAFT"));
        assert!(head.is_some() && tail.is_some() && mark.is_some(), "{:?}", text);
        assert!(head < tail && tail < mark, "{:?}", text);
    }

    #[test]
    fn test_insert_text_keeps_indirect_contents_array() {
        let mut doc = Document::parse(&indirect_contents("")).unwrap();
        ops::insert_text(&mut doc, 0, &TextInsertion::new("note", 72.0, 72.0)).unwrap();
        let text = &page_texts(&reparse(&doc))[0];
        assert!(text.contains("Head") && text.contains("Tail") && text.contains("note"), "{:?}", text);
    }

    #[test]
    fn test_edit_after_oversized_trailer_size() {
        let data = String::from_utf8(indirect_contents(""))
            .unwrap()
            .replace("/Size 7 ", "/Size 4294967295 ");
        let mut doc = Document::parse(data.as_bytes()).unwrap();
        ops::insert_text(&mut doc, 0, &TextInsertion::new("note", 72.0, 72.0)).unwrap();
        assert!(doc.next_object_number() <= pdf_engine::document::MAX_OBJECT_NUMBER);
        assert!(page_texts(&reparse(&doc))[0].contains("note"));
    }

    #[test]
    fn test_rotate_selected_pages() {
        let mut doc = numbered(3);
        let selection = PageSelection::Pages(vec![1]);
        ops::rotate(&mut doc, &selection, -90, &Monitor::new()).unwrap();
        let refs = page_tree::page_refs(&doc).unwrap();
        assert_eq!(page_tree::rotation(&doc, refs[0]).unwrap(), 0);
        assert_eq!(page_tree::rotation(&doc, refs[1]).unwrap(), 270);

        let err = ops::rotate(&mut doc, &PageSelection::All, 45, &Monitor::new()).unwrap_err();
        assert!(matches!(err, Error::InvalidRotation(45)));
    }

    #[test]
    fn test_watermark_adds_text_and_opacity() {
        let mut doc = numbered(2);
        let config = WatermarkConfig::new("DRAFT").with_opacity(0.25);
        ops::watermark(&mut doc, &config, &PageSelection::All, &Monitor::new()).unwrap();

        let reread = reparse(&doc);
        for (i, text) in page_texts(&reread).iter().enumerate() {
            assert!(text.contains(&format!("Page {}", i + 1)), "page {}: {:?}", i, text);
            assert!(text.contains("DRAFT"), "page {}: {:?}", i, text);
        }
        let has_gs = reread.iter().any(|(_, obj)| {
            obj.as_dict()
                .map_or(false, |d| d.get("ca") == Some(&Object::Real(0.25)))
        });
        assert!(has_gs);
    }

    #[test]
    fn test_background_watermark_precedes_content() {
        let mut doc = labelled(&["body"]);
        let config = WatermarkConfig::new("BACK").with_layer(Layer::Background);
        ops::watermark(&mut doc, &config, &PageSelection::All, &Monitor::new()).unwrap();
        let text = &page_texts(&doc)[0];
        let back = text.find("BACK").unwrap();
        let body = text.find("body").unwrap();
        assert!(back < body);
    }

    #[test]
    fn test_insert_text_on_page() {
        let mut doc = numbered(2);
        ops::insert_text(&mut doc, 1, &TextInsertion::new("note", 72.0, 72.0)).unwrap();
        let texts = page_texts(&reparse(&doc));
        assert_eq!(texts[0], "Page 1");
        assert!(texts[1].contains("note"));

        let err = ops::insert_text(&mut doc, 5, &TextInsertion::new("x", 0.0, 0.0)).unwrap_err();
        assert!(matches!(err, Error::PageOutOfRange { index: 5, .. }));
    }

    #[test]
    fn test_compress_keeps_text() {
        let mut doc = numbered(3);
        let stats = ops::compress(&mut doc, &CompressOptions::default(), &Monitor::new()).unwrap();
        assert!(stats.streams >= 3);
        assert_eq!(page_texts(&reparse(&doc)), vec!["Page 1", "Page 2", "Page 3"]);
    }
}

//! Integration tests for parsing, recovery and lazy stream decoding.

mod common;

use common::{classic_pdf, page_texts, xref_stream_pdf};
use flate2::write::ZlibEncoder;
use flate2::Compression;
use pdf_engine::parser_config::ParserOptions;
use pdf_engine::{page_tree, Document, Error, ErrorKind, Object, ObjectRef};
use std::io::Write;

fn zlib(data: &[u8]) -> Vec<u8> {
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data).unwrap();
    encoder.finish().unwrap()
}

/// A page whose content stream is Flate-compressed.
fn flate_content_pdf(content: &[u8]) -> Vec<u8> {
    let compressed = zlib(content);
    let mut out = b"%PDF-1.4\n".to_vec();
    let mut offsets = Vec::new();
    let bodies: [&[u8]; 3] = [
        b"<< /Type /Catalog /Pages 2 0 R >>",
        b"<< /Type /Pages /Kids [3 0 R] /Count 1 >>",
        b"<< /Type /Page /Parent 2 0 R /Contents 4 0 R >>",
    ];
    for (i, body) in bodies.iter().enumerate() {
        offsets.push(out.len());
        out.extend_from_slice(format!("{} 0 obj\n", i + 1).as_bytes());
        out.extend_from_slice(body);
        out.extend_from_slice(b"\nendobj\n");
    }
    offsets.push(out.len());
    out.extend_from_slice(
        format!("4 0 obj\n<< /Length {} /Filter /FlateDecode >>\nstream\n", compressed.len()).as_bytes(),
    );
    out.extend_from_slice(&compressed);
    out.extend_from_slice(b"\nendstream\nendobj\n");
    let xref = out.len();
    out.extend_from_slice(b"xref\n0 5\n0000000000 65535 f \n");
    for off in offsets {
        out.extend_from_slice(format!("{:010} 00000 n \n", off).as_bytes());
    }
    out.extend_from_slice(format!("trailer\n<< /Size 5 /Root 1 0 R >>\nstartxref\n{}\n%%EOF\n", xref).as_bytes());
    out
}

mod parsing {
    use super::*;

    #[test]
    fn test_xref_stream_with_object_stream() {
        let header = "4 0 ";
        let member = "<< /Type /Page /Parent 2 0 R /MediaBox [0 0 200 300] >>";
        let body = format!("{}{}", header, member);
        let objstm = format!(
            "<< /Type /ObjStm /N 1 /First {} /Length {} >>\nstream\n{}\nendstream",
            header.len(),
            body.len(),
            body
        );
        let data = xref_stream_pdf(
            &[
                "<< /Type /Catalog /Pages 2 0 R >>",
                "<< /Type /Pages /Kids [4 0 R] /Count 1 >>",
                &objstm,
            ],
            &[(4, 3, 0)],
        );
        let doc = Document::parse(&data).unwrap();
        assert_eq!(doc.version(), (1, 5));
        let page = page_tree::page_ref(&doc, 0).unwrap();
        assert_eq!(page, ObjectRef::new(4, 0));
        assert_eq!(page_tree::media_box(&doc, page).unwrap(), [0.0, 0.0, 200.0, 300.0]);
        // containers and the xref stream are not part of the arena
        assert!(doc.get(ObjectRef::new(3, 0)).is_none());
        assert!(doc.get(ObjectRef::new(5, 0)).is_none());
    }

    #[test]
    fn test_truncated_file_recovered() {
        let data = classic_pdf(
            &[
                "<< /Type /Catalog /Pages 2 0 R >>",
                "<< /Type /Pages /Kids [3 0 R] /Count 1 >>",
                "<< /Type /Page /Parent 2 0 R >>",
            ],
            "",
        );
        let cut = data.windows(4).position(|w| w == b"xref").unwrap();
        let doc = Document::parse(&data[..cut]).unwrap();
        assert_eq!(page_tree::page_count(&doc).unwrap(), 1);

        let err = Document::parse_with_options(&data[..cut], ParserOptions::strict()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ParseError);
    }

    #[test]
    fn test_garbage_is_rejected() {
        let err = Document::parse(b"hello world, not a pdf").unwrap_err();
        assert!(matches!(err, Error::InvalidHeader(_)));
        assert_eq!(err.kind(), ErrorKind::ParseError);
    }

    #[test]
    fn test_load_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("doc.pdf");
        std::fs::write(&path, flate_content_pdf(b"BT (disk) Tj ET")).unwrap();
        let doc = Document::load(&path).unwrap();
        assert_eq!(page_texts(&doc), vec!["disk"]);
    }
}

mod streams {
    use super::*;

    #[test]
    fn test_flate_content_decoded_lazily() {
        let doc = Document::parse(&flate_content_pdf(b"BT (compressed text) Tj ET")).unwrap();
        let r = ObjectRef::new(4, 0);
        // raw bytes are kept as read
        match doc.get(r) {
            Some(Object::Stream { data, .. }) => assert_ne!(&data[..], b"BT (compressed text) Tj ET"),
            other => panic!("expected stream, got {:?}", other),
        }
        assert_eq!(&doc.decoded_stream(r).unwrap()[..], b"BT (compressed text) Tj ET");
        assert_eq!(page_texts(&doc), vec!["compressed text"]);
    }

    #[test]
    fn test_unknown_filter_surfaces_on_decode() {
        let data = classic_pdf(
            &[
                "<< /Type /Catalog /Pages 2 0 R >>",
                "<< /Type /Pages /Kids [] /Count 0 >>",
                "<< /Length 3 /Filter /MysteryDecode >>\nstream\nabc\nendstream",
            ],
            "",
        );
        // parsing does not decode
        let doc = Document::parse(&data).unwrap();
        let err = doc.decoded_stream(ObjectRef::new(3, 0)).unwrap_err();
        assert!(matches!(err, Error::UnsupportedFilter(_)));
        assert_eq!(err.kind(), ErrorKind::UnsupportedFilter);
    }

    #[test]
    fn test_image_codecs_pass_through() {
        let data = classic_pdf(
            &[
                "<< /Type /Catalog /Pages 2 0 R >>",
                "<< /Type /Pages /Kids [] /Count 0 >>",
                "<< /Length 4 /Filter /DCTDecode >>\nstream\n\u{1}\u{2}\u{3}\u{4}\nendstream",
            ],
            "",
        );
        let doc = Document::parse(&data).unwrap();
        assert_eq!(&doc.decoded_stream(ObjectRef::new(3, 0)).unwrap()[..], &[1, 2, 3, 4]);
    }
}

mod identities {
    use super::*;

    #[test]
    fn test_allocation_never_reuses_numbers() {
        let mut doc = Document::new();
        let a = doc.add_object(Object::Integer(1));
        doc.remove(a);
        let b = doc.add_object(Object::Integer(2));
        assert!(b.num > a.num);
    }

    #[test]
    fn test_dangling_reference_tolerated_where_safe() {
        let data = classic_pdf(
            &[
                "<< /Type /Catalog /Pages 2 0 R >>",
                "<< /Type /Pages /Kids [3 0 R 9 0 R] /Count 2 >>",
                "<< /Type /Page /Parent 2 0 R /Annots 8 0 R >>",
            ],
            "",
        );
        let doc = Document::parse(&data).unwrap();
        // the missing kid is skipped, the missing annotation array reads as null
        assert_eq!(page_tree::page_count(&doc).unwrap(), 1);
        let page = page_tree::page_dict(&doc, ObjectRef::new(3, 0)).unwrap();
        assert!(doc.dict_get(page, "Annots").unwrap().is_none());
    }
}

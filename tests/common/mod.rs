//! Shared fixtures for the integration tests.

#![allow(dead_code)]

use pdf_engine::ops::{extract_text, PageSelection};
use pdf_engine::writer::{serialize, DocumentBuilder, SerializeOptions};
use pdf_engine::Document;

/// Assemble a PDF with a classic xref table from object bodies numbered
/// `1..=n`.
pub fn classic_pdf(bodies: &[&str], trailer_extra: &str) -> Vec<u8> {
    let mut out = b"%PDF-1.4\n".to_vec();
    let mut offsets = Vec::new();
    for (i, body) in bodies.iter().enumerate() {
        offsets.push(out.len());
        out.extend_from_slice(format!("{} 0 obj\n{}\nendobj\n", i + 1, body).as_bytes());
    }
    let xref = out.len();
    out.extend_from_slice(format!("xref\n0 {}\n0000000000 65535 f \n", bodies.len() + 1).as_bytes());
    for off in offsets {
        out.extend_from_slice(format!("{:010} 00000 n \n", off).as_bytes());
    }
    out.extend_from_slice(
        format!(
            "trailer\n<< /Size {} /Root 1 0 R {} >>\nstartxref\n{}\n%%EOF\n",
            bodies.len() + 1,
            trailer_extra,
            xref
        )
        .as_bytes(),
    );
    out
}

/// Assemble a PDF indexed by an uncompressed cross-reference stream.
///
/// `bodies` are numbered `1..=n`; `packed` lists objects stored in object
/// streams as `(number, container, index)`. The xref stream itself gets
/// number `n + packed.len() + 1`.
pub fn xref_stream_pdf(bodies: &[&str], packed: &[(u32, u32, u16)]) -> Vec<u8> {
    let mut out = b"%PDF-1.5\n".to_vec();
    let mut offsets = Vec::new();
    for (i, body) in bodies.iter().enumerate() {
        offsets.push(out.len());
        out.extend_from_slice(format!("{} 0 obj\n{}\nendobj\n", i + 1, body).as_bytes());
    }
    let xref_num = bodies.len() + packed.len() + 1;
    let xref_offset = out.len();

    let row = |kind: u8, field2: u32, field3: u16| {
        let mut r = vec![kind];
        r.extend_from_slice(&field2.to_be_bytes());
        r.extend_from_slice(&field3.to_be_bytes());
        r
    };
    let mut rows = row(0, 0, 65535);
    for off in &offsets {
        rows.extend(row(1, *off as u32, 0));
    }
    let mut packed = packed.to_vec();
    packed.sort_by_key(|p| p.0);
    for (_, container, index) in &packed {
        rows.extend(row(2, *container, *index));
    }
    rows.extend(row(1, xref_offset as u32, 0));

    out.extend_from_slice(
        format!(
            "{} 0 obj\n<< /Type /XRef /Size {} /W [1 4 2] /Root 1 0 R /Length {} >>\nstream\n",
            xref_num,
            xref_num + 1,
            rows.len()
        )
        .as_bytes(),
    );
    out.extend_from_slice(&rows);
    out.extend_from_slice(format!("\nendstream\nendobj\nstartxref\n{}\n%%EOF\n", xref_offset).as_bytes());
    out
}

/// A document whose page `i` shows `labels[i]`.
pub fn labelled(labels: &[&str]) -> Document {
    let mut builder = DocumentBuilder::new();
    for label in labels {
        builder.letter_page().text(label).done();
    }
    builder.build_document().expect("fixture document")
}

/// A document with pages "Page 1" to "Page n".
pub fn numbered(n: usize) -> Document {
    let labels: Vec<String> = (1..=n).map(|i| format!("Page {}", i)).collect();
    let refs: Vec<&str> = labels.iter().map(String::as_str).collect();
    labelled(&refs)
}

/// Text of every page.
pub fn page_texts(doc: &Document) -> Vec<String> {
    extract_text(doc, &PageSelection::All)
        .expect("selection")
        .map(|p| p.expect("page text").text)
        .collect()
}

/// Serialize and parse again.
pub fn reparse(doc: &Document) -> Document {
    let bytes = serialize(doc, &SerializeOptions::default()).expect("serialize");
    Document::parse(&bytes).expect("reparse")
}

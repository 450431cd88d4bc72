//! Cross-reference reconstruction for damaged files.
//!
//! When the index named by `startxref` is missing or points at the wrong
//! bytes, the whole file is scanned for `N G obj` headers. Each candidate
//! is parsed in place; the scan resumes after the parsed object so headers
//! that happen to appear inside stream data are not picked up. Later
//! definitions of the same number win, matching incremental-update order.

use crate::error::{Error, Result};
use crate::object::{Dict, Object, ObjectRef};
use crate::parser::{parse_indirect_object, parse_object};
use crate::xref::{parse_xref_stream, CrossRefTable, XRefEntry};
use lazy_static::lazy_static;

lazy_static! {
    /// "N G obj" headers
    static ref RE_OBJ_HEADER: regex::bytes::Regex =
        regex::bytes::Regex::new(r"(\d{1,10})\s+(\d{1,5})\s+obj").unwrap();

    /// "trailer <<"
    static ref RE_TRAILER: regex::bytes::Regex = regex::bytes::Regex::new(r"trailer\s*<<").unwrap();
}

/// Rebuild the cross-reference table and trailer by scanning `data`.
pub fn reconstruct_xref(data: &[u8], max_nesting: usize) -> Result<CrossRefTable> {
    log::info!("Reconstructing cross-reference index by scanning {} bytes", data.len());

    let mut table = CrossRefTable::new();
    let mut xref_stream_trailer: Option<Dict> = None;
    let mut catalog: Option<ObjectRef> = None;
    let mut cursor = 0;

    while let Some(caps) = RE_OBJ_HEADER.captures_at(data, cursor) {
        let Some(whole) = caps.get(0) else { break };
        let start = whole.start();
        cursor = whole.end();

        // the number must not be the tail of a longer token
        if start > 0 && data[start - 1].is_ascii_alphanumeric() {
            continue;
        }
        if data.get(whole.end()).is_some_and(|c| c.is_ascii_alphanumeric()) {
            continue;
        }

        let Ok((rest, (id, obj))) = parse_indirect_object(&data[start..], max_nesting) else {
            log::debug!("Header at {} does not parse as an object", start);
            continue;
        };
        cursor = data.len() - rest.len();

        match obj.dict_type() {
            Some("XRef") => {
                if let Ok(section) = parse_xref_stream(&obj, start) {
                    xref_stream_trailer = Some(section.trailer().clone());
                }
            },
            Some("Catalog") if catalog.is_none() => catalog = Some(id),
            _ => {},
        }

        table.add_entry(
            id.num,
            XRefEntry::InUse {
                offset: start,
                gen: id.gen,
            },
        );
    }

    if table.is_empty() {
        return Err(Error::ParseError {
            offset: 0,
            reason: "no objects found while scanning file".to_string(),
        });
    }

    let trailer = find_trailer(data)
        .or(xref_stream_trailer.filter(|t| t.contains_key("Root")))
        .or_else(|| {
            catalog.map(|root| {
                log::warn!("No trailer found; using catalog {} as /Root", root);
                let mut d = Dict::new();
                d.insert("Root".to_string(), Object::Reference(root));
                d
            })
        })
        .unwrap_or_default();
    table.set_trailer(trailer);

    log::info!("Reconstructed {} objects", table.len());
    Ok(table)
}

/// Last parsable `trailer` dictionary that names a `/Root`.
fn find_trailer(data: &[u8]) -> Option<Dict> {
    RE_TRAILER
        .find_iter(data)
        .filter_map(|m| {
            let dict_start = m.start() + b"trailer".len();
            match parse_object(&data[dict_start..]) {
                Ok((_, Object::Dictionary(d))) if d.contains_key("Root") => Some(d),
                _ => None,
            }
        })
        .last()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scan_finds_objects_and_trailer() {
        let data = b"%PDF-1.4\n1 0 obj\n<< /Type /Catalog /Pages 2 0 R >>\nendobj\n2 0 obj\n<< /Type /Pages /Kids [] /Count 0 >>\nendobj\ntrailer\n<< /Root 1 0 R >>\n%%EOF";
        let table = reconstruct_xref(data, 64).unwrap();
        assert_eq!(table.len(), 2);
        assert_eq!(table.get(1), Some(&XRefEntry::InUse { offset: 9, gen: 0 }));
        assert!(table.trailer().contains_key("Root"));
    }

    #[test]
    fn test_missing_trailer_uses_catalog() {
        let data = b"%PDF-1.4\n4 0 obj\n<< /Type /Catalog >>\nendobj\n";
        let table = reconstruct_xref(data, 64).unwrap();
        assert_eq!(
            table.trailer().get("Root"),
            Some(&Object::Reference(ObjectRef::new(4, 0)))
        );
    }

    #[test]
    fn test_later_definition_wins() {
        let data = b"1 0 obj\n(old)\nendobj\n1 0 obj\n(new)\nendobj\n";
        let table = reconstruct_xref(data, 64).unwrap();
        assert_eq!(table.get(1), Some(&XRefEntry::InUse { offset: 21, gen: 0 }));
    }

    #[test]
    fn test_header_inside_stream_is_skipped() {
        let data = b"1 0 obj\n<< /Length 14 >>\nstream\n9 0 obj fake!\nendstream\nendobj\n";
        let table = reconstruct_xref(data, 64).unwrap();
        assert_eq!(table.len(), 1);
        assert!(table.get(9).is_none());
    }

    #[test]
    fn test_no_objects_is_error() {
        assert!(reconstruct_xref(b"not a pdf at all", 64).is_err());
    }
}

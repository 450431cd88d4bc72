//! Page rotation.

use super::{transact, PageSelection};
use crate::document::Document;
use crate::error::{Error, Result};
use crate::object::Object;
use crate::page_tree;
use crate::progress::Monitor;

/// Add `degrees` to the effective `/Rotate` of every selected page.
///
/// `degrees` must be a multiple of 90; negative values rotate
/// counter-clockwise. Content streams are not touched.
pub fn rotate(
    doc: &mut Document,
    selection: &PageSelection,
    degrees: i64,
    monitor: &Monitor,
) -> Result<()> {
    if degrees % 90 != 0 {
        return Err(Error::InvalidRotation(degrees));
    }
    let monitor = monitor.for_operation("rotate");
    transact(doc, |doc| {
        let refs = page_tree::page_refs(doc)?;
        let indices = selection.indices(refs.len())?;
        let total = indices.len();
        for (step, &index) in indices.iter().enumerate() {
            let page = refs[index];
            monitor.step(step, total, || {
                let current = page_tree::rotation(doc, page)?;
                let target = (current + degrees).rem_euclid(360);
                doc.get_dict_mut(page)?
                    .insert("Rotate".to_string(), Object::Integer(target));
                Ok(())
            })
            .map_err(|e| match e {
                Error::Cancelled { .. } => e,
                other => other.on_page(index),
            })?;
        }
        Ok(())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::tests::build_pdf;

    fn doc() -> Document {
        let data = build_pdf(
            &[
                "<< /Type /Catalog /Pages 2 0 R >>",
                "<< /Type /Pages /Kids [3 0 R 4 0 R] /Count 2 /Rotate 90 >>",
                "<< /Type /Page /Parent 2 0 R >>",
                "<< /Type /Page /Parent 2 0 R /Rotate 180 >>",
            ],
            "",
        );
        Document::parse(&data).unwrap()
    }

    fn rotations(doc: &Document) -> Vec<i64> {
        page_tree::page_refs(doc)
            .unwrap()
            .into_iter()
            .map(|p| page_tree::rotation(doc, p).unwrap())
            .collect()
    }

    #[test]
    fn test_rotate_inherited_and_own() {
        let mut d = doc();
        rotate(&mut d, &PageSelection::All, 90, &Monitor::new()).unwrap();
        assert_eq!(rotations(&d), vec![180, 270]);
        rotate(&mut d, &PageSelection::Pages(vec![1]), -270, &Monitor::new()).unwrap();
        assert_eq!(rotations(&d), vec![180, 0]);
    }

    #[test]
    fn test_four_quarter_turns_restore() {
        let mut d = doc();
        let before = rotations(&d);
        for _ in 0..4 {
            rotate(&mut d, &PageSelection::All, 90, &Monitor::new()).unwrap();
        }
        assert_eq!(rotations(&d), before);
    }

    #[test]
    fn test_invalid_rotation_and_range() {
        let mut d = doc();
        assert!(matches!(
            rotate(&mut d, &PageSelection::All, 45, &Monitor::new()).unwrap_err(),
            Error::InvalidRotation(45)
        ));
        let err = rotate(&mut d, &PageSelection::Pages(vec![0, 2]), 90, &Monitor::new()).unwrap_err();
        assert!(matches!(err, Error::PageOutOfRange { index: 2, .. }));
        assert_eq!(rotations(&d), vec![90, 180]);
    }
}

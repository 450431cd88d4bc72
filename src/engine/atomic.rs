//! All-or-nothing output files.
//!
//! Bytes go to a temporary file in the destination directory which is
//! renamed over the destination once fully written. A failed write leaves
//! the destination as it was and the temporary file is removed when it is
//! dropped.

use crate::error::{Error, Result};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

fn parent_dir(path: &Path) -> &Path {
    match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    }
}

/// Fully written temporary file next to `path`.
fn stage(path: &Path, data: &[u8]) -> Result<NamedTempFile> {
    let mut tmp = NamedTempFile::new_in(parent_dir(path))?;
    tmp.write_all(data)?;
    tmp.as_file().sync_all()?;
    Ok(tmp)
}

/// Write `data` to `path` atomically.
pub fn write_atomic(path: impl AsRef<Path>, data: &[u8]) -> Result<()> {
    let path = path.as_ref();
    stage(path, data)?.persist(path).map_err(|e| Error::Io(e.error))?;
    log::debug!("Wrote {} bytes to {}", data.len(), path.display());
    Ok(())
}

/// Write several files as a group.
///
/// Every output is staged before any destination is replaced, so a failed
/// write leaves all destinations untouched. If a rename fails, the
/// destinations already renamed are removed.
///
/// Callers serialize every output before calling this so that a
/// serialization error never leaves partial output behind.
pub fn write_atomic_all(outputs: &[(PathBuf, Vec<u8>)]) -> Result<()> {
    let mut staged = Vec::with_capacity(outputs.len());
    for (path, data) in outputs {
        staged.push(stage(path, data)?);
    }

    for (i, (tmp, (path, data))) in staged.into_iter().zip(outputs).enumerate() {
        if let Err(e) = tmp.persist(path) {
            for (written, _) in &outputs[..i] {
                if let Err(cleanup) = fs::remove_file(written) {
                    log::warn!("Could not remove {}: {}", written.display(), cleanup);
                }
            }
            return Err(Error::Io(e.error));
        }
        log::debug!("Wrote {} bytes to {}", data.len(), path.display());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_replaces_destination() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.pdf");
        fs::write(&path, b"old").unwrap();
        write_atomic(&path, b"new contents").unwrap();
        assert_eq!(fs::read(&path).unwrap(), b"new contents");
        // no stray temporary files
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[test]
    fn test_missing_directory_fails_cleanly() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing").join("out.pdf");
        assert!(matches!(write_atomic(&path, b"x"), Err(Error::Io(_))));
        assert!(!path.exists());
    }

    #[test]
    fn test_all_or_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let outputs = vec![
            (dir.path().join("a.pdf"), b"a".to_vec()),
            (dir.path().join("b.pdf"), b"b".to_vec()),
            (dir.path().join("nope").join("c.pdf"), b"c".to_vec()),
        ];
        assert!(write_atomic_all(&outputs).is_err());
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);

        write_atomic_all(&outputs[..2]).unwrap();
        assert_eq!(fs::read(dir.path().join("b.pdf")).unwrap(), b"b");
    }

    #[test]
    fn test_failed_group_keeps_existing_destinations() {
        let dir = tempfile::tempdir().unwrap();
        let first = dir.path().join("first.pdf");
        fs::write(&first, b"previous").unwrap();
        let outputs = vec![
            (first.clone(), b"replacement".to_vec()),
            (dir.path().join("gone").join("second.pdf"), b"second".to_vec()),
        ];

        assert!(matches!(write_atomic_all(&outputs), Err(Error::Io(_))));
        assert_eq!(fs::read(&first).unwrap(), b"previous");
        // the staged file for the first output was cleaned up
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 1);
    }
}

//! Encrypting and decrypting documents.
//!
//! Encryption only installs a [`SecurityState`]; strings and streams stay
//! plaintext in memory and are encrypted by the serializer.

use super::transact;
use crate::document::{Document, EncryptionState};
use crate::encryption::{Algorithm, EncryptionConfig, SecurityState};
use crate::error::Result;
use md5::{Digest, Md5};

/// Encrypt `doc` on its next serialization.
///
/// A document without `/ID` gets one first since key derivation needs it.
/// An already encrypted (unlocked) document is re-keyed.
pub fn encrypt(doc: &mut Document, config: &EncryptionConfig) -> Result<()> {
    transact(doc, |doc| {
        let file_id = match doc.file_id() {
            Some(id) if !id.is_empty() => id.to_vec(),
            _ => {
                let id = Md5::digest(uuid::Uuid::new_v4().as_bytes()).to_vec();
                doc.set_file_id(id.clone());
                id
            },
        };
        let state = SecurityState::from_config(config, &file_id)?;
        let minimum = match config.algorithm {
            Algorithm::Rc4_40 | Algorithm::Rc4_128 => (1, 4),
            Algorithm::Aes128 => (1, 6),
            Algorithm::Aes256 => (1, 7),
        };
        doc.set_version(doc.version().max(minimum));
        log::debug!("Encrypting with {:?}", config.algorithm);
        doc.set_security(state);
        Ok(())
    })
}

/// Remove encryption using the user or owner `password`.
///
/// Plain documents are returned unchanged. A wrong password is
/// `InvalidPassword` and leaves `doc` as it was.
pub fn decrypt(doc: &mut Document, password: &str) -> Result<()> {
    let mut working = match doc.encryption() {
        EncryptionState::Plain => return Ok(()),
        EncryptionState::Locked(_) => {
            let mut working = doc.clone();
            working.unlock(password.as_bytes())?;
            working
        },
        EncryptionState::Unlocked(_) => {
            doc.verify_password(password.as_bytes())?;
            doc.clone()
        },
    };
    working.clear_security()?;
    *doc = working;
    Ok(())
}

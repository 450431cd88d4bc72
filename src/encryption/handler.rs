//! Password authentication for encrypted input documents.

use super::algorithms;
use super::{Algorithm, EncryptDict, Permissions, SecurityState};
use crate::error::{Error, Result};
use crate::object::Dict;
use md5::{Digest, Md5};

/// Authenticates passwords against a document's `/Encrypt` dictionary.
#[derive(Debug, Clone)]
pub struct EncryptionHandler {
    raw: Dict,
    dict: EncryptDict,
    file_id: Vec<u8>,
    algorithm: Algorithm,
}

impl EncryptionHandler {
    /// Build a handler from the resolved `/Encrypt` dictionary and the
    /// first element of the trailer `/ID`.
    pub fn new(encrypt_dict: &Dict, file_id: Vec<u8>) -> Result<Self> {
        let dict = EncryptDict::from_dict(encrypt_dict)?;
        let algorithm = dict.algorithm()?;

        log::info!(
            "Document is encrypted with {:?} (V={}, R={})",
            algorithm,
            dict.version,
            dict.revision
        );

        Ok(Self {
            raw: encrypt_dict.clone(),
            dict,
            file_id,
            algorithm,
        })
    }

    /// Cipher of the document.
    pub fn algorithm(&self) -> Algorithm {
        self.algorithm
    }

    /// Permissions granted to user-password holders.
    pub fn permissions(&self) -> Permissions {
        Permissions::from_p(self.dict.permissions)
    }

    /// Try `password` as user password, then as owner password.
    /// Returns the file key when either matches.
    pub fn authenticate(&self, password: &[u8]) -> Option<Vec<u8>> {
        let d = &self.dict;
        if d.revision >= 5 {
            let u = &d.user_key;
            let ue = d.user_encryption.as_deref().unwrap_or_default();
            let oe = d.owner_encryption.as_deref().unwrap_or_default();
            return algorithms::authenticate_user_r6(password, u, ue, d.revision)
                .or_else(|| algorithms::authenticate_owner_r6(password, &d.owner_key, oe, u, d.revision));
        }

        let key_length = d.key_length_bytes();
        let as_user = |pw: &[u8]| {
            algorithms::authenticate_user_password(
                pw,
                &d.user_key,
                &d.owner_key,
                d.permissions,
                &self.file_id,
                d.revision,
                key_length,
                d.encrypt_metadata,
            )
        };
        if let Some(key) = as_user(password) {
            log::debug!("Authenticated with the user password");
            return Some(key);
        }
        let recovered =
            algorithms::user_password_from_owner(password, &d.owner_key, d.revision, key_length);
        let key = as_user(&recovered)?;
        log::debug!("Authenticated with the owner password");
        Some(key)
    }

    /// Authenticate and produce the state used to decrypt and re-encrypt.
    pub fn unlock(&self, password: &[u8]) -> Result<SecurityState> {
        let key = self
            .authenticate(password)
            .ok_or_else(|| Error::InvalidPassword("password does not match".to_string()))?;

        let mut hasher = Md5::new();
        hasher.update(&key);
        hasher.update(&self.file_id);
        let mut iv_seed = [0u8; 16];
        iv_seed.copy_from_slice(&hasher.finalize());

        Ok(SecurityState {
            encrypt_dict: self.raw.clone(),
            algorithm: self.algorithm,
            key,
            encrypt_metadata: self.dict.encrypt_metadata,
            iv_seed,
        })
    }
}

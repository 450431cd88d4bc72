//! Standard security handler.
//!
//! Supports the password-based Standard handler in all revisions a reader
//! meets in practice:
//!
//! - RC4 40-bit (V1, R2) and RC4 up to 128-bit (V2, R3; V4 with `/CFM /V2`)
//! - AES-128 (V4, R4, `/CFM /AESV2`)
//! - AES-256 (V5, R5 and R6, `/CFM /AESV3`)
//!
//! Reading goes through [`EncryptionHandler`], which authenticates a
//! password and yields a [`SecurityState`]. Writing builds a fresh
//! [`SecurityState`] from an [`EncryptionConfig`]. Either way the state
//! holds the file key and the `/Encrypt` dictionary that the serializer
//! emits.
//!
//! References: ISO 32000-1 section 7.6, ISO 32000-2 section 7.6.4.

use crate::error::{Error, Result};
use crate::object::{Dict, Object, ObjectRef};
use bitflags::bitflags;
use md5::{Digest, Md5};
use serde::{Deserialize, Serialize};

mod aes;
mod algorithms;
mod handler;
mod rc4;
mod write_handler;

pub use handler::EncryptionHandler;

/// Cipher and key size of a Standard handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Algorithm {
    /// RC4 with a 40-bit key (V1, R2)
    Rc4_40,
    /// RC4 with a key of up to 128 bits (V2, R3)
    Rc4_128,
    /// AES-128 in CBC mode (V4, R4)
    Aes128,
    /// AES-256 in CBC mode (V5, R6)
    Aes256,
}

impl Algorithm {
    /// File key length in bytes when writing.
    pub fn key_length(&self) -> usize {
        match self {
            Algorithm::Rc4_40 => 5,
            Algorithm::Rc4_128 | Algorithm::Aes128 => 16,
            Algorithm::Aes256 => 32,
        }
    }

    /// `(V, R)` written for this algorithm.
    pub fn version_revision(&self) -> (u32, u32) {
        match self {
            Algorithm::Rc4_40 => (1, 2),
            Algorithm::Rc4_128 => (2, 3),
            Algorithm::Aes128 => (4, 4),
            Algorithm::Aes256 => (5, 6),
        }
    }

    /// Whether strings and streams use AES.
    pub fn is_aes(&self) -> bool {
        matches!(self, Algorithm::Aes128 | Algorithm::Aes256)
    }
}

impl std::str::FromStr for Algorithm {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "rc4-40" | "rc4_40" => Ok(Algorithm::Rc4_40),
            "rc4-128" | "rc4_128" | "rc4" => Ok(Algorithm::Rc4_128),
            "aes-128" | "aes128" => Ok(Algorithm::Aes128),
            "aes-256" | "aes256" | "aes" => Ok(Algorithm::Aes256),
            other => Err(Error::UnsupportedEncryption(other.to_string())),
        }
    }
}

bitflags! {
    /// User access permissions (`/P`).
    ///
    /// Per ISO 32000-1 Table 22. Only the meaningful bits are modelled;
    /// the reserved bits are filled in by [`Permissions::to_p`].
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Permissions: u32 {
        /// Bit 3: print the document
        const PRINT = 1 << 2;
        /// Bit 4: modify contents
        const MODIFY = 1 << 3;
        /// Bit 5: copy or extract text and graphics
        const COPY = 1 << 4;
        /// Bit 6: add or modify annotations, fill forms
        const ANNOTATE = 1 << 5;
        /// Bit 9: fill existing form fields
        const FILL_FORMS = 1 << 8;
        /// Bit 10: extract for accessibility
        const EXTRACT_ACCESSIBILITY = 1 << 9;
        /// Bit 11: assemble (insert, rotate, delete pages)
        const ASSEMBLE = 1 << 10;
        /// Bit 12: high-quality printing
        const PRINT_HIGH_QUALITY = 1 << 11;
    }
}

impl Permissions {
    /// The signed `/P` value with reserved bits set as the format requires.
    pub fn to_p(self) -> i32 {
        (0xFFFF_F0C0u32 | self.bits()) as i32
    }

    /// Permissions from a `/P` value; reserved bits are dropped.
    pub fn from_p(p: i32) -> Self {
        Self::from_bits_truncate(p as u32)
    }
}

impl Default for Permissions {
    fn default() -> Self {
        Self::all()
    }
}

/// Parameters for encrypting a document.
#[derive(Debug, Clone)]
pub struct EncryptionConfig {
    /// Password required to open the document (may be empty)
    pub user_password: String,
    /// Password granting full access; empty means "same as user"
    pub owner_password: String,
    /// Cipher to use
    pub algorithm: Algorithm,
    /// Granted permissions
    pub permissions: Permissions,
    /// Whether `/Type /Metadata` streams are encrypted too
    pub encrypt_metadata: bool,
}

impl EncryptionConfig {
    /// AES-256 with every permission granted.
    pub fn new(user_password: impl Into<String>, owner_password: impl Into<String>) -> Self {
        Self {
            user_password: user_password.into(),
            owner_password: owner_password.into(),
            algorithm: Algorithm::Aes256,
            permissions: Permissions::all(),
            encrypt_metadata: true,
        }
    }

    /// Choose the cipher.
    pub fn with_algorithm(mut self, algorithm: Algorithm) -> Self {
        self.algorithm = algorithm;
        self
    }

    /// Restrict permissions.
    pub fn with_permissions(mut self, permissions: Permissions) -> Self {
        self.permissions = permissions;
        self
    }

    /// Leave metadata streams in the clear.
    pub fn with_encrypt_metadata(mut self, encrypt_metadata: bool) -> Self {
        self.encrypt_metadata = encrypt_metadata;
        self
    }
}

/// Parsed `/Encrypt` dictionary.
#[derive(Debug, Clone)]
pub struct EncryptDict {
    /// Security handler name (only "Standard" is supported)
    pub filter: String,
    /// `/V`
    pub version: u32,
    /// `/R`
    pub revision: u32,
    /// `/Length` in bits, if present
    pub length: Option<u32>,
    /// `/O`
    pub owner_key: Vec<u8>,
    /// `/U`
    pub user_key: Vec<u8>,
    /// `/OE` (R5/R6)
    pub owner_encryption: Option<Vec<u8>>,
    /// `/UE` (R5/R6)
    pub user_encryption: Option<Vec<u8>>,
    /// `/P`
    pub permissions: i32,
    /// `/EncryptMetadata`, default true
    pub encrypt_metadata: bool,
    /// `/CFM` of the default stream crypt filter (V4/V5)
    pub crypt_method: Option<String>,
}

impl EncryptDict {
    /// Read the entries of an `/Encrypt` dictionary.
    pub fn from_dict(dict: &Dict) -> Result<Self> {
        let int = |key: &str| dict.get(key).and_then(|o| o.as_integer());
        let bytes = |key: &str| dict.get(key).and_then(|o| o.as_string()).map(|s| s.to_vec());

        let filter = dict
            .get("Filter")
            .and_then(|o| o.as_name())
            .ok_or_else(|| Error::InvalidPdf("Encrypt dictionary missing /Filter".to_string()))?
            .to_string();
        let version = int("V").unwrap_or(0).max(0) as u32;
        let revision = int("R")
            .ok_or_else(|| Error::InvalidPdf("Encrypt dictionary missing /R".to_string()))?
            .max(0) as u32;
        let owner_key = bytes("O")
            .ok_or_else(|| Error::InvalidPdf("Encrypt dictionary missing /O".to_string()))?;
        let user_key = bytes("U")
            .ok_or_else(|| Error::InvalidPdf("Encrypt dictionary missing /U".to_string()))?;
        let permissions = int("P")
            .ok_or_else(|| Error::InvalidPdf("Encrypt dictionary missing /P".to_string()))?
            as i32;

        // default crypt filter: /CF << /StdCF << /CFM /AESV2 >> >> /StmF /StdCF
        let crypt_method = dict
            .get("StmF")
            .and_then(|o| o.as_name())
            .and_then(|stmf| dict.get("CF")?.as_dict()?.get(stmf)?.as_dict())
            .and_then(|cf| cf.get("CFM")?.as_name())
            .map(|s| s.to_string());

        Ok(Self {
            filter,
            version,
            revision,
            length: int("Length").map(|l| l.max(0) as u32),
            owner_key,
            user_key,
            owner_encryption: bytes("OE"),
            user_encryption: bytes("UE"),
            permissions,
            encrypt_metadata: dict
                .get("EncryptMetadata")
                .and_then(|o| o.as_bool())
                .unwrap_or(true),
            crypt_method,
        })
    }

    /// Cipher named by `/V`, `/R` and the default crypt filter.
    pub fn algorithm(&self) -> Result<Algorithm> {
        if self.filter != "Standard" {
            return Err(Error::UnsupportedEncryption(format!(
                "security handler /{}",
                self.filter
            )));
        }
        match (self.version, self.revision) {
            (1, 2) => Ok(Algorithm::Rc4_40),
            (2, 2..=3) => Ok(Algorithm::Rc4_128),
            (4, 4) => match self.crypt_method.as_deref() {
                Some("AESV2") => Ok(Algorithm::Aes128),
                Some("V2") => Ok(Algorithm::Rc4_128),
                other => Err(Error::UnsupportedEncryption(format!(
                    "V4 crypt filter {}",
                    other.unwrap_or("(none)")
                ))),
            },
            (5, 5..=6) => Ok(Algorithm::Aes256),
            (v, r) => Err(Error::UnsupportedEncryption(format!("V={} R={}", v, r))),
        }
    }

    /// File key length in bytes for revisions 2 to 4.
    pub fn key_length_bytes(&self) -> usize {
        match self.version {
            1 => 5,
            4 if self.crypt_method.as_deref() == Some("AESV2") => 16,
            5 => 32,
            _ => self.length.map(|bits| (bits / 8) as usize).unwrap_or(5).clamp(5, 16),
        }
    }
}

/// Unlocked encryption parameters of a document.
///
/// Present on documents that were opened with a valid password and on
/// documents encrypted by [`crate::ops::encrypt`]. The serializer uses it
/// to emit `/Encrypt` and to encrypt every string and stream.
#[derive(Debug, Clone, PartialEq)]
pub struct SecurityState {
    /// The `/Encrypt` dictionary to emit
    pub encrypt_dict: Dict,
    /// Cipher in use
    pub algorithm: Algorithm,
    /// File key
    pub key: Vec<u8>,
    /// Whether metadata streams are encrypted
    pub encrypt_metadata: bool,
    /// Seed for deterministic AES IVs
    pub iv_seed: [u8; 16],
}

impl SecurityState {
    /// Per-object key (algorithm 1). AES-256 uses the file key directly.
    pub fn object_key(&self, id: ObjectRef) -> Vec<u8> {
        if self.algorithm == Algorithm::Aes256 {
            return self.key.clone();
        }
        let mut hasher = Md5::new();
        hasher.update(&self.key);
        hasher.update(&id.num.to_le_bytes()[..3]);
        hasher.update(id.gen.to_le_bytes());
        if self.algorithm.is_aes() {
            hasher.update(b"sAlT");
        }
        let hash = hasher.finalize();
        hash[..(self.key.len() + 5).min(16)].to_vec()
    }

    /// Decrypt a string or stream payload belonging to object `id`.
    pub fn decrypt_bytes(&self, id: ObjectRef, data: &[u8]) -> Result<Vec<u8>> {
        let key = self.object_key(id);
        if !self.algorithm.is_aes() {
            return Ok(rc4::rc4_crypt(&key, data));
        }
        if data.len() < 16 {
            // shorter than the IV: nothing was encrypted
            return Ok(Vec::new());
        }
        let (iv, ciphertext) = data.split_at(16);
        aes::aes_cbc_decrypt(&key, iv, ciphertext)
            .map_err(|e| Error::Decode(format!("AES decryption of {} failed: {}", id, e)))
    }

    /// Whether a stream with this dictionary is exempt from encryption.
    pub fn is_exempt_stream(&self, dict: &Dict) -> bool {
        match dict.get("Type").and_then(|o| o.as_name()) {
            Some("XRef") => true,
            Some("Metadata") => !self.encrypt_metadata,
            _ => false,
        }
    }

    /// Apply `f` to every string in `obj`.
    pub(crate) fn map_strings(
        obj: &mut Object,
        f: &mut dyn FnMut(&[u8]) -> Result<Vec<u8>>,
    ) -> Result<()> {
        match obj {
            Object::String(s) => *s = f(s)?,
            Object::Array(arr) => {
                for item in arr.iter_mut() {
                    Self::map_strings(item, f)?;
                }
            },
            Object::Dictionary(d) | Object::Stream { dict: d, .. } => {
                for value in d.values_mut() {
                    Self::map_strings(value, f)?;
                }
            },
            _ => {},
        }
        Ok(())
    }

    /// Decrypt all strings and the stream payload of one indirect object in place.
    pub fn decrypt_object(&self, id: ObjectRef, obj: &mut Object) -> Result<()> {
        Self::map_strings(obj, &mut |s| self.decrypt_bytes(id, s))?;
        if let Object::Stream { dict, data } = obj {
            if !self.is_exempt_stream(dict) {
                *data = bytes::Bytes::from(self.decrypt_bytes(id, data)?);
            }
        }
        Ok(())
    }
}

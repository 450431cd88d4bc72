//! Building encryption parameters and encrypting objects on output.
//!
//! All randomness (file key, salts, IV seed) is drawn once when the state is
//! built. AES IVs are then derived from the seed, the object identity and
//! the ordinal of the string within the object, so serializing the same
//! document twice gives identical bytes.

use super::algorithms;
use super::{aes, rc4, Algorithm, EncryptionConfig, SecurityState};
use crate::error::{Error, Result};
use crate::object::{Dict, Object, ObjectRef};
use md5::{Digest, Md5};

impl SecurityState {
    /// Derive O/U (and OE/UE/Perms for AES-256) and a file key for `config`.
    pub fn from_config(config: &EncryptionConfig, file_id: &[u8]) -> Result<Self> {
        let algorithm = config.algorithm;
        let (v, r) = algorithm.version_revision();
        let p = config.permissions.to_p();
        let user = config.user_password.as_bytes();
        let owner = config.owner_password.as_bytes();

        let mut dict = Dict::new();
        dict.insert("Filter".to_string(), Object::name("Standard"));
        dict.insert("V".to_string(), Object::Integer(v as i64));
        dict.insert("R".to_string(), Object::Integer(r as i64));
        dict.insert("P".to_string(), Object::Integer(p as i64));
        if v >= 2 {
            dict.insert(
                "Length".to_string(),
                Object::Integer(algorithm.key_length() as i64 * 8),
            );
        }
        if !config.encrypt_metadata && r >= 4 {
            dict.insert("EncryptMetadata".to_string(), Object::Boolean(false));
        }

        let key = match algorithm {
            Algorithm::Rc4_40 | Algorithm::Rc4_128 | Algorithm::Aes128 => {
                let n = algorithm.key_length();
                let o = algorithms::compute_owner_password_hash(owner, user, r, n);
                let key = algorithms::compute_encryption_key(
                    user,
                    &o,
                    p,
                    file_id,
                    r,
                    n,
                    config.encrypt_metadata,
                );
                let u = algorithms::compute_user_password_hash(&key, file_id, r);
                dict.insert("O".to_string(), Object::String(o));
                dict.insert("U".to_string(), Object::String(u));
                if algorithm == Algorithm::Aes128 {
                    insert_crypt_filter(&mut dict, "AESV2", 16);
                }
                key
            },
            Algorithm::Aes256 => {
                let key = algorithms::random_bytes(32);
                let salts = algorithms::random_bytes(32);
                let (uvs, uks, ovs, oks) =
                    (&salts[0..8], &salts[8..16], &salts[16..24], &salts[24..32]);
                let user = algorithms::truncate_password_utf8(user);
                let owner = algorithms::truncate_password_utf8(if owner.is_empty() {
                    user
                } else {
                    owner
                });

                let mut u = algorithms::hash_password_r6(user, uvs, &[], r).to_vec();
                u.extend_from_slice(uvs);
                u.extend_from_slice(uks);
                let ue = wrap_key(&algorithms::hash_password_r6(user, uks, &[], r), &key)?;

                let mut o = algorithms::hash_password_r6(owner, ovs, &u, r).to_vec();
                o.extend_from_slice(ovs);
                o.extend_from_slice(oks);
                let oe = wrap_key(&algorithms::hash_password_r6(owner, oks, &u, r), &key)?;

                let perms = perms_block(p, config.encrypt_metadata, &key)?;

                dict.insert("O".to_string(), Object::String(o));
                dict.insert("U".to_string(), Object::String(u));
                dict.insert("OE".to_string(), Object::String(oe));
                dict.insert("UE".to_string(), Object::String(ue));
                dict.insert("Perms".to_string(), Object::String(perms));
                insert_crypt_filter(&mut dict, "AESV3", 32);
                key
            },
        };

        let mut iv_seed = [0u8; 16];
        iv_seed.copy_from_slice(&algorithms::random_bytes(16));

        Ok(Self {
            encrypt_dict: dict,
            algorithm,
            key,
            encrypt_metadata: config.encrypt_metadata,
            iv_seed,
        })
    }

    /// Encrypt one string or stream payload of object `id`.
    ///
    /// `ordinal` distinguishes payloads within the same object and only
    /// affects the AES IV.
    pub fn encrypt_bytes(&self, id: ObjectRef, ordinal: u32, data: &[u8]) -> Result<Vec<u8>> {
        let key = self.object_key(id);
        if !self.algorithm.is_aes() {
            return Ok(rc4::rc4_crypt(&key, data));
        }
        let iv = self.iv_for(id, ordinal);
        let ciphertext = aes::aes_cbc_encrypt(&key, &iv, data)
            .map_err(|e| Error::Encode(format!("AES encryption of {} failed: {}", id, e)))?;
        let mut out = iv.to_vec();
        out.extend(ciphertext);
        Ok(out)
    }

    fn iv_for(&self, id: ObjectRef, ordinal: u32) -> [u8; 16] {
        let mut hasher = Md5::new();
        hasher.update(self.iv_seed);
        hasher.update(id.num.to_le_bytes());
        hasher.update(id.gen.to_le_bytes());
        hasher.update(ordinal.to_le_bytes());
        let mut iv = [0u8; 16];
        iv.copy_from_slice(&hasher.finalize());
        iv
    }
}

fn insert_crypt_filter(dict: &mut Dict, method: &str, length: i64) {
    let mut std_cf = Dict::new();
    std_cf.insert("Type".to_string(), Object::name("CryptFilter"));
    std_cf.insert("CFM".to_string(), Object::name(method));
    std_cf.insert("AuthEvent".to_string(), Object::name("DocOpen"));
    std_cf.insert("Length".to_string(), Object::Integer(length));
    let mut cf = Dict::new();
    cf.insert("StdCF".to_string(), Object::Dictionary(std_cf));
    dict.insert("CF".to_string(), Object::Dictionary(cf));
    dict.insert("StmF".to_string(), Object::name("StdCF"));
    dict.insert("StrF".to_string(), Object::name("StdCF"));
}

/// `UE`/`OE`: the file key encrypted under a password hash, zero IV, no padding.
fn wrap_key(hash: &[u8; 32], key: &[u8]) -> Result<Vec<u8>> {
    aes::aes_cbc_encrypt_no_padding(hash, &[0u8; 16], key)
        .map_err(|e| Error::Encode(format!("wrapping file key failed: {}", e)))
}

/// `Perms`: P, 0xFFFFFFFF, the metadata flag and "adb", then 4 random bytes,
/// as a single AES-256 block.
fn perms_block(p: i32, encrypt_metadata: bool, key: &[u8]) -> Result<Vec<u8>> {
    let mut block = [0u8; 16];
    block[..4].copy_from_slice(&p.to_le_bytes());
    block[4..8].copy_from_slice(&[0xFF; 4]);
    block[8] = if encrypt_metadata { b'T' } else { b'F' };
    block[9..12].copy_from_slice(b"adb");
    block[12..].copy_from_slice(&algorithms::random_bytes(4));
    aes::aes_cbc_encrypt_no_padding(key, &[0u8; 16], &block)
        .map_err(|e| Error::Encode(format!("encrypting /Perms failed: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encryption::Permissions;

    const FILE_ID: &[u8] = b"fedcba9876543210";

    #[test]
    fn test_round_trip_every_algorithm() {
        for algorithm in [
            Algorithm::Rc4_40,
            Algorithm::Rc4_128,
            Algorithm::Aes128,
            Algorithm::Aes256,
        ] {
            let config = EncryptionConfig::new("u", "o").with_algorithm(algorithm);
            let state = SecurityState::from_config(&config, FILE_ID).unwrap();
            assert_eq!(state.key.len(), algorithm.key_length());

            let id = ObjectRef::new(7, 0);
            let ciphertext = state.encrypt_bytes(id, 0, b"Hello, encrypted world!").unwrap();
            assert_ne!(&ciphertext[..], b"Hello, encrypted world!");
            let plain = state.decrypt_bytes(id, &ciphertext).unwrap();
            assert_eq!(plain, b"Hello, encrypted world!", "{:?}", algorithm);
        }
    }

    #[test]
    fn test_aes_output_is_deterministic() {
        let config = EncryptionConfig::new("u", "o").with_algorithm(Algorithm::Aes128);
        let state = SecurityState::from_config(&config, FILE_ID).unwrap();
        let id = ObjectRef::new(3, 0);
        let a = state.encrypt_bytes(id, 1, b"same").unwrap();
        let b = state.encrypt_bytes(id, 1, b"same").unwrap();
        assert_eq!(a, b);
        // distinct ordinals get distinct IVs
        assert_ne!(a[..16], state.encrypt_bytes(id, 2, b"same").unwrap()[..16]);
    }

    #[test]
    fn test_dictionary_entries() {
        let config = EncryptionConfig::new("u", "o")
            .with_algorithm(Algorithm::Aes256)
            .with_permissions(Permissions::PRINT);
        let state = SecurityState::from_config(&config, FILE_ID).unwrap();
        let d = &state.encrypt_dict;
        assert_eq!(d.get("V").and_then(|o| o.as_integer()), Some(5));
        assert_eq!(d.get("R").and_then(|o| o.as_integer()), Some(6));
        assert_eq!(d.get("U").and_then(|o| o.as_string()).map(|s| s.len()), Some(48));
        assert_eq!(d.get("OE").and_then(|o| o.as_string()).map(|s| s.len()), Some(32));
        assert_eq!(d.get("Perms").and_then(|o| o.as_string()).map(|s| s.len()), Some(16));
        assert_eq!(
            d.get("P").and_then(|o| o.as_integer()),
            Some(Permissions::PRINT.to_p() as i64)
        );
    }

    #[test]
    fn test_perms_block_decrypts() {
        let key = [5u8; 32];
        let block = perms_block(-4, true, &key).unwrap();
        let plain = aes::aes_cbc_decrypt_no_padding(&key, &[0u8; 16], &block).unwrap();
        assert_eq!(&plain[..4], &(-4i32).to_le_bytes());
        assert_eq!(&plain[8..12], b"Tadb");
    }
}

//! AES-CBC for the Standard security handler.
//!
//! Strings and streams use PKCS#7 padding with the IV prepended to the
//! ciphertext. The AES-256 password algorithms (`UE`, `OE`, `Perms` and the
//! revision 6 hash) work on whole blocks without padding. The key length
//! picks AES-128 or AES-256.

use aes::cipher::block_padding::NoPadding;
use aes::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use aes::{Aes128, Aes256};

type Aes128CbcEnc = cbc::Encryptor<Aes128>;
type Aes128CbcDec = cbc::Decryptor<Aes128>;
type Aes256CbcEnc = cbc::Encryptor<Aes256>;
type Aes256CbcDec = cbc::Decryptor<Aes256>;

/// Encrypt whole blocks in place.
fn encrypt_blocks(key: &[u8], iv: &[u8], buf: &mut [u8]) -> Result<(), &'static str> {
    if buf.len() % 16 != 0 {
        return Err("data length must be a multiple of 16");
    }
    let len = buf.len();
    match key.len() {
        16 => Aes128CbcEnc::new_from_slices(key, iv)
            .map_err(|_| "IV must be 16 bytes")?
            .encrypt_padded_mut::<NoPadding>(buf, len)
            .map(|_| ())
            .map_err(|_| "AES encryption failed"),
        32 => Aes256CbcEnc::new_from_slices(key, iv)
            .map_err(|_| "IV must be 16 bytes")?
            .encrypt_padded_mut::<NoPadding>(buf, len)
            .map(|_| ())
            .map_err(|_| "AES encryption failed"),
        _ => Err("AES key must be 16 or 32 bytes"),
    }
}

/// Decrypt whole blocks in place.
fn decrypt_blocks(key: &[u8], iv: &[u8], buf: &mut [u8]) -> Result<(), &'static str> {
    if buf.len() % 16 != 0 {
        return Err("data length must be a multiple of 16");
    }
    match key.len() {
        16 => Aes128CbcDec::new_from_slices(key, iv)
            .map_err(|_| "IV must be 16 bytes")?
            .decrypt_padded_mut::<NoPadding>(buf)
            .map(|_| ())
            .map_err(|_| "AES decryption failed"),
        32 => Aes256CbcDec::new_from_slices(key, iv)
            .map_err(|_| "IV must be 16 bytes")?
            .decrypt_padded_mut::<NoPadding>(buf)
            .map(|_| ())
            .map_err(|_| "AES decryption failed"),
        _ => Err("AES key must be 16 or 32 bytes"),
    }
}

/// CBC-encrypt with PKCS#7 padding. Returns the ciphertext without the IV.
pub fn aes_cbc_encrypt(key: &[u8], iv: &[u8], data: &[u8]) -> Result<Vec<u8>, &'static str> {
    let mut padded = data.to_vec();
    let padding_len = 16 - (data.len() % 16);
    padded.extend(std::iter::repeat(padding_len as u8).take(padding_len));
    encrypt_blocks(key, iv, &mut padded)?;
    Ok(padded)
}

/// CBC-decrypt and strip PKCS#7 padding.
///
/// A trailing partial block is dropped. Malformed padding leaves the
/// plaintext unstripped.
pub fn aes_cbc_decrypt(key: &[u8], iv: &[u8], data: &[u8]) -> Result<Vec<u8>, &'static str> {
    let usable = data.len() - data.len() % 16;
    if usable == 0 {
        return Ok(Vec::new());
    }
    let mut buf = data[..usable].to_vec();
    decrypt_blocks(key, iv, &mut buf)?;

    let pad = buf[buf.len() - 1] as usize;
    if (1..=16).contains(&pad) && buf[buf.len() - pad..].iter().all(|&b| b as usize == pad) {
        buf.truncate(buf.len() - pad);
    } else {
        log::warn!("AES payload has invalid PKCS#7 padding; keeping it as is");
    }
    Ok(buf)
}

/// CBC-encrypt whole blocks without padding.
pub fn aes_cbc_encrypt_no_padding(
    key: &[u8],
    iv: &[u8],
    data: &[u8],
) -> Result<Vec<u8>, &'static str> {
    let mut buf = data.to_vec();
    encrypt_blocks(key, iv, &mut buf)?;
    Ok(buf)
}

/// CBC-decrypt whole blocks without padding.
pub fn aes_cbc_decrypt_no_padding(
    key: &[u8],
    iv: &[u8],
    data: &[u8],
) -> Result<Vec<u8>, &'static str> {
    let mut buf = data.to_vec();
    decrypt_blocks(key, iv, &mut buf)?;
    Ok(buf)
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEY16: &[u8; 16] = b"0123456789abcdef";
    const IV: &[u8; 16] = b"fedcba9876543210";

    #[test]
    fn test_aes128_round_trip() {
        let ciphertext = aes_cbc_encrypt(KEY16, IV, b"Hello, AES encryption!").unwrap();
        assert_eq!(ciphertext.len(), 32);
        let plain = aes_cbc_decrypt(KEY16, IV, &ciphertext).unwrap();
        assert_eq!(plain, b"Hello, AES encryption!");
    }

    #[test]
    fn test_aes256_round_trip() {
        let key = [7u8; 32];
        let ciphertext = aes_cbc_encrypt(&key, IV, b"Exactly16bytes!!").unwrap();
        // a full padding block follows aligned input
        assert_eq!(ciphertext.len(), 32);
        assert_eq!(aes_cbc_decrypt(&key, IV, &ciphertext).unwrap(), b"Exactly16bytes!!");
    }

    #[test]
    fn test_empty_plaintext() {
        let ciphertext = aes_cbc_encrypt(KEY16, IV, b"").unwrap();
        assert_eq!(ciphertext.len(), 16);
        assert!(aes_cbc_decrypt(KEY16, IV, &ciphertext).unwrap().is_empty());
        assert!(aes_cbc_decrypt(KEY16, IV, b"").unwrap().is_empty());
    }

    #[test]
    fn test_invalid_key_length() {
        assert!(aes_cbc_encrypt(b"short", IV, b"data").is_err());
    }

    #[test]
    fn test_no_padding_round_trip() {
        let key = [1u8; 32];
        let block = [9u8; 32];
        let enc = aes_cbc_encrypt_no_padding(&key, &[0u8; 16], &block).unwrap();
        assert_eq!(enc.len(), 32);
        assert_eq!(aes_cbc_decrypt_no_padding(&key, &[0u8; 16], &enc).unwrap(), block);
        assert!(aes_cbc_encrypt_no_padding(&key, &[0u8; 16], &[0u8; 5]).is_err());
    }
}

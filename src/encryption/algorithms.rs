//! Password and key algorithms of the Standard security handler.
//!
//! Revisions 2 to 4 derive the file key from the user password with MD5
//! and RC4 (ISO 32000-1, algorithms 2 to 7). Revisions 5 and 6 store a
//! random file key wrapped under a SHA-2 password hash (ISO 32000-2,
//! algorithms 2.A and 2.B).

use super::aes;
use super::rc4::rc4_crypt;
use md5::{Digest, Md5};
use sha2::{Sha256, Sha384, Sha512};

/// Padding string for revisions 2 to 4 (algorithm 2, step a).
pub(crate) const PADDING: &[u8; 32] = b"\x28\xBF\x4E\x5E\x4E\x75\x8A\x41\
                              \x64\x00\x4E\x56\xFF\xFA\x01\x08\
                              \x2E\x2E\x00\xB6\xD0\x68\x3E\x80\
                              \x2F\x0C\xA9\xFE\x64\x53\x69\x7A";

/// Pad or truncate a password to 32 bytes.
pub fn pad_password(password: &[u8]) -> [u8; 32] {
    let mut padded = [0u8; 32];
    let len = password.len().min(32);
    padded[..len].copy_from_slice(&password[..len]);
    padded[len..].copy_from_slice(&PADDING[..32 - len]);
    padded
}

/// File key from a user password (algorithm 2), revisions 2 to 4.
pub fn compute_encryption_key(
    password: &[u8],
    owner_key: &[u8],
    permissions: i32,
    file_id: &[u8],
    revision: u32,
    key_length: usize,
    encrypt_metadata: bool,
) -> Vec<u8> {
    let n = key_length.clamp(5, 16);
    let mut hasher = Md5::new();
    hasher.update(pad_password(password));
    hasher.update(&owner_key[..owner_key.len().min(32)]);
    hasher.update(permissions.to_le_bytes());
    hasher.update(file_id);
    if revision >= 4 && !encrypt_metadata {
        hasher.update([0xFF, 0xFF, 0xFF, 0xFF]);
    }
    let mut hash = hasher.finalize().to_vec();

    if revision >= 3 {
        for _ in 0..50 {
            hash = Md5::digest(&hash[..n]).to_vec();
        }
    }
    hash.truncate(n);
    hash
}

/// `U` value for revision 2 (algorithm 4).
fn user_hash_r2(key: &[u8]) -> Vec<u8> {
    rc4_crypt(key, PADDING)
}

/// `U` value for revisions 3 and 4 (algorithm 5). The last 16 bytes are zero.
fn user_hash_r3(key: &[u8], file_id: &[u8]) -> Vec<u8> {
    let mut hasher = Md5::new();
    hasher.update(PADDING);
    hasher.update(file_id);
    let mut hash = hasher.finalize().to_vec();

    for i in 0..20u8 {
        let round_key: Vec<u8> = key.iter().map(|b| b ^ i).collect();
        hash = rc4_crypt(&round_key, &hash);
    }
    hash.extend_from_slice(&[0u8; 16]);
    hash
}

/// `U` value for a derived file key, revisions 2 to 4.
pub fn compute_user_password_hash(key: &[u8], file_id: &[u8], revision: u32) -> Vec<u8> {
    if revision >= 3 {
        user_hash_r3(key, file_id)
    } else {
        user_hash_r2(key)
    }
}

/// RC4 key derived from the owner password (algorithm 3, steps a to d).
fn owner_rc4_key(owner_password: &[u8], revision: u32, key_length: usize) -> Vec<u8> {
    let n = key_length.clamp(5, 16);
    let mut hash = Md5::digest(pad_password(owner_password)).to_vec();
    if revision >= 3 {
        for _ in 0..50 {
            hash = Md5::digest(&hash).to_vec();
        }
    }
    hash.truncate(n);
    hash
}

/// `O` value (algorithm 3). An empty owner password falls back to the user password.
pub fn compute_owner_password_hash(
    owner_password: &[u8],
    user_password: &[u8],
    revision: u32,
    key_length: usize,
) -> Vec<u8> {
    let owner = if owner_password.is_empty() {
        user_password
    } else {
        owner_password
    };
    let key = owner_rc4_key(owner, revision, key_length);
    let mut result = rc4_crypt(&key, &pad_password(user_password));
    if revision >= 3 {
        for i in 1..=19u8 {
            let round_key: Vec<u8> = key.iter().map(|b| b ^ i).collect();
            result = rc4_crypt(&round_key, &result);
        }
    }
    result
}

/// Check a user password (algorithms 4 and 5). Returns the file key on success.
#[allow(clippy::too_many_arguments)]
pub fn authenticate_user_password(
    password: &[u8],
    user_key: &[u8],
    owner_key: &[u8],
    permissions: i32,
    file_id: &[u8],
    revision: u32,
    key_length: usize,
    encrypt_metadata: bool,
) -> Option<Vec<u8>> {
    let key = compute_encryption_key(
        password,
        owner_key,
        permissions,
        file_id,
        revision,
        key_length,
        encrypt_metadata,
    );
    let expected = compute_user_password_hash(&key, file_id, revision);

    // revisions 3+ only define the first 16 bytes
    let compare_len = if revision >= 3 { 16 } else { 32 };
    if user_key.len() < compare_len {
        return None;
    }
    constant_time_compare(&user_key[..compare_len], &expected[..compare_len]).then_some(key)
}

/// Recover the padded user password from an owner password (algorithm 7, steps a and b).
pub fn user_password_from_owner(
    owner_password: &[u8],
    owner_key: &[u8],
    revision: u32,
    key_length: usize,
) -> Vec<u8> {
    let key = owner_rc4_key(owner_password, revision, key_length);
    let owner_key = &owner_key[..owner_key.len().min(32)];
    if revision == 2 {
        return rc4_crypt(&key, owner_key);
    }
    let mut data = owner_key.to_vec();
    for i in (0..=19u8).rev() {
        let round_key: Vec<u8> = key.iter().map(|b| b ^ i).collect();
        data = rc4_crypt(&round_key, &data);
    }
    data
}

/// Password hash for revisions 5 (plain SHA-256) and 6 (algorithm 2.B).
///
/// `udata` is the 48-byte `U` value when hashing an owner password and
/// empty otherwise.
pub fn hash_password_r6(password: &[u8], salt: &[u8], udata: &[u8], revision: u32) -> [u8; 32] {
    let mut k = {
        let mut hasher = Sha256::new();
        hasher.update(password);
        hasher.update(salt);
        hasher.update(udata);
        hasher.finalize().to_vec()
    };

    if revision >= 6 {
        let mut round = 0u32;
        loop {
            let unit = password.len() + k.len() + udata.len();
            let mut k1 = Vec::with_capacity(unit * 64);
            for _ in 0..64 {
                k1.extend_from_slice(password);
                k1.extend_from_slice(&k);
                k1.extend_from_slice(udata);
            }
            // k1 is 64 repetitions, so always whole blocks
            let e = match aes::aes_cbc_encrypt_no_padding(&k[..16], &k[16..32], &k1) {
                Ok(e) => e,
                Err(_) => break,
            };
            let selector: u32 = e[..16].iter().map(|&b| b as u32).sum::<u32>() % 3;
            k = match selector {
                0 => Sha256::digest(&e).to_vec(),
                1 => Sha384::digest(&e).to_vec(),
                _ => Sha512::digest(&e).to_vec(),
            };
            round += 1;
            let last = e.last().copied().unwrap_or(0) as u32;
            if round >= 64 && last <= round - 32 {
                break;
            }
        }
    }

    let mut out = [0u8; 32];
    out.copy_from_slice(&k[..32]);
    out
}

/// Check a revision 5/6 user password; returns the file key unwrapped from `UE`.
pub fn authenticate_user_r6(password: &[u8], u: &[u8], ue: &[u8], revision: u32) -> Option<Vec<u8>> {
    if u.len() < 48 || ue.len() < 32 {
        return None;
    }
    let password = truncate_password_utf8(password);
    let hash = hash_password_r6(password, &u[32..40], &[], revision);
    if !constant_time_compare(&hash, &u[..32]) {
        return None;
    }
    let wrap = hash_password_r6(password, &u[40..48], &[], revision);
    aes::aes_cbc_decrypt_no_padding(&wrap, &[0u8; 16], &ue[..32]).ok()
}

/// Check a revision 5/6 owner password; returns the file key unwrapped from `OE`.
pub fn authenticate_owner_r6(
    password: &[u8],
    o: &[u8],
    oe: &[u8],
    u: &[u8],
    revision: u32,
) -> Option<Vec<u8>> {
    if o.len() < 48 || oe.len() < 32 || u.len() < 48 {
        return None;
    }
    let password = truncate_password_utf8(password);
    let hash = hash_password_r6(password, &o[32..40], &u[..48], revision);
    if !constant_time_compare(&hash, &o[..32]) {
        return None;
    }
    let wrap = hash_password_r6(password, &o[40..48], &u[..48], revision);
    aes::aes_cbc_decrypt_no_padding(&wrap, &[0u8; 16], &oe[..32]).ok()
}

/// Passwords for revisions 5 and 6 are UTF-8 limited to 127 bytes.
pub fn truncate_password_utf8(password: &[u8]) -> &[u8] {
    if password.len() <= 127 {
        return password;
    }
    let mut end = 127;
    while end > 0 && (password[end] & 0xC0) == 0x80 {
        end -= 1;
    }
    &password[..end]
}

/// Random bytes from v4 UUIDs mixed with the clock through MD5.
pub fn random_bytes(len: usize) -> Vec<u8> {
    let mut result = Vec::with_capacity(len);
    while result.len() < len {
        let mut hasher = Md5::new();
        hasher.update(uuid::Uuid::new_v4().as_bytes());
        let now = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default();
        hasher.update(now.as_nanos().to_le_bytes());
        let hash = hasher.finalize();
        let remaining = len - result.len();
        result.extend_from_slice(&hash[..remaining.min(16)]);
    }
    result
}

fn constant_time_compare(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pad_password() {
        let padded = pad_password(b"test");
        assert_eq!(&padded[..4], b"test");
        assert_eq!(&padded[4..], &PADDING[..28]);

        let long = b"this is a very long password that exceeds 32 bytes";
        assert_eq!(&pad_password(long)[..], &long[..32]);
        assert_eq!(pad_password(b""), *PADDING);
    }

    #[test]
    fn test_constant_time_compare() {
        assert!(constant_time_compare(b"abcd", b"abcd"));
        assert!(!constant_time_compare(b"abcd", b"abce"));
        assert!(!constant_time_compare(b"abc", b"abcd"));
    }

    fn round_trip(revision: u32, key_length: usize) {
        let file_id = b"0123456789abcdef";
        let p = -3904i32;
        let o = compute_owner_password_hash(b"owner", b"user", revision, key_length);
        assert_eq!(o.len(), 32);
        let key = compute_encryption_key(b"user", &o, p, file_id, revision, key_length, true);
        assert_eq!(key.len(), key_length);
        let u = compute_user_password_hash(&key, file_id, revision);
        assert_eq!(u.len(), 32);

        let auth = authenticate_user_password(b"user", &u, &o, p, file_id, revision, key_length, true);
        assert_eq!(auth, Some(key.clone()));
        assert!(authenticate_user_password(b"wrong", &u, &o, p, file_id, revision, key_length, true)
            .is_none());

        let recovered = user_password_from_owner(b"owner", &o, revision, key_length);
        assert_eq!(recovered, pad_password(b"user").to_vec());
        let via_owner =
            authenticate_user_password(&recovered, &u, &o, p, file_id, revision, key_length, true);
        assert_eq!(via_owner, Some(key));
    }

    #[test]
    fn test_rc4_40_round_trip() {
        round_trip(2, 5);
    }

    #[test]
    fn test_rc4_128_round_trip() {
        round_trip(3, 16);
    }

    #[test]
    fn test_aes128_revision_round_trip() {
        round_trip(4, 16);
    }

    #[test]
    fn test_empty_owner_uses_user() {
        assert_eq!(
            compute_owner_password_hash(b"", b"user", 3, 16),
            compute_owner_password_hash(b"user", b"user", 3, 16)
        );
    }

    #[test]
    fn test_r6_user_and_owner() {
        let file_key = [0x42u8; 32];
        let (uvs, uks, ovs, oks) = ([1u8; 8], [2u8; 8], [3u8; 8], [4u8; 8]);

        let mut u = hash_password_r6(b"user", &uvs, &[], 6).to_vec();
        u.extend_from_slice(&uvs);
        u.extend_from_slice(&uks);
        let ue = aes::aes_cbc_encrypt_no_padding(
            &hash_password_r6(b"user", &uks, &[], 6),
            &[0u8; 16],
            &file_key,
        )
        .unwrap();

        let mut o = hash_password_r6(b"owner", &ovs, &u, 6).to_vec();
        o.extend_from_slice(&ovs);
        o.extend_from_slice(&oks);
        let oe = aes::aes_cbc_encrypt_no_padding(
            &hash_password_r6(b"owner", &oks, &u, 6),
            &[0u8; 16],
            &file_key,
        )
        .unwrap();

        assert_eq!(authenticate_user_r6(b"user", &u, &ue, 6), Some(file_key.to_vec()));
        assert_eq!(authenticate_owner_r6(b"owner", &o, &oe, &u, 6), Some(file_key.to_vec()));
        assert!(authenticate_user_r6(b"owner", &u, &ue, 6).is_none());
        assert!(authenticate_owner_r6(b"user", &o, &oe, &u, 6).is_none());
    }

    #[test]
    fn test_r5_hash_is_plain_sha256() {
        let expected = Sha256::digest(b"pwsaltsalt");
        assert_eq!(hash_password_r6(b"pw", b"saltsalt", &[], 5)[..], expected[..]);
        assert_ne!(hash_password_r6(b"pw", b"saltsalt", &[], 6)[..], expected[..]);
    }

    #[test]
    fn test_truncate_password_utf8() {
        let long = "é".repeat(100);
        let t = truncate_password_utf8(long.as_bytes());
        assert!(t.len() <= 127);
        assert!(std::str::from_utf8(t).is_ok());
        assert_eq!(truncate_password_utf8(b"short"), b"short");
    }

    #[test]
    fn test_random_bytes_length() {
        assert_eq!(random_bytes(0).len(), 0);
        assert_eq!(random_bytes(40).len(), 40);
        assert_ne!(random_bytes(16), random_bytes(16));
    }
}

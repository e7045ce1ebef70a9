//! One-way hashing for secret fields.
//!
//! Hashed secrets have the form `blake3$<salt>$<digest>`, where the salt is
//! 16 random bytes and the digest is BLAKE3 over salt then secret, both hex
//! encoded.

use rand::RngCore;

const TAG: &str = "blake3";
const SALT_LEN: usize = 16;

fn digest(salt: &[u8], plain: &str) -> blake3::Hash {
    let mut hasher = blake3::Hasher::new();
    hasher.update(salt);
    hasher.update(plain.as_bytes());
    hasher.finalize()
}

fn split(hashed: &str) -> Option<(Vec<u8>, blake3::Hash)> {
    let mut parts = hashed.split('$');
    let (tag, salt, sum) = (parts.next()?, parts.next()?, parts.next()?);
    if tag != TAG || parts.next().is_some() {
        return None;
    }
    let salt = hex::decode(salt).ok().filter(|s| s.len() == SALT_LEN)?;
    let sum = blake3::Hash::from_hex(sum).ok()?;
    Some((salt, sum))
}

/// Hash a plaintext secret with a fresh salt.
pub fn hash_secret(plain: &str) -> String {
    let mut salt = [0u8; SALT_LEN];
    rand::thread_rng().fill_bytes(&mut salt);
    let sum = digest(&salt, plain);
    format!("{TAG}${}${}", hex::encode(salt), sum.to_hex())
}

/// Whether `value` is already in hashed form.
pub fn is_hashed(value: &str) -> bool {
    split(value).is_some()
}

/// Check a plaintext secret against a hashed one.
pub fn check_secret(plain: &str, hashed: &str) -> bool {
    match split(hashed) {
        // blake3::Hash compares in constant time
        Some((salt, sum)) => digest(&salt, plain) == sum,
        None => false,
    }
}

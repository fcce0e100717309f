//! Agent fleet authentication primitives: API key generation,
//! at-rest hashing, and constant-time comparison. Kept in its own crate
//! since it is shared between `synqx_control` (stores the hash) and
//! `synqx_executor`'s agent binary (holds the plaintext key).

use sha2::{Digest, Sha256};

/// Generates a fresh plaintext API key. Returned once, at registration
/// time, and never stored — only [`hash_api_key`]'s output is persisted.
pub fn generate_api_key() -> String {
    format!("synqx_{}{}", uuid::Uuid::new_v4().simple(), uuid::Uuid::new_v4().simple())
}

/// Hashes a plaintext API key for at-rest storage.
pub fn hash_api_key(plaintext: &str) -> String {
    hex::encode(Sha256::digest(plaintext.as_bytes()))
}

/// Constant-time equality check over two hash strings, so a timing
/// side-channel can't shave bytes off a guessed hash. Lengths are compared
/// up front — this leaks length, but hash digests are a fixed length in
/// practice, so there's nothing to learn from it.
pub fn constant_time_eq(a: &str, b: &str) -> bool {
    let (a, b) = (a.as_bytes(), b.as_bytes());
    if a.len() != b.len() {
        return false;
    }
    let mut diff: u8 = 0;
    for (x, y) in a.iter().zip(b.iter()) {
        diff |= x ^ y;
    }
    diff == 0
}

/// Verifies a presented plaintext API key against a stored hash.
pub fn verify_api_key(plaintext: &str, stored_hash: &str) -> bool {
    constant_time_eq(&hash_api_key(plaintext), stored_hash)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_is_deterministic() {
        assert_eq!(hash_api_key("secret"), hash_api_key("secret"));
    }

    #[test]
    fn verify_accepts_the_right_key_and_rejects_others() {
        let key = generate_api_key();
        let hash = hash_api_key(&key);
        assert!(verify_api_key(&key, &hash));
        assert!(!verify_api_key("wrong-key", &hash));
    }

    #[test]
    fn constant_time_eq_rejects_different_lengths_and_contents() {
        assert!(constant_time_eq("abc", "abc"));
        assert!(!constant_time_eq("abc", "abd"));
        assert!(!constant_time_eq("abc", "abcd"));
    }
}

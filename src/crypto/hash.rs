//! Hashing utilities for the wallet
//!
//! Provides SHA-256 based hashing used to derive deterministic
//! operation identifiers and labelled addresses.

use sha2::{Digest, Sha256};

/// Computes SHA-256 hash into a fixed 32-byte array
pub fn sha256_array(data: &[u8]) -> [u8; 32] {
    Sha256::digest(data).into()
}

/// Hashes a sequence of byte slices as one message, length-prefixing each
/// part so that `["ab", "c"]` and `["a", "bc"]` never produce the same digest
pub fn sha256_parts(parts: &[&[u8]]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    for part in parts {
        hasher.update((part.len() as u64).to_be_bytes());
        hasher.update(part);
    }
    hasher.finalize().into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sha256() {
        assert_eq!(
            hex::encode(sha256_array(b"hello world")),
            "b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9"
        );
    }

    #[test]
    fn test_parts_are_length_prefixed() {
        let a = sha256_parts(&[b"ab", b"c"]);
        let b = sha256_parts(&[b"a", b"bc"]);
        assert_ne!(a, b);
        assert_eq!(a, sha256_parts(&[b"ab", b"c"]));
    }
}

//! One-way digest utility.
//!
//! Wraps SHA-256 to produce token identifiers and keyed signatures over a
//! canonical payload string plus a shared secret. Pure and deterministic;
//! any verifier holding the same secret recomputes the same values.

use sha2::{Digest, Sha256};

/// Lowercase hex SHA-256 of the input string.
pub fn sha256_hex(input: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(input.as_bytes());
    hex::encode(hasher.finalize())
}

/// Keyed signature: SHA-256 over `payload:secret`.
///
/// Not a formal HMAC, but stable and recomputable by any holder of the
/// secret, which is the contract the token format needs.
pub fn signature_hex(payload: &str, secret: &str) -> String {
    sha256_hex(&format!("{}:{}", payload, secret))
}

/// Derive a token identifier from merchant id, transaction id and a
/// creation-time nonce. Collision probability is cryptographically
/// negligible; uniqueness is not formally guaranteed.
pub fn token_id(merchant_id: &str, transaction_id: &str, nonce: u64) -> String {
    sha256_hex(&format!("{}:{}:{}", merchant_id, transaction_id, nonce))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sha256_hex_deterministic() {
        let a = sha256_hex("hello");
        let b = sha256_hex("hello");
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_sha256_hex_known_vector() {
        // SHA-256("abc")
        assert_eq!(
            sha256_hex("abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_signature_depends_on_secret() {
        let sig1 = signature_hex("payload", "secret-a");
        let sig2 = signature_hex("payload", "secret-b");
        assert_ne!(sig1, sig2);
    }

    #[test]
    fn test_token_id_varies_with_nonce() {
        let id1 = token_id("M1", "T1", 1);
        let id2 = token_id("M1", "T1", 2);
        assert_ne!(id1, id2);
    }
}

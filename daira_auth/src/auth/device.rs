//! Device identifiers and opaque random tokens.

use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use rand::RngCore;
use sha2::{Digest, Sha256};

/// Bytes of entropy in a session id
pub const SESSION_ID_BYTES: usize = 32;

/// Bytes of entropy in the last-resort random device id
const RANDOM_DEVICE_ID_BYTES: usize = 16;

/// Generate a cryptographically random, URL-safe token of `bytes` entropy
pub fn random_token(bytes: usize) -> String {
    let mut buffer = vec![0u8; bytes];
    rand::rng().fill_bytes(&mut buffer);
    URL_SAFE_NO_PAD.encode(buffer)
}

/// Generate a new opaque session id
pub fn generate_session_id() -> String {
    random_token(SESSION_ID_BYTES)
}

/// SHA-256 hex digest of a client-supplied fingerprint
pub fn hash_fingerprint(fingerprint: &str) -> String {
    hex::encode(Sha256::digest(fingerprint.as_bytes()))
}

/// Derive a stable device id.
///
/// Preference order: hashed fingerprint, hashed User-Agent, random token.
/// Empty strings count as absent.
pub fn derive_device_id(fingerprint: Option<&str>, user_agent: Option<&str>) -> String {
    if let Some(fingerprint) = fingerprint.filter(|f| !f.is_empty()) {
        return hash_fingerprint(fingerprint);
    }

    if let Some(user_agent) = user_agent.filter(|ua| !ua.is_empty()) {
        return hex::encode(Sha256::digest(user_agent.as_bytes()));
    }

    random_token(RANDOM_DEVICE_ID_BYTES)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_id_entropy_and_alphabet() {
        let first = generate_session_id();
        let second = generate_session_id();

        assert_ne!(first, second);
        // 32 bytes base64 without padding
        assert_eq!(first.len(), 43);
        assert!(
            first
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        );
    }

    #[test]
    fn test_fingerprint_digest_is_sha256_hex() {
        assert_eq!(
            hash_fingerprint("abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_device_id_preference_order() {
        let from_fp = derive_device_id(Some("fp-1"), Some("Mozilla/5.0"));
        assert_eq!(from_fp, hash_fingerprint("fp-1"));

        let from_ua = derive_device_id(None, Some("Mozilla/5.0"));
        assert_eq!(from_ua, hash_fingerprint("Mozilla/5.0"));
        assert_eq!(from_ua, derive_device_id(Some(""), Some("Mozilla/5.0")));

        let random_a = derive_device_id(None, None);
        let random_b = derive_device_id(None, None);
        assert_ne!(random_a, random_b);
        assert_eq!(random_a.len(), 22);
    }
}

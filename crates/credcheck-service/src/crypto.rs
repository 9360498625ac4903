//! Cryptographic utilities.
//!
//! Upload request signing for the Cloudinary API and constant-time comparison
//! for the admin API key.

use sha2::{Digest, Sha256};

/// Hex-encoded SHA-256 of `message` (64 characters).
#[must_use]
pub fn sha256_hex(message: &str) -> String {
    hex::encode(Sha256::digest(message.as_bytes()))
}

/// Sign Cloudinary upload parameters.
///
/// Parameters are sorted by name, joined as `k=v` pairs with `&`, the API
/// secret is appended and the result is hashed with SHA-256. Empty values are
/// left out, as the Cloudinary API does on its side.
#[must_use]
pub fn cloudinary_signature(params: &[(&str, &str)], api_secret: &str) -> String {
    let mut params: Vec<_> = params.iter().filter(|(_, v)| !v.is_empty()).collect();
    params.sort_by_key(|(k, _)| *k);
    let to_sign = params
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join("&");
    sha256_hex(&format!("{to_sign}{api_secret}"))
}

/// Constant-time string comparison to prevent timing attacks.
#[must_use]
pub fn constant_time_eq(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }

    let mut result = 0u8;
    for (x, y) in a.bytes().zip(b.bytes()) {
        result |= x ^ y;
    }
    result == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sha256_known_vector() {
        assert_eq!(
            sha256_hex("abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn signature_is_order_independent() {
        let a = cloudinary_signature(&[("timestamp", "1"), ("folder", "f")], "secret");
        let b = cloudinary_signature(&[("folder", "f"), ("timestamp", "1")], "secret");
        assert_eq!(a, b);
        assert_eq!(a, sha256_hex("folder=f&timestamp=1secret"));
    }

    #[test]
    fn signature_skips_empty_values() {
        assert_eq!(
            cloudinary_signature(&[("folder", ""), ("timestamp", "7")], "s"),
            sha256_hex("timestamp=7s")
        );
    }

    #[test]
    fn constant_time_eq_behaviour() {
        assert!(constant_time_eq("abc", "abc"));
        assert!(constant_time_eq("", ""));
        assert!(!constant_time_eq("abc", "abd"));
        assert!(!constant_time_eq("abc", "ab"));
        assert!(!constant_time_eq("abc", "ABC"));
    }
}

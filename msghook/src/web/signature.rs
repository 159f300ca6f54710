//! Webhook signature verification.
//!
//! Senders sign the raw request body with HMAC-SHA256 using the shared
//! webhook secret and send the lowercase hex digest in `X-Signature`.

use hmac::{Hmac, Mac};
use sha2::Sha256;
use tracing::warn;

type HmacSha256 = Hmac<Sha256>;

/// Header carrying the hex-encoded body signature.
pub const SIGNATURE_HEADER: &str = "X-Signature";

/// Compute the lowercase hex HMAC-SHA256 of `body` keyed with `secret`.
pub fn compute_signature(secret: &str, body: &[u8]) -> String {
    // HMAC accepts keys of any length.
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .expect("HMAC can take key of any size");
    mac.update(body);
    hex::encode(mac.finalize().into_bytes())
}

/// Verify a webhook body signature.
///
/// # Arguments
///
/// * `secret` - The shared webhook secret
/// * `body` - The raw request body, exactly as received
/// * `signature` - The hex digest from the `X-Signature` header
///
/// # Returns
///
/// `true` only if the secret is non-empty, the signature is lowercase hex
/// with no surrounding whitespace, and it matches the expected digest. The
/// digest comparison is constant-time.
pub fn verify_signature(secret: &str, body: &[u8], signature: &str) -> bool {
    if secret.is_empty() || signature.is_empty() {
        warn!(
            has_secret = !secret.is_empty(),
            has_signature = !signature.is_empty(),
            "signature_missing_fields"
        );
        return false;
    }

    if !signature.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f')) {
        warn!(signature_length = signature.len(), "signature_malformed");
        return false;
    }

    let provided = match hex::decode(signature) {
        Ok(bytes) => bytes,
        Err(_) => {
            warn!(signature_length = signature.len(), "signature_malformed");
            return false;
        }
    };

    let mut mac = match HmacSha256::new_from_slice(secret.as_bytes()) {
        Ok(m) => m,
        Err(_) => {
            warn!("signature_invalid_key");
            return false;
        }
    };
    mac.update(body);

    let valid = mac.verify_slice(&provided).is_ok();

    if !valid {
        warn!(
            signature_length = signature.len(),
            body_length = body.len(),
            "signature_mismatch"
        );
    }

    valid
}

#[cfg(test)]
mod tests {
    use super::*;

    const BODY: &[u8] =
        br#"{"message_id":"m1","from":"+1","to":"+2","ts":"2025-01-01T00:00:00Z","text":"hi"}"#;

    #[test]
    fn test_compute_signature_format() {
        let sig = compute_signature("test-secret", br#"{"message_id": "m1"}"#);
        assert_eq!(sig.len(), 64);
        assert!(sig.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }

    #[test]
    fn test_compute_signature_known_vector() {
        // RFC 4231 test case 2
        let sig = compute_signature("Jefe", b"what do ya want for nothing?");
        assert_eq!(
            sig,
            "5bdcc146bf60754e6a042426089575c75a003f089d2739839dec58b964ec3843"
        );
    }

    #[test]
    fn test_signature_depends_on_secret() {
        assert_ne!(compute_signature("secret1", BODY), compute_signature("secret2", BODY));
        assert_eq!(compute_signature("abc", BODY), compute_signature("abc", BODY));
    }

    #[test]
    fn test_verify_signature_valid() {
        let sig = compute_signature("abc", BODY);
        assert!(verify_signature("abc", BODY, &sig));
    }

    #[test]
    fn test_verify_signature_missing_fields() {
        let sig = compute_signature("abc", BODY);
        assert!(!verify_signature("", BODY, &sig));
        assert!(!verify_signature("abc", BODY, ""));
    }

    #[test]
    fn test_verify_signature_malformed_hex() {
        assert!(!verify_signature("abc", BODY, "invalid-signature"));
        assert!(!verify_signature("abc", BODY, "abc"));
    }

    #[test]
    fn test_verify_signature_requires_exact_lowercase() {
        let sig = compute_signature("abc", BODY);
        assert!(!verify_signature("abc", BODY, &sig.to_uppercase()));
        assert!(!verify_signature("abc", BODY, &format!(" {sig} ")));
        assert!(!verify_signature("abc", BODY, &format!("{sig}\n")));
    }

    #[test]
    fn test_verify_signature_mismatch() {
        let sig = compute_signature("abc", BODY);
        assert!(!verify_signature("other", BODY, &sig));
        assert!(!verify_signature("abc", b"tampered", &sig));
        // Correct prefix, truncated digest
        assert!(!verify_signature("abc", BODY, &sig[..32]));
    }
}

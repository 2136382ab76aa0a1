//! HMAC payload signing

use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// HTTP header carrying the payload signature.
pub const SIGNATURE_HEADER: &str = "X-Voicetyped-Signature-256";

/// Sign a payload: `"sha256=" + hex(HMAC-SHA256(secret, payload))`.
pub fn sign(secret: &str, payload: &[u8]) -> String {
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("hmac accepts any key length");
    mac.update(payload);
    format!("sha256={}", hex::encode(mac.finalize().into_bytes()))
}

/// Verify a signature in constant time.
pub fn verify(secret: &str, payload: &[u8], signature: &str) -> bool {
    let Some(hex_digest) = signature.strip_prefix("sha256=") else {
        return false;
    };
    let Ok(digest) = hex::decode(hex_digest) else {
        return false;
    };
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("hmac accepts any key length");
    mac.update(payload);
    mac.verify_slice(&digest).is_ok()
}

/// A cryptographically random 32-byte secret, hex-encoded.
pub fn generate_secret() -> String {
    let mut bytes = [0u8; 32];
    rand::Rng::fill(&mut rand::thread_rng(), &mut bytes[..]);
    hex::encode(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sign_verify_round_trip() {
        let sig = sign("key", b"message");
        assert!(sig.starts_with("sha256="));
        assert!(verify("key", b"message", &sig));
    }

    #[test]
    fn test_verify_rejects_wrong_key_or_message() {
        let sig = sign("key", b"message");
        assert!(!verify("other", b"message", &sig));
        assert!(!verify("key", b"tampered", &sig));
        assert!(!verify("key", b"message", "sha256=deadbeef"));
        assert!(!verify("key", b"message", "not-a-signature"));
    }

    #[test]
    fn test_generate_secret_shape() {
        let a = generate_secret();
        let b = generate_secret();
        assert_eq!(a.len(), 64);
        assert_ne!(a, b);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
    }
}

//! Webhook signature verification. Timing-safe comparison via `subtle`
//! prevents a byte-at-a-time timing attack on the signature check.

use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, thiserror::Error)]
pub enum SignatureError {
    #[error("malformed signature header")]
    Malformed,
    #[error("signature does not match payload")]
    Mismatch,
}

/// Verifies a GitHub/Jira-style `sha256=<hex>` webhook signature header
/// against `secret` and the raw request body.
pub fn verify_sha256_signature(secret: &str, body: &[u8], header_value: &str) -> Result<(), SignatureError> {
    let hex_digest = header_value
        .strip_prefix("sha256=")
        .ok_or(SignatureError::Malformed)?;
    let expected = decode_hex(hex_digest).map_err(|_| SignatureError::Malformed)?;

    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).map_err(|_| SignatureError::Malformed)?;
    mac.update(body);
    let computed = mac.finalize().into_bytes();

    if computed.as_slice().ct_eq(&expected).into() {
        Ok(())
    } else {
        Err(SignatureError::Mismatch)
    }
}

fn decode_hex(s: &str) -> Result<Vec<u8>, ()> {
    if s.len() % 2 != 0 {
        return Err(());
    }
    (0..s.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(&s[i..i + 2], 16).map_err(|_| ()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use hmac::Mac;

    fn sign(secret: &str, body: &[u8]) -> String {
        let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).unwrap();
        mac.update(body);
        format!("sha256={}", hex_encode(&mac.finalize().into_bytes()))
    }

    fn hex_encode(bytes: &[u8]) -> String {
        bytes.iter().map(|b| format!("{b:02x}")).collect()
    }

    #[test]
    fn valid_signature_accepted() {
        let secret = "topsecret";
        let body = b"{\"event\":\"push\"}";
        let header = sign(secret, body);
        assert!(verify_sha256_signature(secret, body, &header).is_ok());
    }

    #[test]
    fn tampered_body_rejected() {
        let secret = "topsecret";
        let header = sign(secret, b"{\"event\":\"push\"}");
        let result = verify_sha256_signature(secret, b"{\"event\":\"evil\"}", &header);
        assert!(matches!(result, Err(SignatureError::Mismatch)));
    }

    #[test]
    fn malformed_header_rejected() {
        let result = verify_sha256_signature("secret", b"body", "not-a-signature");
        assert!(matches!(result, Err(SignatureError::Malformed)));
    }
}

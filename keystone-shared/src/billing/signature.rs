//! Webhook signatures
//!
//! The provider sends a header of the form `t=<unix seconds>,v1=<hex>`,
//! where the hex value is HMAC-SHA256 over `"{t}.{raw body}"` keyed with
//! the webhook secret. Several `v1` entries may appear during secret
//! rotation; any match is accepted. Timestamps older or newer than the
//! tolerance are rejected to limit replays.

use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Request header carrying the signature
pub const SIGNATURE_HEADER: &str = "webhook-signature";

/// Default replay window in seconds
pub const DEFAULT_TOLERANCE_SECS: i64 = 300;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SignatureError {
    #[error("Signature header is malformed")]
    Malformed,

    #[error("Signature header has no timestamp")]
    MissingTimestamp,

    #[error("Signature header has no v1 signature")]
    MissingSignature,

    #[error("Signature timestamp outside tolerance")]
    TimestampOutOfTolerance,

    #[error("Signature does not match")]
    Mismatch,

    #[error("Webhook secret is unusable")]
    InvalidSecret,
}

fn mac(secret: &str, timestamp: i64, payload: &[u8]) -> Result<HmacSha256, SignatureError> {
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).map_err(|_| SignatureError::InvalidSecret)?;
    mac.update(timestamp.to_string().as_bytes());
    mac.update(b".");
    mac.update(payload);
    Ok(mac)
}

/// Produces a header value for `payload` at `timestamp`.
pub fn sign_payload(payload: &[u8], secret: &str, timestamp: i64) -> Result<String, SignatureError> {
    let signature = mac(secret, timestamp, payload)?.finalize().into_bytes();
    Ok(format!("t={},v1={}", timestamp, hex::encode(signature)))
}

/// Verifies a signature header against the raw request body.
pub fn verify_signature(
    payload: &[u8],
    header: &str,
    secret: &str,
    tolerance_secs: i64,
    now: i64,
) -> Result<(), SignatureError> {
    let mut timestamp = None;
    let mut signatures = Vec::new();

    for part in header.split(',') {
        let (key, value) = part.trim().split_once('=').ok_or(SignatureError::Malformed)?;
        match key {
            "t" => {
                timestamp = Some(value.parse::<i64>().map_err(|_| SignatureError::Malformed)?);
            }
            "v1" => signatures.push(value),
            _ => {}
        }
    }

    let timestamp = timestamp.ok_or(SignatureError::MissingTimestamp)?;
    if signatures.is_empty() {
        return Err(SignatureError::MissingSignature);
    }

    if (now - timestamp).abs() > tolerance_secs {
        return Err(SignatureError::TimestampOutOfTolerance);
    }

    let expected = mac(secret, timestamp, payload)?;
    let matched = signatures.iter().any(|candidate| {
        hex::decode(candidate)
            .map(|bytes| expected.clone().verify_slice(&bytes).is_ok())
            .unwrap_or(false)
    });

    if matched {
        Ok(())
    } else {
        Err(SignatureError::Mismatch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "whsec_test_secret";
    const BODY: &[u8] = br#"{"id":"evt_1","type":"customer.subscription.updated"}"#;
    const NOW: i64 = 1_700_000_000;

    #[test]
    fn test_sign_then_verify() {
        let header = sign_payload(BODY, SECRET, NOW).unwrap();
        assert!(header.starts_with(&format!("t={},v1=", NOW)));
        assert_eq!(verify_signature(BODY, &header, SECRET, 300, NOW + 10), Ok(()));
    }

    #[test]
    fn test_tampered_body() {
        let header = sign_payload(BODY, SECRET, NOW).unwrap();
        assert_eq!(
            verify_signature(b"{}", &header, SECRET, 300, NOW),
            Err(SignatureError::Mismatch)
        );
    }

    #[test]
    fn test_wrong_secret() {
        let header = sign_payload(BODY, "other", NOW).unwrap();
        assert_eq!(
            verify_signature(BODY, &header, SECRET, 300, NOW),
            Err(SignatureError::Mismatch)
        );
    }

    #[test]
    fn test_replay_window() {
        let header = sign_payload(BODY, SECRET, NOW).unwrap();
        assert_eq!(
            verify_signature(BODY, &header, SECRET, 300, NOW + 301),
            Err(SignatureError::TimestampOutOfTolerance)
        );
        assert_eq!(
            verify_signature(BODY, &header, SECRET, 300, NOW - 301),
            Err(SignatureError::TimestampOutOfTolerance)
        );
    }

    #[test]
    fn test_rotated_secrets() {
        let good = sign_payload(BODY, SECRET, NOW).unwrap();
        let good_sig = good.split("v1=").nth(1).unwrap();
        let header = format!("t={},v1={},v1={}", NOW, "00".repeat(32), good_sig);
        assert_eq!(verify_signature(BODY, &header, SECRET, 300, NOW), Ok(()));
    }

    #[test]
    fn test_malformed_headers() {
        assert_eq!(
            verify_signature(BODY, "garbage", SECRET, 300, NOW),
            Err(SignatureError::Malformed)
        );
        assert_eq!(
            verify_signature(BODY, "t=abc,v1=00", SECRET, 300, NOW),
            Err(SignatureError::Malformed)
        );
        assert_eq!(
            verify_signature(BODY, "v1=00", SECRET, 300, NOW),
            Err(SignatureError::MissingTimestamp)
        );
        assert_eq!(
            verify_signature(BODY, &format!("t={}", NOW), SECRET, 300, NOW),
            Err(SignatureError::MissingSignature)
        );
        assert_eq!(
            verify_signature(BODY, &format!("t={},v1=not-hex", NOW), SECRET, 300, NOW),
            Err(SignatureError::Mismatch)
        );
    }
}

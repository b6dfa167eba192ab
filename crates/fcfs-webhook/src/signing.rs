//! Webhook signing.
//!
//! The signed message is `"<timestamp>.<body>"` under HMAC-SHA256; the header
//! value is `sha256=<hex>`. Verification is timing-safe (`Mac::verify_slice`)
//! and bounded by a ±300 s replay window — receivers can use [`verify`]
//! as-is.

use anyhow::{anyhow, Result};
use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

pub const SIGNATURE_PREFIX: &str = "sha256=";

/// A signature older or newer than this many seconds is rejected.
pub const REPLAY_WINDOW_SECS: i64 = 300;

/// Produce the `X-Signature` header value for a body at a timestamp.
pub fn sign(secret: &[u8], timestamp: i64, body: &[u8]) -> Result<String> {
    let mut mac =
        HmacSha256::new_from_slice(secret).map_err(|_| anyhow!("invalid hmac key length"))?;
    mac.update(timestamp.to_string().as_bytes());
    mac.update(b".");
    mac.update(body);
    let digest = mac.finalize().into_bytes();
    Ok(format!("{SIGNATURE_PREFIX}{}", hex::encode(digest)))
}

/// Check a signature against a body, timestamp and current time.
pub fn verify(secret: &[u8], timestamp: i64, body: &[u8], signature: &str, now: i64) -> bool {
    if (now - timestamp).abs() > REPLAY_WINDOW_SECS {
        return false;
    }
    let Some(hex_digest) = signature.strip_prefix(SIGNATURE_PREFIX) else {
        return false;
    };
    let Ok(expected) = hex::decode(hex_digest) else {
        return false;
    };
    let Ok(mut mac) = HmacSha256::new_from_slice(secret) else {
        return false;
    };
    mac.update(timestamp.to_string().as_bytes());
    mac.update(b".");
    mac.update(body);
    mac.verify_slice(&expected).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &[u8] = b"whsec_test_0123456789";

    #[test]
    fn sign_then_verify_round_trips() {
        let body = br#"{"event":"claim.confirmed"}"#;
        let ts = 1_730_000_000;
        let sig = sign(SECRET, ts, body).unwrap();
        assert!(sig.starts_with("sha256="));
        assert!(verify(SECRET, ts, body, &sig, ts));
        assert!(verify(SECRET, ts, body, &sig, ts + REPLAY_WINDOW_SECS));
        assert!(verify(SECRET, ts, body, &sig, ts - REPLAY_WINDOW_SECS));
    }

    #[test]
    fn different_body_fails() {
        let ts = 1_730_000_000;
        let sig = sign(SECRET, ts, b"a").unwrap();
        assert!(!verify(SECRET, ts, b"b", &sig, ts));
    }

    #[test]
    fn different_secret_fails() {
        let ts = 1_730_000_000;
        let sig = sign(SECRET, ts, b"a").unwrap();
        assert!(!verify(b"whsec_other", ts, b"a", &sig, ts));
    }

    #[test]
    fn outside_replay_window_fails() {
        let ts = 1_730_000_000;
        let sig = sign(SECRET, ts, b"a").unwrap();
        assert!(!verify(SECRET, ts, b"a", &sig, ts + 400));
        assert!(!verify(SECRET, ts, b"a", &sig, ts - 400));
        assert!(!verify(SECRET, ts, b"a", &sig, ts + REPLAY_WINDOW_SECS + 1));
    }

    #[test]
    fn malformed_signatures_fail_closed() {
        let ts = 1_730_000_000;
        assert!(!verify(SECRET, ts, b"a", "md5=abcdef", ts));
        assert!(!verify(SECRET, ts, b"a", "sha256=nothex!", ts));
        assert!(!verify(SECRET, ts, b"a", "", ts));
    }
}

//! HMAC request signing.
//!
//! Every non-health request carries `Authorization: hmac <ts>:<mac>`
//! where `<ts>` is a decimal unix timestamp and `<mac>` is the
//! hex-encoded HMAC-SHA256 of that decimal string under the shared
//! token. Verification rejects anything outside a ±60 s window and
//! compares MACs in constant time.

use chrono::Utc;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;

type HmacSha256 = Hmac<Sha256>;

/// Maximum accepted clock skew, in either direction.
pub const MAX_SKEW_SECS: i64 = 60;

const SCHEME_PREFIX: &str = "hmac ";

/// Why a header was rejected. The HTTP layer collapses every variant to
/// 401; the distinction exists for logs.
#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum AuthError {
    #[error("invalid header prefix")]
    MissingPrefix,
    #[error("invalid header format")]
    Malformed,
    #[error("invalid timestamp")]
    InvalidTimestamp,
    #[error("timestamp outside the acceptance window")]
    Expired,
    #[error("signature mismatch")]
    Mismatch,
}

/// Build an `Authorization` header value for the current time.
#[must_use]
pub fn build_header(token: &str) -> String {
    build_header_at(token, Utc::now().timestamp())
}

/// Build a header for an explicit timestamp.
#[must_use]
pub fn build_header_at(token: &str, timestamp: i64) -> String {
    format!("hmac {timestamp}:{}", sign(token, timestamp))
}

/// Verify a header against the current time.
///
/// # Errors
///
/// Returns the specific [`AuthError`] for logging; callers treat every
/// variant as unauthorized.
pub fn verify_header(header: &str, token: &str) -> Result<(), AuthError> {
    verify_header_at(header, token, Utc::now().timestamp())
}

/// Verify a header against an explicit current time.
///
/// # Errors
///
/// See [`verify_header`].
pub fn verify_header_at(header: &str, token: &str, now: i64) -> Result<(), AuthError> {
    let auth = header
        .strip_prefix(SCHEME_PREFIX)
        .ok_or(AuthError::MissingPrefix)?;

    let (ts_str, sig) = auth.split_once(':').ok_or(AuthError::Malformed)?;
    let timestamp: i64 = ts_str.parse().map_err(|_| AuthError::InvalidTimestamp)?;

    if (now - timestamp).abs() > MAX_SKEW_SECS {
        return Err(AuthError::Expired);
    }

    let expected = sign(token, timestamp);
    if expected.as_bytes().ct_eq(sig.as_bytes()).into() {
        Ok(())
    } else {
        Err(AuthError::Mismatch)
    }
}

fn sign(token: &str, timestamp: i64) -> String {
    // HMAC-SHA256 accepts any key length per RFC 2104, so new_from_slice
    // never fails here.
    #[allow(clippy::unwrap_used)]
    let mut mac = HmacSha256::new_from_slice(token.as_bytes()).unwrap();
    mac.update(timestamp.to_string().as_bytes());
    hex::encode(mac.finalize().into_bytes())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    const TOKEN: &str = "cluster-token";
    const NOW: i64 = 1_750_000_000;

    #[test]
    fn valid_header_verifies() {
        let header = build_header_at(TOKEN, NOW);
        assert_eq!(verify_header_at(&header, TOKEN, NOW), Ok(()));
    }

    #[test]
    fn skew_of_exactly_sixty_seconds_is_accepted() {
        let header = build_header_at(TOKEN, NOW - MAX_SKEW_SECS);
        assert_eq!(verify_header_at(&header, TOKEN, NOW), Ok(()));

        let future = build_header_at(TOKEN, NOW + MAX_SKEW_SECS);
        assert_eq!(verify_header_at(&future, TOKEN, NOW), Ok(()));
    }

    #[test]
    fn skew_of_sixty_one_seconds_is_rejected() {
        let header = build_header_at(TOKEN, NOW - MAX_SKEW_SECS - 1);
        assert_eq!(verify_header_at(&header, TOKEN, NOW), Err(AuthError::Expired));
    }

    #[test]
    fn wrong_token_is_rejected() {
        let header = build_header_at("other-token", NOW);
        assert_eq!(
            verify_header_at(&header, TOKEN, NOW),
            Err(AuthError::Mismatch)
        );
    }

    #[test]
    fn missing_prefix_is_rejected() {
        assert_eq!(
            verify_header_at("bearer abc", TOKEN, NOW),
            Err(AuthError::MissingPrefix)
        );
    }

    #[test]
    fn malformed_payload_is_rejected() {
        assert_eq!(
            verify_header_at("hmac no-separator", TOKEN, NOW),
            Err(AuthError::Malformed)
        );
        assert_eq!(
            verify_header_at("hmac notanumber:abcd", TOKEN, NOW),
            Err(AuthError::InvalidTimestamp)
        );
    }

    #[test]
    fn tampered_timestamp_is_rejected() {
        let header = build_header_at(TOKEN, NOW);
        let sig = header.split_once(':').unwrap().1;
        let forged = format!("hmac {}:{sig}", NOW + 5);
        assert_eq!(
            verify_header_at(&forged, TOKEN, NOW),
            Err(AuthError::Mismatch)
        );
    }
}

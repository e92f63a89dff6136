//! Access-token claim inspection.
//!
//! Reads the claims body of a JWT-shaped access token and derives the
//! expiry-related timestamps the refresh scheduler works from. The signature
//! is never checked here: the server rejects a bad token on use, this module
//! only needs to know when the token stops being useful.

use std::time::Duration;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, TimeDelta, Utc};
use serde_json::{Map, Value};
use thiserror::Error;

/// Why an access token could not be decoded.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("token is not a three-segment JWT")]
    MalformedToken,
    #[error("token payload is not valid base64url")]
    InvalidEncoding,
    #[error("token payload is not a JSON object: {0}")]
    InvalidJson(String),
    #[error("token payload has no exp claim")]
    MissingExpiry,
    #[error("token exp claim is not a number of seconds")]
    InvalidExpiry,
}

/// Claims extracted from an access token.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedClaims {
    /// `exp`, seconds since the Unix epoch.
    pub expires_at: i64,
    /// `sub`, when present as a string.
    pub subject: Option<String>,
    /// `iat`, when present and numeric.
    pub issued_at: Option<i64>,
    /// Every other claim, untouched.
    pub extra: Map<String, Value>,
}

impl DecodedClaims {
    /// Expiry as a timestamp, if it is representable.
    pub fn expires_at_utc(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp(self.expires_at, 0)
    }

    /// Signed time left until expiry. Negative once expired.
    pub fn time_until_expiry(&self, now: DateTime<Utc>) -> TimeDelta {
        let remaining_ms = i128::from(self.expires_at) * 1000 - i128::from(now.timestamp_millis());
        let clamped = remaining_ms.clamp(i128::from(i64::MIN / 2), i128::from(i64::MAX / 2));
        TimeDelta::milliseconds(clamped as i64)
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now.timestamp() >= self.expires_at
    }

    /// `max(0, time_until_expiry - buffer)`.
    pub fn time_until_refresh(&self, now: DateTime<Utc>, buffer: Duration) -> Duration {
        if self.is_expired(now) {
            return Duration::ZERO;
        }
        let remaining = self.time_until_expiry(now);
        let buffer_ms = i64::try_from(buffer.as_millis()).unwrap_or(i64::MAX);
        match remaining.num_milliseconds().checked_sub(buffer_ms) {
            Some(ms) if ms > 0 => Duration::from_millis(ms as u64),
            _ => Duration::ZERO,
        }
    }
}

/// Decode the claims body of `access_token`.
pub fn decode(access_token: &str) -> Result<DecodedClaims, DecodeError> {
    let mut parts = access_token.trim().split('.');
    let (Some(header), Some(payload), Some(_signature), None) =
        (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        return Err(DecodeError::MalformedToken);
    };
    if header.is_empty() || payload.is_empty() {
        return Err(DecodeError::MalformedToken);
    }

    let bytes = URL_SAFE_NO_PAD
        .decode(payload.trim_end_matches('='))
        .map_err(|_| DecodeError::InvalidEncoding)?;
    let value: Value =
        serde_json::from_slice(&bytes).map_err(|e| DecodeError::InvalidJson(e.to_string()))?;
    let Value::Object(mut claims) = value else {
        return Err(DecodeError::InvalidJson("expected an object".to_string()));
    };

    let expires_at = match claims.remove("exp") {
        None | Some(Value::Null) => return Err(DecodeError::MissingExpiry),
        Some(exp) => numeric_seconds(&exp).ok_or(DecodeError::InvalidExpiry)?,
    };
    let subject = match claims.remove("sub") {
        Some(Value::String(sub)) => Some(sub),
        Some(other) => {
            claims.insert("sub".to_string(), other);
            None
        }
        None => None,
    };
    let issued_at = claims.get("iat").and_then(numeric_seconds);
    if issued_at.is_some() {
        claims.remove("iat");
    }

    Ok(DecodedClaims {
        expires_at,
        subject,
        issued_at,
        extra: claims,
    })
}

/// Signed time left until `access_token` expires.
pub fn time_until_expiry(access_token: &str, now: DateTime<Utc>) -> Result<TimeDelta, DecodeError> {
    Ok(decode(access_token)?.time_until_expiry(now))
}

pub fn is_expired(access_token: &str, now: DateTime<Utc>) -> Result<bool, DecodeError> {
    Ok(decode(access_token)?.is_expired(now))
}

/// How long to wait before renewing `access_token`.
///
/// A token that cannot be decoded is due immediately.
pub fn time_until_refresh(access_token: &str, now: DateTime<Utc>, buffer: Duration) -> Duration {
    decode(access_token)
        .map(|claims| claims.time_until_refresh(now, buffer))
        .unwrap_or(Duration::ZERO)
}

fn numeric_seconds(value: &Value) -> Option<i64> {
    if let Some(secs) = value.as_i64() {
        return Some(secs);
    }
    let secs = value.as_f64()?;
    if secs.is_finite() && secs.abs() < i64::MAX as f64 {
        Some(secs.floor() as i64)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn token_with(claims: Value) -> String {
        let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"HS256","typ":"JWT"}"#);
        let payload = URL_SAFE_NO_PAD.encode(claims.to_string());
        format!("{header}.{payload}.c2lnbmF0dXJl")
    }

    fn at(secs: i64) -> DateTime<Utc> {
        DateTime::from_timestamp(secs, 0).unwrap()
    }

    #[test]
    fn decode_extracts_expiry_subject_and_extras() {
        let token = token_with(json!({
            "exp": 1_700_003_600,
            "iat": 1_700_000_000,
            "sub": "user-42",
            "scope": "reservations"
        }));
        let claims = decode(&token).unwrap();
        assert_eq!(claims.expires_at, 1_700_003_600);
        assert_eq!(claims.issued_at, Some(1_700_000_000));
        assert_eq!(claims.subject.as_deref(), Some("user-42"));
        assert_eq!(claims.extra.get("scope"), Some(&json!("reservations")));
        assert!(!claims.extra.contains_key("exp"));
    }

    #[test]
    fn decode_is_idempotent() {
        let token = token_with(json!({"exp": 1_700_003_600, "sub": "a"}));
        assert_eq!(decode(&token).unwrap(), decode(&token).unwrap());
    }

    #[test]
    fn decode_accepts_padded_payload() {
        let header = URL_SAFE_NO_PAD.encode(b"{}");
        let payload = base64::engine::general_purpose::URL_SAFE.encode(br#"{"exp":10}"#);
        let claims = decode(&format!("{header}.{payload}.")).unwrap();
        assert_eq!(claims.expires_at, 10);
    }

    #[test]
    fn decode_rejects_wrong_segment_count() {
        assert_eq!(decode("abc"), Err(DecodeError::MalformedToken));
        assert_eq!(decode("a.b"), Err(DecodeError::MalformedToken));
        assert_eq!(decode("a.b.c.d"), Err(DecodeError::MalformedToken));
        assert_eq!(decode(".b.c"), Err(DecodeError::MalformedToken));
    }

    #[test]
    fn decode_rejects_bad_encoding_and_json() {
        assert_eq!(decode("a.!!!.c"), Err(DecodeError::InvalidEncoding));
        let not_json = URL_SAFE_NO_PAD.encode(b"not json");
        assert!(matches!(
            decode(&format!("a.{not_json}.c")),
            Err(DecodeError::InvalidJson(_))
        ));
        let array = URL_SAFE_NO_PAD.encode(b"[1,2]");
        assert!(matches!(
            decode(&format!("a.{array}.c")),
            Err(DecodeError::InvalidJson(_))
        ));
    }

    #[test]
    fn decode_rejects_missing_or_non_numeric_expiry() {
        assert_eq!(
            decode(&token_with(json!({"sub": "x"}))),
            Err(DecodeError::MissingExpiry)
        );
        assert_eq!(
            decode(&token_with(json!({"exp": "tomorrow"}))),
            Err(DecodeError::InvalidExpiry)
        );
        assert_eq!(
            decode(&token_with(json!({"exp": null}))),
            Err(DecodeError::MissingExpiry)
        );
    }

    #[test]
    fn fractional_expiry_is_floored() {
        let claims = decode(&token_with(json!({"exp": 1_700_000_000.9}))).unwrap();
        assert_eq!(claims.expires_at, 1_700_000_000);
    }

    #[test]
    fn time_until_refresh_subtracts_buffer() {
        let token = token_with(json!({"exp": 1_000_000 + 3600}));
        let wait = time_until_refresh(&token, at(1_000_000), Duration::from_secs(120));
        assert_eq!(wait, Duration::from_secs(3480));
    }

    #[test]
    fn time_until_refresh_is_zero_inside_buffer() {
        let token = token_with(json!({"exp": 1_000_060}));
        let wait = time_until_refresh(&token, at(1_000_000), Duration::from_secs(120));
        assert_eq!(wait, Duration::ZERO);
    }

    #[test]
    fn expired_token_reports_expired_and_zero_wait() {
        let token = token_with(json!({"exp": 1_000_000}));
        for now in [1_000_000, 1_000_001, 2_000_000] {
            assert_eq!(is_expired(&token, at(now)), Ok(true));
            assert_eq!(
                time_until_refresh(&token, at(now), Duration::from_secs(120)),
                Duration::ZERO
            );
        }
        assert_eq!(
            time_until_expiry(&token, at(1_000_010)).unwrap(),
            TimeDelta::seconds(-10)
        );
    }

    #[test]
    fn refresh_wait_matches_formula_across_offsets() {
        let expiry = 5_000_000;
        let token = token_with(json!({"exp": expiry}));
        let buffer = Duration::from_secs(120);
        for offset in [1_i64, 60, 119, 120, 121, 600, 86_400] {
            let now = at(expiry - offset);
            let expected = Duration::from_secs((offset - 120).max(0) as u64);
            assert_eq!(time_until_refresh(&token, now, buffer), expected, "offset {offset}");
            assert_eq!(is_expired(&token, now), Ok(false));
        }
    }

    #[test]
    fn undecodable_token_is_due_immediately() {
        assert_eq!(
            time_until_refresh("garbage", Utc::now(), Duration::from_secs(120)),
            Duration::ZERO
        );
        assert!(is_expired("garbage", Utc::now()).is_err());
    }
}

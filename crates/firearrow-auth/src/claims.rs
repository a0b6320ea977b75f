//! Unverified decoding of compact JWT headers and claim sets.
//!
//! The verification pipeline needs to read the declared algorithm and the
//! time claims before any cryptographic work happens, so decoding here makes
//! no validity guarantees. Callers must treat the output as untrusted until
//! the signature has been checked.

use std::collections::HashMap;

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// The raw JOSE header of a compact token.
///
/// `alg` is kept as a string so that unknown values (including `"none"`) can
/// be rejected with a precise reason instead of a parse failure.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenHeader {
    /// Declared signing algorithm.
    pub alg: String,

    /// Key ID hint for key set lookup.
    #[serde(default)]
    pub kid: Option<String>,
}

/// The claim set of a compact token, decoded without verification.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenClaims {
    /// Issuer identifier.
    #[serde(default)]
    pub iss: Option<String>,

    /// Subject identifier.
    #[serde(default)]
    pub sub: Option<String>,

    /// Audience (string or array on the wire).
    #[serde(default, deserialize_with = "deserialize_audience")]
    pub aud: Option<Vec<String>>,

    /// Expiration time (Unix timestamp).
    #[serde(default)]
    pub exp: Option<i64>,

    /// Not-before time (Unix timestamp).
    #[serde(default)]
    pub nbf: Option<i64>,

    /// Issued-at time (Unix timestamp).
    #[serde(default)]
    pub iat: Option<i64>,

    /// All other claims.
    #[serde(flatten)]
    pub extra: HashMap<String, serde_json::Value>,
}

impl TokenClaims {
    /// Looks up a claim by name across the fixed fields and `extra`.
    #[must_use]
    pub fn claim(&self, name: &str) -> Option<serde_json::Value> {
        match name {
            "iss" => self.iss.clone().map(serde_json::Value::String),
            "sub" => self.sub.clone().map(serde_json::Value::String),
            "aud" => self.aud.clone().map(|a| serde_json::json!(a)),
            "exp" => self.exp.map(|v| serde_json::json!(v)),
            "nbf" => self.nbf.map(|v| serde_json::json!(v)),
            "iat" => self.iat.map(|v| serde_json::json!(v)),
            _ => self.extra.get(name).cloned(),
        }
    }

    /// Returns the expiration time as an [`OffsetDateTime`], if present.
    #[must_use]
    pub fn expires_at(&self) -> Option<OffsetDateTime> {
        self.exp.and_then(|s| OffsetDateTime::from_unix_timestamp(s).ok())
    }

    /// Returns the issued-at time as an [`OffsetDateTime`], if present.
    #[must_use]
    pub fn issued_at(&self) -> Option<OffsetDateTime> {
        self.iat.and_then(|s| OffsetDateTime::from_unix_timestamp(s).ok())
    }

    /// Returns `true` if `exp` is present and in the past, allowing `leeway`
    /// seconds of clock skew.
    #[must_use]
    pub fn is_expired(&self, leeway: i64) -> bool {
        match self.exp {
            // Saturating: timestamps are attacker-controlled and may sit at
            // the extremes of the i64 range.
            Some(exp) => exp.saturating_add(leeway) < OffsetDateTime::now_utc().unix_timestamp(),
            None => false,
        }
    }

    /// Returns `true` if `nbf` is present and in the future, allowing
    /// `leeway` seconds of clock skew.
    #[must_use]
    pub fn is_premature(&self, leeway: i64) -> bool {
        match self.nbf {
            Some(nbf) => nbf.saturating_sub(leeway) > OffsetDateTime::now_utc().unix_timestamp(),
            None => false,
        }
    }

    /// Returns `true` if the token is currently within its time window.
    #[must_use]
    pub fn is_current(&self, leeway: i64) -> bool {
        !self.is_expired(leeway) && !self.is_premature(leeway)
    }
}

/// Error returned when a compact token cannot be structurally decoded.
#[derive(Debug, thiserror::Error)]
#[error("Malformed token: {0}")]
pub struct MalformedTokenError(&'static str);

/// Decodes the header segment of a compact token without verification.
pub fn decode_header_unverified(raw: &str) -> Result<TokenHeader, MalformedTokenError> {
    let segment = split_compact(raw)?.0;
    decode_segment(segment)
}

/// Decodes the claims segment of a compact token without verification.
pub fn decode_claims_unverified(raw: &str) -> Result<TokenClaims, MalformedTokenError> {
    let segment = split_compact(raw)?.1;
    decode_segment(segment)
}

/// Splits a compact token into (header, payload) segments.
fn split_compact(raw: &str) -> Result<(&str, &str), MalformedTokenError> {
    let mut parts = raw.split('.');
    let header = parts.next().ok_or(MalformedTokenError("missing header"))?;
    let payload = parts.next().ok_or(MalformedTokenError("missing payload"))?;
    let _signature = parts
        .next()
        .ok_or(MalformedTokenError("missing signature"))?;
    if parts.next().is_some() {
        return Err(MalformedTokenError("too many segments"));
    }
    if header.is_empty() || payload.is_empty() {
        return Err(MalformedTokenError("empty segment"));
    }
    Ok((header, payload))
}

fn decode_segment<T: serde::de::DeserializeOwned>(
    segment: &str,
) -> Result<T, MalformedTokenError> {
    let bytes = URL_SAFE_NO_PAD
        .decode(segment)
        .map_err(|_| MalformedTokenError("invalid base64url"))?;
    serde_json::from_slice(&bytes).map_err(|_| MalformedTokenError("invalid JSON"))
}

/// Deserializer for `aud`, which may be a single string or an array.
fn deserialize_audience<'de, D>(deserializer: D) -> Result<Option<Vec<String>>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany {
        One(String),
        Many(Vec<String>),
    }

    match Option::<OneOrMany>::deserialize(deserializer)? {
        Some(OneOrMany::One(s)) => Ok(Some(vec![s])),
        Some(OneOrMany::Many(v)) => Ok(Some(v)),
        None => Ok(None),
    }
}

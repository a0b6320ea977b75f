//! Identity extraction from verified claims.
//!
//! Extraction is configuration-driven through [`ClaimMapping`]: each logical
//! identity field names the claim it comes from. Only the user id is
//! required; every other field degrades to absent when its claim is missing
//! or has an unusable shape. Nothing here re-validates the token — callers
//! must hand over claims that already passed verification.

use std::collections::HashSet;

use serde_json::Value;

use crate::claims::TokenClaims;
use crate::identity::Identity;
use crate::provider::ClaimMapping;

/// Extracts [`Identity`] values from verified claim sets.
pub struct ClaimExtractor {
    default_mapping: ClaimMapping,
}

impl ClaimExtractor {
    /// Creates an extractor with the given default mapping.
    #[must_use]
    pub fn new(default_mapping: ClaimMapping) -> Self {
        Self { default_mapping }
    }

    /// Extracts an identity from `claims`.
    ///
    /// When `mapping` is given it replaces the default mapping entirely.
    /// Returns `None` when the user-id claim is absent or empty; an identity
    /// without a stable subject is not usable downstream.
    #[must_use]
    pub fn extract(&self, claims: &TokenClaims, mapping: Option<&ClaimMapping>) -> Option<Identity> {
        let mapping = mapping.unwrap_or(&self.default_mapping);

        let user_id = string_claim(claims, &mapping.user_id).filter(|s| !s.is_empty())?;

        let identity = Identity {
            user_id,
            roles: normalize_roles(claims.claim(&mapping.roles)),
            resource_type: string_claim(claims, &mapping.resource_type),
            fhir_id: string_claim(claims, &mapping.fhir_id),
            email: string_claim(claims, &mapping.email),
            name: string_claim(claims, &mapping.name),
            issuer: claims.iss.clone(),
            audience: claims.aud.clone(),
            issued_at: claims.issued_at(),
            expires_at: claims.expires_at(),
        };

        tracing::trace!(
            user_id = %identity.user_id,
            roles = identity.roles.len(),
            "Extracted identity"
        );
        Some(identity)
    }
}

/// Reads a claim as a string, coercing scalars; `null` and absent are `None`.
fn string_claim(claims: &TokenClaims, name: &str) -> Option<String> {
    match claims.claim(name)? {
        Value::String(s) => Some(s),
        Value::Null => None,
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        // Arrays and objects have no sensible scalar reading.
        _ => None,
    }
}

/// Normalizes a roles claim into a trimmed, deduplicated set.
///
/// Accepts an array of values, a comma-separated string, or a single scalar.
/// `["a","b"]`, `"a,b"`, and `"a, b"` all normalize to the same set.
fn normalize_roles(value: Option<Value>) -> HashSet<String> {
    let mut roles = HashSet::new();
    match value {
        Some(Value::Array(items)) => {
            for item in items {
                match item {
                    Value::String(s) => insert_trimmed(&mut roles, &s),
                    Value::Null => {}
                    other => insert_trimmed(&mut roles, &scalar_to_string(&other)),
                }
            }
        }
        Some(Value::String(s)) => {
            for part in s.split(',') {
                insert_trimmed(&mut roles, part);
            }
        }
        Some(Value::Null) | None => {}
        Some(other) => insert_trimmed(&mut roles, &scalar_to_string(&other)),
    }
    roles
}

fn scalar_to_string(value: &Value) -> String {
    match value {
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        other => other.to_string(),
    }
}

fn insert_trimmed(roles: &mut HashSet<String>, raw: &str) {
    let trimmed = raw.trim();
    if !trimmed.is_empty() {
        roles.insert(trimmed.to_string());
    }
}

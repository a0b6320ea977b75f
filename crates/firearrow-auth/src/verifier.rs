//! Bearer token verification pipeline.
//!
//! [`TokenVerifier::verify`] runs a straight-line pipeline over a compact
//! token: structure, algorithm allow-list, time window, signature, audience,
//! issuer. Each stage short-circuits into a terminal [`ValidationResult`]
//! with a precise reason; no stage is re-entered.
//!
//! The algorithm allow-list is fixed to the RSA family (RS256/RS384/RS512).
//! Rejecting everything else up front blocks the `alg: none` and
//! HMAC-confusion attack classes no matter what the header declares.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use jsonwebtoken::{Algorithm, DecodingKey, Validation};

use crate::claims::{self, TokenClaims};
use crate::error::ValidationReason;
use crate::jwks::{KeySetCache, select_keys};
use crate::provider::TrustContext;

/// Outcome of validating one token: exactly one of valid or invalid.
#[derive(Debug, Clone)]
pub enum ValidationResult {
    /// The token verified against a provider.
    Valid {
        /// Name of the provider that accepted the token.
        provider: String,
        /// The verified claim set (Arc for cheap cloning through the cache).
        claims: Arc<TokenClaims>,
    },
    /// The token failed validation.
    Invalid {
        /// The failure reason code.
        reason: ValidationReason,
        /// Sanitized human-readable detail; never echoes token material.
        message: String,
    },
}

impl ValidationResult {
    /// Creates a valid result tagged with the accepting provider.
    #[must_use]
    pub fn valid(provider: impl Into<String>, claims: Arc<TokenClaims>) -> Self {
        Self::Valid {
            provider: provider.into(),
            claims,
        }
    }

    /// Creates an invalid result.
    #[must_use]
    pub fn invalid(reason: ValidationReason, message: impl Into<String>) -> Self {
        Self::Invalid {
            reason,
            message: message.into(),
        }
    }

    /// Returns `true` if the token verified.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        matches!(self, Self::Valid { .. })
    }

    /// Returns the verified claims, if valid.
    #[must_use]
    pub fn claims(&self) -> Option<&Arc<TokenClaims>> {
        match self {
            Self::Valid { claims, .. } => Some(claims),
            Self::Invalid { .. } => None,
        }
    }

    /// Returns the accepting provider's name, if valid.
    #[must_use]
    pub fn provider(&self) -> Option<&str> {
        match self {
            Self::Valid { provider, .. } => Some(provider),
            Self::Invalid { .. } => None,
        }
    }

    /// Returns the failure reason, if invalid.
    #[must_use]
    pub fn reason(&self) -> Option<ValidationReason> {
        match self {
            Self::Valid { .. } => None,
            Self::Invalid { reason, .. } => Some(*reason),
        }
    }
}

/// Verifies compact tokens against a trust context.
pub struct TokenVerifier {
    keys: Arc<KeySetCache>,
    clock_skew: Duration,
}

impl TokenVerifier {
    /// Creates a verifier backed by the shared key set cache.
    #[must_use]
    pub fn new(keys: Arc<KeySetCache>, clock_skew: Duration) -> Self {
        Self { keys, clock_skew }
    }

    /// Verifies a compact token against one provider's trust context.
    ///
    /// The pipeline short-circuits on the first failing stage; see the
    /// module docs for the stage order.
    pub async fn verify(&self, raw: &str, ctx: &TrustContext) -> ValidationResult {
        // Stage 1: structure
        let header = match claims::decode_header_unverified(raw) {
            Ok(h) => h,
            Err(_) => {
                return ValidationResult::invalid(
                    ValidationReason::MalformedToken,
                    "Token is not a well-formed compact JWT",
                );
            }
        };
        let token_claims = match claims::decode_claims_unverified(raw) {
            Ok(c) => c,
            Err(_) => {
                return ValidationResult::invalid(
                    ValidationReason::MalformedToken,
                    "Token claims could not be decoded",
                );
            }
        };

        // Stage 2: algorithm allow-list
        let Some(alg) = allowed_algorithm(&header.alg) else {
            return ValidationResult::invalid(
                ValidationReason::UnsupportedAlgorithm,
                format!("Unsupported algorithm: {}", header.alg),
            );
        };

        // Stage 3: time window
        let leeway = self.clock_skew.as_secs() as i64;
        if token_claims.is_expired(leeway) {
            return ValidationResult::invalid(ValidationReason::ExpiredToken, "Token has expired");
        }
        if token_claims.is_premature(leeway) {
            return ValidationResult::invalid(
                ValidationReason::NotYetValid,
                "Token is not yet valid",
            );
        }

        // Stage 4: signature
        let jwks = match self.keys.keys(&ctx.jwks_uri).await {
            Ok(jwks) => jwks,
            Err(e) => {
                tracing::warn!(
                    provider = %ctx.provider,
                    "Key set retrieval failed: {}", e
                );
                return ValidationResult::invalid(
                    ValidationReason::KeyFetchFailure,
                    "Unable to retrieve verification keys",
                );
            }
        };

        let candidates = select_keys(&jwks, header.kid.as_deref());
        if !verify_signature(raw, alg, &candidates) {
            return ValidationResult::invalid(
                ValidationReason::SignatureInvalid,
                "Token signature could not be verified",
            );
        }

        // Stage 5: audience
        if let Some(expected) = &ctx.expected_audience {
            let matched = token_claims
                .aud
                .as_ref()
                .is_some_and(|auds| auds.iter().any(|a| a == expected));
            if !matched {
                return ValidationResult::invalid(
                    ValidationReason::AudienceMismatch,
                    "Token audience does not match this provider",
                );
            }
        }

        // Stage 6: issuer (mandatory claim)
        let issuer = match token_claims.iss.as_deref() {
            Some(iss) if !iss.is_empty() => iss,
            _ => {
                return ValidationResult::invalid(
                    ValidationReason::MissingRequiredClaim,
                    "Token has no issuer claim",
                );
            }
        };
        if let Some(expected) = &ctx.expected_issuer
            && issuer != expected
        {
            return ValidationResult::invalid(
                ValidationReason::IssuerMismatch,
                "Token issuer does not match this provider",
            );
        }

        tracing::debug!(provider = %ctx.provider, "Token verified");
        ValidationResult::valid(ctx.provider.clone(), Arc::new(token_claims))
    }
}

/// Maps a declared algorithm name onto the allow-list.
fn allowed_algorithm(alg: &str) -> Option<Algorithm> {
    match alg {
        "RS256" => Some(Algorithm::RS256),
        "RS384" => Some(Algorithm::RS384),
        "RS512" => Some(Algorithm::RS512),
        _ => None,
    }
}

/// Checks the token's signature against the candidate keys.
///
/// The header algorithm is authoritative; candidates whose JWK declares a
/// different algorithm are skipped. All other claim validation is disabled
/// here — the pipeline stages own those checks.
fn verify_signature(raw: &str, alg: Algorithm, candidates: &[(DecodingKey, Option<Algorithm>)]) -> bool {
    let mut validation = Validation::new(alg);
    validation.validate_exp = false;
    validation.validate_nbf = false;
    validation.validate_aud = false;
    validation.required_spec_claims = HashSet::new();

    candidates
        .iter()
        .filter(|(_, key_alg)| key_alg.is_none() || *key_alg == Some(alg))
        .any(|(key, _)| jsonwebtoken::decode::<serde_json::Value>(raw, key, &validation).is_ok())
}

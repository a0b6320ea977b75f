//! Validation and configuration error types.
//!
//! Per-request validation failures are result-carried (see
//! [`ValidationReason`] and `ValidationResult`); configuration problems are
//! hard failures reported at startup via [`ConfigError`].

use std::fmt;

/// Reason codes for token validation failures.
///
/// Each reason maps to a stable wire code suitable for rendering an HTTP 401
/// response. Messages attached to a failure are sanitized and never contain
/// the raw token or signature bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValidationReason {
    /// The token is not a well-formed compact JWT.
    MalformedToken,
    /// The header algorithm is not in the allow-list (includes "none").
    UnsupportedAlgorithm,
    /// The `exp` claim is in the past.
    ExpiredToken,
    /// The `nbf` claim is in the future.
    NotYetValid,
    /// No key in the resolved key set verified the signature.
    SignatureInvalid,
    /// The `aud` claim does not contain the expected audience.
    AudienceMismatch,
    /// The `iss` claim does not match the expected issuer.
    IssuerMismatch,
    /// A claim the provider requires (e.g. `iss`) is absent or empty.
    MissingRequiredClaim,
    /// The key set could not be fetched from the JWKS endpoint.
    KeyFetchFailure,
    /// No providers are configured or enabled.
    NoProvidersAvailable,
    /// The named provider does not exist or is disabled.
    UnknownOrDisabledProvider,
}

impl ValidationReason {
    /// Returns the stable wire code for this reason.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::MalformedToken => "malformed_token",
            Self::UnsupportedAlgorithm => "unsupported_algorithm",
            Self::ExpiredToken => "expired_token",
            Self::NotYetValid => "not_yet_valid",
            Self::SignatureInvalid => "signature_invalid",
            Self::AudienceMismatch => "audience_mismatch",
            Self::IssuerMismatch => "issuer_mismatch",
            Self::MissingRequiredClaim => "missing_required_claim",
            Self::KeyFetchFailure => "key_fetch_failure",
            Self::NoProvidersAvailable => "no_providers_available",
            Self::UnknownOrDisabledProvider => "unknown_or_disabled_provider",
        }
    }

    /// Returns the HTTP status code the caller should render.
    ///
    /// All authentication failures map to 401; authorization denials are a
    /// separate type (`AuthorizationDecision`) and map to 403.
    #[must_use]
    pub fn http_status(&self) -> u16 {
        401
    }
}

impl fmt::Display for ValidationReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// Errors raised while validating the auth configuration at startup.
///
/// These are distinct from the per-request taxonomy above: a provider with an
/// unsupported kind or missing required fields fails fast before the server
/// accepts traffic.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Two providers share the same name.
    #[error("Duplicate provider name: {0}")]
    DuplicateProvider(String),

    /// A provider is missing a field required for its kind.
    #[error("Provider '{provider}' is missing required field: {field}")]
    MissingField {
        /// The provider name.
        provider: String,
        /// The missing field.
        field: String,
    },

    /// A configured value is invalid.
    #[error("Invalid value for {field}: {message}")]
    InvalidValue {
        /// The offending field.
        field: String,
        /// Description of the problem.
        message: String,
    },

    /// A configured URL could not be parsed.
    #[error("Provider '{provider}' has an invalid URL: {message}")]
    InvalidUrl {
        /// The provider name.
        provider: String,
        /// Description of the problem.
        message: String,
    },
}

impl ConfigError {
    /// Creates a new `MissingField` error.
    #[must_use]
    pub fn missing_field(provider: impl Into<String>, field: impl Into<String>) -> Self {
        Self::MissingField {
            provider: provider.into(),
            field: field.into(),
        }
    }

    /// Creates a new `InvalidValue` error.
    #[must_use]
    pub fn invalid_value(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidValue {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Creates a new `InvalidUrl` error.
    #[must_use]
    pub fn invalid_url(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidUrl {
            provider: provider.into(),
            message: message.into(),
        }
    }
}

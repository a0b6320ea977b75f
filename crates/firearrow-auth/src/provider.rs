//! Trust provider configuration.
//!
//! A provider is one configured trust domain — a standard OIDC issuer or an
//! Azure AD tenant — against which bearer tokens are verified. Each provider
//! resolves to a [`TrustContext`] carrying the concrete key-source URI and
//! the issuer/audience expectations the verifier enforces.

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::ConfigError;

/// Claim-name mapping used to extract an identity from verified claims.
///
/// Defaults follow the common OIDC names. A provider-specific mapping, when
/// present, fully overrides the default — the two are never merged.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClaimMapping {
    /// Claim holding the user identifier (required for extraction).
    pub user_id: String,

    /// Claim holding the user's roles (string, comma-separated string, or
    /// array).
    pub roles: String,

    /// Claim holding the FHIR actor resource type (e.g. "Practitioner").
    pub resource_type: String,

    /// Claim holding the FHIR resource reference (e.g. "Patient/42").
    pub fhir_id: String,

    /// Claim holding the user's email address.
    pub email: String,

    /// Claim holding the user's display name.
    pub name: String,
}

impl Default for ClaimMapping {
    fn default() -> Self {
        Self {
            user_id: "sub".to_string(),
            roles: "roles".to_string(),
            resource_type: "resource_type".to_string(),
            fhir_id: "fhir_id".to_string(),
            email: "email".to_string(),
            name: "name".to_string(),
        }
    }
}

/// Kind-specific trust parameters for a provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProviderKind {
    /// A standard OIDC provider identified by a JWKS or discovery URL.
    Standard {
        /// Direct JWKS endpoint. Takes precedence over `discovery_url`.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        jwks_uri: Option<Url>,

        /// OIDC discovery document URL; the JWKS URI is derived from it.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        discovery_url: Option<Url>,

        /// Expected `iss` value, if the provider pins one.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        issuer: Option<String>,

        /// Expected audience, if the provider pins one.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        audience: Option<String>,
    },

    /// An Azure AD tenant.
    AzureAd {
        /// The AAD instance base, e.g. "https://login.microsoftonline.com/".
        instance: String,

        /// The tenant identifier.
        tenant_id: String,

        /// The application (client) id; doubles as the expected audience.
        application_id: String,
    },
}

/// One configured trust domain.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Unique provider name.
    pub name: String,

    /// Whether this provider participates in validation.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Kind-specific trust parameters.
    #[serde(flatten)]
    pub kind: ProviderKind,

    /// Provider-specific claim mapping; overrides the default entirely.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub claim_mapping: Option<ClaimMapping>,
}

fn default_true() -> bool {
    true
}

impl ProviderConfig {
    /// Creates a new enabled provider with the given kind.
    #[must_use]
    pub fn new(name: impl Into<String>, kind: ProviderKind) -> Self {
        Self {
            name: name.into(),
            enabled: true,
            kind,
            claim_mapping: None,
        }
    }

    /// Sets whether the provider is enabled.
    #[must_use]
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Sets a provider-specific claim mapping.
    #[must_use]
    pub fn with_claim_mapping(mut self, mapping: ClaimMapping) -> Self {
        self.claim_mapping = Some(mapping);
        self
    }

    /// Resolves the trust context for this provider.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] when the kind is missing required fields or
    /// a derived URL cannot be parsed. Resolution happens eagerly at startup
    /// so these surface as setup-time failures.
    pub fn trust_context(&self) -> Result<TrustContext, ConfigError> {
        match &self.kind {
            ProviderKind::Standard {
                jwks_uri,
                discovery_url,
                issuer,
                audience,
            } => {
                let jwks_uri = match (jwks_uri, discovery_url) {
                    (Some(uri), _) => uri.clone(),
                    (None, Some(discovery)) => derive_jwks_uri(discovery)
                        .map_err(|e| ConfigError::invalid_url(&self.name, e))?,
                    (None, None) => {
                        return Err(ConfigError::missing_field(
                            &self.name,
                            "jwks_uri or discovery_url",
                        ));
                    }
                };

                Ok(TrustContext {
                    provider: self.name.clone(),
                    jwks_uri,
                    expected_issuer: issuer.clone(),
                    expected_audience: audience.clone(),
                })
            }
            ProviderKind::AzureAd {
                instance,
                tenant_id,
                application_id,
            } => {
                if instance.is_empty() {
                    return Err(ConfigError::missing_field(&self.name, "instance"));
                }
                if tenant_id.is_empty() {
                    return Err(ConfigError::missing_field(&self.name, "tenant_id"));
                }
                if application_id.is_empty() {
                    return Err(ConfigError::missing_field(&self.name, "application_id"));
                }

                let base = if instance.ends_with('/') {
                    format!("{instance}{tenant_id}")
                } else {
                    format!("{instance}/{tenant_id}")
                };

                let jwks_uri = Url::parse(&format!("{base}/discovery/v2.0/keys"))
                    .map_err(|e| ConfigError::invalid_url(&self.name, e.to_string()))?;

                Ok(TrustContext {
                    provider: self.name.clone(),
                    jwks_uri,
                    expected_issuer: Some(format!("{base}/v2.0")),
                    expected_audience: Some(application_id.clone()),
                })
            }
        }
    }
}

/// Resolved verification expectations for one provider.
///
/// Immutable after construction; shared by reference with the verifier.
#[derive(Debug, Clone)]
pub struct TrustContext {
    /// The owning provider's name, used to tag validation results.
    pub provider: String,

    /// Where this provider publishes its verification keys.
    pub jwks_uri: Url,

    /// Expected `iss` value; `None` means any non-empty issuer is accepted.
    pub expected_issuer: Option<String>,

    /// Expected audience; `None` disables the audience check.
    pub expected_audience: Option<String>,
}

/// Derives the JWKS URI from an OIDC discovery URL.
///
/// The full discovery flow (fetching and parsing the metadata document) is
/// not performed; the well-known path is swapped for the conventional JWKS
/// location instead.
fn derive_jwks_uri(discovery: &Url) -> Result<Url, String> {
    let s = discovery.as_str();

    let base = s
        .strip_suffix("/.well-known/openid-configuration")
        .or_else(|| s.strip_suffix("/.well-known/openid_configuration"))
        .ok_or_else(|| "discovery_url must end with /.well-known/openid-configuration".to_string())?;

    Url::parse(&format!("{base}/.well-known/jwks.json")).map_err(|e| e.to_string())
}

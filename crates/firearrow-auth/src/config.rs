//! Authentication configuration.
//!
//! The surrounding server owns file/environment binding; this module defines
//! the already-deserialized shape it hands over at startup and the
//! validation that turns misconfiguration into a hard setup-time failure.
//!
//! # Example (TOML)
//!
//! ```toml
//! [auth]
//! enabled = true
//! required = true
//! key_cache_ttl = "30m"
//! validation_cache_ttl = "5m"
//!
//! [[auth.providers]]
//! name = "azure"
//! type = "azure_ad"
//! instance = "https://login.microsoftonline.com/"
//! tenant_id = "..."
//! application_id = "..."
//! ```

use std::collections::HashSet;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::jwks::HttpKeyFetcherConfig;
use crate::provider::{ClaimMapping, ProviderConfig};

/// Root authentication configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// Enable/disable token validation entirely.
    pub enabled: bool,

    /// Whether authentication is required for all requests.
    /// When false, the caller may let unauthenticated requests through.
    pub required: bool,

    /// Trust providers, tried in declaration order.
    pub providers: Vec<ProviderConfig>,

    /// Default claim mapping, used by providers without their own.
    pub default_claim_mapping: ClaimMapping,

    /// TTL for cached verification key sets.
    #[serde(with = "humantime_serde")]
    pub key_cache_ttl: Duration,

    /// TTL for cached validation verdicts.
    #[serde(with = "humantime_serde")]
    pub validation_cache_ttl: Duration,

    /// Interval between expired-entry sweeps.
    #[serde(with = "humantime_serde")]
    pub sweep_interval: Duration,

    /// Timeout for JWKS fetches.
    #[serde(with = "humantime_serde")]
    pub fetch_timeout: Duration,

    /// Clock skew tolerance applied to `exp`/`nbf` checks.
    #[serde(with = "humantime_serde")]
    pub clock_skew: Duration,

    /// Whether to allow HTTP (non-HTTPS) JWKS endpoints.
    /// This should only be enabled for testing.
    pub allow_http: bool,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            required: true,
            providers: Vec::new(),
            default_claim_mapping: ClaimMapping::default(),
            key_cache_ttl: Duration::from_secs(30 * 60),
            validation_cache_ttl: Duration::from_secs(5 * 60),
            sweep_interval: Duration::from_secs(60),
            fetch_timeout: Duration::from_secs(10),
            clock_skew: Duration::ZERO,
            allow_http: false,
        }
    }
}

impl AuthConfig {
    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns the first problem found: duplicate provider names, providers
    /// missing fields required by their kind, or zero TTLs.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut names = HashSet::new();
        for provider in &self.providers {
            if !names.insert(provider.name.as_str()) {
                return Err(ConfigError::DuplicateProvider(provider.name.clone()));
            }
            // Trust context resolution performs the kind-specific checks.
            provider.trust_context()?;
        }

        if self.key_cache_ttl.is_zero() {
            return Err(ConfigError::invalid_value(
                "key_cache_ttl",
                "must be greater than zero",
            ));
        }
        if self.validation_cache_ttl.is_zero() {
            return Err(ConfigError::invalid_value(
                "validation_cache_ttl",
                "must be greater than zero",
            ));
        }
        if self.sweep_interval.is_zero() {
            return Err(ConfigError::invalid_value(
                "sweep_interval",
                "must be greater than zero",
            ));
        }

        Ok(())
    }

    /// Returns the fetcher settings derived from this configuration.
    #[must_use]
    pub fn fetcher_config(&self) -> HttpKeyFetcherConfig {
        HttpKeyFetcherConfig {
            request_timeout: self.fetch_timeout,
            allow_http: self.allow_http,
            ..HttpKeyFetcherConfig::default()
        }
    }

    /// Returns the effective claim mapping for the named provider.
    #[must_use]
    pub fn claim_mapping_for(&self, provider_name: &str) -> &ClaimMapping {
        self.providers
            .iter()
            .find(|p| p.name == provider_name)
            .and_then(|p| p.claim_mapping.as_ref())
            .unwrap_or(&self.default_claim_mapping)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::ProviderKind;
    use url::Url;

    fn standard_provider(name: &str) -> ProviderConfig {
        ProviderConfig::new(
            name,
            ProviderKind::Standard {
                jwks_uri: Some(Url::parse("https://auth.example.com/jwks").unwrap()),
                discovery_url: None,
                issuer: None,
                audience: None,
            },
        )
    }

    #[test]
    fn test_defaults() {
        let config = AuthConfig::default();
        assert!(config.enabled);
        assert!(config.required);
        assert!(config.providers.is_empty());
        assert_eq!(config.key_cache_ttl, Duration::from_secs(1800));
        assert_eq!(config.validation_cache_ttl, Duration::from_secs(300));
        assert_eq!(config.clock_skew, Duration::ZERO);
        assert!(!config.allow_http);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_duplicate_provider_names_rejected() {
        let config = AuthConfig {
            providers: vec![standard_provider("a"), standard_provider("a")],
            ..AuthConfig::default()
        };

        assert!(matches!(
            config.validate(),
            Err(ConfigError::DuplicateProvider(_))
        ));
    }

    #[test]
    fn test_invalid_provider_fails_validation() {
        let config = AuthConfig {
            providers: vec![ProviderConfig::new(
                "broken",
                ProviderKind::AzureAd {
                    instance: String::new(),
                    tenant_id: "t".to_string(),
                    application_id: "a".to_string(),
                },
            )],
            ..AuthConfig::default()
        };

        assert!(config.validate().is_err());
    }

    #[test]
    fn test_zero_ttl_rejected() {
        let config = AuthConfig {
            validation_cache_ttl: Duration::ZERO,
            ..AuthConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_claim_mapping_resolution() {
        let custom = ClaimMapping {
            user_id: "oid".to_string(),
            ..ClaimMapping::default()
        };
        let config = AuthConfig {
            providers: vec![
                standard_provider("plain"),
                standard_provider("custom").with_claim_mapping(custom),
            ],
            ..AuthConfig::default()
        };

        assert_eq!(config.claim_mapping_for("plain").user_id, "sub");
        assert_eq!(config.claim_mapping_for("custom").user_id, "oid");
        // Unknown providers fall back to the default mapping.
        assert_eq!(config.claim_mapping_for("missing").user_id, "sub");
    }

    #[test]
    fn test_fetcher_config_derivation() {
        let config = AuthConfig {
            fetch_timeout: Duration::from_secs(3),
            allow_http: true,
            ..AuthConfig::default()
        };

        let fetcher = config.fetcher_config();
        assert_eq!(fetcher.request_timeout, Duration::from_secs(3));
        assert!(fetcher.allow_http);
    }

    #[test]
    fn test_humantime_durations_deserialize() {
        let json = serde_json::json!({
            "key_cache_ttl": "45m",
            "validation_cache_ttl": "90s"
        });

        let config: AuthConfig = serde_json::from_value(json).unwrap();
        assert_eq!(config.key_cache_ttl, Duration::from_secs(45 * 60));
        assert_eq!(config.validation_cache_ttl, Duration::from_secs(90));
    }
}

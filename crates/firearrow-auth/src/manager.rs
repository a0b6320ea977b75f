//! Multi-provider token validation.
//!
//! [`ProviderManager`] owns the configured trust providers and the two
//! caches, and runs validation end to end: verdict cache lookup, then a
//! cycle through the enabled providers in declaration order. The first
//! provider that accepts the token wins; when every provider rejects it,
//! the failure reported is the LAST one seen, so the caller learns how far
//! the most recent attempt got rather than seeing the first provider's
//! (often structural) complaint repeated forever.

use std::sync::Arc;
use std::time::Duration;

use crate::cache::{SweeperHandle, ValidationCache};
use crate::config::AuthConfig;
use crate::error::{ConfigError, ValidationReason};
use crate::extractor::ClaimExtractor;
use crate::identity::Identity;
use crate::jwks::{KeyFetcher, KeySetCache};
use crate::provider::{ClaimMapping, ProviderConfig, TrustContext};
use crate::verifier::{TokenVerifier, ValidationResult};

struct ProviderEntry {
    config: ProviderConfig,
    trust: TrustContext,
}

/// Validates bearer tokens against an ordered set of trust providers.
pub struct ProviderManager {
    providers: Vec<ProviderEntry>,
    verifier: TokenVerifier,
    verdicts: Arc<ValidationCache>,
    keys: Arc<KeySetCache>,
    extractor: ClaimExtractor,
    required: bool,
}

impl ProviderManager {
    /// Builds a manager from validated configuration.
    ///
    /// Trust contexts are resolved eagerly for every provider, including
    /// disabled ones, so misconfiguration surfaces at startup rather than on
    /// the first request.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] when the configuration fails validation.
    pub fn from_config(
        config: &AuthConfig,
        fetcher: Arc<dyn KeyFetcher>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;

        let mut providers = Vec::with_capacity(config.providers.len());
        for provider in &config.providers {
            let trust = provider.trust_context()?;
            providers.push(ProviderEntry {
                config: provider.clone(),
                trust,
            });
        }

        let keys = Arc::new(KeySetCache::new(fetcher, config.key_cache_ttl));
        let verifier = TokenVerifier::new(Arc::clone(&keys), config.clock_skew);
        let verdicts = Arc::new(ValidationCache::new(
            config.validation_cache_ttl,
            config.clock_skew,
        ));

        tracing::info!(
            providers = providers.len(),
            enabled = providers.iter().filter(|p| p.config.enabled).count(),
            "Configured trust providers"
        );

        Ok(Self {
            providers,
            verifier,
            verdicts,
            keys,
            extractor: ClaimExtractor::new(config.default_claim_mapping.clone()),
            required: config.required,
        })
    }

    /// Whether unauthenticated requests must be rejected.
    #[must_use]
    pub fn is_authentication_required(&self) -> bool {
        self.required
    }

    /// Names of the enabled providers, in cycling order.
    #[must_use]
    pub fn enabled_providers(&self) -> Vec<&str> {
        self.providers
            .iter()
            .filter(|p| p.config.enabled)
            .map(|p| p.config.name.as_str())
            .collect()
    }

    /// Validates a token against all enabled providers.
    ///
    /// Providers are tried in declaration order; the first acceptance wins
    /// and is cached. When all providers reject the token, the last failure
    /// is returned.
    pub async fn validate(&self, raw: &str) -> ValidationResult {
        let enabled: Vec<&ProviderEntry> = self
            .providers
            .iter()
            .filter(|p| p.config.enabled)
            .collect();

        if enabled.is_empty() {
            return ValidationResult::invalid(
                ValidationReason::NoProvidersAvailable,
                "No trust providers are enabled",
            );
        }

        for entry in &enabled {
            if let Some(hit) = self.verdicts.get(&entry.config.name, raw).await {
                return hit;
            }
        }

        let mut last_failure = None;
        for entry in &enabled {
            let result = self.verifier.verify(raw, &entry.trust).await;
            if result.is_valid() {
                self.verdicts.insert(raw, &result).await;
                return result;
            }
            tracing::trace!(
                provider = %entry.config.name,
                reason = result.reason().map(|r| r.code()).unwrap_or("-"),
                "Provider rejected token"
            );
            last_failure = Some(result);
        }

        // `enabled` is non-empty, so at least one rejection was recorded.
        last_failure.unwrap_or_else(|| {
            ValidationResult::invalid(
                ValidationReason::NoProvidersAvailable,
                "No trust providers are enabled",
            )
        })
    }

    /// Validates a token against one named provider only.
    pub async fn validate_with(&self, provider: &str, raw: &str) -> ValidationResult {
        let Some(entry) = self
            .providers
            .iter()
            .find(|p| p.config.name == provider && p.config.enabled)
        else {
            return ValidationResult::invalid(
                ValidationReason::UnknownOrDisabledProvider,
                format!("Provider '{provider}' is unknown or disabled"),
            );
        };

        if let Some(hit) = self.verdicts.get(&entry.config.name, raw).await {
            return hit;
        }

        let result = self.verifier.verify(raw, &entry.trust).await;
        if result.is_valid() {
            self.verdicts.insert(raw, &result).await;
        }
        result
    }

    /// Extracts an identity from a valid result, using the accepting
    /// provider's claim mapping when it has one.
    #[must_use]
    pub fn identity(&self, result: &ValidationResult) -> Option<Identity> {
        let ValidationResult::Valid { provider, claims } = result else {
            return None;
        };
        self.extractor
            .extract(claims, self.claim_mapping_for(provider))
    }

    fn claim_mapping_for(&self, provider: &str) -> Option<&ClaimMapping> {
        self.providers
            .iter()
            .find(|p| p.config.name == provider)
            .and_then(|p| p.config.claim_mapping.as_ref())
    }

    /// Spawns a background task sweeping both caches at `interval`.
    ///
    /// The task stops when the returned handle is dropped.
    #[must_use]
    pub fn start_sweeper(&self, interval: Duration) -> SweeperHandle {
        let verdicts = Arc::clone(&self.verdicts);
        let keys = Arc::clone(&self.keys);

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            // First tick fires immediately; skip it.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                verdicts.cleanup().await;
                keys.cleanup().await;
            }
        });

        SweeperHandle::new(handle)
    }
}

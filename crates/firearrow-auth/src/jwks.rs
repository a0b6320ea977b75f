//! Verification key set fetching and caching.
//!
//! Signature verification needs the public keys published by each trust
//! provider. [`KeySetCache`] caches JWKS documents per endpoint URI with a
//! TTL (default 30 minutes) and fetches through an injected [`KeyFetcher`]
//! capability on miss. Fetch failures always propagate to the caller and are
//! never cached, so a transient network error does not wedge validation for
//! the full TTL.
//!
//! Cache keys are JWKS URIs rather than issuers: one issuer may front
//! multiple key endpoints.
//!
//! # Security Considerations
//!
//! - Only HTTPS URIs are allowed for JWKS endpoints (configurable for testing)
//! - HTTP timeouts prevent hanging on slow endpoints
//! - Response size is limited to prevent DoS attacks

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use jsonwebtoken::jwk::{Jwk, JwkSet, PublicKeyUse};
use jsonwebtoken::{Algorithm, DecodingKey};
use tokio::sync::RwLock;
use url::Url;

/// Errors that can occur while fetching or using a key set.
#[derive(Debug, thiserror::Error)]
pub enum KeyFetchError {
    /// A network error occurred while fetching the JWKS.
    #[error("Network error: {0}")]
    Network(String),

    /// The HTTP request returned a non-success status code.
    #[error("HTTP error: status {0}")]
    Http(u16),

    /// The JWKS response could not be parsed as JSON.
    #[error("Failed to parse JWKS: {0}")]
    Parse(String),

    /// The JWKS URI scheme is not allowed (must be HTTPS in production).
    #[error("Invalid URL scheme: only HTTPS is allowed")]
    InvalidScheme,

    /// The response exceeded the maximum allowed size.
    #[error("Response exceeds maximum size of {max_size} bytes")]
    ResponseTooLarge {
        /// The maximum allowed size.
        max_size: usize,
    },
}

/// Capability for retrieving a JWKS document from an endpoint.
///
/// Injected into [`KeySetCache`] so the transport can be replaced in tests.
#[async_trait]
pub trait KeyFetcher: Send + Sync {
    /// Fetches and parses the key set published at `uri`.
    async fn fetch(&self, uri: &Url) -> Result<JwkSet, KeyFetchError>;
}

/// Configuration for the reqwest-backed [`HttpKeyFetcher`].
#[derive(Debug, Clone)]
pub struct HttpKeyFetcherConfig {
    /// HTTP request timeout (default: 10 seconds).
    pub request_timeout: Duration,

    /// Maximum response size in bytes (default: 1 MB).
    pub max_response_size: usize,

    /// Whether to allow HTTP (non-HTTPS) JWKS URIs.
    /// This should only be enabled for testing.
    pub allow_http: bool,
}

impl Default for HttpKeyFetcherConfig {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(10),
            max_response_size: 1024 * 1024, // 1 MB
            allow_http: false,
        }
    }
}

/// Default [`KeyFetcher`] that performs a bounded HTTPS GET.
pub struct HttpKeyFetcher {
    http_client: reqwest::Client,
    config: HttpKeyFetcherConfig,
}

impl HttpKeyFetcher {
    /// Creates a new fetcher with the specified configuration.
    ///
    /// # Panics
    ///
    /// Panics if the HTTP client cannot be created (should not happen in
    /// practice).
    #[must_use]
    pub fn new(config: HttpKeyFetcherConfig) -> Self {
        let http_client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .expect("Failed to create HTTP client");

        Self {
            http_client,
            config,
        }
    }

    /// Creates a new fetcher with default configuration.
    #[must_use]
    pub fn with_defaults() -> Self {
        Self::new(HttpKeyFetcherConfig::default())
    }

    fn validate_scheme(&self, uri: &Url) -> Result<(), KeyFetchError> {
        let scheme = uri.scheme();

        if scheme == "https" {
            return Ok(());
        }

        if scheme == "http" && self.config.allow_http {
            return Ok(());
        }

        Err(KeyFetchError::InvalidScheme)
    }
}

#[async_trait]
impl KeyFetcher for HttpKeyFetcher {
    async fn fetch(&self, uri: &Url) -> Result<JwkSet, KeyFetchError> {
        self.validate_scheme(uri)?;

        tracing::debug!("Fetching JWKS from {}", uri);

        let response = self
            .http_client
            .get(uri.as_str())
            .header("Accept", "application/json")
            .send()
            .await
            .map_err(|e| {
                tracing::warn!("Failed to fetch JWKS from {}: {}", uri, e);
                KeyFetchError::Network(e.to_string())
            })?;

        if !response.status().is_success() {
            return Err(KeyFetchError::Http(response.status().as_u16()));
        }

        if let Some(len) = response.content_length()
            && len as usize > self.config.max_response_size
        {
            return Err(KeyFetchError::ResponseTooLarge {
                max_size: self.config.max_response_size,
            });
        }

        let jwks: JwkSet = response.json().await.map_err(|e| {
            tracing::warn!("Failed to parse JWKS from {}: {}", uri, e);
            KeyFetchError::Parse(e.to_string())
        })?;

        Ok(jwks)
    }
}

/// Cached key set with its expiry instant.
struct CachedKeySet {
    keys: Arc<JwkSet>,
    expires_at: Instant,
}

/// In-memory cache for provider key sets, keyed by JWKS URI.
///
/// Entries expire after a fixed TTL; expired entries are skipped lazily on
/// lookup and removed by [`KeySetCache::cleanup`]. There is no size bound —
/// memory stays bounded only as long as the set of distinct JWKS URIs does.
/// Concurrent fetches for the same URI are permitted; the last writer wins.
pub struct KeySetCache {
    fetcher: Arc<dyn KeyFetcher>,
    cache: Arc<RwLock<HashMap<String, CachedKeySet>>>,
    ttl: Duration,
}

impl KeySetCache {
    /// Default key set TTL (30 minutes).
    pub const DEFAULT_TTL: Duration = Duration::from_secs(30 * 60);

    /// Creates a new cache backed by the given fetch capability.
    #[must_use]
    pub fn new(fetcher: Arc<dyn KeyFetcher>, ttl: Duration) -> Self {
        Self {
            fetcher,
            cache: Arc::new(RwLock::new(HashMap::new())),
            ttl,
        }
    }

    /// Creates a cache with the reqwest-backed fetcher and default TTL.
    #[must_use]
    pub fn with_defaults() -> Self {
        Self::new(Arc::new(HttpKeyFetcher::with_defaults()), Self::DEFAULT_TTL)
    }

    /// Returns the key set for `uri`, fetching on cache miss or expiry.
    ///
    /// # Errors
    ///
    /// Propagates the fetch error when the endpoint cannot be reached or the
    /// document cannot be parsed. Failures are not cached.
    pub async fn keys(&self, uri: &Url) -> Result<Arc<JwkSet>, KeyFetchError> {
        let key = normalize_uri(uri);

        {
            let cache = self.cache.read().await;
            if let Some(cached) = cache.get(&key)
                && Instant::now() < cached.expires_at
            {
                tracing::trace!("Key set cache hit for {}", uri);
                return Ok(Arc::clone(&cached.keys));
            }
        }

        tracing::debug!("Key set cache miss for {}", uri);
        let jwks = Arc::new(self.fetcher.fetch(uri).await?);

        let mut cache = self.cache.write().await;
        cache.insert(
            key,
            CachedKeySet {
                keys: Arc::clone(&jwks),
                expires_at: Instant::now() + self.ttl,
            },
        );

        Ok(jwks)
    }

    /// Removes the cached entry for `uri`, forcing a re-fetch on next use.
    pub async fn invalidate(&self, uri: &Url) {
        let key = normalize_uri(uri);
        let mut cache = self.cache.write().await;
        cache.remove(&key);
        tracing::debug!("Invalidated key set cache for {}", uri);
    }

    /// Removes all expired entries.
    pub async fn cleanup(&self) {
        let mut cache = self.cache.write().await;
        let now = Instant::now();
        let before_count = cache.len();

        cache.retain(|_, v| v.expires_at > now);

        let removed = before_count - cache.len();
        if removed > 0 {
            tracing::debug!("Cleaned up {} expired key set cache entries", removed);
        }
    }

    /// Returns the number of entries in the cache.
    pub async fn len(&self) -> usize {
        self.cache.read().await.len()
    }

    /// Returns `true` if the cache is empty.
    pub async fn is_empty(&self) -> bool {
        self.cache.read().await.is_empty()
    }
}

/// Selects verification key candidates from a key set.
///
/// With a `kid`, only the matching key is returned; without one, every
/// non-encryption key is a candidate. Keys that cannot be converted to a
/// [`DecodingKey`] are skipped.
#[must_use]
pub fn select_keys(jwks: &JwkSet, kid: Option<&str>) -> Vec<(DecodingKey, Option<Algorithm>)> {
    jwks.keys
        .iter()
        .filter(|k| match kid {
            Some(kid) => k.common.key_id.as_deref() == Some(kid),
            None => !matches!(&k.common.public_key_use, Some(PublicKeyUse::Encryption)),
        })
        .filter_map(|jwk| {
            DecodingKey::from_jwk(jwk)
                .ok()
                .map(|dk| (dk, jwk_algorithm(jwk)))
        })
        .collect()
}

/// Normalizes a URI for use as a cache key.
fn normalize_uri(uri: &Url) -> String {
    uri.as_str().trim_end_matches('/').to_string()
}

/// Extracts the declared algorithm from a JWK.
fn jwk_algorithm(jwk: &Jwk) -> Option<Algorithm> {
    jwk.common.key_algorithm.as_ref().and_then(|alg| match alg {
        jsonwebtoken::jwk::KeyAlgorithm::RS256 => Some(Algorithm::RS256),
        jsonwebtoken::jwk::KeyAlgorithm::RS384 => Some(Algorithm::RS384),
        jsonwebtoken::jwk::KeyAlgorithm::RS512 => Some(Algorithm::RS512),
        _ => None,
    })
}

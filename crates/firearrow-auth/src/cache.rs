//! Caching of validation verdicts.
//!
//! A verified token is re-presented on every request, so the full pipeline
//! (including a signature check) would otherwise run per request. The cache
//! stores positive verdicts only, keyed by a provider-scoped fingerprint of
//! the raw token. Failures are never cached: a failure may be transient
//! (key rollover, network trouble) and caching it would pin the outage.
//!
//! A cache hit re-checks the token's time window. The verdict was computed
//! at insert time; without the re-check a token could outlive its `exp` by
//! up to the cache TTL.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use sha2::{Digest, Sha256};
use tokio::sync::RwLock;
use tokio::task::JoinHandle;

use crate::claims::TokenClaims;
use crate::verifier::ValidationResult;

/// Default TTL for cached verdicts.
pub const DEFAULT_VALIDATION_TTL: Duration = Duration::from_secs(5 * 60);

struct CachedVerdict {
    provider: String,
    claims: Arc<TokenClaims>,
    expires_at: Instant,
}

/// Cache of positive validation verdicts, keyed by token fingerprint.
pub struct ValidationCache {
    entries: Arc<RwLock<HashMap<String, CachedVerdict>>>,
    ttl: Duration,
    clock_skew: Duration,
}

impl ValidationCache {
    /// Creates a cache with the given verdict TTL and clock skew tolerance.
    #[must_use]
    pub fn new(ttl: Duration, clock_skew: Duration) -> Self {
        Self {
            entries: Arc::new(RwLock::new(HashMap::new())),
            ttl,
            clock_skew,
        }
    }

    /// Looks up a cached verdict for `raw` under the named provider.
    ///
    /// Returns `None` on a miss, an expired entry, or a token whose own time
    /// window has since closed. Stale entries are evicted on the way out.
    pub async fn get(&self, provider: &str, raw: &str) -> Option<ValidationResult> {
        let key = fingerprint(provider, raw);

        {
            let entries = self.entries.read().await;
            let entry = entries.get(&key)?;
            if entry.expires_at > Instant::now()
                && entry.claims.is_current(self.clock_skew.as_secs() as i64)
            {
                tracing::trace!(provider = %entry.provider, "Validation cache hit");
                return Some(ValidationResult::valid(
                    entry.provider.clone(),
                    Arc::clone(&entry.claims),
                ));
            }
        }

        // Entry expired, or the token itself did. Drop it.
        let mut entries = self.entries.write().await;
        entries.remove(&key);
        None
    }

    /// Stores a verdict for `raw`. Only valid verdicts are kept.
    pub async fn insert(&self, raw: &str, result: &ValidationResult) {
        let ValidationResult::Valid { provider, claims } = result else {
            return;
        };

        let key = fingerprint(provider, raw);
        let mut entries = self.entries.write().await;
        entries.insert(
            key,
            CachedVerdict {
                provider: provider.clone(),
                claims: Arc::clone(claims),
                expires_at: Instant::now() + self.ttl,
            },
        );
    }

    /// Removes entries whose cache TTL has elapsed.
    pub async fn cleanup(&self) {
        let now = Instant::now();
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|_, v| v.expires_at > now);
        let removed = before - entries.len();
        if removed > 0 {
            tracing::debug!(removed, "Cleaned up expired validation verdicts");
        }
    }

    /// Drops all cached verdicts.
    pub async fn clear(&self) {
        self.entries.write().await.clear();
    }

    /// Number of cached verdicts, including not-yet-swept expired ones.
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    /// Returns `true` if the cache holds no verdicts.
    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

/// Provider-scoped fingerprint of a raw token.
///
/// The raw token never serves as a map key directly; only its digest is
/// retained in memory.
fn fingerprint(provider: &str, raw: &str) -> String {
    let digest = Sha256::digest(raw.as_bytes());
    format!("{provider}:{}", hex::encode(digest))
}

/// Handle to a background sweeper task; aborts the task on drop.
pub struct SweeperHandle {
    handle: JoinHandle<()>,
}

impl SweeperHandle {
    pub(crate) fn new(handle: JoinHandle<()>) -> Self {
        Self { handle }
    }

    /// Stops the sweeper.
    pub fn shutdown(self) {
        self.handle.abort();
    }
}

impl Drop for SweeperHandle {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ValidationReason;
    use std::collections::HashMap as StdHashMap;
    use time::OffsetDateTime;

    fn claims_expiring_in(secs: i64) -> Arc<TokenClaims> {
        Arc::new(TokenClaims {
            iss: Some("https://auth.example.com".to_string()),
            sub: Some("user-1".to_string()),
            aud: None,
            exp: Some(OffsetDateTime::now_utc().unix_timestamp() + secs),
            nbf: None,
            iat: None,
            extra: StdHashMap::new(),
        })
    }

    #[tokio::test]
    async fn test_hit_after_insert() {
        let cache = ValidationCache::new(Duration::from_secs(300), Duration::ZERO);
        let verdict = ValidationResult::valid("azure", claims_expiring_in(3600));

        cache.insert("raw.token.sig", &verdict).await;
        let hit = cache.get("azure", "raw.token.sig").await.unwrap();
        assert!(hit.is_valid());
        assert_eq!(hit.provider(), Some("azure"));
    }

    #[tokio::test]
    async fn test_miss_for_other_provider_and_token() {
        let cache = ValidationCache::new(Duration::from_secs(300), Duration::ZERO);
        let verdict = ValidationResult::valid("azure", claims_expiring_in(3600));
        cache.insert("raw.token.sig", &verdict).await;

        assert!(cache.get("keycloak", "raw.token.sig").await.is_none());
        assert!(cache.get("azure", "other.token.sig").await.is_none());
    }

    #[tokio::test]
    async fn test_invalid_verdicts_not_cached() {
        let cache = ValidationCache::new(Duration::from_secs(300), Duration::ZERO);
        let verdict =
            ValidationResult::invalid(ValidationReason::SignatureInvalid, "bad signature");

        cache.insert("raw.token.sig", &verdict).await;
        assert!(cache.is_empty().await);
    }

    #[tokio::test]
    async fn test_entry_ttl_expiry() {
        let cache = ValidationCache::new(Duration::from_millis(20), Duration::ZERO);
        let verdict = ValidationResult::valid("azure", claims_expiring_in(3600));
        cache.insert("raw.token.sig", &verdict).await;

        tokio::time::sleep(Duration::from_millis(40)).await;
        assert!(cache.get("azure", "raw.token.sig").await.is_none());
        // The stale entry was evicted by the lookup.
        assert!(cache.is_empty().await);
    }

    #[tokio::test]
    async fn test_hit_rechecks_token_expiry() {
        let cache = ValidationCache::new(Duration::from_secs(300), Duration::ZERO);
        // Verdict is fresh in the cache, but the token itself is expired.
        let verdict = ValidationResult::valid("azure", claims_expiring_in(-10));
        cache.insert("raw.token.sig", &verdict).await;

        assert!(cache.get("azure", "raw.token.sig").await.is_none());
    }

    #[tokio::test]
    async fn test_cleanup_sweeps_expired_entries() {
        let cache = ValidationCache::new(Duration::from_millis(20), Duration::ZERO);
        let verdict = ValidationResult::valid("azure", claims_expiring_in(3600));
        cache.insert("a.token.sig", &verdict).await;
        cache.insert("b.token.sig", &verdict).await;
        assert_eq!(cache.len().await, 2);

        tokio::time::sleep(Duration::from_millis(40)).await;
        cache.cleanup().await;
        assert!(cache.is_empty().await);
    }

    #[test]
    fn test_fingerprint_shape() {
        let fp = fingerprint("azure", "a.b.c");
        assert!(fp.starts_with("azure:"));
        // SHA-256 hex digest after the provider prefix.
        assert_eq!(fp.len(), "azure:".len() + 64);
        assert_eq!(fp, fingerprint("azure", "a.b.c"));
        assert_ne!(fp, fingerprint("azure", "a.b.d"));
    }
}

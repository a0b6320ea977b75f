//! Bearer-token authentication and FHIR authorization for the FireArrow
//! server.
//!
//! The crate covers the path from a raw `Authorization: Bearer` value to an
//! access decision:
//!
//! - [`manager::ProviderManager`] validates tokens against an ordered set of
//!   trust providers, with verdict caching
//! - [`verifier::TokenVerifier`] runs the per-provider verification pipeline
//!   (structure, algorithm, time window, signature, audience, issuer)
//! - [`jwks::KeySetCache`] caches each provider's published verification keys
//! - [`extractor::ClaimExtractor`] turns verified claims into an
//!   [`identity::Identity`] using a configurable claim mapping
//! - [`authorize::AuthorizationEngine`] decides role-based access to FHIR
//!   interactions, including Patient/Organization compartment containment
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use firearrow_auth::authorize::{AuthorizationEngine, FhirOperation};
//! use firearrow_auth::config::AuthConfig;
//! use firearrow_auth::jwks::HttpKeyFetcher;
//! use firearrow_auth::manager::ProviderManager;
//!
//! # async fn run(raw_token: &str) -> Result<(), Box<dyn std::error::Error>> {
//! let config = AuthConfig::default();
//! let fetcher = Arc::new(HttpKeyFetcher::with_defaults());
//! let manager = ProviderManager::from_config(&config, fetcher)?;
//! let sweeper = manager.start_sweeper(std::time::Duration::from_secs(60));
//!
//! let result = manager.validate(raw_token).await;
//! if let Some(identity) = manager.identity(&result) {
//!     let engine = AuthorizationEngine::new();
//!     let decision =
//!         engine.authorize(&identity, Some("Patient"), FhirOperation::Read, Some("42"));
//!     if !decision.is_allowed() {
//!         // render 403
//!     }
//! }
//! # drop(sweeper);
//! # Ok(())
//! # }
//! ```

pub mod authorize;
pub mod cache;
pub mod claims;
pub mod config;
pub mod error;
pub mod extractor;
pub mod identity;
pub mod jwks;
pub mod manager;
pub mod provider;
pub mod verifier;

pub use authorize::{AuthorizationDecision, AuthorizationEngine, FhirOperation};
pub use config::AuthConfig;
pub use error::{ConfigError, ValidationReason};
pub use identity::Identity;
pub use manager::ProviderManager;
pub use verifier::ValidationResult;

/// Commonly used types.
pub mod prelude {
    pub use crate::authorize::{
        AuthorizationDecision, AuthorizationEngine, DenyReason, FhirOperation,
    };
    pub use crate::cache::ValidationCache;
    pub use crate::claims::TokenClaims;
    pub use crate::config::AuthConfig;
    pub use crate::error::{ConfigError, ValidationReason};
    pub use crate::extractor::ClaimExtractor;
    pub use crate::identity::Identity;
    pub use crate::jwks::{HttpKeyFetcher, KeyFetcher, KeySetCache};
    pub use crate::manager::ProviderManager;
    pub use crate::provider::{ClaimMapping, ProviderConfig, ProviderKind, TrustContext};
    pub use crate::verifier::{TokenVerifier, ValidationResult};
}

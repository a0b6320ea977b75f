//! The authenticated user identity.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// An authenticated actor, extracted from a verified claim set.
///
/// The actor's FHIR footprint is carried by `resource_type` (what kind of
/// actor this is) and `fhir_id` (which resource represents them, as a
/// relative reference like `Patient/42`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Identity {
    /// Stable user identifier from the token.
    pub user_id: String,

    /// Normalized role set (trimmed, deduplicated).
    pub roles: HashSet<String>,

    /// FHIR resource type of the actor, e.g. `Patient` or `Practitioner`.
    pub resource_type: Option<String>,

    /// FHIR resource reference for the actor, e.g. `Patient/42`.
    pub fhir_id: Option<String>,

    /// Email address, when the token carries one.
    pub email: Option<String>,

    /// Display name, when the token carries one.
    pub name: Option<String>,

    /// Issuer of the token this identity came from.
    pub issuer: Option<String>,

    /// Audience(s) of the token this identity came from.
    pub audience: Option<Vec<String>>,

    /// When the token was issued.
    pub issued_at: Option<OffsetDateTime>,

    /// When the token expires.
    pub expires_at: Option<OffsetDateTime>,
}

impl Identity {
    /// Returns `true` if the identity holds the given role (exact match).
    #[must_use]
    pub fn has_role(&self, role: &str) -> bool {
        self.roles.contains(role)
    }

    /// Returns `true` if the identity holds any of the given roles.
    #[must_use]
    pub fn has_any_role(&self, roles: &[&str]) -> bool {
        roles.iter().any(|r| self.roles.contains(*r))
    }

    /// Returns `true` if the actor is a Patient.
    #[must_use]
    pub fn is_patient(&self) -> bool {
        self.is_resource_type("Patient")
    }

    /// Returns `true` if the actor is a Practitioner.
    #[must_use]
    pub fn is_practitioner(&self) -> bool {
        self.is_resource_type("Practitioner")
    }

    /// Returns `true` if the actor is an Organization.
    #[must_use]
    pub fn is_organization(&self) -> bool {
        self.is_resource_type("Organization")
    }

    fn is_resource_type(&self, expected: &str) -> bool {
        self.resource_type
            .as_deref()
            .is_some_and(|t| t.eq_ignore_ascii_case(expected))
    }

    /// Returns the id part of the actor's FHIR reference.
    ///
    /// `Patient/42` yields `42`; a bare `42` is returned as-is.
    #[must_use]
    pub fn own_resource_id(&self) -> Option<&str> {
        self.fhir_id
            .as_deref()
            .map(|r| r.rsplit('/').next().unwrap_or(r))
            .filter(|id| !id.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn identity(resource_type: Option<&str>, fhir_id: Option<&str>) -> Identity {
        Identity {
            user_id: "user-1".to_string(),
            roles: ["patient".to_string()].into_iter().collect(),
            resource_type: resource_type.map(String::from),
            fhir_id: fhir_id.map(String::from),
            email: None,
            name: None,
            issuer: None,
            audience: None,
            issued_at: None,
            expires_at: None,
        }
    }

    #[test]
    fn test_role_checks() {
        let id = identity(None, None);
        assert!(id.has_role("patient"));
        assert!(!id.has_role("admin"));
        assert!(id.has_any_role(&["admin", "patient"]));
        assert!(!id.has_any_role(&["admin", "system"]));
        assert!(!id.has_any_role(&[]));
    }

    #[test]
    fn test_actor_type_is_case_insensitive() {
        assert!(identity(Some("Patient"), None).is_patient());
        assert!(identity(Some("patient"), None).is_patient());
        assert!(identity(Some("PRACTITIONER"), None).is_practitioner());
        assert!(identity(Some("Organization"), None).is_organization());
        assert!(!identity(Some("Device"), None).is_patient());
        assert!(!identity(None, None).is_patient());
    }

    #[test]
    fn test_own_resource_id() {
        assert_eq!(
            identity(None, Some("Patient/42")).own_resource_id(),
            Some("42")
        );
        assert_eq!(identity(None, Some("42")).own_resource_id(), Some("42"));
        assert_eq!(
            identity(None, Some("https://fhir.example.com/Patient/42")).own_resource_id(),
            Some("42")
        );
        assert_eq!(identity(None, Some("Patient/")).own_resource_id(), None);
        assert_eq!(identity(None, None).own_resource_id(), None);
    }
}

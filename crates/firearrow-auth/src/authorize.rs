//! Role-based authorization over FHIR interactions.
//!
//! Decisions are made from three inputs: the actor's [`Identity`], the
//! target resource type, and the [`FhirOperation`] being attempted. Rules
//! are evaluated in a fixed precedence: administrative override, open
//! operations, the per-class role matrix, then compartment containment for
//! Patient and Organization actors. Anything not explicitly allowed is
//! denied.

use crate::identity::Identity;

/// The FHIR interaction being attempted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FhirOperation {
    Read,
    VRead,
    Search,
    HistoryInstance,
    HistoryType,
    HistorySystem,
    GetPage,
    Create,
    Update,
    Patch,
    Delete,
    Batch,
    Transaction,
    Metadata,
    Validate,
}

/// Coarse grouping of operations sharing one rule set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationClass {
    /// Non-mutating retrieval.
    Read,
    /// Creation or modification.
    Write,
    /// Resource deletion.
    Delete,
    /// Multi-entry bundle processing.
    Bundle,
    /// Open to any authenticated caller.
    Open,
}

impl FhirOperation {
    /// The rule class this operation belongs to.
    #[must_use]
    pub fn class(self) -> OperationClass {
        match self {
            Self::Read
            | Self::VRead
            | Self::Search
            | Self::HistoryInstance
            | Self::HistoryType
            | Self::HistorySystem
            | Self::GetPage => OperationClass::Read,
            Self::Create | Self::Update | Self::Patch => OperationClass::Write,
            Self::Delete => OperationClass::Delete,
            Self::Batch | Self::Transaction => OperationClass::Bundle,
            Self::Metadata | Self::Validate => OperationClass::Open,
        }
    }
}

impl std::fmt::Display for FhirOperation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Read => "read",
            Self::VRead => "vread",
            Self::Search => "search",
            Self::HistoryInstance => "history-instance",
            Self::HistoryType => "history-type",
            Self::HistorySystem => "history-system",
            Self::GetPage => "get-page",
            Self::Create => "create",
            Self::Update => "update",
            Self::Patch => "patch",
            Self::Delete => "delete",
            Self::Batch => "batch",
            Self::Transaction => "transaction",
            Self::Metadata => "metadata",
            Self::Validate => "validate",
        };
        f.write_str(name)
    }
}

/// Why a request was denied.
#[derive(Debug, Clone)]
pub struct DenyReason {
    /// Target resource type, when the request named one.
    pub resource_type: Option<String>,

    /// The attempted operation.
    pub operation: FhirOperation,

    /// Sanitized explanation, safe to surface to the caller.
    pub message: String,
}

/// The outcome of an authorization check.
#[derive(Debug, Clone)]
pub enum AuthorizationDecision {
    Allow,
    Deny(DenyReason),
}

impl AuthorizationDecision {
    /// Returns `true` if access was granted.
    #[must_use]
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allow)
    }

    fn deny(
        resource_type: Option<&str>,
        operation: FhirOperation,
        message: impl Into<String>,
    ) -> Self {
        Self::Deny(DenyReason {
            resource_type: resource_type.map(String::from),
            operation,
            message: message.into(),
        })
    }
}

/// Roles granting unrestricted access.
const ADMIN_ROLES: &[&str] = &["admin", "administrator"];

/// Clinical roles granting practitioner-level read access.
const PRACTITIONER_ROLES: &[&str] = &["practitioner", "clinician", "nurse", "doctor"];

/// Roles for non-person (machine) actors.
const SYSTEM_ROLES: &[&str] = &["system", "service"];

/// Resource types a nurse may write.
const NURSE_WRITABLE: &[&str] = &[
    "Observation",
    "CarePlan",
    "MedicationAdministration",
    "Procedure",
];

/// Resource types a patient may write about themselves.
const PATIENT_WRITABLE: &[&str] = &["Observation", "QuestionnaireResponse", "Communication"];

/// Core actor types that must never be deleted through the API.
const UNDELETABLE: &[&str] = &["Patient", "Practitioner", "Organization"];

/// Administrative resource types closed to ordinary clinical roles.
const ADMINISTRATIVE: &[&str] = &["Organization", "Location", "HealthcareService", "Endpoint"];

/// Stateless role-based access decision engine.
#[derive(Debug, Default, Clone)]
pub struct AuthorizationEngine;

impl AuthorizationEngine {
    /// Creates the engine.
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Decides whether `identity` may perform `operation` against the target.
    ///
    /// `resource_type` is the target resource type when the request names one
    /// (instance and type-level interactions); `target_id` is the logical id
    /// for instance-level interactions.
    #[must_use]
    pub fn authorize(
        &self,
        identity: &Identity,
        resource_type: Option<&str>,
        operation: FhirOperation,
        target_id: Option<&str>,
    ) -> AuthorizationDecision {
        if identity.has_any_role(ADMIN_ROLES) {
            return AuthorizationDecision::Allow;
        }

        let decision = match operation.class() {
            OperationClass::Open => AuthorizationDecision::Allow,
            OperationClass::Read => self.authorize_read(identity, resource_type, operation, target_id),
            OperationClass::Write => {
                self.authorize_write(identity, resource_type, operation, target_id)
            }
            OperationClass::Delete => self.authorize_delete(identity, resource_type, operation),
            OperationClass::Bundle => self.authorize_bundle(identity, operation),
        };

        if let AuthorizationDecision::Deny(reason) = &decision {
            tracing::debug!(
                user_id = %identity.user_id,
                operation = %reason.operation,
                resource_type = reason.resource_type.as_deref().unwrap_or("-"),
                "Access denied: {}", reason.message
            );
        }
        decision
    }

    fn authorize_read(
        &self,
        identity: &Identity,
        resource_type: Option<&str>,
        operation: FhirOperation,
        target_id: Option<&str>,
    ) -> AuthorizationDecision {
        let role_ok = if identity.is_practitioner() {
            identity.has_any_role(PRACTITIONER_ROLES)
        } else if identity.is_patient() {
            identity.has_role("patient")
        } else if identity.is_organization() {
            identity.has_any_role(&["organization", "org_admin"])
        } else {
            identity.has_any_role(SYSTEM_ROLES)
        };

        if !role_ok {
            return AuthorizationDecision::deny(
                resource_type,
                operation,
                "No role grants read access for this actor",
            );
        }

        if let Some(denied) = self.check_administrative(identity, resource_type, operation) {
            return denied;
        }

        self.check_compartment(identity, resource_type, operation, target_id)
    }

    fn authorize_write(
        &self,
        identity: &Identity,
        resource_type: Option<&str>,
        operation: FhirOperation,
        target_id: Option<&str>,
    ) -> AuthorizationDecision {
        let Some(target) = resource_type else {
            return AuthorizationDecision::deny(
                resource_type,
                operation,
                "Write requests must name a resource type",
            );
        };

        let role_ok = if identity.is_patient() {
            identity.has_role("patient") && PATIENT_WRITABLE.contains(&target)
        } else if identity.is_organization() {
            identity.has_role("org_admin")
        } else if identity.is_practitioner() {
            // Nurses write a restricted set; other clinical roles are not
            // resource-restricted.
            identity.has_any_role(&["practitioner", "clinician", "doctor"])
                || (identity.has_role("nurse") && NURSE_WRITABLE.contains(&target))
        } else {
            identity.has_any_role(SYSTEM_ROLES) && identity.has_role("write")
        };

        if !role_ok {
            return AuthorizationDecision::deny(
                resource_type,
                operation,
                "No role grants write access to this resource type",
            );
        }

        if let Some(denied) = self.check_administrative(identity, resource_type, operation) {
            return denied;
        }

        self.check_compartment(identity, resource_type, operation, target_id)
    }

    fn authorize_delete(
        &self,
        identity: &Identity,
        resource_type: Option<&str>,
        operation: FhirOperation,
    ) -> AuthorizationDecision {
        if let Some(target) = resource_type
            && UNDELETABLE.contains(&target)
        {
            return AuthorizationDecision::deny(
                resource_type,
                operation,
                "This resource type cannot be deleted",
            );
        }

        let role_ok = identity.has_role("senior_practitioner")
            || (identity.has_any_role(SYSTEM_ROLES) && identity.has_role("delete"));
        if role_ok {
            AuthorizationDecision::Allow
        } else {
            AuthorizationDecision::deny(
                resource_type,
                operation,
                "No role grants delete access",
            )
        }
    }

    fn authorize_bundle(
        &self,
        identity: &Identity,
        operation: FhirOperation,
    ) -> AuthorizationDecision {
        if identity.has_any_role(SYSTEM_ROLES) || identity.has_role("batch_processor") {
            AuthorizationDecision::Allow
        } else {
            AuthorizationDecision::deny(None, operation, "No role grants bundle processing")
        }
    }

    /// Administrative-resource gate for practitioner actors.
    ///
    /// Clinical roles do not extend to the administrative directory
    /// (Organization, Location, HealthcareService, Endpoint); a Practitioner
    /// actor needs `org_admin` on top of their clinical role to touch those
    /// types. Admin actors never reach this check.
    fn check_administrative(
        &self,
        identity: &Identity,
        resource_type: Option<&str>,
        operation: FhirOperation,
    ) -> Option<AuthorizationDecision> {
        let gated = identity.is_practitioner()
            && resource_type.is_some_and(|t| ADMINISTRATIVE.contains(&t))
            && !identity.has_role("org_admin");
        if gated {
            Some(AuthorizationDecision::deny(
                resource_type,
                operation,
                "Administrative resources require an administrative role",
            ))
        } else {
            None
        }
    }

    /// Compartment containment for person/organization actors.
    ///
    /// A Patient actor touching a Patient resource instance must be touching
    /// their own record; the Organization analogue holds for Organization
    /// resources. Requests without a target id (searches, creates) pass —
    /// result filtering is the storage layer's concern.
    fn check_compartment(
        &self,
        identity: &Identity,
        resource_type: Option<&str>,
        operation: FhirOperation,
        target_id: Option<&str>,
    ) -> AuthorizationDecision {
        let guarded = (identity.is_patient() && resource_type == Some("Patient"))
            || (identity.is_organization() && resource_type == Some("Organization"));
        if !guarded {
            return AuthorizationDecision::Allow;
        }

        let Some(target_id) = target_id else {
            return AuthorizationDecision::Allow;
        };

        let target_id = target_id.rsplit('/').next().unwrap_or(target_id);
        match identity.own_resource_id() {
            Some(own) if own == target_id => AuthorizationDecision::Allow,
            _ => AuthorizationDecision::deny(
                resource_type,
                operation,
                "Access is limited to the actor's own record",
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn identity(
        roles: &[&str],
        resource_type: Option<&str>,
        fhir_id: Option<&str>,
    ) -> Identity {
        Identity {
            user_id: "user-1".to_string(),
            roles: roles.iter().map(|r| (*r).to_string()).collect::<HashSet<_>>(),
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

    fn engine() -> AuthorizationEngine {
        AuthorizationEngine::new()
    }

    #[test]
    fn test_admin_override() {
        let admin = identity(&["admin"], None, None);
        for op in [
            FhirOperation::Read,
            FhirOperation::Create,
            FhirOperation::Delete,
            FhirOperation::Transaction,
        ] {
            assert!(
                engine()
                    .authorize(&admin, Some("Patient"), op, Some("42"))
                    .is_allowed()
            );
        }
    }

    #[test]
    fn test_open_operations_allowed_for_anyone() {
        let nobody = identity(&[], None, None);
        assert!(
            engine()
                .authorize(&nobody, None, FhirOperation::Metadata, None)
                .is_allowed()
        );
        assert!(
            engine()
                .authorize(&nobody, Some("Patient"), FhirOperation::Validate, None)
                .is_allowed()
        );
    }

    #[test]
    fn test_practitioner_reads() {
        let doc = identity(&["clinician"], Some("Practitioner"), None);
        assert!(
            engine()
                .authorize(&doc, Some("Observation"), FhirOperation::Search, None)
                .is_allowed()
        );
        assert!(
            engine()
                .authorize(&doc, Some("Patient"), FhirOperation::Read, Some("42"))
                .is_allowed()
        );

        // A practitioner actor without any clinical role reads nothing.
        let stripped = identity(&[], Some("Practitioner"), None);
        assert!(
            !engine()
                .authorize(&stripped, Some("Patient"), FhirOperation::Read, Some("42"))
                .is_allowed()
        );
    }

    #[test]
    fn test_patient_compartment_on_read() {
        let patient = identity(&["patient"], Some("Patient"), Some("Patient/42"));

        assert!(
            engine()
                .authorize(&patient, Some("Patient"), FhirOperation::Read, Some("42"))
                .is_allowed()
        );
        assert!(
            !engine()
                .authorize(&patient, Some("Patient"), FhirOperation::Read, Some("99"))
                .is_allowed()
        );
        // Qualified target references compare by id part.
        assert!(
            engine()
                .authorize(
                    &patient,
                    Some("Patient"),
                    FhirOperation::Read,
                    Some("Patient/42")
                )
                .is_allowed()
        );
        // No instance target (search) passes; filtering happens downstream.
        assert!(
            engine()
                .authorize(&patient, Some("Patient"), FhirOperation::Search, None)
                .is_allowed()
        );
        // Other resource types are not compartment-guarded here.
        assert!(
            engine()
                .authorize(&patient, Some("Observation"), FhirOperation::Read, Some("7"))
                .is_allowed()
        );
    }

    #[test]
    fn test_patient_writes_restricted_set() {
        let patient = identity(&["patient"], Some("Patient"), Some("Patient/42"));

        for allowed in ["Observation", "QuestionnaireResponse", "Communication"] {
            assert!(
                engine()
                    .authorize(&patient, Some(allowed), FhirOperation::Create, None)
                    .is_allowed()
            );
        }
        assert!(
            !engine()
                .authorize(&patient, Some("Patient"), FhirOperation::Update, Some("42"))
                .is_allowed()
        );
        assert!(
            !engine()
                .authorize(&patient, Some("CarePlan"), FhirOperation::Create, None)
                .is_allowed()
        );
    }

    #[test]
    fn test_nurse_writes_restricted_set() {
        let nurse = identity(&["nurse"], Some("Practitioner"), None);

        for allowed in [
            "Observation",
            "CarePlan",
            "MedicationAdministration",
            "Procedure",
        ] {
            assert!(
                engine()
                    .authorize(&nurse, Some(allowed), FhirOperation::Update, Some("1"))
                    .is_allowed()
            );
        }
        assert!(
            !engine()
                .authorize(&nurse, Some("Organization"), FhirOperation::Update, Some("1"))
                .is_allowed()
        );
        assert!(
            !engine()
                .authorize(&nurse, Some("Patient"), FhirOperation::Create, None)
                .is_allowed()
        );

        // A doctor is not restricted among clinical resource types.
        let doctor = identity(&["doctor"], Some("Practitioner"), None);
        assert!(
            engine()
                .authorize(&doctor, Some("Encounter"), FhirOperation::Update, Some("1"))
                .is_allowed()
        );
    }

    #[test]
    fn test_practitioner_administrative_gate() {
        let doctor = identity(&["doctor"], Some("Practitioner"), None);
        for admin_type in ["Organization", "Location", "HealthcareService", "Endpoint"] {
            assert!(
                !engine()
                    .authorize(&doctor, Some(admin_type), FhirOperation::Read, Some("1"))
                    .is_allowed()
            );
            assert!(
                !engine()
                    .authorize(&doctor, Some(admin_type), FhirOperation::Update, Some("1"))
                    .is_allowed()
            );
        }

        // org_admin on top of the clinical role opens the gate.
        let lead = identity(&["doctor", "org_admin"], Some("Practitioner"), None);
        assert!(
            engine()
                .authorize(&lead, Some("Organization"), FhirOperation::Read, Some("1"))
                .is_allowed()
        );
        assert!(
            engine()
                .authorize(&lead, Some("Location"), FhirOperation::Update, Some("1"))
                .is_allowed()
        );

        // The gate is practitioner-specific; machine actors are unaffected.
        let service = identity(&["system"], None, None);
        assert!(
            engine()
                .authorize(&service, Some("Organization"), FhirOperation::Read, Some("1"))
                .is_allowed()
        );
    }

    #[test]
    fn test_delete_rules() {
        let senior = identity(&["senior_practitioner"], Some("Practitioner"), None);
        assert!(
            engine()
                .authorize(&senior, Some("Observation"), FhirOperation::Delete, Some("1"))
                .is_allowed()
        );
        // Core actor types are never deletable, regardless of role.
        for protected in ["Patient", "Practitioner", "Organization"] {
            assert!(
                !engine()
                    .authorize(&senior, Some(protected), FhirOperation::Delete, Some("1"))
                    .is_allowed()
            );
        }

        let service = identity(&["system", "delete"], None, None);
        assert!(
            engine()
                .authorize(&service, Some("Observation"), FhirOperation::Delete, Some("1"))
                .is_allowed()
        );
        let service_no_delete = identity(&["system"], None, None);
        assert!(
            !engine()
                .authorize(
                    &service_no_delete,
                    Some("Observation"),
                    FhirOperation::Delete,
                    Some("1")
                )
                .is_allowed()
        );
    }

    #[test]
    fn test_bundle_rules() {
        let service = identity(&["system"], None, None);
        assert!(
            engine()
                .authorize(&service, None, FhirOperation::Transaction, None)
                .is_allowed()
        );

        let batcher = identity(&["batch_processor"], None, None);
        assert!(
            engine()
                .authorize(&batcher, None, FhirOperation::Batch, None)
                .is_allowed()
        );

        let doc = identity(&["clinician"], Some("Practitioner"), None);
        assert!(
            !engine()
                .authorize(&doc, None, FhirOperation::Transaction, None)
                .is_allowed()
        );
    }

    #[test]
    fn test_organization_compartment() {
        let org = identity(
            &["org_admin"],
            Some("Organization"),
            Some("Organization/hospital-1"),
        );

        assert!(
            engine()
                .authorize(
                    &org,
                    Some("Organization"),
                    FhirOperation::Read,
                    Some("hospital-1")
                )
                .is_allowed()
        );
        assert!(
            !engine()
                .authorize(
                    &org,
                    Some("Organization"),
                    FhirOperation::Update,
                    Some("hospital-2")
                )
                .is_allowed()
        );
    }

    #[test]
    fn test_system_writes_need_write_role() {
        let rw = identity(&["service", "write"], None, None);
        assert!(
            engine()
                .authorize(&rw, Some("Observation"), FhirOperation::Create, None)
                .is_allowed()
        );

        let ro = identity(&["service"], None, None);
        assert!(
            engine()
                .authorize(&ro, Some("Observation"), FhirOperation::Search, None)
                .is_allowed()
        );
        assert!(
            !engine()
                .authorize(&ro, Some("Observation"), FhirOperation::Create, None)
                .is_allowed()
        );
    }

    #[test]
    fn test_default_deny_carries_context() {
        let nobody = identity(&[], None, None);
        let decision =
            engine().authorize(&nobody, Some("Patient"), FhirOperation::Read, Some("42"));

        let AuthorizationDecision::Deny(reason) = decision else {
            panic!("expected deny");
        };
        assert_eq!(reason.resource_type.as_deref(), Some("Patient"));
        assert_eq!(reason.operation, FhirOperation::Read);
        assert!(!reason.message.is_empty());
    }

    #[test]
    fn test_writes_without_resource_type_denied() {
        let doc = identity(&["doctor"], Some("Practitioner"), None);
        assert!(
            !engine()
                .authorize(&doc, None, FhirOperation::Create, None)
                .is_allowed()
        );
    }
}

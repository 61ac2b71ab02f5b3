use thiserror::Error;

use medprocure_core::DomainError;

use crate::{Permission, Session};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthzError {
    #[error("tenant mismatch")]
    TenantMismatch,

    #[error("forbidden: missing permission '{0}'")]
    Forbidden(String),
}

impl From<AuthzError> for DomainError {
    fn from(value: AuthzError) -> Self {
        match value {
            AuthzError::TenantMismatch => DomainError::permission_denied("tenant membership"),
            AuthzError::Forbidden(permission) => DomainError::permission_denied(permission),
        }
    }
}

/// Authorize a session within its active tenant.
///
/// - No IO
/// - No panics
/// - No business logic (pure policy check)
pub fn authorize(session: &Session, required: &Permission) -> Result<(), AuthzError> {
    if session.active_tenant_id != session.membership.tenant_id {
        return Err(AuthzError::TenantMismatch);
    }

    if session
        .membership
        .permissions
        .iter()
        .any(|held| held.grants(required))
    {
        Ok(())
    } else {
        Err(AuthzError::Forbidden(required.as_str().to_string()))
    }
}

/// Predicate form: does `session` hold `<resource>.<action>`?
pub fn has_permission(session: &Session, resource: &str, action: &str) -> bool {
    authorize(session, &Permission::scoped(resource, action)).is_ok()
}

//! Domain error model.
//!
//! Business-rule failures are reported as a structured list of violations
//! (field path → message) so callers can render every problem at once.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type used across the domain layer.
pub type DomainResult<T> = Result<T, DomainError>;

/// Classification of a single business-rule violation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViolationKind {
    InvalidTransition,
    QuantityOutOfRange,
    ExpiredProduct,
    InvalidDateRange,
    EmptyReceiving,
    MissingDocumentType,
    PermissionDenied,
    /// Generic field validation (required value missing, malformed input).
    Invalid,
}

/// One violation, addressed by a field path such as `received_products[2].received_qty`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Violation {
    pub kind: ViolationKind,
    pub field: String,
    pub message: String,
}

impl Violation {
    pub fn new(kind: ViolationKind, field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind,
            field: field.into(),
            message: message.into(),
        }
    }
}

impl core::fmt::Display for Violation {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        if self.field.is_empty() {
            f.write_str(&self.message)
        } else {
            write!(f, "{}: {}", self.field, self.message)
        }
    }
}

/// Non-empty collection of violations gathered by a validator.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Violations(Vec<Violation>);

impl Violations {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, violation: Violation) {
        self.0.push(violation);
    }

    pub fn add(&mut self, kind: ViolationKind, field: impl Into<String>, message: impl Into<String>) {
        self.push(Violation::new(kind, field, message));
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Violation> {
        self.0.iter()
    }

    pub fn has_kind(&self, kind: ViolationKind) -> bool {
        self.0.iter().any(|v| v.kind == kind)
    }

    /// `Ok(())` when nothing was collected, otherwise a `Validation` error.
    pub fn into_result(self) -> DomainResult<()> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(DomainError::Validation(self))
        }
    }

    pub fn into_vec(self) -> Vec<Violation> {
        self.0
    }
}

impl From<Violation> for Violations {
    fn from(value: Violation) -> Self {
        Self(vec![value])
    }
}

impl core::fmt::Display for Violations {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        for (idx, v) in self.0.iter().enumerate() {
            if idx > 0 {
                f.write_str("; ")?;
            }
            core::fmt::Display::fmt(v, f)?;
        }
        Ok(())
    }
}

/// Domain-level error.
///
/// Keep this focused on deterministic, business/domain failures (validation,
/// invariants, conflicts). Infrastructure concerns belong elsewhere.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// The requested action is not legal from the aggregate's current state.
    #[error("invalid transition: cannot '{action}' from '{state}'")]
    InvalidTransition { state: String, action: String },

    /// The acting user lacks the named permission.
    #[error("permission denied: missing '{0}'")]
    PermissionDenied(String),

    /// One or more field-level validation failures.
    #[error("validation failed: {0}")]
    Validation(Violations),

    /// A domain invariant was violated.
    #[error("invariant violated: {0}")]
    InvariantViolation(String),

    /// An identifier was invalid (e.g. parse failure).
    #[error("invalid identifier: {0}")]
    InvalidId(String),

    /// A requested resource was not found (domain-level).
    #[error("not found")]
    NotFound,

    /// A conflict occurred (e.g. stale version / optimistic concurrency).
    #[error("conflict: {0}")]
    Conflict(String),
}

impl DomainError {
    /// Single generic validation failure on `field`.
    pub fn validation(field: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Validation(Violation::new(ViolationKind::Invalid, field, msg).into())
    }

    pub fn invalid_transition(state: impl core::fmt::Display, action: impl core::fmt::Display) -> Self {
        Self::InvalidTransition {
            state: state.to_string(),
            action: action.to_string(),
        }
    }

    pub fn permission_denied(permission: impl Into<String>) -> Self {
        Self::PermissionDenied(permission.into())
    }

    pub fn invariant(msg: impl Into<String>) -> Self {
        Self::InvariantViolation(msg.into())
    }

    pub fn invalid_id(msg: impl Into<String>) -> Self {
        Self::InvalidId(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    pub fn not_found() -> Self {
        Self::NotFound
    }

    /// Flatten any error into the structured list a caller renders.
    pub fn violations(&self) -> Vec<Violation> {
        match self {
            DomainError::Validation(v) => v.clone().into_vec(),
            DomainError::InvalidTransition { .. } => vec![Violation::new(
                ViolationKind::InvalidTransition,
                "status",
                self.to_string(),
            )],
            DomainError::PermissionDenied(_) => vec![Violation::new(
                ViolationKind::PermissionDenied,
                "",
                self.to_string(),
            )],
            other => vec![Violation::new(ViolationKind::Invalid, "", other.to_string())],
        }
    }

    /// True when the error carries (or is) a violation of `kind`.
    pub fn is_kind(&self, kind: ViolationKind) -> bool {
        self.violations().iter().any(|v| v.kind == kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_violations_are_ok() {
        assert_eq!(Violations::new().into_result(), Ok(()));
    }

    #[test]
    fn violations_render_every_entry() {
        let mut v = Violations::new();
        v.add(ViolationKind::ExpiredProduct, "received_products[0].expiry_date", "expired");
        v.add(ViolationKind::EmptyReceiving, "received_products", "nothing received");

        let err = v.into_result().unwrap_err();
        assert_eq!(
            err.to_string(),
            "validation failed: received_products[0].expiry_date: expired; received_products: nothing received"
        );
        assert!(err.is_kind(ViolationKind::ExpiredProduct));
        assert!(err.is_kind(ViolationKind::EmptyReceiving));
        assert_eq!(err.violations().len(), 2);
    }

    #[test]
    fn invalid_transition_names_state_and_action() {
        let err = DomainError::invalid_transition("draft", "approve");
        assert_eq!(err.to_string(), "invalid transition: cannot 'approve' from 'draft'");
        let violations = err.violations();
        assert_eq!(violations[0].kind, ViolationKind::InvalidTransition);
        assert_eq!(violations[0].field, "status");
    }

    #[test]
    fn violations_serialize_as_plain_list() {
        let v: Violations = Violation::new(ViolationKind::Invalid, "remarks", "required").into();
        let json = serde_json::to_value(&v).unwrap();
        assert_eq!(json[0]["kind"], "invalid");
        assert_eq!(json[0]["field"], "remarks");
    }
}

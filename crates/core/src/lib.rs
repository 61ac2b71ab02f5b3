//! `medprocure-core`: domain foundation building blocks.
//!
//! This crate contains **pure domain** primitives (no infrastructure concerns).

pub mod aggregate;
pub mod error;
pub mod id;

pub use aggregate::{Aggregate, AggregateRoot, ExpectedVersion};
pub use error::{DomainError, DomainResult, Violation, ViolationKind, Violations};
pub use id::{AggregateId, PrincipalId, ProductId, TenantId, UserId};

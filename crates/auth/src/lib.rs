//! `medprocure-auth`: pure authorization boundary.
//!
//! The session is an explicit value passed into every command; permission
//! checks are pure functions over it. No HTTP, no storage, no global state.

pub mod authorize;
pub mod permissions;
pub mod roles;
pub mod session;

pub use authorize::{AuthzError, authorize, has_permission};
pub use permissions::{Permission, resources};
pub use roles::{Role, RolePolicy};
pub use session::{Session, TenantMembership};

use std::borrow::Cow;
use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::permissions::{Permission, resources};

/// Role identifier used for RBAC.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Role(Cow<'static, str>);

impl Role {
    pub fn new(name: impl Into<Cow<'static, str>>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl core::fmt::Display for Role {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Role → permission mapping used to resolve a session's effective grants.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RolePolicy {
    grants: HashMap<Role, Vec<Permission>>,
}

impl RolePolicy {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn grant(mut self, role: Role, permissions: impl IntoIterator<Item = Permission>) -> Self {
        self.grants.entry(role).or_default().extend(permissions);
        self
    }

    pub fn permissions_for(&self, role: &Role) -> &[Permission] {
        self.grants.get(role).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Default roles for a distribution business.
    ///
    /// Approval is kept with managers; warehouse staff record receivings and QC
    /// officers own the inspection outcome.
    pub fn procurement_defaults() -> Self {
        use resources::{invoice_receiving as ir, purchase_orders as po};

        Self::new()
            .grant(Role::new("admin"), [Permission::from_static("*")])
            .grant(
                Role::new("purchase_manager"),
                [Permission::from_static("purchase_orders.*")],
            )
            .grant(
                Role::new("purchaser"),
                [po::CREATE, po::UPDATE, po::SUBMIT, po::CANCEL, po::SEND],
            )
            .grant(
                Role::new("warehouse"),
                [
                    ir::CREATE,
                    ir::UPDATE,
                    ir::SUBMIT,
                    ir::SUBMIT_QC,
                    ir::COMPLETE,
                    ir::DELETE,
                ],
            )
            .grant(Role::new("qc_officer"), [ir::QC_UPDATE, ir::REJECT])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn purchaser_cannot_approve() {
        let policy = RolePolicy::procurement_defaults();
        let perms = policy.permissions_for(&Role::new("purchaser"));
        assert!(perms.contains(&resources::purchase_orders::SUBMIT));
        assert!(!perms.iter().any(|p| p.grants(&resources::purchase_orders::APPROVE_LEVEL1)));
    }

    #[test]
    fn unknown_role_grants_nothing() {
        let policy = RolePolicy::procurement_defaults();
        assert!(policy.permissions_for(&Role::new("intern")).is_empty());
    }
}

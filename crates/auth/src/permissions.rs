use std::borrow::Cow;

use serde::{Deserialize, Serialize};

/// Permission identifier of the form `"<resource>.<action>"`.
///
/// Two wildcard shapes are understood by [`Permission::grants`]: `"*"` (every
/// permission) and `"<resource>.*"` (every action on one resource).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Permission(Cow<'static, str>);

impl Permission {
    pub fn new(name: impl Into<Cow<'static, str>>) -> Self {
        Self(name.into())
    }

    pub const fn from_static(name: &'static str) -> Self {
        Self(Cow::Borrowed(name))
    }

    /// Build `"<resource>.<action>"`.
    pub fn scoped(resource: &str, action: &str) -> Self {
        Self(Cow::Owned(format!("{resource}.{action}")))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_wildcard(&self) -> bool {
        self.as_str() == "*"
    }

    pub fn resource(&self) -> Option<&str> {
        self.as_str().rsplit_once('.').map(|(r, _)| r)
    }

    pub fn action(&self) -> Option<&str> {
        self.as_str().rsplit_once('.').map(|(_, a)| a)
    }

    /// Whether holding `self` satisfies a requirement for `required`.
    pub fn grants(&self, required: &Permission) -> bool {
        if self.is_wildcard() || self == required {
            return true;
        }
        match (self.as_str().strip_suffix(".*"), required.resource()) {
            (Some(resource), Some(required_resource)) => resource == required_resource,
            _ => false,
        }
    }
}

impl core::fmt::Display for Permission {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Resource names and the permissions the procurement workflow checks.
pub mod resources {
    use super::Permission;

    pub const PURCHASE_ORDERS: &str = "purchase_orders";
    pub const INVOICE_RECEIVING: &str = "invoice_receiving";

    pub mod purchase_orders {
        use super::Permission;

        pub const CREATE: Permission = Permission::from_static("purchase_orders.create");
        pub const UPDATE: Permission = Permission::from_static("purchase_orders.update");
        pub const SUBMIT: Permission = Permission::from_static("purchase_orders.submit");
        pub const APPROVE_LEVEL1: Permission =
            Permission::from_static("purchase_orders.approve_level1");
        pub const REJECT: Permission = Permission::from_static("purchase_orders.reject");
        pub const CANCEL: Permission = Permission::from_static("purchase_orders.cancel");
        pub const SEND: Permission = Permission::from_static("purchase_orders.send");
        pub const COMPLETE: Permission = Permission::from_static("purchase_orders.complete");
    }

    pub mod invoice_receiving {
        use super::Permission;

        pub const CREATE: Permission = Permission::from_static("invoice_receiving.create");
        pub const UPDATE: Permission = Permission::from_static("invoice_receiving.update");
        pub const SUBMIT: Permission = Permission::from_static("invoice_receiving.submit");
        pub const SUBMIT_QC: Permission = Permission::from_static("invoice_receiving.submit_qc");
        pub const QC_UPDATE: Permission = Permission::from_static("invoice_receiving.qc_update");
        pub const COMPLETE: Permission = Permission::from_static("invoice_receiving.complete");
        pub const REJECT: Permission = Permission::from_static("invoice_receiving.reject");
        pub const DELETE: Permission = Permission::from_static("invoice_receiving.delete");
    }

    /// Every permission checked by the workflow, for registry/role seeding.
    pub fn all() -> Vec<Permission> {
        vec![
            purchase_orders::CREATE,
            purchase_orders::UPDATE,
            purchase_orders::SUBMIT,
            purchase_orders::APPROVE_LEVEL1,
            purchase_orders::REJECT,
            purchase_orders::CANCEL,
            purchase_orders::SEND,
            purchase_orders::COMPLETE,
            invoice_receiving::CREATE,
            invoice_receiving::UPDATE,
            invoice_receiving::SUBMIT,
            invoice_receiving::SUBMIT_QC,
            invoice_receiving::QC_UPDATE,
            invoice_receiving::COMPLETE,
            invoice_receiving::REJECT,
            invoice_receiving::DELETE,
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scoped_permission_splits_into_resource_and_action() {
        let p = Permission::scoped("purchase_orders", "approve_level1");
        assert_eq!(p, resources::purchase_orders::APPROVE_LEVEL1);
        assert_eq!(p.resource(), Some("purchase_orders"));
        assert_eq!(p.action(), Some("approve_level1"));
    }

    #[test]
    fn resource_wildcard_grants_only_its_resource() {
        let held = Permission::from_static("purchase_orders.*");
        assert!(held.grants(&resources::purchase_orders::SEND));
        assert!(!held.grants(&resources::invoice_receiving::QC_UPDATE));
        assert!(Permission::from_static("*").grants(&resources::invoice_receiving::QC_UPDATE));
    }

    #[test]
    fn every_known_permission_belongs_to_a_known_resource() {
        for p in resources::all() {
            assert!(
                matches!(
                    p.resource(),
                    Some(resources::PURCHASE_ORDERS) | Some(resources::INVOICE_RECEIVING)
                ),
                "unexpected resource in {p}"
            );
        }
    }
}

use serde::{Deserialize, Serialize};

use medprocure_core::{TenantId, UserId};

use crate::{Permission, Role, RolePolicy};

/// A user's membership in a tenant: which roles and permissions apply there.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TenantMembership {
    pub tenant_id: TenantId,
    pub roles: Vec<Role>,
    pub permissions: Vec<Permission>,
}

/// Explicit request context: who is acting, in which tenant, with what grants.
///
/// Built once at the boundary and passed by value into every command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub user_id: UserId,
    pub active_tenant_id: TenantId,
    pub membership: TenantMembership,
}

impl Session {
    pub fn new(user_id: UserId, active_tenant_id: TenantId, membership: TenantMembership) -> Self {
        Self {
            user_id,
            active_tenant_id,
            membership,
        }
    }

    /// Resolve effective permissions from roles using `policy`.
    pub fn with_roles(
        user_id: UserId,
        tenant_id: TenantId,
        roles: Vec<Role>,
        policy: &RolePolicy,
    ) -> Self {
        let mut permissions: Vec<Permission> = Vec::new();
        for role in &roles {
            for p in policy.permissions_for(role) {
                if !permissions.contains(p) {
                    permissions.push(p.clone());
                }
            }
        }

        Self::new(
            user_id,
            tenant_id,
            TenantMembership {
                tenant_id,
                roles,
                permissions,
            },
        )
    }

    /// Session holding exactly `permissions` (no roles).
    pub fn with_permissions(
        user_id: UserId,
        tenant_id: TenantId,
        permissions: impl IntoIterator<Item = Permission>,
    ) -> Self {
        Self::new(
            user_id,
            tenant_id,
            TenantMembership {
                tenant_id,
                roles: Vec::new(),
                permissions: permissions.into_iter().collect(),
            },
        )
    }

    pub fn tenant_id(&self) -> TenantId {
        self.active_tenant_id
    }
}

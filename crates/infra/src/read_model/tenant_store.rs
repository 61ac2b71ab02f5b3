use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Arc, RwLock};

use medprocure_core::TenantId;

/// Tenant-isolated key/value storage for disposable read models.
///
/// Every operation takes the tenant explicitly; no call can observe or touch
/// another tenant's rows.
pub trait TenantStore<K, V>: Send + Sync {
    fn get(&self, tenant_id: TenantId, key: &K) -> Option<V>;
    fn upsert(&self, tenant_id: TenantId, key: K, value: V);
    /// Drop one row. Returns the removed value, if any.
    fn remove(&self, tenant_id: TenantId, key: &K) -> Option<V>;
    fn list(&self, tenant_id: TenantId) -> Vec<V>;
    /// Clear every row of a tenant (rebuild support).
    fn clear_tenant(&self, tenant_id: TenantId);
}

impl<K, V, S> TenantStore<K, V> for Arc<S>
where
    S: TenantStore<K, V> + ?Sized,
{
    fn get(&self, tenant_id: TenantId, key: &K) -> Option<V> {
        (**self).get(tenant_id, key)
    }

    fn upsert(&self, tenant_id: TenantId, key: K, value: V) {
        (**self).upsert(tenant_id, key, value)
    }

    fn remove(&self, tenant_id: TenantId, key: &K) -> Option<V> {
        (**self).remove(tenant_id, key)
    }

    fn list(&self, tenant_id: TenantId) -> Vec<V> {
        (**self).list(tenant_id)
    }

    fn clear_tenant(&self, tenant_id: TenantId) {
        (**self).clear_tenant(tenant_id)
    }
}

/// `RwLock<HashMap>` backed store keyed by `(tenant, key)`.
#[derive(Debug)]
pub struct InMemoryTenantStore<K, V> {
    rows: RwLock<HashMap<(TenantId, K), V>>,
}

impl<K, V> InMemoryTenantStore<K, V> {
    pub fn new() -> Self {
        Self {
            rows: RwLock::new(HashMap::new()),
        }
    }
}

impl<K, V> Default for InMemoryTenantStore<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V> TenantStore<K, V> for InMemoryTenantStore<K, V>
where
    K: Clone + Eq + Hash + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    fn get(&self, tenant_id: TenantId, key: &K) -> Option<V> {
        let rows = self.rows.read().ok()?;
        rows.get(&(tenant_id, key.clone())).cloned()
    }

    fn upsert(&self, tenant_id: TenantId, key: K, value: V) {
        if let Ok(mut rows) = self.rows.write() {
            rows.insert((tenant_id, key), value);
        }
    }

    fn remove(&self, tenant_id: TenantId, key: &K) -> Option<V> {
        let mut rows = self.rows.write().ok()?;
        rows.remove(&(tenant_id, key.clone()))
    }

    fn list(&self, tenant_id: TenantId) -> Vec<V> {
        let Ok(rows) = self.rows.read() else {
            return vec![];
        };
        rows.iter()
            .filter(|((t, _), _)| *t == tenant_id)
            .map(|(_, v)| v.clone())
            .collect()
    }

    fn clear_tenant(&self, tenant_id: TenantId) {
        if let Ok(mut rows) = self.rows.write() {
            rows.retain(|(t, _), _| *t != tenant_id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rows_never_leak_across_tenants() {
        let store: InMemoryTenantStore<&'static str, u32> = InMemoryTenantStore::new();
        let (a, b) = (TenantId::new(), TenantId::new());

        store.upsert(a, "ACME", 1);
        store.upsert(b, "ACME", 2);

        assert_eq!(store.get(a, &"ACME"), Some(1));
        assert_eq!(store.get(b, &"ACME"), Some(2));
        assert_eq!(store.list(a), vec![1]);

        assert_eq!(store.remove(a, &"ACME"), Some(1));
        assert_eq!(store.get(a, &"ACME"), None);
        assert_eq!(store.get(b, &"ACME"), Some(2));

        store.clear_tenant(b);
        assert!(store.list(b).is_empty());
    }
}

//! Daily PO-number sequences.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::NaiveDate;

use medprocure_core::TenantId;

/// Hands out `1, 2, 3, ...` per (tenant, principal code, date).
pub trait SequenceAllocator: Send + Sync {
    fn next(&self, tenant_id: TenantId, principal_code: &str, date: NaiveDate) -> Result<u32, SequenceError>;
}

#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
pub enum SequenceError {
    #[error("sequence exhausted for {0}")]
    Exhausted(String),
    #[error("sequence allocator unavailable")]
    Unavailable,
}

impl<S> SequenceAllocator for Arc<S>
where
    S: SequenceAllocator + ?Sized,
{
    fn next(&self, tenant_id: TenantId, principal_code: &str, date: NaiveDate) -> Result<u32, SequenceError> {
        (**self).next(tenant_id, principal_code, date)
    }
}

#[derive(Debug, Default)]
pub struct InMemorySequenceAllocator {
    counters: Mutex<HashMap<(TenantId, String, NaiveDate), u32>>,
}

impl InMemorySequenceAllocator {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SequenceAllocator for InMemorySequenceAllocator {
    fn next(&self, tenant_id: TenantId, principal_code: &str, date: NaiveDate) -> Result<u32, SequenceError> {
        let mut counters = self.counters.lock().map_err(|_| SequenceError::Unavailable)?;
        let counter = counters
            .entry((tenant_id, principal_code.to_string(), date))
            .or_insert(0);
        *counter = counter
            .checked_add(1)
            .ok_or_else(|| SequenceError::Exhausted(format!("{principal_code}/{date}")))?;
        Ok(*counter)
    }
}

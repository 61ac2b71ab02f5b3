use std::collections::HashMap;
use std::sync::RwLock;

use chrono::NaiveDate;
use serde_json::Value as JsonValue;
use thiserror::Error;

use medprocure_core::{AggregateId, TenantId};
use medprocure_events::EventEnvelope;
use medprocure_purchasing::PurchaseOrderId;
use medprocure_receiving::{InvoiceReceivingEvent, InvoiceReceivingId, QcSummary, ReceivingStatus};

use crate::read_model::TenantStore;
use crate::service::RECEIVING_AGGREGATE_TYPE;

/// One receiving as listed under its purchase order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceivingListing {
    pub receiving_id: InvoiceReceivingId,
    pub purchase_order_id: PurchaseOrderId,
    pub invoice_number: String,
    pub received_date: NaiveDate,
    pub qc_required: bool,
    pub status: ReceivingStatus,
    pub qc_summary: QcSummary,
}

#[derive(Debug, Error)]
pub enum ReceivingsProjectionError {
    #[error("failed to deserialize receiving event: {0}")]
    Deserialize(String),
    #[error("tenant isolation violation: {0}")]
    TenantIsolation(String),
    #[error("non-monotonic sequence number (last={last}, found={found})")]
    NonMonotonicSequence { last: u64, found: u64 },
}

/// Index of receivings per purchase order.
///
/// Deleted receivings leave the index; rejected ones stay listed with their
/// status. Replays of already-applied sequence numbers are ignored.
#[derive(Debug)]
pub struct ReceivingsByOrderProjection<S>
where
    S: TenantStore<InvoiceReceivingId, ReceivingListing>,
{
    store: S,
    cursors: RwLock<HashMap<(TenantId, AggregateId), u64>>,
}

impl<S> ReceivingsByOrderProjection<S>
where
    S: TenantStore<InvoiceReceivingId, ReceivingListing>,
{
    pub fn new(store: S) -> Self {
        Self {
            store,
            cursors: RwLock::new(HashMap::new()),
        }
    }

    pub fn get(&self, tenant_id: TenantId, receiving_id: &InvoiceReceivingId) -> Option<ReceivingListing> {
        self.store.get(tenant_id, receiving_id)
    }

    /// Receivings of one order, oldest received date first.
    pub fn for_order(&self, tenant_id: TenantId, order_id: PurchaseOrderId) -> Vec<ReceivingListing> {
        let mut listings: Vec<_> = self
            .store
            .list(tenant_id)
            .into_iter()
            .filter(|l| l.purchase_order_id == order_id)
            .collect();
        listings.sort_by(|a, b| {
            (a.received_date, &a.invoice_number, *a.receiving_id.0.as_uuid())
                .cmp(&(b.received_date, &b.invoice_number, *b.receiving_id.0.as_uuid()))
        });
        listings
    }

    fn cursor(&self, tenant_id: TenantId, aggregate_id: AggregateId) -> u64 {
        self.cursors
            .read()
            .ok()
            .and_then(|c| c.get(&(tenant_id, aggregate_id)).copied())
            .unwrap_or(0)
    }

    fn advance(&self, tenant_id: TenantId, aggregate_id: AggregateId, seq: u64) {
        if let Ok(mut cursors) = self.cursors.write() {
            cursors.insert((tenant_id, aggregate_id), seq);
        }
    }

    pub fn apply_envelope(&self, envelope: &EventEnvelope<JsonValue>) -> Result<(), ReceivingsProjectionError> {
        if envelope.aggregate_type() != RECEIVING_AGGREGATE_TYPE {
            return Ok(());
        }

        let tenant_id = envelope.tenant_id();
        let aggregate_id = envelope.aggregate_id();
        let seq = envelope.sequence_number();

        let last = self.cursor(tenant_id, aggregate_id);
        if seq == 0 {
            return Err(ReceivingsProjectionError::NonMonotonicSequence { last, found: seq });
        }
        if seq <= last {
            return Ok(());
        }
        if seq != last + 1 {
            return Err(ReceivingsProjectionError::NonMonotonicSequence { last, found: seq });
        }

        let ev: InvoiceReceivingEvent = serde_json::from_value(envelope.payload().clone())
            .map_err(|e| ReceivingsProjectionError::Deserialize(e.to_string()))?;

        let (event_tenant, receiving_id) = event_target(&ev);
        if event_tenant != tenant_id {
            return Err(ReceivingsProjectionError::TenantIsolation(
                "event tenant_id does not match envelope tenant_id".to_string(),
            ));
        }
        if receiving_id.0 != aggregate_id {
            return Err(ReceivingsProjectionError::TenantIsolation(
                "event receiving_id does not match envelope aggregate_id".to_string(),
            ));
        }

        match ev {
            InvoiceReceivingEvent::ReceivingCreated(e) => {
                self.store.upsert(
                    tenant_id,
                    receiving_id,
                    ReceivingListing {
                        receiving_id,
                        purchase_order_id: e.purchase_order_id,
                        invoice_number: e.invoice_number,
                        received_date: e.received_date,
                        qc_required: e.qc_required,
                        status: ReceivingStatus::Draft,
                        qc_summary: QcSummary::Pending,
                    },
                );
            }
            InvoiceReceivingEvent::ReceivingDeleted(_) => {
                self.store.remove(tenant_id, &receiving_id);
            }
            other => self.update_listing(tenant_id, receiving_id, |listing| match other {
                InvoiceReceivingEvent::ReceivingUpdated(e) => {
                    listing.invoice_number = e.invoice_number;
                    listing.received_date = e.received_date;
                    listing.qc_required = e.qc_required;
                }
                InvoiceReceivingEvent::ReceivingSubmitted(_) => listing.status = ReceivingStatus::Submitted,
                InvoiceReceivingEvent::ReceivingSentToQc(_) => listing.status = ReceivingStatus::QcPending,
                InvoiceReceivingEvent::QcStatusUpdated(e) => listing.qc_summary = e.summary,
                InvoiceReceivingEvent::ReceivingCompleted(_) => listing.status = ReceivingStatus::Completed,
                InvoiceReceivingEvent::ReceivingRejected(_) => listing.status = ReceivingStatus::Rejected,
                InvoiceReceivingEvent::ReceivingCreated(_) | InvoiceReceivingEvent::ReceivingDeleted(_) => {}
            }),
        }

        self.advance(tenant_id, aggregate_id, seq);
        Ok(())
    }

    fn update_listing(
        &self,
        tenant_id: TenantId,
        receiving_id: InvoiceReceivingId,
        change: impl FnOnce(&mut ReceivingListing),
    ) {
        // Events for a receiving deleted out of the index are dropped.
        if let Some(mut listing) = self.store.get(tenant_id, &receiving_id) {
            change(&mut listing);
            self.store.upsert(tenant_id, receiving_id, listing);
        }
    }

    /// Bring one receiving up to date from its full stream; events already
    /// applied are skipped.
    pub fn catch_up(
        &self,
        stream: impl IntoIterator<Item = EventEnvelope<JsonValue>>,
    ) -> Result<(), ReceivingsProjectionError> {
        let mut envs: Vec<_> = stream.into_iter().collect();
        envs.sort_by_key(|e| e.sequence_number());
        for env in &envs {
            self.apply_envelope(env)?;
        }
        Ok(())
    }

    /// Clear the affected tenants and replay `envelopes` in stream order.
    pub fn rebuild_from_scratch(
        &self,
        envelopes: impl IntoIterator<Item = EventEnvelope<JsonValue>>,
    ) -> Result<(), ReceivingsProjectionError> {
        let mut envs: Vec<_> = envelopes.into_iter().collect();

        let mut tenants: Vec<TenantId> = envs.iter().map(|e| e.tenant_id()).collect();
        tenants.sort_by_key(|t| *t.as_uuid());
        tenants.dedup();
        for tenant_id in tenants {
            self.store.clear_tenant(tenant_id);
            if let Ok(mut cursors) = self.cursors.write() {
                cursors.retain(|(t, _), _| *t != tenant_id);
            }
        }

        envs.sort_by_key(|e| (*e.tenant_id().as_uuid(), *e.aggregate_id().as_uuid(), e.sequence_number()));
        for env in &envs {
            self.apply_envelope(env)?;
        }
        Ok(())
    }
}

fn event_target(ev: &InvoiceReceivingEvent) -> (TenantId, InvoiceReceivingId) {
    match ev {
        InvoiceReceivingEvent::ReceivingCreated(e) => (e.tenant_id, e.receiving_id),
        InvoiceReceivingEvent::ReceivingUpdated(e) => (e.tenant_id, e.receiving_id),
        InvoiceReceivingEvent::ReceivingSubmitted(e) => (e.tenant_id, e.receiving_id),
        InvoiceReceivingEvent::ReceivingSentToQc(e) => (e.tenant_id, e.receiving_id),
        InvoiceReceivingEvent::QcStatusUpdated(e) => (e.tenant_id, e.receiving_id),
        InvoiceReceivingEvent::ReceivingCompleted(e) => (e.tenant_id, e.receiving_id),
        InvoiceReceivingEvent::ReceivingRejected(e) => (e.tenant_id, e.receiving_id),
        InvoiceReceivingEvent::ReceivingDeleted(e) => (e.tenant_id, e.receiving_id),
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use uuid::Uuid;

    use medprocure_core::UserId;
    use medprocure_receiving::{ReceivingCreated, ReceivingDeleted, ReceivingSubmitted};

    use super::*;
    use crate::read_model::InMemoryTenantStore;

    type Projection = ReceivingsByOrderProjection<InMemoryTenantStore<InvoiceReceivingId, ReceivingListing>>;

    fn envelope(tenant_id: TenantId, receiving_id: InvoiceReceivingId, seq: u64, ev: &InvoiceReceivingEvent) -> EventEnvelope<JsonValue> {
        EventEnvelope::new(
            Uuid::now_v7(),
            tenant_id,
            receiving_id.0,
            RECEIVING_AGGREGATE_TYPE.to_string(),
            "receiving.test".to_string(),
            seq,
            serde_json::to_value(ev).unwrap(),
        )
    }

    fn created(tenant_id: TenantId, receiving_id: InvoiceReceivingId, order: PurchaseOrderId, invoice: &str, day: u32) -> InvoiceReceivingEvent {
        InvoiceReceivingEvent::ReceivingCreated(ReceivingCreated {
            tenant_id,
            receiving_id,
            purchase_order_id: order,
            po_version: 3,
            invoice_number: invoice.to_string(),
            received_date: NaiveDate::from_ymd_opt(2024, 3, day).unwrap(),
            received_products: vec![],
            documents: vec![],
            qc_required: false,
            created_by: UserId::new(),
            occurred_at: Utc::now(),
        })
    }

    #[test]
    fn lists_receivings_per_order_and_drops_deleted_ones() {
        let projection = Projection::new(InMemoryTenantStore::new());
        let tenant = TenantId::new();
        let order = PurchaseOrderId::new(AggregateId::new());
        let (first, second) = (
            InvoiceReceivingId::new(AggregateId::new()),
            InvoiceReceivingId::new(AggregateId::new()),
        );

        projection
            .apply_envelope(&envelope(tenant, second, 1, &created(tenant, second, order, "INV-2", 9)))
            .unwrap();
        projection
            .apply_envelope(&envelope(tenant, first, 1, &created(tenant, first, order, "INV-1", 2)))
            .unwrap();

        let submitted = InvoiceReceivingEvent::ReceivingSubmitted(ReceivingSubmitted {
            tenant_id: tenant,
            receiving_id: first,
            submitted_by: UserId::new(),
            occurred_at: Utc::now(),
        });
        projection.apply_envelope(&envelope(tenant, first, 2, &submitted)).unwrap();
        // Redelivery is a no-op.
        projection.apply_envelope(&envelope(tenant, first, 2, &submitted)).unwrap();

        let listed = projection.for_order(tenant, order);
        assert_eq!(
            listed.iter().map(|l| l.invoice_number.as_str()).collect::<Vec<_>>(),
            vec!["INV-1", "INV-2"]
        );
        assert_eq!(listed[0].status, ReceivingStatus::Submitted);
        assert!(projection.for_order(TenantId::new(), order).is_empty());

        let deleted = InvoiceReceivingEvent::ReceivingDeleted(ReceivingDeleted {
            tenant_id: tenant,
            receiving_id: second,
            deleted_by: UserId::new(),
            occurred_at: Utc::now(),
        });
        projection.apply_envelope(&envelope(tenant, second, 2, &deleted)).unwrap();
        assert_eq!(projection.for_order(tenant, order).len(), 1);
        assert!(projection.get(tenant, &second).is_none());
    }

    #[test]
    fn gaps_and_foreign_tenants_are_refused() {
        let projection = Projection::new(InMemoryTenantStore::new());
        let tenant = TenantId::new();
        let order = PurchaseOrderId::new(AggregateId::new());
        let id = InvoiceReceivingId::new(AggregateId::new());

        let err = projection
            .apply_envelope(&envelope(TenantId::new(), id, 1, &created(tenant, id, order, "INV-1", 1)))
            .unwrap_err();
        assert!(matches!(err, ReceivingsProjectionError::TenantIsolation(_)));

        projection
            .apply_envelope(&envelope(tenant, id, 1, &created(tenant, id, order, "INV-1", 1)))
            .unwrap();
        let err = projection
            .apply_envelope(&envelope(tenant, id, 5, &created(tenant, id, order, "INV-1", 1)))
            .unwrap_err();
        assert!(matches!(err, ReceivingsProjectionError::NonMonotonicSequence { last: 1, found: 5 }));
    }

    #[test]
    fn catch_up_recovers_from_a_skipped_event() {
        let projection = Projection::new(InMemoryTenantStore::new());
        let tenant = TenantId::new();
        let order = PurchaseOrderId::new(AggregateId::new());
        let id = InvoiceReceivingId::new(AggregateId::new());

        let stream = vec![
            envelope(tenant, id, 1, &created(tenant, id, order, "INV-3", 6)),
            envelope(
                tenant,
                id,
                2,
                &InvoiceReceivingEvent::ReceivingSubmitted(ReceivingSubmitted {
                    tenant_id: tenant,
                    receiving_id: id,
                    submitted_by: UserId::new(),
                    occurred_at: Utc::now(),
                }),
            ),
            envelope(
                tenant,
                id,
                3,
                &InvoiceReceivingEvent::ReceivingDeleted(ReceivingDeleted {
                    tenant_id: tenant,
                    receiving_id: id,
                    deleted_by: UserId::new(),
                    occurred_at: Utc::now(),
                }),
            ),
        ];

        projection.apply_envelope(&stream[0]).unwrap();
        let err = projection.apply_envelope(&stream[2]).unwrap_err();
        assert!(matches!(err, ReceivingsProjectionError::NonMonotonicSequence { last: 1, found: 3 }));
        assert!(projection.get(tenant, &id).is_some());

        projection.catch_up(stream.iter().rev().cloned()).unwrap();
        assert!(projection.get(tenant, &id).is_none());

        // The late delivery of seq 2 is now a replay.
        projection.apply_envelope(&stream[1]).unwrap();
        assert!(projection.for_order(tenant, order).is_empty());
    }

    #[test]
    fn a_stream_must_start_at_its_first_event() {
        let projection = Projection::new(InMemoryTenantStore::new());
        let tenant = TenantId::new();
        let id = InvoiceReceivingId::new(AggregateId::new());
        let submitted = InvoiceReceivingEvent::ReceivingSubmitted(ReceivingSubmitted {
            tenant_id: tenant,
            receiving_id: id,
            submitted_by: UserId::new(),
            occurred_at: Utc::now(),
        });

        let err = projection.apply_envelope(&envelope(tenant, id, 2, &submitted)).unwrap_err();
        assert!(matches!(err, ReceivingsProjectionError::NonMonotonicSequence { last: 0, found: 2 }));
    }

    #[test]
    fn rebuild_replays_out_of_order_input() {
        let projection = Projection::new(InMemoryTenantStore::new());
        let tenant = TenantId::new();
        let order = PurchaseOrderId::new(AggregateId::new());
        let id = InvoiceReceivingId::new(AggregateId::new());

        let submitted = InvoiceReceivingEvent::ReceivingSubmitted(ReceivingSubmitted {
            tenant_id: tenant,
            receiving_id: id,
            submitted_by: UserId::new(),
            occurred_at: Utc::now(),
        });
        projection
            .rebuild_from_scratch(vec![
                envelope(tenant, id, 2, &submitted),
                envelope(tenant, id, 1, &created(tenant, id, order, "INV-7", 4)),
            ])
            .unwrap();

        let listing = projection.get(tenant, &id).unwrap();
        assert_eq!(listing.status, ReceivingStatus::Submitted);
        assert_eq!(listing.invoice_number, "INV-7");
    }
}

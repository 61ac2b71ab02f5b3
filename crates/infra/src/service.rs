//! Procurement orchestration.
//!
//! [`ProcurementService`] is the one place where the two aggregates meet:
//!
//! ```text
//! receiving command
//!   ↓
//! 0. take the purchase order's lock
//!   ↓
//! 1. PO version / stage pre-checks, live snapshot of the PO lines
//!   ↓
//! 2. dispatch to the invoice receiving
//!   ↓
//! 3. recompute receipts from every counting receiving, dispatch SyncReceipts
//! ```
//!
//! Every write that touches a purchase order or one of its receivings holds
//! that order's lock from the first read to the last append, so the PO version
//! handed out with a [`ReceivingForm`] is checked against the state the
//! receiving is committed on.
//!
//! Side effects (PO email on `send`) run after commit; their failures surface as
//! [`SideEffectWarning`]s and never undo the transition.

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};

use anyhow::Context;
use chrono::{DateTime, Utc};
use serde_json::Value as JsonValue;
use thiserror::Error;
use tracing::{info, instrument, warn};

use medprocure_auth::{Session, resources::purchase_orders};
use medprocure_core::{
    AggregateId, AggregateRoot, DomainError, ExpectedVersion, TenantId, Violation, ViolationKind,
    Violations,
};
use medprocure_events::{EventBus, EventEnvelope, InMemoryEventBus, Subscription};
use medprocure_purchasing::{
    AddLine, CreatePurchaseOrder, LineInput, OrderTotals, PoNumber, PrincipalRef, PurchaseOrder,
    PurchaseOrderCommand, PurchaseOrderId, ReceiptEntry, Reconciliation, RemoveLine, Stage,
    SyncReceipts, Transition, UpdateLine, WorkflowAction, WorkflowRequest,
    normalize_principal_code, validate_order_lines,
};
use medprocure_receiving::{
    CompleteReceiving, CreateReceiving, DeleteReceiving, InvoiceReceiving, InvoiceReceivingCommand,
    InvoiceReceivingId, PoLineSnapshot, QcStatus, ReceivingInput, RejectReceiving, SubmitReceiving,
    SubmitToQc, UpdateQcStatus, UpdateReceiving,
};

use crate::command_dispatcher::{CommandDispatcher, DispatchError};
use crate::config::{OverReceiptPolicy, ProcurementConfig};
use crate::event_store::{EventStore, InMemoryEventStore, StoredEvent};
use crate::notify::{
    InMemoryPrincipalDirectory, Notifier, PrincipalDirectory, TracingNotifier, purchase_order_email,
};
use crate::projections::{ReceivingListing, ReceivingsByOrderProjection, ReceivingsProjectionError};
use crate::read_model::InMemoryTenantStore;
use crate::sequence::{InMemorySequenceAllocator, SequenceAllocator, SequenceError};

pub const ORDER_AGGREGATE_TYPE: &str = "purchasing.order";
pub const RECEIVING_AGGREGATE_TYPE: &str = "receiving.invoice";

type Bus = Arc<InMemoryEventBus<EventEnvelope<JsonValue>>>;
type ReceivingsIndex = ReceivingsByOrderProjection<InMemoryTenantStore<InvoiceReceivingId, ReceivingListing>>;

#[derive(Debug, Error)]
pub enum ServiceError {
    /// A rule of the purchase order or receiving refused the request.
    #[error(transparent)]
    Domain(DomainError),

    #[error(transparent)]
    Dispatch(DispatchError),

    #[error(transparent)]
    Sequence(#[from] SequenceError),

    #[error(transparent)]
    Projection(#[from] ReceivingsProjectionError),
}

impl From<DomainError> for ServiceError {
    fn from(value: DomainError) -> Self {
        ServiceError::Domain(value)
    }
}

impl From<DispatchError> for ServiceError {
    fn from(value: DispatchError) -> Self {
        match value {
            DispatchError::Domain(e) => ServiceError::Domain(e),
            other => ServiceError::Dispatch(other),
        }
    }
}

impl ServiceError {
    pub fn domain(&self) -> Option<&DomainError> {
        match self {
            ServiceError::Domain(e) => Some(e),
            _ => None,
        }
    }

    /// Structured violations for form display (empty for infrastructure errors).
    pub fn violations(&self) -> Vec<Violation> {
        self.domain().map(DomainError::violations).unwrap_or_default()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WarningKind {
    /// The notifier refused the purchase-order email.
    EmailFailed,
    /// No email was attempted (disabled, or nobody to send to).
    EmailSkipped,
    /// A PO line has received more than was ordered.
    OverReceipt,
}

/// Something that went wrong after the change was committed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SideEffectWarning {
    pub kind: WarningKind,
    pub message: String,
}

impl SideEffectWarning {
    fn new(kind: WarningKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct TransitionOutcome {
    pub order: PurchaseOrder,
    pub warnings: Vec<SideEffectWarning>,
}

#[derive(Debug, Clone)]
pub struct ReceivingOutcome {
    pub receiving: InvoiceReceiving,
    /// The purchase order after receipts were re-synchronised.
    pub order: PurchaseOrder,
    pub warnings: Vec<SideEffectWarning>,
}

/// Purchase order as shown on its detail page.
#[derive(Debug, Clone)]
pub struct PurchaseOrderView {
    pub order: PurchaseOrder,
    pub totals: OrderTotals,
    pub reconciliation: Reconciliation,
    pub receivings: Vec<ReceivingListing>,
}

/// Pre-fill data for a new receiving.
///
/// `po_version` must be sent back with the receiving; a PO that moved on in
/// between makes the receiving fail with `Conflict`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceivingForm {
    pub purchase_order_id: PurchaseOrderId,
    pub po_number: String,
    pub po_version: u64,
    pub stage: Stage,
    pub lines: Vec<PoLineSnapshot>,
}

/// One mutex per purchase order.
#[derive(Debug, Default)]
struct OrderLocks {
    locks: Mutex<HashMap<(TenantId, AggregateId), Arc<Mutex<()>>>>,
}

impl OrderLocks {
    fn run<T>(&self, tenant_id: TenantId, order_id: PurchaseOrderId, f: impl FnOnce() -> T) -> T {
        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
            Arc::clone(locks.entry((tenant_id, order_id.0)).or_default())
        };
        let _held = lock.lock().unwrap_or_else(PoisonError::into_inner);
        f()
    }
}

pub struct ProcurementService {
    dispatcher: CommandDispatcher<InMemoryEventStore, Bus>,
    receivings: ReceivingsIndex,
    order_locks: OrderLocks,
    sequences: Arc<dyn SequenceAllocator>,
    principals: Arc<dyn PrincipalDirectory>,
    notifier: Arc<dyn Notifier>,
    config: ProcurementConfig,
}

impl ProcurementService {
    /// In-memory store and bus, log-only notifier, empty principal directory.
    pub fn in_memory(config: ProcurementConfig) -> Self {
        Self {
            dispatcher: CommandDispatcher::new(InMemoryEventStore::new(), Arc::new(InMemoryEventBus::new())),
            receivings: ReceivingsByOrderProjection::new(InMemoryTenantStore::new()),
            order_locks: OrderLocks::default(),
            sequences: Arc::new(InMemorySequenceAllocator::new()),
            principals: Arc::new(InMemoryPrincipalDirectory::new()),
            notifier: Arc::new(TracingNotifier),
            config,
        }
    }

    /// Load configuration, install logging and build an in-memory service.
    pub fn bootstrap(config_file: Option<&Path>) -> anyhow::Result<Self> {
        let config = ProcurementConfig::load(config_file).context("loading procurement config")?;
        medprocure_observability::init(&config.log);
        info!(prefix = %config.po_number.prefix, policy = ?config.receiving.over_receipt_policy, "procurement service starting");
        Ok(Self::in_memory(config))
    }

    pub fn with_sequences(mut self, sequences: Arc<dyn SequenceAllocator>) -> Self {
        self.sequences = sequences;
        self
    }

    pub fn with_principals(mut self, principals: Arc<dyn PrincipalDirectory>) -> Self {
        self.principals = principals;
        self
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn config(&self) -> &ProcurementConfig {
        &self.config
    }

    pub fn event_store(&self) -> &InMemoryEventStore {
        self.dispatcher.store()
    }

    /// Every committed envelope from now on.
    pub fn subscribe(&self) -> Subscription<EventEnvelope<JsonValue>> {
        self.dispatcher.bus().subscribe()
    }

    // ---- purchase orders -------------------------------------------------

    #[instrument(skip_all, fields(tenant = %session.tenant_id(), principal = %principal.code))]
    pub fn create_purchase_order(
        &self,
        session: &Session,
        principal: PrincipalRef,
        lines: Vec<LineInput>,
        occurred_at: DateTime<Utc>,
    ) -> Result<PurchaseOrder, ServiceError> {
        // Checked here as well so a refused request does not burn a sequence number.
        medprocure_auth::authorize(session, &purchase_orders::CREATE).map_err(DomainError::from)?;
        validate_order_lines(&lines)?;

        let tenant_id = session.tenant_id();
        let date = occurred_at.date_naive();
        let sequence = self
            .sequences
            .next(tenant_id, &normalize_principal_code(&principal.code), date)?;
        let po_number = PoNumber::generate(&self.config.po_number.format(), &principal.code, date, sequence)?;

        let order_id = PurchaseOrderId::new(AggregateId::new());
        let order = self.dispatch_order(
            tenant_id,
            order_id,
            PurchaseOrderCommand::CreatePurchaseOrder(CreatePurchaseOrder {
                session: session.clone(),
                order_id,
                po_number,
                principal,
                lines,
                occurred_at,
            }),
        )?;

        info!(order = %order_id, po_number = ?order.po_number().map(PoNumber::as_str), "purchase order created");
        Ok(order)
    }

    pub fn add_line(
        &self,
        session: &Session,
        order_id: PurchaseOrderId,
        line: LineInput,
        occurred_at: DateTime<Utc>,
    ) -> Result<PurchaseOrder, ServiceError> {
        self.locked_dispatch_order(
            session.tenant_id(),
            order_id,
            PurchaseOrderCommand::AddLine(AddLine {
                session: session.clone(),
                order_id,
                line,
                occurred_at,
            }),
        )
    }

    pub fn update_line(
        &self,
        session: &Session,
        order_id: PurchaseOrderId,
        line_no: u32,
        line: LineInput,
        occurred_at: DateTime<Utc>,
    ) -> Result<PurchaseOrder, ServiceError> {
        self.locked_dispatch_order(
            session.tenant_id(),
            order_id,
            PurchaseOrderCommand::UpdateLine(UpdateLine {
                session: session.clone(),
                order_id,
                line_no,
                line,
                occurred_at,
            }),
        )
    }

    pub fn remove_line(
        &self,
        session: &Session,
        order_id: PurchaseOrderId,
        line_no: u32,
        occurred_at: DateTime<Utc>,
    ) -> Result<PurchaseOrder, ServiceError> {
        self.locked_dispatch_order(
            session.tenant_id(),
            order_id,
            PurchaseOrderCommand::RemoveLine(RemoveLine {
                session: session.clone(),
                order_id,
                line_no,
                occurred_at,
            }),
        )
    }

    #[instrument(skip_all, fields(tenant = %session.tenant_id(), order = %order_id, action = ?request.action()))]
    pub fn transition_purchase_order(
        &self,
        session: &Session,
        order_id: PurchaseOrderId,
        request: WorkflowRequest,
        occurred_at: DateTime<Utc>,
    ) -> Result<TransitionOutcome, ServiceError> {
        let action = request.action();
        let order = self.locked_dispatch_order(
            session.tenant_id(),
            order_id,
            PurchaseOrderCommand::Transition(Transition {
                session: session.clone(),
                order_id,
                request,
                occurred_at,
            }),
        )?;
        info!(stage = %order.stage(), "purchase order transitioned");

        let warnings = if action == WorkflowAction::Send {
            self.email_order(&order)
        } else {
            vec![]
        };

        Ok(TransitionOutcome { order, warnings })
    }

    fn email_order(&self, order: &PurchaseOrder) -> Vec<SideEffectWarning> {
        let skipped = |message: String| {
            warn!(%message, "purchase order email skipped");
            vec![SideEffectWarning::new(WarningKind::EmailSkipped, message)]
        };

        if !self.config.notifications.enabled {
            return skipped("notifications are disabled".to_string());
        }
        let (Some(tenant_id), Some(principal)) = (order.tenant_id(), order.principal()) else {
            return skipped("order has no principal".to_string());
        };
        let Some(contacts) = self.principals.contacts(tenant_id, principal.id) else {
            return skipped(format!("no contacts on file for principal {}", principal.code));
        };

        let message = match purchase_order_email(order, &contacts, &self.config.notifications.from) {
            Ok(message) => message,
            Err(e) => return skipped(e.to_string()),
        };

        match self.notifier.send(&message) {
            Ok(()) => {
                info!(to = ?message.to, subject = %message.subject, "purchase order email sent");
                vec![]
            }
            Err(e) => {
                warn!(error = %e, subject = %message.subject, "purchase order email failed");
                vec![SideEffectWarning::new(WarningKind::EmailFailed, e.to_string())]
            }
        }
    }

    // ---- invoice receivings ----------------------------------------------

    #[instrument(skip_all, fields(tenant = %session.tenant_id(), order = %order_id))]
    pub fn create_receiving(
        &self,
        session: &Session,
        order_id: PurchaseOrderId,
        po_version: u64,
        input: ReceivingInput,
        occurred_at: DateTime<Utc>,
    ) -> Result<ReceivingOutcome, ServiceError> {
        let tenant_id = session.tenant_id();
        self.order_locks.run(tenant_id, order_id, || {
            let order = self.receivable_order(tenant_id, order_id, Some(po_version), "receive")?;
            let others = self.counting_receivings(tenant_id, order_id, None)?;
            self.check_over_receipt(&order, &others, &input)?;

            let receiving_id = InvoiceReceivingId::new(AggregateId::new());
            let receiving = self.dispatch_receiving(
                tenant_id,
                receiving_id,
                InvoiceReceivingCommand::Create(CreateReceiving {
                    session: session.clone(),
                    receiving_id,
                    purchase_order_id: order_id,
                    po_version,
                    po_lines: snapshot_lines(&order, &others),
                    input,
                    occurred_at,
                }),
            )?;
            info!(receiving = %receiving_id, invoice = %receiving.invoice_number(), "invoice receiving recorded");

            self.after_receiving_change(session, receiving, occurred_at)
        })
    }

    #[instrument(skip_all, fields(tenant = %session.tenant_id(), receiving = %receiving_id))]
    pub fn update_receiving(
        &self,
        session: &Session,
        receiving_id: InvoiceReceivingId,
        po_version: u64,
        input: ReceivingInput,
        occurred_at: DateTime<Utc>,
    ) -> Result<ReceivingOutcome, ServiceError> {
        let tenant_id = session.tenant_id();
        let order_id = self.receiving_order_id(tenant_id, receiving_id)?;
        self.order_locks.run(tenant_id, order_id, || {
            let order = self.receivable_order(tenant_id, order_id, Some(po_version), "receive")?;
            let others = self.counting_receivings(tenant_id, order_id, Some(receiving_id))?;
            self.check_over_receipt(&order, &others, &input)?;

            let receiving = self.dispatch_receiving(
                tenant_id,
                receiving_id,
                InvoiceReceivingCommand::Update(UpdateReceiving {
                    session: session.clone(),
                    receiving_id,
                    po_version,
                    po_lines: snapshot_lines(&order, &others),
                    input,
                    occurred_at,
                }),
            )?;

            self.after_receiving_change(session, receiving, occurred_at)
        })
    }

    pub fn submit_receiving(
        &self,
        session: &Session,
        receiving_id: InvoiceReceivingId,
        occurred_at: DateTime<Utc>,
    ) -> Result<ReceivingOutcome, ServiceError> {
        self.receiving_change(session, receiving_id, occurred_at, None, |session| {
            InvoiceReceivingCommand::Submit(SubmitReceiving {
                session,
                receiving_id,
                occurred_at,
            })
        })
    }

    pub fn submit_receiving_to_qc(
        &self,
        session: &Session,
        receiving_id: InvoiceReceivingId,
        occurred_at: DateTime<Utc>,
    ) -> Result<ReceivingOutcome, ServiceError> {
        self.receiving_change(session, receiving_id, occurred_at, None, |session| {
            InvoiceReceivingCommand::SubmitToQc(SubmitToQc {
                session,
                receiving_id,
                occurred_at,
            })
        })
    }

    #[instrument(skip_all, fields(tenant = %session.tenant_id(), receiving = %receiving_id, line = line_index, status = ?status))]
    pub fn update_qc_status(
        &self,
        session: &Session,
        receiving_id: InvoiceReceivingId,
        line_index: usize,
        status: QcStatus,
        remarks: Option<String>,
        occurred_at: DateTime<Utc>,
    ) -> Result<ReceivingOutcome, ServiceError> {
        let outcome = self.receiving_change(session, receiving_id, occurred_at, None, |session| {
            InvoiceReceivingCommand::UpdateQcStatus(UpdateQcStatus {
                session,
                receiving_id,
                line_index,
                status,
                remarks,
                occurred_at,
            })
        })?;
        info!(summary = ?outcome.receiving.qc_summary(), receiving_status = %outcome.receiving.status(), "qc status recorded");
        Ok(outcome)
    }

    pub fn complete_receiving(
        &self,
        session: &Session,
        receiving_id: InvoiceReceivingId,
        occurred_at: DateTime<Utc>,
    ) -> Result<ReceivingOutcome, ServiceError> {
        self.receiving_change(session, receiving_id, occurred_at, None, |session| {
            InvoiceReceivingCommand::Complete(CompleteReceiving {
                session,
                receiving_id,
                occurred_at,
            })
        })
    }

    pub fn reject_receiving(
        &self,
        session: &Session,
        receiving_id: InvoiceReceivingId,
        remarks: impl Into<String>,
        occurred_at: DateTime<Utc>,
    ) -> Result<ReceivingOutcome, ServiceError> {
        let remarks = remarks.into();
        self.receiving_change(session, receiving_id, occurred_at, Some("reject_receiving"), |session| {
            InvoiceReceivingCommand::Reject(RejectReceiving {
                session,
                receiving_id,
                remarks,
                occurred_at,
            })
        })
    }

    pub fn delete_receiving(
        &self,
        session: &Session,
        receiving_id: InvoiceReceivingId,
        occurred_at: DateTime<Utc>,
    ) -> Result<ReceivingOutcome, ServiceError> {
        self.receiving_change(session, receiving_id, occurred_at, Some("delete_receiving"), |session| {
            InvoiceReceivingCommand::Delete(DeleteReceiving {
                session,
                receiving_id,
                occurred_at,
            })
        })
    }

    // ---- reads -----------------------------------------------------------

    pub fn purchase_order(&self, tenant_id: TenantId, order_id: PurchaseOrderId) -> Result<PurchaseOrder, ServiceError> {
        let order = self.dispatcher.load(tenant_id, order_id.0, |_t, id| {
            PurchaseOrder::empty(PurchaseOrderId::new(id))
        })?;
        if !order.is_created() {
            return Err(DomainError::not_found().into());
        }
        Ok(order)
    }

    pub fn receiving(&self, tenant_id: TenantId, receiving_id: InvoiceReceivingId) -> Result<InvoiceReceiving, ServiceError> {
        let receiving = self.dispatcher.load(tenant_id, receiving_id.0, |_t, id| {
            InvoiceReceiving::empty(InvoiceReceivingId::new(id))
        })?;
        if !receiving.is_created() {
            return Err(DomainError::not_found().into());
        }
        Ok(receiving)
    }

    /// PO with totals, live reconciliation and its (non-deleted) receivings.
    pub fn purchase_order_view(&self, tenant_id: TenantId, order_id: PurchaseOrderId) -> Result<PurchaseOrderView, ServiceError> {
        let order = self.purchase_order(tenant_id, order_id)?;
        let counting = self.counting_receivings(tenant_id, order_id, None)?;
        let reconciliation = order.reconcile(&receipt_entries(&counting));

        Ok(PurchaseOrderView {
            totals: order.totals(),
            reconciliation,
            receivings: self.receivings.for_order(tenant_id, order_id),
            order,
        })
    }

    pub fn receiving_form(&self, tenant_id: TenantId, order_id: PurchaseOrderId) -> Result<ReceivingForm, ServiceError> {
        let order = self.receivable_order(tenant_id, order_id, None, "receive")?;
        let counting = self.counting_receivings(tenant_id, order_id, None)?;

        Ok(ReceivingForm {
            purchase_order_id: order_id,
            po_number: order.po_number().map(PoNumber::to_string).unwrap_or_default(),
            po_version: order.version(),
            stage: order.stage(),
            lines: snapshot_lines(&order, &counting),
        })
    }

    // ---- internals -------------------------------------------------------

    fn locked_dispatch_order(
        &self,
        tenant_id: TenantId,
        order_id: PurchaseOrderId,
        command: PurchaseOrderCommand,
    ) -> Result<PurchaseOrder, ServiceError> {
        self.order_locks
            .run(tenant_id, order_id, || self.dispatch_order(tenant_id, order_id, command))
    }

    fn dispatch_order(
        &self,
        tenant_id: TenantId,
        order_id: PurchaseOrderId,
        command: PurchaseOrderCommand,
    ) -> Result<PurchaseOrder, ServiceError> {
        let dispatched = self.dispatcher.dispatch(
            tenant_id,
            order_id.0,
            ORDER_AGGREGATE_TYPE,
            command,
            |_t, id| PurchaseOrder::empty(PurchaseOrderId::new(id)),
        )?;
        Ok(dispatched.aggregate)
    }

    fn dispatch_receiving(
        &self,
        tenant_id: TenantId,
        receiving_id: InvoiceReceivingId,
        command: InvoiceReceivingCommand,
    ) -> Result<InvoiceReceiving, ServiceError> {
        let dispatched = self.dispatcher.dispatch(
            tenant_id,
            receiving_id.0,
            RECEIVING_AGGREGATE_TYPE,
            command,
            |_t, id| InvoiceReceiving::empty(InvoiceReceivingId::new(id)),
        )?;
        self.project(&dispatched.committed)?;
        Ok(dispatched.aggregate)
    }

    /// Feed committed receiving events to the index, replaying the stream from
    /// the store when the index has fallen behind.
    fn project(&self, committed: &[StoredEvent]) -> Result<(), ServiceError> {
        for stored in committed {
            match self.receivings.apply_envelope(&stored.to_envelope()) {
                Ok(()) => {}
                Err(ReceivingsProjectionError::NonMonotonicSequence { last, found }) => {
                    warn!(receiving = %stored.aggregate_id, last, found, "receivings index behind, replaying stream");
                    let stream = self
                        .event_store()
                        .load_stream(stored.tenant_id, stored.aggregate_id)
                        .map_err(DispatchError::from)?;
                    self.receivings.catch_up(stream.iter().map(StoredEvent::to_envelope))?;
                }
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }

    /// Run a command against an existing receiving under its order's lock,
    /// then re-sync the order. `stage_action` names the action when the order
    /// must still accept receipts.
    fn receiving_change(
        &self,
        session: &Session,
        receiving_id: InvoiceReceivingId,
        occurred_at: DateTime<Utc>,
        stage_action: Option<&str>,
        command: impl FnOnce(Session) -> InvoiceReceivingCommand,
    ) -> Result<ReceivingOutcome, ServiceError> {
        let tenant_id = session.tenant_id();
        let order_id = self.receiving_order_id(tenant_id, receiving_id)?;
        self.order_locks.run(tenant_id, order_id, || {
            if let Some(action) = stage_action {
                self.receivable_order(tenant_id, order_id, None, action)?;
            }
            let receiving = self.dispatch_receiving(tenant_id, receiving_id, command(session.clone()))?;
            self.after_receiving_change(session, receiving, occurred_at)
        })
    }

    fn receiving_order_id(&self, tenant_id: TenantId, receiving_id: InvoiceReceivingId) -> Result<PurchaseOrderId, ServiceError> {
        self.receiving(tenant_id, receiving_id)?
            .purchase_order_id()
            .ok_or_else(|| DomainError::invariant("receiving has no purchase order").into())
    }

    /// Load the PO and require that it accepts receipts (and, when given, that
    /// it is still at `expected_version`).
    fn receivable_order(
        &self,
        tenant_id: TenantId,
        order_id: PurchaseOrderId,
        expected_version: Option<u64>,
        action: &str,
    ) -> Result<PurchaseOrder, ServiceError> {
        let order = self.purchase_order(tenant_id, order_id)?;
        if let Some(version) = expected_version {
            ExpectedVersion::Exact(version).check(order.version())?;
        }
        if !order.stage().accepts_receipts() {
            return Err(DomainError::invalid_transition(order.stage(), action).into());
        }
        Ok(order)
    }

    fn counting_receivings(
        &self,
        tenant_id: TenantId,
        order_id: PurchaseOrderId,
        exclude: Option<InvoiceReceivingId>,
    ) -> Result<Vec<InvoiceReceiving>, ServiceError> {
        let mut counting = Vec::new();
        for listing in self.receivings.for_order(tenant_id, order_id) {
            if Some(listing.receiving_id) == exclude {
                continue;
            }
            let receiving = self.receiving(tenant_id, listing.receiving_id)?;
            if receiving.counts_toward_receipts() {
                counting.push(receiving);
            }
        }
        Ok(counting)
    }

    fn check_over_receipt(
        &self,
        order: &PurchaseOrder,
        others: &[InvoiceReceiving],
        input: &ReceivingInput,
    ) -> Result<(), ServiceError> {
        if self.config.receiving.over_receipt_policy != OverReceiptPolicy::Reject {
            return Ok(());
        }

        let mut entries = receipt_entries(others);
        entries.extend(input.received_products.iter().map(|p| ReceiptEntry {
            po_line_no: p.po_line_no,
            product_id: p.product_id,
            quantity: p.received_qty,
        }));

        let prospective = order.reconcile(&entries);
        let mut violations = Violations::new();
        for line in prospective.over_received() {
            violations.add(
                ViolationKind::QuantityOutOfRange,
                "received_products",
                format!(
                    "line {} would receive {} against {} ordered",
                    line.line_no, line.received_qty, line.ordered_qty
                ),
            );
        }
        violations.into_result()?;
        Ok(())
    }

    fn after_receiving_change(
        &self,
        session: &Session,
        receiving: InvoiceReceiving,
        occurred_at: DateTime<Utc>,
    ) -> Result<ReceivingOutcome, ServiceError> {
        let order_id = receiving
            .purchase_order_id()
            .ok_or_else(|| DomainError::invariant("receiving has no purchase order"))?;
        let (order, reconciliation) = self.sync_order(session, order_id, occurred_at)?;

        let warnings = reconciliation
            .over_received()
            .map(|line| {
                warn!(order = %order_id, line = line.line_no, excess = line.excess_qty, "purchase order line over-received");
                SideEffectWarning::new(
                    WarningKind::OverReceipt,
                    format!(
                        "line {} received {} against {} ordered",
                        line.line_no, line.received_qty, line.ordered_qty
                    ),
                )
            })
            .collect();

        Ok(ReceivingOutcome {
            receiving,
            order,
            warnings,
        })
    }

    /// Recompute receipts from every counting receiving and push them to the PO.
    ///
    /// Idempotent; a PO that no longer accepts receipts is left untouched.
    fn sync_order(
        &self,
        session: &Session,
        order_id: PurchaseOrderId,
        occurred_at: DateTime<Utc>,
    ) -> Result<(PurchaseOrder, Reconciliation), ServiceError> {
        let tenant_id = session.tenant_id();
        let order = self.purchase_order(tenant_id, order_id)?;
        let counting = self.counting_receivings(tenant_id, order_id, None)?;
        let entries = receipt_entries(&counting);

        if !order.stage().accepts_receipts() {
            let reconciliation = order.reconcile(&entries);
            return Ok((order, reconciliation));
        }

        let before = order.stage();
        let order = self.dispatch_order(
            tenant_id,
            order_id,
            PurchaseOrderCommand::SyncReceipts(SyncReceipts {
                session: session.clone(),
                order_id,
                entries: entries.clone(),
                qc_outstanding: counting.iter().any(InvoiceReceiving::qc_outstanding),
                occurred_at,
            }),
        )?;
        if order.stage() != before {
            info!(order = %order_id, from = %before, to = %order.stage(), "purchase order stage follows receipts");
        }

        let reconciliation = order.reconcile(&entries);
        Ok((order, reconciliation))
    }
}

fn receipt_entries(receivings: &[InvoiceReceiving]) -> Vec<ReceiptEntry> {
    receivings.iter().flat_map(InvoiceReceiving::receipt_entries).collect()
}

/// Per-line figures of `order` given the receivings that already count.
fn snapshot_lines(order: &PurchaseOrder, counting: &[InvoiceReceiving]) -> Vec<PoLineSnapshot> {
    let reconciliation = order.reconcile(&receipt_entries(counting));
    reconciliation
        .lines
        .iter()
        .map(|l| PoLineSnapshot {
            po_line_no: l.line_no,
            product_id: l.product_id,
            ordered_qty: l.ordered_qty,
            already_received: l.received_qty,
        })
        .collect()
}

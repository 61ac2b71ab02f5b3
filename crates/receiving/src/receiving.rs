use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use medprocure_auth::{Permission, Session, authorize, resources::invoice_receiving};
use medprocure_core::{
    Aggregate, AggregateId, AggregateRoot, DomainError, TenantId, UserId, ViolationKind,
    Violations,
};
use medprocure_events::Event;
use medprocure_purchasing::{PurchaseOrderId, ReceiptEntry};

use crate::document::ReceivingDocument;
use crate::line::{PoLineSnapshot, QcEntry, QcStatus, ReceivedProductLine};
use crate::qc::{QcSummary, aggregate_qc};
use crate::validate::{ReceivingInput, validate_receiving};

/// Invoice receiving identifier.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InvoiceReceivingId(pub AggregateId);

impl InvoiceReceivingId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for InvoiceReceivingId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReceivingStatus {
    Draft,
    Submitted,
    QcPending,
    Completed,
    Rejected,
}

impl ReceivingStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ReceivingStatus::Draft => "draft",
            ReceivingStatus::Submitted => "submitted",
            ReceivingStatus::QcPending => "qc_pending",
            ReceivingStatus::Completed => "completed",
            ReceivingStatus::Rejected => "rejected",
        }
    }
}

impl core::fmt::Display for ReceivingStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Aggregate root: InvoiceReceiving.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvoiceReceiving {
    id: InvoiceReceivingId,
    tenant_id: Option<TenantId>,
    purchase_order_id: Option<PurchaseOrderId>,
    po_version: u64,
    invoice_number: String,
    received_date: Option<NaiveDate>,
    received_products: Vec<ReceivedProductLine>,
    documents: Vec<ReceivingDocument>,
    qc_required: bool,
    status: ReceivingStatus,
    qc_summary: QcSummary,
    remarks: Option<String>,
    deleted: bool,
    created_by: Option<UserId>,
    version: u64,
    created: bool,
}

impl InvoiceReceiving {
    pub fn empty(id: InvoiceReceivingId) -> Self {
        Self {
            id,
            tenant_id: None,
            purchase_order_id: None,
            po_version: 0,
            invoice_number: String::new(),
            received_date: None,
            received_products: Vec::new(),
            documents: Vec::new(),
            qc_required: false,
            status: ReceivingStatus::Draft,
            qc_summary: QcSummary::Pending,
            remarks: None,
            deleted: false,
            created_by: None,
            version: 0,
            created: false,
        }
    }

    pub fn id_typed(&self) -> InvoiceReceivingId {
        self.id
    }

    pub fn is_created(&self) -> bool {
        self.created
    }

    pub fn tenant_id(&self) -> Option<TenantId> {
        self.tenant_id
    }

    pub fn purchase_order_id(&self) -> Option<PurchaseOrderId> {
        self.purchase_order_id
    }

    /// PO version the receiving was last validated against.
    pub fn po_version(&self) -> u64 {
        self.po_version
    }

    pub fn invoice_number(&self) -> &str {
        &self.invoice_number
    }

    pub fn received_date(&self) -> Option<NaiveDate> {
        self.received_date
    }

    pub fn received_products(&self) -> &[ReceivedProductLine] {
        &self.received_products
    }

    pub fn documents(&self) -> &[ReceivingDocument] {
        &self.documents
    }

    pub fn qc_required(&self) -> bool {
        self.qc_required
    }

    pub fn status(&self) -> ReceivingStatus {
        self.status
    }

    pub fn qc_summary(&self) -> QcSummary {
        self.qc_summary
    }

    pub fn remarks(&self) -> Option<&str> {
        self.remarks.as_deref()
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted
    }

    /// Whether this receiving's quantities count against its purchase order.
    pub fn counts_toward_receipts(&self) -> bool {
        self.created && !self.deleted && self.status != ReceivingStatus::Rejected
    }

    /// Whether this receiving still holds the order back from completion on QC grounds.
    pub fn qc_outstanding(&self) -> bool {
        self.counts_toward_receipts()
            && self.qc_required
            && matches!(self.status, ReceivingStatus::Draft | ReceivingStatus::QcPending)
    }

    /// Entries for PO reconciliation; empty when the receiving does not count.
    pub fn receipt_entries(&self) -> Vec<ReceiptEntry> {
        if !self.counts_toward_receipts() {
            return Vec::new();
        }
        self.received_products
            .iter()
            .map(ReceivedProductLine::receipt_entry)
            .collect()
    }
}

impl AggregateRoot for InvoiceReceiving {
    type Id = InvoiceReceivingId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: CreateReceiving.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateReceiving {
    pub session: Session,
    pub receiving_id: InvoiceReceivingId,
    pub purchase_order_id: PurchaseOrderId,
    pub po_version: u64,
    pub po_lines: Vec<PoLineSnapshot>,
    pub input: ReceivingInput,
    pub occurred_at: DateTime<Utc>,
}

/// Command: UpdateReceiving (draft only; replaces header, lines and documents).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateReceiving {
    pub session: Session,
    pub receiving_id: InvoiceReceivingId,
    pub po_version: u64,
    pub po_lines: Vec<PoLineSnapshot>,
    pub input: ReceivingInput,
    pub occurred_at: DateTime<Utc>,
}

/// Command: SubmitReceiving (receivings without QC).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmitReceiving {
    pub session: Session,
    pub receiving_id: InvoiceReceivingId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: SubmitToQc (receivings that require QC).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmitToQc {
    pub session: Session,
    pub receiving_id: InvoiceReceivingId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: UpdateQcStatus.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateQcStatus {
    pub session: Session,
    pub receiving_id: InvoiceReceivingId,
    pub line_index: usize,
    pub status: QcStatus,
    pub remarks: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: CompleteReceiving.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompleteReceiving {
    pub session: Session,
    pub receiving_id: InvoiceReceivingId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: RejectReceiving (remarks required).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RejectReceiving {
    pub session: Session,
    pub receiving_id: InvoiceReceivingId,
    pub remarks: String,
    pub occurred_at: DateTime<Utc>,
}

/// Command: DeleteReceiving (soft delete).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteReceiving {
    pub session: Session,
    pub receiving_id: InvoiceReceivingId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum InvoiceReceivingCommand {
    Create(CreateReceiving),
    Update(UpdateReceiving),
    Submit(SubmitReceiving),
    SubmitToQc(SubmitToQc),
    UpdateQcStatus(UpdateQcStatus),
    Complete(CompleteReceiving),
    Reject(RejectReceiving),
    Delete(DeleteReceiving),
}

/// Event: ReceivingCreated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReceivingCreated {
    pub tenant_id: TenantId,
    pub receiving_id: InvoiceReceivingId,
    pub purchase_order_id: PurchaseOrderId,
    pub po_version: u64,
    pub invoice_number: String,
    pub received_date: NaiveDate,
    pub received_products: Vec<ReceivedProductLine>,
    pub documents: Vec<ReceivingDocument>,
    pub qc_required: bool,
    pub created_by: UserId,
    pub occurred_at: DateTime<Utc>,
}

/// Event: ReceivingUpdated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReceivingUpdated {
    pub tenant_id: TenantId,
    pub receiving_id: InvoiceReceivingId,
    pub po_version: u64,
    pub invoice_number: String,
    pub received_date: NaiveDate,
    pub received_products: Vec<ReceivedProductLine>,
    pub documents: Vec<ReceivingDocument>,
    pub qc_required: bool,
    pub occurred_at: DateTime<Utc>,
}

/// Event: ReceivingSubmitted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReceivingSubmitted {
    pub tenant_id: TenantId,
    pub receiving_id: InvoiceReceivingId,
    pub submitted_by: UserId,
    pub occurred_at: DateTime<Utc>,
}

/// Event: ReceivingSentToQc.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReceivingSentToQc {
    pub tenant_id: TenantId,
    pub receiving_id: InvoiceReceivingId,
    pub submitted_by: UserId,
    pub occurred_at: DateTime<Utc>,
}

/// Event: QcStatusUpdated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QcStatusUpdated {
    pub tenant_id: TenantId,
    pub receiving_id: InvoiceReceivingId,
    pub line_index: usize,
    pub entry: QcEntry,
    /// Receiving-level summary after this update.
    pub summary: QcSummary,
    pub occurred_at: DateTime<Utc>,
}

/// Event: ReceivingCompleted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReceivingCompleted {
    pub tenant_id: TenantId,
    pub receiving_id: InvoiceReceivingId,
    pub completed_by: UserId,
    pub occurred_at: DateTime<Utc>,
}

/// Event: ReceivingRejected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReceivingRejected {
    pub tenant_id: TenantId,
    pub receiving_id: InvoiceReceivingId,
    pub rejected_by: UserId,
    pub remarks: String,
    pub occurred_at: DateTime<Utc>,
}

/// Event: ReceivingDeleted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReceivingDeleted {
    pub tenant_id: TenantId,
    pub receiving_id: InvoiceReceivingId,
    pub deleted_by: UserId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum InvoiceReceivingEvent {
    ReceivingCreated(ReceivingCreated),
    ReceivingUpdated(ReceivingUpdated),
    ReceivingSubmitted(ReceivingSubmitted),
    ReceivingSentToQc(ReceivingSentToQc),
    QcStatusUpdated(QcStatusUpdated),
    ReceivingCompleted(ReceivingCompleted),
    ReceivingRejected(ReceivingRejected),
    ReceivingDeleted(ReceivingDeleted),
}

impl Event for InvoiceReceivingEvent {
    fn event_type(&self) -> &'static str {
        match self {
            InvoiceReceivingEvent::ReceivingCreated(_) => "receiving.created",
            InvoiceReceivingEvent::ReceivingUpdated(_) => "receiving.updated",
            InvoiceReceivingEvent::ReceivingSubmitted(_) => "receiving.submitted",
            InvoiceReceivingEvent::ReceivingSentToQc(_) => "receiving.sent_to_qc",
            InvoiceReceivingEvent::QcStatusUpdated(_) => "receiving.qc_status_updated",
            InvoiceReceivingEvent::ReceivingCompleted(_) => "receiving.completed",
            InvoiceReceivingEvent::ReceivingRejected(_) => "receiving.rejected",
            InvoiceReceivingEvent::ReceivingDeleted(_) => "receiving.deleted",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            InvoiceReceivingEvent::ReceivingCreated(e) => e.occurred_at,
            InvoiceReceivingEvent::ReceivingUpdated(e) => e.occurred_at,
            InvoiceReceivingEvent::ReceivingSubmitted(e) => e.occurred_at,
            InvoiceReceivingEvent::ReceivingSentToQc(e) => e.occurred_at,
            InvoiceReceivingEvent::QcStatusUpdated(e) => e.occurred_at,
            InvoiceReceivingEvent::ReceivingCompleted(e) => e.occurred_at,
            InvoiceReceivingEvent::ReceivingRejected(e) => e.occurred_at,
            InvoiceReceivingEvent::ReceivingDeleted(e) => e.occurred_at,
        }
    }
}

impl Aggregate for InvoiceReceiving {
    type Command = InvoiceReceivingCommand;
    type Event = InvoiceReceivingEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            InvoiceReceivingEvent::ReceivingCreated(e) => {
                self.id = e.receiving_id;
                self.tenant_id = Some(e.tenant_id);
                self.purchase_order_id = Some(e.purchase_order_id);
                self.po_version = e.po_version;
                self.invoice_number = e.invoice_number.clone();
                self.received_date = Some(e.received_date);
                self.received_products = e.received_products.clone();
                self.documents = e.documents.clone();
                self.qc_required = e.qc_required;
                self.status = ReceivingStatus::Draft;
                self.qc_summary = QcSummary::Pending;
                self.created_by = Some(e.created_by);
                self.created = true;
            }
            InvoiceReceivingEvent::ReceivingUpdated(e) => {
                self.po_version = e.po_version;
                self.invoice_number = e.invoice_number.clone();
                self.received_date = Some(e.received_date);
                self.received_products = e.received_products.clone();
                self.documents = e.documents.clone();
                self.qc_required = e.qc_required;
            }
            InvoiceReceivingEvent::ReceivingSubmitted(_) => {
                self.status = ReceivingStatus::Submitted;
            }
            InvoiceReceivingEvent::ReceivingSentToQc(_) => {
                self.status = ReceivingStatus::QcPending;
            }
            InvoiceReceivingEvent::QcStatusUpdated(e) => {
                if let Some(line) = self.received_products.get_mut(e.line_index) {
                    line.record_qc(e.entry.clone());
                }
                self.qc_summary = e.summary;
            }
            InvoiceReceivingEvent::ReceivingCompleted(_) => {
                self.status = ReceivingStatus::Completed;
            }
            InvoiceReceivingEvent::ReceivingRejected(e) => {
                self.status = ReceivingStatus::Rejected;
                self.remarks = Some(e.remarks.clone());
            }
            InvoiceReceivingEvent::ReceivingDeleted(_) => {
                self.deleted = true;
            }
        }

        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            InvoiceReceivingCommand::Create(cmd) => self.handle_create(cmd),
            InvoiceReceivingCommand::Update(cmd) => self.handle_update(cmd),
            InvoiceReceivingCommand::Submit(cmd) => self.handle_submit(cmd),
            InvoiceReceivingCommand::SubmitToQc(cmd) => self.handle_submit_to_qc(cmd),
            InvoiceReceivingCommand::UpdateQcStatus(cmd) => self.handle_update_qc(cmd),
            InvoiceReceivingCommand::Complete(cmd) => self.handle_complete(cmd),
            InvoiceReceivingCommand::Reject(cmd) => self.handle_reject(cmd),
            InvoiceReceivingCommand::Delete(cmd) => self.handle_delete(cmd),
        }
    }
}

fn require(session: &Session, permission: &Permission) -> Result<(), DomainError> {
    authorize(session, permission).map_err(DomainError::from)
}

impl InvoiceReceiving {
    /// Existence, tenant and id checks, then the permission for `action`.
    fn ensure_target(
        &self,
        session: &Session,
        receiving_id: InvoiceReceivingId,
        permission: &Permission,
    ) -> Result<(), DomainError> {
        if !self.created {
            return Err(DomainError::not_found());
        }
        if self.tenant_id != Some(session.tenant_id()) {
            return Err(DomainError::invariant("tenant mismatch"));
        }
        if self.id != receiving_id {
            return Err(DomainError::invariant("receiving_id mismatch"));
        }
        require(session, permission)
    }

    /// Status check for `action`; a deleted receiving accepts nothing.
    fn ensure_status(&self, allowed: &[ReceivingStatus], action: &str) -> Result<(), DomainError> {
        if self.deleted {
            return Err(DomainError::invalid_transition("deleted", action));
        }
        if !allowed.contains(&self.status) {
            return Err(DomainError::invalid_transition(self.status, action));
        }
        Ok(())
    }

    fn handle_create(&self, cmd: &CreateReceiving) -> Result<Vec<InvoiceReceivingEvent>, DomainError> {
        require(&cmd.session, &invoice_receiving::CREATE)?;

        if self.created {
            return Err(DomainError::conflict("invoice receiving already exists"));
        }

        let lines = validate_receiving(&cmd.input, &cmd.po_lines, cmd.occurred_at.date_naive())?;

        Ok(vec![InvoiceReceivingEvent::ReceivingCreated(ReceivingCreated {
            tenant_id: cmd.session.tenant_id(),
            receiving_id: cmd.receiving_id,
            purchase_order_id: cmd.purchase_order_id,
            po_version: cmd.po_version,
            invoice_number: cmd.input.invoice_number.trim().to_string(),
            received_date: cmd.input.received_date,
            received_products: lines,
            documents: cmd.input.documents.clone(),
            qc_required: cmd.input.qc_required,
            created_by: cmd.session.user_id,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_update(&self, cmd: &UpdateReceiving) -> Result<Vec<InvoiceReceivingEvent>, DomainError> {
        self.ensure_target(&cmd.session, cmd.receiving_id, &invoice_receiving::UPDATE)?;
        self.ensure_status(&[ReceivingStatus::Draft], "update")?;

        let lines = validate_receiving(&cmd.input, &cmd.po_lines, cmd.occurred_at.date_naive())?;

        Ok(vec![InvoiceReceivingEvent::ReceivingUpdated(ReceivingUpdated {
            tenant_id: cmd.session.tenant_id(),
            receiving_id: cmd.receiving_id,
            po_version: cmd.po_version,
            invoice_number: cmd.input.invoice_number.trim().to_string(),
            received_date: cmd.input.received_date,
            received_products: lines,
            documents: cmd.input.documents.clone(),
            qc_required: cmd.input.qc_required,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_submit(&self, cmd: &SubmitReceiving) -> Result<Vec<InvoiceReceivingEvent>, DomainError> {
        self.ensure_target(&cmd.session, cmd.receiving_id, &invoice_receiving::SUBMIT)?;
        self.ensure_status(&[ReceivingStatus::Draft], "submit")?;
        if self.qc_required {
            return Err(DomainError::invalid_transition(self.status, "submit"));
        }

        Ok(vec![InvoiceReceivingEvent::ReceivingSubmitted(ReceivingSubmitted {
            tenant_id: cmd.session.tenant_id(),
            receiving_id: cmd.receiving_id,
            submitted_by: cmd.session.user_id,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_submit_to_qc(&self, cmd: &SubmitToQc) -> Result<Vec<InvoiceReceivingEvent>, DomainError> {
        self.ensure_target(&cmd.session, cmd.receiving_id, &invoice_receiving::SUBMIT_QC)?;
        self.ensure_status(&[ReceivingStatus::Draft], "submit_to_qc")?;
        if !self.qc_required {
            return Err(DomainError::invalid_transition(self.status, "submit_to_qc"));
        }
        if !self.received_products.iter().any(ReceivedProductLine::requires_qc) {
            let mut violations = Violations::new();
            violations.add(
                ViolationKind::EmptyReceiving,
                "received_products",
                "nothing was received, so there is nothing to inspect",
            );
            return Err(DomainError::Validation(violations));
        }

        Ok(vec![InvoiceReceivingEvent::ReceivingSentToQc(ReceivingSentToQc {
            tenant_id: cmd.session.tenant_id(),
            receiving_id: cmd.receiving_id,
            submitted_by: cmd.session.user_id,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_update_qc(&self, cmd: &UpdateQcStatus) -> Result<Vec<InvoiceReceivingEvent>, DomainError> {
        self.ensure_target(&cmd.session, cmd.receiving_id, &invoice_receiving::QC_UPDATE)?;
        self.ensure_status(&[ReceivingStatus::QcPending], "update_qc")?;

        let field = format!("received_products[{}]", cmd.line_index);
        let Some(line) = self.received_products.get(cmd.line_index) else {
            return Err(DomainError::validation(field, "no such received line"));
        };
        if !line.requires_qc() {
            return Err(DomainError::validation(
                format!("{field}.qc_status"),
                "QC applies only to lines with a received quantity",
            ));
        }

        let entry = QcEntry {
            status: cmd.status,
            remarks: cmd
                .remarks
                .as_deref()
                .map(str::trim)
                .filter(|r| !r.is_empty())
                .map(str::to_string),
            qc_by: cmd.session.user_id,
            qc_date: cmd.occurred_at,
        };

        let mut after = self.received_products.clone();
        after[cmd.line_index].record_qc(entry.clone());
        let summary = aggregate_qc(&after);

        let mut events = vec![InvoiceReceivingEvent::QcStatusUpdated(QcStatusUpdated {
            tenant_id: cmd.session.tenant_id(),
            receiving_id: cmd.receiving_id,
            line_index: cmd.line_index,
            entry,
            summary,
            occurred_at: cmd.occurred_at,
        })];

        if summary == QcSummary::Passed {
            events.push(InvoiceReceivingEvent::ReceivingCompleted(ReceivingCompleted {
                tenant_id: cmd.session.tenant_id(),
                receiving_id: cmd.receiving_id,
                completed_by: cmd.session.user_id,
                occurred_at: cmd.occurred_at,
            }));
        }

        Ok(events)
    }

    fn handle_complete(&self, cmd: &CompleteReceiving) -> Result<Vec<InvoiceReceivingEvent>, DomainError> {
        self.ensure_target(&cmd.session, cmd.receiving_id, &invoice_receiving::COMPLETE)?;
        self.ensure_status(&[ReceivingStatus::Submitted], "complete")?;

        Ok(vec![InvoiceReceivingEvent::ReceivingCompleted(ReceivingCompleted {
            tenant_id: cmd.session.tenant_id(),
            receiving_id: cmd.receiving_id,
            completed_by: cmd.session.user_id,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_reject(&self, cmd: &RejectReceiving) -> Result<Vec<InvoiceReceivingEvent>, DomainError> {
        let remarks = cmd.remarks.trim();
        if remarks.is_empty() {
            return Err(DomainError::validation(
                "remarks",
                "remarks are required to reject a receiving",
            ));
        }
        self.ensure_target(&cmd.session, cmd.receiving_id, &invoice_receiving::REJECT)?;
        self.ensure_status(&[ReceivingStatus::Submitted, ReceivingStatus::QcPending], "reject")?;

        Ok(vec![InvoiceReceivingEvent::ReceivingRejected(ReceivingRejected {
            tenant_id: cmd.session.tenant_id(),
            receiving_id: cmd.receiving_id,
            rejected_by: cmd.session.user_id,
            remarks: remarks.to_string(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_delete(&self, cmd: &DeleteReceiving) -> Result<Vec<InvoiceReceivingEvent>, DomainError> {
        self.ensure_target(&cmd.session, cmd.receiving_id, &invoice_receiving::DELETE)?;
        self.ensure_status(
            &[ReceivingStatus::Draft, ReceivingStatus::Submitted, ReceivingStatus::Rejected],
            "delete",
        )?;

        Ok(vec![InvoiceReceivingEvent::ReceivingDeleted(ReceivingDeleted {
            tenant_id: cmd.session.tenant_id(),
            receiving_id: cmd.receiving_id,
            deleted_by: cmd.session.user_id,
            occurred_at: cmd.occurred_at,
        })])
    }
}

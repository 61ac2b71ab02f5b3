use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use medprocure_auth::{Permission, Session, authorize, resources::purchase_orders};
use medprocure_core::{
    Aggregate, AggregateId, AggregateRoot, DomainError, PrincipalId, TenantId, UserId, ViolationKind,
    Violations,
};
use medprocure_events::Event;

use crate::line::{LineInput, OrderTotals, ProductLine};
use crate::number::PoNumber;
use crate::reconciliation::{ReceiptEntry, Reconciliation, reconcile};
use crate::workflow::{
    HistoryEntry, Stage, WorkflowAction, WorkflowRequest, next_stage, receipt_stage,
};

/// Purchase order identifier (tenant-scoped via `tenant_id` fields in events).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PurchaseOrderId(pub AggregateId);

impl PurchaseOrderId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for PurchaseOrderId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// The principal (manufacturer/supplier) an order is placed with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrincipalRef {
    pub id: PrincipalId,
    pub code: String,
    pub name: String,
}

/// Aggregate root: PurchaseOrder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PurchaseOrder {
    id: PurchaseOrderId,
    tenant_id: Option<TenantId>,
    po_number: Option<PoNumber>,
    principal: Option<PrincipalRef>,
    stage: Stage,
    lines: Vec<ProductLine>,
    history: Vec<HistoryEntry>,
    qc_outstanding: bool,
    created_by: Option<UserId>,
    version: u64,
    created: bool,
}

impl PurchaseOrder {
    /// Create an empty, not-yet-created aggregate instance for rehydration.
    pub fn empty(id: PurchaseOrderId) -> Self {
        Self {
            id,
            tenant_id: None,
            po_number: None,
            principal: None,
            stage: Stage::Draft,
            lines: Vec::new(),
            history: Vec::new(),
            qc_outstanding: false,
            created_by: None,
            version: 0,
            created: false,
        }
    }

    pub fn id_typed(&self) -> PurchaseOrderId {
        self.id
    }

    pub fn is_created(&self) -> bool {
        self.created
    }

    pub fn tenant_id(&self) -> Option<TenantId> {
        self.tenant_id
    }

    pub fn po_number(&self) -> Option<&PoNumber> {
        self.po_number.as_ref()
    }

    pub fn principal(&self) -> Option<&PrincipalRef> {
        self.principal.as_ref()
    }

    /// Current stage; this is both the order's `status` and `currentStage`.
    pub fn stage(&self) -> Stage {
        self.stage
    }

    pub fn lines(&self) -> &[ProductLine] {
        &self.lines
    }

    pub fn line(&self, line_no: u32) -> Option<&ProductLine> {
        self.lines.iter().find(|l| l.line_no == line_no)
    }

    pub fn history(&self) -> &[HistoryEntry] {
        &self.history
    }

    pub fn qc_outstanding(&self) -> bool {
        self.qc_outstanding
    }

    pub fn created_by(&self) -> Option<UserId> {
        self.created_by
    }

    pub fn totals(&self) -> OrderTotals {
        OrderTotals::of(&self.lines)
    }

    /// Live reconciliation of the stored lines against `entries`.
    pub fn reconcile<'a>(&self, entries: impl IntoIterator<Item = &'a ReceiptEntry>) -> Reconciliation {
        reconcile(&self.lines, entries)
    }
}

impl AggregateRoot for PurchaseOrder {
    type Id = PurchaseOrderId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: CreatePurchaseOrder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreatePurchaseOrder {
    pub session: Session,
    pub order_id: PurchaseOrderId,
    pub po_number: PoNumber,
    pub principal: PrincipalRef,
    pub lines: Vec<LineInput>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: AddLine (draft only).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddLine {
    pub session: Session,
    pub order_id: PurchaseOrderId,
    pub line: LineInput,
    pub occurred_at: DateTime<Utc>,
}

/// Command: UpdateLine (draft only).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateLine {
    pub session: Session,
    pub order_id: PurchaseOrderId,
    pub line_no: u32,
    pub line: LineInput,
    pub occurred_at: DateTime<Utc>,
}

/// Command: RemoveLine (draft only).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoveLine {
    pub session: Session,
    pub order_id: PurchaseOrderId,
    pub line_no: u32,
    pub occurred_at: DateTime<Utc>,
}

/// Command: Transition (manual workflow action).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transition {
    pub session: Session,
    pub order_id: PurchaseOrderId,
    pub request: WorkflowRequest,
    pub occurred_at: DateTime<Utc>,
}

/// Command: SyncReceipts.
///
/// Carries every entry from the receivings that currently count against the
/// order; the order recomputes received/backlog from scratch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncReceipts {
    pub session: Session,
    pub order_id: PurchaseOrderId,
    pub entries: Vec<ReceiptEntry>,
    pub qc_outstanding: bool,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PurchaseOrderCommand {
    CreatePurchaseOrder(CreatePurchaseOrder),
    AddLine(AddLine),
    UpdateLine(UpdateLine),
    RemoveLine(RemoveLine),
    Transition(Transition),
    SyncReceipts(SyncReceipts),
}

/// Event: PurchaseOrderCreated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurchaseOrderCreated {
    pub tenant_id: TenantId,
    pub order_id: PurchaseOrderId,
    pub po_number: PoNumber,
    pub principal: PrincipalRef,
    pub lines: Vec<ProductLine>,
    pub created_by: UserId,
    pub occurred_at: DateTime<Utc>,
}

/// Event: LineAdded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineAdded {
    pub tenant_id: TenantId,
    pub order_id: PurchaseOrderId,
    pub line: ProductLine,
    pub occurred_at: DateTime<Utc>,
}

/// Event: LineUpdated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineUpdated {
    pub tenant_id: TenantId,
    pub order_id: PurchaseOrderId,
    pub line: ProductLine,
    pub occurred_at: DateTime<Utc>,
}

/// Event: LineRemoved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineRemoved {
    pub tenant_id: TenantId,
    pub order_id: PurchaseOrderId,
    pub line_no: u32,
    pub occurred_at: DateTime<Utc>,
}

/// Event: WorkflowTransitioned.
///
/// Applying it sets the stage and appends the history entry in one step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowTransitioned {
    pub tenant_id: TenantId,
    pub order_id: PurchaseOrderId,
    pub action: WorkflowAction,
    pub from: Stage,
    pub to: Stage,
    pub actor: UserId,
    pub remarks: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

/// Per-line figures carried by `ReceiptsReconciled`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineReceipt {
    pub line_no: u32,
    pub received_qty: i64,
    pub backlog_qty: i64,
}

/// Event: ReceiptsReconciled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReceiptsReconciled {
    pub tenant_id: TenantId,
    pub order_id: PurchaseOrderId,
    pub lines: Vec<LineReceipt>,
    pub qc_outstanding: bool,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PurchaseOrderEvent {
    PurchaseOrderCreated(PurchaseOrderCreated),
    LineAdded(LineAdded),
    LineUpdated(LineUpdated),
    LineRemoved(LineRemoved),
    WorkflowTransitioned(WorkflowTransitioned),
    ReceiptsReconciled(ReceiptsReconciled),
}

impl Event for PurchaseOrderEvent {
    fn event_type(&self) -> &'static str {
        match self {
            PurchaseOrderEvent::PurchaseOrderCreated(_) => "purchasing.order.created",
            PurchaseOrderEvent::LineAdded(_) => "purchasing.order.line_added",
            PurchaseOrderEvent::LineUpdated(_) => "purchasing.order.line_updated",
            PurchaseOrderEvent::LineRemoved(_) => "purchasing.order.line_removed",
            PurchaseOrderEvent::WorkflowTransitioned(_) => "purchasing.order.transitioned",
            PurchaseOrderEvent::ReceiptsReconciled(_) => "purchasing.order.receipts_reconciled",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            PurchaseOrderEvent::PurchaseOrderCreated(e) => e.occurred_at,
            PurchaseOrderEvent::LineAdded(e) => e.occurred_at,
            PurchaseOrderEvent::LineUpdated(e) => e.occurred_at,
            PurchaseOrderEvent::LineRemoved(e) => e.occurred_at,
            PurchaseOrderEvent::WorkflowTransitioned(e) => e.occurred_at,
            PurchaseOrderEvent::ReceiptsReconciled(e) => e.occurred_at,
        }
    }
}

impl Aggregate for PurchaseOrder {
    type Command = PurchaseOrderCommand;
    type Event = PurchaseOrderEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            PurchaseOrderEvent::PurchaseOrderCreated(e) => {
                self.id = e.order_id;
                self.tenant_id = Some(e.tenant_id);
                self.po_number = Some(e.po_number.clone());
                self.principal = Some(e.principal.clone());
                self.stage = Stage::Draft;
                self.lines = e.lines.clone();
                self.history = vec![HistoryEntry {
                    action: WorkflowAction::Create,
                    action_by: e.created_by,
                    action_date: e.occurred_at,
                    remarks: None,
                    stage: Stage::Draft,
                }];
                self.qc_outstanding = false;
                self.created_by = Some(e.created_by);
                self.created = true;
            }
            PurchaseOrderEvent::LineAdded(e) => {
                self.lines.push(e.line.clone());
            }
            PurchaseOrderEvent::LineUpdated(e) => {
                if let Some(line) = self.lines.iter_mut().find(|l| l.line_no == e.line.line_no) {
                    *line = e.line.clone();
                }
            }
            PurchaseOrderEvent::LineRemoved(e) => {
                self.lines.retain(|l| l.line_no != e.line_no);
            }
            PurchaseOrderEvent::WorkflowTransitioned(e) => {
                self.stage = e.to;
                self.history.push(HistoryEntry {
                    action: e.action,
                    action_by: e.actor,
                    action_date: e.occurred_at,
                    remarks: e.remarks.clone(),
                    stage: e.to,
                });
            }
            PurchaseOrderEvent::ReceiptsReconciled(e) => {
                for receipt in &e.lines {
                    if let Some(line) = self.lines.iter_mut().find(|l| l.line_no == receipt.line_no) {
                        line.received_qty = receipt.received_qty;
                        line.backlog_qty = receipt.backlog_qty;
                    }
                }
                self.qc_outstanding = e.qc_outstanding;
            }
        }

        // Deterministic version tracking: +1 per applied event.
        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            PurchaseOrderCommand::CreatePurchaseOrder(cmd) => self.handle_create(cmd),
            PurchaseOrderCommand::AddLine(cmd) => self.handle_add_line(cmd),
            PurchaseOrderCommand::UpdateLine(cmd) => self.handle_update_line(cmd),
            PurchaseOrderCommand::RemoveLine(cmd) => self.handle_remove_line(cmd),
            PurchaseOrderCommand::Transition(cmd) => self.handle_transition(cmd),
            PurchaseOrderCommand::SyncReceipts(cmd) => self.handle_sync_receipts(cmd),
        }
    }
}

fn require(session: &Session, permission: &Permission) -> Result<(), DomainError> {
    authorize(session, permission).map_err(DomainError::from)
}

fn validate_lines(lines: &[LineInput]) -> Result<(), DomainError> {
    let mut violations = Violations::new();
    for (idx, line) in lines.iter().enumerate() {
        line.validate_into(&format!("products[{idx}]"), &mut violations);
    }
    violations.into_result()
}

/// Line and order-total checks for the lines of a new purchase order.
pub fn validate_order_lines(lines: &[LineInput]) -> Result<(), DomainError> {
    validate_lines(lines)?;
    let priced: Vec<ProductLine> = lines
        .iter()
        .enumerate()
        .map(|(idx, input)| ProductLine::from_input(idx as u32 + 1, input))
        .collect();
    check_order_total(&priced)
}

fn check_order_total(lines: &[ProductLine]) -> Result<(), DomainError> {
    if OrderTotals::checked_of(lines).is_none() {
        let mut violations = Violations::new();
        violations.add(
            ViolationKind::Invalid,
            "products",
            "order total exceeds the supported range",
        );
        return violations.into_result();
    }
    Ok(())
}

impl PurchaseOrder {
    /// Existence, tenant and id checks shared by every command on a created order.
    fn ensure_target(&self, session: &Session, order_id: PurchaseOrderId) -> Result<(), DomainError> {
        if !self.created {
            return Err(DomainError::not_found());
        }
        if self.tenant_id != Some(session.tenant_id()) {
            return Err(DomainError::invariant("tenant mismatch"));
        }
        if self.id != order_id {
            return Err(DomainError::invariant("order_id mismatch"));
        }
        Ok(())
    }

    fn ensure_draft(&self, action: &str) -> Result<(), DomainError> {
        if self.stage != Stage::Draft {
            return Err(DomainError::invalid_transition(self.stage, action));
        }
        Ok(())
    }

    fn handle_create(
        &self,
        cmd: &CreatePurchaseOrder,
    ) -> Result<Vec<PurchaseOrderEvent>, DomainError> {
        require(&cmd.session, &purchase_orders::CREATE)?;

        if self.created {
            return Err(DomainError::conflict("purchase order already exists"));
        }

        validate_order_lines(&cmd.lines)?;

        let lines = cmd
            .lines
            .iter()
            .enumerate()
            .map(|(idx, input)| ProductLine::from_input(idx as u32 + 1, input))
            .collect();

        Ok(vec![PurchaseOrderEvent::PurchaseOrderCreated(
            PurchaseOrderCreated {
                tenant_id: cmd.session.tenant_id(),
                order_id: cmd.order_id,
                po_number: cmd.po_number.clone(),
                principal: cmd.principal.clone(),
                lines,
                created_by: cmd.session.user_id,
                occurred_at: cmd.occurred_at,
            },
        )])
    }

    fn handle_add_line(&self, cmd: &AddLine) -> Result<Vec<PurchaseOrderEvent>, DomainError> {
        self.ensure_target(&cmd.session, cmd.order_id)?;
        require(&cmd.session, &purchase_orders::UPDATE)?;
        self.ensure_draft("add_line")?;
        validate_lines(std::slice::from_ref(&cmd.line))?;

        let next_line_no = self.lines.iter().map(|l| l.line_no).max().unwrap_or(0) + 1;
        let line = ProductLine::from_input(next_line_no, &cmd.line);
        let mut prospective = self.lines.clone();
        prospective.push(line.clone());
        check_order_total(&prospective)?;

        Ok(vec![PurchaseOrderEvent::LineAdded(LineAdded {
            tenant_id: cmd.session.tenant_id(),
            order_id: cmd.order_id,
            line,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_update_line(&self, cmd: &UpdateLine) -> Result<Vec<PurchaseOrderEvent>, DomainError> {
        self.ensure_target(&cmd.session, cmd.order_id)?;
        require(&cmd.session, &purchase_orders::UPDATE)?;
        self.ensure_draft("update_line")?;
        if self.line(cmd.line_no).is_none() {
            return Err(DomainError::not_found());
        }
        validate_lines(std::slice::from_ref(&cmd.line))?;

        let line = ProductLine::from_input(cmd.line_no, &cmd.line);
        let prospective: Vec<ProductLine> = self
            .lines
            .iter()
            .map(|l| if l.line_no == cmd.line_no { line.clone() } else { l.clone() })
            .collect();
        check_order_total(&prospective)?;

        Ok(vec![PurchaseOrderEvent::LineUpdated(LineUpdated {
            tenant_id: cmd.session.tenant_id(),
            order_id: cmd.order_id,
            line,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_remove_line(&self, cmd: &RemoveLine) -> Result<Vec<PurchaseOrderEvent>, DomainError> {
        self.ensure_target(&cmd.session, cmd.order_id)?;
        require(&cmd.session, &purchase_orders::UPDATE)?;
        self.ensure_draft("remove_line")?;
        if self.line(cmd.line_no).is_none() {
            return Err(DomainError::not_found());
        }

        Ok(vec![PurchaseOrderEvent::LineRemoved(LineRemoved {
            tenant_id: cmd.session.tenant_id(),
            order_id: cmd.order_id,
            line_no: cmd.line_no,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_transition(&self, cmd: &Transition) -> Result<Vec<PurchaseOrderEvent>, DomainError> {
        // Remarks are checked before anything else: a reject without remarks
        // fails the same way whatever the order's state.
        cmd.request.validate()?;
        self.ensure_target(&cmd.session, cmd.order_id)?;

        let action = cmd.request.action();
        if let Some(permission) = action.required_permission() {
            require(&cmd.session, &permission)?;
        }

        let to = next_stage(self.stage, action)
            .ok_or_else(|| DomainError::invalid_transition(self.stage, action))?;

        if action == WorkflowAction::Submit && !self.lines.iter().any(|l| l.quantity > 0) {
            return Err(DomainError::validation(
                "products",
                "at least one line with a positive quantity is required",
            ));
        }

        Ok(vec![PurchaseOrderEvent::WorkflowTransitioned(
            WorkflowTransitioned {
                tenant_id: cmd.session.tenant_id(),
                order_id: cmd.order_id,
                action,
                from: self.stage,
                to,
                actor: cmd.session.user_id,
                remarks: cmd.request.remarks().map(str::to_string),
                occurred_at: cmd.occurred_at,
            },
        )])
    }

    fn handle_sync_receipts(
        &self,
        cmd: &SyncReceipts,
    ) -> Result<Vec<PurchaseOrderEvent>, DomainError> {
        self.ensure_target(&cmd.session, cmd.order_id)?;

        if !self.stage.accepts_receipts() {
            return Err(DomainError::invalid_transition(self.stage, "sync_receipts"));
        }

        let reconciliation = reconcile(&self.lines, &cmd.entries);
        let mut events = Vec::new();

        if reconciliation.differs_from(&self.lines) || cmd.qc_outstanding != self.qc_outstanding {
            events.push(PurchaseOrderEvent::ReceiptsReconciled(ReceiptsReconciled {
                tenant_id: cmd.session.tenant_id(),
                order_id: cmd.order_id,
                lines: reconciliation
                    .lines
                    .iter()
                    .map(|l| LineReceipt {
                        line_no: l.line_no,
                        received_qty: l.received_qty,
                        backlog_qty: l.backlog_qty,
                    })
                    .collect(),
                qc_outstanding: cmd.qc_outstanding,
                occurred_at: cmd.occurred_at,
            }));
        }

        if let Some((to, action)) =
            receipt_stage(self.stage, reconciliation.level(), cmd.qc_outstanding)
        {
            events.push(PurchaseOrderEvent::WorkflowTransitioned(
                WorkflowTransitioned {
                    tenant_id: cmd.session.tenant_id(),
                    order_id: cmd.order_id,
                    action,
                    from: self.stage,
                    to,
                    actor: cmd.session.user_id,
                    remarks: None,
                    occurred_at: cmd.occurred_at,
                },
            ));
        }

        Ok(events)
    }
}

#[cfg(test)]
mod tests {
    use chrono::{NaiveDate, TimeZone};
    use proptest::prelude::*;

    use medprocure_auth::resources;
    use medprocure_core::{ProductId, ViolationKind};
    use medprocure_events::execute;

    use super::*;
    use crate::number::PoNumberFormat;

    fn test_time() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 15, 9, 30, 0).unwrap()
    }

    fn admin(tenant_id: TenantId) -> Session {
        Session::with_permissions(UserId::new(), tenant_id, [Permission::from_static("*")])
    }

    fn po_number() -> PoNumber {
        PoNumber::generate(
            &PoNumberFormat::default(),
            "Acme",
            NaiveDate::from_ymd_opt(2024, 1, 15).unwrap(),
            1,
        )
        .unwrap()
    }

    fn principal() -> PrincipalRef {
        PrincipalRef {
            id: PrincipalId::new(),
            code: "ACME".to_string(),
            name: "Acme Pharmaceuticals".to_string(),
        }
    }

    struct Fixture {
        order: PurchaseOrder,
        session: Session,
        product_id: ProductId,
    }

    impl Fixture {
        fn draft() -> Self {
            let session = admin(TenantId::new());
            let order_id = PurchaseOrderId::new(AggregateId::new());
            let product_id = ProductId::new();
            let mut order = PurchaseOrder::empty(order_id);
            execute(
                &mut order,
                &PurchaseOrderCommand::CreatePurchaseOrder(CreatePurchaseOrder {
                    session: session.clone(),
                    order_id,
                    po_number: po_number(),
                    principal: principal(),
                    lines: vec![LineInput::new(product_id, 100, 1_250)],
                    occurred_at: test_time(),
                }),
            )
            .unwrap();
            Self {
                order,
                session,
                product_id,
            }
        }

        fn transition(&mut self, request: WorkflowRequest) -> Result<Vec<PurchaseOrderEvent>, DomainError> {
            self.transition_as(self.session.clone(), request)
        }

        fn transition_as(
            &mut self,
            session: Session,
            request: WorkflowRequest,
        ) -> Result<Vec<PurchaseOrderEvent>, DomainError> {
            let cmd = PurchaseOrderCommand::Transition(Transition {
                session,
                order_id: self.order.id_typed(),
                request,
                occurred_at: test_time(),
            });
            execute(&mut self.order, &cmd)
        }

        fn ordered() -> Self {
            let mut f = Self::draft();
            f.transition(WorkflowRequest::Submit { remarks: None }).unwrap();
            f.transition(WorkflowRequest::Approve { remarks: None }).unwrap();
            f.transition(WorkflowRequest::Send { remarks: None }).unwrap();
            f
        }

        fn sync(&mut self, quantities: &[i64], qc_outstanding: bool) -> Result<Vec<PurchaseOrderEvent>, DomainError> {
            let cmd = PurchaseOrderCommand::SyncReceipts(SyncReceipts {
                session: self.session.clone(),
                order_id: self.order.id_typed(),
                entries: quantities
                    .iter()
                    .map(|q| ReceiptEntry {
                        po_line_no: 1,
                        product_id: self.product_id,
                        quantity: *q,
                    })
                    .collect(),
                qc_outstanding,
                occurred_at: test_time(),
            });
            execute(&mut self.order, &cmd)
        }
    }

    fn request_for(action: WorkflowAction) -> WorkflowRequest {
        match action {
            WorkflowAction::Submit => WorkflowRequest::Submit { remarks: None },
            WorkflowAction::Approve => WorkflowRequest::Approve { remarks: None },
            WorkflowAction::Reject => WorkflowRequest::Reject {
                remarks: "not needed".to_string(),
            },
            WorkflowAction::Cancel => WorkflowRequest::Cancel { remarks: None },
            WorkflowAction::Send => WorkflowRequest::Send { remarks: None },
            WorkflowAction::Complete => WorkflowRequest::Complete { remarks: None },
            other => panic!("{other} is not a manual action"),
        }
    }

    /// Rehydrate a created order sitting at `stage`.
    fn order_at(stage: Stage) -> (PurchaseOrder, Session) {
        let mut f = Fixture::draft();
        if stage != Stage::Draft {
            let tenant_id = f.session.tenant_id();
            f.order.apply(&PurchaseOrderEvent::WorkflowTransitioned(WorkflowTransitioned {
                tenant_id,
                order_id: f.order.id_typed(),
                action: WorkflowAction::Submit,
                from: Stage::Draft,
                to: stage,
                actor: f.session.user_id,
                remarks: None,
                occurred_at: test_time(),
            }));
        }
        (f.order, f.session)
    }

    #[test]
    fn create_starts_in_draft_with_one_history_entry() {
        let f = Fixture::draft();
        assert_eq!(f.order.stage(), Stage::Draft);
        assert_eq!(f.order.history().len(), 1);
        assert_eq!(f.order.history()[0].action, WorkflowAction::Create);
        assert_eq!(f.order.version(), 1);
        assert_eq!(f.order.po_number().unwrap().as_str(), "PO-ACME-20240115-0001");
        assert_eq!(f.order.totals().grand_total, 125_000);
    }

    #[test]
    fn create_requires_create_permission() {
        let tenant_id = TenantId::new();
        let session = Session::with_permissions(UserId::new(), tenant_id, [resources::purchase_orders::SUBMIT]);
        let order_id = PurchaseOrderId::new(AggregateId::new());
        let order = PurchaseOrder::empty(order_id);

        let err = order
            .handle(&PurchaseOrderCommand::CreatePurchaseOrder(CreatePurchaseOrder {
                session,
                order_id,
                po_number: po_number(),
                principal: principal(),
                lines: vec![],
                occurred_at: test_time(),
            }))
            .unwrap_err();
        assert_eq!(err, DomainError::PermissionDenied("purchase_orders.create".to_string()));
    }

    #[test]
    fn create_reports_every_invalid_line() {
        let session = admin(TenantId::new());
        let order_id = PurchaseOrderId::new(AggregateId::new());
        let order = PurchaseOrder::empty(order_id);

        let err = order
            .handle(&PurchaseOrderCommand::CreatePurchaseOrder(CreatePurchaseOrder {
                session,
                order_id,
                po_number: po_number(),
                principal: principal(),
                lines: vec![
                    LineInput::new(ProductId::new(), -1, 10),
                    LineInput::new(ProductId::new(), 2, 10).with_foc(3),
                ],
                occurred_at: test_time(),
            }))
            .unwrap_err();

        let fields: Vec<String> = err.violations().into_iter().map(|v| v.field).collect();
        assert_eq!(fields, vec!["products[0].quantity", "products[1].foc"]);
    }

    #[test]
    fn order_totals_past_u64_are_refused() {
        let session = admin(TenantId::new());
        let order_id = PurchaseOrderId::new(AggregateId::new());
        let half = LineInput::new(ProductId::new(), 1, u64::MAX / 2 + 1);

        let err = PurchaseOrder::empty(order_id)
            .handle(&PurchaseOrderCommand::CreatePurchaseOrder(CreatePurchaseOrder {
                session,
                order_id,
                po_number: po_number(),
                principal: principal(),
                lines: vec![half.clone(), half.clone()],
                occurred_at: test_time(),
            }))
            .unwrap_err();
        let fields: Vec<String> = err.violations().into_iter().map(|v| v.field).collect();
        assert_eq!(fields, vec!["products"]);

        let mut f = Fixture::draft();
        let add = |line: LineInput, f: &Fixture| {
            PurchaseOrderCommand::AddLine(AddLine {
                session: f.session.clone(),
                order_id: f.order.id_typed(),
                line,
                occurred_at: test_time(),
            })
        };
        let cmd = add(half.clone(), &f);
        execute(&mut f.order, &cmd).unwrap();
        let cmd = add(half, &f);
        let err = execute(&mut f.order, &cmd).unwrap_err();
        assert!(err.is_kind(ViolationKind::Invalid));
        assert_eq!(f.order.lines().len(), 2);
    }

    #[test]
    fn happy_path_to_ordered_records_each_step() {
        let f = Fixture::ordered();
        assert_eq!(f.order.stage(), Stage::Ordered);

        let actions: Vec<WorkflowAction> = f.order.history().iter().map(|h| h.action).collect();
        assert_eq!(
            actions,
            vec![
                WorkflowAction::Create,
                WorkflowAction::Submit,
                WorkflowAction::Approve,
                WorkflowAction::Send
            ]
        );
        assert_eq!(f.order.history().last().unwrap().stage, Stage::Ordered);
    }

    #[test]
    fn reject_without_remarks_fails_in_every_stage() {
        for stage in Stage::ALL {
            let (mut order, session) = order_at(stage);
            let before = order.clone();
            let err = execute(
                &mut order,
                &PurchaseOrderCommand::Transition(Transition {
                    session,
                    order_id: before.id_typed(),
                    request: WorkflowRequest::Reject {
                        remarks: String::new(),
                    },
                    occurred_at: test_time(),
                }),
            )
            .unwrap_err();

            assert!(
                matches!(&err, DomainError::Validation(v) if v.iter().any(|x| x.field == "remarks")),
                "stage {stage}: {err:?}"
            );
            assert_eq!(order, before);
        }
    }

    #[test]
    fn approve_without_permission_is_denied_and_leaves_order_unchanged() {
        let mut f = Fixture::draft();
        f.transition(WorkflowRequest::Submit { remarks: None }).unwrap();
        let before = f.order.clone();

        let clerk = Session::with_permissions(
            UserId::new(),
            f.session.tenant_id(),
            [resources::purchase_orders::SUBMIT],
        );
        let err = f
            .transition_as(clerk, WorkflowRequest::Approve { remarks: None })
            .unwrap_err();

        assert_eq!(
            err,
            DomainError::PermissionDenied("purchase_orders.approve_level1".to_string())
        );
        assert!(err.is_kind(ViolationKind::PermissionDenied));
        assert_eq!(f.order, before);
    }

    #[test]
    fn approve_from_draft_names_state_and_action() {
        let mut f = Fixture::draft();
        let err = f.transition(WorkflowRequest::Approve { remarks: None }).unwrap_err();
        assert_eq!(
            err,
            DomainError::InvalidTransition {
                state: "draft".to_string(),
                action: "approve".to_string()
            }
        );
    }

    #[test]
    fn submit_requires_a_positive_line() {
        let mut f = Fixture::draft();
        let cmd = PurchaseOrderCommand::RemoveLine(RemoveLine {
            session: f.session.clone(),
            order_id: f.order.id_typed(),
            line_no: 1,
            occurred_at: test_time(),
        });
        execute(&mut f.order, &cmd).unwrap();

        let err = f.transition(WorkflowRequest::Submit { remarks: None }).unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
        assert_eq!(f.order.stage(), Stage::Draft);
    }

    #[test]
    fn lines_are_frozen_after_submit() {
        let mut f = Fixture::draft();
        let add = PurchaseOrderCommand::AddLine(AddLine {
            session: f.session.clone(),
            order_id: f.order.id_typed(),
            line: LineInput::new(ProductId::new(), 5, 10),
            occurred_at: test_time(),
        });
        execute(&mut f.order, &add).unwrap();
        assert_eq!(f.order.lines().iter().map(|l| l.line_no).collect::<Vec<_>>(), vec![1, 2]);

        f.transition(WorkflowRequest::Submit { remarks: None }).unwrap();
        let err = execute(&mut f.order, &add).unwrap_err();
        assert!(matches!(err, DomainError::InvalidTransition { ref action, .. } if action == "add_line"));
    }

    #[test]
    fn line_numbers_stay_stable_after_removal() {
        let mut f = Fixture::draft();
        for _ in 0..2 {
            let add = PurchaseOrderCommand::AddLine(AddLine {
                session: f.session.clone(),
                order_id: f.order.id_typed(),
                line: LineInput::new(ProductId::new(), 1, 10),
                occurred_at: test_time(),
            });
            execute(&mut f.order, &add).unwrap();
        }
        let remove = PurchaseOrderCommand::RemoveLine(RemoveLine {
            session: f.session.clone(),
            order_id: f.order.id_typed(),
            line_no: 3,
            occurred_at: test_time(),
        });
        execute(&mut f.order, &remove).unwrap();
        let add = PurchaseOrderCommand::AddLine(AddLine {
            session: f.session.clone(),
            order_id: f.order.id_typed(),
            line: LineInput::new(ProductId::new(), 1, 10),
            occurred_at: test_time(),
        });
        execute(&mut f.order, &add).unwrap();
        assert_eq!(f.order.lines().iter().map(|l| l.line_no).collect::<Vec<_>>(), vec![1, 2, 3]);
    }

    #[test]
    fn receipts_drive_partial_then_over_received() {
        let mut f = Fixture::ordered();

        f.sync(&[60], false).unwrap();
        let line = f.order.line(1).unwrap();
        assert_eq!((line.received_qty, line.backlog_qty), (60, 40));
        assert_eq!(f.order.stage(), Stage::PartialReceived);

        f.sync(&[60, 50], false).unwrap();
        let line = f.order.line(1).unwrap();
        assert_eq!((line.received_qty, line.backlog_qty), (110, 0));
        assert!(line.is_over_received());
        assert_eq!(f.order.stage(), Stage::Received);
    }

    #[test]
    fn reducing_a_receipt_restores_backlog() {
        let mut f = Fixture::ordered();
        f.sync(&[100], false).unwrap();
        assert_eq!(f.order.stage(), Stage::Received);

        f.sync(&[70], false).unwrap();
        let line = f.order.line(1).unwrap();
        assert_eq!(line.backlog_qty, 30);
        assert_eq!(f.order.stage(), Stage::PartialReceived);
    }

    #[test]
    fn qc_hold_then_clearance_completes_the_order() {
        let mut f = Fixture::ordered();
        f.sync(&[100], true).unwrap();
        assert_eq!(f.order.stage(), Stage::QcPending);
        assert!(f.order.qc_outstanding());

        let events = f.sync(&[100], false).unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(f.order.stage(), Stage::Completed);
        assert_eq!(f.order.history().last().unwrap().action, WorkflowAction::QcCleared);
    }

    #[test]
    fn unchanged_receipts_emit_nothing() {
        let mut f = Fixture::ordered();
        f.sync(&[10], false).unwrap();
        let version = f.order.version();
        assert!(f.sync(&[10], false).unwrap().is_empty());
        assert_eq!(f.order.version(), version);
    }

    #[test]
    fn receipts_are_refused_before_the_order_is_sent() {
        let mut f = Fixture::draft();
        let err = f.sync(&[1], false).unwrap_err();
        assert!(matches!(err, DomainError::InvalidTransition { ref state, .. } if state == "draft"));
    }

    #[test]
    fn complete_closes_a_received_order() {
        let mut f = Fixture::ordered();
        f.sync(&[100], false).unwrap();
        f.transition(WorkflowRequest::Complete { remarks: Some("all good".to_string()) })
            .unwrap();
        assert_eq!(f.order.stage(), Stage::Completed);
        assert_eq!(f.order.history().last().unwrap().remarks.as_deref(), Some("all good"));
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 256,
            ..ProptestConfig::default()
        })]

        /// Property: legal (stage, action) pairs append exactly one history entry;
        /// illegal pairs fail with InvalidTransition and change nothing.
        #[test]
        fn transition_table_is_enforced(
            stage_idx in 0usize..Stage::ALL.len(),
            action_idx in 0usize..WorkflowAction::MANUAL.len(),
        ) {
            let stage = Stage::ALL[stage_idx];
            let action = WorkflowAction::MANUAL[action_idx];
            let (mut order, session) = order_at(stage);
            let before = order.clone();

            let result = execute(
                &mut order,
                &PurchaseOrderCommand::Transition(Transition {
                    session,
                    order_id: before.id_typed(),
                    request: request_for(action),
                    occurred_at: test_time(),
                }),
            );

            match next_stage(stage, action) {
                Some(to) => {
                    let events = result.unwrap();
                    prop_assert_eq!(events.len(), 1);
                    prop_assert_eq!(order.history().len(), before.history().len() + 1);
                    prop_assert_eq!(order.stage(), to);
                    prop_assert_eq!(order.history().last().unwrap().action, action);
                }
                None => {
                    let is_invalid_transition = matches!(result, Err(DomainError::InvalidTransition { .. }));
                    prop_assert!(is_invalid_transition);
                    prop_assert_eq!(&order, &before);
                }
            }
        }
    }
}

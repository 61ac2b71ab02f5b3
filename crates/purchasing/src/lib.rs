//! Purchasing domain module (purchase orders, event-sourced).
//!
//! Business rules only: line pricing, PO numbering, the approval workflow and
//! receipt reconciliation. No IO, no HTTP, no storage.

pub mod line;
pub mod number;
pub mod order;
pub mod reconciliation;
pub mod workflow;

pub use line::{BASIS_POINTS, Discount, LineInput, OrderTotals, ProductLine};
pub use number::{PoNumber, PoNumberFormat, normalize_principal_code};
pub use order::{
    AddLine, CreatePurchaseOrder, LineAdded, LineReceipt, LineRemoved, LineUpdated, PrincipalRef,
    PurchaseOrder, PurchaseOrderCommand, PurchaseOrderCreated, PurchaseOrderEvent,
    PurchaseOrderId, ReceiptsReconciled, RemoveLine, SyncReceipts, Transition, UpdateLine,
    WorkflowTransitioned, validate_order_lines,
};
pub use reconciliation::{
    LineReconciliation, ReceiptEntry, ReceiptLevel, Reconciliation, reconcile,
};
pub use workflow::{
    HistoryEntry, Stage, WorkflowAction, WorkflowRequest, next_stage, receipt_stage,
};

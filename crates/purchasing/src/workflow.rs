//! Purchase-order workflow: stages, actions, the transition table and history.
//!
//! ```text
//! draft → pending_approval → approved → ordered → {partial_received, received}
//!       → qc_pending → completed
//! rejected  ← pending_approval | approved
//! cancelled ← draft | pending_approval
//! ```
//!
//! Manual actions are permission-gated; the receipt-driven moves after `ordered`
//! are derived from reconciliation (see [`receipt_stage`]).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use medprocure_auth::{Permission, resources::purchase_orders};
use medprocure_core::{DomainError, DomainResult, UserId};

use crate::reconciliation::ReceiptLevel;

/// Purchase-order stage (`status` and `currentStage` are the same value).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Draft,
    PendingApproval,
    Approved,
    Ordered,
    PartialReceived,
    Received,
    QcPending,
    Completed,
    Cancelled,
    Rejected,
}

impl Stage {
    pub const ALL: [Stage; 10] = [
        Stage::Draft,
        Stage::PendingApproval,
        Stage::Approved,
        Stage::Ordered,
        Stage::PartialReceived,
        Stage::Received,
        Stage::QcPending,
        Stage::Completed,
        Stage::Cancelled,
        Stage::Rejected,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Stage::Draft => "draft",
            Stage::PendingApproval => "pending_approval",
            Stage::Approved => "approved",
            Stage::Ordered => "ordered",
            Stage::PartialReceived => "partial_received",
            Stage::Received => "received",
            Stage::QcPending => "qc_pending",
            Stage::Completed => "completed",
            Stage::Cancelled => "cancelled",
            Stage::Rejected => "rejected",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Stage::Completed | Stage::Cancelled | Stage::Rejected)
    }

    /// Stages in which invoice receivings may be recorded or changed.
    pub fn accepts_receipts(self) -> bool {
        matches!(
            self,
            Stage::Ordered | Stage::PartialReceived | Stage::Received | Stage::QcPending
        )
    }
}

impl core::fmt::Display for Stage {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Every action recorded in the workflow history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowAction {
    Create,
    Submit,
    Approve,
    Reject,
    Cancel,
    Send,
    Complete,
    /// Receipt-driven: quantities moved the order between ordered/partial/received.
    Receive,
    /// Receipt-driven: fully received but QC is outstanding.
    QcHold,
    /// Receipt-driven: QC cleared on a fully received order.
    QcCleared,
}

impl WorkflowAction {
    pub const MANUAL: [WorkflowAction; 6] = [
        WorkflowAction::Submit,
        WorkflowAction::Approve,
        WorkflowAction::Reject,
        WorkflowAction::Cancel,
        WorkflowAction::Send,
        WorkflowAction::Complete,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            WorkflowAction::Create => "create",
            WorkflowAction::Submit => "submit",
            WorkflowAction::Approve => "approve",
            WorkflowAction::Reject => "reject",
            WorkflowAction::Cancel => "cancel",
            WorkflowAction::Send => "send",
            WorkflowAction::Complete => "complete",
            WorkflowAction::Receive => "receive",
            WorkflowAction::QcHold => "qc_hold",
            WorkflowAction::QcCleared => "qc_cleared",
        }
    }

    /// Permission gating a manual action; receipt-driven actions have none.
    pub fn required_permission(self) -> Option<Permission> {
        match self {
            WorkflowAction::Create => Some(purchase_orders::CREATE),
            WorkflowAction::Submit => Some(purchase_orders::SUBMIT),
            WorkflowAction::Approve => Some(purchase_orders::APPROVE_LEVEL1),
            WorkflowAction::Reject => Some(purchase_orders::REJECT),
            WorkflowAction::Cancel => Some(purchase_orders::CANCEL),
            WorkflowAction::Send => Some(purchase_orders::SEND),
            WorkflowAction::Complete => Some(purchase_orders::COMPLETE),
            WorkflowAction::Receive | WorkflowAction::QcHold | WorkflowAction::QcCleared => None,
        }
    }
}

impl core::fmt::Display for WorkflowAction {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Transition table for manual actions. `None` means the pair is illegal.
pub fn next_stage(from: Stage, action: WorkflowAction) -> Option<Stage> {
    use Stage::*;
    use WorkflowAction as A;

    match (from, action) {
        (Draft, A::Submit) => Some(PendingApproval),
        (PendingApproval, A::Approve) => Some(Approved),
        (PendingApproval | Approved, A::Reject) => Some(Rejected),
        (Draft | PendingApproval, A::Cancel) => Some(Cancelled),
        (Approved, A::Send) => Some(Ordered),
        (Received, A::Complete) => Some(Completed),
        _ => None,
    }
}

/// Stage the receipt state calls for, with the history action, if it differs
/// from `current`. Only meaningful when `current.accepts_receipts()`.
pub fn receipt_stage(
    current: Stage,
    level: ReceiptLevel,
    qc_outstanding: bool,
) -> Option<(Stage, WorkflowAction)> {
    let target = match level {
        ReceiptLevel::None => Stage::Ordered,
        ReceiptLevel::Partial => Stage::PartialReceived,
        ReceiptLevel::Full if qc_outstanding => Stage::QcPending,
        ReceiptLevel::Full if current == Stage::QcPending => Stage::Completed,
        ReceiptLevel::Full => Stage::Received,
    };

    if target == current {
        return None;
    }

    let action = match target {
        Stage::QcPending => WorkflowAction::QcHold,
        Stage::Completed => WorkflowAction::QcCleared,
        _ => WorkflowAction::Receive,
    };
    Some((target, action))
}

/// A manual workflow request, one variant per action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum WorkflowRequest {
    Submit {
        #[serde(default)]
        remarks: Option<String>,
    },
    Approve {
        #[serde(default)]
        remarks: Option<String>,
    },
    Reject {
        remarks: String,
    },
    Cancel {
        #[serde(default)]
        remarks: Option<String>,
    },
    Send {
        #[serde(default)]
        remarks: Option<String>,
    },
    Complete {
        #[serde(default)]
        remarks: Option<String>,
    },
}

impl WorkflowRequest {
    pub fn action(&self) -> WorkflowAction {
        match self {
            WorkflowRequest::Submit { .. } => WorkflowAction::Submit,
            WorkflowRequest::Approve { .. } => WorkflowAction::Approve,
            WorkflowRequest::Reject { .. } => WorkflowAction::Reject,
            WorkflowRequest::Cancel { .. } => WorkflowAction::Cancel,
            WorkflowRequest::Send { .. } => WorkflowAction::Send,
            WorkflowRequest::Complete { .. } => WorkflowAction::Complete,
        }
    }

    /// Trimmed remarks, `None` when absent or blank.
    pub fn remarks(&self) -> Option<&str> {
        let raw = match self {
            WorkflowRequest::Reject { remarks } => Some(remarks.as_str()),
            WorkflowRequest::Submit { remarks }
            | WorkflowRequest::Approve { remarks }
            | WorkflowRequest::Cancel { remarks }
            | WorkflowRequest::Send { remarks }
            | WorkflowRequest::Complete { remarks } => remarks.as_deref(),
        };
        raw.map(str::trim).filter(|r| !r.is_empty())
    }

    /// Boundary validation, independent of order state.
    pub fn validate(&self) -> DomainResult<()> {
        if self.action() == WorkflowAction::Reject && self.remarks().is_none() {
            return Err(DomainError::validation(
                "remarks",
                "remarks are required to reject a purchase order",
            ));
        }
        Ok(())
    }
}

/// One append-only audit entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub action: WorkflowAction,
    pub action_by: UserId,
    pub action_date: DateTime<Utc>,
    pub remarks: Option<String>,
    /// Stage the order was in after this action.
    pub stage: Stage,
}

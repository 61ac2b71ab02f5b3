//! Received/backlog derivation for purchase-order lines.
//!
//! The calculator never clamps: when receipts exceed the ordered quantity the
//! true received figure and the excess are reported, and the caller decides how
//! to flag it.

use serde::{Deserialize, Serialize};

use medprocure_core::ProductId;

use crate::line::ProductLine;

/// One received entry (a batch on a receiving) counted against a PO line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReceiptEntry {
    pub po_line_no: u32,
    pub product_id: ProductId,
    pub quantity: i64,
}

/// How much of the order has arrived.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReceiptLevel {
    None,
    Partial,
    Full,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineReconciliation {
    pub line_no: u32,
    pub product_id: ProductId,
    pub ordered_qty: i64,
    pub received_qty: i64,
    pub backlog_qty: i64,
    /// `max(0, received - ordered)`.
    pub excess_qty: i64,
}

impl LineReconciliation {
    pub fn is_over_received(&self) -> bool {
        self.excess_qty > 0
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reconciliation {
    pub lines: Vec<LineReconciliation>,
    /// Entries whose line number/product does not exist on the order.
    pub unmatched: Vec<ReceiptEntry>,
}

impl Reconciliation {
    pub fn line(&self, line_no: u32) -> Option<&LineReconciliation> {
        self.lines.iter().find(|l| l.line_no == line_no)
    }

    pub fn total_received(&self) -> i64 {
        self.lines.iter().map(|l| l.received_qty).sum()
    }

    pub fn level(&self) -> ReceiptLevel {
        if self.total_received() == 0 {
            ReceiptLevel::None
        } else if self.lines.iter().all(|l| l.backlog_qty == 0) {
            ReceiptLevel::Full
        } else {
            ReceiptLevel::Partial
        }
    }

    pub fn over_received(&self) -> impl Iterator<Item = &LineReconciliation> {
        self.lines.iter().filter(|l| l.is_over_received())
    }

    pub fn is_over_received(&self) -> bool {
        self.over_received().next().is_some()
    }

    /// Whether applying this result would change the stored line figures.
    pub fn differs_from(&self, lines: &[ProductLine]) -> bool {
        lines.len() != self.lines.len()
            || lines.iter().zip(&self.lines).any(|(stored, fresh)| {
                stored.line_no != fresh.line_no
                    || stored.received_qty != fresh.received_qty
                    || stored.backlog_qty != fresh.backlog_qty
            })
    }
}

/// Sum every entry into its PO line and derive backlog/excess.
///
/// Entries are matched on `po_line_no` and must carry that line's product;
/// anything else lands in `unmatched`.
pub fn reconcile<'a>(
    lines: &[ProductLine],
    entries: impl IntoIterator<Item = &'a ReceiptEntry>,
) -> Reconciliation {
    let mut received: Vec<i64> = vec![0; lines.len()];
    let mut unmatched = Vec::new();

    for entry in entries {
        match lines
            .iter()
            .position(|l| l.line_no == entry.po_line_no && l.product_id == entry.product_id)
        {
            Some(idx) => received[idx] = received[idx].saturating_add(entry.quantity),
            None => unmatched.push(entry.clone()),
        }
    }

    let lines = lines
        .iter()
        .zip(received)
        .map(|(line, received_qty)| LineReconciliation {
            line_no: line.line_no,
            product_id: line.product_id,
            ordered_qty: line.quantity,
            received_qty,
            backlog_qty: (line.quantity - received_qty).max(0),
            excess_qty: (received_qty - line.quantity).max(0),
        })
        .collect();

    Reconciliation { lines, unmatched }
}

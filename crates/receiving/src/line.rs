//! Received product lines: what arrived against which PO line, in which batch,
//! and where it stands in quality control.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use medprocure_core::{ProductId, UserId};
use medprocure_purchasing::ReceiptEntry;

/// Per-line quality-control outcome.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QcStatus {
    #[default]
    Pending,
    Passed,
    Failed,
}

impl QcStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            QcStatus::Pending => "pending",
            QcStatus::Passed => "passed",
            QcStatus::Failed => "failed",
        }
    }
}

impl core::fmt::Display for QcStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One QC review, kept in the line's append-only log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QcEntry {
    pub status: QcStatus,
    pub remarks: Option<String>,
    pub qc_by: UserId,
    pub qc_date: DateTime<Utc>,
}

/// The PO line as it stood when the receiving form was loaded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoLineSnapshot {
    pub po_line_no: u32,
    pub product_id: ProductId,
    pub ordered_qty: i64,
    /// Received by every other counting receiving.
    pub already_received: i64,
}

impl PoLineSnapshot {
    pub fn remaining_quantity(&self) -> i64 {
        (self.ordered_qty - self.already_received).max(0)
    }
}

/// User-entered values for one received entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReceivedLineInput {
    pub po_line_no: u32,
    pub product_id: ProductId,
    pub received_qty: i64,
    #[serde(default)]
    pub batch_number: Option<String>,
    #[serde(default)]
    pub manufacturing_date: Option<NaiveDate>,
    #[serde(default)]
    pub expiry_date: Option<NaiveDate>,
}

impl ReceivedLineInput {
    pub fn new(po_line_no: u32, product_id: ProductId, received_qty: i64) -> Self {
        Self {
            po_line_no,
            product_id,
            received_qty,
            batch_number: None,
            manufacturing_date: None,
            expiry_date: None,
        }
    }

    pub fn with_batch(mut self, batch_number: impl Into<String>) -> Self {
        self.batch_number = Some(batch_number.into());
        self
    }

    pub fn with_dates(mut self, manufacturing: Option<NaiveDate>, expiry: Option<NaiveDate>) -> Self {
        self.manufacturing_date = manufacturing;
        self.expiry_date = expiry;
        self
    }
}

/// A received entry as stored on the receiving.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReceivedProductLine {
    pub po_line_no: u32,
    pub product_id: ProductId,
    pub ordered_qty: i64,
    pub already_received: i64,
    pub received_qty: i64,
    pub batch_number: Option<String>,
    pub manufacturing_date: Option<NaiveDate>,
    pub expiry_date: Option<NaiveDate>,
    pub qc_status: QcStatus,
    pub qc_remarks: Option<String>,
    pub qc_by: Option<UserId>,
    pub qc_date: Option<DateTime<Utc>>,
    pub qc_log: Vec<QcEntry>,
}

impl ReceivedProductLine {
    pub fn new(input: &ReceivedLineInput, snapshot: &PoLineSnapshot) -> Self {
        Self {
            po_line_no: input.po_line_no,
            product_id: input.product_id,
            ordered_qty: snapshot.ordered_qty,
            already_received: snapshot.already_received,
            received_qty: input.received_qty,
            batch_number: input.batch_number.clone(),
            manufacturing_date: input.manufacturing_date,
            expiry_date: input.expiry_date,
            qc_status: QcStatus::Pending,
            qc_remarks: None,
            qc_by: None,
            qc_date: None,
            qc_log: Vec::new(),
        }
    }

    pub fn remaining_quantity(&self) -> i64 {
        (self.ordered_qty - self.already_received).max(0)
    }

    /// Only lines that actually received stock go through QC.
    pub fn requires_qc(&self) -> bool {
        self.received_qty > 0
    }

    pub fn record_qc(&mut self, entry: QcEntry) {
        self.qc_status = entry.status;
        self.qc_remarks = entry.remarks.clone();
        self.qc_by = Some(entry.qc_by);
        self.qc_date = Some(entry.qc_date);
        self.qc_log.push(entry);
    }

    pub fn receipt_entry(&self) -> ReceiptEntry {
        ReceiptEntry {
            po_line_no: self.po_line_no,
            product_id: self.product_id,
            quantity: self.received_qty,
        }
    }
}

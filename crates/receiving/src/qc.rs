use serde::{Deserialize, Serialize};

use crate::line::{QcStatus, ReceivedProductLine};

/// Receiving-level QC status derived from its lines.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QcSummary {
    #[default]
    Pending,
    Passed,
    Failed,
}

impl QcSummary {
    pub fn as_str(self) -> &'static str {
        match self {
            QcSummary::Pending => "pending",
            QcSummary::Passed => "passed",
            QcSummary::Failed => "failed",
        }
    }
}

impl core::fmt::Display for QcSummary {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Fold line statuses into one summary.
///
/// Only lines with a positive received quantity are considered. Any failure
/// wins; otherwise every considered line must have passed. A receiving with
/// nothing to inspect stays `Pending`.
pub fn aggregate_qc<'a>(lines: impl IntoIterator<Item = &'a ReceivedProductLine>) -> QcSummary {
    summarize(lines.into_iter().filter(|l| l.requires_qc()).map(|l| l.qc_status))
}

fn summarize(statuses: impl Iterator<Item = QcStatus>) -> QcSummary {
    let mut seen = false;
    let mut all_passed = true;
    for status in statuses {
        seen = true;
        match status {
            QcStatus::Failed => return QcSummary::Failed,
            QcStatus::Pending => all_passed = false,
            QcStatus::Passed => {}
        }
    }
    if seen && all_passed {
        QcSummary::Passed
    } else {
        QcSummary::Pending
    }
}

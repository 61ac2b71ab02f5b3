//! Purchase-order numbering: `{PREFIX}-{PRINCIPALCODE}-{YYYYMMDD}-{SEQ}`.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use medprocure_core::{DomainError, DomainResult};

/// Configurable parts of the PO number.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoNumberFormat {
    pub prefix: String,
    /// Zero-padding width of the daily sequence.
    pub sequence_width: usize,
}

impl Default for PoNumberFormat {
    fn default() -> Self {
        Self {
            prefix: "PO".to_string(),
            sequence_width: 4,
        }
    }
}

/// Upper-cased ASCII alphanumerics of a principal code ("Acme Pharma" → "ACMEPHARMA").
pub fn normalize_principal_code(code: &str) -> String {
    code.chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .map(|c| c.to_ascii_uppercase())
        .collect()
}

/// A generated purchase-order number.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PoNumber(String);

impl PoNumber {
    pub fn generate(
        format: &PoNumberFormat,
        principal_code: &str,
        date: NaiveDate,
        sequence: u32,
    ) -> DomainResult<Self> {
        let code = normalize_principal_code(principal_code);
        if code.is_empty() {
            return Err(DomainError::validation(
                "principal.code",
                "principal code must contain at least one letter or digit",
            ));
        }
        if sequence == 0 {
            return Err(DomainError::validation("sequence", "sequence starts at 1"));
        }

        Ok(Self(format!(
            "{}-{}-{}-{:0width$}",
            format.prefix,
            code,
            date.format("%Y%m%d"),
            sequence,
            width = format.sequence_width
        )))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl core::fmt::Display for PoNumber {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

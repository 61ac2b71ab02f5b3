//! Invoice-receiving validation.
//!
//! Every problem is collected into one [`Violations`] list addressed by field
//! path, so a form can highlight all of them at once.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use medprocure_core::{DomainResult, ViolationKind, Violations};

use crate::document::ReceivingDocument;
use crate::line::{PoLineSnapshot, ReceivedLineInput, ReceivedProductLine};

/// User-entered receiving header, lines and documents.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReceivingInput {
    pub invoice_number: String,
    pub received_date: NaiveDate,
    pub received_products: Vec<ReceivedLineInput>,
    #[serde(default)]
    pub documents: Vec<ReceivingDocument>,
    #[serde(default)]
    pub qc_required: bool,
    /// Explicitly record a receiving in which nothing arrived.
    #[serde(default)]
    pub acknowledge_zero_receiving: bool,
}

/// Validate `input` against the PO lines it was loaded for.
///
/// `today` is the business date of the command. On success returns the stored
/// form of every line, snapshot figures included.
pub fn validate_receiving(
    input: &ReceivingInput,
    po_lines: &[PoLineSnapshot],
    today: NaiveDate,
) -> DomainResult<Vec<ReceivedProductLine>> {
    let mut violations = Violations::new();
    let mut lines = Vec::with_capacity(input.received_products.len());

    if input.invoice_number.trim().is_empty() {
        violations.add(ViolationKind::Invalid, "invoice_number", "invoice number is required");
    }

    for (idx, entry) in input.received_products.iter().enumerate() {
        let field = format!("received_products[{idx}]");

        if entry.po_line_no == 0 {
            violations.add(ViolationKind::Invalid, format!("{field}.po_line_no"), "PO line numbers start at 1");
            continue;
        }
        let Some(snapshot) = po_lines.iter().find(|l| l.po_line_no == entry.po_line_no) else {
            violations.add(
                ViolationKind::Invalid,
                format!("{field}.po_line_no"),
                format!("PO line {} does not exist", entry.po_line_no),
            );
            continue;
        };
        if snapshot.product_id != entry.product_id {
            violations.add(
                ViolationKind::Invalid,
                format!("{field}.product_id"),
                format!("product does not match PO line {}", entry.po_line_no),
            );
            continue;
        }

        let remaining = snapshot.remaining_quantity();
        if entry.received_qty < 0 || entry.received_qty > remaining {
            violations.add(
                ViolationKind::QuantityOutOfRange,
                format!("{field}.received_qty"),
                format!(
                    "line {}: received quantity {} must be between 0 and {remaining}",
                    idx + 1,
                    entry.received_qty
                ),
            );
        }

        if let Some(expiry) = entry.expiry_date {
            if entry.received_qty > 0 && expiry < today {
                violations.add(
                    ViolationKind::ExpiredProduct,
                    format!("{field}.expiry_date"),
                    format!("line {}: product expired on {expiry}", idx + 1),
                );
            }
            if let Some(manufactured) = entry.manufacturing_date {
                if manufactured >= expiry {
                    violations.add(
                        ViolationKind::InvalidDateRange,
                        format!("{field}.manufacturing_date"),
                        format!(
                            "line {}: manufacturing date {manufactured} must be before expiry {expiry}",
                            idx + 1
                        ),
                    );
                }
            }
        }

        lines.push(ReceivedProductLine::new(entry, snapshot));
    }

    let anything_received = input.received_products.iter().any(|l| l.received_qty > 0);
    if !anything_received && !input.acknowledge_zero_receiving {
        violations.add(
            ViolationKind::EmptyReceiving,
            "received_products",
            "enter a received quantity for at least one product or acknowledge a zero receiving",
        );
    }

    for (idx, doc) in input.documents.iter().enumerate() {
        if doc.type_label().is_none() {
            violations.add(
                ViolationKind::MissingDocumentType,
                format!("documents[{idx}].document_type"),
                format!("select a document type for '{}'", doc.file_name),
            );
        }
    }

    violations.into_result()?;
    Ok(lines)
}

#[cfg(test)]
mod tests {
    use chrono::Days;
    use medprocure_core::{DomainError, ProductId};

    use super::*;
    use crate::document::DocumentType;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, 10).unwrap()
    }

    struct Form {
        product_id: ProductId,
        po_lines: Vec<PoLineSnapshot>,
    }

    impl Form {
        /// One PO line: 100 ordered, 40 already received elsewhere.
        fn new() -> Self {
            let product_id = ProductId::new();
            Self {
                product_id,
                po_lines: vec![PoLineSnapshot {
                    po_line_no: 1,
                    product_id,
                    ordered_qty: 100,
                    already_received: 40,
                }],
            }
        }

        fn input(&self, lines: Vec<ReceivedLineInput>) -> ReceivingInput {
            ReceivingInput {
                invoice_number: "INV-001".to_string(),
                received_date: today(),
                received_products: lines,
                documents: vec![ReceivingDocument::new("invoice.pdf", DocumentType::Invoice)],
                qc_required: false,
                acknowledge_zero_receiving: false,
            }
        }

        fn line(&self, qty: i64) -> ReceivedLineInput {
            ReceivedLineInput::new(1, self.product_id, qty)
        }

        fn check(&self, input: &ReceivingInput) -> Result<Vec<ReceivedProductLine>, Violations> {
            validate_receiving(input, &self.po_lines, today()).map_err(|e| match e {
                DomainError::Validation(v) => v,
                other => panic!("unexpected error: {other:?}"),
            })
        }
    }

    #[test]
    fn valid_receiving_resolves_snapshot_figures() {
        let form = Form::new();
        let lines = form.check(&form.input(vec![form.line(60)])).unwrap();
        assert_eq!(lines[0].ordered_qty, 100);
        assert_eq!(lines[0].already_received, 40);
        assert_eq!(lines[0].remaining_quantity(), 60);
    }

    #[test]
    fn one_over_remaining_is_out_of_range() {
        let form = Form::new();
        let v = form.check(&form.input(vec![form.line(61)])).unwrap_err();
        assert_eq!(v.len(), 1);
        let violation = v.iter().next().unwrap();
        assert_eq!(violation.kind, ViolationKind::QuantityOutOfRange);
        assert_eq!(violation.field, "received_products[0].received_qty");
        assert!(violation.message.contains("between 0 and 60"));
    }

    #[test]
    fn negative_quantity_is_out_of_range() {
        let form = Form::new();
        let v = form.check(&form.input(vec![form.line(-1), form.line(5)])).unwrap_err();
        assert!(v.has_kind(ViolationKind::QuantityOutOfRange));
    }

    #[test]
    fn expired_stock_is_refused_unless_nothing_was_received() {
        let form = Form::new();
        let yesterday = today().checked_sub_days(Days::new(1));

        let v = form
            .check(&form.input(vec![form.line(5).with_dates(None, yesterday)]))
            .unwrap_err();
        assert!(v.has_kind(ViolationKind::ExpiredProduct));

        let ok = form.input(vec![form.line(0).with_dates(None, yesterday), form.line(5)]);
        assert!(form.check(&ok).is_ok());
    }

    #[test]
    fn expiring_today_is_still_acceptable() {
        let form = Form::new();
        let input = form.input(vec![form.line(5).with_dates(None, Some(today()))]);
        assert!(form.check(&input).is_ok());
    }

    #[test]
    fn manufacturing_must_precede_expiry() {
        let form = Form::new();
        let date = NaiveDate::from_ymd_opt(2025, 1, 1);
        let v = form
            .check(&form.input(vec![form.line(5).with_dates(date, date)]))
            .unwrap_err();
        assert!(v.has_kind(ViolationKind::InvalidDateRange));
    }

    #[test]
    fn empty_receiving_needs_acknowledgement() {
        let form = Form::new();
        let mut input = form.input(vec![form.line(0)]);
        let v = form.check(&input).unwrap_err();
        assert!(v.has_kind(ViolationKind::EmptyReceiving));

        input.acknowledge_zero_receiving = true;
        assert!(form.check(&input).is_ok());
    }

    #[test]
    fn documents_need_a_resolvable_type() {
        let form = Form::new();
        let mut input = form.input(vec![form.line(5)]);
        input.documents.push(ReceivingDocument {
            file_name: "misc.pdf".to_string(),
            document_type: Some(DocumentType::Other),
            custom_label: None,
        });
        input.documents.push(ReceivingDocument {
            file_name: "blank.pdf".to_string(),
            document_type: None,
            custom_label: None,
        });

        let v = form.check(&input).unwrap_err();
        let fields: Vec<&str> = v.iter().map(|x| x.field.as_str()).collect();
        assert_eq!(fields, vec!["documents[1].document_type", "documents[2].document_type"]);
    }

    #[test]
    fn all_violations_are_reported_together() {
        let form = Form::new();
        let yesterday = today().checked_sub_days(Days::new(1));
        let mut input = form.input(vec![
            form.line(61),
            form.line(5).with_dates(None, yesterday),
            ReceivedLineInput::new(9, form.product_id, 1),
        ]);
        input.invoice_number = "  ".to_string();

        let v = form.check(&input).unwrap_err();
        let fields: Vec<&str> = v.iter().map(|x| x.field.as_str()).collect();
        assert_eq!(
            fields,
            vec![
                "invoice_number",
                "received_products[0].received_qty",
                "received_products[1].expiry_date",
                "received_products[2].po_line_no",
            ]
        );
    }

    #[test]
    fn batch_split_entries_are_checked_independently() {
        let form = Form::new();
        let input = form.input(vec![
            form.line(30).with_batch("B-1"),
            form.line(30).with_batch("B-2"),
        ]);
        let lines = form.check(&input).unwrap();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[1].batch_number.as_deref(), Some("B-2"));
    }
}

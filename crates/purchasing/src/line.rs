//! Purchase-order product lines and order totals.
//!
//! Money is carried in the smallest currency unit (e.g. paise/cents); rates
//! (discount percentage, GST) are basis points, so 18% GST is `1800`.

use serde::{Deserialize, Serialize};

use medprocure_core::{ProductId, ViolationKind, Violations};

/// 100% expressed in basis points.
pub const BASIS_POINTS: u32 = 10_000;

/// `amount × bps / 10 000`, rounded half-up.
fn apply_rate(amount: u64, bps: u32) -> u64 {
    let scaled = amount as u128 * bps as u128 + (BASIS_POINTS as u128 / 2);
    (scaled / BASIS_POINTS as u128) as u64
}

/// Line discount.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "lowercase")]
pub enum Discount {
    /// Basis points of the gross amount.
    Percentage(u32),
    /// Flat amount in minor units.
    Amount(u64),
}

impl Default for Discount {
    fn default() -> Self {
        Discount::Percentage(0)
    }
}

impl Discount {
    pub fn none() -> Self {
        Self::default()
    }

    /// Discount taken off `gross`, never more than `gross`.
    pub fn amount_of(self, gross: u64) -> u64 {
        match self {
            Discount::Percentage(bps) => apply_rate(gross, bps.min(BASIS_POINTS)),
            Discount::Amount(amount) => amount.min(gross),
        }
    }
}

/// Caller-supplied line values (create / add / update).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineInput {
    pub product_id: ProductId,
    pub quantity: i64,
    #[serde(default)]
    pub foc: i64,
    pub unit_price: u64,
    #[serde(default)]
    pub discount: Discount,
    #[serde(default)]
    pub gst_rate: u32,
}

impl LineInput {
    pub fn new(product_id: ProductId, quantity: i64, unit_price: u64) -> Self {
        Self {
            product_id,
            quantity,
            foc: 0,
            unit_price,
            discount: Discount::none(),
            gst_rate: 0,
        }
    }

    pub fn with_foc(mut self, foc: i64) -> Self {
        self.foc = foc;
        self
    }

    pub fn with_discount(mut self, discount: Discount) -> Self {
        self.discount = discount;
        self
    }

    pub fn with_gst_rate(mut self, gst_rate: u32) -> Self {
        self.gst_rate = gst_rate;
        self
    }

    /// Collect every problem with this line under `field` (e.g. `products[0]`).
    pub fn validate_into(&self, field: &str, violations: &mut Violations) {
        let invalid = ViolationKind::Invalid;

        if self.quantity < 0 {
            violations.add(invalid, format!("{field}.quantity"), "quantity must not be negative");
        }
        if self.foc < 0 {
            violations.add(invalid, format!("{field}.foc"), "free-of-charge units must not be negative");
        } else if self.foc > self.quantity.max(0) {
            violations.add(
                invalid,
                format!("{field}.foc"),
                format!(
                    "free-of-charge units ({}) exceed ordered quantity ({})",
                    self.foc, self.quantity
                ),
            );
        }
        if self.gst_rate > BASIS_POINTS {
            violations.add(invalid, format!("{field}.gst_rate"), "GST rate must not exceed 100%");
        }
        match self.discount {
            Discount::Percentage(bps) if bps > BASIS_POINTS => {
                violations.add(invalid, format!("{field}.discount"), "discount must not exceed 100%");
            }
            Discount::Amount(amount) => {
                let billable = (self.quantity - self.foc).max(0) as u64;
                let gross = billable.saturating_mul(self.unit_price);
                if amount > gross {
                    violations.add(
                        invalid,
                        format!("{field}.discount"),
                        format!("discount amount ({amount}) exceeds line gross ({gross})"),
                    );
                }
            }
            Discount::Percentage(_) => {}
        }
        if ProductLine::from_input(0, self).checked_line_total().is_none() {
            violations.add(
                invalid,
                format!("{field}.unit_price"),
                "line amount exceeds the supported range",
            );
        }
    }
}

/// A product line embedded in a purchase order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductLine {
    pub line_no: u32,
    pub product_id: ProductId,
    pub quantity: i64,
    pub foc: i64,
    pub unit_price: u64,
    pub discount: Discount,
    pub gst_rate: u32,
    /// Derived by reconciliation.
    pub received_qty: i64,
    /// Derived by reconciliation: `max(0, quantity - received_qty)`.
    pub backlog_qty: i64,
}

impl ProductLine {
    /// A freshly ordered line: nothing received yet, whole quantity in backlog.
    pub fn from_input(line_no: u32, input: &LineInput) -> Self {
        Self {
            line_no,
            product_id: input.product_id,
            quantity: input.quantity,
            foc: input.foc,
            unit_price: input.unit_price,
            discount: input.discount,
            gst_rate: input.gst_rate,
            received_qty: 0,
            backlog_qty: input.quantity.max(0),
        }
    }

    pub fn billable_qty(&self) -> u64 {
        (self.quantity - self.foc).max(0) as u64
    }

    pub fn gross_amount(&self) -> u64 {
        self.billable_qty().saturating_mul(self.unit_price)
    }

    pub fn discount_amount(&self) -> u64 {
        self.discount.amount_of(self.gross_amount())
    }

    pub fn taxable_amount(&self) -> u64 {
        self.gross_amount() - self.discount_amount()
    }

    pub fn gst_amount(&self) -> u64 {
        apply_rate(self.taxable_amount(), self.gst_rate)
    }

    pub fn line_total(&self) -> u64 {
        self.taxable_amount().saturating_add(self.gst_amount())
    }

    /// `None` when the line amount does not fit in a `u64`.
    pub fn checked_line_total(&self) -> Option<u64> {
        let gross = self.billable_qty().checked_mul(self.unit_price)?;
        let taxable = gross - self.discount.amount_of(gross);
        taxable.checked_add(apply_rate(taxable, self.gst_rate))
    }

    pub fn is_over_received(&self) -> bool {
        self.received_qty > self.quantity
    }
}

/// Computed order totals.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderTotals {
    pub gross_total: u64,
    pub discount_total: u64,
    /// Sum of taxable (post-discount, pre-tax) line amounts.
    pub sub_total: u64,
    pub gst_total: u64,
    /// `sub_total + gst_total`.
    pub grand_total: u64,
}

impl OrderTotals {
    /// Sums saturate; orders accepted by [`OrderTotals::checked_of`] never reach the cap.
    pub fn of(lines: &[ProductLine]) -> Self {
        lines.iter().fold(Self::default(), |acc, line| Self {
            gross_total: acc.gross_total.saturating_add(line.gross_amount()),
            discount_total: acc.discount_total.saturating_add(line.discount_amount()),
            sub_total: acc.sub_total.saturating_add(line.taxable_amount()),
            gst_total: acc.gst_total.saturating_add(line.gst_amount()),
            grand_total: acc.grand_total.saturating_add(line.line_total()),
        })
    }

    /// `None` when any line or the grand total does not fit in a `u64`.
    pub fn checked_of(lines: &[ProductLine]) -> Option<Self> {
        let mut grand_total = 0u64;
        for line in lines {
            grand_total = grand_total.checked_add(line.checked_line_total()?)?;
        }
        Some(Self::of(lines))
    }
}

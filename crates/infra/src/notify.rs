//! Outgoing purchase-order email.
//!
//! Delivery itself is out of process: a [`Notifier`] receives a fully built
//! [`EmailMessage`] (recipients, HTML body, path of the PO PDF to attach) and
//! hands it to whatever transport is wired in.

use std::fmt::Write as _;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use thiserror::Error;
use tracing::info;

use medprocure_core::{PrincipalId, TenantId};
use medprocure_purchasing::PurchaseOrder;

use crate::read_model::{InMemoryTenantStore, TenantStore};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmailMessage {
    pub to: Vec<String>,
    pub cc: Vec<String>,
    pub from: String,
    pub subject: String,
    pub html_body: String,
    pub attachment_path: Option<PathBuf>,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum NotifyError {
    #[error("no recipient for principal {0}")]
    NoRecipient(String),
    #[error("send failed: {0}")]
    SendFailed(String),
}

pub trait Notifier: Send + Sync {
    fn send(&self, message: &EmailMessage) -> Result<(), NotifyError>;
}

impl<N> Notifier for Arc<N>
where
    N: Notifier + ?Sized,
{
    fn send(&self, message: &EmailMessage) -> Result<(), NotifyError> {
        (**self).send(message)
    }
}

/// Logs the message instead of delivering it.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingNotifier;

impl Notifier for TracingNotifier {
    fn send(&self, message: &EmailMessage) -> Result<(), NotifyError> {
        info!(
            to = ?message.to,
            cc = ?message.cc,
            subject = %message.subject,
            attachment = ?message.attachment_path,
            "purchase order email handed off"
        );
        Ok(())
    }
}

/// Keeps every message; optionally fails every send.
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<EmailMessage>>,
    failure: Option<String>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing(reason: impl Into<String>) -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
            failure: Some(reason.into()),
        }
    }

    pub fn sent(&self) -> Vec<EmailMessage> {
        self.sent.lock().map(|s| s.clone()).unwrap_or_default()
    }
}

impl Notifier for RecordingNotifier {
    fn send(&self, message: &EmailMessage) -> Result<(), NotifyError> {
        if let Some(reason) = &self.failure {
            return Err(NotifyError::SendFailed(reason.clone()));
        }
        self.sent
            .lock()
            .map_err(|_| NotifyError::SendFailed("recorder poisoned".to_string()))?
            .push(message.clone());
        Ok(())
    }
}

/// Where a principal wants purchase orders sent.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PrincipalContacts {
    pub to: Vec<String>,
    pub cc: Vec<String>,
}

pub trait PrincipalDirectory: Send + Sync {
    fn contacts(&self, tenant_id: TenantId, principal_id: PrincipalId) -> Option<PrincipalContacts>;
}

#[derive(Debug, Default)]
pub struct InMemoryPrincipalDirectory {
    contacts: InMemoryTenantStore<PrincipalId, PrincipalContacts>,
}

impl InMemoryPrincipalDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, tenant_id: TenantId, principal_id: PrincipalId, contacts: PrincipalContacts) {
        self.contacts.upsert(tenant_id, principal_id, contacts);
    }
}

impl PrincipalDirectory for InMemoryPrincipalDirectory {
    fn contacts(&self, tenant_id: TenantId, principal_id: PrincipalId) -> Option<PrincipalContacts> {
        self.contacts.get(tenant_id, &principal_id)
    }
}

/// Build the "order sent" email for `order`.
///
/// Fails with [`NotifyError::NoRecipient`] when the principal has no `to`
/// address on file.
pub fn purchase_order_email(
    order: &PurchaseOrder,
    contacts: &PrincipalContacts,
    from: &str,
) -> Result<EmailMessage, NotifyError> {
    let po_number = order.po_number().map(|n| n.to_string()).unwrap_or_default();
    let principal_name = order.principal().map(|p| p.name.as_str()).unwrap_or_default();

    let to: Vec<String> = contacts
        .to
        .iter()
        .map(|a| a.trim())
        .filter(|a| !a.is_empty())
        .map(str::to_string)
        .collect();
    if to.is_empty() {
        return Err(NotifyError::NoRecipient(principal_name.to_string()));
    }

    Ok(EmailMessage {
        to,
        cc: contacts.cc.iter().filter(|a| !a.trim().is_empty()).cloned().collect(),
        from: from.to_string(),
        subject: format!("Purchase Order {po_number}"),
        html_body: render_order_html(order, &po_number, principal_name),
        attachment_path: Some(PathBuf::from(format!("purchase-orders/{po_number}.pdf"))),
    })
}

fn render_order_html(order: &PurchaseOrder, po_number: &str, principal_name: &str) -> String {
    let mut html = String::new();
    let _ = write!(
        html,
        "<p>Dear {},</p><p>Please find attached purchase order <strong>{}</strong>.</p>",
        escape_html(principal_name),
        escape_html(po_number)
    );
    html.push_str(
        "<table><thead><tr><th>#</th><th>Product</th><th>Qty</th><th>FOC</th>\
         <th>Unit price</th><th>Total</th></tr></thead><tbody>",
    );
    for line in order.lines() {
        let _ = write!(
            html,
            "<tr><td>{}</td><td>{}</td><td>{}</td><td>{}</td><td>{}</td><td>{}</td></tr>",
            line.line_no,
            line.product_id,
            line.quantity,
            line.foc,
            format_minor(line.unit_price),
            format_minor(line.line_total()),
        );
    }
    let totals = order.totals();
    let _ = write!(
        html,
        "</tbody></table><p>Sub total: {}<br>GST: {}<br><strong>Grand total: {}</strong></p>",
        format_minor(totals.sub_total),
        format_minor(totals.gst_total),
        format_minor(totals.grand_total),
    );
    html
}

/// `123456` minor units → `"1234.56"`.
fn format_minor(amount: u64) -> String {
    format!("{}.{:02}", amount / 100, amount % 100)
}

fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

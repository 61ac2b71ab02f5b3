//! Invoice receiving domain module (event-sourced).
//!
//! Records what arrived against an ordered purchase order: batches, expiry,
//! supporting documents and per-line quality control. Pure domain logic.

pub mod document;
pub mod line;
pub mod qc;
pub mod receiving;
pub mod validate;

pub use document::{DocumentType, ReceivingDocument};
pub use line::{PoLineSnapshot, QcEntry, QcStatus, ReceivedLineInput, ReceivedProductLine};
pub use qc::{QcSummary, aggregate_qc};
pub use receiving::{
    CompleteReceiving, CreateReceiving, DeleteReceiving, InvoiceReceiving,
    InvoiceReceivingCommand, InvoiceReceivingEvent, InvoiceReceivingId, QcStatusUpdated,
    ReceivingCompleted, ReceivingCreated, ReceivingDeleted, ReceivingRejected,
    ReceivingSentToQc, ReceivingStatus, ReceivingSubmitted, ReceivingUpdated, RejectReceiving,
    SubmitReceiving, SubmitToQc, UpdateQcStatus, UpdateReceiving,
};
pub use validate::{ReceivingInput, validate_receiving};

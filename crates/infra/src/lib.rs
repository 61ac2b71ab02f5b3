//! Infrastructure layer: event store, dispatch, read models, configuration
//! and the procurement service that wires the domain crates together.

pub mod command_dispatcher;
pub mod config;
pub mod event_store;
pub mod notify;
pub mod projections;
pub mod read_model;
pub mod sequence;
pub mod service;


pub use command_dispatcher::{CommandDispatcher, DispatchError, Dispatched};
pub use config::{ConfigLoadError, OverReceiptPolicy, ProcurementConfig};
pub use service::{
    ProcurementService, PurchaseOrderView, ReceivingForm, ReceivingOutcome, ServiceError,
    SideEffectWarning, TransitionOutcome, WarningKind,
};

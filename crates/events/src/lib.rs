//! Domain events and their transport.
//!
//! Purchase orders and invoice receivings emit typed events; infrastructure wraps
//! them in tenant-scoped envelopes, appends them and fans them out over a bus.

pub mod bus;
pub mod envelope;
pub mod event;
pub mod handler;
pub mod in_memory_bus;

pub use bus::{EventBus, Subscription};
pub use envelope::EventEnvelope;
pub use event::Event;
pub use handler::execute;
pub use in_memory_bus::{InMemoryBusError, InMemoryEventBus};

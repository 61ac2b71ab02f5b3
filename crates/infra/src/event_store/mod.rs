//! Append-only event store boundary.
//!
//! Streams are keyed by (tenant, aggregate). Purchase orders and invoice
//! receivings each get one stream; nothing here knows about either.

pub mod in_memory;
pub mod r#trait;

pub use in_memory::InMemoryEventStore;
pub use r#trait::{EventStore, EventStoreError, StoredEvent, UncommittedEvent};

//! Read models built from committed events.
//!
//! Projections are tenant-isolated, idempotent under at-least-once delivery and
//! rebuildable from the event stream.

pub mod receivings;

pub use receivings::{ReceivingListing, ReceivingsByOrderProjection, ReceivingsProjectionError};

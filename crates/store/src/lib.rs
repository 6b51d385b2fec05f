//! Append-only event store for the SitePulse engine.
//!
//! The store plays the role a message broker plays in larger deployments:
//! producers append and receive a durable sequence id; each consumer owns a
//! cursor and commits it after applying a batch, giving at-least-once
//! delivery. A stalled consumer only stalls itself.

pub mod cursor;
pub mod log;

pub use cursor::{ConsumerCursor, Cursor};
pub use log::{EventStore, StreamKey};

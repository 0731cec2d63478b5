//! Runtime events: types and broadcast bus.
//!
//! This module groups the event **data model** and the **bus** used to
//! publish/subscribe to events emitted by the supervisor, process actors,
//! output readers and subscriber workers.
//!
//! ## Contents
//! - [`EventKind`], [`Event`] event classification and payload metadata
//! - [`Bus`] thin wrapper over `tokio::sync::broadcast`
//!
//! ## Quick reference
//! - **Publishers**: process actors (state, health, restarts), `ProcessHandle`
//!   output readers (log lines, stream closure), `Supervisor` (shutdown),
//!   `SubscriberSet` workers (overflow/panic).
//! - **Consumers**: `Supervisor::subscribe()` receivers and the supervisor's
//!   subscriber listener (fans out to `SubscriberSet`).

mod bus;
mod event;

pub use bus::Bus;
pub use event::{Event, EventKind};

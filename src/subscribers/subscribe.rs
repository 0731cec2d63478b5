//! # Subscriber trait
//!
//! `Subscribe` is the extension point for reacting to supervisor events with
//! callbacks (log sinks, UI bridges, notifications). Each subscriber is driven
//! by a dedicated worker fed by a bounded queue owned by the
//! [`SubscriberSet`](crate::SubscriberSet).
//!
//! Callers that prefer pulling events use
//! [`Supervisor::subscribe`](crate::Supervisor::subscribe) instead.
//!
//! ## Example
//! ```rust
//! use procvisor::{Event, EventKind, Subscribe};
//!
//! struct CrashNotifier;
//!
//! #[async_trait::async_trait]
//! impl Subscribe for CrashNotifier {
//!     async fn on_event(&self, ev: &Event) {
//!         if ev.kind == EventKind::RestartScheduled {
//!             // notify...
//!         }
//!     }
//!     fn name(&self) -> &'static str { "crash-notifier" }
//!     fn queue_capacity(&self) -> usize { 256 }
//! }
//! ```

use crate::events::Event;
use async_trait::async_trait;

/// Contract for event subscribers.
///
/// Called from the subscriber's own worker task; slow implementations only delay
/// themselves.
#[async_trait]
pub trait Subscribe: Send + Sync + 'static {
    /// Handles a single event.
    async fn on_event(&self, event: &Event);

    /// Name used in logs and overflow/panic events.
    fn name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }

    /// Capacity of this subscriber's queue; on overflow events are dropped.
    fn queue_capacity(&self) -> usize {
        1024
    }
}

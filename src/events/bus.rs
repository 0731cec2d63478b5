//! # Event bus.
//!
//! [`Bus`] wraps a [`tokio::sync::broadcast`] channel. Every component that has
//! something to report publishes into it; callers observe it through
//! `Supervisor::subscribe()` and the subscriber listener.
//!
//! ```text
//! ProcessActor ─┐
//! output pumps ─┼─► Bus ──► Supervisor::subscribe() receivers
//! Supervisor   ─┤       └─► subscriber listener ──► SubscriberSet
//! workers      ─┘
//! ```
//!
//! Publishing never waits. The ring buffer is shared by all receivers; one that
//! falls more than `capacity` events behind gets `RecvError::Lagged(n)` and
//! resumes at the oldest retained event. Nothing is persisted.

use tokio::sync::broadcast;

use super::event::Event;

/// Cloneable handle to the broadcast channel.
#[derive(Clone, Debug)]
pub struct Bus {
    tx: broadcast::Sender<Event>,
}

impl Bus {
    /// Creates a bus retaining at most `capacity` events (min 1).
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel::<Event>(capacity.max(1));
        Self { tx }
    }

    /// Sends `ev` to every live receiver; dropped when there is none.
    pub fn publish(&self, ev: Event) {
        let _ = self.tx.send(ev);
    }

    /// Receiver of events published from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.tx.subscribe()
    }

    /// Whether anyone would observe a publish right now.
    #[inline]
    pub fn has_receivers(&self) -> bool {
        self.tx.receiver_count() > 0
    }
}

//! # Runtime events emitted by the supervisor and process actors.
//!
//! The [`EventKind`] enum classifies event types across four categories:
//! - **State events**: lifecycle transitions and readiness (state changed, health changed)
//! - **Output events**: captured stdout/stderr lines and stream closure
//! - **Restart events**: scheduled restarts and counter resets
//! - **Runtime events**: shutdown progress and subscriber diagnostics
//!
//! The [`Event`] struct carries the metadata relevant to its kind; unused fields stay `None`.
//!
//! ## Ordering guarantees
//! Each event has a globally unique sequence number (`seq`) that increases monotonically.
//! Events of one process are published by a single owner, so their `seq` order is their
//! causal order.
//!
//! ## Example
//! ```rust
//! use procvisor::{Event, EventKind, ProcessState};
//!
//! let ev = Event::state_changed("api", ProcessState::Starting, ProcessState::Running);
//!
//! assert_eq!(ev.kind, EventKind::StateChanged);
//! assert_eq!(ev.process.as_deref(), Some("api"));
//! assert_eq!(ev.new_state, Some(ProcessState::Running));
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::time::{Duration, SystemTime};

use crate::health::HealthStatus;
use crate::process::{LogStream, ProcessState};

/// Global sequence counter for event ordering.
static EVENT_SEQ: AtomicU64 = AtomicU64::new(0);

/// Classification of runtime events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    // === Process state ===
    /// A process moved from one state to another.
    ///
    /// Sets:
    /// - `process`: process name
    /// - `old_state`, `new_state`: the transition
    /// - `reason`: failure reason (only for `Failed`)
    StateChanged,

    /// The health checker reported a new readiness status.
    ///
    /// Sets:
    /// - `process`: process name
    /// - `health`: new status
    /// - `reason`: last probe error (only for `Unhealthy`)
    HealthChanged,

    // === Output ===
    /// One line captured from a process output stream.
    ///
    /// Sets:
    /// - `process`: process name
    /// - `stream`: stdout or stderr
    /// - `line`: the line, without its trailing newline (lossy UTF-8)
    LogLine,

    /// An output stream reached end-of-file (may race with process exit).
    ///
    /// Sets:
    /// - `process`: process name
    /// - `stream`: stdout or stderr
    StreamClosed,

    // === Restarts ===
    /// An automatic restart was scheduled.
    ///
    /// Sets:
    /// - `process`: process name
    /// - `attempt`: restart number (1-based since the last reset)
    /// - `delay_ms`: delay before the respawn
    /// - `exit_code`: exit code that triggered it (if any)
    RestartScheduled,

    /// The process stayed ready for its stability window; restart counter reset.
    ///
    /// Sets:
    /// - `process`: process name
    /// - `attempt`: counter value before the reset
    RestartCounterReset,

    // === Shutdown ===
    /// Shutdown requested (explicit call or OS signal).
    ShutdownRequested,

    /// Every process stopped within the configured grace period.
    AllStoppedWithin,

    /// Grace period exceeded; remaining processes were force-killed.
    ///
    /// Sets:
    /// - `reason`: names of the force-killed processes
    GraceExceeded,

    // === Subscribers ===
    /// Subscriber panicked during event processing.
    ///
    /// Sets:
    /// - `process`: subscriber name
    /// - `reason`: panic info/message
    SubscriberPanicked,

    /// Subscriber dropped an event (queue full or worker closed).
    ///
    /// Sets:
    /// - `process`: subscriber name
    /// - `reason`: reason string (e.g., "full", "closed")
    SubscriberOverflow,
}

/// Runtime event with optional metadata.
///
/// - `seq`: monotonic global sequence for ordering
/// - `at`: wall-clock timestamp
/// - other optional fields are set depending on the [`EventKind`]
#[derive(Clone, Debug)]
pub struct Event {
    /// Globally unique, monotonically increasing sequence number.
    pub seq: u64,
    /// Wall-clock timestamp.
    pub at: SystemTime,
    /// Event classification.
    pub kind: EventKind,

    /// Name of the process (or subscriber), if applicable.
    pub process: Option<Arc<str>>,
    /// State before a transition.
    pub old_state: Option<ProcessState>,
    /// State after a transition.
    pub new_state: Option<ProcessState>,
    /// Health status for `HealthChanged`.
    pub health: Option<HealthStatus>,
    /// Output stream for `LogLine` / `StreamClosed`.
    pub stream: Option<LogStream>,
    /// Captured output line.
    pub line: Option<Arc<str>>,
    /// Restart delay in milliseconds (compact).
    pub delay_ms: Option<u32>,
    /// Restart attempt number.
    pub attempt: Option<u32>,
    /// Exit code that triggered the event.
    pub exit_code: Option<i32>,
    /// Human-readable reason (failure reasons, overflow details, etc.).
    pub reason: Option<Arc<str>>,
}

impl Event {
    /// Creates a new event of the given kind with current timestamp and next sequence number.
    pub fn new(kind: EventKind) -> Self {
        Self {
            seq: EVENT_SEQ.fetch_add(1, AtomicOrdering::Relaxed),
            at: SystemTime::now(),
            kind,
            process: None,
            old_state: None,
            new_state: None,
            health: None,
            stream: None,
            line: None,
            delay_ms: None,
            attempt: None,
            exit_code: None,
            reason: None,
        }
    }

    /// Attaches a process name.
    #[inline]
    pub fn with_process(mut self, process: impl Into<Arc<str>>) -> Self {
        self.process = Some(process.into());
        self
    }

    /// Attaches a human-readable reason.
    #[inline]
    pub fn with_reason(mut self, reason: impl Into<Arc<str>>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    /// Attaches a state transition.
    #[inline]
    pub fn with_transition(mut self, old: ProcessState, new: ProcessState) -> Self {
        self.old_state = Some(old);
        self.new_state = Some(new);
        self
    }

    /// Attaches a health status.
    #[inline]
    pub fn with_health(mut self, health: HealthStatus) -> Self {
        self.health = Some(health);
        self
    }

    /// Attaches an output stream.
    #[inline]
    pub fn with_stream(mut self, stream: LogStream) -> Self {
        self.stream = Some(stream);
        self
    }

    /// Attaches a restart delay (stored as milliseconds).
    #[inline]
    pub fn with_delay(mut self, d: Duration) -> Self {
        let ms = d.as_millis().min(u128::from(u32::MAX)) as u32;
        self.delay_ms = Some(ms);
        self
    }

    /// Attaches a restart attempt number.
    #[inline]
    pub fn with_attempt(mut self, n: u32) -> Self {
        self.attempt = Some(n);
        self
    }

    /// Attaches an exit code.
    #[inline]
    pub fn with_exit_code(mut self, code: Option<i32>) -> Self {
        self.exit_code = code;
        self
    }

    /// Creates a state transition event; `Failed` reasons are copied into `reason`.
    pub fn state_changed(
        process: impl Into<Arc<str>>,
        old: ProcessState,
        new: ProcessState,
    ) -> Self {
        let reason = match &new {
            ProcessState::Failed { reason } => Some(Arc::<str>::from(reason.as_str())),
            _ => None,
        };
        let mut ev = Event::new(EventKind::StateChanged)
            .with_process(process)
            .with_transition(old, new);
        ev.reason = reason;
        ev
    }

    /// Creates a captured output line event.
    pub fn log_line(process: Arc<str>, stream: LogStream, line: impl Into<Arc<str>>) -> Self {
        let mut ev = Event::new(EventKind::LogLine)
            .with_process(process)
            .with_stream(stream);
        ev.line = Some(line.into());
        ev
    }

    /// Creates a subscriber overflow event.
    #[inline]
    pub fn subscriber_overflow(subscriber: &'static str, reason: &'static str) -> Self {
        Event::new(EventKind::SubscriberOverflow)
            .with_process(subscriber)
            .with_reason(format!("subscriber={subscriber} reason={reason}"))
    }

    /// Creates a subscriber panic event.
    #[inline]
    pub fn subscriber_panicked(subscriber: &'static str, info: String) -> Self {
        Event::new(EventKind::SubscriberPanicked)
            .with_process(subscriber)
            .with_reason(info)
    }

    #[inline]
    pub fn is_subscriber_overflow(&self) -> bool {
        matches!(self.kind, EventKind::SubscriberOverflow)
    }

    /// Returns `true` if this event concerns the named process.
    #[inline]
    pub fn is_for(&self, process: &str) -> bool {
        self.process.as_deref() == Some(process)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sequence_is_monotonic() {
        let a = Event::new(EventKind::ShutdownRequested);
        let b = Event::new(EventKind::ShutdownRequested);
        assert!(b.seq > a.seq);
    }

    #[test]
    fn failed_transition_carries_reason() {
        let ev = Event::state_changed(
            "api",
            ProcessState::Stopped,
            ProcessState::Failed {
                reason: "dependency not ready".into(),
            },
        );
        assert_eq!(ev.reason.as_deref(), Some("dependency not ready"));
        assert_eq!(ev.old_state, Some(ProcessState::Stopped));
        assert!(ev.is_for("api"));
    }

    #[test]
    fn delay_is_clamped_to_u32() {
        let ev = Event::new(EventKind::RestartScheduled).with_delay(Duration::from_secs(u64::MAX));
        assert_eq!(ev.delay_ms, Some(u32::MAX));
    }
}

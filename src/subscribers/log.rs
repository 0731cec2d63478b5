//! # LogWriter: renders events through `tracing`.
//!
//! Output lines go out at `info` with the process name and stream as fields;
//! lifecycle events use `info`/`warn` depending on severity. Install any
//! `tracing` subscriber to see them.
//!
//! ```text
//! INFO procvisor: state changed process="api" from="starting" to="running"
//! INFO procvisor: output process="api" stream="stdout" line="listening on :8080"
//! WARN procvisor: restart scheduled process="worker" attempt=1 delay_ms=500 exit_code=1
//! ```

use async_trait::async_trait;
use tracing::{info, warn};

use crate::events::{Event, EventKind};
use crate::subscribers::Subscribe;

/// Subscriber that logs every event via `tracing`.
#[derive(Default)]
pub struct LogWriter;

impl LogWriter {
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Subscribe for LogWriter {
    async fn on_event(&self, e: &Event) {
        let process = e.process.as_deref().unwrap_or("-");
        match e.kind {
            EventKind::StateChanged => {
                let from = e.old_state.as_ref().map_or("-", |s| s.as_label());
                let to = e.new_state.as_ref().map_or("-", |s| s.as_label());
                match &e.reason {
                    Some(reason) => {
                        warn!(target: "procvisor", process, from, to, %reason, "state changed")
                    }
                    None => info!(target: "procvisor", process, from, to, "state changed"),
                }
            }
            EventKind::HealthChanged => {
                let health = e.health.map_or("-", |h| h.as_label());
                info!(target: "procvisor", process, health, reason = ?e.reason, "health changed");
            }
            EventKind::LogLine => {
                let stream = e.stream.map_or("-", |s| s.as_str());
                let line = e.line.as_deref().unwrap_or("");
                info!(target: "procvisor", process, stream, line, "output");
            }
            EventKind::StreamClosed => {
                let stream = e.stream.map_or("-", |s| s.as_str());
                info!(target: "procvisor", process, stream, "stream closed");
            }
            EventKind::RestartScheduled => {
                warn!(
                    target: "procvisor",
                    process,
                    attempt = ?e.attempt,
                    delay_ms = ?e.delay_ms,
                    exit_code = ?e.exit_code,
                    "restart scheduled"
                );
            }
            EventKind::RestartCounterReset => {
                info!(target: "procvisor", process, restarts = ?e.attempt, "restart counter reset");
            }
            EventKind::ShutdownRequested => info!(target: "procvisor", "shutdown requested"),
            EventKind::AllStoppedWithin => {
                info!(target: "procvisor", "all processes stopped within grace")
            }
            EventKind::GraceExceeded => {
                warn!(
                    target: "procvisor",
                    stuck = ?e.reason,
                    "grace exceeded; processes force-killed"
                );
            }
            EventKind::SubscriberPanicked => {
                warn!(
                    target: "procvisor",
                    subscriber = process,
                    info = ?e.reason,
                    "subscriber panicked"
                );
            }
            EventKind::SubscriberOverflow => {
                warn!(
                    target: "procvisor",
                    subscriber = process,
                    reason = ?e.reason,
                    "subscriber dropped event"
                );
            }
        }
    }

    fn name(&self) -> &'static str {
        "LogWriter"
    }
}

//! # Per-process state model.
//!
//! [`ProcessState`] is the lifecycle state machine of one supervised process;
//! [`ProcessInfo`] is the read-only snapshot exposed to callers and to dependents
//! waiting for readiness.
//!
//! ## Transitions
//! ```text
//! Stopped ──start (deps ready)──► Starting ──spawned──► Running
//!    ▲                              │                   │  │
//!    │                              │ unexpected exit   │  │ stop / unhealthy past grace
//!    │                              ▼                   │  ▼
//!    │                          Crashed{code} ◄─────────┘ Stopping
//!    │                           │       │                 │
//!    │              restart due  │       │ budget spent    │ exit observed
//!    │          (back to Starting)       ▼                 │
//!    └────────────────────────────── Failed{reason}   Stopped
//! ```

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use crate::health::HealthStatus;

/// Lifecycle state of one process. Exactly one at any instant.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ProcessState {
    /// Not running; no OS handle.
    Stopped,
    /// Being spawned.
    Starting,
    /// OS process is alive.
    Running,
    /// Terminate signal sent, waiting for exit.
    Stopping,
    /// Exited without being asked to; a restart may be scheduled.
    Crashed {
        /// Exit code; `None` when terminated by a signal.
        exit_code: Option<i32>,
    },
    /// Terminal until manual intervention.
    Failed {
        /// Human-readable reason.
        reason: String,
    },
}

impl ProcessState {
    /// Returns `true` for the states in which the process may hold an OS handle.
    #[inline]
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            ProcessState::Starting | ProcessState::Running | ProcessState::Stopping
        )
    }

    /// Short stable label (snake_case) for logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            ProcessState::Stopped => "stopped",
            ProcessState::Starting => "starting",
            ProcessState::Running => "running",
            ProcessState::Stopping => "stopping",
            ProcessState::Crashed { .. } => "crashed",
            ProcessState::Failed { .. } => "failed",
        }
    }
}

impl fmt::Display for ProcessState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProcessState::Crashed {
                exit_code: Some(code),
            } => write!(f, "crashed (exit code {code})"),
            ProcessState::Crashed { exit_code: None } => f.write_str("crashed (signal)"),
            ProcessState::Failed { reason } => write!(f, "failed ({reason})"),
            other => f.write_str(other.as_label()),
        }
    }
}

/// How a process terminated.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ExitStatus {
    /// Exit code, if the process exited normally.
    pub code: Option<i32>,
    /// Terminating signal number (unix only).
    pub signal: Option<i32>,
}

impl ExitStatus {
    /// Returns `true` if the process exited with code 0.
    #[inline]
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}

impl From<std::process::ExitStatus> for ExitStatus {
    fn from(status: std::process::ExitStatus) -> Self {
        #[cfg(unix)]
        let signal = {
            use std::os::unix::process::ExitStatusExt;
            status.signal()
        };
        #[cfg(not(unix))]
        let signal = None;

        Self {
            code: status.code(),
            signal,
        }
    }
}

impl fmt::Display for ExitStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.code, self.signal) {
            (Some(code), _) => write!(f, "exit code {code}"),
            (None, Some(sig)) => write!(f, "signal {sig}"),
            (None, None) => f.write_str("unknown exit"),
        }
    }
}

/// Which output stream a log line came from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum LogStream {
    Stdout,
    Stderr,
}

impl LogStream {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogStream::Stdout => "stdout",
            LogStream::Stderr => "stderr",
        }
    }
}

/// One automatic restart, as recorded in a process's restart history.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RestartAttempt {
    /// When the restart was scheduled.
    pub at: SystemTime,
    /// Restart number since the last counter reset (1-based).
    pub attempt: u32,
    /// Delay applied before the respawn.
    pub delay: Duration,
    /// Exit code that triggered it.
    pub exit_code: Option<i32>,
}

/// Read-only snapshot of one process, published by its owner on every change.
#[derive(Clone, Debug)]
pub struct ProcessInfo {
    /// Process name.
    pub name: Arc<str>,
    /// Current lifecycle state.
    pub state: ProcessState,
    /// Readiness as reported by the health checker.
    pub health: HealthStatus,
    /// OS pid while a handle is live.
    pub pid: Option<u32>,
    /// When the current (or last) run was spawned.
    pub started_at: Option<SystemTime>,
    /// Automatic restarts since the last reset.
    pub restart_count: u32,
    /// Status of the last observed exit.
    pub last_exit: Option<ExitStatus>,
    /// A start was requested and is waiting for dependencies.
    pub start_pending: bool,
    /// An automatic restart is scheduled.
    pub restart_scheduled: bool,
    /// Latest restarts since the last counter reset (at most 32), oldest first.
    pub restart_history: Vec<RestartAttempt>,
}

impl ProcessInfo {
    pub(crate) fn new(name: Arc<str>) -> Self {
        Self {
            name,
            state: ProcessState::Stopped,
            health: HealthStatus::Unknown,
            pid: None,
            started_at: None,
            restart_count: 0,
            last_exit: None,
            start_pending: false,
            restart_scheduled: false,
            restart_history: Vec::new(),
        }
    }

    /// `Running` and `Healthy`: dependents may start.
    #[inline]
    pub fn is_ready(&self) -> bool {
        self.state == ProcessState::Running && self.health == HealthStatus::Healthy
    }

    /// The process will not become ready without manual intervention.
    #[inline]
    pub fn is_dead_end(&self) -> bool {
        match self.state {
            ProcessState::Failed { .. } | ProcessState::Crashed { .. } => {
                !self.restart_scheduled && !self.start_pending
            }
            _ => false,
        }
    }

    /// The process is running or on its way there.
    #[inline]
    pub fn is_progressing(&self) -> bool {
        self.state.is_active() || self.start_pending || self.restart_scheduled
    }
}

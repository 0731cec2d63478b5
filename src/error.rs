//! Error types used by the procvisor runtime.
//!
//! This module defines the error taxonomy of the supervisor:
//!
//! - [`ConfigError`] structural configuration defects, fatal at load time.
//! - [`SpawnError`] the OS refused to create a process.
//! - [`ProbeError`] a health probe attempt failed (treated as "unhealthy", never escalated).
//! - [`SupervisorError`] errors returned to callers of the control operations.
//!
//! Every type provides `as_label` (stable snake_case string for logs/metrics).

use std::time::Duration;
use thiserror::Error;

/// # Errors detected while validating a process configuration.
///
/// Any of these aborts [`Supervisor::load`](crate::Supervisor::load): no process is spawned.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// The dependency edges form a cycle.
    #[error("dependency cycle detected: {}", cycle.join(" -> "))]
    CycleDetected {
        /// Names along the cycle; the first name is repeated at the end.
        cycle: Vec<String>,
    },

    /// Two process entries share the same name.
    #[error("duplicate process name '{name}'")]
    DuplicateName {
        /// The repeated name.
        name: String,
    },

    /// A process depends on a name that is not configured.
    #[error("process '{process}' depends on unknown process '{dependency}'")]
    UnknownDependency {
        /// The declaring process.
        process: String,
        /// The missing dependency name.
        dependency: String,
    },

    /// A process entry is unusable (empty name, empty command, ...).
    #[error("invalid process '{process}': {reason}")]
    Invalid {
        /// Process name (may be empty).
        process: String,
        /// What is wrong with it.
        reason: String,
    },
}

impl ConfigError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    ///
    /// # Example
    /// ```
    /// use procvisor::ConfigError;
    ///
    /// let err = ConfigError::DuplicateName { name: "db".into() };
    /// assert_eq!(err.as_label(), "config_duplicate_name");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            ConfigError::CycleDetected { .. } => "config_cycle_detected",
            ConfigError::DuplicateName { .. } => "config_duplicate_name",
            ConfigError::UnknownDependency { .. } => "config_unknown_dependency",
            ConfigError::Invalid { .. } => "config_invalid",
        }
    }
}

/// # The OS failed to create a child process.
///
/// Signals a configuration defect (missing executable, permission denied, bad
/// working directory); the process goes straight to `Failed` and is never retried.
#[derive(Error, Debug)]
#[error("failed to spawn '{process}': {source}")]
pub struct SpawnError {
    /// Process name.
    pub process: String,
    /// Underlying OS error.
    #[source]
    pub source: std::io::Error,
}

impl SpawnError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self.source.kind() {
            std::io::ErrorKind::NotFound => "spawn_not_found",
            std::io::ErrorKind::PermissionDenied => "spawn_permission_denied",
            _ => "spawn_failed",
        }
    }
}

/// # A single health probe attempt failed.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum ProbeError {
    /// The probe did not complete within its timeout.
    #[error("probe timed out after {timeout:?}")]
    Timeout {
        /// Configured probe timeout.
        timeout: Duration,
    },

    /// The probe command exited unsuccessfully.
    #[error("probe command exited with {code:?}")]
    Exit {
        /// Exit code, if the command was not killed by a signal.
        code: Option<i32>,
    },

    /// I/O failure (spawn failure, connection refused, ...).
    #[error("probe i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP request failed or returned a non-success status.
    #[error("probe http error: {0}")]
    Http(String),
}

impl ProbeError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            ProbeError::Timeout { .. } => "probe_timeout",
            ProbeError::Exit { .. } => "probe_exit",
            ProbeError::Io(_) => "probe_io",
            ProbeError::Http(_) => "probe_http",
        }
    }
}

/// # Errors returned by the supervisor control operations.
///
/// `UnknownProcess`, `DependencyNotStarted` and `ShuttingDown` are rejected up front
/// and never mutate any process state.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SupervisorError {
    /// No process with this name is configured.
    #[error("unknown process '{name}'")]
    UnknownProcess {
        /// Requested name.
        name: String,
    },

    /// A start was requested while a dependency is neither running nor starting.
    #[error("cannot start '{process}': dependency '{dependency}' is not started")]
    DependencyNotStarted {
        /// Process that was asked to start.
        process: String,
        /// The dependency blocking it.
        dependency: String,
    },

    /// The process did not reach `Running`.
    #[error("process '{process}' failed to start: {reason}")]
    StartFailed {
        /// Process name.
        process: String,
        /// Human-readable reason (same as in its `Failed` state).
        reason: String,
    },

    /// `start_all` finished but some processes did not reach `Running`.
    #[error("processes failed to start: {failed:?}")]
    StartAllFailed {
        /// Names in declaration order.
        failed: Vec<String>,
    },

    /// The operation was superseded (e.g. a pending start cancelled by a stop).
    #[error("operation on '{process}' was cancelled")]
    Cancelled {
        /// Process name.
        process: String,
    },

    /// The supervisor is shutting down and accepts no new starts.
    #[error("supervisor is shutting down")]
    ShuttingDown,

    /// The ordered stop exceeded its deadline; remaining processes were force-killed.
    #[error("stop deadline {grace:?} exceeded; force-killed: {stuck:?}")]
    GraceExceeded {
        /// The configured deadline.
        grace: Duration,
        /// Processes that still held an OS handle when the deadline hit.
        stuck: Vec<String>,
    },
}

impl SupervisorError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    ///
    /// # Example
    /// ```
    /// use procvisor::SupervisorError;
    ///
    /// let err = SupervisorError::UnknownProcess { name: "ghost".into() };
    /// assert_eq!(err.as_label(), "supervisor_unknown_process");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            SupervisorError::UnknownProcess { .. } => "supervisor_unknown_process",
            SupervisorError::DependencyNotStarted { .. } => "supervisor_dependency_not_started",
            SupervisorError::StartFailed { .. } => "supervisor_start_failed",
            SupervisorError::StartAllFailed { .. } => "supervisor_start_all_failed",
            SupervisorError::Cancelled { .. } => "supervisor_cancelled",
            SupervisorError::ShuttingDown => "supervisor_shutting_down",
            SupervisorError::GraceExceeded { .. } => "supervisor_grace_exceeded",
        }
    }

    /// Indicates a caller mistake rather than a runtime outcome.
    ///
    /// Caller mistakes are rejected before any state is touched.
    pub fn is_rejected(&self) -> bool {
        matches!(
            self,
            SupervisorError::UnknownProcess { .. }
                | SupervisorError::DependencyNotStarted { .. }
                | SupervisorError::ShuttingDown
        )
    }
}

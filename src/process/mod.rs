//! Supervised processes: configuration, state model and OS handle.

mod config;
mod handle;
mod state;

pub use config::{HealthCheckConfig, ProcessConfig, Probe};
pub(crate) use config::{duration_ms, opt_duration_ms};
pub use handle::{ProcessHandle, SignalKind};
pub use state::{ExitStatus, LogStream, ProcessInfo, ProcessState, RestartAttempt};

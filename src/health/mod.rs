//! Health checking.
//!
//! - [`HealthStatus`] readiness verdict (`Unknown`, `Healthy`, `Unhealthy`)
//! - [`HealthTracker`] consecutive-outcome thresholds
//! - [`run_probe`] one bounded probe attempt (command, TCP connect, HTTP GET)
//! - [`HealthChecker`] background probe loop for a live process
//!
//! A process without a health check is considered `Healthy` as soon as it is
//! `Running`; that shortcut lives in the process owner, not here.

mod checker;
mod probe;
mod status;

pub use checker::{HealthChecker, HealthReport};
pub use probe::{ProbeContext, run_probe};
pub use status::{HealthStatus, HealthTracker};

//! # Supervisor-wide configuration.
//!
//! [`SupervisorConfig`] holds the runtime settings shared by all processes and
//! the defaults that a [`ProcessConfig`](crate::ProcessConfig) inherits when it
//! leaves the corresponding field unset.
//!
//! ## Sentinel values
//! - `start_timeout = None` → starts wait for dependencies indefinitely
//! - `stability_window = 0s` → the restart counter is never reset

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::process::ProcessConfig;

/// Global configuration for the supervisor runtime.
///
/// ## Field semantics
/// - `grace`: deadline for the whole ordered stop (`stop_all`, shutdown); past it
///   every process still alive is killed
/// - `stop_grace`: per-process wait between TERM and KILL
/// - `bus_capacity`: event bus ring buffer size (min 1)
/// - `stability_window`: how long a process must stay ready before its restart
///   counter is reset
/// - `start_timeout`: how long a start may wait for dependencies to become ready
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct SupervisorConfig {
    /// Deadline for an ordered stop of all processes.
    #[serde(rename = "grace_ms", with = "crate::process::duration_ms")]
    pub grace: Duration,

    /// Default wait between TERM and KILL for a single process.
    #[serde(rename = "stop_grace_ms", with = "crate::process::duration_ms")]
    pub stop_grace: Duration,

    /// Capacity of the event bus broadcast channel.
    ///
    /// Receivers lagging more than `bus_capacity` events skip the oldest ones.
    pub bus_capacity: usize,

    /// Default stability window.
    #[serde(rename = "stability_window_ms", with = "crate::process::duration_ms")]
    pub stability_window: Duration,

    /// Default dependency wait for starts.
    #[serde(rename = "start_timeout_ms", with = "crate::process::opt_duration_ms")]
    pub start_timeout: Option<Duration>,
}

impl SupervisorConfig {
    /// Returns a bus capacity clamped to a minimum of 1.
    #[inline]
    pub fn bus_capacity_clamped(&self) -> usize {
        self.bus_capacity.max(1)
    }

    /// Effective TERM→KILL wait for a process.
    #[inline]
    pub fn stop_grace_for(&self, process: &ProcessConfig) -> Duration {
        process.stop_grace.unwrap_or(self.stop_grace)
    }

    /// Effective stability window for a process (`None` = never reset).
    #[inline]
    pub fn stability_window_for(&self, process: &ProcessConfig) -> Option<Duration> {
        let window = process.stability_window.unwrap_or(self.stability_window);
        if window.is_zero() { None } else { Some(window) }
    }

    /// Effective dependency wait for a process.
    #[inline]
    pub fn start_timeout_for(&self, process: &ProcessConfig) -> Option<Duration> {
        process.start_timeout.or(self.start_timeout)
    }
}

impl Default for SupervisorConfig {
    /// Default configuration:
    ///
    /// - `grace = 30s`
    /// - `stop_grace = 5s`
    /// - `bus_capacity = 1024`
    /// - `stability_window = 60s`
    /// - `start_timeout = None` (wait indefinitely)
    fn default() -> Self {
        Self {
            grace: Duration::from_secs(30),
            stop_grace: Duration::from_secs(5),
            bus_capacity: 1024,
            stability_window: Duration::from_secs(60),
            start_timeout: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn process_overrides_win() {
        let cfg = SupervisorConfig::default();
        let p = ProcessConfig::new("api", "api")
            .with_stop_grace(Duration::from_secs(1))
            .with_start_timeout(Duration::from_secs(10));

        assert_eq!(cfg.stop_grace_for(&p), Duration::from_secs(1));
        assert_eq!(cfg.start_timeout_for(&p), Some(Duration::from_secs(10)));
        assert_eq!(cfg.stability_window_for(&p), Some(Duration::from_secs(60)));
    }

    #[test]
    fn zero_stability_window_disables_reset() {
        let cfg = SupervisorConfig::default();
        let p = ProcessConfig::new("api", "api").with_stability_window(Duration::ZERO);
        assert_eq!(cfg.stability_window_for(&p), None);
    }

    #[test]
    fn deserializes_with_defaults() {
        let cfg: SupervisorConfig = serde_json::from_str(r#"{"grace_ms": 2500}"#).unwrap();
        assert_eq!(cfg.grace, Duration::from_millis(2500));
        assert_eq!(cfg.bus_capacity, 1024);
        assert_eq!(cfg.start_timeout, None);
    }
}

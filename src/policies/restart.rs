//! # Restart policy for crashed processes.
//!
//! [`RestartPolicy`] decides what happens after a process exits on its own:
//!
//! ```text
//! exit observed
//!   ├─ deliberate or auto_restart = false ─► Stay     (remains Crashed)
//!   ├─ restart_count >= max_restarts      ─► GiveUp   (goes Failed)
//!   └─ otherwise                          ─► Restart  (after backoff.next(restart_count))
//! ```
//!
//! The caller owns the restart counter: it increments it when it schedules a
//! restart and resets it once the process has been ready for its stability window,
//! so a crash from last week does not eat today's budget.

use std::time::Duration;

use crate::policies::BackoffPolicy;
use crate::process::ProcessConfig;

/// Reason attached to `Failed` when the restart budget is spent.
pub const MAX_RESTARTS_EXCEEDED: &str = "max restarts exceeded";

/// Outcome of [`RestartPolicy::decide`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RestartDecision {
    /// Respawn after the given delay.
    Restart {
        /// Delay before the respawn.
        after: Duration,
    },
    /// Budget exhausted; the process becomes `Failed`.
    GiveUp {
        /// Human-readable reason.
        reason: String,
    },
    /// No automatic restart is considered.
    Stay,
}

/// Per-process restart rules.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RestartPolicy {
    /// Restart after unexpected exits.
    pub auto_restart: bool,
    /// Restart budget (`None` = unlimited).
    pub max_restarts: Option<u32>,
    /// Delay computation.
    pub backoff: BackoffPolicy,
}

impl Default for RestartPolicy {
    /// No automatic restarts.
    fn default() -> Self {
        Self {
            auto_restart: false,
            max_restarts: None,
            backoff: BackoffPolicy::default(),
        }
    }
}

impl RestartPolicy {
    /// Builds the policy described by a process config.
    pub fn from_config(cfg: &ProcessConfig) -> Self {
        let backoff = if cfg.backoff_factor == 1.0 {
            BackoffPolicy::fixed(cfg.restart_delay)
        } else {
            BackoffPolicy::exponential(cfg.restart_delay, cfg.backoff_factor, cfg.max_restart_delay)
        };
        Self {
            auto_restart: cfg.auto_restart,
            max_restarts: cfg.max_restarts,
            backoff: backoff.with_jitter(cfg.jitter),
        }
    }

    /// Decides whether a process that exited should be restarted.
    ///
    /// ### Parameters
    /// - `restart_count`: automatic restarts performed since the last reset
    /// - `deliberate`: the exit was requested by the supervisor (e.g. observed
    ///   while shutting down)
    pub fn decide(&self, restart_count: u32, deliberate: bool) -> RestartDecision {
        if deliberate || !self.auto_restart {
            return RestartDecision::Stay;
        }
        if let Some(max) = self.max_restarts {
            if restart_count >= max {
                return RestartDecision::GiveUp {
                    reason: MAX_RESTARTS_EXCEEDED.to_string(),
                };
            }
        }
        RestartDecision::Restart {
            after: self.backoff.next(restart_count),
        }
    }
}

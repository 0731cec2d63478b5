//! Restart and backoff policies.
//!
//! This module groups the knobs that control **if/when** a crashed process is
//! restarted and **how long** to wait before respawning it.
//!
//! ## Contents
//! - [`RestartPolicy`] whether to restart (auto-restart flag, bounded budget)
//! - [`BackoffPolicy`] how restart delays evolve (fixed, or first × factor^n up to max)
//! - [`JitterPolicy`]  optional randomization of the delay
//!
//! ## Quick wiring
//! ```text
//! ProcessConfig { auto_restart, max_restarts, restart_delay, backoff_factor, .. }
//!      └─► RestartPolicy::from_config()
//!           └─► core::actor uses decide(restart_count, deliberate) after every exit
//! ```
//!
//! ## Defaults
//! - `auto_restart = false`: a crashed process stays `Crashed`.
//! - `BackoffPolicy::fixed(restart_delay)`, no jitter.

mod backoff;
mod jitter;
mod restart;

pub use backoff::BackoffPolicy;
pub use jitter::JitterPolicy;
pub use restart::{MAX_RESTARTS_EXCEEDED, RestartDecision, RestartPolicy};

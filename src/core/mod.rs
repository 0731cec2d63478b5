//! Runtime core: orchestration and lifecycle.
//!
//! The public API from this module is [`Supervisor`], its [`SupervisorBuilder`]
//! and [`SupervisorConfig`].
//!
//! Internal modules:
//! - [`supervisor`]: control operations, ordered stop, shutdown;
//! - [`actor`]: single owner of one process (state machine, restarts, health);
//! - [`record`]: the per-process record owned by an actor;
//! - [`registry`]: name → actor handle, built once at load;
//! - [`builder`]: validation, wiring, subscriber listener;
//! - [`shutdown`]: OS termination signals.

mod actor;
mod builder;
mod config;
mod record;
mod registry;
mod shutdown;
mod supervisor;

pub use builder::SupervisorBuilder;
pub use config::SupervisorConfig;
pub use supervisor::Supervisor;

//! # Callback subscribers.
//!
//! Events published on the [`Bus`](crate::Bus) are forwarded by the supervisor to
//! a [`SubscriberSet`], which feeds every [`Subscribe`] implementation through its
//! own bounded queue.
//!
//! ```text
//! ProcessActor / output readers ── publish ──► Bus ──► listener ──► SubscriberSet
//!                                                                     ├──► LogWriter (feature "logging")
//!                                                                     └──► custom subscribers
//! ```

#[cfg(feature = "logging")]
mod log;
mod set;
mod subscribe;

#[cfg(feature = "logging")]
pub use log::LogWriter;
pub use set::SubscriberSet;
pub use subscribe::Subscribe;

//! # stim_core
//!
//! Shared foundation for the experiment runner.
//!
//! This crate provides:
//!
//! - [`error`] — the chained error envelope used by every long-running
//!   operation.
//! - [`clock`] — monotonic and countdown clocks for frame-paced tasks.
//! - [`config`] — experiment configuration and the per-session context
//!   threaded through manager operations.

pub mod clock;
pub mod config;
pub mod error;

pub use clock::{Clock, CountdownTimer, MonotonicClock};
pub use config::{Configuration, SaveFormat, SessionContext};
pub use error::Envelope;

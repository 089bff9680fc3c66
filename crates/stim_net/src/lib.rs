//! # stim_net
//!
//! HTTP transport layer for the remote experiment server.
//!
//! This crate provides:
//!
//! - [`remote`] — the [`Remote`] transport trait and its `reqwest`-backed
//!   implementation.
//! - [`messages`] — response types for the server's command protocol.
//! - [`error`] — network-layer error types.

pub mod error;
pub mod messages;
pub mod remote;

pub use error::NetError;
pub use remote::{HttpRemote, Remote};

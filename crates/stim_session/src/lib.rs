//! # stim_session
//!
//! Session orchestration for the experiment runner.
//!
//! This crate provides:
//!
//! - [`data`] — the collected-results store uploaded at quit time.
//! - [`participant`] — optional participant network info.
//! - [`runner`] — the [`ExperimentRunner`] sequencing configuration, session
//!   lifecycle, resource download, and the frame loop.

pub mod data;
pub mod participant;
pub mod runner;

pub use data::ExperimentData;
pub use participant::ParticipantInfo;
pub use runner::{wait_for_resources, ExperimentRunner, RunStatus};

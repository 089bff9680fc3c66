//! # stim_sched
//!
//! Cooperative frame-locked task scheduler.
//!
//! This crate provides:
//!
//! - [`task`] — the [`Task`] variants, argument bundle, and per-step
//!   [`Signal`].
//! - [`scheduler`] — the [`Scheduler`] queue and its single-frame execution
//!   primitive.
//! - [`frame`] — the paced [`FrameLoop`] that drains one scheduler step per
//!   display frame.

pub mod frame;
pub mod scheduler;
pub mod task;

pub use frame::{FrameConfig, FrameLoop, StopHandle};
pub use scheduler::Scheduler;
pub use task::{Signal, Task, TaskArgs};

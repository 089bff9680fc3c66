//! # stim_assets
//!
//! Asynchronous resource acquisition for the experiment runner.
//!
//! This crate provides:
//!
//! - [`classify`] — media-kind classification of resource names.
//! - [`registry`] — the insertion-ordered resource registry with its frozen
//!   expected total.
//! - [`event`] — progress events and the manager status.
//! - [`fetch`] — the bulk and audio loader seams.
//! - [`manager`] — the [`ResourceManager`] tying it all together.

pub mod classify;
pub mod event;
pub mod fetch;
pub mod manager;
pub mod registry;

pub use classify::MediaKind;
pub use event::{ManagerStatus, ResourceEvent};
pub use fetch::{AudioClip, AudioFetcher, BulkFetcher, HttpFetcher, Payload};
pub use manager::{ResourceManager, ResourceRequest};
pub use registry::{Registry, ResourceEntry, ResourceState};

//! Manager status and progress events.

/// The externally observable lifecycle of the resource manager.
///
/// The status is `Busy` for the entire duration of exactly one in-flight
/// manager operation; concurrent operations are rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ManagerStatus {
    Ready,
    Busy,
    Error,
}

/// Progress events emitted by the resource manager.
///
/// A progress UI subscribes to these: `ResourcesRegistered` carries the
/// frozen total before the first byte arrives, so the UI can size itself;
/// `DownloadCompleted` fires exactly once per session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResourceEvent {
    /// The manifest is registered and the expected total is frozen.
    ResourcesRegistered { count: usize },
    /// A single resource transfer has been dispatched.
    DownloadingResource { name: String },
    /// A single resource payload has arrived.
    ResourceDownloaded { name: String },
    /// Every registered resource is loaded.
    DownloadCompleted,
    /// The manager status changed.
    Status { status: ManagerStatus },
}

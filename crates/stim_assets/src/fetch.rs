//! Loader seams.
//!
//! Resources reach the manager through two routes: the bulk loader, which
//! can fetch manifest items concurrently, and the audio loader, which loads
//! one clip at a time with an independent completion per item. Both are
//! trait seams so tests can substitute in-memory fakes.

use async_trait::async_trait;
use bytes::Bytes;

use stim_net::{NetError, Remote};

/// An opaque audio payload.
///
/// Decoding is the audio subsystem's business; the manager only tracks the
/// raw clip.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioClip {
    pub bytes: Bytes,
}

/// A loaded resource payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    Binary(Bytes),
    Audio(AudioClip),
}

/// Fetches generic/tabular resources for the bulk manifest route.
#[async_trait]
pub trait BulkFetcher: Send + Sync {
    async fn fetch(&self, path: &str) -> Result<Bytes, NetError>;
}

/// Fetches audio resources, one clip per call.
#[async_trait]
pub trait AudioFetcher: Send + Sync {
    async fn fetch(&self, path: &str) -> Result<AudioClip, NetError>;
}

/// Production fetcher for both routes, backed by a [`Remote`] transport.
pub struct HttpFetcher<R: Remote> {
    remote: R,
}

impl<R: Remote> HttpFetcher<R> {
    pub fn new(remote: R) -> Self {
        Self { remote }
    }
}

#[async_trait]
impl<R: Remote> BulkFetcher for HttpFetcher<R> {
    async fn fetch(&self, path: &str) -> Result<Bytes, NetError> {
        self.remote.get_bytes(path).await
    }
}

#[async_trait]
impl<R: Remote> AudioFetcher for HttpFetcher<R> {
    async fn fetch(&self, path: &str) -> Result<AudioClip, NetError> {
        let bytes = self.remote.get_bytes(path).await?;
        Ok(AudioClip { bytes })
    }
}

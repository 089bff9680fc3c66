//! Remote-server transport.
//!
//! The experiment server speaks a query-string command protocol over HTTP
//! with JSON responses. [`Remote`] is the seam the manager talks through;
//! [`HttpRemote`] is the production implementation, a thin wrapper around a
//! pooled `reqwest::Client`. Tests substitute an in-memory fake.

use async_trait::async_trait;
use bytes::Bytes;
use tracing::debug;

use crate::error::NetError;

/// Transport to the remote experiment server and resource store.
#[async_trait]
pub trait Remote: Send + Sync {
    /// GET a JSON document, with query parameters.
    async fn get_json(
        &self,
        url: &str,
        query: &[(&str, &str)],
    ) -> Result<serde_json::Value, NetError>;

    /// POST a form, with query parameters, expecting a JSON response.
    async fn post_form(
        &self,
        url: &str,
        query: &[(&str, &str)],
        form: &[(&str, String)],
    ) -> Result<serde_json::Value, NetError>;

    /// GET a raw payload (resource transfer).
    async fn get_bytes(&self, url: &str) -> Result<Bytes, NetError>;
}

/// `reqwest`-backed transport with connection pooling.
#[derive(Debug, Clone, Default)]
pub struct HttpRemote {
    client: reqwest::Client,
}

impl HttpRemote {
    #[must_use]
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl Remote for HttpRemote {
    async fn get_json(
        &self,
        url: &str,
        query: &[(&str, &str)],
    ) -> Result<serde_json::Value, NetError> {
        debug!(url, "GET json");
        let response = self
            .client
            .get(url)
            .query(query)
            .send()
            .await?
            .error_for_status()?;
        Ok(response.json().await?)
    }

    async fn post_form(
        &self,
        url: &str,
        query: &[(&str, &str)],
        form: &[(&str, String)],
    ) -> Result<serde_json::Value, NetError> {
        debug!(url, "POST form");
        let response = self
            .client
            .post(url)
            .query(query)
            .form(form)
            .send()
            .await?
            .error_for_status()?;
        Ok(response.json().await?)
    }

    async fn get_bytes(&self, url: &str) -> Result<Bytes, NetError> {
        debug!(url, "GET bytes");
        let response = self.client.get(url).send().await?.error_for_status()?;
        Ok(response.bytes().await?)
    }
}

//! Network-layer error types.

/// Errors that can occur during remote-server operations.
#[derive(Debug, thiserror::Error)]
pub enum NetError {
    /// The HTTP request itself failed (transport error).
    #[error("request error: {0}")]
    Http(#[from] reqwest::Error),

    /// The response body was not valid JSON.
    #[error("malformed response: {0}")]
    Json(#[from] serde_json::Error),

    /// The server answered with an explicit error field.
    #[error("server error: {0}")]
    Server(String),

    /// The response was well-formed but missing a required field.
    #[error("unexpected answer from server: {0}")]
    Protocol(&'static str),
}

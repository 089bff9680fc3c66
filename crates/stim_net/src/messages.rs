//! Response types for the experiment server's command protocol.
//!
//! Every command answers with a JSON object. An `error` field anywhere means
//! the server rejected the command; beyond that, each response type checks
//! the presence of its required fields before decoding, so a missing field
//! is reported as a protocol error naming the field.

use serde::Deserialize;

use crate::error::NetError;

/// Rejects responses carrying an explicit `error` field.
///
/// # Errors
///
/// Returns [`NetError::Server`] with the server-supplied message.
pub fn check_server_error(document: &serde_json::Value) -> Result<(), NetError> {
    if let Some(error) = document.get("error") {
        let message = match error.as_str() {
            Some(text) => text.to_string(),
            None => error.to_string(),
        };
        return Err(NetError::Server(message));
    }
    Ok(())
}

/// Answer to `command=list_resources`.
#[derive(Debug, Clone, Deserialize)]
pub struct ListResourcesResponse {
    /// Resource names, relative to the resource directory.
    pub resources: Vec<String>,
    /// Base URL the resource names resolve against.
    #[serde(rename = "resourceDirectory")]
    pub resource_directory: String,
}

impl ListResourcesResponse {
    /// Validate and decode a `list_resources` response.
    ///
    /// # Errors
    ///
    /// [`NetError::Server`] for an `error` field, [`NetError::Protocol`] for
    /// a missing `resources` or `resourceDirectory` field.
    pub fn from_json(document: &serde_json::Value) -> Result<Self, NetError> {
        check_server_error(document)?;
        if document.get("resources").is_none() {
            return Err(NetError::Protocol("no resources"));
        }
        if document.get("resourceDirectory").is_none() {
            return Err(NetError::Protocol("no resourceDirectory"));
        }
        Ok(serde_json::from_value(document.clone())?)
    }
}

/// Answer to `command=open_session`.
#[derive(Debug, Clone, Deserialize)]
pub struct OpenSessionResponse {
    /// The token identifying the opened session.
    pub token: String,
}

impl OpenSessionResponse {
    /// Validate and decode an `open_session` response.
    ///
    /// # Errors
    ///
    /// [`NetError::Server`] for an `error` field, [`NetError::Protocol`]
    /// when no token was returned.
    pub fn from_json(document: &serde_json::Value) -> Result<Self, NetError> {
        check_server_error(document)?;
        if document.get("token").is_none() {
            return Err(NetError::Protocol("no token"));
        }
        Ok(serde_json::from_value(document.clone())?)
    }
}

/// Answer to `close_session` and `save_data`: any error has already been
/// checked, the rest of the document is carried through untyped.
#[derive(Debug, Clone)]
pub struct SessionAck {
    pub data: serde_json::Value,
}

impl SessionAck {
    /// Validate a close/save acknowledgement.
    ///
    /// # Errors
    ///
    /// [`NetError::Server`] for an `error` field.
    pub fn from_json(document: &serde_json::Value) -> Result<Self, NetError> {
        check_server_error(document)?;
        Ok(Self {
            data: document.clone(),
        })
    }
}

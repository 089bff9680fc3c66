//! Experiment configuration and session context.
//!
//! The configuration document is fetched from the remote server as JSON. The
//! [`SessionContext`] is the explicit per-session value the orchestrator owns
//! and passes into every manager operation; there is no implicit shared
//! session state.

use serde::{Deserialize, Serialize};

/// Format the collected data is saved in on the server side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SaveFormat {
    Csv,
    Database,
}

impl Default for SaveFormat {
    fn default() -> Self {
        Self::Csv
    }
}

impl SaveFormat {
    /// The wire name sent with `save_data` requests.
    #[must_use]
    pub fn wire_name(self) -> &'static str {
        match self {
            Self::Csv => "CSV",
            Self::Database => "DATABASE",
        }
    }
}

/// The `experiment` block of the configuration document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExperimentInfo {
    /// Human-readable experiment name.
    pub name: String,
    /// Full server-side path identifying the experiment.
    pub fullpath: String,
    /// Requested save format (defaults to CSV when absent).
    #[serde(rename = "saveFormat", default)]
    pub save_format: SaveFormat,
}

/// The `psychoJsManager` block of the configuration document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManagerInfo {
    /// Base URL of the remote experiment manager.
    #[serde(rename = "URL")]
    pub url: String,
}

/// Errors raised while validating a configuration document.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The document was not valid JSON for the expected shape.
    #[error("malformed configuration: {0}")]
    Malformed(#[from] serde_json::Error),

    /// A required block or field was absent.
    #[error("missing {0} in configuration")]
    Missing(&'static str),
}

/// The full configuration document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Configuration {
    pub experiment: ExperimentInfo,
    #[serde(rename = "psychoJsManager")]
    pub manager: ManagerInfo,
}

impl Configuration {
    /// Validate and decode a raw JSON configuration document.
    ///
    /// The block-level checks run before deserialisation so a missing block
    /// is reported as a protocol error naming the block, not as a generic
    /// decode failure.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when a required block or field is absent or
    /// the document does not decode.
    pub fn from_json(document: &serde_json::Value) -> Result<Self, ConfigError> {
        let experiment = document
            .get("experiment")
            .ok_or(ConfigError::Missing("experiment block"))?;
        if experiment.get("name").is_none() {
            return Err(ConfigError::Missing("name in experiment block"));
        }
        if experiment.get("fullpath").is_none() {
            return Err(ConfigError::Missing("fullpath in experiment block"));
        }
        let manager = document
            .get("psychoJsManager")
            .ok_or(ConfigError::Missing("psychoJsManager block"))?;
        if manager.get("URL").is_none() {
            return Err(ConfigError::Missing("URL in psychoJsManager block"));
        }
        Ok(serde_json::from_value(document.clone())?)
    }
}

/// Explicit session state passed into every manager operation.
///
/// Owned by the orchestrator; the `token` is filled in once a session has
/// been opened.
#[derive(Debug, Clone)]
pub struct SessionContext {
    /// Base URL of the remote experiment manager.
    pub manager_url: String,
    /// Experiment name, used in log and error context.
    pub experiment_name: String,
    /// Full server-side path identifying the experiment.
    pub experiment_fullpath: String,
    /// Save format for uploaded data.
    pub save_format: SaveFormat,
    /// Session token, present once a session is open.
    pub token: Option<String>,
}

impl SessionContext {
    /// Build a session context from a validated configuration.
    #[must_use]
    pub fn from_configuration(config: &Configuration) -> Self {
        Self {
            manager_url: config.manager.url.clone(),
            experiment_name: config.experiment.name.clone(),
            experiment_fullpath: config.experiment.fullpath.clone(),
            save_format: config.experiment.save_format,
            token: None,
        }
    }

    /// The session token, or `""` when no session is open yet.
    ///
    /// Listing resources before `open_session` is legal against servers that
    /// do not require a token, so the empty string is sent rather than
    /// failing locally.
    #[must_use]
    pub fn token_or_empty(&self) -> &str {
        self.token.as_deref().unwrap_or("")
    }
}

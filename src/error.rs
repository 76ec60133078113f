use thiserror::Error;

use crate::prompts::API_ERROR_MESSAGE;

/// Failures of the on-disk config and history stores.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid JSON in {path}: {source}")]
    Json {
        path: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("invalid history file name: {0:?}")]
    InvalidFileName(String),
}

impl StoreError {
    pub(crate) fn io(path: impl AsRef<std::path::Path>, source: std::io::Error) -> Self {
        StoreError::Io {
            path: path.as_ref().display().to_string(),
            source,
        }
    }

    pub(crate) fn json(path: impl AsRef<std::path::Path>, source: serde_json::Error) -> Self {
        StoreError::Json {
            path: path.as_ref().display().to_string(),
            source,
        }
    }
}

/// Why a completion request (or its stream) failed.
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("authentication rejected (HTTP {status}): {message}")]
    Auth { status: u16, message: String },
    #[error("network error: {0}")]
    Network(String),
    #[error("provider error (HTTP {status}): {message}")]
    Provider { status: u16, message: String },
    #[error("malformed response: {0}")]
    MalformedResponse(String),
}

impl GatewayError {
    /// Short label for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            GatewayError::Auth { .. } => "auth",
            GatewayError::Network(_) => "network",
            GatewayError::Provider { .. } => "provider",
            GatewayError::MalformedResponse(_) => "malformed_response",
        }
    }

    /// The single string shown to the user (and stored in the transcript)
    /// whatever went wrong.
    pub fn user_message(&self) -> &'static str {
        API_ERROR_MESSAGE
    }
}

impl From<reqwest::Error> for GatewayError {
    fn from(err: reqwest::Error) -> Self {
        GatewayError::Network(err.to_string())
    }
}

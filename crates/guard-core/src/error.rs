//! Error types for the PNL guard.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{operation} timed out")]
    Timeout { operation: String },

    #[error("API error: {message}")]
    Api { message: String, status: Option<u16> },

    #[error("Configuration file error: {0}")]
    ConfigFile(#[from] config::ConfigError),

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Kill switch rejected by broker: {status}")]
    KillSwitchRejected { status: String },
}

impl Error {
    /// Network, timeout and broker-side failures that the next scheduled
    /// check may not hit again. Rejected credentials are not transient.
    pub fn is_transient(&self) -> bool {
        match self {
            Error::Http(_) | Error::Json(_) | Error::Timeout { .. } => true,
            Error::Api { status, .. } => !matches!(status, Some(401 | 403)),
            _ => false,
        }
    }

    pub fn timeout(operation: impl Into<String>) -> Self {
        Error::Timeout {
            operation: operation.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

// src/utils/errors.rs

use std::{error::Error, fmt};

/// Errors coming from external API calls (exchange REST, Telegram).
#[derive(Debug)]
pub enum ApiError {
    Http(reqwest::Error),
    Json(serde_json::Error),
    /// The remote answered but refused the request
    Rejected { status: u16, description: String },
    Other(String),
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ApiError::Http(e)      => write!(f, "HTTP error: {}", e),
            ApiError::Json(e)      => write!(f, "JSON error: {}", e),
            ApiError::Rejected { status, description } => {
                write!(f, "rejected ({}): {}", status, description)
            }
            ApiError::Other(msg)   => write!(f, "{}", msg),
        }
    }
}

impl Error for ApiError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            ApiError::Http(e) => Some(e),
            ApiError::Json(e) => Some(e),
            _                 => None,
        }
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(err: reqwest::Error) -> Self { ApiError::Http(err) }
}
impl From<serde_json::Error> for ApiError {
    fn from(err: serde_json::Error) -> Self { ApiError::Json(err) }
}
impl From<String> for ApiError {
    fn from(msg: String) -> Self { ApiError::Other(msg) }
}

/// Loading or evaluating the classifier.
#[derive(Debug, thiserror::Error)]
pub enum ModelError {
    #[error("no model file at {0}")]
    Missing(String),
    #[error("model io: {0}")]
    Io(#[from] std::io::Error),
    #[error("model json: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("malformed model: {0}")]
    Malformed(String),
}

/// Reading or writing the prediction log.
#[derive(Debug, thiserror::Error)]
pub enum HistoryError {
    #[error("history io: {0}")]
    Io(#[from] std::io::Error),
    #[error("history csv: {0}")]
    Csv(#[from] csv::Error),
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{key} must be {expected}, got {value:?}")]
    Invalid {
        key: &'static str,
        expected: &'static str,
        value: String,
    },
    #[error("{0} is required when {1}")]
    Missing(&'static str, &'static str),
}

/// A failure caught at the top of a live cycle.
#[derive(Debug, thiserror::Error)]
pub enum CycleError {
    #[error(transparent)]
    History(#[from] HistoryError),
}

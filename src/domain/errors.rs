//! Catalog error types
//!
//! Every failure the client can surface, from form validation to transport errors.
//! The type is `Clone` so one deduplicated result can be handed to every waiter.

use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CatalogError {
    /// Client-side rule violated before any request was sent
    Validation(String),
    /// Network failure (unreachable host, timeout, broken connection)
    Transport(String),
    /// Backend answered with a non-success status
    Status { status: u16, body: String },
    /// Response body did not have the expected shape
    Decode(String),
    /// Invalid configuration
    Config(String),
    /// Query settled without data, or the client was shut down
    Unavailable,
}

impl CatalogError {
    /// True for errors raised before a request ever left the client
    pub fn is_validation(&self) -> bool {
        matches!(self, CatalogError::Validation(_))
    }
}

impl fmt::Display for CatalogError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CatalogError::Validation(msg) => write!(f, "Validation error: {}", msg),
            CatalogError::Transport(msg) => write!(f, "Transport error: {}", msg),
            CatalogError::Status { status, body } => {
                write!(f, "Backend returned status {}: {}", status, body)
            }
            CatalogError::Decode(msg) => write!(f, "Failed to decode response: {}", msg),
            CatalogError::Config(msg) => write!(f, "Configuration error: {}", msg),
            CatalogError::Unavailable => write!(f, "Query result unavailable"),
        }
    }
}

impl std::error::Error for CatalogError {}

impl From<reqwest::Error> for CatalogError {
    fn from(e: reqwest::Error) -> Self {
        CatalogError::Transport(e.to_string())
    }
}

impl From<serde_json::Error> for CatalogError {
    fn from(e: serde_json::Error) -> Self {
        CatalogError::Decode(e.to_string())
    }
}

impl From<url::ParseError> for CatalogError {
    fn from(e: url::ParseError) -> Self {
        CatalogError::Config(e.to_string())
    }
}

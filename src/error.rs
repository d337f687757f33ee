//! Error types for Cobee
//!
//! This module defines all error types used throughout the crate,
//! using `thiserror` for ergonomic error handling.

use thiserror::Error;

/// Main error type for Cobee operations
///
/// Covers backend resolution, the PIN authorization flow, token refresh,
/// persistence, configuration, and authenticated API calls.
#[derive(Error, Debug)]
pub enum CobeeError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// No backend implementation is registered for the URI scheme
    #[error("Unknown backend scheme: {0}")]
    UnknownBackend(String),

    /// The backend URI could not be parsed
    #[error("Invalid backend URI: {0}")]
    InvalidBackendUri(String),

    /// The authorization endpoint itself failed (network or HTTP error)
    #[error("Authorization request failed: {0}")]
    AuthorizationRequest(String),

    /// Polling ended without a grant
    #[error("Authorization timed out after {attempts} attempts: {message}")]
    AuthorizationTimeout {
        /// Number of token requests made before giving up
        attempts: u32,
        /// Additional context about the failure
        message: String,
    },

    /// The refresh call failed or returned no usable credential
    #[error("Token refresh failed: {0}")]
    TokenRefresh(String),

    /// Storage read or write failed
    #[error("Backend persistence error: {0}")]
    BackendPersistence(String),

    /// A token could not be constructed from the provider response
    #[error("Invalid token: {0}")]
    InvalidToken(String),

    /// An authenticated API call returned a non-success status
    #[error("API error ({status}): {message}")]
    Api {
        /// HTTP status code returned by the API
        status: u16,
        /// Response body or reason
        message: String,
    },

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// YAML parsing errors
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// HTTP request errors
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

/// Result type alias for Cobee operations
///
/// Uses `anyhow::Error` so callers can attach context; match on a specific
/// failure with `err.downcast_ref::<CobeeError>()`.
pub type Result<T> = anyhow::Result<T>;

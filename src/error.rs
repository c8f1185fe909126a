//! Error types for ChatRelay
//!
//! This module defines all error types used throughout the application,
//! using `thiserror` for ergonomic error handling.

use thiserror::Error;

/// Main error type for ChatRelay operations
///
/// This enum encompasses all possible errors that can occur while talking
/// to the upstream Ollama server, running the proxy, persisting
/// conversations, and loading configuration.
#[derive(Error, Debug)]
pub enum ChatRelayError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Upstream server errors (connect failures, malformed responses)
    #[error("Upstream error: {0}")]
    Upstream(String),

    /// Upstream returned a non-success HTTP status before any fragment
    #[error("Upstream returned HTTP {status}: {message}")]
    UpstreamStatus {
        /// The HTTP status code returned by the upstream server
        status: u16,
        /// Body or reason text accompanying the status
        message: String,
    },

    /// Key-value storage errors (read/write failures)
    #[error("Storage error: {0}")]
    Storage(String),

    /// The storage backend rejected a write for exceeding its capacity
    #[error("Storage quota exceeded while writing key '{key}'")]
    StorageFull {
        /// The key whose write was rejected
        key: String,
    },

    /// Proxy server errors (bind failures, shutdown problems)
    #[error("Proxy error: {0}")]
    Proxy(String),

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

/// Result type alias for ChatRelay operations
///
/// This is a convenience alias that uses `anyhow::Error` as the error type,
/// allowing for rich error context and easy error propagation.
pub type Result<T> = anyhow::Result<T>;

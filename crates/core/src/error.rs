//! Error types for the murmur domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! `ConnectionError` is what callers of the registry see; `ActionFailure`
//! is what a concrete connection reports when the underlying call fails.

use thiserror::Error;

/// Errors surfaced by connections and the connection registry.
#[derive(Debug, Error)]
pub enum ConnectionError {
    // --- Startup-time errors ---
    #[error("Configuration error for connection '{connection}': {}", .problems.join("; "))]
    Configuration {
        connection: String,
        problems: Vec<String>,
    },

    #[error("Duplicate connection name: {0}")]
    DuplicateConnection(String),

    #[error("No language model provider connection is configured")]
    NoProvider,

    // --- Request errors ---
    #[error("Connection '{0}' is not configured")]
    NotConfigured(String),

    #[error("Unknown connection: {0}")]
    UnknownConnection(String),

    #[error("Unknown action '{action}' on connection '{connection}'")]
    UnknownAction { connection: String, action: String },

    #[error("Invalid parameters for {connection}.{action}: {}", .violations.join("; "))]
    Validation {
        connection: String,
        action: String,
        violations: Vec<String>,
    },

    #[error("Malformed action request, missing fields: {}", .missing.join(", "))]
    MalformedRequest { missing: Vec<String> },

    // --- Execution errors ---
    #[error("Action {connection}.{action} failed: {source}")]
    Execution {
        connection: String,
        action: String,
        #[source]
        source: ActionFailure,
    },
}

impl ConnectionError {
    /// The underlying failure, when this is an execution error.
    pub fn failure(&self) -> Option<&ActionFailure> {
        match self {
            Self::Execution { source, .. } => Some(source),
            _ => None,
        }
    }

    /// Seconds until a rate limit resets, if the backend reported one,
    /// capped at [`MAX_RETRY_AFTER_SECS`].
    pub fn retry_after(&self) -> Option<u64> {
        match self.failure() {
            Some(ActionFailure::RateLimited { retry_after_secs }) => {
                Some((*retry_after_secs).min(MAX_RETRY_AFTER_SECS))
            }
            _ => None,
        }
    }
}

/// Longest rate-limit wait honoured, in seconds (one day).
pub const MAX_RETRY_AFTER_SECS: u64 = 86_400;

/// Why a connection's concrete action implementation failed.
#[derive(Debug, Clone, Error)]
pub enum ActionFailure {
    #[error("Network error: {0}")]
    Network(String),

    #[error("API request failed: {message} (status: {status})")]
    Api { status: u16, message: String },

    #[error("Rate limited, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Request timed out after {0}s")]
    Timeout(u64),

    #[error("Unexpected response: {0}")]
    InvalidResponse(String),

    #[error("Missing credential: {0}")]
    MissingCredential(String),

    #[error("{0}")]
    Other(String),
}

/// Result type alias for registry and connection calls.
pub type Result<T> = std::result::Result<T, ConnectionError>;

//! Agent-level errors.

use murmur_config::ConfigError;
use murmur_core::ConnectionError;

use crate::selector::SelectionError;

#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    #[error(transparent)]
    Connection(#[from] ConnectionError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Selection(#[from] SelectionError),

    #[error("Agent identity unavailable: environment variable {0} is not set")]
    MissingIdentity(String),

    #[error("Task '{task}' failed: {message}")]
    Handler { task: String, message: String },
}

impl AgentError {
    /// Whether this is a connection execution failure (network, API, timeout).
    pub fn is_execution_failure(&self) -> bool {
        matches!(self, Self::Connection(ConnectionError::Execution { .. }))
    }

    /// Seconds until a reported rate limit resets.
    pub fn retry_after(&self) -> Option<u64> {
        match self {
            Self::Connection(e) => e.retry_after(),
            _ => None,
        }
    }
}

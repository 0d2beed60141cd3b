//! # murmur connections
//!
//! Concrete [`Connection`] implementations over HTTP and the factory that
//! turns an agent's `config` entries into a [`ConnectionRegistry`].
//!
//! Each connection reads its secrets from the environment on every call and
//! enforces its own request timeout (`timeout_secs`, default 10).

pub mod anthropic;
pub mod echochambers;
pub mod firecrawl;
pub mod http;
pub mod openai;
pub mod twitter;

use std::collections::HashSet;
use std::sync::Arc;

use murmur_config::ConnectionConfig;
use murmur_core::{ActionFailure, Connection, ConnectionError, ConnectionRegistry};
use tracing::warn;

pub use anthropic::AnthropicConnection;
pub use echochambers::EchoChambersConnection;
pub use firecrawl::FirecrawlConnection;
pub use openai::OpenAiConnection;
pub use twitter::TwitterConnection;

pub(crate) type ActionResult = std::result::Result<serde_json::Value, ActionFailure>;

/// Connection kinds this crate can build.
pub const KINDS: [&str; 5] = ["openai", "anthropic", "twitter", "echochambers", "firecrawl"];

/// Instantiate a single connection from its configuration entry.
pub fn create_connection(entry: &ConnectionConfig) -> murmur_core::Result<Arc<dyn Connection>> {
    let name = entry.name.as_str();
    let settings = &entry.settings;
    let connection: Arc<dyn Connection> = match entry.kind() {
        "openai" => Arc::new(OpenAiConnection::from_settings(name, settings)?),
        "anthropic" => Arc::new(AnthropicConnection::from_settings(name, settings)?),
        "twitter" => Arc::new(TwitterConnection::from_settings(name, settings)?),
        "echochambers" => Arc::new(EchoChambersConnection::from_settings(name, settings)?),
        "firecrawl" => Arc::new(FirecrawlConnection::from_settings(name, settings)?),
        other => {
            return Err(ConnectionError::Configuration {
                connection: name.to_string(),
                problems: vec![format!(
                    "unknown connection kind '{other}' (expected one of: {})",
                    KINDS.join(", ")
                )],
            });
        }
    };
    Ok(connection)
}

/// Build a registry from an agent's connection entries.
///
/// Entries that fail to build are logged, skipped, and returned alongside
/// the registry. Duplicate names abort construction.
pub fn build_registry(
    entries: &[ConnectionConfig],
) -> murmur_core::Result<(ConnectionRegistry, Vec<ConnectionError>)> {
    let mut registry = ConnectionRegistry::new();
    let mut skipped = Vec::new();
    let mut seen = HashSet::new();

    for entry in entries {
        if !seen.insert(entry.name.as_str()) {
            return Err(ConnectionError::DuplicateConnection(entry.name.clone()));
        }
        match create_connection(entry) {
            Ok(connection) => registry.register(connection)?,
            Err(e) => {
                warn!(connection = %entry.name, error = %e, "Skipping connection");
                skipped.push(e);
            }
        }
    }

    Ok((registry, skipped))
}

//! Subcommand implementations.

pub mod action;
pub mod agents;
pub mod connections;
pub mod dispatch;
pub mod run_loop;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context as _;
use murmur_config::{AgentDefinition, AgentDirectory};
use murmur_core::ConnectionRegistry;
use tracing::warn;

/// Global options shared by every subcommand.
pub struct Context {
    pub agents_dir: PathBuf,
    pub agent: Option<String>,
}

impl Context {
    pub fn directory(&self) -> AgentDirectory {
        AgentDirectory::new(&self.agents_dir)
    }

    /// The selected agent, or the default one.
    pub fn definition(&self) -> anyhow::Result<AgentDefinition> {
        let definition = self
            .directory()
            .resolve(self.agent.as_deref())
            .with_context(|| format!("Failed to load agent from {}", self.agents_dir.display()))?;
        Ok(definition)
    }

    /// Build the connection registry for `definition`.
    ///
    /// Entries that cannot be built are reported and left out.
    pub fn registry(&self, definition: &AgentDefinition) -> anyhow::Result<Arc<ConnectionRegistry>> {
        let (registry, skipped) = murmur_connections::build_registry(&definition.config)
            .with_context(|| format!("Invalid connections for agent '{}'", definition.name))?;
        for e in &skipped {
            warn!(error = %e, "Connection skipped");
        }
        Ok(Arc::new(registry))
    }
}

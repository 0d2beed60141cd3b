//! `murmur list-agents` / `murmur set-default-agent`.

use anyhow::Context as _;

use super::Context;

pub fn list(ctx: &Context) -> anyhow::Result<()> {
    let directory = ctx.directory();
    directory
        .ensure_exists()
        .context("Failed to prepare the agents directory")?;

    let agents = directory.list_agents()?;
    let default = directory.default_agent()?;

    if agents.is_empty() {
        println!("No agents in {}", directory.root().display());
        return Ok(());
    }

    println!("Agents in {}:", directory.root().display());
    for name in agents {
        let marker = if default.as_deref() == Some(name.as_str()) {
            " (default)"
        } else {
            ""
        };
        println!("  - {name}{marker}");
    }
    Ok(())
}

pub fn set_default(ctx: &Context, name: &str) -> anyhow::Result<()> {
    ctx.directory()
        .set_default_agent(name)
        .with_context(|| format!("Failed to set default agent to '{name}'"))?;
    println!("Default agent set to '{name}'");
    Ok(())
}

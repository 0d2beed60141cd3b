//! `murmur loop` and `murmur task`: run the agent loop until Ctrl+C, or
//! one named task once.

use anyhow::{Context as _, bail};
use murmur_agent::{Agent, IterationOutcome, TaskOutcome};
use tokio::sync::watch;
use tracing::{info, warn};

use super::Context;

pub async fn run(ctx: &Context) -> anyhow::Result<()> {
    let definition = ctx.definition()?;
    let registry = ctx.registry(&definition)?;
    let name = definition.name.clone();

    let mut agent = Agent::new(definition, registry)
        .with_context(|| format!("Failed to start agent '{name}'"))?;

    println!("Starting agent '{name}' (model provider: {})", agent.model_provider());
    println!("Press Ctrl+C to stop.");

    let (stop_tx, stop_rx) = watch::channel(false);
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("Shutdown requested, finishing current iteration"),
            Err(e) => warn!(error = %e, "Cannot listen for Ctrl+C, stopping"),
        }
        let _ = stop_tx.send(true);
    });

    let iterations = agent.run(stop_rx).await;
    println!("Agent '{name}' stopped after {iterations} iteration(s).");
    Ok(())
}

pub async fn run_task(ctx: &Context, name: &str) -> anyhow::Result<()> {
    let definition = ctx.definition()?;
    let registry = ctx.registry(&definition)?;
    let agent_name = definition.name.clone();

    let mut agent = Agent::new(definition, registry)
        .with_context(|| format!("Failed to start agent '{agent_name}'"))?;
    let report = agent.run_task(name).await?;

    match report.outcome {
        IterationOutcome::Task(TaskOutcome::Completed) => println!("Task '{name}' completed."),
        IterationOutcome::Task(TaskOutcome::Idle { reason }) => {
            println!("Task '{name}' had nothing to do: {reason}")
        }
        IterationOutcome::Task(TaskOutcome::CoolingDown { remaining }) => {
            println!("Task '{name}' is cooling down for {}s.", remaining.as_secs())
        }
        IterationOutcome::Failed(message) => bail!("Task '{name}' failed: {message}"),
        IterationOutcome::TimelineLimited | IterationOutcome::SelectionFailed(_) => {}
    }
    Ok(())
}

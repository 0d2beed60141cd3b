//! murmur CLI entry point.
//!
//! Commands:
//! - `list-agents`       Show agent definitions in the agents directory
//! - `set-default-agent` Record the agent used when `--agent` is omitted
//! - `list-connections`  Show an agent's connections and their readiness
//! - `list-actions`      Show the actions a connection offers
//! - `check`             Verify every connection is configured
//! - `action`            Perform a single action
//! - `loop`              Run the autonomous agent loop
//! - `task`              Run a single named task once
//! - `dispatch`          Serve JSON action requests from stdin

use std::path::PathBuf;

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(
    name = "murmur",
    about = "murmur: autonomous social agent runtime",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Agent to use (defaults to `default_agent` in general.json)
    #[arg(short, long, global = true)]
    agent: Option<String>,

    /// Directory holding agent definitions
    #[arg(long, global = true, env = "MURMUR_AGENTS_DIR", default_value = "agents")]
    agents_dir: PathBuf,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true, env = "MURMUR_LOG_JSON")]
    log_json: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// List available agent definitions
    ListAgents,

    /// Set the agent loaded when `--agent` is not given
    SetDefaultAgent {
        /// Agent name (file stem in the agents directory)
        name: String,
    },

    /// List the agent's connections
    ListConnections,

    /// List the actions of one connection
    ListActions {
        /// Connection name
        connection: String,
        /// Print each action's parameters as JSON Schema
        #[arg(long)]
        schema: bool,
    },

    /// Check that every connection is configured
    Check,

    /// Perform one action, e.g. `murmur action twitter post-tweet message=hello`
    Action {
        /// Connection name
        connection: String,
        /// Action name
        action: String,
        /// Parameters as key=value pairs
        params: Vec<String>,
    },

    /// Run the agent loop until Ctrl+C
    Loop,

    /// Run one configured task once, regardless of its weight
    Task {
        /// Task name
        name: String,
    },

    /// Read `{connection, action, args}` requests from stdin, one per line
    Dispatch,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Secrets may live in a local .env file
    let dotenv = dotenvy::dotenv();

    let filter = if cli.verbose { "debug" } else { "info" };
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with_target(false)
        .with_writer(std::io::stderr);
    if cli.log_json {
        subscriber.json().init();
    } else {
        subscriber.init();
    }

    if let Ok(path) = dotenv {
        tracing::debug!(path = %path.display(), "Loaded environment file");
    }

    let ctx = commands::Context {
        agents_dir: cli.agents_dir,
        agent: cli.agent,
    };

    match cli.command {
        Commands::ListAgents => commands::agents::list(&ctx)?,
        Commands::SetDefaultAgent { name } => commands::agents::set_default(&ctx, &name)?,
        Commands::ListConnections => commands::connections::list(&ctx).await?,
        Commands::ListActions { connection, schema } => {
            commands::connections::list_actions(&ctx, &connection, schema)?
        }
        Commands::Check => commands::connections::check(&ctx).await?,
        Commands::Action {
            connection,
            action,
            params,
        } => commands::action::run(&ctx, &connection, &action, &params).await?,
        Commands::Loop => commands::run_loop::run(&ctx).await?,
        Commands::Task { name } => commands::run_loop::run_task(&ctx, &name).await?,
        Commands::Dispatch => commands::dispatch::run(&ctx).await?,
    }

    Ok(())
}

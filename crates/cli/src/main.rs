//! chatmesh CLI: the main entry point.
//!
//! Commands:
//! - `ask`           Run one dialog turn and print the result as JSON
//! - `check-config`  Validate the app config (and optionally a chatbot config)

use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod commands;

#[derive(Parser)]
#[command(name = "chatmesh", about = "chatmesh: dialog orchestration with hybrid retrieval", version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    log_json: bool,

    /// App config file (defaults to ~/.chatmesh/config.toml)
    #[arg(long, global = true, env = "CHATMESH_CONFIG")]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one turn and print the output
    Ask(commands::ask::AskArgs),

    /// Validate configuration
    CheckConfig {
        /// Print a default config.toml and exit
        #[arg(long)]
        init: bool,

        /// Also validate a chatbot config JSON file
        #[arg(long)]
        chatbot: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.log_json);

    match cli.command {
        Commands::Ask(args) => commands::ask::run(cli.config.as_deref(), args).await?,
        Commands::CheckConfig { init, chatbot } => {
            commands::check_config::run(cli.config.as_deref(), init, chatbot.as_deref())?
        }
    }

    Ok(())
}

/// Logs go to stderr so stdout stays clean JSON.
fn init_tracing(verbose: bool, json: bool) {
    let filter = if verbose { "debug" } else { "info" };
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .with_target(false);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

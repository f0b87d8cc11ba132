//! hearth CLI — the main entry point.
//!
//! Commands:
//! - `serve`   — Start the HTTP gateway
//! - `chat`    — Interactive chat or single-message mode
//! - `config`  — Print the effective or default configuration
//! - `doctor`  — Diagnose configuration, store and provider health

use std::path::PathBuf;

use clap::{Parser, Subcommand};

mod commands;
mod runtime;

#[derive(Parser)]
#[command(name = "hearth", about = "hearth — household assistant backend", version, author)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    json_logs: bool,

    /// Config file (defaults to ~/.hearth/config.toml)
    #[arg(long, global = true, env = "HEARTH_CONFIG")]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP gateway server
    Serve {
        /// Override the port
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Chat with the assistant
    Chat {
        /// Send a single message instead of entering interactive mode
        #[arg(short, long)]
        message: Option<String>,

        /// Sender identity recorded for the conversation
        #[arg(long, default_value = "local_user")]
        user: String,
    },

    /// Print configuration
    Config {
        /// Print the built-in defaults instead of the loaded config
        #[arg(long)]
        default: bool,
    },

    /// Diagnose system health
    Doctor,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize tracing
    let filter = if cli.verbose { "debug" } else { "info" };
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter));
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(std::io::stderr);
    if cli.json_logs {
        subscriber.json().init();
    } else {
        subscriber.init();
    }

    let config_path = cli.config.as_deref();
    match cli.command {
        Commands::Serve { port } => commands::serve::run(config_path, port).await?,
        Commands::Chat { message, user } => commands::chat::run(config_path, message, user).await?,
        Commands::Config { default } => commands::config_cmd::run(config_path, default)?,
        Commands::Doctor => commands::doctor::run(config_path).await?,
    }

    Ok(())
}

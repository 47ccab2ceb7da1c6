//! convmem CLI, the main entry point.
//!
//! Commands:
//! - `serve`    Start the HTTP API
//! - `context`  Print the memory context of a conversation
//! - `history`  Page through a user's durable chat log
//! - `login`    Restore a conversation's short-term memory
//! - `logout`   Persist and clear a conversation's session
//! - `init`     Write the default config file

use clap::{Parser, Subcommand};
use convmem_config::AppConfig;

mod commands;

#[derive(Parser)]
#[command(
    name = "convmem",
    about = "convmem: tiered conversational memory",
    version,
    author
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP API server
    Serve {
        /// Override the port
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Print the memory context the assistant would see
    Context {
        #[arg(short, long)]
        user: String,
        #[arg(short, long)]
        conversation: String,
    },

    /// Show a user's chat log, newest first
    History {
        #[arg(short, long)]
        user: String,
        #[arg(long, default_value_t = 0)]
        skip: u64,
        #[arg(long, default_value_t = 20)]
        limit: u64,
    },

    /// Restore short-term memory from the durable snapshot
    Login {
        #[arg(short, long)]
        user: String,
        #[arg(short, long)]
        conversation: String,
    },

    /// Snapshot short-term memory and clear the session
    Logout {
        #[arg(short, long)]
        user: String,
        #[arg(short, long)]
        conversation: String,
    },

    /// Write the default configuration file
    Init,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Loaded before tracing so the log format can come from the file.
    let config = AppConfig::load();
    let format = config
        .as_ref()
        .map(|c| c.logging.format.clone())
        .unwrap_or_else(|_| "pretty".into());
    init_tracing(cli.verbose, &format);

    match cli.command {
        Commands::Init => commands::init::run()?,
        command => {
            let config = config.map_err(|e| format!("Failed to load config: {e}"))?;
            dispatch(command, config).await?;
        }
    }

    Ok(())
}

async fn dispatch(command: Commands, config: AppConfig) -> Result<(), Box<dyn std::error::Error>> {
    match command {
        Commands::Serve { port } => commands::serve::run(config, port).await,
        Commands::Context { user, conversation } => {
            commands::session::context(&config, &user, &conversation).await
        }
        Commands::History { user, skip, limit } => {
            commands::session::history(&config, &user, skip, limit).await
        }
        Commands::Login { user, conversation } => {
            commands::session::login(&config, &user, &conversation).await
        }
        Commands::Logout { user, conversation } => {
            commands::session::logout(&config, &user, &conversation).await
        }
        Commands::Init => commands::init::run(),
    }
}

/// `RUST_LOG` wins over `--verbose`.
fn init_tracing(verbose: bool, format: &str) {
    let filter = if verbose { "debug" } else { "info" };
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter));

    if format == "json" {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(env_filter)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(false)
            .init();
    }
}

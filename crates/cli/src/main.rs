//! FaceAgent CLI: the main entry point.
//!
//! Commands:
//! - `serve`: Start the HTTP gateway
//! - `migrate`: Apply the chat history schema to PostgreSQL
//! - `config`: Create, show or validate the configuration
//! - `doctor`: Diagnose configuration and connectivity
//! - `token`: Mint a development bearer token

use std::path::PathBuf;

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(
    name = "faceagent",
    about = "FaceAgent: canvas generation assistant server",
    version,
    author
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true, env = "FACEAGENT_JSON_LOGS")]
    json_logs: bool,

    /// Read configuration from this file instead of ~/.faceagent/config.toml
    #[arg(short, long, global = true, env = "FACEAGENT_CONFIG")]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP gateway server
    Serve {
        /// Override the port
        #[arg(short, long)]
        port: Option<u16>,

        /// Override the bind address
        #[arg(long)]
        host: Option<String>,
    },

    /// Create the chat history tables
    Migrate,

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },

    /// Diagnose configuration and connectivity
    Doctor,

    /// Mint a bearer token signed with the configured secret
    Token {
        /// Subject (user id) to put in the `sub` claim
        #[arg(long)]
        sub: String,

        /// Lifetime in seconds
        #[arg(long, default_value_t = 3600)]
        ttl: i64,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Write a default config file if none exists
    Init,
    /// Print the effective configuration with secrets redacted
    Show,
    /// Check the configuration for problems
    Validate,
}

fn init_tracing(verbose: bool, json: bool) {
    let filter = if verbose { "debug" } else { "info" };
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter));

    let builder = tracing_subscriber::fmt().with_env_filter(env_filter).with_target(false);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.json_logs);

    let config_path = cli.config.as_deref();
    match cli.command {
        Commands::Serve { port, host } => commands::serve::run(config_path, port, host).await?,
        Commands::Migrate => commands::migrate::run(config_path).await?,
        Commands::Config { action } => match action {
            ConfigAction::Init => commands::config_cmd::init(config_path)?,
            ConfigAction::Show => commands::config_cmd::show(config_path)?,
            ConfigAction::Validate => commands::config_cmd::validate(config_path)?,
        },
        Commands::Doctor => commands::doctor::run(config_path).await?,
        Commands::Token { sub, ttl } => commands::token::run(config_path, &sub, ttl)?,
    }

    Ok(())
}

//! CLI entry and dispatch.

use std::io;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;
use vibes_core::config;

mod commands;

/// Env var holding the log filter (same syntax as `RUST_LOG`).
const LOG_ENV: &str = "VIBES_LOG";

#[derive(Parser)]
#[command(name = "vibes")]
#[command(version)]
#[command(about = "Hello Vibes: sign in with Microsoft from your terminal")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Subcommand)]
enum Commands {
    /// Sign in with a Microsoft account
    Login {
        /// Do not try to open a browser; print the URL only
        #[arg(long)]
        no_browser: bool,
    },

    /// Sign out and forget the saved user
    Logout,

    /// Show the signed-in user
    Whoami,

    /// Manage configuration
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

#[derive(clap::Subcommand)]
enum ConfigCommands {
    /// Show the path to the config file
    Path,
    /// Initialize a default config file (if not present)
    Init,
}

pub fn run() -> Result<()> {
    let cli = Cli::parse();

    init_tracing();

    let rt = tokio::runtime::Runtime::new().context("create tokio runtime")?;
    rt.block_on(async move { dispatch(cli).await })
}

fn init_tracing() {
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .init();
}

async fn dispatch(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Login { no_browser } => commands::auth::login(&load_config()?, no_browser).await,
        Commands::Logout => commands::auth::logout(&load_config()?),
        Commands::Whoami => commands::auth::whoami(&load_config()?),
        Commands::Config { command } => match command {
            ConfigCommands::Path => {
                commands::config::path();
                Ok(())
            }
            ConfigCommands::Init => commands::config::init(),
        },
    }
}

fn load_config() -> Result<config::Config> {
    config::Config::load().context("load config")
}

//! Roster - Main entry point
//!
//! Keeps stable names for USB and LAN devices whose addresses change
//! between sessions.

mod commands;
mod config;

use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use tracing::{debug, Level, Subscriber};
use tracing_subscriber::FmtSubscriber;

use crate::commands::Command;

#[derive(Parser, Debug)]
#[command(name = "roster")]
#[command(about = "Named registry of intermittently connected USB and LAN devices")]
#[command(version)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "roster.toml")]
    config: PathBuf,

    /// Registry file, overriding the configured one
    #[arg(short, long)]
    registry: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Command,
}

fn parse_level(level: &str) -> Level {
    match level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    }
}

fn subscriber(level: Level) -> impl Subscriber + Send + Sync + 'static {
    FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(true)
        .with_writer(std::io::stderr)
        .finish()
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // The configured level is only known once the file is read
    let startup_level = parse_level(args.log_level.as_deref().unwrap_or("info"));
    let mut config = tracing::subscriber::with_default(subscriber(startup_level), || {
        config::load_config(&args.config)
    })?;
    if let Some(path) = args.registry {
        config.registry.path = path;
    }

    let level = parse_level(args.log_level.as_deref().unwrap_or(&config.log.level));
    tracing::subscriber::set_global_default(subscriber(level))?;

    debug!("Roster v{}", env!("CARGO_PKG_VERSION"));

    commands::run(args.command, &config, &args.config).await
}

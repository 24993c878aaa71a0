use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "closerts")]
#[command(version = "0.1.0")]
#[command(about = "Close/evening gap entry with forced morning exit", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Config directory (default.toml plus an optional per-environment file)
    #[arg(short, long, default_value = "config", env = "CLOSERTS_CONFIG_DIR")]
    pub config_dir: PathBuf,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Replay recorded time frames against the paper gateway
    Run {
        /// JSON-lines file of time-frame events
        #[arg(long)]
        bars: PathBuf,
        /// JSON file of closing and evening session prices
        #[arg(long)]
        snapshots: PathBuf,
        /// Pause between replayed events, in milliseconds
        #[arg(long, default_value = "0")]
        pace_ms: u64,
    },
    /// Load and validate the configuration
    CheckConfig,
}

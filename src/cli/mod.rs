//! CLI interface for poly-fade
//!
//! Provides subcommands for:
//! - `run`: Start the anomaly-fade trading loop
//! - `config`: Show the effective configuration

mod run;

pub use run::RunArgs;

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "poly-fade")]
#[command(about = "Anomaly-fade trading bot for prediction markets")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Path to configuration file
    #[arg(short, long, default_value = "config.toml")]
    pub config: String,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start the trading loop
    Run(RunArgs),
    /// Show the effective configuration
    Config,
}

//! CLI type definitions
//!
//! This module contains clap command structures that define the CLI interface.

use clap::{Parser, Subcommand};

use crate::cli::commands::config::ConfigArgs;
use crate::cli::commands::simulate::SimulateArgs;

#[derive(Parser)]
#[command(name = "sealed-review")]
#[command(about = "Confidential review scoring with encrypted bias analysis and calibration", long_about = None)]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Output in JSON format
    #[arg(short, long, global = true)]
    pub json: bool,

    /// Load configuration from this file instead of .sealed-review/
    #[arg(short, long, global = true, env = "SEALED_REVIEW_CONFIG")]
    pub config: Option<std::path::PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run a submit, analyze and calibrate round against the local oracle
    Simulate(SimulateArgs),

    /// Show the effective configuration
    Config(ConfigArgs),
}

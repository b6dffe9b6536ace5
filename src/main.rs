//! sealed-review CLI entry point.

use clap::Parser;

use sealed_review::cli::commands::{self, load_config};
use sealed_review::cli::{handle_error, Cli, Commands};
use sealed_review::infrastructure::logging::{LogConfig, LoggerImpl};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let json = cli.json;
    if let Err(err) = run(cli).await {
        handle_error(err, json);
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let config = load_config(cli.config.as_deref())?;
    let _logger = LoggerImpl::init(&LogConfig::from(&config.logging))?;

    match cli.command {
        Commands::Simulate(args) => commands::simulate::execute(args, config, cli.json).await,
        Commands::Config(args) => commands::config::execute(args, config, cli.json),
    }
}

//! Fleetkeeper CLI entry point.

use clap::Parser;

use fleetkeeper::cli::{commands, handle_error, load_config, Cli, Commands};
use fleetkeeper::infrastructure::{LogConfig, LoggerImpl};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let config = match load_config(cli.config.as_deref()) {
        Ok(config) => config,
        Err(err) => handle_error(err, cli.json),
    };

    let _logger = match LogConfig::try_from(&config.logging).and_then(|c| LoggerImpl::init(&c)) {
        Ok(logger) => logger,
        Err(err) => handle_error(err, cli.json),
    };

    let result = match cli.command {
        Commands::Run(args) => commands::run::execute(args, &config, cli.json).await,
        Commands::Tick => commands::tick::execute(&config, cli.json).await,
        Commands::Status => commands::status::execute(&config, cli.json).await,
        Commands::Config => commands::config::execute(&config, cli.json),
    };

    if let Err(err) = result {
        handle_error(err, cli.json);
    }
}

//! Chorus CLI entry point.

use anyhow::Context;
use clap::Parser;

use chorus::cli::{self, Cli};
use chorus::infrastructure::config::ConfigLoader;
use chorus::infrastructure::logging::LoggerImpl;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => ConfigLoader::load_from_file(path)
            .with_context(|| format!("Failed to load config from {}", path.display())),
        None => ConfigLoader::load().context("Failed to load configuration"),
    };
    let config = match config {
        Ok(config) => config,
        Err(err) => cli::handle_error(err, cli.json),
    };

    let _logger = match LoggerImpl::init(&config.logging) {
        Ok(logger) => logger,
        Err(err) => cli::handle_error(err, cli.json),
    };

    if let Err(err) = cli::dispatch(cli.command, config, cli.json).await {
        cli::handle_error(err, cli.json);
    }
}

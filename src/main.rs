mod cli;

use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;

use cli::Cli;
use sebastian::config::{Config, DEFAULT_LOG_FILE};
use sebastian::logging::init_logging;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    // Only the long-running bot writes a log file; local commands log to stdout.
    let config = Config::from_env();
    let log_file = cli.runs_bot().then(|| match &config {
        Ok(config) => config.log_file.clone(),
        Err(_) => PathBuf::from(DEFAULT_LOG_FILE),
    });
    init_logging(log_file.as_deref());

    let config = config.map_err(|e| {
        tracing::error!("Invalid configuration: {}", e);
        e
    })?;

    cli::dispatch(cli, config).await
}

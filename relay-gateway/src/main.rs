//! Relay Gateway - Main entry point.

use anyhow::{Context, Result};
use relay_common::config::Config;
use relay_common::logging::init_logging;
use relay_common::validation::Validate;

#[tokio::main]
async fn main() -> Result<()> {
    // A missing .env file is fine
    let _ = dotenv::dotenv();

    let config = Config::load().context("loading relay configuration")?;

    init_logging(&config.observability.log_level, &config.observability.log_format);

    tracing::info!("Relay Gateway v{}", env!("CARGO_PKG_VERSION"));

    config.validate().context("invalid relay configuration")?;

    relay_gateway::start_server(&config).await
}

//! Negotiation server binary.

use clap::Parser;
use tracing_subscriber::EnvFilter;

use negotiation_server::{open_store, Cli, Server, ServerConfig, ServerError};

#[tokio::main]
async fn main() -> Result<(), ServerError> {
    let config = ServerConfig::from(Cli::parse());

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.environment.default_log_filter()));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    tracing::info!(
        "Starting negotiation server (DSP {})",
        negotiation_core::PROTOCOL_VERSION
    );

    let store = open_store(&config.store).await?;
    Server::new(config, store).run().await
}

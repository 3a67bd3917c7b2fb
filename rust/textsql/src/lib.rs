pub mod config;
pub mod db;
pub mod error;
pub mod generator;
pub mod models;
pub mod server;
pub mod state;
pub mod telemetry;
pub mod validator;

use crate::{config::AppConfig, server::Server};

/// Bootstraps the service using environment configuration.
pub async fn run() -> anyhow::Result<()> {
    let config = AppConfig::from_env()?;
    telemetry::log_startup(&config);
    Server::new(config)?.run().await
}

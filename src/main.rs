mod admission;
mod chain;
mod db;
mod engine;
mod filter;
mod ingestion;
mod node;
mod resolver;
mod rpc;
mod store;
mod transactions;
mod types;

use std::env;
use std::path::PathBuf;

use anyhow::Context;
use tracing_subscriber::EnvFilter;

use types::config::node::NodeConfig;

const DEFAULT_CONFIG_PATH: &str = "config/config.json";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    tracing::info!("oracle-node {}", env!("CARGO_PKG_VERSION"));

    let config_path = env::var("ORACLE_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_PATH));
    let config = NodeConfig::load(&config_path)?;
    load_required_env_vars(&config)?;

    tracing::info!(
        "Loaded config from {} for chain {}",
        config_path.display(),
        config.chain.name
    );

    tokio::select! {
        result = node::run(config) => result,
        signal = tokio::signal::ctrl_c() => {
            signal.context("failed to listen for shutdown signal")?;
            tracing::info!("Shutdown signal received, exiting");
            Ok(())
        }
    }
}

/// Ensures every secret env var is set, loading .env if needed.
fn load_required_env_vars(config: &NodeConfig) -> anyhow::Result<()> {
    let required = config.required_env_vars();

    let missing: Vec<&&str> = required
        .iter()
        .filter(|var| env::var(var).is_err())
        .collect();

    if missing.is_empty() {
        return Ok(());
    }

    dotenvy::dotenv().with_context(|| {
        format!(
            "Missing env vars {:?} and failed to load .env file",
            missing
        )
    })?;

    let still_missing: Vec<&str> = required
        .iter()
        .filter(|var| env::var(var).is_err())
        .copied()
        .collect();

    anyhow::ensure!(
        still_missing.is_empty(),
        "Missing required env vars after loading .env: {:?}",
        still_missing
    );

    Ok(())
}

//! Wires configuration, chain client, store and pipeline stages together.

use std::env;
use std::sync::Arc;

use alloy::signers::local::PrivateKeySigner;
use anyhow::Context;
use tokio::sync::mpsc;
use tokio::task::JoinSet;

use crate::admission::AdmissionTracker;
use crate::chain::{ChainInterface, CoreContractClient};
use crate::db::DbPool;
use crate::engine::{Engine, EngineContext};
use crate::filter::UrlFilter;
use crate::ingestion::{CursorResumption, Ingestion, PendingListResumption, ResumptionStrategy};
use crate::resolver::Resolver;
use crate::store::{MemoryPendingStore, PendingStore, PgPendingStore};
use crate::transactions::{SubmissionPolicy, TransactionSubmitter};
use crate::types::config::node::NodeConfig;
use crate::types::config::pipeline::{ResumptionKind, StoreConfig};

const DEFAULT_DB_CONNECTIONS: usize = 8;

/// Human name of the networks the core contract is deployed on.
pub fn network_name(chain_id: u64) -> Option<&'static str> {
    match chain_id {
        56 => Some("BSC mainnet"),
        97 => Some("BSC testnet"),
        _ => None,
    }
}

fn env_var(name: &str) -> anyhow::Result<String> {
    env::var(name).with_context(|| format!("env var {} not set", name))
}

async fn open_store(config: Option<&StoreConfig>) -> anyhow::Result<Arc<dyn PendingStore>> {
    let Some(config) = config else {
        tracing::info!("No store configured, pending requests are kept in memory");
        return Ok(Arc::new(MemoryPendingStore::new()));
    };

    let database_url = env_var(&config.database_url_env_var)?;
    let pool = DbPool::new(
        &database_url,
        config.max_connections.unwrap_or(DEFAULT_DB_CONNECTIONS),
    )
    .await
    .context("failed to create database pool")?;
    pool.run_migrations()
        .await
        .context("failed to run database migrations")?;

    tracing::info!("Database pool initialized and migrations complete");
    Ok(Arc::new(PgPendingStore::new(Arc::new(pool))))
}

pub async fn run(config: NodeConfig) -> anyhow::Result<()> {
    let chain_config = &config.chain;
    let rpc_url = env_var(&chain_config.rpc_url_env_var)?;
    let ws_url = env_var(&chain_config.ws_url_env_var)?;
    let signer: PrivateKeySigner = env_var(&config.signer.private_key_env_var)?
        .trim()
        .parse()
        .context("invalid signer private key")?;

    let client = CoreContractClient::new(chain_config, &rpc_url, &ws_url, signer)
        .context("failed to create chain client")?;

    let chain_id = client
        .chain_id()
        .await
        .context("cannot reach the chain RPC endpoint")?;
    match network_name(chain_id) {
        Some(name) => tracing::info!("Connected to {} (chain id {})", name, chain_id),
        None => tracing::warn!("Connected to unknown network with chain id {}", chain_id),
    }
    let signer_address = client.signer_address();
    tracing::info!("Oracle account {}", signer_address);
    tracing::info!(
        "Core contract {} ({:?}), mode {:?}",
        chain_config.core_address,
        chain_config.contract_version,
        config.mode
    );

    let chain: Arc<dyn ChainInterface> = Arc::new(client);
    let store = open_store(config.store.as_ref()).await?;

    let strategy: Arc<dyn ResumptionStrategy> = match config.ingestion.resumption {
        ResumptionKind::Cursor => Arc::new(CursorResumption::new(
            store.clone(),
            chain_config.start_block,
            chain_config.backfill_chunk_size(),
        )),
        ResumptionKind::PendingList => Arc::new(PendingListResumption),
    };

    let filter = UrlFilter::from_config(&config.requests.filter);
    tracing::info!(
        "Data source filter: {:?} with {} host(s)",
        filter.mode(),
        config.requests.filter.hosts.len()
    );

    let ctx = Arc::new(EngineContext {
        store,
        admission: AdmissionTracker::new(),
        resolver: Arc::new(
            Resolver::new(config.requests.fetch_timeout()).context("failed to build HTTP client")?,
        ),
        filter,
        submitter: Arc::new(TransactionSubmitter::new(
            chain.clone(),
            signer_address,
            SubmissionPolicy::from(&config.retry),
        )),
        mode: config.mode,
    });

    let (tx, rx) = mpsc::channel(config.ingestion.channel_capacity());
    let ingestion = Ingestion::new(chain, strategy, tx, config.ingestion.restart_delay());
    let engine = Engine::new(ctx);

    let mut tasks: JoinSet<anyhow::Result<()>> = JoinSet::new();

    tasks.spawn(async move { ingestion.run().await.context("ingestion failed") });

    tasks.spawn(async move {
        engine.run(rx).await;
        Ok(())
    });

    while let Some(result) = tasks.join_next().await {
        result.context("node task panicked")??;
    }

    tracing::info!("Node stopped");
    Ok(())
}

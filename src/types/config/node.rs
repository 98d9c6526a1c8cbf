use std::path::Path;

use anyhow::Context;
use serde::Deserialize;

use crate::types::config::chain::{ChainConfig, SignerConfig};
use crate::types::config::pipeline::{
    IngestionConfig, NodeMode, ResumptionKind, RetryConfig, StoreConfig,
};
use crate::types::config::requests::RequestsConfig;

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NodeConfig {
    pub chain: ChainConfig,
    pub signer: SignerConfig,
    #[serde(default)]
    pub requests: RequestsConfig,
    /// Durable pending request store. Without it requests are tracked in
    /// memory only.
    #[serde(default)]
    pub store: Option<StoreConfig>,
    #[serde(default)]
    pub ingestion: IngestionConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub mode: NodeMode,
}

impl NodeConfig {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file at {}", path.display()))?;
        Self::parse(&content)
            .with_context(|| format!("failed to parse config file at {}", path.display()))
    }

    pub fn parse(content: &str) -> anyhow::Result<Self> {
        let config: NodeConfig = serde_json::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> anyhow::Result<()> {
        anyhow::ensure!(
            self.chain.backfill_chunk_size() > 0,
            "chain.backfill_chunk_size must be positive"
        );
        anyhow::ensure!(
            self.ingestion.channel_capacity() > 0,
            "ingestion.channel_capacity must be positive"
        );
        anyhow::ensure!(
            !(self.ingestion.resumption == ResumptionKind::Cursor && self.store.is_none()),
            "cursor resumption needs a durable store; configure `store` or use `pending_list`"
        );
        Ok(())
    }

    /// Every environment variable the node reads secrets from.
    pub fn required_env_vars(&self) -> Vec<&str> {
        let mut vars = vec![
            self.chain.rpc_url_env_var.as_str(),
            self.chain.ws_url_env_var.as_str(),
            self.signer.private_key_env_var.as_str(),
        ];
        if let Some(store) = &self.store {
            vars.push(store.database_url_env_var.as_str());
        }
        vars
    }
}

use std::time::Duration;

use serde::Deserialize;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResumptionKind {
    /// Durable block cursor with chunked log backfill.
    #[default]
    Cursor,
    /// Ask the core contract for its outstanding request ids on every start.
    PendingList,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct IngestionConfig {
    #[serde(default)]
    pub resumption: ResumptionKind,
    pub channel_capacity: Option<usize>,
    pub restart_delay_secs: Option<u64>,
}

impl IngestionConfig {
    pub fn channel_capacity(&self) -> usize {
        self.channel_capacity.unwrap_or(1000)
    }

    pub fn restart_delay(&self) -> Duration {
        Duration::from_secs(self.restart_delay_secs.unwrap_or(5))
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfig {
    pub database_url_env_var: String,
    pub max_connections: Option<usize>,
}

/// How many times a failed chain write is rebuilt and resent, and how long to
/// wait in between. Deployments disagree, so both writes are configurable.
#[derive(Debug, Clone, Deserialize)]
pub struct RetryConfig {
    #[serde(default)]
    pub submit_retries: u32,
    #[serde(default)]
    pub submit_retry_delay_ms: u64,
    #[serde(default = "default_finalize_retries")]
    pub finalize_retries: u32,
    #[serde(default = "default_finalize_retry_delay_ms")]
    pub finalize_retry_delay_ms: u64,
}

fn default_finalize_retries() -> u32 {
    1
}

fn default_finalize_retry_delay_ms() -> u64 {
    5_000
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            submit_retries: 0,
            submit_retry_delay_ms: 0,
            finalize_retries: default_finalize_retries(),
            finalize_retry_delay_ms: default_finalize_retry_delay_ms(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeMode {
    /// Fetch, submit and finalize.
    #[default]
    Oracle,
    /// Only finalize requests once their settlement window has passed.
    Fulfiller,
}

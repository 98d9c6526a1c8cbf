use alloy_primitives::Address;
use serde::Deserialize;

pub const DEFAULT_SETTLEMENT_OFFSET_SECS: u64 = 65;
pub const DEFAULT_BACKFILL_CHUNK_SIZE: u64 = 4000;

fn default_settlement_offset() -> u64 {
    DEFAULT_SETTLEMENT_OFFSET_SECS
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChainConfig {
    pub name: String,
    pub rpc_url_env_var: String,
    pub ws_url_env_var: String,
    pub core_address: Address,
    #[serde(default)]
    pub contract_version: ContractVersion,
    /// Delay between execution and finalization for contracts that do not
    /// publish a fulfillment timestamp.
    #[serde(default = "default_settlement_offset")]
    pub settlement_offset_secs: u64,
    /// First block to scan when no cursor has been stored yet.
    pub start_block: Option<u64>,
    pub backfill_chunk_size: Option<u64>,
    /// Optional client-side limit for read RPCs.
    pub requests_per_second: Option<u32>,
}

impl ChainConfig {
    pub fn backfill_chunk_size(&self) -> u64 {
        self.backfill_chunk_size
            .unwrap_or(DEFAULT_BACKFILL_CHUNK_SIZE)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContractVersion {
    /// `Requested` carries an explicit fulfillment timestamp.
    V1,
    /// Fulfillment happens a fixed settlement offset after execution.
    #[default]
    V2,
}

impl ContractVersion {
    /// Fulfillment deadline for a request. Contracts that publish the value
    /// win; otherwise it is derived from the execution timestamp.
    pub fn fulfillment_timestamp(
        &self,
        execution_timestamp: u64,
        published: Option<u64>,
        settlement_offset_secs: u64,
    ) -> u64 {
        match (self, published) {
            (ContractVersion::V1, Some(ts)) => ts,
            _ => execution_timestamp.saturating_add(settlement_offset_secs),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SignerConfig {
    pub private_key_env_var: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_v1_uses_published_timestamp() {
        let ts = ContractVersion::V1.fulfillment_timestamp(1_000, Some(1_200), 65);
        assert_eq!(ts, 1_200);
    }

    #[test]
    fn test_v2_derives_from_settlement_offset() {
        let ts = ContractVersion::V2.fulfillment_timestamp(1_000, Some(1_200), 65);
        assert_eq!(ts, 1_065);
        let ts = ContractVersion::V1.fulfillment_timestamp(1_000, None, 65);
        assert_eq!(ts, 1_065);
    }
}

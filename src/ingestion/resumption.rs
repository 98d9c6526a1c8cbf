use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc::Sender;

use super::backfill::backfill;
use super::IngestionError;
use crate::chain::{ChainError, ChainInterface};
use crate::store::PendingStore;
use crate::types::request::{short_id, Delivery, DeliverySource};

/// Decides what gets replayed before (alongside) the live subscription each
/// time ingestion (re)starts.
#[async_trait]
pub trait ResumptionStrategy: Send + Sync + 'static {
    fn name(&self) -> &'static str;

    /// Deliver everything that may have been missed. Returns the number of
    /// descriptors delivered.
    async fn replay(
        &self,
        chain: &dyn ChainInterface,
        tx: &Sender<Delivery>,
    ) -> Result<usize, IngestionError>;
}

/// Deliver every request the core contract still lists as pending.
pub async fn replay_pending_list(
    chain: &dyn ChainInterface,
    tx: &Sender<Delivery>,
) -> Result<usize, IngestionError> {
    let ids = chain.pending_request_ids().await?;
    tracing::info!("Core contract reports {} pending requests", ids.len());

    let mut delivered = 0;
    for id in ids {
        let descriptor = match chain.request(id).await {
            Ok(descriptor) => descriptor,
            Err(e @ ChainError::Transport(_)) => return Err(e.into()),
            Err(e) => {
                tracing::warn!(request_id = %short_id(&id), "Skipping unreadable pending request: {}", e);
                continue;
            }
        };
        tx.send(Delivery::replayed(DeliverySource::PendingList, descriptor))
            .await
            .map_err(|_| IngestionError::QueueClosed)?;
        delivered += 1;
    }
    Ok(delivered)
}

/// Durable block cursor. Backfills from the stored cursor (inclusive); with
/// no cursor yet, starts at the configured block or falls back to the
/// pending list.
pub struct CursorResumption {
    store: Arc<dyn PendingStore>,
    start_block: Option<u64>,
    chunk_size: u64,
}

impl CursorResumption {
    pub fn new(store: Arc<dyn PendingStore>, start_block: Option<u64>, chunk_size: u64) -> Self {
        Self {
            store,
            start_block,
            chunk_size,
        }
    }
}

#[async_trait]
impl ResumptionStrategy for CursorResumption {
    fn name(&self) -> &'static str {
        "cursor"
    }

    async fn replay(
        &self,
        chain: &dyn ChainInterface,
        tx: &Sender<Delivery>,
    ) -> Result<usize, IngestionError> {
        let cursor = match self.store.get_cursor().await {
            Ok(cursor) => cursor,
            Err(e) => {
                tracing::error!("Cannot read last processed block: {}", e);
                None
            }
        };

        match (cursor, self.start_block) {
            (Some(cursor), _) => backfill(chain, cursor, self.chunk_size, tx).await,
            (None, Some(start_block)) => {
                tracing::info!("No stored cursor, backfilling from configured start block {}", start_block);
                backfill(chain, start_block, self.chunk_size, tx).await
            }
            (None, None) => {
                tracing::info!("No stored cursor and no start block, falling back to the pending list");
                replay_pending_list(chain, tx).await
            }
        }
    }
}

/// Stateless: always asks the core contract for its pending requests.
#[derive(Debug, Default)]
pub struct PendingListResumption;

#[async_trait]
impl ResumptionStrategy for PendingListResumption {
    fn name(&self) -> &'static str {
        "pending_list"
    }

    async fn replay(
        &self,
        chain: &dyn ChainInterface,
        tx: &Sender<Delivery>,
    ) -> Result<usize, IngestionError> {
        replay_pending_list(chain, tx).await
    }
}

//! Event ingestion: one replay pass (backfill or pending list) merged with the
//! live `Requested` subscription into the bounded delivery queue.
//!
//! Any subscription failure tears the whole pass down, replay included, and
//! starts over after a fixed delay. Events emitted while the socket was down
//! are only recovered by replaying again, so live events only move the
//! cursor once the replay of the current pass has finished.

mod backfill;
mod resumption;

use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use thiserror::Error;
use tokio::sync::mpsc::Sender;
use tokio::task::JoinSet;

use crate::chain::{ChainError, ChainInterface};
use crate::store::StoreError;
use crate::types::request::Delivery;

pub use resumption::{CursorResumption, PendingListResumption, ResumptionStrategy};

#[derive(Debug, Error)]
pub enum IngestionError {
    #[error("Chain error: {0}")]
    Chain(#[from] ChainError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Delivery queue closed")]
    QueueClosed,

    #[error("Live subscription ended")]
    SubscriptionEnded,

    #[error("Replay task failed: {0}")]
    Task(String),
}

pub struct Ingestion {
    chain: Arc<dyn ChainInterface>,
    strategy: Arc<dyn ResumptionStrategy>,
    tx: Sender<Delivery>,
    restart_delay: Duration,
}

impl Ingestion {
    pub fn new(
        chain: Arc<dyn ChainInterface>,
        strategy: Arc<dyn ResumptionStrategy>,
        tx: Sender<Delivery>,
        restart_delay: Duration,
    ) -> Self {
        Self {
            chain,
            strategy,
            tx,
            restart_delay,
        }
    }

    /// Run until the consumer side of the queue goes away.
    pub async fn run(self) -> Result<(), IngestionError> {
        tracing::info!("Starting ingestion with {} resumption", self.strategy.name());
        loop {
            match self.run_once().await {
                Err(IngestionError::QueueClosed) => {
                    tracing::info!("Delivery queue closed, stopping ingestion");
                    return Ok(());
                }
                Err(e) => tracing::warn!(
                    "Ingestion interrupted: {}. Restarting in {:?}",
                    e,
                    self.restart_delay
                ),
                Ok(()) => {}
            }
            tokio::time::sleep(self.restart_delay).await;
        }
    }

    /// One pass: subscribe, replay in the background, forward live events.
    /// Only returns on failure.
    pub async fn run_once(&self) -> Result<(), IngestionError> {
        // Subscribe before replaying so nothing falls between the two.
        let mut live = self.chain.watch_requested().await?;
        tracing::info!("Subscribed to Requested events");

        // Dropping the set on return aborts an unfinished replay.
        let mut replay = JoinSet::new();
        {
            let chain = self.chain.clone();
            let strategy = self.strategy.clone();
            let tx = self.tx.clone();
            replay.spawn(async move { strategy.replay(chain.as_ref(), &tx).await });
        }
        let mut replay_done = false;

        loop {
            tokio::select! {
                item = live.next() => match item {
                    Some(Ok(descriptor)) => {
                        self.tx
                            .send(Delivery::live(descriptor, replay_done))
                            .await
                            .map_err(|_| IngestionError::QueueClosed)?;
                    }
                    Some(Err(e)) => return Err(e.into()),
                    None => return Err(IngestionError::SubscriptionEnded),
                },
                joined = replay.join_next(), if !replay_done => {
                    replay_done = true;
                    match joined {
                        Some(Ok(Ok(count))) => tracing::info!("Replay delivered {} requests", count),
                        Some(Ok(Err(e))) => return Err(e),
                        Some(Err(e)) => return Err(IngestionError::Task(e.to_string())),
                        None => {}
                    }
                }
            }
        }
    }
}

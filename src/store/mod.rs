//! Pending request store: the durable map of request id to entry, plus the
//! block cursor ingestion resumes from.

mod memory;
mod postgres;

use async_trait::async_trait;
use thiserror::Error;

use crate::db::DbError;
use crate::types::request::{PendingEntry, RequestId};

pub use memory::MemoryPendingStore;
pub use postgres::PgPendingStore;

/// Key of the block cursor row.
pub const CURSOR_NAME: &str = "last_block";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Db(#[from] DbError),

    #[error("Corrupt pending entry: {0}")]
    Corrupt(String),
}

#[async_trait]
pub trait PendingStore: Send + Sync + 'static {
    /// Insert `entry`. Re-inserting a known id leaves the stored row untouched.
    async fn add(&self, entry: &PendingEntry) -> Result<(), StoreError>;

    /// Record that the result submission for `id` was accepted.
    async fn mark_submitted(&self, id: RequestId) -> Result<(), StoreError>;

    /// Retire `id` after confirmed fulfillment or deliberate expiry.
    async fn remove(&self, id: RequestId) -> Result<(), StoreError>;

    /// Every stored entry, for replay at startup.
    async fn list(&self) -> Result<Vec<PendingEntry>, StoreError>;

    /// Last processed block, or `None` when no cursor was ever written.
    async fn get_cursor(&self) -> Result<Option<u64>, StoreError>;

    /// Advance the cursor. Lower values than the stored one are ignored.
    async fn set_cursor(&self, height: u64) -> Result<(), StoreError>;
}

//! [`PendingStore`] kept in process memory. Nothing survives a restart; used
//! by tests and by deployments that resume from the pending-list query.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{PendingStore, StoreError};
use crate::types::request::{PendingEntry, RequestId};

#[derive(Debug, Default)]
struct MemoryState {
    entries: HashMap<RequestId, PendingEntry>,
    cursor: Option<u64>,
}

#[derive(Debug, Default)]
pub struct MemoryPendingStore {
    state: RwLock<MemoryState>,
}

impl MemoryPendingStore {
    pub fn new() -> Self {
        Self::default()
    }

    #[cfg(test)]
    pub async fn get(&self, id: &RequestId) -> Option<PendingEntry> {
        self.state.read().await.entries.get(id).cloned()
    }

    #[cfg(test)]
    pub async fn len(&self) -> usize {
        self.state.read().await.entries.len()
    }
}

#[async_trait]
impl PendingStore for MemoryPendingStore {
    async fn add(&self, entry: &PendingEntry) -> Result<(), StoreError> {
        self.state
            .write()
            .await
            .entries
            .entry(entry.id)
            .or_insert_with(|| entry.clone());
        Ok(())
    }

    async fn mark_submitted(&self, id: RequestId) -> Result<(), StoreError> {
        if let Some(entry) = self.state.write().await.entries.get_mut(&id) {
            entry.submitted = true;
        }
        Ok(())
    }

    async fn remove(&self, id: RequestId) -> Result<(), StoreError> {
        self.state.write().await.entries.remove(&id);
        Ok(())
    }

    async fn list(&self) -> Result<Vec<PendingEntry>, StoreError> {
        let mut entries: Vec<_> = self.state.read().await.entries.values().cloned().collect();
        entries.sort_by_key(|e| e.execution_timestamp);
        Ok(entries)
    }

    async fn get_cursor(&self) -> Result<Option<u64>, StoreError> {
        Ok(self.state.read().await.cursor)
    }

    async fn set_cursor(&self, height: u64) -> Result<(), StoreError> {
        let mut state = self.state.write().await;
        state.cursor = Some(state.cursor.map_or(height, |current| current.max(height)));
        Ok(())
    }
}

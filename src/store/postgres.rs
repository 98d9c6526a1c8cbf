use std::sync::Arc;

use alloy_primitives::B256;
use async_trait::async_trait;

use super::{PendingStore, StoreError, CURSOR_NAME};
use crate::db::{DbOperation, DbPool, DbValue, WhereClause};
use crate::types::request::{PendingEntry, RequestId};

const TABLE: &str = "pending_requests";

/// [`PendingStore`] on the `pending_requests` and `node_state` tables.
pub struct PgPendingStore {
    pool: Arc<DbPool>,
}

impl PgPendingStore {
    pub fn new(pool: Arc<DbPool>) -> Self {
        Self { pool }
    }
}

fn id_value(id: &RequestId) -> DbValue {
    DbValue::Bytes32(id.0)
}

fn to_i64(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

fn row_to_entry(row: &tokio_postgres::Row) -> Result<PendingEntry, StoreError> {
    let raw_id: Vec<u8> = row.get(0);
    if raw_id.len() != 32 {
        return Err(StoreError::Corrupt(format!(
            "request_id has {} bytes, expected 32",
            raw_id.len()
        )));
    }
    let execution: i64 = row.get(3);
    let fulfillment: i64 = row.get(4);

    Ok(PendingEntry {
        id: B256::from_slice(&raw_id),
        data_source: row.get(1),
        selector: row.get(2),
        execution_timestamp: execution.max(0) as u64,
        fulfillment_timestamp: fulfillment.max(0) as u64,
        submitted: row.get(5),
    })
}

#[async_trait]
impl PendingStore for PgPendingStore {
    async fn add(&self, entry: &PendingEntry) -> Result<(), StoreError> {
        self.pool
            .execute_transaction(vec![DbOperation::Upsert {
                table: TABLE.to_string(),
                columns: vec![
                    "request_id".to_string(),
                    "data_source".to_string(),
                    "selector".to_string(),
                    "execution_timestamp".to_string(),
                    "fulfillment_timestamp".to_string(),
                    "submitted".to_string(),
                ],
                values: vec![
                    id_value(&entry.id),
                    DbValue::Text(entry.data_source.clone()),
                    DbValue::Text(entry.selector.clone()),
                    DbValue::Int64(to_i64(entry.execution_timestamp)),
                    DbValue::Int64(to_i64(entry.fulfillment_timestamp)),
                    DbValue::Bool(entry.submitted),
                ],
                conflict_columns: vec!["request_id".to_string()],
                update_columns: vec![],
            }])
            .await?;
        Ok(())
    }

    async fn mark_submitted(&self, id: RequestId) -> Result<(), StoreError> {
        self.pool
            .execute_transaction(vec![DbOperation::Update {
                table: TABLE.to_string(),
                set_columns: vec![("submitted".to_string(), DbValue::Bool(true))],
                where_clause: WhereClause::Eq("request_id".to_string(), id_value(&id)),
            }])
            .await?;
        Ok(())
    }

    async fn remove(&self, id: RequestId) -> Result<(), StoreError> {
        self.pool
            .execute_transaction(vec![DbOperation::Delete {
                table: TABLE.to_string(),
                where_clause: WhereClause::Eq("request_id".to_string(), id_value(&id)),
            }])
            .await?;
        Ok(())
    }

    async fn list(&self) -> Result<Vec<PendingEntry>, StoreError> {
        let rows = self
            .pool
            .query(
                "SELECT request_id, data_source, selector, execution_timestamp, \
                 fulfillment_timestamp, submitted FROM pending_requests \
                 ORDER BY execution_timestamp",
                &[],
            )
            .await?;
        rows.iter().map(row_to_entry).collect()
    }

    async fn get_cursor(&self) -> Result<Option<u64>, StoreError> {
        let rows = self
            .pool
            .query(
                "SELECT value FROM node_state WHERE name = $1",
                &[&CURSOR_NAME],
            )
            .await?;
        Ok(rows.first().map(|row| {
            let value: i64 = row.get(0);
            value.max(0) as u64
        }))
    }

    async fn set_cursor(&self, height: u64) -> Result<(), StoreError> {
        self.pool
            .execute_transaction(vec![DbOperation::RawSql {
                query: "INSERT INTO node_state (name, value) VALUES ($1, $2) \
                        ON CONFLICT (name) DO UPDATE \
                        SET value = GREATEST(node_state.value, EXCLUDED.value)"
                    .to_string(),
                params: vec![
                    DbValue::Text(CURSOR_NAME.to_string()),
                    DbValue::Int64(to_i64(height)),
                ],
            }])
            .await?;
        Ok(())
    }
}

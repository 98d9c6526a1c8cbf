/// A value bound as a statement parameter.
#[derive(Debug, Clone, PartialEq)]
pub enum DbValue {
    Bool(bool),
    /// Signed 64-bit integer (BIGINT)
    Int64(i64),
    Text(String),
    /// 32-byte identifier (BYTEA)
    Bytes32([u8; 32]),
}

/// A single statement executed inside [`super::DbPool::execute_transaction`].
#[derive(Debug, Clone)]
pub enum DbOperation {
    /// INSERT with ON CONFLICT. With no `update_columns` the conflict is
    /// ignored, which makes the insert idempotent.
    Upsert {
        table: String,
        columns: Vec<String>,
        values: Vec<DbValue>,
        conflict_columns: Vec<String>,
        update_columns: Vec<String>,
    },
    Update {
        table: String,
        set_columns: Vec<(String, DbValue)>,
        where_clause: WhereClause,
    },
    Delete {
        table: String,
        where_clause: WhereClause,
    },
    /// Raw SQL for statements the builders do not cover
    RawSql {
        query: String,
        params: Vec<DbValue>,
    },
}

#[derive(Debug, Clone)]
pub enum WhereClause {
    /// column = value
    Eq(String, DbValue),
}

use crate::sql::base::{
    error::DbError,
    requests::{FetchRowsRequest, InsertStatement, KeyLookup, WriteOutcome},
};
use async_trait::async_trait;
use model::records::row::RowData;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DatabaseKind {
    MySql,
    Memory,
}

/// Read/introspection access to a server hosting several databases, plus
/// write sessions bound to one of them.
#[async_trait]
pub trait SqlAdapter: Send + Sync {
    fn kind(&self) -> DatabaseKind;

    /// Column names in ordinal order; empty when the table does not exist.
    async fn table_columns(&self, database: &str, table: &str) -> Result<Vec<String>, DbError>;

    async fn fetch_rows(&self, request: FetchRowsRequest) -> Result<Vec<RowData>, DbError>;

    /// Unique indexes other than the primary key, one column list per index.
    async fn unique_key_sets(
        &self,
        database: &str,
        table: &str,
    ) -> Result<Vec<Vec<String>>, DbError>;

    async fn primary_key_column(
        &self,
        database: &str,
        table: &str,
    ) -> Result<Option<String>, DbError>;

    async fn find_primary_key(&self, lookup: &KeyLookup) -> Result<Option<i64>, DbError>;

    /// Opens a transaction on `database`.
    async fn begin(&self, database: &str) -> Result<Box<dyn WriteSession>, DbError>;
}

/// One open transaction on one database.
#[async_trait]
pub trait WriteSession: Send {
    fn database(&self) -> &str;

    async fn insert(&mut self, statement: &InsertStatement) -> Result<WriteOutcome, DbError>;

    /// Same as [`SqlAdapter::find_primary_key`] but sees this session's own writes.
    async fn find_primary_key(&mut self, lookup: &KeyLookup) -> Result<Option<i64>, DbError>;

    async fn commit(&mut self) -> Result<(), DbError>;

    async fn rollback(&mut self) -> Result<(), DbError>;
}

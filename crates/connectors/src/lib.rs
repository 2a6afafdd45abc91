pub mod error;
pub mod memory;
pub mod sql;

pub use error::{AdapterError, connect};
pub use memory::{MemoryAdapter, TableSpec};
pub use sql::base::{
    adapter::{DatabaseKind, SqlAdapter, WriteSession},
    error::{ConnectorError, DbError},
    requests::{FetchRowsRequest, InsertStatement, KeyLookup, WriteOutcome},
};
pub use sql::mysql::adapter::MySqlAdapter;

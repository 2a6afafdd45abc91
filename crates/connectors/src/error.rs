use crate::{
    sql::{
        base::{
            adapter::SqlAdapter,
            error::{ConnectorError, DbError},
        },
        mysql::adapter::MySqlAdapter,
    },
};
use std::sync::Arc;
use thiserror::Error;
use tracing::info;

#[derive(Debug, Error)]
pub enum AdapterError {
    /// Failed to initialize a data connector/adapter.
    #[error("Connector error: {0}")]
    Connector(#[from] ConnectorError),

    /// Database-related error.
    #[error("Database error: {0}")]
    Database(#[from] DbError),

    /// Unsupported driver error.
    #[error("Unsupported driver: {0}")]
    UnsupportedDriver(String),
}

/// Opens an adapter for `url`, picking the driver from its scheme.
pub async fn connect(url: &str) -> Result<Arc<dyn SqlAdapter>, AdapterError> {
    let scheme = url.split_once("://").map(|(s, _)| s).unwrap_or_default();
    match scheme.to_ascii_lowercase().as_str() {
        "mysql" | "mariadb" => {
            let adapter = MySqlAdapter::connect(url).await?;
            info!(driver = "mysql", "Connected");
            Ok(Arc::new(adapter))
        }
        other => Err(AdapterError::UnsupportedDriver(other.to_string())),
    }
}

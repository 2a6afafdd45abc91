use connectors::sql::base::error::DbError;
use model::mapping::ConfigurationError;
use thiserror::Error;

/// Errors that stop a table or a whole site migration.
#[derive(Debug, Error)]
pub enum MigrationError {
    /// The mapping document or site description is unusable.
    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigurationError),

    /// The central registry row could not be written; nothing was migrated.
    #[error("Failed to register site '{site}': {source}")]
    Registry {
        site: String,
        #[source]
        source: DbError,
    },

    #[error("Database error: {0}")]
    Database(#[from] DbError),

    #[error("Table '{0}' is not part of the mapping document")]
    UnknownTable(String),

    /// A name outside the mapping's allow-list was about to reach SQL.
    #[error("Identifier '{0}' is not allowed by the mapping document")]
    Identifier(String),
}

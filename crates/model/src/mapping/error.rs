use thiserror::Error;

/// A mapping document that cannot be executed. Always fatal at load time.
#[derive(Debug, Error)]
pub enum ConfigurationError {
    #[error("Failed to read mapping document: {0}")]
    Io(#[from] std::io::Error),

    #[error("Mapping document is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid mapping document: {0}")]
    InvalidDocument(String),

    #[error("Invalid mapping for table '{table}': {message}")]
    InvalidTable { table: String, message: String },

    #[error("Unknown destination database '{db}' for {table}.{column} (expected 'tenant' or 'central')")]
    UnknownDbKind {
        table: String,
        column: String,
        db: String,
    },

    #[error("Invalid target for {table}.{column}: {message}")]
    InvalidTarget {
        table: String,
        column: String,
        message: String,
    },

    #[error("Invalid lookup chain for {table}.{column}: {message}")]
    InvalidLookupChain {
        table: String,
        column: String,
        message: String,
    },

    #[error("Invalid site: {0}")]
    InvalidSite(String),

    #[error("Invalid SQL identifier: '{0}'")]
    InvalidIdentifier(String),
}

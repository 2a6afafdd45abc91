use engine_config::settings::error::SettingsError;
use engine_runtime::{MigrationError, RuntimeError};
use model::mapping::ConfigurationError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CliError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Environment file error: {0}")]
    Env(String),

    #[error("Failed to load settings: {0}")]
    Settings(#[from] SettingsError),

    #[error("Failed to load the mapping document: {0}")]
    Mapping(#[from] ConfigurationError),

    #[error("Failed to start the migration: {0}")]
    Runtime(#[from] RuntimeError),

    #[error("Migration error: {0}")]
    Migration(#[from] MigrationError),

    #[error("Failed to read site description: {0}")]
    SiteInput(#[source] serde_json::Error),

    #[error("Failed to serialize data to JSON: {0}")]
    JsonSerialize(#[source] serde_json::Error),

    /// The run finished but some tables or rows failed; the report has the details.
    #[error("Migration finished with {tables} table error(s) and {rows} row error(s)")]
    Incomplete { tables: usize, rows: usize },
}

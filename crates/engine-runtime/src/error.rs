use connectors::error::AdapterError;
use engine_config::settings::error::SettingsError;
use model::mapping::ConfigurationError;
use thiserror::Error;

pub use engine_core::error::MigrationError;

/// Errors raised while building a [`crate::SiteMigrator`] or running it.
#[derive(Debug, Error)]
pub enum RuntimeError {
    /// Adapter-related error.
    #[error("Adapter error: {0}")]
    Adapter(#[from] AdapterError),

    /// Setting error.
    #[error("Settings error: {0}")]
    Settings(#[from] SettingsError),

    #[error("Mapping error: {0}")]
    Configuration(#[from] ConfigurationError),

    #[error(transparent)]
    Migration(#[from] MigrationError),
}

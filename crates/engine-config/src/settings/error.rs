use model::mapping::ConfigurationError;
use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while loading or validating the settings file.
#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("Failed to read settings file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Malformed settings: {0}")]
    Json(#[from] serde_json::Error),

    /// A `${VAR}` reference with no value in the environment.
    #[error("Environment variable '{0}' is not set")]
    MissingVariable(String),

    #[error("Invalid setting '{field}': {message}")]
    Invalid { field: String, message: String },

    /// The mapping document named by the settings failed to load.
    #[error("Mapping error: {0}")]
    Mapping(#[from] ConfigurationError),
}

impl SettingsError {
    pub(crate) fn invalid(field: &str, message: impl Into<String>) -> Self {
        SettingsError::Invalid {
            field: field.to_string(),
            message: message.into(),
        }
    }
}

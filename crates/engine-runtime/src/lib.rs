pub mod error;
pub mod factory;
pub mod orchestrator;

pub use error::{MigrationError, RuntimeError};
pub use orchestrator::SiteMigrator;

pub mod cache;
pub mod error;
pub mod migration_state;
pub mod migrator;
pub mod ordering;
pub mod resolver;
pub mod retry;

pub use error::MigrationError;
pub use migration_state::MigrationState;
pub use migrator::{
    DatabaseHandle, PinnedColumn, TableFailure, TableMigrator, TableOutcome, TableRequest,
};
pub use ordering::DependencyGraph;
pub use retry::RetryPolicy;

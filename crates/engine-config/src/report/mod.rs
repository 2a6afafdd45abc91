pub mod summary;

pub use summary::{Destinations, MigrationReport, TableError};

pub mod document;
pub mod error;
pub mod target;

pub use document::{ColumnMapping, FieldMapping, MappingDocument, TableMapping};
pub use error::ConfigurationError;
pub use target::{DbKind, LookupStep, Target};

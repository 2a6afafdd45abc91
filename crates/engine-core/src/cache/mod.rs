pub mod id_map;
pub mod unique;

pub use id_map::IdMappingCache;
pub use unique::{TableKeys, UniqueConstraintCache};

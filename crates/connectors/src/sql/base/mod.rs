pub mod adapter;
pub mod error;
pub mod query;
pub mod requests;

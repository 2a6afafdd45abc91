pub mod builder;
pub mod expr;

pub use builder::parse_expression;
pub use expr::{ColumnRef, CompareOp, Expr, LogicalOp, WhenBranch};

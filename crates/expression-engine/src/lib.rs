//! Tokenizer, parser and evaluator for the small SQL-like expression language
//! used in mapping documents: column references, literals, comparisons,
//! `IS [NOT] NULL`, boolean connectives and `CASE`.

pub mod ast;
pub mod compiled;
pub mod error;
pub mod eval;
pub mod lexer;
pub mod parser;

pub use ast::{Expr, parse_expression};
pub use compiled::{CompiledExpression, evaluate_lenient};
pub use error::{ExpressionError, Result};
pub use eval::{Evaluator, is_truthy};

use crate::{
    ast::{Expr, parse_expression},
    eval::{Evaluator, fallback_column_value},
};
use model::{core::value::Value, records::row::RowData};
use tracing::debug;

/// An expression parsed once and evaluated per row.
///
/// Text the grammar rejects is kept and evaluated with the column fallback,
/// so compiling never fails.
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledExpression {
    source: String,
    parsed: Option<Expr>,
}

impl CompiledExpression {
    pub fn compile(text: &str) -> Self {
        let parsed = match parse_expression(text) {
            Ok(expr) => Some(expr),
            Err(err) => {
                debug!(
                    expression = %text,
                    error = %err,
                    "Expression not parseable, using column fallback"
                );
                None
            }
        };
        CompiledExpression {
            source: text.to_string(),
            parsed,
        }
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn is_parsed(&self) -> bool {
        self.parsed.is_some()
    }

    pub fn expr(&self) -> Option<&Expr> {
        self.parsed.as_ref()
    }
}

impl Evaluator for CompiledExpression {
    fn evaluate(&self, row: &RowData) -> Value {
        match &self.parsed {
            Some(expr) => expr.evaluate(row),
            None => fallback_column_value(&self.source, row),
        }
    }
}

/// One-shot evaluation of `text` against `row`. Never fails.
pub fn evaluate_lenient(text: &str, row: &RowData) -> Value {
    CompiledExpression::compile(text).evaluate(row)
}

pub mod fallback;
pub mod runtime;

use model::{core::value::Value, records::row::RowData};

/// Evaluates an expression against one source row.
pub trait Evaluator {
    fn evaluate(&self, row: &RowData) -> Value;

    /// Inclusion-condition view of [`Evaluator::evaluate`].
    fn is_true(&self, row: &RowData) -> bool {
        is_truthy(&self.evaluate(row))
    }
}

/// `Boolean(b)`, any non-zero number and the strings `"true"`/`"1"` are true.
/// NULL is false.
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Boolean(b) => *b,
        Value::Int(n) => *n != 0,
        Value::Uint(n) => *n != 0,
        Value::Float(n) => *n != 0.0,
        Value::String(s) => matches!(s.trim().to_ascii_lowercase().as_str(), "true" | "1"),
        other => other.as_bool().unwrap_or(false),
    }
}

pub use fallback::fallback_column_value;

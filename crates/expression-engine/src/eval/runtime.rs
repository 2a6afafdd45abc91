use super::{Evaluator, is_truthy};
use crate::ast::{CompareOp, Expr, LogicalOp};
use model::{core::value::Value, records::row::RowData};

impl Evaluator for Expr {
    fn evaluate(&self, row: &RowData) -> Value {
        match self {
            Expr::Column(column) => row.get_value(&column.name),

            Expr::Literal(value) => value.clone(),

            Expr::Compare { left, op, right } => {
                let left = left.evaluate(row);
                let right = right.evaluate(row);
                Value::Boolean(compare(&left, *op, &right))
            }

            Expr::IsNull { expr, negated } => {
                Value::Boolean(expr.evaluate(row).is_null() != *negated)
            }

            Expr::Not(expr) => Value::Boolean(!expr.is_true(row)),

            Expr::Logical { left, op, right } => Value::Boolean(match op {
                LogicalOp::And => left.is_true(row) && right.is_true(row),
                LogicalOp::Or => left.is_true(row) || right.is_true(row),
            }),

            Expr::Case {
                operand,
                branches,
                else_expr,
            } => {
                let operand = operand.as_ref().map(|o| o.evaluate(row));
                for branch in branches {
                    let hit = match &operand {
                        Some(subject) => {
                            compare(subject, CompareOp::Equal, &branch.condition.evaluate(row))
                        }
                        None => is_truthy(&branch.condition.evaluate(row)),
                    };
                    if hit {
                        return branch.value.evaluate(row);
                    }
                }
                else_expr
                    .as_ref()
                    .map(|e| e.evaluate(row))
                    .unwrap_or(Value::Null)
            }
        }
    }
}

/// Loose comparison on the canonical string form.
///
/// A NULL operand makes `=` false; `!=` is true unless both sides are NULL.
fn compare(left: &Value, op: CompareOp, right: &Value) -> bool {
    match op {
        CompareOp::Equal => left.loose_eq(right),
        CompareOp::NotEqual => match (left.is_null(), right.is_null()) {
            (true, true) => false,
            (true, false) | (false, true) => true,
            (false, false) => !left.loose_eq(right),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::parse_expression;

    fn eval(expr: &str, row: &RowData) -> Value {
        parse_expression(expr).unwrap().evaluate(row)
    }

    #[test]
    fn case_returns_first_matching_branch() {
        let expr = "CASE WHEN username = 'x' THEN 'A' ELSE 'B' END";
        let x = RowData::from_pairs("users", [("username", "x")]);
        let y = RowData::from_pairs("users", [("username", "y")]);
        assert_eq!(eval(expr, &x), Value::from("A"));
        assert_eq!(eval(expr, &y), Value::from("B"));
    }

    #[test]
    fn case_on_null_column_returns_null() {
        let row = RowData::from_pairs("users", [("email", Value::Null)]);
        assert_eq!(
            eval("CASE WHEN email IS NULL THEN NULL ELSE email END", &row),
            Value::Null
        );
        let row = RowData::from_pairs("users", [("email", "a@b.c")]);
        assert_eq!(
            eval("CASE WHEN email IS NULL THEN NULL ELSE email END", &row),
            Value::from("a@b.c")
        );
    }

    #[test]
    fn case_without_else_or_match_is_null() {
        let row = RowData::from_pairs("users", [("role", "guest")]);
        assert_eq!(eval("CASE WHEN role = 'admin' THEN 1 END", &row), Value::Null);
    }

    #[test]
    fn simple_case_compares_operand() {
        let row = RowData::from_pairs("accounts", [("status", Value::Int(2))]);
        assert_eq!(
            eval("CASE status WHEN 1 THEN 'new' WHEN '2' THEN 'active' END", &row),
            Value::from("active")
        );
    }

    #[test]
    fn comparison_is_loose_and_null_aware() {
        let row = RowData::from_pairs(
            "accounts",
            [("account_id", Value::Int(7)), ("closed", Value::Null)],
        );
        assert_eq!(eval("account_id = '7'", &row), Value::Boolean(true));
        assert_eq!(eval("closed = NULL", &row), Value::Boolean(false));
        assert_eq!(eval("closed != 'x'", &row), Value::Boolean(true));
        assert_eq!(eval("closed <> missing", &row), Value::Boolean(false));
        assert_eq!(
            eval("NOT (account_id = 7) OR closed IS NULL", &row),
            Value::Boolean(true)
        );
    }

    #[test]
    fn qualified_column_is_stripped() {
        let row = RowData::from_pairs("users", [("Email", "a@b.c")]);
        assert_eq!(eval("users.email", &row), Value::from("a@b.c"));
        assert_eq!(eval("nope", &row), Value::Null);
    }
}

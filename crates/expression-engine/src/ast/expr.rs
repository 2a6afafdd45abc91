use model::core::value::Value;
use std::fmt;

/// A column reference, optionally table-qualified. Only `name` is used for lookup.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnRef {
    pub qualifier: Option<String>,
    pub name: String,
}

impl ColumnRef {
    pub fn parse(path: &str) -> Self {
        match path.rsplit_once('.') {
            Some((qualifier, name)) => ColumnRef {
                qualifier: Some(qualifier.to_string()),
                name: name.to_string(),
            },
            None => ColumnRef {
                qualifier: None,
                name: path.to_string(),
            },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Equal,
    NotEqual,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogicalOp {
    And,
    Or,
}

#[derive(Debug, Clone, PartialEq)]
pub struct WhenBranch {
    pub condition: Expr,
    pub value: Expr,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Column(ColumnRef),
    Literal(Value),
    Compare {
        left: Box<Expr>,
        op: CompareOp,
        right: Box<Expr>,
    },
    IsNull {
        expr: Box<Expr>,
        negated: bool,
    },
    Not(Box<Expr>),
    Logical {
        left: Box<Expr>,
        op: LogicalOp,
        right: Box<Expr>,
    },
    /// `CASE [operand] WHEN .. THEN .. [ELSE ..] END`. With an operand each
    /// branch condition is compared to it for equality.
    Case {
        operand: Option<Box<Expr>>,
        branches: Vec<WhenBranch>,
        else_expr: Option<Box<Expr>>,
    },
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Column(col) => match &col.qualifier {
                Some(q) => write!(f, "{q}.{}", col.name),
                None => write!(f, "{}", col.name),
            },
            Expr::Literal(value) => write!(f, "{value}"),
            Expr::Compare { left, op, right } => {
                let op = match op {
                    CompareOp::Equal => "=",
                    CompareOp::NotEqual => "!=",
                };
                write!(f, "{left} {op} {right}")
            }
            Expr::IsNull { expr, negated } => {
                write!(f, "{expr} IS {}NULL", if *negated { "NOT " } else { "" })
            }
            Expr::Not(expr) => write!(f, "NOT ({expr})"),
            Expr::Logical { left, op, right } => {
                let op = match op {
                    LogicalOp::And => "AND",
                    LogicalOp::Or => "OR",
                };
                write!(f, "({left} {op} {right})")
            }
            Expr::Case {
                operand,
                branches,
                else_expr,
            } => {
                write!(f, "CASE")?;
                if let Some(operand) = operand {
                    write!(f, " {operand}")?;
                }
                for branch in branches {
                    write!(f, " WHEN {} THEN {}", branch.condition, branch.value)?;
                }
                if let Some(else_expr) = else_expr {
                    write!(f, " ELSE {else_expr}")?;
                }
                write!(f, " END")
            }
        }
    }
}

use pest_derive::Parser;

#[derive(Parser)]
#[grammar = "grammar/sql_expr.pest"]
pub struct SqlExprParser;

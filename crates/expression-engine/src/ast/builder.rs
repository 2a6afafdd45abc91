use super::expr::{ColumnRef, CompareOp, Expr, LogicalOp, WhenBranch};
use crate::{
    error::{ExpressionError, Result},
    lexer::{
        Lexer,
        token::{Token, TokenKind},
    },
};
use model::core::value::Value;

/// Tokenizes and parses one expression.
///
/// ```text
/// expr       := and_expr (OR and_expr)*
/// and_expr   := not_expr (AND not_expr)*
/// not_expr   := NOT not_expr | comparison
/// comparison := primary ((= | != | <>) primary | IS [NOT] NULL)?
/// primary    := literal | column | case | '(' expr ')'
/// case       := CASE [expr] (WHEN expr THEN expr)+ [ELSE expr] END
/// ```
pub fn parse_expression(input: &str) -> Result<Expr> {
    let tokens = Lexer::new().tokenize(input)?;
    let mut builder = ExprBuilder::new(tokens);
    if builder.check(&TokenKind::Eof) {
        return Err(ExpressionError::Empty);
    }

    let expr = builder.parse_or()?;
    let trailing = builder.peek();
    if trailing.kind != TokenKind::Eof {
        return Err(ExpressionError::TrailingInput {
            found: trailing.kind.clone(),
            column: trailing.column,
        });
    }
    Ok(expr)
}

struct ExprBuilder {
    tokens: Vec<Token>,
    pos: usize,
}

impl ExprBuilder {
    fn new(tokens: Vec<Token>) -> Self {
        ExprBuilder { tokens, pos: 0 }
    }

    fn parse_or(&mut self) -> Result<Expr> {
        let mut left = self.parse_and()?;
        while self.matches(&TokenKind::Or) {
            let right = self.parse_and()?;
            left = Expr::Logical {
                left: Box::new(left),
                op: LogicalOp::Or,
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> Result<Expr> {
        let mut left = self.parse_not()?;
        while self.matches(&TokenKind::And) {
            let right = self.parse_not()?;
            left = Expr::Logical {
                left: Box::new(left),
                op: LogicalOp::And,
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    fn parse_not(&mut self) -> Result<Expr> {
        if self.matches(&TokenKind::Not) {
            let inner = self.parse_not()?;
            return Ok(Expr::Not(Box::new(inner)));
        }
        self.parse_comparison()
    }

    fn parse_comparison(&mut self) -> Result<Expr> {
        let left = self.parse_primary()?;

        let op = match self.peek().kind {
            TokenKind::Equal => Some(CompareOp::Equal),
            TokenKind::NotEqual => Some(CompareOp::NotEqual),
            _ => None,
        };
        if let Some(op) = op {
            self.advance();
            let right = self.parse_primary()?;
            return Ok(Expr::Compare {
                left: Box::new(left),
                op,
                right: Box::new(right),
            });
        }

        if self.matches(&TokenKind::Is) {
            let negated = self.matches(&TokenKind::Not);
            self.expect(&TokenKind::Null, "NULL")?;
            return Ok(Expr::IsNull {
                expr: Box::new(left),
                negated,
            });
        }

        Ok(left)
    }

    fn parse_primary(&mut self) -> Result<Expr> {
        let token = self.advance();
        let expr = match &token.kind {
            TokenKind::String(s) => Expr::Literal(Value::String(s.clone())),
            TokenKind::Integer(n) => Expr::Literal(Value::Int(*n)),
            TokenKind::Float(n) => Expr::Literal(Value::Float(*n)),
            TokenKind::Boolean(b) => Expr::Literal(Value::Boolean(*b)),
            TokenKind::Null => Expr::Literal(Value::Null),
            TokenKind::Identifier(name) | TokenKind::DotNotation(name) => {
                Expr::Column(ColumnRef::parse(name))
            }
            TokenKind::Case => self.parse_case()?,
            TokenKind::LeftParen => {
                let inner = self.parse_or()?;
                self.expect(&TokenKind::RightParen, "')'")?;
                inner
            }
            found => return Err(unexpected("a value, column or CASE", found.clone(), &token)),
        };
        Ok(expr)
    }

    fn parse_case(&mut self) -> Result<Expr> {
        let operand = if self.check(&TokenKind::When) {
            None
        } else {
            Some(Box::new(self.parse_or()?))
        };

        let mut branches = Vec::new();
        while self.matches(&TokenKind::When) {
            let condition = self.parse_or()?;
            self.expect(&TokenKind::Then, "THEN")?;
            let value = self.parse_or()?;
            branches.push(WhenBranch { condition, value });
        }
        if branches.is_empty() {
            let token = self.peek().clone();
            return Err(unexpected("WHEN", token.kind.clone(), &token));
        }

        let else_expr = if self.matches(&TokenKind::Else) {
            Some(Box::new(self.parse_or()?))
        } else {
            None
        };
        self.expect(&TokenKind::End, "END")?;

        Ok(Expr::Case {
            operand,
            branches,
            else_expr,
        })
    }

    fn peek(&self) -> &Token {
        // The lexer always terminates the stream with Eof.
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    fn check(&self, kind: &TokenKind) -> bool {
        &self.peek().kind == kind
    }

    fn advance(&mut self) -> Token {
        let token = self.peek().clone();
        if token.kind != TokenKind::Eof {
            self.pos += 1;
        }
        token
    }

    fn matches(&mut self, kind: &TokenKind) -> bool {
        if self.check(kind) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, kind: &TokenKind, expected: &str) -> Result<Token> {
        if self.check(kind) {
            Ok(self.advance())
        } else {
            let token = self.peek().clone();
            Err(unexpected(expected, token.kind.clone(), &token))
        }
    }
}

fn unexpected(expected: &str, found: TokenKind, at: &Token) -> ExpressionError {
    ExpressionError::UnexpectedToken {
        expected: expected.to_string(),
        found,
        line: at.line,
        column: at.column,
    }
}

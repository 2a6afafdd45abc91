use crate::lexer::{error::LexerError, token::TokenKind};
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ExpressionError {
    #[error(transparent)]
    Lexer(#[from] LexerError),

    #[error("Empty expression")]
    Empty,

    #[error("Expected {expected} at line {line}, column {column}, found '{found}'")]
    UnexpectedToken {
        expected: String,
        found: TokenKind,
        line: usize,
        column: usize,
    },

    #[error("Unexpected trailing input '{found}' at column {column}")]
    TrailingInput { found: TokenKind, column: usize },
}

pub type Result<T> = std::result::Result<T, ExpressionError>;

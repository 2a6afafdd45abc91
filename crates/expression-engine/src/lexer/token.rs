use std::fmt;

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub lexeme: String,
    pub line: usize,
    pub column: usize,
    pub span: (usize, usize),
}

#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    // Keywords
    Case,
    When,
    Then,
    Else,
    End,
    Is,
    Not,
    And,
    Or,

    // Literals
    String(String),
    Integer(i64),
    Float(f64),
    Boolean(bool),
    Null,

    // Identifiers
    Identifier(String),
    DotNotation(String),

    // Operators
    Equal,    // =
    NotEqual, // != or <>

    // Delimiters
    LeftParen,  // (
    RightParen, // )
    Comma,      // ,

    Eof,
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TokenKind::Case => write!(f, "CASE"),
            TokenKind::When => write!(f, "WHEN"),
            TokenKind::Then => write!(f, "THEN"),
            TokenKind::Else => write!(f, "ELSE"),
            TokenKind::End => write!(f, "END"),
            TokenKind::Is => write!(f, "IS"),
            TokenKind::Not => write!(f, "NOT"),
            TokenKind::And => write!(f, "AND"),
            TokenKind::Or => write!(f, "OR"),
            TokenKind::String(s) => write!(f, "'{s}'"),
            TokenKind::Integer(n) => write!(f, "{n}"),
            TokenKind::Float(n) => write!(f, "{n}"),
            TokenKind::Boolean(b) => write!(f, "{}", if *b { "TRUE" } else { "FALSE" }),
            TokenKind::Null => write!(f, "NULL"),
            TokenKind::Identifier(name) => write!(f, "{name}"),
            TokenKind::DotNotation(path) => write!(f, "{path}"),
            TokenKind::Equal => write!(f, "="),
            TokenKind::NotEqual => write!(f, "!="),
            TokenKind::LeftParen => write!(f, "("),
            TokenKind::RightParen => write!(f, ")"),
            TokenKind::Comma => write!(f, ","),
            TokenKind::Eof => write!(f, "end of input"),
        }
    }
}

use crate::{
    lexer::{
        error::LexerError,
        token::{Token, TokenKind},
    },
    parser::{Rule, SqlExprParser},
};
use pest::{Parser, iterators::Pair};

pub mod error;
pub mod token;

pub struct Lexer {
    tokens: Vec<Token>,
}

impl Lexer {
    pub fn new() -> Self {
        Lexer { tokens: Vec::new() }
    }

    pub fn tokenize(&mut self, input: &str) -> Result<Vec<Token>, LexerError> {
        self.tokens.clear();

        let pairs = SqlExprParser::parse(Rule::expression_tokens, input)
            .map_err(LexerError::from_pest_error)?;

        for pair in pairs.flat_map(|p| p.into_inner()) {
            self.process_pair(pair)?;
        }

        self.tokens.push(Token {
            kind: TokenKind::Eof,
            lexeme: String::new(),
            line: input.lines().count().max(1),
            column: input.lines().last().map(|l| l.len()).unwrap_or(0) + 1,
            span: (input.len(), input.len()),
        });

        Ok(std::mem::take(&mut self.tokens))
    }

    fn process_pair(&mut self, pair: Pair<Rule>) -> Result<(), LexerError> {
        let span = pair.as_span();
        let lexeme = span.as_str();

        let kind = match pair.as_rule() {
            Rule::kw_case => TokenKind::Case,
            Rule::kw_when => TokenKind::When,
            Rule::kw_then => TokenKind::Then,
            Rule::kw_else => TokenKind::Else,
            Rule::kw_end => TokenKind::End,
            Rule::kw_is => TokenKind::Is,
            Rule::kw_not => TokenKind::Not,
            Rule::kw_and => TokenKind::And,
            Rule::kw_or => TokenKind::Or,
            Rule::kw_null => TokenKind::Null,
            Rule::kw_true => TokenKind::Boolean(true),
            Rule::kw_false => TokenKind::Boolean(false),

            Rule::string => TokenKind::String(unescape(lexeme)),
            Rule::number => parse_number(lexeme)?,

            Rule::ident => TokenKind::Identifier(lexeme.to_string()),
            Rule::dotted_ident => TokenKind::DotNotation(lexeme.to_string()),

            Rule::op_eq => TokenKind::Equal,
            Rule::op_neq => TokenKind::NotEqual,
            Rule::lparen => TokenKind::LeftParen,
            Rule::rparen => TokenKind::RightParen,
            Rule::comma => TokenKind::Comma,

            Rule::EOI => return Ok(()),
            _ => {
                return Err(LexerError::ParseError {
                    message: format!("unexpected input '{lexeme}'"),
                    line: span.start_pos().line_col().0,
                    column: span.start_pos().line_col().1,
                });
            }
        };

        let (line, column) = span.start_pos().line_col();
        self.tokens.push(Token {
            kind,
            lexeme: lexeme.to_string(),
            line,
            column,
            span: (span.start(), span.end()),
        });
        Ok(())
    }
}

impl Default for Lexer {
    fn default() -> Self {
        Self::new()
    }
}

fn parse_number(lexeme: &str) -> Result<TokenKind, LexerError> {
    if let Ok(n) = lexeme.parse::<i64>() {
        return Ok(TokenKind::Integer(n));
    }
    lexeme
        .parse::<f64>()
        .map(TokenKind::Float)
        .map_err(|_| LexerError::InvalidNumber(lexeme.to_string()))
}

/// Strips the surrounding quotes and resolves doubled quotes and backslash escapes.
fn unescape(lexeme: &str) -> String {
    let mut chars = lexeme.chars();
    let Some(quote) = chars.next() else {
        return String::new();
    };
    let body: Vec<char> = chars.collect();
    let body = &body[..body.len().saturating_sub(1)];

    let mut out = String::with_capacity(body.len());
    let mut i = 0;
    while i < body.len() {
        let c = body[i];
        if c == '\\' && i + 1 < body.len() {
            out.push(match body[i + 1] {
                'n' => '\n',
                't' => '\t',
                'r' => '\r',
                '0' => '\0',
                other => other,
            });
            i += 2;
        } else if c == quote && body.get(i + 1) == Some(&quote) {
            out.push(quote);
            i += 2;
        } else {
            out.push(c);
            i += 1;
        }
    }
    out
}

//! Dialect-aware splitting of SQL scripts into executable statements.
//!
//! The lexer knows how each dialect quotes strings and identifiers and how it
//! writes comments. The statement parser tracks the active delimiter and the
//! depth of procedural blocks so that a delimiter inside a routine body does
//! not end the statement.

pub mod dialect;
pub mod lexer;
pub mod placeholder;
pub mod statement;

pub use dialect::{Dialect, DialectKind};
pub use lexer::{Lexer, Token, TokenKind, tokenize};
pub use placeholder::PlaceholderReplacer;
pub use statement::{Delimiter, ParserContext, SqlStatement, StatementParser};

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("line {line}: {message}")]
pub struct ParseError {
    pub line: usize,
    pub message: String,
}

impl ParseError {
    pub fn new(line: usize, message: impl Into<String>) -> Self {
        Self {
            line,
            message: message.into(),
        }
    }
}

/// Split `script` into statements using `dialect`.
pub fn parse_statements(script: &str, dialect: &Dialect) -> Result<Vec<SqlStatement>, ParseError> {
    StatementParser::new(dialect).parse(script)
}

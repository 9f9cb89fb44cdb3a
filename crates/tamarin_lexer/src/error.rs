use crate::token::Span;
use std::fmt;

#[derive(Debug, Clone, PartialEq)]
pub enum LexError {
    UnterminatedString { span: Span },
    InvalidNumber { lexeme: String, span: Span },
}

impl fmt::Display for LexError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LexError::UnterminatedString { span } =>
                write!(f, "[LexError] Unterminated string at line {}, column {}", span.line, span.column),
            LexError::InvalidNumber { lexeme, span } =>
                write!(f, "[LexError] Invalid number '{}' at line {}, column {}", lexeme, span.line, span.column),
        }
    }
}

impl std::error::Error for LexError {}

pub type LexResult<T> = Result<T, LexError>;

use thiserror::Error;

/// Syntax errors; offsets are byte positions in the source text.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ExpressionError {
    #[error("expression is empty")]
    Empty,
    #[error("expression is {len} bytes, limit is {max}")]
    TooLong { len: usize, max: usize },
    #[error("expression nests deeper than {max} levels")]
    TooDeep { max: usize },
    #[error("unexpected character '{ch}' at offset {offset}")]
    UnexpectedChar { ch: char, offset: usize },
    #[error("unterminated string starting at offset {offset}")]
    UnterminatedString { offset: usize },
    #[error("invalid number '{literal}' at offset {offset}")]
    InvalidNumber { literal: String, offset: usize },
    #[error("invalid path '{path}' at offset {offset}")]
    InvalidPath { path: String, offset: usize },
    #[error("unexpected {found} at offset {offset}")]
    UnexpectedToken { found: String, offset: usize },
    #[error("unexpected end of expression")]
    UnexpectedEnd,
}

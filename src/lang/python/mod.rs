//! Python source front end: tokenizer, statement parser and syntax tree.

pub mod ast;
pub mod lexer;
pub mod parser;

use thiserror::Error;

/// Source that the front end refuses to parse
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("line {line}: {message}")]
pub struct SyntaxError {
    pub line: u32,
    pub message: String,
}

impl SyntaxError {
    pub fn new(line: u32, message: impl Into<String>) -> Self {
        Self {
            line,
            message: message.into(),
        }
    }
}

/// Parse module source text into a syntax tree.
pub fn parse(source: &str) -> Result<ast::Module, SyntaxError> {
    let tokens = lexer::tokenize(source)?;
    parser::parse_module(tokens)
}

/// Parse raw entry bytes; the source must be UTF-8.
pub fn parse_bytes(bytes: &[u8]) -> Result<ast::Module, SyntaxError> {
    let source = std::str::from_utf8(bytes).map_err(|e| {
        let line = bytes[..e.valid_up_to()]
            .iter()
            .filter(|b| **b == b'\n')
            .count() as u32
            + 1;
        SyntaxError::new(line, "source is not valid UTF-8")
    })?;
    parse(source)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_bytes_rejects_invalid_utf8_with_line() {
        let err = parse_bytes(b"x = 1\ny = '\xff'\n").unwrap_err();
        assert_eq!(err.line, 2);
    }

    #[test]
    fn test_empty_module() {
        assert!(parse("").unwrap().body.is_empty());
        assert!(parse("# only a comment\n\n").unwrap().body.is_empty());
    }

    #[test]
    fn test_display() {
        let err = parse("x = (\n").unwrap_err();
        assert_eq!(err.to_string(), "line 1: '(' was never closed");
    }
}

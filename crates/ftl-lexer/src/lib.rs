//! FreeMarker Lexer
//!
//! Scans raw template text into a flat token stream: literal text, comments,
//! directive tags (`<#if ...>`), macro calls (`<@greet .../>`) and
//! interpolations (`${...}`). Tag parameters are kept as raw text plus
//! whitespace-delimited fragments; the parser turns them into expressions.
//!
//! Token spans are contiguous, so concatenating every token's `raw` text
//! reproduces the input exactly.
//!
//! # Example
//!
//! ```
//! use ftl_lexer::{Scanner, TokenKind};
//!
//! let tokens = Scanner::tokenize("Hi ${name}!").unwrap();
//! assert_eq!(tokens.len(), 3);
//! assert_eq!(tokens[1].kind, TokenKind::Interpolation);
//! ```

pub mod scanner;
pub mod token;

use serde::Serialize;

pub use scanner::Scanner;
pub use token::{Fragment, Params, Span, Token, TokenKind};

/// What went wrong while scanning markup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum LexerErrorKind {
    UnclosedComment,
    UnclosedTag,
    BracketUnderflow,
}

/// Lexer error with position information. Always fatal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, thiserror::Error)]
#[error("Lexer error at offset {}: {message}", .span.start)]
pub struct LexerError {
    pub kind: LexerErrorKind,
    pub message: String,
    pub span: Span,
}

impl LexerError {
    pub fn new(kind: LexerErrorKind, message: impl Into<String>, span: Span) -> Self {
        Self {
            kind,
            message: message.into(),
            span,
        }
    }
}

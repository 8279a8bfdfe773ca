//! FreeMarker Parser
//!
//! Turns template source into a `Program` tree. The markup scanner lives in
//! `ftl-lexer`; this crate adds the expression scanner and parser (for
//! parameters such as `user.name?upper_case`), the directive table and the
//! stack-based tree builder.
//!
//! There are two error channels. Malformed markup and malformed expressions
//! are fatal and returned as `ParseError`. Structural problems such as a
//! stray close tag are collected on `Program::errors` while the rest of the
//! template is still built.
//!
//! # Example
//!
//! ```
//! use ftl_parser::ast::Node;
//!
//! let result = ftl_parser::parse("<#if user?has_content>Hi ${user.name}</#if>").unwrap();
//! assert!(result.ast.errors.is_empty());
//! assert!(matches!(result.ast.body[0], Node::Condition(_)));
//! ```

pub mod ast;
pub mod builder;
pub mod directive;
pub mod expr_lexer;
pub mod expr_parser;

use std::path::PathBuf;

use ftl_lexer::{LexerError, Scanner, Span, Token};
use serde::Serialize;

pub use ast::{Expression, Node, Program};
pub use builder::Builder;
pub use expr_parser::ExprParser;

/// A malformed parameter expression. Fails the whole directive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, thiserror::Error)]
#[error("Expression error at offset {}: {message}", .span.start)]
pub struct ExprError {
    pub message: String,
    pub span: Span,
}

impl ExprError {
    pub fn new(message: impl Into<String>, span: Span) -> Self {
        Self {
            message: message.into(),
            span,
        }
    }
}

/// An illegal nesting, close tag or parameter shape. Recorded on the
/// program; never aborts the parse.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, thiserror::Error)]
#[error("Structural error at offset {}: {message}", .span.start)]
pub struct StructuralError {
    pub message: String,
    #[serde(flatten)]
    pub span: Span,
}

impl StructuralError {
    pub fn new(message: impl Into<String>, span: Span) -> Self {
        Self {
            message: message.into(),
            span,
        }
    }
}

/// A fatal error from the lexical or expression layer.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error(transparent)]
    Lexer(#[from] LexerError),
    #[error(transparent)]
    Expression(#[from] ExprError),
}

impl ParseError {
    pub fn message(&self) -> &str {
        match self {
            ParseError::Lexer(e) => &e.message,
            ParseError::Expression(e) => &e.message,
        }
    }

    pub fn span(&self) -> Span {
        match self {
            ParseError::Lexer(e) => e.span,
            ParseError::Expression(e) => e.span,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ParseOptions {
    /// Directory `<#include>` paths are relative to. Carried through
    /// untouched; nothing is resolved at parse time.
    pub base_path: Option<PathBuf>,
}

/// Everything a parse produces.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParseResult {
    pub ast: Program,
    pub tokens: Vec<Token>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_path: Option<PathBuf>,
}

/// Parse a template with default options.
pub fn parse(source: &str) -> Result<ParseResult, ParseError> {
    parse_with_options(source, &ParseOptions::default())
}

pub fn parse_with_options(source: &str, options: &ParseOptions) -> Result<ParseResult, ParseError> {
    let tokens = Scanner::tokenize(source)?;
    let ast = Builder::build(&tokens, source.len())?;
    Ok(ParseResult {
        ast,
        tokens,
        base_path: options.base_path.clone(),
    })
}

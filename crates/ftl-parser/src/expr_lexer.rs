//! Lexer for FreeMarker expressions.
//!
//! Tokenizes a single parameter region (the text of `${...}` or the
//! parameters of a directive) into expression tokens. Operators are matched
//! longest-first against a fixed table, shrinking one character at a time.
//!
//! Spans are byte offsets into the template, shifted by the base offset the
//! parameter text started at.
//!
//! # Example
//!
//! ```
//! use ftl_parser::expr_lexer::{ExprLexer, TokenKind};
//!
//! let kinds: Vec<TokenKind> = ExprLexer::tokenize("name?length >= 3")
//!     .unwrap()
//!     .into_iter()
//!     .map(|t| t.kind)
//!     .collect();
//! assert_eq!(kinds[1], TokenKind::Question);
//! assert_eq!(kinds[3], TokenKind::Gte);
//! ```

use ftl_lexer::Span;

use crate::ExprError;

/// A token produced by the expression lexer.
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub span: Span,
    pub value: TokenValue,
}

/// Token classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    // Literals
    Number,
    String,

    // Identifiers (literal names and word operators are resolved by the parser)
    Identifier,

    // Arithmetic
    Plus,
    Minus,
    Star,
    Slash,
    Percent,

    // Comparison
    EqEq,
    NotEq,
    Lt,
    Gt,
    Lte,
    Gte,

    // Logical
    And,
    Or,
    Not,

    // Assignment
    Eq,
    PlusEq,
    MinusEq,
    StarEq,
    SlashEq,
    PercentEq,

    // Update
    PlusPlus,
    MinusMinus,

    // Delimiters
    LParen,
    RParen,
    LBracket,
    RBracket,
    LBrace,
    RBrace,

    // Punctuation
    Dot,
    Comma,
    Colon,
    Semicolon,
    Question,

    // End of input
    Eof,
}

/// The value carried by a token.
#[derive(Debug, Clone, PartialEq)]
pub enum TokenValue {
    None,
    Number(f64),
    String(String),
    Identifier(String),
}

/// Operators and punctuation, probed longest-first.
const PUNCTUATORS: &[(&str, TokenKind)] = &[
    ("==", TokenKind::EqEq),
    ("!=", TokenKind::NotEq),
    ("<=", TokenKind::Lte),
    (">=", TokenKind::Gte),
    ("&&", TokenKind::And),
    ("||", TokenKind::Or),
    ("++", TokenKind::PlusPlus),
    ("--", TokenKind::MinusMinus),
    ("+=", TokenKind::PlusEq),
    ("-=", TokenKind::MinusEq),
    ("*=", TokenKind::StarEq),
    ("/=", TokenKind::SlashEq),
    ("%=", TokenKind::PercentEq),
    ("+", TokenKind::Plus),
    ("-", TokenKind::Minus),
    ("*", TokenKind::Star),
    ("/", TokenKind::Slash),
    ("%", TokenKind::Percent),
    ("<", TokenKind::Lt),
    (">", TokenKind::Gt),
    ("!", TokenKind::Not),
    ("=", TokenKind::Eq),
    ("(", TokenKind::LParen),
    (")", TokenKind::RParen),
    ("[", TokenKind::LBracket),
    ("]", TokenKind::RBracket),
    ("{", TokenKind::LBrace),
    ("}", TokenKind::RBrace),
    (".", TokenKind::Dot),
    (",", TokenKind::Comma),
    (":", TokenKind::Colon),
    (";", TokenKind::Semicolon),
    ("?", TokenKind::Question),
];

const MAX_PUNCTUATOR_LEN: usize = 2;

/// FreeMarker expression lexer.
///
/// Operates on a single parameter string, e.g. the content of `${price * 2}`.
pub struct ExprLexer<'a> {
    source: &'a str,
    /// `(byte offset, char)` pairs for index-based navigation.
    chars: Vec<(usize, char)>,
    pos: usize,
    base: usize,
    last: Option<TokenKind>,
}

impl<'a> ExprLexer<'a> {
    /// Create a lexer whose spans are shifted by `base`.
    pub fn with_offset(source: &'a str, base: usize) -> Self {
        Self {
            source,
            chars: source.char_indices().collect(),
            pos: 0,
            base,
            last: None,
        }
    }

    /// Tokenize a whole parameter string; the last token is always `Eof`.
    pub fn tokenize(source: &str) -> Result<Vec<Token>, ExprError> {
        Self::tokenize_at(source, 0)
    }

    /// Tokenize with spans shifted by `base`.
    pub fn tokenize_at(source: &str, base: usize) -> Result<Vec<Token>, ExprError> {
        let mut lexer = ExprLexer::with_offset(source, base);
        let mut tokens = Vec::new();

        loop {
            let token = lexer.next_token()?;
            let is_eof = token.kind == TokenKind::Eof;
            tokens.push(token);
            if is_eof {
                break;
            }
        }

        Ok(tokens)
    }

    pub fn next_token(&mut self) -> Result<Token, ExprError> {
        self.skip_whitespace();

        if self.is_at_end() {
            let end = self.offset(self.pos);
            return Ok(self.token(TokenKind::Eof, end, TokenValue::None));
        }

        let start = self.offset(self.pos);
        let ch = self.current();

        let token = match ch {
            '0'..='9' => self.read_number(start)?,
            '.' if self.peek().is_some_and(|c| c.is_ascii_digit()) && !self.after_value() => {
                self.read_number(start)?
            }
            '"' | '\'' => self.read_string(start)?,
            c if is_identifier_start(c) => self.read_identifier(start),
            _ => self.read_punctuator(start)?,
        };

        self.last = Some(token.kind);
        Ok(token)
    }

    // =========================================================================
    // Literals and operators
    // =========================================================================

    /// Integer part, optional fraction, optional signed exponent.
    fn read_number(&mut self, start: usize) -> Result<Token, ExprError> {
        self.eat_digits();

        if self.check('.') {
            self.advance();
            self.eat_digits();
        }

        if self.check('e') || self.check('E') {
            self.advance();
            if self.check('+') || self.check('-') {
                self.advance();
            }
            if !self.current_is(|c| c.is_ascii_digit()) {
                return Err(self.error_here("Expected exponent"));
            }
            self.eat_digits();
        }

        if self.current_is(is_identifier_start) {
            return Err(self.error_here("Variable names cannot start with a number"));
        }
        if self.check('.') {
            return Err(self.error_here("Unexpected period"));
        }

        let end = self.offset(self.pos);
        let text = &self.source[start - self.base..end - self.base];
        let value: f64 = text.parse().map_err(|_| {
            ExprError::new(format!("Invalid number: '{text}'"), Span::new(start, end))
        })?;

        Ok(self.token(TokenKind::Number, start, TokenValue::Number(value)))
    }

    fn read_string(&mut self, start: usize) -> Result<Token, ExprError> {
        let quote = self.current();
        self.advance(); // skip opening quote

        let mut value = String::new();

        while !self.is_at_end() && self.current() != quote {
            if self.current() == '\\' {
                self.advance();
                if self.is_at_end() {
                    break;
                }
                match self.current() {
                    'n' => value.push('\n'),
                    'r' => value.push('\r'),
                    't' => value.push('\t'),
                    'b' => value.push('\u{8}'),
                    'f' => value.push('\u{c}'),
                    'v' => value.push('\u{b}'),
                    c @ ('\\' | '"' | '\'') => value.push(c),
                    c => {
                        value.push('\\');
                        value.push(c);
                    }
                }
            } else {
                value.push(self.current());
            }
            self.advance();
        }

        if self.is_at_end() {
            return Err(ExprError::new(
                format!("Unclosed quote after \"{value}\""),
                Span::new(start, self.offset(self.pos)),
            ));
        }

        self.advance(); // skip closing quote

        Ok(self.token(TokenKind::String, start, TokenValue::String(value)))
    }

    fn read_identifier(&mut self, start: usize) -> Token {
        while self.current_is(is_identifier_part) {
            self.advance();
        }

        let end = self.offset(self.pos);
        let name = self.source[start - self.base..end - self.base].to_string();
        self.token(TokenKind::Identifier, start, TokenValue::Identifier(name))
    }

    /// Longest match against the punctuator table, shrinking by one character.
    fn read_punctuator(&mut self, start: usize) -> Result<Token, ExprError> {
        for len in (1..=MAX_PUNCTUATOR_LEN).rev() {
            let Some(candidate) = self.slice(len) else {
                continue;
            };
            if let Some(&(_, kind)) = PUNCTUATORS.iter().find(|(p, _)| *p == candidate) {
                self.pos += len;
                return Ok(self.token(kind, start, TokenValue::None));
            }
        }

        let ch = self.current();
        Err(ExprError::new(
            format!("Unexpected character: '{ch}'"),
            Span::new(start, start + ch.len_utf8()),
        ))
    }

    /// True when the previous token ends an operand, so `.` is member access.
    fn after_value(&self) -> bool {
        matches!(
            self.last,
            Some(
                TokenKind::Identifier
                    | TokenKind::Number
                    | TokenKind::String
                    | TokenKind::RParen
                    | TokenKind::RBracket
                    | TokenKind::RBrace
            )
        )
    }

    fn token(&self, kind: TokenKind, start: usize, value: TokenValue) -> Token {
        Token {
            kind,
            span: Span::new(start, self.offset(self.pos)),
            value,
        }
    }

    fn error_here(&self, message: &str) -> ExprError {
        let at = self.offset(self.pos);
        let width = if self.is_at_end() { 0 } else { self.current().len_utf8() };
        ExprError::new(message, Span::new(at, at + width))
    }

    /// The next `len` characters, if that many remain.
    fn slice(&self, len: usize) -> Option<&'a str> {
        if self.pos + len > self.chars.len() {
            return None;
        }
        let from = self.chars[self.pos].0;
        let to = self
            .chars
            .get(self.pos + len)
            .map_or(self.source.len(), |&(i, _)| i);
        Some(&self.source[from..to])
    }

    /// Template offset of the character at `index` (or the end of input).
    fn offset(&self, index: usize) -> usize {
        self.base + self.chars.get(index).map_or(self.source.len(), |&(i, _)| i)
    }

    fn eat_digits(&mut self) {
        while self.current_is(|c| c.is_ascii_digit()) {
            self.advance();
        }
    }

    fn current(&self) -> char {
        self.chars[self.pos].1
    }

    fn current_is(&self, pred: impl Fn(char) -> bool) -> bool {
        !self.is_at_end() && pred(self.current())
    }

    fn check(&self, expected: char) -> bool {
        self.current_is(|c| c == expected)
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos + 1).map(|&(_, c)| c)
    }

    fn advance(&mut self) {
        self.pos += 1;
    }

    fn is_at_end(&self) -> bool {
        self.pos >= self.chars.len()
    }

    fn skip_whitespace(&mut self) {
        while self.current_is(char::is_whitespace) {
            self.advance();
        }
    }
}

fn is_identifier_start(c: char) -> bool {
    c.is_alphabetic() || c == '_' || c == '$'
}

fn is_identifier_part(c: char) -> bool {
    is_identifier_start(c) || c.is_ascii_digit()
}

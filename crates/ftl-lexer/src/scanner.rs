use crate::token::{Fragment, Params, Span, Token, TokenKind, COMMENT_CLOSE, COMMENT_OPEN};
use crate::{LexerError, LexerErrorKind};

/// Markup introduced by one of the start symbols.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Markup {
    Comment,
    DirectiveClose,
    DirectiveOpen,
    MacroClose,
    MacroOpen,
    Interpolation,
}

/// Start symbols in probe order. At a given position the first match wins,
/// so `<#--` beats `<#` and closing forms beat their opening prefixes.
const START_SYMBOLS: &[(&str, Markup)] = &[
    (COMMENT_OPEN, Markup::Comment),
    ("</#", Markup::DirectiveClose),
    ("<#", Markup::DirectiveOpen),
    ("</@", Markup::MacroClose),
    ("<@", Markup::MacroOpen),
    ("${", Markup::Interpolation),
];

const TAG_END: &[&str] = &["/>", ">"];
const INTERPOLATION_END: &[&str] = &["}"];

/// FreeMarker markup scanner.
///
/// Walks the source once, splitting it into text and markup tokens.
/// Parameter regions are scanned with a string toggle and a bracket depth
/// counter so that `>` inside `(a > b)` or `"a>b"` does not end the tag.
///
/// Works on bytes: every delimiter is ASCII, so slices taken at delimiter
/// positions always fall on char boundaries.
pub struct Scanner<'a> {
    source: &'a str,
    bytes: &'a [u8],
    pos: usize,
    tokens: Vec<Token>,
}

impl<'a> Scanner<'a> {
    /// Create a new scanner for the given source.
    pub fn new(source: &'a str) -> Self {
        Self {
            source,
            bytes: source.as_bytes(),
            pos: 0,
            tokens: Vec::new(),
        }
    }

    /// Tokenize the entire source into a vector of tokens.
    pub fn tokenize(source: &str) -> Result<Vec<Token>, LexerError> {
        let mut scanner = Scanner::new(source);
        scanner.scan_tokens()?;
        tracing::debug!(tokens = scanner.tokens.len(), bytes = source.len(), "tokenized template");
        Ok(scanner.tokens)
    }

    fn scan_tokens(&mut self) -> Result<(), LexerError> {
        while !self.is_at_end() {
            match self.find_markup() {
                Some((at, markup)) => {
                    if at > self.pos {
                        self.push_text(at);
                    }
                    self.scan_markup(markup)?;
                }
                None => self.push_text(self.bytes.len()),
            }
        }
        Ok(())
    }

    /// Find the nearest start symbol at or after the cursor.
    fn find_markup(&self) -> Option<(usize, Markup)> {
        (self.pos..self.bytes.len())
            .filter(|&at| matches!(self.bytes[at], b'<' | b'$'))
            .find_map(|at| {
                START_SYMBOLS
                    .iter()
                    .find(|(symbol, _)| self.bytes[at..].starts_with(symbol.as_bytes()))
                    .map(|&(_, markup)| (at, markup))
            })
    }

    fn scan_markup(&mut self, markup: Markup) -> Result<(), LexerError> {
        match markup {
            Markup::Comment => self.scan_comment(),
            Markup::DirectiveClose => self.scan_tag(TokenKind::Directive, "</#", true),
            Markup::DirectiveOpen => self.scan_tag(TokenKind::Directive, "<#", false),
            Markup::MacroClose => self.scan_tag(TokenKind::Macro, "</@", true),
            Markup::MacroOpen => self.scan_tag(TokenKind::Macro, "<@", false),
            Markup::Interpolation => self.scan_interpolation(),
        }
    }

    // --- Scanners ---

    fn push_text(&mut self, end: usize) {
        let span = Span::new(self.pos, end);
        let token = Token::text(&self.source[self.pos..end], span);
        self.pos = end;
        self.push(token);
    }

    /// Scan `<#-- ... -->`. Comments do not nest.
    fn scan_comment(&mut self) -> Result<(), LexerError> {
        let start = self.pos;
        let body_start = start + COMMENT_OPEN.len();

        let Some(offset) = self.source[body_start..].find(COMMENT_CLOSE) else {
            return Err(LexerError::new(
                LexerErrorKind::UnclosedComment,
                "unclosed comment",
                Span::new(start, self.bytes.len()),
            ));
        };

        self.pos = body_start + offset + COMMENT_CLOSE.len();
        let token = self.markup_token(TokenKind::Comment, start, None, None, false, false);
        self.push(token);
        Ok(())
    }

    /// Scan a directive or macro tag starting at the cursor.
    fn scan_tag(&mut self, kind: TokenKind, opener: &str, is_closing: bool) -> Result<(), LexerError> {
        let start = self.pos;
        self.pos += opener.len();

        let name_start = self.pos;
        while !self.is_at_end() && !self.peek().is_ascii_whitespace() && !self.at_any(TAG_END) {
            self.advance();
        }
        let name = self.source[name_start..self.pos].to_string();

        if self.is_at_end() {
            return Err(self.unclosed(start, &format!("{opener}{name}")));
        }

        let (params, end_marker) = match self.match_any(TAG_END) {
            Some(marker) => {
                self.pos += marker.len();
                (None, marker)
            }
            None => self
                .scan_params(TAG_END)
                .map_err(|e| e.unwrap_or_else(|| self.unclosed(start, &format!("{opener}{name}"))))?,
        };

        let self_closing = end_marker == "/>";
        let token = self.markup_token(kind, start, Some(name), params, is_closing, self_closing);
        self.push(token);
        Ok(())
    }

    /// Scan `${ ... }`.
    fn scan_interpolation(&mut self) -> Result<(), LexerError> {
        let start = self.pos;
        self.pos += 2;

        let (params, _) = self
            .scan_params(INTERPOLATION_END)
            .map_err(|e| e.unwrap_or_else(|| self.unclosed(start, "${")))?;

        let token = self.markup_token(TokenKind::Interpolation, start, None, params, false, false);
        self.push(token);
        Ok(())
    }

    /// Scan a parameter region up to the first end marker at bracket depth 0
    /// outside a string, consuming the marker.
    ///
    /// Errors with `Some` for a hard error found in the region and `None` when
    /// input ran out, so the caller can report the unclosed tag at its start.
    fn scan_params(
        &mut self,
        end_markers: &'static [&'static str],
    ) -> Result<(Option<Params>, &'static str), Option<LexerError>> {
        let mut fragments = Vec::new();
        let mut fragment_start: Option<usize> = None;
        let mut quote: Option<u8> = None;
        let mut depth: usize = 0;

        while !self.is_at_end() {
            let ch = self.peek();

            if let Some(q) = quote {
                if ch == b'\\' {
                    self.advance();
                } else if ch == q {
                    quote = None;
                }
                self.advance();
                continue;
            }

            if depth == 0 {
                if let Some(marker) = self.match_any(end_markers) {
                    self.close_fragment(&mut fragment_start, &mut fragments);
                    self.pos += marker.len();
                    return Ok((Self::params_from(self.source, fragments), marker));
                }
                if ch.is_ascii_whitespace() {
                    self.close_fragment(&mut fragment_start, &mut fragments);
                    self.advance();
                    continue;
                }
            }

            match ch {
                b'"' | b'\'' => quote = Some(ch),
                b'(' | b'[' | b'{' => depth += 1,
                b')' | b']' | b'}' => {
                    depth = depth.checked_sub(1).ok_or_else(|| {
                        Some(LexerError::new(
                            LexerErrorKind::BracketUnderflow,
                            "bracket level < 0",
                            Span::new(self.pos, self.pos + 1),
                        ))
                    })?;
                }
                _ => {}
            }

            fragment_start.get_or_insert(self.pos);
            self.advance();
        }

        Err(None)
    }

    fn close_fragment(&self, fragment_start: &mut Option<usize>, fragments: &mut Vec<Fragment>) {
        if let Some(start) = fragment_start.take() {
            fragments.push(Fragment {
                text: self.source[start..self.pos].to_string(),
                span: Span::new(start, self.pos),
            });
        }
    }

    fn params_from(source: &str, fragments: Vec<Fragment>) -> Option<Params> {
        let span = Span::new(fragments.first()?.span.start, fragments.last()?.span.end);
        Some(Params {
            text: source[span.start..span.end].to_string(),
            span,
            fragments,
        })
    }

    // --- Helpers ---

    fn markup_token(
        &self,
        kind: TokenKind,
        start: usize,
        tag: Option<String>,
        params: Option<Params>,
        is_closing: bool,
        self_closing: bool,
    ) -> Token {
        Token {
            kind,
            span: Span::new(start, self.pos),
            raw: self.source[start..self.pos].to_string(),
            tag,
            params,
            is_closing,
            self_closing,
        }
    }

    fn push(&mut self, token: Token) {
        tracing::trace!(kind = ?token.kind, start = token.span.start, end = token.span.end, "token");
        self.tokens.push(token);
    }

    fn unclosed(&self, start: usize, what: &str) -> LexerError {
        LexerError::new(
            LexerErrorKind::UnclosedTag,
            format!("unclosed tag: `{what}` is never terminated"),
            Span::new(start, self.bytes.len()),
        )
    }

    fn match_any(&self, markers: &'static [&'static str]) -> Option<&'static str> {
        markers
            .iter()
            .copied()
            .find(|m| self.bytes[self.pos..].starts_with(m.as_bytes()))
    }

    fn at_any(&self, markers: &'static [&'static str]) -> bool {
        self.match_any(markers).is_some()
    }

    fn peek(&self) -> u8 {
        self.bytes[self.pos]
    }

    fn advance(&mut self) {
        if !self.is_at_end() {
            self.pos += 1;
        }
    }

    fn is_at_end(&self) -> bool {
        self.pos >= self.bytes.len()
    }
}

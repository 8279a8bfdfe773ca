use serde::Serialize;

/// A byte range in template source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

impl Span {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    /// True when `other` lies entirely inside this span.
    pub fn contains(&self, other: Span) -> bool {
        self.start <= other.start && other.end <= self.end
    }
}

/// Token classification for template markup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum TokenKind {
    /// Literal output text between markup.
    Text,
    /// `<#-- ... -->`
    Comment,
    /// `<#name ...>`, `</#name>`, `<#name .../>`
    Directive,
    /// `<@name ...>`, `</@name>`, `<@name .../>`
    Macro,
    /// `${ ... }`
    Interpolation,
}

/// One whitespace-delimited piece of a parameter region.
///
/// Bracketed groups and string literals are opaque: `a(b c)` is a single
/// fragment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Fragment {
    pub text: String,
    #[serde(flatten)]
    pub span: Span,
}

/// The raw parameter text of a tag or interpolation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Params {
    /// Source slice from the first fragment start to the last fragment end.
    pub text: String,
    #[serde(flatten)]
    pub span: Span,
    pub fragments: Vec<Fragment>,
}

/// A token produced by the markup scanner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Token {
    pub kind: TokenKind,
    #[serde(flatten)]
    pub span: Span,
    /// Exact source slice covered by this token.
    pub raw: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tag: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Params>,
    pub is_closing: bool,
    pub self_closing: bool,
}

impl Token {
    pub fn text(raw: &str, span: Span) -> Self {
        Self {
            kind: TokenKind::Text,
            span,
            raw: raw.to_string(),
            tag: None,
            params: None,
            is_closing: false,
            self_closing: false,
        }
    }

    /// Text between `<#--` and `-->` for comment tokens.
    pub fn comment_body(&self) -> Option<&str> {
        if self.kind != TokenKind::Comment {
            return None;
        }
        self.raw
            .strip_prefix(COMMENT_OPEN)
            .and_then(|rest| rest.strip_suffix(COMMENT_CLOSE))
    }

    /// Parameter text, if the token has any.
    pub fn param_text(&self) -> Option<&str> {
        self.params.as_ref().map(|p| p.text.as_str())
    }
}

pub const COMMENT_OPEN: &str = "<#--";
pub const COMMENT_CLOSE: &str = "-->";

//! Directive name table and per-kind structural rules.
//!
//! Every question the builder asks about a node kind (does it take a body,
//! does it need parameters, is it a branch of an enclosing directive) is
//! answered here by an exhaustive `match`, so adding a kind forces every rule
//! to be revisited.

use std::collections::HashMap;

use ftl_lexer::{Token, TokenKind};
use once_cell::sync::Lazy;

/// Every node kind the builder can produce or track on its stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeKind {
    Program,
    Text,
    Comment,
    Interpolation,
    Condition,
    ConditionElse,
    Else,
    List,
    Attempt,
    Recover,
    Switch,
    SwitchCase,
    SwitchDefault,
    Break,
    Assign,
    Global,
    Local,
    Macro,
    MacroCall,
    Function,
    Return,
    Include,
    Import,
    Escape,
    NoEscape,
    Compress,
    OutputFormat,
    Setting,
    Flush,
    Stop,
    Nested,
    Lt,
    Rt,
    Nt,
    T,
}

/// Whether a kind's tag must, may or must not carry parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamRule {
    Required,
    Optional,
    Forbidden,
}

static DIRECTIVES: Lazy<HashMap<&'static str, NodeKind>> = Lazy::new(|| {
    HashMap::from([
        ("if", NodeKind::Condition),
        ("elseif", NodeKind::ConditionElse),
        ("else", NodeKind::Else),
        ("list", NodeKind::List),
        ("attempt", NodeKind::Attempt),
        ("recover", NodeKind::Recover),
        ("switch", NodeKind::Switch),
        ("case", NodeKind::SwitchCase),
        ("default", NodeKind::SwitchDefault),
        ("break", NodeKind::Break),
        ("assign", NodeKind::Assign),
        ("global", NodeKind::Global),
        ("local", NodeKind::Local),
        ("macro", NodeKind::Macro),
        ("function", NodeKind::Function),
        ("return", NodeKind::Return),
        ("include", NodeKind::Include),
        ("import", NodeKind::Import),
        ("escape", NodeKind::Escape),
        ("noescape", NodeKind::NoEscape),
        ("compress", NodeKind::Compress),
        ("outputformat", NodeKind::OutputFormat),
        ("setting", NodeKind::Setting),
        ("flush", NodeKind::Flush),
        ("stop", NodeKind::Stop),
        ("nested", NodeKind::Nested),
        ("lt", NodeKind::Lt),
        ("rt", NodeKind::Rt),
        ("nt", NodeKind::Nt),
        ("t", NodeKind::T),
    ])
});

/// Look up a directive by its tag name (`if`, `list`, ...).
pub fn lookup(name: &str) -> Option<NodeKind> {
    DIRECTIVES.get(name).copied()
}

impl NodeKind {
    /// The kind a token maps to, or `None` for an unknown directive name.
    pub fn of_token(token: &Token) -> Option<Self> {
        match token.kind {
            TokenKind::Text => Some(NodeKind::Text),
            TokenKind::Comment => Some(NodeKind::Comment),
            TokenKind::Interpolation => Some(NodeKind::Interpolation),
            TokenKind::Macro => Some(NodeKind::MacroCall),
            TokenKind::Directive => token.tag.as_deref().and_then(lookup),
        }
    }

    /// Whether an opening tag of this kind starts a child list that stays
    /// open until its close tag. Assign-like kinds open one only in their
    /// capture form.
    pub fn has_body(self) -> bool {
        match self {
            NodeKind::Program
            | NodeKind::Condition
            | NodeKind::ConditionElse
            | NodeKind::Else
            | NodeKind::List
            | NodeKind::Attempt
            | NodeKind::Recover
            | NodeKind::Switch
            | NodeKind::SwitchCase
            | NodeKind::SwitchDefault
            | NodeKind::Macro
            | NodeKind::MacroCall
            | NodeKind::Function
            | NodeKind::Escape
            | NodeKind::NoEscape
            | NodeKind::Compress
            | NodeKind::OutputFormat => true,
            NodeKind::Text
            | NodeKind::Comment
            | NodeKind::Interpolation
            | NodeKind::Break
            | NodeKind::Assign
            | NodeKind::Global
            | NodeKind::Local
            | NodeKind::Return
            | NodeKind::Include
            | NodeKind::Import
            | NodeKind::Setting
            | NodeKind::Flush
            | NodeKind::Stop
            | NodeKind::Nested
            | NodeKind::Lt
            | NodeKind::Rt
            | NodeKind::Nt
            | NodeKind::T => false,
        }
    }

    pub fn is_assign_like(self) -> bool {
        matches!(self, NodeKind::Assign | NodeKind::Global | NodeKind::Local)
    }

    /// Branch tags that continue an enclosing directive rather than open a
    /// node of their own.
    pub fn is_continuation(self) -> bool {
        matches!(
            self,
            NodeKind::ConditionElse
                | NodeKind::Else
                | NodeKind::Recover
                | NodeKind::SwitchCase
                | NodeKind::SwitchDefault
        )
    }

    pub fn param_rule(self) -> ParamRule {
        match self {
            NodeKind::Interpolation
            | NodeKind::Condition
            | NodeKind::ConditionElse
            | NodeKind::List
            | NodeKind::Switch
            | NodeKind::SwitchCase
            | NodeKind::Assign
            | NodeKind::Global
            | NodeKind::Local
            | NodeKind::Macro
            | NodeKind::Function
            | NodeKind::Include
            | NodeKind::Import
            | NodeKind::Escape
            | NodeKind::OutputFormat
            | NodeKind::Setting => ParamRule::Required,
            NodeKind::MacroCall | NodeKind::Return | NodeKind::Stop | NodeKind::Nested => {
                ParamRule::Optional
            }
            NodeKind::Program
            | NodeKind::Text
            | NodeKind::Comment
            | NodeKind::Else
            | NodeKind::Attempt
            | NodeKind::Recover
            | NodeKind::SwitchDefault
            | NodeKind::Break
            | NodeKind::NoEscape
            | NodeKind::Compress
            | NodeKind::Flush
            | NodeKind::Lt
            | NodeKind::Rt
            | NodeKind::Nt
            | NodeKind::T => ParamRule::Forbidden,
        }
    }

    /// The tag name used in messages, e.g. `if` for `Condition`.
    pub fn directive_name(self) -> &'static str {
        match self {
            NodeKind::Program => "program",
            NodeKind::Text => "text",
            NodeKind::Comment => "comment",
            NodeKind::Interpolation => "interpolation",
            NodeKind::Condition => "if",
            NodeKind::ConditionElse => "elseif",
            NodeKind::Else => "else",
            NodeKind::List => "list",
            NodeKind::Attempt => "attempt",
            NodeKind::Recover => "recover",
            NodeKind::Switch => "switch",
            NodeKind::SwitchCase => "case",
            NodeKind::SwitchDefault => "default",
            NodeKind::Break => "break",
            NodeKind::Assign => "assign",
            NodeKind::Global => "global",
            NodeKind::Local => "local",
            NodeKind::Macro => "macro",
            NodeKind::MacroCall => "macro call",
            NodeKind::Function => "function",
            NodeKind::Return => "return",
            NodeKind::Include => "include",
            NodeKind::Import => "import",
            NodeKind::Escape => "escape",
            NodeKind::NoEscape => "noescape",
            NodeKind::Compress => "compress",
            NodeKind::OutputFormat => "outputformat",
            NodeKind::Setting => "setting",
            NodeKind::Flush => "flush",
            NodeKind::Stop => "stop",
            NodeKind::Nested => "nested",
            NodeKind::Lt => "lt",
            NodeKind::Rt => "rt",
            NodeKind::Nt => "nt",
            NodeKind::T => "t",
        }
    }
}

//! Abstract Syntax Tree for FreeMarker templates.
//!
//! Contains both template-level nodes (directives, text, interpolations)
//! and expression-level nodes (literals, member access, operators).
//!
//! Every type serializes with a stable field order and omits absent optional
//! fields, so JSON output of identical input is byte-identical.

use ftl_lexer::Span;
use serde::Serialize;

use crate::StructuralError;

// ---------------------------------------------------------------------------
// Template-level AST
// ---------------------------------------------------------------------------

/// The root of a parsed template.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Program {
    #[serde(flatten)]
    pub span: Span,
    pub body: Vec<Node>,
    /// Structural problems found while assembling the tree.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<StructuralError>,
}

impl Program {
    pub fn new(span: Span) -> Self {
        Self {
            span,
            body: Vec::new(),
            errors: Vec::new(),
        }
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }
}

/// A node in the template tree.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type")]
pub enum Node {
    /// Literal output text.
    Text(Text),
    /// `<#-- ... -->`; `text` holds the comment body.
    Comment(Text),
    /// `${expr}`
    Interpolation(Interpolation),
    /// `<#if>` and each chained `<#elseif>` branch.
    Condition(Condition),
    /// `<#else>` branch of a condition.
    Else(Else),
    /// `<#list seq as item>`
    List(List),
    /// `<#attempt>` / `<#recover>`
    Attempt(Attempt),
    /// `<#switch value>`
    Switch(Switch),
    /// `<#case value>`
    SwitchCase(SwitchCase),
    /// `<#default>`
    SwitchDefault(SwitchDefault),
    Assign(Assign),
    Global(Assign),
    Local(Assign),
    Macro(Callable),
    Function(Callable),
    /// `<@name ...>` user-defined directive call.
    MacroCall(MacroCall),
    Escape(Block),
    NoEscape(Block),
    Compress(Block),
    OutputFormat(Block),
    Include(Directive),
    Import(Directive),
    Break(Directive),
    Return(Directive),
    Setting(Directive),
    Flush(Directive),
    Stop(Directive),
    Nested(Directive),
    Lt(Directive),
    Rt(Directive),
    Nt(Directive),
    T(Directive),
}

impl Node {
    pub fn span(&self) -> Span {
        match self {
            Node::Text(n) | Node::Comment(n) => n.span,
            Node::Interpolation(n) => n.span,
            Node::Condition(n) => n.span,
            Node::Else(n) => n.span,
            Node::List(n) => n.span,
            Node::Attempt(n) => n.span,
            Node::Switch(n) => n.span,
            Node::SwitchCase(n) => n.span,
            Node::SwitchDefault(n) => n.span,
            Node::Assign(n) | Node::Global(n) | Node::Local(n) => n.span,
            Node::Macro(n) | Node::Function(n) => n.span,
            Node::MacroCall(n) => n.span,
            Node::Escape(n) | Node::NoEscape(n) | Node::Compress(n) | Node::OutputFormat(n) => {
                n.span
            }
            Node::Include(n)
            | Node::Import(n)
            | Node::Break(n)
            | Node::Return(n)
            | Node::Setting(n)
            | Node::Flush(n)
            | Node::Stop(n)
            | Node::Nested(n)
            | Node::Lt(n)
            | Node::Rt(n)
            | Node::Nt(n)
            | Node::T(n) => n.span,
        }
    }

    pub fn span_mut(&mut self) -> &mut Span {
        match self {
            Node::Text(n) | Node::Comment(n) => &mut n.span,
            Node::Interpolation(n) => &mut n.span,
            Node::Condition(n) => &mut n.span,
            Node::Else(n) => &mut n.span,
            Node::List(n) => &mut n.span,
            Node::Attempt(n) => &mut n.span,
            Node::Switch(n) => &mut n.span,
            Node::SwitchCase(n) => &mut n.span,
            Node::SwitchDefault(n) => &mut n.span,
            Node::Assign(n) | Node::Global(n) | Node::Local(n) => &mut n.span,
            Node::Macro(n) | Node::Function(n) => &mut n.span,
            Node::MacroCall(n) => &mut n.span,
            Node::Escape(n) | Node::NoEscape(n) | Node::Compress(n) | Node::OutputFormat(n) => {
                &mut n.span
            }
            Node::Include(n)
            | Node::Import(n)
            | Node::Break(n)
            | Node::Return(n)
            | Node::Setting(n)
            | Node::Flush(n)
            | Node::Stop(n)
            | Node::Nested(n)
            | Node::Lt(n)
            | Node::Rt(n)
            | Node::Nt(n)
            | Node::T(n) => &mut n.span,
        }
    }

    /// Child nodes in source order, across every slot.
    pub fn children(&self) -> Vec<&Node> {
        match self {
            Node::Condition(n) => n
                .consequent
                .iter()
                .chain(n.alternate.iter().flatten())
                .collect(),
            Node::Else(n) => n.body.iter().collect(),
            Node::List(n) => n.body.iter().chain(n.fallback.iter().flatten()).collect(),
            Node::Attempt(n) => n.body.iter().chain(n.fallback.iter().flatten()).collect(),
            Node::Switch(n) => n.cases.iter().collect(),
            Node::SwitchCase(n) => n.consequent.iter().collect(),
            Node::SwitchDefault(n) => n.consequent.iter().collect(),
            Node::Assign(n) | Node::Global(n) | Node::Local(n) => {
                n.body.iter().flatten().collect()
            }
            Node::Macro(n) | Node::Function(n) => n.body.iter().collect(),
            Node::MacroCall(n) => n.body.iter().flatten().collect(),
            Node::Escape(n) | Node::NoEscape(n) | Node::Compress(n) | Node::OutputFormat(n) => {
                n.body.iter().collect()
            }
            _ => Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Text {
    #[serde(flatten)]
    pub span: Span,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Interpolation {
    #[serde(flatten)]
    pub span: Span,
    pub params: Expression,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Condition {
    #[serde(flatten)]
    pub span: Span,
    pub params: Expression,
    pub consequent: Vec<Node>,
    /// `[Condition]` for an `elseif` chain, `[Else]` for a plain `else`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alternate: Option<Vec<Node>>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Else {
    #[serde(flatten)]
    pub span: Span,
    pub body: Vec<Node>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct List {
    #[serde(flatten)]
    pub span: Span,
    pub params: Expression,
    pub body: Vec<Node>,
    /// Content of the `<#else>` branch, rendered for empty sequences.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fallback: Option<Vec<Node>>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Attempt {
    #[serde(flatten)]
    pub span: Span,
    pub body: Vec<Node>,
    /// Content of the `<#recover>` branch.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fallback: Option<Vec<Node>>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Switch {
    #[serde(flatten)]
    pub span: Span,
    pub params: Expression,
    /// `SwitchCase` and `SwitchDefault` nodes in source order.
    pub cases: Vec<Node>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SwitchCase {
    #[serde(flatten)]
    pub span: Span,
    pub params: Expression,
    pub consequent: Vec<Node>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SwitchDefault {
    #[serde(flatten)]
    pub span: Span,
    pub consequent: Vec<Node>,
}

/// `<#assign>`, `<#global>` and `<#local>`.
///
/// `body` is present only for the capture form (`<#assign x>...</#assign>`).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Assign {
    #[serde(flatten)]
    pub span: Span,
    pub params: Expression,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<Vec<Node>>,
}

/// `<#macro>` and `<#function>` definitions.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Callable {
    #[serde(flatten)]
    pub span: Span,
    pub name: String,
    /// Declared parameters after the name, e.g. `a` or `b = 1`.
    pub params: Vec<Expression>,
    pub body: Vec<Node>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MacroCall {
    #[serde(flatten)]
    pub span: Span,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Expression>,
    /// Nested content; absent for `<@name/>`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<Vec<Node>>,
}

/// A directive that wraps a body, such as `<#compress>`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Block {
    #[serde(flatten)]
    pub span: Span,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Expression>,
    pub body: Vec<Node>,
}

/// A directive complete in a single tag, such as `<#include>` or `<#break>`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Directive {
    #[serde(flatten)]
    pub span: Span,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Expression>,
}

// ---------------------------------------------------------------------------
// Expression-level AST
// ---------------------------------------------------------------------------

/// A complete expression node. Spans are offsets into the template source.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Expression {
    #[serde(flatten)]
    pub kind: ExprKind,
    #[serde(flatten)]
    pub span: Span,
}

impl Expression {
    pub fn new(kind: ExprKind, span: Span) -> Self {
        Self { kind, span }
    }

    /// The top-level items: the body of a `Compound`, or the expression itself.
    pub fn items(&self) -> &[Expression] {
        match &self.kind {
            ExprKind::Compound { body } => body,
            _ => std::slice::from_ref(self),
        }
    }

    /// The name of a plain identifier.
    pub fn as_identifier(&self) -> Option<&str> {
        match &self.kind {
            ExprKind::Identifier { name } => Some(name),
            _ => None,
        }
    }

    pub fn is_identifier(&self, expected: &str) -> bool {
        self.as_identifier() == Some(expected)
    }
}

/// Expression variants.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type")]
pub enum ExprKind {
    /// `42`, `1.5e3`, `"text"`, `true`, `null`
    Literal { value: LiteralValue, raw: String },

    /// `user`, `item_count`
    Identifier { name: String },

    /// `user.name` (`computed: false`) or `items[0]` (`computed: true`)
    #[serde(rename = "MemberExpression")]
    Member {
        object: Box<Expression>,
        property: Box<Expression>,
        computed: bool,
    },

    /// `format(price, "0.00")`
    #[serde(rename = "CallExpression")]
    Call {
        callee: Box<Expression>,
        arguments: Vec<Expression>,
    },

    /// `[1, 2, 3]`
    #[serde(rename = "ArrayExpression")]
    Array { elements: Vec<Expression> },

    /// `{"a": 1, "b": 2}`
    #[serde(rename = "MapExpression")]
    Map { entries: Vec<MapEntry> },

    /// `!done`, `-count`
    #[serde(rename = "UnaryExpression")]
    Unary {
        operator: UnaryOp,
        argument: Box<Expression>,
    },

    /// `++i`, `i--`
    #[serde(rename = "UpdateExpression")]
    Update {
        operator: UpdateOp,
        argument: Box<Expression>,
        prefix: bool,
    },

    /// `a + b`, `count > 0`
    #[serde(rename = "BinaryExpression")]
    Binary {
        operator: BinaryOp,
        left: Box<Expression>,
        right: Box<Expression>,
    },

    /// `a && b`, `a || b`
    #[serde(rename = "LogicalExpression")]
    Logical {
        operator: LogicalOp,
        left: Box<Expression>,
        right: Box<Expression>,
    },

    /// `x = 1`, `total += price`
    #[serde(rename = "AssignmentExpression")]
    Assignment {
        operator: AssignOp,
        left: Box<Expression>,
        right: Box<Expression>,
    },

    /// `name?upper_case`, `price?string("0.00")`
    #[serde(rename = "BuiltInExpression")]
    BuiltIn {
        left: Box<Expression>,
        right: Box<Expression>,
    },

    /// Several top-level expressions: `users as user`, `a = 1, b = 2`.
    Compound { body: Vec<Expression> },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum LiteralValue {
    Number(f64),
    String(String),
    Boolean(bool),
    Null,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MapEntry {
    pub key: Expression,
    pub value: Expression,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum BinaryOp {
    #[serde(rename = "+")]
    Add,
    #[serde(rename = "-")]
    Sub,
    #[serde(rename = "*")]
    Mul,
    #[serde(rename = "/")]
    Div,
    #[serde(rename = "%")]
    Mod,
    #[serde(rename = "==")]
    Eq,
    #[serde(rename = "!=")]
    Neq,
    #[serde(rename = "<")]
    Lt,
    #[serde(rename = ">")]
    Gt,
    #[serde(rename = "<=")]
    Lte,
    #[serde(rename = ">=")]
    Gte,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum LogicalOp {
    #[serde(rename = "&&")]
    And,
    #[serde(rename = "||")]
    Or,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum AssignOp {
    #[serde(rename = "=")]
    Assign,
    #[serde(rename = "+=")]
    AddAssign,
    #[serde(rename = "-=")]
    SubAssign,
    #[serde(rename = "*=")]
    MulAssign,
    #[serde(rename = "/=")]
    DivAssign,
    #[serde(rename = "%=")]
    ModAssign,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum UnaryOp {
    #[serde(rename = "!")]
    Not,
    #[serde(rename = "-")]
    Neg,
    #[serde(rename = "+")]
    Plus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum UpdateOp {
    #[serde(rename = "++")]
    Increment,
    #[serde(rename = "--")]
    Decrement,
}

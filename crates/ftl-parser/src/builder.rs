//! Tree builder for FreeMarker templates.
//!
//! Consumes the flat token stream from `ftl-lexer` and assembles the nested
//! `Program` tree. Open container directives live on an explicit stack; the
//! top of the stack (or the program itself when the stack is empty) is the
//! node that receives the next child.
//!
//! Structural problems (a stray close tag, a misplaced `<#else>`, malformed
//! directive parameters) are recorded on `Program::errors` and the offending
//! token is dropped; the stack is left as it was. Only expression errors
//! abort the build.

use ftl_lexer::{Span, Token, TokenKind};

use crate::ast::{
    Assign, AssignOp, Attempt, Block, Callable, Condition, Directive, Else, ExprKind, Expression,
    Interpolation, List, LiteralValue, MacroCall, Node, Program, Switch, SwitchCase,
    SwitchDefault, Text,
};
use crate::directive::{NodeKind, ParamRule};
use crate::expr_parser::ExprParser;
use crate::{ExprError, ParseError, StructuralError};

/// A container node that is still receiving children.
#[derive(Debug)]
struct OpenNode {
    kind: NodeKind,
    node: Node,
    /// An `<#elseif>` branch; it closes together with its `<#if>`.
    chained: bool,
}

/// Stack-based tree builder.
pub struct Builder {
    program: Program,
    stack: Vec<OpenNode>,
    /// A single-tag directive waiting to see whether its own close tag
    /// follows immediately (`<#break></#break>`).
    pending: Option<(NodeKind, Node)>,
}

impl Builder {
    pub fn new(source_len: usize) -> Self {
        Self {
            program: Program::new(Span::new(0, source_len)),
            stack: Vec::new(),
            pending: None,
        }
    }

    /// Build a program from a complete token stream.
    pub fn build(tokens: &[Token], source_len: usize) -> Result<Program, ParseError> {
        let mut builder = Builder::new(source_len);
        for token in tokens {
            builder.push_token(token)?;
        }
        let program = builder.finish();
        tracing::debug!(
            nodes = program.body.len(),
            errors = program.errors.len(),
            "built template tree"
        );
        Ok(program)
    }

    /// Feed one token. Only malformed parameter expressions are fatal.
    pub fn push_token(&mut self, token: &Token) -> Result<(), ExprError> {
        let kind = NodeKind::of_token(token);

        if let Some((pending_kind, mut node)) = self.pending.take() {
            if token.is_closing && token.kind == TokenKind::Directive && kind == Some(pending_kind) {
                node.span_mut().end = token.span.end;
                self.add(node);
                return Ok(());
            }
            self.add(node);
        }

        let Some(kind) = kind else {
            self.error(format!("directive not supported: `{}`", tag_label(token)), token.span);
            return Ok(());
        };

        if token.is_closing {
            self.close(kind, token);
            return Ok(());
        }

        let params = match &token.params {
            Some(p) if kind != NodeKind::Text && kind != NodeKind::Comment => {
                ExprParser::parse_at(&p.text, p.span.start)?
            }
            _ => None,
        };

        match (kind.param_rule(), &params) {
            (ParamRule::Required, None) => {
                self.error(format!("`{}` requires parameters", tag_label(token)), token.span);
                return Ok(());
            }
            (ParamRule::Forbidden, Some(_)) => {
                self.error(
                    format!("`{}` does not take parameters", tag_label(token)),
                    token.span,
                );
                return Ok(());
            }
            _ => {}
        }

        if !self.accepts_before_first_case(kind, token) {
            return Ok(());
        }

        if kind.is_continuation() {
            self.continue_branch(kind, token, params);
            return Ok(());
        }

        match construct(kind, token, params) {
            Ok((node, opens)) => {
                if opens && !token.self_closing {
                    self.stack.push(OpenNode {
                        kind,
                        node,
                        chained: false,
                    });
                } else if token.kind == TokenKind::Directive
                    && !token.self_closing
                    && !kind.is_assign_like()
                {
                    self.pending = Some((kind, node));
                } else {
                    self.add(node);
                }
            }
            Err(message) => self.error(message, token.span),
        }
        Ok(())
    }

    /// Close everything left open and return the program.
    pub fn finish(mut self) -> Program {
        if let Some((_, node)) = self.pending.take() {
            self.add(node);
        }

        let end = self.program.span.end;
        if let Some(open) = self.stack.iter().rev().find(|o| !o.chained) {
            let message = format!("unclosed tag `{}`", open_label(open));
            let span = open.node.span();
            self.error(message, span);
        }

        while let Some(mut open) = self.stack.pop() {
            close_branches(&mut open.node, end);
            open.node.span_mut().end = end;
            self.attach(open);
        }
        self.program
    }

    // =========================================================================
    // Closing
    // =========================================================================

    fn close(&mut self, kind: NodeKind, token: &Token) {
        let Some(top) = self.stack.last() else {
            self.error(format!("unexpected close tag `{}`", tag_label(token)), token.span);
            return;
        };

        // An elseif branch is closed only by the `</#if>` of its chain.
        let kind_matches = if top.chained {
            kind == NodeKind::Condition
        } else {
            top.kind == kind
        };
        let name_matches = match (&top.node, token.tag.as_deref()) {
            (Node::MacroCall(call), Some(name)) => name.is_empty() || call.name == name,
            _ => true,
        };
        if !kind_matches || !name_matches {
            let message = format!(
                "unexpected close tag `{}`, expected `{}`",
                tag_label(token),
                close_label(top)
            );
            self.error(message, token.span);
            return;
        }

        while self.stack.last().is_some_and(|o| o.chained) {
            self.pop(token.span.start, token.span.start);
        }
        self.pop(token.span.start, token.span.end);
    }

    /// Pop the top node, end its open branch at `branch_end` and the node
    /// itself at `end`, then hand it to its parent.
    fn pop(&mut self, branch_end: usize, end: usize) {
        let Some(mut open) = self.stack.pop() else {
            return;
        };
        close_branches(&mut open.node, branch_end);
        open.node.span_mut().end = end;

        if let Node::Attempt(attempt) = &open.node {
            if attempt.fallback.is_none() {
                self.error("`<#attempt>` requires a `<#recover>` branch", attempt.span);
            }
        }
        self.attach(open);
    }

    fn attach(&mut self, open: OpenNode) {
        if open.chained {
            if let Some(OpenNode {
                node: Node::Condition(parent),
                ..
            }) = self.stack.last_mut()
            {
                parent.alternate = Some(vec![open.node]);
                return;
            }
        }
        self.add(open.node);
    }

    /// Append a finished node to the active child slot.
    fn add(&mut self, node: Node) {
        match self.stack.last_mut() {
            Some(open) => match child_slot(&mut open.node) {
                Some(slot) => slot.push(node),
                None => debug_assert!(false, "open {:?} has no child slot", open.kind),
            },
            None => self.program.body.push(node),
        }
    }

    // =========================================================================
    // Branches
    // =========================================================================

    /// Only `<#case>` and `<#default>` may follow `<#switch>` directly;
    /// whitespace there is dropped silently.
    fn accepts_before_first_case(&mut self, kind: NodeKind, token: &Token) -> bool {
        let Some(OpenNode {
            node: Node::Switch(switch),
            ..
        }) = self.stack.last()
        else {
            return true;
        };
        if !switch.cases.is_empty()
            || matches!(kind, NodeKind::SwitchCase | NodeKind::SwitchDefault)
        {
            return true;
        }
        if kind == NodeKind::Text && token.raw.trim().is_empty() {
            return false;
        }
        self.error(
            "unexpected content in `<#switch>` before the first `<#case>`",
            token.span,
        );
        false
    }

    fn continue_branch(&mut self, kind: NodeKind, token: &Token, params: Option<Expression>) {
        let parent = self.stack.last_mut().map(|o| &mut o.node);
        match open_branch(parent, kind, token, params) {
            Ok(Some(node)) => self.stack.push(OpenNode {
                kind,
                node,
                chained: true,
            }),
            Ok(None) => {}
            Err(message) => self.error(message, token.span),
        }
    }

    fn error(&mut self, message: impl Into<String>, span: Span) {
        let message = message.into();
        tracing::debug!(%message, start = span.start, end = span.end, "structural error");
        self.program.errors.push(StructuralError::new(message, span));
    }
}

/// Route a branch tag into the open directive. Returns the node to push
/// for `<#elseif>`.
fn open_branch(
    parent: Option<&mut Node>,
    kind: NodeKind,
    token: &Token,
    params: Option<Expression>,
) -> Result<Option<Node>, String> {
    let span = token.span;
    match (kind, parent) {
        (NodeKind::ConditionElse, Some(Node::Condition(condition))) => {
            if condition.alternate.is_some() {
                return Err("`<#elseif>` after `<#else>`".to_string());
            }
            Ok(Some(Node::Condition(Condition {
                span,
                params: required(params, kind)?,
                consequent: Vec::new(),
                alternate: None,
            })))
        }
        (NodeKind::Else, Some(Node::Condition(condition))) => {
            if condition.alternate.is_some() {
                return Err("duplicate `<#else>` in `<#if>`".to_string());
            }
            condition.alternate = Some(vec![Node::Else(Else {
                span,
                body: Vec::new(),
            })]);
            Ok(None)
        }
        (NodeKind::Else, Some(Node::List(list))) => {
            if list.fallback.is_some() {
                return Err("duplicate `<#else>` in `<#list>`".to_string());
            }
            list.fallback = Some(Vec::new());
            Ok(None)
        }
        (NodeKind::Recover, Some(Node::Attempt(attempt))) => {
            if attempt.fallback.is_some() {
                return Err("duplicate `<#recover>` in `<#attempt>`".to_string());
            }
            attempt.fallback = Some(Vec::new());
            Ok(None)
        }
        (NodeKind::SwitchCase, Some(Node::Switch(switch))) => {
            end_last_case(switch, span.start);
            switch.cases.push(Node::SwitchCase(SwitchCase {
                span,
                params: required(params, kind)?,
                consequent: Vec::new(),
            }));
            Ok(None)
        }
        (NodeKind::SwitchDefault, Some(Node::Switch(switch))) => {
            if switch
                .cases
                .iter()
                .any(|c| matches!(c, Node::SwitchDefault(_)))
            {
                return Err("duplicate `<#default>` in `<#switch>`".to_string());
            }
            end_last_case(switch, span.start);
            switch.cases.push(Node::SwitchDefault(SwitchDefault {
                span,
                consequent: Vec::new(),
            }));
            Ok(None)
        }
        _ => Err(format!("`{}` is not allowed here", tag_label(token))),
    }
}

/// The child list that currently receives content.
fn child_slot(node: &mut Node) -> Option<&mut Vec<Node>> {
    match node {
        Node::Condition(condition) => match &mut condition.alternate {
            None => Some(&mut condition.consequent),
            Some(alternate) => match alternate.last_mut() {
                Some(Node::Else(branch)) => Some(&mut branch.body),
                _ => None,
            },
        },
        Node::Else(branch) => Some(&mut branch.body),
        Node::List(list) => Some(list.fallback.as_mut().unwrap_or(&mut list.body)),
        Node::Attempt(attempt) => Some(attempt.fallback.as_mut().unwrap_or(&mut attempt.body)),
        Node::Switch(switch) => match switch.cases.last_mut() {
            Some(Node::SwitchCase(case)) => Some(&mut case.consequent),
            Some(Node::SwitchDefault(default)) => Some(&mut default.consequent),
            _ => None,
        },
        Node::SwitchCase(case) => Some(&mut case.consequent),
        Node::SwitchDefault(default) => Some(&mut default.consequent),
        Node::Assign(assign) | Node::Global(assign) | Node::Local(assign) => assign.body.as_mut(),
        Node::Macro(callable) | Node::Function(callable) => Some(&mut callable.body),
        Node::MacroCall(call) => call.body.as_mut(),
        Node::Escape(block) | Node::NoEscape(block) | Node::Compress(block) | Node::OutputFormat(block) => {
            Some(&mut block.body)
        }
        _ => None,
    }
}

/// End the branch that is still open (an `<#else>` or the last case) at `at`.
fn close_branches(node: &mut Node, at: usize) {
    match node {
        Node::Condition(condition) => {
            if let Some(Node::Else(branch)) = condition.alternate.as_mut().and_then(|a| a.last_mut()) {
                branch.span.end = at;
            }
        }
        Node::Switch(switch) => end_last_case(switch, at),
        _ => {}
    }
}

fn end_last_case(switch: &mut Switch, at: usize) {
    if let Some(case) = switch.cases.last_mut() {
        case.span_mut().end = at;
    }
}

// =============================================================================
// Node construction
// =============================================================================

/// Build the node for an opening tag. The flag says whether it opens a body.
fn construct(
    kind: NodeKind,
    token: &Token,
    params: Option<Expression>,
) -> Result<(Node, bool), String> {
    let span = token.span;

    let node = match kind {
        NodeKind::Text => Node::Text(Text {
            span,
            text: token.raw.clone(),
        }),
        NodeKind::Comment => Node::Comment(Text {
            span,
            text: token.comment_body().unwrap_or_default().to_string(),
        }),
        NodeKind::Interpolation => Node::Interpolation(Interpolation {
            span,
            params: required(params, kind)?,
        }),
        NodeKind::Condition => Node::Condition(Condition {
            span,
            params: required(params, kind)?,
            consequent: Vec::new(),
            alternate: None,
        }),
        NodeKind::List => {
            let params = required(params, kind)?;
            check_list(&params)?;
            Node::List(List {
                span,
                params,
                body: Vec::new(),
                fallback: None,
            })
        }
        NodeKind::Attempt => Node::Attempt(Attempt {
            span,
            body: Vec::new(),
            fallback: None,
        }),
        NodeKind::Switch => Node::Switch(Switch {
            span,
            params: required(params, kind)?,
            cases: Vec::new(),
        }),
        NodeKind::Assign | NodeKind::Global | NodeKind::Local => {
            let params = required(params, kind)?;
            let capture = check_assign(kind, &params)?;
            let assign = Assign {
                span,
                params,
                body: capture.then(Vec::new),
            };
            let node = match kind {
                NodeKind::Global => Node::Global(assign),
                NodeKind::Local => Node::Local(assign),
                _ => Node::Assign(assign),
            };
            return Ok((node, capture));
        }
        NodeKind::Macro | NodeKind::Function => {
            let definition = callable(kind, span, required(params, kind)?)?;
            if kind == NodeKind::Macro {
                Node::Macro(definition)
            } else {
                Node::Function(definition)
            }
        }
        NodeKind::MacroCall => Node::MacroCall(MacroCall {
            span,
            name: token.tag.clone().unwrap_or_default(),
            params,
            body: (!token.self_closing).then(Vec::new),
        }),
        NodeKind::Escape => {
            let params = required(params, kind)?;
            check_alias(kind, &params, "`<#escape>` expects `<name> as <expression>`")?;
            Node::Escape(block(span, Some(params)))
        }
        NodeKind::NoEscape => Node::NoEscape(block(span, None)),
        NodeKind::Compress => Node::Compress(block(span, None)),
        NodeKind::OutputFormat => {
            let params = required(params, kind)?;
            if !matches!(
                params.kind,
                ExprKind::Literal {
                    value: LiteralValue::String(_),
                    ..
                }
            ) {
                return Err("`<#outputformat>` expects a single string literal".to_string());
            }
            Node::OutputFormat(block(span, Some(params)))
        }
        NodeKind::Include => Node::Include(Directive { span, params }),
        NodeKind::Import => {
            let params = required(params, kind)?;
            check_alias(kind, &params, "`<#import>` expects `<path> as <namespace>`")?;
            Node::Import(Directive {
                span,
                params: Some(params),
            })
        }
        NodeKind::Setting => {
            let params = required(params, kind)?;
            check_setting(&params)?;
            Node::Setting(Directive {
                span,
                params: Some(params),
            })
        }
        NodeKind::Break => Node::Break(Directive { span, params }),
        NodeKind::Return => Node::Return(Directive { span, params }),
        NodeKind::Flush => Node::Flush(Directive { span, params }),
        NodeKind::Stop => Node::Stop(Directive { span, params }),
        NodeKind::Nested => Node::Nested(Directive { span, params }),
        NodeKind::Lt => Node::Lt(Directive { span, params }),
        NodeKind::Rt => Node::Rt(Directive { span, params }),
        NodeKind::Nt => Node::Nt(Directive { span, params }),
        NodeKind::T => Node::T(Directive { span, params }),
        NodeKind::Program
        | NodeKind::ConditionElse
        | NodeKind::Else
        | NodeKind::Recover
        | NodeKind::SwitchCase
        | NodeKind::SwitchDefault => {
            return Err(format!("`{}` is not allowed here", tag_label(token)));
        }
    };

    Ok((node, kind.has_body()))
}

fn block(span: Span, params: Option<Expression>) -> Block {
    Block {
        span,
        params,
        body: Vec::new(),
    }
}

fn required(params: Option<Expression>, kind: NodeKind) -> Result<Expression, String> {
    params.ok_or_else(|| format!("`<#{}>` requires parameters", kind.directive_name()))
}

/// `<sequence> as <name>` or `<map> as <key>, <value>`.
fn check_list(params: &Expression) -> Result<(), String> {
    let items = params.items();
    let well_formed = matches!(items.len(), 3 | 4)
        && items[1].is_identifier("as")
        && items[2..].iter().all(|item| item.as_identifier().is_some());
    if well_formed {
        Ok(())
    } else {
        Err("`<#list>` expects `<sequence> as <name>`".to_string())
    }
}

/// Validate an assign-like directive. Returns true for the capture form,
/// a single bare name whose value is the directive body.
fn check_assign(kind: NodeKind, params: &Expression) -> Result<bool, String> {
    let mut items = params.items();
    // Trailing `in <namespace>`.
    if items.len() >= 3 && items[items.len() - 2].is_identifier("in") {
        items = &items[..items.len() - 2];
    }

    if let [only] = items {
        if only.as_identifier().is_some() {
            return Ok(true);
        }
    }

    let assignments = items.iter().all(|item| {
        matches!(
            item.kind,
            ExprKind::Assignment { .. } | ExprKind::Update { .. }
        )
    });
    if assignments && !items.is_empty() {
        Ok(false)
    } else {
        Err(format!(
            "`<#{}>` expects assignments such as `x = 1`",
            kind.directive_name()
        ))
    }
}

/// `<subject> as <alias>` where only the shape is checked.
fn check_alias(kind: NodeKind, params: &Expression, message: &str) -> Result<(), String> {
    let items = params.items();
    let well_formed = items.len() == 3 && items[1].is_identifier("as");
    let alias_ok = match kind {
        NodeKind::Import => items.get(2).and_then(Expression::as_identifier).is_some(),
        _ => items.first().and_then(Expression::as_identifier).is_some(),
    };
    if well_formed && alias_ok {
        Ok(())
    } else {
        Err(message.to_string())
    }
}

fn check_setting(params: &Expression) -> Result<(), String> {
    match &params.kind {
        ExprKind::Assignment {
            operator: AssignOp::Assign,
            left,
            ..
        } if left.as_identifier().is_some() => Ok(()),
        _ => Err("`<#setting>` expects `name = value`".to_string()),
    }
}

/// Split `name param1 param2=default` (or `name(param1, param2)`) into the
/// callable's name and declared parameters.
fn callable(kind: NodeKind, span: Span, params: Expression) -> Result<Callable, String> {
    let mut items = match params.kind {
        ExprKind::Compound { body } => body,
        _ => vec![params],
    }
    .into_iter();

    let missing_name = || format!("`<#{}>` expects a name", kind.directive_name());
    let first = items.next().ok_or_else(missing_name)?;

    let (name, mut declared) = match first.kind {
        ExprKind::Identifier { name } => (name, Vec::new()),
        ExprKind::Call { callee, arguments } => match callee.kind {
            ExprKind::Identifier { name } => (name, arguments),
            _ => return Err(missing_name()),
        },
        _ => return Err(missing_name()),
    };
    declared.extend(items);

    Ok(Callable {
        span,
        name,
        params: declared,
        body: Vec::new(),
    })
}

// =============================================================================
// Labels for messages
// =============================================================================

fn tag_label(token: &Token) -> String {
    let tag = token.tag.as_deref().unwrap_or_default();
    match (token.kind, token.is_closing) {
        (TokenKind::Macro, true) => format!("</@{tag}>"),
        (TokenKind::Macro, false) => format!("<@{tag}>"),
        (TokenKind::Directive, true) => format!("</#{tag}>"),
        (TokenKind::Directive, false) => format!("<#{tag}>"),
        (TokenKind::Interpolation, _) => "${...}".to_string(),
        (TokenKind::Text, _) => "text".to_string(),
        (TokenKind::Comment, _) => "comment".to_string(),
    }
}

fn open_label(open: &OpenNode) -> String {
    match &open.node {
        Node::MacroCall(call) => format!("<@{}>", call.name),
        _ => format!("<#{}>", open.kind.directive_name()),
    }
}

fn close_label(open: &OpenNode) -> String {
    match &open.node {
        Node::MacroCall(call) => format!("</@{}>", call.name),
        _ if open.chained => "</#if>".to_string(),
        _ => format!("</#{}>", open.kind.directive_name()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::BinaryOp;
    use ftl_lexer::Scanner;
    use pretty_assertions::assert_eq;

    fn build(source: &str) -> Program {
        let tokens = Scanner::tokenize(source).unwrap();
        Builder::build(&tokens, source.len()).unwrap()
    }

    fn build_ok(source: &str) -> Program {
        let program = build(source);
        assert!(
            program.errors.is_empty(),
            "unexpected errors: {:?}",
            program.errors
        );
        program
    }

    fn messages(program: &Program) -> Vec<&str> {
        program.errors.iter().map(|e| e.message.as_str()).collect()
    }

    fn texts(nodes: &[Node]) -> Vec<&str> {
        nodes
            .iter()
            .filter_map(|n| match n {
                Node::Text(t) => Some(t.text.as_str()),
                _ => None,
            })
            .collect()
    }

    // =========================================================================
    // Leaves
    // =========================================================================

    #[test]
    fn test_text_comment_interpolation() {
        let program = build_ok("Hi <#-- note -->${name}!");
        assert_eq!(program.body.len(), 4);
        assert!(matches!(&program.body[0], Node::Text(t) if t.text == "Hi "));
        assert!(matches!(&program.body[1], Node::Comment(c) if c.text == " note "));
        match &program.body[2] {
            Node::Interpolation(i) => {
                assert!(i.params.is_identifier("name"));
                assert_eq!(i.span, Span::new(16, 23));
            }
            other => panic!("Expected interpolation, got {other:?}"),
        }
        assert_eq!(program.span, Span::new(0, 24));
    }

    #[test]
    fn test_empty_template() {
        let program = build_ok("");
        assert!(program.body.is_empty());
        assert_eq!(program.span, Span::new(0, 0));
    }

    #[test]
    fn test_empty_interpolation_is_error() {
        let program = build("${}");
        assert_eq!(messages(&program), vec!["`${...}` requires parameters"]);
        assert!(program.body.is_empty());
    }

    // =========================================================================
    // Conditions
    // =========================================================================

    #[test]
    fn test_condition_chain() {
        let program = build_ok("<#if x==1>A<#elseif x==2>B<#else>C</#if>");
        assert_eq!(program.body.len(), 1);
        let Node::Condition(outer) = &program.body[0] else {
            panic!("Expected condition");
        };
        assert_eq!(texts(&outer.consequent), vec!["A"]);
        assert_eq!(outer.span, Span::new(0, 40));

        let alternate = outer.alternate.as_ref().unwrap();
        assert_eq!(alternate.len(), 1);
        let Node::Condition(inner) = &alternate[0] else {
            panic!("Expected chained condition");
        };
        assert_eq!(texts(&inner.consequent), vec!["B"]);

        let else_branch = inner.alternate.as_ref().unwrap();
        let Node::Else(branch) = &else_branch[0] else {
            panic!("Expected else");
        };
        assert_eq!(texts(&branch.body), vec!["C"]);
        assert_eq!(branch.span, Span::new(26, 34));
        assert_eq!(inner.span, Span::new(11, 34));
    }

    #[test]
    fn test_condition_without_else() {
        let program = build_ok("<#if ok>yes</#if>");
        let Node::Condition(condition) = &program.body[0] else {
            panic!("Expected condition");
        };
        assert_eq!(condition.alternate, None);
        assert_eq!(texts(&condition.consequent), vec!["yes"]);
    }

    #[test]
    fn test_nested_conditions() {
        let program = build_ok("<#if a><#if b>x<#else>y</#if><#else>z</#if>");
        let Node::Condition(outer) = &program.body[0] else {
            panic!("Expected condition");
        };
        assert!(matches!(outer.consequent[0], Node::Condition(_)));
        let Some(Node::Else(branch)) = outer.alternate.as_ref().and_then(|a| a.first()) else {
            panic!("Expected else");
        };
        assert_eq!(texts(&branch.body), vec!["z"]);
    }

    #[test]
    fn test_duplicate_else() {
        let program = build("<#if a>1<#else>2<#else>3</#if>");
        assert_eq!(messages(&program), vec!["duplicate `<#else>` in `<#if>`"]);
        let Node::Condition(condition) = &program.body[0] else {
            panic!("Expected condition");
        };
        let Some(Node::Else(branch)) = condition.alternate.as_ref().and_then(|a| a.first()) else {
            panic!("Expected else");
        };
        assert_eq!(texts(&branch.body), vec!["2", "3"]);
    }

    #[test]
    fn test_elseif_after_else() {
        let program = build("<#if a>1<#else>2<#elseif b>3</#if>");
        assert_eq!(messages(&program), vec!["`<#elseif>` after `<#else>`"]);
    }

    #[test]
    fn test_elseif_close_tag_rejected() {
        let program = build("<#if a>1<#elseif b>2</#elseif>3</#if>");
        assert_eq!(
            messages(&program),
            vec!["unexpected close tag `</#elseif>`, expected `</#if>`"]
        );
        assert_eq!(program.errors[0].span.start, 20);
        assert_eq!(program.body.len(), 1);

        let Node::Condition(condition) = &program.body[0] else {
            panic!("Expected condition");
        };
        assert_eq!(condition.span, Span::new(0, 37));
        let Some([Node::Condition(branch)]) = condition.alternate.as_deref() else {
            panic!("Expected chained condition");
        };
        assert_eq!(texts(&branch.consequent), vec!["2", "3"]);
    }

    #[test]
    fn test_else_outside_container() {
        let program = build("a<#else>b");
        assert_eq!(messages(&program), vec!["`<#else>` is not allowed here"]);
        assert_eq!(texts(&program.body), vec!["a", "b"]);
    }

    #[test]
    fn test_condition_params_parsed() {
        let program = build_ok("<#if count gt 0>x</#if>");
        let Node::Condition(condition) = &program.body[0] else {
            panic!("Expected condition");
        };
        match &condition.params.kind {
            ExprKind::Binary { operator, .. } => assert_eq!(*operator, BinaryOp::Gt),
            other => panic!("Expected binary, got {other:?}"),
        }
        assert_eq!(condition.params.span, Span::new(5, 15));
    }

    // =========================================================================
    // Lists and attempts
    // =========================================================================

    #[test]
    fn test_list_with_fallback() {
        let program = build_ok("<#list [] as x>${x}<#else>empty</#list>");
        let Node::List(list) = &program.body[0] else {
            panic!("Expected list");
        };
        assert_eq!(list.body.len(), 1);
        assert!(matches!(list.body[0], Node::Interpolation(_)));
        assert_eq!(texts(list.fallback.as_ref().unwrap()), vec!["empty"]);
    }

    #[test]
    fn test_list_key_value_form() {
        let program = build_ok("<#list prices as name, price>${name}</#list>");
        let Node::List(list) = &program.body[0] else {
            panic!("Expected list");
        };
        assert_eq!(list.params.items().len(), 4);
        assert_eq!(list.fallback, None);
    }

    #[test]
    fn test_list_without_as_is_error() {
        let program = build("<#list users>x</#list>");
        assert_eq!(
            messages(&program),
            vec![
                "`<#list>` expects `<sequence> as <name>`",
                "unexpected close tag `</#list>`",
            ]
        );
    }

    #[test]
    fn test_attempt_recover() {
        let program = build_ok("<#attempt>risky<#recover>safe</#attempt>");
        let Node::Attempt(attempt) = &program.body[0] else {
            panic!("Expected attempt");
        };
        assert_eq!(texts(&attempt.body), vec!["risky"]);
        assert_eq!(texts(attempt.fallback.as_ref().unwrap()), vec!["safe"]);
    }

    #[test]
    fn test_attempt_without_recover() {
        let program = build("<#attempt>risky</#attempt>");
        assert_eq!(
            messages(&program),
            vec!["`<#attempt>` requires a `<#recover>` branch"]
        );
        assert_eq!(program.body.len(), 1);
    }

    #[test]
    fn test_duplicate_recover() {
        let program = build("<#attempt>a<#recover>b<#recover>c</#attempt>");
        assert_eq!(
            messages(&program),
            vec!["duplicate `<#recover>` in `<#attempt>`"]
        );
    }

    // =========================================================================
    // Switch
    // =========================================================================

    #[test]
    fn test_switch_cases() {
        let source = "<#switch x>\n  <#case 1>one<#break>\n  <#default>other\n</#switch>";
        let program = build_ok(source);
        let Node::Switch(switch) = &program.body[0] else {
            panic!("Expected switch");
        };
        assert_eq!(switch.cases.len(), 2);
        let Node::SwitchCase(case) = &switch.cases[0] else {
            panic!("Expected case");
        };
        assert_eq!(texts(&case.consequent), vec!["one", "\n  "]);
        assert!(matches!(case.consequent[1], Node::Break(_)));
        let Node::SwitchDefault(default) = &switch.cases[1] else {
            panic!("Expected default");
        };
        assert_eq!(texts(&default.consequent), vec!["other\n"]);
        assert_eq!(case.span.end, switch.cases[1].span().start);
        assert_eq!(default.span.end, source.len() - "</#switch>".len());
    }

    #[test]
    fn test_switch_rejects_content_before_case() {
        let program = build("<#switch x>oops<#case 1>one</#switch>");
        assert_eq!(
            messages(&program),
            vec!["unexpected content in `<#switch>` before the first `<#case>`"]
        );
        let Node::Switch(switch) = &program.body[0] else {
            panic!("Expected switch");
        };
        assert_eq!(switch.cases.len(), 1);
    }

    #[test]
    fn test_switch_duplicate_default() {
        let program = build("<#switch x><#default>a<#default>b</#switch>");
        assert_eq!(
            messages(&program),
            vec!["duplicate `<#default>` in `<#switch>`"]
        );
    }

    #[test]
    fn test_case_outside_switch() {
        let program = build("<#case 1>");
        assert_eq!(messages(&program), vec!["`<#case>` is not allowed here"]);
    }

    // =========================================================================
    // Assignments and definitions
    // =========================================================================

    #[test]
    fn test_assign_single_line() {
        let program = build_ok("<#assign x = 1, y = x + 1><#global z++>");
        assert_eq!(program.body.len(), 2);
        match &program.body[0] {
            Node::Assign(assign) => {
                assert_eq!(assign.params.items().len(), 2);
                assert_eq!(assign.body, None);
            }
            other => panic!("Expected assign, got {other:?}"),
        }
        assert!(matches!(program.body[1], Node::Global(_)));
    }

    #[test]
    fn test_assign_capture_form() {
        let program = build_ok("<#local greeting>Hello ${name}</#local>");
        let Node::Local(assign) = &program.body[0] else {
            panic!("Expected local");
        };
        let body = assign.body.as_ref().unwrap();
        assert_eq!(body.len(), 2);
        assert_eq!(assign.span, Span::new(0, 39));
    }

    #[test]
    fn test_single_line_assign_inside_capture() {
        let program = build_ok("<#assign page><#assign x = 1>${x}</#assign>");
        let Node::Assign(outer) = &program.body[0] else {
            panic!("Expected assign");
        };
        let body = outer.body.as_ref().unwrap();
        assert_eq!(body.len(), 2);
        assert!(matches!(&body[0], Node::Assign(inner) if inner.body.is_none()));
    }

    #[test]
    fn test_assign_in_namespace() {
        let program = build_ok("<#assign x = 1 in ns>");
        assert!(matches!(program.body[0], Node::Assign(_)));
    }

    #[test]
    fn test_assign_rejects_plain_expression() {
        let program = build("<#assign 1 + 2>");
        assert_eq!(
            messages(&program),
            vec!["`<#assign>` expects assignments such as `x = 1`"]
        );
        assert!(program.body.is_empty());
    }

    #[test]
    fn test_macro_definition() {
        let program = build_ok("<#macro greet name greeting=\"Hi\">${greeting} ${name}</#macro>");
        let Node::Macro(callable) = &program.body[0] else {
            panic!("Expected macro");
        };
        assert_eq!(callable.name, "greet");
        assert_eq!(callable.params.len(), 2);
        assert_eq!(callable.body.len(), 3);
    }

    #[test]
    fn test_function_definition() {
        let program = build_ok("<#function avg(x, y)><#return (x + y) / 2></#function>");
        let Node::Function(callable) = &program.body[0] else {
            panic!("Expected function");
        };
        assert_eq!(callable.name, "avg");
        assert_eq!(callable.params.len(), 2);
        assert!(matches!(callable.body[0], Node::Return(_)));
    }

    #[test]
    fn test_macro_requires_name() {
        let program = build("<#macro \"x\"></#macro>");
        assert_eq!(messages(&program)[0], "`<#macro>` expects a name");
    }

    // =========================================================================
    // Macro calls
    // =========================================================================

    #[test]
    fn test_macro_call_with_body() {
        let program = build_ok("<@card title=\"Hi\">content</@card>");
        let Node::MacroCall(call) = &program.body[0] else {
            panic!("Expected macro call");
        };
        assert_eq!(call.name, "card");
        assert!(call.params.is_some());
        assert_eq!(texts(call.body.as_ref().unwrap()), vec!["content"]);
    }

    #[test]
    fn test_macro_call_self_closed() {
        let program = build_ok("<@icon name=\"x\"/>");
        let Node::MacroCall(call) = &program.body[0] else {
            panic!("Expected macro call");
        };
        assert_eq!(call.body, None);
    }

    #[test]
    fn test_macro_call_anonymous_close() {
        let program = build_ok("<@card>x</@>");
        assert!(matches!(program.body[0], Node::MacroCall(_)));
    }

    #[test]
    fn test_macro_call_name_mismatch() {
        let program = build("<@card>x</@panel></@card>");
        assert_eq!(
            messages(&program),
            vec!["unexpected close tag `</@panel>`, expected `</@card>`"]
        );
        assert_eq!(program.body.len(), 1);
    }

    // =========================================================================
    // Other directives
    // =========================================================================

    #[test]
    fn test_block_directives() {
        let program = build_ok(
            "<#compress> a </#compress><#escape x as x?html>e</#escape><#outputformat \"HTML\">o</#outputformat>",
        );
        assert!(matches!(program.body[0], Node::Compress(_)));
        assert!(matches!(program.body[1], Node::Escape(_)));
        assert!(matches!(program.body[2], Node::OutputFormat(_)));
    }

    #[test]
    fn test_outputformat_requires_string() {
        let program = build("<#outputformat html></#outputformat>");
        assert_eq!(
            messages(&program)[0],
            "`<#outputformat>` expects a single string literal"
        );
    }

    #[test]
    fn test_include_import_setting() {
        let program = build_ok(
            "<#include \"header.ftl\"><#import \"lib.ftl\" as lib><#setting locale=\"en_US\">",
        );
        assert!(matches!(program.body[0], Node::Include(_)));
        assert!(matches!(program.body[1], Node::Import(_)));
        assert!(matches!(program.body[2], Node::Setting(_)));
    }

    #[test]
    fn test_import_requires_namespace() {
        let program = build("<#import \"lib.ftl\">");
        assert_eq!(
            messages(&program),
            vec!["`<#import>` expects `<path> as <namespace>`"]
        );
    }

    #[test]
    fn test_missing_required_params() {
        let program = build("<#if>x</#if>");
        assert_eq!(
            messages(&program),
            vec!["`<#if>` requires parameters", "unexpected close tag `</#if>`"]
        );
    }

    #[test]
    fn test_forbidden_params() {
        let program = build("<#break now>");
        assert_eq!(messages(&program), vec!["`<#break>` does not take parameters"]);
    }

    #[test]
    fn test_unknown_directive() {
        let program = build("a<#foo bar>b");
        assert_eq!(messages(&program), vec!["directive not supported: `<#foo>`"]);
        assert_eq!(texts(&program.body), vec!["a", "b"]);
    }

    // =========================================================================
    // Closing and recovery
    // =========================================================================

    #[test]
    fn test_self_closing_equivalence() {
        let short = build_ok("<#flush/>");
        let long = build_ok("<#flush></#flush>");
        assert_eq!(short.body.len(), 1);
        assert_eq!(long.body.len(), 1);
        let mut short_node = short.body[0].clone();
        short_node.span_mut().end = long.body[0].span().end;
        assert_eq!(short_node, long.body[0]);
        assert_eq!(long.body[0].span(), Span::new(0, 17));
    }

    #[test]
    fn test_self_closed_body_directive() {
        let program = build_ok("<#compress/>after");
        assert_eq!(program.body.len(), 2);
        match &program.body[0] {
            Node::Compress(block) => assert!(block.body.is_empty()),
            other => panic!("Expected compress, got {other:?}"),
        }
    }

    #[test]
    fn test_unexpected_close_tag() {
        let program = build("a</#if>b");
        assert_eq!(messages(&program), vec!["unexpected close tag `</#if>`"]);
        assert_eq!(program.errors[0].span, Span::new(1, 7));
        assert_eq!(texts(&program.body), vec!["a", "b"]);
    }

    #[test]
    fn test_mismatched_close_keeps_stack() {
        let program = build("<#if a><#list xs as x>y</#if></#list></#if>");
        assert_eq!(
            messages(&program),
            vec!["unexpected close tag `</#if>`, expected `</#list>`"]
        );
        let Node::Condition(condition) = &program.body[0] else {
            panic!("Expected condition");
        };
        assert!(matches!(condition.consequent[0], Node::List(_)));
    }

    #[test]
    fn test_unclosed_at_end_of_input() {
        let program = build("<#if a><#list xs as x>y");
        assert_eq!(messages(&program), vec!["unclosed tag `<#list>`"]);
        assert_eq!(program.errors[0].span, Span::new(7, 22));
        let Node::Condition(condition) = &program.body[0] else {
            panic!("Expected condition");
        };
        assert_eq!(condition.span, Span::new(0, 23));
        assert!(matches!(condition.consequent[0], Node::List(_)));
    }

    #[test]
    fn test_unclosed_chain_names_if() {
        let program = build("<#if a>x<#elseif b>y");
        assert_eq!(messages(&program), vec!["unclosed tag `<#if>`"]);
        let Node::Condition(condition) = &program.body[0] else {
            panic!("Expected condition");
        };
        assert!(condition.alternate.is_some());
    }

    #[test]
    fn test_spans_nest() {
        fn check(node: &Node) {
            let span = node.span();
            let mut previous_end = span.start;
            for child in node.children() {
                let child_span = child.span();
                assert!(span.contains(child_span), "{child:?} escapes {node:?}");
                assert!(child_span.start >= previous_end, "{child:?} overlaps a sibling");
                previous_end = child_span.end;
                check(child);
            }
        }
        let program = build_ok(
            "<#if a>1<#elseif b>2<#else>3</#if><#switch x><#case 1>a<#default>b</#switch><#list xs as x>${x}<#else>none</#list>",
        );
        for node in &program.body {
            assert!(program.span.contains(node.span()));
            check(node);
        }
    }
}

//! Expression parser for FreeMarker.
//!
//! Parses expression token streams (from `expr_lexer`) into `Expression` AST
//! nodes. Unary operators, primaries and postfix chains are handled by
//! recursive descent; binary operators use precedence climbing over an
//! explicit operand/operator stack.

use ftl_lexer::Span;

use crate::ast::{
    AssignOp, BinaryOp, ExprKind, Expression, LiteralValue, LogicalOp, MapEntry, UnaryOp,
    UpdateOp,
};
use crate::expr_lexer::{ExprLexer, Token, TokenKind, TokenValue};
use crate::ExprError;

/// An operator that joins two operands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum InfixOp {
    Assign(AssignOp),
    Logical(LogicalOp),
    Binary(BinaryOp),
    BuiltIn,
}

impl InfixOp {
    /// Binding power; higher binds tighter.
    fn precedence(self) -> u8 {
        match self {
            InfixOp::Assign(_) => 1,
            InfixOp::Logical(LogicalOp::Or) => 2,
            InfixOp::Logical(LogicalOp::And) => 3,
            InfixOp::Binary(BinaryOp::Eq | BinaryOp::Neq) => 4,
            InfixOp::Binary(BinaryOp::Lt | BinaryOp::Gt | BinaryOp::Lte | BinaryOp::Gte) => 5,
            InfixOp::Binary(BinaryOp::Add | BinaryOp::Sub) => 6,
            InfixOp::Binary(BinaryOp::Mul | BinaryOp::Div | BinaryOp::Mod) => 7,
            InfixOp::BuiltIn => 8,
        }
    }

    fn is_right_associative(self) -> bool {
        matches!(self, InfixOp::Assign(_))
    }

    /// Whether an operator already on the stack must be reduced before
    /// `self` is pushed.
    fn yields_to(self, top: InfixOp) -> bool {
        if self.is_right_associative() {
            self.precedence() < top.precedence()
        } else {
            self.precedence() <= top.precedence()
        }
    }

    fn from_token(token: &Token) -> Option<Self> {
        let op = match token.kind {
            TokenKind::Eq => InfixOp::Assign(AssignOp::Assign),
            TokenKind::PlusEq => InfixOp::Assign(AssignOp::AddAssign),
            TokenKind::MinusEq => InfixOp::Assign(AssignOp::SubAssign),
            TokenKind::StarEq => InfixOp::Assign(AssignOp::MulAssign),
            TokenKind::SlashEq => InfixOp::Assign(AssignOp::DivAssign),
            TokenKind::PercentEq => InfixOp::Assign(AssignOp::ModAssign),
            TokenKind::Or => InfixOp::Logical(LogicalOp::Or),
            TokenKind::And => InfixOp::Logical(LogicalOp::And),
            TokenKind::EqEq => InfixOp::Binary(BinaryOp::Eq),
            TokenKind::NotEq => InfixOp::Binary(BinaryOp::Neq),
            TokenKind::Lt => InfixOp::Binary(BinaryOp::Lt),
            TokenKind::Gt => InfixOp::Binary(BinaryOp::Gt),
            TokenKind::Lte => InfixOp::Binary(BinaryOp::Lte),
            TokenKind::Gte => InfixOp::Binary(BinaryOp::Gte),
            TokenKind::Plus => InfixOp::Binary(BinaryOp::Add),
            TokenKind::Minus => InfixOp::Binary(BinaryOp::Sub),
            TokenKind::Star => InfixOp::Binary(BinaryOp::Mul),
            TokenKind::Slash => InfixOp::Binary(BinaryOp::Div),
            TokenKind::Percent => InfixOp::Binary(BinaryOp::Mod),
            TokenKind::Question => InfixOp::BuiltIn,
            // Word comparisons avoid `>` ending the tag.
            TokenKind::Identifier => match &token.value {
                TokenValue::Identifier(word) => match word.as_str() {
                    "lt" => InfixOp::Binary(BinaryOp::Lt),
                    "lte" => InfixOp::Binary(BinaryOp::Lte),
                    "gt" => InfixOp::Binary(BinaryOp::Gt),
                    "gte" => InfixOp::Binary(BinaryOp::Gte),
                    _ => return None,
                },
                _ => return None,
            },
            _ => return None,
        };
        Some(op)
    }

    fn combine(self, left: Expression, right: Expression) -> Result<Expression, ExprError> {
        let span = Span::new(left.span.start, right.span.end);
        let kind = match self {
            InfixOp::Assign(operator) => {
                if !is_assignable(&left) {
                    return Err(ExprError::new("Invalid assignment target", left.span));
                }
                ExprKind::Assignment {
                    operator,
                    left: Box::new(left),
                    right: Box::new(right),
                }
            }
            InfixOp::Logical(operator) => ExprKind::Logical {
                operator,
                left: Box::new(left),
                right: Box::new(right),
            },
            InfixOp::Binary(operator) => ExprKind::Binary {
                operator,
                left: Box::new(left),
                right: Box::new(right),
            },
            InfixOp::BuiltIn => ExprKind::BuiltIn {
                left: Box::new(left),
                right: Box::new(right),
            },
        };
        Ok(Expression::new(kind, span))
    }
}

/// FreeMarker expression parser.
///
/// Converts a flat token stream into a tree of `Expression` nodes.
pub struct ExprParser<'a> {
    source: &'a str,
    base: usize,
    tokens: Vec<Token>,
    pos: usize,
}

impl<'a> ExprParser<'a> {
    /// Create a parser over already-lexed tokens of `source`, whose first
    /// byte sits at template offset `base`.
    pub fn new(source: &'a str, base: usize, tokens: Vec<Token>) -> Self {
        Self {
            source,
            base,
            tokens,
            pos: 0,
        }
    }

    /// Parse a parameter string. `Ok(None)` means the input was blank.
    pub fn parse(source: &str) -> Result<Option<Expression>, ExprError> {
        Self::parse_at(source, 0)
    }

    /// Parse a parameter string that starts at template offset `base`.
    pub fn parse_at(source: &str, base: usize) -> Result<Option<Expression>, ExprError> {
        let tokens = ExprLexer::tokenize_at(source, base)?;
        ExprParser::new(source, base, tokens).parse_compound()
    }

    /// Top level: expressions separated by `;`, `,` or whitespace.
    fn parse_compound(&mut self) -> Result<Option<Expression>, ExprError> {
        let mut body = Vec::new();

        while !self.check(TokenKind::Eof) {
            if self.check(TokenKind::Semicolon) || self.check(TokenKind::Comma) {
                self.advance();
                continue;
            }
            body.push(self.parse_expression()?);
        }

        match body.len() {
            0 => Ok(None),
            1 => Ok(body.pop()),
            _ => {
                let span = Span::new(body[0].span.start, body[body.len() - 1].span.end);
                Ok(Some(Expression::new(ExprKind::Compound { body }, span)))
            }
        }
    }

    /// A full expression including binary operators.
    pub fn parse_expression(&mut self) -> Result<Expression, ExprError> {
        let left = self.parse_unary()?;
        let Some(first) = self.peek_infix() else {
            return Ok(left);
        };
        self.advance();
        let right = self.parse_operand(first)?;

        let mut operands = vec![left, right];
        let mut operators = vec![first];

        while let Some(op) = self.peek_infix() {
            while let Some(&top) = operators.last() {
                if !op.yields_to(top) {
                    break;
                }
                Self::reduce(&mut operands, &mut operators)?;
            }
            self.advance();
            operands.push(self.parse_operand(op)?);
            operators.push(op);
        }

        while !operators.is_empty() {
            Self::reduce(&mut operands, &mut operators)?;
        }

        operands
            .pop()
            .ok_or_else(|| ExprError::new("Empty expression", self.current_span()))
    }

    /// Pop `left op right` off the stacks and push the combined node.
    fn reduce(operands: &mut Vec<Expression>, operators: &mut Vec<InfixOp>) -> Result<(), ExprError> {
        let (Some(op), Some(right), Some(left)) = (operators.pop(), operands.pop(), operands.pop())
        else {
            debug_assert!(false, "operator stack outran operand stack");
            return Ok(());
        };
        operands.push(op.combine(left, right)?);
        Ok(())
    }

    /// The right-hand side of a binary operator.
    fn parse_operand(&mut self, op: InfixOp) -> Result<Expression, ExprError> {
        if self.check(TokenKind::Eof) {
            let at = self.tokens[self.pos.saturating_sub(1)].span;
            return Err(ExprError::new(
                format!("Expected expression after {}", describe(op)),
                at,
            ));
        }
        self.parse_unary()
    }

    /// Prefix operators, then a primary with its postfix chain.
    fn parse_unary(&mut self) -> Result<Expression, ExprError> {
        let token = self.peek().clone();

        let unary = match token.kind {
            TokenKind::Not => Some(UnaryOp::Not),
            TokenKind::Minus => Some(UnaryOp::Neg),
            TokenKind::Plus => Some(UnaryOp::Plus),
            _ => None,
        };
        if let Some(operator) = unary {
            self.advance();
            let argument = self.parse_unary()?;
            let span = Span::new(token.span.start, argument.span.end);
            return Ok(Expression::new(
                ExprKind::Unary {
                    operator,
                    argument: Box::new(argument),
                },
                span,
            ));
        }

        let update = match token.kind {
            TokenKind::PlusPlus => Some(UpdateOp::Increment),
            TokenKind::MinusMinus => Some(UpdateOp::Decrement),
            _ => None,
        };
        if let Some(operator) = update {
            self.advance();
            let argument = self.parse_unary()?;
            let span = Span::new(token.span.start, argument.span.end);
            return Self::update(operator, argument, true, span);
        }

        self.parse_postfix()
    }

    /// Member access, indexing, calls and postfix `++`/`--`.
    fn parse_postfix(&mut self) -> Result<Expression, ExprError> {
        let mut expr = self.parse_primary()?;

        loop {
            match self.peek().kind {
                TokenKind::Dot => {
                    self.advance();
                    let property = self.parse_property_name()?;
                    let span = Span::new(expr.span.start, property.span.end);
                    expr = Expression::new(
                        ExprKind::Member {
                            object: Box::new(expr),
                            property: Box::new(property),
                            computed: false,
                        },
                        span,
                    );
                }
                TokenKind::LBracket => {
                    let open = self.peek().span;
                    self.advance();
                    let property = self.parse_expression()?;
                    let close = self.expect_closing(TokenKind::RBracket, "[", open)?;
                    let span = Span::new(expr.span.start, close.end);
                    expr = Expression::new(
                        ExprKind::Member {
                            object: Box::new(expr),
                            property: Box::new(property),
                            computed: true,
                        },
                        span,
                    );
                }
                TokenKind::LParen => {
                    let open = self.peek().span;
                    self.advance();
                    let (arguments, close) = self.parse_list(TokenKind::RParen, "(", open)?;
                    let span = Span::new(expr.span.start, close.end);
                    expr = Expression::new(
                        ExprKind::Call {
                            callee: Box::new(expr),
                            arguments,
                        },
                        span,
                    );
                }
                TokenKind::PlusPlus | TokenKind::MinusMinus => {
                    let token = self.peek().clone();
                    self.advance();
                    let operator = if token.kind == TokenKind::PlusPlus {
                        UpdateOp::Increment
                    } else {
                        UpdateOp::Decrement
                    };
                    let span = Span::new(expr.span.start, token.span.end);
                    expr = Self::update(operator, expr, false, span)?;
                }
                _ => return Ok(expr),
            }
        }
    }

    fn parse_primary(&mut self) -> Result<Expression, ExprError> {
        let token = self.peek().clone();

        match (token.kind, token.value) {
            (TokenKind::Number, TokenValue::Number(n)) => {
                self.advance();
                Ok(self.literal(LiteralValue::Number(n), token.span))
            }
            (TokenKind::String, TokenValue::String(s)) => {
                self.advance();
                Ok(self.literal(LiteralValue::String(s), token.span))
            }
            (TokenKind::Identifier, TokenValue::Identifier(name)) => {
                self.advance();
                let value = match name.as_str() {
                    "true" => LiteralValue::Boolean(true),
                    "false" => LiteralValue::Boolean(false),
                    "null" => LiteralValue::Null,
                    _ => return Ok(Expression::new(ExprKind::Identifier { name }, token.span)),
                };
                Ok(self.literal(value, token.span))
            }
            (TokenKind::LBracket, _) => {
                self.advance();
                let (elements, close) = self.parse_list(TokenKind::RBracket, "[", token.span)?;
                Ok(Expression::new(
                    ExprKind::Array { elements },
                    Span::new(token.span.start, close.end),
                ))
            }
            (TokenKind::LBrace, _) => {
                self.advance();
                self.parse_map(token.span)
            }
            (TokenKind::LParen, _) => {
                self.advance();
                let inner = self.parse_expression()?;
                self.expect_closing(TokenKind::RParen, "(", token.span)?;
                Ok(inner)
            }
            (TokenKind::Eof, _) => Err(ExprError::new("Unexpected end of expression", token.span)),
            _ => Err(ExprError::new(
                format!("Unexpected \"{}\"", self.text(token.span)),
                token.span,
            )),
        }
    }

    /// `{key: value, ...}`; the opening brace is already consumed.
    fn parse_map(&mut self, open: Span) -> Result<Expression, ExprError> {
        let mut entries = Vec::new();

        if self.check(TokenKind::RBrace) {
            let close = self.peek().span;
            self.advance();
            return Ok(Expression::new(
                ExprKind::Map { entries },
                Span::new(open.start, close.end),
            ));
        }

        loop {
            let key = self.parse_expression()?;
            if !self.check(TokenKind::Colon) {
                return Err(self.unclosed_or("Expected \":\" after map key", "{", open));
            }
            self.advance();
            let value = self.parse_expression()?;
            entries.push(MapEntry { key, value });

            match self.peek().kind {
                TokenKind::Comma => self.advance(),
                TokenKind::RBrace => {
                    let close = self.peek().span;
                    self.advance();
                    return Ok(Expression::new(
                        ExprKind::Map { entries },
                        Span::new(open.start, close.end),
                    ));
                }
                _ => return Err(self.unclosed_or("Expected \",\" or \"}\"", "{", open)),
            }
        }
    }

    /// Comma-separated expressions up to `close`; the opener is consumed.
    fn parse_list(
        &mut self,
        close: TokenKind,
        opener: &str,
        open: Span,
    ) -> Result<(Vec<Expression>, Span), ExprError> {
        let mut items = Vec::new();

        loop {
            if self.check(close) {
                let span = self.peek().span;
                self.advance();
                return Ok((items, span));
            }
            if self.check(TokenKind::Eof) {
                return Err(ExprError::new(format!("Unclosed \"{opener}\""), open));
            }

            items.push(self.parse_expression()?);

            if self.check(TokenKind::Comma) {
                self.advance();
            } else if !self.check(close) {
                let expected = format!("Expected \",\" or closing bracket for \"{opener}\"");
                return Err(self.unclosed_or(&expected, opener, open));
            }
        }
    }

    fn parse_property_name(&mut self) -> Result<Expression, ExprError> {
        let token = self.peek().clone();
        match (token.kind, token.value) {
            (TokenKind::Identifier, TokenValue::Identifier(name)) => {
                self.advance();
                Ok(Expression::new(ExprKind::Identifier { name }, token.span))
            }
            _ => Err(ExprError::new("Expected property name after \".\"", token.span)),
        }
    }

    // =========================================================================
    // Helpers
    // =========================================================================

    fn update(
        operator: UpdateOp,
        argument: Expression,
        prefix: bool,
        span: Span,
    ) -> Result<Expression, ExprError> {
        if !is_assignable(&argument) {
            return Err(ExprError::new("Invalid update target", argument.span));
        }
        Ok(Expression::new(
            ExprKind::Update {
                operator,
                argument: Box::new(argument),
                prefix,
            },
            span,
        ))
    }

    fn literal(&self, value: LiteralValue, span: Span) -> Expression {
        Expression::new(
            ExprKind::Literal {
                value,
                raw: self.text(span).to_string(),
            },
            span,
        )
    }

    fn expect_closing(&mut self, kind: TokenKind, opener: &str, open: Span) -> Result<Span, ExprError> {
        if self.check(kind) {
            let span = self.peek().span;
            self.advance();
            Ok(span)
        } else {
            Err(self.unclosed_or(&format!("Expected closing bracket for \"{opener}\""), opener, open))
        }
    }

    /// At end of input the group is unclosed; otherwise report `message`
    /// at the current token.
    fn unclosed_or(&self, message: &str, opener: &str, open: Span) -> ExprError {
        if self.check(TokenKind::Eof) {
            ExprError::new(format!("Unclosed \"{opener}\""), open)
        } else {
            ExprError::new(message, self.current_span())
        }
    }

    fn peek_infix(&self) -> Option<InfixOp> {
        InfixOp::from_token(self.peek())
    }

    fn text(&self, span: Span) -> &str {
        &self.source[span.start - self.base..span.end - self.base]
    }

    fn peek(&self) -> &Token {
        // The lexer always terminates the stream with Eof.
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    fn current_span(&self) -> Span {
        self.peek().span
    }

    fn check(&self, kind: TokenKind) -> bool {
        self.peek().kind == kind
    }

    fn advance(&mut self) {
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
    }
}

fn is_assignable(expr: &Expression) -> bool {
    matches!(expr.kind, ExprKind::Identifier { .. } | ExprKind::Member { .. })
}

fn describe(op: InfixOp) -> &'static str {
    match op {
        InfixOp::Assign(AssignOp::Assign) => "\"=\"",
        InfixOp::Assign(_) => "assignment operator",
        InfixOp::Logical(LogicalOp::And) => "\"&&\"",
        InfixOp::Logical(LogicalOp::Or) => "\"||\"",
        InfixOp::Binary(_) => "operator",
        InfixOp::BuiltIn => "\"?\"",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn parse(source: &str) -> Expression {
        ExprParser::parse(source).unwrap().unwrap()
    }

    fn parse_err(source: &str) -> ExprError {
        ExprParser::parse(source).unwrap_err()
    }

    fn ident(expr: &Expression) -> &str {
        expr.as_identifier()
            .unwrap_or_else(|| panic!("Expected identifier, got {expr:?}"))
    }

    fn number(expr: &Expression) -> f64 {
        match &expr.kind {
            ExprKind::Literal {
                value: LiteralValue::Number(n),
                ..
            } => *n,
            other => panic!("Expected number, got {other:?}"),
        }
    }

    fn binary(expr: &Expression) -> (BinaryOp, &Expression, &Expression) {
        match &expr.kind {
            ExprKind::Binary {
                operator,
                left,
                right,
            } => (*operator, left, right),
            other => panic!("Expected binary expression, got {other:?}"),
        }
    }

    // =========================================================================
    // Empty and compound input
    // =========================================================================

    #[test]
    fn test_blank_input_is_empty_marker() {
        assert_eq!(ExprParser::parse("").unwrap(), None);
        assert_eq!(ExprParser::parse("  \n\t").unwrap(), None);
    }

    #[test]
    fn test_single_expression_is_unwrapped() {
        let expr = parse("user");
        assert_eq!(ident(&expr), "user");
    }

    #[test]
    fn test_comma_and_semicolon_make_compound() {
        let expr = parse("a, b; c");
        match &expr.kind {
            ExprKind::Compound { body } => {
                let names: Vec<&str> = body.iter().map(ident).collect();
                assert_eq!(names, vec!["a", "b", "c"]);
            }
            other => panic!("Expected compound, got {other:?}"),
        }
        assert_eq!(expr.span, Span::new(0, 7));
    }

    #[test]
    fn test_juxtaposition_makes_compound() {
        let expr = parse("users as user");
        let items = expr.items();
        assert_eq!(items.len(), 3);
        assert!(items[1].is_identifier("as"));
    }

    // =========================================================================
    // Literals
    // =========================================================================

    #[test]
    fn test_literals() {
        assert_eq!(number(&parse("3.5")), 3.5);
        assert!(matches!(
            parse("\"hi\"").kind,
            ExprKind::Literal { value: LiteralValue::String(ref s), .. } if s == "hi"
        ));
        assert!(matches!(
            parse("true").kind,
            ExprKind::Literal { value: LiteralValue::Boolean(true), .. }
        ));
        assert!(matches!(
            parse("false").kind,
            ExprKind::Literal { value: LiteralValue::Boolean(false), .. }
        ));
        assert!(matches!(
            parse("null").kind,
            ExprKind::Literal { value: LiteralValue::Null, .. }
        ));
    }

    #[test]
    fn test_literal_keeps_raw_text() {
        match parse("1.50").kind {
            ExprKind::Literal { raw, .. } => assert_eq!(raw, "1.50"),
            other => panic!("Expected literal, got {other:?}"),
        }
    }

    #[test]
    fn test_array_literal() {
        match parse("[1, x, \"s\"]").kind {
            ExprKind::Array { elements } => assert_eq!(elements.len(), 3),
            other => panic!("Expected array, got {other:?}"),
        }
        match parse("[]").kind {
            ExprKind::Array { elements } => assert!(elements.is_empty()),
            other => panic!("Expected array, got {other:?}"),
        }
    }

    #[test]
    fn test_map_literal() {
        let expr = parse("{\"a\": 1, \"b\": x + 1}");
        match &expr.kind {
            ExprKind::Map { entries } => {
                assert_eq!(entries.len(), 2);
                assert_eq!(number(&entries[0].value), 1.0);
                assert_eq!(binary(&entries[1].value).0, BinaryOp::Add);
            }
            other => panic!("Expected map, got {other:?}"),
        }
        assert_eq!(expr.span, Span::new(0, 20));
    }

    #[test]
    fn test_empty_map_literal() {
        match parse("{}").kind {
            ExprKind::Map { entries } => assert!(entries.is_empty()),
            other => panic!("Expected map, got {other:?}"),
        }
    }

    // =========================================================================
    // Precedence and associativity
    // =========================================================================

    #[test]
    fn test_precedence() {
        let expr = parse("1 + 2 * 3");
        let (op, left, right) = binary(&expr);
        assert_eq!(op, BinaryOp::Add);
        assert_eq!(number(left), 1.0);
        let (inner, l, r) = binary(right);
        assert_eq!(inner, BinaryOp::Mul);
        assert_eq!((number(l), number(r)), (2.0, 3.0));
    }

    #[test]
    fn test_left_associativity() {
        let expr = parse("a - b - c");
        let (op, left, right) = binary(&expr);
        assert_eq!(op, BinaryOp::Sub);
        assert_eq!(ident(right), "c");
        let (inner, l, r) = binary(left);
        assert_eq!(inner, BinaryOp::Sub);
        assert_eq!((ident(l), ident(r)), ("a", "b"));
    }

    #[test]
    fn test_parentheses_override_precedence() {
        let expr = parse("(1 + 2) * 3");
        let (op, left, _) = binary(&expr);
        assert_eq!(op, BinaryOp::Mul);
        assert_eq!(binary(left).0, BinaryOp::Add);
    }

    #[test]
    fn test_logical_operators() {
        let expr = parse("a || b && c == d");
        match &expr.kind {
            ExprKind::Logical {
                operator: LogicalOp::Or,
                right,
                ..
            } => match &right.kind {
                ExprKind::Logical {
                    operator: LogicalOp::And,
                    right,
                    ..
                } => assert_eq!(binary(right).0, BinaryOp::Eq),
                other => panic!("Expected &&, got {other:?}"),
            },
            other => panic!("Expected ||, got {other:?}"),
        }
    }

    #[test]
    fn test_word_comparison_operators() {
        assert_eq!(binary(&parse("a gt b")).0, BinaryOp::Gt);
        assert_eq!(binary(&parse("a gte b")).0, BinaryOp::Gte);
        assert_eq!(binary(&parse("a lt b")).0, BinaryOp::Lt);
        assert_eq!(binary(&parse("a lte b")).0, BinaryOp::Lte);
    }

    #[test]
    fn test_assignment_is_right_associative() {
        let expr = parse("a = b = 1");
        match &expr.kind {
            ExprKind::Assignment { left, right, .. } => {
                assert_eq!(ident(left), "a");
                assert!(matches!(right.kind, ExprKind::Assignment { .. }));
            }
            other => panic!("Expected assignment, got {other:?}"),
        }
    }

    #[test]
    fn test_assignment_binds_loosest() {
        match parse("total += price * 2").kind {
            ExprKind::Assignment {
                operator, right, ..
            } => {
                assert_eq!(operator, AssignOp::AddAssign);
                assert_eq!(binary(&right).0, BinaryOp::Mul);
            }
            other => panic!("Expected assignment, got {other:?}"),
        }
    }

    #[test]
    fn test_invalid_assignment_target() {
        let err = parse_err("1 = 2");
        assert!(err.message.contains("Invalid assignment target"));
        assert_eq!(err.span, Span::new(0, 1));
    }

    // =========================================================================
    // Builtins
    // =========================================================================

    #[test]
    fn test_builtin() {
        match parse("name?upper_case").kind {
            ExprKind::BuiltIn { left, right } => {
                assert_eq!(ident(&left), "name");
                assert_eq!(ident(&right), "upper_case");
            }
            other => panic!("Expected builtin, got {other:?}"),
        }
    }

    #[test]
    fn test_builtin_with_arguments_binds_tighter_than_plus() {
        let expr = parse("price?string(\"0.00\") + \" EUR\"");
        let (op, left, _) = binary(&expr);
        assert_eq!(op, BinaryOp::Add);
        match &left.kind {
            ExprKind::BuiltIn { right, .. } => {
                assert!(matches!(right.kind, ExprKind::Call { .. }));
            }
            other => panic!("Expected builtin, got {other:?}"),
        }
    }

    #[test]
    fn test_chained_builtins() {
        match parse("s?trim?length").kind {
            ExprKind::BuiltIn { left, right } => {
                assert_eq!(ident(&right), "length");
                assert!(matches!(left.kind, ExprKind::BuiltIn { .. }));
            }
            other => panic!("Expected builtin, got {other:?}"),
        }
    }

    // =========================================================================
    // Postfix chaining
    // =========================================================================

    #[test]
    fn test_member_index_call_chain() {
        let expr = parse("a.b[0](c)");
        let ExprKind::Call { callee, arguments } = &expr.kind else {
            panic!("Expected call, got {expr:?}");
        };
        assert_eq!(arguments.len(), 1);
        assert_eq!(ident(&arguments[0]), "c");

        let ExprKind::Member {
            object,
            property,
            computed: true,
        } = &callee.kind
        else {
            panic!("Expected computed member, got {callee:?}");
        };
        assert_eq!(number(property), 0.0);

        let ExprKind::Member {
            object: inner,
            property: name,
            computed: false,
        } = &object.kind
        else {
            panic!("Expected member, got {object:?}");
        };
        assert_eq!(ident(inner), "a");
        assert_eq!(ident(name), "b");
        assert_eq!(expr.span, Span::new(0, 9));
    }

    #[test]
    fn test_call_without_arguments() {
        match parse("now()").kind {
            ExprKind::Call { arguments, .. } => assert!(arguments.is_empty()),
            other => panic!("Expected call, got {other:?}"),
        }
    }

    #[test]
    fn test_unary_operators() {
        match parse("!done").kind {
            ExprKind::Unary { operator, argument } => {
                assert_eq!(operator, UnaryOp::Not);
                assert_eq!(ident(&argument), "done");
            }
            other => panic!("Expected unary, got {other:?}"),
        }
        let expr = parse("-a + b");
        let (op, left, _) = binary(&expr);
        assert_eq!(op, BinaryOp::Add);
        assert!(matches!(
            left.kind,
            ExprKind::Unary {
                operator: UnaryOp::Neg,
                ..
            }
        ));
    }

    #[test]
    fn test_update_operators() {
        match parse("++i").kind {
            ExprKind::Update {
                operator, prefix, ..
            } => {
                assert_eq!(operator, UpdateOp::Increment);
                assert!(prefix);
            }
            other => panic!("Expected update, got {other:?}"),
        }
        match parse("i--").kind {
            ExprKind::Update {
                operator, prefix, ..
            } => {
                assert_eq!(operator, UpdateOp::Decrement);
                assert!(!prefix);
            }
            other => panic!("Expected update, got {other:?}"),
        }
    }

    #[test]
    fn test_invalid_update_target() {
        assert!(parse_err("++1").message.contains("Invalid update target"));
    }

    // =========================================================================
    // Errors
    // =========================================================================

    #[test]
    fn test_dangling_operator() {
        let err = parse_err("a +");
        assert!(err.message.contains("Expected expression after"));
        assert_eq!(err.span, Span::new(2, 3));
    }

    #[test]
    fn test_unclosed_paren() {
        let err = parse_err("(a + b");
        assert_eq!(err.message, "Unclosed \"(\"");
        assert_eq!(err.span, Span::new(0, 1));
    }

    #[test]
    fn test_unclosed_bracket_and_brace() {
        assert!(parse_err("[1, 2").message.contains("Unclosed \"[\""));
        assert!(parse_err("{\"a\": 1").message.contains("Unclosed \"{\""));
        assert!(parse_err("f(1").message.contains("Unclosed \"(\""));
    }

    #[test]
    fn test_stray_closing_token() {
        let err = parse_err("a )");
        assert!(err.message.contains("Unexpected \")\""));
        assert_eq!(err.span, Span::new(2, 3));
    }

    #[test]
    fn test_missing_map_colon() {
        assert!(parse_err("{\"a\" 1}").message.contains("Expected \":\""));
    }

    #[test]
    fn test_errors_use_base_offset() {
        let err = ExprParser::parse_at("x +", 40).unwrap_err();
        assert_eq!(err.span, Span::new(42, 43));
    }
}

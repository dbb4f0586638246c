use crate::ast::{BinOp, DeclKind, Expr, ExprKind, FunctionDecl, Stmt, UnOp};
use crate::error::{MachineError, Result, Span};
use crate::lexer::{tokenize_at, SpannedToken, Token};
use std::sync::Arc;

/// Deepest statement or expression nesting accepted
const MAX_NESTING: usize = 128;

/// Recursive-descent parser for the sandbox language
pub struct Parser {
    tokens: Vec<SpannedToken>,
    pos: usize,
    function_depth: usize,
    nesting: usize,
}

impl Parser {
    pub fn new(mut tokens: Vec<SpannedToken>) -> Self {
        if !matches!(tokens.last().map(|t| &t.token), Some(Token::Eof)) {
            let end = tokens.last().map(|t| t.span.end).unwrap_or(0);
            tokens.push(SpannedToken::new(Token::Eof, Span::new(end, end), false));
        }
        Self {
            tokens,
            pos: 0,
            function_depth: 0,
            nesting: 0,
        }
    }

    /// Peek at current token
    fn peek(&self) -> &SpannedToken {
        let last = self.tokens.len() - 1;
        &self.tokens[self.pos.min(last)]
    }

    /// Peek one token past the current one
    fn peek_next(&self) -> &Token {
        let last = self.tokens.len() - 1;
        &self.tokens[(self.pos + 1).min(last)].token
    }

    /// Advance to next token
    fn advance(&mut self) -> SpannedToken {
        let token = self.peek().clone();
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
        token
    }

    /// End offset of the most recently consumed token
    fn prev_end(&self) -> usize {
        self.pos
            .checked_sub(1)
            .and_then(|i| self.tokens.get(i))
            .map(|t| t.span.end)
            .unwrap_or(0)
    }

    /// Check if current token matches expected
    fn check(&self, expected: &Token) -> bool {
        std::mem::discriminant(&self.peek().token) == std::mem::discriminant(expected)
    }

    /// Consume token if it matches
    fn consume(&mut self, expected: &Token) -> bool {
        if self.check(expected) {
            self.advance();
            true
        } else {
            false
        }
    }

    /// Expect a token, error if not found
    fn expect(&mut self, expected: Token, what: &str) -> Result<SpannedToken> {
        if self.check(&expected) {
            Ok(self.advance())
        } else {
            Err(self.error(format!("Expected {}", what)))
        }
    }

    fn error(&self, message: impl Into<String>) -> MachineError {
        MachineError::ParserError {
            span: self.peek().span,
            message: message.into(),
        }
    }

    /// Check if at end of input
    fn is_eof(&self) -> bool {
        matches!(self.peek().token, Token::Eof)
    }

    /// Statement end: `;`, a line break, `}` or end of input
    fn terminator(&mut self) -> Result<()> {
        if self.consume(&Token::Semicolon) {
            return Ok(());
        }
        let current = self.peek();
        if current.newline_before || matches!(current.token, Token::RBrace | Token::Eof) {
            Ok(())
        } else {
            Err(self.error("Expected `;`"))
        }
    }

    fn identifier(&mut self, what: &str) -> Result<String> {
        let name = match &self.peek().token {
            Token::Identifier(name) => name.clone(),
            _ => return Err(self.error(format!("Expected {}", what))),
        };
        self.advance();
        Ok(name)
    }

    /// Parse the entire input as a statement list
    pub fn parse_program(&mut self) -> Result<Vec<Stmt>> {
        let mut stmts = Vec::new();
        while !self.is_eof() {
            stmts.push(self.parse_statement()?);
        }
        Ok(stmts)
    }

    /// Run `parse` one nesting level deeper
    fn nested<T>(&mut self, parse: impl FnOnce(&mut Self) -> Result<T>) -> Result<T> {
        if self.nesting >= MAX_NESTING {
            return Err(self.error("Maximum nesting depth exceeded"));
        }
        self.nesting += 1;
        let result = parse(self);
        self.nesting -= 1;
        result
    }

    fn parse_statement(&mut self) -> Result<Stmt> {
        self.nested(Self::parse_statement_inner)
    }

    fn parse_statement_inner(&mut self) -> Result<Stmt> {
        match &self.peek().token {
            Token::Var => self.parse_declaration(DeclKind::Var),
            Token::Let => self.parse_declaration(DeclKind::Let),
            Token::Const => self.parse_declaration(DeclKind::Const),
            Token::Function if matches!(self.peek_next(), Token::Identifier(_)) => {
                let decl = self.parse_function()?;
                Ok(Stmt::Function(decl))
            }
            Token::Return => self.parse_return(),
            Token::If => self.parse_if(),
            Token::While => self.parse_while(),
            Token::LBrace => Ok(Stmt::Block(self.parse_block()?)),
            Token::Semicolon => {
                self.advance();
                Ok(Stmt::Empty)
            }
            _ => {
                let expr = self.parse_expression()?;
                self.terminator()?;
                Ok(Stmt::Expr(expr))
            }
        }
    }

    fn parse_declaration(&mut self, kind: DeclKind) -> Result<Stmt> {
        let start = self.advance().span.start;
        let name = self.identifier("a variable name")?;
        let init = if self.consume(&Token::Eq) {
            Some(self.parse_expression()?)
        } else {
            None
        };
        if kind == DeclKind::Const && init.is_none() {
            return Err(self.error("Missing initializer in const declaration"));
        }
        let span = Span::new(start, self.prev_end());
        self.terminator()?;
        Ok(Stmt::Declare {
            kind,
            name,
            init,
            span,
        })
    }

    fn parse_return(&mut self) -> Result<Stmt> {
        let token = self.advance();
        if self.function_depth == 0 {
            return Err(MachineError::ParserError {
                span: token.span,
                message: "Illegal return statement outside of a function".to_string(),
            });
        }

        let current = self.peek();
        let bare = current.newline_before
            || matches!(current.token, Token::Semicolon | Token::RBrace | Token::Eof);
        let value = if bare {
            None
        } else {
            Some(self.parse_expression()?)
        };
        let span = Span::new(token.span.start, self.prev_end());
        self.terminator()?;
        Ok(Stmt::Return(value, span))
    }

    fn parse_if(&mut self) -> Result<Stmt> {
        self.advance();
        self.expect(Token::LParen, "`(` after `if`")?;
        let cond = self.parse_expression()?;
        self.expect(Token::RParen, "`)` after condition")?;
        let then = Box::new(self.parse_statement()?);
        let otherwise = if self.consume(&Token::Else) {
            Some(Box::new(self.parse_statement()?))
        } else {
            None
        };
        Ok(Stmt::If {
            cond,
            then,
            otherwise,
        })
    }

    fn parse_while(&mut self) -> Result<Stmt> {
        self.advance();
        self.expect(Token::LParen, "`(` after `while`")?;
        let cond = self.parse_expression()?;
        self.expect(Token::RParen, "`)` after condition")?;
        let body = Box::new(self.parse_statement()?);
        Ok(Stmt::While { cond, body })
    }

    fn parse_block(&mut self) -> Result<Vec<Stmt>> {
        self.expect(Token::LBrace, "`{`")?;
        let mut stmts = Vec::new();
        while !self.check(&Token::RBrace) {
            if self.is_eof() {
                return Err(self.error("Unterminated block"));
            }
            stmts.push(self.parse_statement()?);
        }
        self.advance();
        Ok(stmts)
    }

    /// `function name?(params) { body }`
    fn parse_function(&mut self) -> Result<Arc<FunctionDecl>> {
        let start = self.expect(Token::Function, "`function`")?.span.start;
        let name = match &self.peek().token {
            Token::Identifier(_) => Some(self.identifier("a function name")?),
            _ => None,
        };

        self.expect(Token::LParen, "`(` before parameters")?;
        let mut params = Vec::new();
        while !self.check(&Token::RParen) {
            params.push(self.identifier("a parameter name")?);
            if !self.consume(&Token::Comma) {
                break;
            }
        }
        self.expect(Token::RParen, "`)` after parameters")?;

        self.function_depth += 1;
        let body = self.parse_block();
        self.function_depth -= 1;

        Ok(Arc::new(FunctionDecl {
            name,
            params,
            body: body?,
            span: Span::new(start, self.prev_end()),
        }))
    }

    pub fn parse_expression(&mut self) -> Result<Expr> {
        self.parse_assignment()
    }

    fn parse_assignment(&mut self) -> Result<Expr> {
        let target = self.parse_binary(1)?;
        if !self.check(&Token::Eq) {
            return Ok(target);
        }
        if !matches!(
            target.kind,
            ExprKind::Ident(_) | ExprKind::Member(..) | ExprKind::Index(..)
        ) {
            return Err(MachineError::ParserError {
                span: target.span,
                message: "Invalid left-hand side in assignment".to_string(),
            });
        }
        self.advance();
        let value = self.parse_assignment()?;
        let span = target.span.to(value.span);
        Ok(Expr::new(
            ExprKind::Assign(Box::new(target), Box::new(value)),
            span,
        ))
    }

    fn binary_op(&self) -> Option<BinOp> {
        let op = match self.peek().token {
            Token::OrOr => BinOp::Or,
            Token::AndAnd => BinOp::And,
            Token::EqEq => BinOp::LooseEq,
            Token::NotEq => BinOp::LooseNe,
            Token::EqEqEq => BinOp::StrictEq,
            Token::NotEqEq => BinOp::StrictNe,
            Token::Lt => BinOp::Lt,
            Token::Le => BinOp::Le,
            Token::Gt => BinOp::Gt,
            Token::Ge => BinOp::Ge,
            Token::Plus => BinOp::Add,
            Token::Minus => BinOp::Sub,
            Token::Star => BinOp::Mul,
            Token::Slash => BinOp::Div,
            Token::Percent => BinOp::Rem,
            _ => return None,
        };
        Some(op)
    }

    /// Precedence climbing; all binary operators are left-associative
    fn parse_binary(&mut self, min_prec: u8) -> Result<Expr> {
        let mut lhs = self.parse_unary()?;
        while let Some(op) = self.binary_op() {
            let prec = op.precedence();
            if prec < min_prec {
                break;
            }
            self.advance();
            let rhs = self.parse_binary(prec + 1)?;
            let span = lhs.span.to(rhs.span);
            lhs = Expr::new(ExprKind::Binary(Box::new(lhs), op, Box::new(rhs)), span);
        }
        Ok(lhs)
    }

    fn parse_unary(&mut self) -> Result<Expr> {
        self.nested(Self::parse_unary_inner)
    }

    fn parse_unary_inner(&mut self) -> Result<Expr> {
        let op = match self.peek().token {
            Token::Bang => UnOp::Not,
            Token::Minus => UnOp::Neg,
            Token::Plus => UnOp::Plus,
            Token::Typeof => UnOp::Typeof,
            _ => return self.parse_postfix(),
        };
        let start = self.advance().span;
        let operand = self.parse_unary()?;
        let span = start.to(operand.span);
        Ok(Expr::new(ExprKind::Unary(op, Box::new(operand)), span))
    }

    fn parse_postfix(&mut self) -> Result<Expr> {
        let mut expr = self.parse_primary()?;
        loop {
            match self.peek().token {
                Token::Dot => {
                    self.advance();
                    let key = self.property_name()?;
                    let span = Span::new(expr.span.start, self.prev_end());
                    expr = Expr::new(ExprKind::Member(Box::new(expr), key), span);
                }
                Token::LBracket => {
                    self.advance();
                    let index = self.parse_expression()?;
                    self.expect(Token::RBracket, "`]`")?;
                    let span = Span::new(expr.span.start, self.prev_end());
                    expr = Expr::new(ExprKind::Index(Box::new(expr), Box::new(index)), span);
                }
                Token::LParen => {
                    self.advance();
                    let args = self.parse_list(Token::RParen, "`)` after arguments")?;
                    let span = Span::new(expr.span.start, self.prev_end());
                    expr = Expr::new(ExprKind::Call(Box::new(expr), args), span);
                }
                _ => return Ok(expr),
            }
        }
    }

    /// Comma-separated expressions up to `close`; a trailing comma is allowed
    fn parse_list(&mut self, close: Token, what: &str) -> Result<Vec<Expr>> {
        let mut items = Vec::new();
        while !self.check(&close) {
            items.push(self.parse_expression()?);
            if !self.consume(&Token::Comma) {
                break;
            }
        }
        self.expect(close, what)?;
        Ok(items)
    }

    /// Name after `.` or before `:` in an object literal
    fn property_name(&mut self) -> Result<String> {
        let name = match &self.peek().token {
            Token::Identifier(name) | Token::Str(name) => name.clone(),
            Token::Number(n) => crate::value::number_to_string(*n),
            other => match other.keyword_text() {
                Some(text) => text.to_string(),
                None => return Err(self.error("Expected a property name")),
            },
        };
        self.advance();
        Ok(name)
    }

    fn parse_primary(&mut self) -> Result<Expr> {
        let span = self.peek().span;
        let kind = match &self.peek().token {
            Token::Number(n) => ExprKind::Number(*n),
            Token::Str(s) => ExprKind::Str(s.clone()),
            Token::True => ExprKind::Bool(true),
            Token::False => ExprKind::Bool(false),
            Token::Null => ExprKind::Null,
            Token::Undefined => ExprKind::Undefined,
            Token::Identifier(name) => ExprKind::Ident(name.clone()),
            Token::Function => {
                let decl = self.parse_function()?;
                let span = decl.span;
                return Ok(Expr::new(ExprKind::Function(decl), span));
            }
            Token::LParen => {
                self.advance();
                let inner = self.parse_expression()?;
                self.expect(Token::RParen, "`)`")?;
                return Ok(inner);
            }
            Token::LBracket => {
                self.advance();
                let items = self.parse_list(Token::RBracket, "`]` after array elements")?;
                return Ok(Expr::new(
                    ExprKind::Array(items),
                    Span::new(span.start, self.prev_end()),
                ));
            }
            Token::LBrace => return self.parse_object(),
            _ => return Err(self.error("Unexpected token")),
        };
        self.advance();
        Ok(Expr::new(kind, span))
    }

    fn parse_object(&mut self) -> Result<Expr> {
        let start = self.expect(Token::LBrace, "`{`")?.span.start;
        let mut props = Vec::new();
        while !self.check(&Token::RBrace) {
            let key_span = self.peek().span;
            let shorthand = matches!(self.peek().token, Token::Identifier(_));
            let key = self.property_name()?;
            let value = if self.consume(&Token::Colon) {
                self.parse_expression()?
            } else if shorthand {
                Expr::new(ExprKind::Ident(key.clone()), key_span)
            } else {
                return Err(self.error("Expected `:` after property name"));
            };
            props.push((key, value));
            if !self.consume(&Token::Comma) {
                break;
            }
        }
        self.expect(Token::RBrace, "`}` after object properties")?;
        Ok(Expr::new(
            ExprKind::Object(props),
            Span::new(start, self.prev_end()),
        ))
    }
}

/// Parse a chunk of source whose first byte sits at `offset`
pub fn parse_at(source: &str, offset: usize) -> Result<Vec<Stmt>> {
    let tokens = tokenize_at(source, offset)?;
    Parser::new(tokens).parse_program()
}

/// Parse a complete program
pub fn parse(source: &str) -> Result<Vec<Stmt>> {
    parse_at(source, 0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn expr(source: &str) -> Expr {
        match parse(source).unwrap().remove(0) {
            Stmt::Expr(e) => e,
            other => panic!("expected expression statement, got {:?}", other),
        }
    }

    #[test]
    fn test_precedence() {
        let e = expr("1 + 2 * 3");
        match e.kind {
            ExprKind::Binary(lhs, BinOp::Add, rhs) => {
                assert_eq!(lhs.kind, ExprKind::Number(1.0));
                assert!(matches!(rhs.kind, ExprKind::Binary(_, BinOp::Mul, _)));
            }
            other => panic!("unexpected {:?}", other),
        }

        let e = expr("a || b && c == d");
        assert!(matches!(e.kind, ExprKind::Binary(_, BinOp::Or, _)));
    }

    #[test]
    fn test_left_associative() {
        let e = expr("10 - 4 - 3");
        match e.kind {
            ExprKind::Binary(lhs, BinOp::Sub, rhs) => {
                assert!(matches!(lhs.kind, ExprKind::Binary(_, BinOp::Sub, _)));
                assert_eq!(rhs.kind, ExprKind::Number(3.0));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_assignment_is_right_associative() {
        let e = expr("a = b = 1");
        match e.kind {
            ExprKind::Assign(_, value) => {
                assert!(matches!(value.kind, ExprKind::Assign(..)))
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_member_call_chain() {
        let e = expr("counter.inc().value[0]");
        assert_eq!(e.describe(), "counter.inc(...).value[...]");
    }

    #[test]
    fn test_keyword_property_names() {
        let e = expr("x.default.function");
        assert_eq!(e.describe(), "x.default.function");
        let e = expr("({ if: 1, 'quoted key': 2, 3: 4, short })");
        match e.kind {
            ExprKind::Object(props) => {
                let keys: Vec<&str> = props.iter().map(|(k, _)| k.as_str()).collect();
                assert_eq!(keys, vec!["if", "quoted key", "3", "short"]);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_statements() {
        let program = parse(
            "var a = 1\nlet b\nfunction f(x, y) { if (x) { return y } else return; }\nwhile (a < 3) a = a + 1;",
        )
        .unwrap();
        assert_eq!(program.len(), 4);
        assert!(matches!(program[0], Stmt::Declare { kind: DeclKind::Var, .. }));
        assert!(matches!(program[1], Stmt::Declare { kind: DeclKind::Let, init: None, .. }));
        match &program[2] {
            Stmt::Function(decl) => {
                assert_eq!(decl.name.as_deref(), Some("f"));
                assert_eq!(decl.params, vec!["x", "y"]);
            }
            other => panic!("unexpected {:?}", other),
        }
        assert!(matches!(program[3], Stmt::While { .. }));
    }

    #[test]
    fn test_missing_semicolon_on_same_line() {
        let err = parse("a = 1 b = 2").unwrap_err();
        assert!(matches!(err, MachineError::ParserError { ref message, .. } if message == "Expected `;`"));
    }

    #[test]
    fn test_return_outside_function() {
        let err = parse("return 1").unwrap_err();
        assert!(matches!(err, MachineError::ParserError { .. }));
    }

    #[test]
    fn test_bare_return_before_newline() {
        let program = parse("function f() {\n  return\n  1\n}").unwrap();
        match &program[0] {
            Stmt::Function(decl) => {
                assert!(matches!(decl.body[0], Stmt::Return(None, _)));
                assert_eq!(decl.body.len(), 2);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_nesting_depth_is_bounded() {
        let deep = format!("var x = {}1{}", "(".repeat(200_000), ")".repeat(200_000));
        let err = parse(&deep).unwrap_err();
        assert!(matches!(
            err,
            MachineError::ParserError { ref message, .. } if message == "Maximum nesting depth exceeded"
        ));

        let blocks = format!("{}{}", "{".repeat(100_000), "}".repeat(100_000));
        assert!(parse(&blocks).is_err());
        assert!(parse(&"!".repeat(100_000)).is_err());

        let shallow = format!("var x = {}1{}", "[".repeat(40), "]".repeat(40));
        assert!(parse(&shallow).is_ok());
    }

    #[test]
    fn test_invalid_assignment_target() {
        let err = parse("1 = 2").unwrap_err();
        assert!(matches!(err, MachineError::ParserError { .. }));
    }

    #[test]
    fn test_generated_statements_parse() {
        let program = parse(
            "var _arg1 = linkHeavenlyObject([\"_argobj0\"], [\"x\",\"y\"]);\nonTick(_arg1);\n",
        )
        .unwrap();
        assert_eq!(program.len(), 2);
    }
}

use crate::ast::*;
use crate::error::{ParseError, ParseResult};
use tamarin_lexer::{Span, Token, TokenKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Prec {
    Lowest = 0,
    Equals = 1,
    LessGreater = 2,
    Sum = 3,
    Product = 4,
    Prefix = 5,
    Call = 6,
    Index = 7,
}

fn infix_prec(tok: &TokenKind) -> Option<Prec> {
    match tok {
        TokenKind::EqualEqual | TokenKind::BangEqual => Some(Prec::Equals),
        TokenKind::Less | TokenKind::Greater => Some(Prec::LessGreater),
        TokenKind::Plus | TokenKind::Minus => Some(Prec::Sum),
        TokenKind::Star | TokenKind::Slash => Some(Prec::Product),
        TokenKind::LParen => Some(Prec::Call),
        TokenKind::LBracket => Some(Prec::Index),
        _ => None,
    }
}

pub struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    pub errors: Vec<ParseError>,
}

impl Parser {
    pub fn new(tokens: Vec<Token>) -> Self {
        Parser { tokens, pos: 0, errors: Vec::new() }
    }

    fn peek(&self) -> &Token {
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    fn peek_kind(&self) -> &TokenKind {
        &self.peek().kind
    }

    fn advance(&mut self) -> Token {
        let tok = self.tokens[self.pos.min(self.tokens.len() - 1)].clone();
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
        tok
    }

    fn current_span(&self) -> Span {
        self.peek().span.clone()
    }

    fn match_tok(&mut self, kind: &TokenKind) -> bool {
        if std::mem::discriminant(self.peek_kind()) == std::mem::discriminant(kind) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, kind: &TokenKind, label: &str) -> ParseResult<Token> {
        if std::mem::discriminant(self.peek_kind()) == std::mem::discriminant(kind) {
            Ok(self.advance())
        } else {
            Err(ParseError::UnexpectedToken {
                expected: label.to_string(),
                found: self.peek_kind().clone(),
                span: self.current_span(),
            })
        }
    }

    fn error_expr(&mut self, err: ParseError) -> Expr {
        let span = self.current_span();
        self.errors.push(err);
        Node::new(ExprKind::Error, span)
    }

    pub fn parse(&mut self) -> Program {
        let mut stmts = Vec::new();
        while !matches!(self.peek_kind(), TokenKind::Eof) {
            stmts.push(self.parse_stmt());
        }
        Program { stmts }
    }

    fn parse_stmt(&mut self) -> Stmt {
        match self.peek_kind() {
            TokenKind::Let => self.parse_let(),
            TokenKind::Return => self.parse_return(),
            _ => self.parse_expr_stmt(),
        }
    }

    fn parse_let(&mut self) -> Stmt {
        let span = self.current_span();
        self.advance();
        let name = match self.peek_kind().clone() {
            TokenKind::Identifier(s) => {
                self.advance();
                s
            }
            _ => {
                self.errors.push(ParseError::UnexpectedToken {
                    expected: "identifier".to_string(),
                    found: self.peek_kind().clone(),
                    span: self.current_span(),
                });
                String::new()
            }
        };
        if let Err(e) = self.expect(&TokenKind::Equal, "=") {
            self.errors.push(e);
        }
        let mut value = self.parse_expr(Prec::Lowest);
        if let ExprKind::Literal(Literal::Function { name: fn_name, .. }) = &mut value.inner {
            *fn_name = Some(name.clone());
        }
        self.match_tok(&TokenKind::Semicolon);
        Node::new(StmtKind::Let { name, value }, span)
    }

    fn parse_return(&mut self) -> Stmt {
        let span = self.current_span();
        self.advance();
        let value = self.parse_expr(Prec::Lowest);
        self.match_tok(&TokenKind::Semicolon);
        Node::new(StmtKind::Return(value), span)
    }

    fn parse_expr_stmt(&mut self) -> Stmt {
        let span = self.current_span();
        let expr = self.parse_expr(Prec::Lowest);
        self.match_tok(&TokenKind::Semicolon);
        Node::new(StmtKind::ExprStmt(expr), span)
    }

    fn parse_block(&mut self) -> Vec<Stmt> {
        let mut stmts = Vec::new();
        while !matches!(self.peek_kind(), TokenKind::RBrace | TokenKind::Eof) {
            stmts.push(self.parse_stmt());
        }
        stmts
    }

    fn parse_expr(&mut self, min_prec: Prec) -> Expr {
        let mut left = self.parse_prefix();
        while !matches!(self.peek_kind(), TokenKind::Semicolon) {
            let prec = match infix_prec(self.peek_kind()) {
                Some(p) => p,
                None => break,
            };
            if min_prec >= prec {
                break;
            }
            left = self.parse_infix(left, prec);
        }
        left
    }

    fn parse_prefix(&mut self) -> Expr {
        let span = self.current_span();
        match self.peek_kind().clone() {
            TokenKind::Identifier(s) => {
                self.advance();
                Node::new(ExprKind::Literal(Literal::Ident(s)), span)
            }
            TokenKind::IntLiteral(n) => {
                self.advance();
                Node::new(ExprKind::Literal(Literal::Int(n)), span)
            }
            TokenKind::StringLiteral(s) => {
                self.advance();
                Node::new(ExprKind::Literal(Literal::Str(s)), span)
            }
            TokenKind::True => {
                self.advance();
                Node::new(ExprKind::Literal(Literal::Bool(true)), span)
            }
            TokenKind::False => {
                self.advance();
                Node::new(ExprKind::Literal(Literal::Bool(false)), span)
            }
            TokenKind::Minus => {
                self.advance();
                let right = self.parse_expr(Prec::Prefix);
                Node::new(ExprKind::Prefix { op: PrefixOp::Neg, right: Box::new(right) }, span)
            }
            TokenKind::Bang => {
                self.advance();
                let right = self.parse_expr(Prec::Prefix);
                Node::new(ExprKind::Prefix { op: PrefixOp::Not, right: Box::new(right) }, span)
            }
            TokenKind::LParen => {
                self.advance();
                let e = self.parse_expr(Prec::Lowest);
                if let Err(e) = self.expect(&TokenKind::RParen, ")") {
                    self.errors.push(e);
                }
                e
            }
            TokenKind::LBracket => self.parse_array_literal(),
            TokenKind::LBrace => self.parse_map_literal(),
            TokenKind::Fn => self.parse_function_literal(),
            TokenKind::If => self.parse_if_expr(),
            other => self.error_expr(ParseError::UnexpectedToken {
                expected: "expression".to_string(),
                found: other,
                span,
            }),
        }
    }

    fn parse_infix(&mut self, left: Expr, prec: Prec) -> Expr {
        let span = left.span.clone();
        match self.peek_kind().clone() {
            TokenKind::LParen => {
                self.advance();
                let args = self.parse_call_args();
                if let Err(e) = self.expect(&TokenKind::RParen, ")") {
                    self.errors.push(e);
                }
                Node::new(ExprKind::Call { callee: Box::new(left), args }, span)
            }
            TokenKind::LBracket => {
                self.advance();
                let index = self.parse_expr(Prec::Lowest);
                if let Err(e) = self.expect(&TokenKind::RBracket, "]") {
                    self.errors.push(e);
                }
                Node::new(
                    ExprKind::Infix { left: Box::new(left), op: InfixOp::Index, right: Box::new(index) },
                    span,
                )
            }
            kind => {
                let op = match kind {
                    TokenKind::Plus => InfixOp::Add,
                    TokenKind::Minus => InfixOp::Sub,
                    TokenKind::Star => InfixOp::Mul,
                    TokenKind::Slash => InfixOp::Div,
                    TokenKind::EqualEqual => InfixOp::Eq,
                    TokenKind::BangEqual => InfixOp::NotEq,
                    TokenKind::Less => InfixOp::Lt,
                    TokenKind::Greater => InfixOp::Gt,
                    _ => unreachable!("infix_prec admitted a token with no InfixOp mapping"),
                };
                self.advance();
                let right = self.parse_expr(prec);
                Node::new(ExprKind::Infix { left: Box::new(left), op, right: Box::new(right) }, span)
            }
        }
    }

    fn parse_call_args(&mut self) -> Vec<Expr> {
        let mut args = Vec::new();
        while !matches!(self.peek_kind(), TokenKind::RParen | TokenKind::Eof) {
            args.push(self.parse_expr(Prec::Lowest));
            if !self.match_tok(&TokenKind::Comma) {
                break;
            }
        }
        args
    }

    fn parse_array_literal(&mut self) -> Expr {
        let span = self.current_span();
        self.advance();
        let mut items = Vec::new();
        while !matches!(self.peek_kind(), TokenKind::RBracket | TokenKind::Eof) {
            items.push(self.parse_expr(Prec::Lowest));
            if !self.match_tok(&TokenKind::Comma) {
                break;
            }
        }
        if let Err(e) = self.expect(&TokenKind::RBracket, "]") {
            self.errors.push(e);
        }
        Node::new(ExprKind::Literal(Literal::Array(items)), span)
    }

    fn parse_map_literal(&mut self) -> Expr {
        let span = self.current_span();
        self.advance();
        let mut pairs = Vec::new();
        while !matches!(self.peek_kind(), TokenKind::RBrace | TokenKind::Eof) {
            let key = self.parse_expr(Prec::Lowest);
            if let Err(e) = self.expect(&TokenKind::Colon, ":") {
                self.errors.push(e);
            }
            let value = self.parse_expr(Prec::Lowest);
            pairs.push((key, value));
            if !self.match_tok(&TokenKind::Comma) {
                break;
            }
        }
        if let Err(e) = self.expect(&TokenKind::RBrace, "}") {
            self.errors.push(e);
        }
        Node::new(ExprKind::Literal(Literal::Map(pairs)), span)
    }

    fn parse_function_literal(&mut self) -> Expr {
        let span = self.current_span();
        self.advance();
        if let Err(e) = self.expect(&TokenKind::LParen, "(") {
            self.errors.push(e);
        }
        let mut params = Vec::new();
        while !matches!(self.peek_kind(), TokenKind::RParen | TokenKind::Eof) {
            match self.peek_kind().clone() {
                TokenKind::Identifier(s) => {
                    self.advance();
                    params.push(s);
                }
                _ => break,
            }
            if !self.match_tok(&TokenKind::Comma) {
                break;
            }
        }
        if let Err(e) = self.expect(&TokenKind::RParen, ")") {
            self.errors.push(e);
        }
        if let Err(e) = self.expect(&TokenKind::LBrace, "{") {
            self.errors.push(e);
        }
        let body = self.parse_block();
        if let Err(e) = self.expect(&TokenKind::RBrace, "}") {
            self.errors.push(e);
        }
        Node::new(ExprKind::Literal(Literal::Function { params, body, name: None }), span)
    }

    fn parse_if_expr(&mut self) -> Expr {
        let span = self.current_span();
        self.advance();
        if let Err(e) = self.expect(&TokenKind::LParen, "(") {
            self.errors.push(e);
        }
        let condition = self.parse_expr(Prec::Lowest);
        if let Err(e) = self.expect(&TokenKind::RParen, ")") {
            self.errors.push(e);
        }
        if let Err(e) = self.expect(&TokenKind::LBrace, "{") {
            self.errors.push(e);
        }
        let consequence = self.parse_block();
        if let Err(e) = self.expect(&TokenKind::RBrace, "}") {
            self.errors.push(e);
        }
        let alternative = if self.match_tok(&TokenKind::Else) {
            if let Err(e) = self.expect(&TokenKind::LBrace, "{") {
                self.errors.push(e);
            }
            let alt = self.parse_block();
            if let Err(e) = self.expect(&TokenKind::RBrace, "}") {
                self.errors.push(e);
            }
            Some(alt)
        } else {
            None
        };
        Node::new(
            ExprKind::If { condition: Box::new(condition), consequence, alternative },
            span,
        )
    }
}

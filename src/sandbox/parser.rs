//! Recursive-descent parser producing [`Expr`] trees.
//!
//! The top level of an untrusted source must be a single expression. Statements
//! only appear inside function bodies.

use super::ast::*;
use super::lexer::{tokenize, Token, TokenKind};
use super::value::number_to_string;
use super::SandboxError;
use std::rc::Rc;

const RESERVED: &[&str] = &[
    "break", "case", "catch", "class", "const", "continue", "debugger", "default", "delete", "do",
    "else", "export", "extends", "false", "finally", "for", "function", "if", "import", "in",
    "instanceof", "let", "new", "null", "return", "super", "switch", "this", "throw", "true",
    "try", "typeof", "var", "void", "while", "with", "yield", "await",
];

const UNSUPPORTED_KEYWORDS: &[&str] = &[
    "class", "switch", "with", "import", "export", "yield", "await", "super", "debugger",
];

type PResult<T> = Result<T, SandboxError>;

/// Parse `source` as one expression, optionally followed by a `;`.
pub(crate) fn parse_expression(source: &str, max_depth: usize) -> PResult<Expr> {
    let tokens = tokenize(source)?;
    let mut parser = Parser::new(tokens, 0, max_depth);
    let expr = parser.expression()?;
    parser.eat_punct(";");
    parser.expect_eof()?;
    Ok(expr)
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    depth: usize,
    max_depth: usize,
}

impl Parser {
    fn new(tokens: Vec<Token>, depth: usize, max_depth: usize) -> Self {
        Self {
            tokens,
            pos: 0,
            depth,
            max_depth,
        }
    }

    // ---- token helpers ----

    fn peek(&self) -> &TokenKind {
        self.peek_at(0)
    }

    fn peek_at(&self, offset: usize) -> &TokenKind {
        self.tokens
            .get(self.pos + offset)
            .or_else(|| self.tokens.last())
            .map(|t| &t.kind)
            .unwrap_or(&TokenKind::Eof)
    }

    fn newline_before(&self) -> bool {
        self.tokens.get(self.pos).is_some_and(|t| t.newline_before)
    }

    fn current_pos(&self) -> usize {
        self.tokens.get(self.pos).map(|t| t.pos).unwrap_or(0)
    }

    fn advance(&mut self) -> TokenKind {
        let kind = self.peek().clone();
        if self.pos < self.tokens.len() {
            self.pos += 1;
        }
        kind
    }

    fn is_punct(&self, p: &str) -> bool {
        matches!(self.peek(), TokenKind::Punct(q) if *q == p)
    }

    fn is_ident(&self, name: &str) -> bool {
        matches!(self.peek(), TokenKind::Ident(n) if n == name)
    }

    fn is_eof(&self) -> bool {
        matches!(self.peek(), TokenKind::Eof)
    }

    fn eat_punct(&mut self, p: &str) -> bool {
        if self.is_punct(p) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn eat_ident(&mut self, name: &str) -> bool {
        if self.is_ident(name) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn error(&self, message: impl Into<String>) -> SandboxError {
        SandboxError::Syntax {
            pos: self.current_pos(),
            message: message.into(),
        }
    }

    fn unexpected(&self) -> SandboxError {
        match self.peek() {
            TokenKind::Eof => self.error("unexpected end of input"),
            other => self.error(format!("unexpected token {}", describe(other))),
        }
    }

    fn expect_punct(&mut self, p: &str) -> PResult<()> {
        if self.eat_punct(p) {
            Ok(())
        } else {
            Err(self.error(format!("expected '{}' but found {}", p, describe(self.peek()))))
        }
    }

    fn expect_eof(&self) -> PResult<()> {
        if self.is_eof() {
            Ok(())
        } else {
            Err(self.unexpected())
        }
    }

    fn consume_semicolon(&mut self) -> PResult<()> {
        if self.eat_punct(";") || self.is_punct("}") || self.is_eof() || self.newline_before() {
            Ok(())
        } else {
            Err(self.error(format!("expected ';' but found {}", describe(self.peek()))))
        }
    }

    fn enter(&mut self) -> PResult<()> {
        self.depth += 1;
        if self.depth > self.max_depth {
            return Err(SandboxError::LimitExceeded(format!(
                "nesting deeper than {} levels",
                self.max_depth
            )));
        }
        Ok(())
    }

    fn leave(&mut self) {
        self.depth = self.depth.saturating_sub(1);
    }

    fn binding_ident(&mut self) -> PResult<String> {
        match self.peek().clone() {
            TokenKind::Ident(name) if !RESERVED.contains(&name.as_str()) => {
                self.pos += 1;
                Ok(name)
            }
            TokenKind::Punct("[") | TokenKind::Punct("{") => {
                Err(SandboxError::Unsupported("destructuring patterns".into()))
            }
            _ => Err(self.error(format!("expected identifier but found {}", describe(self.peek())))),
        }
    }

    // ---- statements ----

    fn statement(&mut self) -> PResult<Stmt> {
        self.enter()?;
        let stmt = self.statement_inner();
        self.leave();
        stmt
    }

    fn statement_inner(&mut self) -> PResult<Stmt> {
        if self.is_punct("{") {
            return Ok(Stmt::Block(self.block()?));
        }
        if self.eat_punct(";") {
            return Ok(Stmt::Empty);
        }
        let keyword = match self.peek() {
            TokenKind::Ident(name) => name.clone(),
            _ => String::new(),
        };

        match keyword.as_str() {
            "var" | "let" | "const" => {
                let decl = self.declaration()?;
                self.consume_semicolon()?;
                Ok(decl)
            }
            "function" => {
                self.pos += 1;
                let name = self.binding_ident()?;
                let def = self.function_rest(Some(name.clone()))?;
                Ok(Stmt::Function(name, Rc::new(def)))
            }
            "return" => {
                self.pos += 1;
                let value = if self.is_punct(";")
                    || self.is_punct("}")
                    || self.is_eof()
                    || self.newline_before()
                {
                    None
                } else {
                    Some(self.expression()?)
                };
                self.consume_semicolon()?;
                Ok(Stmt::Return(value))
            }
            "if" => {
                self.pos += 1;
                self.expect_punct("(")?;
                let test = self.expression()?;
                self.expect_punct(")")?;
                let consequent = Box::new(self.statement()?);
                let alternate = if self.eat_ident("else") {
                    Some(Box::new(self.statement()?))
                } else {
                    None
                };
                Ok(Stmt::If(test, consequent, alternate))
            }
            "for" => self.for_statement(),
            "while" => {
                self.pos += 1;
                self.expect_punct("(")?;
                let test = self.expression()?;
                self.expect_punct(")")?;
                Ok(Stmt::While(test, Box::new(self.statement()?)))
            }
            "do" => {
                self.pos += 1;
                let body = Box::new(self.statement()?);
                if !self.eat_ident("while") {
                    return Err(self.error("expected 'while' after do body"));
                }
                self.expect_punct("(")?;
                let test = self.expression()?;
                self.expect_punct(")")?;
                self.eat_punct(";");
                Ok(Stmt::DoWhile(body, test))
            }
            "break" | "continue" => {
                self.pos += 1;
                if matches!(self.peek(), TokenKind::Ident(_)) && !self.newline_before() {
                    return Err(SandboxError::Unsupported("labelled statements".into()));
                }
                self.consume_semicolon()?;
                Ok(if keyword == "break" {
                    Stmt::Break
                } else {
                    Stmt::Continue
                })
            }
            "throw" => {
                self.pos += 1;
                let value = self.expression()?;
                self.consume_semicolon()?;
                Ok(Stmt::Throw(value))
            }
            "try" => self.try_statement(),
            kw if UNSUPPORTED_KEYWORDS.contains(&kw) => {
                Err(SandboxError::Unsupported(format!("'{}' statements", kw)))
            }
            _ => {
                if matches!(self.peek_at(1), TokenKind::Punct(":"))
                    && matches!(self.peek(), TokenKind::Ident(_))
                {
                    return Err(SandboxError::Unsupported("labelled statements".into()));
                }
                let expr = self.expression()?;
                self.consume_semicolon()?;
                Ok(Stmt::Expr(expr))
            }
        }
    }

    fn block(&mut self) -> PResult<Vec<Stmt>> {
        self.expect_punct("{")?;
        let mut body = Vec::new();
        while !self.is_punct("}") {
            if self.is_eof() {
                return Err(self.unexpected());
            }
            body.push(self.statement()?);
        }
        self.pos += 1;
        Ok(body)
    }

    fn decl_kind(&self) -> Option<DeclKind> {
        match self.peek() {
            TokenKind::Ident(k) if k == "var" => Some(DeclKind::Var),
            TokenKind::Ident(k) if k == "let" => Some(DeclKind::Let),
            TokenKind::Ident(k) if k == "const" => Some(DeclKind::Const),
            _ => None,
        }
    }

    fn declaration(&mut self) -> PResult<Stmt> {
        let kind = self.decl_kind().ok_or_else(|| self.unexpected())?;
        self.pos += 1;
        let mut decls = Vec::new();
        loop {
            let name = self.binding_ident()?;
            let init = if self.eat_punct("=") {
                Some(self.assignment()?)
            } else {
                None
            };
            decls.push((name, init));
            if !self.eat_punct(",") {
                break;
            }
        }
        Ok(Stmt::Decl(kind, decls))
    }

    fn for_statement(&mut self) -> PResult<Stmt> {
        self.pos += 1;
        self.expect_punct("(")?;

        let each_at = |p: &Parser, offset: usize| -> Option<bool> {
            match (p.peek_at(offset), p.peek_at(offset + 1)) {
                (TokenKind::Ident(name), TokenKind::Ident(kw))
                    if !RESERVED.contains(&name.as_str()) && (kw == "of" || kw == "in") =>
                {
                    Some(kw == "of")
                }
                _ => None,
            }
        };

        let kind = self.decl_kind();
        let each = if kind.is_some() {
            each_at(&*self, 1)
        } else {
            each_at(&*self, 0)
        };

        if let Some(of) = each {
            if kind.is_some() {
                self.pos += 1;
            }
            let name = self.binding_ident()?;
            self.pos += 1;
            let iterable = if of {
                self.assignment()?
            } else {
                self.expression()?
            };
            self.expect_punct(")")?;
            let body = Box::new(self.statement()?);
            return Ok(Stmt::ForEach {
                kind,
                name,
                of,
                iterable,
                body,
            });
        }

        let init = if self.eat_punct(";") {
            None
        } else {
            let init = if kind.is_some() {
                self.declaration()?
            } else {
                Stmt::Expr(self.expression()?)
            };
            self.expect_punct(";")?;
            Some(Box::new(init))
        };
        let test = if self.is_punct(";") {
            None
        } else {
            Some(self.expression()?)
        };
        self.expect_punct(";")?;
        let update = if self.is_punct(")") {
            None
        } else {
            Some(self.expression()?)
        };
        self.expect_punct(")")?;
        let body = Box::new(self.statement()?);
        Ok(Stmt::For {
            init,
            test,
            update,
            body,
        })
    }

    fn try_statement(&mut self) -> PResult<Stmt> {
        self.pos += 1;
        let block = self.block()?;
        let mut param = None;
        let mut handler = None;
        if self.eat_ident("catch") {
            if self.eat_punct("(") {
                param = Some(self.binding_ident()?);
                self.expect_punct(")")?;
            }
            handler = Some(self.block()?);
        }
        let finalizer = if self.eat_ident("finally") {
            Some(self.block()?)
        } else {
            None
        };
        if handler.is_none() && finalizer.is_none() {
            return Err(self.error("missing catch or finally after try"));
        }
        Ok(Stmt::Try {
            block,
            param,
            handler,
            finalizer,
        })
    }

    // ---- functions ----

    fn params(&mut self) -> PResult<Vec<Param>> {
        self.expect_punct("(")?;
        let mut params = Vec::new();
        while !self.is_punct(")") {
            let rest = self.eat_punct("...");
            let name = self.binding_ident()?;
            let default = if self.eat_punct("=") {
                Some(self.assignment()?)
            } else {
                None
            };
            params.push(Param {
                name,
                default,
                rest,
            });
            if rest || !self.eat_punct(",") {
                break;
            }
        }
        self.expect_punct(")")?;
        Ok(params)
    }

    fn function_rest(&mut self, name: Option<String>) -> PResult<FunctionDef> {
        let params = self.params()?;
        let body = self.block()?;
        Ok(FunctionDef {
            name,
            params,
            body: FunctionBody::Block(body),
            is_arrow: false,
        })
    }

    fn is_arrow_ahead(&self) -> bool {
        match self.peek() {
            TokenKind::Ident(name) if !RESERVED.contains(&name.as_str()) => {
                matches!(self.peek_at(1), TokenKind::Punct("=>"))
            }
            TokenKind::Punct("(") => {
                let mut depth = 0usize;
                let mut idx = self.pos;
                while let Some(tok) = self.tokens.get(idx) {
                    match tok.kind {
                        TokenKind::Punct("(") | TokenKind::Punct("[") | TokenKind::Punct("{") => {
                            depth += 1
                        }
                        TokenKind::Punct(")") | TokenKind::Punct("]") | TokenKind::Punct("}") => {
                            depth = depth.saturating_sub(1);
                            if depth == 0 {
                                return matches!(
                                    self.tokens.get(idx + 1).map(|t| &t.kind),
                                    Some(TokenKind::Punct("=>"))
                                );
                            }
                        }
                        TokenKind::Eof => return false,
                        _ => {}
                    }
                    idx += 1;
                }
                false
            }
            _ => false,
        }
    }

    fn arrow_function(&mut self) -> PResult<Expr> {
        let params = if self.is_punct("(") {
            self.params()?
        } else {
            vec![Param {
                name: self.binding_ident()?,
                default: None,
                rest: false,
            }]
        };
        if self.newline_before() {
            return Err(self.error("line break before '=>'"));
        }
        self.expect_punct("=>")?;
        let body = if self.is_punct("{") {
            FunctionBody::Block(self.block()?)
        } else {
            FunctionBody::Expr(Box::new(self.assignment()?))
        };
        Ok(Expr::Function(Rc::new(FunctionDef {
            name: None,
            params,
            body,
            is_arrow: true,
        })))
    }

    // ---- expressions ----

    fn expression(&mut self) -> PResult<Expr> {
        let first = self.assignment()?;
        if !self.is_punct(",") {
            return Ok(first);
        }
        let mut items = vec![first];
        while self.eat_punct(",") {
            items.push(self.assignment()?);
        }
        Ok(Expr::Sequence(items))
    }

    fn assignment(&mut self) -> PResult<Expr> {
        if self.is_ident("async")
            && (matches!(self.peek_at(1), TokenKind::Ident(k) if k == "function")
                || self.async_arrow_ahead())
        {
            return Err(SandboxError::Unsupported("async functions".into()));
        }
        if self.is_arrow_ahead() {
            return self.arrow_function();
        }

        let target = self.conditional()?;
        let op = match self.peek() {
            TokenKind::Punct(p) => assign_op(p),
            _ => None,
        };
        let Some(op) = op else {
            return Ok(target);
        };
        if !matches!(target, Expr::Ident(_) | Expr::Member { .. }) {
            return Err(self.error("invalid assignment target"));
        }
        self.pos += 1;
        let value = self.assignment()?;
        Ok(Expr::Assign(op, Box::new(target), Box::new(value)))
    }

    fn async_arrow_ahead(&self) -> bool {
        let mut probe = Parser::new(self.tokens.clone(), 0, self.max_depth);
        probe.pos = self.pos + 1;
        probe.is_arrow_ahead()
    }

    fn conditional(&mut self) -> PResult<Expr> {
        let test = self.binary(1)?;
        if !self.eat_punct("?") {
            return Ok(test);
        }
        let consequent = self.assignment()?;
        self.expect_punct(":")?;
        let alternate = self.assignment()?;
        Ok(Expr::Conditional(
            Box::new(test),
            Box::new(consequent),
            Box::new(alternate),
        ))
    }

    fn binary(&mut self, min_prec: u8) -> PResult<Expr> {
        let base = self.depth;
        let expr = self.binary_chain(min_prec);
        self.depth = base;
        expr
    }

    /// Every link of a left-associative chain nests the tree one level and
    /// is charged against the depth budget.
    fn binary_chain(&mut self, min_prec: u8) -> PResult<Expr> {
        let mut left = self.unary()?;
        loop {
            let Some((op, prec)) = binary_op(self.peek()) else {
                break;
            };
            if prec < min_prec {
                break;
            }
            if self.is_ident("instanceof") {
                return Err(SandboxError::Unsupported("instanceof".into()));
            }
            self.enter()?;
            self.pos += 1;
            // `**` is right-associative
            let next = if matches!(op, BinOrLogical::Bin(BinaryOp::Exp)) {
                prec
            } else {
                prec + 1
            };
            let right = self.binary(next)?;
            left = match op {
                BinOrLogical::Bin(op) => Expr::Binary(op, Box::new(left), Box::new(right)),
                BinOrLogical::Logical(op) => Expr::Logical(op, Box::new(left), Box::new(right)),
            };
        }
        Ok(left)
    }

    fn unary(&mut self) -> PResult<Expr> {
        self.enter()?;
        let expr = self.unary_inner();
        self.leave();
        expr
    }

    fn unary_inner(&mut self) -> PResult<Expr> {
        let op = match self.peek() {
            TokenKind::Punct("!") => Some(UnaryOp::Not),
            TokenKind::Punct("-") => Some(UnaryOp::Neg),
            TokenKind::Punct("+") => Some(UnaryOp::Plus),
            TokenKind::Punct("~") => Some(UnaryOp::BitNot),
            TokenKind::Ident(k) if k == "typeof" => Some(UnaryOp::Typeof),
            TokenKind::Ident(k) if k == "void" => Some(UnaryOp::Void),
            _ => None,
        };
        if let Some(op) = op {
            self.pos += 1;
            return Ok(Expr::Unary(op, Box::new(self.unary()?)));
        }
        if self.eat_ident("delete") {
            return Ok(Expr::Delete(Box::new(self.unary()?)));
        }
        if self.is_ident("await") {
            return Err(SandboxError::Unsupported("await".into()));
        }
        if self.is_punct("++") || self.is_punct("--") {
            let increment = self.is_punct("++");
            self.pos += 1;
            let target = self.unary()?;
            ensure_assignable(&target, self)?;
            return Ok(Expr::Update {
                increment,
                prefix: true,
                target: Box::new(target),
            });
        }
        self.postfix()
    }

    fn postfix(&mut self) -> PResult<Expr> {
        let expr = self.call_member()?;
        if (self.is_punct("++") || self.is_punct("--")) && !self.newline_before() {
            ensure_assignable(&expr, self)?;
            let increment = self.is_punct("++");
            self.pos += 1;
            return Ok(Expr::Update {
                increment,
                prefix: false,
                target: Box::new(expr),
            });
        }
        Ok(expr)
    }

    fn call_member(&mut self) -> PResult<Expr> {
        let base = self.depth;
        let expr = self.call_member_chain();
        self.depth = base;
        expr
    }

    fn call_member_chain(&mut self) -> PResult<Expr> {
        let mut expr = if self.eat_ident("new") {
            let callee = self.member_only()?;
            let args = if self.is_punct("(") {
                self.arguments()?
            } else {
                Vec::new()
            };
            Expr::New(Box::new(callee), args)
        } else {
            self.primary()?
        };

        let mut optional_chain = false;
        loop {
            if self.is_punct(".")
                || self.is_punct("?.")
                || self.is_punct("[")
                || self.is_punct("(")
            {
                self.enter()?;
            }
            if self.eat_punct(".") {
                let name = self.property_name()?;
                expr = member(expr, PropKey::Static(name), false);
            } else if self.eat_punct("?.") {
                optional_chain = true;
                if self.is_punct("(") {
                    let args = self.arguments()?;
                    expr = Expr::Call {
                        callee: Box::new(expr),
                        args,
                        optional: true,
                    };
                } else if self.eat_punct("[") {
                    let key = self.expression()?;
                    self.expect_punct("]")?;
                    expr = member(expr, PropKey::Computed(key), true);
                } else {
                    let name = self.property_name()?;
                    expr = member(expr, PropKey::Static(name), true);
                }
            } else if self.eat_punct("[") {
                let key = self.expression()?;
                self.expect_punct("]")?;
                expr = member(expr, PropKey::Computed(key), false);
            } else if self.is_punct("(") {
                let args = self.arguments()?;
                expr = Expr::Call {
                    callee: Box::new(expr),
                    args,
                    optional: false,
                };
            } else if matches!(self.peek(), TokenKind::Template { .. }) && !self.newline_before() {
                return Err(SandboxError::Unsupported("tagged templates".into()));
            } else {
                break;
            }
        }

        Ok(if optional_chain {
            Expr::OptionalChain(Box::new(expr))
        } else {
            expr
        })
    }

    fn member_only(&mut self) -> PResult<Expr> {
        let base = self.depth;
        let expr = self.member_only_chain();
        self.depth = base;
        expr
    }

    fn member_only_chain(&mut self) -> PResult<Expr> {
        let mut expr = self.primary()?;
        loop {
            if self.is_punct(".") || self.is_punct("[") {
                self.enter()?;
            }
            if self.eat_punct(".") {
                let name = self.property_name()?;
                expr = member(expr, PropKey::Static(name), false);
            } else if self.eat_punct("[") {
                let key = self.expression()?;
                self.expect_punct("]")?;
                expr = member(expr, PropKey::Computed(key), false);
            } else {
                return Ok(expr);
            }
        }
    }

    fn property_name(&mut self) -> PResult<String> {
        match self.advance() {
            TokenKind::Ident(name) => Ok(name),
            _ => {
                self.pos -= 1;
                Err(self.error("expected property name"))
            }
        }
    }

    fn arguments(&mut self) -> PResult<Vec<ArrayElem>> {
        self.expect_punct("(")?;
        let mut args = Vec::new();
        while !self.is_punct(")") {
            if self.eat_punct("...") {
                args.push(ArrayElem::Spread(self.assignment()?));
            } else {
                args.push(ArrayElem::Item(self.assignment()?));
            }
            if !self.eat_punct(",") {
                break;
            }
        }
        self.expect_punct(")")?;
        Ok(args)
    }

    fn primary(&mut self) -> PResult<Expr> {
        match self.advance() {
            TokenKind::Num(n) => Ok(Expr::Number(n)),
            TokenKind::Str(s) => Ok(Expr::Str(s)),
            TokenKind::Template { quasis, exprs } => {
                let mut parts = Vec::with_capacity(exprs.len());
                for tokens in exprs {
                    let mut sub = Parser::new(tokens, self.depth, self.max_depth);
                    let expr = sub.expression()?;
                    sub.expect_eof()?;
                    parts.push(expr);
                }
                Ok(Expr::Template(quasis, parts))
            }
            TokenKind::Ident(name) => match name.as_str() {
                "true" => Ok(Expr::Bool(true)),
                "false" => Ok(Expr::Bool(false)),
                "null" => Ok(Expr::Null),
                "this" => Ok(Expr::This),
                "function" => {
                    let fn_name = match self.peek() {
                        TokenKind::Ident(_) => Some(self.binding_ident()?),
                        _ => None,
                    };
                    Ok(Expr::Function(Rc::new(self.function_rest(fn_name)?)))
                }
                kw if UNSUPPORTED_KEYWORDS.contains(&kw) => {
                    Err(SandboxError::Unsupported(format!("'{}'", kw)))
                }
                kw if RESERVED.contains(&kw) => {
                    self.pos -= 1;
                    Err(self.unexpected())
                }
                _ => Ok(Expr::Ident(name.clone())),
            },
            TokenKind::Punct("(") => {
                let expr = self.expression()?;
                self.expect_punct(")")?;
                Ok(expr)
            }
            TokenKind::Punct("[") => self.array_literal(),
            TokenKind::Punct("{") => self.object_literal(),
            TokenKind::Punct("/") | TokenKind::Punct("/=") => {
                Err(SandboxError::Unsupported("regular expression literals".into()))
            }
            _ => {
                self.pos = self.pos.saturating_sub(1);
                Err(self.unexpected())
            }
        }
    }

    fn array_literal(&mut self) -> PResult<Expr> {
        let mut items = Vec::new();
        loop {
            if self.eat_punct("]") {
                break;
            }
            if self.eat_punct(",") {
                items.push(ArrayElem::Hole);
                continue;
            }
            let item = if self.eat_punct("...") {
                ArrayElem::Spread(self.assignment()?)
            } else {
                ArrayElem::Item(self.assignment()?)
            };
            items.push(item);
            if !self.is_punct("]") {
                self.expect_punct(",")?;
            }
        }
        Ok(Expr::Array(items))
    }

    fn object_literal(&mut self) -> PResult<Expr> {
        let mut props = Vec::new();
        loop {
            if self.eat_punct("}") {
                break;
            }
            if self.eat_punct("...") {
                props.push(ObjectProp::Spread(self.assignment()?));
            } else {
                let (key, bare_ident) = match self.advance() {
                    TokenKind::Ident(name) => (PropKey::Static(name.clone()), Some(name)),
                    TokenKind::Str(s) => (PropKey::Static(s), None),
                    TokenKind::Num(n) => (PropKey::Static(number_to_string(n)), None),
                    TokenKind::Punct("[") => {
                        let key = self.assignment()?;
                        self.expect_punct("]")?;
                        (PropKey::Computed(key), None)
                    }
                    _ => {
                        self.pos -= 1;
                        return Err(self.error("expected property key"));
                    }
                };

                let value = if self.eat_punct(":") {
                    self.assignment()?
                } else if self.is_punct("(") {
                    let name = match &key {
                        PropKey::Static(s) => Some(s.clone()),
                        PropKey::Computed(_) => None,
                    };
                    Expr::Function(Rc::new(self.function_rest(name)?))
                } else if let Some(name) = bare_ident.filter(|_| self.is_punct(",") || self.is_punct("}")) {
                    if RESERVED.contains(&name.as_str()) {
                        return Err(self.error(format!("'{}' cannot be a shorthand property", name)));
                    }
                    Expr::Ident(name)
                } else if matches!(&key, PropKey::Static(k) if k == "get" || k == "set") {
                    return Err(SandboxError::Unsupported("accessor properties".into()));
                } else {
                    return Err(self.error(format!("expected ':' but found {}", describe(self.peek()))));
                };
                props.push(ObjectProp::KeyValue(key, value));
            }
            if !self.is_punct("}") {
                self.expect_punct(",")?;
            }
        }
        Ok(Expr::Object(props))
    }
}

enum BinOrLogical {
    Bin(BinaryOp),
    Logical(LogicalOp),
}

fn binary_op(kind: &TokenKind) -> Option<(BinOrLogical, u8)> {
    use BinOrLogical::{Bin, Logical};
    let entry = match kind {
        TokenKind::Punct(p) => match *p {
            "??" => (Logical(LogicalOp::Nullish), 1),
            "||" => (Logical(LogicalOp::Or), 2),
            "&&" => (Logical(LogicalOp::And), 3),
            "|" => (Bin(BinaryOp::BitOr), 4),
            "^" => (Bin(BinaryOp::BitXor), 5),
            "&" => (Bin(BinaryOp::BitAnd), 6),
            "==" => (Bin(BinaryOp::Eq), 7),
            "!=" => (Bin(BinaryOp::NotEq), 7),
            "===" => (Bin(BinaryOp::StrictEq), 7),
            "!==" => (Bin(BinaryOp::StrictNotEq), 7),
            "<" => (Bin(BinaryOp::Lt), 8),
            ">" => (Bin(BinaryOp::Gt), 8),
            "<=" => (Bin(BinaryOp::LtEq), 8),
            ">=" => (Bin(BinaryOp::GtEq), 8),
            "<<" => (Bin(BinaryOp::Shl), 9),
            ">>" => (Bin(BinaryOp::Shr), 9),
            ">>>" => (Bin(BinaryOp::UShr), 9),
            "+" => (Bin(BinaryOp::Add), 10),
            "-" => (Bin(BinaryOp::Sub), 10),
            "*" => (Bin(BinaryOp::Mul), 11),
            "/" => (Bin(BinaryOp::Div), 11),
            "%" => (Bin(BinaryOp::Rem), 11),
            "**" => (Bin(BinaryOp::Exp), 12),
            _ => return None,
        },
        TokenKind::Ident(k) if k == "in" => (Bin(BinaryOp::In), 8),
        // Reported as unsupported by the caller.
        TokenKind::Ident(k) if k == "instanceof" => (Bin(BinaryOp::In), 8),
        _ => return None,
    };
    Some(entry)
}

fn assign_op(p: &str) -> Option<AssignOp> {
    let op = match p {
        "=" => AssignOp::Assign,
        "+=" => AssignOp::Binary(BinaryOp::Add),
        "-=" => AssignOp::Binary(BinaryOp::Sub),
        "*=" => AssignOp::Binary(BinaryOp::Mul),
        "/=" => AssignOp::Binary(BinaryOp::Div),
        "%=" => AssignOp::Binary(BinaryOp::Rem),
        "**=" => AssignOp::Binary(BinaryOp::Exp),
        "<<=" => AssignOp::Binary(BinaryOp::Shl),
        ">>=" => AssignOp::Binary(BinaryOp::Shr),
        ">>>=" => AssignOp::Binary(BinaryOp::UShr),
        "&=" => AssignOp::Binary(BinaryOp::BitAnd),
        "|=" => AssignOp::Binary(BinaryOp::BitOr),
        "^=" => AssignOp::Binary(BinaryOp::BitXor),
        "&&=" => AssignOp::Logical(LogicalOp::And),
        "||=" => AssignOp::Logical(LogicalOp::Or),
        "??=" => AssignOp::Logical(LogicalOp::Nullish),
        _ => return None,
    };
    Some(op)
}

fn member(object: Expr, key: PropKey, optional: bool) -> Expr {
    Expr::Member {
        object: Box::new(object),
        property: Box::new(key),
        optional,
    }
}

fn ensure_assignable(expr: &Expr, parser: &Parser) -> PResult<()> {
    match expr {
        Expr::Ident(_) | Expr::Member { .. } => Ok(()),
        _ => Err(parser.error("invalid update target")),
    }
}

fn describe(kind: &TokenKind) -> String {
    match kind {
        TokenKind::Num(n) => format!("number {}", number_to_string(*n)),
        TokenKind::Str(_) => "string literal".to_string(),
        TokenKind::Template { .. } => "template literal".to_string(),
        TokenKind::Ident(name) => format!("'{}'", name),
        TokenKind::Punct(p) => format!("'{}'", p),
        TokenKind::Eof => "end of input".to_string(),
    }
}

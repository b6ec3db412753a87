//! Recursive-descent parser producing arena nodes.
//!
//! Covers the surface subset the expansion pipeline observes; everything
//! else is a parse error. Type annotations on parameters and return
//! positions are accepted and discarded; annotations on variable
//! declarations and interface fields are kept (they survive printing).

use typesugar_pos::{BytePos, Span};

use crate::ast::{Arena, BinOp, ImportSpecifier, NodeId, NodeKind, UnOp, VarKind};
use crate::parse::lexer::{TemplateToken, Token, TokenKind};
use crate::parse::{PResult, Session};

pub struct Parser<'a, 'ar> {
    sess: &'a Session,
    arena: &'ar mut Arena,
    tokens: Vec<Token>,
    pos: usize,
}

impl<'a, 'ar> Parser<'a, 'ar> {
    pub fn new(sess: &'a Session, arena: &'ar mut Arena, tokens: Vec<Token>) -> Parser<'a, 'ar> {
        Parser {
            sess,
            arena,
            tokens,
            pos: 0,
        }
    }

    fn token(&self) -> &TokenKind {
        &self.tokens[self.pos].kind
    }

    fn nth(&self, n: usize) -> &TokenKind {
        let index = (self.pos + n).min(self.tokens.len() - 1);
        &self.tokens[index].kind
    }

    fn span(&self) -> Span {
        self.tokens[self.pos].span
    }

    fn prev_hi(&self) -> BytePos {
        if self.pos == 0 {
            self.tokens[0].span.lo
        } else {
            self.tokens[self.pos - 1].span.hi
        }
    }

    fn bump(&mut self) -> TokenKind {
        let kind = self.tokens[self.pos].kind.clone();
        if self.pos + 1 < self.tokens.len() {
            self.pos += 1;
        }
        kind
    }

    fn check(&self, kind: &TokenKind) -> bool {
        self.token() == kind
    }

    fn eat(&mut self, kind: &TokenKind) -> bool {
        if self.check(kind) {
            self.bump();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, kind: &TokenKind, what: &str) -> PResult<'a, ()> {
        if self.eat(kind) {
            Ok(())
        } else {
            Err(self.err(&format!("expected {}, found {:?}", what, self.token())))
        }
    }

    fn err(&self, msg: &str) -> typesugar_errors::DiagnosticBuilder<'a> {
        self.sess
            .span_diagnostic
            .struct_span_err_with_code(self.span(), msg, "TS0001")
    }

    fn is_kw(&self, kw: &str) -> bool {
        matches!(self.token(), TokenKind::Ident(name) if name == kw)
    }

    fn eat_kw(&mut self, kw: &str) -> bool {
        if self.is_kw(kw) {
            self.bump();
            true
        } else {
            false
        }
    }

    fn expect_ident(&mut self, what: &str) -> PResult<'a, String> {
        match self.token().clone() {
            TokenKind::Ident(name) => {
                self.bump();
                Ok(name)
            }
            other => Err(self.err(&format!("expected {}, found {:?}", what, other))),
        }
    }

    fn eat_semi(&mut self) {
        while self.eat(&TokenKind::Semi) {}
    }

    // ---- entry points ----

    pub fn parse_module(mut self) -> PResult<'a, NodeId> {
        let lo = self.span().lo;
        let mut body = Vec::new();
        while !self.check(&TokenKind::Eof) {
            body.push(self.parse_stmt()?);
        }
        let span = Span::new(lo, self.prev_hi());
        Ok(self.arena.alloc(NodeKind::Module { body }, span))
    }

    pub fn parse_stmt_list_snippet(mut self) -> PResult<'a, Vec<NodeId>> {
        let mut stmts = Vec::new();
        while !self.check(&TokenKind::Eof) {
            stmts.push(self.parse_stmt()?);
        }
        Ok(stmts)
    }

    pub fn parse_expr_snippet(mut self) -> PResult<'a, NodeId> {
        let expr = self.parse_expr()?;
        if !self.check(&TokenKind::Eof) {
            return Err(self.err("unexpected trailing tokens after expression"));
        }
        Ok(expr)
    }

    // ---- statements ----

    fn parse_stmt(&mut self) -> PResult<'a, NodeId> {
        if self.check(&TokenKind::At) {
            return self.parse_decorated();
        }
        if self.is_kw("import") {
            return self.parse_import();
        }
        if self.is_kw("const") {
            return self.parse_var_decl(VarKind::Const, true);
        }
        if self.is_kw("let") {
            return self.parse_var_decl(VarKind::Let, true);
        }
        if self.is_kw("var") {
            return self.parse_var_decl(VarKind::Var, true);
        }
        if self.is_kw("function") {
            return self.parse_function(Vec::new());
        }
        if self.is_kw("class") {
            return self.parse_class(Vec::new());
        }
        if self.is_kw("interface") {
            return self.parse_interface(Vec::new());
        }
        if self.is_kw("enum") {
            return self.parse_enum();
        }
        if self.is_kw("type")
            && matches!(self.nth(1), TokenKind::Ident(_))
            && matches!(self.nth(2), TokenKind::Assign | TokenKind::Lt)
        {
            return self.parse_type_alias(Vec::new());
        }
        if self.is_kw("return") {
            let lo = self.span().lo;
            self.bump();
            let arg = if self.check(&TokenKind::Semi)
                || self.check(&TokenKind::RBrace)
                || self.check(&TokenKind::Eof)
            {
                None
            } else {
                Some(self.parse_expr()?)
            };
            let span = Span::new(lo, self.prev_hi());
            self.eat_semi();
            return Ok(self.arena.alloc(NodeKind::Return { arg }, span));
        }
        if self.is_kw("if") {
            return self.parse_if();
        }
        if self.is_kw("while") {
            let lo = self.span().lo;
            self.bump();
            self.expect(&TokenKind::LParen, "`(`")?;
            let test = self.parse_expr()?;
            self.expect(&TokenKind::RParen, "`)`")?;
            let body = self.parse_stmt()?;
            let span = Span::new(lo, self.prev_hi());
            return Ok(self.arena.alloc(NodeKind::While { test, body }, span));
        }
        if self.is_kw("for") {
            return self.parse_for();
        }
        if self.is_kw("break") {
            let span = self.span();
            self.bump();
            self.eat_semi();
            return Ok(self.arena.alloc(NodeKind::Break, span));
        }
        if self.is_kw("continue") {
            let span = self.span();
            self.bump();
            self.eat_semi();
            return Ok(self.arena.alloc(NodeKind::Continue, span));
        }
        if self.is_kw("throw") {
            let lo = self.span().lo;
            self.bump();
            let arg = self.parse_expr()?;
            let span = Span::new(lo, self.prev_hi());
            self.eat_semi();
            return Ok(self.arena.alloc(NodeKind::Throw { arg }, span));
        }
        if self.check(&TokenKind::LBrace) {
            return self.parse_block();
        }
        // A labeled statement: an identifier directly followed by `:`.
        if matches!(self.token(), TokenKind::Ident(_)) && self.nth(1) == &TokenKind::Colon {
            let lo = self.span().lo;
            let label = self.expect_ident("label")?;
            self.bump(); // `:`
            let body = self.parse_stmt()?;
            let span = Span::new(lo, self.prev_hi());
            return Ok(self.arena.alloc(NodeKind::Labeled { label, body }, span));
        }

        let lo = self.span().lo;
        let expr = self.parse_expr()?;
        let span = Span::new(lo, self.prev_hi());
        self.eat_semi();
        Ok(self.arena.alloc(NodeKind::ExprStmt { expr }, span))
    }

    fn parse_decorated(&mut self) -> PResult<'a, NodeId> {
        let mut decorators = Vec::new();
        while self.check(&TokenKind::At) {
            let lo = self.span().lo;
            self.bump();
            let name = self.expect_ident("decorator name")?;
            let name_span = Span::new(lo, self.prev_hi());
            let ident = self
                .arena
                .alloc(NodeKind::Ident { name }, name_span);
            let expr = if self.check(&TokenKind::LParen) {
                let args = self.parse_call_args()?;
                let span = Span::new(lo, self.prev_hi());
                self.arena.alloc(
                    NodeKind::Call {
                        callee: ident,
                        args,
                    },
                    span,
                )
            } else {
                ident
            };
            let span = Span::new(lo, self.prev_hi());
            decorators.push(self.arena.alloc(NodeKind::Decorator { expr }, span));
        }
        if self.is_kw("class") {
            self.parse_class(decorators)
        } else if self.is_kw("interface") {
            self.parse_interface(decorators)
        } else if self.is_kw("function") {
            self.parse_function(decorators)
        } else if self.is_kw("type") {
            self.parse_type_alias(decorators)
        } else {
            Err(self.err("decorators may only precede a class, interface, function or type alias"))
        }
    }

    fn parse_import(&mut self) -> PResult<'a, NodeId> {
        let lo = self.span().lo;
        self.bump(); // `import`
        let mut specifiers = Vec::new();

        if let TokenKind::Str(source) = self.token().clone() {
            // Side-effect import: `import "m";`
            self.bump();
            let span = Span::new(lo, self.prev_hi());
            self.eat_semi();
            return Ok(self
                .arena
                .alloc(NodeKind::ImportDecl { specifiers, source }, span));
        }

        let mut expect_clause = true;
        if let TokenKind::Ident(name) = self.token().clone() {
            if name != "from" {
                self.bump();
                specifiers.push(ImportSpecifier::Default { local: name });
                expect_clause = self.eat(&TokenKind::Comma);
            }
        }
        if expect_clause {
            if self.eat(&TokenKind::Star) {
                if !self.eat_kw("as") {
                    return Err(self.err("expected `as` after `*` in namespace import"));
                }
                let local = self.expect_ident("namespace alias")?;
                specifiers.push(ImportSpecifier::Namespace { local });
            } else if self.eat(&TokenKind::LBrace) {
                loop {
                    if self.eat(&TokenKind::RBrace) {
                        break;
                    }
                    let imported = self.expect_ident("import specifier")?;
                    let local = if self.eat_kw("as") {
                        self.expect_ident("import alias")?
                    } else {
                        imported.clone()
                    };
                    specifiers.push(ImportSpecifier::Named { imported, local });
                    if !self.eat(&TokenKind::Comma) {
                        self.expect(&TokenKind::RBrace, "`}`")?;
                        break;
                    }
                }
            }
        }
        if !self.eat_kw("from") {
            return Err(self.err("expected `from` in import declaration"));
        }
        let source = match self.token().clone() {
            TokenKind::Str(s) => {
                self.bump();
                s
            }
            _ => return Err(self.err("expected module specifier string")),
        };
        let span = Span::new(lo, self.prev_hi());
        self.eat_semi();
        Ok(self
            .arena
            .alloc(NodeKind::ImportDecl { specifiers, source }, span))
    }

    fn parse_var_decl(&mut self, kind: VarKind, consume_semi: bool) -> PResult<'a, NodeId> {
        let lo = self.span().lo;
        self.bump(); // the keyword
        let pattern = self.parse_pattern()?;
        let ty = if self.eat(&TokenKind::Colon) {
            Some(self.parse_type()?)
        } else {
            None
        };
        let init = if self.eat(&TokenKind::Assign) {
            Some(self.parse_expr()?)
        } else {
            None
        };
        let span = Span::new(lo, self.prev_hi());
        if consume_semi {
            self.eat_semi();
        }
        Ok(self.arena.alloc(
            NodeKind::VarDecl {
                kind,
                pattern,
                ty,
                init,
            },
            span,
        ))
    }

    fn parse_pattern(&mut self) -> PResult<'a, NodeId> {
        let lo = self.span().lo;
        if self.eat(&TokenKind::LBrace) {
            let mut props = Vec::new();
            loop {
                if self.eat(&TokenKind::RBrace) {
                    break;
                }
                let key = self.expect_ident("binding name")?;
                let value = if self.eat(&TokenKind::Colon) {
                    self.parse_pattern()?
                } else {
                    let span = Span::new(lo, self.prev_hi());
                    self.arena.alloc(NodeKind::Ident { name: key.clone() }, span)
                };
                props.push((key, value));
                if !self.eat(&TokenKind::Comma) {
                    self.expect(&TokenKind::RBrace, "`}`")?;
                    break;
                }
            }
            let span = Span::new(lo, self.prev_hi());
            return Ok(self.arena.alloc(NodeKind::ObjectPat { props }, span));
        }
        if self.eat(&TokenKind::LBracket) {
            let mut elements = Vec::new();
            loop {
                if self.eat(&TokenKind::RBracket) {
                    break;
                }
                elements.push(self.parse_pattern()?);
                if !self.eat(&TokenKind::Comma) {
                    self.expect(&TokenKind::RBracket, "`]`")?;
                    break;
                }
            }
            let span = Span::new(lo, self.prev_hi());
            return Ok(self.arena.alloc(NodeKind::ArrayPat { elements }, span));
        }
        let name = self.expect_ident("binding name")?;
        let span = Span::new(lo, self.prev_hi());
        Ok(self.arena.alloc(NodeKind::Ident { name }, span))
    }

    fn parse_function(&mut self, decorators: Vec<NodeId>) -> PResult<'a, NodeId> {
        let lo = self.span().lo;
        self.bump(); // `function`
        let name = self.expect_ident("function name")?;
        let params = self.parse_params()?;
        if self.eat(&TokenKind::Colon) {
            // Return type annotations are accepted and discarded.
            self.parse_type()?;
        }
        let body = self.parse_block()?;
        let span = Span::new(lo, self.prev_hi());
        Ok(self.arena.alloc(
            NodeKind::FuncDecl {
                name,
                decorators,
                params,
                body,
            },
            span,
        ))
    }

    fn parse_params(&mut self) -> PResult<'a, Vec<NodeId>> {
        self.expect(&TokenKind::LParen, "`(`")?;
        let mut params = Vec::new();
        loop {
            if self.eat(&TokenKind::RParen) {
                break;
            }
            let lo = self.span().lo;
            let name = self.expect_ident("parameter name")?;
            let span = Span::new(lo, self.prev_hi());
            if self.eat(&TokenKind::Colon) {
                self.parse_type()?;
            }
            params.push(self.arena.alloc(NodeKind::Ident { name }, span));
            if !self.eat(&TokenKind::Comma) {
                self.expect(&TokenKind::RParen, "`)`")?;
                break;
            }
        }
        Ok(params)
    }

    fn parse_block(&mut self) -> PResult<'a, NodeId> {
        let lo = self.span().lo;
        self.expect(&TokenKind::LBrace, "`{`")?;
        let mut stmts = Vec::new();
        while !self.eat(&TokenKind::RBrace) {
            if self.check(&TokenKind::Eof) {
                return Err(self.err("unexpected end of file in block"));
            }
            stmts.push(self.parse_stmt()?);
        }
        let span = Span::new(lo, self.prev_hi());
        Ok(self.arena.alloc(NodeKind::Block { stmts }, span))
    }

    fn parse_if(&mut self) -> PResult<'a, NodeId> {
        let lo = self.span().lo;
        self.bump(); // `if`
        self.expect(&TokenKind::LParen, "`(`")?;
        let test = self.parse_expr()?;
        self.expect(&TokenKind::RParen, "`)`")?;
        let then = self.parse_stmt()?;
        let alt = if self.eat_kw("else") {
            Some(self.parse_stmt()?)
        } else {
            None
        };
        let span = Span::new(lo, self.prev_hi());
        Ok(self.arena.alloc(NodeKind::If { test, then, alt }, span))
    }

    fn parse_for(&mut self) -> PResult<'a, NodeId> {
        let lo = self.span().lo;
        self.bump(); // `for`
        self.expect(&TokenKind::LParen, "`(`")?;
        let init = if self.eat(&TokenKind::Semi) {
            None
        } else {
            let stmt = if self.is_kw("const") {
                self.parse_var_decl(VarKind::Const, false)?
            } else if self.is_kw("let") {
                self.parse_var_decl(VarKind::Let, false)?
            } else if self.is_kw("var") {
                self.parse_var_decl(VarKind::Var, false)?
            } else {
                let expr = self.parse_expr()?;
                let span = self.arena.span(expr);
                self.arena.alloc(NodeKind::ExprStmt { expr }, span)
            };
            self.expect(&TokenKind::Semi, "`;`")?;
            Some(stmt)
        };
        let test = if self.check(&TokenKind::Semi) {
            None
        } else {
            Some(self.parse_expr()?)
        };
        self.expect(&TokenKind::Semi, "`;`")?;
        let update = if self.check(&TokenKind::RParen) {
            None
        } else {
            Some(self.parse_expr()?)
        };
        self.expect(&TokenKind::RParen, "`)`")?;
        let body = self.parse_stmt()?;
        let span = Span::new(lo, self.prev_hi());
        Ok(self.arena.alloc(
            NodeKind::For {
                init,
                test,
                update,
                body,
            },
            span,
        ))
    }

    fn parse_class(&mut self, decorators: Vec<NodeId>) -> PResult<'a, NodeId> {
        let lo = self.span().lo;
        self.bump(); // `class`
        let name = self.expect_ident("class name")?;
        self.expect(&TokenKind::LBrace, "`{`")?;
        let mut members = Vec::new();
        while !self.eat(&TokenKind::RBrace) {
            if self.check(&TokenKind::Eof) {
                return Err(self.err("unexpected end of file in class body"));
            }
            let member_lo = self.span().lo;
            let member_name = self.expect_ident("member name")?;
            if self.check(&TokenKind::LParen) {
                let params = self.parse_params()?;
                if self.eat(&TokenKind::Colon) {
                    self.parse_type()?;
                }
                let body = self.parse_block()?;
                let span = Span::new(member_lo, self.prev_hi());
                members.push(self.arena.alloc(
                    NodeKind::FuncDecl {
                        name: member_name,
                        decorators: Vec::new(),
                        params,
                        body,
                    },
                    span,
                ));
            } else {
                let ty = if self.eat(&TokenKind::Colon) {
                    Some(self.parse_type()?)
                } else {
                    None
                };
                let init = if self.eat(&TokenKind::Assign) {
                    Some(self.parse_expr()?)
                } else {
                    None
                };
                let span = Span::new(member_lo, self.prev_hi());
                self.eat_semi();
                members.push(self.arena.alloc(
                    NodeKind::PropDecl {
                        name: member_name,
                        ty,
                        init,
                    },
                    span,
                ));
            }
        }
        let span = Span::new(lo, self.prev_hi());
        Ok(self.arena.alloc(
            NodeKind::ClassDecl {
                name,
                decorators,
                members,
            },
            span,
        ))
    }

    fn parse_interface(&mut self, decorators: Vec<NodeId>) -> PResult<'a, NodeId> {
        let lo = self.span().lo;
        self.bump(); // `interface`
        let name = self.expect_ident("interface name")?;
        self.expect(&TokenKind::LBrace, "`{`")?;
        let mut fields = Vec::new();
        while !self.eat(&TokenKind::RBrace) {
            if self.check(&TokenKind::Eof) {
                return Err(self.err("unexpected end of file in interface body"));
            }
            let field_lo = self.span().lo;
            let field_name = self.expect_ident("field name")?;
            self.expect(&TokenKind::Colon, "`:`")?;
            let ty = self.parse_type()?;
            let span = Span::new(field_lo, self.prev_hi());
            fields.push(self.arena.alloc(
                NodeKind::PropDecl {
                    name: field_name,
                    ty: Some(ty),
                    init: None,
                },
                span,
            ));
            if !self.eat(&TokenKind::Semi) && !self.eat(&TokenKind::Comma) {
                self.expect(&TokenKind::RBrace, "`}`")?;
                break;
            }
        }
        let span = Span::new(lo, self.prev_hi());
        Ok(self.arena.alloc(
            NodeKind::InterfaceDecl {
                name,
                decorators,
                fields,
            },
            span,
        ))
    }

    fn parse_type_alias(&mut self, decorators: Vec<NodeId>) -> PResult<'a, NodeId> {
        let lo = self.span().lo;
        self.bump(); // `type`
        let name = self.expect_ident("type alias name")?;
        if self.eat(&TokenKind::Lt) {
            // Type parameters are accepted and discarded.
            loop {
                self.expect_ident("type parameter")?;
                if !self.eat(&TokenKind::Comma) {
                    self.expect(&TokenKind::Gt, "`>`")?;
                    break;
                }
            }
        }
        self.expect(&TokenKind::Assign, "`=`")?;
        let ty = self.parse_type()?;
        let span = Span::new(lo, self.prev_hi());
        self.eat_semi();
        Ok(self.arena.alloc(
            NodeKind::TypeAliasDecl {
                name,
                decorators,
                ty,
            },
            span,
        ))
    }

    fn parse_enum(&mut self) -> PResult<'a, NodeId> {
        let lo = self.span().lo;
        self.bump(); // `enum`
        let name = self.expect_ident("enum name")?;
        self.expect(&TokenKind::LBrace, "`{`")?;
        let mut variants = Vec::new();
        while !self.eat(&TokenKind::RBrace) {
            variants.push(self.expect_ident("enum variant")?);
            if !self.eat(&TokenKind::Comma) {
                self.expect(&TokenKind::RBrace, "`}`")?;
                break;
            }
        }
        let span = Span::new(lo, self.prev_hi());
        Ok(self.arena.alloc(NodeKind::EnumDecl { name, variants }, span))
    }

    fn parse_type(&mut self) -> PResult<'a, NodeId> {
        let lo = self.span().lo;
        let name = self.expect_ident("type name")?;
        let mut args = Vec::new();
        if self.eat(&TokenKind::Lt) {
            loop {
                args.push(self.parse_type()?);
                if !self.eat(&TokenKind::Comma) {
                    self.expect(&TokenKind::Gt, "`>`")?;
                    break;
                }
            }
        }
        let span = Span::new(lo, self.prev_hi());
        Ok(self.arena.alloc(NodeKind::TypeRef { name, args }, span))
    }

    // ---- expressions ----

    pub fn parse_expr(&mut self) -> PResult<'a, NodeId> {
        self.parse_assign()
    }

    fn parse_assign(&mut self) -> PResult<'a, NodeId> {
        let lo = self.span().lo;
        let lhs = self.parse_cond()?;
        if self.eat(&TokenKind::Assign) {
            let value = self.parse_assign()?;
            let span = Span::new(lo, self.prev_hi());
            return Ok(self.arena.alloc(
                NodeKind::Assign {
                    target: lhs,
                    value,
                },
                span,
            ));
        }
        Ok(lhs)
    }

    fn parse_cond(&mut self) -> PResult<'a, NodeId> {
        let lo = self.span().lo;
        let test = self.parse_binary(1)?;
        if self.eat(&TokenKind::Question) {
            let then = self.parse_assign()?;
            self.expect(&TokenKind::Colon, "`:`")?;
            let alt = self.parse_assign()?;
            let span = Span::new(lo, self.prev_hi());
            return Ok(self.arena.alloc(NodeKind::Cond { test, then, alt }, span));
        }
        Ok(test)
    }

    fn current_binop(&self) -> Option<BinOp> {
        Some(match self.token() {
            TokenKind::OrOr => BinOp::Or,
            TokenKind::AndAnd => BinOp::And,
            TokenKind::EqEq => BinOp::Eq,
            TokenKind::EqEqEq => BinOp::StrictEq,
            TokenKind::NotEq => BinOp::Ne,
            TokenKind::NotEqEq => BinOp::StrictNe,
            TokenKind::Lt => BinOp::Lt,
            TokenKind::Le => BinOp::Le,
            TokenKind::Gt => BinOp::Gt,
            TokenKind::Ge => BinOp::Ge,
            TokenKind::Plus => BinOp::Add,
            TokenKind::Minus => BinOp::Sub,
            TokenKind::Star => BinOp::Mul,
            TokenKind::Slash => BinOp::Div,
            TokenKind::Percent => BinOp::Rem,
            _ => return None,
        })
    }

    fn parse_binary(&mut self, min_prec: u8) -> PResult<'a, NodeId> {
        let lo = self.span().lo;
        let mut lhs = self.parse_unary()?;
        while let Some(op) = self.current_binop() {
            let prec = op.precedence();
            if prec < min_prec {
                break;
            }
            self.bump();
            let rhs = self.parse_binary(prec + 1)?;
            let span = Span::new(lo, self.prev_hi());
            lhs = self.arena.alloc(NodeKind::Binary { op, lhs, rhs }, span);
        }
        Ok(lhs)
    }

    fn parse_unary(&mut self) -> PResult<'a, NodeId> {
        let lo = self.span().lo;
        let op = match self.token() {
            TokenKind::Minus => Some(UnOp::Neg),
            TokenKind::Plus => Some(UnOp::Pos),
            TokenKind::Bang => Some(UnOp::Not),
            TokenKind::Ident(name) if name == "typeof" => Some(UnOp::TypeOf),
            TokenKind::Ident(name) if name == "void" => Some(UnOp::Void),
            _ => None,
        };
        if let Some(op) = op {
            self.bump();
            let operand = self.parse_unary()?;
            let span = Span::new(lo, self.prev_hi());
            return Ok(self.arena.alloc(NodeKind::Unary { op, operand }, span));
        }
        self.parse_postfix()
    }

    fn parse_postfix(&mut self) -> PResult<'a, NodeId> {
        let lo = self.span().lo;
        let mut expr = self.parse_primary()?;
        loop {
            if self.check(&TokenKind::LParen) {
                let args = self.parse_call_args()?;
                let span = Span::new(lo, self.prev_hi());
                expr = self.arena.alloc(NodeKind::Call { callee: expr, args }, span);
            } else if self.eat(&TokenKind::Dot) {
                let property = self.expect_ident("property name")?;
                let span = Span::new(lo, self.prev_hi());
                expr = self.arena.alloc(
                    NodeKind::Member {
                        object: expr,
                        property,
                    },
                    span,
                );
            } else if self.eat(&TokenKind::LBracket) {
                let index = self.parse_expr()?;
                self.expect(&TokenKind::RBracket, "`]`")?;
                let span = Span::new(lo, self.prev_hi());
                expr = self.arena.alloc(
                    NodeKind::Index {
                        object: expr,
                        index,
                    },
                    span,
                );
            } else if matches!(self.token(), TokenKind::Template(_)) {
                let template = self.parse_template()?;
                let span = Span::new(lo, self.prev_hi());
                expr = self.arena.alloc(
                    NodeKind::TaggedTemplate {
                        tag: expr,
                        template,
                    },
                    span,
                );
            } else {
                break;
            }
        }
        Ok(expr)
    }

    fn parse_call_args(&mut self) -> PResult<'a, Vec<NodeId>> {
        self.expect(&TokenKind::LParen, "`(`")?;
        let mut args = Vec::new();
        loop {
            if self.eat(&TokenKind::RParen) {
                break;
            }
            args.push(self.parse_expr()?);
            if !self.eat(&TokenKind::Comma) {
                self.expect(&TokenKind::RParen, "`)`")?;
                break;
            }
        }
        Ok(args)
    }

    fn parse_template(&mut self) -> PResult<'a, NodeId> {
        let span = self.span();
        let template = match self.bump() {
            TokenKind::Template(t) => t,
            _ => unreachable!("parse_template called off a template token"),
        };
        let TemplateToken { quasis, exprs } = template;
        let mut parsed = Vec::with_capacity(exprs.len());
        for sub in exprs {
            let (tokens, _) = crate::parse::lexer::Lexer::new(&sub.text, sub.offset)
                .tokenize()
                .map_err(|e| {
                    self.sess
                        .span_diagnostic
                        .struct_span_err_with_code(e.span, &e.message, "TS0001")
                })?;
            let expr = Parser::new(self.sess, self.arena, tokens).parse_expr_snippet_inner()?;
            parsed.push(expr);
        }
        Ok(self.arena.alloc(
            NodeKind::TemplateLit {
                quasis,
                exprs: parsed,
            },
            span,
        ))
    }

    /// Like `parse_expr_snippet` but without taking ownership, for
    /// template substitution re-entry. Spans are already file-absolute.
    fn parse_expr_snippet_inner(mut self) -> PResult<'a, NodeId> {
        let expr = self.parse_expr()?;
        if !self.check(&TokenKind::Eof) {
            return Err(self.err("unexpected trailing tokens in template substitution"));
        }
        Ok(expr)
    }

    /// Token-level lookahead: does the parenthesized group starting at the
    /// current `(` close and immediately precede `=>`?
    fn arrow_ahead(&self) -> bool {
        debug_assert!(self.check(&TokenKind::LParen));
        let mut depth = 0usize;
        let mut index = self.pos;
        while index < self.tokens.len() {
            match &self.tokens[index].kind {
                TokenKind::LParen | TokenKind::LBracket | TokenKind::LBrace => depth += 1,
                TokenKind::RParen | TokenKind::RBracket | TokenKind::RBrace => {
                    depth -= 1;
                    if depth == 0 {
                        return self
                            .tokens
                            .get(index + 1)
                            .map_or(false, |t| t.kind == TokenKind::FatArrow);
                    }
                }
                TokenKind::Eof => return false,
                _ => {}
            }
            index += 1;
        }
        false
    }

    fn parse_arrow_body(&mut self) -> PResult<'a, NodeId> {
        if self.check(&TokenKind::LBrace) {
            self.parse_block()
        } else {
            self.parse_assign()
        }
    }

    fn parse_primary(&mut self) -> PResult<'a, NodeId> {
        let lo = self.span().lo;
        match self.token().clone() {
            TokenKind::Number { value, raw } => {
                let span = self.span();
                self.bump();
                Ok(self.arena.alloc(NodeKind::NumberLit { value, raw }, span))
            }
            TokenKind::BigInt(digits) => {
                let span = self.span();
                self.bump();
                Ok(self.arena.alloc(NodeKind::BigIntLit { digits }, span))
            }
            TokenKind::Str(value) => {
                let span = self.span();
                self.bump();
                Ok(self.arena.alloc(NodeKind::StringLit { value }, span))
            }
            TokenKind::Template(_) => self.parse_template(),
            TokenKind::LBracket => {
                self.bump();
                let mut elements = Vec::new();
                loop {
                    if self.eat(&TokenKind::RBracket) {
                        break;
                    }
                    elements.push(self.parse_expr()?);
                    if !self.eat(&TokenKind::Comma) {
                        self.expect(&TokenKind::RBracket, "`]`")?;
                        break;
                    }
                }
                let span = Span::new(lo, self.prev_hi());
                Ok(self.arena.alloc(NodeKind::ArrayLit { elements }, span))
            }
            TokenKind::LBrace => {
                self.bump();
                let mut props = Vec::new();
                loop {
                    if self.eat(&TokenKind::RBrace) {
                        break;
                    }
                    let key = match self.token().clone() {
                        TokenKind::Ident(name) => {
                            self.bump();
                            name
                        }
                        TokenKind::Str(value) => {
                            self.bump();
                            value
                        }
                        other => {
                            return Err(
                                self.err(&format!("expected property name, found {:?}", other))
                            )
                        }
                    };
                    let value = if self.eat(&TokenKind::Colon) {
                        self.parse_expr()?
                    } else {
                        // Shorthand `{ x }`.
                        let span = Span::new(lo, self.prev_hi());
                        self.arena.alloc(NodeKind::Ident { name: key.clone() }, span)
                    };
                    props.push((key, value));
                    if !self.eat(&TokenKind::Comma) {
                        self.expect(&TokenKind::RBrace, "`}`")?;
                        break;
                    }
                }
                let span = Span::new(lo, self.prev_hi());
                Ok(self.arena.alloc(NodeKind::ObjectLit { props }, span))
            }
            TokenKind::LParen => {
                if self.arrow_ahead() {
                    let params = self.parse_params()?;
                    self.expect(&TokenKind::FatArrow, "`=>`")?;
                    let body = self.parse_arrow_body()?;
                    let span = Span::new(lo, self.prev_hi());
                    return Ok(self.arena.alloc(NodeKind::Arrow { params, body }, span));
                }
                self.bump();
                let expr = self.parse_expr()?;
                self.expect(&TokenKind::RParen, "`)`")?;
                Ok(expr)
            }
            TokenKind::Ident(name) => {
                match name.as_str() {
                    "true" | "false" => {
                        let span = self.span();
                        self.bump();
                        return Ok(self
                            .arena
                            .alloc(NodeKind::BoolLit { value: name == "true" }, span));
                    }
                    "null" => {
                        let span = self.span();
                        self.bump();
                        return Ok(self.arena.alloc(NodeKind::NullLit, span));
                    }
                    "new" => {
                        self.bump();
                        let mut callee = {
                            let span = self.span();
                            let name = self.expect_ident("constructor name")?;
                            self.arena.alloc(NodeKind::Ident { name }, span)
                        };
                        while self.eat(&TokenKind::Dot) {
                            let property = self.expect_ident("property name")?;
                            let span = Span::new(lo, self.prev_hi());
                            callee = self.arena.alloc(
                                NodeKind::Member {
                                    object: callee,
                                    property,
                                },
                                span,
                            );
                        }
                        let args = if self.check(&TokenKind::LParen) {
                            self.parse_call_args()?
                        } else {
                            Vec::new()
                        };
                        let span = Span::new(lo, self.prev_hi());
                        return Ok(self.arena.alloc(NodeKind::New { callee, args }, span));
                    }
                    _ => {}
                }
                let span = self.span();
                self.bump();
                if self.check(&TokenKind::FatArrow) {
                    // Single-parameter arrow: `x => body`.
                    self.bump();
                    let param = self.arena.alloc(NodeKind::Ident { name }, span);
                    let body = self.parse_arrow_body()?;
                    let arrow_span = Span::new(lo, self.prev_hi());
                    return Ok(self.arena.alloc(
                        NodeKind::Arrow {
                            params: vec![param],
                            body,
                        },
                        arrow_span,
                    ));
                }
                Ok(self.arena.alloc(NodeKind::Ident { name }, span))
            }
            other => Err(self.err(&format!("expected expression, found {:?}", other))),
        }
    }
}

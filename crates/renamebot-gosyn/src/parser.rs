//! Recursive-descent parser for the Go subset.
//!
//! The parser consumes the scanner's token stream and builds the owned AST of
//! [`crate::ast`]. Identifier nodes are numbered by a [`NodeIdGen`] that the
//! caller threads through all files of a package, so node ids stay unique
//! package-wide.
//!
//! Composite literals with a bare type name are not recognized inside
//! `if`/`for`/`switch` headers (the `no_composite` flag), matching the
//! language rule that makes `if x == T{} {}` require parentheses. Literals
//! with explicit `[]T` / `map[K]V` / `struct{...}` types stay allowed.

use renamebot_core::Span;
use thiserror::Error;

use crate::ast::*;
use crate::scanner::{tokenize, Lexeme, ScanError};
use crate::token::Token;

/// A parse failure at a byte offset.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("parse error at offset {offset}: {message}")]
pub struct ParseError {
    pub offset: usize,
    pub message: String,
}

impl From<ScanError> for ParseError {
    fn from(err: ScanError) -> Self {
        ParseError {
            offset: err.offset,
            message: err.message,
        }
    }
}

/// Package-wide identifier node id generator.
#[derive(Debug, Default)]
pub struct NodeIdGen {
    next: u32,
}

impl NodeIdGen {
    pub fn new() -> Self {
        NodeIdGen::default()
    }

    fn next_id(&mut self) -> NodeId {
        let id = NodeId(self.next);
        self.next += 1;
        id
    }
}

/// Parse one source file.
pub fn parse_file(src: &str, ids: &mut NodeIdGen) -> Result<File, ParseError> {
    let lexemes = tokenize(src)?;
    let mut parser = Parser {
        lexemes,
        pos: 0,
        ids,
        no_composite: false,
    };
    parser.parse_file()
}

struct Parser<'a> {
    lexemes: Vec<Lexeme>,
    pos: usize,
    ids: &'a mut NodeIdGen,
    no_composite: bool,
}

impl Parser<'_> {
    // ------------------------------------------------------------------
    // Token plumbing

    fn tok(&self) -> &Token {
        &self.lexemes[self.pos.min(self.lexemes.len() - 1)].token
    }

    fn tok_at(&self, n: usize) -> &Token {
        &self.lexemes[(self.pos + n).min(self.lexemes.len() - 1)].token
    }

    fn span(&self) -> Span {
        self.lexemes[self.pos.min(self.lexemes.len() - 1)].span
    }

    fn bump(&mut self) -> Lexeme {
        let lexeme = self.lexemes[self.pos.min(self.lexemes.len() - 1)].clone();
        if self.pos < self.lexemes.len() - 1 {
            self.pos += 1;
        }
        lexeme
    }

    fn at(&self, token: &Token) -> bool {
        self.tok() == token
    }

    fn eat(&mut self, token: &Token) -> bool {
        if self.at(token) {
            self.bump();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, token: &Token) -> Result<Span, ParseError> {
        if self.at(token) {
            Ok(self.bump().span)
        } else {
            Err(self.error(format!("expected {token}, found {}", self.tok())))
        }
    }

    /// Expect a statement terminator; `;` may be omitted before `)` or `}`.
    fn expect_semi(&mut self) -> Result<(), ParseError> {
        if self.eat(&Token::Semicolon) || self.at(&Token::RParen) || self.at(&Token::RBrace) {
            Ok(())
        } else {
            Err(self.error(format!("expected ';', found {}", self.tok())))
        }
    }

    fn error(&self, message: impl Into<String>) -> ParseError {
        ParseError {
            offset: self.span().start,
            message: message.into(),
        }
    }

    fn ident(&mut self) -> Result<Ident, ParseError> {
        match self.tok().clone() {
            Token::Ident(name) => {
                let span = self.bump().span;
                Ok(Ident {
                    id: self.ids.next_id(),
                    name,
                    span,
                })
            }
            other => Err(self.error(format!("expected identifier, found {other}"))),
        }
    }

    fn at_ident(&self) -> bool {
        matches!(self.tok(), Token::Ident(_))
    }

    /// Whether the current token can start a type.
    fn at_type_start(&self) -> bool {
        matches!(
            self.tok(),
            Token::Ident(_)
                | Token::LBracket
                | Token::Mul
                | Token::Map
                | Token::Chan
                | Token::Func
                | Token::Struct
                | Token::Interface
                | Token::Arrow
                | Token::LParen
        )
    }

    fn with_header<T>(
        &mut self,
        f: impl FnOnce(&mut Self) -> Result<T, ParseError>,
    ) -> Result<T, ParseError> {
        let saved = self.no_composite;
        self.no_composite = true;
        let result = f(self);
        self.no_composite = saved;
        result
    }

    fn without_header<T>(
        &mut self,
        f: impl FnOnce(&mut Self) -> Result<T, ParseError>,
    ) -> Result<T, ParseError> {
        let saved = self.no_composite;
        self.no_composite = false;
        let result = f(self);
        self.no_composite = saved;
        result
    }

    // ------------------------------------------------------------------
    // File structure

    fn parse_file(&mut self) -> Result<File, ParseError> {
        self.expect(&Token::Package)?;
        let package = self.ident()?;
        self.expect_semi()?;

        let mut imports = Vec::new();
        while self.at(&Token::Import) {
            self.bump();
            if self.eat(&Token::LParen) {
                while !self.at(&Token::RParen) {
                    imports.push(self.parse_import_spec()?);
                    self.expect_semi()?;
                }
                self.expect(&Token::RParen)?;
            } else {
                imports.push(self.parse_import_spec()?);
            }
            self.expect_semi()?;
        }

        let mut decls = Vec::new();
        while !self.at(&Token::Eof) {
            if self.eat(&Token::Semicolon) {
                continue;
            }
            decls.push(self.parse_top_decl()?);
            self.expect_semi()?;
        }

        Ok(File {
            package,
            imports,
            decls,
        })
    }

    fn parse_import_spec(&mut self) -> Result<ImportSpec, ParseError> {
        let alias = if self.at_ident() {
            Some(self.ident()?)
        } else if self.eat(&Token::Period) {
            // Dot imports are accepted and treated as alias-free.
            None
        } else {
            None
        };
        match self.tok().clone() {
            Token::Str(text) => {
                self.bump();
                let path = text.trim_matches(|c| c == '"' || c == '`').to_string();
                Ok(ImportSpec { alias, path })
            }
            other => Err(self.error(format!("expected import path, found {other}"))),
        }
    }

    fn parse_top_decl(&mut self) -> Result<Decl, ParseError> {
        match self.tok() {
            Token::Func => self.parse_func_decl(),
            Token::Var | Token::Const | Token::Type => self.parse_gen_decl(),
            other => Err(self.error(format!("expected declaration, found {other}"))),
        }
    }

    // ------------------------------------------------------------------
    // General declarations (var / const / type)

    fn parse_gen_decl(&mut self) -> Result<Decl, ParseError> {
        let keyword = self.bump().token;
        match keyword {
            Token::Var | Token::Const => {
                let mut specs = Vec::new();
                if self.eat(&Token::LParen) {
                    while !self.at(&Token::RParen) {
                        specs.push(self.parse_value_spec()?);
                        self.expect_semi()?;
                    }
                    self.expect(&Token::RParen)?;
                } else {
                    specs.push(self.parse_value_spec()?);
                }
                if keyword == Token::Var {
                    Ok(Decl::Var(specs))
                } else {
                    Ok(Decl::Const(specs))
                }
            }
            Token::Type => {
                let mut specs = Vec::new();
                if self.eat(&Token::LParen) {
                    while !self.at(&Token::RParen) {
                        specs.push(self.parse_type_spec()?);
                        self.expect_semi()?;
                    }
                    self.expect(&Token::RParen)?;
                } else {
                    specs.push(self.parse_type_spec()?);
                }
                Ok(Decl::Type(specs))
            }
            other => Err(self.error(format!("unexpected declaration keyword {other}"))),
        }
    }

    fn parse_value_spec(&mut self) -> Result<ValueSpec, ParseError> {
        let mut names = vec![self.ident()?];
        while self.eat(&Token::Comma) {
            names.push(self.ident()?);
        }
        let typ = if self.at_type_start() && !self.at(&Token::LParen) {
            Some(self.parse_type()?)
        } else {
            None
        };
        let mut values = Vec::new();
        if self.eat(&Token::Assign) {
            values.push(self.parse_expr()?);
            while self.eat(&Token::Comma) {
                values.push(self.parse_expr()?);
            }
        }
        Ok(ValueSpec { names, typ, values })
    }

    fn parse_type_spec(&mut self) -> Result<TypeSpec, ParseError> {
        let name = self.ident()?;
        let type_params = if self.at(&Token::LBracket) && self.looks_like_type_params() {
            self.parse_type_params()?
        } else {
            Vec::new()
        };
        let alias = self.eat(&Token::Assign);
        let typ = self.parse_type()?;
        Ok(TypeSpec {
            name,
            alias,
            type_params,
            typ,
        })
    }

    /// Disambiguate `type A[T any] ...` (type parameters) from
    /// `type A [N]int` (array). A single `[` followed by `]` or a literal is
    /// an array; an identifier followed by anything but `]` opens parameters.
    fn looks_like_type_params(&self) -> bool {
        match self.tok_at(1) {
            Token::Ident(_) => !matches!(self.tok_at(2), Token::RBracket),
            _ => false,
        }
    }

    fn parse_type_params(&mut self) -> Result<Vec<TypeParamDecl>, ParseError> {
        self.expect(&Token::LBracket)?;
        let mut groups = Vec::new();
        while !self.at(&Token::RBracket) {
            let mut names = vec![self.ident()?];
            while self.eat(&Token::Comma) {
                names.push(self.ident()?);
            }
            let constraint = self.parse_constraint()?;
            groups.push(TypeParamDecl { names, constraint });
            if !self.eat(&Token::Comma) {
                break;
            }
        }
        self.expect(&Token::RBracket)?;
        Ok(groups)
    }

    /// Parse a constraint; unions collapse to their first term, which is all
    /// the type model needs.
    fn parse_constraint(&mut self) -> Result<TypeExpr, ParseError> {
        self.eat(&Token::Tilde);
        let first = self.parse_type()?;
        while self.eat(&Token::Or) {
            self.eat(&Token::Tilde);
            let _ = self.parse_type()?;
        }
        Ok(first)
    }

    // ------------------------------------------------------------------
    // Functions

    fn parse_func_decl(&mut self) -> Result<Decl, ParseError> {
        self.expect(&Token::Func)?;

        let recv = if self.at(&Token::LParen) {
            Some(self.parse_receiver()?)
        } else {
            None
        };

        let name = self.ident()?;
        let type_params = if recv.is_none() && self.at(&Token::LBracket) {
            self.parse_type_params()?
        } else {
            Vec::new()
        };

        let typ = self.parse_signature()?;
        let body = if self.at(&Token::LBrace) {
            Some(self.without_header(|p| p.parse_block())?)
        } else {
            None
        };

        Ok(Decl::Func(FuncDecl {
            recv,
            name,
            type_params,
            typ,
            body,
        }))
    }

    fn parse_receiver(&mut self) -> Result<Receiver, ParseError> {
        self.expect(&Token::LParen)?;

        let mut name = None;
        let pointer;
        let type_name;

        if self.eat(&Token::Mul) {
            // (*T)
            pointer = true;
            type_name = self.ident()?;
        } else {
            let first = self.ident()?;
            match self.tok() {
                Token::RParen | Token::LBracket => {
                    // (T) or (T[P])
                    pointer = false;
                    type_name = first;
                }
                Token::Mul => {
                    // (r *T)
                    self.bump();
                    pointer = true;
                    name = Some(first);
                    type_name = self.ident()?;
                }
                _ => {
                    // (r T)
                    pointer = false;
                    name = Some(first);
                    type_name = self.ident()?;
                }
            }
        }

        // Skip receiver type arguments: (r *T[P, Q])
        if self.at(&Token::LBracket) {
            self.skip_balanced(&Token::LBracket, &Token::RBracket)?;
        }

        self.expect(&Token::RParen)?;
        Ok(Receiver {
            name,
            pointer,
            type_name,
        })
    }

    fn parse_signature(&mut self) -> Result<FuncTypeExpr, ParseError> {
        let params = self.parse_param_list()?;
        let results = if self.at(&Token::LParen) {
            self.parse_param_list()?
        } else if self.at_type_start() {
            let typ = self.parse_type()?;
            vec![Param {
                names: Vec::new(),
                typ,
                variadic: false,
            }]
        } else {
            Vec::new()
        };
        Ok(FuncTypeExpr { params, results })
    }

    fn parse_param_list(&mut self) -> Result<Vec<Param>, ParseError> {
        self.expect(&Token::LParen)?;
        let mut params = Vec::new();
        self.without_header(|p| {
            while !p.at(&Token::RParen) {
                params.push(p.parse_param_entry()?);
                if !p.eat(&Token::Comma) {
                    break;
                }
            }
            Ok(())
        })?;
        self.expect(&Token::RParen)?;
        Ok(params)
    }

    /// Parse one parameter group. Named and unnamed groups are ambiguous up
    /// front (`(a, b int)` vs `(int, string)`), so identifiers are collected
    /// tentatively and the position is rolled back when no type follows.
    fn parse_param_entry(&mut self) -> Result<Param, ParseError> {
        if self.eat(&Token::Ellipsis) {
            let typ = self.parse_type()?;
            return Ok(Param {
                names: Vec::new(),
                typ,
                variadic: true,
            });
        }

        if self.at_ident() && !matches!(self.tok_at(1), Token::Period) {
            let saved = self.pos;
            let mut names = vec![self.ident()?];
            while self.at(&Token::Comma)
                && matches!(self.tok_at(1), Token::Ident(_))
                && !matches!(self.tok_at(2), Token::Period)
            {
                self.bump();
                names.push(self.ident()?);
            }
            if self.at(&Token::Ellipsis) {
                self.bump();
                let typ = self.parse_type()?;
                return Ok(Param {
                    names,
                    typ,
                    variadic: true,
                });
            }
            if self.at_type_start() {
                let typ = self.parse_type()?;
                return Ok(Param {
                    names,
                    typ,
                    variadic: false,
                });
            }
            // No type follows: the identifiers were themselves types.
            self.pos = saved;
        }

        let typ = self.parse_type()?;
        Ok(Param {
            names: Vec::new(),
            typ,
            variadic: false,
        })
    }

    // ------------------------------------------------------------------
    // Types

    fn parse_type(&mut self) -> Result<TypeExpr, ParseError> {
        match self.tok().clone() {
            Token::Ident(_) => {
                let first = self.ident()?;
                let typ = if self.at(&Token::Period) {
                    self.bump();
                    let name = self.ident()?;
                    TypeExpr::Qualified { pkg: first, name }
                } else {
                    TypeExpr::Name(first)
                };
                // Generic instantiation: T[int] - arguments are consumed and
                // dropped; the base name is what the type model keys on.
                if self.at(&Token::LBracket) && !matches!(self.tok_at(1), Token::RBracket) {
                    self.skip_balanced(&Token::LBracket, &Token::RBracket)?;
                }
                Ok(typ)
            }
            Token::Mul => {
                self.bump();
                Ok(TypeExpr::Pointer(Box::new(self.parse_type()?)))
            }
            Token::LBracket => {
                self.bump();
                if self.eat(&Token::RBracket) {
                    return Ok(TypeExpr::Slice(Box::new(self.parse_type()?)));
                }
                let len = self.collect_until_bracket_close()?;
                let elem = Box::new(self.parse_type()?);
                Ok(TypeExpr::Array { len, elem })
            }
            Token::Map => {
                self.bump();
                self.expect(&Token::LBracket)?;
                let key = Box::new(self.parse_type()?);
                self.expect(&Token::RBracket)?;
                let value = Box::new(self.parse_type()?);
                Ok(TypeExpr::Map { key, value })
            }
            Token::Chan => {
                self.bump();
                let dir = if self.eat(&Token::Arrow) {
                    ChanDir::Send
                } else {
                    ChanDir::Both
                };
                Ok(TypeExpr::Chan {
                    dir,
                    elem: Box::new(self.parse_type()?),
                })
            }
            Token::Arrow => {
                self.bump();
                self.expect(&Token::Chan)?;
                Ok(TypeExpr::Chan {
                    dir: ChanDir::Recv,
                    elem: Box::new(self.parse_type()?),
                })
            }
            Token::Func => {
                self.bump();
                let sig = self.parse_signature()?;
                Ok(TypeExpr::Func(Box::new(sig)))
            }
            Token::Struct => self.parse_struct_type(),
            Token::Interface => {
                let start = self.span();
                self.bump();
                let end = self.skip_balanced(&Token::LBrace, &Token::RBrace)?;
                Ok(TypeExpr::Interface {
                    span: Span::new(start.start, end.end),
                })
            }
            Token::LParen => {
                self.bump();
                let inner = self.parse_type()?;
                self.expect(&Token::RParen)?;
                Ok(inner)
            }
            other => Err(self.error(format!("expected type, found {other}"))),
        }
    }

    fn parse_struct_type(&mut self) -> Result<TypeExpr, ParseError> {
        let start = self.span();
        self.expect(&Token::Struct)?;
        self.expect(&Token::LBrace)?;
        let mut fields = Vec::new();
        while !self.at(&Token::RBrace) {
            if self.eat(&Token::Semicolon) {
                continue;
            }
            fields.push(self.parse_field_decl()?);
            self.expect_semi()?;
        }
        let end = self.expect(&Token::RBrace)?;
        Ok(TypeExpr::Struct(StructTypeExpr {
            fields,
            span: Span::new(start.start, end.end),
        }))
    }

    fn parse_field_decl(&mut self) -> Result<FieldDecl, ParseError> {
        // Same ambiguity as parameters: `a, b T` (named) vs `T` / `pkg.T` /
        // `*T` (embedded).
        if self.at_ident() && !matches!(self.tok_at(1), Token::Period) {
            let saved = self.pos;
            let mut names = vec![self.ident()?];
            while self.at(&Token::Comma) && matches!(self.tok_at(1), Token::Ident(_)) {
                self.bump();
                names.push(self.ident()?);
            }
            if self.at_type_start() {
                let typ = self.parse_type()?;
                self.skip_field_tag();
                return Ok(FieldDecl { names, typ });
            }
            self.pos = saved;
        }
        let typ = self.parse_type()?;
        self.skip_field_tag();
        Ok(FieldDecl {
            names: Vec::new(),
            typ,
        })
    }

    fn skip_field_tag(&mut self) {
        if matches!(self.tok(), Token::Str(_)) {
            self.bump();
        }
    }

    /// Collect the raw spelling of an array length up to the closing `]`.
    fn collect_until_bracket_close(&mut self) -> Result<String, ParseError> {
        let mut depth = 0usize;
        let mut parts: Vec<String> = Vec::new();
        loop {
            match self.tok() {
                Token::Eof => return Err(self.error("unterminated array length")),
                Token::LBracket => {
                    depth += 1;
                    parts.push("[".to_string());
                    self.bump();
                }
                Token::RBracket if depth == 0 => {
                    self.bump();
                    return Ok(parts.join(""));
                }
                Token::RBracket => {
                    depth -= 1;
                    parts.push("]".to_string());
                    self.bump();
                }
                Token::Ident(name) => {
                    parts.push(name.clone());
                    self.bump();
                }
                Token::Int(value) => {
                    parts.push(value.clone());
                    self.bump();
                }
                Token::Ellipsis => {
                    parts.push("...".to_string());
                    self.bump();
                }
                Token::Period => {
                    parts.push(".".to_string());
                    self.bump();
                }
                _ => {
                    self.bump();
                }
            }
        }
    }

    /// Skip a balanced token run from an opening delimiter (which must be the
    /// current token) to its match, returning the closing span.
    fn skip_balanced(&mut self, open: &Token, close: &Token) -> Result<Span, ParseError> {
        self.expect(open)?;
        let mut depth = 1usize;
        loop {
            if self.at(&Token::Eof) {
                return Err(self.error("unterminated bracketed region"));
            }
            if self.at(open) {
                depth += 1;
            } else if self.at(close) {
                depth -= 1;
                if depth == 0 {
                    return Ok(self.bump().span);
                }
            }
            self.bump();
        }
    }

    // ------------------------------------------------------------------
    // Expressions

    fn parse_expr(&mut self) -> Result<Expr, ParseError> {
        self.parse_binary(0)
    }

    fn parse_binary(&mut self, min_prec: u8) -> Result<Expr, ParseError> {
        let mut x = self.parse_unary()?;
        loop {
            let prec = self.tok().precedence();
            if prec == 0 || prec <= min_prec {
                return Ok(x);
            }
            let op = self.bump().token;
            let y = self.parse_binary(prec)?;
            x = Expr::Binary {
                x: Box::new(x),
                op,
                y: Box::new(y),
            };
        }
    }

    fn parse_unary(&mut self) -> Result<Expr, ParseError> {
        match self.tok() {
            Token::Add | Token::Sub | Token::Not | Token::Xor | Token::And | Token::Arrow => {
                let op = self.bump().token;
                let x = Box::new(self.parse_unary()?);
                Ok(Expr::Unary { op, x })
            }
            Token::Mul => {
                self.bump();
                let x = Box::new(self.parse_unary()?);
                Ok(Expr::Star { x })
            }
            _ => self.parse_primary(),
        }
    }

    fn parse_primary(&mut self) -> Result<Expr, ParseError> {
        let mut expr = self.parse_operand()?;
        loop {
            match self.tok() {
                Token::Period => {
                    self.bump();
                    if self.eat(&Token::LParen) {
                        // x.(T) or the x.(type) switch guard
                        let typ = if self.eat(&Token::Type) {
                            None
                        } else {
                            Some(self.without_header(|p| p.parse_type())?)
                        };
                        self.expect(&Token::RParen)?;
                        expr = Expr::TypeAssert {
                            x: Box::new(expr),
                            typ,
                        };
                    } else {
                        let sel = self.ident()?;
                        expr = Expr::Selector {
                            x: Box::new(expr),
                            sel,
                        };
                    }
                }
                Token::LParen => {
                    expr = self.parse_call(expr)?;
                }
                Token::LBracket => {
                    expr = self.parse_index_or_slice(expr)?;
                }
                Token::LBrace if !self.no_composite => {
                    let typ = match composite_type_from_expr(&expr) {
                        Some(typ) => typ,
                        None => return Ok(expr),
                    };
                    expr = self.parse_composite_body(Some(Box::new(typ)))?;
                }
                _ => return Ok(expr),
            }
        }
    }

    fn parse_operand(&mut self) -> Result<Expr, ParseError> {
        match self.tok().clone() {
            Token::Ident(_) => Ok(Expr::Ident(self.ident()?)),
            Token::Int(value) => Ok(self.basic_lit(LitKind::Int, value)),
            Token::Float(value) => Ok(self.basic_lit(LitKind::Float, value)),
            Token::Imag(value) => Ok(self.basic_lit(LitKind::Imag, value)),
            Token::Rune(value) => Ok(self.basic_lit(LitKind::Rune, value)),
            Token::Str(value) => Ok(self.basic_lit(LitKind::Str, value)),
            Token::LParen => {
                self.bump();
                let inner = self.without_header(|p| p.parse_expr())?;
                self.expect(&Token::RParen)?;
                Ok(Expr::Paren(Box::new(inner)))
            }
            Token::Func => {
                self.bump();
                let sig = self.parse_signature()?;
                if self.at(&Token::LBrace) {
                    let body = self.without_header(|p| p.parse_block())?;
                    Ok(Expr::FuncLit {
                        typ: Box::new(sig),
                        body,
                    })
                } else {
                    Ok(Expr::TypeInExpr(TypeExpr::Func(Box::new(sig))))
                }
            }
            Token::LBracket | Token::Map | Token::Chan | Token::Struct | Token::Interface => {
                // A literal type in expression position: either a composite
                // literal ([]T{...}) or a conversion ([]byte(s)). These are
                // allowed even in control headers.
                let typ = self.parse_type()?;
                if self.at(&Token::LBrace) {
                    self.parse_composite_body(Some(Box::new(typ)))
                } else {
                    Ok(Expr::TypeInExpr(typ))
                }
            }
            other => Err(self.error(format!("expected expression, found {other}"))),
        }
    }

    fn basic_lit(&mut self, kind: LitKind, value: String) -> Expr {
        let span = self.bump().span;
        Expr::BasicLit { kind, value, span }
    }

    fn parse_call(&mut self, fun: Expr) -> Result<Expr, ParseError> {
        self.expect(&Token::LParen)?;
        let mut args = Vec::new();
        let mut spread = false;
        self.without_header(|p| {
            while !p.at(&Token::RParen) {
                // Type arguments of make/new arrive as TypeInExpr operands
                // through the normal expression path.
                args.push(p.parse_expr()?);
                if p.eat(&Token::Ellipsis) {
                    spread = true;
                }
                if !p.eat(&Token::Comma) {
                    break;
                }
            }
            Ok(())
        })?;
        self.expect(&Token::RParen)?;
        Ok(Expr::Call {
            fun: Box::new(fun),
            args,
            spread,
        })
    }

    fn parse_index_or_slice(&mut self, x: Expr) -> Result<Expr, ParseError> {
        self.expect(&Token::LBracket)?;
        self.without_header(|p| {
            let low = if p.at(&Token::Colon) {
                None
            } else {
                Some(Box::new(p.parse_expr()?))
            };
            if p.eat(&Token::Colon) {
                let high = if p.at(&Token::Colon) || p.at(&Token::RBracket) {
                    None
                } else {
                    Some(Box::new(p.parse_expr()?))
                };
                let max = if p.eat(&Token::Colon) {
                    Some(Box::new(p.parse_expr()?))
                } else {
                    None
                };
                p.expect(&Token::RBracket)?;
                Ok(Expr::SliceExpr {
                    x: Box::new(x),
                    low,
                    high,
                    max,
                })
            } else {
                let index = low.ok_or_else(|| p.error("expected index expression"))?;
                // Generic instantiation f[T, U] leaves extra arguments; they
                // are consumed and only the first is kept.
                while p.eat(&Token::Comma) {
                    if p.at(&Token::RBracket) {
                        break;
                    }
                    let _ = p.parse_expr()?;
                }
                p.expect(&Token::RBracket)?;
                Ok(Expr::Index {
                    x: Box::new(x),
                    index,
                })
            }
        })
    }

    fn parse_composite_body(&mut self, typ: Option<Box<TypeExpr>>) -> Result<Expr, ParseError> {
        let start = self.expect(&Token::LBrace)?;
        let mut elems = Vec::new();
        self.without_header(|p| {
            while !p.at(&Token::RBrace) {
                let elem = p.parse_composite_elem()?;
                elems.push(elem);
                if !p.eat(&Token::Comma) {
                    p.eat(&Token::Semicolon);
                    break;
                }
                p.eat(&Token::Semicolon);
            }
            Ok(())
        })?;
        let end = self.expect(&Token::RBrace)?;
        Ok(Expr::CompositeLit {
            typ,
            elems,
            span: Span::new(start.start, end.end),
        })
    }

    fn parse_composite_elem(&mut self) -> Result<Expr, ParseError> {
        let value = if self.at(&Token::LBrace) {
            self.parse_composite_body(None)?
        } else {
            self.parse_expr()?
        };
        if self.eat(&Token::Colon) {
            let inner = if self.at(&Token::LBrace) {
                self.parse_composite_body(None)?
            } else {
                self.parse_expr()?
            };
            Ok(Expr::KeyValue {
                key: Box::new(value),
                value: Box::new(inner),
            })
        } else {
            Ok(value)
        }
    }

    // ------------------------------------------------------------------
    // Statements

    fn parse_block(&mut self) -> Result<Block, ParseError> {
        let start = self.expect(&Token::LBrace)?;
        let mut stmts = Vec::new();
        while !self.at(&Token::RBrace) {
            if self.eat(&Token::Semicolon) {
                continue;
            }
            let stmt = self.parse_stmt()?;
            stmts.push(stmt);
            self.expect_semi()?;
        }
        let end = self.expect(&Token::RBrace)?;
        Ok(Block {
            stmts,
            span: Span::new(start.start, end.end),
        })
    }

    fn parse_stmt(&mut self) -> Result<Stmt, ParseError> {
        match self.tok() {
            Token::Var | Token::Const | Token::Type => Ok(Stmt::Decl(self.parse_gen_decl()?)),
            Token::LBrace => Ok(Stmt::Block(self.without_header(|p| p.parse_block())?)),
            Token::If => self.parse_if(),
            Token::For => self.parse_for(),
            Token::Switch => self.parse_switch(),
            Token::Select => self.parse_select(),
            Token::Return => {
                self.bump();
                let mut results = Vec::new();
                if !self.at(&Token::Semicolon) && !self.at(&Token::RBrace) {
                    results.push(self.parse_expr()?);
                    while self.eat(&Token::Comma) {
                        results.push(self.parse_expr()?);
                    }
                }
                Ok(Stmt::Return(results))
            }
            Token::Go => {
                self.bump();
                Ok(Stmt::Go(self.parse_expr()?))
            }
            Token::Defer => {
                self.bump();
                Ok(Stmt::Defer(self.parse_expr()?))
            }
            Token::Break | Token::Continue | Token::Goto | Token::Fallthrough => {
                let tok = self.bump().token;
                let label = if self.at_ident() {
                    Some(self.ident()?)
                } else {
                    None
                };
                Ok(Stmt::Branch { tok, label })
            }
            Token::Semicolon => Ok(Stmt::Empty),
            Token::Ident(_) if matches!(self.tok_at(1), Token::Colon) => {
                let label = self.ident()?;
                self.expect(&Token::Colon)?;
                let stmt = Box::new(self.parse_stmt()?);
                Ok(Stmt::Labeled { label, stmt })
            }
            _ => self.parse_simple_stmt(),
        }
    }

    /// Parse an expression statement, assignment, short declaration, send, or
    /// inc/dec. Range clauses are handled by [`Parser::parse_for`].
    fn parse_simple_stmt(&mut self) -> Result<Stmt, ParseError> {
        let mut lhs = vec![self.parse_expr()?];
        while self.eat(&Token::Comma) {
            lhs.push(self.parse_expr()?);
        }

        match self.tok().clone() {
            Token::Define => {
                self.bump();
                let rhs = self.parse_expr_list()?;
                Ok(Stmt::Assign {
                    lhs,
                    op: Token::Define,
                    define: true,
                    rhs,
                })
            }
            op if op.is_assign_op() => {
                self.bump();
                let rhs = self.parse_expr_list()?;
                Ok(Stmt::Assign {
                    lhs,
                    op,
                    define: false,
                    rhs,
                })
            }
            Token::Inc | Token::Dec => {
                let op = self.bump().token;
                let x = lhs.into_iter().next().expect("nonempty lhs");
                Ok(Stmt::IncDec { x, op })
            }
            Token::Arrow if lhs.len() == 1 => {
                self.bump();
                let value = self.parse_expr()?;
                let chan = lhs.into_iter().next().expect("nonempty lhs");
                Ok(Stmt::Send { chan, value })
            }
            _ => {
                if lhs.len() != 1 {
                    return Err(self.error("expected assignment after expression list"));
                }
                Ok(Stmt::Expr(lhs.into_iter().next().expect("nonempty lhs")))
            }
        }
    }

    fn parse_expr_list(&mut self) -> Result<Vec<Expr>, ParseError> {
        let mut exprs = vec![self.parse_expr()?];
        while self.eat(&Token::Comma) {
            exprs.push(self.parse_expr()?);
        }
        Ok(exprs)
    }

    fn parse_if(&mut self) -> Result<Stmt, ParseError> {
        self.expect(&Token::If)?;
        let (init, cond) = self.with_header(|p| {
            let first = p.parse_simple_stmt()?;
            if p.eat(&Token::Semicolon) {
                let cond = p.parse_expr()?;
                Ok((Some(Box::new(first)), cond))
            } else {
                match first {
                    Stmt::Expr(expr) => Ok((None, expr)),
                    _ => Err(p.error("missing condition in if statement")),
                }
            }
        })?;
        let then = self.without_header(|p| p.parse_block())?;
        let els = if self.eat(&Token::Else) {
            if self.at(&Token::If) {
                Some(Box::new(self.parse_if()?))
            } else {
                Some(Box::new(Stmt::Block(
                    self.without_header(|p| p.parse_block())?,
                )))
            }
        } else {
            None
        };
        Ok(Stmt::If {
            init,
            cond,
            then,
            els,
        })
    }

    fn parse_for(&mut self) -> Result<Stmt, ParseError> {
        self.expect(&Token::For)?;

        if self.at(&Token::LBrace) {
            let body = self.without_header(|p| p.parse_block())?;
            return Ok(Stmt::For {
                init: None,
                cond: None,
                post: None,
                body,
            });
        }

        // `for range x {}`
        if self.at(&Token::Range) {
            self.bump();
            let x = self.with_header(|p| p.parse_expr())?;
            let body = self.without_header(|p| p.parse_block())?;
            return Ok(Stmt::Range {
                key: None,
                value: None,
                define: false,
                x,
                body,
            });
        }

        enum Header {
            Simple(Stmt),
            Range(Stmt),
        }

        let header = self.with_header(|p| {
            let mut lhs = vec![p.parse_expr()?];
            while p.eat(&Token::Comma) {
                lhs.push(p.parse_expr()?);
            }
            let define = p.at(&Token::Define);
            if define || p.at(&Token::Assign) {
                p.bump();
                if p.eat(&Token::Range) {
                    let x = p.parse_expr()?;
                    let mut iter = lhs.into_iter();
                    let key = iter.next();
                    let value = iter.next();
                    return Ok(Header::Range(Stmt::Range {
                        key,
                        value,
                        define,
                        x,
                        body: Block {
                            stmts: Vec::new(),
                            span: Span::new(0, 0),
                        },
                    }));
                }
                let rhs = p.parse_expr_list()?;
                return Ok(Header::Simple(Stmt::Assign {
                    lhs,
                    op: if define { Token::Define } else { Token::Assign },
                    define,
                    rhs,
                }));
            }
            if matches!(p.tok(), Token::Inc | Token::Dec) {
                let op = p.bump().token;
                let x = lhs.into_iter().next().expect("nonempty lhs");
                return Ok(Header::Simple(Stmt::IncDec { x, op }));
            }
            if lhs.len() != 1 {
                return Err(p.error("expected assignment in for header"));
            }
            Ok(Header::Simple(Stmt::Expr(
                lhs.into_iter().next().expect("nonempty lhs"),
            )))
        })?;

        match header {
            Header::Range(Stmt::Range {
                key,
                value,
                define,
                x,
                ..
            }) => {
                let body = self.without_header(|p| p.parse_block())?;
                Ok(Stmt::Range {
                    key,
                    value,
                    define,
                    x,
                    body,
                })
            }
            Header::Range(_) => unreachable!("range header is always a range statement"),
            Header::Simple(first) => {
                if self.eat(&Token::Semicolon) {
                    // Three-clause form.
                    let cond = if self.at(&Token::Semicolon) {
                        None
                    } else {
                        Some(self.with_header(|p| p.parse_expr())?)
                    };
                    self.expect(&Token::Semicolon)?;
                    let post = if self.at(&Token::LBrace) {
                        None
                    } else {
                        Some(Box::new(self.with_header(|p| p.parse_simple_stmt())?))
                    };
                    let body = self.without_header(|p| p.parse_block())?;
                    Ok(Stmt::For {
                        init: Some(Box::new(first)),
                        cond,
                        post,
                        body,
                    })
                } else {
                    // `for cond {}`
                    let cond = match first {
                        Stmt::Expr(expr) => expr,
                        _ => return Err(self.error("expected for loop condition")),
                    };
                    let body = self.without_header(|p| p.parse_block())?;
                    Ok(Stmt::For {
                        init: None,
                        cond: Some(cond),
                        post: None,
                        body,
                    })
                }
            }
        }
    }

    fn parse_switch(&mut self) -> Result<Stmt, ParseError> {
        self.expect(&Token::Switch)?;

        let mut init = None;
        let mut guard = None;
        let mut tag = None;

        if !self.at(&Token::LBrace) {
            let first = self.with_header(|p| p.parse_simple_stmt())?;
            let first = if self.eat(&Token::Semicolon) {
                if self.at(&Token::LBrace) {
                    init = Some(Box::new(first));
                    None
                } else {
                    init = Some(Box::new(first));
                    Some(self.with_header(|p| p.parse_simple_stmt())?)
                }
            } else {
                Some(first)
            };
            if let Some(stmt) = first {
                match stmt {
                    Stmt::Expr(expr) => tag = Some(expr),
                    other => guard = Some(Box::new(other)),
                }
            }
        }

        self.expect(&Token::LBrace)?;
        let mut cases = Vec::new();
        while !self.at(&Token::RBrace) {
            cases.push(self.parse_case_clause()?);
        }
        self.expect(&Token::RBrace)?;

        Ok(Stmt::Switch {
            init,
            guard,
            tag,
            cases,
        })
    }

    fn parse_case_clause(&mut self) -> Result<CaseClause, ParseError> {
        let mut exprs = Vec::new();
        if self.eat(&Token::Case) {
            exprs = self.parse_expr_list()?;
        } else {
            self.expect(&Token::Default)?;
        }
        self.expect(&Token::Colon)?;
        let body = self.parse_case_body()?;
        Ok(CaseClause { exprs, body })
    }

    fn parse_case_body(&mut self) -> Result<Vec<Stmt>, ParseError> {
        let mut body = Vec::new();
        while !matches!(self.tok(), Token::Case | Token::Default | Token::RBrace) {
            if self.eat(&Token::Semicolon) {
                continue;
            }
            body.push(self.parse_stmt()?);
            self.expect_semi_in_case()?;
        }
        Ok(body)
    }

    fn expect_semi_in_case(&mut self) -> Result<(), ParseError> {
        if self.eat(&Token::Semicolon)
            || matches!(self.tok(), Token::Case | Token::Default | Token::RBrace)
        {
            Ok(())
        } else {
            Err(self.error(format!("expected ';', found {}", self.tok())))
        }
    }

    fn parse_select(&mut self) -> Result<Stmt, ParseError> {
        self.expect(&Token::Select)?;
        self.expect(&Token::LBrace)?;
        let mut cases = Vec::new();
        while !self.at(&Token::RBrace) {
            let mut body = Vec::new();
            if self.eat(&Token::Case) {
                body.push(self.parse_simple_stmt()?);
                self.expect(&Token::Colon)?;
            } else {
                self.expect(&Token::Default)?;
                self.expect(&Token::Colon)?;
            }
            body.extend(self.parse_case_body()?);
            cases.push(CaseClause {
                exprs: Vec::new(),
                body,
            });
        }
        self.expect(&Token::RBrace)?;
        Ok(Stmt::Select { cases })
    }
}

/// Reinterpret an expression as the type of a composite literal (`R{}` or
/// `pkg.T{}`). Returns `None` when the expression cannot name a type.
fn composite_type_from_expr(expr: &Expr) -> Option<TypeExpr> {
    match expr {
        Expr::Ident(ident) => Some(TypeExpr::Name(ident.clone())),
        Expr::Selector { x, sel } => match x.as_ref() {
            Expr::Ident(pkg) => Some(TypeExpr::Qualified {
                pkg: pkg.clone(),
                name: sel.clone(),
            }),
            _ => None,
        },
        Expr::Index { x, .. } => composite_type_from_expr(x),
        _ => None,
    }
}

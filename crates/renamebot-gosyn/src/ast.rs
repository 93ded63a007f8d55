//! Owned AST for the Go subset.
//!
//! Every identifier node carries a unique [`NodeId`] assigned by the parser
//! and the byte span of its spelling. The checker keys its def/use maps by
//! `NodeId`; the renamer turns the spans of a resolved object's identifiers
//! into source edits.

use renamebot_core::Span;

/// Unique id of an identifier node within one parsed file set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub u32);

/// An identifier occurrence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ident {
    pub id: NodeId,
    pub name: String,
    pub span: Span,
}

impl Ident {
    /// Whether this is the blank identifier `_`.
    pub fn is_blank(&self) -> bool {
        self.name == "_"
    }
}

// ============================================================================
// Types (syntactic)
// ============================================================================

/// Channel direction marker. Direction does not affect naming analysis but is
/// kept so the parser can round-trip the syntax.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChanDir {
    Both,
    Send,
    Recv,
}

/// A syntactic type expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypeExpr {
    /// A plain type name (`T`, `error`).
    Name(Ident),
    /// A package-qualified type name (`pkg.T`).
    Qualified { pkg: Ident, name: Ident },
    /// `*T`
    Pointer(Box<TypeExpr>),
    /// `[]T`
    Slice(Box<TypeExpr>),
    /// `[N]T`; the length spelling is kept verbatim.
    Array { len: String, elem: Box<TypeExpr> },
    /// `map[K]V`
    Map {
        key: Box<TypeExpr>,
        value: Box<TypeExpr>,
    },
    /// `chan T`, `chan<- T`, `<-chan T`
    Chan { dir: ChanDir, elem: Box<TypeExpr> },
    /// Any `func(...)` signature used as a type.
    Func(Box<FuncTypeExpr>),
    /// A struct type literal; fields may nest further struct literals.
    Struct(StructTypeExpr),
    /// An interface type literal; its body is not modeled.
    Interface { span: Span },
    /// `...T` in a final parameter position.
    Ellipsis(Box<TypeExpr>),
}

/// One field group of a struct type: `a, b T` or an embedded type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDecl {
    /// Field names; empty for an embedded field.
    pub names: Vec<Ident>,
    pub typ: TypeExpr,
}

/// A struct type literal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StructTypeExpr {
    pub fields: Vec<FieldDecl>,
    pub span: Span,
}

/// One parameter group: `a, b int`, `int`, or `xs ...string`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Param {
    /// Declared names; empty for unnamed parameters.
    pub names: Vec<Ident>,
    pub typ: TypeExpr,
    /// Whether the group is variadic (`...T`).
    pub variadic: bool,
}

/// A function signature.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FuncTypeExpr {
    pub params: Vec<Param>,
    pub results: Vec<Param>,
}

/// A type parameter declaration group: `T, U constraint`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeParamDecl {
    pub names: Vec<Ident>,
    pub constraint: TypeExpr,
}

// ============================================================================
// Expressions
// ============================================================================

/// Literal kind for [`Expr::BasicLit`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LitKind {
    Int,
    Float,
    Imag,
    Rune,
    Str,
}

/// An expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Expr {
    Ident(Ident),
    BasicLit {
        kind: LitKind,
        value: String,
        span: Span,
    },
    /// `T{...}`, `[]T{...}`, `map[K]V{...}`; `typ` is `None` inside nested
    /// literals where the element type is implied.
    CompositeLit {
        typ: Option<Box<TypeExpr>>,
        elems: Vec<Expr>,
        span: Span,
    },
    /// `key: value` inside a composite literal.
    KeyValue { key: Box<Expr>, value: Box<Expr> },
    FuncLit {
        typ: Box<FuncTypeExpr>,
        body: Block,
    },
    Call {
        fun: Box<Expr>,
        args: Vec<Expr>,
        /// `f(xs...)`
        spread: bool,
    },
    Selector {
        x: Box<Expr>,
        sel: Ident,
    },
    Index {
        x: Box<Expr>,
        index: Box<Expr>,
    },
    /// `x[lo:hi]` / `x[lo:hi:max]`
    SliceExpr {
        x: Box<Expr>,
        low: Option<Box<Expr>>,
        high: Option<Box<Expr>>,
        max: Option<Box<Expr>>,
    },
    /// `x.(T)`; `typ` is `None` for the `x.(type)` switch guard.
    TypeAssert {
        x: Box<Expr>,
        typ: Option<TypeExpr>,
    },
    Unary {
        op: crate::token::Token,
        x: Box<Expr>,
    },
    /// `*x` (deref in expression position).
    Star { x: Box<Expr> },
    Binary {
        x: Box<Expr>,
        op: crate::token::Token,
        y: Box<Expr>,
    },
    Paren(Box<Expr>),
    /// A type in expression position (conversion target like `[]byte(s)`).
    TypeInExpr(TypeExpr),
}

// ============================================================================
// Statements
// ============================================================================

/// A braced statement list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Block {
    pub stmts: Vec<Stmt>,
    pub span: Span,
}

/// One `case`/`default` clause of a switch or select.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaseClause {
    /// Case expressions; empty for `default`. For a select, the single comm
    /// statement is in `body[0]` and `exprs` stays empty.
    pub exprs: Vec<Expr>,
    pub body: Vec<Stmt>,
}

/// A statement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Stmt {
    /// `var`/`const`/`type` declaration inside a body.
    Decl(Decl),
    Empty,
    Expr(Expr),
    Send { chan: Expr, value: Expr },
    IncDec { x: Expr, op: crate::token::Token },
    /// `lhs op rhs`; `define` distinguishes `:=` from `=` and compound ops.
    Assign {
        lhs: Vec<Expr>,
        op: crate::token::Token,
        define: bool,
        rhs: Vec<Expr>,
    },
    Go(Expr),
    Defer(Expr),
    Return(Vec<Expr>),
    Branch {
        tok: crate::token::Token,
        label: Option<Ident>,
    },
    Block(Block),
    If {
        init: Option<Box<Stmt>>,
        cond: Expr,
        then: Block,
        els: Option<Box<Stmt>>,
    },
    /// Expression switches and type switches share one node; a type switch
    /// has a `TypeAssert { typ: None }` somewhere in `tag` or `guard`.
    Switch {
        init: Option<Box<Stmt>>,
        guard: Option<Box<Stmt>>,
        tag: Option<Expr>,
        cases: Vec<CaseClause>,
    },
    Select { cases: Vec<CaseClause> },
    For {
        init: Option<Box<Stmt>>,
        cond: Option<Expr>,
        post: Option<Box<Stmt>>,
        body: Block,
    },
    Range {
        key: Option<Expr>,
        value: Option<Expr>,
        define: bool,
        x: Expr,
        body: Block,
    },
    Labeled { label: Ident, stmt: Box<Stmt> },
}

// ============================================================================
// Declarations
// ============================================================================

/// One `name [= value]` group of a var/const declaration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValueSpec {
    pub names: Vec<Ident>,
    pub typ: Option<TypeExpr>,
    pub values: Vec<Expr>,
}

/// One type declaration: `type Name [type params] Type`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeSpec {
    pub name: Ident,
    /// `type A = B` alias form.
    pub alias: bool,
    pub type_params: Vec<TypeParamDecl>,
    pub typ: TypeExpr,
}

/// An import: `import [alias] "path"`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportSpec {
    pub alias: Option<Ident>,
    /// The unquoted import path.
    pub path: String,
}

/// A method receiver: `(r *T)` or `(T)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Receiver {
    pub name: Option<Ident>,
    pub pointer: bool,
    /// The receiver's base type name (type arguments stripped).
    pub type_name: Ident,
}

/// A function or method declaration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FuncDecl {
    pub recv: Option<Receiver>,
    pub name: Ident,
    pub type_params: Vec<TypeParamDecl>,
    pub typ: FuncTypeExpr,
    pub body: Option<Block>,
}

/// A top-level or statement-level declaration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decl {
    Var(Vec<ValueSpec>),
    Const(Vec<ValueSpec>),
    Type(Vec<TypeSpec>),
    Func(FuncDecl),
}

/// A parsed source file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct File {
    /// The package clause name.
    pub package: Ident,
    pub imports: Vec<ImportSpec>,
    pub decls: Vec<Decl>,
}

// ============================================================================
// Identifier walk
// ============================================================================

/// Visit every identifier node in a file, in source order within each
/// declaration. Covers names in declarations, types, and expressions; the
/// package clause name and import aliases are included.
pub fn walk_idents(file: &File, visit: &mut impl FnMut(&Ident)) {
    visit(&file.package);
    for import in &file.imports {
        if let Some(alias) = &import.alias {
            visit(alias);
        }
    }
    for decl in &file.decls {
        walk_decl_idents(decl, visit);
    }
}

fn walk_decl_idents(decl: &Decl, visit: &mut impl FnMut(&Ident)) {
    match decl {
        Decl::Var(specs) | Decl::Const(specs) => {
            for spec in specs {
                for name in &spec.names {
                    visit(name);
                }
                if let Some(typ) = &spec.typ {
                    walk_type_idents(typ, visit);
                }
                for value in &spec.values {
                    walk_expr_idents(value, visit);
                }
            }
        }
        Decl::Type(specs) => {
            for spec in specs {
                visit(&spec.name);
                for tp in &spec.type_params {
                    for name in &tp.names {
                        visit(name);
                    }
                    walk_type_idents(&tp.constraint, visit);
                }
                walk_type_idents(&spec.typ, visit);
            }
        }
        Decl::Func(func) => walk_func_idents(func, visit),
    }
}

/// Visit every identifier node under one function declaration: receiver,
/// name, signature, and body.
pub fn walk_func_idents(func: &FuncDecl, visit: &mut impl FnMut(&Ident)) {
    if let Some(recv) = &func.recv {
        if let Some(name) = &recv.name {
            visit(name);
        }
        visit(&recv.type_name);
    }
    visit(&func.name);
    for tp in &func.type_params {
        for name in &tp.names {
            visit(name);
        }
        walk_type_idents(&tp.constraint, visit);
    }
    walk_signature_idents(&func.typ, visit);
    if let Some(body) = &func.body {
        walk_block_idents(body, visit);
    }
}

fn walk_signature_idents(typ: &FuncTypeExpr, visit: &mut impl FnMut(&Ident)) {
    for param in typ.params.iter().chain(typ.results.iter()) {
        for name in &param.names {
            visit(name);
        }
        walk_type_idents(&param.typ, visit);
    }
}

fn walk_type_idents(typ: &TypeExpr, visit: &mut impl FnMut(&Ident)) {
    match typ {
        TypeExpr::Name(ident) => visit(ident),
        TypeExpr::Qualified { pkg, name } => {
            visit(pkg);
            visit(name);
        }
        TypeExpr::Pointer(elem) | TypeExpr::Slice(elem) | TypeExpr::Ellipsis(elem) => {
            walk_type_idents(elem, visit)
        }
        TypeExpr::Array { elem, .. } => walk_type_idents(elem, visit),
        TypeExpr::Map { key, value } => {
            walk_type_idents(key, visit);
            walk_type_idents(value, visit);
        }
        TypeExpr::Chan { elem, .. } => walk_type_idents(elem, visit),
        TypeExpr::Func(sig) => walk_signature_idents(sig, visit),
        TypeExpr::Struct(st) => {
            for field in &st.fields {
                for name in &field.names {
                    visit(name);
                }
                walk_type_idents(&field.typ, visit);
            }
        }
        TypeExpr::Interface { .. } => {}
    }
}

fn walk_expr_idents(expr: &Expr, visit: &mut impl FnMut(&Ident)) {
    match expr {
        Expr::Ident(ident) => visit(ident),
        Expr::BasicLit { .. } => {}
        Expr::CompositeLit { typ, elems, .. } => {
            if let Some(typ) = typ {
                walk_type_idents(typ, visit);
            }
            for elem in elems {
                walk_expr_idents(elem, visit);
            }
        }
        Expr::KeyValue { key, value } => {
            walk_expr_idents(key, visit);
            walk_expr_idents(value, visit);
        }
        Expr::FuncLit { typ, body } => {
            walk_signature_idents(typ, visit);
            walk_block_idents(body, visit);
        }
        Expr::Call { fun, args, .. } => {
            walk_expr_idents(fun, visit);
            for arg in args {
                walk_expr_idents(arg, visit);
            }
        }
        Expr::Selector { x, sel } => {
            walk_expr_idents(x, visit);
            visit(sel);
        }
        Expr::Index { x, index } => {
            walk_expr_idents(x, visit);
            walk_expr_idents(index, visit);
        }
        Expr::SliceExpr { x, low, high, max } => {
            walk_expr_idents(x, visit);
            for part in [low, high, max].into_iter().flatten() {
                walk_expr_idents(part, visit);
            }
        }
        Expr::TypeAssert { x, typ } => {
            walk_expr_idents(x, visit);
            if let Some(typ) = typ {
                walk_type_idents(typ, visit);
            }
        }
        Expr::Unary { x, .. } | Expr::Star { x } => walk_expr_idents(x, visit),
        Expr::Binary { x, y, .. } => {
            walk_expr_idents(x, visit);
            walk_expr_idents(y, visit);
        }
        Expr::Paren(inner) => walk_expr_idents(inner, visit),
        Expr::TypeInExpr(typ) => walk_type_idents(typ, visit),
    }
}

fn walk_block_idents(block: &Block, visit: &mut impl FnMut(&Ident)) {
    for stmt in &block.stmts {
        walk_stmt_idents(stmt, visit);
    }
}

fn walk_stmt_idents(stmt: &Stmt, visit: &mut impl FnMut(&Ident)) {
    match stmt {
        Stmt::Decl(decl) => walk_decl_idents(decl, visit),
        Stmt::Empty => {}
        Stmt::Expr(expr) => walk_expr_idents(expr, visit),
        Stmt::Send { chan, value } => {
            walk_expr_idents(chan, visit);
            walk_expr_idents(value, visit);
        }
        Stmt::IncDec { x, .. } => walk_expr_idents(x, visit),
        Stmt::Assign { lhs, rhs, .. } => {
            for expr in lhs.iter().chain(rhs.iter()) {
                walk_expr_idents(expr, visit);
            }
        }
        Stmt::Go(expr) | Stmt::Defer(expr) => walk_expr_idents(expr, visit),
        Stmt::Return(exprs) => {
            for expr in exprs {
                walk_expr_idents(expr, visit);
            }
        }
        Stmt::Branch { label, .. } => {
            if let Some(label) = label {
                visit(label);
            }
        }
        Stmt::Block(block) => walk_block_idents(block, visit),
        Stmt::If {
            init,
            cond,
            then,
            els,
        } => {
            if let Some(init) = init {
                walk_stmt_idents(init, visit);
            }
            walk_expr_idents(cond, visit);
            walk_block_idents(then, visit);
            if let Some(els) = els {
                walk_stmt_idents(els, visit);
            }
        }
        Stmt::Switch {
            init,
            guard,
            tag,
            cases,
        } => {
            if let Some(init) = init {
                walk_stmt_idents(init, visit);
            }
            if let Some(guard) = guard {
                walk_stmt_idents(guard, visit);
            }
            if let Some(tag) = tag {
                walk_expr_idents(tag, visit);
            }
            for case in cases {
                for expr in &case.exprs {
                    walk_expr_idents(expr, visit);
                }
                for stmt in &case.body {
                    walk_stmt_idents(stmt, visit);
                }
            }
        }
        Stmt::Select { cases } => {
            for case in cases {
                for stmt in &case.body {
                    walk_stmt_idents(stmt, visit);
                }
            }
        }
        Stmt::For {
            init,
            cond,
            post,
            body,
        } => {
            if let Some(init) = init {
                walk_stmt_idents(init, visit);
            }
            if let Some(cond) = cond {
                walk_expr_idents(cond, visit);
            }
            if let Some(post) = post {
                walk_stmt_idents(post, visit);
            }
            walk_block_idents(body, visit);
        }
        Stmt::Range {
            key,
            value,
            x,
            body,
            ..
        } => {
            for expr in [key, value].into_iter().flatten() {
                walk_expr_idents(expr, visit);
            }
            walk_expr_idents(x, visit);
            walk_block_idents(body, visit);
        }
        Stmt::Labeled { label, stmt } => {
            visit(label);
            walk_stmt_idents(stmt, visit);
        }
    }
}

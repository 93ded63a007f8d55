//! Typed-identifier extraction.
//!
//! [`extract`] resolves a package and flattens every declaration site into a
//! [`TypedIdentifier`] record: the spelling, the root and complete type
//! strings, shallow structural flags, and the declaration-id of the enclosing
//! function (or the spelling itself for package-level declarations).
//!
//! Emission rules:
//! - blank names (`_`) are never emitted
//! - in a `:=` or range definition, only names newly declared at that site
//!   are emitted; redeclared names are skipped
//! - receivers, parameters, and named results are emitted with their
//!   resolved types, a variadic `x ...T` as a single `[]T` slice
//! - function literal parameters and every definition inside a body carry
//!   the enclosing declaration's id

use renamebot_core::Span;
use renamebot_gosyn::ast::{
    Decl, Expr, FuncDecl, FuncTypeExpr, Ident, NodeId, Stmt, StructTypeExpr, TypeExpr,
};
use renamebot_gosyn::check::{resolve, CheckError, TypeInfo};
use renamebot_gosyn::package::{declaration_id, GoPackage, SourceFile};
use renamebot_gosyn::Type;

/// What kind of declaration site a record came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum IdentKind {
    FuncVar,
    FuncConst,
    FuncParam,
    FuncReceiver,
    Field,
    PkgVar,
    PkgConst,
    Type,
}

/// One name-occurrence at a declaration site.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypedIdentifier {
    pub kind: IdentKind,
    pub identifier: String,
    /// Type string with outer pointer/slice layers peeled; maps intact;
    /// unnamed struct/interface/function types collapsed.
    pub root_type: String,
    /// Full type string preserving indirection, same collapses.
    pub complete_type: String,
    pub is_slice: bool,
    pub is_map: bool,
    pub is_ptr: bool,
    pub is_type_param: bool,
    pub is_named_type: bool,
    /// Stable handle of the enclosing function/method; the spelling itself
    /// for package-level declarations.
    pub declaration_id: String,
    pub file_name: String,
    /// The declaring name node.
    pub node: NodeId,
    /// Byte span of the declaring name, for position recovery.
    pub span: Span,
}

/// Extract typed identifiers for one pass.
///
/// Files participate iff their `is_test` flag equals `only_tests`. The
/// package's trees are refreshed by resolution; records reference the
/// refreshed nodes.
pub fn extract(
    pkg: &mut GoPackage,
    only_tests: bool,
) -> Result<(Vec<TypedIdentifier>, TypeInfo), CheckError> {
    let info = resolve(pkg, only_tests)?;
    let mut records = Vec::new();
    for file in &pkg.files {
        if file.is_test != only_tests {
            continue;
        }
        let mut walker = FileWalker {
            info: &info,
            file,
            records: &mut records,
        };
        walker.walk_file();
    }
    Ok((records, info))
}

struct FileWalker<'a> {
    info: &'a TypeInfo,
    file: &'a SourceFile,
    records: &'a mut Vec<TypedIdentifier>,
}

impl FileWalker<'_> {
    fn walk_file(&mut self) {
        // Top-level type declarations first, then values, then functions.
        for decl in &self.file.ast.decls {
            if let Decl::Type(specs) = decl {
                for spec in specs {
                    self.emit(IdentKind::Type, &spec.name, None);
                    if let TypeExpr::Struct(st) = &spec.typ {
                        self.walk_struct_fields(st, &spec.name.name);
                    }
                }
            }
        }
        for decl in &self.file.ast.decls {
            match decl {
                Decl::Var(specs) => {
                    for spec in specs {
                        for name in &spec.names {
                            self.emit(IdentKind::PkgVar, name, None);
                        }
                    }
                }
                Decl::Const(specs) => {
                    for spec in specs {
                        for name in &spec.names {
                            self.emit(IdentKind::PkgConst, name, None);
                        }
                    }
                }
                _ => {}
            }
        }
        for decl in &self.file.ast.decls {
            if let Decl::Func(func) = decl {
                self.walk_func(func);
            }
        }
    }

    fn walk_struct_fields(&mut self, st: &StructTypeExpr, decl_id: &str) {
        for field in &st.fields {
            for name in &field.names {
                self.emit(IdentKind::Field, name, Some(decl_id));
            }
            if let TypeExpr::Struct(nested) = &field.typ {
                self.walk_struct_fields(nested, decl_id);
            }
        }
    }

    fn walk_func(&mut self, func: &FuncDecl) {
        let decl_id = declaration_id(func, self.file);

        if let Some(recv) = &func.recv {
            if let Some(name) = &recv.name {
                self.emit(IdentKind::FuncReceiver, name, Some(&decl_id));
            }
        }
        self.walk_signature(&func.typ, &decl_id);
        if let Some(body) = &func.body {
            self.walk_stmts(&body.stmts, &decl_id);
        }
    }

    /// Parameters and named results, input order.
    fn walk_signature(&mut self, sig: &FuncTypeExpr, decl_id: &str) {
        for param in sig.params.iter().chain(sig.results.iter()) {
            for name in &param.names {
                self.emit(IdentKind::FuncParam, name, Some(decl_id));
            }
        }
    }

    fn walk_stmts(&mut self, stmts: &[Stmt], decl_id: &str) {
        for stmt in stmts {
            self.walk_stmt(stmt, decl_id);
        }
    }

    fn walk_stmt(&mut self, stmt: &Stmt, decl_id: &str) {
        match stmt {
            Stmt::Decl(decl) => self.walk_local_decl(decl, decl_id),
            Stmt::Assign {
                lhs, define, rhs, ..
            } => {
                if *define {
                    for target in lhs {
                        self.emit_if_defined(target, IdentKind::FuncVar, decl_id);
                    }
                }
                for expr in lhs.iter().chain(rhs.iter()) {
                    self.walk_expr(expr, decl_id);
                }
            }
            Stmt::Range {
                key,
                value,
                define,
                x,
                body,
            } => {
                if *define {
                    for target in [key, value].into_iter().flatten() {
                        self.emit_if_defined(target, IdentKind::FuncVar, decl_id);
                    }
                }
                self.walk_expr(x, decl_id);
                self.walk_stmts(&body.stmts, decl_id);
            }
            Stmt::Expr(expr) | Stmt::Go(expr) | Stmt::Defer(expr) => self.walk_expr(expr, decl_id),
            Stmt::Send { chan, value } => {
                self.walk_expr(chan, decl_id);
                self.walk_expr(value, decl_id);
            }
            Stmt::IncDec { x, .. } => self.walk_expr(x, decl_id),
            Stmt::Return(exprs) => {
                for expr in exprs {
                    self.walk_expr(expr, decl_id);
                }
            }
            Stmt::Block(block) => self.walk_stmts(&block.stmts, decl_id),
            Stmt::If {
                init,
                cond,
                then,
                els,
            } => {
                if let Some(init) = init {
                    self.walk_stmt(init, decl_id);
                }
                self.walk_expr(cond, decl_id);
                self.walk_stmts(&then.stmts, decl_id);
                if let Some(els) = els {
                    self.walk_stmt(els, decl_id);
                }
            }
            Stmt::Switch {
                init,
                guard,
                tag,
                cases,
            } => {
                if let Some(init) = init {
                    self.walk_stmt(init, decl_id);
                }
                if let Some(guard) = guard {
                    self.walk_stmt(guard, decl_id);
                }
                if let Some(tag) = tag {
                    self.walk_expr(tag, decl_id);
                }
                for case in cases {
                    for expr in &case.exprs {
                        self.walk_expr(expr, decl_id);
                    }
                    self.walk_stmts(&case.body, decl_id);
                }
            }
            Stmt::Select { cases } => {
                for case in cases {
                    self.walk_stmts(&case.body, decl_id);
                }
            }
            Stmt::For {
                init,
                cond,
                post,
                body,
            } => {
                if let Some(init) = init {
                    self.walk_stmt(init, decl_id);
                }
                if let Some(cond) = cond {
                    self.walk_expr(cond, decl_id);
                }
                if let Some(post) = post {
                    self.walk_stmt(post, decl_id);
                }
                self.walk_stmts(&body.stmts, decl_id);
            }
            Stmt::Labeled { stmt, .. } => self.walk_stmt(stmt, decl_id),
            Stmt::Empty | Stmt::Branch { .. } => {}
        }
    }

    fn walk_local_decl(&mut self, decl: &Decl, decl_id: &str) {
        match decl {
            Decl::Var(specs) => {
                for spec in specs {
                    for name in &spec.names {
                        self.emit(IdentKind::FuncVar, name, Some(decl_id));
                    }
                    for value in &spec.values {
                        self.walk_expr(value, decl_id);
                    }
                }
            }
            Decl::Const(specs) => {
                for spec in specs {
                    for name in &spec.names {
                        self.emit(IdentKind::FuncConst, name, Some(decl_id));
                    }
                    for value in &spec.values {
                        self.walk_expr(value, decl_id);
                    }
                }
            }
            Decl::Type(specs) => {
                for spec in specs {
                    self.emit(IdentKind::Type, &spec.name, Some(decl_id));
                    if let TypeExpr::Struct(st) = &spec.typ {
                        self.walk_struct_fields(st, decl_id);
                    }
                }
            }
            Decl::Func(_) => {}
        }
    }

    /// Recurse into expressions for function literals, whose parameters and
    /// bodies emit under the enclosing declaration's id.
    fn walk_expr(&mut self, expr: &Expr, decl_id: &str) {
        match expr {
            Expr::FuncLit { typ, body } => {
                self.walk_signature(typ, decl_id);
                self.walk_stmts(&body.stmts, decl_id);
            }
            Expr::CompositeLit { elems, .. } => {
                for elem in elems {
                    self.walk_expr(elem, decl_id);
                }
            }
            Expr::KeyValue { key, value } => {
                self.walk_expr(key, decl_id);
                self.walk_expr(value, decl_id);
            }
            Expr::Call { fun, args, .. } => {
                self.walk_expr(fun, decl_id);
                for arg in args {
                    self.walk_expr(arg, decl_id);
                }
            }
            Expr::Selector { x, .. } => self.walk_expr(x, decl_id),
            Expr::Index { x, index } => {
                self.walk_expr(x, decl_id);
                self.walk_expr(index, decl_id);
            }
            Expr::SliceExpr { x, low, high, max } => {
                self.walk_expr(x, decl_id);
                for part in [low, high, max].into_iter().flatten() {
                    self.walk_expr(part, decl_id);
                }
            }
            Expr::TypeAssert { x, .. } => self.walk_expr(x, decl_id),
            Expr::Unary { x, .. } | Expr::Star { x } => self.walk_expr(x, decl_id),
            Expr::Binary { x, y, .. } => {
                self.walk_expr(x, decl_id);
                self.walk_expr(y, decl_id);
            }
            Expr::Paren(inner) => self.walk_expr(inner, decl_id),
            Expr::Ident(_) | Expr::BasicLit { .. } | Expr::TypeInExpr(_) => {}
        }
    }

    /// Emit a `:=`/range target iff it is a definition site (a redeclared
    /// name carries a use, not a def).
    fn emit_if_defined(&mut self, target: &Expr, kind: IdentKind, decl_id: &str) {
        if let Expr::Ident(ident) = target {
            if self.info.defs.contains_key(&ident.id) {
                self.emit(kind, ident, Some(decl_id));
            }
        }
    }

    /// Emit one record. Blank names are skipped; package-level declarations
    /// use their own spelling as the declaration-id.
    fn emit(&mut self, kind: IdentKind, ident: &Ident, decl_id: Option<&str>) {
        if ident.is_blank() {
            return;
        }
        let typ = match self.info.defs.get(&ident.id) {
            Some(obj) => self.info.object(*obj).typ.clone(),
            None => Type::Invalid,
        };
        let declaration_id = decl_id.unwrap_or(&ident.name).to_string();
        self.records.push(TypedIdentifier {
            kind,
            identifier: ident.name.clone(),
            root_type: typ.root_string(),
            complete_type: typ.complete_string(),
            is_slice: typ.is_slice(),
            is_map: typ.is_map(),
            is_ptr: typ.is_ptr(),
            is_type_param: typ.is_type_param(),
            is_named_type: typ.is_named(),
            declaration_id,
            file_name: self.file.name.clone(),
            node: ident.id,
            span: ident.span,
        });
    }
}

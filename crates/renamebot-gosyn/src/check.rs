//! Scope resolution and lightweight type inference for the Go subset.
//!
//! [`resolve`] re-parses a package's files so the fact maps are keyed to the
//! exact trees later walks observe, then builds:
//!
//! - an object table (one entry per declared name)
//! - `defs`: declaring identifier node -> object
//! - `uses`: referring identifier node -> object
//! - a scope tree with per-function roots, used for collision checks
//!
//! The checker is deliberately lenient: unresolvable names and expressions
//! whose types cannot be inferred produce [`Type::Invalid`], which renders as
//! an empty type string and is dropped by downstream consumers. A hard error
//! is reserved for structural problems (conflicting package clauses) and the
//! test-package invariant.

use std::collections::HashMap;

use thiserror::Error;

use crate::ast::*;
use crate::package::GoPackage;
use crate::parser::ParseError;
use crate::token::Token;
use crate::types::{Type, PREDECLARED};

/// Index into [`TypeInfo::objects`].
pub type ObjectId = usize;

/// Index into [`TypeInfo::scopes`].
pub type ScopeId = usize;

/// What a declared name is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ObjectKind {
    /// A variable (package-level or function-local).
    Var,
    /// A constant (package-level or function-local).
    Const,
    /// A declared type name or type parameter.
    TypeName,
    /// A function or method.
    Func,
    /// A function parameter or named result.
    Param,
    /// A method receiver.
    Receiver,
    /// A struct field.
    Field,
    /// An imported package name.
    Package { path: String },
    /// A predeclared function (`len`, `make`, ...).
    Builtin,
}

/// A declared name.
#[derive(Debug, Clone)]
pub struct Object {
    pub name: String,
    pub kind: ObjectKind,
    pub typ: Type,
    /// Result types, for function objects.
    pub results: Vec<Type>,
    /// The declaring identifier node, when one exists in the source.
    pub decl: Option<NodeId>,
}

/// One lexical scope.
#[derive(Debug, Clone, Default)]
pub struct Scope {
    pub parent: Option<ScopeId>,
    names: HashMap<String, ObjectId>,
}

/// Immutable resolution facts for one pass over a package.
#[derive(Debug, Default)]
pub struct TypeInfo {
    pub objects: Vec<Object>,
    pub defs: HashMap<NodeId, ObjectId>,
    pub uses: HashMap<NodeId, ObjectId>,
    pub scopes: Vec<Scope>,
    /// Scope each object is declared in.
    pub object_scope: HashMap<ObjectId, ScopeId>,
    /// Function declaration name node -> the function's outermost scope.
    pub func_scopes: HashMap<NodeId, ScopeId>,
    pub package_scope: ScopeId,
}

impl TypeInfo {
    pub fn object(&self, id: ObjectId) -> &Object {
        &self.objects[id]
    }

    /// Look a name up through the scope chain starting at `scope`.
    pub fn lookup_from(&self, scope: ScopeId, name: &str) -> Option<ObjectId> {
        let mut current = Some(scope);
        while let Some(id) = current {
            if let Some(obj) = self.scopes[id].names.get(name) {
                return Some(*obj);
            }
            current = self.scopes[id].parent;
        }
        None
    }

    /// Whether `name` is declared directly in `scope`.
    pub fn scope_declares(&self, scope: ScopeId, name: &str) -> Option<ObjectId> {
        self.scopes[scope].names.get(name).copied()
    }

    /// Whether `scope` is `ancestor` or nested anywhere inside it.
    pub fn scope_within(&self, scope: ScopeId, ancestor: ScopeId) -> bool {
        let mut current = Some(scope);
        while let Some(id) = current {
            if id == ancestor {
                return true;
            }
            current = self.scopes[id].parent;
        }
        false
    }

    /// All names declared in scopes nested at or below `root`.
    pub fn names_under(&self, root: ScopeId) -> Vec<(&str, ObjectId)> {
        let mut found = Vec::new();
        for (id, scope) in self.scopes.iter().enumerate() {
            if self.scope_within(id, root) {
                for (name, obj) in &scope.names {
                    found.push((name.as_str(), *obj));
                }
            }
        }
        found
    }
}

/// Failure modes of [`resolve`].
#[derive(Debug, Error)]
pub enum CheckError {
    /// API misuse.
    #[error("invariant violation: {0}")]
    Invariant(String),

    /// A file failed to re-parse.
    #[error("parse error in {file}: {source}")]
    Parse { file: String, source: ParseError },

    /// The package is structurally inconsistent.
    #[error("type check error: {0}")]
    TypeCheck(String),
}

impl From<CheckError> for renamebot_core::RenamebotError {
    fn from(err: CheckError) -> Self {
        use renamebot_core::RenamebotError;
        match err {
            CheckError::Invariant(message) => RenamebotError::Invariant { message },
            CheckError::Parse { file, source } => RenamebotError::Parse {
                file,
                message: source.to_string(),
            },
            CheckError::TypeCheck(message) => RenamebotError::TypeCheck { message },
        }
    }
}

/// Resolve a package.
///
/// `include_tests` selects whether `_test.go` files participate. A non-test
/// resolve of an external test package is an invariant violation: every file
/// of such a package is a test file.
///
/// The package's syntax trees are replaced with freshly parsed equivalents,
/// so the returned facts are keyed to the nodes the caller will walk.
pub fn resolve(pkg: &mut GoPackage, include_tests: bool) -> Result<TypeInfo, CheckError> {
    if !include_tests && pkg.is_external_test {
        return Err(CheckError::Invariant(
            "cannot collect non-test identifiers from a test package".to_string(),
        ));
    }

    pkg.reparse()
        .map_err(|(file, source)| CheckError::Parse { file, source })?;

    for file in &pkg.files {
        if file.ast.package.name != pkg.name {
            return Err(CheckError::TypeCheck(format!(
                "conflicting package clauses: {} vs {} in {}",
                pkg.name, file.ast.package.name, file.name
            )));
        }
    }

    let mut checker = Checker::new();
    checker.declare_universe();
    checker.collect_package_decls(pkg, include_tests);
    checker.resolve_declared_types(pkg, include_tests);
    checker.check_bodies(pkg, include_tests);
    Ok(checker.info)
}

const UNIVERSE: ScopeId = 0;

struct Checker {
    info: TypeInfo,
    /// Struct field types: (type name, field name) -> type.
    fields: HashMap<(String, String), Type>,
    /// Method result types: (receiver base type name, method name) -> results.
    methods: HashMap<(String, String), Vec<Type>>,
}

impl Checker {
    fn new() -> Self {
        let universe = Scope::default();
        let package = Scope {
            parent: Some(UNIVERSE),
            names: HashMap::new(),
        };
        let info = TypeInfo {
            scopes: vec![universe, package],
            package_scope: 1,
            ..TypeInfo::default()
        };
        Checker {
            info,
            fields: HashMap::new(),
            methods: HashMap::new(),
        }
    }

    // ------------------------------------------------------------------
    // Object and scope plumbing

    fn new_object(
        &mut self,
        name: &str,
        kind: ObjectKind,
        typ: Type,
        decl: Option<NodeId>,
    ) -> ObjectId {
        self.info.objects.push(Object {
            name: name.to_string(),
            kind,
            typ,
            results: Vec::new(),
            decl,
        });
        self.info.objects.len() - 1
    }

    fn declare(&mut self, scope: ScopeId, obj: ObjectId) {
        let name = self.info.objects[obj].name.clone();
        self.info.scopes[scope].names.insert(name, obj);
        self.info.object_scope.insert(obj, scope);
    }

    fn open_scope(&mut self, parent: ScopeId) -> ScopeId {
        self.info.scopes.push(Scope {
            parent: Some(parent),
            names: HashMap::new(),
        });
        self.info.scopes.len() - 1
    }

    fn declare_universe(&mut self) {
        for &name in PREDECLARED {
            let obj = self.new_object(name, ObjectKind::TypeName, Type::Basic(name), None);
            self.declare(UNIVERSE, obj);
        }
        for name in ["true", "false"] {
            let obj = self.new_object(name, ObjectKind::Const, Type::Basic("bool"), None);
            self.declare(UNIVERSE, obj);
        }
        for name in ["nil", "iota"] {
            let obj = self.new_object(name, ObjectKind::Const, Type::Invalid, None);
            self.declare(UNIVERSE, obj);
        }
        for name in [
            "append", "cap", "clear", "close", "copy", "delete", "len", "make", "max", "min",
            "new", "panic", "print", "println", "recover",
        ] {
            let obj = self.new_object(name, ObjectKind::Builtin, Type::Func, None);
            self.declare(UNIVERSE, obj);
        }
    }

    // ------------------------------------------------------------------
    // Pass 1: package-scope names

    fn collect_package_decls(&mut self, pkg: &GoPackage, include_tests: bool) {
        let package_scope = self.info.package_scope;
        for file in included_files(pkg, include_tests) {
            for decl in &file.ast.decls {
                match decl {
                    Decl::Type(specs) => {
                        for spec in specs {
                            if spec.name.is_blank() {
                                continue;
                            }
                            let typ = Type::Named {
                                pkg: None,
                                name: spec.name.name.clone(),
                            };
                            let obj = self.new_object(
                                &spec.name.name,
                                ObjectKind::TypeName,
                                typ,
                                Some(spec.name.id),
                            );
                            self.declare(package_scope, obj);
                            self.info.defs.insert(spec.name.id, obj);
                        }
                    }
                    Decl::Var(specs) | Decl::Const(specs) => {
                        let kind = if matches!(decl, Decl::Var(_)) {
                            ObjectKind::Var
                        } else {
                            ObjectKind::Const
                        };
                        for spec in specs {
                            for name in &spec.names {
                                if name.is_blank() {
                                    continue;
                                }
                                let obj = self.new_object(
                                    &name.name,
                                    kind.clone(),
                                    Type::Invalid,
                                    Some(name.id),
                                );
                                self.declare(package_scope, obj);
                                self.info.defs.insert(name.id, obj);
                            }
                        }
                    }
                    Decl::Func(func) => {
                        if func.recv.is_some() {
                            continue; // methods do not enter package scope
                        }
                        let obj = self.new_object(
                            &func.name.name,
                            ObjectKind::Func,
                            Type::Func,
                            Some(func.name.id),
                        );
                        if !func.name.is_blank() && func.name.name != "init" {
                            self.declare(package_scope, obj);
                        }
                        self.info.defs.insert(func.name.id, obj);
                    }
                }
            }
        }
    }

    // ------------------------------------------------------------------
    // Pass 2: declared types, signatures, package value types

    fn resolve_declared_types(&mut self, pkg: &GoPackage, include_tests: bool) {
        let package_scope = self.info.package_scope;

        // Struct fields first, so inference through selectors works.
        for file in included_files(pkg, include_tests) {
            for decl in &file.ast.decls {
                if let Decl::Type(specs) = decl {
                    for spec in specs {
                        if let TypeExpr::Struct(st) = &spec.typ {
                            self.collect_struct_fields(&spec.name.name, st, package_scope);
                        }
                    }
                }
            }
        }

        // Function signatures and method tables.
        for file in included_files(pkg, include_tests) {
            for decl in &file.ast.decls {
                if let Decl::Func(func) = decl {
                    let results = self.result_types(&func.typ, package_scope);
                    match &func.recv {
                        Some(recv) => {
                            self.methods.insert(
                                (recv.type_name.name.clone(), func.name.name.clone()),
                                results,
                            );
                        }
                        None => {
                            if let Some(obj) = self.info.defs.get(&func.name.id).copied() {
                                self.info.objects[obj].results = results;
                            }
                        }
                    }
                }
            }
        }

        // Package var/const types: explicit annotation or inferred from the
        // initializer.
        for file in included_files(pkg, include_tests) {
            for decl in &file.ast.decls {
                if let Decl::Var(specs) | Decl::Const(specs) = decl {
                    for spec in specs {
                        let annotated = spec
                            .typ
                            .as_ref()
                            .map(|t| self.resolve_type_expr(t, package_scope));
                        let inferred: Vec<Type> = if annotated.is_none() {
                            self.expr_type_list(&spec.values, spec.names.len(), package_scope)
                        } else {
                            Vec::new()
                        };
                        for (i, name) in spec.names.iter().enumerate() {
                            let Some(obj) = self.info.defs.get(&name.id).copied() else {
                                continue;
                            };
                            let typ = match &annotated {
                                Some(t) => t.clone(),
                                None => inferred.get(i).cloned().unwrap_or(Type::Invalid),
                            };
                            self.info.objects[obj].typ = typ;
                        }
                    }
                }
            }
        }
    }

    /// Register field objects (and the fields table) for a struct type,
    /// recursing through anonymous nested struct literals.
    fn collect_struct_fields(&mut self, type_name: &str, st: &StructTypeExpr, scope: ScopeId) {
        for field in &st.fields {
            let typ = self.resolve_type_expr(&field.typ, scope);
            for name in &field.names {
                if name.is_blank() {
                    continue;
                }
                self.fields
                    .insert((type_name.to_string(), name.name.clone()), typ.clone());
                let obj =
                    self.new_object(&name.name, ObjectKind::Field, typ.clone(), Some(name.id));
                self.info.defs.insert(name.id, obj);
            }
            if let TypeExpr::Struct(nested) = &field.typ {
                // Anonymous nested struct: its fields belong to the literal
                // type, which has no name to key the field table by.
                self.collect_struct_fields("", nested, scope);
            }
        }
    }

    // ------------------------------------------------------------------
    // Pass 3: file scopes and function bodies

    fn check_bodies(&mut self, pkg: &GoPackage, include_tests: bool) {
        let package_scope = self.info.package_scope;
        for file in included_files(pkg, include_tests) {
            let file_scope = self.open_scope(package_scope);
            for import in &file.ast.imports {
                let name = match &import.alias {
                    Some(alias) => alias.name.clone(),
                    None => import
                        .path
                        .rsplit('/')
                        .next()
                        .unwrap_or(&import.path)
                        .to_string(),
                };
                let obj = self.new_object(
                    &name,
                    ObjectKind::Package {
                        path: import.path.clone(),
                    },
                    Type::Invalid,
                    import.alias.as_ref().map(|a| a.id),
                );
                self.declare(file_scope, obj);
            }

            for decl in &file.ast.decls {
                if let Decl::Func(func) = decl {
                    self.check_func(func, file_scope);
                }
            }
        }
    }

    fn check_func(&mut self, func: &FuncDecl, file_scope: ScopeId) {
        let func_scope = self.open_scope(file_scope);
        self.info.func_scopes.insert(func.name.id, func_scope);

        for tp in &func.type_params {
            for name in &tp.names {
                if name.is_blank() {
                    continue;
                }
                let obj = self.new_object(
                    &name.name,
                    ObjectKind::TypeName,
                    Type::TypeParam(name.name.clone()),
                    Some(name.id),
                );
                self.declare(func_scope, obj);
                self.info.defs.insert(name.id, obj);
            }
        }

        if let Some(recv) = &func.recv {
            if let Some(name) = &recv.name {
                if !name.is_blank() {
                    let base = Type::Named {
                        pkg: None,
                        name: recv.type_name.name.clone(),
                    };
                    let typ = if recv.pointer {
                        Type::Pointer(Box::new(base))
                    } else {
                        base
                    };
                    let obj =
                        self.new_object(&name.name, ObjectKind::Receiver, typ, Some(name.id));
                    self.declare(func_scope, obj);
                    self.info.defs.insert(name.id, obj);
                }
            }
        }

        self.declare_signature(&func.typ, func_scope);

        if let Some(body) = &func.body {
            self.check_stmts(&body.stmts, func_scope);
        }
    }

    /// Declare parameters and named results into `scope`.
    fn declare_signature(&mut self, sig: &FuncTypeExpr, scope: ScopeId) {
        for param in sig.params.iter().chain(sig.results.iter()) {
            let mut typ = self.resolve_type_expr(&param.typ, scope);
            if param.variadic {
                typ = Type::Slice(Box::new(typ));
            }
            for name in &param.names {
                if name.is_blank() {
                    continue;
                }
                let obj = self.new_object(&name.name, ObjectKind::Param, typ.clone(), Some(name.id));
                self.declare(scope, obj);
                self.info.defs.insert(name.id, obj);
            }
        }
    }

    fn check_stmts(&mut self, stmts: &[Stmt], scope: ScopeId) {
        for stmt in stmts {
            self.check_stmt(stmt, scope);
        }
    }

    fn check_stmt(&mut self, stmt: &Stmt, scope: ScopeId) {
        match stmt {
            Stmt::Decl(decl) => self.check_local_decl(decl, scope),
            Stmt::Empty => {}
            Stmt::Expr(expr) => self.bind_expr(expr, scope),
            Stmt::Send { chan, value } => {
                self.bind_expr(chan, scope);
                self.bind_expr(value, scope);
            }
            Stmt::IncDec { x, .. } => self.bind_expr(x, scope),
            Stmt::Assign {
                lhs, define, rhs, ..
            } => {
                for expr in rhs {
                    self.bind_expr(expr, scope);
                }
                if *define {
                    let types = self.expr_type_list(rhs, lhs.len(), scope);
                    for (i, target) in lhs.iter().enumerate() {
                        self.define_target(target, types.get(i).cloned(), scope);
                    }
                } else {
                    for expr in lhs {
                        self.bind_expr(expr, scope);
                    }
                }
            }
            Stmt::Go(expr) | Stmt::Defer(expr) => self.bind_expr(expr, scope),
            Stmt::Return(exprs) => {
                for expr in exprs {
                    self.bind_expr(expr, scope);
                }
            }
            Stmt::Branch { .. } => {}
            Stmt::Block(block) => {
                let inner = self.open_scope(scope);
                self.check_stmts(&block.stmts, inner);
            }
            Stmt::If {
                init,
                cond,
                then,
                els,
            } => {
                let header = self.open_scope(scope);
                if let Some(init) = init {
                    self.check_stmt(init, header);
                }
                self.bind_expr(cond, header);
                let then_scope = self.open_scope(header);
                self.check_stmts(&then.stmts, then_scope);
                if let Some(els) = els {
                    let else_scope = self.open_scope(header);
                    self.check_stmt(els, else_scope);
                }
            }
            Stmt::Switch {
                init,
                guard,
                tag,
                cases,
            } => {
                let header = self.open_scope(scope);
                if let Some(init) = init {
                    self.check_stmt(init, header);
                }
                if let Some(guard) = guard {
                    self.check_stmt(guard, header);
                }
                if let Some(tag) = tag {
                    self.bind_expr(tag, header);
                }
                for case in cases {
                    let case_scope = self.open_scope(header);
                    for expr in &case.exprs {
                        self.bind_expr(expr, case_scope);
                    }
                    self.check_stmts(&case.body, case_scope);
                }
            }
            Stmt::Select { cases } => {
                for case in cases {
                    let case_scope = self.open_scope(scope);
                    self.check_stmts(&case.body, case_scope);
                }
            }
            Stmt::For {
                init,
                cond,
                post,
                body,
            } => {
                let header = self.open_scope(scope);
                if let Some(init) = init {
                    self.check_stmt(init, header);
                }
                if let Some(cond) = cond {
                    self.bind_expr(cond, header);
                }
                if let Some(post) = post {
                    self.check_stmt(post, header);
                }
                let body_scope = self.open_scope(header);
                self.check_stmts(&body.stmts, body_scope);
            }
            Stmt::Range {
                key,
                value,
                define,
                x,
                body,
            } => {
                let header = self.open_scope(scope);
                self.bind_expr(x, header);
                let (key_type, value_type) = self.range_types(x, header);
                if *define {
                    if let Some(key) = key {
                        self.define_target(key, Some(key_type), header);
                    }
                    if let Some(value) = value {
                        self.define_target(value, Some(value_type), header);
                    }
                } else {
                    for expr in [key, value].into_iter().flatten() {
                        self.bind_expr(expr, header);
                    }
                }
                let body_scope = self.open_scope(header);
                self.check_stmts(&body.stmts, body_scope);
            }
            Stmt::Labeled { stmt, .. } => self.check_stmt(stmt, scope),
        }
    }

    /// Handle one left-hand side of a `:=`. A name already declared in the
    /// current scope is a redeclaration: the existing object is reused and
    /// the identifier is recorded as a use, not a def.
    fn define_target(&mut self, target: &Expr, typ: Option<Type>, scope: ScopeId) {
        let Expr::Ident(ident) = target else {
            // Non-identifier targets appear in `=` range clauses only.
            self.bind_expr(target, scope);
            return;
        };
        if ident.is_blank() {
            return;
        }
        if let Some(existing) = self.info.scope_declares(scope, &ident.name) {
            self.info.uses.insert(ident.id, existing);
            return;
        }
        let obj = self.new_object(
            &ident.name,
            ObjectKind::Var,
            typ.unwrap_or(Type::Invalid),
            Some(ident.id),
        );
        self.declare(scope, obj);
        self.info.defs.insert(ident.id, obj);
    }

    fn check_local_decl(&mut self, decl: &Decl, scope: ScopeId) {
        match decl {
            Decl::Var(specs) | Decl::Const(specs) => {
                let kind = if matches!(decl, Decl::Var(_)) {
                    ObjectKind::Var
                } else {
                    ObjectKind::Const
                };
                for spec in specs {
                    for value in &spec.values {
                        self.bind_expr(value, scope);
                    }
                    let annotated = spec
                        .typ
                        .as_ref()
                        .map(|t| self.resolve_type_expr(t, scope));
                    let inferred: Vec<Type> = if annotated.is_none() {
                        self.expr_type_list(&spec.values, spec.names.len(), scope)
                    } else {
                        Vec::new()
                    };
                    for (i, name) in spec.names.iter().enumerate() {
                        if name.is_blank() {
                            continue;
                        }
                        let typ = match &annotated {
                            Some(t) => t.clone(),
                            None => inferred.get(i).cloned().unwrap_or(Type::Invalid),
                        };
                        let obj = self.new_object(&name.name, kind.clone(), typ, Some(name.id));
                        self.declare(scope, obj);
                        self.info.defs.insert(name.id, obj);
                    }
                }
            }
            Decl::Type(specs) => {
                for spec in specs {
                    if spec.name.is_blank() {
                        continue;
                    }
                    let typ = Type::Named {
                        pkg: None,
                        name: spec.name.name.clone(),
                    };
                    let obj = self.new_object(
                        &spec.name.name,
                        ObjectKind::TypeName,
                        typ,
                        Some(spec.name.id),
                    );
                    self.declare(scope, obj);
                    self.info.defs.insert(spec.name.id, obj);
                    if let TypeExpr::Struct(st) = &spec.typ {
                        self.collect_struct_fields(&spec.name.name, st, scope);
                    }
                }
            }
            Decl::Func(_) => {
                // Function declarations cannot be nested; tolerated as a
                // no-op if one ever appears here.
            }
        }
    }

    // ------------------------------------------------------------------
    // Use binding

    fn bind_expr(&mut self, expr: &Expr, scope: ScopeId) {
        match expr {
            Expr::Ident(ident) => {
                if ident.is_blank() {
                    return;
                }
                if let Some(obj) = self.info.lookup_from(scope, &ident.name) {
                    self.info.uses.insert(ident.id, obj);
                }
            }
            Expr::BasicLit { .. } | Expr::TypeInExpr(_) => {}
            Expr::CompositeLit { typ, elems, .. } => {
                let keys_are_exprs = matches!(typ.as_deref(), Some(TypeExpr::Map { .. }));
                for elem in elems {
                    match elem {
                        Expr::KeyValue { key, value } => {
                            // Struct literal keys are field names, not local
                            // references; map keys are ordinary expressions.
                            if keys_are_exprs || !matches!(key.as_ref(), Expr::Ident(_)) {
                                self.bind_expr(key, scope);
                            }
                            self.bind_expr(value, scope);
                        }
                        other => self.bind_expr(other, scope),
                    }
                }
            }
            Expr::KeyValue { key, value } => {
                self.bind_expr(key, scope);
                self.bind_expr(value, scope);
            }
            Expr::FuncLit { typ, body } => {
                let lit_scope = self.open_scope(scope);
                self.declare_signature(typ, lit_scope);
                self.check_stmts(&body.stmts, lit_scope);
            }
            Expr::Call { fun, args, .. } => {
                self.bind_expr(fun, scope);
                for arg in args {
                    self.bind_expr(arg, scope);
                }
            }
            Expr::Selector { x, .. } => {
                // The selected name is a field or method, resolved through
                // the type tables, never a lexical reference.
                self.bind_expr(x, scope);
            }
            Expr::Index { x, index } => {
                self.bind_expr(x, scope);
                self.bind_expr(index, scope);
            }
            Expr::SliceExpr { x, low, high, max } => {
                self.bind_expr(x, scope);
                for part in [low, high, max].into_iter().flatten() {
                    self.bind_expr(part, scope);
                }
            }
            Expr::TypeAssert { x, .. } => self.bind_expr(x, scope),
            Expr::Unary { x, .. } | Expr::Star { x } => self.bind_expr(x, scope),
            Expr::Binary { x, y, .. } => {
                self.bind_expr(x, scope);
                self.bind_expr(y, scope);
            }
            Expr::Paren(inner) => self.bind_expr(inner, scope),
        }
    }

    // ------------------------------------------------------------------
    // Type resolution and inference

    fn basic_type(name: &str) -> Option<Type> {
        PREDECLARED
            .iter()
            .copied()
            .find(|p| *p == name)
            .map(Type::Basic)
    }

    fn resolve_type_expr(&mut self, typ: &TypeExpr, scope: ScopeId) -> Type {
        match typ {
            TypeExpr::Name(ident) => self.resolve_type_name(&ident.name, scope),
            TypeExpr::Qualified { pkg, name } => {
                let path = match self.info.lookup_from(scope, &pkg.name) {
                    Some(obj) => match &self.info.objects[obj].kind {
                        ObjectKind::Package { path } => path.clone(),
                        _ => pkg.name.clone(),
                    },
                    None => pkg.name.clone(),
                };
                Type::Named {
                    pkg: Some(path),
                    name: name.name.clone(),
                }
            }
            TypeExpr::Pointer(elem) => {
                Type::Pointer(Box::new(self.resolve_type_expr(elem, scope)))
            }
            TypeExpr::Slice(elem) => Type::Slice(Box::new(self.resolve_type_expr(elem, scope))),
            TypeExpr::Array { len, elem } => Type::Array {
                len: len.clone(),
                elem: Box::new(self.resolve_type_expr(elem, scope)),
            },
            TypeExpr::Map { key, value } => Type::Map {
                key: Box::new(self.resolve_type_expr(key, scope)),
                value: Box::new(self.resolve_type_expr(value, scope)),
            },
            TypeExpr::Chan { elem, .. } => {
                Type::Chan(Box::new(self.resolve_type_expr(elem, scope)))
            }
            TypeExpr::Func(_) => Type::Func,
            TypeExpr::Struct(_) => Type::StructLit,
            TypeExpr::Interface { .. } => Type::InterfaceLit,
            TypeExpr::Ellipsis(elem) => {
                Type::Slice(Box::new(self.resolve_type_expr(elem, scope)))
            }
        }
    }

    fn resolve_type_name(&mut self, name: &str, scope: ScopeId) -> Type {
        if let Some(obj) = self.info.lookup_from(scope, name) {
            let object = &self.info.objects[obj];
            if matches!(object.kind, ObjectKind::TypeName) {
                return object.typ.clone();
            }
        }
        if let Some(basic) = Self::basic_type(name) {
            return basic;
        }
        // Unknown names are tolerated as same-package named types.
        Type::Named {
            pkg: None,
            name: name.to_string(),
        }
    }

    /// Types for a definition's right-hand side, padded to `want` entries.
    fn expr_type_list(&mut self, exprs: &[Expr], want: usize, scope: ScopeId) -> Vec<Type> {
        let mut types = if exprs.len() == 1 && want > 1 {
            self.expr_type_multi(&exprs[0], scope)
        } else {
            exprs.iter().map(|e| self.expr_type(e, scope)).collect()
        };
        types.resize(want, Type::Invalid);
        types
    }

    /// The value types of a multi-value expression (call results, comma-ok).
    fn expr_type_multi(&mut self, expr: &Expr, scope: ScopeId) -> Vec<Type> {
        match expr {
            Expr::Call { .. } => self.call_types(expr, scope),
            Expr::TypeAssert { typ: Some(t), .. } => {
                vec![self.resolve_type_expr(t, scope), Type::Basic("bool")]
            }
            Expr::Index { x, .. } => {
                let container = self.expr_type(x, scope);
                match container {
                    Type::Map { value, .. } => vec![*value, Type::Basic("bool")],
                    _ => vec![self.expr_type(expr, scope)],
                }
            }
            Expr::Unary {
                op: Token::Arrow,
                x,
            } => {
                let elem = match self.expr_type(x, scope) {
                    Type::Chan(elem) => *elem,
                    _ => Type::Invalid,
                };
                vec![elem, Type::Basic("bool")]
            }
            Expr::Paren(inner) => self.expr_type_multi(inner, scope),
            other => vec![self.expr_type(other, scope)],
        }
    }

    fn expr_type(&mut self, expr: &Expr, scope: ScopeId) -> Type {
        match expr {
            Expr::Ident(ident) => match self.info.lookup_from(scope, &ident.name) {
                Some(obj) => self.info.objects[obj].typ.clone(),
                None => Type::Invalid,
            },
            Expr::BasicLit { kind, .. } => match kind {
                LitKind::Int => Type::Basic("int"),
                LitKind::Float => Type::Basic("float64"),
                LitKind::Imag => Type::Basic("complex128"),
                LitKind::Rune => Type::Basic("rune"),
                LitKind::Str => Type::Basic("string"),
            },
            Expr::CompositeLit { typ, .. } => match typ {
                Some(t) => self.resolve_type_expr(t, scope),
                None => Type::Invalid,
            },
            Expr::KeyValue { .. } => Type::Invalid,
            Expr::FuncLit { .. } => Type::Func,
            Expr::Call { .. } => self
                .call_types(expr, scope)
                .into_iter()
                .next()
                .unwrap_or(Type::Invalid),
            Expr::Selector { x, sel } => {
                let base = self.expr_type(x, scope);
                let base = match base {
                    Type::Pointer(inner) => *inner,
                    other => other,
                };
                if let Type::Named { pkg: None, name } = base {
                    if let Some(typ) = self.fields.get(&(name, sel.name.clone())) {
                        return typ.clone();
                    }
                }
                Type::Invalid
            }
            Expr::Index { x, .. } => {
                let container = self.expr_type(x, scope);
                match container {
                    Type::Map { value, .. } => *value,
                    Type::Slice(elem) => *elem,
                    Type::Array { elem, .. } => *elem,
                    Type::Pointer(inner) => match *inner {
                        Type::Array { elem, .. } => *elem,
                        _ => Type::Invalid,
                    },
                    Type::Basic("string") => Type::Basic("byte"),
                    // Indexing a function is generic instantiation.
                    Type::Func => Type::Func,
                    _ => Type::Invalid,
                }
            }
            Expr::SliceExpr { x, .. } => {
                let base = self.expr_type(x, scope);
                match base {
                    Type::Array { elem, .. } => Type::Slice(elem),
                    Type::Pointer(inner) => match *inner {
                        Type::Array { elem, .. } => Type::Slice(elem),
                        _ => Type::Invalid,
                    },
                    other @ (Type::Slice(_) | Type::Basic("string")) => other,
                    _ => Type::Invalid,
                }
            }
            Expr::TypeAssert { typ, .. } => match typ {
                Some(t) => self.resolve_type_expr(t, scope),
                None => Type::Invalid,
            },
            Expr::Star { x } => match self.expr_type(x, scope) {
                Type::Pointer(elem) => *elem,
                _ => Type::Invalid,
            },
            Expr::Unary { op, x } => match op {
                Token::And => Type::Pointer(Box::new(self.expr_type(x, scope))),
                Token::Arrow => match self.expr_type(x, scope) {
                    Type::Chan(elem) => *elem,
                    _ => Type::Invalid,
                },
                Token::Not => Type::Basic("bool"),
                _ => self.expr_type(x, scope),
            },
            Expr::Binary { x, op, y } => match op {
                Token::Eql
                | Token::Neq
                | Token::Lss
                | Token::Leq
                | Token::Gtr
                | Token::Geq
                | Token::LAnd
                | Token::LOr => Type::Basic("bool"),
                _ => {
                    let left = self.expr_type(x, scope);
                    if left == Type::Invalid {
                        self.expr_type(y, scope)
                    } else {
                        left
                    }
                }
            },
            Expr::Paren(inner) => self.expr_type(inner, scope),
            Expr::TypeInExpr(typ) => self.resolve_type_expr(typ, scope),
        }
    }

    /// Result types of a call expression (conversions included).
    fn call_types(&mut self, expr: &Expr, scope: ScopeId) -> Vec<Type> {
        let Expr::Call { fun, args, .. } = expr else {
            return vec![Type::Invalid];
        };
        let fun = strip_parens(fun);
        match fun {
            Expr::Ident(ident) => {
                let Some(obj) = self.info.lookup_from(scope, &ident.name) else {
                    return vec![Type::Invalid];
                };
                match self.info.objects[obj].kind.clone() {
                    ObjectKind::Builtin => self.builtin_call_types(&ident.name, args, scope),
                    ObjectKind::TypeName => vec![self.info.objects[obj].typ.clone()],
                    ObjectKind::Func => self.info.objects[obj].results.clone(),
                    _ => vec![Type::Invalid],
                }
            }
            Expr::Selector { x, sel } => {
                if let Expr::Ident(pkg) = strip_parens(x) {
                    if let Some(obj) = self.info.lookup_from(scope, &pkg.name) {
                        if matches!(self.info.objects[obj].kind, ObjectKind::Package { .. }) {
                            return vec![Type::Invalid];
                        }
                    }
                }
                let base = self.expr_type(x, scope);
                let base = match base {
                    Type::Pointer(inner) => *inner,
                    other => other,
                };
                if let Type::Named { pkg: None, name } = base {
                    if let Some(results) = self.methods.get(&(name, sel.name.clone())) {
                        return results.clone();
                    }
                }
                vec![Type::Invalid]
            }
            Expr::TypeInExpr(typ) => vec![self.resolve_type_expr(typ, scope)],
            Expr::FuncLit { typ, .. } => {
                let typ = typ.clone();
                vec![self
                    .result_types(&typ, scope)
                    .into_iter()
                    .next()
                    .unwrap_or(Type::Invalid)]
            }
            _ => vec![Type::Invalid],
        }
    }

    fn builtin_call_types(&mut self, name: &str, args: &[Expr], scope: ScopeId) -> Vec<Type> {
        match name {
            "len" | "cap" | "copy" => vec![Type::Basic("int")],
            "append" | "min" | "max" => match args.first() {
                Some(arg) => vec![self.expr_type(arg, scope)],
                None => vec![Type::Invalid],
            },
            "make" => match args.first() {
                Some(arg) => vec![self.type_from_expr(arg, scope)],
                None => vec![Type::Invalid],
            },
            "new" => match args.first() {
                Some(arg) => vec![Type::Pointer(Box::new(self.type_from_expr(arg, scope)))],
                None => vec![Type::Invalid],
            },
            "recover" => vec![Type::Basic("any")],
            _ => Vec::new(),
        }
    }

    /// Interpret an expression that syntactically denotes a type (the first
    /// argument of `make`/`new`).
    fn type_from_expr(&mut self, expr: &Expr, scope: ScopeId) -> Type {
        match expr {
            Expr::TypeInExpr(typ) => self.resolve_type_expr(typ, scope),
            Expr::Ident(ident) => self.resolve_type_name(&ident.name, scope),
            Expr::Selector { x, sel } => {
                if let Expr::Ident(pkg) = strip_parens(x) {
                    let typ = TypeExpr::Qualified {
                        pkg: pkg.clone(),
                        name: sel.clone(),
                    };
                    return self.resolve_type_expr(&typ, scope);
                }
                Type::Invalid
            }
            Expr::Star { x } => Type::Pointer(Box::new(self.type_from_expr(x, scope))),
            Expr::Index { x, .. } => self.type_from_expr(x, scope),
            Expr::Paren(inner) => self.type_from_expr(inner, scope),
            _ => Type::Invalid,
        }
    }

    fn result_types(&mut self, sig: &FuncTypeExpr, scope: ScopeId) -> Vec<Type> {
        sig.results
            .iter()
            .flat_map(|param| {
                let typ = self.resolve_type_expr(&param.typ, scope);
                let count = param.names.len().max(1);
                std::iter::repeat_n(typ, count)
            })
            .collect()
    }

    /// Key and value types produced by ranging over `x`.
    fn range_types(&mut self, x: &Expr, scope: ScopeId) -> (Type, Type) {
        match self.expr_type(x, scope) {
            Type::Map { key, value } => (*key, *value),
            Type::Slice(elem) => (Type::Basic("int"), *elem),
            Type::Array { elem, .. } => (Type::Basic("int"), *elem),
            Type::Pointer(inner) => match *inner {
                Type::Array { elem, .. } => (Type::Basic("int"), *elem),
                _ => (Type::Invalid, Type::Invalid),
            },
            Type::Basic("string") => (Type::Basic("int"), Type::Basic("rune")),
            Type::Chan(elem) => (*elem, Type::Invalid),
            Type::Basic(b) if is_integer(b) => (Type::Basic(b), Type::Invalid),
            Type::Func => (Type::Invalid, Type::Invalid),
            _ => (Type::Invalid, Type::Invalid),
        }
    }
}

/// The files participating in the current resolve.
fn included_files(
    pkg: &GoPackage,
    include_tests: bool,
) -> impl Iterator<Item = &crate::package::SourceFile> {
    pkg.files
        .iter()
        .filter(move |file| include_tests || !file.is_test)
}

fn strip_parens(expr: &Expr) -> &Expr {
    match expr {
        Expr::Paren(inner) => strip_parens(inner),
        other => other,
    }
}

fn is_integer(name: &str) -> bool {
    matches!(
        name,
        "int" | "int8"
            | "int16"
            | "int32"
            | "int64"
            | "uint"
            | "uint8"
            | "uint16"
            | "uint32"
            | "uint64"
            | "uintptr"
            | "byte"
            | "rune"
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::package::GoPackage;

    fn check(files: &[(&str, &str)]) -> (GoPackage, TypeInfo) {
        let mut pkg = GoPackage::from_sources(files);
        let info = resolve(&mut pkg, true).expect("resolve");
        (pkg, info)
    }

    /// Find the def object for the nth occurrence of `name` as a defined
    /// identifier.
    fn def_object<'i>(pkg: &GoPackage, info: &'i TypeInfo, name: &str, nth: usize) -> &'i Object {
        let mut found = Vec::new();
        for file in &pkg.files {
            crate::ast::walk_idents(&file.ast, &mut |ident| {
                if ident.name == name {
                    if let Some(obj) = info.defs.get(&ident.id) {
                        found.push(*obj);
                    }
                }
            });
        }
        info.object(*found.get(nth).expect("def not found"))
    }

    #[test]
    fn short_decl_infers_composite_type() {
        let (pkg, info) = check(&[(
            "x.go",
            "package p\n\ntype R struct{}\n\nfunc f() { r := R{}; _ = r }\n",
        )]);
        let obj = def_object(&pkg, &info, "r", 0);
        assert_eq!(obj.kind, ObjectKind::Var);
        assert_eq!(obj.typ.complete_string(), "R");
    }

    #[test]
    fn partial_redeclaration_reuses_object() {
        let (pkg, info) = check(&[(
            "x.go",
            "package p\n\nfunc f() {\n\ta := 1\n\ta, b := 2, 3\n\t_, _ = a, b\n}\n",
        )]);
        // `a` has exactly one def; the second mention is a use.
        let mut a_defs = 0;
        let mut b_defs = 0;
        for file in &pkg.files {
            crate::ast::walk_idents(&file.ast, &mut |ident| {
                if info.defs.contains_key(&ident.id) {
                    match ident.name.as_str() {
                        "a" => a_defs += 1,
                        "b" => b_defs += 1,
                        _ => {}
                    }
                }
            });
        }
        assert_eq!(a_defs, 1);
        assert_eq!(b_defs, 1);
    }

    #[test]
    fn range_over_map_literal_types() {
        let (pkg, info) = check(&[(
            "x.go",
            "package p\n\nfunc f() {\n\tfor k, v := range map[string]int{\"a\": 1} {\n\t\t_, _ = k, v\n\t}\n}\n",
        )]);
        assert_eq!(def_object(&pkg, &info, "k", 0).typ, Type::Basic("string"));
        assert_eq!(def_object(&pkg, &info, "v", 0).typ, Type::Basic("int"));
    }

    #[test]
    fn range_without_define_binds_uses_only() {
        let (pkg, info) = check(&[(
            "x.go",
            "package p\n\nfunc f(m map[string]int) {\n\tvar k string\n\tvar v int\n\tfor k, v = range m {\n\t\t_, _ = k, v\n\t}\n}\n",
        )]);
        let mut k_defs = 0;
        for file in &pkg.files {
            crate::ast::walk_idents(&file.ast, &mut |ident| {
                if ident.name == "k" && info.defs.contains_key(&ident.id) {
                    k_defs += 1;
                }
            });
        }
        assert_eq!(k_defs, 1, "only the var declaration defines k");
    }

    #[test]
    fn variadic_param_is_slice() {
        let (pkg, info) = check(&[("x.go", "package p\n\nfunc h(x ...string) { _ = x }\n")]);
        let obj = def_object(&pkg, &info, "x", 0);
        assert_eq!(obj.kind, ObjectKind::Param);
        assert_eq!(obj.typ.complete_string(), "[]string");
        assert!(obj.typ.is_slice());
    }

    #[test]
    fn receiver_pointer_type() {
        let (pkg, info) = check(&[(
            "x.go",
            "package p\n\ntype R struct{}\n\nfunc (r *R) m() { _ = r }\n",
        )]);
        let obj = def_object(&pkg, &info, "r", 0);
        assert_eq!(obj.kind, ObjectKind::Receiver);
        assert_eq!(obj.typ.complete_string(), "*R");
        assert_eq!(obj.typ.root_string(), "R");
    }

    #[test]
    fn function_call_inference() {
        let (pkg, info) = check(&[(
            "x.go",
            "package p\n\ntype R struct{}\n\nfunc mk() R { return R{} }\n\nfunc f() { r := mk(); _ = r }\n",
        )]);
        let obj = def_object(&pkg, &info, "r", 0);
        assert_eq!(obj.typ.complete_string(), "R");
    }

    #[test]
    fn method_call_inference() {
        let (pkg, info) = check(&[(
            "x.go",
            "package p\n\ntype R struct{}\n\ntype S struct{}\n\nfunc (r R) other() S { return S{} }\n\nfunc f() {\n\tr := R{}\n\ts := r.other()\n\t_ = s\n}\n",
        )]);
        let obj = def_object(&pkg, &info, "s", 0);
        assert_eq!(obj.typ.complete_string(), "S");
    }

    #[test]
    fn field_selector_inference() {
        let (pkg, info) = check(&[(
            "x.go",
            "package p\n\ntype R struct{ count int }\n\nfunc f(r R) {\n\tn := r.count\n\t_ = n\n}\n",
        )]);
        let obj = def_object(&pkg, &info, "n", 0);
        assert_eq!(obj.typ, Type::Basic("int"));
    }

    #[test]
    fn multi_value_call_assignment() {
        let (pkg, info) = check(&[(
            "x.go",
            "package p\n\nfunc two() (int, string) { return 0, \"\" }\n\nfunc f() {\n\tn, s := two()\n\t_, _ = n, s\n}\n",
        )]);
        assert_eq!(def_object(&pkg, &info, "n", 0).typ, Type::Basic("int"));
        assert_eq!(def_object(&pkg, &info, "s", 0).typ, Type::Basic("string"));
    }

    #[test]
    fn qualified_types_use_import_path() {
        let (pkg, info) = check(&[(
            "x.go",
            "package p\n\nimport \"example.com/util\"\n\nfunc f(b util.Buf) { _ = b }\n",
        )]);
        let obj = def_object(&pkg, &info, "b", 0);
        assert_eq!(obj.typ.complete_string(), "example.com/util.Buf");
        assert!(obj.typ.is_named());
    }

    #[test]
    fn make_and_new_builtins() {
        let (pkg, info) = check(&[(
            "x.go",
            "package p\n\ntype R struct{}\n\nfunc f() {\n\tm := make(map[string]int)\n\tp2 := new(R)\n\t_, _ = m, p2\n}\n",
        )]);
        assert_eq!(
            def_object(&pkg, &info, "m", 0).typ.complete_string(),
            "map[string]int"
        );
        assert_eq!(def_object(&pkg, &info, "p2", 0).typ.complete_string(), "*R");
    }

    #[test]
    fn address_of_composite() {
        let (pkg, info) = check(&[(
            "x.go",
            "package p\n\ntype R struct{}\n\nfunc f() {\n\tr := &R{}\n\t_ = r\n}\n",
        )]);
        let obj = def_object(&pkg, &info, "r", 0);
        assert_eq!(obj.typ.complete_string(), "*R");
        assert!(obj.typ.is_ptr());
    }

    #[test]
    fn closure_params_are_scoped() {
        let (pkg, info) = check(&[(
            "x.go",
            "package p\n\nfunc f() {\n\tg := func(x int) int { return x }\n\t_ = g(1)\n}\n",
        )]);
        let obj = def_object(&pkg, &info, "x", 0);
        assert_eq!(obj.kind, ObjectKind::Param);
        assert_eq!(obj.typ, Type::Basic("int"));
        // The closure's return of x is a use bound to the same object.
        let mut uses = 0;
        for file in &pkg.files {
            crate::ast::walk_idents(&file.ast, &mut |ident| {
                if ident.name == "x" && info.uses.contains_key(&ident.id) {
                    uses += 1;
                }
            });
        }
        assert_eq!(uses, 1);
    }

    #[test]
    fn non_test_resolve_of_test_package_is_invariant_error() {
        let mut pkg = GoPackage::from_sources(&[(
            "x_test.go",
            "package p_test\n\nfunc f() {}\n",
        )]);
        let err = resolve(&mut pkg, false).unwrap_err();
        assert!(matches!(err, CheckError::Invariant(_)));
        assert!(err.to_string().contains("test package"));
    }

    #[test]
    fn non_test_resolve_skips_test_files() {
        let mut pkg = GoPackage::from_sources(&[
            ("code.go", "package p\n\nvar V int\n"),
            ("code_test.go", "package p\n\nfunc helper() { y := 1; _ = y }\n"),
        ]);
        let info = resolve(&mut pkg, false).expect("resolve");
        let mut saw_y = false;
        for file in &pkg.files {
            crate::ast::walk_idents(&file.ast, &mut |ident| {
                if ident.name == "y" && info.defs.contains_key(&ident.id) {
                    saw_y = true;
                }
            });
        }
        assert!(!saw_y, "test-file locals must not be resolved");
    }

    #[test]
    fn conflicting_package_clauses_error() {
        let mut pkg = GoPackage::from_sources(&[
            ("a.go", "package p\n"),
            ("b.go", "package q\n"),
        ]);
        let err = resolve(&mut pkg, true).unwrap_err();
        assert!(matches!(err, CheckError::TypeCheck(_)));
    }

    #[test]
    fn unknown_names_resolve_leniently() {
        let (pkg, info) = check(&[(
            "x.go",
            "package p\n\nfunc f(v Mystery) { _ = v }\n",
        )]);
        let obj = def_object(&pkg, &info, "v", 0);
        assert_eq!(obj.typ.complete_string(), "Mystery");
    }

    #[test]
    fn type_params_resolve_in_signature() {
        let (pkg, info) = check(&[(
            "x.go",
            "package p\n\nfunc first[T any](xs []T) T { return xs[0] }\n",
        )]);
        let obj = def_object(&pkg, &info, "xs", 0);
        assert_eq!(obj.typ.complete_string(), "[]T");
        assert!(obj.typ.is_type_param());
        assert!(!obj.typ.is_named());
    }
}

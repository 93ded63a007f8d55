//! Safe batch application of rename directives.
//!
//! Every directive is resolved against the original package before any
//! rewrite is committed: `(from, declaration-id, file)` names a unique
//! declaration site, with the multi-line `context` block disambiguating when
//! a function declares the same spelling more than once.
//!
//! A directive is rejected (per-directive, with a reason) when:
//! - `to` is not a legal, non-blank, non-keyword identifier
//! - `to` equals `from`
//! - the site cannot be resolved, or stays ambiguous after context matching
//! - the declaration is not a function-local var/const, parameter, named
//!   result, or receiver
//! - `to` would collide: it resolves in scope at the declaration site, is
//!   declared anywhere within the enclosing function, or an earlier
//!   directive already introduced it there
//!
//! Rejections never mutate a file. Accepted directives rewrite every
//! identifier of the resolved object (closures included) through the
//! span-edit engine, and the batch is flushed to disk per file.

use std::collections::{HashMap, HashSet};

use thiserror::Error;
use tracing::debug;

use renamebot_core::patch::{apply_edits, EditError, SourceEdit};
use renamebot_core::RenamebotError;
use renamebot_gosyn::ast::{walk_func_idents, Decl, FuncDecl, Ident};
use renamebot_gosyn::check::{ObjectId, ObjectKind, ScopeId, TypeInfo};
use renamebot_gosyn::package::{declaration_id, GoPackage, SourceFile};
use renamebot_gosyn::token::Token;

use crate::propose::ProposedRename;

/// A directive that could not be applied, with the reason.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailedRename {
    pub rename: ProposedRename,
    pub reason: String,
}

/// Outcome of one batch: applied directives and per-directive failures.
#[derive(Debug, Default)]
pub struct RenameOutcome {
    pub applied: Vec<ProposedRename>,
    pub failed: Vec<FailedRename>,
}

/// Systemic failures that abort the whole batch.
#[derive(Debug, Error)]
pub enum ApplyError {
    #[error("io error writing {file}: {source}")]
    Io {
        file: String,
        source: std::io::Error,
    },

    #[error("edit conflict in {file}: {source}")]
    Edit { file: String, source: EditError },
}

impl From<ApplyError> for RenamebotError {
    fn from(err: ApplyError) -> Self {
        match err {
            ApplyError::Io { source, .. } => RenamebotError::Io(source),
            ApplyError::Edit { file, source } => RenamebotError::Apply {
                message: format!("conflicting edits in {file}: {source}"),
            },
        }
    }
}

/// Apply a batch of directives to the package.
///
/// Directives are resolved independently against the current trees, then all
/// surviving edits are committed at once. File contents are updated in
/// memory and, when the package was loaded from a directory, written back in
/// place.
pub fn apply_renames(
    pkg: &mut GoPackage,
    info: &TypeInfo,
    directives: Vec<ProposedRename>,
) -> Result<RenameOutcome, ApplyError> {
    let mut outcome = RenameOutcome::default();
    let mut edits_per_file: HashMap<String, Vec<SourceEdit>> = HashMap::new();
    let mut claimed_objects: HashSet<ObjectId> = HashSet::new();
    let mut introduced: HashSet<(ScopeId, String)> = HashSet::new();

    for directive in directives {
        match resolve_directive(pkg, info, &directive, &claimed_objects, &introduced) {
            Ok(resolved) => {
                claimed_objects.insert(resolved.object);
                introduced.insert((resolved.func_scope, directive.to.clone()));
                edits_per_file
                    .entry(directive.file_name.clone())
                    .or_default()
                    .extend(resolved.edits);
                debug!(
                    from = %directive.from,
                    to = %directive.to,
                    declaration = %directive.declaration_id,
                    "rename resolved"
                );
                outcome.applied.push(directive);
            }
            Err(reason) => outcome.failed.push(FailedRename {
                rename: directive,
                reason,
            }),
        }
    }

    for (file_name, edits) in edits_per_file {
        let on_disk = (!pkg.dir.as_os_str().is_empty()).then(|| pkg.dir.join(&file_name));
        let Some(file) = pkg.file_mut(&file_name) else {
            continue;
        };
        let rewritten =
            apply_edits(&file.content, edits).map_err(|source| ApplyError::Edit {
                file: file_name.clone(),
                source,
            })?;
        file.content = rewritten;
        if let Some(path) = on_disk {
            std::fs::write(&path, file.content.as_bytes()).map_err(|source| ApplyError::Io {
                file: file_name.clone(),
                source,
            })?;
        }
    }

    Ok(outcome)
}

struct ResolvedDirective {
    object: ObjectId,
    func_scope: ScopeId,
    edits: Vec<SourceEdit>,
}

fn resolve_directive(
    pkg: &GoPackage,
    info: &TypeInfo,
    directive: &ProposedRename,
    claimed_objects: &HashSet<ObjectId>,
    introduced: &HashSet<(ScopeId, String)>,
) -> Result<ResolvedDirective, String> {
    if let Err(reason) = validate_identifier(&directive.to) {
        return Err(reason);
    }
    if directive.to == directive.from {
        return Err("rename is a no-op".to_string());
    }

    let file = pkg
        .file(&directive.file_name)
        .ok_or_else(|| format!("file {} is not part of the package", directive.file_name))?;

    // Functions in this file carrying the directive's declaration-id.
    let functions: Vec<&FuncDecl> = file
        .ast
        .decls
        .iter()
        .filter_map(|decl| match decl {
            Decl::Func(func) if declaration_id(func, file) == directive.declaration_id => {
                Some(func)
            }
            _ => None,
        })
        .collect();
    if functions.is_empty() {
        return Err(format!(
            "no function with declaration id {} in {}",
            directive.declaration_id, directive.file_name
        ));
    }

    // Candidate declaration sites: defs of `from` inside those functions.
    let mut candidates: Vec<(ObjectId, Ident, &FuncDecl)> = Vec::new();
    for &func in &functions {
        walk_func_idents(func, &mut |ident| {
            if ident.name == directive.from {
                if let Some(object) = info.defs.get(&ident.id) {
                    candidates.push((*object, ident.clone(), func));
                }
            }
        });
    }
    if candidates.is_empty() {
        return Err(format!(
            "no declaration of {} in {}",
            directive.from, directive.declaration_id
        ));
    }
    if candidates.len() > 1 {
        candidates.retain(|(_, ident, _)| context_matches(file, ident, &directive.context));
        match candidates.len() {
            0 => return Err("context does not match any declaration site".to_string()),
            1 => {}
            _ => {
                return Err(format!(
                    "declaration of {} is ambiguous in {}",
                    directive.from, directive.declaration_id
                ))
            }
        }
    }
    let (object, _, func) = candidates.remove(0);

    // Eligibility: function-local vars/consts, params, named results,
    // receivers. Fields, types, functions, and package-level values are out.
    let obj = info.object(object);
    let eligible_kind = matches!(
        obj.kind,
        ObjectKind::Var | ObjectKind::Const | ObjectKind::Param | ObjectKind::Receiver
    );
    if !eligible_kind {
        return Err(format!(
            "{} is not a function-local variable, parameter, or receiver",
            directive.from
        ));
    }
    let object_scope = info
        .object_scope
        .get(&object)
        .copied()
        .ok_or_else(|| "declaration has no scope".to_string())?;
    if object_scope == info.package_scope {
        return Err(format!("{} is declared at package level", directive.from));
    }

    if claimed_objects.contains(&object) {
        return Err("conflicts with an earlier rename of the same declaration".to_string());
    }

    // Collision checks. The scope chain at the declaration site covers
    // same-scope duplicates and shadowing of enclosing names; the subtree
    // check covers capture by anything declared inside the function. The
    // universe scope is excluded: shadowing a builtin is legal.
    let func_scope = info
        .func_scopes
        .get(&func.name.id)
        .copied()
        .unwrap_or(object_scope);
    let mut chain = Some(object_scope);
    while let Some(scope) = chain {
        let parent = info.scopes[scope].parent;
        if parent.is_some() && info.scope_declares(scope, &directive.to).is_some() {
            return Err(format!(
                "{} is already in scope at the declaration site",
                directive.to
            ));
        }
        chain = parent;
    }
    if info
        .names_under(func_scope)
        .iter()
        .any(|(name, _)| *name == directive.to)
    {
        return Err(format!(
            "{} is declared inside the enclosing function",
            directive.to
        ));
    }
    if introduced.contains(&(func_scope, directive.to.clone())) {
        return Err(format!(
            "an earlier rename already introduces {} in this function",
            directive.to
        ));
    }

    // Every identifier of the object in this file: the declaration plus all
    // uses, closures included.
    let mut edits = Vec::new();
    for decl in &file.ast.decls {
        if let Decl::Func(func) = decl {
            walk_func_idents(func, &mut |ident| {
                let hit = info.defs.get(&ident.id) == Some(&object)
                    || info.uses.get(&ident.id) == Some(&object);
                if hit {
                    edits.push(SourceEdit::new(ident.span, directive.to.clone()));
                }
            });
        }
    }

    Ok(ResolvedDirective {
        object,
        func_scope,
        edits,
    })
}

/// Whether the context block's trailing lines equal the source lines ending
/// at the candidate's declaration line.
fn context_matches(file: &SourceFile, ident: &Ident, context: &str) -> bool {
    if context.is_empty() {
        return false;
    }
    let (decl_line, _) = file.position(ident.span.start);
    let block: Vec<&str> = context.split('\n').collect();
    let first_line = match (decl_line as usize).checked_sub(block.len() - 1) {
        Some(0) | None => return false,
        Some(line) => line as u32,
    };
    block.iter().enumerate().all(|(i, expected)| {
        renamebot_core::text::nth_line(&file.content, first_line + i as u32) == Some(*expected)
    })
}

/// A legal new name: a non-blank, non-keyword Go identifier.
fn validate_identifier(name: &str) -> Result<(), String> {
    if name.is_empty() {
        return Err("new name is empty".to_string());
    }
    if name == "_" {
        return Err("new name is the blank identifier".to_string());
    }
    if Token::is_keyword(name) {
        return Err(format!("new name {name} is a keyword"));
    }
    let mut chars = name.chars();
    let first = chars.next().unwrap_or('0');
    if !(first.is_alphabetic() || first == '_') {
        return Err(format!("new name {name} is not a valid identifier"));
    }
    if !chars.all(|c| c.is_alphanumeric() || c == '_') {
        return Err(format!("new name {name} is not a valid identifier"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::extract;

    fn rename(
        from: &str,
        to: &str,
        declaration_id: &str,
        context: &str,
        file: &str,
    ) -> ProposedRename {
        ProposedRename {
            from: from.to_string(),
            to: to.to_string(),
            declaration_id: declaration_id.to_string(),
            context: context.to_string(),
            file_name: file.to_string(),
        }
    }

    fn apply_to(
        src: &str,
        directives: Vec<ProposedRename>,
    ) -> (GoPackage, RenameOutcome) {
        let mut pkg = GoPackage::from_sources(&[("x.go", src)]);
        let (_, info) = extract(&mut pkg, false).expect("extract");
        let outcome = apply_renames(&mut pkg, &info, directives).expect("apply");
        (pkg, outcome)
    }

    const UNIFY_SRC: &str =
        "package p\n\ntype R struct{}\n\nfunc f() { r := R{}; _ = r }\n\nfunc g() { rr := R{}; _ = rr }\n";

    #[test]
    fn applies_simple_func_var_rename() {
        let (pkg, outcome) = apply_to(
            UNIFY_SRC,
            vec![rename("rr", "r", "g", "func g() { rr := R{}; _ = rr }", "x.go")],
        );
        assert_eq!(outcome.applied.len(), 1);
        assert!(outcome.failed.is_empty());
        let content = &pkg.file("x.go").expect("file").content;
        assert!(content.contains("func g() { r := R{}; _ = r }"));
        assert!(content.contains("func f() { r := R{}; _ = r }"));
    }

    #[test]
    fn unique_candidate_ignores_context() {
        let (pkg, outcome) = apply_to(UNIFY_SRC, vec![rename("rr", "r", "g", "", "x.go")]);
        assert_eq!(outcome.applied.len(), 1);
        assert!(pkg
            .file("x.go")
            .expect("file")
            .content
            .contains("func g() { r := R{}; _ = r }"));
    }

    #[test]
    fn rejects_noop_rename() {
        let (_, outcome) = apply_to(UNIFY_SRC, vec![rename("rr", "rr", "g", "", "x.go")]);
        assert!(outcome.applied.is_empty());
        assert_eq!(outcome.failed.len(), 1);
        assert!(outcome.failed[0].reason.contains("no-op"));
    }

    #[test]
    fn rejects_invalid_and_keyword_names() {
        let (_, outcome) = apply_to(
            UNIFY_SRC,
            vec![
                rename("rr", "1bad", "g", "", "x.go"),
                rename("rr", "type", "g", "", "x.go"),
                rename("rr", "_", "g", "", "x.go"),
            ],
        );
        assert_eq!(outcome.failed.len(), 3);
    }

    #[test]
    fn rejects_unknown_declaration_id() {
        let (_, outcome) = apply_to(UNIFY_SRC, vec![rename("rr", "r", "nosuch", "", "x.go")]);
        assert_eq!(outcome.failed.len(), 1);
        assert!(outcome.failed[0].reason.contains("no function"));
    }

    #[test]
    fn rejects_unknown_file() {
        let (_, outcome) = apply_to(UNIFY_SRC, vec![rename("rr", "r", "g", "", "other.go")]);
        assert!(outcome.failed[0].reason.contains("not part of the package"));
    }

    #[test]
    fn rejects_package_level_and_type_targets() {
        let src = "package p\n\ntype R struct{ F int }\n\nvar V int\n\nfunc f() { _ = V }\n";
        let (_, outcome) = apply_to(
            src,
            vec![
                rename("V", "value", "V", "", "x.go"),
                rename("R", "Rec", "R", "", "x.go"),
            ],
        );
        assert_eq!(outcome.failed.len(), 2);
        for failed in &outcome.failed {
            assert!(failed.reason.contains("no function"), "{}", failed.reason);
        }
    }

    #[test]
    fn rejects_shadowing_collision() {
        let src = "package p\n\nfunc f() {\n\touter := 1\n\tif outer > 0 {\n\t\tinner := 2\n\t\t_ = inner\n\t}\n\t_ = outer\n}\n";
        let (_, outcome) = apply_to(src, vec![rename("inner", "outer", "f", "", "x.go")]);
        assert_eq!(outcome.failed.len(), 1);
        assert!(outcome.failed[0].reason.contains("already in scope"));
    }

    #[test]
    fn rejects_capture_by_nested_declaration() {
        let src = "package p\n\nfunc f() {\n\ta := 1\n\tif a > 0 {\n\t\tb := 2\n\t\t_ = b\n\t}\n\t_ = a\n}\n";
        let (_, outcome) = apply_to(src, vec![rename("a", "b", "f", "", "x.go")]);
        assert_eq!(outcome.failed.len(), 1);
        assert!(outcome.failed[0].reason.contains("inside the enclosing function"));
    }

    #[test]
    fn rejects_collision_with_package_name() {
        let src = "package p\n\nvar counter int\n\nfunc f() {\n\tc := 1\n\t_ = c\n\t_ = counter\n}\n";
        let (_, outcome) = apply_to(src, vec![rename("c", "counter", "f", "", "x.go")]);
        assert_eq!(outcome.failed.len(), 1);
        assert!(outcome.failed[0].reason.contains("already in scope"));
    }

    #[test]
    fn allows_shadowing_builtins() {
        let src = "package p\n\nfunc f() {\n\tm := 1\n\t_ = m\n}\n";
        let (pkg, outcome) = apply_to(src, vec![rename("m", "min", "f", "", "x.go")]);
        assert!(outcome.failed.is_empty(), "{:?}", outcome.failed);
        assert!(pkg.file("x.go").expect("file").content.contains("min := 1"));
    }

    #[test]
    fn context_disambiguates_repeated_declarations() {
        let src = "package p\n\nfunc f() {\n\t{\n\t\tx := 1\n\t\t_ = x\n\t}\n\t{\n\t\tx := 2\n\t\t_ = x\n\t}\n}\n";
        let (pkg, outcome) = apply_to(
            src,
            vec![rename("x", "second", "f", "\t\tx := 2", "x.go")],
        );
        assert!(outcome.failed.is_empty(), "{:?}", outcome.failed);
        let content = &pkg.file("x.go").expect("file").content;
        assert!(content.contains("x := 1"));
        assert!(content.contains("second := 2"));
        assert!(content.contains("_ = second"));
    }

    #[test]
    fn multiline_context_disambiguates_identical_lines() {
        let src = "package p\n\nfunc f() {\n\t{\n\t\t// first\n\t\tx := 1\n\t\t_ = x\n\t}\n\t{\n\t\t// second\n\t\tx := 1\n\t\t_ = x\n\t}\n}\n";
        let (pkg, outcome) = apply_to(
            src,
            vec![rename("x", "y", "f", "\t\t// second\n\t\tx := 1", "x.go")],
        );
        assert!(outcome.failed.is_empty(), "{:?}", outcome.failed);
        let content = &pkg.file("x.go").expect("file").content;
        assert!(content.contains("// first\n\t\tx := 1"));
        assert!(content.contains("// second\n\t\ty := 1"));
    }

    #[test]
    fn ambiguous_without_matching_context_fails() {
        let src = "package p\n\nfunc f() {\n\t{\n\t\tx := 1\n\t\t_ = x\n\t}\n\t{\n\t\tx := 1\n\t\t_ = x\n\t}\n}\n";
        let (_, outcome) = apply_to(src, vec![rename("x", "y", "f", "", "x.go")]);
        assert_eq!(outcome.failed.len(), 1);
    }

    #[test]
    fn renames_receiver_across_method_body_and_closures() {
        let src = "package p\n\ntype R struct{ n int }\n\nfunc (self *R) m() int {\n\tadd := func() int { return self.n }\n\treturn add() + self.n\n}\n";
        let (pkg, outcome) = apply_to(
            src,
            vec![rename("self", "r", "(*R).m", "", "x.go")],
        );
        assert!(outcome.failed.is_empty(), "{:?}", outcome.failed);
        let content = &pkg.file("x.go").expect("file").content;
        assert!(content.contains("func (r *R) m() int {"));
        assert!(content.contains("return r.n }"));
        assert!(content.contains("return add() + r.n"));
        assert!(!content.contains("self"));
    }

    #[test]
    fn renames_named_result() {
        let src = "package p\n\nfunc f() (res int, err error) {\n\tres = 1\n\treturn res, err\n}\n";
        let (pkg, outcome) = apply_to(src, vec![rename("res", "n", "f", "", "x.go")]);
        assert!(outcome.failed.is_empty(), "{:?}", outcome.failed);
        let content = &pkg.file("x.go").expect("file").content;
        assert!(content.contains("func f() (n int, err error)"));
        assert!(content.contains("return n, err"));
    }

    #[test]
    fn conflicting_directives_fail_after_the_first() {
        let (pkg, outcome) = apply_to(
            "package p\n\nfunc f() {\n\ta := 1\n\tb := 2\n\t_, _ = a, b\n}\n",
            vec![
                rename("a", "x", "f", "", "x.go"),
                rename("a", "y", "f", "", "x.go"),
                rename("b", "x", "f", "", "x.go"),
            ],
        );
        assert_eq!(outcome.applied.len(), 1);
        assert_eq!(outcome.failed.len(), 2);
        let content = &pkg.file("x.go").expect("file").content;
        assert!(content.contains("x := 1"));
        assert!(content.contains("b := 2"));
    }

    #[test]
    fn failed_directives_leave_files_untouched() {
        let (pkg, outcome) = apply_to(UNIFY_SRC, vec![rename("zz", "r", "g", "", "x.go")]);
        assert!(outcome.applied.is_empty());
        assert_eq!(pkg.file("x.go").expect("file").content, UNIFY_SRC);
    }

    #[test]
    fn writes_back_to_disk_when_loaded_from_directory() {
        use std::fs;
        let dir = tempfile::TempDir::new().expect("tempdir");
        fs::write(dir.path().join("x.go"), UNIFY_SRC).expect("write");
        let (mut pkg, _) = renamebot_gosyn::load(dir.path()).expect("load");
        let (_, info) = extract(&mut pkg, false).expect("extract");
        let outcome = apply_renames(
            &mut pkg,
            &info,
            vec![rename("rr", "r", "g", "", "x.go")],
        )
        .expect("apply");
        assert_eq!(outcome.applied.len(), 1);
        let on_disk = fs::read_to_string(dir.path().join("x.go")).expect("read");
        assert!(on_disk.contains("func g() { r := R{}; _ = r }"));
    }
}

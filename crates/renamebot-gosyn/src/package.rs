//! Package model: source files, loading, and the test/non-test split.
//!
//! A [`GoPackage`] is one unit of analysis: the ordered `.go` files of a
//! single directory that share a package clause. Files named `*_test.go`
//! carry the `is_test` flag. Files whose package clause ends in `_test`
//! form the sibling **external test package**, returned as a separate handle
//! by [`load`].

use std::fs;
use std::path::{Path, PathBuf};

use renamebot_core::text;
use thiserror::Error;

use crate::ast::{File, FuncDecl};
use crate::parser::{parse_file, NodeIdGen, ParseError};

/// One source file of a package.
#[derive(Debug, Clone)]
pub struct SourceFile {
    /// Base filename (no directory).
    pub name: String,
    /// Whether the filename matches `*_test.go`.
    pub is_test: bool,
    /// Raw file contents.
    pub content: String,
    /// The parsed tree, refreshed by [`GoPackage::reparse`].
    pub ast: File,
}

impl SourceFile {
    /// 1-indexed line and column of a byte offset in this file.
    pub fn position(&self, offset: usize) -> (u32, u32) {
        text::offset_to_position(&self.content, offset)
    }

    /// The full source line containing a byte offset, without the newline.
    pub fn line_at(&self, offset: usize) -> &str {
        text::line_at_offset(&self.content, offset)
    }
}

/// A parsed package.
#[derive(Debug, Clone)]
pub struct GoPackage {
    /// Directory the package was loaded from.
    pub dir: PathBuf,
    /// Best-effort import path (from an enclosing `go.mod`, else the
    /// directory name).
    pub import_path: String,
    /// The package clause name shared by all files.
    pub name: String,
    /// Whether this is the sibling external test package (`<name>_test`).
    pub is_external_test: bool,
    /// Ordered source files.
    pub files: Vec<SourceFile>,
}

/// Failure modes of package loading.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("io error reading {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("parse error in {file}: {source}")]
    Parse { file: String, source: ParseError },

    #[error("no go source files in {dir}")]
    NoGoFiles { dir: PathBuf },
}

impl From<LoadError> for renamebot_core::RenamebotError {
    fn from(err: LoadError) -> Self {
        use renamebot_core::RenamebotError;
        match err {
            LoadError::Io { source, .. } => RenamebotError::Io(source),
            LoadError::Parse { file, source } => RenamebotError::Parse {
                file,
                message: source.to_string(),
            },
            LoadError::NoGoFiles { dir } => RenamebotError::Invariant {
                message: format!("no go source files in {}", dir.display()),
            },
        }
    }
}

/// Load the package in `dir`.
///
/// Returns the primary package and, when files with a `<name>_test` package
/// clause are present, the external test package as a second handle. Files
/// are ordered by name so analysis is deterministic.
pub fn load(dir: &Path) -> Result<(GoPackage, Option<GoPackage>), LoadError> {
    let mut paths: Vec<PathBuf> = fs::read_dir(dir)
        .map_err(|source| LoadError::Io {
            path: dir.to_path_buf(),
            source,
        })?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| {
            path.is_file()
                && path.extension().is_some_and(|ext| ext == "go")
                && !path
                    .file_name()
                    .is_some_and(|n| n.to_string_lossy().starts_with('.'))
        })
        .collect();
    paths.sort();

    if paths.is_empty() {
        return Err(LoadError::NoGoFiles {
            dir: dir.to_path_buf(),
        });
    }

    let import_path = module_import_path(dir);
    let mut ids = NodeIdGen::new();
    let mut primary_files = Vec::new();
    let mut external_files = Vec::new();
    let mut primary_name = String::new();
    let mut external_name = String::new();

    for path in paths {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let content = fs::read_to_string(&path).map_err(|source| LoadError::Io {
            path: path.clone(),
            source,
        })?;
        let ast = parse_file(&content, &mut ids).map_err(|source| LoadError::Parse {
            file: name.clone(),
            source,
        })?;
        let is_test = name.ends_with("_test.go");
        let package_name = ast.package.name.clone();
        let file = SourceFile {
            name,
            is_test,
            content,
            ast,
        };
        if package_name.ends_with("_test") {
            external_name = package_name;
            external_files.push(file);
        } else {
            primary_name = package_name;
            primary_files.push(file);
        }
    }

    let primary = GoPackage {
        dir: dir.to_path_buf(),
        import_path: import_path.clone(),
        name: primary_name,
        is_external_test: false,
        files: primary_files,
    };
    let external = if external_files.is_empty() {
        None
    } else {
        Some(GoPackage {
            dir: dir.to_path_buf(),
            import_path,
            name: external_name,
            is_external_test: true,
            files: external_files,
        })
    };
    Ok((primary, external))
}

/// Derive an import path from the nearest enclosing `go.mod`, falling back to
/// the directory name.
fn module_import_path(dir: &Path) -> String {
    let mut current = Some(dir.to_path_buf());
    while let Some(candidate) = current {
        let gomod = candidate.join("go.mod");
        if let Ok(content) = fs::read_to_string(&gomod) {
            for line in content.lines() {
                if let Some(module) = line.trim().strip_prefix("module ") {
                    let module = module.trim().trim_matches('"');
                    let rel = dir.strip_prefix(&candidate).unwrap_or(Path::new(""));
                    return if rel.as_os_str().is_empty() {
                        module.to_string()
                    } else {
                        format!("{module}/{}", rel.to_string_lossy().replace('\\', "/"))
                    };
                }
            }
        }
        current = candidate.parent().map(Path::to_path_buf);
    }
    dir.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "main".to_string())
}

impl GoPackage {
    /// Build a package directly from named sources. Used by tests and tools
    /// that do not go through the filesystem.
    pub fn from_sources(sources: &[(&str, &str)]) -> GoPackage {
        let mut ids = NodeIdGen::new();
        let mut files = Vec::new();
        let mut name = String::new();
        let mut is_external_test = true;
        for (file_name, content) in sources {
            let ast = parse_file(content, &mut ids)
                .unwrap_or_else(|e| panic!("fixture {file_name} failed to parse: {e}"));
            name = ast.package.name.clone();
            is_external_test = is_external_test && name.ends_with("_test");
            files.push(SourceFile {
                name: (*file_name).to_string(),
                is_test: file_name.ends_with("_test.go"),
                content: (*content).to_string(),
                ast,
            });
        }
        GoPackage {
            dir: PathBuf::new(),
            import_path: "example.com/fixture".to_string(),
            name,
            is_external_test,
            files,
        }
    }

    /// Re-parse every file from its current content, replacing the syntax
    /// trees and renumbering identifier nodes package-wide.
    pub fn reparse(&mut self) -> Result<(), (String, ParseError)> {
        let mut ids = NodeIdGen::new();
        for file in &mut self.files {
            file.ast =
                parse_file(&file.content, &mut ids).map_err(|e| (file.name.clone(), e))?;
        }
        Ok(())
    }

    /// Look a file up by base name.
    pub fn file(&self, name: &str) -> Option<&SourceFile> {
        self.files.iter().find(|file| file.name == name)
    }

    pub fn file_mut(&mut self, name: &str) -> Option<&mut SourceFile> {
        self.files.iter_mut().find(|file| file.name == name)
    }
}

/// The stable declaration-id of a function or method.
///
/// Methods encode receiver pointer-ness (`(*T).m` vs `T.m`). Blank-named
/// functions get a positional id (`_:<file>:<line>:<col>`) so their bodies
/// still carry a stable handle; `init` functions do too, since a package may
/// declare several.
pub fn declaration_id(func: &FuncDecl, file: &SourceFile) -> String {
    if let Some(recv) = &func.recv {
        let base = &recv.type_name.name;
        return if recv.pointer {
            format!("(*{base}).{}", func.name.name)
        } else {
            format!("{base}.{}", func.name.name)
        };
    }
    if func.name.name == "_" || func.name.name == "init" || func.name.name.is_empty() {
        let (line, col) = file.position(func.name.span.start);
        let spelling = if func.name.name.is_empty() {
            "_"
        } else {
            &func.name.name
        };
        return format!("{spelling}:{}:{line}:{col}", file.name);
    }
    func.name.name.clone()
}

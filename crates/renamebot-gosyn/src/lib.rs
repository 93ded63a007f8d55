//! Go-subset frontend for renamebot.
//!
//! The crate covers the path from raw source to resolution facts:
//! scanner -> parser -> AST, then a lightweight checker that produces the
//! def/use/object/scope maps the engine consumes. [`package`] holds the
//! package model, file loading, and declaration-id synthesis.

pub mod ast;
pub mod check;
pub mod package;
pub mod parser;
pub mod scanner;
pub mod token;
pub mod types;

pub use check::{resolve, CheckError, Object, ObjectId, ObjectKind, ScopeId, TypeInfo};
pub use package::{declaration_id, load, GoPackage, LoadError, SourceFile};
pub use parser::{parse_file, NodeIdGen, ParseError};
pub use types::Type;

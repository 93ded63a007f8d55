//! Core infrastructure for renamebot.
//!
//! This crate holds the pieces every other layer leans on:
//! - `error`: the unified error type subsystem errors bridge into
//! - `text`: byte offset and line:column conversions, line extraction
//! - `patch`: span-based batch edits applied end-to-start

pub mod error;
pub mod patch;
pub mod text;

pub use error::RenamebotError;
pub use patch::{apply_edits, EditError, SourceEdit, Span};

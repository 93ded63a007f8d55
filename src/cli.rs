//! Command-line surface.
//!
//! Two subcommands:
//! - `summary`: local-only; print the per-type naming summary of a package
//! - `rename`: run the engine against an OpenAI-compatible provider
//!
//! `--recursive` walks subdirectories and treats every directory containing
//! `.go` files as its own package.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;
use walkdir::WalkDir;

use renamebot_core::RenamebotError;
use renamebot_gosyn::load;

use crate::engine::{rename_for_consistency, RenameOptions};
use crate::extract::extract;
use crate::llm::Conversationalist;
use crate::provider::ChatCompletionsProvider;
use crate::summary::PackageSummary;

#[derive(Debug, Parser)]
#[command(
    name = "renamebot",
    about = "Unify identifier naming across a Go package with LLM-proposed renames",
    version
)]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Print the per-type naming summary for a package directory.
    Summary {
        /// Package directory.
        path: PathBuf,
        /// Summarize test files instead of source files.
        #[arg(long)]
        tests: bool,
        /// Drop types whose naming is already unified.
        #[arg(long)]
        prune: bool,
    },
    /// Propose and apply consistency renames for a package directory.
    Rename {
        /// Package directory.
        path: PathBuf,
        /// Model id (default: the provider's default model).
        #[arg(long)]
        model: Option<String>,
        /// Also process packages in subdirectories.
        #[arg(long)]
        recursive: bool,
    },
}

/// Install the tracing subscriber. `RUST_LOG` overrides the default level.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

/// Run the parsed command; the error carries the exit code.
pub async fn run(cli: Cli) -> Result<(), RenamebotError> {
    match cli.command {
        Command::Summary { path, tests, prune } => run_summary(&path, tests, prune),
        Command::Rename {
            path,
            model,
            recursive,
        } => run_rename(&path, model, recursive).await,
    }
}

fn run_summary(path: &Path, tests: bool, prune: bool) -> Result<(), RenamebotError> {
    let (primary, external) = load(path)?;
    let mut pkg = if tests && primary.files.is_empty() {
        external.ok_or_else(|| RenamebotError::invariant("package has no test files"))?
    } else {
        primary
    };
    let (records, _) = extract(&mut pkg, tests)?;
    let mut summary = PackageSummary::build(&records);
    if prune {
        summary.reject_unified();
    }
    print!("{summary}");
    Ok(())
}

async fn run_rename(
    path: &Path,
    model: Option<String>,
    recursive: bool,
) -> Result<(), RenamebotError> {
    let provider: Arc<dyn Conversationalist> = Arc::new(ChatCompletionsProvider::from_env());
    let cancel = CancellationToken::new();
    let ctrl_c_cancel = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            ctrl_c_cancel.cancel();
        }
    });

    for dir in package_dirs(path, recursive)? {
        let (mut pkg, external) = load(&dir)?;
        let mut options = RenameOptions::new(Arc::clone(&provider));
        options.model = model.clone().unwrap_or_default();
        options.cancel = cancel.clone();

        if !pkg.files.is_empty() {
            let report = rename_for_consistency(&mut pkg, &options).await?;
            info!(package = %pkg.import_path, "package done");
            print!("{report}");
        }
        if let Some(mut external_pkg) = external {
            let report = rename_for_consistency(&mut external_pkg, &options).await?;
            info!(package = %external_pkg.import_path, "external test package done");
            print!("{report}");
        }
        if cancel.is_cancelled() {
            error!("cancelled");
            break;
        }
    }
    Ok(())
}

/// The directories to process: the path itself, or every directory under it
/// containing `.go` files when `recursive` is set.
fn package_dirs(path: &Path, recursive: bool) -> Result<Vec<PathBuf>, RenamebotError> {
    if !recursive {
        return Ok(vec![path.to_path_buf()]);
    }
    let mut dirs = BTreeSet::new();
    for entry in WalkDir::new(path).into_iter().filter_map(|e| e.ok()) {
        if entry.file_type().is_file()
            && entry.path().extension().is_some_and(|ext| ext == "go")
        {
            if let Some(parent) = entry.path().parent() {
                dirs.insert(parent.to_path_buf());
            }
        }
    }
    Ok(dirs.into_iter().collect())
}

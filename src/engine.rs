//! The two-pass driver.
//!
//! [`rename_for_consistency`] runs the whole flow for one package: extract
//! typed identifiers, build and prune the naming summary, fan out rename
//! proposals, and apply the surviving directives. Non-test files go first,
//! then test files with a summary rebuilt from scratch; an external test
//! package only gets the test pass.
//!
//! Renames are applied atomically per pass. The second pass re-resolves the
//! package from the rewritten contents, so its records reference the trees
//! the first pass produced.

use std::fmt;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use renamebot_core::RenamebotError;
use renamebot_gosyn::GoPackage;

use crate::extract::extract;
use crate::llm::{Conversationalist, DEFAULT_MODEL};
use crate::propose::{propose_renames, ProposedRename};
use crate::renamer::{apply_renames, FailedRename};
use crate::summary::PackageSummary;

/// Embedded system prompt for the rename conversations.
pub const SYSTEM_PROMPT: &str = include_str!("prompts/consistency_system.md");

/// Options for [`rename_for_consistency`].
pub struct RenameOptions {
    /// Model id; empty selects [`DEFAULT_MODEL`].
    pub model: String,
    /// Conversation factory.
    pub conversationalist: Arc<dyn Conversationalist>,
    /// Cancellation signal, propagated into every conversation send.
    pub cancel: CancellationToken,
}

impl RenameOptions {
    pub fn new(conversationalist: Arc<dyn Conversationalist>) -> Self {
        RenameOptions {
            model: String::new(),
            conversationalist,
            cancel: CancellationToken::new(),
        }
    }

    fn model_id(&self) -> &str {
        if self.model.is_empty() {
            DEFAULT_MODEL
        } else {
            &self.model
        }
    }
}

/// Outcome of one pass.
#[derive(Debug, Default)]
pub struct PassReport {
    /// Whether this was the test-file pass.
    pub tests: bool,
    /// Directives the proposer returned.
    pub proposed: usize,
    pub applied: Vec<ProposedRename>,
    pub failed: Vec<FailedRename>,
}

/// Outcome of a full run over one package.
#[derive(Debug, Default)]
pub struct ConsistencyReport {
    pub passes: Vec<PassReport>,
}

impl ConsistencyReport {
    pub fn total_applied(&self) -> usize {
        self.passes.iter().map(|pass| pass.applied.len()).sum()
    }

    pub fn total_failed(&self) -> usize {
        self.passes.iter().map(|pass| pass.failed.len()).sum()
    }
}

impl fmt::Display for ConsistencyReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "{} renames applied, {} failed",
            self.total_applied(),
            self.total_failed()
        )?;
        for pass in &self.passes {
            let label = if pass.tests { "test files" } else { "source files" };
            for applied in &pass.applied {
                writeln!(
                    f,
                    "  ok   {} -> {} in {} ({}, {label})",
                    applied.from, applied.to, applied.declaration_id, applied.file_name
                )?;
            }
            for failed in &pass.failed {
                writeln!(
                    f,
                    "  fail {} -> {} in {} ({}, {label}): {}",
                    failed.rename.from,
                    failed.rename.to,
                    failed.rename.declaration_id,
                    failed.rename.file_name,
                    failed.reason
                )?;
            }
        }
        Ok(())
    }
}

/// Run the rename engine over one package.
pub async fn rename_for_consistency(
    pkg: &mut GoPackage,
    options: &RenameOptions,
) -> Result<ConsistencyReport, RenamebotError> {
    let mut report = ConsistencyReport::default();
    let passes: &[bool] = if pkg.is_external_test {
        &[true]
    } else {
        &[false, true]
    };
    for &only_tests in passes {
        report.passes.push(run_pass(pkg, options, only_tests).await?);
    }
    Ok(report)
}

async fn run_pass(
    pkg: &mut GoPackage,
    options: &RenameOptions,
    only_tests: bool,
) -> Result<PassReport, RenamebotError> {
    let (records, info) = extract(pkg, only_tests)?;
    let mut summary = PackageSummary::build(&records);
    summary.reject_unified();
    info!(
        package = %pkg.import_path,
        tests = only_tests,
        identifiers = records.len(),
        types_in_question = summary.root_types().count(),
        "pass started"
    );

    let proposals = propose_renames(
        pkg,
        only_tests,
        &summary,
        Arc::clone(&options.conversationalist),
        options.model_id(),
        SYSTEM_PROMPT,
        &options.cancel,
    )
    .await?;

    let proposed = proposals.len();
    let outcome = apply_renames(pkg, &info, proposals)?;
    for failed in &outcome.failed {
        warn!(
            from = %failed.rename.from,
            to = %failed.rename.to,
            declaration = %failed.rename.declaration_id,
            file = %failed.rename.file_name,
            reason = %failed.reason,
            "rename rejected"
        );
    }
    info!(
        tests = only_tests,
        proposed,
        applied = outcome.applied.len(),
        failed = outcome.failed.len(),
        "pass finished"
    );

    Ok(PassReport {
        tests: only_tests,
        proposed,
        applied: outcome.applied,
        failed: outcome.failed,
    })
}

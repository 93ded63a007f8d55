//! Per-file LLM input: the file body plus the package-wide naming summary
//! restricted to the root types that file actually uses.

use renamebot_gosyn::SourceFile;

use crate::summary::PackageSummary;

/// Compose the prompt context for one file.
///
/// The caller is responsible for having pruned the summary with
/// [`PackageSummary::reject_unified`] first.
pub fn build_file_context(file: &SourceFile, summary: &PackageSummary) -> String {
    let relevant = summary.relevant_for_file(&file.name);
    format!(
        "// File: {}\n\n{}\n\n-----\n\n## Naming conventions of select identifiers across the entire package (not just this file):\n{}",
        file.name, file.content, relevant
    )
}

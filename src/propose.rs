//! Rename proposal fan-out.
//!
//! One conversation per non-empty file of the pass, at most
//! [`MAX_CONCURRENT_REQUESTS`] in flight. Each task sends the file context
//! as a single user message and parses the reply as a strict JSON array of
//! rename directives. The reply is untrusted input: it is trimmed, parsed,
//! and validated for field presence, with no recovery heuristics.
//!
//! Tasks have no relative ordering and the aggregated list is unsorted. A
//! failed task fails the pass, but only after every task has drained; a
//! cancelled send surfaces as a cancellation error the same way.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use renamebot_core::RenamebotError;
use renamebot_gosyn::GoPackage;

use crate::context::build_file_context;
use crate::llm::{Conversationalist, LlmError};
use crate::summary::PackageSummary;

/// Concurrency bound for in-flight provider requests.
pub const MAX_CONCURRENT_REQUESTS: usize = 5;

/// One rename directive from the model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProposedRename {
    pub from: String,
    pub to: String,
    /// Declaration-id of the function whose scope holds `from`.
    #[serde(rename = "func_id")]
    pub declaration_id: String,
    /// The source line at the declaration site; preceding lines joined by
    /// newlines when one line is ambiguous.
    #[serde(default)]
    pub context: String,
    /// Base filename; filled with the prompted file when the model omits it.
    #[serde(default, rename = "file")]
    pub file_name: String,
}

/// Failure modes of a proposal pass.
#[derive(Debug, Error)]
pub enum ProposeError {
    /// The reply failed to parse as the expected JSON array, or an object
    /// lacks required fields.
    #[error("protocol error for {file}: {message}")]
    Protocol { file: String, message: String },

    /// The conversation failed (retries already exhausted provider-side).
    #[error("llm failure for {file}: {source}")]
    Llm { file: String, source: LlmError },

    /// A proposal task panicked.
    #[error("proposal task failed to run")]
    Join,
}

impl From<ProposeError> for RenamebotError {
    fn from(err: ProposeError) -> Self {
        match err {
            ProposeError::Protocol { file, message } => RenamebotError::Protocol { file, message },
            ProposeError::Llm { file, source } => RenamebotError::Llm {
                message: format!("{file}: {source}"),
                retryable: source.is_retryable(),
            },
            ProposeError::Join => RenamebotError::internal("proposal task failed to run"),
        }
    }
}

/// Fan requests out over the files of the current pass and aggregate the
/// parsed directives.
///
/// The caller passes the already-pruned summary. Files whose `is_test` flag
/// does not match `only_tests`, and files with no content, are skipped.
pub async fn propose_renames(
    pkg: &GoPackage,
    only_tests: bool,
    summary: &PackageSummary,
    conversationalist: Arc<dyn Conversationalist>,
    model: &str,
    system_prompt: &str,
    cancel: &CancellationToken,
) -> Result<Vec<ProposedRename>, ProposeError> {
    let contexts: Vec<(String, String)> = pkg
        .files
        .iter()
        .filter(|file| file.is_test == only_tests && !file.content.trim().is_empty())
        .map(|file| (file.name.clone(), build_file_context(file, summary)))
        .collect();

    let semaphore = Arc::new(Semaphore::new(MAX_CONCURRENT_REQUESTS));
    let mut tasks: JoinSet<Result<Vec<ProposedRename>, ProposeError>> = JoinSet::new();

    for (file_name, context) in contexts {
        let semaphore = Arc::clone(&semaphore);
        let conversationalist = Arc::clone(&conversationalist);
        let model = model.to_string();
        let system_prompt = system_prompt.to_string();
        let cancel = cancel.clone();
        tasks.spawn(async move {
            let _permit = semaphore
                .acquire_owned()
                .await
                .map_err(|_| ProposeError::Join)?;
            let mut conversation = conversationalist.new_conversation(&model, &system_prompt);
            conversation.add_user_message(&context);
            let reply = tokio::select! {
                _ = cancel.cancelled() => Err(LlmError::Cancelled),
                reply = conversation.send() => reply,
            }
            .map_err(|source| ProposeError::Llm {
                file: file_name.clone(),
                source,
            })?;
            let renames = parse_reply(&reply, &file_name)?;
            debug!(file = %file_name, count = renames.len(), "parsed rename proposals");
            Ok(renames)
        });
    }

    // Every task drains before the first error is reported, so no in-flight
    // conversation outlives the pass.
    let mut all = Vec::new();
    let mut first_error = None;
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok(Ok(renames)) => all.extend(renames),
            Ok(Err(err)) => {
                let _ = first_error.get_or_insert(err);
            }
            Err(_) => {
                let _ = first_error.get_or_insert(ProposeError::Join);
            }
        }
    }
    match first_error {
        Some(err) => Err(err),
        None => Ok(all),
    }
}

/// Parse one assistant reply. Whitespace around the array is tolerated; an
/// empty reply or empty array yields no renames.
fn parse_reply(reply: &str, file_name: &str) -> Result<Vec<ProposedRename>, ProposeError> {
    let trimmed = reply.trim();
    if trimmed.is_empty() {
        return Ok(Vec::new());
    }
    let mut renames: Vec<ProposedRename> =
        serde_json::from_str(trimmed).map_err(|err| ProposeError::Protocol {
            file: file_name.to_string(),
            message: format!("reply is not a rename array: {err}"),
        })?;
    for rename in &mut renames {
        if rename.from.is_empty() || rename.to.is_empty() || rename.declaration_id.is_empty() {
            return Err(ProposeError::Protocol {
                file: file_name.to_string(),
                message: "rename object is missing from/to/func_id".to_string(),
            });
        }
        if rename.file_name.is_empty() {
            rename.file_name = file_name.to_string();
        }
    }
    Ok(renames)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::extract;
    use crate::test_helpers::ScriptedConversationalist;

    fn fixture() -> (GoPackage, PackageSummary) {
        let mut pkg = GoPackage::from_sources(&[(
            "x.go",
            "package p\n\ntype R struct{}\n\nfunc f() { r := R{}; _ = r }\n\nfunc g() { rr := R{}; _ = rr }\n",
        )]);
        let (records, _) = extract(&mut pkg, false).expect("extract");
        let mut summary = PackageSummary::build(&records);
        summary.reject_unified();
        (pkg, summary)
    }

    #[tokio::test]
    async fn aggregates_parsed_directives() {
        let (pkg, summary) = fixture();
        let script = ScriptedConversationalist::new();
        script.set_reply(
            "x.go",
            r#"[{"from":"rr","to":"r","func_id":"g","context":"\trr := R{}"}]"#,
        );
        let renames = propose_renames(
            &pkg,
            false,
            &summary,
            Arc::new(script),
            "test-model",
            "system",
            &CancellationToken::new(),
        )
        .await
        .expect("propose");
        assert_eq!(renames.len(), 1);
        assert_eq!(renames[0].from, "rr");
        assert_eq!(renames[0].to, "r");
        assert_eq!(renames[0].declaration_id, "g");
        assert_eq!(renames[0].file_name, "x.go", "missing file is filled in");
    }

    #[tokio::test]
    async fn empty_reply_and_empty_array_yield_nothing() {
        let (pkg, summary) = fixture();
        let script = ScriptedConversationalist::new();
        script.set_reply("x.go", "  \n ");
        let renames = propose_renames(
            &pkg,
            false,
            &summary,
            Arc::new(script),
            "m",
            "s",
            &CancellationToken::new(),
        )
        .await
        .expect("propose");
        assert!(renames.is_empty());

        let script = ScriptedConversationalist::new();
        script.set_reply("x.go", " [] ");
        let renames = propose_renames(
            &pkg,
            false,
            &summary,
            Arc::new(script),
            "m",
            "s",
            &CancellationToken::new(),
        )
        .await
        .expect("propose");
        assert!(renames.is_empty());
    }

    #[tokio::test]
    async fn malformed_reply_is_a_protocol_error() {
        let (pkg, summary) = fixture();
        let script = ScriptedConversationalist::new();
        script.set_reply("x.go", "I think you should rename rr to r.");
        let err = propose_renames(
            &pkg,
            false,
            &summary,
            Arc::new(script),
            "m",
            "s",
            &CancellationToken::new(),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ProposeError::Protocol { .. }));
    }

    #[tokio::test]
    async fn missing_required_field_is_a_protocol_error() {
        let (pkg, summary) = fixture();
        let script = ScriptedConversationalist::new();
        script.set_reply("x.go", r#"[{"from":"rr","to":"","func_id":"g"}]"#);
        let err = propose_renames(
            &pkg,
            false,
            &summary,
            Arc::new(script),
            "m",
            "s",
            &CancellationToken::new(),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ProposeError::Protocol { .. }));
    }

    #[tokio::test]
    async fn fatal_task_error_fails_the_pass() {
        let (pkg, summary) = fixture();
        let script = ScriptedConversationalist::new();
        script.fail_with("x.go", LlmError::Fatal("bad auth".to_string()));
        let err = propose_renames(
            &pkg,
            false,
            &summary,
            Arc::new(script),
            "m",
            "s",
            &CancellationToken::new(),
        )
        .await
        .unwrap_err();
        match err {
            ProposeError::Llm { file, source } => {
                assert_eq!(file, "x.go");
                assert!(!source.is_retryable());
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn cancellation_surfaces_as_llm_cancelled() {
        let (pkg, summary) = fixture();
        let script = ScriptedConversationalist::new();
        script.stall("x.go");
        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = propose_renames(
            &pkg,
            false,
            &summary,
            Arc::new(script),
            "m",
            "s",
            &cancel,
        )
        .await
        .unwrap_err();
        assert!(matches!(
            err,
            ProposeError::Llm {
                source: LlmError::Cancelled,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn concurrency_never_exceeds_the_bound() {
        let sources: Vec<(String, String)> = (0..12)
            .map(|i| {
                (
                    format!("f{i}.go"),
                    format!("package p\n\nfunc fn{i}() {{ x{i} := 1; _ = x{i} }}\n"),
                )
            })
            .collect();
        let refs: Vec<(&str, &str)> = sources
            .iter()
            .map(|(n, c)| (n.as_str(), c.as_str()))
            .collect();
        let mut pkg = GoPackage::from_sources(&refs);
        let (records, _) = extract(&mut pkg, false).expect("extract");
        let summary = PackageSummary::build(&records);

        let script = ScriptedConversationalist::new();
        let peak = script.peak_handle();
        let renames = propose_renames(
            &pkg,
            false,
            &summary,
            Arc::new(script),
            "m",
            "s",
            &CancellationToken::new(),
        )
        .await
        .expect("propose");
        assert!(renames.is_empty(), "default scripted reply is []");
        let peak = peak.load(std::sync::atomic::Ordering::SeqCst);
        assert!(peak >= 1);
        assert!(
            peak <= MAX_CONCURRENT_REQUESTS,
            "peak concurrency {peak} exceeded the bound"
        );
    }

    #[test]
    fn wire_field_names_match_protocol() {
        let rename = ProposedRename {
            from: "a".to_string(),
            to: "b".to_string(),
            declaration_id: "f".to_string(),
            context: "\ta := 1".to_string(),
            file_name: "x.go".to_string(),
        };
        let json = serde_json::to_value(&rename).expect("serialize");
        assert_eq!(json["func_id"], "f");
        assert_eq!(json["file"], "x.go");
        assert_eq!(json["from"], "a");
    }
}

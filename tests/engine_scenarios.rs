//! End-to-end engine scenarios over on-disk packages.
//!
//! Each test writes a package into a temp directory, drives the full
//! extract -> summarize -> propose -> apply flow with a scripted
//! conversationalist, and checks the rewritten files on disk.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::sync::Arc;

use tempfile::TempDir;

use renamebot::engine::{rename_for_consistency, RenameOptions};
use renamebot::llm::LlmError;
use renamebot::test_helpers::ScriptedConversationalist;
use renamebot_gosyn::load;

fn write_package(files: &[(&str, &str)]) -> TempDir {
    let dir = TempDir::new().expect("tempdir");
    for (name, content) in files {
        fs::write(dir.path().join(name), content).expect("write fixture");
    }
    dir
}

fn disk_state(dir: &Path) -> BTreeMap<String, String> {
    fs::read_dir(dir)
        .expect("read dir")
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.path().extension().is_some_and(|ext| ext == "go"))
        .map(|entry| {
            let name = entry.file_name().to_string_lossy().into_owned();
            let content = fs::read_to_string(entry.path()).expect("read file");
            (name, content)
        })
        .collect()
}

async fn run_engine(dir: &Path, script: ScriptedConversationalist) {
    let (mut pkg, _) = load(dir).expect("load package");
    let options = RenameOptions::new(Arc::new(script));
    rename_for_consistency(&mut pkg, &options)
        .await
        .expect("engine run");
}

#[tokio::test]
async fn scenario_unify_function_variable() {
    let dir = write_package(&[(
        "x.go",
        "package demo\n\ntype R struct{}\n\nfunc f() {\n\tr := R{}\n\t_ = r\n}\n\nfunc g() {\n\trr := R{}\n\t_ = rr\n}\n",
    )]);

    let script = ScriptedConversationalist::new();
    script.set_reply(
        "x.go",
        r#"[{"from":"rr","to":"r","func_id":"g","context":"\trr := R{}"}]"#,
    );
    run_engine(dir.path(), script).await;

    let state = disk_state(dir.path());
    let rewritten = state.get("x.go").expect("x.go on disk");
    assert!(rewritten.contains("func g() {\n\tr := R{}\n\t_ = r\n}"));
    assert!(rewritten.contains("func f() {\n\tr := R{}\n\t_ = r\n}"));
    assert!(!rewritten.contains("rr"));
}

#[tokio::test]
async fn scenario_prompt_contains_divergent_type_summary() {
    let dir = write_package(&[(
        "x.go",
        "package demo\n\ntype R struct{}\n\nfunc f() {\n\tr := R{}\n\t_ = r\n}\n\nfunc g() {\n\trr := R{}\n\t_ = rr\n}\n",
    )]);

    let script = ScriptedConversationalist::new();
    let sent = script.sent_handle();
    run_engine(dir.path(), script).await;

    let sent = sent.lock().expect("sent lock");
    let prompt = sent
        .iter()
        .find(|msg| msg.starts_with("// File: x.go"))
        .expect("x.go prompted");
    assert!(prompt.contains("R:\n  func vars:\n    r: 1 (R)\n    rr: 1 (R)\n"));
}

#[tokio::test]
async fn scenario_unified_type_is_absent_from_prompt_but_renamer_still_applies() {
    // Both functions already use `r`: reject_unified prunes R from every
    // prompt. The renamer stays content-blind to that filtering and applies
    // a directive the model returns anyway.
    let dir = write_package(&[(
        "x.go",
        "package demo\n\ntype R struct{}\n\nfunc f() {\n\tr := R{}\n\t_ = r\n}\n\nfunc g() {\n\tr := R{}\n\t_ = r\n}\n",
    )]);

    let script = ScriptedConversationalist::new();
    let sent = script.sent_handle();
    script.set_reply(
        "x.go",
        r#"[{"from":"r","to":"radius","func_id":"g","context":"\tr := R{}"}]"#,
    );
    run_engine(dir.path(), script).await;

    {
        let sent = sent.lock().expect("sent lock");
        let prompt = sent
            .iter()
            .find(|msg| msg.starts_with("// File: x.go"))
            .expect("x.go prompted");
        assert!(
            !prompt.contains("R:"),
            "unified type must not appear in the prompt"
        );
    }

    let state = disk_state(dir.path());
    let rewritten = state.get("x.go").expect("x.go on disk");
    assert!(rewritten.contains("func g() {\n\tradius := R{}\n\t_ = radius\n}"));
    assert!(rewritten.contains("func f() {\n\tr := R{}\n\t_ = r\n}"));
}

#[tokio::test]
async fn scenario_divergent_receivers_stay_in_prompt() {
    // Function-vars and params for R are empty; receivers diverge, so R
    // survives pruning and reaches the prompt.
    let dir = write_package(&[(
        "x.go",
        "package demo\n\ntype R struct{}\n\nfunc (m *R) a() {\n\t_ = m\n}\n\nfunc (rr *R) b() {\n\t_ = rr\n}\n",
    )]);

    let script = ScriptedConversationalist::new();
    let sent = script.sent_handle();
    run_engine(dir.path(), script).await;

    let sent = sent.lock().expect("sent lock");
    let prompt = sent
        .iter()
        .find(|msg| msg.starts_with("// File: x.go"))
        .expect("x.go prompted");
    assert!(prompt.contains("R:"));
    assert!(prompt.contains("  receiver:"));
    assert!(prompt.contains("    m: 1 (*R)"));
    assert!(prompt.contains("    rr: 1 (*R)"));
}

#[tokio::test]
async fn scenario_test_and_non_test_passes_are_split() {
    let dir = write_package(&[
        (
            "code.go",
            "package demo\n\ntype T struct{}\n\nvar V int\n\nfunc F(x int) {\n\t_ = x\n}\n",
        ),
        (
            "code_test.go",
            "package demo\n\nfunc helper() {\n\ty := 1\n\t_ = y\n}\n",
        ),
    ]);

    let script = ScriptedConversationalist::new();
    let sent = script.sent_handle();
    script.set_reply(
        "code_test.go",
        r#"[{"from":"y","to":"got","func_id":"helper","context":"\ty := 1"}]"#,
    );
    run_engine(dir.path(), script).await;

    let state = disk_state(dir.path());
    assert!(state.get("code.go").expect("code.go").contains("func F(x int)"));
    let test_file = state.get("code_test.go").expect("code_test.go");
    assert!(test_file.contains("got := 1"));
    assert!(test_file.contains("_ = got"));

    // The non-test pass prompts code.go only; the test pass prompts
    // code_test.go only.
    let sent = sent.lock().expect("sent lock");
    assert_eq!(sent.len(), 2);
    assert!(sent.iter().any(|msg| msg.starts_with("// File: code.go")));
    assert!(sent
        .iter()
        .any(|msg| msg.starts_with("// File: code_test.go")));
}

#[tokio::test]
async fn empty_replies_leave_package_byte_identical() {
    let files: &[(&str, &str)] = &[
        (
            "a.go",
            "package demo\n\ntype R struct{}\n\nfunc f() {\n\tr := R{}\n\t_ = r\n}\n",
        ),
        (
            "b.go",
            "package demo\n\nfunc g() {\n\trr := R{}\n\t_ = rr\n}\n",
        ),
        (
            "a_test.go",
            "package demo\n\nfunc check() {\n\tgot := R{}\n\t_ = got\n}\n",
        ),
    ];
    let dir = write_package(files);
    let before = disk_state(dir.path());

    run_engine(dir.path(), ScriptedConversationalist::new()).await;

    let after = disk_state(dir.path());
    assert_eq!(before, after, "empty proposals must not touch any byte");
}

#[tokio::test]
async fn fatal_provider_error_fails_the_pass_and_writes_nothing() {
    let dir = write_package(&[
        (
            "a.go",
            "package demo\n\ntype R struct{}\n\nfunc f() {\n\tr := R{}\n\t_ = r\n}\n",
        ),
        (
            "b.go",
            "package demo\n\nfunc g() {\n\trr := R{}\n\t_ = rr\n}\n",
        ),
    ]);
    let before = disk_state(dir.path());

    let script = ScriptedConversationalist::new();
    script.fail_with("a.go", LlmError::Fatal("authentication failed".to_string()));
    script.set_reply(
        "b.go",
        r#"[{"from":"rr","to":"r","func_id":"g","context":"\trr := R{}"}]"#,
    );

    let (mut pkg, _) = load(dir.path()).expect("load package");
    let options = RenameOptions::new(Arc::new(script));
    let err = rename_for_consistency(&mut pkg, &options)
        .await
        .expect_err("pass must fail");
    assert!(err.to_string().contains("authentication failed"));

    assert_eq!(
        disk_state(dir.path()),
        before,
        "a failed pass must not write partial results"
    );
}

#[tokio::test]
async fn external_test_package_gets_only_the_test_pass() {
    let dir = write_package(&[
        ("code.go", "package demo\n\nvar V int\n"),
        (
            "ext_test.go",
            "package demo_test\n\nfunc helper() {\n\tgot := 1\n\t_ = got\n}\n",
        ),
    ]);

    let (_, external) = load(dir.path()).expect("load package");
    let mut external = external.expect("external test package");

    let script = ScriptedConversationalist::new();
    let sent = script.sent_handle();
    let options = RenameOptions::new(Arc::new(script));
    let report = rename_for_consistency(&mut external, &options)
        .await
        .expect("engine run");
    assert_eq!(report.passes.len(), 1);
    assert!(report.passes[0].tests);

    let sent = sent.lock().expect("sent lock");
    assert_eq!(sent.len(), 1);
    assert!(sent[0].starts_with("// File: ext_test.go"));
}

#[tokio::test]
async fn applied_renames_survive_into_the_test_pass() {
    // The non-test pass renames rr -> r; the test pass re-resolves the
    // rewritten sources, so its prompt reflects the new spelling.
    let dir = write_package(&[
        (
            "x.go",
            "package demo\n\ntype R struct{}\n\nfunc f() {\n\tr := R{}\n\t_ = r\n}\n\nfunc g() {\n\trr := R{}\n\t_ = rr\n}\n",
        ),
        (
            "x_test.go",
            "package demo\n\nfunc check() {\n\tone := R{}\n\tother := R{}\n\t_, _ = one, other\n}\n",
        ),
    ]);

    let script = ScriptedConversationalist::new();
    let sent = script.sent_handle();
    script.set_reply(
        "x.go",
        r#"[{"from":"rr","to":"r","func_id":"g","context":"\trr := R{}"}]"#,
    );
    run_engine(dir.path(), script).await;

    let state = disk_state(dir.path());
    assert!(!state.get("x.go").expect("x.go").contains("rr"));

    let sent = sent.lock().expect("sent lock");
    let test_prompt = sent
        .iter()
        .find(|msg| msg.starts_with("// File: x_test.go"))
        .expect("test pass prompted");
    assert!(
        test_prompt.contains("one: 1 (R)") && test_prompt.contains("other: 1 (R)"),
        "test pass summary is rebuilt from scratch"
    );
}

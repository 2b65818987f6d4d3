//! End-to-end tests driving the built `codesense` binary over a temp
//! workspace: the scenarios from the engine's testable-properties table,
//! plus CLI exit codes and JSON/text output shapes.

use std::fs;
use std::path::Path;
use std::process::{Command, Output};

use serde_json::Value;
use tempfile::tempdir;

fn bin() -> &'static str {
    env!("CARGO_BIN_EXE_codesense")
}

fn run(root: &Path, args: &[&str]) -> Output {
    Command::new(bin())
        .arg("--root")
        .arg(root)
        .args(args)
        .output()
        .expect("failed to run codesense")
}

fn stdout_json(output: &Output) -> Value {
    serde_json::from_slice(&output.stdout).unwrap_or_else(|e| {
        panic!(
            "expected JSON stdout, got error {e}\nstdout: {}\nstderr: {}",
            String::from_utf8_lossy(&output.stdout),
            String::from_utf8_lossy(&output.stderr)
        )
    })
}

fn stdout_str(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).to_string()
}

#[test]
fn init_creates_index_and_config_descriptor() {
    let dir = tempdir().unwrap();
    let root = dir.path();
    fs::write(root.join("a.ts"), "export function foo(){}\n").unwrap();

    let output = run(root, &["init"]);
    assert!(output.status.success(), "{:?}", output);

    assert!(root.join(".codex/index.db").is_file());
    assert!(root.join(".codex/tool-protocol.json").is_file());
    assert!(root.join("CODESENSE.md").is_file());

    let summary = stdout_json(&output);
    assert_eq!(summary["files_total"], 1);
    assert_eq!(summary["files_changed"], 1);
}

#[test]
fn reindexing_unchanged_tree_touches_nothing() {
    let dir = tempdir().unwrap();
    let root = dir.path();
    fs::write(root.join("a.ts"), "export function foo(){}\n").unwrap();

    assert!(run(root, &["init"]).status.success());
    let second = run(root, &["reindex"]);
    assert!(second.status.success());

    let summary = stdout_json(&second);
    assert_eq!(summary["files_changed"], 0);
}

#[test]
fn two_file_repo_exports_symbols_and_searches() {
    let dir = tempdir().unwrap();
    let root = dir.path();
    fs::write(root.join("a.ts"), "export function foo(){ bar(); }\n").unwrap();
    fs::write(root.join("b.ts"), "export function bar(){}\n").unwrap();

    assert!(run(root, &["init"]).status.success());

    let search = stdout_json(&run(root, &["search", "bar"]));
    let hits = search.as_array().unwrap();
    assert!(hits.iter().any(|h| h["name"] == "bar"));

    let callers = stdout_json(&run(root, &["callers", "bar"]));
    assert!(
        callers.as_array().unwrap().is_empty(),
        "bar is not imported yet, so foo's call to it is not in a.ts's symbol table"
    );
}

#[test]
fn cross_file_import_creates_reference_edge() {
    let dir = tempdir().unwrap();
    let root = dir.path();
    fs::write(
        root.join("a.ts"),
        "import { bar } from './b';\nexport function foo(){ bar(); }\n",
    )
    .unwrap();
    fs::write(root.join("b.ts"), "export function bar(){}\n").unwrap();

    assert!(run(root, &["init"]).status.success());

    let callers = stdout_json(&run(root, &["callers", "bar"]));
    let names: Vec<&str> = callers
        .as_array()
        .unwrap()
        .iter()
        .map(|s| s["name"].as_str().unwrap())
        .collect();
    assert!(names.contains(&"foo"));

    let impact = stdout_json(&run(root, &["impact", "b.ts"]));
    let files: Vec<&str> = impact
        .as_array()
        .unwrap()
        .iter()
        .map(|e| e["file"].as_str().unwrap())
        .collect();
    assert!(files.contains(&"a.ts"));
}

#[test]
fn same_file_call_creates_calls_edge() {
    let dir = tempdir().unwrap();
    let root = dir.path();
    fs::write(
        root.join("a.ts"),
        "export function f(){ g(); }\nexport function g(){}\n",
    )
    .unwrap();

    assert!(run(root, &["init"]).status.success());

    let deps = stdout_json(&run(root, &["deps", "f"]));
    let names: Vec<&str> = deps
        .as_array()
        .unwrap()
        .iter()
        .map(|s| s["name"].as_str().unwrap())
        .collect();
    assert!(names.contains(&"g"));
}

#[test]
fn deleting_a_file_cascades_its_edges() {
    let dir = tempdir().unwrap();
    let root = dir.path();
    let a = root.join("a.ts");
    let b = root.join("b.ts");
    fs::write(&a, "import { bar } from './b';\nexport function foo(){ bar(); }\n").unwrap();
    fs::write(&b, "export function bar(){}\n").unwrap();

    assert!(run(root, &["init"]).status.success());
    assert!(!stdout_json(&run(root, &["callers", "bar"]))
        .as_array()
        .unwrap()
        .is_empty());

    fs::remove_file(&b).unwrap();
    assert!(run(root, &["reindex"]).status.success());

    let callers = stdout_json(&run(root, &["callers", "bar"]));
    assert!(callers.as_array().unwrap().is_empty());

    let stats = stdout_json(&run(root, &["stats"]));
    assert_eq!(stats["files"], 1);
}

#[test]
fn search_of_empty_or_unmatched_query_is_empty() {
    let dir = tempdir().unwrap();
    let root = dir.path();
    fs::write(root.join("a.ts"), "export function foo(){}\n").unwrap();
    assert!(run(root, &["init"]).status.success());

    assert!(stdout_json(&run(root, &["search", ""]))
        .as_array()
        .unwrap()
        .is_empty());
    assert!(stdout_json(&run(root, &["search", "hello world"]))
        .as_array()
        .unwrap()
        .is_empty());
}

#[test]
fn query_without_an_index_exits_with_code_one() {
    let dir = tempdir().unwrap();
    let root = dir.path();

    let output = run(root, &["search", "anything"]);
    assert_eq!(output.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&output.stderr).contains("no index found"));
}

#[test]
fn rank_modules_and_stats_respond_against_an_empty_repo() {
    let dir = tempdir().unwrap();
    let root = dir.path();

    assert!(run(root, &["init"]).status.success());

    assert!(stdout_json(&run(root, &["rank"])).as_array().unwrap().is_empty());
    assert!(stdout_json(&run(root, &["modules"])).as_array().unwrap().is_empty());

    let stats = stdout_json(&run(root, &["stats"]));
    assert_eq!(stats["files"], 0);
    assert_eq!(stats["symbols"], 0);
}

#[test]
fn brief_and_pre_edit_produce_human_text() {
    let dir = tempdir().unwrap();
    let root = dir.path();
    fs::write(root.join("a.ts"), "export function foo(){}\n").unwrap();
    assert!(run(root, &["init"]).status.success());

    let brief = run(root, &["brief"]);
    assert!(brief.status.success());
    assert!(!stdout_str(&brief).is_empty());

    let pre_edit = run(root, &["pre-edit", "a.ts"]);
    assert!(pre_edit.status.success());
    assert!(stdout_str(&pre_edit).contains("foo"));
}

#[test]
fn post_edit_reindexes_silently() {
    let dir = tempdir().unwrap();
    let root = dir.path();
    let a = root.join("a.ts");
    fs::write(&a, "export function foo(){}\n").unwrap();
    assert!(run(root, &["init"]).status.success());

    fs::write(&a, "export function foo(){}\nexport function bar(){}\n").unwrap();
    let output = run(root, &["post-edit", "a.ts"]);
    assert!(output.status.success());
    assert!(stdout_str(&output).is_empty());

    let search = stdout_json(&run(root, &["search", "bar"]));
    assert!(!search.as_array().unwrap().is_empty());
}

#[test]
fn uninstall_removes_the_config_descriptor() {
    let dir = tempdir().unwrap();
    let root = dir.path();
    fs::write(root.join("a.ts"), "export function foo(){}\n").unwrap();
    assert!(run(root, &["init"]).status.success());
    assert!(root.join(".codex/tool-protocol.json").is_file());

    assert!(run(root, &["uninstall"]).status.success());
    assert!(!root.join(".codex/tool-protocol.json").is_file());
    assert!(root.join(".codex/index.db").is_file());
}

#[test]
fn generate_docs_regenerates_codesense_md() {
    let dir = tempdir().unwrap();
    let root = dir.path();
    fs::write(root.join("a.ts"), "export function foo(){}\n").unwrap();
    assert!(run(root, &["init"]).status.success());

    fs::remove_file(root.join("CODESENSE.md")).unwrap();
    assert!(run(root, &["generate-docs"]).status.success());
    assert!(root.join("CODESENSE.md").is_file());
}

#[test]
fn daemon_status_reports_not_running_without_a_pid_file() {
    let dir = tempdir().unwrap();
    let root = dir.path();
    fs::write(root.join("a.ts"), "export function foo(){}\n").unwrap();
    assert!(run(root, &["init"]).status.success());

    let status = stdout_json(&run(root, &["daemon", "status"]));
    assert_eq!(status["running"], false);
}

//! Integration tests for the `relay workflow` and `relay tasks` commands.

use assert_cmd::Command;
use predicates::prelude::*;
use std::path::PathBuf;
use tempfile::TempDir;

const SHOUT_WORKFLOW: &str = r#"{
    "id": "wf-shout",
    "name": "shout",
    "nodes": [
        {"id": "C", "type": "ai_text"},
        {"id": "B", "type": "transform", "parameters": {"code": "uppercase"}},
        {"id": "A", "type": "input", "parameters": {"value": "hi"}}
    ],
    "connections": [
        {"sourceNode": "A", "sourceOutput": "data", "targetNode": "B", "targetInput": "data"},
        {"sourceNode": "B", "sourceOutput": "result", "targetNode": "C", "targetInput": "prompt"}
    ]
}"#;

const CYCLIC_WORKFLOW: &str = r#"{
    "id": "wf-loop",
    "name": "loop",
    "nodes": [
        {"id": "a", "type": "output"},
        {"id": "b", "type": "output"}
    ],
    "connections": [
        {"sourceNode": "a", "sourceOutput": "x", "targetNode": "b", "targetInput": "x"},
        {"sourceNode": "b", "sourceOutput": "x", "targetNode": "a", "targetInput": "x"}
    ]
}"#;

fn write(dir: &TempDir, name: &str, content: &str) -> PathBuf {
    let path = dir.path().join(name);
    std::fs::write(&path, content).unwrap();
    path
}

fn relay() -> Command {
    let mut cmd = Command::cargo_bin("relay").unwrap();
    cmd.arg("--log-level").arg("error");
    cmd
}

#[test]
fn test_workflow_validate_prints_order() {
    let dir = TempDir::new().unwrap();
    let file = write(&dir, "shout.json", SHOUT_WORKFLOW);

    relay()
        .arg("workflow")
        .arg("validate")
        .arg(&file)
        .assert()
        .success()
        .stdout(predicate::str::contains("is valid (3 nodes)"))
        .stdout(predicate::str::contains("A -> B -> C"));
}

#[test]
fn test_workflow_validate_rejects_cycle() {
    let dir = TempDir::new().unwrap();
    let file = write(&dir, "loop.json", CYCLIC_WORKFLOW);

    relay()
        .arg("workflow")
        .arg("validate")
        .arg(&file)
        .assert()
        .failure()
        .stderr(predicate::str::contains("Cycle detected"));
}

#[test]
fn test_workflow_run_json() {
    let dir = TempDir::new().unwrap();
    let file = write(&dir, "shout.json", SHOUT_WORKFLOW);

    let output = relay().arg("workflow").arg("run").arg(&file).arg("--json").output().unwrap();

    assert!(output.status.success());
    let body: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(body["success"], serde_json::json!(true));
    assert_eq!(body["outputs"]["C"]["text"], serde_json::json!("HI"));
    assert_eq!(body["outputs"]["C"]["provider"], serde_json::json!("echo"));
}

#[test]
fn test_workflow_run_human_output() {
    let dir = TempDir::new().unwrap();
    let file = write(&dir, "shout.json", SHOUT_WORKFLOW);

    relay()
        .arg("workflow")
        .arg("run")
        .arg(&file)
        .assert()
        .success()
        .stdout(predicate::str::contains("text: HI"))
        .stdout(predicate::str::contains("Completed 3 nodes"));
}

#[test]
fn test_workflow_run_missing_file() {
    relay()
        .arg("workflow")
        .arg("run")
        .arg("/nonexistent/workflow.json")
        .assert()
        .failure();
}

#[test]
fn test_tasks_run_with_dependencies() {
    let dir = TempDir::new().unwrap();
    let file = write(
        &dir,
        "tasks.json",
        r#"[
            {"id": "second", "request": {"kind": "text", "prompt": "world"}, "dependencies": ["first"]},
            {"id": "first", "request": {"kind": "text", "prompt": "hello"}}
        ]"#,
    );

    let output = relay().arg("tasks").arg("run").arg(&file).arg("--json").output().unwrap();

    assert!(output.status.success());
    let body: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    let completed = body["completed"].as_array().unwrap();
    assert_eq!(completed.len(), 2);
    assert_eq!(completed[0]["id"], serde_json::json!("first"));
    assert_eq!(completed[1]["output"], serde_json::json!("world"));
}

#[test]
fn test_tasks_run_reports_unresolved() {
    let dir = TempDir::new().unwrap();
    let file = write(
        &dir,
        "tasks.json",
        r#"[{"id": "stuck", "request": {"kind": "text", "prompt": "x"}, "dependencies": ["ghost"]}]"#,
    );

    relay()
        .arg("tasks")
        .arg("run")
        .arg(&file)
        .assert()
        .failure()
        .stdout(predicate::str::contains("stuck"))
        .stderr(predicate::str::contains("1 unresolved"));
}

#[test]
fn test_config_blocks_prompt() {
    let dir = TempDir::new().unwrap();
    let config = write(
        &dir,
        "relay.toml",
        r#"
[security]
blocked_patterns = ["(?i)forbidden"]
"#,
    );
    let file = write(
        &dir,
        "tasks.json",
        r#"[{"id": "bad", "request": {"kind": "text", "prompt": "a FORBIDDEN prompt"}}]"#,
    );

    relay()
        .arg("--config")
        .arg(&config)
        .arg("tasks")
        .arg("run")
        .arg(&file)
        .arg("--parallel")
        .assert()
        .failure()
        .stdout(predicate::str::contains("blocked by security filter"));
}

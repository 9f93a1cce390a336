//! End-to-end tests for the splice CLI and the splice-worker interpreter.

#![allow(deprecated)] // Allow deprecated Command::cargo_bin for tests

use std::fs;
use std::path::{Path, PathBuf};

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

// =============================================================================
// Test Helpers
// =============================================================================

/// A temporary document plus a settings path inside the same directory.
struct TestDocument {
    temp_dir: TempDir,
    path: PathBuf,
}

impl TestDocument {
    fn new(text: &str) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let path = temp_dir.path().join("note.md");
        fs::write(&path, text).expect("Failed to write document");
        Self { temp_dir, path }
    }

    fn path(&self) -> &Path {
        &self.path
    }

    fn settings_path(&self) -> PathBuf {
        self.temp_dir.path().join("settings.json")
    }

    fn write_settings(&self, json: serde_json::Value) {
        fs::write(self.settings_path(), json.to_string()).expect("Failed to write settings");
    }

    fn text(&self) -> String {
        fs::read_to_string(&self.path).expect("Failed to read document")
    }

    /// `splice` with this document's settings file.
    fn splice(&self) -> Command {
        let mut cmd = Command::cargo_bin("splice").unwrap();
        cmd.arg("--settings").arg(self.settings_path());
        cmd
    }
}

// =============================================================================
// In-process execution
// =============================================================================

#[test]
fn test_run_inserts_output() {
    let doc = TestDocument::new("%%%\n1 + 2\n%%%\n");

    doc.splice()
        .arg("run")
        .arg(doc.path())
        .args(["--line", "2"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Updated"));

    assert_eq!(doc.text(), "%%%\n1 + 2\n%%%\n3\n");
}

#[test]
fn test_run_with_decoration() {
    let doc = TestDocument::new("# Notes\n\n%%%\nlet x = 5\nx * x\n%%%\ntail\n");
    doc.write_settings(serde_json::json!({
        "decorationPrefix": "=> ",
    }));

    doc.splice()
        .arg("run")
        .arg(doc.path())
        .args(["--line", "4"])
        .assert()
        .success();

    assert_eq!(
        doc.text(),
        "# Notes\n\n%%%\nlet x = 5\nx * x\n%%%\n=> 25\ntail\n"
    );
}

#[test]
fn test_run_without_block_fails() {
    let doc = TestDocument::new("just prose\n");

    doc.splice()
        .arg("run")
        .arg(doc.path())
        .args(["--line", "1"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("No code block found"));

    assert_eq!(doc.text(), "just prose\n");
}

#[test]
fn test_run_line_out_of_range() {
    let doc = TestDocument::new("%%%\n1\n%%%");

    doc.splice()
        .arg("run")
        .arg(doc.path())
        .args(["--line", "40"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("past the end"));
}

#[test]
fn test_enter_closes_block() {
    let doc = TestDocument::new("%%%\n6 * 7\n%%%");

    doc.splice()
        .arg("enter")
        .arg(doc.path())
        .args(["--line", "3"])
        .assert()
        .success();

    assert_eq!(doc.text(), "%%%\n6 * 7\n%%%\n42\n");
}

#[test]
fn test_enter_on_opening_delimiter_does_nothing() {
    let doc = TestDocument::new("%%%\n6 * 7\n");

    doc.splice()
        .arg("enter")
        .arg(doc.path())
        .args(["--line", "1"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Nothing to run"));

    assert_eq!(doc.text(), "%%%\n6 * 7\n");
}

// =============================================================================
// Interpreter process
// =============================================================================

#[test]
fn test_run_against_worker() {
    let doc = TestDocument::new("---\nauthor: ann\n---\n%%%\n2 * 21\n%%%\n");
    doc.write_settings(serde_json::json!({
        "advancedMode": true,
        "structuredProtocol": true,
        "shellPath": env!("CARGO_BIN_EXE_splice-worker"),
        "shellArgs": "",
    }));

    doc.splice()
        .arg("run")
        .arg(doc.path())
        .args(["--line", "5"])
        .assert()
        .success();

    assert_eq!(doc.text(), "---\nauthor: ann\n---\n%%%\n2 * 21\n%%%\n42\n");
}

#[test]
fn test_worker_sees_frontmatter() {
    let doc = TestDocument::new("---\nauthor: ann\n---\n%%%\nget_frontmatter(author)\n%%%");

    doc.splice()
        .arg("run")
        .arg(doc.path())
        .args(["--line", "5", "--shell", env!("CARGO_BIN_EXE_splice-worker")])
        .args(["--shell-args", ""])
        .assert()
        .success();

    assert!(doc.text().ends_with("%%%\nann"));
}

#[test]
fn test_worker_plain_protocol() {
    let mut worker = Command::cargo_bin("splice-worker").unwrap();
    worker
        .write_stdin("1 + 1\n\n%%%'a' + 'b'%%%\nmissing\n")
        .assert()
        .success()
        .stdout("2\nab\nError: ReferenceError: missing is not defined\n");
}

#[test]
fn test_worker_info() {
    let mut worker = Command::cargo_bin("splice-worker").unwrap();
    worker
        .write_stdin("info\n")
        .assert()
        .success()
        .stdout(predicate::str::contains("Available objects:"))
        .stdout(predicate::str::contains(" >> note_path"));
}

// =============================================================================
// Inspection commands
// =============================================================================

#[test]
fn test_locate() {
    let doc = TestDocument::new("intro\n%%% calc\na\nb\n%%%\n");

    doc.splice()
        .arg("locate")
        .arg(doc.path())
        .args(["--line", "3"])
        .assert()
        .success()
        .stdout(predicate::str::contains("lines 2-5"))
        .stdout(predicate::str::contains("a\nb"));
}

#[test]
fn test_expand_default_shortcut() {
    let doc = TestDocument::new("");

    doc.splice()
        .args(["expand", "@ what is rust?"])
        .assert()
        .success()
        .stdout("chat(\"\"\"what is rust?\"\"\")\n");
}

#[test]
fn test_frontmatter_json() {
    let doc = TestDocument::new("---\nauthor: ann\ndraft: false\n---\nbody\n");

    let output = doc
        .splice()
        .arg("frontmatter")
        .arg(doc.path())
        .output()
        .unwrap();
    assert!(output.status.success());

    let value: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(value["author"], "ann");
    assert_eq!(value["draft"], false);
}

#[test]
fn test_settings_init_and_show() {
    let doc = TestDocument::new("");

    doc.splice()
        .args(["settings", "--init"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Wrote default settings"));
    assert!(doc.settings_path().exists());

    doc.splice()
        .arg("settings")
        .assert()
        .success()
        .stdout(predicate::str::contains("\"shellPath\": \"python3\""));

    doc.splice()
        .args(["settings", "--path"])
        .assert()
        .success()
        .stdout(predicate::str::contains("settings.json"));
}

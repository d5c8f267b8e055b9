// SPDX-License-Identifier: MIT OR Apache-2.0
//! Integration tests for the `runner` binary's argument surface.

use assert_cmd::Command;
use predicates::prelude::*;

#[allow(deprecated)]
fn runner() -> Command {
    Command::cargo_bin("runner").unwrap()
}

#[test]
fn schema_run_request_prints_valid_json() {
    let assert = runner().args(["schema", "run-request"]).assert().success();
    let output = assert.get_output();
    let value: serde_json::Value = serde_json::from_slice(&output.stdout).expect("valid JSON");
    assert!(value.is_object());
}

#[test]
fn run_without_required_flags_exits_with_usage_error() {
    runner()
        .arg("run")
        .assert()
        .failure()
        .code(2)
        .stderr(predicate::str::contains("required"));
}

#[test]
fn run_rejects_unknown_agent() {
    runner()
        .args(["run", "--repo", "/tmp/does-not-matter", "--agent", "gpt5", "--policy", "default"])
        .assert()
        .failure()
        .code(2);
}

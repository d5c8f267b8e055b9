// SPDX-License-Identifier: MIT OR Apache-2.0
//! The run's finalizer (spec §4.8, §5 atomicity rule, §6 run-directory
//! layout): writes every terminal artifact exactly once, regardless of
//! whether the run succeeded, failed, or was cancelled.

use std::path::Path;

use runner_core::{CanonicalEvent, Metrics, TargetRef};
use runner_error::RunnerError;
use serde::Serialize;
use serde_json::Value;

use crate::atomic::{write_json, write_text};
use crate::report::{render_failure_md, render_report_md};

/// Everything the finalizer needs to persist the run's terminal state.
pub struct FinalizeInput<'a> {
    pub run_dir: &'a Path,
    pub target_ref: &'a TargetRef,
    pub metrics: Option<&'a Metrics>,
    pub report: Option<&'a Value>,
    pub error: Option<&'a RunnerError>,
    /// Workspace root to diff, when the policy allowed edits and acquisition succeeded.
    pub diff_workspace_root: Option<&'a Path>,
    /// `sandbox/` artifact directory, when the run used the Docker backend
    /// and it got far enough to start a container.
    pub sandbox_dir: Option<&'a Path>,
}

/// Write `target_ref.json`, `metrics.json`, `diff_numstat.json` (when
/// applicable), `report.json`/`report.md` or `error.json`/`report.md`, and
/// (best-effort, on failure) sandbox diagnostics.
///
/// Every write here is independent and best-effort beyond its own I/O
/// error: a failure writing one artifact (e.g. `diff_numstat.json`) must
/// never prevent `error.json` itself from landing, since that is the one
/// artifact callers rely on to learn why the run failed.
pub async fn finalize(input: FinalizeInput<'_>) -> Result<(), RunnerError> {
    write_json(&input.run_dir.join("target_ref.json"), input.target_ref)?;

    if let Some(metrics) = input.metrics {
        write_json(&input.run_dir.join("metrics.json"), metrics)?;
    }

    if let Some(root) = input.diff_workspace_root {
        write_diff_numstat(input.run_dir, root);
    }

    match input.error {
        None => {
            let md = render_report_md(input.target_ref, input.report, input.metrics.unwrap_or(&Metrics::default()));
            if let Some(report) = input.report {
                write_json(&input.run_dir.join("report.json"), report)?;
            }
            write_text(&input.run_dir.join("report.md"), &md)?;
        }
        Some(err) => {
            let structured = err.to_structured_error();
            write_json(&input.run_dir.join("error.json"), &structured)?;
            let md = render_failure_md(input.target_ref, &structured, input.metrics);
            write_text(&input.run_dir.join("report.md"), &md)?;
            if let Some(sandbox_dir) = input.sandbox_dir {
                capture_sandbox_diagnostics(sandbox_dir).await;
            }
        }
    }

    Ok(())
}

/// Read `normalized_events.jsonl` back for the metrics stage, tolerating a
/// missing or empty file (e.g. the run failed before any event was emitted).
pub fn load_normalized_events(normalized_events_path: &Path) -> Vec<CanonicalEvent> {
    if !normalized_events_path.is_file() {
        return Vec::new();
    }
    runner_jsonl::read_normalized_events(normalized_events_path).unwrap_or_default()
}

#[derive(Serialize)]
struct DiffNumstatEntry {
    path: String,
    lines_added: Option<u64>,
    lines_removed: Option<u64>,
}

/// Run `git diff --numstat` against the acquired workspace and persist it
/// as a small structured artifact (spec §6 "diff_numstat.json ... present
/// iff the policy allowed edits").
fn write_diff_numstat(run_dir: &Path, workspace_root: &Path) {
    let Some(numstat) = runner_git::git_diff_numstat(workspace_root) else {
        return;
    };
    let entries: Vec<DiffNumstatEntry> = numstat
        .lines()
        .filter(|l| !l.trim().is_empty())
        .filter_map(|line| {
            let mut parts = line.splitn(3, '\t');
            let added = parts.next()?;
            let removed = parts.next()?;
            let path = parts.next()?.to_string();
            Some(DiffNumstatEntry {
                path,
                lines_added: added.parse::<u64>().ok(),
                lines_removed: removed.parse::<u64>().ok(),
            })
        })
        .collect();
    let _ = write_json(&run_dir.join("diff_numstat.json"), &entries);
}

/// Best-effort `docker logs`/`docker inspect` capture for a failed Docker
/// run, grounded on `SandboxInstance::capture_diagnostics`'s approach
/// (container logs + redacted inspect JSON), reimplemented here because
/// that method lives on the concrete `SandboxInstance` type and is no
/// longer reachable once `prepare_backend` has erased it to
/// `Box<dyn ExecutionBackend>`.
async fn capture_sandbox_diagnostics(sandbox_dir: &Path) {
    let Ok(meta_text) = std::fs::read_to_string(sandbox_dir.join("sandbox.json")) else {
        return;
    };
    let Ok(meta) = serde_json::from_str::<Value>(&meta_text) else {
        return;
    };
    let Some(container_name) = meta.get("container_name").and_then(Value::as_str) else {
        return;
    };
    let allowlist: Vec<String> = meta
        .get("env_allowlist")
        .and_then(Value::as_array)
        .map(|a| a.iter().filter_map(|v| v.as_str().map(String::from)).collect())
        .unwrap_or_default();

    if let Ok(out) = tokio::process::Command::new("docker").args(["logs", container_name]).output().await {
        let mut text = String::from_utf8_lossy(&out.stdout).into_owned();
        text.push_str(&String::from_utf8_lossy(&out.stderr));
        let _ = write_text(&sandbox_dir.join("container_logs.txt"), &text);
    }

    if let Ok(out) = tokio::process::Command::new("docker").args(["inspect", container_name]).output().await {
        if let Ok(mut inspect) = serde_json::from_slice::<Value>(&out.stdout) {
            redact_inspect_env(&mut inspect, &allowlist);
            let _ = write_json(&sandbox_dir.join("container_inspect.json"), &inspect);
        }
    }
}

fn redact_inspect_env(inspect: &mut Value, allowlist: &[String]) {
    let Some(containers) = inspect.as_array_mut() else { return };
    for container in containers {
        let Some(env) = container.get_mut("Config").and_then(|c| c.get_mut("Env")).and_then(|e| e.as_array_mut()) else {
            continue;
        };
        for entry in env.iter_mut() {
            let Some(s) = entry.as_str() else { continue };
            if let Some((key, _)) = s.split_once('=') {
                if allowlist.iter().any(|a| a == key) {
                    *entry = Value::String(format!("{key}=***redacted***"));
                }
            }
        }
    }
}

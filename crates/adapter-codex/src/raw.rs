// SPDX-License-Identifier: MIT OR Apache-2.0
//! Drive `codex exec --json`, capturing `raw_events.jsonl`,
//! `agent_last_message.txt`, and `agent_stderr.txt` (spec §4.4 adapter
//! contract), including the Codex-specific early-termination policy.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use runner_backend::ExecutionBackend;
use runner_capture::synthesize_stderr_if_empty;
use runner_core::AdapterRunResult;
use runner_error::RunnerError;
use runner_jsonl::RawEventSink;
use runner_process::{CancelToken, ProcessSpec, run_streaming};
use serde_json::Value;

use crate::config::CodexAdapterConfig;
use crate::discovery::resolve_binary;
use crate::error::{apply_patch_approval_denied, exec_failed, launch_failed, refresh_token_reused};

/// Everything needed for one Codex invocation besides the config and the
/// execution backend (spec §4.4 "Input").
pub struct CodexRunRequest<'a> {
    /// Fully-rendered prompt, fed over stdin.
    pub prompt: &'a str,
    /// Destination for the streamed raw event lines.
    pub raw_events_path: PathBuf,
    /// Destination for the recovered final assistant message.
    pub last_message_path: PathBuf,
    /// Destination for the full captured stderr.
    pub stderr_path: PathBuf,
    /// Env overrides the backend should propagate to the child (spec §4.3.b).
    pub env_overrides: BTreeMap<String, String>,
    /// Optional wall-clock timeout for the whole invocation.
    pub timeout: Option<Duration>,
}

/// Drive one `codex exec --json` invocation end to end: resolve the binary,
/// build argv through `backend`, stream stdout into `raw_events.jsonl` plus
/// its timestamp sidecar while watching for an interactive approval request,
/// capture stderr in full and scan it for an auth-refresh loop, then recover
/// the final message.
///
/// # Errors
///
/// Returns [`RunnerError`] with `AgentLaunchFailed` if the child cannot be
/// spawned, `apply_patch_approval_request_denied` if Codex asked for
/// interactive patch approval, `refresh_token_reused` if stderr shows an
/// auth-refresh loop, or `AgentExecFailed` for any other process-driving I/O
/// failure.
pub async fn run_codex(
    config: &CodexAdapterConfig,
    backend: &dyn ExecutionBackend,
    request: CodexRunRequest<'_>,
    cancel: &CancelToken,
) -> Result<AdapterRunResult, RunnerError> {
    let has_prefix = !backend.command_prefix().is_empty();
    let resolution = resolve_binary(&config.binary, has_prefix);
    let binary = resolution.resolved.as_ref().map_or_else(|| config.binary.clone(), |p| p.to_string_lossy().into_owned());

    let mut codex_argv = vec![binary];
    codex_argv.extend(config.build_argv()?);

    let full_argv = backend.build_argv(&request.env_overrides, &codex_argv);
    let env_plan = backend.plan_env(&request.env_overrides);

    if let Some(parent) = request.raw_events_path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| {
            RunnerError::new(
                runner_error::ErrorCode::WorkspaceIoError,
                format!("failed to create raw_events.jsonl parent directory: {e}"),
                "ensure the run directory is writable",
            )
        })?;
    }
    let ts_sidecar_path = raw_events_ts_path(&request.raw_events_path);
    let mut sink = RawEventSink::create(&request.raw_events_path, &ts_sidecar_path).map_err(|e| {
        RunnerError::new(
            runner_error::ErrorCode::WorkspaceIoError,
            format!("failed to open raw_events.jsonl for writing: {e}"),
            "ensure the run directory is writable",
        )
    })?;

    let spec = ProcessSpec::new(full_argv.clone(), backend.workspace_mount())
        .with_env(env_plan.process_env)
        .with_stdin(request.prompt.to_string());

    let mut approval_call_id: Option<String> = None;
    let cancel_for_scan = cancel.clone();

    let outcome = run_streaming(
        spec,
        |line| {
            let _ = sink.write_raw_line(line);
            if approval_call_id.is_none() {
                if let Some(call_id) = detect_apply_patch_approval_request(line) {
                    approval_call_id = Some(call_id);
                    cancel_for_scan.cancel();
                }
            }
        },
        cancel,
        request.timeout,
    )
    .await
    .map_err(|source| {
        if resolution.is_found() || has_prefix {
            exec_failed(source)
        } else {
            launch_failed(&config.binary, resolution.resolved.as_ref().and_then(|p| p.to_str()), source)
        }
    })?;
    let _ = sink.flush();

    let (stderr_text, stderr_synthesized) =
        synthesize_stderr_if_empty(&String::from_utf8_lossy(&outcome.stderr), outcome.exit_code);
    std::fs::write(&request.stderr_path, &stderr_text).map_err(|e| {
        RunnerError::new(
            runner_error::ErrorCode::WorkspaceIoError,
            format!("failed to write agent_stderr.txt: {e}"),
            "ensure the run directory is writable",
        )
    })?;

    if let Some(call_id) = approval_call_id {
        return Err(apply_patch_approval_denied(Some(&call_id)));
    }
    if !stderr_synthesized && stderr_text.contains("refresh_token_reused") {
        return Err(refresh_token_reused(&stderr_text));
    }

    let last_message = extract_last_message_text(&request.raw_events_path);
    std::fs::write(&request.last_message_path, &last_message).map_err(|e| {
        RunnerError::new(
            runner_error::ErrorCode::WorkspaceIoError,
            format!("failed to write agent_last_message.txt: {e}"),
            "ensure the run directory is writable",
        )
    })?;

    Ok(AdapterRunResult {
        argv: full_argv,
        exit_code: outcome.exit_code,
        raw_events_path: request.raw_events_path,
        last_message_path: request.last_message_path,
        stderr_path: request.stderr_path,
        cancelled: outcome.cancelled,
        timed_out: outcome.timed_out,
    })
}

fn raw_events_ts_path(raw_events_path: &Path) -> PathBuf {
    raw_events_path.with_extension("").with_extension("ts.jsonl")
}

/// Scan one raw `codex exec --json` line for an `apply_patch_approval_request`
/// item, returning its `call_id` if present (spec §4.4).
fn detect_apply_patch_approval_request(line: &str) -> Option<String> {
    let obj: Value = serde_json::from_str(line).ok()?;
    let item = obj.get("item")?;
    if item.get("type").and_then(Value::as_str) != Some("apply_patch_approval_request") {
        return None;
    }
    Some(item.get("call_id").and_then(Value::as_str).unwrap_or_default().to_string())
}

/// Recover the final assistant message text from a written
/// `raw_events.jsonl`: the last `item.completed` event whose item is an
/// `agent_message` wins (spec §4.4, §4.5).
fn extract_last_message_text(raw_events_path: &Path) -> String {
    let Ok(raw_lines) = runner_jsonl::read_raw_lines(raw_events_path) else {
        return String::new();
    };

    let mut last_text: Option<String> = None;
    for line in &raw_lines {
        let Ok(obj) = serde_json::from_str::<Value>(line) else { continue };
        if obj.get("type").and_then(Value::as_str) != Some("item.completed") {
            continue;
        }
        let Some(item) = obj.get("item") else { continue };
        if item.get("type").and_then(Value::as_str) != Some("agent_message") {
            continue;
        }
        if let Some(text) = item.get("text").and_then(Value::as_str) {
            if !text.is_empty() {
                last_text = Some(text.to_string());
            }
        }
    }
    last_text.unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_apply_patch_approval_request_call_id() {
        let line = r#"{"type":"item.started","item":{"type":"apply_patch_approval_request","call_id":"call_42"}}"#;
        assert_eq!(detect_apply_patch_approval_request(line), Some("call_42".to_string()));
    }

    #[test]
    fn ignores_unrelated_items() {
        let line = r#"{"type":"item.completed","item":{"type":"agent_message","text":"hi"}}"#;
        assert_eq!(detect_apply_patch_approval_request(line), None);
    }

    #[test]
    fn extracts_last_completed_agent_message() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("raw_events.jsonl");
        std::fs::write(
            &path,
            concat!(
                r#"{"type":"item.completed","item":{"type":"agent_message","text":"first"}}"#,
                "\n",
                r#"{"type":"item.completed","item":{"type":"command_execution","command":"ls"}}"#,
                "\n",
                r#"{"type":"item.completed","item":{"type":"agent_message","text":"second"}}"#,
                "\n",
            ),
        )
        .unwrap();
        assert_eq!(extract_last_message_text(&path), "second");
    }

    #[test]
    fn missing_file_yields_empty_string() {
        let path = PathBuf::from("/nonexistent/raw_events.jsonl");
        assert_eq!(extract_last_message_text(&path), "");
    }
}

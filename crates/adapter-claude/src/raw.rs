// SPDX-License-Identifier: MIT OR Apache-2.0
//! Drive `claude -p`, capturing `raw_events.jsonl`, `agent_last_message.txt`,
//! and `agent_stderr.txt` (spec §4.4 adapter contract).

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

use crate::config::ClaudeAdapterConfig;
use crate::discovery::resolve_binary;
use crate::error::{exec_failed, launch_failed};

/// Everything needed for one Claude invocation besides the config and the
/// execution backend (spec §4.4 "Input").
pub struct ClaudeRunRequest<'a> {
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

/// Drive one `claude -p` invocation end to end: resolve the binary, build
/// argv through `backend`, stream stdout into `raw_events.jsonl` plus its
/// timestamp sidecar, capture stderr in full, and recover the final message.
///
/// # Errors
///
/// Returns [`RunnerError`] with `AgentLaunchFailed` if the child cannot be
/// spawned, or `AgentExecFailed` for any other process-driving I/O failure.
pub async fn run_claude(
    config: &ClaudeAdapterConfig,
    backend: &dyn ExecutionBackend,
    request: ClaudeRunRequest<'_>,
    cancel: &CancelToken,
) -> Result<AdapterRunResult, RunnerError> {
    let has_prefix = !backend.command_prefix().is_empty();
    let resolution = resolve_binary(&config.binary, has_prefix);
    let binary = resolution.resolved.as_ref().map_or_else(|| config.binary.clone(), |p| p.to_string_lossy().into_owned());

    let mut claude_argv = vec![binary];
    claude_argv.extend(config.build_argv()?);

    let full_argv = backend.build_argv(&request.env_overrides, &claude_argv);
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

    let outcome = run_streaming(
        spec,
        |line| {
            let _ = sink.write_raw_line(line);
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

    let (stderr_text, _) =
        synthesize_stderr_if_empty(&String::from_utf8_lossy(&outcome.stderr), outcome.exit_code);
    std::fs::write(&request.stderr_path, &stderr_text).map_err(|e| {
        RunnerError::new(
            runner_error::ErrorCode::WorkspaceIoError,
            format!("failed to write agent_stderr.txt: {e}"),
            "ensure the run directory is writable",
        )
    })?;

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

/// Recover the final assistant message text from a written
/// `raw_events.jsonl`, mirroring `claude -p`'s own two output modes: a
/// single trailing `result` object (non-streaming `--output-format json`) or
/// a `stream-json` line stream where the last `result`/`assistant` message
/// wins (spec §4.4, §4.5).
fn extract_last_message_text(raw_events_path: &Path) -> String {
    let Ok(raw_lines) = runner_jsonl::read_raw_lines(raw_events_path) else {
        return String::new();
    };

    if raw_lines.len() == 1 {
        if let Ok(Value::Object(obj)) = serde_json::from_str::<Value>(&raw_lines[0]) {
            if let Some(Value::String(result)) = obj.get("result") {
                return result.clone();
            }
        }
    }

    let mut last_text: Option<String> = None;
    for line in &raw_lines {
        let Ok(obj) = serde_json::from_str::<Value>(line) else { continue };
        let Some(obj_type) = obj.get("type").and_then(Value::as_str) else { continue };

        if obj_type == "result" {
            if let Some(result) = obj.get("result").and_then(Value::as_str) {
                if !result.trim().is_empty() {
                    last_text = Some(result.to_string());
                }
            }
            continue;
        }

        if obj_type != "assistant" {
            continue;
        }
        let Some(content) = obj.get("message").and_then(|m| m.get("content")).and_then(Value::as_array) else {
            continue;
        };
        let mut parts = Vec::new();
        for block in content {
            if block.get("type").and_then(Value::as_str) != Some("text") {
                continue;
            }
            if let Some(text) = block.get("text").and_then(Value::as_str) {
                if !text.is_empty() {
                    parts.push(text.to_string());
                }
            }
        }
        if !parts.is_empty() {
            last_text = Some(parts.concat());
        }
    }
    last_text.unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_result_field_from_single_json_document() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("raw_events.jsonl");
        std::fs::write(&path, r#"{"result": "final answer"}"#).unwrap();
        assert_eq!(extract_last_message_text(&path), "final answer");
    }

    #[test]
    fn falls_back_to_last_assistant_text_block() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("raw_events.jsonl");
        std::fs::write(
            &path,
            concat!(
                r#"{"type":"assistant","message":{"content":[{"type":"text","text":"first"}]}}"#,
                "\n",
                r#"{"type":"assistant","message":{"content":[{"type":"text","text":"second"}]}}"#,
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

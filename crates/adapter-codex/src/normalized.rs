// SPDX-License-Identifier: MIT OR Apache-2.0
//! Translate `raw_events.jsonl` (Codex's `item.started`/`item.updated`/
//! `item.completed` event stream) into `normalized_events.jsonl` (spec §4.5).

use std::path::Path;

use chrono::{DateTime, Utc};
use runner_capture::{FailureArtifactWriter, Timing, capture_inline_excerpt};
use runner_core::{CanonicalEvent, EventKind};
use runner_error::{ErrorCode, RunnerError};
use runner_jsonl::{NormalizedEventWriter, format_ts, now_utc, read_raw_lines};
use serde_json::{Value, json};

/// Default whole-artifact capture budget for per-failure `stdout.txt`/`stderr.txt`.
const ARTIFACT_CAPTURE_BUDGET_BYTES: usize = 64 * 1024;

/// Normalize one run's `raw_events.jsonl` into `normalized_events.jsonl`,
/// writing any failure sub-artifacts under `run_dir`. Returns the number of
/// canonical events written.
///
/// Only `item.completed` events carry the final state of an item and are
/// translated; `item.started`/`item.updated` are progress echoes of the same
/// item and are skipped to avoid double-counting (spec §4.5 "Exactly one
/// canonical event per completed agent action").
///
/// # Errors
///
/// Returns [`RunnerError`] if `raw_events_path` cannot be read or
/// `normalized_events_path` cannot be created.
pub fn normalize_codex_events(
    raw_events_path: &Path,
    normalized_events_path: &Path,
    run_dir: &Path,
    workspace_mount: Option<&str>,
) -> Result<u64, RunnerError> {
    let raw_lines = read_raw_lines(raw_events_path).map_err(|e| {
        RunnerError::new(
            ErrorCode::Internal,
            format!("failed to read raw_events.jsonl: {e}"),
            "ensure the adapter successfully wrote raw_events.jsonl before normalizing",
        )
    })?;

    let mut writer = NormalizedEventWriter::create(normalized_events_path).map_err(|e| {
        RunnerError::new(
            ErrorCode::Internal,
            format!("failed to create normalized_events.jsonl: {e}"),
            "ensure the run directory is writable",
        )
    })?;

    let mut cmd_index: u32 = 0;
    let mut tool_index: u32 = 0;

    for line in &raw_lines {
        let ts = now_utc();
        let Ok(obj) = serde_json::from_str::<Value>(line) else {
            let event = CanonicalEvent::new(
                ts,
                EventKind::Error,
                json!({"category": "raw_non_json_line", "message": line}),
            );
            writer.write_event(&event).map_err(writer_err)?;
            continue;
        };

        match obj.get("type").and_then(Value::as_str) {
            Some("item.completed") => {}
            Some("error") => {
                let message = obj.get("message").and_then(Value::as_str).unwrap_or("codex reported an error");
                let event = CanonicalEvent::new(ts, EventKind::Error, json!({"category": "agent_error", "message": message}));
                writer.write_event(&event).map_err(writer_err)?;
                continue;
            }
            _ => continue,
        }

        let Some(item) = obj.get("item") else { continue };
        let Some(item_type) = item.get("type").and_then(Value::as_str) else { continue };

        let event = match item_type {
            "agent_message" | "reasoning" => {
                let text = item.get("text").and_then(Value::as_str).unwrap_or_default();
                if text.trim().is_empty() {
                    continue;
                }
                CanonicalEvent::new(ts, EventKind::AgentMessage, json!({"kind": "message", "text": text}))
            }
            "command_execution" => {
                cmd_index += 1;
                translate_command_execution(item, ts, run_dir, &mut cmd_index)
            }
            "file_change" => translate_file_change(item, ts, workspace_mount),
            "file_read" => translate_file_read(item, ts, workspace_mount),
            "web_search" => {
                let query = item.get("query").and_then(Value::as_str).unwrap_or_default();
                CanonicalEvent::new(ts, EventKind::WebSearch, json!({"query": query}))
            }
            "mcp_tool_call" => translate_mcp_tool_call(item, ts, run_dir, &mut tool_index),
            "apply_patch_approval_request" => {
                let call_id = item.get("call_id").and_then(Value::as_str).unwrap_or_default();
                CanonicalEvent::new(
                    ts,
                    EventKind::Error,
                    json!({"category": "apply_patch_approval_request", "message": format!("unanswered approval request {call_id}")}),
                )
            }
            other => CanonicalEvent::new(ts, EventKind::ToolCall, json!({"name": other, "input": item.clone(), "is_error": false})),
        };
        writer.write_event(&event).map_err(writer_err)?;
    }
    writer.flush().map_err(writer_err)?;
    Ok(writer.count())
}

fn writer_err(e: runner_jsonl::JsonlError) -> RunnerError {
    RunnerError::new(
        ErrorCode::Internal,
        format!("failed to write normalized_events.jsonl: {e}"),
        "ensure the run directory is writable",
    )
}

fn map_workspace_path(path: &str, workspace_mount: Option<&str>) -> String {
    if let Some(mount) = workspace_mount {
        let mount = mount.trim_end_matches('/');
        if let Some(rest) = path.strip_prefix(mount) {
            return rest.trim_start_matches('/').to_string();
        }
    }
    path.to_string()
}

fn split_command(command: &str) -> Vec<String> {
    command.split_whitespace().map(str::to_string).collect()
}

fn translate_command_execution(item: &Value, ts: DateTime<Utc>, run_dir: &Path, cmd_index: &mut u32) -> CanonicalEvent {
    let command = item.get("command").and_then(Value::as_str).unwrap_or_default();
    let exit_code = item.get("exit_code").and_then(Value::as_i64).unwrap_or(0);
    let aggregated_output = item.get("aggregated_output").and_then(Value::as_str).unwrap_or_default();
    let timing = Timing { started_at: format_ts(ts), finished_at: format_ts(ts), duration_ms: 0 };

    let argv = item
        .get("parsed_cmd")
        .and_then(Value::as_array)
        .map(|arr| arr.iter().filter_map(|v| v.as_str().map(str::to_string)).collect::<Vec<_>>())
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| split_command(command));

    let mut data = json!({"argv": argv, "command": command, "exit_code": exit_code});

    if exit_code != 0 {
        *cmd_index += 1;
        let (excerpt, truncated) = capture_inline_excerpt(aggregated_output);
        data["output_excerpt"] = json!(excerpt);
        data["output_excerpt_truncated"] = json!(truncated);
        if let Ok(writer) = FailureArtifactWriter::create_command(run_dir, *cmd_index) {
            let command_json = json!({"command": command, "argv": argv, "exit_code": exit_code});
            let _ = writer.write_command(&command_json, &[], aggregated_output.as_bytes(), &timing, ARTIFACT_CAPTURE_BUDGET_BYTES);
            data["failure_artifacts"] = json!({"dir": writer.dir().to_string_lossy()});
        }
    }
    CanonicalEvent::new(ts, EventKind::RunCommand, data)
}

fn translate_file_change(item: &Value, ts: DateTime<Utc>, workspace_mount: Option<&str>) -> CanonicalEvent {
    let raw_path = item.get("path").and_then(Value::as_str).unwrap_or_default();
    let path = map_workspace_path(raw_path, workspace_mount);
    let kind = item.get("kind").and_then(Value::as_str).unwrap_or("update");
    CanonicalEvent::new(ts, EventKind::WriteFile, json!({"path": path, "change_kind": kind}))
}

fn translate_file_read(item: &Value, ts: DateTime<Utc>, workspace_mount: Option<&str>) -> CanonicalEvent {
    let raw_path = item.get("path").and_then(Value::as_str).unwrap_or_default();
    let path = map_workspace_path(raw_path, workspace_mount);
    let bytes = item.get("bytes").and_then(Value::as_i64).unwrap_or(-1);
    CanonicalEvent::new(ts, EventKind::ReadFile, json!({"path": path, "bytes": bytes}))
}

fn translate_mcp_tool_call(item: &Value, ts: DateTime<Utc>, run_dir: &Path, tool_index: &mut u32) -> CanonicalEvent {
    let name = item.get("tool").and_then(Value::as_str).unwrap_or("mcp_tool");
    let input = item.get("arguments").cloned().unwrap_or(Value::Null);
    let is_error = item.get("status").and_then(Value::as_str) == Some("failed");
    let mut data = json!({"name": name, "input": input, "is_error": is_error});

    if is_error {
        *tool_index += 1;
        let error_text = item.get("error").and_then(Value::as_str).unwrap_or_default();
        let timing = Timing { started_at: format_ts(ts), finished_at: format_ts(ts), duration_ms: 0 };
        if let Ok(writer) = FailureArtifactWriter::create_tool(run_dir, *tool_index, name) {
            let tool_json = json!({"tool": name, "input": data["input"], "error_text": error_text});
            let _ = writer.write_tool(&tool_json, &[], error_text.as_bytes(), &timing, ARTIFACT_CAPTURE_BUDGET_BYTES);
            data["failure_artifacts"] = json!({"dir": writer.dir().to_string_lossy()});
        }
    }
    CanonicalEvent::new(ts, EventKind::ToolCall, data)
}

#[cfg(test)]
mod tests {
    use super::*;
    use runner_jsonl::read_normalized_events;
    use tempfile::tempdir;

    fn write_raw(dir: &Path, lines: &[&str]) -> std::path::PathBuf {
        let path = dir.join("raw_events.jsonl");
        std::fs::write(&path, lines.join("\n") + "\n").unwrap();
        path
    }

    #[test]
    fn emits_run_command_and_agent_message() {
        let dir = tempdir().unwrap();
        let raw = write_raw(
            dir.path(),
            &[
                r#"{"type":"item.started","item":{"type":"command_execution","command":"echo hi"}}"#,
                r#"{"type":"item.completed","item":{"type":"command_execution","command":"echo hi","exit_code":0,"aggregated_output":"hi\n"}}"#,
                r#"{"type":"item.completed","item":{"type":"agent_message","text":"done"}}"#,
            ],
        );
        let normalized = dir.path().join("normalized.jsonl");
        let count = normalize_codex_events(&raw, &normalized, dir.path(), None).unwrap();
        assert_eq!(count, 2);

        let events = read_normalized_events(&normalized).unwrap();
        assert!(events.iter().any(|e| e.kind == EventKind::RunCommand));
        assert!(events.iter().any(|e| e.kind == EventKind::AgentMessage));
    }

    #[test]
    fn failed_command_writes_failure_artifacts() {
        let dir = tempdir().unwrap();
        let raw = write_raw(
            dir.path(),
            &[r#"{"type":"item.completed","item":{"type":"command_execution","command":"false","exit_code":1,"aggregated_output":"boom"}}"#],
        );
        let normalized = dir.path().join("normalized.jsonl");
        normalize_codex_events(&raw, &normalized, dir.path(), None).unwrap();

        let stderr = std::fs::read_to_string(dir.path().join("command_failures/cmd_01/stderr.txt")).unwrap();
        assert_eq!(stderr.trim(), "boom");
    }

    #[test]
    fn maps_workspace_mount_paths_for_file_change() {
        let dir = tempdir().unwrap();
        let raw = write_raw(
            dir.path(),
            &[r#"{"type":"item.completed","item":{"type":"file_change","path":"/workspace/src/main.rs","kind":"update"}}"#],
        );
        let normalized = dir.path().join("normalized.jsonl");
        normalize_codex_events(&raw, &normalized, dir.path(), Some("/workspace")).unwrap();

        let events = read_normalized_events(&normalized).unwrap();
        let write_event = events.iter().find(|e| e.kind == EventKind::WriteFile).unwrap();
        assert_eq!(write_event.data["path"], json!("src/main.rs"));
    }

    #[test]
    fn dangling_approval_request_emits_error_event() {
        let dir = tempdir().unwrap();
        let raw =
            write_raw(dir.path(), &[r#"{"type":"item.completed","item":{"type":"apply_patch_approval_request","call_id":"call_1"}}"#]);
        let normalized = dir.path().join("normalized.jsonl");
        normalize_codex_events(&raw, &normalized, dir.path(), None).unwrap();

        let events = read_normalized_events(&normalized).unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind, EventKind::Error);
        assert_eq!(events[0].data["category"], json!("apply_patch_approval_request"));
    }

    #[test]
    fn top_level_error_event_is_translated() {
        let dir = tempdir().unwrap();
        let raw = write_raw(dir.path(), &[r#"{"type":"error","message":"sandbox denied write"}"#]);
        let normalized = dir.path().join("normalized.jsonl");
        normalize_codex_events(&raw, &normalized, dir.path(), None).unwrap();

        let events = read_normalized_events(&normalized).unwrap();
        assert_eq!(events[0].kind, EventKind::Error);
        assert_eq!(events[0].data["message"], json!("sandbox denied write"));
    }
}

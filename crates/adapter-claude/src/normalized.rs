// SPDX-License-Identifier: MIT OR Apache-2.0
//! Translate `raw_events.jsonl` (Claude's `stream-json` assistant/user
//! message pairs) into `normalized_events.jsonl` (spec §4.5).

use std::collections::HashMap;
use std::path::Path;

use chrono::{DateTime, Utc};
use runner_capture::{FailureArtifactWriter, Timing, capture_inline_excerpt};
use runner_core::{CanonicalEvent, EventKind};
use runner_error::{ErrorCode, RunnerError};
use runner_jsonl::{NormalizedEventWriter, format_ts, now_utc, read_raw_lines};
use serde_json::{Map, Value, json};

/// Default whole-artifact capture budget for per-failure `stdout.txt`/`stderr.txt`.
const ARTIFACT_CAPTURE_BUDGET_BYTES: usize = 64 * 1024;

struct PendingToolUse {
    name: String,
    input: Value,
}

/// Normalize one run's `raw_events.jsonl` into `normalized_events.jsonl`,
/// writing any failure sub-artifacts under `run_dir`. Returns the number of
/// canonical events written.
///
/// # Errors
///
/// Returns [`RunnerError`] if `raw_events_path` cannot be read or
/// `normalized_events_path` cannot be created.
pub fn normalize_claude_events(
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

    let mut pending_tool_uses: HashMap<String, PendingToolUse> = HashMap::new();
    let mut pending_message = String::new();
    let mut cmd_index: u32 = 0;
    let mut tool_index: u32 = 0;

    let flush_message = |writer: &mut NormalizedEventWriter, pending: &mut String, ts: DateTime<Utc>| {
        if pending.trim().is_empty() {
            pending.clear();
            return;
        }
        let event = CanonicalEvent::new(
            ts,
            EventKind::AgentMessage,
            json!({"kind": "message", "text": pending.clone()}),
        );
        let _ = writer.write_event(&event);
        pending.clear();
    };

    for line in &raw_lines {
        let ts = now_utc();
        let Ok(obj) = serde_json::from_str::<Value>(line) else {
            flush_message(&mut writer, &mut pending_message, ts);
            let event = CanonicalEvent::new(
                ts,
                EventKind::Error,
                json!({"category": "raw_non_json_line", "message": line}),
            );
            writer.write_event(&event).map_err(writer_err)?;
            continue;
        };
        let Some(obj_type) = obj.get("type").and_then(Value::as_str) else { continue };

        match obj_type {
            "assistant" => {
                let Some(content) = obj.get("message").and_then(|m| m.get("content")).and_then(Value::as_array)
                else {
                    continue;
                };
                for block in content {
                    match block.get("type").and_then(Value::as_str) {
                        Some("text") => {
                            if let Some(text) = block.get("text").and_then(Value::as_str) {
                                pending_message.push_str(text);
                            }
                        }
                        Some("tool_use") => {
                            flush_message(&mut writer, &mut pending_message, ts);
                            if let (Some(id), Some(name)) = (
                                block.get("id").and_then(Value::as_str),
                                block.get("name").and_then(Value::as_str),
                            ) {
                                let input = block.get("input").cloned().unwrap_or(Value::Object(Map::new()));
                                pending_tool_uses
                                    .insert(id.to_string(), PendingToolUse { name: name.to_string(), input });
                            }
                        }
                        _ => {}
                    }
                }
            }
            "user" => {
                let Some(content) = obj.get("message").and_then(|m| m.get("content")).and_then(Value::as_array)
                else {
                    continue;
                };
                for block in content {
                    if block.get("type").and_then(Value::as_str) != Some("tool_result") {
                        continue;
                    }
                    flush_message(&mut writer, &mut pending_message, ts);
                    let Some(tool_use_id) = block.get("tool_use_id").and_then(Value::as_str) else { continue };
                    let content_text = tool_result_text(block.get("content"));
                    let is_error = block.get("is_error").and_then(Value::as_bool).unwrap_or(false);

                    let Some(pending) = pending_tool_uses.remove(tool_use_id) else {
                        let event = CanonicalEvent::new(
                            ts,
                            EventKind::Error,
                            json!({
                                "category": "tool_result_missing_use",
                                "message": format!("tool_result for unknown tool_use_id {tool_use_id}"),
                            }),
                        );
                        writer.write_event(&event).map_err(writer_err)?;
                        continue;
                    };

                    let event = translate_tool_result(
                        &pending,
                        &content_text,
                        is_error,
                        ts,
                        workspace_mount,
                        run_dir,
                        &mut cmd_index,
                        &mut tool_index,
                    );
                    writer.write_event(&event).map_err(writer_err)?;
                }
            }
            _ => {}
        }
    }
    flush_message(&mut writer, &mut pending_message, now_utc());
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

fn tool_result_text(content: Option<&Value>) -> String {
    match content {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Array(blocks)) => blocks
            .iter()
            .filter_map(|b| b.get("text").and_then(Value::as_str))
            .collect::<Vec<_>>()
            .join(""),
        _ => String::new(),
    }
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

/// Split a shell command line into argv tokens, honoring single/double
/// quoting well enough for the commands Bash-tool-use input actually
/// contains (spec §4.5 `run_command.argv`).
fn split_command(command: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut quote: Option<char> = None;
    let mut in_token = false;

    for c in command.chars() {
        match quote {
            Some(q) if c == q => quote = None,
            Some(_) => current.push(c),
            None if c == '\'' || c == '"' => {
                quote = Some(c);
                in_token = true;
            }
            None if c.is_whitespace() => {
                if in_token {
                    tokens.push(std::mem::take(&mut current));
                    in_token = false;
                }
            }
            None => {
                current.push(c);
                in_token = true;
            }
        }
    }
    if in_token {
        tokens.push(current);
    }
    tokens
}

#[allow(clippy::too_many_arguments)]
fn translate_tool_result(
    pending: &PendingToolUse,
    content_text: &str,
    is_error: bool,
    ts: DateTime<Utc>,
    workspace_mount: Option<&str>,
    run_dir: &Path,
    cmd_index: &mut u32,
    tool_index: &mut u32,
) -> CanonicalEvent {
    let timing = Timing { started_at: format_ts(ts), finished_at: format_ts(ts), duration_ms: 0 };

    match pending.name.as_str() {
        "Bash" => {
            let command = pending.input.get("command").and_then(Value::as_str).unwrap_or_default();
            let exit_code = if is_error { 1 } else { 0 };
            let mut data = json!({
                "argv": split_command(command),
                "command": command,
                "exit_code": exit_code,
            });
            if is_error {
                *cmd_index += 1;
                let (excerpt, truncated) = capture_inline_excerpt(content_text);
                data["output_excerpt"] = json!(excerpt);
                data["output_excerpt_truncated"] = json!(truncated);
                if let Ok(writer) = FailureArtifactWriter::create_command(run_dir, *cmd_index) {
                    let command_json = json!({"command": command, "argv": split_command(command), "exit_code": exit_code});
                    let _ = writer.write_command(&command_json, &[], content_text.as_bytes(), &timing, ARTIFACT_CAPTURE_BUDGET_BYTES);
                    data["failure_artifacts"] = json!({"dir": writer.dir().to_string_lossy()});
                }
            }
            CanonicalEvent::new(ts, EventKind::RunCommand, data)
        }
        "Read" => {
            let raw_path =
                pending.input.get("file_path").or_else(|| pending.input.get("path")).and_then(Value::as_str).unwrap_or_default();
            let path = map_workspace_path(raw_path, workspace_mount);
            let bytes = if is_error { -1 } else { content_text.len() as i64 };
            CanonicalEvent::new(ts, EventKind::ReadFile, json!({"path": path, "bytes": bytes}))
        }
        "WebSearch" => {
            let query = pending.input.get("query").and_then(Value::as_str).unwrap_or_default();
            CanonicalEvent::new(ts, EventKind::WebSearch, json!({"query": query}))
        }
        other => {
            let mut data = json!({"name": other, "input": pending.input.clone(), "is_error": is_error});
            if is_error {
                *tool_index += 1;
                if let Ok(writer) = FailureArtifactWriter::create_tool(run_dir, *tool_index, other) {
                    let tool_json = json!({"tool": other, "input": pending.input, "error_text": content_text});
                    let _ = writer.write_tool(&tool_json, &[], content_text.as_bytes(), &timing, ARTIFACT_CAPTURE_BUDGET_BYTES);
                    data["failure_artifacts"] = json!({"dir": writer.dir().to_string_lossy()});
                }
            }
            CanonicalEvent::new(ts, EventKind::ToolCall, data)
        }
    }
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
    fn emits_run_command_and_read_file_and_agent_message() {
        let dir = tempdir().unwrap();
        let raw = write_raw(
            dir.path(),
            &[
                r#"{"type":"assistant","message":{"content":[{"type":"tool_use","id":"tool_1","name":"Bash","input":{"command":"echo hi"}}]}}"#,
                r#"{"type":"user","message":{"content":[{"type":"tool_result","tool_use_id":"tool_1","content":"hi\n","is_error":false}]}}"#,
                r#"{"type":"assistant","message":{"content":[{"type":"tool_use","id":"tool_2","name":"Read","input":{"file_path":"USERS.md"}}]}}"#,
                r#"{"type":"user","message":{"content":[{"type":"tool_result","tool_use_id":"tool_2","content":"# Users\n","is_error":false}]}}"#,
                r#"{"type":"assistant","message":{"content":[{"type":"text","text":"ok"}]}}"#,
            ],
        );
        let normalized = dir.path().join("normalized.jsonl");
        let count = normalize_claude_events(&raw, &normalized, dir.path(), None).unwrap();
        assert_eq!(count, 3);

        let events = read_normalized_events(&normalized).unwrap();
        assert!(events.iter().any(|e| e.kind == EventKind::RunCommand));
        assert!(events.iter().any(|e| e.kind == EventKind::ReadFile));
        assert!(events.iter().any(|e| e.kind == EventKind::AgentMessage));
    }

    #[test]
    fn writes_command_failure_artifacts() {
        let dir = tempdir().unwrap();
        let raw = write_raw(
            dir.path(),
            &[
                r#"{"type":"assistant","message":{"content":[{"type":"tool_use","id":"tool_1","name":"Bash","input":{"command":"echo hi"}}]}}"#,
                r#"{"type":"user","message":{"content":[{"type":"tool_result","tool_use_id":"tool_1","content":"boom","is_error":true}]}}"#,
            ],
        );
        let normalized = dir.path().join("normalized.jsonl");
        normalize_claude_events(&raw, &normalized, dir.path(), None).unwrap();

        let stderr = std::fs::read_to_string(dir.path().join("command_failures/cmd_01/stderr.txt")).unwrap();
        assert_eq!(stderr.trim(), "boom");
    }

    #[test]
    fn maps_workspace_mount_paths() {
        let dir = tempdir().unwrap();
        let raw = write_raw(
            dir.path(),
            &[
                r#"{"type":"assistant","message":{"content":[{"type":"tool_use","id":"tool_1","name":"Read","input":{"file_path":"/workspace/USERS.md"}}]}}"#,
                r#"{"type":"user","message":{"content":[{"type":"tool_result","tool_use_id":"tool_1","content":"# Users\n","is_error":false}]}}"#,
            ],
        );
        let normalized = dir.path().join("normalized.jsonl");
        normalize_claude_events(&raw, &normalized, dir.path(), Some("/workspace")).unwrap();

        let events = read_normalized_events(&normalized).unwrap();
        let read_event = events.iter().find(|e| e.kind == EventKind::ReadFile).unwrap();
        assert_eq!(read_event.data["path"], json!("USERS.md"));
    }

    #[test]
    fn orphaned_tool_result_emits_error_event() {
        let dir = tempdir().unwrap();
        let raw = write_raw(
            dir.path(),
            &[r#"{"type":"user","message":{"content":[{"type":"tool_result","tool_use_id":"missing","content":"x","is_error":false}]}}"#],
        );
        let normalized = dir.path().join("normalized.jsonl");
        normalize_claude_events(&raw, &normalized, dir.path(), None).unwrap();

        let events = read_normalized_events(&normalized).unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind, EventKind::Error);
        assert_eq!(events[0].data["category"], json!("tool_result_missing_use"));
    }
}

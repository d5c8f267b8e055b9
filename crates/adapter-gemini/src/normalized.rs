// SPDX-License-Identifier: MIT OR Apache-2.0
//! Translate `raw_events.jsonl` (Gemini's `message`/`tool_use`/`tool_result`
//! event stream) into `normalized_events.jsonl` (spec §4.5).

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
pub fn normalize_gemini_events(
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

    let mut tool_uses: HashMap<String, PendingToolUse> = HashMap::new();
    let mut pending_message = String::new();
    let mut cmd_index: u32 = 0;
    let mut tool_index: u32 = 0;

    let flush_message = |writer: &mut NormalizedEventWriter, pending: &mut String, ts: DateTime<Utc>| {
        if pending.is_empty() {
            return;
        }
        let event = CanonicalEvent::new(ts, EventKind::AgentMessage, json!({"kind": "message", "text": pending.clone()}));
        let _ = writer.write_event(&event);
        pending.clear();
    };

    for line in &raw_lines {
        let ts = now_utc();
        let Ok(obj) = serde_json::from_str::<Value>(line) else {
            flush_message(&mut writer, &mut pending_message, ts);
            let event = CanonicalEvent::new(ts, EventKind::Error, json!({"category": "raw_non_json_line", "message": line}));
            writer.write_event(&event).map_err(writer_err)?;
            continue;
        };
        let Some(obj_type) = obj.get("type").and_then(Value::as_str) else { continue };

        match obj_type {
            "message" => {
                if obj.get("role").and_then(Value::as_str) != Some("assistant") {
                    flush_message(&mut writer, &mut pending_message, ts);
                    continue;
                }
                let Some(content) = obj.get("content").and_then(Value::as_str) else { continue };
                if content.is_empty() {
                    continue;
                }
                if obj.get("delta").and_then(Value::as_bool) == Some(true) {
                    pending_message.push_str(content);
                } else {
                    pending_message = content.to_string();
                }
            }
            "tool_use" => {
                flush_message(&mut writer, &mut pending_message, ts);
                if let (Some(id), Some(name)) =
                    (obj.get("tool_id").and_then(Value::as_str), obj.get("tool_name").and_then(Value::as_str))
                {
                    let input = obj.get("parameters").cloned().unwrap_or(Value::Object(Map::new()));
                    tool_uses.insert(id.to_string(), PendingToolUse { name: name.to_string(), input });
                }
            }
            "tool_result" => {
                flush_message(&mut writer, &mut pending_message, ts);
                let Some(tool_id) = obj.get("tool_id").and_then(Value::as_str) else { continue };
                let Some(pending) = tool_uses.remove(tool_id) else {
                    let event = CanonicalEvent::new(
                        ts,
                        EventKind::Error,
                        json!({"category": "tool_result_missing_use", "message": format!("tool_id={tool_id}")}),
                    );
                    writer.write_event(&event).map_err(writer_err)?;
                    continue;
                };
                let is_error = obj.get("status").and_then(Value::as_str).map(|s| !s.eq_ignore_ascii_case("success")).unwrap_or(true);
                let event =
                    translate_tool_result(&pending, &obj, is_error, ts, workspace_mount, run_dir, &mut cmd_index, &mut tool_index);
                if let Some(event) = event {
                    writer.write_event(&event).map_err(writer_err)?;
                }
            }
            _ => {
                flush_message(&mut writer, &mut pending_message, ts);
            }
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
/// quoting (spec §4.5 `run_command.argv`); Gemini's sandbox runs a
/// POSIX-like shell even on Windows hosts.
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
    raw_result: &Value,
    is_error: bool,
    ts: DateTime<Utc>,
    workspace_mount: Option<&str>,
    run_dir: &Path,
    cmd_index: &mut u32,
    tool_index: &mut u32,
) -> Option<CanonicalEvent> {
    let timing = Timing { started_at: format_ts(ts), finished_at: format_ts(ts), duration_ms: 0 };
    let name = pending.name.to_lowercase();

    match name.as_str() {
        "read_file" => {
            let raw_path = pending.input.get("file_path").and_then(Value::as_str)?;
            if raw_path.trim().is_empty() {
                return None;
            }
            let path = map_workspace_path(raw_path.trim(), workspace_mount);
            Some(CanonicalEvent::new(ts, EventKind::ReadFile, json!({"path": path, "bytes": -1})))
        }
        "write_file" | "replace" => Some(CanonicalEvent::new(
            ts,
            EventKind::ToolCall,
            json!({"name": pending.name, "input": pending.input.clone(), "is_error": is_error}),
        )),
        "run_shell_command" => {
            let command = pending.input.get("command").and_then(Value::as_str)?;
            if command.trim().is_empty() {
                return None;
            }
            let argv = split_command(command);
            let exit_code = if is_error { 1 } else { 0 };
            let mut data = json!({"argv": argv, "command": command, "exit_code": exit_code});
            if is_error {
                *cmd_index += 1;
                let output_text = join_streams(raw_result);
                let (excerpt, truncated) = capture_inline_excerpt(&output_text);
                if !output_text.is_empty() {
                    data["output_excerpt"] = json!(excerpt);
                    data["output_excerpt_truncated"] = json!(truncated);
                }
                if let Ok(writer) = FailureArtifactWriter::create_command(run_dir, *cmd_index) {
                    let command_json = json!({"command": command, "argv": argv, "exit_code": exit_code});
                    let _ = writer.write_command(&command_json, &[], output_text.as_bytes(), &timing, ARTIFACT_CAPTURE_BUDGET_BYTES);
                    data["failure_artifacts"] = json!({"dir": writer.dir().to_string_lossy()});
                }
            }
            Some(CanonicalEvent::new(ts, EventKind::RunCommand, data))
        }
        "google_web_search" => {
            let query = pending.input.get("query").and_then(Value::as_str)?;
            if query.trim().is_empty() {
                return None;
            }
            Some(CanonicalEvent::new(ts, EventKind::WebSearch, json!({"query": query.trim()})))
        }
        _ => {
            let mut data = json!({"name": pending.name, "input": pending.input.clone(), "is_error": is_error});
            if is_error {
                *tool_index += 1;
                let error_text = join_streams(raw_result);
                if let Ok(writer) = FailureArtifactWriter::create_tool(run_dir, *tool_index, &pending.name) {
                    let tool_json = json!({"tool": pending.name, "input": pending.input, "error_text": error_text});
                    let _ = writer.write_tool(&tool_json, &[], error_text.as_bytes(), &timing, ARTIFACT_CAPTURE_BUDGET_BYTES);
                    data["failure_artifacts"] = json!({"dir": writer.dir().to_string_lossy()});
                }
            }
            Some(CanonicalEvent::new(ts, EventKind::ToolCall, data))
        }
    }
}

fn join_streams(raw_result: &Value) -> String {
    let stdout =
        raw_result.get("stdout").or_else(|| raw_result.get("output")).or_else(|| raw_result.get("content")).and_then(Value::as_str);
    let stderr = raw_result.get("stderr").and_then(Value::as_str);
    let mut parts = Vec::new();
    if let Some(s) = stdout {
        if !s.trim().is_empty() {
            parts.push(format!("[stdout]\n{}", s.trim_end()));
        }
    }
    if let Some(s) = stderr {
        if !s.trim().is_empty() {
            parts.push(format!("[stderr]\n{}", s.trim_end()));
        }
    }
    parts.join("\n")
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
                r#"{"type":"tool_use","tool_id":"t1","tool_name":"run_shell_command","parameters":{"command":"echo hi"}}"#,
                r#"{"type":"tool_result","tool_id":"t1","status":"success"}"#,
                r#"{"type":"tool_use","tool_id":"t2","tool_name":"read_file","parameters":{"file_path":"USERS.md"}}"#,
                r#"{"type":"tool_result","tool_id":"t2","status":"success"}"#,
                r#"{"type":"message","role":"assistant","content":"ok","delta":false}"#,
            ],
        );
        let normalized = dir.path().join("normalized.jsonl");
        let count = normalize_gemini_events(&raw, &normalized, dir.path(), None).unwrap();
        assert_eq!(count, 3);

        let events = read_normalized_events(&normalized).unwrap();
        assert!(events.iter().any(|e| e.kind == EventKind::RunCommand));
        assert!(events.iter().any(|e| e.kind == EventKind::ReadFile));
        assert!(events.iter().any(|e| e.kind == EventKind::AgentMessage));
    }

    #[test]
    fn failed_shell_command_writes_failure_artifacts() {
        let dir = tempdir().unwrap();
        let raw = write_raw(
            dir.path(),
            &[
                r#"{"type":"tool_use","tool_id":"t1","tool_name":"run_shell_command","parameters":{"command":"false"}}"#,
                r#"{"type":"tool_result","tool_id":"t1","status":"error","stderr":"boom"}"#,
            ],
        );
        let normalized = dir.path().join("normalized.jsonl");
        normalize_gemini_events(&raw, &normalized, dir.path(), None).unwrap();

        let stderr = std::fs::read_to_string(dir.path().join("command_failures/cmd_01/stderr.txt")).unwrap();
        assert!(stderr.contains("boom"));
    }

    #[test]
    fn web_search_tool_use_emits_web_search_event() {
        let dir = tempdir().unwrap();
        let raw = write_raw(
            dir.path(),
            &[
                r#"{"type":"tool_use","tool_id":"t1","tool_name":"google_web_search","parameters":{"query":"rust async"}}"#,
                r#"{"type":"tool_result","tool_id":"t1","status":"success"}"#,
            ],
        );
        let normalized = dir.path().join("normalized.jsonl");
        normalize_gemini_events(&raw, &normalized, dir.path(), None).unwrap();

        let events = read_normalized_events(&normalized).unwrap();
        assert_eq!(events[0].kind, EventKind::WebSearch);
        assert_eq!(events[0].data["query"], json!("rust async"));
    }

    #[test]
    fn orphaned_tool_result_emits_error_event() {
        let dir = tempdir().unwrap();
        let raw = write_raw(dir.path(), &[r#"{"type":"tool_result","tool_id":"missing","status":"success"}"#]);
        let normalized = dir.path().join("normalized.jsonl");
        normalize_gemini_events(&raw, &normalized, dir.path(), None).unwrap();

        let events = read_normalized_events(&normalized).unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind, EventKind::Error);
        assert_eq!(events[0].data["category"], json!("tool_result_missing_use"));
    }
}

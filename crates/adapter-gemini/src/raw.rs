// SPDX-License-Identifier: MIT OR Apache-2.0
//! Drive `gemini`, capturing `raw_events.jsonl`, `agent_last_message.txt`,
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

use crate::config::GeminiAdapterConfig;
use crate::discovery::resolve_binary;
use crate::error::{exec_failed, launch_failed};

/// Everything needed for one Gemini invocation besides the config and the
/// execution backend (spec §4.4 "Input").
pub struct GeminiRunRequest<'a> {
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

/// Drive one `gemini` invocation end to end: resolve the binary, build argv
/// through `backend`, stream stdout into `raw_events.jsonl` plus its
/// timestamp sidecar, capture stderr in full, and recover the final message.
///
/// # Errors
///
/// Returns [`RunnerError`] with `AgentLaunchFailed` if the child cannot be
/// spawned, or `AgentExecFailed` for any other process-driving I/O failure.
pub async fn run_gemini(
    config: &GeminiAdapterConfig,
    backend: &dyn ExecutionBackend,
    request: GeminiRunRequest<'_>,
    cancel: &CancelToken,
) -> Result<AdapterRunResult, RunnerError> {
    let has_prefix = !backend.command_prefix().is_empty();
    let resolution = resolve_binary(&config.binary, has_prefix);
    let binary = resolution.resolved.as_ref().map_or_else(|| config.binary.clone(), |p| p.to_string_lossy().into_owned());

    let mut gemini_argv = vec![binary];
    gemini_argv.extend(config.build_argv());

    let full_argv = backend.build_argv(&request.env_overrides, &gemini_argv);
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

/// Strip a single leading/trailing fenced-code-block marker from `text`, if
/// present, before attempting to parse it as JSON.
fn strip_code_fence(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else { return trimmed };
    let rest = rest.trim_start_matches(|c: char| c.is_ascii_alphanumeric());
    let rest = rest.strip_prefix('\n').unwrap_or(rest);
    rest.strip_suffix("```").map_or(rest, str::trim_end)
}

/// Recover a JSON object embedded in free-form text: a direct parse of the
/// (fence-stripped) whole string, or failing that the first `{...}` object
/// found by scanning for a `{` and attempting `serde_json`'s streaming
/// deserializer from that offset (spec §4.4 "fallback recovery ... including
/// fenced-code-block stripping").
fn extract_json_object_candidate(text: &str) -> Option<Value> {
    let stripped = strip_code_fence(text);
    if stripped.is_empty() {
        return None;
    }
    if let Ok(value @ Value::Object(_)) = serde_json::from_str::<Value>(stripped) {
        return Some(value);
    }
    for (idx, ch) in stripped.char_indices() {
        if ch != '{' {
            continue;
        }
        let mut values = serde_json::Deserializer::from_str(&stripped[idx..]).into_iter::<Value>();
        if let Some(Ok(value @ Value::Object(_))) = values.next() {
            return Some(value);
        }
    }
    None
}

/// Recover the final assistant message text from a written
/// `raw_events.jsonl`: a single `--output-format json` document's `response`
/// field, or for `stream-json`, the last contiguous assistant segment (delta
/// messages concatenated until a non-delta boundary), with any JSON embedded
/// in that segment (or in a `write_file`/`tool_result` payload) recovered in
/// preference to the raw text (spec §4.4, §4.5).
fn extract_last_message_text(raw_events_path: &Path) -> String {
    if let Ok(text) = std::fs::read_to_string(raw_events_path) {
        if let Ok(Value::Object(obj)) = serde_json::from_str::<Value>(&text) {
            if let Some(Value::String(response)) = obj.get("response") {
                return response.clone();
            }
        }
    }

    let Ok(raw_lines) = runner_jsonl::read_raw_lines(raw_events_path) else {
        return String::new();
    };

    let mut last_segment = String::new();
    let mut current = String::new();
    let mut recovered: Option<Value> = None;

    let mut flush = |last_segment: &mut String, current: &mut String| {
        if !current.is_empty() {
            *last_segment = std::mem::take(current);
        }
    };

    for line in &raw_lines {
        let Ok(obj) = serde_json::from_str::<Value>(line) else { continue };
        match obj.get("type").and_then(Value::as_str) {
            Some("tool_use") => {
                flush(&mut last_segment, &mut current);
                if obj.get("tool_name").and_then(Value::as_str) == Some("write_file") {
                    if let Some(content) = obj.get("parameters").and_then(|p| p.get("content")).and_then(Value::as_str) {
                        if let Some(candidate) = extract_json_object_candidate(content) {
                            recovered = Some(candidate);
                        }
                    }
                }
            }
            Some("tool_result") => {
                flush(&mut last_segment, &mut current);
                if let Some(output) = obj.get("output").and_then(Value::as_str) {
                    if let Some(candidate) = extract_json_object_candidate(output) {
                        recovered = Some(candidate);
                    }
                }
            }
            Some("message") => {
                if obj.get("role").and_then(Value::as_str) != Some("assistant") {
                    flush(&mut last_segment, &mut current);
                    continue;
                }
                let Some(content) = obj.get("content").and_then(Value::as_str) else { continue };
                if content.is_empty() {
                    continue;
                }
                if obj.get("delta").and_then(Value::as_bool) == Some(true) {
                    current.push_str(content);
                } else {
                    current = content.to_string();
                }
            }
            _ => {}
        }
    }
    flush(&mut last_segment, &mut current);

    if let Some(candidate) = extract_json_object_candidate(&last_segment) {
        return serde_json::to_string_pretty(&candidate).unwrap_or(last_segment);
    }
    if let Some(candidate) = recovered {
        return serde_json::to_string_pretty(&candidate).unwrap_or_default();
    }
    last_segment
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_json_document_uses_response_field() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("raw_events.jsonl");
        std::fs::write(&path, r#"{"response": "final answer"}"#).unwrap();
        assert_eq!(extract_last_message_text(&path), "final answer");
    }

    #[test]
    fn coalesces_delta_assistant_messages() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("raw_events.jsonl");
        std::fs::write(
            &path,
            concat!(
                r#"{"type":"message","role":"assistant","content":"hel","delta":true}"#,
                "\n",
                r#"{"type":"message","role":"assistant","content":"lo","delta":true}"#,
                "\n",
            ),
        )
        .unwrap();
        assert_eq!(extract_last_message_text(&path), "hello");
    }

    #[test]
    fn recovers_json_from_fenced_code_block() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("raw_events.jsonl");
        std::fs::write(
            &path,
            concat!(
                r#"{"type":"message","role":"assistant","content":"```json\n{\"ok\":true}\n```","delta":false}"#,
                "\n",
            ),
        )
        .unwrap();
        let recovered: Value = serde_json::from_str(&extract_last_message_text(&path)).unwrap();
        assert_eq!(recovered["ok"], Value::Bool(true));
    }

    #[test]
    fn missing_file_yields_empty_string() {
        let path = PathBuf::from("/nonexistent/raw_events.jsonl");
        assert_eq!(extract_last_message_text(&path), "");
    }
}

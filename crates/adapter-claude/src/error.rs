// SPDX-License-Identifier: MIT OR Apache-2.0
//! Mapping of lower-level process/capture/jsonl errors into [`RunnerError`].

use runner_error::{ErrorCode, RunnerError};
use runner_process::ProcessError;

/// Translate a child-process driving failure into an `AgentLaunchFailed`-class
/// [`RunnerError`] carrying a Claude-specific install hint (spec §4.4
/// "failure to launch produces a specific `AgentLaunchFailed`-class error
/// with a per-agent install hint").
pub fn launch_failed(binary: &str, resolved: Option<&str>, source: ProcessError) -> RunnerError {
    RunnerError::new(
        ErrorCode::AgentLaunchFailed,
        format!("could not launch claude CLI process: {source}"),
        "ensure `claude` is installed and on PATH, or set agents.claude.binary to a full path",
    )
    .with_detail("binary", binary)
    .with_detail("resolved", resolved.unwrap_or(binary))
    .with_source(source)
}

/// Translate any other [`ProcessError`] (I/O failure mid-stream) into an
/// `AgentExecFailed`-class [`RunnerError`].
pub fn exec_failed(source: ProcessError) -> RunnerError {
    RunnerError::new(ErrorCode::AgentExecFailed, format!("claude process failed: {source}"), "inspect agent_stderr.txt for details")
        .with_source(source)
}

/// Substring Claude's provider surfaces in `agent_last_message.txt` when the
/// account has exhausted its plan allowance (spec §4.6, §8 scenario 3).
const QUOTA_MARKER: &str = "out of extra usage";

/// Scan Claude's last-message text for the provider quota-exhaustion phrase.
/// Returns `None` when the phrase is absent, so callers can fall back to the
/// ordinary non-zero-exit classification.
pub fn detect_quota_exceeded(last_message_text: &str) -> Option<RunnerError> {
    if !last_message_text.to_ascii_lowercase().contains(QUOTA_MARKER) {
        return None;
    }
    let provider_message = last_message_text.trim().to_string();
    let reset_time = parse_reset_time(last_message_text);
    let reset_summary = reset_time
        .as_ref()
        .and_then(|v| v.get("raw"))
        .and_then(|v| v.as_str())
        .unwrap_or("unknown");

    let mut err = RunnerError::new(
        ErrorCode::AgentQuotaExceeded,
        "claude reported it is out of extra usage for the current plan",
        "wait for the provider-reported reset time, or switch to a different account/plan before re-running",
    )
    .with_detail("subtype", "provider_quota_exceeded")
    .with_detail("code", "claude_out_of_extra_usage")
    .with_detail("provider_message", &provider_message)
    .with_detail("stderr_synthesized", true)
    .with_detail(
        "stderr",
        format!("[agent_quota_exceeded] {provider_message} reset_time={reset_summary}"),
    );
    if let Some(reset_time) = reset_time {
        err = err.with_detail("reset_time", reset_time);
    }
    Some(err)
}

/// Pull the `resets <raw> (<timezone>)` fragment out of the provider message,
/// e.g. `"Your plan resets Feb 24, 8pm (America/New_York)."`.
fn parse_reset_time(text: &str) -> Option<serde_json::Value> {
    let lower = text.to_ascii_lowercase();
    let start = lower.find("resets ")? + "resets ".len();
    let after = &text[start..];
    let paren = after.find('(').unwrap_or(after.len());
    let raw = after[..paren].trim().trim_end_matches('.').trim();
    if raw.is_empty() {
        return None;
    }
    let timezone = after[paren..]
        .strip_prefix('(')
        .and_then(|rest| rest.find(')').map(|end| rest[..end].trim().to_string()));

    let mut obj = serde_json::Map::new();
    obj.insert("raw".to_string(), serde_json::json!(raw));
    if let Some(timezone) = timezone {
        obj.insert("timezone".to_string(), serde_json::json!(timezone));
    }
    Some(serde_json::Value::Object(obj))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn launch_failed_carries_binary_and_resolved_details() {
        let source = ProcessError::MissingHandle("stdin");
        let err = launch_failed("claude", Some("/usr/local/bin/claude"), source);
        assert_eq!(err.code, ErrorCode::AgentLaunchFailed);
        assert_eq!(err.details["binary"], serde_json::json!("claude"));
        assert_eq!(err.details["resolved"], serde_json::json!("/usr/local/bin/claude"));
        assert!(!err.hint.is_empty());
    }

    #[test]
    fn detect_quota_exceeded_returns_none_without_marker() {
        assert!(detect_quota_exceeded("all good here").is_none());
    }

    #[test]
    fn detect_quota_exceeded_parses_provider_message_and_reset_time() {
        let text = "You are out of extra usage.\nYour plan resets Feb 24, 8pm (America/New_York).\n";
        let err = detect_quota_exceeded(text).expect("quota marker present");
        assert_eq!(err.code, ErrorCode::AgentQuotaExceeded);
        assert_eq!(err.details["code"], serde_json::json!("claude_out_of_extra_usage"));
        assert_eq!(err.details["subtype"], serde_json::json!("provider_quota_exceeded"));
        assert_eq!(err.details["provider_message"], serde_json::json!(text.trim()));
        assert_eq!(err.details["stderr_synthesized"], serde_json::json!(true));
        let reset_time = &err.details["reset_time"];
        assert_eq!(reset_time["raw"], serde_json::json!("Feb 24, 8pm"));
        assert_eq!(reset_time["timezone"], serde_json::json!("America/New_York"));
        let stderr = err.details["stderr"].as_str().unwrap();
        assert!(stderr.contains("[agent_quota_exceeded]"));
        assert!(stderr.to_lowercase().contains("out of extra usage"));
        assert!(stderr.contains("reset_time="));
    }

    #[test]
    fn detect_quota_exceeded_tolerates_missing_reset_time() {
        let err = detect_quota_exceeded("out of extra usage, no reset info available")
            .expect("quota marker present");
        assert!(!err.details.contains_key("reset_time"));
        let stderr = err.details["stderr"].as_str().unwrap();
        assert!(stderr.contains("reset_time=unknown"));
    }
}

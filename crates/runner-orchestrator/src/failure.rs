// SPDX-License-Identifier: MIT OR Apache-2.0
//! Failure classification glue (spec §4.6): turning a completed adapter
//! invocation or a missing/invalid report into the [`RunnerError`] that
//! drives `error.json`, including the quota-exceeded special case.

use runner_core::{AdapterRunResult, AgentId};
use runner_error::{ErrorCode, RunnerError};

use crate::invoke::detect_quota_exceeded;

/// Classify a completed (or cancelled) agent invocation into the
/// [`RunnerError`] that should terminate the pipeline, or `None` if the
/// agent succeeded and no quota marker was found.
///
/// Precedence (spec §4.6): cancellation first, then a provider-reported
/// quota marker (checked before the generic exit-code classification, since
/// `codex`/`claude` quota exhaustion often still exits non-zero with a
/// generic-looking message), then the generic `AgentExecFailed`.
pub fn classify_agent_outcome(agent: AgentId, result: &AdapterRunResult, last_message_text: &str, stderr_text: &str) -> Option<RunnerError> {
    if result.cancelled {
        return Some(
            RunnerError::new(ErrorCode::Cancelled, "run was cancelled before the agent finished", "re-run once the cancellation source (signal/timeout) is resolved")
                .with_detail("exit_code", result.exit_code),
        );
    }
    if result.exit_code == 0 {
        return None;
    }
    if let Some(quota_err) = detect_quota_exceeded(agent, last_message_text) {
        return Some(quota_err.with_detail("exit_code", result.exit_code));
    }
    Some(
        RunnerError::new(ErrorCode::AgentExecFailed, format!("{agent} exited {}", result.exit_code), "inspect agent_stderr.txt and raw_events.jsonl for details")
            .with_detail("exit_code", result.exit_code)
            .with_detail("stderr", truncate_stderr(stderr_text)),
    )
}

/// Build the `missing_report` error when no machine-readable report could
/// be recovered after a successful agent exit (spec §4.6, §4.7).
pub fn missing_report_error() -> RunnerError {
    RunnerError::new(
        ErrorCode::MissingReport,
        "agent exited successfully but no machine-readable report could be recovered",
        "check agent_last_message.txt and normalized_events.jsonl for the agent's final output",
    )
}

/// Build the `report_validation_error` error, carrying the JSONPath-rendered
/// validation errors so `finalize` can promote them onto
/// [`runner_error::StructuredError::report_validation_errors`] (spec §4.7 step 2).
pub fn report_validation_error(errors: Vec<String>) -> RunnerError {
    RunnerError::new(
        ErrorCode::ReportValidationError,
        format!("report failed mission schema validation ({} error(s))", errors.len()),
        "fix the agent's final report JSON to satisfy the mission's report_schema",
    )
    .with_detail("validation_errors", errors)
}

fn truncate_stderr(text: &str) -> String {
    runner_capture::truncate_text(text, runner_capture::INLINE_EXCERPT_BUDGET).0
}

// SPDX-License-Identifier: MIT OR Apache-2.0
//! Mapping of lower-level process/capture errors into [`RunnerError`], plus
//! the Codex-specific early-termination diagnostics (spec §4.4).

use runner_error::{ErrorCode, RunnerError};
use runner_process::ProcessError;

/// Translate a child-process driving failure into an `AgentLaunchFailed`-class
/// [`RunnerError`] carrying a Codex-specific install hint.
pub fn launch_failed(binary: &str, resolved: Option<&str>, source: ProcessError) -> RunnerError {
    RunnerError::new(
        ErrorCode::AgentLaunchFailed,
        format!("could not launch codex CLI process: {source}"),
        "ensure `codex` is installed and on PATH, or set agents.codex.binary to a full path",
    )
    .with_detail("binary", binary)
    .with_detail("resolved", resolved.unwrap_or(binary))
    .with_source(source)
}

/// Translate any other [`ProcessError`] (I/O failure mid-stream) into an
/// `AgentExecFailed`-class [`RunnerError`].
pub fn exec_failed(source: ProcessError) -> RunnerError {
    RunnerError::new(ErrorCode::AgentExecFailed, format!("codex process failed: {source}"), "inspect agent_stderr.txt for details")
        .with_source(source)
}

/// Build the `apply_patch_approval_request_denied` error raised when the raw
/// event stream asks for interactive patch approval (spec §4.4
/// "Adapter-specific early-termination policy"): the orchestrator runs
/// non-interactively, so such a request means the child would otherwise
/// deadlock waiting for a human.
pub fn apply_patch_approval_denied(call_id: Option<&str>) -> RunnerError {
    let mut err = RunnerError::new(
        ErrorCode::ApplyPatchApprovalRequestDenied,
        "codex requested interactive apply_patch approval during a non-interactive run",
        "set policy.approval_mode to a non-interactive value (e.g. `never` or `on-failure`), or widen the sandbox so codex does not need to ask",
    );
    if let Some(id) = call_id {
        err = err.with_detail("call_id", id);
    }
    err
}

/// Build the `refresh_token_reused` error raised when stderr shows Codex's
/// provider auth-refresh loop (spec §4.4): retrying would just spin forever,
/// so the adapter fails fast instead.
pub fn refresh_token_reused(stderr_excerpt: &str) -> RunnerError {
    RunnerError::new(
        ErrorCode::RefreshTokenReused,
        "codex reported a refresh_token_reused auth loop",
        "re-authenticate with `codex login` and re-run; a reused refresh token indicates a stale or concurrently-used credential",
    )
    .with_detail("stderr_excerpt", stderr_excerpt)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn launch_failed_carries_binary_and_resolved_details() {
        let source = ProcessError::MissingHandle("stdin");
        let err = launch_failed("codex", Some("/usr/local/bin/codex"), source);
        assert_eq!(err.code, ErrorCode::AgentLaunchFailed);
        assert_eq!(err.details["binary"], serde_json::json!("codex"));
        assert_eq!(err.details["resolved"], serde_json::json!("/usr/local/bin/codex"));
        assert!(!err.hint.is_empty());
    }

    #[test]
    fn apply_patch_approval_denied_carries_call_id() {
        let err = apply_patch_approval_denied(Some("call_42"));
        assert_eq!(err.code, ErrorCode::ApplyPatchApprovalRequestDenied);
        assert_eq!(err.details["call_id"], serde_json::json!("call_42"));
    }

    #[test]
    fn refresh_token_reused_has_nonempty_hint() {
        let err = refresh_token_reused("refresh_token_reused: retrying");
        assert_eq!(err.code, ErrorCode::RefreshTokenReused);
        assert!(!err.hint.is_empty());
    }
}

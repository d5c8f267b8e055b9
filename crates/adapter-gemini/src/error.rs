// SPDX-License-Identifier: MIT OR Apache-2.0
//! Mapping of lower-level process/capture errors into [`RunnerError`].

use runner_error::{ErrorCode, RunnerError};
use runner_process::ProcessError;

/// Translate a child-process driving failure into an `AgentLaunchFailed`-class
/// [`RunnerError`] carrying a Gemini-specific install hint.
pub fn launch_failed(binary: &str, resolved: Option<&str>, source: ProcessError) -> RunnerError {
    RunnerError::new(
        ErrorCode::AgentLaunchFailed,
        format!("could not launch gemini CLI process: {source}"),
        "ensure `gemini` is installed and on PATH, or set agents.gemini.binary to a full path",
    )
    .with_detail("binary", binary)
    .with_detail("resolved", resolved.unwrap_or(binary))
    .with_source(source)
}

/// Translate any other [`ProcessError`] (I/O failure mid-stream) into an
/// `AgentExecFailed`-class [`RunnerError`].
pub fn exec_failed(source: ProcessError) -> RunnerError {
    RunnerError::new(ErrorCode::AgentExecFailed, format!("gemini process failed: {source}"), "inspect agent_stderr.txt for details")
        .with_source(source)
}

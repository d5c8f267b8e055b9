// SPDX-License-Identifier: MIT OR Apache-2.0
//! The verification gate (spec §4.7 step 3): run operator-supplied shell
//! commands through the same backend command-prefix, honoring the literal
//! `rejected` sentinel and persisting per-command output.

use std::path::Path;

use runner_backend::{ExecutionBackend, ShellFamily, effective_shell_family};
use runner_capture::truncate_text;
use runner_error::{ErrorCode, RunnerError};
use runner_process::{CancelToken, ProcessSpec, run_streaming};
use serde::Serialize;

/// Whole-artifact capture budget for verification stdout/stderr.
const VERIFY_CAPTURE_BUDGET_BYTES: usize = 64 * 1024;

/// Outcome of one verification command.
#[derive(Debug, Clone, Serialize)]
pub struct VerificationAttempt {
    /// 1-based index within this run's single attempt.
    pub index: u32,
    /// The command exactly as given on the CLI.
    pub original_command: String,
    /// The argv actually executed (after any platform rewrite).
    pub effective_argv: Vec<String>,
    /// Exit code, or `126` for a rejected-sentinel command that was never run.
    pub exit_code: i32,
    /// True iff this command was the literal `rejected` sentinel.
    pub rejected_sentinel: bool,
}

/// Run every `verify` command in order, persisting
/// `verification/attempt1/cmd_NN.{stdout,stderr}.txt` for each, and return
/// the per-command outcomes plus the first failure (if any), per spec
/// §4.7/§4.8 "final exit code reflects the first failure".
pub async fn run_verification(
    commands: &[String],
    backend: &dyn ExecutionBackend,
    run_dir: &Path,
    cancel: &CancelToken,
) -> Result<Vec<VerificationAttempt>, RunnerError> {
    if commands.is_empty() {
        return Ok(Vec::new());
    }

    let attempt_dir = run_dir.join("verification").join("attempt1");
    std::fs::create_dir_all(&attempt_dir).map_err(|e| {
        RunnerError::new(ErrorCode::VerificationFailed, format!("failed to create verification/attempt1: {e}"), "check run directory permissions")
    })?;

    let is_container = !backend.command_prefix().is_empty();
    let shell_family = effective_shell_family(is_container);

    let mut attempts = Vec::with_capacity(commands.len());
    let mut first_failure: Option<RunnerError> = None;

    for (idx, command) in commands.iter().enumerate() {
        let index = idx as u32 + 1;

        if is_rejected_sentinel(command) {
            write_capture(&attempt_dir, index, "", "[rejected_sentinel] operator rejected this run; command was not executed")?;
            attempts.push(VerificationAttempt {
                index,
                original_command: command.clone(),
                effective_argv: Vec::new(),
                exit_code: 126,
                rejected_sentinel: true,
            });
            if first_failure.is_none() {
                first_failure = Some(
                    RunnerError::new(
                        ErrorCode::RejectedSentinel,
                        "verification command was the literal 'rejected' sentinel",
                        "this run was explicitly rejected by an operator-supplied verification command",
                    )
                    .with_detail("rejected_sentinel", true)
                    .with_detail("exit_code", 126),
                );
            }
            continue;
        }

        let shell_argv = match shell_family {
            ShellFamily::Bash => vec!["bash".to_string(), "-c".to_string(), command.clone()],
            ShellFamily::PowerShell => vec!["powershell".to_string(), "-Command".to_string(), command.clone()],
        };
        let full_argv = backend.build_argv(&std::collections::BTreeMap::new(), &shell_argv);
        let spec = ProcessSpec::new(full_argv.clone(), backend.workspace_mount());

        let mut stdout_buf = String::new();
        let outcome = run_streaming(
            spec,
            |line| {
                stdout_buf.push_str(line);
                stdout_buf.push('\n');
            },
            cancel,
            None,
        )
        .await
        .map_err(|e| {
            RunnerError::new(ErrorCode::VerificationFailed, format!("failed to run verification command '{command}': {e}"), "check that the verification command is runnable on this host")
        })?;

        let stderr_text = String::from_utf8_lossy(&outcome.stderr).into_owned();
        write_capture(&attempt_dir, index, &stdout_buf, &stderr_text)?;

        attempts.push(VerificationAttempt {
            index,
            original_command: command.clone(),
            effective_argv: full_argv,
            exit_code: outcome.exit_code,
            rejected_sentinel: false,
        });

        if outcome.exit_code != 0 && first_failure.is_none() {
            first_failure = Some(
                RunnerError::new(
                    ErrorCode::VerificationFailed,
                    format!("verification command '{command}' exited {}", outcome.exit_code),
                    "inspect verification/attempt1/ for the failing command's captured output",
                )
                .with_detail("exit_code", outcome.exit_code)
                .with_detail("stderr", truncate_for_detail(&stderr_text)),
            );
        }
    }

    match first_failure {
        Some(err) => Err(err.with_detail("attempts", serde_json::to_value(&attempts).unwrap_or_default())),
        None => Ok(attempts),
    }
}

/// True iff `command`, after trimming whitespace and one layer of matching
/// quotes, is exactly the literal token `rejected`.
fn is_rejected_sentinel(command: &str) -> bool {
    let trimmed = command.trim();
    let unquoted = trimmed
        .strip_prefix('"')
        .and_then(|s| s.strip_suffix('"'))
        .or_else(|| trimmed.strip_prefix('\'').and_then(|s| s.strip_suffix('\'')))
        .unwrap_or(trimmed);
    unquoted.trim() == "rejected"
}

fn write_capture(attempt_dir: &Path, index: u32, stdout: &str, stderr: &str) -> Result<(), RunnerError> {
    let (stdout_excerpt, _) = truncate_text(stdout, VERIFY_CAPTURE_BUDGET_BYTES);
    let (stderr_excerpt, _) = truncate_text(stderr, VERIFY_CAPTURE_BUDGET_BYTES);
    std::fs::write(attempt_dir.join(format!("cmd_{index:02}.stdout.txt")), stdout_excerpt).map_err(io_err)?;
    std::fs::write(attempt_dir.join(format!("cmd_{index:02}.stderr.txt")), stderr_excerpt).map_err(io_err)?;
    Ok(())
}

fn truncate_for_detail(text: &str) -> String {
    truncate_text(text, 2000).0
}

fn io_err(source: std::io::Error) -> RunnerError {
    RunnerError::new(ErrorCode::VerificationFailed, format!("failed to write verification artifact: {source}"), "check run directory permissions")
}

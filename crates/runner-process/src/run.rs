// SPDX-License-Identifier: MIT OR Apache-2.0
//! Spawn a child process, feed it a prompt over stdin, and stream its stdout
//! line-by-line into a caller-supplied sink while capturing stderr in full
//! (spec §4.4 adapter contract, §5 concurrency model).

use std::process::Stdio;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::process::Command;

use crate::cancel::CancelToken;
use crate::error::ProcessError;
use crate::spec::ProcessSpec;

/// Outcome of one child-process invocation.
#[derive(Debug, Clone)]
pub struct ProcessOutcome {
    /// Process exit code, or `-1` when the process was killed by a signal
    /// before it could report one.
    pub exit_code: i32,
    /// Full captured stderr bytes.
    pub stderr: Vec<u8>,
    /// True if the run ended because `cancel` was signalled rather than the
    /// child exiting on its own.
    pub cancelled: bool,
    /// True if the run ended because the optional timeout elapsed.
    pub timed_out: bool,
}

/// Spawn `spec.argv[0]` with the rest as arguments, write `spec.stdin_text`
/// (if any) and close stdin, then stream stdout lines to `on_stdout_line` in
/// the order the child emits them (spec §3 invariant: "`raw_events.jsonl`
/// lines are written in the order the child emits them").
///
/// Cancellation kills the immediate child process; it does not track or
/// signal any grandchild processes the agent CLI itself may have spawned.
pub async fn run_streaming<F>(
    spec: ProcessSpec,
    mut on_stdout_line: F,
    cancel: &CancelToken,
    timeout: Option<Duration>,
) -> Result<ProcessOutcome, ProcessError>
where
    F: FnMut(&str),
{
    let (program, rest) = spec
        .argv
        .split_first()
        .ok_or(ProcessError::MissingHandle("empty argv"))?;

    let mut command = Command::new(program);
    command
        .args(rest)
        .current_dir(&spec.cwd)
        .envs(&spec.env)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let mut child = command
        .spawn()
        .map_err(|source| ProcessError::Launch { binary: program.clone(), source })?;

    let mut stdin = child.stdin.take().ok_or(ProcessError::MissingHandle("stdin"))?;
    let stdout = child.stdout.take().ok_or(ProcessError::MissingHandle("stdout"))?;
    let mut stderr = child.stderr.take().ok_or(ProcessError::MissingHandle("stderr"))?;

    let stdin_text = spec.stdin_text.clone().unwrap_or_default();
    let stdin_task = tokio::spawn(async move {
        if !stdin_text.is_empty() {
            let _ = stdin.write_all(stdin_text.as_bytes()).await;
        }
        let _ = stdin.shutdown().await;
    });

    let stderr_task = tokio::spawn(async move {
        let mut buf = Vec::new();
        let _ = stderr.read_to_end(&mut buf).await;
        buf
    });

    let mut lines = BufReader::new(stdout).lines();
    let sleep = async {
        match timeout {
            Some(d) => tokio::time::sleep(d).await,
            None => std::future::pending::<()>().await,
        }
    };
    tokio::pin!(sleep);

    let mut cancelled = false;
    let mut timed_out = false;

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                cancelled = true;
                break;
            }
            _ = &mut sleep => {
                timed_out = true;
                break;
            }
            line = lines.next_line() => {
                match line {
                    Ok(Some(text)) => on_stdout_line(&text),
                    Ok(None) => break,
                    Err(e) => return Err(ProcessError::Io(e)),
                }
            }
        }
    }

    if cancelled || timed_out {
        let _ = child.start_kill();
    }

    let _ = stdin_task.await;
    let stderr_bytes = stderr_task.await.unwrap_or_default();
    let status = child.wait().await?;

    Ok(ProcessOutcome {
        exit_code: status.code().unwrap_or(-1),
        stderr: stderr_bytes,
        cancelled,
        timed_out,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[tokio::test]
    async fn captures_stdout_lines_in_order() {
        let spec = ProcessSpec::new(
            vec!["printf".to_string(), "a\\nb\\nc\\n".to_string()],
            std::env::temp_dir(),
        );
        let mut lines = Vec::new();
        let cancel = CancelToken::new();
        let outcome = run_streaming(spec, |l| lines.push(l.to_string()), &cancel, None)
            .await
            .unwrap();
        assert_eq!(outcome.exit_code, 0);
        assert_eq!(lines, vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn feeds_stdin_text_to_child() {
        let spec = ProcessSpec::new(vec!["cat".to_string()], std::env::temp_dir())
            .with_stdin("hello from orchestrator");
        let mut lines = Vec::new();
        let cancel = CancelToken::new();
        let outcome = run_streaming(spec, |l| lines.push(l.to_string()), &cancel, None)
            .await
            .unwrap();
        assert_eq!(outcome.exit_code, 0);
        assert_eq!(lines, vec!["hello from orchestrator"]);
    }

    #[tokio::test]
    async fn captures_nonzero_exit_and_stderr() {
        let spec = ProcessSpec::new(
            vec!["sh".to_string(), "-c".to_string(), "echo boom 1>&2; exit 3".to_string()],
            std::env::temp_dir(),
        );
        let cancel = CancelToken::new();
        let outcome = run_streaming(spec, |_| {}, &cancel, None).await.unwrap();
        assert_eq!(outcome.exit_code, 3);
        assert_eq!(String::from_utf8_lossy(&outcome.stderr).trim(), "boom");
    }

    #[tokio::test]
    async fn cancellation_kills_long_running_child() {
        let spec = ProcessSpec::new(
            vec!["sleep".to_string(), "30".to_string()],
            std::env::temp_dir(),
        );
        let cancel = CancelToken::new();
        let cancel_clone = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            cancel_clone.cancel();
        });
        let outcome = run_streaming(spec, |_| {}, &cancel, None).await.unwrap();
        assert!(outcome.cancelled);
    }

    #[tokio::test]
    async fn launch_failure_is_reported() {
        let spec = ProcessSpec::new(
            vec!["definitely-not-a-real-binary-xyz".to_string()],
            std::env::temp_dir(),
        );
        let cancel = CancelToken::new();
        let err = run_streaming(spec, |_| {}, &cancel, None).await.unwrap_err();
        assert!(matches!(err, ProcessError::Launch { .. }));
    }

    #[test]
    fn process_spec_builder_sets_env_and_stdin() {
        let mut env = BTreeMap::new();
        env.insert("A".to_string(), "1".to_string());
        let spec = ProcessSpec::new(vec!["true".to_string()], "/tmp")
            .with_env(env.clone())
            .with_stdin("prompt");
        assert_eq!(spec.env, env);
        assert_eq!(spec.stdin_text.as_deref(), Some("prompt"));
    }
}

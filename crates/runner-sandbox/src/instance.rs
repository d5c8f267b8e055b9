// SPDX-License-Identifier: MIT OR Apache-2.0
//! Container lifecycle: daemon reachability preflight, image build, long-
//! lived container start, the `ExecutionBackend` implementation, and
//! teardown diagnostics capture (spec §4.3.b).

use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

use runner_backend::{EnvPlan, ExecutionBackend};
use runner_error::{ErrorCode, RunnerError};
use runner_process::{CancelToken, ProcessSpec, run_streaming};

/// Backend metadata persisted as `sandbox/sandbox.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SandboxMeta {
    /// Name of the running container.
    pub container_name: String,
    /// Env-var keys this sandbox allows to cross the `docker exec` boundary.
    pub env_allowlist: Vec<String>,
    /// Absolute path the workspace is bind-mounted to inside the container.
    pub workspace_mount: PathBuf,
    /// Content-addressed image tag used to start the container.
    pub image_tag: String,
}

async fn run_docker(argv: Vec<String>) -> Result<(String, String, i32), RunnerError> {
    let spec = ProcessSpec::new(argv.clone(), std::env::temp_dir());
    let cancel = CancelToken::new();
    let mut stdout = String::new();
    let outcome = run_streaming(
        spec,
        |line| {
            stdout.push_str(line);
            stdout.push('\n');
        },
        &cancel,
        None,
    )
    .await
    .map_err(|e| {
        RunnerError::new(
            ErrorCode::DockerUnavailable,
            format!("failed to run '{}': {e}", argv.join(" ")),
            "ensure the docker CLI is installed and on PATH",
        )
    })?;
    let stderr = String::from_utf8_lossy(&outcome.stderr).into_owned();
    Ok((stdout, stderr, outcome.exit_code))
}

/// Verify the docker daemon is reachable, before any build is attempted
/// (spec §4.3.b "ensure docker daemon is reachable before building").
///
/// # Errors
///
/// Returns [`RunnerError`] with [`ErrorCode::DockerUnavailable`] if `docker
/// info` cannot be run or exits non-zero.
pub async fn ensure_docker_daemon_reachable() -> Result<(), RunnerError> {
    let (_, stderr, exit_code) =
        run_docker(vec!["docker".to_string(), "info".to_string()]).await?;
    if exit_code != 0 {
        return Err(RunnerError::new(
            ErrorCode::DockerUnavailable,
            format!("'docker info' exited {exit_code}: {stderr}"),
            "start the docker daemon (or docker desktop) before running with --exec-backend docker",
        )
        .with_detail("stderr", stderr));
    }
    Ok(())
}

/// Build `context_dir` into an image tagged `tag`, streaming combined
/// stdout/stderr to `build_log_path` (spec §4.3.b "stream build output to
/// `docker_build.log`").
///
/// # Errors
///
/// Returns [`RunnerError`] with [`ErrorCode::ImageBuildFailed`] if the build
/// exits non-zero or the log file cannot be written.
pub async fn build_image(context_dir: &Path, tag: &str, build_log_path: &Path) -> Result<(), RunnerError> {
    let argv = vec![
        "docker".to_string(),
        "build".to_string(),
        "-t".to_string(),
        tag.to_string(),
        context_dir.to_string_lossy().into_owned(),
    ];
    let (stdout, stderr, exit_code) = run_docker(argv).await?;

    let mut log = std::fs::File::create(build_log_path).map_err(|e| {
        RunnerError::new(
            ErrorCode::ImageBuildFailed,
            format!("failed to create docker_build.log: {e}"),
            "ensure the run directory is writable",
        )
    })?;
    let _ = write!(log, "{stdout}{stderr}");

    if exit_code != 0 {
        return Err(RunnerError::new(
            ErrorCode::ImageBuildFailed,
            format!("'docker build' exited {exit_code}"),
            "inspect sandbox/docker_build.log for the failing build step",
        ));
    }
    Ok(())
}

/// Start a long-lived container bind-mounting `workspace_host_dir` at
/// `workspace_mount` (spec §4.3.b "start a long-lived container with a
/// bind-mounted workspace and an env allowlist").
///
/// # Errors
///
/// Returns [`RunnerError`] with [`ErrorCode::ContainerStartFailed`] if
/// `docker run` exits non-zero.
pub async fn start_container(
    image_tag: &str,
    workspace_host_dir: &Path,
    workspace_mount: &Path,
    container_name: &str,
    env_allowlist: Vec<String>,
) -> Result<SandboxInstance, RunnerError> {
    let mount_arg = format!(
        "{}:{}",
        workspace_host_dir.to_string_lossy(),
        workspace_mount.to_string_lossy()
    );
    let argv = vec![
        "docker".to_string(),
        "run".to_string(),
        "-d".to_string(),
        "--rm".to_string(),
        "--name".to_string(),
        container_name.to_string(),
        "-v".to_string(),
        mount_arg,
        "-w".to_string(),
        workspace_mount.to_string_lossy().into_owned(),
        image_tag.to_string(),
        "tail".to_string(),
        "-f".to_string(),
        "/dev/null".to_string(),
    ];
    let (_, stderr, exit_code) = run_docker(argv).await?;
    if exit_code != 0 {
        return Err(RunnerError::new(
            ErrorCode::ContainerStartFailed,
            format!("'docker run' exited {exit_code}: {stderr}"),
            "check the image entrypoint and docker daemon logs",
        )
        .with_detail("stderr", stderr));
    }

    Ok(SandboxInstance {
        container_name: container_name.to_string(),
        workspace_mount: workspace_mount.to_path_buf(),
        command_prefix: vec![
            "docker".to_string(),
            "exec".to_string(),
            "-i".to_string(),
            "-w".to_string(),
            workspace_mount.to_string_lossy().into_owned(),
            container_name.to_string(),
        ],
        env_allowlist,
        image_tag: image_tag.to_string(),
    })
}

/// A running, bind-mounted sandbox container (spec §3 `SandboxInstance`).
pub struct SandboxInstance {
    container_name: String,
    workspace_mount: PathBuf,
    command_prefix: Vec<String>,
    env_allowlist: Vec<String>,
    image_tag: String,
}

impl SandboxInstance {
    /// Metadata describing this instance, for `sandbox/sandbox.json`.
    #[must_use]
    pub fn meta(&self) -> SandboxMeta {
        SandboxMeta {
            container_name: self.container_name.clone(),
            env_allowlist: self.env_allowlist.clone(),
            workspace_mount: self.workspace_mount.clone(),
            image_tag: self.image_tag.clone(),
        }
    }

    /// Capture `docker logs` and a redacted `docker inspect` for this
    /// container into `dest_dir` as `container_logs.txt` and
    /// `container_inspect.json` (spec §4.3.b teardown diagnostics).
    ///
    /// Best-effort: failures to capture diagnostics are logged, not
    /// propagated, since they run during an already-failing teardown path.
    pub async fn capture_diagnostics(&self, dest_dir: &Path) {
        if let Ok((stdout, stderr, _)) =
            run_docker(vec!["docker".to_string(), "logs".to_string(), self.container_name.clone()]).await
        {
            let _ = std::fs::write(dest_dir.join("container_logs.txt"), format!("{stdout}{stderr}"));
        } else {
            warn!(container = %self.container_name, "failed to capture docker logs");
        }

        if let Ok((stdout, _, exit_code)) = run_docker(vec![
            "docker".to_string(),
            "inspect".to_string(),
            self.container_name.clone(),
        ])
        .await
        {
            if exit_code == 0 {
                if let Ok(mut inspect) = serde_json::from_str::<Value>(&stdout) {
                    redact_inspect_env(&mut inspect, &self.env_allowlist);
                    if let Ok(pretty) = serde_json::to_string_pretty(&inspect) {
                        let _ = std::fs::write(dest_dir.join("container_inspect.json"), pretty);
                    }
                }
            }
        }
    }
}

#[async_trait]
impl ExecutionBackend for SandboxInstance {
    fn command_prefix(&self) -> &[String] {
        &self.command_prefix
    }

    fn workspace_mount(&self) -> &Path {
        &self.workspace_mount
    }

    fn plan_env(&self, overrides: &BTreeMap<String, String>) -> EnvPlan {
        let filtered: BTreeMap<String, String> = overrides
            .iter()
            .filter(|(k, _)| {
                let allowed = self.env_allowlist.iter().any(|a| a == *k);
                if !allowed {
                    warn!(key = %k, "dropping env override not in sandbox allowlist");
                }
                allowed
            })
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        EnvPlan { process_env: BTreeMap::new(), prefix_flags: EnvPlan::container_exec_flags(&filtered) }
    }

    async fn close(self: Box<Self>) -> Result<(), RunnerError> {
        let (_, stderr, exit_code) = run_docker(vec![
            "docker".to_string(),
            "rm".to_string(),
            "-f".to_string(),
            self.container_name.clone(),
        ])
        .await?;
        if exit_code != 0 {
            return Err(RunnerError::new(
                ErrorCode::ContainerStartFailed,
                format!("'docker rm -f {}' exited {exit_code}: {stderr}", self.container_name),
                "manually remove the leaked container with `docker rm -f`",
            ));
        }
        Ok(())
    }
}

/// Redact every env var value in a `docker inspect` document's
/// `Config.Env` array whose key is in `allowlist` (spec §4.3.b "any
/// env-variable whose key is in the allowlist is redacted in the inspect
/// artifact").
fn redact_inspect_env(inspect: &mut Value, allowlist: &[String]) {
    let Some(containers) = inspect.as_array_mut() else { return };
    for container in containers {
        let Some(env) = container
            .get_mut("Config")
            .and_then(|c| c.get_mut("Env"))
            .and_then(|e| e.as_array_mut())
        else {
            continue;
        };
        for entry in env.iter_mut() {
            let Some(s) = entry.as_str() else { continue };
            if let Some((key, _)) = s.split_once('=') {
                if allowlist.iter().any(|a| a == key) {
                    *entry = Value::String(format!("{key}=***redacted***"));
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn redacts_only_allowlisted_keys() {
        let mut inspect = json!([{
            "Config": {
                "Env": ["PATH=/usr/bin", "SECRET_TOKEN=abc123", "OTHER=visible"]
            }
        }]);
        redact_inspect_env(&mut inspect, &["SECRET_TOKEN".to_string()]);
        let env = inspect[0]["Config"]["Env"].as_array().unwrap();
        assert_eq!(env[0], "PATH=/usr/bin");
        assert_eq!(env[1], "SECRET_TOKEN=***redacted***");
        assert_eq!(env[2], "OTHER=visible");
    }

    #[test]
    fn redact_is_noop_when_no_env_present() {
        let mut inspect = json!([{ "Config": {} }]);
        redact_inspect_env(&mut inspect, &["ANY".to_string()]);
        assert_eq!(inspect, json!([{ "Config": {} }]));
    }
}

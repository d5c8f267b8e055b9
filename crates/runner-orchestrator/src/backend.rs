// SPDX-License-Identifier: MIT OR Apache-2.0
//! `prepare_backend` (spec §4.3, §4.8): turn a [`RunRequest`]'s
//! `exec_backend` choice into a boxed [`ExecutionBackend`], materializing a
//! sandbox container for the Docker path.

use std::path::Path;

use runner_backend::{ExecutionBackend, LocalBackend};
use runner_core::{AcquiredTarget, ExecBackendKind, RunRequest, RunnerConfig};
use runner_error::{ErrorCode, RunnerError};
use runner_sandbox::{
    InstallOverlay, build_image, compute_context_digest, ensure_docker_daemon_reachable, image_tag, merge_overlays,
    parse_overlay_manifest, select_python_base, start_container,
};
use uuid::Uuid;

use crate::atomic::write_json;

/// The name of a target-provided install-overlay manifest, read from the
/// acquired workspace root when present (spec §4.3.b).
const OVERLAY_MANIFEST_RELPATH: &str = ".runner/sandbox-overlay.toml";

/// Build the execution backend for this run (spec §4.3.a/§4.3.b).
///
/// For `ExecBackendKind::Local`, this is a thin, infallible wrapper around
/// the acquired target's own directory. For `ExecBackendKind::Docker`, this
/// drives the full content-addressed image build and container start
/// sequence documented on `runner_sandbox`'s crate root, persisting the
/// `sandbox/` artifact subdirectory as it goes.
pub async fn prepare_backend(
    request: &RunRequest,
    config: &RunnerConfig,
    target: &AcquiredTarget,
    run_dir: &Path,
) -> Result<Box<dyn ExecutionBackend>, RunnerError> {
    match request.exec_backend {
        ExecBackendKind::Local => Ok(Box::new(LocalBackend::new(target.root.clone()))),
        ExecBackendKind::Docker => prepare_docker_backend(request, config, target, run_dir).await,
    }
}

async fn prepare_docker_backend(
    request: &RunRequest,
    config: &RunnerConfig,
    target: &AcquiredTarget,
    run_dir: &Path,
) -> Result<Box<dyn ExecutionBackend>, RunnerError> {
    let context_dir = request.exec_docker_context.as_deref().ok_or_else(|| {
        RunnerError::new(
            ErrorCode::InvalidRunSpec,
            "exec_backend=docker requires exec_docker_context",
            "pass --exec-docker-context pointing at a directory containing a Dockerfile",
        )
    })?;

    let sandbox_dir = run_dir.join("sandbox");
    std::fs::create_dir_all(&sandbox_dir).map_err(|e| workspace_io_error(&sandbox_dir, e))?;

    ensure_docker_daemon_reachable().await?;

    let digest = compute_context_digest(context_dir)?;
    let repo_slug = runner_core::target_slug(&request.repo_input);
    let tag = image_tag(&repo_slug, &digest);

    let dockerfile_path = context_dir.join("Dockerfile");
    let dockerfile_text = std::fs::read_to_string(&dockerfile_path).unwrap_or_default();
    let requires_python = std::fs::read_to_string(target.root.join("pyproject.toml"))
        .ok()
        .and_then(|text| runner_sandbox::parse_requires_python(&text));
    let (rewritten_dockerfile, python_selection) = select_python_base(requires_python.as_deref(), &dockerfile_text);
    write_json(&sandbox_dir.join("python_selection.json"), &python_selection)?;

    let base_overlay = InstallOverlay::default();
    let target_overlay = std::fs::read_to_string(target.root.join(OVERLAY_MANIFEST_RELPATH))
        .ok()
        .map(|text| parse_overlay_manifest(&text))
        .transpose()?
        .unwrap_or_default();
    let merged_overlay = merge_overlays(&base_overlay, &target_overlay)?;
    write_json(&sandbox_dir.join("sandbox_cli_install.json"), &merged_overlay)?;

    let image_context_dir = sandbox_dir.join("image_context");
    materialize_image_context(context_dir, &image_context_dir, &rewritten_dockerfile)?;

    let build_log_path = sandbox_dir.join("docker_build.log");
    build_image(&image_context_dir, &tag, &build_log_path).await?;

    let container_name = format!("runner-{}", Uuid::new_v4().simple());
    let workspace_mount = Path::new("/workspace");
    let env_allowlist = agent_env_allowlist(config, request);

    let instance = start_container(&tag, &target.root, workspace_mount, &container_name, env_allowlist).await?;

    write_json(&sandbox_dir.join("sandbox.json"), &instance.meta())?;

    Ok(Box::new(instance))
}

/// Copy `context_dir` into `dest` (the persisted `sandbox/image_context/`
/// artifact) and overwrite its `Dockerfile` with the python-base-rewritten
/// text, so the image actually built matches what's on disk for diagnosis.
fn materialize_image_context(context_dir: &Path, dest: &Path, rewritten_dockerfile: &str) -> Result<(), RunnerError> {
    copy_dir_recursive(context_dir, dest).map_err(|e| workspace_io_error(dest, e))?;
    let dockerfile_dest = dest.join("Dockerfile");
    std::fs::write(&dockerfile_dest, rewritten_dockerfile).map_err(|e| workspace_io_error(&dockerfile_dest, e))?;
    Ok(())
}

fn copy_dir_recursive(src: &Path, dest: &Path) -> std::io::Result<()> {
    std::fs::create_dir_all(dest)?;
    for entry in std::fs::read_dir(src)? {
        let entry = entry?;
        let file_type = entry.file_type()?;
        let dest_path = dest.join(entry.file_name());
        if file_type.is_dir() {
            copy_dir_recursive(&entry.path(), &dest_path)?;
        } else if file_type.is_file() {
            std::fs::copy(entry.path(), &dest_path)?;
        }
    }
    Ok(())
}

/// The sandbox's `docker exec -e` allowlist: the variable names (not
/// values) configured for this run's agent, so `EnvPlan::plan_env` can admit
/// exactly the overrides the operator configured and silently drop anything
/// else (spec §4.3.b "env allowlist").
fn agent_env_allowlist(config: &RunnerConfig, request: &RunRequest) -> Vec<String> {
    let mut allowlist: Vec<String> = config.agent_config(request.agent).env.keys().cloned().collect();
    allowlist.sort();
    allowlist.dedup();
    allowlist
}

fn workspace_io_error(path: &Path, source: std::io::Error) -> RunnerError {
    RunnerError::new(
        ErrorCode::WorkspaceIoError,
        format!("filesystem error preparing sandbox at {}: {source}", path.display()),
        "check filesystem permissions and free space under the run directory",
    )
    .with_source(source)
}

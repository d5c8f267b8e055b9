// SPDX-License-Identifier: MIT OR Apache-2.0
//! Pre-invocation capability checks (spec §2 `preflight`, §4.1 `requires_shell`).
//!
//! Docker-context reachability is already checked inside
//! [`crate::backend::prepare_backend`] when the exec backend is a
//! container, so this stage only covers the one capability gap a local
//! backend can hit: a mission whose mission file declares
//! `requires_shell: true` cannot run against a native Windows local backend,
//! because the agent adapters build POSIX shell one-liners
//! (`ShellFamily::Bash`) for tool invocations.

use runner_backend::{effective_shell_family, ShellFamily};
use runner_core::{EffectiveRunSpec, ExecBackendKind};
use runner_error::{ErrorCode, RunnerError};

/// Reject run requests whose mission needs shell tooling the effective
/// execution backend cannot provide.
pub fn check(exec_backend: ExecBackendKind, effective_spec: &EffectiveRunSpec) -> Result<(), RunnerError> {
    if !effective_spec.requires_shell {
        return Ok(());
    }
    let is_container = matches!(exec_backend, ExecBackendKind::Docker);
    if effective_shell_family(is_container) == ShellFamily::PowerShell {
        return Err(RunnerError::new(
            ErrorCode::AgentPreflightFailed,
            format!(
                "mission `{}` requires POSIX shell tooling, but the local backend on this host runs PowerShell",
                effective_spec.mission_id
            ),
            "rerun with --exec-backend docker, or run this mission from a POSIX host",
        ));
    }
    Ok(())
}

//! The execution-backend contract (spec §4.3): the only coupling between the
//! agent adapters and whichever backend (local subprocess vs. containerized
//! sandbox) actually runs the child process.
//!
//! A backend exposes an opaque `command_prefix` that every adapter prepends
//! to its local argv, a `workspace_mount` path the adapter renders prompts
//! and reads/writes relative to, and an environment-injection strategy: local
//! backends merge overrides into the child's environment directly, while a
//! `docker exec` backend must instead splice them in as `-e KEY=VALUE` flags
//! (host-process env does not cross the `docker exec` boundary). Adding a new
//! backend means producing a prefix + workspace mount; no adapter code
//! changes (spec §9 "Backend polymorphism").

#![deny(unsafe_code)]
#![warn(missing_docs)]

use async_trait::async_trait;
use runner_error::RunnerError;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// How environment overrides reach the child process, resolved once per
/// backend and used identically by every adapter.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnvPlan {
    /// Variables merged directly into the local child process's environment.
    pub process_env: BTreeMap<String, String>,
    /// `-e KEY=VALUE` flags to splice into argv immediately before the
    /// container-name token, in sorted-key order (spec §8 invariant 9).
    pub prefix_flags: Vec<String>,
}

impl EnvPlan {
    /// Build the sorted `-e KEY=VALUE` flag sequence for a container-exec
    /// backend. Deterministic ordering makes two runs with the same
    /// overrides produce byte-identical argv (spec §4.3.b).
    pub fn container_exec_flags(overrides: &BTreeMap<String, String>) -> Vec<String> {
        overrides
            .iter()
            .flat_map(|(k, v)| ["-e".to_string(), format!("{k}={v}")])
            .collect()
    }
}

/// The opaque command-prefix contract: a list of argv tokens every caller
/// spawning a process during the run prepends to its local argv (spec §4.3
/// "Command-prefix contract").
#[async_trait]
pub trait ExecutionBackend: Send + Sync {
    /// Opaque argv prefix to prepend before any child-process argv. Empty
    /// for the local backend; `["docker","exec","-i","-w",<mount>,<name>]`
    /// for the container backend.
    fn command_prefix(&self) -> &[String];

    /// Absolute path the adapter should treat as the workspace root when
    /// rendering paths relative to it (the bind-mount target for containers,
    /// the acquired target's own root for the local backend).
    fn workspace_mount(&self) -> &Path;

    /// Resolve how `overrides` should reach the child process for this
    /// backend: merged into the host env, or spliced as `-e` prefix flags.
    fn plan_env(&self, overrides: &BTreeMap<String, String>) -> EnvPlan;

    /// Full argv for one child-process invocation: `command_prefix` plus any
    /// env prefix flags plus the adapter's own argv.
    fn build_argv(&self, overrides: &BTreeMap<String, String>, argv: &[String]) -> Vec<String> {
        let plan = self.plan_env(overrides);
        let mut out = self.command_prefix().to_vec();
        // Container backends keep the container-name token last in their
        // prefix; env flags are inserted immediately before it.
        if !plan.prefix_flags.is_empty() {
            if let Some(last) = out.pop() {
                out.extend(plan.prefix_flags);
                out.push(last);
            } else {
                out.extend(plan.prefix_flags);
            }
        }
        out.extend_from_slice(argv);
        out
    }

    /// Tear down the backend's resources. Always called exactly once, on
    /// every exit path (spec §3 invariant: "a started `SandboxInstance` is
    /// always closed before the run directory is finalized").
    async fn close(self: Box<Self>) -> Result<(), RunnerError>;
}

/// The local execution backend (spec §4.3.a): the agent runs as a direct
/// child process of the orchestrator, with no command prefix.
pub struct LocalBackend {
    workspace: PathBuf,
}

impl LocalBackend {
    /// Construct a local backend rooted at the acquired target's own directory.
    pub fn new(workspace: impl Into<PathBuf>) -> Self {
        Self { workspace: workspace.into() }
    }
}

#[async_trait]
impl ExecutionBackend for LocalBackend {
    fn command_prefix(&self) -> &[String] {
        &[]
    }

    fn workspace_mount(&self) -> &Path {
        &self.workspace
    }

    fn plan_env(&self, overrides: &BTreeMap<String, String>) -> EnvPlan {
        EnvPlan { process_env: overrides.clone(), prefix_flags: Vec::new() }
    }

    async fn close(self: Box<Self>) -> Result<(), RunnerError> {
        Ok(())
    }
}

/// The effective shell family a host can run adapter/verification commands
/// through (spec §4.3.a).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShellFamily {
    /// POSIX-style shell (`bash`/`sh`).
    Bash,
    /// Windows PowerShell.
    PowerShell,
}

/// Compute the effective shell family for a local-backend run on this host:
/// `powershell` on native Windows, `bash` everywhere else (including a
/// containerized remote backend, which always runs a Linux image).
pub fn effective_shell_family(is_container_backend: bool) -> ShellFamily {
    if is_container_backend {
        return ShellFamily::Bash;
    }
    if cfg!(windows) { ShellFamily::PowerShell } else { ShellFamily::Bash }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn local_backend_has_empty_prefix_and_merges_env() {
        let backend = LocalBackend::new("/work");
        assert!(backend.command_prefix().is_empty());
        let mut overrides = BTreeMap::new();
        overrides.insert("A".to_string(), "1".to_string());
        let plan = backend.plan_env(&overrides);
        assert_eq!(plan.process_env.get("A"), Some(&"1".to_string()));
        assert!(plan.prefix_flags.is_empty());
    }

    #[test]
    fn container_exec_flags_are_sorted_by_key() {
        let mut overrides = BTreeMap::new();
        overrides.insert("B".to_string(), "2".to_string());
        overrides.insert("A".to_string(), "1".to_string());
        let flags = EnvPlan::container_exec_flags(&overrides);
        assert_eq!(flags, vec!["-e", "A=1", "-e", "B=2"].into_iter().map(String::from).collect::<Vec<_>>());
    }

    #[test]
    fn build_argv_inserts_env_flags_before_trailing_container_token() {
        struct Fake {
            prefix: Vec<String>,
            mount: PathBuf,
        }
        #[async_trait]
        impl ExecutionBackend for Fake {
            fn command_prefix(&self) -> &[String] {
                &self.prefix
            }
            fn workspace_mount(&self) -> &Path {
                &self.mount
            }
            fn plan_env(&self, overrides: &BTreeMap<String, String>) -> EnvPlan {
                EnvPlan { process_env: BTreeMap::new(), prefix_flags: EnvPlan::container_exec_flags(overrides) }
            }
            async fn close(self: Box<Self>) -> Result<(), RunnerError> {
                Ok(())
            }
        }

        let fake = Fake {
            prefix: ["docker", "exec", "-i", "-w", "/workspace", "c1"]
                .into_iter()
                .map(String::from)
                .collect(),
            mount: PathBuf::from("/workspace"),
        };
        let mut overrides = BTreeMap::new();
        overrides.insert("B".to_string(), "2".to_string());
        overrides.insert("A".to_string(), "1".to_string());
        let argv = fake.build_argv(&overrides, &["claude".to_string()]);
        assert_eq!(
            argv,
            vec!["docker", "exec", "-i", "-w", "/workspace", "-e", "A=1", "-e", "B=2", "c1", "claude"]
        );
    }
}

// SPDX-License-Identifier: MIT OR Apache-2.0
//! Codex CLI argv construction (spec §4.4 "Codex adapter specifics").

use runner_error::{ErrorCode, RunnerError};

/// Flags accepted by `codex exec`, as resolved from the persona/mission/policy
/// catalog and the run request before invocation.
#[derive(Debug, Clone)]
pub struct CodexAdapterConfig {
    /// Binary name or path (PATH-resolved unless the run uses a container backend).
    pub binary: String,
    /// `--model` override.
    pub model: Option<String>,
    /// `--sandbox`: `read-only` / `workspace-write` / `danger-full-access`.
    pub sandbox_mode: Option<String>,
    /// `--ask-for-approval`: `untrusted` / `on-failure` / `on-request` / `never`.
    ///
    /// A non-interactive run always resolves this to `never` unless the
    /// policy explicitly overrides it, since there is no human present to
    /// answer an approval prompt (spec §4.4 early-termination policy).
    pub approval_policy: Option<String>,
    /// `--full-auto` convenience flag (mutually exclusive with an explicit
    /// `sandbox_mode`/`approval_policy` pair).
    pub full_auto: bool,
}

impl Default for CodexAdapterConfig {
    fn default() -> Self {
        Self {
            binary: "codex".to_string(),
            model: None,
            sandbox_mode: None,
            approval_policy: Some("never".to_string()),
            full_auto: false,
        }
    }
}

impl CodexAdapterConfig {
    /// Start from a resolved binary name, with every other field defaulted.
    pub fn new(binary: impl Into<String>) -> Self {
        Self { binary: binary.into(), ..Self::default() }
    }

    /// Build the Codex-specific argv (everything after the resolved binary).
    ///
    /// The prompt itself is never part of argv: the final positional `-`
    /// tells `codex exec` to read it from stdin (spec §4.4 "Prompt delivery").
    ///
    /// # Errors
    ///
    /// Returns [`RunnerError`] with [`ErrorCode::InvalidRunSpec`] if
    /// `full_auto` is combined with an explicit `sandbox_mode` or
    /// `approval_policy`.
    pub fn build_argv(&self) -> Result<Vec<String>, RunnerError> {
        if self.full_auto && (self.sandbox_mode.is_some() || self.approval_policy.is_some()) {
            return Err(RunnerError::new(
                ErrorCode::InvalidRunSpec,
                "codex full_auto is mutually exclusive with an explicit sandbox_mode/approval_policy",
                "set either full_auto alone, or sandbox_mode/approval_policy alone, in the resolved run spec",
            ));
        }

        let mut argv = vec!["exec".to_string(), "--json".to_string()];
        if let Some(model) = &self.model {
            argv.push("--model".to_string());
            argv.push(model.clone());
        }
        if self.full_auto {
            argv.push("--full-auto".to_string());
        } else {
            if let Some(sandbox) = &self.sandbox_mode {
                argv.push("--sandbox".to_string());
                argv.push(sandbox.clone());
            }
            if let Some(policy) = &self.approval_policy {
                argv.push("--ask-for-approval".to_string());
                argv.push(policy.clone());
            }
        }
        argv.push("-".to_string());
        Ok(argv)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_argv_reads_prompt_from_stdin() {
        let cfg = CodexAdapterConfig::new("codex");
        let argv = cfg.build_argv().unwrap();
        assert_eq!(
            argv,
            vec!["exec", "--json", "--ask-for-approval", "never", "-"]
        );
    }

    #[test]
    fn full_auto_drops_sandbox_and_approval_flags() {
        let mut cfg = CodexAdapterConfig::new("codex");
        cfg.approval_policy = None;
        cfg.full_auto = true;
        let argv = cfg.build_argv().unwrap();
        assert_eq!(argv, vec!["exec", "--json", "--full-auto", "-"]);
    }

    #[test]
    fn full_auto_with_sandbox_mode_is_rejected() {
        let mut cfg = CodexAdapterConfig::new("codex");
        cfg.full_auto = true;
        cfg.sandbox_mode = Some("workspace-write".to_string());
        let err = cfg.build_argv().unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidRunSpec);
    }

    #[test]
    fn model_override_is_threaded_through() {
        let mut cfg = CodexAdapterConfig::new("codex");
        cfg.model = Some("o4-mini".to_string());
        let argv = cfg.build_argv().unwrap();
        assert!(argv.windows(2).any(|w| w == ["--model", "o4-mini"]));
    }
}

// SPDX-License-Identifier: MIT OR Apache-2.0
//! Capability/tool allow-deny preflight checks (spec §4.3.a, §4.4, §7).
//!
//! A [`PolicyEntry`](runner_core::PolicyEntry) only carries a tool allowlist
//! (empty meaning "whatever the backend defaults to"), an optional approval
//! mode string, an optional turn cap, and an `allow_edits` flag. This crate
//! compiles the allowlist into a glob matcher once per run and answers
//! `can_use_tool` preflight questions against it; it does not intercept or
//! block tool calls mid-run — each adapter forwards the same allowlist to
//! its backend CLI as a flag (e.g. `--allowedTools`), and this engine's
//! decisions are for preflight reporting and audit purposes only.

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod audit;

use runner_core::PolicyEntry;
use runner_error::{ErrorCode, RunnerError};
use runner_glob::{IncludeExcludeGlobs, MatchDecision};

pub use audit::{AuditEntry, AuditSummary, PolicyAuditor};

/// Outcome of a single tool-allow check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decision {
    /// Whether the tool may be invoked.
    pub allowed: bool,
    /// Present when `allowed` is `false`, explaining why.
    pub reason: Option<String>,
}

impl Decision {
    /// An unconditional allow.
    #[must_use]
    pub fn allow() -> Self {
        Self { allowed: true, reason: None }
    }

    /// A denial with an explanation.
    #[must_use]
    pub fn deny(reason: impl Into<String>) -> Self {
        Self { allowed: false, reason: Some(reason.into()) }
    }
}

/// Compiled preflight view of one [`PolicyEntry`].
#[derive(Debug, Clone)]
pub struct PolicyEngine {
    tool_rules: IncludeExcludeGlobs,
    entry: PolicyEntry,
}

impl PolicyEngine {
    /// Compile `entry`'s tool allowlist into a matcher.
    ///
    /// An empty `allowed_tools` list compiles to "allow everything" — the
    /// run falls back to whichever tools the backend enables by default.
    ///
    /// # Errors
    ///
    /// Returns [`RunnerError`] with [`ErrorCode::InvalidAgentConfig`] if any
    /// pattern in `allowed_tools` is not a valid glob.
    pub fn new(entry: &PolicyEntry) -> Result<Self, RunnerError> {
        let no_exclude: &[String] = &[];
        let tool_rules = IncludeExcludeGlobs::new(&entry.allowed_tools, no_exclude).map_err(|e| {
            RunnerError::new(
                ErrorCode::InvalidAgentConfig,
                format!("invalid allowed_tools pattern: {e}"),
                "fix the glob pattern in this policy's allowed_tools list",
            )
        })?;
        Ok(Self { tool_rules, entry: entry.clone() })
    }

    /// Check whether `tool_name` is permitted under this policy's allowlist.
    #[must_use]
    pub fn can_use_tool(&self, tool_name: &str) -> Decision {
        match self.tool_rules.decide_str(tool_name) {
            MatchDecision::Allowed => Decision::allow(),
            MatchDecision::DeniedByMissingInclude => {
                Decision::deny(format!("tool '{tool_name}' not in allowlist"))
            }
            MatchDecision::DeniedByExclude => unreachable!("policy globs never compile an exclude set"),
        }
    }

    /// Whether this policy allows the agent to edit files in the workspace
    /// (gates `capture_diff`, spec §2 control-flow diagram).
    #[must_use]
    pub fn allows_edits(&self) -> bool {
        self.entry.allow_edits
    }

    /// Approval mode string to forward to backends that support one.
    #[must_use]
    pub fn approval_mode(&self) -> Option<&str> {
        self.entry.approval_mode.as_deref()
    }

    /// Maximum turn count to forward to backends that support a limit.
    #[must_use]
    pub fn max_turns(&self) -> Option<u32> {
        self.entry.max_turns
    }

    /// The underlying policy entry this engine was compiled from.
    #[must_use]
    pub fn entry(&self) -> &PolicyEntry {
        &self.entry
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(allowed_tools: &[&str], allow_edits: bool) -> PolicyEntry {
        PolicyEntry {
            allow_edits,
            allowed_tools: allowed_tools.iter().map(|s| s.to_string()).collect(),
            approval_mode: None,
            max_turns: None,
        }
    }

    #[test]
    fn empty_allowlist_allows_everything() {
        let engine = PolicyEngine::new(&entry(&[], false)).expect("compile policy");
        assert!(engine.can_use_tool("Bash").allowed);
        assert!(engine.can_use_tool("Read").allowed);
    }

    #[test]
    fn allowlist_blocks_unlisted_tool() {
        let engine = PolicyEngine::new(&entry(&["Read", "Write"], false)).expect("compile policy");
        let denied = engine.can_use_tool("Bash");
        assert!(!denied.allowed);
        assert_eq!(denied.reason.as_deref(), Some("tool 'Bash' not in allowlist"));

        assert!(engine.can_use_tool("Read").allowed);
    }

    #[test]
    fn glob_patterns_in_allowlist() {
        let engine = PolicyEngine::new(&entry(&["Bash*"], false)).expect("compile policy");
        assert!(engine.can_use_tool("BashExec").allowed);
        assert!(!engine.can_use_tool("Read").allowed);
    }

    #[test]
    fn wildcard_allowlist() {
        let engine = PolicyEngine::new(&entry(&["*"], false)).expect("compile policy");
        assert!(engine.can_use_tool("Bash").allowed);
        assert!(engine.can_use_tool("AnythingElse").allowed);
    }

    #[test]
    fn invalid_glob_pattern_is_rejected() {
        let err = PolicyEngine::new(&entry(&["["], false)).expect_err("invalid glob should fail");
        assert_eq!(err.code, ErrorCode::InvalidAgentConfig);
    }

    #[test]
    fn exposes_allow_edits_approval_mode_and_max_turns() {
        let mut e = entry(&[], true);
        e.approval_mode = Some("auto_edit".to_string());
        e.max_turns = Some(20);
        let engine = PolicyEngine::new(&e).expect("compile policy");
        assert!(engine.allows_edits());
        assert_eq!(engine.approval_mode(), Some("auto_edit"));
        assert_eq!(engine.max_turns(), Some(20));
    }

    #[test]
    fn decision_allow_and_deny() {
        let allow = Decision::allow();
        assert!(allow.allowed);
        assert!(allow.reason.is_none());

        let deny = Decision::deny("not permitted");
        assert!(!deny.allowed);
        assert_eq!(deny.reason.as_deref(), Some("not permitted"));
    }
}

// SPDX-License-Identifier: MIT OR Apache-2.0
//! Audit trail for tool-allow preflight decisions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::PolicyEngine;

/// Outcome of a single recorded policy evaluation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PolicyDecision {
    /// The tool was permitted.
    Allow,
    /// The tool was denied.
    Deny {
        /// Why it was denied.
        reason: String,
    },
}

/// A single recorded tool-allow evaluation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    /// When the check happened.
    pub timestamp: DateTime<Utc>,
    /// The tool name that was checked.
    pub tool: String,
    /// The resulting decision.
    pub decision: PolicyDecision,
}

/// Aggregate counts of recorded decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AuditSummary {
    /// Number of `Allow` decisions.
    pub allowed: usize,
    /// Number of `Deny` decisions.
    pub denied: usize,
}

/// Wraps a [`PolicyEngine`] and records every `can_use_tool` decision for
/// later inclusion in run diagnostics.
pub struct PolicyAuditor {
    engine: PolicyEngine,
    log: Vec<AuditEntry>,
}

impl PolicyAuditor {
    /// Wrap `engine`, starting with an empty log.
    #[must_use]
    pub fn new(engine: PolicyEngine) -> Self {
        Self { engine, log: Vec::new() }
    }

    /// Check whether `tool_name` is permitted, recording the decision.
    pub fn check_tool(&mut self, tool_name: &str) -> PolicyDecision {
        let d = self.engine.can_use_tool(tool_name);
        let decision = if d.allowed {
            PolicyDecision::Allow
        } else {
            PolicyDecision::Deny { reason: d.reason.unwrap_or_default() }
        };
        self.log.push(AuditEntry {
            timestamp: Utc::now(),
            tool: tool_name.to_string(),
            decision: decision.clone(),
        });
        decision
    }

    /// All recorded entries in chronological order.
    #[must_use]
    pub fn entries(&self) -> &[AuditEntry] {
        &self.log
    }

    /// Aggregate counts across all recorded entries.
    #[must_use]
    pub fn summary(&self) -> AuditSummary {
        let mut s = AuditSummary::default();
        for e in &self.log {
            match e.decision {
                PolicyDecision::Allow => s.allowed += 1,
                PolicyDecision::Deny { .. } => s.denied += 1,
            }
        }
        s
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use runner_core::PolicyEntry;

    fn engine(allowed_tools: &[&str]) -> PolicyEngine {
        let entry = PolicyEntry {
            allow_edits: false,
            allowed_tools: allowed_tools.iter().map(|s| s.to_string()).collect(),
            approval_mode: None,
            max_turns: None,
        };
        PolicyEngine::new(&entry).expect("compile policy")
    }

    #[test]
    fn records_allow_and_deny_decisions() {
        let mut auditor = PolicyAuditor::new(engine(&["Read"]));
        assert_eq!(auditor.check_tool("Read"), PolicyDecision::Allow);
        assert!(matches!(auditor.check_tool("Bash"), PolicyDecision::Deny { .. }));
        assert_eq!(auditor.entries().len(), 2);
    }

    #[test]
    fn summary_counts_allow_and_deny() {
        let mut auditor = PolicyAuditor::new(engine(&["Read"]));
        auditor.check_tool("Read");
        auditor.check_tool("Read");
        auditor.check_tool("Bash");
        let summary = auditor.summary();
        assert_eq!(summary.allowed, 2);
        assert_eq!(summary.denied, 1);
    }

    #[test]
    fn empty_auditor_summary_is_zero() {
        let auditor = PolicyAuditor::new(engine(&[]));
        assert_eq!(auditor.summary(), AuditSummary { allowed: 0, denied: 0 });
    }
}

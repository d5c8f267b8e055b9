// SPDX-License-Identifier: MIT OR Apache-2.0
//! `extract_report` and `report.md` rendering (spec §4.7, §6 "Report
//! rendering").

use std::path::Path;

use runner_core::{CanonicalEvent, EventKind, Metrics, TargetRef};
use runner_error::StructuredError;
use runner_validate::recover_json;
use serde_json::Value;

/// Recover the agent's final machine-readable report.
///
/// Tries, in order (spec §4.7 step 1): the adapter-written last-message
/// file; the last `tool_call` event whose payload recovers to JSON; a
/// `write_file` event naming a `report.json`-suffixed path, read back from
/// the acquired workspace.
pub fn extract_report(events: &[CanonicalEvent], last_message_path: &Path, workspace_root: &Path) -> Option<Value> {
    if let Ok(text) = std::fs::read_to_string(last_message_path) {
        if let Some(value) = recover_json(&text) {
            return Some(value);
        }
    }

    for event in events.iter().rev() {
        if event.kind != EventKind::ToolCall {
            continue;
        }
        if event.data.get("is_error").and_then(Value::as_bool).unwrap_or(false) {
            continue;
        }
        for key in ["output", "result", "input"] {
            if let Some(text) = event.data.get(key).and_then(Value::as_str) {
                if let Some(value) = recover_json(text) {
                    return Some(value);
                }
            }
        }
    }

    for event in events.iter().rev() {
        if event.kind != EventKind::WriteFile {
            continue;
        }
        let Some(path) = event.data.get("path").and_then(Value::as_str) else {
            continue;
        };
        if !path.ends_with("report.json") {
            continue;
        }
        if let Ok(text) = std::fs::read_to_string(workspace_root.join(path)) {
            if let Some(value) = recover_json(&text) {
                return Some(value);
            }
        }
    }

    None
}

/// Render `report.md`: target header, metrics summary table, and the raw
/// report JSON in a fenced code block (spec §6 "Report rendering").
pub fn render_report_md(target_ref: &TargetRef, report: Option<&Value>, metrics: &Metrics) -> String {
    let mut out = String::new();
    out.push_str(&format!(
        "# Run report — {} / {} / seed {}\n\n",
        target_ref.agent, target_ref.policy, target_ref.seed
    ));
    out.push_str(&format!("- repo: `{}`\n", target_ref.repo_input));
    out.push_str(&format!("- persona: `{}`\n", target_ref.persona_id));
    out.push_str(&format!("- mission: `{}`\n", target_ref.mission_id));
    if let Some(commit) = &target_ref.commit_sha {
        out.push_str(&format!("- commit: `{commit}`\n"));
    }
    out.push('\n');

    out.push_str("## Metrics\n\n");
    out.push_str("| metric | value |\n|---|---|\n");
    out.push_str(&format!("| step_count | {} |\n", metrics.step_count));
    out.push_str(&format!("| commands_executed | {} |\n", metrics.commands_executed));
    out.push_str(&format!("| commands_failed | {} |\n", metrics.commands_failed));
    out.push_str(&format!("| distinct_files_read | {} |\n", metrics.distinct_files_read));
    out.push_str(&format!("| distinct_files_written | {} |\n", metrics.distinct_files_written));
    out.push_str(&format!("| distinct_docs_read | {} |\n", metrics.distinct_docs_read));
    out.push_str(&format!("| lines_added_total | {} |\n", metrics.lines_added_total));
    out.push_str(&format!("| lines_removed_total | {} |\n", metrics.lines_removed_total));
    out.push('\n');

    match report {
        Some(report) => {
            out.push_str("## Report\n\n```json\n");
            out.push_str(&serde_json::to_string_pretty(report).unwrap_or_else(|_| report.to_string()));
            out.push_str("\n```\n");
        }
        None => out.push_str("## Report\n\n_no report.json was recovered for this run_\n"),
    }

    out
}

/// Render `report.md`'s failure-path layout: the structured error rendered
/// through the same failure-text shape used for downstream aggregation
/// (spec §6 "On failure, `report.md` instead renders the structured error").
pub fn render_failure_md(target_ref: &TargetRef, error: &StructuredError, metrics: Option<&Metrics>) -> String {
    let mut out = String::new();
    out.push_str(&format!(
        "# Run report — {} / {} / seed {} (FAILED)\n\n",
        target_ref.agent, target_ref.policy, target_ref.seed
    ));
    out.push_str(&format!("- repo: `{}`\n", target_ref.repo_input));
    out.push_str(&format!("- type: `{}`\n", error.r#type));
    if let Some(subtype) = &error.subtype {
        out.push_str(&format!("- subtype: `{subtype}`\n"));
    }
    if let Some(exit_code) = error.exit_code {
        out.push_str(&format!("- exit_code: `{exit_code}`\n"));
    }
    out.push_str(&format!("- hint: {}\n\n", error.hint));

    if let Some(message) = &error.message {
        out.push_str("## Message\n\n");
        out.push_str(message);
        out.push_str("\n\n");
    }
    if let Some(stderr) = &error.stderr {
        out.push_str("## stderr excerpt\n\n```\n");
        out.push_str(stderr);
        out.push_str("\n```\n\n");
    }
    if let Some(errors) = &error.report_validation_errors {
        out.push_str("## Report validation errors\n\n");
        for path in errors {
            out.push_str(&format!("- `{path}`\n"));
        }
        out.push('\n');
    }

    if let Some(metrics) = metrics {
        out.push_str(&format!("## Metrics (partial)\n\n- step_count: {}\n", metrics.step_count));
    }

    out
}

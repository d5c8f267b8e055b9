// SPDX-License-Identifier: MIT OR Apache-2.0
//! `compute_metrics` (spec §4.6): a single pass over one run's
//! `normalized_events.jsonl` that derives `metrics.json` — per-type event
//! counts, distinct files touched, command success/failure tallies with a
//! bounded set of failure excerpts, and the step count used to decide
//! whether a run "did anything."

#![deny(unsafe_code)]
#![warn(missing_docs)]

use std::collections::BTreeSet;

use runner_capture::classify_policy_denial;
use runner_core::{CanonicalEvent, EventKind, FailedCommandExcerpt, Metrics};
use serde_json::Value;

/// File extensions counted toward `distinct_docs_read` (spec §4.6).
const DOC_EXTENSIONS: &[&str] = &["md", "rst", "txt", "adoc"];

/// Maximum number of failed-command excerpts retained in `Metrics::failed_commands`.
const FAILED_COMMAND_EXCERPT_CAP: usize = 10;

/// Derive [`Metrics`] from a run's ordered canonical event stream.
///
/// This is a pure function over already-normalized events: it does not read
/// or write any files itself, so the orchestrator is free to call it
/// directly on the events it just streamed through the normalizer, or on
/// events re-read from a persisted `normalized_events.jsonl`.
pub fn compute_metrics(events: &[CanonicalEvent]) -> Metrics {
    let mut event_counts = std::collections::BTreeMap::new();
    let mut files_read: BTreeSet<String> = BTreeSet::new();
    let mut files_written: BTreeSet<String> = BTreeSet::new();
    let mut docs_read: BTreeSet<String> = BTreeSet::new();
    let mut commands_executed = 0u64;
    let mut commands_failed = 0u64;
    let mut failed_commands: Vec<FailedCommandExcerpt> = Vec::new();
    let mut failed_commands_omitted_count = 0u64;
    let mut lines_added_total = 0u64;
    let mut lines_removed_total = 0u64;
    let mut step_count = 0u64;

    for event in events {
        *event_counts.entry(event_kind_str(event.kind).to_string()).or_insert(0u64) += 1;
        if event.kind.counts_as_step() {
            step_count += 1;
        }

        match event.kind {
            EventKind::ReadFile => {
                if let Some(path) = event.data.get("path").and_then(Value::as_str) {
                    files_read.insert(path.to_string());
                    if has_doc_extension(path) {
                        docs_read.insert(path.to_string());
                    }
                }
            }
            EventKind::WriteFile => {
                if let Some(path) = event.data.get("path").and_then(Value::as_str) {
                    files_written.insert(path.to_string());
                }
                lines_added_total += event.data.get("lines_added").and_then(Value::as_u64).unwrap_or(0);
                lines_removed_total += event.data.get("lines_removed").and_then(Value::as_u64).unwrap_or(0);
            }
            EventKind::RunCommand => {
                commands_executed += 1;
                for path in path_like_argv_tokens(event) {
                    if has_doc_extension(&path) {
                        docs_read.insert(path);
                    }
                }

                let exit_code = event.data.get("exit_code").and_then(Value::as_i64);
                if exit_code.is_some_and(|c| c != 0) {
                    commands_failed += 1;
                    if failed_commands.len() < FAILED_COMMAND_EXCERPT_CAP {
                        failed_commands.push(failed_command_excerpt(event, exit_code));
                    } else {
                        failed_commands_omitted_count += 1;
                    }
                }
            }
            _ => {}
        }
    }

    Metrics {
        event_counts,
        distinct_files_read: files_read.len() as u64,
        distinct_files_written: files_written.len() as u64,
        distinct_docs_read: docs_read.len() as u64,
        commands_executed,
        commands_failed,
        failed_commands,
        failed_commands_truncated: failed_commands_omitted_count > 0,
        failed_commands_omitted_count,
        lines_added_total,
        lines_removed_total,
        step_count,
    }
}

fn event_kind_str(kind: EventKind) -> &'static str {
    match kind {
        EventKind::AgentMessage => "agent_message",
        EventKind::ReadFile => "read_file",
        EventKind::WriteFile => "write_file",
        EventKind::RunCommand => "run_command",
        EventKind::ToolCall => "tool_call",
        EventKind::WebSearch => "web_search",
        EventKind::Error => "error",
    }
}

fn has_doc_extension(path: &str) -> bool {
    path.rsplit('.').next().is_some_and(|ext| DOC_EXTENSIONS.iter().any(|allowed| ext.eq_ignore_ascii_case(allowed)))
}

fn looks_path_like(token: &str) -> bool {
    token.contains('/') || token.contains('\\') || token.rsplit_once('.').is_some_and(|(stem, ext)| !stem.is_empty() && !ext.is_empty())
}

fn path_like_argv_tokens(event: &CanonicalEvent) -> Vec<String> {
    event
        .data
        .get("argv")
        .and_then(Value::as_array)
        .map(|argv| argv.iter().filter_map(Value::as_str).filter(|t| looks_path_like(t)).map(str::to_string).collect())
        .unwrap_or_default()
}

fn failed_command_excerpt(event: &CanonicalEvent, exit_code: Option<i64>) -> FailedCommandExcerpt {
    let command = event.data.get("command").and_then(Value::as_str).unwrap_or_default().to_string();
    let excerpt = event.data.get("output_excerpt").and_then(Value::as_str).map(str::to_string);
    let (policy_denied, heredoc_variant) = classify_policy_denial(excerpt.as_deref().unwrap_or_default());
    FailedCommandExcerpt { command, exit_code: exit_code.map(|c| c as i32), policy_denied, heredoc_variant, excerpt }
}

// SPDX-License-Identifier: MIT OR Apache-2.0
//! Report-schema validation and final-message JSON recovery (spec §4.7
//! "Report Validation & Verification Gate").
//!
//! Two independent pieces live here: [`recover_json`] pulls a JSON value out
//! of an agent's free-form final-message text (the value itself, or a
//! fenced ```json block, or the first balanced top-level object/array found
//! in the text), and [`validate_report`] checks a recovered value against a
//! mission's Draft 2020-12 JSON Schema, rendering each error's location as a
//! JSONPath-style string (e.g. `$['a']['b'][0]`) for `error.json`'s
//! `report_validation_errors` list.

#![deny(unsafe_code)]
#![warn(missing_docs)]

use jsonschema::{Draft, Validator};
use runner_error::{ErrorCode, RunnerError};
use serde_json::Value;

/// Compile `schema` under Draft 2020-12 semantics.
///
/// # Errors
///
/// Returns [`RunnerError`] with [`ErrorCode::MissingReportSchemaFile`] if the
/// schema document itself is not a valid JSON Schema.
pub fn compile_schema(schema: &Value) -> Result<Validator, RunnerError> {
    jsonschema::options()
        .with_draft(Draft::Draft202012)
        .build(schema)
        .map_err(|e| {
            RunnerError::new(
                ErrorCode::MissingReportSchemaFile,
                format!("invalid report schema: {e}"),
                "fix the mission's report_schema document so it compiles as JSON Schema",
            )
        })
}

/// Validate `instance` against an already-compiled `schema`, returning the
/// rendered JSONPath location of every violation (empty when valid).
#[must_use]
pub fn validate_report(schema: &Validator, instance: &Value) -> Vec<String> {
    schema
        .iter_errors(instance)
        .map(|e| render_instance_path(&e.instance_path.to_string()))
        .collect()
}

/// Render a `/`-separated JSON Pointer (as produced by `jsonschema`'s
/// `instance_path` `Display` impl) as a JSONPath-style string: `$['a'][0]`.
fn render_instance_path(pointer: &str) -> String {
    let mut rendered = String::from("$");
    for raw_segment in pointer.split('/').filter(|s| !s.is_empty()) {
        let segment = raw_segment.replace("~1", "/").replace("~0", "~");
        if segment.chars().all(|c| c.is_ascii_digit()) && !segment.is_empty() {
            rendered.push('[');
            rendered.push_str(&segment);
            rendered.push(']');
        } else {
            rendered.push_str("['");
            rendered.push_str(&segment);
            rendered.push_str("']");
        }
    }
    rendered
}

/// Recover a JSON value from an agent's free-form final-message text (spec
/// §4.5 "Tool results embedding structured JSON ... have that JSON
/// recovered", applied here to the orchestrator's `extract_report` step).
///
/// Tries, in order: the whole trimmed text as JSON; the content of the first
/// ```` ```json ```` fenced code block; the first balanced top-level `{...}`
/// or `[...]` substring found anywhere in the text.
#[must_use]
pub fn recover_json(text: &str) -> Option<Value> {
    let trimmed = text.trim();
    if let Ok(v) = serde_json::from_str(trimmed) {
        return Some(v);
    }
    if let Some(fenced) = extract_fenced_json(text) {
        if let Ok(v) = serde_json::from_str(&fenced) {
            return Some(v);
        }
    }
    extract_balanced_json(text)
}

fn extract_fenced_json(text: &str) -> Option<String> {
    let start_marker = text.find("```json")?;
    let body_start = start_marker + "```json".len();
    let rest = &text[body_start..];
    let end = rest.find("```")?;
    Some(rest[..end].trim().to_string())
}

/// Scan `text` for the first top-level `{`/`[` and return the substring
/// spanning to its matching close bracket, skipping over bracket characters
/// that appear inside quoted strings.
fn extract_balanced_json(text: &str) -> Option<Value> {
    let bytes = text.as_bytes();
    let start = text.find(['{', '['])?;
    let open = bytes[start];
    let close = if open == b'{' { b'}' } else { b']' };

    let mut depth = 0i32;
    let mut in_string = false;
    let mut escaped = false;
    for (i, &b) in bytes.iter().enumerate().skip(start) {
        if in_string {
            if escaped {
                escaped = false;
            } else if b == b'\\' {
                escaped = true;
            } else if b == b'"' {
                in_string = false;
            }
            continue;
        }
        match b {
            b'"' => in_string = true,
            b if b == open => depth += 1,
            b if b == close => {
                depth -= 1;
                if depth == 0 {
                    let candidate = &text[start..=i];
                    return serde_json::from_str(candidate).ok();
                }
            }
            _ => {}
        }
    }
    None
}

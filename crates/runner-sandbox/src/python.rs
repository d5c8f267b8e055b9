// SPDX-License-Identifier: MIT OR Apache-2.0
//! Dynamic Python-base selection (spec §4.3.b): when a target declares
//! `requires-python`, rewrite the build context's `FROM` line in an overlay
//! Dockerfile under the run directory — the source context itself is never
//! mutated — and persist a `python_selection.json` audit record.

use serde::{Deserialize, Serialize};

/// Audit record written to `sandbox/python_selection.json`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PythonSelection {
    /// The target's declared `requires-python` constraint, if any.
    pub requested: Option<String>,
    /// The concrete python base image tag selected (e.g. `python:3.11-slim`).
    pub selected_base: String,
    /// Whether the overlay Dockerfile's `FROM` line was rewritten.
    pub rewrote_from: bool,
    /// The original `FROM` line, present only when it was rewritten.
    pub original_from: Option<String>,
}

/// Default python base used when a target declares no constraint.
const DEFAULT_PYTHON_BASE: &str = "python:3.11-slim";

/// Parse a `pyproject.toml` document's `[project] requires-python` field.
///
/// Returns `None` when the document has no such field, is not valid TOML, or
/// has no `[project]` table — all treated identically as "no constraint"
/// since this is a best-effort inspection, not a `pyproject.toml` validator.
#[must_use]
pub fn parse_requires_python(pyproject_toml_text: &str) -> Option<String> {
    #[derive(Deserialize)]
    struct PyProject {
        project: Option<Project>,
    }
    #[derive(Deserialize)]
    struct Project {
        #[serde(rename = "requires-python")]
        requires_python: Option<String>,
    }

    toml::from_str::<PyProject>(pyproject_toml_text)
        .ok()
        .and_then(|p| p.project)
        .and_then(|p| p.requires_python)
}

/// Map a `requires-python` version constraint (e.g. `>=3.10`, `^3.11`,
/// `3.12`) to a concrete `python:<version>-slim` base image tag.
///
/// Extracts the first `MAJOR.MINOR` pair found in the constraint string;
/// falls back to [`DEFAULT_PYTHON_BASE`] when none is found.
#[must_use]
pub fn resolve_python_base(requires_python: Option<&str>) -> String {
    let Some(spec) = requires_python else {
        return DEFAULT_PYTHON_BASE.to_string();
    };
    match extract_major_minor(spec) {
        Some(version) => format!("python:{version}-slim"),
        None => DEFAULT_PYTHON_BASE.to_string(),
    }
}

fn extract_major_minor(spec: &str) -> Option<String> {
    let digits_or_dot = |c: char| c.is_ascii_digit() || c == '.';
    let mut chars = spec.char_indices().peekable();
    while let Some((i, c)) = chars.next() {
        if c.is_ascii_digit() {
            let rest = &spec[i..];
            let end = rest.find(|c: char| !digits_or_dot(c)).unwrap_or(rest.len());
            let candidate = rest[..end].trim_end_matches('.');
            let parts: Vec<&str> = candidate.split('.').collect();
            if parts.len() >= 2 && parts.iter().all(|p| !p.is_empty() && p.chars().all(|c| c.is_ascii_digit())) {
                return Some(format!("{}.{}", parts[0], parts[1]));
            }
        }
    }
    None
}

/// Rewrite the first `FROM` line in `dockerfile_text` to use `new_base`,
/// returning the rewritten text and the original `FROM` line when a
/// rewrite actually happened (the base already matching is not a rewrite).
#[must_use]
pub fn rewrite_from_line(dockerfile_text: &str, new_base: &str) -> (String, Option<String>) {
    let mut original_from = None;
    let mut rewritten_first = false;
    let lines: Vec<String> = dockerfile_text
        .lines()
        .map(|line| {
            if !rewritten_first && line.trim_start().to_uppercase().starts_with("FROM ") {
                rewritten_first = true;
                let new_line = format!("FROM {new_base}");
                if line.trim() != new_line {
                    original_from = Some(line.to_string());
                    new_line
                } else {
                    line.to_string()
                }
            } else {
                line.to_string()
            }
        })
        .collect();
    let mut rewritten = lines.join("\n");
    if dockerfile_text.ends_with('\n') {
        rewritten.push('\n');
    }
    (rewritten, original_from)
}

/// Compute the full python-base selection for a build context: resolve the
/// base image from the target's constraint, rewrite the Dockerfile's `FROM`
/// line, and produce the audit record to persist alongside it.
#[must_use]
pub fn select_python_base(
    requires_python: Option<&str>,
    dockerfile_text: &str,
) -> (String, PythonSelection) {
    let selected_base = resolve_python_base(requires_python);
    let (rewritten, original_from) = rewrite_from_line(dockerfile_text, &selected_base);
    let selection = PythonSelection {
        requested: requires_python.map(str::to_string),
        selected_base,
        rewrote_from: original_from.is_some(),
        original_from,
    };
    (rewritten, selection)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_requires_python_from_pyproject() {
        let toml = "[project]\nname = \"x\"\nrequires-python = \">=3.10\"\n";
        assert_eq!(parse_requires_python(toml), Some(">=3.10".to_string()));
    }

    #[test]
    fn missing_project_table_yields_none() {
        assert_eq!(parse_requires_python("[tool.other]\nfoo = 1\n"), None);
    }

    #[test]
    fn malformed_toml_yields_none() {
        assert_eq!(parse_requires_python("not = [valid"), None);
    }

    #[test]
    fn resolves_concrete_version_constraints() {
        assert_eq!(resolve_python_base(Some(">=3.10")), "python:3.10-slim");
        assert_eq!(resolve_python_base(Some("^3.11")), "python:3.11-slim");
        assert_eq!(resolve_python_base(Some("3.12")), "python:3.12-slim");
        assert_eq!(resolve_python_base(Some("==3.9.2")), "python:3.9-slim");
    }

    #[test]
    fn unrecognized_constraint_falls_back_to_default() {
        assert_eq!(resolve_python_base(Some("latest")), DEFAULT_PYTHON_BASE);
    }

    #[test]
    fn no_constraint_falls_back_to_default() {
        assert_eq!(resolve_python_base(None), DEFAULT_PYTHON_BASE);
    }

    #[test]
    fn rewrites_from_line_when_base_differs() {
        let dockerfile = "FROM python:3.9-slim\nRUN pip install -r requirements.txt\n";
        let (rewritten, original) = rewrite_from_line(dockerfile, "python:3.11-slim");
        assert_eq!(rewritten, "FROM python:3.11-slim\nRUN pip install -r requirements.txt\n");
        assert_eq!(original, Some("FROM python:3.9-slim".to_string()));
    }

    #[test]
    fn no_rewrite_when_base_already_matches() {
        let dockerfile = "FROM python:3.11-slim\nRUN true\n";
        let (rewritten, original) = rewrite_from_line(dockerfile, "python:3.11-slim");
        assert_eq!(rewritten, dockerfile);
        assert_eq!(original, None);
    }

    #[test]
    fn only_rewrites_first_from_line() {
        let dockerfile = "FROM python:3.9-slim AS builder\nFROM python:3.9-slim\n";
        let (rewritten, _) = rewrite_from_line(dockerfile, "python:3.12-slim");
        assert_eq!(rewritten, "FROM python:3.12-slim AS builder\nFROM python:3.9-slim\n");
    }

    #[test]
    fn select_python_base_produces_selection_record() {
        let (rewritten, selection) =
            select_python_base(Some(">=3.10"), "FROM python:3.9-slim\n");
        assert!(rewritten.starts_with("FROM python:3.10-slim"));
        assert_eq!(
            selection,
            PythonSelection {
                requested: Some(">=3.10".to_string()),
                selected_base: "python:3.10-slim".to_string(),
                rewrote_from: true,
                original_from: Some("FROM python:3.9-slim".to_string()),
            }
        );
    }
}

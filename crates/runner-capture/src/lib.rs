//! Lossy text capture policy, binary detection, and stderr classification.
//!
//! Three concerns live here (spec §2 "Failure taxonomy & artifact capture",
//! §4.5, §4.6):
//!
//! - [`capture_text`] — head/tail excerpting with a single
//!   `...[truncated_output]...` separator, binary-content detection, and
//!   SHA-256 hashing of the full (unexcerpted) content so a truncated excerpt
//!   never destroys diagnostic fidelity (the full bytes stay on disk,
//!   referenced by hash).
//! - [`FailureArtifacts`] — the per-failure sub-artifact directory layout
//!   (`command.json`/`tool.json`, `stdout.txt`, `stderr.txt`, `timing.json`)
//!   persisted for every `run_command`/`tool_call` event with a non-zero
//!   exit/`is_error` (spec §4.5, §8 invariant 4).
//! - [`classify_stderr_warnings`] — the warning-only detector that collapses
//!   known-benign repeated stderr lines into summary counts (spec §4.6).

#![deny(unsafe_code)]
#![warn(missing_docs)]

use serde::Serialize;
use sha2::{Digest, Sha256};
use std::fs;
use std::io;
use std::path::Path;

/// The fixed marker inserted between the head and tail halves of a truncated excerpt.
pub const TRUNCATION_MARKER: &str = "...[truncated_output]...";

/// The fixed inline-excerpt budget used for `run_command`/`tool_call` event
/// payloads (spec §4.5), independent of the larger whole-file capture budget.
pub const INLINE_EXCERPT_BUDGET: usize = 2000;

/// Errors from capture operations.
#[derive(Debug, thiserror::Error)]
pub enum CaptureError {
    /// Underlying filesystem I/O failure.
    #[error("capture i/o error: {0}")]
    Io(#[from] io::Error),
    /// The content looked binary and capture policy refused to excerpt it as text.
    #[error("binary_artifact_detected: {path}")]
    BinaryArtifactDetected {
        /// Path of the artifact that was detected as binary.
        path: String,
    },
}

/// The result of applying the capture policy to a block of text.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct CapturedText {
    /// The (possibly truncated) excerpt.
    pub excerpt: String,
    /// True iff `excerpt` is a head+tail truncation of a larger original.
    pub truncated: bool,
    /// SHA-256 hex digest of the full, untruncated original bytes.
    pub sha256: String,
    /// Length in bytes of the full, untruncated original.
    pub original_len: usize,
}

/// Detect whether `bytes` look binary: any NUL byte, or invalid UTF-8.
pub fn looks_binary(bytes: &[u8]) -> bool {
    if bytes.contains(&0) {
        return true;
    }
    std::str::from_utf8(bytes).is_err()
}

/// SHA-256 hex digest of `bytes`.
pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

/// Apply the head/tail truncation policy to `text`, budgeted at `max_bytes`.
///
/// When `text` fits within the budget, it is returned verbatim with
/// `truncated = false`. Otherwise the first and last `max_bytes / 2` bytes
/// (rounded to char boundaries) are kept, joined by [`TRUNCATION_MARKER`].
pub fn truncate_text(text: &str, max_bytes: usize) -> (String, bool) {
    if text.len() <= max_bytes {
        return (text.to_string(), false);
    }
    let half = max_bytes / 2;
    let head_end = floor_char_boundary(text, half);
    let tail_start_byte_offset = text.len().saturating_sub(half);
    let tail_start = ceil_char_boundary(text, tail_start_byte_offset);
    let head = &text[..head_end];
    let tail = &text[tail_start..];
    (format!("{head}\n{TRUNCATION_MARKER}\n{tail}"), true)
}

fn floor_char_boundary(s: &str, idx: usize) -> usize {
    let mut i = idx.min(s.len());
    while i > 0 && !s.is_char_boundary(i) {
        i -= 1;
    }
    i
}

fn ceil_char_boundary(s: &str, idx: usize) -> usize {
    let mut i = idx.min(s.len());
    while i < s.len() && !s.is_char_boundary(i) {
        i += 1;
    }
    i
}

/// Apply the whole-artifact capture policy to raw bytes: detect binary
/// content, hash the full original, and excerpt the text within `max_bytes`.
pub fn capture_text(bytes: &[u8], max_bytes: usize) -> Result<CapturedText, CaptureError> {
    let sha256 = sha256_hex(bytes);
    let original_len = bytes.len();
    if looks_binary(bytes) {
        return Err(CaptureError::BinaryArtifactDetected { path: sha256 });
    }
    let text = String::from_utf8_lossy(bytes).to_string();
    let (excerpt, truncated) = truncate_text(&text, max_bytes);
    Ok(CapturedText { excerpt, truncated, sha256, original_len })
}

/// Apply the smaller [`INLINE_EXCERPT_BUDGET`] used for event payloads.
pub fn capture_inline_excerpt(text: &str) -> (String, bool) {
    truncate_text(text, INLINE_EXCERPT_BUDGET)
}

/// When a process produced an empty stderr but exited non-zero, synthesize a
/// stderr block carrying the `[synthetic_stderr]` marker (spec §3 invariant:
/// "stderr is never silently empty for failures"). Returns `(text, was_synthesized)`.
pub fn synthesize_stderr_if_empty(stderr: &str, exit_code: i32) -> (String, bool) {
    if exit_code != 0 && stderr.trim().is_empty() {
        (
            format!("[synthetic_stderr] process exited with code {exit_code} and produced no stderr output"),
            true,
        )
    } else {
        (stderr.to_string(), false)
    }
}

// ---------------------------------------------------------------------------
// Failure artifact persistence (spec §4.5, §4.8, §8 invariant 4)
// ---------------------------------------------------------------------------

/// Timing metadata persisted as `timing.json` alongside a failure artifact.
#[derive(Debug, Clone, Serialize)]
pub struct Timing {
    /// ISO-8601 start timestamp.
    pub started_at: String,
    /// ISO-8601 end timestamp.
    pub finished_at: String,
    /// Wall-clock duration in milliseconds.
    pub duration_ms: u64,
}

/// A persisted per-failure sub-artifact directory.
///
/// Pointers to these (the `relpath` of the directory, run-directory relative)
/// are recorded under the originating event's `failure_artifacts` map.
pub struct FailureArtifactWriter {
    dir: std::path::PathBuf,
}

impl FailureArtifactWriter {
    /// Create `command_failures/cmd_NN/` or `tool_failures/tool_NN_<name>/`
    /// under `run_dir`, per spec §6.
    pub fn create_command(run_dir: &Path, index: u32) -> Result<Self, CaptureError> {
        let dir = run_dir.join("command_failures").join(format!("cmd_{index:02}"));
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    /// Create a tool-failure artifact directory.
    pub fn create_tool(run_dir: &Path, index: u32, tool_name: &str) -> Result<Self, CaptureError> {
        let safe_name: String = tool_name
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
            .collect();
        let dir = run_dir
            .join("tool_failures")
            .join(format!("tool_{index:02}_{safe_name}"));
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    /// Path of this artifact directory.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Write `command.json`, budgeted per `max_bytes` for stdout/stderr excerpts.
    pub fn write_command(
        &self,
        command_json: &serde_json::Value,
        stdout: &[u8],
        stderr: &[u8],
        timing: &Timing,
        max_bytes: usize,
    ) -> Result<(), CaptureError> {
        self.write_json("command.json", command_json)?;
        self.write_captured("stdout.txt", stdout, max_bytes)?;
        self.write_captured("stderr.txt", stderr, max_bytes)?;
        self.write_json("timing.json", &serde_json::to_value(timing).unwrap())?;
        Ok(())
    }

    /// Write `tool.json` plus the shared stdout/stderr/timing artifacts.
    pub fn write_tool(
        &self,
        tool_json: &serde_json::Value,
        stdout: &[u8],
        stderr: &[u8],
        timing: &Timing,
        max_bytes: usize,
    ) -> Result<(), CaptureError> {
        self.write_json("tool.json", tool_json)?;
        self.write_captured("stdout.txt", stdout, max_bytes)?;
        self.write_captured("stderr.txt", stderr, max_bytes)?;
        self.write_json("timing.json", &serde_json::to_value(timing).unwrap())?;
        Ok(())
    }

    fn write_json(&self, name: &str, value: &serde_json::Value) -> Result<(), CaptureError> {
        let path = self.dir.join(name);
        let tmp = self.dir.join(format!(".{name}.tmp"));
        fs::write(&tmp, serde_json::to_vec_pretty(value).unwrap())?;
        fs::rename(&tmp, &path)?;
        Ok(())
    }

    fn write_captured(&self, name: &str, bytes: &[u8], max_bytes: usize) -> Result<(), CaptureError> {
        let text = match capture_text(bytes, max_bytes) {
            Ok(captured) => captured.excerpt,
            Err(CaptureError::BinaryArtifactDetected { path }) => {
                format!("[binary_artifact_detected sha256={path} len={}]", bytes.len())
            }
            Err(e) => return Err(e),
        };
        fs::write(self.dir.join(name), text)?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Stderr warning classification (spec §4.6)
// ---------------------------------------------------------------------------

/// Phrases known to be benign, repeated CLI warnings rather than real failures.
const BENIGN_WARNING_MARKERS: &[&str] = &[
    "shell snapshot unsupported",
    "turn metadata header timeout",
    "codex model refresh timeout",
    "bash tool preflight slow",
];

/// Result of scanning a captured stderr stream for benign warning markers.
#[derive(Debug, Clone, Serialize, Default, PartialEq, Eq)]
pub struct StderrClassification {
    /// True iff every non-empty line matched a known benign marker.
    pub warning_only: bool,
    /// Summary lines: `"<marker> (xN)"` for each marker seen at least once.
    pub summary: Vec<String>,
    /// Lines that did not match any known marker, preserved verbatim.
    pub unknown_lines: Vec<String>,
}

/// Classify `stderr` for the warning-only exemption (spec §4.6): a stream
/// consisting only of known-benign lines does not by itself cause failure
/// classification. Any unrecognized line disqualifies `warning_only`.
pub fn classify_stderr_warnings(stderr: &str) -> StderrClassification {
    let mut counts: std::collections::BTreeMap<&'static str, u64> = std::collections::BTreeMap::new();
    let mut unknown_lines = Vec::new();

    for line in stderr.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        match BENIGN_WARNING_MARKERS.iter().find(|m| trimmed.contains(**m)) {
            Some(marker) => {
                *counts.entry(marker).or_insert(0) += 1;
            }
            None => unknown_lines.push(line.to_string()),
        }
    }

    let warning_only = !counts.is_empty() && unknown_lines.is_empty();
    let summary = counts
        .into_iter()
        .map(|(marker, n)| format!("{marker} (x{n})"))
        .collect();

    StderrClassification { warning_only, summary, unknown_lines }
}

/// Known policy-denial stderr markers, distinguishing the heredoc-in-sandboxed-shell variant.
const POLICY_DENIAL_MARKERS: &[&str] = &["operation not permitted", "permission denied", "sandbox denied"];
const HEREDOC_DENIAL_MARKERS: &[&str] = &["heredoc", "<<eof", "here-document"];

/// Classify a failed command's stderr for policy-denial markers (spec §4.6:
/// "up to 10 failed-command excerpts with policy-denial classification
/// (heredoc variant distinguished)").
pub fn classify_policy_denial(stderr: &str) -> (bool, bool) {
    let lower = stderr.to_ascii_lowercase();
    let denied = POLICY_DENIAL_MARKERS.iter().any(|m| lower.contains(m));
    let heredoc = denied && HEREDOC_DENIAL_MARKERS.iter().any(|m| lower.contains(m));
    (denied, heredoc)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_text_is_not_truncated() {
        let (excerpt, truncated) = truncate_text("hello", 8000);
        assert_eq!(excerpt, "hello");
        assert!(!truncated);
    }

    #[test]
    fn long_text_is_truncated_with_marker() {
        let head_token = "HEAD_TOKEN_MARKER";
        let body = format!("{head_token}{}", "x".repeat(200_000));
        let (excerpt, truncated) = truncate_text(&body, 8000);
        assert!(truncated);
        assert!(excerpt.starts_with(head_token));
        assert!(excerpt.contains(TRUNCATION_MARKER));
        assert!(excerpt.len() < body.len());
    }

    #[test]
    fn binary_detection_flags_nul_bytes() {
        assert!(looks_binary(&[0u8, 1, 2]));
        assert!(!looks_binary(b"plain text"));
    }

    #[test]
    fn capture_text_hashes_full_original_even_when_excerpted() {
        let body = "a".repeat(50_000);
        let captured = capture_text(body.as_bytes(), 100).unwrap();
        assert!(captured.truncated);
        assert_eq!(captured.original_len, 50_000);
        assert_eq!(captured.sha256, sha256_hex(body.as_bytes()));
    }

    #[test]
    fn synthesize_stderr_only_on_nonzero_exit_and_empty() {
        let (text, synth) = synthesize_stderr_if_empty("", 1);
        assert!(synth);
        assert!(text.contains("[synthetic_stderr]"));

        let (text, synth) = synthesize_stderr_if_empty("", 0);
        assert!(!synth);
        assert_eq!(text, "");

        let (text, synth) = synthesize_stderr_if_empty("real error", 1);
        assert!(!synth);
        assert_eq!(text, "real error");
    }

    #[test]
    fn warning_only_requires_all_lines_benign() {
        let stderr = "shell snapshot unsupported\nturn metadata header timeout\n";
        let c = classify_stderr_warnings(stderr);
        assert!(c.warning_only);
        assert_eq!(c.summary.len(), 2);
        assert!(c.unknown_lines.is_empty());
    }

    #[test]
    fn unknown_line_disqualifies_warning_only() {
        let stderr = "shell snapshot unsupported\nsomething truly broke\n";
        let c = classify_stderr_warnings(stderr);
        assert!(!c.warning_only);
        assert_eq!(c.unknown_lines, vec!["something truly broke".to_string()]);
    }

    #[test]
    fn policy_denial_distinguishes_heredoc_variant() {
        let (denied, heredoc) = classify_policy_denial("bash: Permission denied: heredoc blocked");
        assert!(denied);
        assert!(heredoc);

        let (denied, heredoc) = classify_policy_denial("Permission denied");
        assert!(denied);
        assert!(!heredoc);

        let (denied, heredoc) = classify_policy_denial("command not found");
        assert!(!denied);
        assert!(!heredoc);
    }

    #[test]
    fn failure_artifact_writer_persists_expected_files() {
        let dir = tempfile::tempdir().unwrap();
        let w = FailureArtifactWriter::create_command(dir.path(), 1).unwrap();
        let timing = Timing {
            started_at: "2026-01-01T00:00:00+00:00".into(),
            finished_at: "2026-01-01T00:00:01+00:00".into(),
            duration_ms: 1000,
        };
        w.write_command(
            &serde_json::json!({"argv": ["false"]}),
            b"",
            b"boom",
            &timing,
            8000,
        )
        .unwrap();
        assert!(w.dir().join("command.json").exists());
        assert!(w.dir().join("stdout.txt").exists());
        assert!(w.dir().join("stderr.txt").exists());
        assert!(w.dir().join("timing.json").exists());
        assert_eq!(std::fs::read_to_string(w.dir().join("stderr.txt")).unwrap(), "boom");
    }
}

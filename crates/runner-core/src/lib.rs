//! Stable contract types for the agent-run orchestrator.
//!
//! This crate defines the data that crosses crate boundaries: the inputs to
//! one run ([`RunRequest`]), the process-wide [`RunnerConfig`], the resolved
//! [`EffectiveRunSpec`], the canonical event schema ([`CanonicalEvent`]), the
//! derived [`Metrics`], and small value types (`AgentId`, `ExecBackendKind`)
//! shared by every other crate. Nothing here spawns a process or touches the
//! filesystem; see `runner-workspace`, `runner-process`, `runner-sandbox` for
//! that.

#![deny(unsafe_code)]
#![warn(missing_docs)]

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Contract version embedded in `effective_run_spec.json` for forward compatibility.
pub const CONTRACT_VERSION: &str = "runner/v1";

// ---------------------------------------------------------------------------
// AgentId / ExecBackendKind
// ---------------------------------------------------------------------------

/// Identifies which coding-assistant CLI backend drives a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum AgentId {
    /// Anthropic's `claude` CLI.
    Claude,
    /// OpenAI's `codex` CLI.
    Codex,
    /// Google's `gemini` CLI.
    Gemini,
}

impl AgentId {
    /// The conventional binary name for this agent, used as the PATH-search default.
    pub fn default_binary_name(&self) -> &'static str {
        match self {
            Self::Claude => "claude",
            Self::Codex => "codex",
            Self::Gemini => "gemini",
        }
    }

    /// Stable lowercase string, as used in run-directory paths and CLI `--agent`.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Claude => "claude",
            Self::Codex => "codex",
            Self::Gemini => "gemini",
        }
    }
}

impl std::str::FromStr for AgentId {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "claude" => Ok(Self::Claude),
            "codex" => Ok(Self::Codex),
            "gemini" => Ok(Self::Gemini),
            other => Err(format!("unknown agent id: {other}")),
        }
    }
}

impl std::fmt::Display for AgentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which execution backend drives the agent's child process (spec §4.3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum ExecBackendKind {
    /// Agent runs as a direct child process of the orchestrator.
    #[default]
    Local,
    /// Agent runs inside a long-lived Docker container.
    Docker,
}

// ---------------------------------------------------------------------------
// RunRequest
// ---------------------------------------------------------------------------

/// The immutable inputs to a single run, as supplied by the `run` CLI
/// subcommand or a programmatic caller.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct RunRequest {
    /// Target locator: filesystem path, git URL, or `pip:<requirements>`.
    pub repo_input: String,
    /// Which agent CLI drives this run.
    pub agent: AgentId,
    /// Named policy (capability/tool allow-deny profile) to apply.
    pub policy: String,
    /// Explicit persona id override; `None` uses the catalog default.
    #[serde(default)]
    pub persona_id: Option<String>,
    /// Explicit mission id override; `None` uses the catalog default.
    #[serde(default)]
    pub mission_id: Option<String>,
    /// Deterministic seed distinguishing concurrent runs of the same target/agent.
    #[serde(default)]
    pub seed: u64,
    /// Model override passed through to the adapter.
    #[serde(default)]
    pub model: Option<String>,
    /// Execution backend selection.
    #[serde(default)]
    pub exec_backend: ExecBackendKind,
    /// Docker build-context directory, required when `exec_backend == Docker`.
    #[serde(default)]
    pub exec_docker_context: Option<PathBuf>,
    /// Operator-supplied post-run verification commands.
    #[serde(default)]
    pub verify: Vec<String>,
    /// Rewrite `AGENTS.md`/`CLAUDE.md`-style filenames in persisted persona/mission source.
    #[serde(default)]
    pub obfuscate_agent_docs: bool,
    /// Retain the acquired workspace instead of deleting it on completion.
    #[serde(default)]
    pub keep_workspace: bool,
}

// ---------------------------------------------------------------------------
// RunnerConfig
// ---------------------------------------------------------------------------

/// Per-agent configuration: binary resolution and output format.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default)]
pub struct AgentConfigEntry {
    /// Binary name or path; relative names are resolved via PATH (`runner-which`).
    #[serde(default)]
    pub binary: Option<String>,
    /// Extra environment variables injected for this agent's process.
    #[serde(default)]
    pub env: BTreeMap<String, String>,
}

/// Per-policy capability profile (spec §4.3.a, §4.4, §7).
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default)]
pub struct PolicyEntry {
    /// Whether this policy allows the agent to edit files in the workspace.
    #[serde(default)]
    pub allow_edits: bool,
    /// Tool names the agent is allowed to invoke (empty = backend default).
    #[serde(default)]
    pub allowed_tools: Vec<String>,
    /// Approval mode string passed to backends that support one (e.g. gemini).
    #[serde(default)]
    pub approval_mode: Option<String>,
    /// Maximum number of agent turns, when the backend supports a limit.
    #[serde(default)]
    pub max_turns: Option<u32>,
}

/// Process-wide resolved configuration: the agents map and the policies map
/// (spec §3 `RunnerConfig`). Loaded once per process from a TOML file.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default)]
pub struct RunnerConfig {
    /// Root directory under which run directories are created.
    #[serde(default = "default_runs_root")]
    pub runs_root: PathBuf,
    /// Catalog root directory for personas/missions (see `runner-catalog`).
    #[serde(default = "default_catalog_root")]
    pub catalog_root: PathBuf,
    /// Per-agent binary/env configuration, keyed by `AgentId::as_str()`.
    #[serde(default)]
    pub agents: BTreeMap<String, AgentConfigEntry>,
    /// Per-policy capability configuration, keyed by policy name.
    #[serde(default)]
    pub policies: BTreeMap<String, PolicyEntry>,
}

fn default_runs_root() -> PathBuf {
    PathBuf::from("./runs")
}

fn default_catalog_root() -> PathBuf {
    PathBuf::from("./catalog")
}

impl RunnerConfig {
    /// Look up a policy by name, falling back to a conservative (no-edits) default.
    pub fn policy(&self, name: &str) -> PolicyEntry {
        self.policies.get(name).cloned().unwrap_or_default()
    }

    /// Look up the agent config entry for `agent`, or an empty default.
    pub fn agent_config(&self, agent: AgentId) -> AgentConfigEntry {
        self.agents.get(agent.as_str()).cloned().unwrap_or_default()
    }
}

// ---------------------------------------------------------------------------
// EffectiveRunSpec
// ---------------------------------------------------------------------------

/// The flattened product of persona + mission + template + schema resolution
/// (spec §3 `EffectiveRunSpec`, §4.1).
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct EffectiveRunSpec {
    /// Contract version this spec was produced under.
    #[serde(default = "default_contract_version")]
    pub contract_version: String,
    /// Resolved persona id.
    pub persona_id: String,
    /// Resolved mission id.
    pub mission_id: String,
    /// Persona body after `extends` composition.
    pub persona_resolved: String,
    /// Mission body after `extends` composition.
    pub mission_resolved: String,
    /// Prompt template text as loaded from disk.
    pub prompt_template: String,
    /// Fully-rendered prompt text (after `${var}` substitution).
    pub prompt_rendered: String,
    /// Loaded JSON Schema the mission's report must satisfy.
    pub report_schema: serde_json::Value,
    /// Whether the mission requires shell-capable tooling.
    #[serde(default)]
    pub requires_shell: bool,
    /// Whether the mission requires the agent to be allowed to edit files.
    #[serde(default)]
    pub requires_edits: bool,
}

fn default_contract_version() -> String {
    CONTRACT_VERSION.to_string()
}

// ---------------------------------------------------------------------------
// AcquiredTarget
// ---------------------------------------------------------------------------

/// How the target workspace was materialized (spec §3, §4.2).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum AcquisitionMode {
    /// Filesystem path copied into the run's workspace directory.
    Copy,
    /// Git URL shallow-cloned into the run's workspace directory.
    Clone,
    /// `pip:<requirements>` locator materialized as a synthetic dependency-only tree.
    Pip,
}

/// A workspace directory acquired for one run, rooted at a valid git working
/// tree (spec §3 `AcquiredTarget`, §4.2).
#[derive(Debug, Clone)]
pub struct AcquiredTarget {
    /// Absolute path to the acquired workspace root.
    pub root: PathBuf,
    /// How the workspace was materialized.
    pub mode: AcquisitionMode,
    /// Commit SHA of the snapshot, or the sentinel `"unavailable"` for `pip:` locators.
    pub commit_sha: String,
}

impl AcquiredTarget {
    /// Convenience: the JSON-serializable `{mode, commit_sha}` pair used in `target_ref.json`.
    pub fn as_ref_fields(&self) -> (String, String) {
        (
            match self.mode {
                AcquisitionMode::Copy => "copy".to_string(),
                AcquisitionMode::Clone => "clone".to_string(),
                AcquisitionMode::Pip => "pip".to_string(),
            },
            self.commit_sha.clone(),
        )
    }
}

/// `target_ref.json` contents (spec §6).
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct TargetRef {
    /// Locator as given on the CLI.
    pub repo_input: String,
    /// Agent id driving the run.
    pub agent: AgentId,
    /// Policy name applied to the run.
    pub policy: String,
    /// Seed distinguishing concurrent runs.
    pub seed: u64,
    /// Resolved persona id.
    pub persona_id: String,
    /// Resolved mission id.
    pub mission_id: String,
    /// Commit SHA of the acquired target, when available.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub commit_sha: Option<String>,
    /// Acquisition mode (`copy`/`clone`/`pip`).
    pub acquisition_mode: String,
    /// Model override, when given.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
}

// ---------------------------------------------------------------------------
// CanonicalEvent (spec §3, §4.5, §6)
// ---------------------------------------------------------------------------

/// The canonical, backend-agnostic event kinds every adapter's normalizer
/// must translate its raw stream into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    /// Agent produced a text message (assistant turn, thinking, etc).
    AgentMessage,
    /// Agent read a file.
    ReadFile,
    /// Agent wrote (or modified) a file.
    WriteFile,
    /// Agent ran a shell command.
    RunCommand,
    /// Agent invoked a named tool whose semantics are backend-specific.
    ToolCall,
    /// Agent performed a web search.
    WebSearch,
    /// The normalizer could not translate a raw line, or the backend reported an error.
    Error,
}

impl EventKind {
    /// True for kinds counted toward `Metrics::step_count` (spec §4.6).
    pub fn counts_as_step(&self) -> bool {
        !matches!(self, Self::AgentMessage | Self::Error)
    }
}

/// A single canonical event: `{ts, type, data}` (spec §3, §6).
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct CanonicalEvent {
    /// UTC ISO-8601 timestamp with second resolution.
    pub ts: DateTime<Utc>,
    /// The canonical event kind.
    #[serde(rename = "type")]
    pub kind: EventKind,
    /// Backend/event-specific payload (opaque map).
    pub data: serde_json::Map<String, serde_json::Value>,
}

impl CanonicalEvent {
    /// Construct a new canonical event from a kind and a serializable payload.
    pub fn new(ts: DateTime<Utc>, kind: EventKind, data: serde_json::Value) -> Self {
        let data = match data {
            serde_json::Value::Object(map) => map,
            other => {
                let mut map = serde_json::Map::new();
                map.insert("value".to_string(), other);
                map
            }
        };
        Self { ts, kind, data }
    }
}

// ---------------------------------------------------------------------------
// Metrics (spec §3, §4.6)
// ---------------------------------------------------------------------------

/// A single entry in `Metrics::failed_commands` (bounded at 10, spec §4.6).
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default)]
pub struct FailedCommandExcerpt {
    /// The command line as executed.
    pub command: String,
    /// Exit code, when known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
    /// True when stderr matched a known policy-denial marker.
    #[serde(default)]
    pub policy_denied: bool,
    /// True when the denial specifically matched the heredoc-in-sandboxed-shell variant.
    #[serde(default)]
    pub heredoc_variant: bool,
    /// Short excerpt of captured output, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub excerpt: Option<String>,
}

/// Derived metrics computed over `normalized_events.jsonl` (spec §3, §4.6).
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default)]
pub struct Metrics {
    /// Event counts keyed by canonical event type string.
    pub event_counts: BTreeMap<String, u64>,
    /// Distinct file paths read.
    pub distinct_files_read: u64,
    /// Distinct file paths written.
    pub distinct_files_written: u64,
    /// Distinct documentation files read (extension allowlist `{md,rst,txt,adoc}`).
    pub distinct_docs_read: u64,
    /// Total commands executed.
    pub commands_executed: u64,
    /// Total commands that failed (exit code != 0).
    pub commands_failed: u64,
    /// Up to 10 failed-command excerpts.
    pub failed_commands: Vec<FailedCommandExcerpt>,
    /// True when `commands_failed` exceeds the 10-entry excerpt cap.
    #[serde(default)]
    pub failed_commands_truncated: bool,
    /// Count of failed commands omitted from `failed_commands` due to the cap.
    #[serde(default)]
    pub failed_commands_omitted_count: u64,
    /// Total lines added across all `write_file` events.
    pub lines_added_total: u64,
    /// Total lines removed across all `write_file` events.
    pub lines_removed_total: u64,
    /// Count of events in `{read_file, write_file, run_command, web_search, tool_call}`.
    pub step_count: u64,
}

// ---------------------------------------------------------------------------
// ReportJson
// ---------------------------------------------------------------------------

/// The agent's machine-readable final artifact (spec §3 `ReportJson`).
///
/// This is intentionally a thin newtype: the mission's JSON Schema, not this
/// crate, defines the shape of the payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportJson(pub serde_json::Value);

// ---------------------------------------------------------------------------
// AdapterRunResult (spec §4.4)
// ---------------------------------------------------------------------------

/// The shared output contract every agent adapter returns after driving its
/// backend CLI to completion (spec §4.4: "Output: `{argv, exit_code,
/// raw_events_path, last_message_path, stderr_path}`").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdapterRunResult {
    /// Full argv the child process was launched with, prefix included.
    pub argv: Vec<String>,
    /// Process exit code, or `-1` if the child was killed before reporting one.
    pub exit_code: i32,
    /// Absolute path to the written `raw_events.jsonl`.
    pub raw_events_path: PathBuf,
    /// Absolute path to the written `agent_last_message.txt`.
    pub last_message_path: PathBuf,
    /// Absolute path to the written `agent_stderr.txt`.
    pub stderr_path: PathBuf,
    /// True if the run ended because a cancellation token was signalled.
    pub cancelled: bool,
    /// True if the run ended because an adapter-enforced timeout elapsed.
    pub timed_out: bool,
}

// ---------------------------------------------------------------------------
// Run directory naming (spec §3 invariant)
// ---------------------------------------------------------------------------

/// Produce a filesystem-safe slug from a target locator, for use as the
/// `<target_slug>` path segment.
pub fn target_slug(repo_input: &str) -> String {
    let base = repo_input
        .trim_end_matches('/')
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or(repo_input);
    let base = base.strip_suffix(".git").unwrap_or(base);
    let slug: String = base
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.' { c } else { '_' })
        .collect();
    if slug.is_empty() {
        "target".to_string()
    } else {
        slug
    }
}

/// Compact UTC timestamp (`YYYYmmddTHHMMSSZ`) for the run-directory path segment.
pub fn compact_timestamp(ts: DateTime<Utc>) -> String {
    ts.format("%Y%m%dT%H%M%SZ").to_string()
}

/// Compute the run directory path: `<runs_root>/<target_slug>/<ts>/<agent>/<seed>`
/// (spec §3 invariant: monotonically sortable).
pub fn run_directory(
    runs_root: &Path,
    repo_input: &str,
    ts: DateTime<Utc>,
    agent: AgentId,
    seed: u64,
) -> PathBuf {
    runs_root
        .join(target_slug(repo_input))
        .join(compact_timestamp(ts))
        .join(agent.as_str())
        .join(seed.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn target_slug_strips_dot_git_and_sanitizes() {
        assert_eq!(target_slug("https://example.com/org/My Repo.git"), "My_Repo");
        assert_eq!(target_slug("/abs/path/to/project"), "project");
        assert_eq!(target_slug("project/"), "project");
    }

    #[test]
    fn run_directory_is_monotonically_sortable_by_construction() {
        let ts = Utc.with_ymd_and_hms(2026, 2, 9, 0, 0, 0).unwrap();
        let dir = run_directory(Path::new("/runs"), "proj", ts, AgentId::Codex, 7);
        assert_eq!(dir, PathBuf::from("/runs/proj/20260209T000000Z/codex/7"));
    }

    #[test]
    fn event_kind_step_counting_excludes_message_and_error() {
        assert!(!EventKind::AgentMessage.counts_as_step());
        assert!(!EventKind::Error.counts_as_step());
        assert!(EventKind::RunCommand.counts_as_step());
        assert!(EventKind::ToolCall.counts_as_step());
    }

    #[test]
    fn agent_id_round_trips_through_str() {
        for agent in [AgentId::Claude, AgentId::Codex, AgentId::Gemini] {
            let s = agent.as_str();
            let parsed: AgentId = s.parse().unwrap();
            assert_eq!(parsed, agent);
        }
    }

    #[test]
    fn policy_lookup_falls_back_to_default() {
        let cfg = RunnerConfig::default();
        let p = cfg.policy("nonexistent");
        assert!(!p.allow_edits);
    }
}

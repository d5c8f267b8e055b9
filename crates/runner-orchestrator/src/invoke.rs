// SPDX-License-Identifier: MIT OR Apache-2.0
//! `invoke_agent` and `normalize_events` (spec §4.4, §4.5): dispatch across
//! the three adapter crates by [`AgentId`], the only place in the
//! orchestrator that names a specific agent (spec §9 "Agent polymorphism").

use std::path::Path;

use adapter_claude::{ClaudeAdapterConfig, ClaudeRunRequest};
use adapter_codex::{CodexAdapterConfig, CodexRunRequest};
use adapter_gemini::{GeminiAdapterConfig, GeminiRunRequest};
use runner_backend::ExecutionBackend;
use runner_core::{AdapterRunResult, AgentId, PolicyEntry, RunRequest, RunnerConfig};
use runner_error::RunnerError;
use runner_process::CancelToken;

/// Drive the configured agent's CLI end to end, returning its
/// [`AdapterRunResult`] (argv, exit code, and the three output paths).
pub async fn invoke_agent(
    request: &RunRequest,
    config: &RunnerConfig,
    policy: &PolicyEntry,
    backend: &dyn ExecutionBackend,
    prompt: &str,
    run_dir: &Path,
    cancel: &CancelToken,
) -> Result<AdapterRunResult, RunnerError> {
    let agent_config = config.agent_config(request.agent);
    let binary = agent_config.binary.clone().unwrap_or_else(|| request.agent.default_binary_name().to_string());
    let raw_events_path = run_dir.join("raw_events.jsonl");
    let last_message_path = run_dir.join("agent_last_message.txt");
    let stderr_path = run_dir.join("agent_stderr.txt");
    let env_overrides = agent_config.env.clone();

    match request.agent {
        AgentId::Claude => {
            let mut cfg = ClaudeAdapterConfig::new(binary);
            cfg.model = request.model.clone();
            cfg.max_turns = policy.max_turns;
            cfg.permission_mode = policy.approval_mode.clone();
            cfg.allowed_tools = policy.allowed_tools.clone();
            let req = ClaudeRunRequest {
                prompt,
                raw_events_path,
                last_message_path,
                stderr_path,
                env_overrides,
                timeout: None,
            };
            adapter_claude::run_claude(&cfg, backend, req, cancel).await
        }
        AgentId::Codex => {
            let mut cfg = CodexAdapterConfig::new(binary);
            cfg.model = request.model.clone();
            let req = CodexRunRequest {
                prompt,
                raw_events_path,
                last_message_path,
                stderr_path,
                env_overrides,
                timeout: None,
            };
            adapter_codex::run_codex(&cfg, backend, req, cancel).await
        }
        AgentId::Gemini => {
            let mut cfg = GeminiAdapterConfig::new(binary);
            cfg.model = request.model.clone();
            if let Some(mode) = policy.approval_mode.clone() {
                cfg.approval_mode = mode;
            }
            cfg.allowed_tools = policy.allowed_tools.clone();
            let req = GeminiRunRequest {
                prompt,
                raw_events_path,
                last_message_path,
                stderr_path,
                env_overrides,
                timeout: None,
            };
            adapter_gemini::run_gemini(&cfg, backend, req, cancel).await
        }
    }
}

/// Translate `raw_events.jsonl` into `normalized_events.jsonl` through the
/// agent-specific normalizer, returning the event count written.
pub fn normalize_events(
    agent: AgentId,
    raw_events_path: &Path,
    normalized_events_path: &Path,
    run_dir: &Path,
    workspace_mount: Option<&str>,
) -> Result<u64, RunnerError> {
    match agent {
        AgentId::Claude => adapter_claude::normalize_claude_events(raw_events_path, normalized_events_path, run_dir, workspace_mount),
        AgentId::Codex => adapter_codex::normalize_codex_events(raw_events_path, normalized_events_path, run_dir, workspace_mount),
        AgentId::Gemini => adapter_gemini::normalize_gemini_events(raw_events_path, normalized_events_path, run_dir, workspace_mount),
    }
}

/// Scan the agent's final message for a provider-reported quota exhaustion,
/// when the agent supports detecting one. Only Claude currently surfaces a
/// distinguishable quota marker in its last-message text (spec §4.6, §8
/// scenario 3); Codex/Gemini quota exhaustion, if it occurs, falls through
/// to the generic non-zero-exit classification.
pub fn detect_quota_exceeded(agent: AgentId, last_message_text: &str) -> Option<RunnerError> {
    match agent {
        AgentId::Claude => adapter_claude::detect_quota_exceeded(last_message_text),
        AgentId::Codex | AgentId::Gemini => None,
    }
}

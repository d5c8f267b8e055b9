// SPDX-License-Identifier: MIT OR Apache-2.0
//! Run orchestration: the single async pipeline that turns a [`RunRequest`]
//! into a populated run directory (spec §2 control-flow, §4.8).
//!
//! `run_request` is the one public entry point. It threads a single mutable
//! [`RunContext`] through an ordered list of fallible stages — resolve the
//! run spec, acquire the target, preflight it, prepare an execution
//! backend, invoke the agent, normalize its events, extract and validate
//! its report, compute metrics, capture a diff, run verification commands
//! — and guarantees that whichever stage fails first, the run directory
//! still ends up with every artifact that stage's predecessors produced
//! plus a terminal `error.json`/`report.md`. There is no early-return path
//! that skips finalization: every exit goes through [`finalize::finalize`].

#![deny(unsafe_code)]
#![warn(missing_docs)]

/// Atomic (write-then-rename) artifact persistence helpers.
pub mod atomic;
/// Execution backend selection and Docker sandbox preparation.
pub mod backend;
/// Shared pipeline state and the execution-backend teardown guard.
pub mod context;
/// Agent-outcome and report-validation failure classification.
pub mod failure;
/// Terminal artifact writing (metrics, report/error, diagnostics).
pub mod finalize;
/// Agent invocation and raw-to-canonical event normalization.
pub mod invoke;
/// Pre-invocation capability checks.
pub mod preflight;
/// Report extraction and markdown rendering.
pub mod report;
/// Post-run verification command execution.
pub mod verify;

use std::collections::BTreeMap;
use std::path::PathBuf;

use runner_catalog::{resolve_run_spec, Catalog};
use runner_core::{
    run_directory, AcquiredTarget, EffectiveRunSpec, Metrics, RunRequest, RunnerConfig, TargetRef,
};
use runner_error::RunnerError;
use runner_policy::PolicyEngine;
use runner_process::CancelToken;
use runner_workspace::{acquire, classify_locator};
use serde_json::Value;

use crate::context::{BackendGuard, RunContext};
use crate::finalize::{finalize, load_normalized_events, FinalizeInput};

/// Outcome of a single completed (or aborted) run.
///
/// `error` is `None` iff the agent produced a schema-valid report and every
/// configured verification command exited `0` (spec §8: "exit code 0 iff
/// `error.json` is absent").
pub struct RunOutcome {
    /// The run's artifact directory, always populated.
    pub run_dir: PathBuf,
    /// The terminal error, if the run did not fully succeed.
    pub error: Option<RunnerError>,
}

impl RunOutcome {
    /// Process exit code for this outcome (spec §6 CLI surface):
    /// `0` success, `2` invalid-arguments/config errors or a preflight
    /// rejection, `1` everything else.
    pub fn exit_code(&self) -> i32 {
        match &self.error {
            None => 0,
            Some(err) if err.category() == runner_error::ErrorCategory::Config => 2,
            Some(err) if err.code == runner_error::ErrorCode::AgentPreflightFailed => 2,
            Some(_) => 1,
        }
    }
}

/// Run one agent invocation end to end.
///
/// This is the crate's only public entry point. It never panics on
/// ordinary failure: every stage's error is caught, classified, and
/// written to `error.json`, and the function always returns a
/// [`RunOutcome`] rather than propagating `Result`.
pub async fn run_request(request: RunRequest, config: &RunnerConfig, cancel: &CancelToken) -> RunOutcome {
    let now = chrono::Utc::now();
    let run_dir = run_directory(&config.runs_root, &request.repo_input, now, request.agent, request.seed);

    let ctx = match RunContext::new(run_dir.clone()) {
        Ok(ctx) => ctx,
        Err(err) => return RunOutcome { run_dir, error: Some(err) },
    };

    let mut state = PartialState::new(&request);

    let outcome = run_stages(&request, config, cancel, &ctx, &mut state).await;

    match outcome {
        Ok(()) => RunOutcome { run_dir: ctx.run_dir, error: None },
        Err(err) => RunOutcome { run_dir: ctx.run_dir, error: Some(err) },
    }
}

/// Bookkeeping accumulated as stages succeed, so that whichever stage fails
/// first, [`finalize`] still receives every artifact its predecessors
/// produced (spec §3 invariant: "artifacts already written by completed
/// stages are never rolled back").
struct PartialState<'a> {
    request: &'a RunRequest,
    effective_spec: Option<EffectiveRunSpec>,
    target: Option<AcquiredTarget>,
    policy: Option<PolicyEngine>,
    backend_guard: Option<BackendGuard>,
    metrics: Option<Metrics>,
    report: Option<Value>,
}

impl<'a> PartialState<'a> {
    fn new(request: &'a RunRequest) -> Self {
        Self {
            request,
            effective_spec: None,
            target: None,
            policy: None,
            backend_guard: None,
            metrics: None,
            report: None,
        }
    }

    /// Build the best `target_ref.json` we can from whatever stages completed.
    fn target_ref(&self) -> TargetRef {
        let (acquisition_mode, commit_sha) = match &self.target {
            Some(t) => {
                let (mode, sha) = t.as_ref_fields();
                (mode, Some(sha))
            }
            None => ("unknown".to_string(), None),
        };
        TargetRef {
            repo_input: self.request.repo_input.clone(),
            agent: self.request.agent,
            policy: self.request.policy.clone(),
            seed: self.request.seed,
            persona_id: self
                .effective_spec
                .as_ref()
                .map(|s| s.persona_id.clone())
                .unwrap_or_else(|| "unknown".to_string()),
            mission_id: self
                .effective_spec
                .as_ref()
                .map(|s| s.mission_id.clone())
                .unwrap_or_else(|| "unknown".to_string()),
            commit_sha,
            acquisition_mode,
            model: self.request.model.clone(),
        }
    }
}

/// Run every pipeline stage in order, short-circuiting (but always
/// finalizing) on the first error.
async fn run_stages(
    request: &RunRequest,
    config: &RunnerConfig,
    cancel: &CancelToken,
    ctx: &RunContext,
    state: &mut PartialState<'_>,
) -> Result<(), RunnerError> {
    let run_dir = &ctx.run_dir;

    let catalog = match Catalog::load(&config.catalog_root) {
        Ok(c) => c,
        Err(err) => return finish_with_error(run_dir, state, err).await,
    };

    let extra_vars: BTreeMap<String, String> = BTreeMap::new();
    let effective_spec = match resolve_run_spec(
        &catalog,
        request.persona_id.as_deref(),
        request.mission_id.as_deref(),
        &extra_vars,
    ) {
        Ok(spec) => spec,
        Err(err) => return finish_with_error(run_dir, state, err).await,
    };
    if let Err(err) = persist_catalog_artifacts(run_dir, request, &catalog, &effective_spec) {
        return finish_with_error(run_dir, state, err).await;
    }
    state.effective_spec = Some(effective_spec);
    let effective_spec = state.effective_spec.as_ref().unwrap().clone();

    if let Err(err) = preflight::check(request.exec_backend, &effective_spec) {
        return finish_with_error(run_dir, state, err).await;
    }

    if cancel.is_cancelled() {
        return finish_with_error(run_dir, state, cancelled_error()).await;
    }

    let locator = classify_locator(&request.repo_input);
    let workspace_parent = run_dir.join("workspace");
    let target = match acquire(&locator, &workspace_parent, &[], &[]) {
        Ok(t) => t,
        Err(err) => return finish_with_error(run_dir, state, err).await,
    };
    state.target = Some(target);

    let policy_entry = config.policy(&request.policy);
    let policy = match PolicyEngine::new(&policy_entry) {
        Ok(p) => p,
        Err(err) => return finish_with_error(run_dir, state, err).await,
    };
    state.policy = Some(policy);

    let backend = match backend::prepare_backend(request, config, state.target.as_ref().unwrap(), run_dir).await {
        Ok(b) => b,
        Err(err) => return finish_with_error(run_dir, state, err).await,
    };
    state.backend_guard = Some(BackendGuard::new(backend));

    if cancel.is_cancelled() {
        return finish_with_error(run_dir, state, cancelled_error()).await;
    }

    let prompt = effective_spec.prompt_rendered.clone();
    let guard = state.backend_guard.as_ref().unwrap();
    let adapter_result =
        match invoke::invoke_agent(request, config, &policy_entry, guard.get(), &prompt, run_dir, cancel).await {
            Ok(r) => r,
            Err(err) => return finish_with_error(run_dir, state, err).await,
        };

    let normalized_events_path = run_dir.join("normalized_events.jsonl");
    let workspace_mount = guard.get().workspace_mount().to_string_lossy().into_owned();
    if let Err(err) = invoke::normalize_events(
        request.agent,
        &adapter_result.raw_events_path,
        &normalized_events_path,
        run_dir,
        Some(workspace_mount.as_str()),
    ) {
        return finish_with_error(run_dir, state, err).await;
    }

    let events = load_normalized_events(&normalized_events_path);
    state.metrics = Some(runner_telemetry::compute_metrics(&events));

    let last_message_text = std::fs::read_to_string(&adapter_result.last_message_path).unwrap_or_default();
    let (stderr_text, _synthesized) = {
        let raw = std::fs::read_to_string(&adapter_result.stderr_path).unwrap_or_default();
        runner_capture::synthesize_stderr_if_empty(&raw, adapter_result.exit_code)
    };

    if let Some(err) = failure::classify_agent_outcome(request.agent, &adapter_result, &last_message_text, &stderr_text) {
        return finish_with_error(run_dir, state, err).await;
    }
    if let Some(err) = invoke::detect_quota_exceeded(request.agent, &last_message_text) {
        return finish_with_error(run_dir, state, err).await;
    }

    let workspace_root = state.target.as_ref().unwrap().root.clone();
    let report = report::extract_report(&events, &adapter_result.last_message_path, &workspace_root);
    let report = match report {
        Some(r) => r,
        None => return finish_with_error(run_dir, state, failure::missing_report_error()).await,
    };

    let schema_errors = match runner_validate::compile_schema(&effective_spec.report_schema) {
        Ok(schema) => runner_validate::validate_report(&schema, &report),
        Err(err) => return finish_with_error(run_dir, state, err).await,
    };
    if !schema_errors.is_empty() {
        return finish_with_error(run_dir, state, failure::report_validation_error(schema_errors)).await;
    }
    state.report = Some(report);

    if cancel.is_cancelled() {
        return finish_with_error(run_dir, state, cancelled_error()).await;
    }

    if !request.verify.is_empty() {
        let guard = state.backend_guard.as_ref().unwrap();
        if let Err(err) = verify::run_verification(&request.verify, guard.get(), run_dir, cancel).await {
            return finish_with_error(run_dir, state, err).await;
        }
    }

    finish_success(run_dir, state).await
}

/// Persist the catalog-derived text artifacts (spec §6): persona/mission
/// source and resolved bodies, the prompt template and its rendering, and
/// the mission's report JSON Schema.
fn persist_catalog_artifacts(
    run_dir: &std::path::Path,
    request: &RunRequest,
    catalog: &Catalog,
    effective_spec: &EffectiveRunSpec,
) -> Result<(), RunnerError> {
    use crate::atomic::{write_json, write_text};

    if let Some(source) = catalog.persona_source(&effective_spec.persona_id) {
        write_text(&run_dir.join("persona.source.md"), &obfuscate_if_requested(request, source))?;
    }
    if let Some(source) = catalog.mission_source(&effective_spec.mission_id) {
        write_text(&run_dir.join("mission.source.md"), &obfuscate_if_requested(request, source))?;
    }
    write_text(&run_dir.join("persona.resolved.md"), &effective_spec.persona_resolved)?;
    write_text(&run_dir.join("mission.resolved.md"), &effective_spec.mission_resolved)?;
    write_text(&run_dir.join("prompt.template.md"), &effective_spec.prompt_template)?;
    write_text(&run_dir.join("prompt.txt"), &effective_spec.prompt_rendered)?;
    write_json(&run_dir.join("report.schema.json"), &effective_spec.report_schema)?;
    write_json(&run_dir.join("effective_run_spec.json"), effective_spec)?;
    Ok(())
}

/// Rewrite agent-doc filenames referenced in persisted persona/mission text
/// when the operator asked for it (spec §6 `--obfuscate-agent-docs`), via
/// [`runner_catalog::obfuscate_agent_doc_references`].
fn obfuscate_if_requested(request: &RunRequest, text: &str) -> String {
    if !request.obfuscate_agent_docs {
        return text.to_string();
    }
    runner_catalog::obfuscate_agent_doc_references(text)
}

fn cancelled_error() -> RunnerError {
    RunnerError::new(
        runner_error::ErrorCode::Cancelled,
        "run was cancelled",
        "re-run once the cancellation source (signal/timeout) is resolved",
    )
}

async fn finish_with_error(
    run_dir: &std::path::Path,
    state: &mut PartialState<'_>,
    err: RunnerError,
) -> Result<(), RunnerError> {
    let target_ref = state.target_ref();
    let diff_root = diff_root_if_allowed(state).map(|p| p.to_path_buf());
    let sandbox_dir = run_dir.join("sandbox");
    let sandbox_dir = sandbox_dir.is_dir().then_some(sandbox_dir);

    let finalize_result = finalize(FinalizeInput {
        run_dir,
        target_ref: &target_ref,
        metrics: state.metrics.as_ref(),
        report: state.report.as_ref(),
        error: Some(&err),
        diff_workspace_root: diff_root.as_deref(),
        sandbox_dir: sandbox_dir.as_deref(),
    })
    .await;

    close_backend(state).await;

    finalize_result?;
    Err(err)
}

async fn finish_success(run_dir: &std::path::Path, state: &mut PartialState<'_>) -> Result<(), RunnerError> {
    let target_ref = state.target_ref();
    let diff_root = diff_root_if_allowed(state).map(|p| p.to_path_buf());

    let finalize_result = finalize(FinalizeInput {
        run_dir,
        target_ref: &target_ref,
        metrics: state.metrics.as_ref(),
        report: state.report.as_ref(),
        error: None,
        diff_workspace_root: diff_root.as_deref(),
        sandbox_dir: None,
    })
    .await;

    close_backend(state).await;
    cleanup_workspace(state);

    finalize_result
}

fn diff_root_if_allowed<'s>(state: &'s PartialState<'_>) -> Option<&'s std::path::Path> {
    let allows_edits = state.policy.as_ref().map(|p| p.allows_edits()).unwrap_or(false);
    if !allows_edits {
        return None;
    }
    state.target.as_ref().map(|t| t.root.as_path())
}

async fn close_backend(state: &mut PartialState<'_>) {
    if let Some(guard) = state.backend_guard.take() {
        if let Err(err) = guard.close().await {
            tracing::error!(error = %err, "failed to close execution backend cleanly");
        }
    }
}

fn cleanup_workspace(state: &PartialState<'_>) {
    if state.request.keep_workspace {
        return;
    }
    if let Some(target) = &state.target {
        let _ = std::fs::remove_dir_all(&target.root);
    }
}

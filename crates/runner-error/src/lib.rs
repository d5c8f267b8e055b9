//! Unified error taxonomy for the agent-run orchestrator.
//!
//! Every orchestrator error carries an [`ErrorCode`] (a machine-readable,
//! stable string tag), a human-readable message, a **mandatory** remediation
//! [`hint`](RunnerError::hint), an optional cause chain, and arbitrary
//! structured detail. [`RunnerError::new`] enforces the hint at construction
//! time so no error can reach `error.json` (§6/§7 of the specification)
//! without one.

#![deny(unsafe_code)]
#![warn(missing_docs)]

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

// ---------------------------------------------------------------------------
// ErrorCategory
// ---------------------------------------------------------------------------

/// Broad family that an [`ErrorCode`] belongs to, per spec §7.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// Input/config errors, surfaced before any external process runs.
    Config,
    /// Workspace acquisition / git errors.
    Workspace,
    /// Execution backend (local/container) lifecycle errors.
    Backend,
    /// Agent adapter / process errors.
    Adapter,
    /// Report extraction/validation errors.
    Report,
    /// Verification-gate errors.
    Verification,
    /// Operator- or timeout-initiated cancellation.
    Cancellation,
    /// Catch-all for unexpected internal errors.
    Internal,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Config => "config",
            Self::Workspace => "workspace",
            Self::Backend => "backend",
            Self::Adapter => "adapter",
            Self::Report => "report",
            Self::Verification => "verification",
            Self::Cancellation => "cancellation",
            Self::Internal => "internal",
        };
        f.write_str(s)
    }
}

// ---------------------------------------------------------------------------
// ErrorCode
// ---------------------------------------------------------------------------

/// Machine-readable, stable error code, per the taxonomy in spec §7.
///
/// Each variant serialises to the exact lower/mixed-case string named in the
/// specification (not a blanket `SCREAMING_SNAKE_CASE`), because several
/// codes are consumed verbatim as `error.json`'s `type` field by downstream
/// aggregators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorCode {
    // -- Input/config errors --
    /// The run request itself is malformed.
    #[serde(rename = "invalid_run_spec")]
    InvalidRunSpec,
    /// Referenced persona id is not in the catalog.
    #[serde(rename = "unknown_persona_id")]
    UnknownPersonaId,
    /// Referenced mission id is not in the catalog.
    #[serde(rename = "unknown_mission_id")]
    UnknownMissionId,
    /// A mission's `prompt_template` path could not be resolved.
    #[serde(rename = "missing_prompt_template_file")]
    MissingPromptTemplateFile,
    /// A mission's `report_schema` path could not be resolved.
    #[serde(rename = "missing_report_schema_file")]
    MissingReportSchemaFile,
    /// A run-spec JSON document failed to parse.
    #[serde(rename = "runspec_json_parse_failed")]
    RunspecJsonParseFailed,
    /// No `persona_id` given and the catalog has no default.
    #[serde(rename = "missing_default_persona_id")]
    MissingDefaultPersonaId,
    /// No `mission_id` given and the catalog has no default.
    #[serde(rename = "missing_default_mission_id")]
    MissingDefaultMissionId,
    /// Two persona documents declared the same id.
    #[serde(rename = "duplicate_persona_id")]
    DuplicatePersonaId,
    /// Two mission documents declared the same id.
    #[serde(rename = "duplicate_mission_id")]
    DuplicateMissionId,
    /// A persona's `extends` chain contains a cycle.
    #[serde(rename = "persona_cycle")]
    PersonaCycle,
    /// Mission declared an `execution_mode` other than the supported one.
    #[serde(rename = "unsupported_execution_mode")]
    UnsupportedExecutionMode,
    /// A `${var}` placeholder in the prompt template had no substitution.
    #[serde(rename = "template_variable_missing")]
    TemplateVariableMissing,

    // -- Workspace errors --
    /// Target acquisition (copy/clone) failed.
    #[serde(rename = "target_acquire_failed")]
    TargetAcquireFailed,
    /// Acquired target is not (and could not be made into) a git working tree.
    #[serde(rename = "target_not_git")]
    TargetNotGit,
    /// Destination-inside-source relocation could not find a safe sibling path.
    #[serde(rename = "dest_inside_source_relocation_failed")]
    DestInsideSourceRelocationFailed,
    /// Generic OS-level I/O failure during workspace acquisition.
    #[serde(rename = "workspace_io_error")]
    WorkspaceIoError,

    // -- Backend errors --
    /// Docker daemon is not reachable.
    #[serde(rename = "docker_unavailable")]
    DockerUnavailable,
    /// Container image build failed.
    #[serde(rename = "image_build_failed")]
    ImageBuildFailed,
    /// Container failed to start.
    #[serde(rename = "container_start_failed")]
    ContainerStartFailed,
    /// A required binary is missing from `PATH`.
    #[serde(rename = "binary_missing")]
    BinaryMissing,

    // -- Adapter/process errors --
    /// Agent process could not be launched at all.
    #[serde(rename = "AgentLaunchFailed")]
    AgentLaunchFailed,
    /// Agent process ran but exited non-zero / failed.
    #[serde(rename = "AgentExecFailed")]
    AgentExecFailed,
    /// Provider-side quota/billing exhaustion detected.
    #[serde(rename = "AgentQuotaExceeded")]
    AgentQuotaExceeded,
    /// A backend-specific preflight check failed before invocation.
    #[serde(rename = "AgentPreflightFailed")]
    AgentPreflightFailed,
    /// Codex adapter observed an `apply_patch_approval_request` with no human present.
    #[serde(rename = "apply_patch_approval_request_denied")]
    ApplyPatchApprovalRequestDenied,
    /// Provider auth-refresh loop detected (`refresh_token_reused`).
    #[serde(rename = "refresh_token_reused")]
    RefreshTokenReused,

    // -- Report errors --
    /// Agent produced no machine-readable final artifact.
    #[serde(rename = "missing_report")]
    MissingReport,
    /// Agent's final JSON failed its mission schema.
    #[serde(rename = "report_validation_error")]
    ReportValidationError,

    // -- Verification errors --
    /// A verification command exited non-zero.
    #[serde(rename = "verification_failed")]
    VerificationFailed,
    /// Verification command was the literal rejection sentinel.
    #[serde(rename = "rejected_sentinel")]
    RejectedSentinel,

    // -- Cancellation --
    /// Run was cancelled by signal or timeout.
    #[serde(rename = "Cancelled")]
    Cancelled,

    // -- Internal --
    /// Catch-all for unexpected internal errors.
    #[serde(rename = "internal")]
    Internal,
}

impl ErrorCode {
    /// Returns the broad [`ErrorCategory`] this code belongs to.
    pub fn category(&self) -> ErrorCategory {
        use ErrorCode::*;
        match self {
            InvalidRunSpec
            | UnknownPersonaId
            | UnknownMissionId
            | MissingPromptTemplateFile
            | MissingReportSchemaFile
            | RunspecJsonParseFailed
            | MissingDefaultPersonaId
            | MissingDefaultMissionId
            | DuplicatePersonaId
            | DuplicateMissionId
            | PersonaCycle
            | UnsupportedExecutionMode
            | TemplateVariableMissing => ErrorCategory::Config,

            TargetAcquireFailed
            | TargetNotGit
            | DestInsideSourceRelocationFailed
            | WorkspaceIoError => ErrorCategory::Workspace,

            DockerUnavailable | ImageBuildFailed | ContainerStartFailed | BinaryMissing => {
                ErrorCategory::Backend
            }

            AgentLaunchFailed
            | AgentExecFailed
            | AgentQuotaExceeded
            | AgentPreflightFailed
            | ApplyPatchApprovalRequestDenied
            | RefreshTokenReused => ErrorCategory::Adapter,

            MissingReport | ReportValidationError => ErrorCategory::Report,

            VerificationFailed | RejectedSentinel => ErrorCategory::Verification,

            Cancelled => ErrorCategory::Cancellation,

            Internal => ErrorCategory::Internal,
        }
    }

    /// Stable `&'static str` representation, exactly as it appears in `error.json`'s `type`.
    pub fn as_str(&self) -> &'static str {
        use ErrorCode::*;
        match self {
            InvalidRunSpec => "invalid_run_spec",
            UnknownPersonaId => "unknown_persona_id",
            UnknownMissionId => "unknown_mission_id",
            MissingPromptTemplateFile => "missing_prompt_template_file",
            MissingReportSchemaFile => "missing_report_schema_file",
            RunspecJsonParseFailed => "runspec_json_parse_failed",
            MissingDefaultPersonaId => "missing_default_persona_id",
            MissingDefaultMissionId => "missing_default_mission_id",
            DuplicatePersonaId => "duplicate_persona_id",
            DuplicateMissionId => "duplicate_mission_id",
            PersonaCycle => "persona_cycle",
            UnsupportedExecutionMode => "unsupported_execution_mode",
            TemplateVariableMissing => "template_variable_missing",
            TargetAcquireFailed => "target_acquire_failed",
            TargetNotGit => "target_not_git",
            DestInsideSourceRelocationFailed => "dest_inside_source_relocation_failed",
            WorkspaceIoError => "workspace_io_error",
            DockerUnavailable => "docker_unavailable",
            ImageBuildFailed => "image_build_failed",
            ContainerStartFailed => "container_start_failed",
            BinaryMissing => "binary_missing",
            AgentLaunchFailed => "AgentLaunchFailed",
            AgentExecFailed => "AgentExecFailed",
            AgentQuotaExceeded => "AgentQuotaExceeded",
            AgentPreflightFailed => "AgentPreflightFailed",
            ApplyPatchApprovalRequestDenied => "apply_patch_approval_request_denied",
            RefreshTokenReused => "refresh_token_reused",
            MissingReport => "missing_report",
            ReportValidationError => "report_validation_error",
            VerificationFailed => "verification_failed",
            RejectedSentinel => "rejected_sentinel",
            Cancelled => "Cancelled",
            Internal => "internal",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// RunnerError
// ---------------------------------------------------------------------------

/// Unified orchestrator error.
///
/// Carries a stable [`ErrorCode`], a human-readable message, a mandatory
/// remediation hint, an optional underlying cause, and arbitrary structured
/// detail for `error.json`.
///
/// ```
/// use runner_error::{RunnerError, ErrorCode};
///
/// let err = RunnerError::new(
///     ErrorCode::BinaryMissing,
///     "could not find `claude` on PATH",
///     "install the Claude CLI or set agents.claude.binary to a full path",
/// )
/// .with_detail("agent", "claude");
/// assert!(!err.hint.is_empty());
/// ```
pub struct RunnerError {
    /// Machine-readable error code.
    pub code: ErrorCode,
    /// Human-readable description.
    pub message: String,
    /// Non-empty remediation hint (mandatory per spec §7).
    pub hint: String,
    /// Optional underlying cause.
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
    /// Arbitrary structured context/detail for diagnostics.
    pub details: BTreeMap<String, serde_json::Value>,
}

impl RunnerError {
    /// Create a new error. `hint` must describe the next actionable step; an
    /// empty hint is replaced with a generic fallback so the invariant in
    /// spec §7 ("every structured error has a non-empty hint") always holds.
    pub fn new(code: ErrorCode, message: impl Into<String>, hint: impl Into<String>) -> Self {
        let hint = hint.into();
        let hint = if hint.trim().is_empty() {
            "see message and details for remediation".to_string()
        } else {
            hint
        };
        Self {
            code,
            message: message.into(),
            hint,
            source: None,
            details: BTreeMap::new(),
        }
    }

    /// Attach a key-value pair to the diagnostic detail map.
    pub fn with_detail(mut self, key: impl Into<String>, value: impl Serialize) -> Self {
        if let Ok(v) = serde_json::to_value(value) {
            self.details.insert(key.into(), v);
        }
        self
    }

    /// Attach an underlying cause.
    pub fn with_source(mut self, source: impl std::error::Error + Send + Sync + 'static) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    /// Shorthand for `self.code.category()`.
    pub fn category(&self) -> ErrorCategory {
        self.code.category()
    }

    /// Render this error as a [`StructuredError`] suitable for `error.json`.
    ///
    /// Well-known detail keys (`subtype`, `provider_message`, `reset_time`,
    /// `stderr`, `stderr_synthesized`, `exit_code`, `errno`, `filename`,
    /// `rejected_sentinel`, `traceback_artifact`, `validation_errors`) are
    /// promoted to their typed fields; everything else stays in the
    /// catch-all `details` map. This lets
    /// call sites attach rich context with plain `with_detail` calls (see
    /// `adapter-claude::error::quota_exceeded`) without hand-building a
    /// [`StructuredError`] at every site.
    pub fn to_structured_error(&self) -> StructuredError {
        let mut details = self.details.clone();
        let take_str = |details: &mut BTreeMap<String, serde_json::Value>, key: &str| {
            details.remove(key).and_then(|v| v.as_str().map(String::from))
        };
        let subtype = take_str(&mut details, "subtype");
        let provider_message = take_str(&mut details, "provider_message");
        let reset_time = details.remove("reset_time");
        let stderr = take_str(&mut details, "stderr");
        let stderr_synthesized = details.remove("stderr_synthesized").and_then(|v| v.as_bool());
        let exit_code = details
            .remove("exit_code")
            .and_then(|v| v.as_i64())
            .map(|n| n as i32);
        let errno = details.remove("errno").and_then(|v| v.as_i64()).map(|n| n as i32);
        let filename = take_str(&mut details, "filename");
        let rejected_sentinel = details.remove("rejected_sentinel").and_then(|v| v.as_bool());
        let traceback_artifact = take_str(&mut details, "traceback_artifact");
        let report_validation_errors = details.remove("validation_errors").and_then(|v| {
            serde_json::from_value::<Vec<String>>(v).ok()
        });

        StructuredError {
            r#type: self.code.as_str().to_string(),
            subtype,
            code: Some(self.code.as_str().to_string()),
            message: Some(self.message.clone()),
            stderr,
            stderr_synthesized,
            exit_code,
            errno,
            filename,
            artifacts: None,
            provider_message,
            reset_time,
            report_validation_errors,
            rejected_sentinel,
            details,
            hint: self.hint.clone(),
            traceback_artifact,
        }
    }
}

impl fmt::Debug for RunnerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut d = f.debug_struct("RunnerError");
        d.field("code", &self.code);
        d.field("message", &self.message);
        d.field("hint", &self.hint);
        if let Some(ref src) = self.source {
            d.field("source", &src.to_string());
        }
        if !self.details.is_empty() {
            d.field("details", &self.details);
        }
        d.finish()
    }
}

impl fmt::Display for RunnerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {} (hint: {})", self.code.as_str(), self.message, self.hint)
    }
}

impl std::error::Error for RunnerError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_ref()
            .map(|e| e.as_ref() as &(dyn std::error::Error + 'static))
    }
}

// ---------------------------------------------------------------------------
// StructuredError (§3, §6, §7)
// ---------------------------------------------------------------------------

/// The JSON shape persisted as `error.json` whenever a run's exit code is
/// non-zero (spec §3 `StructuredError`, §6 "Structured error JSON").
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq)]
pub struct StructuredError {
    /// Failure kind / error code, always present.
    pub r#type: String,
    /// Finer-grained classification within `type` (e.g. quota subtype).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subtype: Option<String>,
    /// Stable machine-readable code (duplicates `type` for most codes).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    /// Human-readable message.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Captured stderr (verbatim, possibly excerpted per capture policy).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stderr: Option<String>,
    /// True when stderr was empty and the orchestrator synthesized a block.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stderr_synthesized: Option<bool>,
    /// Process exit code, when applicable.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
    /// OS errno, when the failure originated from an OS error.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub errno: Option<i32>,
    /// Filename associated with an OS error, when applicable.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
    /// Map of artifact name to run-directory-relative path.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub artifacts: Option<BTreeMap<String, String>>,
    /// Verbatim provider-side message (e.g. quota exhaustion text).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider_message: Option<String>,
    /// Provider-supplied quota reset time, recorded verbatim.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reset_time: Option<serde_json::Value>,
    /// JSON-Schema validation error paths (e.g. `$['a'].b[0]`).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub report_validation_errors: Option<Vec<String>>,
    /// True iff the verification gate saw the `rejected` sentinel.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rejected_sentinel: Option<bool>,
    /// Arbitrary structured detail.
    #[serde(skip_serializing_if = "BTreeMap::is_empty", default)]
    pub details: BTreeMap<String, serde_json::Value>,
    /// Non-empty remediation hint; mandatory per spec §7.
    pub hint: String,
    /// Run-directory-relative path to a captured traceback/panic artifact.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub traceback_artifact: Option<String>,
}

// ---------------------------------------------------------------------------
// FailureKind (§4.6 failure classification)
// ---------------------------------------------------------------------------

/// The failure-kind taxonomy used to classify a completed (non-zero-exit)
/// run, independent of the specific [`ErrorCode`] that caused it. Downstream
/// aggregators cluster on this value rather than parsing stderr.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Generic agent exec failure.
    Error,
    /// Final JSON failed its mission schema.
    ReportValidationError,
    /// Agent produced no machine-readable artifact.
    MissingReport,
    /// Provider quota/billing exhaustion.
    QuotaExhausted,
    /// Required binary or command was missing.
    BinaryOrCommandMissing,
    /// Provider-side capacity/resource exhaustion (not quota).
    ProviderCapacity,
    /// Provider-side authentication failure.
    ProviderAuth,
    /// Sandbox/tool policy denied an action.
    PermissionPolicy,
    /// Agent configuration itself was invalid.
    InvalidAgentConfig,
    /// Host disk was full.
    DiskFull,
    /// None of the above signals matched.
    Unknown,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Error => "error",
            Self::ReportValidationError => "report_validation_error",
            Self::MissingReport => "missing_report",
            Self::QuotaExhausted => "quota_exhausted",
            Self::BinaryOrCommandMissing => "binary_or_command_missing",
            Self::ProviderCapacity => "provider_capacity",
            Self::ProviderAuth => "provider_auth",
            Self::PermissionPolicy => "permission_policy",
            Self::InvalidAgentConfig => "invalid_agent_config",
            Self::DiskFull => "disk_full",
            Self::Unknown => "unknown",
        };
        f.write_str(s)
    }
}

/// Classify a failure from its high-level signals, per spec §4.6.
///
/// Precedence: an explicit error object wins over schema-validation errors,
/// which win over a bare terminal status string; anything else is `unknown`.
pub fn classify_failure_kind(
    status: &str,
    has_error_object: bool,
    validation_errors: &[String],
) -> FailureKind {
    let status_lower = status.trim().to_ascii_lowercase();
    if has_error_object {
        return FailureKind::Error;
    }
    if !validation_errors.is_empty() {
        return FailureKind::ReportValidationError;
    }
    match status_lower.as_str() {
        "error" => FailureKind::Error,
        "report_validation_error" => FailureKind::ReportValidationError,
        "missing_report" => FailureKind::MissingReport,
        _ => FailureKind::Unknown,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::io;

    const ALL_CODES: &[ErrorCode] = &[
        ErrorCode::InvalidRunSpec,
        ErrorCode::UnknownPersonaId,
        ErrorCode::UnknownMissionId,
        ErrorCode::MissingPromptTemplateFile,
        ErrorCode::MissingReportSchemaFile,
        ErrorCode::RunspecJsonParseFailed,
        ErrorCode::MissingDefaultPersonaId,
        ErrorCode::MissingDefaultMissionId,
        ErrorCode::DuplicatePersonaId,
        ErrorCode::DuplicateMissionId,
        ErrorCode::PersonaCycle,
        ErrorCode::UnsupportedExecutionMode,
        ErrorCode::TemplateVariableMissing,
        ErrorCode::TargetAcquireFailed,
        ErrorCode::TargetNotGit,
        ErrorCode::DestInsideSourceRelocationFailed,
        ErrorCode::WorkspaceIoError,
        ErrorCode::DockerUnavailable,
        ErrorCode::ImageBuildFailed,
        ErrorCode::ContainerStartFailed,
        ErrorCode::BinaryMissing,
        ErrorCode::AgentLaunchFailed,
        ErrorCode::AgentExecFailed,
        ErrorCode::AgentQuotaExceeded,
        ErrorCode::AgentPreflightFailed,
        ErrorCode::ApplyPatchApprovalRequestDenied,
        ErrorCode::RefreshTokenReused,
        ErrorCode::MissingReport,
        ErrorCode::ReportValidationError,
        ErrorCode::VerificationFailed,
        ErrorCode::RejectedSentinel,
        ErrorCode::Cancelled,
        ErrorCode::Internal,
    ];

    #[test]
    fn basic_construction_enforces_hint() {
        let err = RunnerError::new(ErrorCode::Internal, "boom", "");
        assert_eq!(err.hint, "see message and details for remediation");
    }

    #[test]
    fn display_contains_hint() {
        let err = RunnerError::new(ErrorCode::BinaryMissing, "no claude", "install claude");
        let s = err.to_string();
        assert!(s.contains("binary_missing"));
        assert!(s.contains("install claude"));
    }

    #[test]
    fn all_codes_have_unique_as_str() {
        let mut seen = HashSet::new();
        for code in ALL_CODES {
            assert!(seen.insert(code.as_str()), "duplicate as_str: {code:?}");
        }
        assert_eq!(seen.len(), ALL_CODES.len());
    }

    #[test]
    fn error_code_serde_matches_spec_strings() {
        assert_eq!(
            serde_json::to_string(&ErrorCode::DuplicatePersonaId).unwrap(),
            r#""duplicate_persona_id""#
        );
        assert_eq!(
            serde_json::to_string(&ErrorCode::AgentQuotaExceeded).unwrap(),
            r#""AgentQuotaExceeded""#
        );
        assert_eq!(
            serde_json::to_string(&ErrorCode::Cancelled).unwrap(),
            r#""Cancelled""#
        );
    }

    #[test]
    fn to_structured_error_always_has_hint_and_type() {
        let err = RunnerError::new(
            ErrorCode::ReportValidationError,
            "schema mismatch",
            "fix the report to satisfy report.schema.json",
        )
        .with_detail("paths", vec!["$.ok"]);
        let se = err.to_structured_error();
        assert_eq!(se.r#type, "report_validation_error");
        assert!(!se.hint.is_empty());
        assert_eq!(se.details["paths"], serde_json::json!(["$.ok"]));
    }

    #[test]
    fn with_source_preserves_chain() {
        let src = io::Error::new(io::ErrorKind::NotFound, "nope");
        let err = RunnerError::new(ErrorCode::TargetAcquireFailed, "copy failed", "check path")
            .with_source(src);
        let chained = std::error::Error::source(&err).unwrap();
        assert_eq!(chained.to_string(), "nope");
    }

    #[test]
    fn classify_precedence_error_wins() {
        let kind = classify_failure_kind("report_validation_error", true, &[]);
        assert_eq!(kind, FailureKind::Error);
    }

    #[test]
    fn classify_precedence_validation_errors_before_status() {
        let kind = classify_failure_kind("unknown", false, &["$.ok".to_string()]);
        assert_eq!(kind, FailureKind::ReportValidationError);
    }

    #[test]
    fn classify_status_fallback() {
        assert_eq!(
            classify_failure_kind("missing_report", false, &[]),
            FailureKind::MissingReport
        );
        assert_eq!(
            classify_failure_kind("something_else", false, &[]),
            FailureKind::Unknown
        );
    }

    #[test]
    fn failure_kind_display_matches_spec_strings() {
        assert_eq!(FailureKind::QuotaExhausted.to_string(), "quota_exhausted");
        assert_eq!(
            FailureKind::BinaryOrCommandMissing.to_string(),
            "binary_or_command_missing"
        );
    }

    #[test]
    fn category_groups_match_spec_taxonomy() {
        assert_eq!(ErrorCode::DockerUnavailable.category(), ErrorCategory::Backend);
        assert_eq!(ErrorCode::MissingReport.category(), ErrorCategory::Report);
        assert_eq!(ErrorCode::Cancelled.category(), ErrorCategory::Cancellation);
    }
}

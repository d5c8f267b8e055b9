#![deny(unsafe_code)]
//! `RunnerConfig` loading and persona/mission catalog resolution (spec §4.1).

use runner_core::{EffectiveRunSpec, RunnerConfig};
use runner_error::{ErrorCode, RunnerError};
use serde::Deserialize;
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};

// ---------------------------------------------------------------------------
// RunnerConfig loading
// ---------------------------------------------------------------------------

/// Resolve the `RunnerConfig` TOML path: an explicit path wins, then
/// `./runner.toml`, then `$XDG_CONFIG_HOME/runner/config.toml`
/// (falling back to `~/.config/runner/config.toml`).
pub fn resolve_config_path(explicit: Option<&Path>) -> Option<PathBuf> {
    if let Some(p) = explicit {
        return Some(p.to_path_buf());
    }

    let cwd_candidate = PathBuf::from("runner.toml");
    if cwd_candidate.is_file() {
        return Some(cwd_candidate);
    }

    let config_home = std::env::var_os("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .or_else(|| std::env::var_os("HOME").map(|h| PathBuf::from(h).join(".config")))?;
    let candidate = config_home.join("runner").join("config.toml");
    candidate.is_file().then_some(candidate)
}

/// Load a [`RunnerConfig`] from the resolved search path. When no file is
/// found anywhere in the search order, returns the all-defaults config.
pub fn load_runner_config(explicit: Option<&Path>) -> Result<RunnerConfig, RunnerError> {
    let Some(path) = resolve_config_path(explicit) else {
        return Ok(RunnerConfig::default());
    };

    let text = std::fs::read_to_string(&path).map_err(|e| {
        RunnerError::new(
            ErrorCode::InvalidRunSpec,
            format!("failed to read config file {}", path.display()),
            "check that the config file path exists and is readable",
        )
        .with_source(e)
    })?;

    toml::from_str(&text).map_err(|e| {
        RunnerError::new(
            ErrorCode::InvalidRunSpec,
            format!("failed to parse config file {}", path.display()),
            "fix the TOML syntax or schema of the config file",
        )
        .with_detail("error", e.to_string())
    })
}

// ---------------------------------------------------------------------------
// Persona/mission document parsing
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
struct Frontmatter {
    id: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    extends: Option<String>,
    #[serde(default)]
    execution_mode: Option<String>,
    #[serde(default)]
    prompt_template: Option<String>,
    #[serde(default)]
    report_schema: Option<String>,
    #[serde(default)]
    requires_shell: bool,
    #[serde(default)]
    requires_edits: bool,
}

/// A single parsed persona or mission document.
#[derive(Debug, Clone)]
pub struct DocumentSpec {
    /// Unique id within its kind.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Parent id this document inherits from, if any.
    pub extends: Option<String>,
    /// Markdown body (after the frontmatter block).
    pub body: String,
    /// Full source text, including the frontmatter block, as read from disk.
    pub raw: String,
    /// Mission-only: the declared execution mode.
    pub execution_mode: Option<String>,
    /// Mission-only: relative path to the prompt template.
    pub prompt_template: Option<String>,
    /// Mission-only: relative path to the report JSON Schema.
    pub report_schema: Option<String>,
    /// Mission-only: whether the mission requires shell-capable tooling.
    pub requires_shell: bool,
    /// Mission-only: whether the mission requires edit permission.
    pub requires_edits: bool,
}

fn parse_document(text: &str, path: &Path) -> Result<DocumentSpec, RunnerError> {
    let trimmed = text.strip_prefix('\u{feff}').unwrap_or(text);
    let rest = trimmed.strip_prefix("---").ok_or_else(|| invalid_doc(path, "document does not start with a '---' frontmatter delimiter"))?;
    let rest = rest.strip_prefix('\n').unwrap_or(rest);
    let end = rest
        .find("\n---")
        .ok_or_else(|| invalid_doc(path, "frontmatter block has no closing '---' delimiter"))?;
    let yaml = &rest[..end];
    let body = rest[end + 4..].trim_start_matches('\n').to_string();

    let fm: Frontmatter =
        serde_yaml::from_str(yaml).map_err(|e| invalid_doc(path, &e.to_string()))?;

    Ok(DocumentSpec {
        id: fm.id,
        name: fm.name,
        extends: fm.extends,
        body,
        raw: text.to_string(),
        execution_mode: fm.execution_mode,
        prompt_template: fm.prompt_template,
        report_schema: fm.report_schema,
        requires_shell: fm.requires_shell,
        requires_edits: fm.requires_edits,
    })
}

fn invalid_doc(path: &Path, detail: &str) -> RunnerError {
    RunnerError::new(
        ErrorCode::InvalidRunSpec,
        format!("malformed catalog document {}", path.display()),
        "check the YAML frontmatter block syntax at the top of the document",
    )
    .with_detail("error", detail.to_string())
}

fn load_documents(
    dir: &Path,
    suffix: &str,
    duplicate_code: ErrorCode,
) -> Result<BTreeMap<String, DocumentSpec>, RunnerError> {
    let mut out = BTreeMap::new();
    if !dir.is_dir() {
        return Ok(out);
    }

    let entries = std::fs::read_dir(dir).map_err(|e| {
        RunnerError::new(
            ErrorCode::InvalidRunSpec,
            format!("failed to read catalog directory {}", dir.display()),
            "check that catalog_root points at a readable directory",
        )
        .with_source(e)
    })?;

    for entry in entries {
        let entry = entry.map_err(|e| {
            RunnerError::new(
                ErrorCode::InvalidRunSpec,
                "failed to read a catalog directory entry",
                "check filesystem permissions on the catalog directory",
            )
            .with_source(e)
        })?;
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        if !name.ends_with(suffix) {
            continue;
        }

        let text = std::fs::read_to_string(&path).map_err(|e| {
            RunnerError::new(
                ErrorCode::InvalidRunSpec,
                format!("failed to read catalog document {}", path.display()),
                "check filesystem permissions on the catalog document",
            )
            .with_source(e)
        })?;
        let doc = parse_document(&text, &path)?;
        let id = doc.id.clone();
        if out.contains_key(&id) {
            return Err(RunnerError::new(
                duplicate_code,
                format!("duplicate catalog id '{id}'"),
                "rename one of the documents so catalog ids are unique",
            ));
        }
        out.insert(id, doc);
    }

    Ok(out)
}

fn resolve_extends(
    docs: &BTreeMap<String, DocumentSpec>,
    start_id: &str,
    unknown_code: ErrorCode,
    cycle_code: ErrorCode,
) -> Result<String, RunnerError> {
    let mut chain: Vec<&DocumentSpec> = Vec::new();
    let mut seen = HashSet::new();
    let mut current = start_id.to_string();

    loop {
        if !seen.insert(current.clone()) {
            return Err(RunnerError::new(
                cycle_code,
                format!("extends cycle detected involving '{current}'"),
                "break the cycle in the catalog documents' extends chain",
            ));
        }
        let doc = docs.get(&current).ok_or_else(|| {
            RunnerError::new(
                unknown_code,
                format!("catalog document references unknown id '{current}' via extends"),
                "fix the extends id or add the missing catalog document",
            )
        })?;
        chain.push(doc);
        match doc.extends.clone() {
            Some(parent) => current = parent,
            None => break,
        }
    }

    Ok(chain
        .iter()
        .rev()
        .map(|d| d.body.as_str())
        .collect::<Vec<_>>()
        .join("\n\n"))
}

// ---------------------------------------------------------------------------
// catalog.toml defaults
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Deserialize)]
struct CatalogDefaultsInner {
    #[serde(default)]
    default_persona_id: Option<String>,
    #[serde(default)]
    default_mission_id: Option<String>,
    #[serde(default)]
    templates_dir: Option<PathBuf>,
    #[serde(default)]
    schemas_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct CatalogToml {
    #[serde(flatten)]
    top: CatalogDefaultsInner,
    #[serde(default)]
    defaults: Option<CatalogDefaultsInner>,
}

impl CatalogToml {
    fn resolved(&self) -> CatalogDefaultsInner {
        let nested = self.defaults.clone().unwrap_or_default();
        CatalogDefaultsInner {
            default_persona_id: nested
                .default_persona_id
                .or_else(|| self.top.default_persona_id.clone()),
            default_mission_id: nested
                .default_mission_id
                .or_else(|| self.top.default_mission_id.clone()),
            templates_dir: nested.templates_dir.or_else(|| self.top.templates_dir.clone()),
            schemas_dir: nested.schemas_dir.or_else(|| self.top.schemas_dir.clone()),
        }
    }
}

// ---------------------------------------------------------------------------
// Catalog
// ---------------------------------------------------------------------------

/// A loaded persona/mission catalog rooted at a catalog directory.
#[derive(Debug, Clone)]
pub struct Catalog {
    root: PathBuf,
    personas: BTreeMap<String, DocumentSpec>,
    missions: BTreeMap<String, DocumentSpec>,
    default_persona_id: Option<String>,
    default_mission_id: Option<String>,
    templates_dir: PathBuf,
    schemas_dir: PathBuf,
}

impl Catalog {
    /// Discover and parse every `personas/*.persona.md` and
    /// `missions/*.mission.md` document under `root`, plus its optional
    /// `catalog.toml` defaults file.
    pub fn load(root: &Path) -> Result<Self, RunnerError> {
        let catalog_toml_path = root.join("catalog.toml");
        let defaults = if catalog_toml_path.is_file() {
            let text = std::fs::read_to_string(&catalog_toml_path).map_err(|e| {
                RunnerError::new(
                    ErrorCode::InvalidRunSpec,
                    format!("failed to read {}", catalog_toml_path.display()),
                    "check filesystem permissions on catalog.toml",
                )
                .with_source(e)
            })?;
            let parsed: CatalogToml = toml::from_str(&text).map_err(|e| {
                RunnerError::new(
                    ErrorCode::InvalidRunSpec,
                    format!("failed to parse {}", catalog_toml_path.display()),
                    "fix the TOML syntax of catalog.toml",
                )
                .with_detail("error", e.to_string())
            })?;
            parsed.resolved()
        } else {
            CatalogDefaultsInner::default()
        };

        let personas = load_documents(&root.join("personas"), ".persona.md", ErrorCode::DuplicatePersonaId)?;
        let missions = load_documents(&root.join("missions"), ".mission.md", ErrorCode::DuplicateMissionId)?;

        Ok(Self {
            root: root.to_path_buf(),
            personas,
            missions,
            default_persona_id: defaults.default_persona_id,
            default_mission_id: defaults.default_mission_id,
            templates_dir: defaults.templates_dir.unwrap_or_else(|| PathBuf::from("templates")),
            schemas_dir: defaults.schemas_dir.unwrap_or_else(|| PathBuf::from("schemas")),
        })
    }

    /// The raw (frontmatter-included) source text of a persona document.
    pub fn persona_source(&self, id: &str) -> Option<&str> {
        self.personas.get(id).map(|d| d.raw.as_str())
    }

    /// The raw (frontmatter-included) source text of a mission document.
    pub fn mission_source(&self, id: &str) -> Option<&str> {
        self.missions.get(id).map(|d| d.raw.as_str())
    }
}

/// Resolve a `RunRequest`'s persona/mission overrides (or catalog defaults)
/// into a fully materialized [`EffectiveRunSpec`] (spec §4.1).
pub fn resolve_run_spec(
    catalog: &Catalog,
    persona_id: Option<&str>,
    mission_id: Option<&str>,
    extra_vars: &BTreeMap<String, String>,
) -> Result<EffectiveRunSpec, RunnerError> {
    let persona_id = match persona_id {
        Some(id) => id.to_string(),
        None => catalog.default_persona_id.clone().ok_or_else(|| {
            RunnerError::new(
                ErrorCode::MissingDefaultPersonaId,
                "no persona_id given and the catalog has no default_persona_id",
                "pass --persona-id or set default_persona_id in catalog.toml",
            )
        })?,
    };
    let mission_id = match mission_id {
        Some(id) => id.to_string(),
        None => catalog.default_mission_id.clone().ok_or_else(|| {
            RunnerError::new(
                ErrorCode::MissingDefaultMissionId,
                "no mission_id given and the catalog has no default_mission_id",
                "pass --mission-id or set default_mission_id in catalog.toml",
            )
        })?,
    };

    let mission_doc = catalog.missions.get(&mission_id).ok_or_else(|| {
        RunnerError::new(
            ErrorCode::UnknownMissionId,
            format!("unknown mission_id '{mission_id}'"),
            "check --mission-id against the catalog's missions directory",
        )
    })?;
    if !catalog.personas.contains_key(&persona_id) {
        return Err(RunnerError::new(
            ErrorCode::UnknownPersonaId,
            format!("unknown persona_id '{persona_id}'"),
            "check --persona-id against the catalog's personas directory",
        ));
    }

    let execution_mode = mission_doc
        .execution_mode
        .as_deref()
        .unwrap_or("single_pass_inline_report");
    if execution_mode != "single_pass_inline_report" {
        return Err(RunnerError::new(
            ErrorCode::UnsupportedExecutionMode,
            format!("mission '{mission_id}' declares unsupported execution_mode '{execution_mode}'"),
            "use execution_mode: single_pass_inline_report, the only mode this orchestrator supports",
        )
        .with_detail("execution_mode", execution_mode.to_string()));
    }

    let persona_resolved = resolve_extends(
        &catalog.personas,
        &persona_id,
        ErrorCode::UnknownPersonaId,
        ErrorCode::PersonaCycle,
    )?;
    let mission_resolved = resolve_extends(
        &catalog.missions,
        &mission_id,
        ErrorCode::UnknownMissionId,
        ErrorCode::PersonaCycle,
    )?;

    let template_rel = mission_doc.prompt_template.as_deref().ok_or_else(|| {
        RunnerError::new(
            ErrorCode::MissingPromptTemplateFile,
            format!("mission '{mission_id}' declares no prompt_template"),
            "add a prompt_template path to the mission frontmatter",
        )
    })?;
    let template_path = catalog.root.join(&catalog.templates_dir).join(template_rel);
    let prompt_template = std::fs::read_to_string(&template_path).map_err(|e| {
        RunnerError::new(
            ErrorCode::MissingPromptTemplateFile,
            format!("prompt template not found: {}", template_path.display()),
            "check the mission's prompt_template path resolves under templates_dir",
        )
        .with_detail("requested", template_rel.to_string())
        .with_detail("base_dir", catalog.templates_dir.display().to_string())
        .with_detail("path", template_path.display().to_string())
        .with_source(e)
    })?;

    let schema_rel = mission_doc.report_schema.as_deref().ok_or_else(|| {
        RunnerError::new(
            ErrorCode::MissingReportSchemaFile,
            format!("mission '{mission_id}' declares no report_schema"),
            "add a report_schema path to the mission frontmatter",
        )
    })?;
    let schema_path = catalog.root.join(&catalog.schemas_dir).join(schema_rel);
    let schema_text = std::fs::read_to_string(&schema_path).map_err(|e| {
        RunnerError::new(
            ErrorCode::MissingReportSchemaFile,
            format!("report schema not found: {}", schema_path.display()),
            "check the mission's report_schema path resolves under schemas_dir",
        )
        .with_detail("requested", schema_rel.to_string())
        .with_detail("base_dir", catalog.schemas_dir.display().to_string())
        .with_detail("path", schema_path.display().to_string())
        .with_source(e)
    })?;
    let report_schema: serde_json::Value = serde_json::from_str(&schema_text).map_err(|e| {
        RunnerError::new(
            ErrorCode::MissingReportSchemaFile,
            format!("report schema is not valid JSON: {}", schema_path.display()),
            "fix the JSON syntax of the mission's report_schema file",
        )
        .with_detail("error", e.to_string())
    })?;

    let mut vars = extra_vars.clone();
    vars.entry("persona".to_string()).or_insert_with(|| persona_resolved.clone());
    vars.entry("mission".to_string()).or_insert_with(|| mission_resolved.clone());

    let prompt_rendered = render_prompt(&prompt_template, &vars)?;

    Ok(EffectiveRunSpec {
        contract_version: runner_core::CONTRACT_VERSION.to_string(),
        persona_id,
        mission_id,
        persona_resolved,
        mission_resolved,
        prompt_template,
        prompt_rendered,
        report_schema,
        requires_shell: mission_doc.requires_shell,
        requires_edits: mission_doc.requires_edits,
    })
}

/// Strict `${var}` substitution: every placeholder must resolve against
/// `vars`, or this returns a `template_variable_missing` error (spec §4.1).
pub fn render_prompt(
    template: &str,
    vars: &BTreeMap<String, String>,
) -> Result<String, RunnerError> {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(start) = rest.find("${") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let Some(end) = after.find('}') else {
            out.push_str(&rest[start..]);
            rest = "";
            break;
        };
        let name = &after[..end];
        let value = vars.get(name).ok_or_else(|| {
            RunnerError::new(
                ErrorCode::TemplateVariableMissing,
                format!("template placeholder '${{{name}}}' has no substitution"),
                "add the missing variable to the persona/mission/target/extra variable map",
            )
            .with_detail("variable", name.to_string())
        })?;
        out.push_str(value);
        rest = &after[end + 1..];
    }
    out.push_str(rest);

    Ok(out)
}

/// The known vendor agent-doc filenames rewritten by
/// [`obfuscate_agent_doc_references`].
const AGENT_DOC_NAMES: &[&str] = &["AGENTS.md", "CLAUDE.md", "GEMINI.md"];

/// Rewrite the known vendor agent-doc filenames (`AGENTS.md`, `CLAUDE.md`,
/// `GEMINI.md`) referenced in persisted persona/mission source to a neutral
/// placeholder, for `--obfuscate-agent-docs` (spec §6), so a persisted run
/// directory doesn't leak which vendor doc convention a mission relies on.
///
/// Only this exact, known name set is rewritten — an all-caps-token
/// heuristic would also clobber unrelated filenames like `README.md`.
pub fn obfuscate_agent_doc_references(text: &str) -> String {
    const PLACEHOLDER: &str = "PROJECT_AGENT_NOTES.md";
    let mut out = text.to_string();
    for name in AGENT_DOC_NAMES {
        out = out.replace(name, PLACEHOLDER);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_doc(dir: &Path, name: &str, contents: &str) {
        std::fs::write(dir.join(name), contents).unwrap();
    }

    #[test]
    fn parses_frontmatter_and_body() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("reviewer.persona.md");
        write_doc(
            tmp.path(),
            "reviewer.persona.md",
            "---\nid: reviewer\nname: Reviewer\nextends: null\n---\nYou review code.\n",
        );
        let text = std::fs::read_to_string(&path).unwrap();
        let doc = parse_document(&text, &path).unwrap();
        assert_eq!(doc.id, "reviewer");
        assert_eq!(doc.name, "Reviewer");
        assert!(doc.extends.is_none());
        assert_eq!(doc.body.trim(), "You review code.");
    }

    #[test]
    fn catalog_load_resolves_extends_chain() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(tmp.path().join("personas")).unwrap();
        std::fs::create_dir_all(tmp.path().join("missions")).unwrap();
        std::fs::create_dir_all(tmp.path().join("templates")).unwrap();
        std::fs::create_dir_all(tmp.path().join("schemas")).unwrap();

        write_doc(
            &tmp.path().join("personas"),
            "base.persona.md",
            "---\nid: base\nname: Base\n---\nBase persona instructions.\n",
        );
        write_doc(
            &tmp.path().join("personas"),
            "child.persona.md",
            "---\nid: child\nname: Child\nextends: base\n---\nChild persona additions.\n",
        );
        write_doc(
            &tmp.path().join("missions"),
            "audit.mission.md",
            "---\nid: audit\nname: Audit\nexecution_mode: single_pass_inline_report\nprompt_template: audit.md\nreport_schema: audit.schema.json\n---\nAudit mission body.\n",
        );
        std::fs::write(
            tmp.path().join("templates/audit.md"),
            "Persona: ${persona}\nMission: ${mission}\nExtra: ${target_name}",
        )
        .unwrap();
        std::fs::write(
            tmp.path().join("schemas/audit.schema.json"),
            r#"{"type":"object"}"#,
        )
        .unwrap();

        let catalog = Catalog::load(tmp.path()).unwrap();
        let mut extra = BTreeMap::new();
        extra.insert("target_name".to_string(), "demo".to_string());

        let spec = resolve_run_spec(&catalog, Some("child"), Some("audit"), &extra).unwrap();
        assert!(spec.persona_resolved.contains("Base persona instructions."));
        assert!(spec.persona_resolved.contains("Child persona additions."));
        assert!(spec.prompt_rendered.contains("Extra: demo"));
        assert_eq!(spec.requires_shell, false);
    }

    #[test]
    fn duplicate_persona_ids_are_rejected() {
        let tmp = tempfile::tempdir().unwrap();
        let personas = tmp.path().join("personas");
        std::fs::create_dir_all(&personas).unwrap();
        write_doc(&personas, "a.persona.md", "---\nid: dup\nname: A\n---\nA\n");
        write_doc(&personas, "b.persona.md", "---\nid: dup\nname: B\n---\nB\n");

        let err = load_documents(&personas, ".persona.md", ErrorCode::DuplicatePersonaId)
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::DuplicatePersonaId);
    }

    #[test]
    fn extends_cycle_is_rejected() {
        let mut docs = BTreeMap::new();
        docs.insert(
            "a".to_string(),
            DocumentSpec {
                id: "a".to_string(),
                name: "A".to_string(),
                extends: Some("b".to_string()),
                body: "a".to_string(),
                raw: String::new(),
                execution_mode: None,
                prompt_template: None,
                report_schema: None,
                requires_shell: false,
                requires_edits: false,
            },
        );
        docs.insert(
            "b".to_string(),
            DocumentSpec {
                id: "b".to_string(),
                name: "B".to_string(),
                extends: Some("a".to_string()),
                body: "b".to_string(),
                raw: String::new(),
                execution_mode: None,
                prompt_template: None,
                report_schema: None,
                requires_shell: false,
                requires_edits: false,
            },
        );

        let err = resolve_extends(
            &docs,
            "a",
            ErrorCode::UnknownPersonaId,
            ErrorCode::PersonaCycle,
        )
        .unwrap_err();
        assert_eq!(err.code, ErrorCode::PersonaCycle);
    }

    #[test]
    fn render_prompt_requires_every_placeholder_bound() {
        let mut vars = BTreeMap::new();
        vars.insert("name".to_string(), "world".to_string());
        assert_eq!(
            render_prompt("hello ${name}", &vars).unwrap(),
            "hello world"
        );

        let err = render_prompt("hello ${missing}", &vars).unwrap_err();
        assert_eq!(err.code, ErrorCode::TemplateVariableMissing);
    }

    #[test]
    fn obfuscate_rewrites_agent_doc_filenames() {
        let input = "See AGENTS.md and CLAUDE.md for details, but not lowercase.md";
        let out = obfuscate_agent_doc_references(input);
        assert!(out.contains("PROJECT_AGENT_NOTES.md"));
        assert!(!out.contains("AGENTS.md"));
        assert!(!out.contains("CLAUDE.md"));
        assert!(out.contains("lowercase.md"));
    }

    #[test]
    fn obfuscate_does_not_touch_unrelated_all_caps_filenames() {
        let input = "See README.md and LICENSE.md for details.";
        let out = obfuscate_agent_doc_references(input);
        assert_eq!(out, input);
    }

    #[test]
    fn missing_default_persona_id_is_reported() {
        let tmp = tempfile::tempdir().unwrap();
        let catalog = Catalog::load(tmp.path()).unwrap();
        let err = resolve_run_spec(&catalog, None, None, &BTreeMap::new()).unwrap_err();
        assert_eq!(err.code, ErrorCode::MissingDefaultPersonaId);
    }

    #[test]
    fn config_path_prefers_explicit_over_search() {
        let explicit = PathBuf::from("/tmp/explicit-runner.toml");
        assert_eq!(
            resolve_config_path(Some(&explicit)),
            Some(explicit)
        );
    }
}

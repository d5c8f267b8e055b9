// SPDX-License-Identifier: MIT OR Apache-2.0
//! Claude CLI argv construction (spec §4.4 "Claude adapter specifics").

use std::path::PathBuf;

use runner_error::{ErrorCode, RunnerError};

/// Flags accepted by `claude -p`, as resolved from the persona/mission/policy
/// catalog and the run request before invocation.
#[derive(Debug, Clone)]
pub struct ClaudeAdapterConfig {
    /// Binary name or path (PATH-resolved unless the run uses a container backend).
    pub binary: String,
    /// `--output-format`; `--verbose` is appended automatically when this is `stream-json`.
    pub output_format: String,
    /// `--model` override.
    pub model: Option<String>,
    /// `--max-turns` cap.
    pub max_turns: Option<u32>,
    /// `--permission-mode`.
    pub permission_mode: Option<String>,
    /// `--system-prompt` (mutually exclusive with `system_prompt_file`).
    pub system_prompt: Option<String>,
    /// `--system-prompt-file` (mutually exclusive with `system_prompt`).
    pub system_prompt_file: Option<PathBuf>,
    /// `--append-system-prompt` (mutually exclusive with `append_system_prompt_file`).
    pub append_system_prompt: Option<String>,
    /// `--append-system-prompt-file` (mutually exclusive with `append_system_prompt`).
    pub append_system_prompt_file: Option<PathBuf>,
    /// `--allowedTools`, comma-joined.
    pub allowed_tools: Vec<String>,
}

impl Default for ClaudeAdapterConfig {
    fn default() -> Self {
        Self {
            binary: "claude".to_string(),
            output_format: "stream-json".to_string(),
            model: None,
            max_turns: None,
            permission_mode: None,
            system_prompt: None,
            system_prompt_file: None,
            append_system_prompt: None,
            append_system_prompt_file: None,
            allowed_tools: Vec::new(),
        }
    }
}

impl ClaudeAdapterConfig {
    /// Start from a resolved binary name, with every other field defaulted.
    pub fn new(binary: impl Into<String>) -> Self {
        Self { binary: binary.into(), ..Self::default() }
    }

    /// Build the Claude-specific argv (everything after the resolved binary),
    /// validating the two mutually-exclusive system-prompt pairs.
    ///
    /// # Errors
    ///
    /// Returns [`RunnerError`] with [`ErrorCode::InvalidRunSpec`] if both
    /// halves of a mutually-exclusive pair are set.
    pub fn build_argv(&self) -> Result<Vec<String>, RunnerError> {
        if self.system_prompt.is_some() && self.system_prompt_file.is_some() {
            return Err(RunnerError::new(
                ErrorCode::InvalidRunSpec,
                "claude system_prompt and system_prompt_file are mutually exclusive",
                "set only one of system_prompt / system_prompt_file in the resolved run spec",
            ));
        }
        if self.append_system_prompt.is_some() && self.append_system_prompt_file.is_some() {
            return Err(RunnerError::new(
                ErrorCode::InvalidRunSpec,
                "claude append_system_prompt and append_system_prompt_file are mutually exclusive",
                "set only one of append_system_prompt / append_system_prompt_file in the resolved run spec",
            ));
        }

        let mut argv =
            vec!["-p".to_string(), "--output-format".to_string(), self.output_format.clone()];
        if self.output_format.trim().eq_ignore_ascii_case("stream-json") {
            argv.push("--verbose".to_string());
        }
        if let Some(model) = &self.model {
            argv.push("--model".to_string());
            argv.push(model.clone());
        }
        if let Some(max_turns) = self.max_turns {
            argv.push("--max-turns".to_string());
            argv.push(max_turns.to_string());
        }
        if let Some(mode) = &self.permission_mode {
            argv.push("--permission-mode".to_string());
            argv.push(mode.clone());
        }
        if let Some(sp) = &self.system_prompt {
            argv.push("--system-prompt".to_string());
            argv.push(sp.clone());
        }
        if let Some(spf) = &self.system_prompt_file {
            argv.push("--system-prompt-file".to_string());
            argv.push(spf.to_string_lossy().into_owned());
        }
        if let Some(asp) = &self.append_system_prompt {
            argv.push("--append-system-prompt".to_string());
            argv.push(asp.clone());
        }
        if let Some(aspf) = &self.append_system_prompt_file {
            argv.push("--append-system-prompt-file".to_string());
            argv.push(aspf.to_string_lossy().into_owned());
        }
        let tools: Vec<&str> = self
            .allowed_tools
            .iter()
            .map(String::as_str)
            .filter(|t| !t.trim().is_empty())
            .collect();
        if !tools.is_empty() {
            argv.push("--allowedTools".to_string());
            argv.push(tools.join(","));
        }
        Ok(argv)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_argv_is_minimal_stream_json() {
        let cfg = ClaudeAdapterConfig::new("claude");
        let argv = cfg.build_argv().unwrap();
        assert_eq!(argv, vec!["-p", "--output-format", "stream-json", "--verbose"]);
    }

    #[test]
    fn non_stream_json_drops_verbose() {
        let mut cfg = ClaudeAdapterConfig::new("claude");
        cfg.output_format = "json".to_string();
        let argv = cfg.build_argv().unwrap();
        assert_eq!(argv, vec!["-p", "--output-format", "json"]);
    }

    #[test]
    fn allowed_tools_are_comma_joined() {
        let mut cfg = ClaudeAdapterConfig::new("claude");
        cfg.allowed_tools = vec!["Read".to_string(), "Bash".to_string()];
        let argv = cfg.build_argv().unwrap();
        assert!(argv.ends_with(&["--allowedTools".to_string(), "Read,Bash".to_string()]));
    }

    #[test]
    fn conflicting_system_prompt_fields_are_rejected() {
        let mut cfg = ClaudeAdapterConfig::new("claude");
        cfg.system_prompt = Some("a".to_string());
        cfg.system_prompt_file = Some(PathBuf::from("b.txt"));
        let err = cfg.build_argv().unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidRunSpec);
    }
}

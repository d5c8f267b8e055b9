// SPDX-License-Identifier: MIT OR Apache-2.0
//! Gemini CLI argv construction (spec §4.4 "Gemini adapter specifics").

/// Flags accepted by `gemini`, as resolved from the persona/mission/policy
/// catalog and the run request before invocation.
#[derive(Debug, Clone)]
pub struct GeminiAdapterConfig {
    /// Binary name or path (PATH-resolved unless the run uses a container backend).
    pub binary: String,
    /// `--output-format`.
    pub output_format: String,
    /// `--approval-mode`.
    pub approval_mode: String,
    /// Whether to pass `--sandbox`.
    pub sandbox: bool,
    /// `--model` override.
    pub model: Option<String>,
    /// `--agent-system-prompt-file`.
    pub system_prompt_file: Option<String>,
    /// `--allowed-tools`, repeated once per entry.
    pub allowed_tools: Vec<String>,
    /// `--include-directories`, repeated once per entry.
    pub include_directories: Vec<String>,
}

impl Default for GeminiAdapterConfig {
    fn default() -> Self {
        Self {
            binary: "gemini".to_string(),
            output_format: "stream-json".to_string(),
            approval_mode: "default".to_string(),
            sandbox: true,
            model: None,
            system_prompt_file: None,
            allowed_tools: Vec::new(),
            include_directories: Vec::new(),
        }
    }
}

impl GeminiAdapterConfig {
    /// Start from a resolved binary name, with every other field defaulted.
    pub fn new(binary: impl Into<String>) -> Self {
        Self { binary: binary.into(), ..Self::default() }
    }

    /// Build the Gemini-specific argv (everything after the resolved binary).
    pub fn build_argv(&self) -> Vec<String> {
        let mut argv = vec![
            "--output-format".to_string(),
            self.output_format.clone(),
            "--approval-mode".to_string(),
            self.approval_mode.clone(),
        ];
        if self.sandbox {
            argv.push("--sandbox".to_string());
        }
        if let Some(model) = &self.model {
            argv.push("--model".to_string());
            argv.push(model.clone());
        }
        if let Some(spf) = &self.system_prompt_file {
            argv.push("--agent-system-prompt-file".to_string());
            argv.push(spf.clone());
        }
        for tool in &self.allowed_tools {
            if tool.trim().is_empty() {
                continue;
            }
            argv.push("--allowed-tools".to_string());
            argv.push(tool.clone());
        }
        for dir in &self.include_directories {
            if dir.trim().is_empty() {
                continue;
            }
            argv.push("--include-directories".to_string());
            argv.push(dir.clone());
        }
        argv
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_argv_includes_sandbox_and_approval_mode() {
        let cfg = GeminiAdapterConfig::new("gemini");
        let argv = cfg.build_argv();
        assert_eq!(
            argv,
            vec!["--output-format", "stream-json", "--approval-mode", "default", "--sandbox"]
        );
    }

    #[test]
    fn sandbox_false_omits_flag() {
        let mut cfg = GeminiAdapterConfig::new("gemini");
        cfg.sandbox = false;
        let argv = cfg.build_argv();
        assert!(!argv.contains(&"--sandbox".to_string()));
    }

    #[test]
    fn repeats_allowed_tools_and_include_directories() {
        let mut cfg = GeminiAdapterConfig::new("gemini");
        cfg.allowed_tools = vec!["read_file".to_string(), "run_shell_command".to_string()];
        cfg.include_directories = vec!["vendor".to_string()];
        let argv = cfg.build_argv();
        assert_eq!(argv.iter().filter(|a| *a == "--allowed-tools").count(), 2);
        assert!(argv.windows(2).any(|w| w == ["--include-directories", "vendor"]));
    }

    #[test]
    fn model_and_system_prompt_file_are_threaded_through() {
        let mut cfg = GeminiAdapterConfig::new("gemini");
        cfg.model = Some("gemini-2.5-pro".to_string());
        cfg.system_prompt_file = Some("/tmp/persona.md".to_string());
        let argv = cfg.build_argv();
        assert!(argv.windows(2).any(|w| w == ["--model", "gemini-2.5-pro"]));
        assert!(argv.windows(2).any(|w| w == ["--agent-system-prompt-file", "/tmp/persona.md"]));
    }
}

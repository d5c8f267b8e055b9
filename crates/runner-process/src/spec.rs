// SPDX-License-Identifier: MIT OR Apache-2.0
//! Declarative description of one child-process invocation.

use std::collections::BTreeMap;
use std::path::PathBuf;

/// Everything needed to spawn and drive one agent (or verification, or
/// docker-subcommand) child process.
///
/// `argv[0]` is the already backend-prefixed binary (spec §4.3 "Command-
/// prefix contract": the caller is responsible for prepending
/// `ExecutionBackend::command_prefix()` before constructing this).
#[derive(Debug, Clone)]
pub struct ProcessSpec {
    /// Full argv, prefix included.
    pub argv: Vec<String>,
    /// Working directory for the child.
    pub cwd: PathBuf,
    /// Environment variables merged into the child's environment (for the
    /// local backend; container backends instead splice `-e` flags into
    /// `argv` and leave this empty, per `runner_backend::EnvPlan`).
    pub env: BTreeMap<String, String>,
    /// Text written to the child's stdin and then closed, or `None` to
    /// close stdin immediately without writing (spec §4.4: "prompt is fed
    /// via stdin to avoid command-line length limits").
    pub stdin_text: Option<String>,
}

impl ProcessSpec {
    /// Start building a spec for the given argv.
    pub fn new(argv: Vec<String>, cwd: impl Into<PathBuf>) -> Self {
        Self { argv, cwd: cwd.into(), env: BTreeMap::new(), stdin_text: None }
    }

    /// Attach environment overrides.
    pub fn with_env(mut self, env: BTreeMap<String, String>) -> Self {
        self.env = env;
        self
    }

    /// Attach stdin text (e.g. the fully-rendered prompt).
    pub fn with_stdin(mut self, text: impl Into<String>) -> Self {
        self.stdin_text = Some(text.into());
        self
    }
}

// SPDX-License-Identifier: MIT OR Apache-2.0
#![deny(unsafe_code)]
use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use runner_core::{AgentId, ExecBackendKind, RunRequest};
use runner_process::CancelToken;
use tracing_subscriber::EnvFilter;

mod schema;

/// Exit code for invalid arguments / preflight rejection (spec §6).
const EXIT_USAGE_ERROR: i32 = 2;

#[derive(Parser, Debug)]
#[command(name = "runner", version, about = "Agent-run orchestrator")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Root directory under which run directories are created.
    #[arg(long, global = true)]
    runs_root: Option<PathBuf>,

    /// Path to a `RunnerConfig` TOML file (default search: ./runner.toml, then
    /// $XDG_CONFIG_HOME/runner/config.toml).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Catalog root directory for personas/missions.
    #[arg(long, global = true)]
    catalog_root: Option<PathBuf>,

    /// Log output format.
    #[arg(long, global = true, value_enum, default_value_t = LogFormatArg::Pretty)]
    log_format: LogFormatArg,

    /// Increase verbosity (repeatable).
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Decrease verbosity (repeatable).
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    quiet: u8,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LogFormatArg {
    Pretty,
    Json,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run an agent against a target under a persona/mission.
    Run {
        /// Target locator: filesystem path, git URL, or `pip:<requirements>`.
        #[arg(long)]
        repo: String,

        /// Which agent CLI drives this run.
        #[arg(long, value_enum)]
        agent: AgentArg,

        /// Named policy (capability/tool allow-deny profile) to apply.
        #[arg(long)]
        policy: String,

        /// Explicit persona id override; omit to use the catalog default.
        #[arg(long = "persona-id")]
        persona_id: Option<String>,

        /// Explicit mission id override; omit to use the catalog default.
        #[arg(long = "mission-id")]
        mission_id: Option<String>,

        /// Deterministic seed distinguishing concurrent runs of the same target/agent.
        #[arg(long, default_value_t = 0)]
        seed: u64,

        /// Model override passed through to the adapter.
        #[arg(long)]
        model: Option<String>,

        /// Execution backend.
        #[arg(long = "exec-backend", value_enum, default_value_t = ExecBackendArg::Local)]
        exec_backend: ExecBackendArg,

        /// Docker build-context directory, required when `--exec-backend docker`.
        #[arg(long = "exec-docker-context")]
        exec_docker_context: Option<PathBuf>,

        /// Operator-supplied post-run verification command. Repeatable.
        #[arg(long = "verify")]
        verify: Vec<String>,

        /// Rewrite AGENTS.md/CLAUDE.md-style filenames in persisted persona/mission source.
        #[arg(long = "obfuscate-agent-docs")]
        obfuscate_agent_docs: bool,

        /// Retain the acquired workspace instead of deleting it on completion.
        #[arg(long)]
        keep_workspace: bool,
    },

    /// Print a JSON schema for a contract type.
    Schema {
        /// Which schema to print.
        #[arg(value_enum)]
        kind: SchemaArg,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum AgentArg {
    Claude,
    Codex,
    Gemini,
}

impl From<AgentArg> for AgentId {
    fn from(v: AgentArg) -> Self {
        match v {
            AgentArg::Claude => AgentId::Claude,
            AgentArg::Codex => AgentId::Codex,
            AgentArg::Gemini => AgentId::Gemini,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum ExecBackendArg {
    Local,
    Docker,
}

impl From<ExecBackendArg> for ExecBackendKind {
    fn from(v: ExecBackendArg) -> Self {
        match v {
            ExecBackendArg::Local => ExecBackendKind::Local,
            ExecBackendArg::Docker => ExecBackendKind::Docker,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum SchemaArg {
    RunRequest,
    TargetRef,
    Config,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(cli.log_format, cli.verbose, cli.quiet);

    let exit_code = match cli.command {
        Commands::Schema { kind } => match schema::print(kind.into()) {
            Ok(()) => 0,
            Err(e) => {
                eprintln!("error: {e:#}");
                EXIT_USAGE_ERROR
            }
        },
        Commands::Run {
            repo,
            agent,
            policy,
            persona_id,
            mission_id,
            seed,
            model,
            exec_backend,
            exec_docker_context,
            verify,
            obfuscate_agent_docs,
            keep_workspace,
        } => {
            cmd_run(
                &cli.config,
                &cli.runs_root,
                &cli.catalog_root,
                RunRequest {
                    repo_input: repo,
                    agent: agent.into(),
                    policy,
                    persona_id,
                    mission_id,
                    seed,
                    model,
                    exec_backend: exec_backend.into(),
                    exec_docker_context,
                    verify,
                    obfuscate_agent_docs,
                    keep_workspace,
                },
            )
            .await
        }
    };

    std::process::exit(exit_code);
}

async fn cmd_run(
    config_path: &Option<PathBuf>,
    runs_root: &Option<PathBuf>,
    catalog_root: &Option<PathBuf>,
    request: RunRequest,
) -> i32 {
    let mut config = match runner_catalog::load_runner_config(config_path.as_deref()) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("error: {err}");
            return EXIT_USAGE_ERROR;
        }
    };
    if let Some(runs_root) = runs_root {
        config.runs_root = runs_root.clone();
    }
    if let Some(catalog_root) = catalog_root {
        config.catalog_root = catalog_root.clone();
    }

    let cancel = CancelToken::new();
    let ctrl_c_cancel = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("received ctrl-c, cancelling run");
            ctrl_c_cancel.cancel();
        }
    });

    tracing::info!(repo = %request.repo_input, agent = %request.agent, "starting run");
    let outcome = runner_orchestrator::run_request(request, &config, &cancel).await;

    println!("run_dir: {}", outcome.run_dir.display());
    match &outcome.error {
        None => tracing::info!("run completed"),
        Some(err) => {
            tracing::error!(%err, "run failed");
            eprintln!("error: {err}");
            if let Some(paths) = err.to_structured_error().report_validation_errors {
                for path in paths {
                    eprintln!("  report validation error at {path}");
                }
            }
        }
    }
    outcome.exit_code()
}

fn init_tracing(format: LogFormatArg, verbose: u8, quiet: u8) {
    let level = match (verbose as i16) - (quiet as i16) {
        i16::MIN..=-2 => "error",
        -1 => "warn",
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(format!("runner={level}")));

    match format {
        LogFormatArg::Pretty => {
            tracing_subscriber::fmt().with_env_filter(filter).init();
        }
        LogFormatArg::Json => {
            tracing_subscriber::fmt().json().with_env_filter(filter).init();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_parses_without_panicking() {
        Cli::command().debug_assert();
    }

    #[test]
    fn run_subcommand_requires_repo_agent_policy() {
        let err = Cli::try_parse_from(["runner", "run"]).unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::MissingRequiredArgument);
    }

    #[test]
    fn run_subcommand_accepts_repeated_verify_flags() {
        let cli = Cli::try_parse_from([
            "runner", "run", "--repo", "/tmp/proj", "--agent", "claude", "--policy", "default", "--verify", "cargo test",
            "--verify", "cargo clippy",
        ])
        .unwrap();
        match cli.command {
            Commands::Run { verify, .. } => assert_eq!(verify, vec!["cargo test", "cargo clippy"]),
            _ => panic!("expected Run"),
        }
    }
}

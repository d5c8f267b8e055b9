// SPDX-License-Identifier: MIT OR Apache-2.0
//! Codex agent adapter (spec §4.4, §4.5): drives `codex exec --json`,
//! captures its item-event stream into `raw_events.jsonl`, and normalizes
//! that stream into the canonical `normalized_events.jsonl` schema.
//!
//! This crate implements one half of the adapter contract shared by every
//! backend (`adapter-claude`, `adapter-gemini` are the others): a driver
//! (`raw::run_codex`) that spawns the CLI through an opaque
//! [`runner_backend::ExecutionBackend`] and a translator
//! (`normalized::normalize_codex_events`) that turns its raw JSONL into
//! canonical events. Adding a new agent never requires changing the
//! orchestrator; it only requires a crate shaped like this one (spec §9
//! "Agent polymorphism"). It also owns the two Codex-specific
//! early-termination behaviors: aborting on an interactive
//! `apply_patch_approval_request`, and failing fast on a
//! `refresh_token_reused` auth loop.

#![deny(unsafe_code)]
#![warn(missing_docs)]

/// Codex CLI argv construction from the resolved policy/persona/mission.
pub mod config;
/// `codex` binary resolution via `PATH`.
pub mod discovery;
/// Mapping of lower-level process/capture errors into [`runner_error::RunnerError`].
pub mod error;
/// Translation of `raw_events.jsonl` into `normalized_events.jsonl`.
pub mod normalized;
/// Driving one `codex exec --json` invocation end to end.
pub mod raw;

pub use config::CodexAdapterConfig;
pub use normalized::normalize_codex_events;
pub use raw::{CodexRunRequest, run_codex};

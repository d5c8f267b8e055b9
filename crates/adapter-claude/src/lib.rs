// SPDX-License-Identifier: MIT OR Apache-2.0
//! Claude agent adapter (spec §4.4, §4.5): drives `claude -p`, captures its
//! `stream-json` event stream into `raw_events.jsonl`, and normalizes that
//! stream into the canonical `normalized_events.jsonl` schema.
//!
//! This crate implements one half of the adapter contract shared by every
//! backend (`adapter-codex`, `adapter-gemini` are the others): a driver
//! (`raw::run_claude`) that spawns the CLI through an opaque
//! [`runner_backend::ExecutionBackend`] and a translator
//! (`normalized::normalize_claude_events`) that turns its raw JSONL into
//! canonical events. Adding a new agent never requires changing the
//! orchestrator; it only requires a crate shaped like this one (spec §9
//! "Agent polymorphism").

#![deny(unsafe_code)]
#![warn(missing_docs)]

/// Claude CLI argv construction from the resolved policy/persona/mission.
pub mod config;
/// `claude` binary resolution via `PATH`.
pub mod discovery;
/// Mapping of lower-level process/capture errors into [`runner_error::RunnerError`].
pub mod error;
/// Translation of `raw_events.jsonl` into `normalized_events.jsonl`.
pub mod normalized;
/// Driving one `claude -p` invocation end to end.
pub mod raw;

pub use config::ClaudeAdapterConfig;
pub use error::detect_quota_exceeded;
pub use normalized::normalize_claude_events;
pub use raw::{ClaudeRunRequest, run_claude};

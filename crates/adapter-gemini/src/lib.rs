// SPDX-License-Identifier: MIT OR Apache-2.0
//! Gemini agent adapter (spec §4.4, §4.5): drives `gemini`, captures its
//! `stream-json` event stream into `raw_events.jsonl`, and normalizes that
//! stream into the canonical `normalized_events.jsonl` schema.
//!
//! This crate implements one half of the adapter contract shared by every
//! backend (`adapter-claude`, `adapter-codex` are the others): a driver
//! (`raw::run_gemini`) that spawns the CLI through an opaque
//! [`runner_backend::ExecutionBackend`] and a translator
//! (`normalized::normalize_gemini_events`) that turns its raw JSONL into
//! canonical events. Adding a new agent never requires changing the
//! orchestrator; it only requires a crate shaped like this one (spec §9
//! "Agent polymorphism").

#![deny(unsafe_code)]
#![warn(missing_docs)]

/// Gemini CLI argv construction from the resolved policy/persona/mission.
pub mod config;
/// `gemini` binary resolution via `PATH`.
pub mod discovery;
/// Mapping of lower-level process/capture errors into [`runner_error::RunnerError`].
pub mod error;
/// Translation of `raw_events.jsonl` into `normalized_events.jsonl`.
pub mod normalized;
/// Driving one `gemini` invocation end to end.
pub mod raw;

pub use config::GeminiAdapterConfig;
pub use normalized::normalize_gemini_events;
pub use raw::{GeminiRunRequest, run_gemini};

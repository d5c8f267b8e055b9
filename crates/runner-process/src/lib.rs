// SPDX-License-Identifier: MIT OR Apache-2.0
//! Shared child-process driving primitives used by every agent adapter, the
//! sandbox runner's `docker` subcommands, and the verification gate (spec
//! §4.4, §4.7, §5).
//!
//! This crate knows nothing about agent-specific wire formats: it spawns one
//! process per call, feeds it an optional stdin payload, streams stdout
//! lines to a caller-supplied sink in arrival order, captures stderr in
//! full, and supports cooperative cancellation and an optional timeout. The
//! per-backend adapters in `adapter-claude`/`adapter-codex`/`adapter-gemini`
//! and the sandbox runner in `runner-sandbox` build on top of it.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod cancel;
mod error;
mod run;
mod spec;

pub use cancel::CancelToken;
pub use error::ProcessError;
pub use run::{ProcessOutcome, run_streaming};
pub use spec::ProcessSpec;

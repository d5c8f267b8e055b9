// SPDX-License-Identifier: MIT OR Apache-2.0
//! Error type for child-process driving operations.

use thiserror::Error;

/// Errors surfaced while spawning or driving a child process.
#[derive(Debug, Error)]
pub enum ProcessError {
    /// The binary could not be found or exec'd at all (spec §4.4
    /// `AgentLaunchFailed`-class error).
    #[error("failed to launch '{binary}': {source}")]
    Launch {
        /// Binary name or path that failed to launch.
        binary: String,
        /// Underlying OS error.
        #[source]
        source: std::io::Error,
    },

    /// An I/O error occurred while writing stdin or reading stdout/stderr.
    #[error("process i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// The child's stdin/stdout/stderr handle was unexpectedly unavailable.
    #[error("child process handle unavailable: {0}")]
    MissingHandle(&'static str),
}

// SPDX-License-Identifier: MIT OR Apache-2.0
//! Shared pipeline state (spec §4.8: "single catch-all region... one mutable
//! `RunContext`") and the execution-backend teardown guard (spec §3
//! invariant: "a started `SandboxInstance` is always closed before the run
//! directory is finalized, even under panic/cancel").

use std::path::PathBuf;

use runner_backend::ExecutionBackend;
use runner_error::{ErrorCode, RunnerError};

/// The run directory handle threaded through every pipeline stage.
///
/// Every stage writes its artifacts under `run_dir`; nothing here is
/// fallible beyond directory creation, which happens once up front so that
/// even the earliest config error (spec §7 "the run directory nevertheless
/// exists and contains the structured error") has somewhere to land.
pub struct RunContext {
    /// Absolute path to this run's artifact directory.
    pub run_dir: PathBuf,
}

impl RunContext {
    /// Create the run directory (and any missing parents) and wrap it.
    pub fn new(run_dir: PathBuf) -> Result<Self, RunnerError> {
        std::fs::create_dir_all(&run_dir).map_err(|e| {
            RunnerError::new(
                ErrorCode::WorkspaceIoError,
                format!("failed to create run directory {}", run_dir.display()),
                "check filesystem permissions and free space for --runs-root",
            )
            .with_source(e)
        })?;
        Ok(Self { run_dir })
    }
}

/// RAII safety net around a started [`ExecutionBackend`].
///
/// `ExecutionBackend::close` is async, so it cannot run from [`Drop`]
/// itself; the normal path always calls [`BackendGuard::close`] explicitly.
/// If the guard is instead dropped while still armed (an early `?` return,
/// or an in-flight panic, skipped the explicit close), `Drop` logs the leak
/// loudly so it is visible in run logs even though the container itself is
/// only reclaimed by a later `docker rm` or its next content-addressed
/// rebuild.
pub struct BackendGuard {
    backend: Option<Box<dyn ExecutionBackend>>,
}

impl BackendGuard {
    /// Arm the guard around a freshly prepared backend.
    pub fn new(backend: Box<dyn ExecutionBackend>) -> Self {
        Self { backend: Some(backend) }
    }

    /// Borrow the backend while the guard is armed.
    ///
    /// # Panics
    ///
    /// Panics if called after [`close`](Self::close) has consumed the guard;
    /// this only happens if a caller keeps using a guard by reference past
    /// its `close().await`, which the pipeline's linear control flow never does.
    pub fn get(&self) -> &dyn ExecutionBackend {
        self.backend.as_deref().expect("BackendGuard used after close")
    }

    /// Explicitly tear down the backend and disarm the guard.
    pub async fn close(mut self) -> Result<(), RunnerError> {
        match self.backend.take() {
            Some(backend) => backend.close().await,
            None => Ok(()),
        }
    }
}

impl Drop for BackendGuard {
    fn drop(&mut self) {
        if self.backend.is_some() {
            tracing::error!(
                "execution backend guard dropped without an explicit close; \
                 its resources (e.g. a docker container) may have leaked"
            );
        }
    }
}

// SPDX-License-Identifier: MIT OR Apache-2.0
//! Write-to-temp-then-rename helpers (spec §5 atomicity rule: "JSON
//! artifacts are written to a temporary path and renamed").

use std::path::Path;

use runner_error::{ErrorCode, RunnerError};
use serde::Serialize;

/// Serialize `value` as pretty JSON and atomically publish it at `path`.
pub fn write_json(path: &Path, value: &impl Serialize) -> Result<(), RunnerError> {
    let text = serde_json::to_vec_pretty(value).map_err(|e| {
        RunnerError::new(ErrorCode::Internal, format!("failed to serialize {}: {e}", path.display()), "report this as an internal bug")
    })?;
    write_bytes(path, &text)
}

/// Atomically publish raw bytes at `path`.
pub fn write_bytes(path: &Path, bytes: &[u8]) -> Result<(), RunnerError> {
    let tmp = tmp_path(path);
    std::fs::write(&tmp, bytes).map_err(|e| io_error(path, e))?;
    std::fs::rename(&tmp, path).map_err(|e| io_error(path, e))?;
    Ok(())
}

/// Atomically publish `text` at `path`.
pub fn write_text(path: &Path, text: &str) -> Result<(), RunnerError> {
    write_bytes(path, text.as_bytes())
}

fn tmp_path(path: &Path) -> std::path::PathBuf {
    let name = path.file_name().and_then(|n| n.to_str()).unwrap_or("artifact");
    path.with_file_name(format!(".{name}.tmp"))
}

fn io_error(path: &Path, source: std::io::Error) -> RunnerError {
    RunnerError::new(
        ErrorCode::Internal,
        format!("failed to write {}: {source}", path.display()),
        "check filesystem permissions and free space for the run directory",
    )
    .with_detail("filename", path.display().to_string())
    .with_source(source)
}

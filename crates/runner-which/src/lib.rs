#![deny(unsafe_code)]
//! Executable discovery in `PATH`, for adapter binary resolution (spec §4.4).

use std::path::{Path, PathBuf};

/// Outcome of resolving an adapter binary: what was asked for and where it
/// was found, so launch failures can report both in their hint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BinaryResolution {
    /// The name or path the caller requested (e.g. `"claude"`).
    pub requested: String,
    /// The resolved absolute (or explicit relative) path, when found.
    pub resolved: Option<PathBuf>,
}

impl BinaryResolution {
    /// Resolve `requested` against `PATH`, or treat it as a direct path if it
    /// contains a path separator.
    pub fn resolve(requested: &str) -> Self {
        Self {
            requested: requested.to_string(),
            resolved: which(requested),
        }
    }

    /// True when the binary was found.
    pub fn is_found(&self) -> bool {
        self.resolved.is_some()
    }
}

/// Locate an executable by name, similarly to shell `which`.
///
/// If `bin` contains path separators, it is treated as a direct path.
pub fn which(bin: &str) -> Option<PathBuf> {
    let candidate = Path::new(bin);
    if has_path(candidate) {
        return candidate.exists().then(|| candidate.to_path_buf());
    }

    let path = std::env::var_os("PATH")?;
    std::env::split_paths(&path).find_map(|dir| resolve_in_dir(&dir, bin))
}

/// Return `true` when an executable can be resolved from PATH or explicit path.
pub fn command_exists(command: &str) -> bool {
    which(command).is_some()
}

fn has_path(candidate: &Path) -> bool {
    candidate.components().count() > 1
}

fn resolve_in_dir(dir: &Path, command: &str) -> Option<PathBuf> {
    let direct = dir.join(command);
    if direct.exists() {
        return Some(direct);
    }

    if !cfg!(windows) {
        return None;
    }

    ["", ".exe", ".cmd", ".bat", ".com"]
        .into_iter()
        .map(|ext| dir.join(format!("{command}{ext}")))
        .find(|candidate| candidate.exists())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_exists_is_consistent_with_which() {
        assert_eq!(
            command_exists("no-such-binary-runner"),
            which("no-such-binary-runner").is_some()
        );
    }

    #[test]
    fn resolution_records_requested_name_even_when_missing() {
        let res = BinaryResolution::resolve("no-such-binary-runner");
        assert_eq!(res.requested, "no-such-binary-runner");
        assert!(!res.is_found());
    }

    #[test]
    fn resolution_finds_direct_path() {
        let dir = tempfile::tempdir().unwrap();
        let bin_path = dir.path().join("myscript.sh");
        std::fs::write(&bin_path, "#!/bin/sh\n").unwrap();
        let res = BinaryResolution::resolve(bin_path.to_str().unwrap());
        assert!(res.is_found());
        assert_eq!(res.resolved.unwrap(), bin_path);
    }

    #[test]
    fn resolution_finds_on_path() {
        let dir = tempfile::tempdir().unwrap();
        let bin_path = dir.path().join("found-on-path");
        std::fs::write(&bin_path, "#!/bin/sh\n").unwrap();
        let original_path = std::env::var_os("PATH").unwrap_or_default();
        let mut paths: Vec<PathBuf> = vec![dir.path().to_path_buf()];
        paths.extend(std::env::split_paths(&original_path));
        std::env::set_var("PATH", std::env::join_paths(paths).unwrap());

        let res = BinaryResolution::resolve("found-on-path");

        std::env::set_var("PATH", original_path);
        assert!(res.is_found());
    }
}

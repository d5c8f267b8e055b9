#![deny(unsafe_code)]
#![warn(missing_docs)]
//! Git repository helpers used by target acquisition and diff capture.

use anyhow::{Context, Result};
use std::path::Path;
use std::process::Command;

/// Initializes a git repo at `path` with a baseline commit if one does not already exist.
pub fn ensure_git_repo(path: &Path) {
    if path.join(".git").exists() {
        return;
    }

    let _ = Command::new("git")
        .args(["init", "-q"])
        .current_dir(path)
        .status();

    // Create an initial commit so diffs are meaningful.
    let _ = Command::new("git")
        .args(["add", "-A"])
        .current_dir(path)
        .status();

    let _ = Command::new("git")
        .args([
            "-c",
            "user.name=runner",
            "-c",
            "user.email=runner@local",
            "commit",
            "-qm",
            "baseline",
        ])
        .current_dir(path)
        .status();
}

/// Returns the porcelain v1 status output for the repo at `path`, if available.
pub fn git_status(path: &Path) -> Option<String> {
    run_git(path, &["status", "--porcelain=v1"]).ok()
}

/// Returns the unified diff output for the repo at `path`, if available.
pub fn git_diff(path: &Path) -> Option<String> {
    run_git(path, &["diff", "--no-color"]).ok()
}

/// Returns `git diff --numstat` output for the repo at `path`, if available.
pub fn git_diff_numstat(path: &Path) -> Option<String> {
    run_git(path, &["diff", "--numstat"]).ok()
}

/// Returns the current `HEAD` commit SHA for the repo at `path`.
pub fn current_commit_sha(path: &Path) -> Result<String> {
    let sha = run_git(path, &["rev-parse", "HEAD"])?;
    Ok(sha.trim().to_string())
}

/// Initializes a git repo at `path` (if needed) and returns the resulting
/// `HEAD` commit SHA snapshot, per the `AcquiredTarget` contract (spec §3, §4.2).
pub fn ensure_git_repo_and_commit_sha(path: &Path) -> Result<String> {
    ensure_git_repo(path);
    current_commit_sha(path)
}

fn run_git(path: &Path, args: &[&str]) -> Result<String> {
    let out = Command::new("git")
        .args(args)
        .current_dir(path)
        .output()
        .with_context(|| format!("run git {args:?}"))?;

    if !out.status.success() {
        anyhow::bail!("git {:?} failed (code={:?})", args, out.status.code());
    }

    Ok(String::from_utf8_lossy(&out.stdout).to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn ensure_git_repo_creates_baseline_commit_with_sha() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("README.md"), "hello").unwrap();
        let sha = ensure_git_repo_and_commit_sha(dir.path()).unwrap();
        assert_eq!(sha.len(), 40);
        assert!(sha.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn ensure_git_repo_is_idempotent() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("a.txt"), "a").unwrap();
        ensure_git_repo(dir.path());
        let sha1 = current_commit_sha(dir.path()).unwrap();
        ensure_git_repo(dir.path());
        let sha2 = current_commit_sha(dir.path()).unwrap();
        assert_eq!(sha1, sha2);
    }

    #[test]
    fn git_status_and_diff_reflect_changes() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("a.txt"), "a").unwrap();
        ensure_git_repo(dir.path());
        std::fs::write(dir.path().join("a.txt"), "a\nb").unwrap();
        let status = git_status(dir.path()).unwrap();
        assert!(status.contains("a.txt"));
        let diff = git_diff(dir.path()).unwrap();
        assert!(diff.contains("+b"));
        let numstat = git_diff_numstat(dir.path()).unwrap();
        assert!(numstat.contains("a.txt"));
    }
}

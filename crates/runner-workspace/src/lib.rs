#![deny(unsafe_code)]
//! Target acquisition: classify a run's locator and materialize a workspace
//! rooted at a valid git working tree (spec §4.2).

use runner_core::{AcquiredTarget, AcquisitionMode};
use runner_error::{ErrorCode, RunnerError};
use runner_glob::is_root_level_ignored;
use std::path::{Path, PathBuf};
use tracing::debug;
use walkdir::WalkDir;

/// Classification of a `RunRequest`'s target locator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Locator {
    /// A filesystem path to copy.
    Filesystem(PathBuf),
    /// A git URL (or local git-remote-capable path) to shallow-clone.
    GitUrl(String),
    /// A `pip:<requirements>` locator: a dependency-only synthetic workspace.
    Pip(String),
}

/// Classify a raw locator string into a [`Locator`] variant.
///
/// `pip:` locators are recognized by prefix; anything that looks like a URL
/// scheme or a `host:owner/repo`-style short form is treated as a git URL;
/// everything else is a filesystem path.
pub fn classify_locator(raw: &str) -> Locator {
    if let Some(reqs) = raw.strip_prefix("pip:") {
        return Locator::Pip(reqs.to_string());
    }

    let looks_like_url = raw.contains("://")
        || raw.starts_with("git@")
        || (raw.ends_with(".git") && !Path::new(raw).exists());

    if looks_like_url {
        Locator::GitUrl(raw.to_string())
    } else {
        Locator::Filesystem(PathBuf::from(raw))
    }
}

/// Maximum path length treated as "safe" on Windows hosts before relocating
/// to a short tmpdir-based destination (spec §4.2).
const WINDOWS_SAFE_PATH_LEN: usize = 240;

/// Acquire a target into `dest_parent`, returning the resulting
/// [`AcquiredTarget`].
///
/// `dest_parent` is the directory under which a fresh subdirectory is
/// created to hold the acquired workspace.
pub fn acquire(
    locator: &Locator,
    dest_parent: &Path,
    include: &[String],
    exclude: &[String],
) -> Result<AcquiredTarget, RunnerError> {
    match locator {
        Locator::Filesystem(src) => acquire_filesystem(src, dest_parent, include, exclude),
        Locator::GitUrl(url) => acquire_git(url, dest_parent),
        Locator::Pip(requirements) => acquire_pip(requirements, dest_parent),
    }
}

fn acquire_filesystem(
    src: &Path,
    dest_parent: &Path,
    include: &[String],
    exclude: &[String],
) -> Result<AcquiredTarget, RunnerError> {
    let src = src.canonicalize().map_err(|e| {
        RunnerError::new(
            ErrorCode::TargetAcquireFailed,
            format!("source path does not exist: {}", src.display()),
            "check that the target locator points at an existing directory",
        )
        .with_source(e)
    })?;

    let dest_parent = relocate_if_inside(&src, dest_parent)?;
    let dest = safe_destination(&dest_parent, "workspace")?;

    std::fs::create_dir_all(&dest).map_err(|e| {
        RunnerError::new(
            ErrorCode::TargetAcquireFailed,
            format!("failed to create destination directory {}", dest.display()),
            "check filesystem permissions and available disk space",
        )
        .with_source(e)
    })?;

    let rules = runner_glob::IncludeExcludeGlobs::new(include, exclude).map_err(|e| {
        RunnerError::new(
            ErrorCode::TargetAcquireFailed,
            "invalid include/exclude glob pattern",
            "fix the workspace include/exclude pattern syntax",
        )
        .with_detail("error", e.to_string())
    })?;

    copy_tree(&src, &dest, &rules)?;

    let commit_sha = runner_git::ensure_git_repo_and_commit_sha(&dest).map_err(|e| {
        RunnerError::new(
            ErrorCode::TargetNotGit,
            "failed to initialize git repository in acquired workspace",
            "ensure git is installed and the workspace directory is writable",
        )
        .with_detail("error", e.to_string())
    })?;

    Ok(AcquiredTarget {
        root: dest,
        mode: AcquisitionMode::Copy,
        commit_sha,
    })
}

fn acquire_git(url: &str, dest_parent: &Path) -> Result<AcquiredTarget, RunnerError> {
    let dest = safe_destination(dest_parent, "workspace")?;
    std::fs::create_dir_all(dest_parent).ok();

    let status = std::process::Command::new("git")
        .args(["clone", "--depth", "1", url])
        .arg(&dest)
        .status()
        .map_err(|e| {
            RunnerError::new(
                ErrorCode::TargetAcquireFailed,
                format!("failed to invoke git clone for {url}"),
                "ensure git is installed and the URL is reachable",
            )
            .with_source(e)
        })?;

    if !status.success() {
        return Err(RunnerError::new(
            ErrorCode::TargetAcquireFailed,
            format!("git clone of {url} exited with {status}"),
            "check that the git URL is correct and reachable, and that credentials are configured",
        ));
    }

    let commit_sha = runner_git::current_commit_sha(&dest).map_err(|e| {
        RunnerError::new(
            ErrorCode::TargetNotGit,
            "cloned repository has no resolvable HEAD commit",
            "verify the clone completed and is not an empty repository",
        )
        .with_detail("error", e.to_string())
    })?;

    Ok(AcquiredTarget {
        root: dest,
        mode: AcquisitionMode::Clone,
        commit_sha,
    })
}

/// Sentinel commit SHA for `pip:` locators (spec §9 Open Question).
pub const PIP_COMMIT_SHA_SENTINEL: &str = "unavailable";

fn acquire_pip(requirements: &str, dest_parent: &Path) -> Result<AcquiredTarget, RunnerError> {
    let dest = safe_destination(dest_parent, "workspace")?;
    std::fs::create_dir_all(&dest).map_err(|e| {
        RunnerError::new(
            ErrorCode::TargetAcquireFailed,
            format!("failed to create destination directory {}", dest.display()),
            "check filesystem permissions and available disk space",
        )
        .with_source(e)
    })?;

    let pyproject = render_synthetic_pyproject(requirements);
    std::fs::write(dest.join("pyproject.toml"), pyproject).map_err(|e| {
        RunnerError::new(
            ErrorCode::TargetAcquireFailed,
            "failed to write synthetic pyproject.toml",
            "check filesystem permissions for the run directory",
        )
        .with_source(e)
    })?;

    runner_git::ensure_git_repo(&dest);

    Ok(AcquiredTarget {
        root: dest,
        mode: AcquisitionMode::Pip,
        commit_sha: PIP_COMMIT_SHA_SENTINEL.to_string(),
    })
}

fn render_synthetic_pyproject(requirements: &str) -> String {
    let deps: Vec<String> = requirements
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| format!("    \"{s}\","))
        .collect();

    format!(
        "[project]\nname = \"synthetic-target\"\nversion = \"0.0.0\"\ndependencies = [\n{}\n]\n",
        deps.join("\n")
    )
}

/// If `dest_parent` is inside `src`, relocate it to a sibling of `src` to
/// avoid the destination copy recursively descending into itself.
fn relocate_if_inside(src: &Path, dest_parent: &Path) -> Result<PathBuf, RunnerError> {
    let dest_parent = dest_parent
        .canonicalize()
        .unwrap_or_else(|_| dest_parent.to_path_buf());

    if dest_parent.starts_with(src) {
        debug!(
            src = %src.display(),
            dest_parent = %dest_parent.display(),
            "destination is inside source, relocating to sibling tmpdir"
        );
        let sibling = src.parent().ok_or_else(|| {
            RunnerError::new(
                ErrorCode::DestInsideSourceRelocationFailed,
                "source has no parent directory to relocate destination to",
                "run the orchestrator from outside the target repository",
            )
        })?;
        return Ok(sibling.to_path_buf());
    }

    Ok(dest_parent)
}

/// Compute a destination directory under `parent`, relocating to a short
/// tmpdir-based path on Windows if the natural path would exceed the
/// platform's safe length (spec §4.2).
fn safe_destination(parent: &Path, leaf: &str) -> Result<PathBuf, RunnerError> {
    let natural = parent.join(leaf);

    if cfg!(windows) && natural.as_os_str().len() > WINDOWS_SAFE_PATH_LEN {
        let short = std::env::temp_dir().join(format!(
            "r-{}",
            &sha2_hex(natural.to_string_lossy().as_bytes())[..12]
        ));
        return Ok(short);
    }

    Ok(natural)
}

fn sha2_hex(bytes: &[u8]) -> String {
    use sha2::{Digest, Sha256};
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

/// Copy `src` into `dest`, skipping root-level generated directories by name
/// and applying include/exclude glob filtering to every entry.
fn copy_tree(
    src: &Path,
    dest: &Path,
    rules: &runner_glob::IncludeExcludeGlobs,
) -> Result<(), RunnerError> {
    for entry in WalkDir::new(src).into_iter().filter_entry(|e| {
        let depth = e.depth();
        if depth == 1 && e.file_type().is_dir() {
            if let Some(name) = e.file_name().to_str() {
                if is_root_level_ignored(name) {
                    return false;
                }
            }
        }
        true
    }) {
        let entry = entry.map_err(|e| {
            RunnerError::new(
                ErrorCode::TargetAcquireFailed,
                "failed to walk source tree",
                "check filesystem permissions on the target directory",
            )
            .with_detail("error", e.to_string())
        })?;

        let rel = entry.path().strip_prefix(src).unwrap_or(entry.path());
        if rel.as_os_str().is_empty() {
            continue;
        }

        if !rules.decide_path(rel).is_allowed() && !entry.file_type().is_dir() {
            continue;
        }

        let target = dest.join(rel);
        if entry.file_type().is_dir() {
            std::fs::create_dir_all(&target).map_err(|e| acquire_io_err(&target, e))?;
        } else if entry.file_type().is_file() {
            if let Some(parent) = target.parent() {
                std::fs::create_dir_all(parent).map_err(|e| acquire_io_err(parent, e))?;
            }
            std::fs::copy(entry.path(), &target).map_err(|e| acquire_io_err(&target, e))?;
        }
    }

    Ok(())
}

fn acquire_io_err(path: &Path, e: std::io::Error) -> RunnerError {
    RunnerError::new(
        ErrorCode::TargetAcquireFailed,
        format!("failed to materialize {}", path.display()),
        "check filesystem permissions and available disk space",
    )
    .with_source(e)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classify_pip_locator() {
        assert_eq!(
            classify_locator("pip:requests,flask==2.0"),
            Locator::Pip("requests,flask==2.0".to_string())
        );
    }

    #[test]
    fn classify_git_url() {
        assert_eq!(
            classify_locator("https://example.com/repo.git"),
            Locator::GitUrl("https://example.com/repo.git".to_string())
        );
        assert_eq!(
            classify_locator("git@example.com:org/repo.git"),
            Locator::GitUrl("git@example.com:org/repo.git".to_string())
        );
    }

    #[test]
    fn classify_filesystem_path() {
        assert_eq!(
            classify_locator("/tmp/some/target"),
            Locator::Filesystem(PathBuf::from("/tmp/some/target"))
        );
    }

    #[test]
    fn acquire_filesystem_copies_and_commits() {
        let src = tempfile::tempdir().unwrap();
        std::fs::write(src.path().join("README.md"), "hello").unwrap();
        std::fs::create_dir_all(src.path().join("node_modules/pkg")).unwrap();
        std::fs::write(src.path().join("node_modules/pkg/index.js"), "x").unwrap();

        let dest_parent = tempfile::tempdir().unwrap();
        let target = acquire(
            &Locator::Filesystem(src.path().to_path_buf()),
            dest_parent.path(),
            &[],
            &[],
        )
        .unwrap();

        assert!(target.root.join("README.md").exists());
        assert!(!target.root.join("node_modules").exists());
        assert_eq!(target.mode, AcquisitionMode::Copy);
        assert_eq!(target.commit_sha.len(), 40);
    }

    #[test]
    fn acquire_filesystem_honors_exclude_globs() {
        let src = tempfile::tempdir().unwrap();
        std::fs::write(src.path().join("keep.txt"), "k").unwrap();
        std::fs::write(src.path().join("secret.env"), "s").unwrap();

        let dest_parent = tempfile::tempdir().unwrap();
        let target = acquire(
            &Locator::Filesystem(src.path().to_path_buf()),
            dest_parent.path(),
            &[],
            &["*.env".to_string()],
        )
        .unwrap();

        assert!(target.root.join("keep.txt").exists());
        assert!(!target.root.join("secret.env").exists());
    }

    #[test]
    fn acquire_pip_materializes_synthetic_pyproject_with_sentinel_sha() {
        let dest_parent = tempfile::tempdir().unwrap();
        let target = acquire(
            &Locator::Pip("requests,flask".to_string()),
            dest_parent.path(),
            &[],
            &[],
        )
        .unwrap();

        assert_eq!(target.mode, AcquisitionMode::Pip);
        assert_eq!(target.commit_sha, PIP_COMMIT_SHA_SENTINEL);
        let pyproject = std::fs::read_to_string(target.root.join("pyproject.toml")).unwrap();
        assert!(pyproject.contains("requests"));
        assert!(pyproject.contains("flask"));
    }

    #[test]
    fn relocate_if_inside_moves_to_sibling() {
        let src = tempfile::tempdir().unwrap();
        let src_path = src.path().canonicalize().unwrap();
        let nested = src_path.join("nested-dest");
        std::fs::create_dir_all(&nested).unwrap();

        let relocated = relocate_if_inside(&src_path, &nested).unwrap();
        assert!(!relocated.starts_with(&src_path));
    }

    #[test]
    fn relocate_if_inside_is_noop_for_unrelated_dest() {
        let src = tempfile::tempdir().unwrap();
        let other = tempfile::tempdir().unwrap();
        let src_path = src.path().canonicalize().unwrap();
        let other_path = other.path().canonicalize().unwrap();

        let relocated = relocate_if_inside(&src_path, &other_path).unwrap();
        assert_eq!(relocated, other_path);
    }
}

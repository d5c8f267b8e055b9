// SPDX-License-Identifier: MIT OR Apache-2.0
//! Content-addressed digest over an image build context (spec §4.3.b
//! "Image caching (content-addressed)", §8 invariant 8: "Image tags are pure
//! functions of build context — two identical contexts yield identical
//! tags.").

use std::path::Path;

use runner_error::{ErrorCode, RunnerError};
use runner_glob::is_root_level_ignored;
use sha2::{Digest, Sha256};
use walkdir::WalkDir;

/// Walk `context_dir`, hash every regular file's relative path and content
/// into one running digest (skipping root-level generated directories), and
/// return the resulting hex digest.
///
/// Files are visited in deterministic (sorted by relative path) order so the
/// digest depends only on the context's content, never on filesystem
/// iteration order.
///
/// # Errors
///
/// Returns [`RunnerError`] with [`ErrorCode::ImageBuildFailed`] if the
/// context directory cannot be walked or a file cannot be read.
pub fn compute_context_digest(context_dir: &Path) -> Result<String, RunnerError> {
    let mut relative_paths = Vec::new();
    for entry in WalkDir::new(context_dir).into_iter().filter_entry(|e| {
        e.depth() == 0
            || !e
                .file_name()
                .to_str()
                .is_some_and(is_root_level_ignored)
    }) {
        let entry = entry.map_err(|e| {
            RunnerError::new(
                ErrorCode::ImageBuildFailed,
                format!("failed to walk build context: {e}"),
                "ensure the image context directory is readable",
            )
        })?;
        if entry.file_type().is_file() {
            let rel = entry
                .path()
                .strip_prefix(context_dir)
                .unwrap_or(entry.path())
                .to_string_lossy()
                .replace('\\', "/");
            relative_paths.push(rel);
        }
    }
    relative_paths.sort();

    let mut hasher = Sha256::new();
    for rel in relative_paths {
        let contents = std::fs::read(context_dir.join(&rel)).map_err(|e| {
            RunnerError::new(
                ErrorCode::ImageBuildFailed,
                format!("failed to read '{rel}' while hashing build context: {e}"),
                "ensure every file in the image context directory is readable",
            )
        })?;
        hasher.update(rel.as_bytes());
        hasher.update([0u8]);
        hasher.update(&contents);
        hasher.update([0u8]);
    }

    Ok(format!("{:x}", hasher.finalize()))
}

/// Derive a docker-tag-safe image tag from a content digest.
#[must_use]
pub fn image_tag(repo: &str, digest: &str) -> String {
    format!("{repo}:{}", &digest[..16.min(digest.len())])
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn identical_contexts_yield_identical_digests() {
        let a = tempfile::tempdir().unwrap();
        let b = tempfile::tempdir().unwrap();
        fs::write(a.path().join("Dockerfile"), b"FROM python:3.11\n").unwrap();
        fs::create_dir(a.path().join("src")).unwrap();
        fs::write(a.path().join("src/app.py"), b"print('hi')\n").unwrap();

        fs::write(b.path().join("Dockerfile"), b"FROM python:3.11\n").unwrap();
        fs::create_dir(b.path().join("src")).unwrap();
        fs::write(b.path().join("src/app.py"), b"print('hi')\n").unwrap();

        let digest_a = compute_context_digest(a.path()).unwrap();
        let digest_b = compute_context_digest(b.path()).unwrap();
        assert_eq!(digest_a, digest_b);
    }

    #[test]
    fn differing_content_yields_differing_digest() {
        let a = tempfile::tempdir().unwrap();
        fs::write(a.path().join("Dockerfile"), b"FROM python:3.11\n").unwrap();
        let digest_a = compute_context_digest(a.path()).unwrap();

        fs::write(a.path().join("Dockerfile"), b"FROM python:3.12\n").unwrap();
        let digest_a2 = compute_context_digest(a.path()).unwrap();

        assert_ne!(digest_a, digest_a2);
    }

    #[test]
    fn ignores_root_level_generated_directories() {
        let a = tempfile::tempdir().unwrap();
        fs::write(a.path().join("Dockerfile"), b"FROM python:3.11\n").unwrap();
        let digest_without = compute_context_digest(a.path()).unwrap();

        fs::create_dir(a.path().join(".git")).unwrap();
        fs::write(a.path().join(".git/HEAD"), b"ref: refs/heads/main\n").unwrap();
        let digest_with_git = compute_context_digest(a.path()).unwrap();

        assert_eq!(digest_without, digest_with_git);
    }

    #[test]
    fn path_renames_change_the_digest_even_with_same_bytes() {
        let a = tempfile::tempdir().unwrap();
        fs::write(a.path().join("one.txt"), b"same bytes").unwrap();
        let digest_one = compute_context_digest(a.path()).unwrap();

        fs::remove_file(a.path().join("one.txt")).unwrap();
        fs::write(a.path().join("two.txt"), b"same bytes").unwrap();
        let digest_two = compute_context_digest(a.path()).unwrap();

        assert_ne!(digest_one, digest_two);
    }

    #[test]
    fn image_tag_truncates_digest_to_16_chars() {
        let digest = "a".repeat(64);
        assert_eq!(image_tag("runner-sandbox", &digest), format!("runner-sandbox:{}", "a".repeat(16)));
    }
}

// SPDX-License-Identifier: MIT OR Apache-2.0
//! Target-provided install overlay (spec §4.3.b): a target repo may declare
//! additional apt/pip/npm packages via a bounded manifest; this module
//! merges that manifest with the runner's base overlay deterministically
//! and produces the record persisted as `sandbox/sandbox_cli_install.json`.

use serde::{Deserialize, Serialize};

use runner_error::{ErrorCode, RunnerError};

/// Maximum number of packages permitted in any single list — a target
/// cannot balloon the build context with an unbounded package set.
const MAX_PACKAGES_PER_LIST: usize = 100;

/// A target- or runner-declared set of extra packages to install into the
/// sandbox image.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct InstallOverlay {
    /// `apt-get install` package names.
    #[serde(default)]
    pub apt: Vec<String>,
    /// `pip install` package specifiers.
    #[serde(default)]
    pub pip: Vec<String>,
    /// `npm install -g` package specifiers.
    #[serde(default)]
    pub npm: Vec<String>,
}

/// Parse a target's install-overlay manifest (TOML).
///
/// # Errors
///
/// Returns [`RunnerError`] with [`ErrorCode::ImageBuildFailed`] if the
/// manifest is not valid TOML or any list exceeds
/// [`MAX_PACKAGES_PER_LIST`].
pub fn parse_overlay_manifest(text: &str) -> Result<InstallOverlay, RunnerError> {
    let overlay: InstallOverlay = toml::from_str(text).map_err(|e| {
        RunnerError::new(
            ErrorCode::ImageBuildFailed,
            format!("invalid install-overlay manifest: {e}"),
            "fix the target's sandbox install-overlay manifest",
        )
    })?;
    check_bounds(&overlay)?;
    Ok(overlay)
}

fn check_bounds(overlay: &InstallOverlay) -> Result<(), RunnerError> {
    for (name, list) in [("apt", &overlay.apt), ("pip", &overlay.pip), ("npm", &overlay.npm)] {
        if list.len() > MAX_PACKAGES_PER_LIST {
            return Err(RunnerError::new(
                ErrorCode::ImageBuildFailed,
                format!("install-overlay '{name}' list has {} entries, exceeding the {MAX_PACKAGES_PER_LIST} cap", list.len()),
                "trim the target's install-overlay manifest to fewer packages",
            ));
        }
    }
    Ok(())
}

/// Merge `base` (the runner's own default overlay) with `target` (the
/// target-declared overlay), unioning and deterministically sorting each
/// list.
///
/// # Errors
///
/// Returns [`RunnerError`] if the merged result exceeds
/// [`MAX_PACKAGES_PER_LIST`] in any list.
pub fn merge_overlays(base: &InstallOverlay, target: &InstallOverlay) -> Result<InstallOverlay, RunnerError> {
    let merge_list = |a: &[String], b: &[String]| -> Vec<String> {
        let mut merged: Vec<String> = a.iter().chain(b.iter()).cloned().collect();
        merged.sort();
        merged.dedup();
        merged
    };
    let merged = InstallOverlay {
        apt: merge_list(&base.apt, &target.apt),
        pip: merge_list(&base.pip, &target.pip),
        npm: merge_list(&base.npm, &target.npm),
    };
    check_bounds(&merged)?;
    Ok(merged)
}

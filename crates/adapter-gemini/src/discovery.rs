// SPDX-License-Identifier: MIT OR Apache-2.0
//! Gemini binary resolution (spec §4.4 "Binary resolution").

use runner_which::BinaryResolution;

/// Resolve the Gemini binary, unless the run has a non-empty command prefix
/// (a container backend resolves the binary inside its own image, so local
/// PATH search would be meaningless).
pub fn resolve_binary(requested: &str, has_command_prefix: bool) -> BinaryResolution {
    if has_command_prefix {
        return BinaryResolution { requested: requested.to_string(), resolved: None };
    }
    BinaryResolution::resolve(requested)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prefixed_runs_skip_local_resolution() {
        let res = resolve_binary("gemini", true);
        assert_eq!(res.requested, "gemini");
        assert!(res.resolved.is_none());
    }
}

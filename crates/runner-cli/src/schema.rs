// SPDX-License-Identifier: MIT OR Apache-2.0
//! The `schema` subcommand: print a JSON Schema for a contract type.

use anyhow::{Context, Result};
use runner_core::{RunRequest, RunnerConfig, TargetRef};
use schemars::schema_for;

use crate::SchemaArg;

/// Which contract type's schema to print.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchemaKind {
    /// JSON schema for [`RunRequest`].
    RunRequest,
    /// JSON schema for [`TargetRef`].
    TargetRef,
    /// JSON schema for [`RunnerConfig`].
    Config,
}

impl From<SchemaArg> for SchemaKind {
    fn from(v: SchemaArg) -> Self {
        match v {
            SchemaArg::RunRequest => SchemaKind::RunRequest,
            SchemaArg::TargetRef => SchemaKind::TargetRef,
            SchemaArg::Config => SchemaKind::Config,
        }
    }
}

/// Render the schema for `kind` as pretty-printed JSON.
pub fn schema_json(kind: SchemaKind) -> Result<String> {
    let value = match kind {
        SchemaKind::RunRequest => serde_json::to_value(schema_for!(RunRequest))?,
        SchemaKind::TargetRef => serde_json::to_value(schema_for!(TargetRef))?,
        SchemaKind::Config => serde_json::to_value(schema_for!(RunnerConfig))?,
    };
    serde_json::to_string_pretty(&value).context("serialize schema")
}

/// Print the schema for `kind` to stdout.
pub fn print(kind: SchemaKind) -> Result<()> {
    println!("{}", schema_json(kind)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_request_schema_is_valid_json() {
        let text = schema_json(SchemaKind::RunRequest).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert!(parsed.is_object());
    }

    #[test]
    fn every_schema_kind_renders() {
        for kind in [SchemaKind::RunRequest, SchemaKind::TargetRef, SchemaKind::Config] {
            assert!(schema_json(kind).is_ok());
        }
    }
}

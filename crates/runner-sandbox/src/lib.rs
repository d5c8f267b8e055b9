// SPDX-License-Identifier: MIT OR Apache-2.0
//! The containerized execution backend (spec §4.3.b): content-addressed
//! image caching, dynamic Python-base selection, target-provided install
//! overlays, container lifecycle, and the `ExecutionBackend` implementation
//! that lets the agent adapters stay backend-agnostic.
//!
//! `runner-orchestrator`'s `prepare_backend` stage is the caller: it
//! computes a build context digest with [`digest::compute_context_digest`],
//! resolves the image tag with [`digest::image_tag`], applies
//! [`python::select_python_base`] and [`overlay::merge_overlays`] to produce
//! the overlay Dockerfile and install manifest, then drives
//! [`instance::build_image`] and [`instance::start_container`] to obtain a
//! [`instance::SandboxInstance`] it hands to the adapter as a boxed
//! `ExecutionBackend`.

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod digest;
pub mod instance;
pub mod overlay;
pub mod python;

pub use digest::{compute_context_digest, image_tag};
pub use instance::{SandboxInstance, SandboxMeta, build_image, ensure_docker_daemon_reachable, start_container};
pub use overlay::{InstallOverlay, merge_overlays, parse_overlay_manifest};
pub use python::{PythonSelection, parse_requires_python, resolve_python_base, select_python_base};

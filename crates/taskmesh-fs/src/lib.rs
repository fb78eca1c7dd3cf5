// SPDX-License-Identifier: MIT OR Apache-2.0
//! taskmesh-fs
#![deny(unsafe_code)]
#![warn(missing_docs)]
//!
//! Atomic write primitives and the directory layout every taskmesh
//! daemon agrees on. Nothing in here understands envelopes, DAGs, or
//! commands — that's [`taskmesh_core`]; this crate only knows how to
//! move bytes between files safely.

/// Write-to-tempfile-then-rename primitives.
pub mod atomic;
/// Alert and deadletter writers shared by every daemon.
pub mod diagnostics;
/// The `agents/` and `system_runtime/` directory layout.
pub mod paths;
/// Path-safety checks for envelope-derived paths.
pub mod safety;

pub use atomic::{
    atomic_copy, atomic_move, atomic_write_bytes, atomic_write_json, file_sha256, read_json,
    read_json_tolerant,
};
pub use diagnostics::{write_alert, write_deadletter};
pub use paths::{discover_plan_ids, list_envelope_files, AgentPaths, AgentsRoot, SystemPaths};
pub use safety::safe_relpath;

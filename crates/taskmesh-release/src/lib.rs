// SPDX-License-Identifier: MIT OR Apache-2.0
//! taskmesh-release
#![deny(unsafe_code)]
#![warn(missing_docs)]
//!
//! The release gate evaluator: for every plan with a published
//! `plan_manifest.json`, resolves the required evidence files through
//! the release agent's own input index, checks each one's schema,
//! `plan_id`, and `decision` field, and writes a fresh signed release
//! manifest and decision record to the release agent's outbox every
//! tick. Never writes to any other agent's inbox, outbox, or
//! workspace, and never touches the delivery log — the router archives
//! whatever lands in the release agent's outbox the same way it
//! archives any other control-plane artifact.

/// CLI flags.
pub mod config;
/// Loading and hashing a plan's active DAG.
pub mod dag_load;
/// Checking required evidence files against policy.
pub mod evaluate;
/// Tick orchestration.
pub mod tick;

pub use tick::{tick, ReleaseContext, TickSummary};

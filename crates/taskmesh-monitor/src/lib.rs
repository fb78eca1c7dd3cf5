// SPDX-License-Identifier: MIT OR Apache-2.0
//! taskmesh-monitor
#![deny(unsafe_code)]
#![warn(missing_docs)]
//!
//! Reconstructs each plan's `plan_status.json` from partial,
//! eventually-consistent evidence scattered across agent-written task
//! state files, the archived ack history, the archived command history,
//! and the append-only delivery log — without depending on any producer
//! actively cooperating. Strictly a reducer: it never writes to an
//! agent's inbox, outbox, or workspace, and never appends to the
//! delivery log.

/// Collecting per-agent liveness snapshots.
pub mod agent_status;
/// CLI flags.
pub mod config;
/// Loading and verifying a plan's active DAG.
pub mod dag_load;
/// Reading the delivery log, archived acks, and archived commands.
pub mod evidence;
/// Input satisfaction checks against delivered artifacts.
pub mod satisfaction;
/// Per-DAG-node status derivation.
pub mod status;
/// Tick orchestration.
pub mod tick;

pub use tick::{tick, MonitorContext, TickSummary};

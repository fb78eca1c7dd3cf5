// SPDX-License-Identifier: MIT OR Apache-2.0
//! taskmesh-heartbeat
#![deny(unsafe_code)]
#![warn(missing_docs)]
//!
//! The per-agent consumer loop: claims envelopes from its own inbox,
//! ingests artifacts into its workspace, executes commands through a
//! pluggable handler, and writes acks/task state/produced artifacts —
//! all with at-most-once delivery and crash-safe resumption.

/// Writing a handler's produced artifacts to the agent's own outbox.
pub mod artifacts;
/// `heartbeat_config.json` and CLI flags.
pub mod config;
/// The command execution state machine.
pub mod execute;
/// The pluggable command handler capability.
pub mod handler;
/// Artifact ingestion into the agent's workspace.
pub mod ingest;
/// Per-envelope claim, validate, dispatch, and finalize.
pub mod process;
/// Reading and writing acks, task state, and the input index.
pub mod state_io;
/// Tick orchestration.
pub mod tick;

pub use handler::{CommandHandler, CommandOutcome, DefaultCommandHandler, HandlerContext};
pub use tick::{tick, HeartbeatContext, TickSummary};

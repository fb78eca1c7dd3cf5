// SPDX-License-Identifier: MIT OR Apache-2.0
//! taskmesh-router
#![deny(unsafe_code)]
#![warn(missing_docs)]
//!
//! The filesystem router: discovers producer outboxes, archives
//! control-plane artifacts, and delivers data-plane envelopes to
//! consumer inboxes per the active DAG, with exactly-once archival and
//! at-most-once delivery.

/// Exactly-once archival keyed by stable id.
pub mod archive;
/// CLI flags.
pub mod config;
/// Control-plane (ack/decision/release/human-request) archival.
pub mod control_plane;
/// Loading and verifying a plan's active DAG.
pub mod dag_load;
/// Per-envelope data-plane delivery.
pub mod deliver;
/// Human intervention response processing.
pub mod human_gateway;
/// Release manifest pointer refresh.
pub mod release_pointer;
/// Tick orchestration.
pub mod tick;

pub use control_plane::HUMAN_GATEWAY_AGENT_ID;
pub use tick::{tick, RouterContext, TickSummary};

// SPDX-License-Identifier: MIT OR Apache-2.0
//! taskmesh-core
#![deny(unsafe_code)]
#![warn(missing_docs)]
//!
//! The stable contract for taskmesh: wire types, id/clock helpers, and the
//! error taxonomy shared by the router, heartbeat, monitor, and release
//! daemons.
//!
//! Entities are JSON documents stored as files on a shared filesystem; this
//! crate only defines their shapes and the small set of pure helpers
//! (hashing, id formatting, timestamp formatting) every daemon needs.

/// Acknowledgment records written by a consumer for a processed envelope.
pub mod ack;
/// Alert and deadletter record shapes.
pub mod alert;
/// Command payloads embedded in command envelopes.
pub mod command;
/// Clock capability, for deterministic tests.
pub mod clock;
/// Task DAG and the active-DAG pointer file.
pub mod dag;
/// Append-only per-plan delivery log entries.
pub mod delivery;
/// Wire envelope — the unit the router moves between agents.
pub mod envelope;
/// Error taxonomy with stable, alert/deadletter-facing codes.
pub mod error;
/// Human-in-the-loop escalation request/response documents.
pub mod human;
/// Id generation (message/alert/deadletter/delivery/human-request/decision ids).
pub mod ids;
/// Per-(agent, plan) input index resolving artifact inputs to workspace files.
pub mod input_index;
/// Per-plan static configuration (`plan_manifest.json`).
pub mod manifest;
/// Agent status snapshots and the monitor's derived plan status.
pub mod plan_status;
/// Release gate evidence, decision records, and release manifests.
pub mod release;
/// Per-(agent, plan, task) task state file.
pub mod task_state;
/// RFC 3339 UTC (`Z`-suffixed) timestamp helpers.
pub mod time;

pub use ack::{Ack, AckStatus};
pub use alert::{AlertRecord, DeadletterRecord};
pub use clock::{Clock, FixedClock, SystemClock};
pub use command::{Command, DagRef, ProducesEntry, ResolvedInput};
pub use dag::{ActiveDagRef, Dag, DagNode, DagOutput, InputSelector};
pub use delivery::{DeliveryEntry, DeliveryStatus};
pub use envelope::{Envelope, EnvelopePayload, EnvelopeType, PayloadFile};
pub use error::TaskMeshError;
pub use human::{HumanInterventionRequest, HumanInterventionResponse, ProvidedFile};
pub use ids::IdGenerator;
pub use input_index::{InputIndex, InputIndexEntry, InputIndexEntryFile};
pub use manifest::{PlanManifest, PlanManifestPolicies};
pub use plan_status::{AgentStatusHeartbeat, AgentStatusSnapshot, BlockedSummary, PlanStatus, TaskStatus};
pub use release::{DecisionRecord, DecisionSubject, EvidenceOutcome, ReleaseManifest};
pub use task_state::{Blocking, TaskState, TaskStateValue};

use sha2::{Digest, Sha256};

/// Current contract version embedded in every envelope and most
/// control-plane documents (the DAG uses `"1.1"`; see [`dag::Dag`]).
pub const SCHEMA_VERSION: &str = "1.0";

/// Schema version carried by `task_dag.json` / `active_dag_ref.json`.
pub const DAG_SCHEMA_VERSION: &str = "1.1";

/// Compute the hex-encoded SHA-256 digest of `bytes`, prefixed `sha256:` as
/// used throughout the wire format (payload file hashes, `dag_ref.sha256`,
/// receipt-style content addressing).
#[must_use]
pub fn sha256_hex_prefixed(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("sha256:{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sha256_prefix_is_stable() {
        let h = sha256_hex_prefixed(b"hello");
        assert!(h.starts_with("sha256:"));
        assert_eq!(h.len(), "sha256:".len() + 64);
    }
}

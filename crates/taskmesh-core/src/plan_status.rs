// SPDX-License-Identifier: MIT OR Apache-2.0
//! The monitor's derived view of a plan: `status_heartbeat.json` (written
//! by each agent's own heartbeat) and `plan_status.json` (the monitor's
//! reduction over every DAG node).

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::task_state::{Blocking, TaskStateValue};

/// `agents/<id>/status_heartbeat.json`, written by the heartbeat each
/// tick as a self-reported liveness signal the monitor can collect
/// without depending on the agent's cooperation for anything else.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentStatusHeartbeat {
    /// Always `"1.0"`.
    pub schema_version: String,
    /// Must match the agent directory this file lives under.
    pub agent_id: String,
    /// When this heartbeat last ticked.
    pub updated_at: String,
    /// Plans this agent is currently servicing.
    pub plans: Vec<String>,
}

/// `system_runtime/agent_status/<agent_id>.json`: the monitor's copy of
/// an agent's `status_heartbeat.json`, annotated with when it was
/// collected.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentStatusSnapshot {
    /// The agent this snapshot is for.
    pub agent_id: String,
    /// When the monitor collected this snapshot.
    pub collected_at: String,
    /// The heartbeat's self-report, if present and internally consistent
    /// (its own `agent_id` must match the directory it was read from).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub heartbeat: Option<AgentStatusHeartbeat>,
}

/// One DAG node's derived status within a [`PlanStatus`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskStatus {
    /// The derived state, including the monitor-only `READY`/`PENDING`/
    /// `BLOCKED_WAITING_REVIEW` variants.
    pub state: TaskStateValue,
    /// Present while blocked.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub blocking: Option<Blocking>,
    /// The envelope this status was derived from, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message_id: Option<String>,
    /// The command this status pertains to, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub command_id: Option<String>,
    /// The command seq this status pertains to, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub command_seq: Option<u64>,
}

/// Counts of blocked tasks by reason, for `plan_status.json`'s
/// `blocked_summary`.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct BlockedSummary {
    /// Tasks blocked waiting on inputs.
    #[serde(rename = "INPUT")]
    pub input: u32,
    /// Tasks blocked waiting on review evidence.
    #[serde(rename = "REVIEW")]
    pub review: u32,
    /// Tasks escalated to a human.
    #[serde(rename = "HUMAN")]
    pub human: u32,
}

/// `system_runtime/plans/<plan>/plan_status.json`: the monitor's
/// reconstructed view of every DAG node's status.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanStatus {
    /// Always `"1.0"`.
    pub schema_version: String,
    /// The plan this status is for.
    pub plan_id: String,
    /// When the monitor computed this status.
    pub generated_at: String,
    /// Per-task derived status, keyed by `task_id`.
    pub tasks: BTreeMap<String, TaskStatus>,
    /// Aggregate blocked-task counts.
    pub blocked_summary: BlockedSummary,
}

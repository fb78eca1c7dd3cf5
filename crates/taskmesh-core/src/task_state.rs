// SPDX-License-Identifier: MIT OR Apache-2.0
//! The per-(agent, plan, task) task state file.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// `task_state.state`.
///
/// `RUNNING`, `BLOCKED_WAITING_INPUT`, `BLOCKED_WAITING_HUMAN`,
/// `COMPLETED`, and `FAILED` are written by the heartbeat. `READY`,
/// `PENDING`, and `BLOCKED_WAITING_REVIEW` only ever appear in the
/// monitor's derived `plan_status.json`, never in an agent-written task
/// state file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskStateValue {
    /// Dependencies satisfied, no command issued yet (monitor-derived).
    Ready,
    /// Dependencies not yet satisfied (monitor-derived).
    Pending,
    /// Handler invoked, not yet terminal.
    Running,
    /// Waiting on inputs that have not yet arrived.
    BlockedWaitingInput,
    /// Escalated to a human after a wait-for-inputs timeout.
    BlockedWaitingHuman,
    /// Waiting on review evidence (monitor-derived).
    BlockedWaitingReview,
    /// Terminal success.
    Completed,
    /// Terminal failure.
    Failed,
}

/// Why a task is blocked, and since when.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Blocking {
    /// `INPUT`, `HUMAN`, `REVIEW`, or `TIMEOUT`.
    pub reason: String,
    /// When the block began. Must be preserved across ticks until the
    /// block clears; only reset if the prior task state file is
    /// unreadable, in which case it falls back
    /// to the envelope's `created_at`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<String>,
    /// The command's configured timeout, for `TIMEOUT` blocking.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout_seconds: Option<u64>,
    /// The multiplier applied to `timeout_seconds` for ack-consumed
    /// staleness (always `2`).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub multiplier: Option<u32>,
    /// When the stale `CONSUMED` ack was written, for `TIMEOUT` blocking.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub consumed_at: Option<String>,
    /// The synthesized human request id, for `HUMAN` blocking.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
}

/// The per-(agent, plan, task_id) task state file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskState {
    /// Current state.
    pub state: TaskStateValue,
    /// When this record was last written.
    pub updated_at: String,
    /// Present while `state` is one of the `BLOCKED_*` variants.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub blocking: Option<Blocking>,
    /// Free-form handler progress notes.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub progress: Option<Value>,
    /// Handler result, once terminal.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    /// The envelope this state transition was driven by, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message_id: Option<String>,
    /// The command this state pertains to, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub command_id: Option<String>,
    /// The command seq this state pertains to, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub command_seq: Option<u64>,
}

impl TaskState {
    /// `blocking.started_at`, if this state is blocked and carries one.
    #[must_use]
    pub fn blocking_started_at(&self) -> Option<&str> {
        self.blocking.as_ref().and_then(|b| b.started_at.as_deref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serializes_screaming_snake_case() {
        let s = serde_json::to_string(&TaskStateValue::BlockedWaitingInput).unwrap();
        assert_eq!(s, "\"BLOCKED_WAITING_INPUT\"");
    }

    #[test]
    fn blocking_started_at_reads_through() {
        let ts = TaskState {
            state: TaskStateValue::BlockedWaitingInput,
            updated_at: "2026-07-31T00:00:00Z".into(),
            blocking: Some(Blocking {
                reason: "INPUT".into(),
                started_at: Some("2026-07-31T00:00:00Z".into()),
                timeout_seconds: None,
                multiplier: None,
                consumed_at: None,
                request_id: None,
            }),
            progress: None,
            result: None,
            message_id: None,
            command_id: None,
            command_seq: None,
        };
        assert_eq!(ts.blocking_started_at(), Some("2026-07-31T00:00:00Z"));
    }
}

// SPDX-License-Identifier: MIT OR Apache-2.0
//! Reading and writing acks, task state, and the input index — the
//! three pieces of durable per-agent state the heartbeat's state machine
//! depends on.

use anyhow::Result;
use taskmesh_core::{Ack, InputIndex, TaskState};
use taskmesh_fs::{atomic_write_json, read_json_tolerant, AgentPaths};

/// `agents/<id>/outbox/<plan>/ack_<message_id>.json`.
#[must_use]
pub fn ack_path(agent: &AgentPaths, plan_id: &str, message_id: &str) -> std::path::PathBuf {
    agent.outbox(plan_id).join(format!("ack_{message_id}.json"))
}

/// Read the ack for `message_id`, if one has been written and is
/// parseable.
#[must_use]
pub fn read_ack(agent: &AgentPaths, plan_id: &str, message_id: &str) -> Option<Ack> {
    read_json_tolerant(&ack_path(agent, plan_id, message_id))
}

/// Write an ack, but skip the write if an identical ack is already on
/// disk — re-delivering an already-terminal envelope must not produce
/// new ack content.
pub fn write_ack(agent: &AgentPaths, plan_id: &str, ack: &Ack) -> Result<()> {
    let path = ack_path(agent, plan_id, &ack.message_id);
    if let Some(existing) = read_json_tolerant::<Ack>(&path) {
        if serde_json::to_value(&existing)? == serde_json::to_value(ack)? {
            return Ok(());
        }
    }
    atomic_write_json(&path, ack)
}

/// Read the task state for `task_id`, if present and parseable.
#[must_use]
pub fn read_task_state(agent: &AgentPaths, plan_id: &str, task_id: &str) -> Option<TaskState> {
    read_json_tolerant(&agent.task_state_file(plan_id, task_id))
}

/// Write the task state for `task_id`.
pub fn write_task_state(
    agent: &AgentPaths,
    plan_id: &str,
    task_id: &str,
    state: &TaskState,
) -> Result<()> {
    atomic_write_json(&agent.task_state_file(plan_id, task_id), state)
}

/// Read the input index, defaulting to empty if missing or corrupt —
/// readers tolerate partial writes.
#[must_use]
pub fn read_input_index(agent: &AgentPaths, plan_id: &str) -> InputIndex {
    read_json_tolerant(&agent.input_index_file(plan_id)).unwrap_or_default()
}

/// Persist the input index.
pub fn write_input_index(agent: &AgentPaths, plan_id: &str, index: &InputIndex) -> Result<()> {
    atomic_write_json(&agent.input_index_file(plan_id), index)
}

#[cfg(test)]
mod tests {
    use super::*;
    use taskmesh_core::AckStatus;
    use taskmesh_fs::AgentsRoot;
    use tempfile::tempdir;

    #[test]
    fn write_ack_is_idempotent_on_identical_content() {
        let dir = tempdir().unwrap();
        let root = AgentsRoot::new(dir.path());
        let agent = root.agent("agent_exec");
        let ack = Ack {
            message_id: "msg_1".into(),
            consumer_agent_id: "agent_exec".into(),
            status: AckStatus::Succeeded,
            consumed_at: "2026-07-31T00:00:00Z".into(),
            finished_at: Some("2026-07-31T00:00:01Z".into()),
            result: None,
            task_id: Some("task_exec".into()),
            command_id: Some("c1".into()),
            command_seq: Some(1),
        };
        write_ack(&agent, "plan-1", &ack).unwrap();
        let before = std::fs::metadata(ack_path(&agent, "plan-1", "msg_1"))
            .unwrap()
            .modified()
            .unwrap();
        std::thread::sleep(std::time::Duration::from_millis(10));
        write_ack(&agent, "plan-1", &ack).unwrap();
        let after = std::fs::metadata(ack_path(&agent, "plan-1", "msg_1"))
            .unwrap()
            .modified()
            .unwrap();
        assert_eq!(before, after, "identical ack content must not rewrite the file");
    }
}

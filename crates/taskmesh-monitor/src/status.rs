// SPDX-License-Identifier: MIT OR Apache-2.0
//! Per-DAG-node status derivation: a three-tier priority rule.
//!
//! Priority 1 (authoritative): the assigned agent's own
//! `task_state_<task_id>.json`, if present. Priority 2 (archived ack
//! history): the latest terminal ack for the task, or a `CONSUMED` ack
//! checked for staleness, used when no agent-written state exists yet
//! or has been swept away. Priority 3 (DAG-derived): no direct evidence
//! exists at all, so the node's readiness is computed from its
//! dependencies and declared inputs.
//!
//! This module never writes agent or plan state; it only ever produces
//! the in-memory `TaskStatus` values `tick.rs` assembles into
//! `plan_status.json`.

use std::collections::BTreeMap;

use anyhow::Result;
use taskmesh_core::clock::Clock;
use taskmesh_core::time::parse_iso_z;
use taskmesh_core::{
    AckStatus, Ack, Blocking, Dag, DagNode, TaskMeshError, TaskState, TaskStateValue, TaskStatus,
};
use taskmesh_fs::{read_json_tolerant, write_alert, AgentsRoot, SystemPaths};

use crate::evidence::{latest_command_for_task, DeliveredArtifact, Evidence};
use crate::satisfaction::inputs_satisfied;

const SOURCE: &str = "taskmesh-monitor";
/// A `CONSUMED` ack outstanding longer than `timeout * ACK_STALE_MULTIPLIER`
/// is treated as stale.
const ACK_STALE_MULTIPLIER: u32 = 2;

/// Derive every DAG node's status for `plan_id`.
pub fn derive_statuses(
    agents_root: &AgentsRoot,
    system: &SystemPaths,
    clock: &dyn Clock,
    plan_id: &str,
    dag: &Dag,
    dag_sha: &str,
    evidence: &Evidence,
) -> Result<BTreeMap<String, TaskStatus>> {
    let mut resolved: BTreeMap<String, TaskStatus> = BTreeMap::new();
    let mut unresolved: Vec<(&String, &DagNode)> = Vec::new();

    for (task_id, node) in &dag.nodes {
        if let Some(status) = priority_one(agents_root, plan_id, task_id, node) {
            resolved.insert(task_id.clone(), status);
            continue;
        }
        if let Some(status) = priority_two(system, clock, plan_id, task_id, dag_sha, evidence)? {
            resolved.insert(task_id.clone(), status);
            continue;
        }
        unresolved.push((task_id, node));
    }

    for (task_id, node) in unresolved {
        let status = priority_three(system, plan_id, task_id, node, dag_sha, &resolved, evidence);
        resolved.insert(task_id.clone(), status);
    }

    Ok(resolved)
}

/// Counts of blocked tasks by reason, for `plan_status.json`'s
/// `blocked_summary`.
#[must_use]
pub fn blocked_summary(tasks: &BTreeMap<String, TaskStatus>) -> taskmesh_core::BlockedSummary {
    let mut summary = taskmesh_core::BlockedSummary::default();
    for status in tasks.values() {
        match status.state {
            TaskStateValue::BlockedWaitingInput => summary.input += 1,
            TaskStateValue::BlockedWaitingReview => summary.review += 1,
            TaskStateValue::BlockedWaitingHuman => summary.human += 1,
            _ => {}
        }
    }
    summary
}

fn priority_one(
    agents_root: &AgentsRoot,
    plan_id: &str,
    task_id: &str,
    node: &DagNode,
) -> Option<TaskStatus> {
    let agent = agents_root.agent(&node.assigned_agent_id);
    let state: TaskState = read_json_tolerant(&agent.task_state_file(plan_id, task_id))?;
    Some(TaskStatus {
        state: state.state,
        blocking: state.blocking,
        message_id: state.message_id,
        command_id: state.command_id,
        command_seq: state.command_seq,
    })
}

fn priority_two(
    system: &SystemPaths,
    clock: &dyn Clock,
    plan_id: &str,
    task_id: &str,
    dag_sha: &str,
    evidence: &Evidence,
) -> Result<Option<TaskStatus>> {
    let acks_for_task: Vec<&Ack> = evidence
        .acks_by_message_id
        .values()
        .filter(|ack| ack_belongs_to_task(ack, task_id, evidence))
        .collect();
    if acks_for_task.is_empty() {
        return Ok(None);
    }

    let mut latest_terminal: Option<&Ack> = None;
    let mut latest_consumed: Option<&Ack> = None;
    for ack in &acks_for_task {
        if ack.status.is_terminal() {
            if latest_terminal.is_none_or(|cur| ack_timestamp(ack) > ack_timestamp(cur)) {
                latest_terminal = Some(ack);
            }
        } else if ack.status == AckStatus::Consumed
            && latest_consumed.is_none_or(|cur| ack.consumed_at > cur.consumed_at)
        {
            latest_consumed = Some(ack);
        }
    }

    if let Some(terminal) = latest_terminal {
        let state = match terminal.status {
            AckStatus::Succeeded => TaskStateValue::Completed,
            AckStatus::Failed => TaskStateValue::Failed,
            AckStatus::Consumed => TaskStateValue::Running,
        };
        return Ok(Some(TaskStatus {
            state,
            blocking: None,
            message_id: Some(terminal.message_id.clone()),
            command_id: terminal.command_id.clone(),
            command_seq: terminal.command_seq,
        }));
    }

    let Some(consumed) = latest_consumed else {
        return Ok(None);
    };

    let blocking = stale_consumed_blocking(system, clock, plan_id, task_id, dag_sha, consumed)?;

    Ok(Some(TaskStatus {
        state: TaskStateValue::Running,
        blocking,
        message_id: Some(consumed.message_id.clone()),
        command_id: consumed.command_id.clone(),
        command_seq: consumed.command_seq,
    }))
}

fn stale_consumed_blocking(
    system: &SystemPaths,
    clock: &dyn Clock,
    plan_id: &str,
    task_id: &str,
    dag_sha: &str,
    consumed: &Ack,
) -> Result<Option<Blocking>> {
    let Ok(consumed_at) = parse_iso_z(&consumed.consumed_at) else {
        return Ok(None);
    };
    let commands_dir = system.commands_dir(plan_id);
    let Some(command) = latest_command_for_task(&commands_dir, task_id, dag_sha) else {
        return Ok(None);
    };
    let elapsed = (clock.now() - consumed_at).num_seconds().max(0) as u64;
    if elapsed < command.timeout * u64::from(ACK_STALE_MULTIPLIER) {
        return Ok(None);
    }

    write_alert(
        system,
        clock,
        plan_id,
        SOURCE,
        TaskMeshError::CommandAckTimeout { task_id: task_id.to_string() }.code(),
        format!("task {task_id}'s CONSUMED ack has been outstanding for {elapsed}s"),
        serde_json::to_value(consumed).ok(),
    )?;

    Ok(Some(Blocking {
        reason: "TIMEOUT".to_string(),
        started_at: None,
        timeout_seconds: Some(command.timeout),
        multiplier: Some(ACK_STALE_MULTIPLIER),
        consumed_at: Some(consumed.consumed_at.clone()),
        request_id: None,
    }))
}

fn ack_belongs_to_task(ack: &Ack, task_id: &str, evidence: &Evidence) -> bool {
    if let Some(t) = &ack.task_id {
        return t == task_id;
    }
    evidence
        .message_id_to_task_id
        .get(&ack.message_id)
        .is_some_and(|t| t == task_id)
}

fn ack_timestamp(ack: &Ack) -> &str {
    ack.finished_at.as_deref().unwrap_or(&ack.consumed_at)
}

fn priority_three(
    system: &SystemPaths,
    plan_id: &str,
    task_id: &str,
    node: &DagNode,
    dag_sha: &str,
    resolved: &BTreeMap<String, TaskStatus>,
    evidence: &Evidence,
) -> TaskStatus {
    let empty: Vec<DeliveredArtifact> = Vec::new();
    let delivered = evidence
        .delivered_artifacts_by_agent
        .get(&node.assigned_agent_id)
        .unwrap_or(&empty);

    let commands_dir = system.commands_dir(plan_id);
    if let Some(command) = latest_command_for_task(&commands_dir, task_id, dag_sha) {
        if command.wait_for_inputs {
            let required = command.required_file_names();
            let missing = !required.is_empty()
                && !required.iter().all(|name| {
                    delivered.iter().any(|d| d.file_names.iter().any(|f| f == name))
                });
            if missing {
                return TaskStatus {
                    state: TaskStateValue::BlockedWaitingInput,
                    blocking: Some(Blocking {
                        reason: "INPUT".to_string(),
                        started_at: None,
                        timeout_seconds: Some(command.timeout),
                        multiplier: None,
                        consumed_at: None,
                        request_id: None,
                    }),
                    message_id: None,
                    command_id: Some(command.command_id.clone()),
                    command_seq: Some(command.command_seq),
                };
            }
        }
    }

    let depends_satisfied = node.depends_on.iter().all(|dep| {
        resolved.get(dep).is_some_and(|status| status.state == TaskStateValue::Completed)
    });
    let inputs_ready = inputs_satisfied(node.inputs.as_deref(), node.required_inputs.as_deref(), delivered);

    let state = if depends_satisfied && inputs_ready {
        TaskStateValue::Ready
    } else {
        TaskStateValue::Pending
    };

    TaskStatus {
        state,
        blocking: None,
        message_id: None,
        command_id: None,
        command_seq: None,
    }
}

// SPDX-License-Identifier: MIT OR Apache-2.0
//! The command execution state machine: wait-for-inputs blocking,
//! human escalation on timeout, and handler invocation.

use anyhow::Result;
use taskmesh_core::clock::Clock;
use taskmesh_core::ids::IdGenerator;
use taskmesh_core::time::{iso_z, parse_iso_z};
use taskmesh_core::{
    Ack, AckStatus, Blocking, Command, Envelope, HumanInterventionRequest, TaskMeshError,
    TaskState, TaskStateValue,
};
use taskmesh_fs::{write_alert, AgentPaths, SystemPaths};

use crate::handler::{CommandHandler, HandlerContext, ensure_task_workspace};
use crate::state_io::{read_input_index, read_task_state, write_ack, write_task_state};
use crate::artifacts::write_artifacts_to_outbox;

const SOURCE: &str = "heartbeat";

/// What executing a command this tick resulted in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecuteOutcome {
    /// Still waiting for inputs; envelope must stay in `.pending/`.
    BlockedWaitingInput,
    /// Escalated to a human; envelope must stay in `.pending/`.
    BlockedWaitingHuman,
    /// Handler ran and succeeded; envelope may be finalized.
    Completed,
    /// Handler ran and failed; envelope may be finalized (a handler
    /// failure is a terminal business outcome, not a deadletter).
    Failed,
}

impl ExecuteOutcome {
    /// Whether the envelope claiming this command may be moved out of
    /// `.pending/` this tick.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

/// The filenames a command still needs, per its `required_inputs` or
/// `resolved_inputs`, that have not yet appeared in the input index.
#[must_use]
pub fn missing_inputs_for_command(agent: &AgentPaths, plan_id: &str, command: &Command) -> Vec<String> {
    let index = read_input_index(agent, plan_id);
    command
        .required_file_names()
        .into_iter()
        .filter(|name| !index.has_file_name(name))
        .collect()
}

/// Run the command execution state machine for one command envelope.
///
/// `envelope` must carry a `Command` payload. Returns the outcome;
/// callers use [`ExecuteOutcome::is_terminal`] to decide whether to
/// finalize the claimed envelope this tick.
pub fn execute_command(
    agent: &AgentPaths,
    system: &SystemPaths,
    plan_id: &str,
    envelope: &Envelope,
    command: &Command,
    handler: &dyn CommandHandler,
    clock: &dyn Clock,
) -> Result<ExecuteOutcome> {
    let missing = missing_inputs_for_command(agent, plan_id, command);

    if command.wait_for_inputs && !missing.is_empty() {
        return handle_blocked(agent, system, plan_id, envelope, command, &missing, clock);
    }

    run_handler(agent, system, plan_id, envelope, command, handler, clock)
}

fn handle_blocked(
    agent: &AgentPaths,
    system: &SystemPaths,
    plan_id: &str,
    envelope: &Envelope,
    command: &Command,
    missing: &[String],
    clock: &dyn Clock,
) -> Result<ExecuteOutcome> {
    let task_id = &command.task_id;
    let state_path = agent.task_state_file(plan_id, task_id);
    let prior = read_task_state(agent, plan_id, task_id);

    // Already escalated: stay put, no duplicate human request.
    if let Some(TaskState {
        state: TaskStateValue::BlockedWaitingHuman,
        blocking: Some(blocking),
        ..
    }) = &prior
    {
        if blocking.request_id.is_some() {
            return Ok(ExecuteOutcome::BlockedWaitingHuman);
        }
    }

    if prior.is_none() && state_path.exists() {
        write_alert(
            system,
            clock,
            plan_id,
            SOURCE,
            "TASK_STATE_CORRUPT_FALLBACK",
            format!("task {task_id}'s task state file is unreadable; falling back to envelope created_at"),
            None,
        )?;
    }

    let started_at = match &prior {
        Some(state) => match state.blocking_started_at() {
            Some(ts) => ts.to_string(),
            None => envelope.created_at.clone(),
        },
        None => envelope.created_at.clone(),
    };

    let elapsed_seconds = parse_iso_z(&started_at)
        .ok()
        .map(|started| (clock.now() - started).num_seconds().max(0) as u64)
        .unwrap_or(0);

    if elapsed_seconds >= command.timeout {
        let idgen = IdGenerator::new(clock);
        let request_id = idgen.human_request_id();
        let request = HumanInterventionRequest {
            request_id: request_id.clone(),
            plan_id: plan_id.to_string(),
            task_id: task_id.clone(),
            command_id: command.command_id.clone(),
            reason: "WAIT_FOR_INPUTS_TIMEOUT".to_string(),
            created_at: iso_z(clock.now()),
            missing_inputs: missing.to_vec(),
            details: None,
        };
        let path = system
            .human_requests_dir(plan_id)
            .join(format!("human_intervention_request_{request_id}.json"));
        taskmesh_fs::atomic_write_json(&path, &request)?;

        write_alert(
            system,
            clock,
            plan_id,
            SOURCE,
            TaskMeshError::WaitForInputsTimeout { task_id: task_id.clone() }.code(),
            format!("task {task_id} timed out waiting for inputs: {missing:?}"),
            serde_json::to_value(&request).ok(),
        )?;

        write_task_state(
            agent,
            plan_id,
            task_id,
            &TaskState {
                state: TaskStateValue::BlockedWaitingHuman,
                updated_at: iso_z(clock.now()),
                blocking: Some(Blocking {
                    reason: "HUMAN".to_string(),
                    started_at: Some(started_at),
                    timeout_seconds: Some(command.timeout),
                    multiplier: None,
                    consumed_at: None,
                    request_id: Some(request_id),
                }),
                progress: None,
                result: None,
                message_id: Some(envelope.message_id.clone()),
                command_id: Some(command.command_id.clone()),
                command_seq: Some(command.command_seq),
            },
        )?;
        return Ok(ExecuteOutcome::BlockedWaitingHuman);
    }

    write_task_state(
        agent,
        plan_id,
        task_id,
        &TaskState {
            state: TaskStateValue::BlockedWaitingInput,
            updated_at: iso_z(clock.now()),
            blocking: Some(Blocking {
                reason: "INPUT".to_string(),
                started_at: Some(started_at),
                timeout_seconds: Some(command.timeout),
                multiplier: None,
                consumed_at: None,
                request_id: None,
            }),
            progress: None,
            result: None,
            message_id: Some(envelope.message_id.clone()),
            command_id: Some(command.command_id.clone()),
            command_seq: Some(command.command_seq),
        },
    )?;
    Ok(ExecuteOutcome::BlockedWaitingInput)
}

fn run_handler(
    agent: &AgentPaths,
    system: &SystemPaths,
    plan_id: &str,
    envelope: &Envelope,
    command: &Command,
    handler: &dyn CommandHandler,
    clock: &dyn Clock,
) -> Result<ExecuteOutcome> {
    let now = iso_z(clock.now());
    write_ack(
        agent,
        plan_id,
        &Ack {
            message_id: envelope.message_id.clone(),
            consumer_agent_id: agent.agent_id().to_string(),
            status: AckStatus::Consumed,
            consumed_at: now.clone(),
            finished_at: None,
            result: None,
            task_id: Some(command.task_id.clone()),
            command_id: Some(command.command_id.clone()),
            command_seq: Some(command.command_seq),
        },
    )?;
    write_task_state(
        agent,
        plan_id,
        &command.task_id,
        &TaskState {
            state: TaskStateValue::Running,
            updated_at: now,
            blocking: None,
            progress: None,
            result: None,
            message_id: Some(envelope.message_id.clone()),
            command_id: Some(command.command_id.clone()),
            command_seq: Some(command.command_seq),
        },
    )?;

    let workspace_root = agent.workspace(plan_id);
    let task_workspace = ensure_task_workspace(&workspace_root, &command.task_id)?;
    let inputs_dir = agent.workspace_inputs(plan_id);
    let ctx = HandlerContext {
        agent_id: agent.agent_id(),
        plan_id,
        task_id: &command.task_id,
        task_workspace: &task_workspace,
        inputs_dir: &inputs_dir,
    };

    let outcome = handler.handle_command(envelope, command, &ctx);
    let finished_at = iso_z(clock.now());

    let outcome = match outcome {
        Ok(outcome) => outcome,
        Err(err) => crate::handler::CommandOutcome {
            ok: false,
            details: None,
            error: Some(err.to_string()),
        },
    };

    if outcome.ok {
        let details = outcome.details.unwrap_or_default();
        if !details.artifacts.is_empty() {
            write_artifacts_to_outbox(
                agent,
                plan_id,
                &command.task_id,
                &command.command_id,
                &details.artifacts,
                clock,
            )?;
        }
        let result = serde_json::json!({
            "summary": details.summary,
            "score": details.score,
        });
        write_ack(
            agent,
            plan_id,
            &Ack {
                message_id: envelope.message_id.clone(),
                consumer_agent_id: agent.agent_id().to_string(),
                status: AckStatus::Succeeded,
                consumed_at: finished_at.clone(),
                finished_at: Some(finished_at.clone()),
                result: Some(result.clone()),
                task_id: Some(command.task_id.clone()),
                command_id: Some(command.command_id.clone()),
                command_seq: Some(command.command_seq),
            },
        )?;
        write_task_state(
            agent,
            plan_id,
            &command.task_id,
            &TaskState {
                state: TaskStateValue::Completed,
                updated_at: finished_at,
                blocking: None,
                progress: None,
                result: Some(result),
                message_id: Some(envelope.message_id.clone()),
                command_id: Some(command.command_id.clone()),
                command_seq: Some(command.command_seq),
            },
        )?;
        Ok(ExecuteOutcome::Completed)
    } else {
        let result = serde_json::json!({ "error": outcome.error });
        write_ack(
            agent,
            plan_id,
            &Ack {
                message_id: envelope.message_id.clone(),
                consumer_agent_id: agent.agent_id().to_string(),
                status: AckStatus::Failed,
                consumed_at: finished_at.clone(),
                finished_at: Some(finished_at.clone()),
                result: Some(result.clone()),
                task_id: Some(command.task_id.clone()),
                command_id: Some(command.command_id.clone()),
                command_seq: Some(command.command_seq),
            },
        )?;
        write_task_state(
            agent,
            plan_id,
            &command.task_id,
            &TaskState {
                state: TaskStateValue::Failed,
                updated_at: finished_at,
                blocking: None,
                progress: None,
                result: Some(result),
                message_id: Some(envelope.message_id.clone()),
                command_id: Some(command.command_id.clone()),
                command_seq: Some(command.command_seq),
            },
        )?;
        Ok(ExecuteOutcome::Failed)
    }
}

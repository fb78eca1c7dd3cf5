// SPDX-License-Identifier: MIT OR Apache-2.0
//! Ingesting an artifact envelope into the agent's workspace.

use std::fs;

use anyhow::Result;
use taskmesh_core::clock::Clock;
use taskmesh_core::time::iso_z;
use taskmesh_core::{Ack, AckStatus, Envelope, InputIndexEntry, InputIndexEntryFile, TaskMeshError};
use taskmesh_fs::{atomic_copy, atomic_move, file_sha256, safe_relpath, write_alert, write_deadletter, AgentPaths, SystemPaths};

use crate::state_io::{read_input_index, write_ack, write_input_index};

const SOURCE: &str = "heartbeat";

/// What happened to an artifact envelope during ingestion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestOutcome {
    /// Ingested successfully (or already was, on replay); a `SUCCEEDED`
    /// ack exists.
    Succeeded,
    /// A payload file was missing from the inbox; deadlettered.
    MissingPayload,
    /// A payload file collided with a different-sha file already
    /// ingested; deadlettered.
    InputConflict,
    /// A path in the payload was unsafe; deadlettered.
    UnsafePath,
}

/// Ingest `envelope` (must be `type == "artifact"`), whose payload files
/// are expected to sit alongside it in `agents/<id>/inbox/<plan>/`.
pub fn ingest_artifact(
    agent: &AgentPaths,
    system: &SystemPaths,
    plan_id: &str,
    envelope: &Envelope,
    clock: &dyn Clock,
) -> Result<IngestOutcome> {
    let (Some(task_id), Some(output_name)) = (&envelope.task_id, &envelope.output_name) else {
        reject(system, clock, plan_id, envelope, &TaskMeshError::MissingPayload(
            "artifact envelope missing task_id/output_name".into(),
        ))?;
        return Ok(IngestOutcome::MissingPayload);
    };

    let inbox = agent.inbox(plan_id);
    let dest_dir = agent.workspace_input_dir(plan_id, task_id, output_name);

    let mut index = read_input_index(agent, plan_id);
    if index.has_message_id(&envelope.message_id) {
        write_terminal_ack(agent, plan_id, envelope, clock)?;
        return Ok(IngestOutcome::Succeeded);
    }

    let mut entry_files = Vec::with_capacity(envelope.artifact_files().len());
    for file in envelope.artifact_files() {
        let Ok(src) = safe_relpath(&inbox, &file.path) else {
            reject(system, clock, plan_id, envelope, &TaskMeshError::UnsafePath(file.path.clone()))?;
            return Ok(IngestOutcome::UnsafePath);
        };
        if !src.exists() {
            reject(
                system,
                clock,
                plan_id,
                envelope,
                &TaskMeshError::MissingPayload(file.path.clone()),
            )?;
            return Ok(IngestOutcome::MissingPayload);
        }

        let Ok(dest) = safe_relpath(&dest_dir, &file.path) else {
            reject(system, clock, plan_id, envelope, &TaskMeshError::UnsafePath(file.path.clone()))?;
            return Ok(IngestOutcome::UnsafePath);
        };
        if dest.exists() {
            let existing_sha = file_sha256(&dest)?;
            if existing_sha != file.sha256 {
                reject(
                    system,
                    clock,
                    plan_id,
                    envelope,
                    &TaskMeshError::InputConflict(format!(
                        "{} already ingested with a different digest",
                        file.path
                    )),
                )?;
                return Ok(IngestOutcome::InputConflict);
            }
        } else {
            atomic_copy(&src, &dest)?;
        }

        entry_files.push(InputIndexEntryFile {
            path: file.path.clone(),
            sha256: file.sha256.clone(),
            stored_at: iso_z(clock.now()),
        });
    }

    index.entries.push(InputIndexEntry {
        message_id: envelope.message_id.clone(),
        task_id: task_id.clone(),
        output_name: output_name.clone(),
        received_at: iso_z(clock.now()),
        files: entry_files,
    });
    write_input_index(agent, plan_id, &index)?;

    write_terminal_ack(agent, plan_id, envelope, clock)?;
    finalize_payloads(agent, system, plan_id, envelope, clock)?;

    Ok(IngestOutcome::Succeeded)
}

fn write_terminal_ack(
    agent: &AgentPaths,
    plan_id: &str,
    envelope: &Envelope,
    clock: &dyn Clock,
) -> Result<()> {
    let now = iso_z(clock.now());
    write_ack(
        agent,
        plan_id,
        &Ack {
            message_id: envelope.message_id.clone(),
            consumer_agent_id: agent.agent_id().to_string(),
            status: AckStatus::Succeeded,
            consumed_at: now.clone(),
            finished_at: Some(now),
            result: None,
            task_id: envelope.task_id.clone(),
            command_id: None,
            command_seq: None,
        },
    )
}

/// Move each payload file referenced by `envelope` from the inbox root
/// into `.processed/_payload/<message_id>/<rel>`, or into
/// `.deadletter/_payload_conflict/<message_id>/<rel>` if a
/// different-sha file already occupies that slot
/// (`PAYLOAD_FINALIZE_CONFLICT`).
fn finalize_payloads(
    agent: &AgentPaths,
    system: &SystemPaths,
    plan_id: &str,
    envelope: &Envelope,
    clock: &dyn Clock,
) -> Result<()> {
    let inbox = agent.inbox(plan_id);
    let finalized_dir = agent.inbox_processed_payload(plan_id, &envelope.message_id);
    for file in envelope.artifact_files() {
        let Ok(src) = safe_relpath(&inbox, &file.path) else {
            continue;
        };
        if !src.exists() {
            // Already finalized by a prior attempt at this tick/crash.
            continue;
        }
        let Ok(dest) = safe_relpath(&finalized_dir, &file.path) else {
            continue;
        };
        if dest.exists() {
            let existing_sha = file_sha256(&dest)?;
            if existing_sha != file.sha256 {
                let conflict_dir = agent.inbox_payload_conflict(plan_id, &envelope.message_id);
                let Ok(conflict_dest) = safe_relpath(&conflict_dir, &file.path) else {
                    continue;
                };
                atomic_move(&src, &conflict_dest)?;
                write_alert(
                    system,
                    clock,
                    plan_id,
                    SOURCE,
                    TaskMeshError::PayloadFinalizeConflict(file.path.clone()).code(),
                    format!("payload {} conflicts at finalization", file.path),
                    None,
                )?;
                continue;
            }
            fs::remove_file(&src).ok();
            continue;
        }
        atomic_move(&src, &dest)?;
    }
    Ok(())
}

fn reject(
    system: &SystemPaths,
    clock: &dyn Clock,
    plan_id: &str,
    envelope: &Envelope,
    error: &TaskMeshError,
) -> Result<()> {
    write_alert(
        system,
        clock,
        plan_id,
        SOURCE,
        error.code(),
        error.to_string(),
        serde_json::to_value(envelope).ok(),
    )?;
    write_deadletter(
        system,
        clock,
        plan_id,
        SOURCE,
        error.code(),
        error.to_string(),
        Some(envelope.message_id.clone()),
        serde_json::to_value(envelope).ok(),
    )?;
    Ok(())
}

// SPDX-License-Identifier: MIT OR Apache-2.0
//! Per-envelope claim, validate, dispatch, and finalize: the
//! heartbeat's half of at-most-once delivery.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Result;
use taskmesh_core::clock::Clock;
use taskmesh_core::{Envelope, EnvelopeType, TaskMeshError};
use taskmesh_fs::{atomic_move, list_envelope_files, write_alert, write_deadletter, AgentPaths, SystemPaths};
use taskmesh_schema::SchemaRegistry;

use crate::execute::{execute_command, ExecuteOutcome};
use crate::handler::CommandHandler;
use crate::ingest::{ingest_artifact, IngestOutcome};
use crate::state_io::read_ack;

const SOURCE: &str = "heartbeat";

/// Claim every new top-level envelope file in `agent`'s inbox for
/// `plan_id`, up to `max_new`, renaming each into `.pending/` with a
/// content-addressed name, and return the claimed paths in claim order.
pub fn claim_new_envelopes(agent: &AgentPaths, plan_id: &str, max_new: u32) -> Result<Vec<PathBuf>> {
    let inbox = agent.inbox(plan_id);
    let pending_dir = agent.inbox_pending(plan_id);
    let candidates = list_envelope_files(&inbox)?;

    let mut claimed = Vec::new();
    for path in candidates.into_iter().take(max_new as usize) {
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        let message_id = extract_message_id(&path)?;
        let target = claim_target(&pending_dir, &message_id, name);
        atomic_move(&path, &target)?;
        claimed.push(target);
    }
    Ok(claimed)
}

/// List envelopes already sitting in `.pending/` from a prior tick,
/// bounded by `max_resume` — recovers after a crash between claim and
/// finalize.
pub fn pending_envelopes(agent: &AgentPaths, plan_id: &str, max_resume: u32) -> Result<Vec<PathBuf>> {
    let pending_dir = agent.inbox_pending(plan_id);
    if !pending_dir.exists() {
        return Ok(Vec::new());
    }
    let mut files: Vec<PathBuf> = fs::read_dir(&pending_dir)?
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.is_file())
        .filter(|p| p.extension().and_then(|e| e.to_str()) != Some("tmp"))
        .collect();
    files.sort();
    files.truncate(max_resume as usize);
    Ok(files)
}

/// Read `message_id` out of a `.msg.json` file's bytes without caring
/// whether the rest of the document parses.
fn extract_message_id(path: &Path) -> Result<String> {
    let bytes = fs::read(path)?;
    let value: serde_json::Value = serde_json::from_slice(&bytes)
        .unwrap_or(serde_json::Value::Null);
    Ok(value
        .get("message_id")
        .and_then(|v| v.as_str())
        .map(str::to_string)
        .unwrap_or_else(|| format!("unknown_{}", path.display())))
}

fn claim_target(pending_dir: &Path, message_id: &str, name: &str) -> PathBuf {
    let base = format!("{message_id}__{name}");
    let direct = pending_dir.join(&base);
    if !direct.exists() {
        return direct;
    }
    let mut n = 1u32;
    loop {
        let candidate = pending_dir.join(format!("{message_id}__dup_{n}__{name}"));
        if !candidate.exists() {
            return candidate;
        }
        n += 1;
    }
}

/// Process one claimed envelope file (already renamed into `.pending/`).
/// Leaves the file in place if the command it carries is still blocked;
/// otherwise finalizes it into `.processed/` or `.deadletter/`.
#[allow(clippy::too_many_arguments)]
pub fn process_claimed_envelope(
    agent: &AgentPaths,
    system: &SystemPaths,
    schemas: &SchemaRegistry,
    schema_validation_enabled: bool,
    plan_id: &str,
    claimed_path: &Path,
    handler: &dyn CommandHandler,
    clock: &dyn Clock,
) -> Result<()> {
    let bytes = fs::read(claimed_path)?;

    let envelope: Envelope = match serde_json::from_slice(&bytes) {
        Ok(e) => e,
        Err(e) => {
            return reject(
                agent,
                system,
                plan_id,
                claimed_path,
                None,
                &TaskMeshError::EnvelopeParseError(e.to_string()),
                clock,
            );
        }
    };

    if envelope.schema_version != taskmesh_core::SCHEMA_VERSION {
        return reject(
            agent,
            system,
            plan_id,
            claimed_path,
            Some(&envelope),
            &TaskMeshError::SchemaVersionUnsupported(envelope.schema_version.clone()),
            clock,
        );
    }

    if schema_validation_enabled {
        let instance = serde_json::to_value(&envelope)?;
        if !schemas.validate("message_envelope", &instance).is_valid() {
            return reject(
                agent,
                system,
                plan_id,
                claimed_path,
                Some(&envelope),
                &TaskMeshError::SchemaInvalid(format!("message_id {}", envelope.message_id)),
                clock,
            );
        }
    }

    if let Some(ack) = read_ack(agent, plan_id, &envelope.message_id) {
        if ack.status.is_terminal() {
            finalize_processed(agent, plan_id, claimed_path)?;
            return Ok(());
        }
    }

    match envelope.kind {
        EnvelopeType::Artifact => {
            let outcome = ingest_artifact(agent, system, plan_id, &envelope, clock)?;
            match outcome {
                IngestOutcome::Succeeded => finalize_processed(agent, plan_id, claimed_path)?,
                IngestOutcome::MissingPayload
                | IngestOutcome::InputConflict
                | IngestOutcome::UnsafePath => {
                    finalize_deadlettered(agent, plan_id, claimed_path)?;
                }
            }
        }
        EnvelopeType::Command => {
            let Some(command) = envelope.command() else {
                return reject(
                    agent,
                    system,
                    plan_id,
                    claimed_path,
                    Some(&envelope),
                    &TaskMeshError::UnsupportedMessageType(
                        "command envelope missing command payload".into(),
                    ),
                    clock,
                );
            };
            let outcome = execute_command(agent, system, plan_id, &envelope, command, handler, clock)?;
            if ExecuteOutcome::is_terminal(outcome) {
                finalize_processed(agent, plan_id, claimed_path)?;
            }
            // Non-terminal (still blocked): leave in `.pending/` for the
            // next tick's resume walk.
        }
    }

    Ok(())
}

fn finalize_processed(agent: &AgentPaths, plan_id: &str, claimed_path: &Path) -> Result<()> {
    let name = claimed_path
        .file_name()
        .ok_or_else(|| anyhow::anyhow!("claimed path has no file name: {claimed_path:?}"))?;
    let dest = agent.inbox_processed(plan_id).join(name);
    atomic_move(claimed_path, &dest)
}

fn finalize_deadlettered(agent: &AgentPaths, plan_id: &str, claimed_path: &Path) -> Result<()> {
    let name = claimed_path
        .file_name()
        .ok_or_else(|| anyhow::anyhow!("claimed path has no file name: {claimed_path:?}"))?;
    let dest = agent.inbox_deadletter(plan_id).join(name);
    atomic_move(claimed_path, &dest)
}

fn reject(
    agent: &AgentPaths,
    system: &SystemPaths,
    plan_id: &str,
    claimed_path: &Path,
    envelope: Option<&Envelope>,
    error: &TaskMeshError,
    clock: &dyn Clock,
) -> Result<()> {
    write_alert(
        system,
        clock,
        plan_id,
        SOURCE,
        error.code(),
        error.to_string(),
        envelope.and_then(|e| serde_json::to_value(e).ok()),
    )?;
    write_deadletter(
        system,
        clock,
        plan_id,
        SOURCE,
        error.code(),
        error.to_string(),
        envelope.map(|e| e.message_id.clone()),
        envelope.and_then(|e| serde_json::to_value(e).ok()),
    )?;
    finalize_deadlettered(agent, plan_id, claimed_path)
}

// SPDX-License-Identifier: MIT OR Apache-2.0
//! Per-envelope data-plane delivery.

use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::Path;

use anyhow::Result;
use taskmesh_core::clock::Clock;
use taskmesh_core::delivery::{check_no_reuse, DeliveryEntry, DeliveryPayload, DeliveryStatus};
use taskmesh_core::ids::IdGenerator;
use taskmesh_core::time::iso_z;
use taskmesh_core::{Dag, Envelope, EnvelopeType, TaskMeshError};
use taskmesh_fs::{atomic_copy, atomic_write_bytes, safe_relpath, write_alert, write_deadletter, AgentsRoot, SystemPaths};
use taskmesh_schema::SchemaRegistry;

use crate::archive::{archive_by_stable_id, max_archived_command_seq, ArchiveOutcome};

/// `(message_id, envelope_sha256, to_agent_id)` keys already recorded as
/// `DELIVERED`, consulted to skip duplicates at the start of a tick.
pub type DeliveredIndex = HashSet<(String, String, String)>;

/// Per-task maximum `command_seq` observed among *this tick's* candidate
/// commands, paired with the message id that carried it, so a
/// superseded command's delivery entry can name its successor.
pub type TickMaxSeq = HashMap<String, (u64, String)>;

const SOURCE: &str = "router";

/// Deliver (or reject) a single envelope file, returning one
/// [`DeliveryEntry`] per target (artifacts may fan out to several
/// agents; commands and rejections produce exactly one).
#[allow(clippy::too_many_arguments)]
pub fn deliver_one(
    agents_root: &AgentsRoot,
    system: &SystemPaths,
    schemas: &SchemaRegistry,
    schema_validation_enabled: bool,
    clock: &dyn Clock,
    dag: &Dag,
    dag_sha: &str,
    plan_id: &str,
    producer_agent_id: &str,
    envelope_path: &Path,
    delivered: &DeliveredIndex,
    prior_entries: &[DeliveryEntry],
    tick_max_seq: &TickMaxSeq,
) -> Result<Vec<DeliveryEntry>> {
    let idgen = IdGenerator::new(clock);
    let bytes = fs::read(envelope_path)?;
    let envelope_sha = taskmesh_core::sha256_hex_prefixed(&bytes);

    let envelope: Envelope = match serde_json::from_slice(&bytes) {
        Ok(e) => e,
        Err(e) => {
            return Ok(vec![reject(
                system,
                clock,
                &idgen,
                plan_id,
                None,
                None,
                &TaskMeshError::EnvelopeParseError(e.to_string()),
                Some(bytes),
            )?]);
        }
    };

    if envelope.schema_version != taskmesh_core::SCHEMA_VERSION {
        return Ok(vec![reject(
            system,
            clock,
            &idgen,
            plan_id,
            Some(&envelope.message_id),
            None,
            &TaskMeshError::SchemaVersionUnsupported(envelope.schema_version.clone()),
            Some(bytes),
        )?]);
    }

    if schema_validation_enabled {
        let instance = serde_json::to_value(&envelope)?;
        if !schemas.validate("message_envelope", &instance).is_valid() {
            return Ok(vec![reject(
                system,
                clock,
                &idgen,
                plan_id,
                Some(&envelope.message_id),
                None,
                &TaskMeshError::SchemaInvalid(format!("message_id {}", envelope.message_id)),
                Some(bytes),
            )?]);
        }
        if envelope.kind == EnvelopeType::Command {
            if let Some(command) = envelope.command() {
                let cmd_instance = serde_json::to_value(command)?;
                if !schemas.validate("command", &cmd_instance).is_valid() {
                    return Ok(vec![reject(
                        system,
                        clock,
                        &idgen,
                        plan_id,
                        Some(&envelope.message_id),
                        None,
                        &TaskMeshError::SchemaInvalid(format!("command {}", command.command_id)),
                        Some(bytes),
                    )?]);
                }
            }
        }
    }

    if let Err(e) = check_no_reuse(prior_entries, &envelope.message_id, &envelope_sha) {
        return Ok(vec![reject(
            system,
            clock,
            &idgen,
            plan_id,
            Some(&envelope.message_id),
            None,
            &e,
            Some(bytes),
        )?]);
    }

    match envelope.kind {
        EnvelopeType::Command => deliver_command(
            agents_root,
            system,
            clock,
            &idgen,
            dag,
            dag_sha,
            plan_id,
            &envelope,
            &bytes,
            &envelope_sha,
            delivered,
            tick_max_seq,
        ),
        EnvelopeType::Artifact => deliver_artifact(
            agents_root,
            system,
            clock,
            &idgen,
            dag,
            plan_id,
            producer_agent_id,
            &envelope,
            &envelope_sha,
            delivered,
        ),
    }
}

#[allow(clippy::too_many_arguments)]
fn deliver_command(
    agents_root: &AgentsRoot,
    system: &SystemPaths,
    clock: &dyn Clock,
    idgen: &IdGenerator<'_>,
    dag: &Dag,
    dag_sha: &str,
    plan_id: &str,
    envelope: &Envelope,
    bytes: &[u8],
    envelope_sha: &str,
    delivered: &DeliveredIndex,
    tick_max_seq: &TickMaxSeq,
) -> Result<Vec<DeliveryEntry>> {
    let Some(command) = envelope.command() else {
        return Ok(vec![reject(
            system,
            clock,
            idgen,
            plan_id,
            Some(&envelope.message_id),
            None,
            &TaskMeshError::UnsupportedMessageType("command envelope missing command payload".into()),
            Some(bytes.to_vec()),
        )?]);
    };

    if command.dag_ref.sha256 != dag_sha {
        return Ok(vec![reject(
            system,
            clock,
            idgen,
            plan_id,
            Some(&envelope.message_id),
            Some(&command.task_id),
            &TaskMeshError::CommandDagMismatch {
                expected: dag_sha.to_string(),
                actual: command.dag_ref.sha256.clone(),
            },
            Some(bytes.to_vec()),
        )?]);
    }

    let commands_dir = system.commands_dir(plan_id);
    if archive_by_stable_id(&commands_dir, &command.command_id, bytes)?
        == ArchiveOutcome::ConflictDifferentContent
    {
        return Ok(vec![reject(
            system,
            clock,
            idgen,
            plan_id,
            Some(&envelope.message_id),
            Some(&command.task_id),
            &TaskMeshError::IdReusedWithDifferentContent {
                kind: "command".to_string(),
                id: command.command_id.clone(),
            },
            Some(bytes.to_vec()),
        )?]);
    }

    let archived_max = max_archived_command_seq(&commands_dir, &command.task_id, dag_sha);
    let tick_max = tick_max_seq.get(&command.task_id).cloned();
    let max_known = match (archived_max, &tick_max) {
        (Some(a), Some((t, _))) => a.max(*t),
        (Some(a), None) => a,
        (None, Some((t, _))) => *t,
        (None, None) => command.command_seq,
    };

    if command.command_seq < max_known {
        let (successor_seq, successor_message_id) = tick_max
            .filter(|(seq, _)| *seq > command.command_seq)
            .unwrap_or((max_known, String::new()));
        return Ok(vec![DeliveryEntry {
            delivery_id: idgen.delivery_id(),
            message_id: envelope.message_id.clone(),
            envelope_sha256: envelope_sha.to_string(),
            from_agent_id: envelope.producer_agent_id.clone(),
            to_agent_id: None,
            delivered_at: iso_z(clock.now()),
            status: DeliveryStatus::SkippedSuperseded,
            skip_reason: Some(format!(
                "command_seq {} superseded by {}",
                command.command_seq, successor_seq
            )),
            superseded: Some(true),
            superseded_by_message_id: if successor_message_id.is_empty() {
                None
            } else {
                Some(successor_message_id)
            },
            superseded_by_command_seq: Some(successor_seq),
            task_id: Some(command.task_id.clone()),
            command_id: Some(command.command_id.clone()),
            output_name: None,
            payload: DeliveryPayload::default(),
            error: None,
        }]);
    }

    let target_agent_id = match dag.assigned_agent_for_task(&command.task_id) {
        Ok(agent) => agent.to_string(),
        Err(e) => {
            return Ok(vec![reject(
                system,
                clock,
                idgen,
                plan_id,
                Some(&envelope.message_id),
                Some(&command.task_id),
                &e,
                Some(bytes.to_vec()),
            )?])
        }
    };

    let known_agents = agents_root.list_agent_ids()?;
    if !known_agents.contains(&target_agent_id) {
        return Ok(vec![reject(
            system,
            clock,
            idgen,
            plan_id,
            Some(&envelope.message_id),
            Some(&command.task_id),
            &TaskMeshError::TargetAgentNotFound(target_agent_id),
            Some(bytes.to_vec()),
        )?]);
    }

    let key = (envelope.message_id.clone(), envelope_sha.to_string(), target_agent_id.clone());
    if delivered.contains(&key) {
        return Ok(vec![DeliveryEntry {
            delivery_id: idgen.delivery_id(),
            message_id: envelope.message_id.clone(),
            envelope_sha256: envelope_sha.to_string(),
            from_agent_id: envelope.producer_agent_id.clone(),
            to_agent_id: Some(target_agent_id),
            delivered_at: iso_z(clock.now()),
            status: DeliveryStatus::SkippedDuplicate,
            skip_reason: Some("already delivered to this target".to_string()),
            superseded: None,
            superseded_by_message_id: None,
            superseded_by_command_seq: None,
            task_id: Some(command.task_id.clone()),
            command_id: Some(command.command_id.clone()),
            output_name: None,
            payload: DeliveryPayload::default(),
            error: None,
        }]);
    }

    let target_root = agents_root.agent(&target_agent_id);
    let dest = target_root
        .inbox(plan_id)
        .join(format!("{}.msg.json", envelope.message_id));
    atomic_write_bytes(&dest, bytes)?;

    Ok(vec![DeliveryEntry {
        delivery_id: idgen.delivery_id(),
        message_id: envelope.message_id.clone(),
        envelope_sha256: envelope_sha.to_string(),
        from_agent_id: envelope.producer_agent_id.clone(),
        to_agent_id: Some(target_agent_id),
        delivered_at: iso_z(clock.now()),
        status: DeliveryStatus::Delivered,
        skip_reason: None,
        superseded: Some(false),
        superseded_by_message_id: None,
        superseded_by_command_seq: None,
        task_id: Some(command.task_id.clone()),
        command_id: Some(command.command_id.clone()),
        output_name: None,
        payload: DeliveryPayload::default(),
        error: None,
    }])
}

#[allow(clippy::too_many_arguments)]
fn deliver_artifact(
    agents_root: &AgentsRoot,
    system: &SystemPaths,
    clock: &dyn Clock,
    idgen: &IdGenerator<'_>,
    dag: &Dag,
    plan_id: &str,
    producer_agent_id: &str,
    envelope: &Envelope,
    envelope_sha: &str,
    delivered: &DeliveredIndex,
) -> Result<Vec<DeliveryEntry>> {
    let (Some(task_id), Some(output_name)) = (&envelope.task_id, &envelope.output_name) else {
        return Ok(vec![reject(
            system,
            clock,
            idgen,
            plan_id,
            Some(&envelope.message_id),
            None,
            &TaskMeshError::RoutingNoTarget("artifact envelope missing task_id/output_name".into()),
            None,
        )?]);
    };

    let targets = match dag.deliver_to_for_output(task_id, output_name) {
        Ok(targets) => targets.to_vec(),
        Err(e) => {
            return Ok(vec![reject(
                system,
                clock,
                idgen,
                plan_id,
                Some(&envelope.message_id),
                Some(task_id),
                &e,
                None,
            )?])
        }
    };

    let producer_outbox = agents_root.agent(producer_agent_id).outbox(plan_id);
    for file in envelope.artifact_files() {
        let Ok(src) = safe_relpath(&producer_outbox, &file.path) else {
            return Ok(vec![reject(
                system,
                clock,
                idgen,
                plan_id,
                Some(&envelope.message_id),
                Some(task_id),
                &TaskMeshError::UnsafePath(file.path.clone()),
                None,
            )?]);
        };
        if !src.exists() {
            return Ok(vec![reject(
                system,
                clock,
                idgen,
                plan_id,
                Some(&envelope.message_id),
                Some(task_id),
                &TaskMeshError::MissingPayload(file.path.clone()),
                None,
            )?]);
        }
    }

    let mut entries = Vec::with_capacity(targets.len());
    for target_agent_id in &targets {
        let key = (
            envelope.message_id.clone(),
            envelope_sha.to_string(),
            target_agent_id.clone(),
        );
        if delivered.contains(&key) {
            entries.push(DeliveryEntry {
                delivery_id: idgen.delivery_id(),
                message_id: envelope.message_id.clone(),
                envelope_sha256: envelope_sha.to_string(),
                from_agent_id: envelope.producer_agent_id.clone(),
                to_agent_id: Some(target_agent_id.clone()),
                delivered_at: iso_z(clock.now()),
                status: DeliveryStatus::SkippedDuplicate,
                skip_reason: Some("already delivered to this target".to_string()),
                superseded: None,
                superseded_by_message_id: None,
                superseded_by_command_seq: None,
                task_id: Some(task_id.clone()),
                command_id: None,
                output_name: Some(output_name.clone()),
                payload: DeliveryPayload {
                    files: envelope.artifact_files().to_vec(),
                },
                error: None,
            });
            continue;
        }

        let target_inbox = agents_root.agent(target_agent_id).inbox(plan_id);
        // Payload files first: a reader observing the envelope must find
        // its payloads already present.
        for file in envelope.artifact_files() {
            let dest = target_inbox.join(&file.path);
            atomic_copy(&producer_outbox.join(&file.path), &dest)?;
        }
        let envelope_bytes = serde_json::to_vec_pretty(envelope)?;
        let envelope_dest = target_inbox.join(format!("{}.msg.json", envelope.message_id));
        atomic_write_bytes(&envelope_dest, &envelope_bytes)?;

        entries.push(DeliveryEntry {
            delivery_id: idgen.delivery_id(),
            message_id: envelope.message_id.clone(),
            envelope_sha256: envelope_sha.to_string(),
            from_agent_id: envelope.producer_agent_id.clone(),
            to_agent_id: Some(target_agent_id.clone()),
            delivered_at: iso_z(clock.now()),
            status: DeliveryStatus::Delivered,
            skip_reason: None,
            superseded: None,
            superseded_by_message_id: None,
            superseded_by_command_seq: None,
            task_id: Some(task_id.clone()),
            command_id: None,
            output_name: Some(output_name.clone()),
            payload: DeliveryPayload {
                files: envelope.artifact_files().to_vec(),
            },
            error: None,
        });
    }
    Ok(entries)
}

#[allow(clippy::too_many_arguments)]
fn reject(
    system: &SystemPaths,
    clock: &dyn Clock,
    idgen: &IdGenerator<'_>,
    plan_id: &str,
    message_id: Option<&str>,
    task_id: Option<&str>,
    error: &TaskMeshError,
    raw_payload: Option<Vec<u8>>,
) -> Result<DeliveryEntry> {
    let payload_value = raw_payload
        .as_deref()
        .and_then(|b| serde_json::from_slice::<serde_json::Value>(b).ok());

    write_alert(
        system,
        clock,
        plan_id,
        SOURCE,
        error.code(),
        error.to_string(),
        payload_value.clone(),
    )?;
    if error.is_deadletter() {
        write_deadletter(
            system,
            clock,
            plan_id,
            SOURCE,
            error.code(),
            error.to_string(),
            message_id.map(str::to_string),
            payload_value,
        )?;
    }

    Ok(DeliveryEntry {
        delivery_id: idgen.delivery_id(),
        message_id: message_id.unwrap_or("unknown").to_string(),
        envelope_sha256: raw_payload
            .as_deref()
            .map(taskmesh_core::sha256_hex_prefixed)
            .unwrap_or_default(),
        from_agent_id: String::new(),
        to_agent_id: None,
        delivered_at: iso_z(clock.now()),
        status: DeliveryStatus::Deadlettered,
        skip_reason: Some(error.to_string()),
        superseded: None,
        superseded_by_message_id: None,
        superseded_by_command_seq: None,
        task_id: task_id.map(str::to_string),
        command_id: None,
        output_name: None,
        payload: DeliveryPayload::default(),
        error: Some(error.code().to_string()),
    })
}

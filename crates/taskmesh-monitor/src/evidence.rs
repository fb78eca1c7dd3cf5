// SPDX-License-Identifier: MIT OR Apache-2.0
//! Reading the evidence the monitor reduces over: the delivery log, the
//! archived ack history, and the archived command history.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use anyhow::Result;
use taskmesh_core::clock::Clock;
use taskmesh_core::delivery::{parse_all, DeliveryEntry, DeliveryStatus};
use taskmesh_core::{Ack, Command, Envelope, TaskMeshError};
use taskmesh_fs::{write_alert, SystemPaths};

const SOURCE: &str = "taskmesh-monitor";

/// One delivered artifact addressed to an agent: the output name it
/// fulfilled (for command-produced artifacts) and the file names it
/// carried, consulted by the input satisfaction check.
#[derive(Debug, Clone, Default)]
pub struct DeliveredArtifact {
    /// The `output_name` this delivery fulfilled, if any.
    pub output_name: Option<String>,
    /// The final path component of every file this delivery carried.
    pub file_names: Vec<String>,
}

/// Everything the monitor reads once per plan before deriving status.
pub struct Evidence {
    /// Every archived ack, keyed by `message_id` (the archive's stable
    /// id for acks).
    pub acks_by_message_id: BTreeMap<String, Ack>,
    /// `message_id -> task_id`, built primarily from `DELIVERED` log
    /// entries and backfilled from the command archive.
    pub message_id_to_task_id: BTreeMap<String, String>,
    /// Delivered artifacts, keyed by the receiving agent id.
    pub delivered_artifacts_by_agent: BTreeMap<String, Vec<DeliveredArtifact>>,
}

/// Read `deliveries.jsonl`, the ack archive, and the command archive for
/// `plan_id`, and build the evidence the status derivation needs.
///
/// Command-archive entries that disagree with their own envelope (the
/// envelope's `task_id`/`command_id` does not match the embedded
/// command's) are rejected with a `COMMAND_ARCHIVE_INCONSISTENT` alert
/// and excluded from the map, rather than trusted.
pub fn collect_evidence(system: &SystemPaths, clock: &dyn Clock, plan_id: &str) -> Result<Evidence> {
    let log_path = system.deliveries_log(plan_id);
    let contents = fs::read_to_string(&log_path).unwrap_or_default();
    let delivery_entries = parse_all(&contents);

    let mut message_id_to_task_id = BTreeMap::new();
    for entry in &delivery_entries {
        if entry.status == DeliveryStatus::Delivered {
            if let Some(task_id) = &entry.task_id {
                message_id_to_task_id
                    .entry(entry.message_id.clone())
                    .or_insert_with(|| task_id.clone());
            }
        }
    }

    let delivered_artifacts_by_agent = index_delivered_artifacts(&delivery_entries);

    let acks_by_message_id = read_acks(&system.acks_dir(plan_id))?;

    backfill_task_ids_from_command_archive(
        system,
        clock,
        plan_id,
        &mut message_id_to_task_id,
    )?;

    Ok(Evidence {
        acks_by_message_id,
        message_id_to_task_id,
        delivered_artifacts_by_agent,
    })
}

fn index_delivered_artifacts(entries: &[DeliveryEntry]) -> BTreeMap<String, Vec<DeliveredArtifact>> {
    let mut by_agent: BTreeMap<String, Vec<DeliveredArtifact>> = BTreeMap::new();
    for entry in entries {
        if entry.status != DeliveryStatus::Delivered {
            continue;
        }
        let Some(to) = &entry.to_agent_id else { continue };
        if entry.output_name.is_none() && entry.payload.files.is_empty() {
            continue;
        }
        by_agent.entry(to.clone()).or_default().push(DeliveredArtifact {
            output_name: entry.output_name.clone(),
            file_names: entry
                .payload
                .files
                .iter()
                .map(|f| f.path.rsplit('/').next().unwrap_or(&f.path).to_string())
                .collect(),
        });
    }
    by_agent
}

fn read_acks(acks_dir: &Path) -> Result<BTreeMap<String, Ack>> {
    let mut acks = BTreeMap::new();
    if !acks_dir.exists() {
        return Ok(acks);
    }
    for entry in fs::read_dir(acks_dir)?.filter_map(Result::ok) {
        let Ok(bytes) = fs::read(entry.path()) else { continue };
        let Ok(ack) = serde_json::from_slice::<Ack>(&bytes) else { continue };
        acks.insert(ack.message_id.clone(), ack);
    }
    Ok(acks)
}

fn backfill_task_ids_from_command_archive(
    system: &SystemPaths,
    clock: &dyn Clock,
    plan_id: &str,
    message_id_to_task_id: &mut BTreeMap<String, String>,
) -> Result<()> {
    let commands_dir = system.commands_dir(plan_id);
    if !commands_dir.exists() {
        return Ok(());
    }
    for entry in fs::read_dir(&commands_dir)?.filter_map(Result::ok) {
        let Ok(bytes) = fs::read(entry.path()) else { continue };
        let Ok(envelope) = serde_json::from_slice::<Envelope>(&bytes) else { continue };
        if message_id_to_task_id.contains_key(&envelope.message_id) {
            continue;
        }
        let Some(command) = envelope.command() else { continue };
        if !archive_entry_is_consistent(&envelope, command) {
            write_alert(
                system,
                clock,
                plan_id,
                SOURCE,
                TaskMeshError::CommandArchiveInconsistent(envelope.message_id.clone()).code(),
                format!(
                    "command archive entry for message {} disagrees with its envelope",
                    envelope.message_id
                ),
                serde_json::to_value(&envelope).ok(),
            )?;
            continue;
        }
        message_id_to_task_id.insert(envelope.message_id.clone(), command.task_id.clone());
    }
    Ok(())
}

fn archive_entry_is_consistent(envelope: &Envelope, command: &Command) -> bool {
    match (&envelope.task_id, &envelope.command_id) {
        (Some(task_id), Some(command_id)) => {
            task_id == &command.task_id && command_id == &command.command_id
        }
        // A command envelope's outer task_id/command_id are always
        // populated at write time; their absence is itself treated as
        // inconsistent rather than trusted by default.
        _ => false,
    }
}

/// The highest-`command_seq` archived command for `task_id` under
/// `dag_sha`, if any has been archived.
#[must_use]
pub fn latest_command_for_task(commands_dir: &Path, task_id: &str, dag_sha: &str) -> Option<Command> {
    if !commands_dir.exists() {
        return None;
    }
    fs::read_dir(commands_dir)
        .ok()?
        .filter_map(Result::ok)
        .filter_map(|e| fs::read(e.path()).ok())
        .filter_map(|bytes| serde_json::from_slice::<Envelope>(&bytes).ok())
        .filter_map(|env| env.command().cloned())
        .filter(|cmd| cmd.task_id == task_id && cmd.dag_ref.sha256 == dag_sha)
        .max_by_key(|cmd| cmd.command_seq)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use taskmesh_core::clock::FixedClock;
    use taskmesh_core::{Command, DagRef, Envelope, EnvelopePayload, EnvelopeType};
    use tempfile::tempdir;

    fn clock() -> FixedClock {
        FixedClock(chrono::Utc.with_ymd_and_hms(2026, 7, 31, 0, 0, 0).unwrap())
    }

    fn sample_command(task_id: &str, command_seq: u64) -> Command {
        Command {
            command_id: format!("cmd_{task_id}_{command_seq}"),
            plan_id: "plan-1".into(),
            task_id: task_id.into(),
            command_seq,
            dag_ref: DagRef { sha256: "sha256:aa".into() },
            prompt: "go".into(),
            required_inputs: None,
            resolved_inputs: None,
            produces: vec![],
            wait_for_inputs: false,
            timeout: 30,
            score_required: false,
        }
    }

    fn sample_envelope(message_id: &str, task_id: &str, command: Command) -> Envelope {
        Envelope {
            schema_version: "1.0".into(),
            message_id: message_id.into(),
            plan_id: "plan-1".into(),
            producer_agent_id: "agent_orchestrator".into(),
            kind: EnvelopeType::Command,
            created_at: "2026-07-31T00:00:00Z".into(),
            task_id: Some(task_id.into()),
            output_name: None,
            command_id: Some(command.command_id.clone()),
            payload: EnvelopePayload::Command { command },
        }
    }

    #[test]
    fn backfill_accepts_consistent_entry() {
        let dir = tempdir().unwrap();
        let system = SystemPaths::new(dir.path());
        let commands_dir = system.commands_dir("plan-1");
        fs::create_dir_all(&commands_dir).unwrap();
        let command = sample_command("task_exec", 1);
        let envelope = sample_envelope("msg_1", "task_exec", command.clone());
        fs::write(
            commands_dir.join(format!("{}.json", command.command_id)),
            serde_json::to_vec(&envelope).unwrap(),
        )
        .unwrap();

        let mut map = BTreeMap::new();
        backfill_task_ids_from_command_archive(&system, &clock(), "plan-1", &mut map).unwrap();
        assert_eq!(map.get("msg_1"), Some(&"task_exec".to_string()));
    }

    #[test]
    fn backfill_rejects_inconsistent_entry() {
        let dir = tempdir().unwrap();
        let system = SystemPaths::new(dir.path());
        let commands_dir = system.commands_dir("plan-1");
        fs::create_dir_all(&commands_dir).unwrap();
        let command = sample_command("task_exec", 1);
        // The envelope claims a different task_id than the embedded command.
        let mut envelope = sample_envelope("msg_1", "task_other", command.clone());
        envelope.command_id = Some(command.command_id.clone());
        fs::write(
            commands_dir.join(format!("{}.json", command.command_id)),
            serde_json::to_vec(&envelope).unwrap(),
        )
        .unwrap();

        let mut map = BTreeMap::new();
        backfill_task_ids_from_command_archive(&system, &clock(), "plan-1", &mut map).unwrap();
        assert!(map.is_empty());
        let alerts = fs::read_dir(system.alerts_dir("plan-1")).unwrap().count();
        assert_eq!(alerts, 1);
    }

    #[test]
    fn latest_command_picks_max_seq_for_current_dag() {
        let dir = tempdir().unwrap();
        let commands_dir = dir.path().join("commands");
        fs::create_dir_all(&commands_dir).unwrap();
        for seq in [1, 3, 2] {
            let command = sample_command("task_exec", seq);
            let envelope = sample_envelope(&format!("msg_{seq}"), "task_exec", command.clone());
            fs::write(
                commands_dir.join(format!("{}.json", command.command_id)),
                serde_json::to_vec(&envelope).unwrap(),
            )
            .unwrap();
        }
        let latest = latest_command_for_task(&commands_dir, "task_exec", "sha256:aa").unwrap();
        assert_eq!(latest.command_seq, 3);
    }
}

// SPDX-License-Identifier: MIT OR Apache-2.0
//! Router tick orchestration.

use std::collections::HashMap;
use std::fs;

use anyhow::{Context, Result};
use taskmesh_core::clock::Clock;
use taskmesh_core::delivery::{parse_all, DeliveryEntry, DeliveryStatus};
use taskmesh_core::{Envelope, EnvelopeType, TaskMeshError};
use taskmesh_fs::{discover_plan_ids, list_envelope_files, write_alert, write_deadletter, AgentsRoot, SystemPaths};
use taskmesh_schema::SchemaRegistry;

use crate::control_plane::archive_control_plane;
use crate::dag_load::load_active_dag;
use crate::deliver::{deliver_one, DeliveredIndex, TickMaxSeq};
use crate::human_gateway::process_human_responses;
use crate::release_pointer::refresh_release_manifest_pointer;

const SOURCE: &str = "router";

/// Aggregate counts for one router tick, across every plan, logged as a
/// single `tracing::info!` span summary.
#[derive(Debug, Default, Clone, Copy)]
pub struct TickSummary {
    /// Envelopes copied to a target inbox.
    pub delivered: usize,
    /// Envelopes skipped because they were already delivered.
    pub skipped_duplicate: usize,
    /// Commands skipped because a higher `command_seq` exists.
    pub skipped_superseded: usize,
    /// Envelopes rejected and recorded as deadletters.
    pub deadlettered: usize,
}

impl TickSummary {
    fn add(&mut self, status: DeliveryStatus) {
        match status {
            DeliveryStatus::Delivered => self.delivered += 1,
            DeliveryStatus::SkippedDuplicate => self.skipped_duplicate += 1,
            DeliveryStatus::SkippedSuperseded => self.skipped_superseded += 1,
            DeliveryStatus::Deadlettered => self.deadlettered += 1,
        }
    }

    fn merge(&mut self, other: Self) {
        self.delivered += other.delivered;
        self.skipped_duplicate += other.skipped_duplicate;
        self.skipped_superseded += other.skipped_superseded;
        self.deadlettered += other.deadlettered;
    }
}

/// Everything a tick needs that does not change within a single process
/// lifetime.
pub struct RouterContext<'a> {
    /// The `agents/` root.
    pub agents_root: AgentsRoot,
    /// The `system_runtime/` root.
    pub system: SystemPaths,
    /// Loaded schema documents, possibly empty if no schemas directory
    /// was configured.
    pub schemas: SchemaRegistry,
    /// Whether to validate envelopes/commands against `schemas`.
    pub schema_validation_enabled: bool,
    /// The clock driving timestamps and ids for this tick.
    pub clock: &'a dyn Clock,
}

/// Run one router tick over every plan with at least one agent outbox.
pub fn tick(ctx: &RouterContext<'_>) -> Result<TickSummary> {
    let agent_ids = ctx.agents_root.list_agent_ids()?;
    let plan_ids = discover_plan_ids(&ctx.agents_root)?;
    let mut summary = TickSummary::default();

    for plan_id in &plan_ids {
        match tick_plan(ctx, &agent_ids, plan_id) {
            Ok(plan_summary) => {
                tracing::info!(
                    plan = %plan_id,
                    delivered = plan_summary.delivered,
                    skipped_duplicate = plan_summary.skipped_duplicate,
                    skipped_superseded = plan_summary.skipped_superseded,
                    deadlettered = plan_summary.deadlettered,
                    "router tick: plan processed"
                );
                summary.merge(plan_summary);
            }
            Err(e) => {
                tracing::error!(plan = %plan_id, error = %e, "router tick: plan failed, skipping");
            }
        }
    }
    Ok(summary)
}

fn tick_plan(
    ctx: &RouterContext<'_>,
    agent_ids: &[String],
    plan_id: &str,
) -> Result<TickSummary> {
    let mut summary = TickSummary::default();

    let Some(dag) = load_active_dag(&ctx.system, plan_id)? else {
        // Plan has outbox traffic but no DAG yet; nothing to route until
        // one is published.
        return Ok(summary);
    };
    let dag_bytes = fs::read(ctx.system.task_dag(plan_id))?;
    let dag_sha = taskmesh_core::sha256_hex_prefixed(&dag_bytes);

    let conflicts = archive_control_plane(&ctx.agents_root, &ctx.system, agent_ids, plan_id)
        .context("archiving control-plane artifacts")?;
    for (kind, stable_id) in conflicts {
        let error = TaskMeshError::IdReusedWithDifferentContent {
            kind: kind.to_string(),
            id: stable_id.clone(),
        };
        write_alert(
            &ctx.system,
            ctx.clock,
            plan_id,
            SOURCE,
            error.code(),
            error.to_string(),
            None,
        )?;
        if error.is_deadletter() {
            write_deadletter(
                &ctx.system,
                ctx.clock,
                plan_id,
                SOURCE,
                error.code(),
                error.to_string(),
                None,
                None,
            )?;
        }
    }
    process_human_responses(&ctx.agents_root, plan_id, ctx.clock)
        .context("processing human intervention responses")?;
    refresh_release_manifest_pointer(&ctx.system, plan_id)
        .context("refreshing release manifest pointer")?;

    let log_path = ctx.system.deliveries_log(plan_id);
    let existing_contents = fs::read_to_string(&log_path).unwrap_or_default();
    let mut entries = parse_all(&existing_contents);
    let delivered: DeliveredIndex = entries
        .iter()
        .filter(|e| e.status == DeliveryStatus::Delivered)
        .filter_map(|e| {
            e.to_agent_id
                .clone()
                .map(|to| (e.message_id.clone(), e.envelope_sha256.clone(), to))
        })
        .collect();

    // Pass 1: compute this tick's per-task max command_seq so an older
    // command short-circuits to SKIPPED_SUPERSEDED even if it is
    // discovered before the newer one.
    let mut tick_max_seq: TickMaxSeq = HashMap::new();
    for agent_id in agent_ids {
        let outbox = ctx.agents_root.agent(agent_id).outbox(plan_id);
        for path in list_envelope_files(&outbox)? {
            let Ok(bytes) = fs::read(&path) else { continue };
            let Ok(envelope) = serde_json::from_slice::<Envelope>(&bytes) else {
                continue;
            };
            if envelope.kind != EnvelopeType::Command {
                continue;
            }
            let Some(command) = envelope.command() else { continue };
            let slot = tick_max_seq.entry(command.task_id.clone());
            slot.and_modify(|(seq, msg)| {
                if command.command_seq > *seq {
                    *seq = command.command_seq;
                    *msg = envelope.message_id.clone();
                }
            })
            .or_insert((command.command_seq, envelope.message_id.clone()));
        }
    }

    // Pass 2: deliver.
    let mut new_lines = Vec::new();
    for agent_id in agent_ids {
        let outbox = ctx.agents_root.agent(agent_id).outbox(plan_id);
        for path in list_envelope_files(&outbox)? {
            let new_entries = deliver_one(
                &ctx.agents_root,
                &ctx.system,
                &ctx.schemas,
                ctx.schema_validation_enabled,
                ctx.clock,
                &dag,
                &dag_sha,
                plan_id,
                agent_id,
                &path,
                &delivered,
                &entries,
                &tick_max_seq,
            )?;
            for entry in new_entries {
                summary.add(entry.status);
                new_lines.push(serde_json::to_string(&entry)?);
                entries.push(entry);
            }
        }
    }

    if !new_lines.is_empty() {
        let mut full = existing_contents;
        for line in new_lines {
            full.push_str(&line);
            full.push('\n');
        }
        taskmesh_fs::atomic_write_bytes(&log_path, full.as_bytes())?;
    }

    Ok(summary)
}

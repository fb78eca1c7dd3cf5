// SPDX-License-Identifier: MIT OR Apache-2.0
//! Heartbeat tick orchestration: decide which plans this agent services,
//! claim new inbox traffic, and resume anything still in `.pending/`.

use anyhow::Result;
use taskmesh_core::clock::Clock;
use taskmesh_core::time::iso_z;
use taskmesh_core::AgentStatusHeartbeat;
use taskmesh_fs::{atomic_write_json, discover_plan_ids, AgentPaths, AgentsRoot, SystemPaths};
use taskmesh_schema::SchemaRegistry;

use crate::config::{HeartbeatConfig, ScanMode};
use crate::handler::CommandHandler;
use crate::process::{claim_new_envelopes, pending_envelopes, process_claimed_envelope};

/// Aggregate counts for one heartbeat tick, across every plan this agent
/// services.
#[derive(Debug, Default, Clone, Copy)]
pub struct TickSummary {
    /// Newly claimed envelopes processed this tick.
    pub claimed: usize,
    /// `.pending/` envelopes resumed this tick.
    pub resumed: usize,
}

impl TickSummary {
    fn merge(&mut self, other: Self) {
        self.claimed += other.claimed;
        self.resumed += other.resumed;
    }
}

/// Everything a heartbeat tick needs that does not change within a
/// single process lifetime.
pub struct HeartbeatContext<'a> {
    /// This agent's own paths.
    pub agent: AgentPaths,
    /// The `agents/` root, needed only to discover plans with traffic.
    pub agents_root: AgentsRoot,
    /// The `system_runtime/` root.
    pub system: SystemPaths,
    /// Loaded schema documents.
    pub schemas: SchemaRegistry,
    /// Whether to validate envelopes against `schemas`.
    pub schema_validation_enabled: bool,
    /// This agent's configuration.
    pub config: HeartbeatConfig,
    /// The command handler to invoke for command envelopes.
    pub handler: &'a dyn CommandHandler,
    /// The clock driving timestamps, ids, and timeout arithmetic.
    pub clock: &'a dyn Clock,
}

/// The plan ids this agent should process this tick, per its
/// `plans.scan_mode`.
pub fn discover_plans(ctx: &HeartbeatContext<'_>) -> Result<Vec<String>> {
    match ctx.config.plans.scan_mode {
        ScanMode::AllowlistOnly => Ok(ctx.config.plans.allowlist.clone()),
        ScanMode::Auto => {
            let mut plans = discover_plan_ids(&ctx.agents_root)?;
            plans.retain(|plan_id| ctx.agent.inbox(plan_id).exists() || ctx.agent.outbox(plan_id).exists());
            Ok(plans)
        }
    }
}

/// Run one heartbeat tick over every plan this agent services.
pub fn tick(ctx: &HeartbeatContext<'_>) -> Result<TickSummary> {
    let plans = discover_plans(ctx)?;
    let mut summary = TickSummary::default();

    for plan_id in &plans {
        match tick_plan(ctx, plan_id) {
            Ok(plan_summary) => {
                tracing::info!(
                    plan = %plan_id,
                    claimed = plan_summary.claimed,
                    resumed = plan_summary.resumed,
                    "heartbeat tick: plan processed"
                );
                summary.merge(plan_summary);
            }
            Err(e) => {
                tracing::error!(plan = %plan_id, error = %e, "heartbeat tick: plan failed, skipping");
            }
        }
    }

    let heartbeat = AgentStatusHeartbeat {
        schema_version: taskmesh_core::SCHEMA_VERSION.to_string(),
        agent_id: ctx.agent.agent_id().to_string(),
        updated_at: iso_z(ctx.clock.now()),
        plans: plans.clone(),
    };
    atomic_write_json(&ctx.agent.status_heartbeat(), &heartbeat)?;

    Ok(summary)
}

fn tick_plan(ctx: &HeartbeatContext<'_>, plan_id: &str) -> Result<TickSummary> {
    let mut summary = TickSummary::default();

    let claimed = claim_new_envelopes(&ctx.agent, plan_id, ctx.config.max_new_messages_per_tick)?;
    for path in &claimed {
        process_claimed_envelope(
            &ctx.agent,
            &ctx.system,
            &ctx.schemas,
            ctx.schema_validation_enabled,
            plan_id,
            path,
            ctx.handler,
            ctx.clock,
        )?;
        summary.claimed += 1;
    }

    let resumable = pending_envelopes(&ctx.agent, plan_id, ctx.config.max_resume_messages_per_tick)?;
    for path in &resumable {
        // A path claimed above may already have been finalized and thus
        // vanished from `.pending/` by the time we resume; tolerate it.
        if !path.exists() {
            continue;
        }
        process_claimed_envelope(
            &ctx.agent,
            &ctx.system,
            &ctx.schemas,
            ctx.schema_validation_enabled,
            plan_id,
            path,
            ctx.handler,
            ctx.clock,
        )?;
        summary.resumed += 1;
    }

    Ok(summary)
}

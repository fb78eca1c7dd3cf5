// SPDX-License-Identifier: MIT OR Apache-2.0
//! Monitor tick orchestration: for every plan with a DAG, collect fresh
//! evidence and rewrite `plan_status.json`.

use anyhow::{Context, Result};
use taskmesh_core::clock::Clock;
use taskmesh_core::time::iso_z;
use taskmesh_core::PlanStatus;
use taskmesh_fs::{atomic_write_json, discover_plan_ids, AgentsRoot, SystemPaths};
use taskmesh_schema::SchemaRegistry;

use crate::agent_status::collect_agent_status;
use crate::dag_load::load_active_dag;
use crate::evidence::collect_evidence;
use crate::status::{blocked_summary, derive_statuses};

/// Aggregate counts for one monitor tick.
#[derive(Debug, Default, Clone, Copy)]
pub struct TickSummary {
    /// Plans with a freshly written `plan_status.json` this tick.
    pub plans_updated: usize,
    /// Agent status snapshots refreshed this tick.
    pub agents_collected: usize,
}

/// Everything a monitor tick needs that does not change within a single
/// process lifetime.
pub struct MonitorContext<'a> {
    /// The `agents/` root.
    pub agents_root: AgentsRoot,
    /// The `system_runtime/` root.
    pub system: SystemPaths,
    /// Loaded schema documents.
    pub schemas: SchemaRegistry,
    /// Whether to validate collected heartbeats against `schemas`.
    pub schema_validation_enabled: bool,
    /// The clock driving timestamps and staleness arithmetic.
    pub clock: &'a dyn Clock,
}

/// Run one monitor tick over every discoverable plan.
///
/// Never mutates agent inbox/outbox/workspace state, and never appends
/// to a plan's delivery log; this is strictly a reducer over state other
/// daemons already wrote.
pub fn tick(ctx: &MonitorContext<'_>) -> Result<TickSummary> {
    let plan_ids = discover_plan_ids(&ctx.agents_root)?;
    let agents_collected = collect_agent_status(
        &ctx.agents_root,
        &ctx.system,
        &ctx.schemas,
        ctx.schema_validation_enabled,
        ctx.clock,
    )
    .context("collecting agent status snapshots")?;

    let mut summary = TickSummary { agents_collected, ..TickSummary::default() };
    for plan_id in &plan_ids {
        match tick_plan(ctx, plan_id) {
            Ok(true) => {
                summary.plans_updated += 1;
                tracing::info!(plan = %plan_id, "monitor tick: plan_status.json refreshed");
            }
            Ok(false) => {}
            Err(e) => {
                tracing::error!(plan = %plan_id, error = %e, "monitor tick: plan failed, skipping");
            }
        }
    }
    Ok(summary)
}

fn tick_plan(ctx: &MonitorContext<'_>, plan_id: &str) -> Result<bool> {
    let Some(dag) = load_active_dag(&ctx.system, plan_id)? else {
        return Ok(false);
    };
    let dag_bytes = std::fs::read(ctx.system.task_dag(plan_id))
        .with_context(|| format!("re-reading task_dag.json for plan {plan_id:?}"))?;
    let dag_sha = taskmesh_core::sha256_hex_prefixed(&dag_bytes);

    let evidence = collect_evidence(&ctx.system, ctx.clock, plan_id)?;
    let tasks = derive_statuses(
        &ctx.agents_root,
        &ctx.system,
        ctx.clock,
        plan_id,
        &dag,
        &dag_sha,
        &evidence,
    )?;
    let summary = blocked_summary(&tasks);

    let status = PlanStatus {
        schema_version: taskmesh_core::SCHEMA_VERSION.to_string(),
        plan_id: plan_id.to_string(),
        generated_at: iso_z(ctx.clock.now()),
        tasks,
        blocked_summary: summary,
    };
    atomic_write_json(&ctx.system.plan_status(plan_id), &status)?;
    Ok(true)
}

#[cfg(test)]
mod tests {
    use std::fs;

    use chrono::TimeZone;
    use taskmesh_core::clock::FixedClock;
    use taskmesh_core::{TaskState, TaskStateValue};
    use tempfile::tempdir;

    use super::*;

    fn write_dag(system: &SystemPaths, plan_id: &str) -> String {
        let dag_json = serde_json::json!({
            "schema_version": "1.1",
            "nodes": {
                "task_exec": {
                    "assigned_agent_id": "agent_exec",
                    "depends_on": [],
                    "required_inputs": [],
                    "outputs": [{"name": "draft", "deliver_to": ["agent_review"]}]
                },
                "task_review": {
                    "assigned_agent_id": "agent_review",
                    "depends_on": ["task_exec"],
                    "required_inputs": ["draft.md"],
                    "outputs": []
                }
            }
        });
        let bytes = serde_json::to_vec(&dag_json).unwrap();
        fs::create_dir_all(system.plan_dir(plan_id)).unwrap();
        fs::write(system.task_dag(plan_id), &bytes).unwrap();
        let sha = taskmesh_core::sha256_hex_prefixed(&bytes);
        let aref = serde_json::json!({"schema_version": "1.1", "task_dag_sha256": sha});
        fs::write(system.active_dag_ref(plan_id), serde_json::to_vec(&aref).unwrap()).unwrap();
        sha
    }

    #[test]
    fn derives_completed_and_ready_across_a_dependency() {
        let dir = tempdir().unwrap();
        let agents_root_path = dir.path().join("agents");
        let system_path = dir.path().join("system_runtime");
        fs::create_dir_all(agents_root_path.join("agent_exec")).unwrap();
        fs::create_dir_all(agents_root_path.join("agent_review/outbox/plan-1")).unwrap();

        let agents_root = AgentsRoot::new(&agents_root_path);
        let system = SystemPaths::new(&system_path);
        write_dag(&system, "plan-1");

        let exec_state = TaskState {
            state: TaskStateValue::Completed,
            updated_at: "2026-07-31T00:00:00Z".into(),
            blocking: None,
            progress: None,
            result: None,
            message_id: Some("msg_1".into()),
            command_id: Some("cmd_1".into()),
            command_seq: Some(1),
        };
        let exec_paths = agents_root.agent("agent_exec");
        fs::create_dir_all(exec_paths.outbox("plan-1")).unwrap();
        fs::write(
            exec_paths.task_state_file("plan-1", "task_exec"),
            serde_json::to_vec(&exec_state).unwrap(),
        )
        .unwrap();

        let delivery_line = serde_json::json!({
            "delivery_id": "del_1",
            "message_id": "msg_draft",
            "envelope_sha256": "sha256:aa",
            "from_agent_id": "agent_exec",
            "to_agent_id": "agent_review",
            "delivered_at": "2026-07-31T00:00:00Z",
            "status": "DELIVERED",
            "task_id": "task_exec",
            "output_name": "draft",
            "payload": {"files": [{"path": "draft.md", "sha256": "sha256:bb"}]}
        });
        fs::write(
            system.deliveries_log("plan-1"),
            format!("{}\n", serde_json::to_string(&delivery_line).unwrap()),
        )
        .unwrap();

        let clock = FixedClock(chrono::Utc.with_ymd_and_hms(2026, 7, 31, 0, 5, 0).unwrap());
        let schemas = SchemaRegistry::load("/nonexistent").unwrap();
        let ctx = MonitorContext {
            agents_root,
            system: system.clone(),
            schemas,
            schema_validation_enabled: false,
            clock: &clock,
        };

        let summary = tick(&ctx).unwrap();
        assert_eq!(summary.plans_updated, 1);

        let status: PlanStatus = taskmesh_fs::read_json(&system.plan_status("plan-1")).unwrap();
        assert_eq!(status.tasks["task_exec"].state, TaskStateValue::Completed);
        assert_eq!(status.tasks["task_review"].state, TaskStateValue::Ready);
        assert_eq!(status.blocked_summary.input, 0);
    }
}

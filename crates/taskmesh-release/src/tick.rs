// SPDX-License-Identifier: MIT OR Apache-2.0
//! Release coordinator tick orchestration: for every plan with a
//! published `plan_manifest.json` and active DAG, evaluate its release
//! gates and emit a fresh decision.

use anyhow::Result;
use taskmesh_core::clock::Clock;
use taskmesh_core::time::iso_z;
use taskmesh_core::{DecisionRecord, DecisionSubject, IdGenerator, InputIndex, PlanManifest, ReleaseManifest};
use taskmesh_fs::{atomic_write_json, discover_plan_ids, read_json_tolerant, AgentsRoot, SystemPaths};
use taskmesh_schema::SchemaRegistry;

use crate::dag_load::active_dag_sha256;
use crate::evaluate::{evaluate_release_gates, required_evidence_filenames};

/// Aggregate counts for one release-coordinator tick.
#[derive(Debug, Default, Clone, Copy)]
pub struct TickSummary {
    /// Plans for which a release decision was emitted this tick.
    pub decisions_emitted: usize,
}

/// Everything a release tick needs that does not change within a single
/// process lifetime.
pub struct ReleaseContext<'a> {
    /// The `agents/` root.
    pub agents_root: AgentsRoot,
    /// The `system_runtime/` root.
    pub system: SystemPaths,
    /// Loaded schema documents.
    pub schemas: SchemaRegistry,
    /// Whether to validate `plan_manifest.json` and evidence files
    /// against `schemas`.
    pub schema_validation_enabled: bool,
    /// The clock driving timestamps and ids for this tick.
    pub clock: &'a dyn Clock,
}

/// Run one release-coordinator tick over every plan with a manifest.
pub fn tick(ctx: &ReleaseContext<'_>) -> Result<TickSummary> {
    let plan_ids = discover_plan_ids(&ctx.agents_root)?;
    let mut summary = TickSummary::default();
    for plan_id in &plan_ids {
        match tick_plan(ctx, plan_id) {
            Ok(true) => {
                summary.decisions_emitted += 1;
                tracing::info!(plan = %plan_id, "release tick: decision emitted");
            }
            Ok(false) => {}
            Err(e) => {
                tracing::error!(plan = %plan_id, error = %e, "release tick: plan failed, skipping");
            }
        }
    }
    Ok(summary)
}

fn tick_plan(ctx: &ReleaseContext<'_>, plan_id: &str) -> Result<bool> {
    let manifest_path = ctx.system.plan_manifest(plan_id);
    let Some(manifest) = read_json_tolerant::<PlanManifest>(&manifest_path) else {
        // No manifest published yet, or it failed to parse; nothing to
        // evaluate until the orchestrator publishes one.
        return Ok(false);
    };
    let Some(dag_sha) = active_dag_sha256(&ctx.system, plan_id)? else {
        return Ok(false);
    };

    let agent = ctx.agents_root.agent(&manifest.release_agent_id);
    let index: InputIndex = read_json_tolerant(&agent.input_index_file(plan_id)).unwrap_or_default();
    let required = required_evidence_filenames(&manifest.policies.release_gates_required);

    let evaluation = evaluate_release_gates(
        &agent,
        plan_id,
        &required,
        &index,
        &ctx.schemas,
        ctx.schema_validation_enabled,
    );

    let ids = IdGenerator::new(ctx.clock);
    let now = iso_z(ctx.clock.now());
    let decision_id = ids.decision_id();
    let release_id = ids.release_id();

    let decision_record = DecisionRecord {
        decision_id: decision_id.clone(),
        plan_id: plan_id.to_string(),
        subject: DecisionSubject { kind: "plan_release".to_string(), ref_sha256: dag_sha },
        decision: evaluation.decision.clone(),
        evidence_files: evaluation.evidence_files,
        created_at: now.clone(),
        signed_by: manifest.release_agent_id.clone(),
    };
    let release_manifest = ReleaseManifest {
        release_id: release_id.clone(),
        plan_id: plan_id.to_string(),
        decision: evaluation.decision,
        decision_id,
        created_at: now,
        signed_by: manifest.release_agent_id,
    };

    let outbox = agent.outbox(plan_id);
    atomic_write_json(&outbox.join(format!("decision_{}.json", decision_record.decision_id)), &decision_record)?;
    atomic_write_json(&outbox.join(format!("release_{release_id}.json")), &release_manifest)?;
    Ok(true)
}

#[cfg(test)]
mod tests {
    use std::fs;

    use chrono::TimeZone;
    use taskmesh_core::clock::FixedClock;
    use tempfile::tempdir;

    use super::*;

    fn write_dag(system: &SystemPaths, plan_id: &str) {
        let dag_json = serde_json::json!({
            "schema_version": "1.1",
            "nodes": {
                "task_smoke": {
                    "assigned_agent_id": "agent_smoke",
                    "depends_on": [],
                    "required_inputs": [],
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
    }

    #[test]
    fn approves_when_all_required_evidence_passes() {
        let dir = tempdir().unwrap();
        let agents_root_path = dir.path().join("agents");
        let system_path = dir.path().join("system_runtime");
        fs::create_dir_all(agents_root_path.join("agent_release/outbox/plan-1")).unwrap();

        let agents_root = AgentsRoot::new(&agents_root_path);
        let system = SystemPaths::new(&system_path);
        write_dag(&system, "plan-1");

        let manifest = serde_json::json!({
            "schema_version": "1.0",
            "plan_id": "plan-1",
            "release_agent_id": "agent_release",
            "policies": {"release_gates_required": ["smoke_test_result.json"]}
        });
        fs::write(system.plan_manifest("plan-1"), serde_json::to_vec(&manifest).unwrap()).unwrap();

        let release_agent = agents_root.agent("agent_release");
        let input_dir = release_agent.workspace_input_dir("plan-1", "task_smoke", "smoke_test_result");
        fs::create_dir_all(&input_dir).unwrap();
        fs::write(
            input_dir.join("smoke_test_result.json"),
            serde_json::to_vec(&serde_json::json!({"plan_id": "plan-1", "decision": "PASS"})).unwrap(),
        )
        .unwrap();
        let index = serde_json::json!({
            "entries": [{
                "message_id": "msg_1",
                "task_id": "task_smoke",
                "output_name": "smoke_test_result",
                "received_at": "2026-07-31T00:00:00Z",
                "files": [{"path": "smoke_test_result.json", "sha256": "sha256:aa", "stored_at": "2026-07-31T00:00:00Z"}]
            }]
        });
        fs::create_dir_all(release_agent.workspace_inputs("plan-1")).unwrap();
        fs::write(
            release_agent.input_index_file("plan-1"),
            serde_json::to_vec(&index).unwrap(),
        )
        .unwrap();

        let clock = FixedClock(chrono::Utc.with_ymd_and_hms(2026, 7, 31, 0, 5, 0).unwrap());
        let schemas = SchemaRegistry::load("/nonexistent").unwrap();
        let ctx = ReleaseContext {
            agents_root,
            system: system.clone(),
            schemas,
            schema_validation_enabled: false,
            clock: &clock,
        };

        let summary = tick(&ctx).unwrap();
        assert_eq!(summary.decisions_emitted, 1);

        let outbox = agents_root_path.join("agent_release/outbox/plan-1");
        let decisions: Vec<_> = fs::read_dir(&outbox)
            .unwrap()
            .filter_map(Result::ok)
            .filter(|e| e.file_name().to_string_lossy().starts_with("decision_"))
            .collect();
        assert_eq!(decisions.len(), 1);
        let decision: DecisionRecord = serde_json::from_slice(&fs::read(decisions[0].path()).unwrap()).unwrap();
        assert_eq!(decision.decision, "APPROVE");

        let releases: Vec<_> = fs::read_dir(&outbox)
            .unwrap()
            .filter_map(Result::ok)
            .filter(|e| e.file_name().to_string_lossy().starts_with("release_"))
            .collect();
        assert_eq!(releases.len(), 1);
    }

    #[test]
    fn missing_plan_manifest_skips_plan() {
        let dir = tempdir().unwrap();
        let agents_root_path = dir.path().join("agents");
        let system_path = dir.path().join("system_runtime");
        fs::create_dir_all(agents_root_path.join("agent_release/outbox/plan-1")).unwrap();
        let agents_root = AgentsRoot::new(&agents_root_path);
        let system = SystemPaths::new(&system_path);
        write_dag(&system, "plan-1");

        let clock = FixedClock(chrono::Utc.with_ymd_and_hms(2026, 7, 31, 0, 0, 0).unwrap());
        let schemas = SchemaRegistry::load("/nonexistent").unwrap();
        let ctx = ReleaseContext {
            agents_root,
            system,
            schemas,
            schema_validation_enabled: false,
            clock: &clock,
        };
        let summary = tick(&ctx).unwrap();
        assert_eq!(summary.decisions_emitted, 0);
    }
}

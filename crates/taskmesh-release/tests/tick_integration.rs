// SPDX-License-Identifier: MIT OR Apache-2.0
//! End-to-end release tick scenario: a plan manifest with no input index
//! at all rejects on its first tick, with every required gate recorded
//! missing in the emitted decision.

use std::fs;

use chrono::TimeZone;
use taskmesh_core::clock::FixedClock;
use taskmesh_core::DecisionRecord;
use taskmesh_fs::{AgentsRoot, SystemPaths};
use taskmesh_release::{tick, ReleaseContext};
use taskmesh_schema::SchemaRegistry;
use tempfile::tempdir;

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
fn rejects_when_required_evidence_has_never_been_delivered() {
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
        "policies": {"release_gates_required": ["smoke_test_result.json", "e2e_test_result.json"]}
    });
    fs::write(system.plan_manifest("plan-1"), serde_json::to_vec(&manifest).unwrap()).unwrap();

    let clock = FixedClock(chrono::Utc.with_ymd_and_hms(2026, 7, 31, 0, 0, 0).unwrap());
    let ctx = ReleaseContext {
        agents_root,
        system,
        schemas: SchemaRegistry::load("/nonexistent").unwrap(),
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
    assert_eq!(decision.decision, "REJECT");
    assert_eq!(decision.evidence_files.len(), 2);
    assert!(decision.evidence_files.iter().all(|e| !e.found));
}

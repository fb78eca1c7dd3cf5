// SPDX-License-Identifier: MIT OR Apache-2.0
//! End-to-end router tick scenarios against a real temp directory tree:
//! command delivery with same-tick supersedence, and artifact fan-out
//! with delivery idempotency across ticks.

use chrono::{TimeZone, Utc};
use std::fs;

use taskmesh_core::clock::FixedClock;
use taskmesh_core::delivery::{parse_all, DeliveryStatus};
use taskmesh_fs::{AgentsRoot, SystemPaths};
use taskmesh_router::{tick, RouterContext};
use taskmesh_schema::SchemaRegistry;

fn dag_json() -> serde_json::Value {
    serde_json::json!({
        "schema_version": "1.1",
        "nodes": {
            "task_exec": {
                "assigned_agent_id": "agent_exec",
                "depends_on": [],
                "required_inputs": [],
                "outputs": [
                    {"name": "result", "deliver_to": ["agent_consumer"]}
                ]
            }
        }
    })
}

struct Fixture {
    _dir: tempfile::TempDir,
    agents_root: AgentsRoot,
    system: SystemPaths,
}

fn setup() -> Fixture {
    let dir = tempfile::tempdir().unwrap();
    let agents_root_path = dir.path().join("agents");
    let system_path = dir.path().join("system_runtime");
    fs::create_dir_all(&agents_root_path).unwrap();
    fs::create_dir_all(agents_root_path.join("agent_planner")).unwrap();
    fs::create_dir_all(agents_root_path.join("agent_exec")).unwrap();
    fs::create_dir_all(system_path.join("plans/plan-1")).unwrap();

    let dag_bytes = serde_json::to_vec_pretty(&dag_json()).unwrap();
    let dag_sha = taskmesh_core::sha256_hex_prefixed(&dag_bytes);
    fs::write(system_path.join("plans/plan-1/task_dag.json"), &dag_bytes).unwrap();
    fs::write(
        system_path.join("plans/plan-1/active_dag_ref.json"),
        serde_json::to_vec(&serde_json::json!({
            "schema_version": "1.1",
            "task_dag_sha256": dag_sha,
        }))
        .unwrap(),
    )
    .unwrap();

    Fixture {
        agents_root: AgentsRoot::new(&agents_root_path),
        system: SystemPaths::new(&system_path),
        _dir: dir,
    }
}

fn command_envelope(message_id: &str, command_seq: u64, dag_sha: &str) -> serde_json::Value {
    serde_json::json!({
        "schema_version": "1.0",
        "message_id": message_id,
        "plan_id": "plan-1",
        "producer_agent_id": "agent_planner",
        "type": "command",
        "created_at": "2026-07-31T00:00:00Z",
        "task_id": "task_exec",
        "payload": {
            "command": {
                "command_id": format!("cmd_{message_id}"),
                "plan_id": "plan-1",
                "task_id": "task_exec",
                "command_seq": command_seq,
                "dag_ref": {"sha256": dag_sha},
                "prompt": "do the thing",
                "required_inputs": [],
                "produces": [],
                "wait_for_inputs": false,
                "timeout": 30,
                "score_required": false,
            }
        }
    });
}

#[test]
fn newer_command_seq_supersedes_older_in_same_tick() {
    let fx = setup();
    let dag_bytes = fs::read(fx.system.task_dag("plan-1")).unwrap();
    let dag_sha = taskmesh_core::sha256_hex_prefixed(&dag_bytes);

    let planner_outbox = fx.agents_root.agent("agent_planner").outbox("plan-1");
    fs::create_dir_all(&planner_outbox).unwrap();
    fs::write(
        planner_outbox.join("env_old.msg.json"),
        serde_json::to_vec(&command_envelope("msg_old", 1, &dag_sha)).unwrap(),
    )
    .unwrap();
    fs::write(
        planner_outbox.join("env_new.msg.json"),
        serde_json::to_vec(&command_envelope("msg_new", 2, &dag_sha)).unwrap(),
    )
    .unwrap();

    let clock = FixedClock(Utc.with_ymd_and_hms(2026, 7, 31, 0, 0, 0).unwrap());
    let ctx = RouterContext {
        agents_root: fx.agents_root.clone(),
        system: fx.system.clone(),
        schemas: SchemaRegistry::load("/nonexistent").unwrap(),
        schema_validation_enabled: false,
        clock: &clock,
    };
    let summary = tick(&ctx).unwrap();
    assert_eq!(summary.delivered, 1);
    assert_eq!(summary.skipped_superseded, 1);

    let log = fs::read_to_string(fx.system.deliveries_log("plan-1")).unwrap();
    let entries = parse_all(&log);
    let delivered: Vec<_> = entries
        .iter()
        .filter(|e| e.status == DeliveryStatus::Delivered)
        .collect();
    assert_eq!(delivered.len(), 1);
    assert_eq!(delivered[0].message_id, "msg_new");

    let exec_inbox = fx.agents_root.agent("agent_exec").inbox("plan-1");
    let delivered_files = taskmesh_fs::list_envelope_files(&exec_inbox).unwrap();
    assert_eq!(delivered_files.len(), 1);
}

#[test]
fn redelivering_same_tick_twice_is_idempotent() {
    let fx = setup();
    let dag_bytes = fs::read(fx.system.task_dag("plan-1")).unwrap();
    let dag_sha = taskmesh_core::sha256_hex_prefixed(&dag_bytes);

    let planner_outbox = fx.agents_root.agent("agent_planner").outbox("plan-1");
    fs::create_dir_all(&planner_outbox).unwrap();
    fs::write(
        planner_outbox.join("env.msg.json"),
        serde_json::to_vec(&command_envelope("msg_1", 1, &dag_sha)).unwrap(),
    )
    .unwrap();

    let clock = FixedClock(Utc.with_ymd_and_hms(2026, 7, 31, 0, 0, 0).unwrap());
    let ctx = RouterContext {
        agents_root: fx.agents_root.clone(),
        system: fx.system.clone(),
        schemas: SchemaRegistry::load("/nonexistent").unwrap(),
        schema_validation_enabled: false,
        clock: &clock,
    };
    let first = tick(&ctx).unwrap();
    assert_eq!(first.delivered, 1);

    let second = tick(&ctx).unwrap();
    assert_eq!(second.delivered, 0);
    assert_eq!(second.skipped_duplicate, 1);

    let log = fs::read_to_string(fx.system.deliveries_log("plan-1")).unwrap();
    let entries = parse_all(&log);
    let delivered_count = entries
        .iter()
        .filter(|e| e.status == DeliveryStatus::Delivered)
        .count();
    assert_eq!(delivered_count, 1, "duplicate tick must not double-record delivery");
}

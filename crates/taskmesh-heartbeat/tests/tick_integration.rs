// SPDX-License-Identifier: MIT OR Apache-2.0
//! End-to-end heartbeat tick scenarios: an immediately runnable command
//! completing in one tick, and a `wait_for_inputs` command blocking then
//! escalating to a human request once its timeout elapses.

use std::fs;

use chrono::{Duration, TimeZone, Utc};
use taskmesh_core::clock::FixedClock;
use taskmesh_core::{TaskState, TaskStateValue};
use taskmesh_fs::{AgentPaths, AgentsRoot, SystemPaths};
use taskmesh_heartbeat::{tick, DefaultCommandHandler, HeartbeatContext};
use taskmesh_schema::SchemaRegistry;

mod support {
    pub fn plans_config_auto() -> serde_json::Value {
        serde_json::json!({"scan_mode": "auto", "allowlist": []})
    }
}

struct Fixture {
    _dir: tempfile::TempDir,
    agent: AgentPaths,
    agents_root: AgentsRoot,
    system: SystemPaths,
}

fn setup() -> Fixture {
    let dir = tempfile::tempdir().unwrap();
    let agents_root_path = dir.path().join("agents");
    let system_path = dir.path().join("system_runtime");
    fs::create_dir_all(agents_root_path.join("agent_exec")).unwrap();
    fs::create_dir_all(system_path.join("plans/plan-1/human_requests")).unwrap();

    let agents_root = AgentsRoot::new(&agents_root_path);
    Fixture {
        agent: agents_root.agent("agent_exec"),
        agents_root,
        system: SystemPaths::new(&system_path),
        _dir: dir,
    }
}

fn config() -> taskmesh_heartbeat::config::HeartbeatConfig {
    taskmesh_heartbeat::config::HeartbeatConfig {
        schema_version: "1.0".into(),
        agent_id: "agent_exec".into(),
        poll_interval_seconds: 5,
        max_new_messages_per_tick: 50,
        max_resume_messages_per_tick: 10,
        plans: serde_json::from_value(support::plans_config_auto()).unwrap(),
        schema_validation: taskmesh_heartbeat::config::SchemaValidationConfig {
            enabled: false,
            schemas_base_dir: None,
        },
    }
}

fn command_envelope(command_seq: u64, required_inputs: Vec<&str>, wait_for_inputs: bool, timeout: u64) -> serde_json::Value {
    serde_json::json!({
        "schema_version": "1.0",
        "message_id": "msg_1",
        "plan_id": "plan-1",
        "producer_agent_id": "agent_planner",
        "type": "command",
        "created_at": "2026-07-31T00:00:00Z",
        "task_id": "task_exec",
        "payload": {
            "command": {
                "command_id": "cmd_1",
                "plan_id": "plan-1",
                "task_id": "task_exec",
                "command_seq": command_seq,
                "dag_ref": {"sha256": "sha256:placeholder"},
                "prompt": "do the thing",
                "required_inputs": required_inputs,
                "produces": [],
                "wait_for_inputs": wait_for_inputs,
                "timeout": timeout,
                "score_required": false,
            }
        }
    });
}

#[test]
fn command_with_no_missing_inputs_completes_in_one_tick() {
    let fx = setup();
    fs::create_dir_all(fx.agent.inbox("plan-1")).unwrap();
    fs::write(
        fx.agent.inbox("plan-1").join("cmd.msg.json"),
        serde_json::to_vec(&command_envelope(1, vec![], false, 30)).unwrap(),
    )
    .unwrap();

    let clock = FixedClock(Utc.with_ymd_and_hms(2026, 7, 31, 0, 0, 0).unwrap());
    let handler = DefaultCommandHandler;
    let ctx = HeartbeatContext {
        agent: fx.agent.clone(),
        agents_root: fx.agents_root.clone(),
        system: fx.system.clone(),
        schemas: SchemaRegistry::load("/nonexistent").unwrap(),
        schema_validation_enabled: false,
        config: config(),
        handler: &handler,
        clock: &clock,
    };

    let summary = tick(&ctx).unwrap();
    assert_eq!(summary.claimed, 1);
    assert_eq!(summary.resumed, 0);

    let state: TaskState = serde_json::from_slice(
        &fs::read(fx.agent.task_state_file("plan-1", "task_exec")).unwrap(),
    )
    .unwrap();
    assert_eq!(state.state, TaskStateValue::Completed);

    let processed = fs::read_dir(fx.agent.inbox_processed("plan-1")).unwrap().count();
    assert_eq!(processed, 1, "completed envelope must be finalized into .processed/");
}

#[test]
fn wait_for_inputs_blocks_then_escalates_after_timeout() {
    let fx = setup();
    fs::create_dir_all(fx.agent.inbox("plan-1")).unwrap();
    fs::write(
        fx.agent.inbox("plan-1").join("cmd.msg.json"),
        serde_json::to_vec(&command_envelope(1, vec!["missing.txt"], true, 30)).unwrap(),
    )
    .unwrap();

    let t0 = Utc.with_ymd_and_hms(2026, 7, 31, 0, 0, 0).unwrap();
    let clock0 = FixedClock(t0);
    let handler = DefaultCommandHandler;
    let ctx0 = HeartbeatContext {
        agent: fx.agent.clone(),
        agents_root: fx.agents_root.clone(),
        system: fx.system.clone(),
        schemas: SchemaRegistry::load("/nonexistent").unwrap(),
        schema_validation_enabled: false,
        config: config(),
        handler: &handler,
        clock: &clock0,
    };
    let first = tick(&ctx0).unwrap();
    assert_eq!(first.claimed, 1);

    let state: TaskState = serde_json::from_slice(
        &fs::read(fx.agent.task_state_file("plan-1", "task_exec")).unwrap(),
    )
    .unwrap();
    assert_eq!(state.state, TaskStateValue::BlockedWaitingInput);

    // Still sitting in .pending/, not finalized.
    let pending = fs::read_dir(fx.agent.inbox_pending("plan-1")).unwrap().count();
    assert_eq!(pending, 1);

    // Advance past the 30s timeout and resume.
    let clock1 = FixedClock(t0 + Duration::seconds(31));
    let ctx1 = HeartbeatContext {
        agent: fx.agent.clone(),
        agents_root: fx.agents_root.clone(),
        system: fx.system.clone(),
        schemas: SchemaRegistry::load("/nonexistent").unwrap(),
        schema_validation_enabled: false,
        config: config(),
        handler: &handler,
        clock: &clock1,
    };
    let second = tick(&ctx1).unwrap();
    assert_eq!(second.claimed, 0);
    assert_eq!(second.resumed, 1);

    let state: TaskState = serde_json::from_slice(
        &fs::read(fx.agent.task_state_file("plan-1", "task_exec")).unwrap(),
    )
    .unwrap();
    assert_eq!(state.state, TaskStateValue::BlockedWaitingHuman);

    let requests = fs::read_dir(fx.system.human_requests_dir("plan-1")).unwrap().count();
    assert_eq!(requests, 1, "timeout must synthesize exactly one human intervention request");

    // Envelope is still unresolved, so it stays in .pending/ rather than
    // being finalized.
    let pending = fs::read_dir(fx.agent.inbox_pending("plan-1")).unwrap().count();
    assert_eq!(pending, 1);
}

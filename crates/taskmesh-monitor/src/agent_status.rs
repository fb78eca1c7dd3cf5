// SPDX-License-Identifier: MIT OR Apache-2.0
//! Collecting each agent's self-reported `status_heartbeat.json` into
//! `system_runtime/agent_status/<agent_id>.json`.

use anyhow::Result;
use taskmesh_core::clock::Clock;
use taskmesh_core::time::iso_z;
use taskmesh_core::{AgentStatusHeartbeat, AgentStatusSnapshot};
use taskmesh_fs::{atomic_write_json, read_json_tolerant, AgentsRoot, SystemPaths};
use taskmesh_schema::SchemaRegistry;

/// Copy every known agent's `status_heartbeat.json` into
/// `system_runtime/agent_status/<agent_id>.json`, annotated with when it
/// was collected.
///
/// A heartbeat is kept only if it is readable, schema-valid (when schema
/// validation is enabled), and internally consistent: its own embedded
/// `agent_id` must match the directory it was read from. Any other case
/// still produces a snapshot, just with `heartbeat: None` — a missing
/// heartbeat is itself meaningful (the agent has never ticked, or its
/// last tick wrote something we can't trust) and is not silently
/// dropped.
pub fn collect_agent_status(
    agents_root: &AgentsRoot,
    system: &SystemPaths,
    schemas: &SchemaRegistry,
    schema_validation_enabled: bool,
    clock: &dyn Clock,
) -> Result<usize> {
    let mut collected = 0;
    for agent_id in agents_root.list_agent_ids()? {
        let agent = agents_root.agent(&agent_id);
        let raw: Option<AgentStatusHeartbeat> = read_json_tolerant(&agent.status_heartbeat());
        let heartbeat = raw.filter(|hb| {
            if hb.agent_id != agent_id {
                return false;
            }
            if schema_validation_enabled {
                let Ok(instance) = serde_json::to_value(hb) else {
                    return false;
                };
                return schemas.validate("status_heartbeat", &instance).is_valid();
            }
            true
        });

        let snapshot = AgentStatusSnapshot {
            agent_id: agent_id.clone(),
            collected_at: iso_z(clock.now()),
            heartbeat,
        };
        atomic_write_json(&system.agent_status(&agent_id), &snapshot)?;
        collected += 1;
    }
    Ok(collected)
}

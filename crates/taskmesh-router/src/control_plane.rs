// SPDX-License-Identifier: MIT OR Apache-2.0
//! Control-plane archival: acks, decisions, and releases are not routed
//! by the DAG, but every agent's outbox copy of them is still the
//! source of truth the router folds into `system_runtime/plans/<plan>/`.

use std::fs;

use anyhow::Result;
use taskmesh_fs::{AgentsRoot, SystemPaths};

use crate::archive::{archive_by_stable_id, ArchiveOutcome};

/// The well-known agent id the router copies
/// `human_intervention_request_*` files to.
pub const HUMAN_GATEWAY_AGENT_ID: &str = "agent_human_gateway";

/// Archive every ack, decision, and release found in any agent's outbox
/// for `plan_id`, and forward any human intervention requests to the
/// human gateway agent's inbox.
///
/// Returns the number of conflicts detected (content archived under a
/// stable id that disagrees with a prior archive of the same id) so the
/// caller can raise `*_ID_REUSED_WITH_DIFFERENT_CONTENT` alerts.
pub fn archive_control_plane(
    agents_root: &AgentsRoot,
    system: &SystemPaths,
    agent_ids: &[String],
    plan_id: &str,
) -> Result<Vec<(&'static str, String)>> {
    let mut conflicts = Vec::new();
    let acks_dir = system.acks_dir(plan_id);
    let decisions_dir = system.decisions_dir(plan_id);
    let releases_dir = system.releases_dir(plan_id);
    let human_requests_dir = system.human_requests_dir(plan_id);
    let human_gateway_inbox = agents_root.agent(HUMAN_GATEWAY_AGENT_ID).inbox(plan_id);

    for agent_id in agent_ids {
        let outbox = agents_root.agent(agent_id).outbox(plan_id);
        if !outbox.exists() {
            continue;
        }
        for entry in fs::read_dir(&outbox)?.filter_map(|e| e.ok()) {
            let path = entry.path();
            if !path.is_file() {
                continue;
            }
            let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            let Ok(bytes) = fs::read(&path) else { continue };

            if let Some(stem) = name.strip_prefix("ack_").and_then(|s| s.strip_suffix(".json")) {
                if archive_by_stable_id(&acks_dir, stem, &bytes)? == ArchiveOutcome::ConflictDifferentContent {
                    conflicts.push(("ack", stem.to_string()));
                }
            } else if let Some(stem) = name
                .strip_prefix("decision_")
                .and_then(|s| s.strip_suffix(".json"))
            {
                if archive_by_stable_id(&decisions_dir, stem, &bytes)?
                    == ArchiveOutcome::ConflictDifferentContent
                {
                    conflicts.push(("decision", stem.to_string()));
                }
            } else if let Some(stem) = name
                .strip_prefix("release_")
                .and_then(|s| s.strip_suffix(".json"))
            {
                if archive_by_stable_id(&releases_dir, stem, &bytes)?
                    == ArchiveOutcome::ConflictDifferentContent
                {
                    conflicts.push(("release", stem.to_string()));
                }
            } else if name.starts_with("human_intervention_request_") {
                archive_by_stable_id(
                    &human_requests_dir,
                    name.trim_end_matches(".json"),
                    &bytes,
                )?;
                taskmesh_fs::atomic_write_bytes(&human_gateway_inbox.join(name), &bytes)?;
            }
        }
    }
    Ok(conflicts)
}

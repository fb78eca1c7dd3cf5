// SPDX-License-Identifier: MIT OR Apache-2.0
//! Injecting human-provided files back into the data plane.

use std::fs;

use anyhow::{Context, Result};
use taskmesh_core::clock::Clock;
use taskmesh_core::{Envelope, EnvelopePayload, EnvelopeType, HumanInterventionResponse, PayloadFile};
use taskmesh_fs::{atomic_copy, atomic_write_bytes, atomic_write_json, safe_relpath, AgentsRoot};

use crate::control_plane::HUMAN_GATEWAY_AGENT_ID;

/// Process every unprocessed `human_intervention_response_*.json` in the
/// human gateway agent's outbox for `plan_id`: for each `provided_files`
/// entry, copy the referenced file into the target agent's inbox under a
/// synthesized envelope whose `message_id` is
/// `"msg_human_" + request_id + "_" + sha[:12]`. Only marks the response
/// processed once every file in it delivered successfully.
pub fn process_human_responses(agents_root: &AgentsRoot, plan_id: &str, clock: &dyn Clock) -> Result<usize> {
    let gateway = agents_root.agent(HUMAN_GATEWAY_AGENT_ID);
    let outbox = gateway.outbox(plan_id);
    if !outbox.exists() {
        return Ok(0);
    }
    let mut processed_count = 0;
    for entry in fs::read_dir(&outbox)?.filter_map(|e| e.ok()) {
        let path = entry.path();
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        if !name.starts_with("human_intervention_response_") || !name.ends_with(".json") {
            continue;
        }
        let marker = outbox.join(format!("{name}.processed"));
        if marker.exists() {
            continue;
        }
        let bytes = fs::read(&path).with_context(|| format!("reading {path:?}"))?;
        let Ok(response) = serde_json::from_slice::<HumanInterventionResponse>(&bytes) else {
            continue;
        };

        let mut all_delivered = true;
        for provided in &response.provided_files {
            let Ok(source) = safe_relpath(&outbox, &provided.path) else {
                all_delivered = false;
                continue;
            };
            if !source.exists() {
                all_delivered = false;
                continue;
            }
            let file_bytes = fs::read(&source).with_context(|| format!("reading {source:?}"))?;
            let sha = taskmesh_core::sha256_hex_prefixed(&file_bytes);
            let short_sha: String = sha.trim_start_matches("sha256:").chars().take(12).collect();
            let message_id = format!("msg_human_{}_{}", response.request_id, short_sha);
            let file_name = source
                .file_name()
                .and_then(|n| n.to_str())
                .unwrap_or("provided_file")
                .to_string();

            let target = agents_root.agent(&provided.deliver_to_agent_id);
            let target_inbox = target.inbox(plan_id);
            let payload_dest = target_inbox.join(&file_name);
            if atomic_copy(&source, &payload_dest).is_err() {
                all_delivered = false;
                continue;
            }

            let envelope = Envelope {
                schema_version: taskmesh_core::SCHEMA_VERSION.to_string(),
                message_id: message_id.clone(),
                plan_id: plan_id.to_string(),
                producer_agent_id: HUMAN_GATEWAY_AGENT_ID.to_string(),
                kind: EnvelopeType::Artifact,
                created_at: taskmesh_core::time::iso_z(clock.now()),
                task_id: None,
                output_name: None,
                command_id: None,
                payload: EnvelopePayload::Artifact {
                    files: vec![PayloadFile {
                        path: file_name.clone(),
                        sha256: sha,
                        content_type: None,
                        size_bytes: Some(file_bytes.len() as u64),
                    }],
                },
            };
            let envelope_path = target_inbox.join(format!("{message_id}.msg.json"));
            if atomic_write_json(&envelope_path, &envelope).is_err() {
                all_delivered = false;
            }
        }

        if all_delivered {
            atomic_write_bytes(&marker, b"{}")?;
            processed_count += 1;
        }
    }
    Ok(processed_count)
}

// SPDX-License-Identifier: MIT OR Apache-2.0
//! Writing a handler's produced artifacts to the agent's own outbox.

use anyhow::Result;
use taskmesh_core::clock::Clock;
use taskmesh_core::ids::IdGenerator;
use taskmesh_core::time::iso_z;
use taskmesh_core::{Envelope, EnvelopePayload, EnvelopeType, PayloadFile};
use taskmesh_fs::{atomic_write_bytes, atomic_write_json, AgentPaths};

use crate::handler::ProducedArtifact;

/// Write each produced artifact's payload files then its envelope
/// (payload-before-envelope, even within the producer's own outbox, so a
/// router tick that races this write never sees an envelope without its
/// files) and return the message ids created.
pub fn write_artifacts_to_outbox(
    agent: &AgentPaths,
    plan_id: &str,
    task_id: &str,
    command_id: &str,
    artifacts: &[ProducedArtifact],
    clock: &dyn Clock,
) -> Result<Vec<String>> {
    let idgen = IdGenerator::new(clock);
    let outbox = agent.outbox(plan_id);
    let mut message_ids = Vec::with_capacity(artifacts.len());

    for artifact in artifacts {
        let message_id = idgen.message_id();
        let mut files = Vec::with_capacity(artifact.files.len());
        for file in &artifact.files {
            let dest = outbox.join(&file.path);
            atomic_write_bytes(&dest, &file.content)?;
            files.push(PayloadFile {
                path: file.path.clone(),
                sha256: taskmesh_core::sha256_hex_prefixed(&file.content),
                content_type: file.content_type.clone(),
                size_bytes: Some(file.content.len() as u64),
            });
        }

        let envelope = Envelope {
            schema_version: taskmesh_core::SCHEMA_VERSION.to_string(),
            message_id: message_id.clone(),
            plan_id: plan_id.to_string(),
            producer_agent_id: agent.agent_id().to_string(),
            kind: EnvelopeType::Artifact,
            created_at: iso_z(clock.now()),
            task_id: Some(task_id.to_string()),
            output_name: Some(artifact.output_name.clone()),
            command_id: Some(command_id.to_string()),
            payload: EnvelopePayload::Artifact { files },
        };
        let envelope_path = outbox.join(format!("{message_id}.msg.json"));
        atomic_write_json(&envelope_path, &envelope)?;
        message_ids.push(message_id);
    }

    Ok(message_ids)
}

// SPDX-License-Identifier: MIT OR Apache-2.0
//! The wire envelope: the unit the router moves between agent outboxes
//! and inboxes.

use serde::{Deserialize, Serialize};

use crate::command::Command;

/// `envelope.type`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnvelopeType {
    /// An imperative directed at a task's assigned agent.
    Command,
    /// A named, file-bearing output.
    Artifact,
}

/// One file referenced by an artifact payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PayloadFile {
    /// Path relative to the plan's outbox/inbox directory.
    pub path: String,
    /// `sha256:`-prefixed digest of the file's bytes.
    pub sha256: String,
    /// MIME type, if known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
    /// Size in bytes, if known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size_bytes: Option<u64>,
}

/// `envelope.payload`, shaped by `envelope.type`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EnvelopePayload {
    /// `type == "artifact"`.
    Artifact {
        /// The files this artifact carries.
        files: Vec<PayloadFile>,
    },
    /// `type == "command"`.
    Command {
        /// The embedded command.
        command: Command,
    },
}

/// The wire envelope.
///
/// File name on disk always ends in `.msg.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    /// Always `"1.0"` for the data-plane envelope format.
    pub schema_version: String,
    /// Globally unique; content-addressed together with the envelope's
    /// own digest.
    pub message_id: String,
    /// The plan this envelope belongs to.
    pub plan_id: String,
    /// The agent that produced this envelope.
    pub producer_agent_id: String,
    /// `command` or `artifact`.
    #[serde(rename = "type")]
    pub kind: EnvelopeType,
    /// RFC 3339 UTC, `Z`-suffixed.
    pub created_at: String,
    /// The task this envelope is associated with, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub task_id: Option<String>,
    /// The output this artifact fulfills, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_name: Option<String>,
    /// The command id this envelope carries or responds to, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub command_id: Option<String>,
    /// The envelope body.
    pub payload: EnvelopePayload,
}

impl Envelope {
    /// The artifact files this envelope carries, or an empty slice if
    /// this is a command envelope.
    #[must_use]
    pub fn artifact_files(&self) -> &[PayloadFile] {
        match &self.payload {
            EnvelopePayload::Artifact { files } => files,
            EnvelopePayload::Command { .. } => &[],
        }
    }

    /// The embedded command, if this is a command envelope.
    #[must_use]
    pub fn command(&self) -> Option<&Command> {
        match &self.payload {
            EnvelopePayload::Command { command } => Some(command),
            EnvelopePayload::Artifact { .. } => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn artifact_envelope_roundtrips() {
        let json = serde_json::json!({
            "schema_version": "1.0",
            "message_id": "msg_20260731T000000Z_aaaaaaaa",
            "plan_id": "plan-1",
            "producer_agent_id": "agent_exec",
            "type": "artifact",
            "created_at": "2026-07-31T00:00:00Z",
            "task_id": "task_exec",
            "output_name": "o",
            "payload": {
                "files": [{"path": "out.txt", "sha256": "sha256:deadbeef"}]
            }
        });
        let env: Envelope = serde_json::from_value(json).unwrap();
        assert_eq!(env.kind, EnvelopeType::Artifact);
        assert_eq!(env.artifact_files().len(), 1);
        assert!(env.command().is_none());
    }
}

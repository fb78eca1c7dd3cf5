// SPDX-License-Identifier: MIT OR Apache-2.0
//! The consumer's receipt for a processed envelope.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// `ack.status`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AckStatus {
    /// The envelope was claimed and handling has started; not terminal.
    Consumed,
    /// Handling completed successfully; terminal.
    Succeeded,
    /// Handling failed; terminal.
    Failed,
}

impl AckStatus {
    /// Whether this status is final for its `message_id`: no further
    /// state for that message is produced once terminal.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed)
    }
}

/// An agent's receipt for a processed envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Ack {
    /// The envelope this ack is for.
    pub message_id: String,
    /// The agent that produced this ack.
    pub consumer_agent_id: String,
    /// Current processing status.
    pub status: AckStatus,
    /// When the envelope was claimed.
    pub consumed_at: String,
    /// When processing reached a terminal state, if it has.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<String>,
    /// Handler-provided result, with any raw bytes stripped.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    /// The task this ack pertains to, if the envelope was a command.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub task_id: Option<String>,
    /// The command id this ack pertains to, if the envelope was a
    /// command.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub command_id: Option<String>,
    /// The command seq this ack pertains to, if the envelope was a
    /// command.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub command_seq: Option<u64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_statuses() {
        assert!(!AckStatus::Consumed.is_terminal());
        assert!(AckStatus::Succeeded.is_terminal());
        assert!(AckStatus::Failed.is_terminal());
    }

    #[test]
    fn serializes_status_uppercase() {
        let s = serde_json::to_string(&AckStatus::Succeeded).unwrap();
        assert_eq!(s, "\"SUCCEEDED\"");
    }
}

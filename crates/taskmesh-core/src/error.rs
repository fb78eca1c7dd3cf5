// SPDX-License-Identifier: MIT OR Apache-2.0
//! Error taxonomy.
//!
//! Codes are the literal strings that appear in alert and deadletter
//! records; `.code()` is the single source of truth so daemons never
//! hand-format a code string at a call site.

use thiserror::Error;

/// Every error the router, heartbeat, monitor, and release daemons can
/// attribute to a specific envelope, command, or archive entry.
///
/// Daemon-internal failures that are not part of this taxonomy (a
/// directory that can't be listed, a config file that won't parse) use
/// `anyhow::Error` instead; this enum is reserved for outcomes that get a
/// stable code in an alert or deadletter record.
#[derive(Debug, Error)]
pub enum TaskMeshError {
    /// The envelope (or another JSON document) is not valid JSON, or is
    /// missing a required field.
    #[error("envelope parse error: {0}")]
    EnvelopeParseError(String),

    /// Schema validation rejected the document.
    #[error("schema invalid: {0}")]
    SchemaInvalid(String),

    /// `schema_version` is not one this build understands.
    #[error("unsupported schema version: {0}")]
    SchemaVersionUnsupported(String),

    /// A path derived from envelope content was absolute or contained a
    /// `..` component.
    #[error("unsafe path: {0}")]
    UnsafePath(String),

    /// `envelope.type` is not `command` or `artifact`.
    #[error("unsupported message type: {0}")]
    UnsupportedMessageType(String),

    /// A command's `dag_ref.sha256` does not match the active DAG.
    #[error("command dag mismatch: expected {expected}, got {actual}")]
    CommandDagMismatch {
        /// The active DAG's digest.
        expected: String,
        /// The digest the command was pinned to.
        actual: String,
    },

    /// An artifact has no `deliver_to` target resolvable from the DAG.
    #[error("routing has no target: {0}")]
    RoutingNoTarget(String),

    /// The DAG names an `assigned_agent_id` with no corresponding agent
    /// directory.
    #[error("target agent not found: {0}")]
    TargetAgentNotFound(String),

    /// A payload file referenced by an artifact envelope is absent from
    /// the producer outbox.
    #[error("missing payload: {0}")]
    MissingPayload(String),

    /// The same `message_id` was observed with two different envelope
    /// digests.
    #[error("message_id reused with different payload: {0}")]
    MessageIdReusedWithDifferentPayload(String),

    /// The same stable id (ack, decision, release) was observed with two
    /// different digests.
    #[error("{kind}_id reused with different content: {id}")]
    IdReusedWithDifferentContent {
        /// The kind of archived entity (`ack`, `decision`, `release`, ...).
        kind: String,
        /// The reused identifier.
        id: String,
    },

    /// An ingested artifact file collides with a different-sha file
    /// already present at the workspace destination.
    #[error("input conflict: {0}")]
    InputConflict(String),

    /// A payload being finalized into `.processed/_payload` collides with
    /// a different-sha file already there.
    #[error("payload finalize conflict: {0}")]
    PayloadFinalizeConflict(String),

    /// A command-archive entry's envelope and payload disagree on
    /// `task_id` or `command_id`.
    #[error("command archive inconsistent: {0}")]
    CommandArchiveInconsistent(String),

    /// A `wait_for_inputs` command exceeded its timeout without its
    /// required inputs arriving.
    #[error("wait for inputs timeout: task {task_id}")]
    WaitForInputsTimeout {
        /// The blocked task.
        task_id: String,
    },

    /// A `CONSUMED` ack has been outstanding longer than `2 * timeout`.
    #[error("command ack timeout: task {task_id}")]
    CommandAckTimeout {
        /// The task whose ack is stale.
        task_id: String,
    },

    /// An I/O or (de)serialization failure not otherwise classified.
    #[error("unhandled exception: {0}")]
    UnhandledException(String),
}

impl TaskMeshError {
    /// The stable, uppercase code written into alert and deadletter
    /// records.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::EnvelopeParseError(_) => "ENVELOPE_PARSE_ERROR",
            Self::SchemaInvalid(_) => "SCHEMA_INVALID",
            Self::SchemaVersionUnsupported(_) => "SCHEMA_VERSION_UNSUPPORTED",
            Self::UnsafePath(_) => "UNSAFE_PATH",
            Self::UnsupportedMessageType(_) => "UNSUPPORTED_MESSAGE_TYPE",
            Self::CommandDagMismatch { .. } => "COMMAND_DAG_MISMATCH",
            Self::RoutingNoTarget(_) => "ROUTING_NO_TARGET",
            Self::TargetAgentNotFound(_) => "TARGET_AGENT_NOT_FOUND",
            Self::MissingPayload(_) => "MISSING_PAYLOAD",
            Self::MessageIdReusedWithDifferentPayload(_) => {
                "MESSAGE_ID_REUSED_WITH_DIFFERENT_PAYLOAD"
            }
            Self::IdReusedWithDifferentContent { .. } => "ID_REUSED_WITH_DIFFERENT_CONTENT",
            Self::InputConflict(_) => "INPUT_CONFLICT",
            Self::PayloadFinalizeConflict(_) => "PAYLOAD_FINALIZE_CONFLICT",
            Self::CommandArchiveInconsistent(_) => "COMMAND_ARCHIVE_INCONSISTENT",
            Self::WaitForInputsTimeout { .. } => "WAIT_FOR_INPUTS_TIMEOUT",
            Self::CommandAckTimeout { .. } => "COMMAND_ACK_TIMEOUT",
            Self::UnhandledException(_) => "UNHANDLED_EXCEPTION",
        }
    }

    /// Whether this class of error should produce a deadletter record, as
    /// opposed to an advisory-only alert.
    #[must_use]
    pub fn is_deadletter(&self) -> bool {
        !matches!(
            self,
            Self::CommandArchiveInconsistent(_)
                | Self::WaitForInputsTimeout { .. }
                | Self::CommandAckTimeout { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_are_stable() {
        assert_eq!(
            TaskMeshError::EnvelopeParseError("x".into()).code(),
            "ENVELOPE_PARSE_ERROR"
        );
        assert_eq!(
            TaskMeshError::CommandDagMismatch {
                expected: "a".into(),
                actual: "b".into()
            }
            .code(),
            "COMMAND_DAG_MISMATCH"
        );
    }

    #[test]
    fn archive_inconsistent_is_alert_only() {
        assert!(!TaskMeshError::CommandArchiveInconsistent("x".into()).is_deadletter());
        assert!(TaskMeshError::UnsafePath("x".into()).is_deadletter());
    }
}

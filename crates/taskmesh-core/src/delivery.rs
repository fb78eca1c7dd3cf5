// SPDX-License-Identifier: MIT OR Apache-2.0
//! The per-plan append-only delivery log (`deliveries.jsonl`).
//!
//! The router is the log's only writer; everything else — the monitor,
//! a later router tick recomputing idempotency, a human operator
//! grepping for a `message_id` — only ever reads it.

use serde::{Deserialize, Serialize};

use crate::envelope::PayloadFile;
use crate::error::TaskMeshError;

/// `delivery.status`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DeliveryStatus {
    /// The envelope (and, for artifacts, its payload files) was copied
    /// to the target inbox.
    Delivered,
    /// `(message_id, envelope_sha256)` was already delivered to this
    /// target.
    SkippedDuplicate,
    /// A higher `command_seq` for the same task superseded this one.
    SkippedSuperseded,
    /// The envelope failed validation or routing and was deadlettered.
    Deadlettered,
}

/// The payload files carried by a delivered artifact, recorded for
/// forensics even though the canonical copy lives at the destination.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DeliveryPayload {
    /// The files this delivery carried, empty for command envelopes.
    #[serde(default)]
    pub files: Vec<PayloadFile>,
}

/// One line of `deliveries.jsonl`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryEntry {
    /// Unique id for this log line.
    pub delivery_id: String,
    /// The envelope this entry is about.
    pub message_id: String,
    /// `sha256:`-prefixed digest of the canonicalized envelope.
    pub envelope_sha256: String,
    /// The producing agent.
    pub from_agent_id: String,
    /// The target agent, or the producer itself for deadlettered/no-target
    /// outcomes where no target was resolved.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub to_agent_id: Option<String>,
    /// When this entry was appended.
    pub delivered_at: String,
    /// The outcome.
    pub status: DeliveryStatus,
    /// Why a `SKIPPED_*` or `DEADLETTERED` outcome occurred.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub skip_reason: Option<String>,
    /// Whether this command was superseded by a later `command_seq`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub superseded: Option<bool>,
    /// The `message_id` of the command that superseded this one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub superseded_by_message_id: Option<String>,
    /// The `command_seq` of the command that superseded this one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub superseded_by_command_seq: Option<u64>,
    /// The task this envelope pertains to, if known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub task_id: Option<String>,
    /// The command id this envelope pertains to, if it is a command.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub command_id: Option<String>,
    /// The output name this envelope fulfills, if it is an artifact.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_name: Option<String>,
    /// The payload files carried, if any.
    #[serde(default)]
    pub payload: DeliveryPayload,
    /// The taxonomy code for a `DEADLETTERED` outcome.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Parse one JSONL line, skipping (rather than erroring on) a truncated
/// trailing line — the router may have been killed mid-append.
pub fn parse_line(line: &str) -> Option<DeliveryEntry> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return None;
    }
    serde_json::from_str(trimmed).ok()
}

/// Parse an entire `deliveries.jsonl` file's contents, silently skipping
/// unparseable lines.
#[must_use]
pub fn parse_all(contents: &str) -> Vec<DeliveryEntry> {
    contents.lines().filter_map(parse_line).collect()
}

/// The set of `(message_id, envelope_sha256, to_agent_id)` triples that
/// have already reached `DELIVERED`, used by the router to recompute
/// idempotency at tick start.
#[must_use]
pub fn delivered_index(entries: &[DeliveryEntry]) -> std::collections::HashSet<(String, String, Option<String>)> {
    entries
        .iter()
        .filter(|e| e.status == DeliveryStatus::Delivered)
        .map(|e| {
            (
                e.message_id.clone(),
                e.envelope_sha256.clone(),
                e.to_agent_id.clone(),
            )
        })
        .collect()
}

/// Find a previously seen digest for `message_id`, if this log has ever
/// recorded one, to detect reuse with different content.
#[must_use]
pub fn prior_sha_for_message_id<'a>(
    entries: &'a [DeliveryEntry],
    message_id: &str,
) -> Option<&'a str> {
    entries
        .iter()
        .find(|e| e.message_id == message_id)
        .map(|e| e.envelope_sha256.as_str())
}

/// Check whether a newly observed `(message_id, sha)` pair is consistent
/// with history.
///
/// # Errors
///
/// Returns [`TaskMeshError::MessageIdReusedWithDifferentPayload`] if
/// `message_id` was previously logged with a different digest.
pub fn check_no_reuse(
    entries: &[DeliveryEntry],
    message_id: &str,
    envelope_sha256: &str,
) -> Result<(), TaskMeshError> {
    if let Some(prior) = prior_sha_for_message_id(entries, message_id) {
        if prior != envelope_sha256 {
            return Err(TaskMeshError::MessageIdReusedWithDifferentPayload(
                message_id.to_string(),
            ));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(message_id: &str, sha: &str, to: &str, status: DeliveryStatus) -> DeliveryEntry {
        DeliveryEntry {
            delivery_id: "del_1".into(),
            message_id: message_id.into(),
            envelope_sha256: sha.into(),
            from_agent_id: "agent_exec".into(),
            to_agent_id: Some(to.into()),
            delivered_at: "2026-07-31T00:00:00Z".into(),
            status,
            skip_reason: None,
            superseded: None,
            superseded_by_message_id: None,
            superseded_by_command_seq: None,
            task_id: None,
            command_id: None,
            output_name: None,
            payload: DeliveryPayload::default(),
            error: None,
        }
    }

    #[test]
    fn skips_truncated_lines() {
        let contents = "{\"bad json\n{\"delivery_id\":\"del_1\",\"message_id\":\"m\",\"envelope_sha256\":\"sha256:a\",\"from_agent_id\":\"x\",\"delivered_at\":\"2026-07-31T00:00:00Z\",\"status\":\"DELIVERED\",\"payload\":{\"files\":[]}}\n";
        let entries = parse_all(contents);
        assert_eq!(entries.len(), 1);
    }

    #[test]
    fn detects_reuse_with_different_sha() {
        let entries = vec![entry("m1", "sha256:aa", "agent_b", DeliveryStatus::Delivered)];
        assert!(check_no_reuse(&entries, "m1", "sha256:aa").is_ok());
        assert!(check_no_reuse(&entries, "m1", "sha256:bb").is_err());
    }

    #[test]
    fn delivered_index_ignores_non_delivered() {
        let entries = vec![
            entry("m1", "sha256:aa", "agent_b", DeliveryStatus::Delivered),
            entry("m2", "sha256:bb", "agent_b", DeliveryStatus::SkippedSuperseded),
        ];
        let idx = delivered_index(&entries);
        assert_eq!(idx.len(), 1);
        assert!(idx.contains(&("m1".to_string(), "sha256:aa".to_string(), Some("agent_b".to_string()))));
    }
}

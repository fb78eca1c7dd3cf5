// SPDX-License-Identifier: MIT OR Apache-2.0
//! Exactly-once archival of control-plane artifacts and command
//! envelopes, keyed by a stable id: a reused identifier must always
//! carry the same content, or the archival is rejected as a conflict.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use taskmesh_core::sha256_hex_prefixed;
use taskmesh_fs::atomic_write_bytes;

/// The result of attempting to archive one artifact under its stable id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveOutcome {
    /// Not previously archived; written now.
    New,
    /// Already archived with identical content; no write performed.
    AlreadySame,
    /// Already archived with *different* content — invariant 3
    /// violation.
    ConflictDifferentContent,
}

/// Archive `bytes` under `dir/<stable_id>.json`, enforcing that a reused
/// `stable_id` always carries the same content.
pub fn archive_by_stable_id(dir: &Path, stable_id: &str, bytes: &[u8]) -> Result<ArchiveOutcome> {
    let dest = dir.join(format!("{stable_id}.json"));
    if dest.exists() {
        let existing = fs::read(&dest).with_context(|| format!("reading {dest:?}"))?;
        return Ok(if sha256_hex_prefixed(&existing) == sha256_hex_prefixed(bytes) {
            ArchiveOutcome::AlreadySame
        } else {
            ArchiveOutcome::ConflictDifferentContent
        });
    }
    atomic_write_bytes(&dest, bytes)?;
    Ok(ArchiveOutcome::New)
}

/// The maximum `command_seq` observed in `commands_dir` for
/// `(task_id, dag_sha)`, scanning every archived command envelope.
pub fn max_archived_command_seq(commands_dir: &Path, task_id: &str, dag_sha: &str) -> Option<u64> {
    let entries = fs::read_dir(commands_dir).ok()?;
    entries
        .filter_map(|e| e.ok())
        .filter_map(|e| fs::read(e.path()).ok())
        .filter_map(|bytes| serde_json::from_slice::<taskmesh_core::Envelope>(&bytes).ok())
        .filter_map(|env| env.command().cloned())
        .filter(|cmd| cmd.task_id == task_id && cmd.dag_ref.sha256 == dag_sha)
        .map(|cmd| cmd.command_seq)
        .max()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn archives_new_then_detects_conflict() {
        let dir = tempdir().unwrap();
        assert_eq!(
            archive_by_stable_id(dir.path(), "ack_1", b"{\"a\":1}").unwrap(),
            ArchiveOutcome::New
        );
        assert_eq!(
            archive_by_stable_id(dir.path(), "ack_1", b"{\"a\":1}").unwrap(),
            ArchiveOutcome::AlreadySame
        );
        assert_eq!(
            archive_by_stable_id(dir.path(), "ack_1", b"{\"a\":2}").unwrap(),
            ArchiveOutcome::ConflictDifferentContent
        );
    }
}

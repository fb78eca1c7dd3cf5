// SPDX-License-Identifier: MIT OR Apache-2.0
//! The per-(agent, plan) input index: the durable record of which
//! artifacts have been ingested into an agent's workspace.

use serde::{Deserialize, Serialize};

/// One file recorded under an [`InputIndexEntry`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InputIndexEntryFile {
    /// Path relative to `workspace/<plan>/inputs/<task_id>/<output_name>/`.
    pub path: String,
    /// `sha256:`-prefixed digest of the ingested file.
    pub sha256: String,
    /// When the file was copied into the workspace.
    pub stored_at: String,
}

/// One ingested artifact delivery.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InputIndexEntry {
    /// The artifact envelope this entry was built from.
    pub message_id: String,
    /// The producing task.
    pub task_id: String,
    /// The output name this artifact fulfills.
    pub output_name: String,
    /// When this entry was recorded.
    pub received_at: String,
    /// The files this artifact delivered.
    pub files: Vec<InputIndexEntryFile>,
}

/// `workspace/<plan>/inputs/input_index.json`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InputIndex {
    /// Every ingested artifact delivery, oldest first.
    #[serde(default)]
    pub entries: Vec<InputIndexEntry>,
}

impl InputIndex {
    /// Whether any entry was produced under `output_name`.
    #[must_use]
    pub fn has_output_name(&self, output_name: &str) -> bool {
        self.entries.iter().any(|e| e.output_name == output_name)
    }

    /// Whether any entry's files include one with this exact name
    /// (matched against the final path component).
    #[must_use]
    pub fn has_file_name(&self, file_name: &str) -> bool {
        self.entries.iter().any(|e| {
            e.files
                .iter()
                .any(|f| f.path.rsplit('/').next() == Some(file_name))
        })
    }

    /// All distinct file names across every ingested entry's files, for
    /// glob matching by the caller.
    #[must_use]
    pub fn all_file_names(&self) -> Vec<&str> {
        self.entries
            .iter()
            .flat_map(|e| e.files.iter().map(|f| f.path.as_str()))
            .collect()
    }

    /// Whether an entry for `message_id` has already been recorded —
    /// ingestion is idempotent on replay.
    #[must_use]
    pub fn has_message_id(&self, message_id: &str) -> bool {
        self.entries.iter().any(|e| e.message_id == message_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> InputIndex {
        InputIndex {
            entries: vec![InputIndexEntry {
                message_id: "msg_1".into(),
                task_id: "task_exec".into(),
                output_name: "o".into(),
                received_at: "2026-07-31T00:00:00Z".into(),
                files: vec![InputIndexEntryFile {
                    path: "out.txt".into(),
                    sha256: "sha256:aa".into(),
                    stored_at: "2026-07-31T00:00:00Z".into(),
                }],
            }],
        }
    }

    #[test]
    fn satisfaction_lookups() {
        let idx = sample();
        assert!(idx.has_output_name("o"));
        assert!(!idx.has_output_name("other"));
        assert!(idx.has_file_name("out.txt"));
        assert!(!idx.has_file_name("missing.txt"));
        assert!(idx.has_message_id("msg_1"));
    }
}

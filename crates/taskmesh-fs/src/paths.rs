// SPDX-License-Identifier: MIT OR Apache-2.0
//! The authoritative directory layout.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

/// `agents/` under the roots directory: every agent's private
/// inbox/outbox/workspace tree.
#[derive(Debug, Clone)]
pub struct AgentsRoot {
    root: PathBuf,
}

impl AgentsRoot {
    /// `root` is the `agents/` directory itself.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// The paths for one agent.
    #[must_use]
    pub fn agent(&self, agent_id: &str) -> AgentPaths {
        AgentPaths {
            root: self.root.join(agent_id),
            agent_id: agent_id.to_string(),
        }
    }

    /// Every agent id with a directory under this root, sorted.
    pub fn list_agent_ids(&self) -> Result<Vec<String>> {
        if !self.root.exists() {
            return Ok(Vec::new());
        }
        let mut ids: Vec<String> = fs::read_dir(&self.root)
            .with_context(|| format!("listing {:?}", self.root))?
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.path().is_dir())
            .filter_map(|entry| entry.file_name().into_string().ok())
            .collect();
        ids.sort();
        Ok(ids)
    }
}

/// Paths rooted at `agents/<agent_id>/`.
#[derive(Debug, Clone)]
pub struct AgentPaths {
    root: PathBuf,
    agent_id: String,
}

impl AgentPaths {
    /// This agent's id.
    #[must_use]
    pub fn agent_id(&self) -> &str {
        &self.agent_id
    }

    /// `agents/<id>/inbox/<plan>/`.
    #[must_use]
    pub fn inbox(&self, plan_id: &str) -> PathBuf {
        self.root.join("inbox").join(plan_id)
    }

    /// `agents/<id>/inbox/<plan>/.pending/`.
    #[must_use]
    pub fn inbox_pending(&self, plan_id: &str) -> PathBuf {
        self.inbox(plan_id).join(".pending")
    }

    /// `agents/<id>/inbox/<plan>/.processed/`.
    #[must_use]
    pub fn inbox_processed(&self, plan_id: &str) -> PathBuf {
        self.inbox(plan_id).join(".processed")
    }

    /// `agents/<id>/inbox/<plan>/.processed/_payload/<message_id>/`.
    #[must_use]
    pub fn inbox_processed_payload(&self, plan_id: &str, message_id: &str) -> PathBuf {
        self.inbox_processed(plan_id).join("_payload").join(message_id)
    }

    /// `agents/<id>/inbox/<plan>/.deadletter/`.
    #[must_use]
    pub fn inbox_deadletter(&self, plan_id: &str) -> PathBuf {
        self.inbox(plan_id).join(".deadletter")
    }

    /// `agents/<id>/inbox/<plan>/.deadletter/_payload_conflict/<message_id>/`.
    #[must_use]
    pub fn inbox_payload_conflict(&self, plan_id: &str, message_id: &str) -> PathBuf {
        self.inbox_deadletter(plan_id)
            .join("_payload_conflict")
            .join(message_id)
    }

    /// `agents/<id>/outbox/<plan>/`.
    #[must_use]
    pub fn outbox(&self, plan_id: &str) -> PathBuf {
        self.root.join("outbox").join(plan_id)
    }

    /// `agents/<id>/outbox/<plan>/task_state_<task_id>.json`.
    #[must_use]
    pub fn task_state_file(&self, plan_id: &str, task_id: &str) -> PathBuf {
        self.outbox(plan_id).join(format!("task_state_{task_id}.json"))
    }

    /// `agents/<id>/workspace/<plan>/`.
    #[must_use]
    pub fn workspace(&self, plan_id: &str) -> PathBuf {
        self.root.join("workspace").join(plan_id)
    }

    /// `agents/<id>/workspace/<plan>/inputs/`.
    #[must_use]
    pub fn workspace_inputs(&self, plan_id: &str) -> PathBuf {
        self.workspace(plan_id).join("inputs")
    }

    /// `agents/<id>/workspace/<plan>/inputs/input_index.json`.
    #[must_use]
    pub fn input_index_file(&self, plan_id: &str) -> PathBuf {
        self.workspace_inputs(plan_id).join("input_index.json")
    }

    /// `agents/<id>/workspace/<plan>/inputs/<task_id>/<output_name>/`.
    #[must_use]
    pub fn workspace_input_dir(&self, plan_id: &str, task_id: &str, output_name: &str) -> PathBuf {
        self.workspace_inputs(plan_id).join(task_id).join(output_name)
    }

    /// `agents/<id>/workspace/<plan>/tasks/<task_id>/`.
    #[must_use]
    pub fn workspace_task_dir(&self, plan_id: &str, task_id: &str) -> PathBuf {
        self.workspace(plan_id).join("tasks").join(task_id)
    }

    /// `agents/<id>/heartbeat_config.json`.
    #[must_use]
    pub fn heartbeat_config(&self) -> PathBuf {
        self.root.join("heartbeat_config.json")
    }

    /// `agents/<id>/status_heartbeat.json`.
    #[must_use]
    pub fn status_heartbeat(&self) -> PathBuf {
        self.root.join("status_heartbeat.json")
    }
}

/// Paths rooted at `system_runtime/`.
#[derive(Debug, Clone)]
pub struct SystemPaths {
    root: PathBuf,
}

impl SystemPaths {
    /// `root` is the `system_runtime/` directory itself.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// `system_runtime/plans/<plan>/`.
    #[must_use]
    pub fn plan_dir(&self, plan_id: &str) -> PathBuf {
        self.root.join("plans").join(plan_id)
    }

    /// `system_runtime/plans/<plan>/task_dag.json`.
    #[must_use]
    pub fn task_dag(&self, plan_id: &str) -> PathBuf {
        self.plan_dir(plan_id).join("task_dag.json")
    }

    /// `system_runtime/plans/<plan>/active_dag_ref.json`.
    #[must_use]
    pub fn active_dag_ref(&self, plan_id: &str) -> PathBuf {
        self.plan_dir(plan_id).join("active_dag_ref.json")
    }

    /// `system_runtime/plans/<plan>/deliveries.jsonl`.
    #[must_use]
    pub fn deliveries_log(&self, plan_id: &str) -> PathBuf {
        self.plan_dir(plan_id).join("deliveries.jsonl")
    }

    /// `system_runtime/plans/<plan>/plan_manifest.json`.
    #[must_use]
    pub fn plan_manifest(&self, plan_id: &str) -> PathBuf {
        self.plan_dir(plan_id).join("plan_manifest.json")
    }

    /// `system_runtime/plans/<plan>/plan_status.json`.
    #[must_use]
    pub fn plan_status(&self, plan_id: &str) -> PathBuf {
        self.plan_dir(plan_id).join("plan_status.json")
    }

    /// `system_runtime/plans/<plan>/release_manifest.json`.
    #[must_use]
    pub fn release_manifest_pointer(&self, plan_id: &str) -> PathBuf {
        self.plan_dir(plan_id).join("release_manifest.json")
    }

    /// `system_runtime/plans/<plan>/commands/`.
    #[must_use]
    pub fn commands_dir(&self, plan_id: &str) -> PathBuf {
        self.plan_dir(plan_id).join("commands")
    }

    /// `system_runtime/plans/<plan>/decisions/`.
    #[must_use]
    pub fn decisions_dir(&self, plan_id: &str) -> PathBuf {
        self.plan_dir(plan_id).join("decisions")
    }

    /// `system_runtime/plans/<plan>/acks/`.
    #[must_use]
    pub fn acks_dir(&self, plan_id: &str) -> PathBuf {
        self.plan_dir(plan_id).join("acks")
    }

    /// `system_runtime/plans/<plan>/releases/`.
    #[must_use]
    pub fn releases_dir(&self, plan_id: &str) -> PathBuf {
        self.plan_dir(plan_id).join("releases")
    }

    /// `system_runtime/plans/<plan>/human_requests/`.
    #[must_use]
    pub fn human_requests_dir(&self, plan_id: &str) -> PathBuf {
        self.plan_dir(plan_id).join("human_requests")
    }

    /// `system_runtime/plans/<plan>/human_responses/`.
    #[must_use]
    pub fn human_responses_dir(&self, plan_id: &str) -> PathBuf {
        self.plan_dir(plan_id).join("human_responses")
    }

    /// `system_runtime/agent_status/<agent_id>.json`.
    #[must_use]
    pub fn agent_status(&self, agent_id: &str) -> PathBuf {
        self.root.join("agent_status").join(format!("{agent_id}.json"))
    }

    /// `system_runtime/deadletter/<plan>/`.
    #[must_use]
    pub fn deadletter_dir(&self, plan_id: &str) -> PathBuf {
        self.root.join("deadletter").join(plan_id)
    }

    /// `system_runtime/alerts/<plan>/`.
    #[must_use]
    pub fn alerts_dir(&self, plan_id: &str) -> PathBuf {
        self.root.join("alerts").join(plan_id)
    }
}

/// Every plan id with at least one agent outbox directory, across all
/// agents: the union of every `plan_id` present under any outbox.
pub fn discover_plan_ids(agents_root: &AgentsRoot) -> Result<Vec<String>> {
    let mut plans = std::collections::BTreeSet::new();
    for agent_id in agents_root.list_agent_ids()? {
        let outbox_root = agents_root.agent(&agent_id).root.join("outbox");
        if !outbox_root.exists() {
            continue;
        }
        for entry in fs::read_dir(&outbox_root)
            .with_context(|| format!("listing {outbox_root:?}"))?
            .filter_map(|e| e.ok())
        {
            if entry.path().is_dir() {
                if let Ok(name) = entry.file_name().into_string() {
                    plans.insert(name);
                }
            }
        }
    }
    Ok(plans.into_iter().collect())
}

/// List `*.msg.json` envelope files directly inside `dir` (not its
/// `.pending`/`.processed`/`.deadletter` subdirectories), sorted by file
/// name for deterministic tick ordering.
pub fn list_envelope_files(dir: &Path) -> Result<Vec<PathBuf>> {
    if !dir.exists() {
        return Ok(Vec::new());
    }
    let mut files: Vec<PathBuf> = fs::read_dir(dir)
        .with_context(|| format!("listing {dir:?}"))?
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.is_file())
        .filter(|p| {
            p.file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.ends_with(".msg.json"))
        })
        .collect();
    files.sort();
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn agent_paths_match_layout() {
        let root = AgentsRoot::new("/agents");
        let a = root.agent("agent_exec");
        assert_eq!(a.inbox("plan-1"), Path::new("/agents/agent_exec/inbox/plan-1"));
        assert_eq!(
            a.inbox_pending("plan-1"),
            Path::new("/agents/agent_exec/inbox/plan-1/.pending")
        );
        assert_eq!(
            a.task_state_file("plan-1", "task_exec"),
            Path::new("/agents/agent_exec/outbox/plan-1/task_state_task_exec.json")
        );
    }

    #[test]
    fn discover_plan_ids_unions_outboxes() {
        let dir = tempdir().unwrap();
        let agents_root = dir.path().join("agents");
        fs::create_dir_all(agents_root.join("agent_a/outbox/plan-1")).unwrap();
        fs::create_dir_all(agents_root.join("agent_b/outbox/plan-2")).unwrap();
        let root = AgentsRoot::new(&agents_root);
        let plans = discover_plan_ids(&root).unwrap();
        assert_eq!(plans, vec!["plan-1".to_string(), "plan-2".to_string()]);
    }

    #[test]
    fn list_envelope_files_sorted_and_filtered() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("b.msg.json"), b"{}").unwrap();
        fs::write(dir.path().join("a.msg.json"), b"{}").unwrap();
        fs::write(dir.path().join("note.txt"), b"x").unwrap();
        let files = list_envelope_files(dir.path()).unwrap();
        let names: Vec<_> = files
            .iter()
            .map(|p| p.file_name().unwrap().to_str().unwrap())
            .collect();
        assert_eq!(names, vec!["a.msg.json", "b.msg.json"]);
    }
}

// SPDX-License-Identifier: MIT OR Apache-2.0
//! The task DAG (`task_dag.json`) and the pointer that pins its version
//! (`active_dag_ref.json`).

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::TaskMeshError;

/// One entry of `node.inputs`: a way to resolve a required input to
/// delivered files, used by the monitor's satisfaction check and
/// mirrored by the heartbeat's own input resolution.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum InputSelector {
    /// Satisfied if any delivered artifact carries this output name.
    ByOutputName {
        /// The output name to match.
        output_name: String,
    },
    /// Satisfied if a delivered file with this exact name exists.
    ByFileName {
        /// The file name to match.
        file_name: String,
    },
    /// Satisfied if any delivered file name matches this glob.
    ByGlob {
        /// The glob pattern to match against delivered file names.
        glob: String,
    },
}

/// One entry of `node.outputs`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DagOutput {
    /// The output's name, referenced by `command.produces[].output_name`.
    pub name: String,
    /// Agent ids this output's artifacts are routed to.
    pub deliver_to: Vec<String>,
    /// Optional dedup key; currently advisory only (dedup is by
    /// `(message_id, envelope_sha256)` regardless).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub idempotency_key: Option<String>,
}

/// One node of the DAG.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DagNode {
    /// The agent responsible for executing this task.
    pub assigned_agent_id: String,
    /// Task ids this node depends on.
    #[serde(default)]
    pub depends_on: Vec<String>,
    /// Structured input selectors, preferred over `required_inputs` when
    /// present.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inputs: Option<Vec<InputSelector>>,
    /// Bare required input filenames, used when `inputs` is absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub required_inputs: Option<Vec<String>>,
    /// Outputs this node may produce.
    #[serde(default)]
    pub outputs: Vec<DagOutput>,
}

impl DagNode {
    /// The output named `name`, if this node declares it.
    #[must_use]
    pub fn output(&self, name: &str) -> Option<&DagOutput> {
        self.outputs.iter().find(|o| o.name == name)
    }
}

/// `task_dag.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Dag {
    /// Always `"1.1"`.
    pub schema_version: String,
    /// Nodes keyed by `task_id`.
    pub nodes: BTreeMap<String, DagNode>,
}

impl Dag {
    /// Parse a DAG document, rejecting anything but schema version
    /// `"1.1"`.
    pub fn parse(bytes: &[u8]) -> Result<Self, TaskMeshError> {
        let dag: Self = serde_json::from_slice(bytes)
            .map_err(|e| TaskMeshError::EnvelopeParseError(format!("invalid task_dag.json: {e}")))?;
        if dag.schema_version != "1.1" {
            return Err(TaskMeshError::SchemaVersionUnsupported(dag.schema_version));
        }
        Ok(dag)
    }

    /// Look up a node by task id.
    ///
    /// # Errors
    ///
    /// Returns [`TaskMeshError::RoutingNoTarget`] if no such task exists.
    pub fn node_by_task_id(&self, task_id: &str) -> Result<&DagNode, TaskMeshError> {
        self.nodes
            .get(task_id)
            .ok_or_else(|| TaskMeshError::RoutingNoTarget(format!("unknown task_id {task_id:?}")))
    }

    /// The agent assigned to execute `task_id`.
    pub fn assigned_agent_for_task(&self, task_id: &str) -> Result<&str, TaskMeshError> {
        self.node_by_task_id(task_id)
            .map(|n| n.assigned_agent_id.as_str())
    }

    /// The delivery targets for `task_id`'s `output_name` output.
    ///
    /// # Errors
    ///
    /// Returns [`TaskMeshError::RoutingNoTarget`] if the task or the
    /// named output does not exist.
    pub fn deliver_to_for_output(
        &self,
        task_id: &str,
        output_name: &str,
    ) -> Result<&[String], TaskMeshError> {
        let node = self.node_by_task_id(task_id)?;
        node.output(output_name)
            .map(|o| o.deliver_to.as_slice())
            .ok_or_else(|| {
                TaskMeshError::RoutingNoTarget(format!(
                    "task {task_id:?} has no output {output_name:?}"
                ))
            })
    }
}

/// `active_dag_ref.json`: pins the DAG version currently in force for a
/// plan.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActiveDagRef {
    /// Always `"1.1"`.
    pub schema_version: String,
    /// `sha256:`-prefixed digest of the `task_dag.json` this ref pins.
    pub task_dag_sha256: String,
}

impl ActiveDagRef {
    /// Parse an `active_dag_ref.json` document.
    pub fn parse(bytes: &[u8]) -> Result<Self, TaskMeshError> {
        let parsed: Self = serde_json::from_slice(bytes).map_err(|e| {
            TaskMeshError::EnvelopeParseError(format!("invalid active_dag_ref.json: {e}"))
        })?;
        if parsed.schema_version != "1.1" {
            return Err(TaskMeshError::SchemaVersionUnsupported(parsed.schema_version));
        }
        Ok(parsed)
    }

    /// Verify that `dag_bytes` hashes to the digest this ref pins.
    ///
    /// # Errors
    ///
    /// Returns [`TaskMeshError::CommandDagMismatch`] on mismatch.
    pub fn verify(&self, dag_bytes: &[u8]) -> Result<(), TaskMeshError> {
        let actual = crate::sha256_hex_prefixed(dag_bytes);
        if actual != self.task_dag_sha256 {
            return Err(TaskMeshError::CommandDagMismatch {
                expected: self.task_dag_sha256.clone(),
                actual,
            });
        }
        Ok(())
    }
}

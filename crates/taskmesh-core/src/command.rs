// SPDX-License-Identifier: MIT OR Apache-2.0
//! The command payload embedded in a command envelope.

use serde::{Deserialize, Serialize};

/// Pins the DAG version a command was issued against.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DagRef {
    /// `sha256:`-prefixed digest of the `task_dag.json` this command was
    /// computed from.
    pub sha256: String,
}

/// An entry of `command.resolved_inputs`: a required input that has
/// already been resolved to a concrete file, as opposed to
/// `required_inputs` (a bare list of filenames the heartbeat must still
/// resolve against the input index).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolvedInput {
    /// The output name this input was produced under, if known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_name: Option<String>,
    /// The exact file name expected.
    pub file_name: String,
}

/// One file a `produces` output is declared to write.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProducesFile {
    /// Path relative to the outbox, the same value that ends up in the
    /// resulting artifact envelope's payload file entry.
    pub path: String,
    /// MIME type, if known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
}

/// One entry of `command.produces`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProducesEntry {
    /// The output name this entry fulfills; must match a DAG node output.
    pub output_name: String,
    /// The files this output is declared to write.
    pub files: Vec<ProducesFile>,
}

/// The command embedded in a command envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Command {
    /// Globally unique id for this command instance.
    pub command_id: String,
    /// The plan this command belongs to.
    pub plan_id: String,
    /// The task this command targets.
    pub task_id: String,
    /// Monotonic per `(task_id, dag_sha)`; only the maximum is
    /// deliverable.
    pub command_seq: u64,
    /// The DAG version this command was computed against.
    pub dag_ref: DagRef,
    /// The instruction text handed to the command handler.
    pub prompt: String,
    /// Bare filenames the task still needs before it can run.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub required_inputs: Option<Vec<String>>,
    /// Inputs already resolved to a concrete producing output.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolved_inputs: Option<Vec<ResolvedInput>>,
    /// Outputs this command is expected to produce.
    #[serde(default)]
    pub produces: Vec<ProducesEntry>,
    /// If true, the heartbeat blocks the task until required inputs
    /// arrive instead of running it with partial inputs.
    #[serde(default)]
    pub wait_for_inputs: bool,
    /// Seconds to wait for inputs before escalating to a human request.
    pub timeout: u64,
    /// Whether a `score` is mandatory in the handler's result.
    #[serde(default)]
    pub score_required: bool,
}

impl Command {
    /// The filenames this command still needs, regardless of whether
    /// they were declared via `required_inputs` or `resolved_inputs`.
    #[must_use]
    pub fn required_file_names(&self) -> Vec<String> {
        if let Some(resolved) = &self.resolved_inputs {
            resolved.iter().map(|r| r.file_name.clone()).collect()
        } else {
            self.required_inputs.clone().unwrap_or_default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn required_file_names_prefers_resolved_inputs() {
        let cmd = Command {
            command_id: "c1".into(),
            plan_id: "p1".into(),
            task_id: "t1".into(),
            command_seq: 1,
            dag_ref: DagRef { sha256: "sha256:aa".into() },
            prompt: "do it".into(),
            required_inputs: Some(vec!["a.txt".into()]),
            resolved_inputs: Some(vec![ResolvedInput {
                output_name: Some("o".into()),
                file_name: "b.txt".into(),
            }]),
            produces: vec![],
            wait_for_inputs: true,
            timeout: 30,
            score_required: false,
        };
        assert_eq!(cmd.required_file_names(), vec!["b.txt".to_string()]);
    }

    #[test]
    fn falls_back_to_required_inputs() {
        let cmd = Command {
            command_id: "c1".into(),
            plan_id: "p1".into(),
            task_id: "t1".into(),
            command_seq: 1,
            dag_ref: DagRef { sha256: "sha256:aa".into() },
            prompt: "do it".into(),
            required_inputs: Some(vec!["a.txt".into()]),
            resolved_inputs: None,
            produces: vec![],
            wait_for_inputs: true,
            timeout: 30,
            score_required: false,
        };
        assert_eq!(cmd.required_file_names(), vec!["a.txt".to_string()]);
    }
}

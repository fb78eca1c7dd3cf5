// SPDX-License-Identifier: MIT OR Apache-2.0
//! Human-in-the-loop escalation: the request a blocked command
//! synthesizes, and the response a human (via the dashboard, out of
//! scope here) eventually posts back.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// `human_intervention_request_<request_id>.json`, synthesized by the
/// heartbeat when a `wait_for_inputs` command's timeout elapses.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HumanInterventionRequest {
    /// `human_req_<ts>_<hex8>`.
    pub request_id: String,
    /// The plan this request concerns.
    pub plan_id: String,
    /// The blocked task.
    pub task_id: String,
    /// The command that timed out waiting for inputs.
    pub command_id: String,
    /// Why escalation happened, e.g. `"WAIT_FOR_INPUTS_TIMEOUT"`.
    pub reason: String,
    /// When this request was created.
    pub created_at: String,
    /// Filenames still missing, for the human to supply.
    #[serde(default)]
    pub missing_inputs: Vec<String>,
    /// Arbitrary extra context for whoever resolves this.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

/// One file a human supplied in response to a request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProvidedFile {
    /// Path to the file as staged in the human gateway agent's outbox.
    pub path: String,
    /// The agent whose inbox this file should be injected into.
    pub deliver_to_agent_id: String,
}

/// `human_intervention_response_<request_id>.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HumanInterventionResponse {
    /// The request this responds to.
    pub request_id: String,
    /// The plan this response concerns.
    pub plan_id: String,
    /// Files the human supplied, to be injected as synthesized
    /// artifacts.
    #[serde(default)]
    pub provided_files: Vec<ProvidedFile>,
    /// Free-form resolver identity.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolved_by: Option<String>,
    /// When the human responded.
    pub resolved_at: String,
}

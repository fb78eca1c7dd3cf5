// SPDX-License-Identifier: MIT OR Apache-2.0
//! `plan_manifest.json`: static per-plan configuration every daemon that
//! needs plan-level policy (today, only the release gate evaluator)
//! reads rather than re-deriving.

use serde::{Deserialize, Serialize};

/// Policy knobs under `plan_manifest.json`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PlanManifestPolicies {
    /// Evidence filenames the release gate must find `PASS`ed before it
    /// will `APPROVE`. Located via the release agent's own input index,
    /// the same as any other artifact input.
    #[serde(default)]
    pub release_gates_required: Vec<String>,
}

/// `system_runtime/plans/<plan>/plan_manifest.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanManifest {
    /// Always `"1.0"`.
    pub schema_version: String,
    /// The plan this manifest configures.
    pub plan_id: String,
    /// The agent that acts as release coordinator for this plan.
    pub release_agent_id: String,
    /// Plan-level policy knobs.
    #[serde(default)]
    pub policies: PlanManifestPolicies,
}

// SPDX-License-Identifier: MIT OR Apache-2.0
//! Release gate evidence, decision records, and release manifests.

use serde::{Deserialize, Serialize};

/// One required evidence file's outcome.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvidenceOutcome {
    /// The required filename, as named in
    /// `plan_manifest.json`'s `policies.release_gates_required`.
    pub filename: String,
    /// Whether the file was found via the release agent's input index.
    pub found: bool,
    /// `sha256:`-prefixed digest of the evidence file, if found.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sha256: Option<String>,
    /// The evidence file's own `decision` field (expected `"PASS"`), if
    /// found and parseable.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub decision: Option<String>,
    /// Why this evidence file was rejected, if it was.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rejection_reason: Option<String>,
}

/// `decision_<ts>_<hex8>.json` under `system_runtime/plans/<plan>/decisions/`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionRecord {
    /// `dec_<ts>_<hex8>`.
    pub decision_id: String,
    /// The plan this decision concerns.
    pub plan_id: String,
    /// What this decision is about.
    pub subject: DecisionSubject,
    /// `APPROVE` or `REJECT`.
    pub decision: String,
    /// Per-evidence-file outcomes that produced this decision.
    pub evidence_files: Vec<EvidenceOutcome>,
    /// When this decision was made.
    pub created_at: String,
    /// The name the release coordinator signed as.
    pub signed_by: String,
}

/// What a [`DecisionRecord`] is about.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionSubject {
    /// Always `"plan_release"` for the core release gate.
    pub kind: String,
    /// `sha256:`-prefixed digest of the active DAG at decision time.
    pub ref_sha256: String,
}

/// `release_<ts>_<hex8>.json` under `system_runtime/plans/<plan>/releases/`,
/// and the `release_manifest.json` pointer copy of its latest instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReleaseManifest {
    /// Unique id for this manifest instance.
    pub release_id: String,
    /// The plan this manifest concerns.
    pub plan_id: String,
    /// `APPROVE` or `REJECT`, copied from the backing decision.
    pub decision: String,
    /// The decision record this manifest is backed by.
    pub decision_id: String,
    /// When this manifest was created.
    pub created_at: String,
    /// The name the release coordinator signed as.
    pub signed_by: String,
}

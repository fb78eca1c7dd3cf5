// SPDX-License-Identifier: MIT OR Apache-2.0
//! Evaluating a plan's release gates against the release agent's own
//! input index.

use std::path::PathBuf;

use serde_json::Value;
use taskmesh_core::{EvidenceOutcome, InputIndex};
use taskmesh_fs::{file_sha256, AgentPaths};
use taskmesh_schema::SchemaRegistry;

/// Evidence filenames evaluated when `policies.release_gates_required`
/// is absent or empty, and the schema stem (if any) each is checked
/// against when schema validation is enabled.
pub const DEFAULT_EVIDENCE_GATES: &[(&str, &str)] = &[
    ("build_validation_result.json", "build_validation_result"),
    ("deploy_validation_result.json", "deploy_validation_result"),
    ("smoke_test_result.json", "smoke_test_result"),
    ("e2e_test_result.json", "e2e_test_result"),
    ("security_scan_result.json", "security_scan_result"),
];

/// The schema stem known for a required evidence filename, if any.
#[must_use]
pub fn schema_stem_for(filename: &str) -> Option<&'static str> {
    DEFAULT_EVIDENCE_GATES
        .iter()
        .find(|(name, _)| *name == filename)
        .map(|(_, stem)| *stem)
}

/// The evidence filenames a release gate must check: the plan's own
/// `policies.release_gates_required`, minus the two files the release
/// coordinator itself produces, or the default set if that list is
/// empty.
#[must_use]
pub fn required_evidence_filenames(policy: &[String]) -> Vec<String> {
    let mut required = Vec::new();
    for name in policy {
        if name == "release_manifest.json" || name == "decision_record.json" {
            continue;
        }
        if !required.contains(name) {
            required.push(name.clone());
        }
    }
    if required.is_empty() {
        required = DEFAULT_EVIDENCE_GATES.iter().map(|(name, _)| name.to_string()).collect();
    }
    required
}

/// The outcome of checking every required evidence file once.
#[derive(Debug, Clone)]
pub struct GateEvaluation {
    /// `APPROVE` or `REJECT`.
    pub decision: String,
    /// Per-file outcomes, in the same order as the required list.
    pub evidence_files: Vec<EvidenceOutcome>,
}

/// Resolve every file recorded in `index` to its on-disk location under
/// the release agent's workspace inputs, keyed by final filename. A
/// filename delivered more than once resolves to its most recently
/// recorded entry, matching the last-write-wins lookup the input index
/// itself is built with.
fn resolve_paths(agent: &AgentPaths, plan_id: &str, index: &InputIndex) -> std::collections::HashMap<String, PathBuf> {
    let mut by_name = std::collections::HashMap::new();
    for entry in &index.entries {
        let dir = agent.workspace_input_dir(plan_id, &entry.task_id, &entry.output_name);
        for file in &entry.files {
            let name = file.path.rsplit('/').next().unwrap_or(&file.path).to_string();
            by_name.insert(name, dir.join(&file.path));
        }
    }
    by_name
}

/// Evaluate `required` against the release agent's input index.
///
/// For each required filename: missing if it is not recorded in the
/// index or the recorded file no longer exists on disk; otherwise its
/// sha256 is recomputed from disk, checked against the schema named by
/// [`schema_stem_for`] if schema validation is enabled, checked for a
/// `plan_id` field that disagrees with `plan_id`, and checked for a
/// `decision` field equal to `"PASS"` — any of those failing, or the
/// file failing to parse as JSON at all, rejects it. The overall
/// decision is `APPROVE` iff nothing is missing and nothing is
/// rejected.
#[must_use]
pub fn evaluate_release_gates(
    agent: &AgentPaths,
    plan_id: &str,
    required: &[String],
    index: &InputIndex,
    schemas: &SchemaRegistry,
    schema_validation_enabled: bool,
) -> GateEvaluation {
    let by_name = resolve_paths(agent, plan_id, index);
    let mut evidence_files = Vec::with_capacity(required.len());
    let mut any_missing = false;
    let mut any_rejected = false;

    for filename in required {
        let outcome = match by_name.get(filename) {
            None => {
                any_missing = true;
                EvidenceOutcome {
                    filename: filename.clone(),
                    found: false,
                    sha256: None,
                    decision: None,
                    rejection_reason: None,
                }
            }
            Some(path) if !path.exists() => {
                any_missing = true;
                EvidenceOutcome {
                    filename: filename.clone(),
                    found: false,
                    sha256: None,
                    decision: None,
                    rejection_reason: None,
                }
            }
            Some(path) => {
                let outcome = evaluate_one(filename, path, plan_id, schemas, schema_validation_enabled);
                if outcome.rejection_reason.is_some() {
                    any_rejected = true;
                }
                outcome
            }
        };
        evidence_files.push(outcome);
    }

    let decision = if any_missing || any_rejected { "REJECT" } else { "APPROVE" };
    GateEvaluation { decision: decision.to_string(), evidence_files }
}

fn evaluate_one(
    filename: &str,
    path: &std::path::Path,
    plan_id: &str,
    schemas: &SchemaRegistry,
    schema_validation_enabled: bool,
) -> EvidenceOutcome {
    let sha256 = match file_sha256(path) {
        Ok(sha) => sha,
        Err(_) => {
            return EvidenceOutcome {
                filename: filename.to_string(),
                found: false,
                sha256: None,
                decision: None,
                rejection_reason: None,
            }
        }
    };
    let Ok(bytes) = std::fs::read(path) else {
        return EvidenceOutcome {
            filename: filename.to_string(),
            found: true,
            sha256: Some(sha256),
            decision: None,
            rejection_reason: Some("evidence file could not be read".to_string()),
        };
    };
    let Ok(obj) = serde_json::from_slice::<Value>(&bytes) else {
        return EvidenceOutcome {
            filename: filename.to_string(),
            found: true,
            sha256: Some(sha256),
            decision: None,
            rejection_reason: Some("evidence file is not valid JSON".to_string()),
        };
    };

    if schema_validation_enabled {
        if let Some(stem) = schema_stem_for(filename) {
            if !schemas.validate(stem, &obj).is_valid() {
                return EvidenceOutcome {
                    filename: filename.to_string(),
                    found: true,
                    sha256: Some(sha256),
                    decision: obj.get("decision").and_then(Value::as_str).map(str::to_string),
                    rejection_reason: Some(format!("failed schema {stem}")),
                };
            }
        }
    }

    let evidence_plan_id = obj.get("plan_id").and_then(Value::as_str);
    if let Some(evidence_plan_id) = evidence_plan_id {
        if !evidence_plan_id.is_empty() && evidence_plan_id != plan_id {
            return EvidenceOutcome {
                filename: filename.to_string(),
                found: true,
                sha256: Some(sha256),
                decision: obj.get("decision").and_then(Value::as_str).map(str::to_string),
                rejection_reason: Some(format!("plan_id {evidence_plan_id:?} does not match {plan_id:?}")),
            };
        }
    }

    let decision = obj.get("decision").and_then(Value::as_str).unwrap_or_default().to_string();
    if decision != "PASS" {
        return EvidenceOutcome {
            filename: filename.to_string(),
            found: true,
            sha256: Some(sha256),
            decision: Some(decision),
            rejection_reason: Some("decision is not PASS".to_string()),
        };
    }

    EvidenceOutcome {
        filename: filename.to_string(),
        found: true,
        sha256: Some(sha256),
        decision: Some(decision),
        rejection_reason: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use taskmesh_core::{InputIndexEntry, InputIndexEntryFile};
    use taskmesh_fs::AgentsRoot;
    use tempfile::tempdir;

    fn index_with(task_id: &str, output_name: &str, filename: &str) -> InputIndex {
        InputIndex {
            entries: vec![InputIndexEntry {
                message_id: "msg_1".into(),
                task_id: task_id.into(),
                output_name: output_name.into(),
                received_at: "2026-07-31T00:00:00Z".into(),
                files: vec![InputIndexEntryFile {
                    path: filename.into(),
                    sha256: "sha256:unused".into(),
                    stored_at: "2026-07-31T00:00:00Z".into(),
                }],
            }],
        }
    }

    #[test]
    fn missing_evidence_rejects() {
        let dir = tempdir().unwrap();
        let agents_root = AgentsRoot::new(dir.path());
        let agent = agents_root.agent("agent_release");
        let schemas = SchemaRegistry::load("/nonexistent").unwrap();
        let index = InputIndex::default();

        let eval = evaluate_release_gates(
            &agent,
            "plan-1",
            &["smoke_test_result.json".to_string()],
            &index,
            &schemas,
            false,
        );
        assert_eq!(eval.decision, "REJECT");
        assert!(!eval.evidence_files[0].found);
    }

    #[test]
    fn passing_evidence_approves() {
        let dir = tempdir().unwrap();
        let agents_root = AgentsRoot::new(dir.path());
        let agent = agents_root.agent("agent_release");
        let input_dir = agent.workspace_input_dir("plan-1", "task_smoke", "smoke_test_result");
        std::fs::create_dir_all(&input_dir).unwrap();
        std::fs::write(
            input_dir.join("smoke_test_result.json"),
            serde_json::to_vec(&serde_json::json!({"plan_id": "plan-1", "decision": "PASS"})).unwrap(),
        )
        .unwrap();
        let index = index_with("task_smoke", "smoke_test_result", "smoke_test_result.json");
        let schemas = SchemaRegistry::load("/nonexistent").unwrap();

        let eval = evaluate_release_gates(
            &agent,
            "plan-1",
            &["smoke_test_result.json".to_string()],
            &index,
            &schemas,
            false,
        );
        assert_eq!(eval.decision, "APPROVE");
        assert!(eval.evidence_files[0].found);
        assert!(eval.evidence_files[0].rejection_reason.is_none());
    }

    #[test]
    fn mismatched_plan_id_rejects() {
        let dir = tempdir().unwrap();
        let agents_root = AgentsRoot::new(dir.path());
        let agent = agents_root.agent("agent_release");
        let input_dir = agent.workspace_input_dir("plan-1", "task_smoke", "smoke_test_result");
        std::fs::create_dir_all(&input_dir).unwrap();
        std::fs::write(
            input_dir.join("smoke_test_result.json"),
            serde_json::to_vec(&serde_json::json!({"plan_id": "plan-other", "decision": "PASS"})).unwrap(),
        )
        .unwrap();
        let index = index_with("task_smoke", "smoke_test_result", "smoke_test_result.json");
        let schemas = SchemaRegistry::load("/nonexistent").unwrap();

        let eval = evaluate_release_gates(
            &agent,
            "plan-1",
            &["smoke_test_result.json".to_string()],
            &index,
            &schemas,
            false,
        );
        assert_eq!(eval.decision, "REJECT");
        assert!(eval.evidence_files[0].rejection_reason.is_some());
    }

    #[test]
    fn required_evidence_falls_back_to_defaults_when_empty() {
        let required = required_evidence_filenames(&[]);
        assert_eq!(required.len(), DEFAULT_EVIDENCE_GATES.len());
    }

    #[test]
    fn required_evidence_drops_self_produced_names() {
        let required = required_evidence_filenames(&[
            "smoke_test_result.json".to_string(),
            "release_manifest.json".to_string(),
            "decision_record.json".to_string(),
        ]);
        assert_eq!(required, vec!["smoke_test_result.json".to_string()]);
    }
}

// SPDX-License-Identifier: MIT OR Apache-2.0
//! Loading and verifying a plan's active DAG, and computing its digest
//! for the decision record it backs.

use std::fs;

use anyhow::{Context, Result};
use taskmesh_core::ActiveDagRef;
use taskmesh_fs::SystemPaths;

/// The `sha256:`-prefixed digest of `task_dag.json` for `plan_id`, after
/// verifying it matches the pinned `active_dag_ref.json`. Returns
/// `Ok(None)` if the plan has no DAG published yet.
pub fn active_dag_sha256(system: &SystemPaths, plan_id: &str) -> Result<Option<String>> {
    let dag_path = system.task_dag(plan_id);
    let aref_path = system.active_dag_ref(plan_id);
    if !dag_path.exists() || !aref_path.exists() {
        return Ok(None);
    }
    let dag_bytes = fs::read(&dag_path).with_context(|| format!("reading {dag_path:?}"))?;
    let aref_bytes = fs::read(&aref_path).with_context(|| format!("reading {aref_path:?}"))?;
    let aref = ActiveDagRef::parse(&aref_bytes).with_context(|| format!("parsing {aref_path:?}"))?;
    aref.verify(&dag_bytes)
        .with_context(|| format!("active_dag_ref for plan {plan_id:?} does not match task_dag.json"))?;
    Ok(Some(taskmesh_core::sha256_hex_prefixed(&dag_bytes)))
}

// SPDX-License-Identifier: MIT OR Apache-2.0
//! Loading and verifying a plan's active DAG.

use std::fs;

use anyhow::{Context, Result};
use taskmesh_core::{ActiveDagRef, Dag};
use taskmesh_fs::SystemPaths;

/// Load `task_dag.json` and `active_dag_ref.json` for `plan_id`, and
/// verify the pinned digest matches. Returns `Ok(None)` if the plan has
/// no DAG yet (not every outbox directory implies a fully set-up plan).
///
/// # Errors
///
/// Returns an error if either file exists but fails to parse, or if the
/// digests mismatch (`COMMAND_DAG_MISMATCH`, "fail closed").
pub fn load_active_dag(system: &SystemPaths, plan_id: &str) -> Result<Option<Dag>> {
    let dag_path = system.task_dag(plan_id);
    let aref_path = system.active_dag_ref(plan_id);
    if !dag_path.exists() || !aref_path.exists() {
        return Ok(None);
    }
    let dag_bytes = fs::read(&dag_path).with_context(|| format!("reading {dag_path:?}"))?;
    let aref_bytes = fs::read(&aref_path).with_context(|| format!("reading {aref_path:?}"))?;
    let dag = Dag::parse(&dag_bytes).with_context(|| format!("parsing {dag_path:?}"))?;
    let aref = ActiveDagRef::parse(&aref_bytes).with_context(|| format!("parsing {aref_path:?}"))?;
    aref.verify(&dag_bytes)
        .with_context(|| format!("active_dag_ref for plan {plan_id:?} does not match task_dag.json"))?;
    Ok(Some(dag))
}

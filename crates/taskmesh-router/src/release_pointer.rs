// SPDX-License-Identifier: MIT OR Apache-2.0
//! Refreshing the `release_manifest.json` pointer to the latest archived
//! release.

use std::fs;

use anyhow::Result;
use taskmesh_core::ReleaseManifest;
use taskmesh_fs::{atomic_write_json, SystemPaths};

/// Scan `system_runtime/plans/<plan>/releases/` and, if any manifest is
/// present, copy the one with the latest `created_at` to
/// `system_runtime/plans/<plan>/release_manifest.json`.
pub fn refresh_release_manifest_pointer(system: &SystemPaths, plan_id: &str) -> Result<bool> {
    let releases_dir = system.releases_dir(plan_id);
    if !releases_dir.exists() {
        return Ok(false);
    }
    let mut latest: Option<ReleaseManifest> = None;
    for entry in fs::read_dir(&releases_dir)?.filter_map(|e| e.ok()) {
        let Ok(bytes) = fs::read(entry.path()) else { continue };
        let Ok(manifest) = serde_json::from_slice::<ReleaseManifest>(&bytes) else {
            continue;
        };
        let is_newer = latest
            .as_ref()
            .is_none_or(|l| manifest.created_at > l.created_at);
        if is_newer {
            latest = Some(manifest);
        }
    }
    let Some(manifest) = latest else { return Ok(false) };
    atomic_write_json(&system.release_manifest_pointer(plan_id), &manifest)?;
    Ok(true)
}

// SPDX-License-Identifier: MIT OR Apache-2.0
//! Alert and deadletter writers shared by every daemon.

use anyhow::Result;
use serde_json::Value;
use taskmesh_core::clock::Clock;
use taskmesh_core::ids::IdGenerator;
use taskmesh_core::time::iso_z;
use taskmesh_core::{AlertRecord, DeadletterRecord};

use crate::atomic::atomic_write_json;
use crate::paths::SystemPaths;

/// Write an advisory alert record under `system_runtime/alerts/<plan>/`.
pub fn write_alert(
    system: &SystemPaths,
    clock: &dyn Clock,
    plan_id: &str,
    source: &str,
    code: &str,
    message: impl Into<String>,
    context: Option<Value>,
) -> Result<String> {
    let idgen = IdGenerator::new(clock);
    let alert_id = idgen.alert_id();
    let record = AlertRecord {
        alert_id: alert_id.clone(),
        plan_id: plan_id.to_string(),
        code: code.to_string(),
        message: message.into(),
        source: source.to_string(),
        created_at: iso_z(clock.now()),
        context,
    };
    let path = system.alerts_dir(plan_id).join(format!("{alert_id}.json"));
    atomic_write_json(&path, &record)?;
    tracing::warn!(plan = %plan_id, code, alert_id = %alert_id, "alert raised");
    Ok(alert_id)
}

/// Write an authoritative deadletter record under
/// `system_runtime/deadletter/<plan>/`.
pub fn write_deadletter(
    system: &SystemPaths,
    clock: &dyn Clock,
    plan_id: &str,
    source: &str,
    code: &str,
    message: impl Into<String>,
    message_id: Option<String>,
    payload: Option<Value>,
) -> Result<String> {
    let idgen = IdGenerator::new(clock);
    let dlq_id = idgen.deadletter_id();
    let record = DeadletterRecord {
        dlq_id: dlq_id.clone(),
        plan_id: plan_id.to_string(),
        code: code.to_string(),
        message: message.into(),
        source: source.to_string(),
        created_at: iso_z(clock.now()),
        message_id,
        payload,
    };
    let path = system.deadletter_dir(plan_id).join(format!("{dlq_id}.json"));
    atomic_write_json(&path, &record)?;
    tracing::error!(plan = %plan_id, code, dlq_id = %dlq_id, "deadlettered");
    Ok(dlq_id)
}

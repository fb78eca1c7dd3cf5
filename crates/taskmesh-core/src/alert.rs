// SPDX-License-Identifier: MIT OR Apache-2.0
//! Alert and deadletter records.
//!
//! Written by the router, heartbeat, and monitor alike whenever they hit
//! one of the [`crate::error::TaskMeshError`] taxonomy codes. Alerts are
//! advisory; deadletters are the authoritative record for triage.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// `system_runtime/alerts/<plan>/<alert_id>.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertRecord {
    /// `alert_<ts>_<hex8>`.
    pub alert_id: String,
    /// The plan this alert concerns.
    pub plan_id: String,
    /// The stable taxonomy code, from [`crate::error::TaskMeshError::code`].
    pub code: String,
    /// Human-readable detail.
    pub message: String,
    /// The component that raised this alert (`router`, `heartbeat`,
    /// `monitor`, `release`).
    pub source: String,
    /// When this alert was raised.
    pub created_at: String,
    /// The envelope, task, or command this alert concerns, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<Value>,
}

/// `system_runtime/deadletter/<plan>/<dlq_id>.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeadletterRecord {
    /// `dlq_<ts>_<hex8>`.
    pub dlq_id: String,
    /// The plan this record concerns.
    pub plan_id: String,
    /// The stable taxonomy code.
    pub code: String,
    /// Human-readable detail.
    pub message: String,
    /// The component that raised this record.
    pub source: String,
    /// When this record was written.
    pub created_at: String,
    /// The `message_id` of the offending envelope, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message_id: Option<String>,
    /// The raw envelope or document that was rejected, if available.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,
}
